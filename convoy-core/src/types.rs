//! Domain types for the Convoy unit registry.
//!
//! Registry types are serializable via serde + serde_yaml. Runtime
//! observation types ([`SyncState`], [`HealthState`], [`SyncAttempt`]) are
//! never persisted; the cluster stays the authority for unit realization.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed name for a unit in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitName(pub String);

impl UnitName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for UnitName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UnitName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// The category of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    #[default]
    Operator,
    Instance,
    Config,
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitKind::Operator => write!(f, "operator"),
            UnitKind::Instance => write!(f, "instance"),
            UnitKind::Config => write!(f, "config"),
        }
    }
}

/// Reference to a single remote object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ResourceRef {
    pub fn new(kind: impl Into<String>, name: impl Into<String>, namespace: Option<&str>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            namespace: namespace.map(str::to_owned),
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{} (ns {ns})", self.kind, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// Precondition that must hold before a unit's convergence is triggered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReadinessSignal {
    /// A resource-type definition is registered in the API.
    Crd { name: String },
    /// A controller whose name starts with `name_prefix` in `namespace`
    /// reports phase `Succeeded`.
    Controller {
        name_prefix: String,
        namespace: String,
    },
    /// The referenced resource's `.status.phase` equals `expected_phase`.
    ResourcePhase {
        resource: ResourceRef,
        expected_phase: String,
    },
}

impl fmt::Display for ReadinessSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadinessSignal::Crd { name } => write!(f, "crd {name}"),
            ReadinessSignal::Controller {
                name_prefix,
                namespace,
            } => write!(f, "controller {name_prefix}* in {namespace}"),
            ReadinessSignal::ResourcePhase {
                resource,
                expected_phase,
            } => write!(f, "{resource} phase {expected_phase}"),
        }
    }
}

/// Last observed sync state of a unit's remote representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SyncState {
    #[default]
    Unknown,
    OutOfSync,
    Synced,
}

impl SyncState {
    /// Parse the engine's textual status. Anything unrecognised is `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s {
            "Synced" => SyncState::Synced,
            "OutOfSync" => SyncState::OutOfSync,
            _ => SyncState::Unknown,
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncState::Unknown => write!(f, "Unknown"),
            SyncState::OutOfSync => write!(f, "OutOfSync"),
            SyncState::Synced => write!(f, "Synced"),
        }
    }
}

/// Last observed health state of a unit's remote representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum HealthState {
    #[default]
    Unknown,
    Progressing,
    Healthy,
    Degraded,
    Missing,
}

impl HealthState {
    pub fn parse(s: &str) -> Self {
        match s {
            "Progressing" => HealthState::Progressing,
            "Healthy" => HealthState::Healthy,
            "Degraded" => HealthState::Degraded,
            "Missing" => HealthState::Missing,
            _ => HealthState::Unknown,
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthState::Unknown => write!(f, "Unknown"),
            HealthState::Progressing => write!(f, "Progressing"),
            HealthState::Healthy => write!(f, "Healthy"),
            HealthState::Degraded => write!(f, "Degraded"),
            HealthState::Missing => write!(f, "Missing"),
        }
    }
}

/// Result of processing one unit during a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    #[default]
    Pending,
    Succeeded,
    TimedOut,
    Skipped,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Pending => write!(f, "pending"),
            Outcome::Succeeded => write!(f, "succeeded"),
            Outcome::TimedOut => write!(f, "timed out"),
            Outcome::Skipped => write!(f, "skipped"),
        }
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// A named deployable entity managed by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub name: UnitName,
    #[serde(default)]
    pub kind: UnitKind,
    /// Units that must reach Healthy before this one starts.
    #[serde(default)]
    pub depends_on: Vec<UnitName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness: Option<ReadinessSignal>,
    /// Namespace whose pending install gates are approved while the unit converges.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate_namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_timeout_seconds: Option<u64>,
}

impl Unit {
    /// A dependency-free unit with no readiness signal.
    pub fn new(name: impl Into<UnitName>, kind: UnitKind) -> Self {
        Self {
            name: name.into(),
            kind,
            depends_on: vec![],
            readiness: None,
            gate_namespace: None,
            health_timeout_seconds: None,
        }
    }

    pub fn depends_on(mut self, predecessor: impl Into<UnitName>) -> Self {
        self.depends_on.push(predecessor.into());
        self
    }

    pub fn with_readiness(mut self, signal: ReadinessSignal) -> Self {
        self.readiness = Some(signal);
        self
    }

    pub fn with_gate_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.gate_namespace = Some(namespace.into());
        self
    }
}

/// Bounded retry/backoff applied when automatic convergence is enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub limit: u32,
    pub backoff_seconds: u64,
    pub factor: u32,
    pub max_backoff_seconds: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            limit: 5,
            backoff_seconds: 5,
            factor: 2,
            max_backoff_seconds: 180,
        }
    }
}

/// A top-level grouping resource (generator or app-of-apps) that must be
/// disabled before teardown so units are not recreated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupingResource {
    #[serde(flatten)]
    pub resource: ResourceRef,
    /// Merge patch applied to disable the grouping resource. When absent,
    /// automated sync is switched off.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_patch: Option<serde_yaml::Value>,
}

/// Conventions of the GitOps engine that realizes units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineProfile {
    /// Namespace holding every unit's remote representation.
    pub namespace: String,
    pub unit_kind: String,
    pub refresh_annotation: String,
    pub refresh_value: String,
    pub cascade_finalizer: String,
    pub crd_kind: String,
    pub controller_kind: String,
    pub install_gate_kind: String,
    pub retry: RetryPolicy,
    pub grouping: Vec<GroupingResource>,
}

impl Default for EngineProfile {
    fn default() -> Self {
        Self {
            namespace: "openshift-gitops".to_string(),
            unit_kind: "applications.argoproj.io".to_string(),
            refresh_annotation: "argocd.argoproj.io/refresh".to_string(),
            refresh_value: "hard".to_string(),
            cascade_finalizer: "resources-finalizer.argocd.argoproj.io".to_string(),
            crd_kind: "customresourcedefinitions".to_string(),
            controller_kind: "clusterserviceversions".to_string(),
            install_gate_kind: "installplans".to_string(),
            retry: RetryPolicy::default(),
            grouping: vec![],
        }
    }
}

impl EngineProfile {
    /// Remote representation of a unit.
    pub fn unit_ref(&self, unit: &UnitName) -> ResourceRef {
        ResourceRef::new(&self.unit_kind, unit.as_str(), Some(&self.namespace))
    }
}

/// Static cleanup tables describing what lives outside the managed unit set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CleanupTables {
    /// Synthetic units deleted after the reversed sync order.
    pub extra_units: Vec<UnitName>,
    pub managed_namespaces: Vec<String>,
    /// Kinds whose finalizers are stripped before a namespace is deleted.
    /// Empty means only the profile's unit kind is swept.
    pub finalizer_sweep_kinds: Vec<String>,
    pub conflicting_installations: Vec<ResourceRef>,
}

/// Root of the registry YAML document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RegistryDocument {
    #[serde(default)]
    pub profile: EngineProfile,
    /// Manifests applied before the pre-flight existence check.
    #[serde(default)]
    pub bootstrap: Vec<PathBuf>,
    pub units: Vec<Unit>,
    #[serde(default)]
    pub cleanup: CleanupTables,
}

/// Ephemeral per-unit state tracked during one orchestration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncAttempt {
    pub unit: UnitName,
    pub started_at: DateTime<Utc>,
    pub last_sync: SyncState,
    pub last_health: HealthState,
    pub outcome: Outcome,
}

impl SyncAttempt {
    pub fn start(unit: UnitName) -> Self {
        Self {
            unit,
            started_at: Utc::now(),
            last_sync: SyncState::Unknown,
            last_health: HealthState::Unknown,
            outcome: Outcome::Pending,
        }
    }

    pub fn is_converged(&self) -> bool {
        self.last_sync == SyncState::Synced && self.last_health == HealthState::Healthy
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_name_display() {
        assert_eq!(UnitName::from("nfd-operator").to_string(), "nfd-operator");
    }

    #[test]
    fn readiness_signal_yaml_is_tagged() {
        let yaml = "type: controller\nname_prefix: rhods-operator\nnamespace: redhat-ods-operator\n";
        let signal: ReadinessSignal = serde_yaml::from_str(yaml).expect("parse");
        assert_eq!(
            signal,
            ReadinessSignal::Controller {
                name_prefix: "rhods-operator".to_string(),
                namespace: "redhat-ods-operator".to_string(),
            }
        );
    }

    #[test]
    fn unit_defaults_apply_when_fields_omitted() {
        let unit: Unit = serde_yaml::from_str("name: authorino\n").expect("parse");
        assert_eq!(unit.kind, UnitKind::Operator);
        assert!(unit.depends_on.is_empty());
        assert!(unit.readiness.is_none());
    }

    #[test]
    fn states_parse_unknown_for_garbage() {
        assert_eq!(SyncState::parse("Synced"), SyncState::Synced);
        assert_eq!(SyncState::parse(""), SyncState::Unknown);
        assert_eq!(HealthState::parse("Degraded"), HealthState::Degraded);
        assert_eq!(HealthState::parse("Suspended"), HealthState::Unknown);
    }

    #[test]
    fn attempt_converged_only_when_synced_and_healthy() {
        let mut attempt = SyncAttempt::start(UnitName::from("a"));
        attempt.last_sync = SyncState::Synced;
        assert!(!attempt.is_converged());
        attempt.last_health = HealthState::Healthy;
        assert!(attempt.is_converged());
    }

    #[test]
    fn profile_unit_ref_uses_engine_namespace() {
        let profile = EngineProfile::default();
        let r = profile.unit_ref(&UnitName::from("serverless-operator"));
        assert_eq!(r.namespace(), Some("openshift-gitops"));
        assert_eq!(r.kind, "applications.argoproj.io");
    }
}
