//! Fresh reads of unit state from the cluster.

use serde::Serialize;

use convoy_cluster::{extract_field, ClusterClient};
use convoy_core::{EngineProfile, HealthState, Registry, SyncState, UnitKind, UnitName};

pub const SYNC_STATUS_PATH: &str = ".status.sync.status";
pub const HEALTH_STATUS_PATH: &str = ".status.health.status";
pub const OPERATION_PHASE_PATH: &str = ".status.operationState.phase";
pub const DESTINATION_NAMESPACE_PATH: &str = ".spec.destination.namespace";

/// One read of a unit's remote representation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Observation {
    pub present: bool,
    pub sync: SyncState,
    pub health: HealthState,
    /// Phase of the last reconciliation operation; empty when none ran.
    pub operation_phase: String,
    pub destination_namespace: Option<String>,
}

impl Observation {
    pub fn is_converged(&self) -> bool {
        self.sync == SyncState::Synced && self.health == HealthState::Healthy
    }

    pub fn operation_failed(&self) -> bool {
        matches!(self.operation_phase.as_str(), "Failed" | "Error")
    }
}

/// Read a unit's sync / health state. Read failures and absence both
/// yield `present: false` with unknown states.
pub fn observe(client: &dyn ClusterClient, profile: &EngineProfile, unit: &UnitName) -> Observation {
    let target = profile.unit_ref(unit);
    match client.get_resource(&target) {
        Ok(Some(obj)) => {
            let destination = extract_field(&obj, DESTINATION_NAMESPACE_PATH);
            Observation {
                present: true,
                sync: SyncState::parse(&extract_field(&obj, SYNC_STATUS_PATH)),
                health: HealthState::parse(&extract_field(&obj, HEALTH_STATUS_PATH)),
                operation_phase: extract_field(&obj, OPERATION_PHASE_PATH),
                destination_namespace: (!destination.is_empty()).then_some(destination),
            }
        }
        Ok(None) => Observation::default(),
        Err(err) => {
            tracing::debug!(unit = %unit, error = %err, "status read failed");
            Observation::default()
        }
    }
}

/// A row of the unit × {sync, health} table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitStatus {
    pub unit: UnitName,
    pub kind: UnitKind,
    pub present: bool,
    pub sync: SyncState,
    pub health: HealthState,
    pub operation: String,
}

/// Status of every unit, in sync order.
pub fn snapshot(client: &dyn ClusterClient, registry: &Registry) -> Vec<UnitStatus> {
    registry
        .sync_order()
        .iter()
        .map(|unit| {
            let obs = observe(client, registry.profile(), &unit.name);
            let health = if obs.present {
                obs.health
            } else {
                HealthState::Missing
            };
            UnitStatus {
                unit: unit.name.clone(),
                kind: unit.kind,
                present: obs.present,
                sync: obs.sync,
                health,
                operation: obs.operation_phase,
            }
        })
        .collect()
}

/// Rows for every unit with unknown state, for when the cluster cannot be reached.
pub fn unobserved(registry: &Registry) -> Vec<UnitStatus> {
    registry
        .sync_order()
        .iter()
        .map(|unit| UnitStatus {
            unit: unit.name.clone(),
            kind: unit.kind,
            present: false,
            sync: SyncState::Unknown,
            health: HealthState::Unknown,
            operation: String::new(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_cluster::fake::{objects, FakeCluster};
    use convoy_core::{RegistryDocument, Unit};
    use rstest::rstest;

    #[rstest]
    #[case("Synced", "Healthy", true)]
    #[case("Synced", "Progressing", false)]
    #[case("OutOfSync", "Healthy", false)]
    #[case("Synced", "Degraded", false)]
    #[case("", "", false)]
    fn converged_only_when_synced_and_healthy(
        #[case] sync: &str,
        #[case] health: &str,
        #[case] expected: bool,
    ) {
        let profile = EngineProfile::default();
        let cluster = FakeCluster::new();
        cluster.insert(
            &profile.unit_kind,
            objects::application(&profile.namespace, "a", sync, health),
        );
        let obs = observe(&cluster, &profile, &UnitName::from("a"));
        assert!(obs.present);
        assert_eq!(obs.is_converged(), expected);
        assert_eq!(obs.destination_namespace.as_deref(), Some("a"));
    }

    #[test]
    fn snapshot_reports_missing_and_present_units() {
        let registry = Registry::from_document(RegistryDocument {
            units: vec![
                Unit::new("a", UnitKind::Operator),
                Unit::new("b", UnitKind::Instance).depends_on("a"),
            ],
            ..Default::default()
        })
        .unwrap();
        let profile = registry.profile().clone();
        let cluster = FakeCluster::new();
        cluster.insert(
            &profile.unit_kind,
            objects::failed_application(&profile.namespace, "a"),
        );

        let rows = snapshot(&cluster, &registry);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].sync, SyncState::OutOfSync);
        assert_eq!(rows[0].operation, "Failed");
        assert!(!rows[1].present);
        assert_eq!(rows[1].health, HealthState::Missing);
    }

    #[test]
    fn read_errors_are_unknown_not_fatal() {
        let profile = EngineProfile::default();
        let cluster = FakeCluster::new();
        cluster.fail_kind(&profile.unit_kind);
        let obs = observe(&cluster, &profile, &UnitName::from("a"));
        assert_eq!(obs, Observation::default());
    }
}
