//! Immutable unit registry.
//!
//! # Storage layout
//!
//! ```text
//! ~/.convoy/
//!   registry.yaml      (optional: builtin RHOAI table used when absent)
//! ```
//!
//! # API pattern
//!
//! Path-dependent functions have two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! A [`Registry`] is built once from a [`RegistryDocument`] and never mutated.
//! The sync order is derived from explicit `depends_on` edges; a declared
//! order that is already a valid topological sort is kept as-is.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::path::{Path, PathBuf};

use crate::error::RegistryError;
use crate::types::{
    EngineProfile, ReadinessSignal, RegistryDocument, ResourceRef, Unit, UnitKind, UnitName,
};

const BUILTIN_REGISTRY: &str = include_str!("../registry/rhoai.yaml");

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.convoy/registry.yaml`: pure, no I/O.
pub fn default_path_at(home: &Path) -> PathBuf {
    home.join(".convoy").join("registry.yaml")
}

/// `default_path_at` convenience wrapper.
pub fn default_path() -> Result<PathBuf, RegistryError> {
    Ok(default_path_at(&home()?))
}

// ---------------------------------------------------------------------------
// 2. Registry
// ---------------------------------------------------------------------------

/// Static description of every managed unit, in sync order.
#[derive(Debug, Clone)]
pub struct Registry {
    profile: EngineProfile,
    bootstrap: Vec<PathBuf>,
    order: Vec<Unit>,
    extras: Vec<Unit>,
    index: HashMap<UnitName, usize>,
    managed_namespaces: Vec<String>,
    finalizer_sweep_kinds: Vec<String>,
    conflicting: Vec<ResourceRef>,
}

impl Registry {
    /// Validate a document and derive its sync order.
    pub fn from_document(doc: RegistryDocument) -> Result<Self, RegistryError> {
        let order = topological_order(doc.units)?;
        let index = order
            .iter()
            .enumerate()
            .map(|(i, u)| (u.name.clone(), i))
            .collect();
        let extras = doc
            .cleanup
            .extra_units
            .into_iter()
            .map(|name| Unit::new(name, UnitKind::Config))
            .collect();

        Ok(Self {
            profile: doc.profile,
            bootstrap: doc.bootstrap,
            order,
            extras,
            index,
            managed_namespaces: doc.cleanup.managed_namespaces,
            finalizer_sweep_kinds: doc.cleanup.finalizer_sweep_kinds,
            conflicting: doc.cleanup.conflicting_installations,
        })
    }

    /// Parse a registry from YAML text. `origin` only labels parse errors.
    pub fn from_yaml(yaml: &str, origin: &Path) -> Result<Self, RegistryError> {
        let doc: RegistryDocument = serde_yaml::from_str(yaml).map_err(|e| RegistryError::Parse {
            path: origin.to_path_buf(),
            source: e,
        })?;
        Self::from_document(doc)
    }

    /// Load the registry at `path`.
    ///
    /// Returns `RegistryError::RegistryNotFound` if absent,
    /// `RegistryError::Parse` (with path + line context) if malformed YAML.
    pub fn load_at(path: &Path) -> Result<Self, RegistryError> {
        if !path.exists() {
            return Err(RegistryError::RegistryNotFound {
                path: path.to_path_buf(),
            });
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents, path)
    }

    /// The embedded RHOAI stack table.
    pub fn builtin() -> Result<Self, RegistryError> {
        let doc: RegistryDocument =
            serde_yaml::from_str(BUILTIN_REGISTRY).map_err(RegistryError::Builtin)?;
        Self::from_document(doc)
    }

    /// Load `<home>/.convoy/registry.yaml`, or the builtin table when it does not exist.
    pub fn load_or_builtin_at(home: &Path) -> Result<Self, RegistryError> {
        let path = default_path_at(home);
        if path.exists() {
            Self::load_at(&path)
        } else {
            Self::builtin()
        }
    }

    /// `load_or_builtin_at` convenience wrapper.
    pub fn load_or_builtin() -> Result<Self, RegistryError> {
        Self::load_or_builtin_at(&home()?)
    }

    // -- queries --

    /// Units in dependency order.
    pub fn sync_order(&self) -> &[Unit] {
        &self.order
    }

    /// Exact reverse of the sync order, followed by the synthetic extra units.
    pub fn cleanup_order(&self) -> Vec<&Unit> {
        self.order.iter().rev().chain(self.extras.iter()).collect()
    }

    pub fn unit(&self, name: &str) -> Result<&Unit, RegistryError> {
        self.index
            .get(&UnitName::from(name))
            .map(|&i| &self.order[i])
            .ok_or_else(|| RegistryError::UnknownUnit(name.to_string()))
    }

    pub fn readiness_signal(&self, name: &str) -> Result<Option<&ReadinessSignal>, RegistryError> {
        Ok(self.unit(name)?.readiness.as_ref())
    }

    /// True for sync-order units and synthetic cleanup units.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(&UnitName::from(name))
            || self.extras.iter().any(|u| u.name.as_str() == name)
    }

    pub fn profile(&self) -> &EngineProfile {
        &self.profile
    }

    pub fn bootstrap(&self) -> &[PathBuf] {
        &self.bootstrap
    }

    pub fn managed_namespaces(&self) -> &[String] {
        &self.managed_namespaces
    }

    pub fn finalizer_sweep_kinds(&self) -> &[String] {
        &self.finalizer_sweep_kinds
    }

    pub fn conflicting_installations(&self) -> &[ResourceRef] {
        &self.conflicting
    }
}

// ---------------------------------------------------------------------------
// 3. Ordering (Kahn's algorithm, declared position as tie-break)
// ---------------------------------------------------------------------------

fn topological_order(units: Vec<Unit>) -> Result<Vec<Unit>, RegistryError> {
    let mut position: HashMap<UnitName, usize> = HashMap::new();
    for (i, unit) in units.iter().enumerate() {
        if position.insert(unit.name.clone(), i).is_some() {
            return Err(RegistryError::DuplicateUnit(unit.name.0.clone()));
        }
    }

    // Adjacency list: predecessor index → dependent indices
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); units.len()];
    let mut in_degree: Vec<usize> = vec![0; units.len()];
    for (i, unit) in units.iter().enumerate() {
        for dep in &unit.depends_on {
            let &p = position
                .get(dep)
                .ok_or_else(|| RegistryError::UnknownPredecessor {
                    unit: unit.name.0.clone(),
                    predecessor: dep.0.clone(),
                })?;
            dependents[p].push(i);
            in_degree[i] += 1;
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, &deg)| deg == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut sorted = Vec::with_capacity(units.len());
    while let Some(Reverse(i)) = ready.pop() {
        sorted.push(i);
        for &d in &dependents[i] {
            in_degree[d] -= 1;
            if in_degree[d] == 0 {
                ready.push(Reverse(d));
            }
        }
    }

    if sorted.len() < units.len() {
        let cycled = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &deg)| deg > 0)
            .map(|(i, _)| units[i].name.0.clone())
            .collect();
        return Err(RegistryError::CyclicDependency { units: cycled });
    }

    let mut slots: Vec<Option<Unit>> = units.into_iter().map(Some).collect();
    Ok(sorted.into_iter().filter_map(|i| slots[i].take()).collect())
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, RegistryError> {
    dirs::home_dir().ok_or(RegistryError::HomeNotFound)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CleanupTables;

    fn doc(units: Vec<Unit>) -> RegistryDocument {
        RegistryDocument {
            units,
            ..Default::default()
        }
    }

    fn names(units: &[Unit]) -> Vec<&str> {
        units.iter().map(|u| u.name.as_str()).collect()
    }

    #[test]
    fn valid_declared_order_is_preserved() {
        let reg = Registry::from_document(doc(vec![
            Unit::new("a", UnitKind::Operator),
            Unit::new("x", UnitKind::Operator),
            Unit::new("b", UnitKind::Instance).depends_on("a"),
        ]))
        .expect("registry");
        assert_eq!(names(reg.sync_order()), vec!["a", "x", "b"]);
    }

    #[test]
    fn predecessors_declared_late_are_moved_forward() {
        let reg = Registry::from_document(doc(vec![
            Unit::new("instance", UnitKind::Instance).depends_on("operator"),
            Unit::new("operator", UnitKind::Operator),
        ]))
        .expect("registry");
        assert_eq!(names(reg.sync_order()), vec!["operator", "instance"]);
    }

    #[test]
    fn cycle_is_rejected_with_members() {
        let err = Registry::from_document(doc(vec![
            Unit::new("root", UnitKind::Operator),
            Unit::new("a", UnitKind::Operator).depends_on("b"),
            Unit::new("b", UnitKind::Operator).depends_on("a"),
        ]))
        .unwrap_err();
        match err {
            RegistryError::CyclicDependency { units } => {
                assert_eq!(units, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let err = Registry::from_document(doc(vec![
            Unit::new("a", UnitKind::Operator).depends_on("a")
        ]))
        .unwrap_err();
        assert!(matches!(err, RegistryError::CyclicDependency { .. }));
    }

    #[test]
    fn unknown_predecessor_is_rejected() {
        let err = Registry::from_document(doc(vec![
            Unit::new("a", UnitKind::Operator).depends_on("ghost")
        ]))
        .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownPredecessor { .. }));
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn duplicate_unit_is_rejected() {
        let err = Registry::from_document(doc(vec![
            Unit::new("a", UnitKind::Operator),
            Unit::new("a", UnitKind::Instance),
        ]))
        .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateUnit(name) if name == "a"));
    }

    #[test]
    fn cleanup_order_is_reverse_plus_extras() {
        let mut d = doc(vec![
            Unit::new("a", UnitKind::Operator),
            Unit::new("b", UnitKind::Instance).depends_on("a"),
        ]);
        d.cleanup = CleanupTables {
            extra_units: vec![UnitName::from("aggregate")],
            ..Default::default()
        };
        let reg = Registry::from_document(d).expect("registry");
        let cleanup: Vec<&str> = reg.cleanup_order().iter().map(|u| u.name.as_str()).collect();
        assert_eq!(cleanup, vec!["b", "a", "aggregate"]);
        assert!(reg.contains("aggregate"));
        assert!(reg.unit("aggregate").is_err());
    }

    #[test]
    fn unknown_unit_lookup_fails() {
        let reg = Registry::from_document(doc(vec![Unit::new("a", UnitKind::Operator)]))
            .expect("registry");
        let err = reg.readiness_signal("nope").unwrap_err();
        assert!(matches!(err, RegistryError::UnknownUnit(ref n) if n == "nope"));
    }

    #[test]
    fn builtin_registry_parses_and_orders() {
        let reg = Registry::builtin().expect("builtin");
        let order = names(reg.sync_order());
        let pos = |n: &str| order.iter().position(|x| *x == n).expect(n);
        assert!(pos("nfd-operator") < pos("nfd-instance"));
        assert!(pos("rhoai-operator") < pos("rhoai-dsci"));
        assert!(pos("gpu-cluster-policy") < pos("rhoai-dsc"));
        assert!(!reg.managed_namespaces().is_empty());
    }

    #[test]
    fn default_path_is_under_dot_convoy() {
        let path = default_path_at(Path::new("/home/op"));
        assert!(path.ends_with(".convoy/registry.yaml"));
    }

    #[test]
    fn home_not_found_error_message() {
        assert!(RegistryError::HomeNotFound.to_string().contains("home directory"));
    }
}
