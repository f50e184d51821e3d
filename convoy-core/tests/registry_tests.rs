//! Registry load error-message, file-resolution, and ordering integration tests.

use assert_fs::prelude::*;
use convoy_core::{registry, ReadinessSignal, Registry, RegistryError, UnitKind};
use predicates::prelude::predicate;
use rstest::rstest;

const THREE_UNITS: &str = r#"
units:
  - name: widgets-operator
    kind: operator
    gate_namespace: widgets
  - name: widgets-instance
    kind: instance
    depends_on: [widgets-operator]
    readiness:
      type: crd
      name: widgets.example.io
  - name: widgets-dashboard
    kind: config
    depends_on: [widgets-instance]
cleanup:
  extra_units: [widgets-aggregate]
  managed_namespaces: [widgets]
"#;

// ---------------------------------------------------------------------------
// 1. Load error messages
// ---------------------------------------------------------------------------

#[test]
fn load_missing_registry_returns_not_found() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let path = registry::default_path_at(home.path());
    let err = Registry::load_at(&path).unwrap_err();
    assert!(matches!(err, RegistryError::RegistryNotFound { .. }), "got: {err}");
    assert!(err.to_string().contains("registry.yaml"));
}

#[test]
fn load_corrupt_yaml_returns_parse_error_with_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let file = home.child("units.yaml");
    file.write_str(": : corrupt : yaml : !!!\n  - broken: [unclosed")
        .expect("write");

    let err = Registry::load_at(file.path()).unwrap_err();
    assert!(matches!(err, RegistryError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("units.yaml"));
}

#[rstest]
#[case::list_instead_of_mapping("- a\n- b\n")]
#[case::missing_units("profile: {}\n")]
#[case::bad_kind("units:\n  - name: a\n    kind: daemon\n")]
#[case::bad_signal("units:\n  - name: a\n    readiness: {type: telepathy}\n")]
fn malformed_documents_return_parse_error(#[case] yaml: &str) {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let file = home.child("units.yaml");
    file.write_str(yaml).expect("write");
    let err = Registry::load_at(file.path()).unwrap_err();
    assert!(matches!(err, RegistryError::Parse { .. }), "got: {err}");
}

// ---------------------------------------------------------------------------
// 2. Resolution
// ---------------------------------------------------------------------------

#[test]
fn home_registry_takes_precedence_over_builtin() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".convoy/registry.yaml")
        .write_str(THREE_UNITS)
        .expect("write");
    home.child(".convoy/registry.yaml")
        .assert(predicate::path::exists());

    let reg = Registry::load_or_builtin_at(home.path()).expect("load");
    assert_eq!(reg.sync_order().len(), 3);
    assert_eq!(reg.sync_order()[0].name.as_str(), "widgets-operator");
}

#[test]
fn builtin_used_when_home_registry_absent() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let reg = Registry::load_or_builtin_at(home.path()).expect("load");
    assert!(reg.contains("rhoai-operator"));
    assert!(reg.contains("rhoai-config"));
}

// ---------------------------------------------------------------------------
// 3. Queries
// ---------------------------------------------------------------------------

#[test]
fn queries_reflect_document() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let file = home.child("units.yaml");
    file.write_str(THREE_UNITS).expect("write");
    let reg = Registry::load_at(file.path()).expect("load");

    assert_eq!(reg.unit("widgets-dashboard").expect("unit").kind, UnitKind::Config);
    assert_eq!(
        reg.readiness_signal("widgets-instance").expect("signal"),
        Some(&ReadinessSignal::Crd {
            name: "widgets.example.io".to_string()
        })
    );
    assert_eq!(reg.readiness_signal("widgets-operator").expect("signal"), None);
    assert_eq!(reg.managed_namespaces(), ["widgets".to_string()]);
    assert_eq!(reg.profile().namespace, "openshift-gitops");
}

#[test]
fn cleanup_order_is_exact_reverse_of_sync_order_plus_extras() {
    for reg in [
        Registry::builtin().expect("builtin"),
        Registry::from_yaml(THREE_UNITS, std::path::Path::new("inline")).expect("inline"),
    ] {
        let mut expected: Vec<String> = reg
            .sync_order()
            .iter()
            .rev()
            .map(|u| u.name.0.clone())
            .collect();
        let cleanup: Vec<String> = reg.cleanup_order().iter().map(|u| u.name.0.clone()).collect();
        let extras = cleanup[expected.len()..].to_vec();
        expected.extend(extras.iter().cloned());
        assert_eq!(cleanup, expected);
        assert!(extras.iter().all(|e| reg.unit(e).is_err()));
    }
}

#[test]
fn every_predecessor_precedes_its_dependent_in_builtin() {
    let reg = Registry::builtin().expect("builtin");
    let order: Vec<&str> = reg.sync_order().iter().map(|u| u.name.as_str()).collect();
    for (i, unit) in reg.sync_order().iter().enumerate() {
        for dep in &unit.depends_on {
            let p = order.iter().position(|n| *n == dep.as_str()).expect("dep present");
            assert!(p < i, "{} must precede {}", dep, unit.name);
        }
    }
}
