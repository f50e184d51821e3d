use convoy_cluster::{
    fake::{objects, Call, FakeCluster, ObjectKey},
    ClusterClient, DeleteOptions, Executor, LiveExecutor, LogOnlyExecutor,
};
use convoy_core::ResourceRef;
use serde_json::json;

const APPS: &str = "applications.argoproj.io";

fn app(name: &str) -> ResourceRef {
    ResourceRef::new(APPS, name, Some("openshift-gitops"))
}

#[test]
fn live_executor_mutates_cluster() {
    let cluster = FakeCluster::new();
    let key = cluster.insert(APPS, objects::application("openshift-gitops", "a", "OutOfSync", "Missing"));
    let exec = LiveExecutor::new(&cluster);

    exec.annotate(&app("a"), "argocd.argoproj.io/refresh", "hard").unwrap();
    exec.patch(&app("a"), &json!({ "spec": { "syncPolicy": { "automated": { "prune": true } } } }))
        .unwrap();

    let obj = cluster.object(&key).expect("still present");
    assert_eq!(
        convoy_cluster::extract_field(&obj, r".metadata.annotations.argocd\.argoproj\.io/refresh"),
        "hard"
    );
    assert_eq!(convoy_cluster::extract_field(&obj, ".spec.syncPolicy.automated.prune"), "true");
    assert!(!exec.is_dry_run());
}

#[test]
fn delete_of_absent_resource_is_success_twice() {
    let cluster = FakeCluster::new();
    let key = cluster.insert(APPS, objects::application("openshift-gitops", "a", "Synced", "Healthy"));
    let exec = LiveExecutor::new(&cluster);

    exec.delete(&app("a"), &DeleteOptions::cascading()).expect("first delete");
    assert!(!cluster.exists(&key));
    exec.delete(&app("a"), &DeleteOptions::cascading()).expect("second delete is a no-op");
}

#[test]
fn log_only_executor_leaves_cluster_untouched() {
    let cluster = FakeCluster::new();
    let key = cluster.insert(APPS, objects::application("openshift-gitops", "a", "Synced", "Healthy"));
    let exec = LogOnlyExecutor::new();

    exec.delete(&app("a"), &DeleteOptions::force()).unwrap();
    exec.apply(std::path::Path::new("bootstrap/")).unwrap();

    assert!(cluster.exists(&key));
    assert!(cluster.mutations().is_empty());
    assert_eq!(exec.planned().len(), 2);
}

#[test]
fn reads_are_logged_with_keys() {
    let cluster = FakeCluster::new();
    cluster.get_resource(&app("x")).unwrap();
    assert_eq!(
        cluster.calls(),
        vec![Call::Get(ObjectKey::new(APPS, "x", Some("openshift-gitops")))]
    );
}
