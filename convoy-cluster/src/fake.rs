//! In-memory [`ClusterClient`] for orchestrator tests.
//!
//! Time in the fake cluster is measured in reads: every `get_resource` /
//! `list_resources` call first applies the scheduled transitions that are
//! due, then answers. `insert_after_reads(0, ..)` is visible immediately,
//! `insert_after_reads(3, ..)` becomes visible on the fourth read.
//!
//! Deletion honours finalizers only for keys registered with
//! [`FakeCluster::block_deletion`]: such objects get a deletion timestamp
//! and stay until a patch clears `metadata.finalizers`.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde_json::{json, Map, Value};

use convoy_core::ResourceRef;

use crate::client::{ClusterClient, DeleteOptions};
use crate::error::ClusterError;
use crate::field::{self, DELETION_TIMESTAMP_POINTER};

/// Identity of an object in the fake store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn new(kind: &str, name: &str, namespace: Option<&str>) -> Self {
        Self {
            kind: kind.to_string(),
            namespace: namespace.map(str::to_owned),
            name: name.to_string(),
        }
    }
}

impl From<&ResourceRef> for ObjectKey {
    fn from(r: &ResourceRef) -> Self {
        Self::new(&r.kind, &r.name, r.namespace())
    }
}

/// Every call made against the fake cluster, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Get(ObjectKey),
    List { kind: String, namespace: Option<String> },
    Patch { key: ObjectKey, patch: Value },
    Delete { key: ObjectKey, opts: DeleteOptions },
    Annotate { key: ObjectKey, annotation: String, value: String },
    Apply(PathBuf),
}

impl Call {
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Call::Get(_) | Call::List { .. })
    }

    pub fn key(&self) -> Option<&ObjectKey> {
        match self {
            Call::Get(key)
            | Call::Patch { key, .. }
            | Call::Delete { key, .. }
            | Call::Annotate { key, .. } => Some(key),
            Call::List { .. } | Call::Apply(_) => None,
        }
    }
}

enum Transition {
    Insert(ObjectKey, Value),
    Remove(ObjectKey),
    Patch(ObjectKey, Value),
}

#[derive(Default)]
struct State {
    objects: BTreeMap<ObjectKey, Value>,
    reads: u64,
    scheduled: Vec<(u64, Transition)>,
    calls: Vec<Call>,
    blocked_deletion: HashSet<ObjectKey>,
    converge_on_refresh: HashSet<ObjectKey>,
    failing_kinds: HashSet<String>,
}

impl State {
    fn tick(&mut self) {
        let reads = self.reads;
        let (due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.scheduled)
            .into_iter()
            .partition(|(at, _)| *at <= reads);
        self.scheduled = pending;
        for (_, transition) in due {
            match transition {
                Transition::Insert(key, obj) => {
                    self.objects.insert(key, obj);
                }
                Transition::Remove(key) => {
                    self.objects.remove(&key);
                }
                Transition::Patch(key, patch) => {
                    if let Some(obj) = self.objects.get_mut(&key) {
                        merge_patch(obj, &patch);
                    }
                }
            }
        }
        self.reads += 1;
    }

    fn check_kind(&self, kind: &str) -> Result<(), ClusterError> {
        if self.failing_kinds.contains(kind) {
            return Err(ClusterError::Rejected(format!("{kind} is unavailable")));
        }
        Ok(())
    }
}

/// Scriptable in-memory cluster.
#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<State>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // -- scripting --

    /// Store `object` under `kind`; name and namespace come from its metadata.
    pub fn insert(&self, kind: &str, object: Value) -> ObjectKey {
        self.insert_after_reads(0, kind, object)
    }

    pub fn insert_after_reads(&self, reads: u64, kind: &str, object: Value) -> ObjectKey {
        let key = key_of(kind, &object);
        let mut state = self.state();
        if reads == 0 {
            state.objects.insert(key.clone(), object);
        } else {
            let at = state.reads + reads;
            state.scheduled.push((at, Transition::Insert(key.clone(), object)));
        }
        key
    }

    pub fn remove_after_reads(&self, reads: u64, key: &ObjectKey) {
        let mut state = self.state();
        let at = state.reads + reads;
        state.scheduled.push((at, Transition::Remove(key.clone())));
    }

    pub fn patch_after_reads(&self, reads: u64, key: &ObjectKey, patch: Value) {
        let mut state = self.state();
        let at = state.reads + reads;
        state.scheduled.push((at, Transition::Patch(key.clone(), patch)));
    }

    /// Deleting `key` leaves it terminating until its finalizers are cleared.
    pub fn block_deletion(&self, key: &ObjectKey) {
        self.state().blocked_deletion.insert(key.clone());
    }

    /// Annotating `key` reports it Synced + Healthy.
    pub fn converge_on_refresh(&self, key: &ObjectKey) {
        self.state().converge_on_refresh.insert(key.clone());
    }

    /// Every call touching `kind` fails.
    pub fn fail_kind(&self, kind: &str) {
        self.state().failing_kinds.insert(kind.to_string());
    }

    // -- inspection --

    pub fn object(&self, key: &ObjectKey) -> Option<Value> {
        self.state().objects.get(key).cloned()
    }

    pub fn exists(&self, key: &ObjectKey) -> bool {
        self.state().objects.contains_key(key)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn mutations(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutation).collect()
    }

    pub fn reads(&self) -> u64 {
        self.state().reads
    }
}

impl ClusterClient for FakeCluster {
    fn get_resource(&self, target: &ResourceRef) -> Result<Option<Value>, ClusterError> {
        let key = ObjectKey::from(target);
        let mut state = self.state();
        state.tick();
        state.calls.push(Call::Get(key.clone()));
        state.check_kind(&key.kind)?;
        Ok(state.objects.get(&key).cloned())
    }

    fn list_resources(
        &self,
        kind: &str,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<Value>, ClusterError> {
        let mut state = self.state();
        state.tick();
        state.calls.push(Call::List {
            kind: kind.to_string(),
            namespace: namespace.map(str::to_owned),
        });
        state.check_kind(kind)?;
        Ok(state
            .objects
            .iter()
            .filter(|(key, _)| key.kind == kind)
            .filter(|(key, _)| namespace.is_none() || key.namespace.as_deref() == namespace)
            .filter(|(_, obj)| label_selector.map_or(true, |sel| labels_match(obj, sel)))
            .map(|(_, obj)| obj.clone())
            .collect())
    }

    fn patch_resource(&self, target: &ResourceRef, patch: &Value) -> Result<(), ClusterError> {
        let key = ObjectKey::from(target);
        let mut state = self.state();
        state.calls.push(Call::Patch {
            key: key.clone(),
            patch: patch.clone(),
        });
        state.check_kind(&key.kind)?;
        let obj = state
            .objects
            .get_mut(&key)
            .ok_or_else(|| ClusterError::NotFound {
                resource: target.to_string(),
            })?;
        merge_patch(obj, patch);
        let release = field::is_terminating(obj) && field::finalizers(obj).is_empty();
        if release {
            state.objects.remove(&key);
        }
        Ok(())
    }

    fn delete_resource(
        &self,
        target: &ResourceRef,
        opts: &DeleteOptions,
    ) -> Result<(), ClusterError> {
        let key = ObjectKey::from(target);
        let mut state = self.state();
        state.calls.push(Call::Delete {
            key: key.clone(),
            opts: opts.clone(),
        });
        state.check_kind(&key.kind)?;
        let blocked = state.blocked_deletion.contains(&key);
        let Some(obj) = state.objects.get_mut(&key) else {
            return Ok(());
        };
        if blocked && !field::finalizers(obj).is_empty() {
            if let Some(meta) = obj.get_mut("metadata").and_then(Value::as_object_mut) {
                meta.insert("deletionTimestamp".to_string(), json!("2026-01-01T00:00:00Z"));
            }
            debug_assert!(obj.pointer(DELETION_TIMESTAMP_POINTER).is_some());
            return Ok(());
        }
        state.objects.remove(&key);
        Ok(())
    }

    fn apply_manifest(&self, path: &Path) -> Result<(), ClusterError> {
        self.state().calls.push(Call::Apply(path.to_path_buf()));
        Ok(())
    }

    fn annotate(&self, target: &ResourceRef, key: &str, value: &str) -> Result<(), ClusterError> {
        let object_key = ObjectKey::from(target);
        let mut state = self.state();
        state.calls.push(Call::Annotate {
            key: object_key.clone(),
            annotation: key.to_string(),
            value: value.to_string(),
        });
        state.check_kind(&object_key.kind)?;
        let converge = state.converge_on_refresh.contains(&object_key);
        let obj = state
            .objects
            .get_mut(&object_key)
            .ok_or_else(|| ClusterError::NotFound {
                resource: target.to_string(),
            })?;
        merge_patch(obj, &json!({ "metadata": { "annotations": { key: value } } }));
        if converge {
            merge_patch(
                obj,
                &json!({ "status": { "sync": { "status": "Synced" }, "health": { "status": "Healthy" } } }),
            );
        }
        Ok(())
    }
}

/// RFC 7386 JSON merge patch.
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target_map) = target {
        for (k, v) in patch_map {
            if v.is_null() {
                target_map.remove(k);
            } else {
                merge_patch(target_map.entry(k.clone()).or_insert(Value::Null), v);
            }
        }
    }
}

fn key_of(kind: &str, object: &Value) -> ObjectKey {
    ObjectKey::new(
        kind,
        field::object_name(object).unwrap_or_default(),
        field::object_namespace(object),
    )
}

fn labels_match(object: &Value, selector: &str) -> bool {
    selector.split(',').filter(|s| !s.is_empty()).all(|term| {
        let (k, v) = term.split_once('=').unwrap_or((term, ""));
        object
            .pointer("/metadata/labels")
            .and_then(|labels| labels.get(k.trim()))
            .and_then(Value::as_str)
            .is_some_and(|actual| v.is_empty() || actual == v.trim())
    })
}

/// Object constructors shaped like the engine's resources.
pub mod objects {
    use serde_json::{json, Value};

    pub fn named(name: &str, namespace: Option<&str>) -> Value {
        match namespace {
            Some(ns) => json!({ "metadata": { "name": name, "namespace": ns } }),
            None => json!({ "metadata": { "name": name } }),
        }
    }

    /// A unit's remote representation with the given sync / health status.
    pub fn application(namespace: &str, name: &str, sync: &str, health: &str) -> Value {
        json!({
            "metadata": { "name": name, "namespace": namespace },
            "spec": { "destination": { "namespace": name } },
            "status": {
                "sync": { "status": sync },
                "health": { "status": health }
            }
        })
    }

    pub fn failed_application(namespace: &str, name: &str) -> Value {
        let mut app = application(namespace, name, "OutOfSync", "Degraded");
        super::merge_patch(
            &mut app,
            &json!({ "status": { "operationState": { "phase": "Failed", "message": "one or more objects failed to apply" } } }),
        );
        app
    }

    pub fn controller(namespace: &str, name: &str, phase: &str) -> Value {
        json!({
            "metadata": { "name": name, "namespace": namespace },
            "status": { "phase": phase }
        })
    }

    pub fn install_gate(namespace: &str, name: &str, approved: bool) -> Value {
        json!({
            "metadata": { "name": name, "namespace": namespace },
            "spec": { "approved": approved, "approval": "Manual" }
        })
    }

    pub fn with_finalizers(mut object: Value, finalizers: &[&str]) -> Value {
        super::merge_patch(&mut object, &json!({ "metadata": { "finalizers": finalizers } }));
        object
    }
}
