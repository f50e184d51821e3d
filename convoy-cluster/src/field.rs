//! Structured field extraction from cluster objects.
//!
//! Expressions use the subset of kubectl JSONPath the orchestrators need:
//! `.status.phase`, `{.status.sync.status}`, `.status.conditions[0].type`,
//! and `\.` to escape dots inside keys (`.metadata.annotations.a\.b/c`).

use serde_json::Value;

pub static NAME_POINTER: &str = "/metadata/name";
pub static NAMESPACE_POINTER: &str = "/metadata/namespace";
pub static FINALIZERS_POINTER: &str = "/metadata/finalizers";
pub static DELETION_TIMESTAMP_POINTER: &str = "/metadata/deletionTimestamp";

/// Extract the value at `expr`, rendered as a string. Missing paths and
/// `null` yield the empty string.
pub fn extract_field(object: &Value, expr: &str) -> String {
    let found = to_pointer(expr).and_then(|pointer| object.pointer(&pointer));
    match found {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => other.to_string(),
    }
}

pub fn object_name(object: &Value) -> Option<&str> {
    object.pointer(NAME_POINTER).and_then(Value::as_str)
}

pub fn object_namespace(object: &Value) -> Option<&str> {
    object.pointer(NAMESPACE_POINTER).and_then(Value::as_str)
}

pub fn finalizers(object: &Value) -> Vec<String> {
    object
        .pointer(FINALIZERS_POINTER)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

pub fn is_terminating(object: &Value) -> bool {
    object
        .pointer(DELETION_TIMESTAMP_POINTER)
        .is_some_and(|v| !v.is_null())
}

/// Translate a JSONPath-like expression into a JSON pointer.
fn to_pointer(expr: &str) -> Option<String> {
    let expr = expr.trim();
    let expr = expr
        .strip_prefix('{')
        .and_then(|e| e.strip_suffix('}'))
        .unwrap_or(expr);
    let expr = expr.strip_prefix('.').unwrap_or(expr);
    if expr.is_empty() {
        return Some(String::new());
    }

    let mut pointer = String::new();
    let mut segment = String::new();
    let mut chars = expr.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'.') => {
                segment.push('.');
                chars.next();
            }
            '.' => push_segment(&mut pointer, &mut segment),
            '[' => {
                push_segment(&mut pointer, &mut segment);
                let mut index = String::new();
                for d in chars.by_ref() {
                    if d == ']' {
                        break;
                    }
                    index.push(d);
                }
                index.parse::<usize>().ok()?;
                pointer.push('/');
                pointer.push_str(&index);
            }
            other => segment.push(other),
        }
    }
    push_segment(&mut pointer, &mut segment);
    Some(pointer)
}

fn push_segment(pointer: &mut String, segment: &mut String) {
    if segment.is_empty() {
        return;
    }
    pointer.push('/');
    pointer.push_str(&segment.replace('~', "~0").replace('/', "~1"));
    segment.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn app() -> Value {
        json!({
            "metadata": {
                "name": "nfd-operator",
                "namespace": "openshift-gitops",
                "annotations": { "argocd.argoproj.io/refresh": "hard" },
                "finalizers": ["resources-finalizer.argocd.argoproj.io"]
            },
            "spec": { "approved": false },
            "status": {
                "sync": { "status": "Synced" },
                "health": { "status": "Progressing" },
                "conditions": [ { "type": "SyncError" } ],
                "replicas": 3
            }
        })
    }

    #[rstest]
    #[case(".status.sync.status", "Synced")]
    #[case("{.status.health.status}", "Progressing")]
    #[case(".status.conditions[0].type", "SyncError")]
    #[case(".status.replicas", "3")]
    #[case(".spec.approved", "false")]
    #[case(r".metadata.annotations.argocd\.argoproj\.io/refresh", "hard")]
    #[case(".status.operationState.phase", "")]
    #[case(".status.conditions[7].type", "")]
    #[case(".status.conditions[x]", "")]
    fn extracts(#[case] expr: &str, #[case] expected: &str) {
        assert_eq!(extract_field(&app(), expr), expected);
    }

    #[test]
    fn objects_render_as_json() {
        assert_eq!(extract_field(&app(), ".status.sync"), r#"{"status":"Synced"}"#);
    }

    #[test]
    fn metadata_helpers() {
        let obj = app();
        assert_eq!(object_name(&obj), Some("nfd-operator"));
        assert_eq!(object_namespace(&obj), Some("openshift-gitops"));
        assert_eq!(finalizers(&obj), vec!["resources-finalizer.argocd.argoproj.io"]);
        assert!(!is_terminating(&obj));
    }
}
