//! [`ClusterClient`] backed by the `oc` / `kubectl` CLI.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::Value;

use convoy_core::ResourceRef;

use crate::client::{ClusterClient, DeleteOptions};
use crate::error::ClusterError;

/// Binaries tried in order by [`KubectlClient::discover`].
pub const DEFAULT_BINARIES: &[&str] = &["oc", "kubectl"];

/// Shells out to a cluster CLI with `-o json` and parses its output.
#[derive(Debug, Clone)]
pub struct KubectlClient {
    binary: PathBuf,
}

impl KubectlClient {
    /// Use the first of `oc`, `kubectl` found on `$PATH`.
    pub fn discover() -> Result<Self, ClusterError> {
        for name in DEFAULT_BINARIES {
            if let Ok(binary) = which::which(name) {
                return Ok(Self { binary });
            }
        }
        Err(ClusterError::BinaryNotFound {
            tried: DEFAULT_BINARIES.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Use an explicit binary name or path.
    pub fn with_binary(name: &str) -> Result<Self, ClusterError> {
        which::which(name)
            .map(|binary| Self { binary })
            .map_err(|_| ClusterError::BinaryNotFound {
                tried: vec![name.to_string()],
            })
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn run(&self, args: &[String]) -> Result<String, ClusterError> {
        let program = self.binary.display().to_string();
        tracing::debug!(program = %program, args = %args.join(" "), "cluster call");
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .map_err(|source| ClusterError::Spawn {
                program: program.clone(),
                source,
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.contains("NotFound") || stderr.contains("not found") {
                return Err(ClusterError::NotFound {
                    resource: args.get(1..3).map(|a| a.join("/")).unwrap_or_default(),
                });
            }
            return Err(ClusterError::CommandFailed {
                program,
                args: args.join(" "),
                stderr,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn target_args(verb: &str, target: &ResourceRef) -> Vec<String> {
    let mut args = vec![verb.to_string(), target.kind.clone(), target.name.clone()];
    if let Some(ns) = target.namespace() {
        args.push("-n".to_string());
        args.push(ns.to_string());
    }
    args
}

/// `-k` for a kustomization directory, `-f` otherwise.
fn apply_flag(path: &Path) -> &'static str {
    if path.join("kustomization.yaml").exists() {
        "-k"
    } else {
        "-f"
    }
}

impl ClusterClient for KubectlClient {
    fn get_resource(&self, target: &ResourceRef) -> Result<Option<Value>, ClusterError> {
        let mut args = target_args("get", target);
        args.extend(["-o".to_string(), "json".to_string(), "--ignore-not-found".to_string()]);
        let stdout = self.run(&args)?;
        if stdout.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&stdout)?))
    }

    fn list_resources(
        &self,
        kind: &str,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<Value>, ClusterError> {
        let mut args = vec!["get".to_string(), kind.to_string()];
        match namespace {
            Some(ns) => args.extend(["-n".to_string(), ns.to_string()]),
            None => args.push("--all-namespaces".to_string()),
        }
        if let Some(selector) = label_selector {
            args.extend(["-l".to_string(), selector.to_string()]);
        }
        args.extend(["-o".to_string(), "json".to_string()]);
        let stdout = self.run(&args)?;
        if stdout.trim().is_empty() {
            return Ok(vec![]);
        }
        let list: Value = serde_json::from_str(&stdout)?;
        Ok(list
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    fn patch_resource(&self, target: &ResourceRef, patch: &Value) -> Result<(), ClusterError> {
        let mut args = target_args("patch", target);
        args.extend([
            "--type=merge".to_string(),
            "-p".to_string(),
            serde_json::to_string(patch)?,
        ]);
        self.run(&args).map(|_| ())
    }

    fn delete_resource(
        &self,
        target: &ResourceRef,
        opts: &DeleteOptions,
    ) -> Result<(), ClusterError> {
        let mut args = target_args("delete", target);
        args.push("--ignore-not-found".to_string());
        args.push("--wait=false".to_string());
        args.push(format!("--cascade={}", opts.cascade));
        if let Some(grace) = opts.grace_period {
            args.push(format!("--grace-period={grace}"));
            if grace == 0 {
                args.push("--force".to_string());
            }
        }
        match self.run(&args) {
            Err(err) if err.is_not_found() => Ok(()),
            other => other.map(|_| ()),
        }
    }

    fn apply_manifest(&self, path: &Path) -> Result<(), ClusterError> {
        let args = vec![
            "apply".to_string(),
            apply_flag(path).to_string(),
            path.display().to_string(),
        ];
        self.run(&args).map(|_| ())
    }

    fn annotate(&self, target: &ResourceRef, key: &str, value: &str) -> Result<(), ClusterError> {
        let mut args = target_args("annotate", target);
        args.push(format!("{key}={value}"));
        args.push("--overwrite".to_string());
        self.run(&args).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_args_include_namespace_when_present() {
        let r = ResourceRef::new("applications.argoproj.io", "nfd", Some("openshift-gitops"));
        assert_eq!(
            target_args("get", &r),
            vec!["get", "applications.argoproj.io", "nfd", "-n", "openshift-gitops"]
        );
        let cluster_scoped = ResourceRef::new("customresourcedefinitions", "widgets.example.io", None);
        assert_eq!(target_args("delete", &cluster_scoped).len(), 3);
    }

    #[test]
    fn unknown_binary_is_reported() {
        let err = KubectlClient::with_binary("convoy-definitely-not-a-binary").unwrap_err();
        assert!(matches!(err, ClusterError::BinaryNotFound { .. }));
        assert!(err.to_string().contains("convoy-definitely-not-a-binary"));
    }

    #[test]
    fn kustomization_dirs_are_applied_with_k() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        assert_eq!(apply_flag(dir.path()), "-f");
        std::fs::write(dir.path().join("kustomization.yaml"), "resources: []\n").expect("write");
        assert_eq!(apply_flag(dir.path()), "-k");
    }

    #[cfg(unix)]
    fn stub_cli(dir: &tempfile::TempDir) -> KubectlClient {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("oc-stub");
        let script = r#"#!/bin/sh
case "$1" in
  get)
    if [ "$3" = "present" ]; then
      echo '{"metadata":{"name":"present"},"status":{"phase":"Succeeded"}}'
    fi
    ;;
  delete)
    echo 'Error from server (NotFound): applications "gone" not found' >&2
    exit 1
    ;;
  patch)
    echo 'error: admission webhook denied the request' >&2
    exit 1
    ;;
esac
"#;
        std::fs::write(&path, script).expect("write stub");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
        KubectlClient::with_binary(path.to_str().expect("utf-8 path")).expect("stub client")
    }

    #[cfg(unix)]
    #[test]
    fn get_maps_empty_output_to_absent() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let client = stub_cli(&dir);
        let present = client
            .get_resource(&ResourceRef::new("applications", "present", Some("gitops")))
            .expect("get");
        assert_eq!(
            present.as_ref().map(|o| crate::extract_field(o, ".status.phase")),
            Some("Succeeded".to_string())
        );
        let absent = client
            .get_resource(&ResourceRef::new("applications", "absent", Some("gitops")))
            .expect("get");
        assert!(absent.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn delete_of_absent_resource_succeeds_but_other_failures_surface() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let client = stub_cli(&dir);
        let gone = ResourceRef::new("applications", "gone", Some("gitops"));
        client
            .delete_resource(&gone, &DeleteOptions::default())
            .expect("absent delete is success");

        let err = client
            .patch_resource(&gone, &serde_json::json!({}))
            .unwrap_err();
        assert!(matches!(err, ClusterError::CommandFailed { .. }));
    }
}
