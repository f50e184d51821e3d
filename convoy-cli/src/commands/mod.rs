pub mod progress;
pub mod status;
pub mod sync;
pub mod teardown;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use convoy_cluster::KubectlClient;
use convoy_core::Registry;

/// Options shared by every subcommand.
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Registry YAML describing the units. Defaults to
    /// `~/.convoy/registry.yaml`, then the builtin RHOAI table.
    #[arg(long, global = true, env = "CONVOY_REGISTRY")]
    pub registry: Option<PathBuf>,

    /// Cluster CLI binary (default: `oc`, then `kubectl`).
    #[arg(long, global = true, env = "CONVOY_CLUSTER_CLI")]
    pub cluster_cli: Option<String>,

    /// Log at debug level (overrides RUST_LOG).
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl GlobalArgs {
    pub fn load_registry(&self) -> Result<Registry> {
        match &self.registry {
            Some(path) => Registry::load_at(path)
                .with_context(|| format!("failed to load registry {}", path.display())),
            None => {
                let home = dirs::home_dir().context("could not determine home directory")?;
                Registry::load_or_builtin_at(&home).context("failed to load registry")
            }
        }
    }

    pub fn cluster_client(&self) -> Result<KubectlClient> {
        let client = match &self.cluster_cli {
            Some(name) => KubectlClient::with_binary(name),
            None => KubectlClient::discover(),
        };
        client.context("no usable cluster CLI")
    }
}
