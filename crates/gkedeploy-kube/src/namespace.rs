//! Namespace provisioning

use std::fs;

use gkedeploy_core::{DeployConfig, namespace_manifest};
use tracing::info;

use crate::error::{KubeError, Result};
use crate::kubectl::{ApplyMode, DryRunFlag, Kubectl};
use crate::runner::CommandRunner;

/// Namespace manifest file name inside the staging directory
pub const NAMESPACE_FILE: &str = "namespace.json";

/// Point the kubectl context at the configured namespace and make sure it exists
///
/// Does nothing when no namespace is configured. The Namespace manifest is
/// applied rather than created, so an existing namespace is not an error.
pub fn ensure_namespace<R: CommandRunner + ?Sized>(
    runner: &R,
    kubectl: &Kubectl,
    config: &DeployConfig,
    dry_run_flag: DryRunFlag,
) -> Result<()> {
    let namespace = &config.namespace;
    if namespace.is_empty() {
        return Ok(());
    }

    info!("Configuring kubectl to the {} namespace", namespace);
    runner.run(
        kubectl
            .command()
            .args(["config", "set-context"])
            .arg(config.kube_context())
            .args(["--namespace", namespace.as_str()]),
    )?;

    if !config.create_namespace {
        return Ok(());
    }

    let path = config.staging_dir.join(NAMESPACE_FILE);
    fs::write(&path, namespace_manifest(namespace)).map_err(|source| KubeError::Write {
        what: "namespace resource",
        source,
    })?;

    info!("Ensuring the {} namespace exists", namespace);
    let mode = ApplyMode::for_run(config.dry_run, dry_run_flag, config.server_side);
    runner.run(kubectl.command().args(mode.args(&path)))
}
