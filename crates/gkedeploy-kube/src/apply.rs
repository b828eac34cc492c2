//! Validate-then-apply of rendered manifests
//!
//! Both manifests are dry-run applied before either is applied for real, so a
//! validation failure leaves the cluster untouched. The secret manifest is
//! always applied with its stderr captured into a private buffer; its failures
//! surface only as [`KubeError::SecretApplyFailed`].

use std::path::Path;

use tracing::info;

use crate::error::Result;
use crate::kubectl::{ApplyMode, DryRunFlag, Kubectl};
use crate::runner::{CommandRunner, OutputBuffer, Sink};

/// Applies the resource and secret manifests of one run
pub struct ManifestApplier<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    kubectl: &'a Kubectl,
    dry_run_flag: DryRunFlag,
    server_side: bool,
    dry_run: bool,
    secret_stderr: OutputBuffer,
}

impl<'a, R: CommandRunner + ?Sized> ManifestApplier<'a, R> {
    pub fn new(runner: &'a R, kubectl: &'a Kubectl, dry_run_flag: DryRunFlag) -> Self {
        Self {
            runner,
            kubectl,
            dry_run_flag,
            server_side: false,
            dry_run: false,
            secret_stderr: OutputBuffer::new(),
        }
    }

    /// Use server-side apply for the real apply
    pub fn server_side(mut self, server_side: bool) -> Self {
        self.server_side = server_side;
        self
    }

    /// Treat the whole run as a dry run: only dry-run applies are issued
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Captured stderr of the secret manifest applies
    ///
    /// May contain secret values; never print it.
    pub fn secret_stderr(&self) -> &OutputBuffer {
        &self.secret_stderr
    }

    /// Validate, then apply, the given manifests
    pub fn apply(&self, resource: Option<&Path>, secret: Option<&Path>) -> Result<()> {
        info!("Validating Kubernetes manifests with a dry-run");

        if !self.dry_run {
            let validate = ApplyMode::DryRun(self.dry_run_flag);
            if let Some(path) = resource {
                self.apply_resource(validate, path)?;
            }
            if let Some(path) = secret {
                self.apply_secret(validate, path)?;
            }

            info!("Applying Kubernetes manifests to the cluster");
        }

        let mode = ApplyMode::for_run(self.dry_run, self.dry_run_flag, self.server_side);
        if let Some(path) = resource {
            self.apply_resource(mode, path)?;
        }
        if let Some(path) = secret {
            self.apply_secret(mode, path)?;
        }

        Ok(())
    }

    fn apply_resource(&self, mode: ApplyMode, path: &Path) -> Result<()> {
        self.runner.run(self.kubectl.command().args(mode.args(path)))
    }

    fn apply_secret(&self, mode: ApplyMode, path: &Path) -> Result<()> {
        let invocation = self
            .kubectl
            .command()
            .args(mode.args(path))
            .stderr(Sink::Buffer(self.secret_stderr.clone()));

        self.runner.run(invocation).map_err(|e| e.redacted())
    }
}
