//! gkedeploy Kube - cluster-facing steps of a deployment run
//!
//! Everything here talks to the cluster through external `gcloud` and
//! `kubectl` processes, behind the [`CommandRunner`] seam:
//! - **Credentials**: key file lifecycle and cluster credential fetch
//! - **Capability probe**: client version detection and dry-run flag selection
//! - **Namespace**: context switch and idempotent Namespace apply
//! - **Apply**: validate-then-apply of the rendered manifests
//! - **Wait**: sequential rollout and job waits

pub mod apply;
pub mod credentials;
pub mod error;
pub mod kubectl;
pub mod mock;
pub mod namespace;
pub mod runner;
pub mod wait;

pub use apply::ManifestApplier;
pub use credentials::{
    CREDENTIALS_ENV, CredentialFile, GCLOUD, KEY_FILE, fetch_credentials, key_path,
};
pub use error::{KubeError, Result};
pub use kubectl::{ApplyMode, DryRunFlag, Kubectl, KubectlVersion, probe};
pub use mock::MockRunner;
pub use namespace::{NAMESPACE_FILE, ensure_namespace};
pub use runner::{CommandRunner, Invocation, OutputBuffer, ProcessRunner, Sink};
pub use wait::{RolloutTarget, TIMEOUT, TargetKind, wait_for_jobs, wait_for_rollouts};
