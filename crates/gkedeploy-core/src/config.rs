//! Run configuration
//!
//! [`DeployParams`] holds the values as supplied by the caller (flags and
//! environment, already parsed). [`DeployParams::validate`] checks them before
//! any external command runs and produces a [`DeployConfig`].

use std::path::PathBuf;

use crate::credentials::{decode_token, project_from_token};
use crate::error::{CoreError, Result};
use crate::namespace::sanitize_namespace;

/// Default kubectl program name
pub const KUBECTL: &str = "kubectl";

/// Build metadata exposed to templates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildInfo {
    pub build_number: String,
    pub commit: String,
    pub branch: String,
    pub tag: String,
}

/// Where the cluster lives: exactly one of zone or region
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterLocation {
    Zone(String),
    Region(String),
}

impl ClusterLocation {
    /// The zone or region name
    pub fn name(&self) -> &str {
        match self {
            ClusterLocation::Zone(name) | ClusterLocation::Region(name) => name,
        }
    }

    /// `--zone` or `--region`, for `gcloud`
    pub fn flag(&self) -> &'static str {
        match self {
            ClusterLocation::Zone(_) => "--zone",
            ClusterLocation::Region(_) => "--region",
        }
    }

    /// Template variable name holding the location
    pub fn var_name(&self) -> &'static str {
        match self {
            ClusterLocation::Zone(_) => "zone",
            ClusterLocation::Region(_) => "region",
        }
    }
}

/// Template sources; `None` means the template is skipped
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplatePaths {
    pub resource: Option<PathBuf>,
    pub secret: Option<PathBuf>,
}

/// Rollout and job wait targets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WaitConfig {
    pub deployments: Vec<String>,
    /// Rollout timeout; 0 waits without a timeout
    pub deployment_seconds: u64,
    pub jobs: Vec<String>,
    pub job_seconds: u64,
}

/// Raw parameters, as parsed from flags and environment
#[derive(Debug, Clone)]
pub struct DeployParams {
    pub token: String,
    pub project: String,
    pub zone: String,
    pub region: String,
    pub cluster: String,
    pub namespace: String,
    pub kube_template: PathBuf,
    pub secret_template: PathBuf,
    pub skip_template: bool,
    pub skip_secret_template: bool,
    pub vars: String,
    pub expand_env_vars: bool,
    pub build: BuildInfo,
    pub wait: WaitConfig,
    pub kubectl_version: String,
    pub extra_kubectl_versions: Vec<String>,
    pub server_side: bool,
    pub create_namespace: bool,
    pub dry_run: bool,
    pub verbose: bool,
    pub staging_dir: PathBuf,
}

impl Default for DeployParams {
    fn default() -> Self {
        Self {
            token: String::new(),
            project: String::new(),
            zone: String::new(),
            region: String::new(),
            cluster: String::new(),
            namespace: String::new(),
            kube_template: PathBuf::from(".kube.yml"),
            secret_template: PathBuf::from(".kube.sec.yml"),
            skip_template: false,
            skip_secret_template: false,
            vars: String::new(),
            expand_env_vars: false,
            build: BuildInfo::default(),
            wait: WaitConfig {
                job_seconds: 60,
                ..WaitConfig::default()
            },
            kubectl_version: String::new(),
            extra_kubectl_versions: Vec::new(),
            server_side: false,
            create_namespace: true,
            dry_run: false,
            verbose: false,
            staging_dir: PathBuf::from("/tmp"),
        }
    }
}

/// Validated configuration for one run
#[derive(Debug, Clone)]
pub struct DeployConfig {
    /// Service-account JSON, already unwrapped from base64 if needed
    pub token: String,
    pub project: String,
    pub location: ClusterLocation,
    pub cluster: String,
    /// Sanitized namespace; empty means no namespace step
    pub namespace: String,
    pub templates: TemplatePaths,
    pub vars: String,
    pub expand_env_vars: bool,
    pub build: BuildInfo,
    pub wait: WaitConfig,
    /// kubectl program to invoke (`kubectl` or `kubectl.<version>`)
    pub kubectl: String,
    pub server_side: bool,
    pub create_namespace: bool,
    pub dry_run: bool,
    pub verbose: bool,
    pub staging_dir: PathBuf,
}

impl DeployConfig {
    /// `gke_<project>_<location>_<cluster>`, the context name gcloud writes
    pub fn kube_context(&self) -> String {
        ["gke", &self.project, self.location.name(), &self.cluster].join("_")
    }
}

impl DeployParams {
    /// Check required params and produce the validated configuration
    pub fn validate(&self) -> Result<DeployConfig> {
        if self.token.is_empty() {
            return Err(CoreError::missing("token"));
        }

        let location = match (self.zone.is_empty(), self.region.is_empty()) {
            (true, true) => {
                return Err(CoreError::missing(
                    "at least one of region or zone must be specified",
                ));
            }
            (false, false) => {
                return Err(CoreError::invalid(
                    "at most one of region or zone may be specified",
                ));
            }
            (false, true) => ClusterLocation::Zone(self.zone.clone()),
            (true, false) => ClusterLocation::Region(self.region.clone()),
        };

        if self.cluster.is_empty() {
            return Err(CoreError::missing("cluster"));
        }

        let kubectl = kubectl_program(&self.kubectl_version, &self.extra_kubectl_versions)?;
        let templates = self.template_paths()?;

        let token = decode_token(&self.token);
        let project = if self.project.is_empty() {
            tracing::info!("Parsing Project ID from credentials");
            project_from_token(&token).ok_or_else(|| CoreError::missing("project"))?
        } else {
            self.project.clone()
        };

        Ok(DeployConfig {
            token,
            project,
            location,
            cluster: self.cluster.clone(),
            namespace: sanitize_namespace(&self.namespace),
            templates,
            vars: self.vars.clone(),
            expand_env_vars: self.expand_env_vars,
            build: self.build.clone(),
            wait: self.wait.clone(),
            kubectl,
            server_side: self.server_side,
            create_namespace: self.create_namespace,
            dry_run: self.dry_run,
            verbose: self.verbose,
            staging_dir: self.staging_dir.clone(),
        })
    }

    /// Apply the skip flags to the configured template paths
    fn template_paths(&self) -> Result<TemplatePaths> {
        if self.skip_template && self.skip_secret_template {
            return Err(CoreError::invalid(
                "skipping both templates ends the plugin execution",
            ));
        }

        let mut paths = TemplatePaths {
            resource: non_empty(&self.kube_template),
            secret: non_empty(&self.secret_template),
        };

        if self.skip_template {
            tracing::warn!("skipping kube-template because it was set to be ignored");
            paths.resource = None;
        }
        if self.skip_secret_template {
            tracing::warn!("skipping secret-template because it was set to be ignored");
            paths.secret = None;
        }

        Ok(paths)
    }
}

fn non_empty(path: &std::path::Path) -> Option<PathBuf> {
    (!path.as_os_str().is_empty()).then(|| path.to_path_buf())
}

/// Resolve the kubectl program for an optional version
///
/// A version selects the `kubectl.<version>` binary and must be one of the
/// versions installed alongside the default one.
pub fn kubectl_program(version: &str, available: &[String]) -> Result<String> {
    if version.is_empty() {
        return Ok(KUBECTL.to_string());
    }

    let available: Vec<&str> = available
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .collect();

    if available.is_empty() {
        return Err(CoreError::invalid(format!(
            "kubectl-version was set to {} but no extra kubectl versions are available",
            version
        )));
    }

    if available.contains(&version) {
        Ok(format!("{}.{}", KUBECTL, version))
    } else {
        Err(CoreError::invalid(format!(
            "kubectl-version {} must be one of {}",
            version,
            available.join(", ")
        )))
    }
}
