//! gkedeploy CLI - render, validate and apply Kubernetes manifests to GKE from CI

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;

use clap::{ArgAction, Parser};
use gkedeploy_core::{
    BuildInfo, DeployConfig, DeployParams, SecretMap, WaitConfig, collect_os_secrets,
    is_secret_os_key,
};
use gkedeploy_kube::{CREDENTIALS_ENV, ProcessRunner, key_path};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

mod display;
mod error;
mod exit_codes;
mod pipeline;

use error::{CliError, Result};

#[derive(Parser)]
#[command(name = "gkedeploy")]
#[command(author = "gkedeploy Contributors")]
#[command(version)]
#[command(
    about = "Render, validate and apply Kubernetes manifests to a GKE cluster",
    long_about = None
)]
struct Cli {
    /// Validate manifests without changing the cluster; no waits
    #[arg(long, env = "PLUGIN_DRY_RUN")]
    dry_run: bool,

    /// Dump template variables (secrets redacted) and the rendered manifest
    #[arg(short, long, env = "PLUGIN_VERBOSE")]
    verbose: bool,

    /// Service-account JSON, raw or base64 encoded (falls back to $TOKEN)
    #[arg(long, env = "PLUGIN_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// GCP project (defaults to the token's project_id)
    #[arg(long, env = "PLUGIN_PROJECT", default_value = "")]
    project: String,

    /// Zone of a zonal cluster
    #[arg(long, env = "PLUGIN_ZONE", default_value = "")]
    zone: String,

    /// Region of a regional cluster
    #[arg(long, env = "PLUGIN_REGION", default_value = "")]
    region: String,

    /// Cluster name
    #[arg(long, env = "PLUGIN_CLUSTER", default_value = "")]
    cluster: String,

    /// Namespace to deploy into
    #[arg(long, env = "PLUGIN_NAMESPACE", default_value = "")]
    namespace: String,

    /// Resource manifest template
    #[arg(long, env = "PLUGIN_TEMPLATE", default_value = ".kube.yml")]
    kube_template: PathBuf,

    /// Secret manifest template
    #[arg(long, env = "PLUGIN_SECRET_TEMPLATE", default_value = ".kube.sec.yml")]
    secret_template: PathBuf,

    /// Do not render or apply the resource template
    #[arg(long, env = "PLUGIN_SKIP_TEMPLATE")]
    skip_template: bool,

    /// Do not render or apply the secret template
    #[arg(long, env = "PLUGIN_SKIP_SECRET_TEMPLATE")]
    skip_secret_template: bool,

    /// Template variables as a JSON object
    #[arg(long, env = "PLUGIN_VARS", default_value = "")]
    vars: String,

    /// Expand $NAME references in string vars from the environment
    #[arg(long, env = "PLUGIN_EXPAND_ENV_VARS")]
    expand_env_vars: bool,

    #[arg(long, env = "DRONE_BUILD_NUMBER", default_value = "")]
    drone_build_number: String,

    #[arg(long, env = "DRONE_COMMIT", default_value = "")]
    drone_commit: String,

    #[arg(long, env = "DRONE_BRANCH", default_value = "")]
    drone_branch: String,

    #[arg(long, env = "DRONE_TAG", default_value = "")]
    drone_tag: String,

    /// Deployments to wait for (comma separated; `kind/name` for other kinds)
    #[arg(long, env = "PLUGIN_WAIT_DEPLOYMENTS", value_delimiter = ',')]
    wait_deployments: Vec<String>,

    /// Rollout wait timeout in seconds, 0 for none
    #[arg(long, env = "PLUGIN_WAIT_SECONDS", default_value_t = 0)]
    wait_seconds: u64,

    /// Jobs to wait for completion (comma separated)
    #[arg(long, env = "PLUGIN_WAIT_JOBS", value_delimiter = ',')]
    wait_jobs: Vec<String>,

    /// Job wait timeout in seconds
    #[arg(long, env = "PLUGIN_WAIT_JOBS_SECONDS", default_value_t = 60)]
    wait_jobs_seconds: u64,

    /// Use kubectl.<version> instead of kubectl, e.g. 1.14
    #[arg(long, env = "PLUGIN_KUBECTL_VERSION", default_value = "")]
    kubectl_version: String,

    /// Installed kubectl versions (space separated)
    #[arg(long, env = "EXTRA_KUBECTL_VERSIONS", value_delimiter = ' ', hide = true)]
    extra_kubectl_versions: Vec<String>,

    /// Use server-side apply and server-side dry-run
    #[arg(long, env = "PLUGIN_SERVER_SIDE")]
    server_side: bool,

    /// Apply a Namespace manifest for the namespace
    #[arg(long, env = "PLUGIN_CREATE_NAMESPACE", default_value_t = true, action = ArgAction::Set)]
    create_namespace: bool,

    /// Directory for rendered manifests and the key file
    #[arg(long, env = "PLUGIN_STAGING_DIR", default_value = "/tmp")]
    staging_dir: PathBuf,
}

impl Cli {
    fn into_params(self) -> DeployParams {
        let token = self
            .token
            .filter(|t| !t.is_empty())
            .or_else(|| std::env::var("TOKEN").ok())
            .unwrap_or_default();

        DeployParams {
            token,
            project: self.project,
            zone: self.zone,
            region: self.region,
            cluster: self.cluster,
            namespace: self.namespace,
            kube_template: self.kube_template,
            secret_template: self.secret_template,
            skip_template: self.skip_template,
            skip_secret_template: self.skip_secret_template,
            vars: self.vars,
            expand_env_vars: self.expand_env_vars,
            build: BuildInfo {
                build_number: self.drone_build_number,
                commit: self.drone_commit,
                branch: self.drone_branch,
                tag: self.drone_tag,
            },
            wait: WaitConfig {
                deployments: self.wait_deployments,
                deployment_seconds: self.wait_seconds,
                jobs: self.wait_jobs,
                job_seconds: self.wait_jobs_seconds,
            },
            kubectl_version: self.kubectl_version,
            extra_kubectl_versions: self.extra_kubectl_versions,
            server_side: self.server_side,
            create_namespace: self.create_namespace,
            dry_run: self.dry_run,
            verbose: self.verbose,
            staging_dir: self.staging_dir,
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "gkedeploy=debug,info"
    } else {
        "gkedeploy=info,info"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(fmt::layer().with_target(false).without_time())
        .init();
}

/// Collect `SECRET_*` variables and remove them from the environment
///
/// Children spawned later must not inherit secret values. Every secret is
/// removed, including one that then fails to collect.
fn take_secrets() -> Result<SecretMap> {
    let env: Vec<(OsString, OsString)> = std::env::vars_os()
        .filter(|(key, _)| is_secret_os_key(key))
        .collect();

    for (key, _) in &env {
        // SAFETY: called from main before any other thread is started
        unsafe { std::env::remove_var(key) };
    }

    Ok(collect_os_secrets(env)?)
}

fn run(config: &DeployConfig) -> Result<()> {
    let secrets = take_secrets()?;

    let runner = ProcessRunner::new().env(
        CREDENTIALS_ENV,
        key_path(&config.staging_dir).to_string_lossy(),
    );

    pipeline::run(config, secrets, &runner, &mut io::stdout())
}

fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() {
                exit_codes::USAGE_ERROR
            } else {
                exit_codes::SUCCESS
            };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    init_tracing(cli.verbose);

    let result = cli
        .into_params()
        .validate()
        .map_err(CliError::from)
        .and_then(|config| run(&config));

    if let Err(err) = result {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}
