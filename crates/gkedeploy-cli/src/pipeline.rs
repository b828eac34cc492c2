//! The deployment run, from variable resolution to rollout waits
//!
//! Each step must succeed before the next one starts. External commands go
//! through the given [`CommandRunner`], which is expected to already carry
//! `GOOGLE_APPLICATION_CREDENTIALS` in its child environment.

use std::io::Write;

use gkedeploy_core::{
    DeployConfig, SecretMap, TemplateData, VarResolver, builtin_vars, parse_vars,
};
use gkedeploy_engine::ManifestRenderer;
use gkedeploy_kube::{
    CommandRunner, CredentialFile, Kubectl, ManifestApplier, ensure_namespace, fetch_credentials,
    probe, wait_for_jobs, wait_for_rollouts,
};
use tracing::{debug, info};

use crate::display::{
    MANIFEST_CAPTION, SECRETS_CAPTION, VARIABLES_CAPTION, dump_data, dump_file,
};
use crate::error::Result;

/// Merge built-in, user and secret variables into the template data views
pub fn resolve_data(config: &DeployConfig, secrets: SecretMap) -> Result<TemplateData> {
    let builtins = builtin_vars(
        &config.build,
        &config.project,
        &config.location,
        &config.cluster,
        &config.namespace,
    );
    let vars = parse_vars(&config.vars)?;

    let resolver = if config.expand_env_vars {
        VarResolver::new().expand_process_env()
    } else {
        VarResolver::new()
    };

    Ok(resolver.resolve(builtins, vars, secrets)?)
}

/// Run one deployment
///
/// `out` receives the verbose dumps.
pub fn run<R: CommandRunner + ?Sized>(
    config: &DeployConfig,
    secrets: SecretMap,
    runner: &R,
    out: &mut dyn Write,
) -> Result<()> {
    // Shadowing and empty secrets are caught before anything is written
    let data = resolve_data(config, secrets)?;

    let key_file = CredentialFile::create(&config.staging_dir, &config.token)?;
    fetch_credentials(runner, config, &key_file)?;

    if config.verbose {
        dump_data(out, VARIABLES_CAPTION, &data.public)?;
        dump_data(out, SECRETS_CAPTION, &data.redacted)?;
    }

    let manifests =
        ManifestRenderer::new(&config.staging_dir).render_all(&config.templates, &data)?;
    for (template, output) in manifests.outputs() {
        debug!("rendered {} to {}", template.display(), output.display());
    }

    if config.verbose {
        if let Some(resource) = &manifests.resource {
            dump_file(out, MANIFEST_CAPTION, &resource.output)?;
        }
    }

    let kubectl = Kubectl::new(&config.kubectl);
    let dry_run_flag = probe(runner, &kubectl, config.server_side);

    ensure_namespace(runner, &kubectl, config, dry_run_flag)?;

    ManifestApplier::new(runner, &kubectl, dry_run_flag)
        .server_side(config.server_side)
        .dry_run(config.dry_run)
        .apply(
            manifests.resource.as_ref().map(|m| m.output.as_path()),
            manifests.secret.as_ref().map(|m| m.output.as_path()),
        )?;

    if config.dry_run {
        info!("Not waiting for rollout, this was a dry-run");
        return Ok(());
    }

    let wait = &config.wait;
    wait_for_rollouts(
        runner,
        &kubectl,
        &wait.deployments,
        &config.namespace,
        wait.deployment_seconds,
    )?;
    wait_for_jobs(runner, &kubectl, &wait.jobs, &config.namespace, wait.job_seconds)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CliError;
    use crate::exit_codes;
    use gkedeploy_core::{DeployParams, WaitConfig, collect_secrets};
    use gkedeploy_kube::{MockRunner, key_path};
    use std::fs;
    use tempfile::TempDir;

    const VERSION_1_21: &str = r#"{"clientVersion": {"major": "1", "minor": "21"}}"#;

    struct Fixture {
        templates: TempDir,
        staging: TempDir,
    }

    impl Fixture {
        fn new(kube: Option<&str>, sec: Option<&str>) -> Self {
            let templates = TempDir::new().unwrap();
            if let Some(contents) = kube {
                fs::write(templates.path().join(".kube.yml"), contents).unwrap();
            }
            if let Some(contents) = sec {
                fs::write(templates.path().join(".kube.sec.yml"), contents).unwrap();
            }
            Self {
                templates,
                staging: TempDir::new().unwrap(),
            }
        }

        fn params(&self) -> DeployParams {
            DeployParams {
                token: r#"{"project_id":"test-project"}"#.into(),
                zone: "us-east1-b".into(),
                cluster: "cluster-0".into(),
                namespace: "Feature/1892-TEST-NS".into(),
                kube_template: self.templates.path().join(".kube.yml"),
                secret_template: self.templates.path().join(".kube.sec.yml"),
                vars: r#"{"key0": "val0"}"#.into(),
                staging_dir: self.staging.path().to_path_buf(),
                wait: WaitConfig {
                    deployments: vec!["app".into()],
                    deployment_seconds: 0,
                    jobs: vec!["migrate".into()],
                    job_seconds: 60,
                },
                ..DeployParams::default()
            }
        }

        fn staged(&self, name: &str) -> String {
            self.staging.path().join(name).display().to_string()
        }
    }

    fn secrets() -> SecretMap {
        collect_secrets([("SECRET_TEST", "test_val")]).unwrap()
    }

    fn run_quiet(config: &DeployConfig, runner: &MockRunner) -> Result<()> {
        run(config, secrets(), runner, &mut Vec::new())
    }

    #[test]
    fn test_full_run_call_order() {
        let fx = Fixture::new(Some("name: {{.key0}}-{{.namespace}}"), Some("s: {{.SECRET_TEST}}"));
        let config = fx.params().validate().unwrap();
        let mock = MockRunner::new().respond("kubectl version", VERSION_1_21);

        run_quiet(&config, &mock).unwrap();

        let kube = fx.staged(".kube.yml");
        let sec = fx.staged(".kube.sec.yml");
        let ns = fx.staged("namespace.json");
        assert_eq!(
            mock.calls(),
            vec![
                format!(
                    "gcloud auth activate-service-account --key-file {}",
                    key_path(fx.staging.path()).display()
                ),
                "gcloud container clusters get-credentials cluster-0 --project test-project --zone us-east1-b".to_string(),
                "kubectl version --client -o=json".to_string(),
                "kubectl config set-context gke_test-project_us-east1-b_cluster-0 --namespace feature-1892-test-ns".to_string(),
                format!("kubectl apply --filename {}", ns),
                format!("kubectl apply --dry-run=client --filename {}", kube),
                format!("kubectl apply --dry-run=client --filename {}", sec),
                format!("kubectl apply --filename {}", kube),
                format!("kubectl apply --filename {}", sec),
                "kubectl rollout status deployment/app --namespace feature-1892-test-ns".to_string(),
                "kubectl wait --for=condition=complete job/migrate --timeout=60s --namespace feature-1892-test-ns".to_string(),
            ]
        );

        assert_eq!(
            fs::read_to_string(&kube).unwrap(),
            "name: val0-feature-1892-test-ns"
        );
        assert_eq!(
            fs::read_to_string(&sec).unwrap(),
            "s: dGVzdF92YWw="
        );
        assert!(!key_path(fx.staging.path()).exists(), "key file is removed after the run");
    }

    #[test]
    fn test_dry_run_skips_real_apply_and_waits() {
        let fx = Fixture::new(Some("a: b"), Some("c: d"));
        let config = DeployParams {
            dry_run: true,
            server_side: true,
            ..fx.params()
        }
        .validate()
        .unwrap();
        let mock = MockRunner::new().respond("kubectl version", VERSION_1_21);

        run_quiet(&config, &mock).unwrap();

        let applies: Vec<String> = mock
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("kubectl apply"))
            .collect();
        assert_eq!(applies.len(), 3);
        assert!(applies.iter().all(|c| c.contains("--dry-run=server")));
        assert_eq!(mock.count("kubectl rollout"), 0);
        assert_eq!(mock.count("kubectl wait"), 0);
    }

    #[test]
    fn test_resource_template_cannot_see_secrets() {
        let fx = Fixture::new(Some("s: {{.SECRET_TEST}}"), None);
        let config = fx.params().validate().unwrap();
        let mock = MockRunner::new();

        let err = run_quiet(&config, &mock).unwrap_err();
        assert!(matches!(err, CliError::Render(_)));
        assert_eq!(err.exit_code(), exit_codes::TEMPLATE_ERROR);
        assert_eq!(mock.count("kubectl"), 0);
    }

    #[test]
    fn test_shadowing_fails_before_any_command() {
        let fx = Fixture::new(Some("a: b"), None);
        let config = DeployParams {
            vars: r#"{"COMMIT": "override"}"#.into(),
            ..fx.params()
        }
        .validate()
        .unwrap();
        let mock = MockRunner::new();

        let err = run_quiet(&config, &mock).unwrap_err();
        assert_eq!(err.exit_code(), exit_codes::VARS_ERROR);
        assert!(mock.calls().is_empty());
        assert!(!key_path(fx.staging.path()).exists());
    }

    #[test]
    fn test_missing_resource_template() {
        let fx = Fixture::new(None, Some("c: d"));
        let config = fx.params().validate().unwrap();
        let mock = MockRunner::new();

        let err = run_quiet(&config, &mock).unwrap_err();
        assert!(err.to_string().starts_with("Error finding template"));
        assert_eq!(mock.count("kubectl"), 0);
    }

    #[test]
    fn test_skipped_resource_template_applies_secret_only() {
        let fx = Fixture::new(None, Some("c: {{.SECRET_TEST}}"));
        let config = DeployParams {
            skip_template: true,
            namespace: String::new(),
            wait: WaitConfig::default(),
            ..fx.params()
        }
        .validate()
        .unwrap();
        let mock = MockRunner::new();

        run_quiet(&config, &mock).unwrap();
        let sec = fx.staged(".kube.sec.yml");
        assert_eq!(
            mock.calls()[3..],
            [
                format!("kubectl apply --dry-run --filename {}", sec),
                format!("kubectl apply --filename {}", sec),
            ]
        );
    }

    #[test]
    fn test_secret_failure_is_redacted() {
        let fx = Fixture::new(Some("a: b"), Some("c: {{.SECRET_TEST}}"));
        let config = fx.params().validate().unwrap();
        let sec = fx.staged(".kube.sec.yml");
        let mock = MockRunner::new().fail_with_stderr(
            &format!("kubectl apply --dry-run --filename {}", sec),
            "dGVzdF92YWw=",
        );

        let err = run_quiet(&config, &mock).unwrap_err();
        assert!(matches!(err, CliError::Redacted { .. }));
        assert!(!err.to_string().contains("dGVzdF92YWw="));
        assert_eq!(
            mock.count("kubectl apply --filename"),
            1,
            "only the namespace apply ran for real"
        );
    }

    #[test]
    fn test_verbose_dumps_redact_secrets() {
        let fx = Fixture::new(Some("name: {{.key0}}"), Some("s: {{.SECRET_TEST}}"));
        let config = DeployParams {
            verbose: true,
            ..fx.params()
        }
        .validate()
        .unwrap();
        let mock = MockRunner::new();
        let mut out = Vec::new();

        run(&config, secrets(), &mock, &mut out).unwrap();

        let text = console::strip_ansi_codes(&String::from_utf8(out).unwrap()).into_owned();
        assert!(text.contains("---START VARIABLES AVAILABLE FOR ALL TEMPLATES---"));
        assert!(text.contains(r#""SECRET_TEST": "VALUE REDACTED""#));
        assert!(text.contains("name: val0"));
        assert!(!text.contains("dGVzdF92YWw="));
        assert!(!text.contains("test_val"));
    }

    #[test]
    fn test_rollout_failure_stops_job_wait() {
        let fx = Fixture::new(Some("a: b"), None);
        let config = fx.params().validate().unwrap();
        let mock = MockRunner::new().fail_on("kubectl rollout status");

        let err = run_quiet(&config, &mock).unwrap_err();
        assert_eq!(err.exit_code(), exit_codes::COMMAND_ERROR);
        assert_eq!(mock.count("kubectl wait"), 0);
    }

    #[test]
    fn test_resolve_data_views() {
        let fx = Fixture::new(None, None);
        let config = fx.params().validate().unwrap();
        let data = resolve_data(&config, secrets()).unwrap();

        assert!(data.public.contains_key("key0"));
        assert!(data.public.contains_key("zone"));
        assert!(!data.public.contains_key("SECRET_TEST"));
        assert!(data.secret.contains_key("SECRET_TEST"));
        assert_eq!(data.redacted["SECRET_TEST"], "VALUE REDACTED");
    }
}
