//! Service-account key file and cluster credentials

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use gkedeploy_core::DeployConfig;
use tracing::{debug, warn};

use crate::error::{KubeError, Result};
use crate::runner::{CommandRunner, Invocation};

/// Cloud CLI program
pub const GCLOUD: &str = "gcloud";

/// Environment variable pointing child processes at the key file
pub const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";

/// Key file name inside the staging directory
pub const KEY_FILE: &str = "gcloud.json";

/// Where the key file lives for a staging directory
pub fn key_path(staging_dir: &Path) -> PathBuf {
    staging_dir.join(KEY_FILE)
}

/// The service-account key on disk, removed when dropped
///
/// Removal failures only log a warning.
#[derive(Debug)]
pub struct CredentialFile {
    path: PathBuf,
}

impl CredentialFile {
    /// Write `token` to `<staging_dir>/gcloud.json`, readable only by this user
    pub fn create(staging_dir: &Path, token: &str) -> Result<Self> {
        let path = key_path(staging_dir);

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        options
            .open(&path)
            .and_then(|mut file| file.write_all(token.as_bytes()))
            .map_err(|source| KubeError::Write {
                what: "token",
                source,
            })?;
        debug!("wrote key file {}", path.display());

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CredentialFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("error removing token file: {}", e);
        }
    }
}

/// Authenticate gcloud with the key file and fetch kubectl credentials
pub fn fetch_credentials<R: CommandRunner + ?Sized>(
    runner: &R,
    config: &DeployConfig,
    key_file: &CredentialFile,
) -> Result<()> {
    runner.run(
        Invocation::new(GCLOUD)
            .args(["auth", "activate-service-account", "--key-file"])
            .arg(key_file.path().to_string_lossy()),
    )?;

    runner.run(
        Invocation::new(GCLOUD)
            .args(["container", "clusters", "get-credentials"])
            .arg(&config.cluster)
            .args(["--project", config.project.as_str()])
            .args([config.location.flag(), config.location.name()]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRunner;
    use gkedeploy_core::DeployParams;
    use tempfile::TempDir;

    fn config(zone: &str, region: &str) -> DeployConfig {
        DeployParams {
            token: "{}".into(),
            project: "test-project".into(),
            zone: zone.into(),
            region: region.into(),
            cluster: "cluster-0".into(),
            ..DeployParams::default()
        }
        .validate()
        .unwrap()
    }

    #[test]
    fn test_credential_file_lifecycle() {
        let dir = TempDir::new().unwrap();
        let expected = key_path(dir.path());
        let path = {
            let key = CredentialFile::create(dir.path(), r#"{"project_id":"p"}"#).unwrap();
            assert_eq!(fs::read_to_string(key.path()).unwrap(), r#"{"project_id":"p"}"#);
            key.path().to_path_buf()
        };
        assert_eq!(path, expected);
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_credential_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let key = CredentialFile::create(dir.path(), "{}").unwrap();
        let mode = fs::metadata(key.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_drop_after_external_removal_does_not_panic() {
        let dir = TempDir::new().unwrap();
        let key = CredentialFile::create(dir.path(), "{}").unwrap();
        fs::remove_file(key.path()).unwrap();
        drop(key);
    }

    #[test]
    fn test_create_in_missing_dir_fails() {
        let dir = TempDir::new().unwrap();
        let err = CredentialFile::create(&dir.path().join("missing"), "{}").unwrap_err();
        assert!(err.to_string().starts_with("Error writing token file"));
    }

    #[test]
    fn test_fetch_credentials_zonal() {
        let dir = TempDir::new().unwrap();
        let key = CredentialFile::create(dir.path(), "{}").unwrap();
        let mock = MockRunner::new();

        fetch_credentials(&mock, &config("us-east1-b", ""), &key).unwrap();

        let calls = mock.calls();
        assert_eq!(
            calls[0],
            format!(
                "gcloud auth activate-service-account --key-file {}",
                key.path().display()
            )
        );
        assert_eq!(
            calls[1],
            "gcloud container clusters get-credentials cluster-0 --project test-project --zone us-east1-b"
        );
    }

    #[test]
    fn test_fetch_credentials_regional() {
        let dir = TempDir::new().unwrap();
        let key = CredentialFile::create(dir.path(), "{}").unwrap();
        let mock = MockRunner::new();

        fetch_credentials(&mock, &config("", "us-west1"), &key).unwrap();
        assert!(mock.calls()[1].ends_with("--region us-west1"));
    }

    #[test]
    fn test_auth_failure_stops_before_get_credentials() {
        let dir = TempDir::new().unwrap();
        let key = CredentialFile::create(dir.path(), "{}").unwrap();
        let mock = MockRunner::new().fail_on("gcloud auth");

        assert!(fetch_credentials(&mock, &config("us-east1-b", ""), &key).is_err());
        assert_eq!(mock.calls().len(), 1);
    }
}
