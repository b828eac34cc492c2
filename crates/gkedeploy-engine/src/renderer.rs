//! Renders the resource and secret templates into staged manifests
//!
//! Each template is bound to exactly one data view. The resource template is
//! always bound to the public view, so it can never read a secret value.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use gkedeploy_core::{TemplateData, TemplatePaths, VarMap};
use indexmap::IndexMap;
use tracing::warn;

use crate::engine::Engine;
use crate::error::{EngineError, Result};

/// A template path paired with the data view it renders against
#[derive(Debug, Clone, Copy)]
pub struct TemplateBinding<'a> {
    pub path: &'a Path,
    pub data: &'a VarMap,
    /// A missing required template is an error; a missing optional one is skipped
    pub required: bool,
}

/// A rendered manifest and the template it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub source: PathBuf,
    pub output: PathBuf,
}

/// Manifests produced by one render pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedManifests {
    pub resource: Option<Manifest>,
    pub secret: Option<Manifest>,
}

impl RenderedManifests {
    /// Output paths keyed by source template path
    pub fn outputs(&self) -> IndexMap<&Path, &Path> {
        [&self.resource, &self.secret]
            .into_iter()
            .flatten()
            .map(|m| (m.source.as_path(), m.output.as_path()))
            .collect()
    }
}

/// Renders templates into a staging directory
pub struct ManifestRenderer {
    engine: Engine,
    staging_dir: PathBuf,
}

impl ManifestRenderer {
    pub fn new(staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            engine: Engine::default(),
            staging_dir: staging_dir.into(),
        }
    }

    /// Render the configured templates against their data views
    ///
    /// The resource template sees `data.public`; the secret template sees
    /// `data.secret`.
    pub fn render_all(
        &self,
        templates: &TemplatePaths,
        data: &TemplateData,
    ) -> Result<RenderedManifests> {
        let resource = match &templates.resource {
            Some(path) => self.render(TemplateBinding {
                path,
                data: &data.public,
                required: true,
            })?,
            None => None,
        };

        let secret = match &templates.secret {
            Some(path) => self.render(TemplateBinding {
                path,
                data: &data.secret,
                required: false,
            })?,
            None => None,
        };

        Ok(RenderedManifests { resource, secret })
    }

    /// Render a single binding into `<staging>/<template file name>`
    ///
    /// Returns `None` when an optional template does not exist.
    pub fn render(&self, binding: TemplateBinding<'_>) -> Result<Option<Manifest>> {
        let path = binding.path;

        if !path.exists() {
            if binding.required {
                return Err(EngineError::MissingTemplate {
                    path: path.to_path_buf(),
                });
            }
            warn!(
                "skipping optional secret template {} because it was not found",
                path.display()
            );
            return Ok(None);
        }

        let source = fs::read_to_string(path)?;
        let name = path.to_string_lossy();
        let rendered = self.engine.render_string(&source, binding.data, &name)?;

        let file_name = path.file_name().ok_or_else(|| EngineError::MissingTemplate {
            path: path.to_path_buf(),
        })?;
        let output = self.staging_dir.join(file_name);

        write_private(&output, rendered.as_bytes()).map_err(|source| EngineError::Write {
            path: output.clone(),
            source,
        })?;
        Ok(Some(Manifest {
            source: path.to_path_buf(),
            output,
        }))
    }
}

/// Write a file readable only by the current user
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gkedeploy_core::{SecretMap, VarResolver, parse_vars};
    use tempfile::TempDir;

    struct Fixture {
        templates: TempDir,
        staging: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                templates: TempDir::new().unwrap(),
                staging: TempDir::new().unwrap(),
            }
        }

        fn write(&self, name: &str, contents: &str) -> PathBuf {
            let path = self.templates.path().join(name);
            fs::write(&path, contents).unwrap();
            path
        }

        fn paths(&self) -> TemplatePaths {
            TemplatePaths {
                resource: Some(self.templates.path().join(".kube.yml")),
                secret: Some(self.templates.path().join(".kube.sec.yml")),
            }
        }

        fn renderer(&self) -> ManifestRenderer {
            ManifestRenderer::new(self.staging.path())
        }
    }

    fn data() -> TemplateData {
        let builtins = parse_vars(r#"{"COMMIT": "e0f21b90a"}"#).unwrap();
        let vars = parse_vars(r#"{"key0": "val0"}"#).unwrap();
        let mut secrets = SecretMap::new();
        secrets.insert("SECRET_TEST".into(), "test_sec_val".into());
        VarResolver::new().resolve(builtins, vars, secrets).unwrap()
    }

    #[test]
    fn test_missing_resource_template_fails() {
        let fx = Fixture::new();
        let err = fx.renderer().render_all(&fx.paths(), &data()).unwrap_err();
        assert!(matches!(err, EngineError::MissingTemplate { .. }));
    }

    #[test]
    fn test_render_both_templates() {
        let fx = Fixture::new();
        let kube = fx.write(".kube.yml", "{{.COMMIT}}-{{.key0}}");
        let sec = fx.write(".kube.sec.yml", "{{.COMMIT}}-{{.SECRET_TEST}}");

        let manifests = fx.renderer().render_all(&fx.paths(), &data()).unwrap();

        let outputs = manifests.outputs();
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[kube.as_path()], fx.staging.path().join(".kube.yml"));

        let resource = manifests.resource.unwrap();
        assert_eq!(fs::read_to_string(&resource.output).unwrap(), "e0f21b90a-val0");

        let secret = manifests.secret.unwrap();
        assert_eq!(secret.source, sec);
        assert_eq!(
            fs::read_to_string(&secret.output).unwrap(),
            "e0f21b90a-test_sec_val"
        );
    }

    #[test]
    fn test_missing_secret_template_is_skipped() {
        let fx = Fixture::new();
        fx.write(".kube.yml", "{{.COMMIT}}");

        let manifests = fx.renderer().render_all(&fx.paths(), &data()).unwrap();
        assert!(manifests.resource.is_some());
        assert!(manifests.secret.is_none());
        assert_eq!(manifests.outputs().len(), 1);
    }

    #[test]
    fn test_resource_template_cannot_read_secrets() {
        let fx = Fixture::new();
        fx.write(".kube.yml", "{{.SECRET_TEST}}");
        fx.write(".kube.sec.yml", "{{.SECRET_TEST}}");

        let err = fx.renderer().render_all(&fx.paths(), &data()).unwrap_err();
        let te = err.as_template().expect("template error");
        assert!(!te.message.contains("test_sec_val"));
        assert!(!fx.staging.path().join(".kube.yml").exists());
    }

    #[test]
    fn test_skipped_resource_template() {
        let fx = Fixture::new();
        fx.write(".kube.sec.yml", "{{.SECRET_TEST}}");
        let paths = TemplatePaths {
            resource: None,
            ..fx.paths()
        };

        let manifests = fx.renderer().render_all(&paths, &data()).unwrap();
        assert!(manifests.resource.is_none());
        assert!(manifests.secret.is_some());
    }

    #[cfg(unix)]
    #[test]
    fn test_manifests_are_private() {
        use std::os::unix::fs::PermissionsExt;

        let fx = Fixture::new();
        fx.write(".kube.yml", "kind: Deployment");
        let manifests = fx.renderer().render_all(&fx.paths(), &data()).unwrap();

        let mode = fs::metadata(manifests.resource.unwrap().output)
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
