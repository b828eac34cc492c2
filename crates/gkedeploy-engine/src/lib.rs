//! gkedeploy Engine - strict templating for Kubernetes manifests
//!
//! This crate provides a MiniJinja-based template engine with:
//! - Strict undefined semantics: referencing an unknown key is an error
//! - Go text/template syntax (`{{.Key}}`, pipes, `if`/`range`/`with`), translated before parsing
//! - A small set of Kubernetes-friendly filters (b64encode, quote, nindent, ...)
//! - Renderer that binds each template to exactly one data view

pub mod engine;
pub mod error;
pub mod filters;
pub mod gotemplate;
pub mod renderer;
pub mod suggestions;

pub use engine::Engine;
pub use error::{EngineError, Result, TemplateError, TemplateErrorKind};
pub use gotemplate::{GoSyntaxError, translate};
pub use renderer::{Manifest, ManifestRenderer, RenderedManifests, TemplateBinding};
