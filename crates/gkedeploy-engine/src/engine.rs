//! Template engine based on MiniJinja

use gkedeploy_core::VarMap;
use minijinja::{AutoEscape, Environment, UndefinedBehavior, Value};

use crate::error::{EngineError, Result, TemplateError};
use crate::filters;
use crate::gotemplate;

/// The template engine
///
/// Templates are Go templates; referencing a key that is not bound is an
/// error, as with Go's `missingkey=error`.
#[derive(Debug, Default)]
pub struct Engine;

impl Engine {
    pub fn new() -> Self {
        Self
    }

    fn create_environment(&self) -> Environment<'static> {
        let mut env = Environment::new();

        env.set_undefined_behavior(UndefinedBehavior::Strict);

        // Manifests are YAML; never escape, and keep the file's final newline
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.set_keep_trailing_newline(true);

        env.add_filter("toyaml", filters::toyaml);
        env.add_filter("tojson", filters::tojson);
        env.add_filter("b64encode", filters::b64encode);
        env.add_filter("b64decode", filters::b64decode);
        env.add_filter("quote", filters::quote);
        env.add_filter("squote", filters::squote);
        env.add_filter("nindent", filters::nindent);
        env.add_filter("indent", filters::indent);
        env.add_filter("entries", filters::entries);

        env
    }

    /// Render a Go template source against a single data view
    ///
    /// Only the keys of `data` are visible to the template.
    pub fn render_string(
        &self,
        template: &str,
        data: &VarMap,
        template_name: &str,
    ) -> Result<String> {
        let keys: Vec<&str> = data.keys().map(String::as_str).collect();

        let source = gotemplate::translate(template).map_err(|e| {
            EngineError::template(
                template_name,
                TemplateError::from_go_syntax(e, template_name, template),
            )
        })?;

        // Line numbers of the translated source match the template's
        let to_error = |e: minijinja::Error| {
            EngineError::template(
                template_name,
                TemplateError::from_minijinja(e, template_name, template, &keys),
            )
        };

        let mut env = self.create_environment();
        env.add_template_owned(template_name.to_string(), source)
            .map_err(to_error)?;

        let tmpl = env.get_template(template_name).map_err(to_error)?;
        tmpl.render(Value::from_serialize(data)).map_err(to_error)
    }
}
