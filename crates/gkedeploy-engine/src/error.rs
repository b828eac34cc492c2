//! Engine error types

use std::path::PathBuf;

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::gotemplate::GoSyntaxError;
use crate::suggestions::{suggest_undefined_variable, undefined_expression_on_line};

/// Main engine error type
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Error finding template: {}", path.display())]
    MissingTemplate { path: PathBuf },

    #[error("Template error in {name}: {source}")]
    Template {
        name: String,
        #[source]
        source: TemplateError,
    },

    #[error("Error writing manifest {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Wrap a template error, keeping the template name in the message
    pub fn template(name: &str, err: TemplateError) -> Self {
        EngineError::Template {
            name: name.to_string(),
            source: err,
        }
    }

    /// The underlying template error, if any
    pub fn as_template(&self) -> Option<&TemplateError> {
        match self {
            EngineError::Template { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Error kind for categorizing template errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TemplateErrorKind {
    UndefinedVariable,
    UnknownFilter,
    SyntaxError,
    TypeError,
    Other,
}

/// Template-specific error with source information
///
/// Carries the template source and key names only, never rendered values.
#[derive(Error, Debug, Diagnostic, Clone)]
#[error("{message}")]
#[diagnostic(code(gkedeploy::template::render))]
pub struct TemplateError {
    pub message: String,

    pub kind: TemplateErrorKind,

    #[source_code]
    pub src: NamedSource<String>,

    #[label("error occurred here")]
    pub span: Option<SourceSpan>,

    #[help]
    pub suggestion: Option<String>,
}

impl TemplateError {
    /// Create a template error from a MiniJinja error
    ///
    /// `keys` are the names bound to the template, used for suggestions.
    pub fn from_minijinja(
        err: minijinja::Error,
        template_name: &str,
        template_source: &str,
        keys: &[&str],
    ) -> Self {
        let kind = categorize(&err);
        let line = err.line();
        let span = line.and_then(|n| calculate_span(template_source, n));

        let undefined = match kind {
            TemplateErrorKind::UndefinedVariable => line
                .and_then(|n| template_source.lines().nth(n.saturating_sub(1)))
                .and_then(|text| undefined_expression_on_line(text, keys)),
            _ => None,
        };

        let message = match &undefined {
            Some(expr) => format!("undefined variable `{}`", expr),
            None => err
                .to_string()
                .replace("undefined value", "undefined variable"),
        };

        let suggestion = undefined
            .as_deref()
            .and_then(|expr| suggest_undefined_variable(expr, keys));

        Self {
            message,
            kind,
            src: NamedSource::new(template_name, template_source.to_string()),
            span,
            suggestion,
        }
    }

    /// A template that is not valid Go template syntax
    pub fn from_go_syntax(err: GoSyntaxError, template_name: &str, template_source: &str) -> Self {
        let line = template_source[..err.offset.min(template_source.len())]
            .matches('\n')
            .count()
            + 1;

        Self {
            message: format!("syntax error: {}", err.message),
            kind: TemplateErrorKind::SyntaxError,
            src: NamedSource::new(template_name, template_source.to_string()),
            span: calculate_span(template_source, line),
            suggestion: None,
        }
    }

    pub fn kind(&self) -> TemplateErrorKind {
        self.kind
    }

    /// Whether the template failed to parse, as opposed to failing at render time
    pub fn is_parse_error(&self) -> bool {
        self.kind == TemplateErrorKind::SyntaxError
    }
}

fn categorize(err: &minijinja::Error) -> TemplateErrorKind {
    match err.kind() {
        minijinja::ErrorKind::UndefinedError => TemplateErrorKind::UndefinedVariable,
        minijinja::ErrorKind::UnknownFilter => TemplateErrorKind::UnknownFilter,
        minijinja::ErrorKind::SyntaxError => TemplateErrorKind::SyntaxError,
        minijinja::ErrorKind::NonPrimitive | minijinja::ErrorKind::NonKey => {
            TemplateErrorKind::TypeError
        }
        _ => TemplateErrorKind::Other,
    }
}

/// Span covering the whole of a 1-based line
fn calculate_span(source: &str, line_num: usize) -> Option<SourceSpan> {
    let mut offset = 0;

    for (index, line) in source.lines().enumerate() {
        if index + 1 == line_num {
            return Some(SourceSpan::new(offset.into(), line.len()));
        }
        offset += line.len() + 1;
    }

    None
}
