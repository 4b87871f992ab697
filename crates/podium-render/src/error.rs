//! Error types for template rendering.
//!
//! [`RenderError`] hides the underlying template engine's errors behind a
//! stable type and converts into the dispatch-side
//! [`podium_dispatch::RenderError`] at the [`TemplateRenderer`] boundary.
//!
//! [`TemplateRenderer`]: podium_dispatch::TemplateRenderer

use std::fmt;

/// Error type for template rendering operations.
#[derive(Debug)]
pub enum RenderError {
    /// Template syntax error or compilation failure.
    TemplateError(String),

    /// Template not found by the engine.
    TemplateNotFound(String),

    /// The exposition named no template for an engine that needs one.
    MissingTemplate(String),

    /// No engine registered under this name.
    UnknownEngine(String),

    /// Data serialization error.
    SerializationError(String),

    /// Other operational error.
    OperationError(String),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::TemplateError(msg) => write!(f, "template error: {}", msg),
            RenderError::TemplateNotFound(name) => write!(f, "template not found: {}", name),
            RenderError::MissingTemplate(engine) => {
                write!(f, "engine {} needs a template name", engine)
            }
            RenderError::UnknownEngine(name) => write!(f, "unknown render engine: {}", name),
            RenderError::SerializationError(msg) => write!(f, "serialization error: {}", msg),
            RenderError::OperationError(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for RenderError {}

impl From<serde_json::Error> for RenderError {
    fn from(err: serde_json::Error) -> Self {
        RenderError::SerializationError(err.to_string())
    }
}

impl From<minijinja::Error> for RenderError {
    fn from(err: minijinja::Error) -> Self {
        use minijinja::ErrorKind;

        match err.kind() {
            ErrorKind::TemplateNotFound => RenderError::TemplateNotFound(err.to_string()),
            ErrorKind::SyntaxError
            | ErrorKind::BadEscape
            | ErrorKind::UndefinedError
            | ErrorKind::UnknownTest
            | ErrorKind::UnknownFunction
            | ErrorKind::UnknownFilter
            | ErrorKind::UnknownMethod => RenderError::TemplateError(err.to_string()),
            ErrorKind::BadSerialization => RenderError::SerializationError(err.to_string()),
            _ => RenderError::OperationError(err.to_string()),
        }
    }
}

impl From<RenderError> for podium_dispatch::RenderError {
    fn from(err: RenderError) -> Self {
        use podium_dispatch::RenderError as Dispatch;

        match err {
            RenderError::TemplateNotFound(name) => Dispatch::TemplateNotFound(name),
            RenderError::UnknownEngine(name) => Dispatch::UnknownEngine(name),
            RenderError::SerializationError(msg) => Dispatch::Serialization(msg),
            RenderError::TemplateError(_) | RenderError::MissingTemplate(_) => {
                Dispatch::Render(err.to_string())
            }
            RenderError::OperationError(msg) => Dispatch::Other(msg),
        }
    }
}
