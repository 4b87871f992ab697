//! Response rendering.
//!
//! Defines the contract between dispatch and template engines. Dispatch does
//! not know about templates: for each request it resolves an engine name and
//! a template name from the action's decoration, and hands the namespace to a
//! [`TemplateRenderer`] that turns it into a body.

use std::sync::Arc;
use tracing::trace;

use crate::context::RequestContext;
use crate::error::DispatchError;
use crate::handler::{Action, Output};
use crate::params::Params;

/// Errors that can occur during rendering.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// Template rendering failed
    #[error("render error: {0}")]
    Render(String),

    /// No engine is registered under the requested name
    #[error("unknown render engine: {0}")]
    UnknownEngine(String),

    /// The engine has no template under the requested name
    #[error("template not found: {0}")]
    TemplateNotFound(String),

    /// Namespace serialization failed
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for RenderError {
    fn from(e: serde_json::Error) -> Self {
        RenderError::Serialization(e.to_string())
    }
}

/// Turns a namespace into a response body.
pub trait TemplateRenderer: Send + Sync {
    fn render(
        &self,
        vars: &Params,
        engine_name: &str,
        template_name: Option<&str>,
        render_params: &Params,
    ) -> Result<String, RenderError>;
}

struct FnRenderer<F>(F);

impl<F> TemplateRenderer for FnRenderer<F>
where
    F: Fn(&Params, &str, Option<&str>, &Params) -> Result<String, RenderError> + Send + Sync,
{
    fn render(
        &self,
        vars: &Params,
        engine_name: &str,
        template_name: Option<&str>,
        render_params: &Params,
    ) -> Result<String, RenderError> {
        (self.0)(vars, engine_name, template_name, render_params)
    }
}

/// Creates a renderer from a closure.
pub fn from_fn<F>(f: F) -> Arc<dyn TemplateRenderer>
where
    F: Fn(&Params, &str, Option<&str>, &Params) -> Result<String, RenderError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnRenderer(f))
}

/// A renderer that ignores engine and template and emits pretty JSON.
///
/// Used by [`Dispatcher`](crate::Dispatcher) when no renderer is configured.
pub fn json_render() -> Arc<dyn TemplateRenderer> {
    from_fn(|vars, _engine, _template, _params| {
        serde_json::to_string_pretty(vars).map_err(RenderError::from)
    })
}

/// The outcome of rendering one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderResult {
    pub body: String,
    /// Content type the selected engine suggests, without charset. The header
    /// actually sent is on the response.
    pub content_type: Option<String>,
    pub engine_name: String,
    pub template_name: Option<String>,
}

/// Appends `; charset=utf-8` to `text/*` content types and to exactly
/// `application/xhtml+xml`, `application/xml` and `application/json`, unless
/// a charset is already present.
pub fn with_default_charset(content_type: &str) -> String {
    let media_type = content_type.split(';').next().unwrap_or_default().trim();
    let textual = media_type.starts_with("text")
        || ["application/xhtml+xml", "application/xml", "application/json"].contains(&media_type);
    if textual && !content_type.contains("charset") {
        format!("{content_type}; charset=utf-8")
    } else {
        content_type.to_string()
    }
}

/// Renders `output` for `action` according to its decoration.
///
/// The response content type is only set when none was set before. Finished
/// bodies are passed through; namespaces lose their excluded keys and go to
/// `renderer`.
pub fn render_response(
    renderer: &dyn TemplateRenderer,
    ctx: &mut RequestContext,
    action: &Action,
    output: Output,
) -> Result<RenderResult, DispatchError> {
    let selection = action.decoration().lookup_template_engine(ctx);

    if ctx.response.content_type().is_none() {
        if let Some(content_type) = selection.content_type.as_deref() {
            ctx.response
                .set_content_type(&with_default_charset(content_type))?;
        }
    }

    let mut namespace = match output {
        Output::Body(body) => {
            return Ok(RenderResult {
                body,
                content_type: selection.content_type,
                engine_name: selection.engine_name,
                template_name: selection.template_name,
            })
        }
        Output::Render(namespace) => namespace,
    };

    for name in &selection.exclude_names {
        namespace.remove(name);
    }
    if let Some(testing) = ctx.testing.as_mut() {
        testing.namespace = Some(namespace.clone());
        testing.template_name = selection.template_name.clone();
        testing.exclude_names = selection.exclude_names.clone();
        testing.render_params = selection.render_params.clone();
        testing.controller_output = Some(namespace.clone());
    }

    trace!(
        engine = %selection.engine_name,
        template = ?selection.template_name,
        "rendering"
    );
    let body = renderer.render(
        &namespace,
        &selection.engine_name,
        selection.template_name.as_deref(),
        &selection.render_params,
    )?;

    Ok(RenderResult {
        body,
        content_type: selection.content_type,
        engine_name: selection.engine_name,
        template_name: selection.template_name,
    })
}
