//! Template engines.
//!
//! A [`TemplateEngine`] renders a namespace, optionally through a named
//! template, with extra engine parameters that are not part of the namespace.
//! [`MiniJinjaEngine`] covers HTML and other textual templates; [`JsonEngine`]
//! serializes the namespace directly.

use minijinja::{Environment, Value};
use std::collections::BTreeMap;
use std::path::Path;

use podium_dispatch::Params;

use crate::error::RenderError;

/// A template engine that can render a namespace.
pub trait TemplateEngine: Send + Sync {
    /// Renders `vars` through `template_name`.
    ///
    /// `render_params` come from the action's exposition; how they are used is
    /// up to the engine.
    fn render(
        &self,
        template_name: Option<&str>,
        vars: &Params,
        render_params: &Params,
    ) -> Result<String, RenderError>;
}

/// MiniJinja-based template engine.
///
/// Templates are registered by name with [`add_template`](Self::add_template)
/// or loaded from a directory. Auto-escaping follows the template name's
/// extension, so `.html` templates escape their variables.
///
/// Render parameters are visible to the template as variables; a namespace
/// entry of the same name wins.
///
/// # Example
///
/// ```rust
/// use podium_render::{MiniJinjaEngine, TemplateEngine};
/// use serde_json::json;
///
/// let mut engine = MiniJinjaEngine::new();
/// engine.add_template("hello.html", "Hello, {{ name }}!").unwrap();
///
/// let vars = json!({ "name": "<World>" }).as_object().cloned().unwrap();
/// let output = engine
///     .render(Some("hello.html"), &vars, &Default::default())
///     .unwrap();
/// assert_eq!(output, "Hello, &lt;World&gt;!");
/// ```
pub struct MiniJinjaEngine {
    env: Environment<'static>,
}

impl MiniJinjaEngine {
    pub fn new() -> Self {
        Self {
            env: Environment::new(),
        }
    }

    /// Creates an engine that loads templates from `dir` on first use.
    pub fn from_directory(dir: impl AsRef<Path>) -> Self {
        let mut env = Environment::new();
        env.set_loader(minijinja::path_loader(dir.as_ref()));
        Self { env }
    }

    /// Compiles and registers a template under `name`.
    pub fn add_template(
        &mut self,
        name: impl Into<String>,
        source: impl Into<String>,
    ) -> Result<(), RenderError> {
        self.env.add_template_owned(name.into(), source.into())?;
        Ok(())
    }

    /// Registers each `(name, source)` pair.
    pub fn with_templates<I, N, S>(mut self, templates: I) -> Result<Self, RenderError>
    where
        I: IntoIterator<Item = (N, S)>,
        N: Into<String>,
        S: Into<String>,
    {
        for (name, source) in templates {
            self.add_template(name, source)?;
        }
        Ok(self)
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.env.get_template(name).is_ok()
    }

    /// The underlying environment, for registering filters and globals.
    pub fn environment_mut(&mut self) -> &mut Environment<'static> {
        &mut self.env
    }
}

impl Default for MiniJinjaEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine for MiniJinjaEngine {
    fn render(
        &self,
        template_name: Option<&str>,
        vars: &Params,
        render_params: &Params,
    ) -> Result<String, RenderError> {
        let name = template_name.ok_or_else(|| RenderError::MissingTemplate("jinja".into()))?;
        let template = self.env.get_template(name)?;

        let mut combined = BTreeMap::new();
        for (key, value) in render_params {
            combined.insert(key.as_str(), Value::from_serialize(value));
        }
        for (key, value) in vars {
            combined.insert(key.as_str(), Value::from_serialize(value));
        }

        Ok(template.render(&combined)?)
    }
}

/// Serializes the namespace as JSON.
///
/// Compact by default; the `pretty` render parameter switches to indented
/// output.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEngine;

impl TemplateEngine for JsonEngine {
    fn render(
        &self,
        _template_name: Option<&str>,
        vars: &Params,
        render_params: &Params,
    ) -> Result<String, RenderError> {
        let pretty = render_params
            .get("pretty")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);
        if pretty {
            Ok(serde_json::to_string_pretty(vars)?)
        } else {
            Ok(serde_json::to_string(vars)?)
        }
    }
}
