//! Engines by name.

use std::collections::HashMap;
use std::fmt;
use tracing::trace;

use podium_dispatch::{Params, TemplateRenderer};

use crate::engine::{JsonEngine, MiniJinjaEngine, TemplateEngine};
use crate::error::RenderError;

/// A set of named template engines, usable as the dispatcher's renderer.
///
/// Engine names are the `engine` part of `engine:template` expositions.
///
/// ```rust
/// use std::sync::Arc;
/// use podium_dispatch::Dispatcher;
/// use podium_render::{MiniJinjaEngine, Renderers};
///
/// let mut jinja = MiniJinjaEngine::new();
/// jinja.add_template("index.html", "<h1>{{ title }}</h1>").unwrap();
///
/// let dispatcher = Dispatcher::builder()
///     .renderer(Arc::new(Renderers::with_defaults(jinja)))
///     .build();
/// # let _ = dispatcher;
/// ```
#[derive(Default)]
pub struct Renderers {
    engines: HashMap<String, Box<dyn TemplateEngine>>,
}

impl Renderers {
    pub fn new() -> Self {
        Self::default()
    }

    /// `jinja` and `json` engines, the names the default configuration and
    /// the `json` exposition use.
    pub fn with_defaults(jinja: MiniJinjaEngine) -> Self {
        Self::new().with_engine("jinja", jinja).with_engine("json", JsonEngine)
    }

    /// Registers `engine` under `name`, replacing any previous one.
    pub fn register<E: TemplateEngine + 'static>(&mut self, name: impl Into<String>, engine: E) {
        self.engines.insert(name.into(), Box::new(engine));
    }

    pub fn with_engine<E: TemplateEngine + 'static>(
        mut self,
        name: impl Into<String>,
        engine: E,
    ) -> Self {
        self.register(name, engine);
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn TemplateEngine> {
        self.engines.get(name).map(|engine| engine.as_ref())
    }

    /// Registered engine names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.engines.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Renders through the engine registered as `engine_name`.
    pub fn render_with(
        &self,
        engine_name: &str,
        template_name: Option<&str>,
        vars: &Params,
        render_params: &Params,
    ) -> Result<String, RenderError> {
        let engine = self
            .get(engine_name)
            .ok_or_else(|| RenderError::UnknownEngine(engine_name.to_string()))?;
        trace!(engine = engine_name, template = ?template_name, "render");
        engine.render(template_name, vars, render_params)
    }
}

impl TemplateRenderer for Renderers {
    fn render(
        &self,
        vars: &Params,
        engine_name: &str,
        template_name: Option<&str>,
        render_params: &Params,
    ) -> Result<String, podium_dispatch::RenderError> {
        Ok(self.render_with(engine_name, template_name, vars, render_params)?)
    }
}

impl fmt::Debug for Renderers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderers")
            .field("engines", &self.names())
            .finish()
    }
}
