//! Per-action decoration metadata.
//!
//! A [`Decoration`] is the configuration attached to an action at registration
//! time: which content types it is exposed as and with which template, which
//! validations run, which hooks fire, and which wrappers surround the call.
//! It is built once with [`DecorationBuilder`] and read-only afterwards.
//!
//! ```rust
//! use podium_dispatch::{Decoration, Exposition};
//!
//! let decoration = Decoration::builder()
//!     .expose("jinja:users/edit.html")
//!     .expose_with(Exposition::new("json").exclude(["csrf_token"]))
//!     .build();
//!
//! assert!(decoration.exposed());
//! assert_eq!(decoration.expositions().len(), 2);
//! ```

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::config::DispatchConfig;
use crate::context::{Request, RequestContext};
use crate::handler::{Action, ActionResult, Output};
use crate::hooks::{HookError, Hooks};
use crate::params::{variable_decode, Arguments, Params};
use crate::render::RenderResult;
use crate::validation::ValidationIntent;

/// Content type used for template expositions unless told otherwise.
pub const HTML_CONTENT_TYPE: &str = "text/html";

/// Content type of the template-less `json` engine.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Engines that render without a template and imply their own content type.
const TEMPLATELESS_ENGINES: &[(&str, &str)] = &[("json", JSON_CONTENT_TYPE)];

/// An `engine:template` reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateSpec {
    pub engine: Option<String>,
    pub template: Option<String>,
}

impl TemplateSpec {
    /// Parses `engine:template`, a bare template-less engine name such as
    /// `json`, or a bare template name rendered by the default engine.
    pub fn parse(spec: &str) -> Self {
        let spec = spec.trim();
        if let Some((engine, template)) = spec.split_once(':') {
            return Self {
                engine: non_empty(engine),
                template: non_empty(template),
            };
        }
        if TEMPLATELESS_ENGINES.iter().any(|(name, _)| *name == spec) {
            return Self {
                engine: Some(spec.to_string()),
                template: None,
            };
        }
        Self {
            engine: None,
            template: non_empty(spec),
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// One way an action can be rendered: a content type with its engine,
/// template, excluded namespace keys and extra engine parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Exposition {
    pub content_type: String,
    pub engine: Option<String>,
    pub template: Option<String>,
    /// Namespace keys removed before rendering.
    pub exclude_names: Vec<String>,
    /// Extra parameters passed to the engine, not to the template.
    pub render_params: Params,
}

impl Exposition {
    /// Creates an exposition from a [`TemplateSpec`] string.
    ///
    /// The content type follows the engine: `application/json` for `json`,
    /// `text/html` otherwise.
    pub fn new(spec: &str) -> Self {
        let TemplateSpec { engine, template } = TemplateSpec::parse(spec);
        let content_type = engine
            .as_deref()
            .and_then(|engine| {
                TEMPLATELESS_ENGINES
                    .iter()
                    .find(|(name, _)| *name == engine)
                    .map(|(_, content_type)| *content_type)
            })
            .unwrap_or(HTML_CONTENT_TYPE)
            .to_string();
        Self {
            content_type,
            engine,
            template,
            exclude_names: Vec::new(),
            render_params: Params::new(),
        }
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn exclude<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_names.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn render_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.render_params.insert(key.into(), value.into());
        self
    }
}

/// What [`Decoration::lookup_template_engine`] resolved for a request.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSelection {
    /// Content type the engine suggests, without charset.
    pub content_type: Option<String>,
    pub engine_name: String,
    pub template_name: Option<String>,
    pub exclude_names: Vec<String>,
    pub render_params: Params,
}

/// Invokes an action on behalf of the dispatcher.
///
/// Receives the configuration snapshot, the request context, the bound action
/// (the original one or its error handler) and the call arguments.
pub type ControllerCaller = Arc<
    dyn Fn(&DispatchConfig, &mut RequestContext, &Action, Arguments) -> ActionResult
        + Send
        + Sync,
>;

/// Wraps a [`ControllerCaller`] with extra behavior (timing, transactions…).
pub type ControllerWrapper = Arc<dyn Fn(ControllerCaller) -> ControllerCaller + Send + Sync>;

/// The innermost caller: invokes the action's handler.
pub fn call_action() -> ControllerCaller {
    Arc::new(
        |_config: &DispatchConfig, ctx: &mut RequestContext, action: &Action, args: Arguments| {
            action.invoke(ctx, args)
        },
    )
}

/// Composes `wrappers` around [`call_action`]; the last wrapper is outermost.
pub fn compose_caller<'a, I>(wrappers: I) -> ControllerCaller
where
    I: IntoIterator<Item = &'a ControllerWrapper>,
{
    wrappers
        .into_iter()
        .fold(call_action(), |caller, wrapper| wrapper(caller))
}

/// Configuration attached to one action.
#[derive(Clone, Default)]
pub struct Decoration {
    exposed: bool,
    expositions: Vec<Exposition>,
    validations: Vec<ValidationIntent>,
    hooks: Hooks,
    wrappers: Vec<ControllerWrapper>,
    inherit: bool,
}

impl Decoration {
    pub fn builder() -> DecorationBuilder {
        DecorationBuilder::default()
    }

    /// Whether the action may be dispatched to from a request.
    pub fn exposed(&self) -> bool {
        self.exposed
    }

    /// Expositions in registration order; the first one is the default.
    pub fn expositions(&self) -> &[Exposition] {
        &self.expositions
    }

    pub fn validations(&self) -> &[ValidationIntent] {
        &self.validations
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    /// Whether this decoration merges the parent controller's decoration for
    /// the same action.
    pub fn inherit(&self) -> bool {
        self.inherit
    }

    /// The caller for this action: the decoration's wrappers around the plain
    /// call, then `app_wrappers` around those.
    pub fn controller_caller(&self, app_wrappers: &[ControllerWrapper]) -> ControllerCaller {
        compose_caller(self.wrappers.iter().chain(app_wrappers))
    }

    /// Resolves content type, engine, template, exclusions and render params
    /// for the current request.
    ///
    /// The exposition is chosen by the router-provided response type, then by
    /// the `Accept` header, then by registration order. A template override on
    /// the context replaces the chosen template (and engine, when it names one).
    pub fn lookup_template_engine(&self, ctx: &RequestContext) -> EngineSelection {
        let config = &ctx.config;
        let exposition = self.select_exposition(&ctx.request);
        let mut engine = exposition.and_then(|exposition| exposition.engine.clone());
        let mut selection = match exposition {
            Some(exposition) => EngineSelection {
                content_type: Some(exposition.content_type.clone()),
                engine_name: String::new(),
                template_name: exposition.template.clone(),
                exclude_names: exposition.exclude_names.clone(),
                render_params: exposition.render_params.clone(),
            },
            None => EngineSelection {
                content_type: Some(config.default_content_type.clone()),
                engine_name: String::new(),
                template_name: None,
                exclude_names: Vec::new(),
                render_params: Params::new(),
            },
        };

        if let Some(spec) = ctx.template_override() {
            if spec.engine.is_some() {
                engine = spec.engine.clone();
            }
            selection.template_name = spec.template.clone();
        }
        selection.engine_name = engine.unwrap_or_else(|| config.default_renderer.clone());
        selection
    }

    fn select_exposition(&self, request: &Request) -> Option<&Exposition> {
        if let Some(wanted) = request.response_type.as_deref() {
            if let Some(exposition) = self
                .expositions
                .iter()
                .find(|exposition| exposition.content_type == wanted)
            {
                return Some(exposition);
            }
        }
        if let Some(accept) = request.accept() {
            if let Some(exposition) = negotiate(accept, &self.expositions) {
                return Some(exposition);
            }
        }
        self.expositions.first()
    }

    /// Merges `parent` into this decoration.
    ///
    /// Own expositions win per content type; the parent's validations, hooks
    /// and wrappers come before this decoration's own.
    pub fn merge(&mut self, parent: &Decoration) {
        self.exposed |= parent.exposed;

        for exposition in &parent.expositions {
            if !self
                .expositions
                .iter()
                .any(|own| own.content_type == exposition.content_type)
            {
                self.expositions.push(exposition.clone());
            }
        }

        let mut validations = parent.validations.clone();
        validations.append(&mut self.validations);
        self.validations = validations;

        self.hooks.inherit_from(&parent.hooks);

        let mut wrappers = parent.wrappers.clone();
        wrappers.append(&mut self.wrappers);
        self.wrappers = wrappers;
    }
}

impl fmt::Debug for Decoration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decoration")
            .field("exposed", &self.exposed)
            .field("expositions", &self.expositions)
            .field("validations", &self.validations)
            .field("hooks", &self.hooks)
            .field("wrapper_count", &self.wrappers.len())
            .field("inherit", &self.inherit)
            .finish()
    }
}

/// Picks the exposition the `Accept` header prefers.
///
/// The most specific matching range decides an offer's quality; ties go to the
/// earlier exposition. Offers with quality zero are never chosen.
fn negotiate<'a>(accept: &str, offers: &'a [Exposition]) -> Option<&'a Exposition> {
    let ranges: Vec<(String, f32)> = accept.split(',').filter_map(parse_media_range).collect();
    let mut best: Option<(&Exposition, f32)> = None;
    for offer in offers {
        let quality = quality(&ranges, &offer.content_type);
        if quality > 0.0 && best.map_or(true, |(_, q)| quality > q) {
            best = Some((offer, quality));
        }
    }
    best.map(|(offer, _)| offer)
}

fn parse_media_range(item: &str) -> Option<(String, f32)> {
    let mut parts = item.split(';');
    let range = parts.next()?.trim().to_ascii_lowercase();
    if range.is_empty() {
        return None;
    }
    let mut quality = 1.0;
    for param in parts {
        if let Some((key, value)) = param.split_once('=') {
            if key.trim() == "q" {
                quality = value.trim().parse().unwrap_or(0.0);
            }
        }
    }
    Some((range, quality))
}

fn quality(ranges: &[(String, f32)], content_type: &str) -> f32 {
    let content_type = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    let major = content_type.split('/').next().unwrap_or_default();

    let mut best: Option<(u8, f32)> = None;
    for (range, q) in ranges {
        let specificity = if *range == content_type {
            2
        } else if range.strip_suffix("/*") == Some(major) {
            1
        } else if range == "*/*" {
            0
        } else {
            continue;
        };
        if best.map_or(true, |(s, _)| specificity > s) {
            best = Some((specificity, *q));
        }
    }
    best.map_or(0.0, |(_, q)| q)
}

/// Builds a [`Decoration`].
#[derive(Default)]
pub struct DecorationBuilder {
    decoration: Decoration,
}

impl DecorationBuilder {
    /// Exposes the action with the given [`TemplateSpec`] string.
    pub fn expose(self, spec: &str) -> Self {
        self.expose_with(Exposition::new(spec))
    }

    /// Exposes the action; replaces an earlier exposition for the same content
    /// type.
    pub fn expose_with(mut self, exposition: Exposition) -> Self {
        self.decoration.exposed = true;
        let expositions = &mut self.decoration.expositions;
        match expositions
            .iter_mut()
            .find(|own| own.content_type == exposition.content_type)
        {
            Some(existing) => *existing = exposition,
            None => expositions.push(exposition),
        }
        self
    }

    /// Keeps the expositions but refuses dispatch from requests. The action can
    /// still serve as an error handler.
    pub fn hidden(mut self) -> Self {
        self.decoration.exposed = false;
        self
    }

    pub fn validate(mut self, intent: ValidationIntent) -> Self {
        self.decoration.validations.push(intent);
        self
    }

    pub fn before_validate<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut RequestContext, &[String], &mut Params) -> Result<(), HookError>
            + Send
            + Sync
            + 'static,
    {
        self.decoration.hooks = self.decoration.hooks.before_validate(f);
        self
    }

    pub fn before_call<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut RequestContext, &mut Arguments) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.decoration.hooks = self.decoration.hooks.before_call(f);
        self
    }

    pub fn before_render<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut RequestContext, &Arguments, &mut Output) -> Result<(), HookError>
            + Send
            + Sync
            + 'static,
    {
        self.decoration.hooks = self.decoration.hooks.before_render(f);
        self
    }

    pub fn after_render<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut RequestContext, &mut RenderResult) -> Result<(), HookError>
            + Send
            + Sync
            + 'static,
    {
        self.decoration.hooks = self.decoration.hooks.after_render(f);
        self
    }

    /// Renders with `spec` (`engine:template` or a template name) when the
    /// request carries any of `master_params`.
    ///
    /// A master param paired with `true` is removed from the parameters before
    /// validation; one paired with `false` is left for the action.
    ///
    /// ```rust
    /// use podium_dispatch::Decoration;
    ///
    /// let decoration = Decoration::builder()
    ///     .expose("jinja:report.html")
    ///     .with_engine("jinja:report_print.html", [("print", true), ("lang", false)])
    ///     .build();
    /// # assert!(decoration.exposed());
    /// ```
    pub fn with_engine<I, S>(self, spec: &str, master_params: I) -> Self
    where
        I: IntoIterator<Item = (S, bool)>,
        S: Into<String>,
    {
        let spec = spec.to_string();
        let master_params: Vec<(String, bool)> = master_params
            .into_iter()
            .map(|(name, pop)| (name.into(), pop))
            .collect();
        self.before_validate(move |ctx, _remainder, params| {
            let mut present = false;
            for (name, pop) in &master_params {
                if params.contains_key(name) {
                    present = true;
                    if *pop {
                        params.remove(name);
                    }
                }
            }
            if present {
                ctx.override_template(&spec);
            }
            Ok(())
        })
    }

    /// Like [`with_engine`](Self::with_engine), removing every listed param.
    pub fn with_engine_list<I, S>(self, spec: &str, master_params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_engine(spec, master_params.into_iter().map(|name| (name, true)))
    }

    /// Expands flat form keys into nested values before validation; see
    /// [`variable_decode`](crate::variable_decode).
    pub fn variable_decode(self) -> Self {
        self.before_validate(|_ctx, _remainder, params| {
            *params = variable_decode(params);
            Ok(())
        })
    }

    /// Wraps the call to this action. Later wrappers wrap earlier ones.
    pub fn wrap<F>(mut self, wrapper: F) -> Self
    where
        F: Fn(ControllerCaller) -> ControllerCaller + Send + Sync + 'static,
    {
        self.decoration.wrappers.push(Arc::new(wrapper));
        self
    }

    /// Merges the parent controller's decoration for this action at build time.
    pub fn inherit(mut self) -> Self {
        self.decoration.inherit = true;
        self
    }

    pub fn build(self) -> Decoration {
        self.decoration
    }
}
