//! Per-request context.
//!
//! Every step of the dispatch pipeline receives the same `&mut RequestContext`.
//! It bundles the request and response, the configuration snapshot, the
//! validation status and any state hooks or handlers want to share.
//!
//! # State sharing
//!
//! [`Extensions`] is a type-keyed map living for one request. A `before_call`
//! hook can stash a value that the action then reads:
//!
//! ```rust
//! use podium_dispatch::{Extensions, Hooks};
//!
//! struct CurrentTenant(String);
//!
//! let hooks = Hooks::new().before_call(|ctx, _args| {
//!     ctx.extensions.insert(CurrentTenant("acme".into()));
//!     Ok(())
//! });
//! # let _ = hooks;
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use http::header::{InvalidHeaderValue, ACCEPT, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};

use crate::config::DispatchConfig;
use crate::decoration::TemplateSpec;
use crate::params::Params;
use crate::validation::ValidationStatus;

/// The authenticated user behind a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub user: String,
    pub groups: Vec<String>,
    pub permissions: Vec<String>,
}

impl Identity {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            ..Default::default()
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.push(group.into());
        self
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.push(permission.into());
        self
    }
}

/// The incoming request, as far as dispatch cares about it.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    /// Authenticated identity, `None` for anonymous requests.
    pub identity: Option<Identity>,
    /// Content type requested explicitly by the router (e.g. from a `.json`
    /// suffix). Takes precedence over the `Accept` header.
    pub response_type: Option<String>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_response_type(mut self, content_type: impl Into<String>) -> Self {
        self.response_type = Some(content_type.into());
        self
    }

    /// The raw `Accept` header, if present and readable.
    pub fn accept(&self) -> Option<&str> {
        self.headers.get(ACCEPT).and_then(|v| v.to_str().ok())
    }
}

/// Severity attached to a flash message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlashStatus {
    #[default]
    Ok,
    Info,
    Warning,
    Error,
}

impl FlashStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlashStatus::Ok => "ok",
            FlashStatus::Info => "info",
            FlashStatus::Warning => "warning",
            FlashStatus::Error => "error",
        }
    }
}

impl fmt::Display for FlashStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A one-shot message to surface on the next rendered page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashMessage {
    pub message: String,
    pub status: FlashStatus,
}

/// The outgoing response being prepared.
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Pending flash message. The serving layer persists it for the next page.
    pub flash: Option<FlashMessage>,
}

impl Response {
    /// The `Content-Type` header, if set.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    pub fn set_content_type(&mut self, content_type: &str) -> Result<(), InvalidHeaderValue> {
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_str(content_type)?);
        Ok(())
    }

    /// Removes a `Content-Type` header whose value is empty.
    pub(crate) fn drop_blank_content_type(&mut self) {
        if self
            .headers
            .get(CONTENT_TYPE)
            .is_some_and(|value| value.is_empty())
        {
            self.headers.remove(CONTENT_TYPE);
        }
    }
}

/// Render inputs captured for inspection when a request runs under a test
/// harness.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestingVariables {
    /// Namespace handed to the template engine, after exclusions.
    pub namespace: Option<Params>,
    pub template_name: Option<String>,
    pub exclude_names: Vec<String>,
    pub render_params: Params,
    /// The mapping the action returned, as rendered: excluded keys are gone.
    pub controller_output: Option<Params>,
}

/// Type-keyed container for per-request state.
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value, returning the previous one of the same type.
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.map
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast().ok().map(|b| *b))
    }

    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref())
    }

    pub fn get_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.map
            .get_mut(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_mut())
    }

    /// Like [`get`](Self::get), but a missing value is an error.
    pub fn get_required<T: 'static>(&self) -> Result<&T, anyhow::Error> {
        self.get::<T>().ok_or_else(|| {
            anyhow::anyhow!(
                "Extension missing: type {} not found in request context",
                std::any::type_name::<T>()
            )
        })
    }

    pub fn remove<T: 'static>(&mut self) -> Option<T> {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast().ok().map(|b| *b))
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.map.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl fmt::Debug for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extensions")
            .field("len", &self.map.len())
            .finish_non_exhaustive()
    }
}

/// Everything one request carries through dispatch.
#[derive(Debug)]
pub struct RequestContext {
    pub request: Request,
    pub response: Response,
    /// Read-only configuration snapshot.
    pub config: Arc<DispatchConfig>,
    /// Validation outcome of the current call. Reset at the start of each call.
    pub validation: ValidationStatus,
    /// Per-request state shared between hooks and actions.
    pub extensions: Extensions,
    /// Render inputs recorded for test harnesses; `None` in normal operation.
    pub testing: Option<TestingVariables>,
    template_override: Option<TemplateSpec>,
}

impl RequestContext {
    pub fn new(request: Request, config: Arc<DispatchConfig>) -> Self {
        Self {
            request,
            response: Response::default(),
            config,
            validation: ValidationStatus::default(),
            extensions: Extensions::new(),
            testing: None,
            template_override: None,
        }
    }

    /// Enables recording of render inputs into [`testing`](Self::testing).
    pub fn with_testing(mut self) -> Self {
        self.testing = Some(TestingVariables::default());
        self
    }

    /// Queues a flash message, replacing any pending one.
    pub fn flash(&mut self, message: impl Into<String>, status: FlashStatus) {
        self.response.flash = Some(FlashMessage {
            message: message.into(),
            status,
        });
    }

    /// Renders this request with another template than the one exposed.
    ///
    /// `spec` uses the same `engine:template` form as
    /// [`Exposition::new`](crate::Exposition::new); a spec without an engine
    /// keeps the engine of the selected exposition.
    pub fn override_template(&mut self, spec: &str) {
        self.template_override = Some(TemplateSpec::parse(spec));
    }

    pub fn template_override(&self) -> Option<&TemplateSpec> {
        self.template_override.as_ref()
    }
}
