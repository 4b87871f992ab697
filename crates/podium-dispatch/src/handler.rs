//! Action handler types.
//!
//! An [`Action`] is one exposed controller method: the handler that does the
//! work, the argument names it declares, and the [`Decoration`] that controls
//! how it is validated, hooked and rendered.
//!
//! Handlers only produce data. They return an [`Output`]: either a namespace
//! for the template engine or an already finished body. Template selection
//! and content type are the decoration's business.

use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::context::RequestContext;
use crate::decoration::Decoration;
use crate::params::{Arguments, Params};

/// What an action produces.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// Namespace to render through the selected template engine.
    Render(Params),
    /// A finished body, returned as-is without template lookup.
    Body(String),
}

impl Output {
    pub fn is_render(&self) -> bool {
        matches!(self, Output::Render(_))
    }

    pub fn is_body(&self) -> bool {
        matches!(self, Output::Body(_))
    }

    pub fn as_namespace(&self) -> Option<&Params> {
        match self {
            Output::Render(namespace) => Some(namespace),
            Output::Body(_) => None,
        }
    }

    pub fn as_body(&self) -> Option<&str> {
        match self {
            Output::Body(body) => Some(body),
            Output::Render(_) => None,
        }
    }
}

impl From<Params> for Output {
    fn from(namespace: Params) -> Self {
        Output::Render(namespace)
    }
}

impl From<String> for Output {
    fn from(body: String) -> Self {
        Output::Body(body)
    }
}

impl From<&str> for Output {
    fn from(body: &str) -> Self {
        Output::Body(body.to_string())
    }
}

/// Objects render, strings are bodies, anything else is serialized as a body.
impl From<Value> for Output {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(namespace) => Output::Render(namespace),
            Value::String(body) => Output::Body(body),
            other => Output::Body(other.to_string()),
        }
    }
}

/// The result type for action handlers.
pub type ActionResult = Result<Output, anyhow::Error>;

/// Types that can be turned into an [`ActionResult`].
///
/// Lets handler closures return `Result<T, E>` for any `T: Into<Output>` and
/// any error convertible into `anyhow::Error`.
pub trait IntoActionResult {
    fn into_action_result(self) -> ActionResult;
}

impl<T, E> IntoActionResult for Result<T, E>
where
    T: Into<Output>,
    E: Into<anyhow::Error>,
{
    fn into_action_result(self) -> ActionResult {
        self.map(Into::into).map_err(Into::into)
    }
}

/// Trait for action handlers.
///
/// Handlers are shared between requests, so they take `&self`; per-request
/// state belongs in the [`RequestContext`].
///
/// # Example
///
/// ```rust
/// use podium_dispatch::{ActionHandler, ActionResult, Arguments, Output, RequestContext};
///
/// struct Greeter { greeting: String }
///
/// impl ActionHandler for Greeter {
///     fn call(&self, _ctx: &mut RequestContext, args: Arguments) -> ActionResult {
///         let name = args.get_str("name").unwrap_or("world");
///         Ok(Output::Body(format!("{}, {}!", self.greeting, name)))
///     }
/// }
/// ```
pub trait ActionHandler: Send + Sync {
    fn call(&self, ctx: &mut RequestContext, args: Arguments) -> ActionResult;
}

/// Adapts a closure into an [`ActionHandler`].
pub struct FnHandler<F, R> {
    f: F,
    _phantom: PhantomData<fn() -> R>,
}

impl<F, R> FnHandler<F, R>
where
    F: Fn(&mut RequestContext, Arguments) -> R + Send + Sync,
    R: IntoActionResult,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _phantom: PhantomData,
        }
    }
}

impl<F, R> ActionHandler for FnHandler<F, R>
where
    F: Fn(&mut RequestContext, Arguments) -> R + Send + Sync,
    R: IntoActionResult,
{
    fn call(&self, ctx: &mut RequestContext, args: Arguments) -> ActionResult {
        (self.f)(ctx, args).into_action_result()
    }
}

/// A controller method together with its decoration.
#[derive(Clone)]
pub struct Action {
    name: String,
    handler: Arc<dyn ActionHandler>,
    arg_names: Vec<String>,
    decoration: Decoration,
}

impl Action {
    /// Creates an action from a closure.
    pub fn new<F, R>(f: F) -> Self
    where
        F: Fn(&mut RequestContext, Arguments) -> R + Send + Sync + 'static,
        R: IntoActionResult + 'static,
    {
        Self::from_handler(FnHandler::new(f))
    }

    pub fn from_handler<H: ActionHandler + 'static>(handler: H) -> Self {
        Self {
            name: String::new(),
            handler: Arc::new(handler),
            arg_names: Vec::new(),
            decoration: Decoration::default(),
        }
    }

    /// Declares the handler's argument names, in positional order.
    pub fn args<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arg_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Attaches the decoration built for this action.
    pub fn decorate(mut self, decoration: Decoration) -> Self {
        self.decoration = decoration;
        self
    }

    pub(crate) fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arg_names(&self) -> &[String] {
        &self.arg_names
    }

    pub fn decoration(&self) -> &Decoration {
        &self.decoration
    }

    pub(crate) fn decoration_mut(&mut self) -> &mut Decoration {
        &mut self.decoration
    }

    /// Calls the handler directly, bypassing decoration wrappers.
    pub fn invoke(&self, ctx: &mut RequestContext, args: Arguments) -> ActionResult {
        self.handler.call(ctx, args)
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("arg_names", &self.arg_names)
            .field("decoration", &self.decoration)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatchConfig;
    use crate::context::Request;
    use serde_json::json;

    fn test_context() -> RequestContext {
        RequestContext::new(Request::get("/"), Arc::new(DispatchConfig::default()))
    }

    #[test]
    fn test_output_from_value() {
        assert!(Output::from(json!({"a": 1})).is_render());
        assert_eq!(Output::from(json!("done")).as_body(), Some("done"));
        assert_eq!(Output::from(json!(42)).as_body(), Some("42"));
    }

    #[test]
    fn test_output_accessors() {
        let output = Output::Body("x".into());
        assert!(output.is_body());
        assert!(output.as_namespace().is_none());
    }

    #[test]
    fn test_into_action_result_ok() {
        let result: Result<&str, anyhow::Error> = Ok("hello");
        let output = result.into_action_result().unwrap();
        assert_eq!(output, Output::Body("hello".into()));
    }

    #[test]
    fn test_into_action_result_custom_error() {
        #[derive(Debug)]
        struct CustomError;

        impl fmt::Display for CustomError {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "CustomError")
            }
        }

        impl std::error::Error for CustomError {}

        let result: Result<String, CustomError> = Err(CustomError);
        let err = result.into_action_result().unwrap_err();
        assert!(err.to_string().contains("CustomError"));
    }

    #[test]
    fn test_action_new_and_invoke() {
        let action = Action::new(|_ctx: &mut RequestContext, args: Arguments| {
            Ok::<_, anyhow::Error>(json!({ "id": args.get("id").cloned() }))
        })
        .args(["id"])
        .named("show");

        assert_eq!(action.name(), "show");
        assert_eq!(action.arg_names(), ["id".to_string()]);

        let mut named = Params::new();
        named.insert("id".into(), json!("7"));
        let mut ctx = test_context();
        let output = action
            .invoke(&mut ctx, Arguments::new(Vec::new(), named))
            .unwrap();
        assert_eq!(output.as_namespace().unwrap()["id"], json!("7"));
    }

    #[test]
    fn test_struct_handler() {
        struct Greeter {
            greeting: &'static str,
        }

        impl ActionHandler for Greeter {
            fn call(&self, _ctx: &mut RequestContext, _args: Arguments) -> ActionResult {
                Ok(Output::Body(self.greeting.to_string()))
            }
        }

        let action = Action::from_handler(Greeter { greeting: "hi" });
        let mut ctx = test_context();
        let output = action.invoke(&mut ctx, Arguments::default()).unwrap();
        assert_eq!(output.as_body(), Some("hi"));
    }

    #[test]
    fn test_handler_error_propagates() {
        let action = Action::new(|_ctx: &mut RequestContext, _args: Arguments| {
            Err::<String, _>(anyhow::anyhow!("boom"))
        });
        let mut ctx = test_context();
        let err = action.invoke(&mut ctx, Arguments::default()).unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }
}
