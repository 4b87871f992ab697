//! Decorated action dispatch for web controllers.
//!
//! `podium-dispatch` is the glue between a router and the actions it resolves.
//! Given a controller, an action name, request parameters and the unconsumed
//! path remainder, it:
//!
//! - checks the controller's authorization guard (401/403 with a flash message)
//! - notifies `before_validate` hooks and binds the remainder to argument names
//! - runs the action's validations, and on failure classifies the error and
//!   switches to the configured error handler (optionally validating it too)
//! - notifies `before_call` hooks and calls the action through its wrappers
//! - notifies `before_render` hooks, picks an engine and template by content
//!   negotiation and renders the namespace
//! - notifies `after_render` hooks and returns the body
//!
//! Every step receives the per-request [`RequestContext`] explicitly.
//!
//! # Example
//!
//! ```rust
//! use podium_dispatch::{
//!     Action, Arguments, Controller, Decoration, Dispatcher, Request, RequestContext,
//! };
//! use serde_json::json;
//!
//! let users = Controller::builder("users")
//!     .action(
//!         "show",
//!         Action::new(|_ctx: &mut RequestContext, args: Arguments| {
//!             Ok::<_, anyhow::Error>(json!({ "id": args.get_str("id") }))
//!         })
//!         .args(["id"])
//!         .decorate(Decoration::builder().expose("json").build()),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let dispatcher = Dispatcher::builder().build();
//! let mut ctx = dispatcher.context(Request::get("/users/show/7"));
//! let body = dispatcher
//!     .handle(&users, "show", &mut ctx, Default::default(), &["7".to_string()])
//!     .unwrap();
//!
//! assert_eq!(body, "{\n  \"id\": \"7\"\n}");
//! assert_eq!(ctx.response.content_type(), Some("application/json; charset=utf-8"));
//! ```
//!
//! # Rendering
//!
//! Dispatch does not know about template languages. It hands the namespace,
//! engine name, template name and render parameters to a [`TemplateRenderer`];
//! the `podium-render` crate provides MiniJinja and JSON engines behind one.

mod classify;
mod config;
mod context;
mod controller;
mod decoration;
mod dispatch;
mod error;
mod handler;
mod hooks;
mod params;
mod render;
mod security;
mod validation;

pub use classify::{
    classify_failure, parse_error_text, widget_fields, ErrorHandlerSelection, FORM_ERROR_KEY,
};

pub use config::{ConfigError, DispatchConfig};

pub use context::{
    Extensions, FlashMessage, FlashStatus, Identity, Request, RequestContext, Response,
    TestingVariables,
};

pub use controller::{BuildError, Controller, ControllerBuilder};

pub use decoration::{
    call_action, compose_caller, ControllerCaller, ControllerWrapper, Decoration,
    DecorationBuilder, EngineSelection, Exposition, TemplateSpec, HTML_CONTENT_TYPE,
    JSON_CONTENT_TYPE,
};

pub use dispatch::{Dispatcher, DispatcherBuilder};

pub use error::{abort, DispatchError};

pub use handler::{Action, ActionHandler, ActionResult, FnHandler, IntoActionResult, Output};

pub use hooks::{
    AfterRenderFn, BeforeCallFn, BeforeRenderFn, BeforeValidateFn, HookError, HookEvent, Hooks,
};

pub use params::{
    bind_remainder, decode_remainder, flatten_arguments, unquote, variable_decode, Arguments,
    Params,
};

pub use render::{
    from_fn, json_render, render_response, with_default_charset, RenderError, RenderResult,
    TemplateRenderer,
};

pub use security::{
    check_security, deny, has_permission, in_group, not_anonymous, predicate_fn, AllowOnly,
    FailedAuthorizationFn, HasPermission, InGroup, NotAnonymous, NotAuthorized, Predicate,
    Require, Requirement,
};

pub use validation::{
    run_validations, validator_fn, FieldCheck, FieldValidators, ValidationFailure,
    ValidationIntent, ValidationStatus, Validator, Widget,
};
