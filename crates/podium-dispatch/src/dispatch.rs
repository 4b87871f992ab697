//! The dispatch orchestrator.
//!
//! [`Dispatcher::handle`] is the entry point for a routed request: it guards
//! the controller, resolves the action and runs [`Dispatcher::call`], which
//! sequences hooks, validation, error handler selection, the action call and
//! rendering.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, debug_span, trace};

use crate::classify::classify_failure;
use crate::config::DispatchConfig;
use crate::context::{Request, RequestContext};
use crate::controller::Controller;
use crate::decoration::ControllerWrapper;
use crate::error::DispatchError;
use crate::handler::{Action, Output};
use crate::hooks::{HookError, Hooks};
use crate::params::{bind_remainder, decode_remainder, flatten_arguments, Arguments, Params};
use crate::render::{json_render, render_response, RenderResult, TemplateRenderer};
use crate::security::check_security;
use crate::validation::{run_validations, ValidationStatus};

/// Runs decorated actions.
///
/// Holds what is shared by every request: configuration, application-wide
/// hooks, the template renderer and application-wide controller wrappers.
#[derive(Clone)]
pub struct Dispatcher {
    config: Arc<DispatchConfig>,
    hooks: Hooks,
    renderer: Arc<dyn TemplateRenderer>,
    wrappers: Vec<ControllerWrapper>,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    pub fn config(&self) -> &Arc<DispatchConfig> {
        &self.config
    }

    /// Application-wide hooks; they run before each action's own hooks.
    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    /// A fresh context for `request`, sharing this dispatcher's configuration.
    pub fn context(&self, request: Request) -> RequestContext {
        RequestContext::new(request, Arc::clone(&self.config))
    }

    /// Dispatches a routed request to `controller.action_name`.
    ///
    /// Ignored parameters are dropped, the controller's guard is checked and
    /// the action must exist and be exposed.
    pub fn handle(
        &self,
        controller: &Controller,
        action_name: &str,
        ctx: &mut RequestContext,
        mut params: Params,
        remainder: &[String],
    ) -> Result<String, DispatchError> {
        let span = debug_span!("dispatch", controller = controller.name(), action = action_name);
        let _guard = span.enter();

        for name in &self.config.ignore_parameters {
            params.remove(name);
        }

        check_security(controller, ctx)?;

        let action = controller
            .action(action_name)
            .ok_or_else(|| DispatchError::UnknownAction(action_name.to_string()))?;
        if !action.decoration().exposed() {
            return Err(DispatchError::NotExposed(action_name.to_string()));
        }

        self.call(controller, &action, ctx, params, remainder)
    }

    /// Runs `action` with `params` and the path `remainder`, returning the
    /// rendered body.
    ///
    /// When validation fails the action's error handler runs instead, with the
    /// raw remainder and parameters (or the parameters it validated itself
    /// when it chains validation).
    pub fn call(
        &self,
        controller: &Controller,
        action: &Arc<Action>,
        ctx: &mut RequestContext,
        mut params: Params,
        remainder: &[String],
    ) -> Result<String, DispatchError> {
        ctx.validation = ValidationStatus::default();
        ctx.response.drop_blank_content_type();
        let remainder = decode_remainder(remainder);

        trace!(hook = "before_validate", action = action.name());
        self.hooks.run_before_validate(ctx, &remainder, &mut params)?;
        action
            .decoration()
            .hooks()
            .run_before_validate(ctx, &remainder, &mut params)?;

        let validate_params = bind_remainder(action.arg_names(), &params, &remainder);
        let (action, mut args) =
            match run_validations(action, validate_params.clone(), &mut ctx.validation) {
                Ok(validated) => {
                    ctx.validation.values = Value::Object(validated.clone());
                    let args = flatten_arguments(action.arg_names(), validated, &remainder);
                    (Arc::clone(action), args)
                }
                Err(failure) => {
                    debug!(action = action.name(), %failure, "validation failed");
                    let mut selection =
                        classify_failure(controller, action, failure, &mut ctx.validation)?;
                    while selection.chain_validation {
                        let handler = Arc::clone(&selection.handler);
                        let revalidated = run_validations(
                            &handler,
                            validate_params.clone(),
                            &mut ctx.validation,
                        );
                        match revalidated {
                            Ok(validated) => {
                                params = validated;
                                break;
                            }
                            Err(failure) => {
                                debug!(action = handler.name(), %failure, "chained validation failed");
                                selection = classify_failure(
                                    controller,
                                    &handler,
                                    failure,
                                    &mut ctx.validation,
                                )?;
                            }
                        }
                    }
                    debug!(
                        action = action.name(),
                        error_handler = selection.handler.name(),
                        "switching to error handler"
                    );
                    let positional = remainder.iter().cloned().map(Value::String).collect();
                    (selection.handler, Arguments::new(positional, params))
                }
            };

        trace!(hook = "before_call", action = action.name());
        self.hooks.run_before_call(ctx, &mut args)?;
        action.decoration().hooks().run_before_call(ctx, &mut args)?;

        let caller = action.decoration().controller_caller(&self.wrappers);
        let mut output = caller(self.config.as_ref(), ctx, action.as_ref(), args.clone())
            .map_err(DispatchError::from_controller)?;

        trace!(hook = "before_render", action = action.name());
        self.hooks.run_before_render(ctx, &args, &mut output)?;
        action
            .decoration()
            .hooks()
            .run_before_render(ctx, &args, &mut output)?;

        let mut result = render_response(self.renderer.as_ref(), ctx, &action, output)?;

        trace!(hook = "after_render", action = action.name());
        self.hooks.run_after_render(ctx, &mut result)?;
        action
            .decoration()
            .hooks()
            .run_after_render(ctx, &mut result)?;

        Ok(result.body)
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .field("hooks", &self.hooks)
            .field("wrapper_count", &self.wrappers.len())
            .finish_non_exhaustive()
    }
}

/// Builds a [`Dispatcher`].
#[derive(Default)]
pub struct DispatcherBuilder {
    config: DispatchConfig,
    hooks: Hooks,
    renderer: Option<Arc<dyn TemplateRenderer>>,
    wrappers: Vec<ControllerWrapper>,
}

impl DispatcherBuilder {
    pub fn config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the application-wide hooks.
    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn before_validate<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut RequestContext, &[String], &mut Params) -> Result<(), HookError>
            + Send
            + Sync
            + 'static,
    {
        self.hooks = self.hooks.before_validate(f);
        self
    }

    pub fn before_call<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut RequestContext, &mut Arguments) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.hooks = self.hooks.before_call(f);
        self
    }

    pub fn before_render<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut RequestContext, &Arguments, &mut Output) -> Result<(), HookError>
            + Send
            + Sync
            + 'static,
    {
        self.hooks = self.hooks.before_render(f);
        self
    }

    pub fn after_render<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut RequestContext, &mut RenderResult) -> Result<(), HookError>
            + Send
            + Sync
            + 'static,
    {
        self.hooks = self.hooks.after_render(f);
        self
    }

    /// Sets the template renderer. Defaults to [`json_render`].
    pub fn renderer(mut self, renderer: Arc<dyn TemplateRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Wraps every action call. Application wrappers surround the wrappers
    /// declared on each action; later ones are outermost.
    pub fn wrap(mut self, wrapper: ControllerWrapper) -> Self {
        self.wrappers.push(wrapper);
        self
    }

    pub fn build(self) -> Dispatcher {
        Dispatcher {
            config: Arc::new(self.config),
            hooks: self.hooks,
            renderer: self.renderer.unwrap_or_else(json_render),
            wrappers: self.wrappers,
        }
    }
}
