//! Lifecycle hooks fired around an action call.
//!
//! # Pipeline Position
//!
//! ```text
//! remainder + params
//!   → BEFORE_VALIDATE ← (normalize or inspect raw parameters)
//!   → validation / error handler selection
//!   → BEFORE_CALL     ← (inject request state, audit)
//!   → action
//!   → BEFORE_RENDER   ← (add or drop namespace entries)
//!   → template rendering
//!   → AFTER_RENDER    ← (post-process the rendered body)
//! ```
//!
//! Hooks come from two places: application-wide hooks registered on the
//! [`Dispatcher`](crate::Dispatcher), and per-action hooks registered on the
//! action's [`Decoration`](crate::Decoration). For each event the global hooks
//! run first, then the action's own, each list in registration order. A hook
//! returning an error aborts the request.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::context::RequestContext;
use crate::handler::Output;
use crate::params::{Arguments, Params};
use crate::render::RenderResult;

/// The points in the pipeline where hooks are notified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    BeforeValidate,
    BeforeCall,
    BeforeRender,
    AfterRender,
}

impl HookEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookEvent::BeforeValidate => "before_validate",
            HookEvent::BeforeCall => "before_call",
            HookEvent::BeforeRender => "before_render",
            HookEvent::AfterRender => "after_render",
        }
    }
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by a hook.
#[derive(Debug, Error)]
#[error("hook error ({event}): {message}")]
pub struct HookError {
    /// Human-readable error message
    pub message: String,
    /// The event being notified when the hook failed
    pub event: HookEvent,
    /// The underlying error source, if any
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl HookError {
    pub fn new(event: HookEvent, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            event,
            source: None,
        }
    }

    pub fn before_validate(message: impl Into<String>) -> Self {
        Self::new(HookEvent::BeforeValidate, message)
    }

    pub fn before_call(message: impl Into<String>) -> Self {
        Self::new(HookEvent::BeforeCall, message)
    }

    pub fn before_render(message: impl Into<String>) -> Self {
        Self::new(HookEvent::BeforeRender, message)
    }

    pub fn after_render(message: impl Into<String>) -> Self {
        Self::new(HookEvent::AfterRender, message)
    }

    /// Sets the source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    {
        self.source = Some(source.into());
        self
    }
}

/// Receives the decoded remainder and the raw parameters, which it may edit.
pub type BeforeValidateFn =
    Arc<dyn Fn(&mut RequestContext, &[String], &mut Params) -> Result<(), HookError> + Send + Sync>;

/// Receives the arguments the action is about to be called with.
pub type BeforeCallFn =
    Arc<dyn Fn(&mut RequestContext, &mut Arguments) -> Result<(), HookError> + Send + Sync>;

/// Receives the action's raw output before it is rendered.
pub type BeforeRenderFn = Arc<
    dyn Fn(&mut RequestContext, &Arguments, &mut Output) -> Result<(), HookError> + Send + Sync,
>;

/// Receives the rendered result.
pub type AfterRenderFn =
    Arc<dyn Fn(&mut RequestContext, &mut RenderResult) -> Result<(), HookError> + Send + Sync>;

/// An ordered set of hooks for each [`HookEvent`].
#[derive(Clone, Default)]
pub struct Hooks {
    before_validate: Vec<BeforeValidateFn>,
    before_call: Vec<BeforeCallFn>,
    before_render: Vec<BeforeRenderFn>,
    after_render: Vec<AfterRenderFn>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if no hooks are registered.
    pub fn is_empty(&self) -> bool {
        self.before_validate.is_empty()
            && self.before_call.is_empty()
            && self.before_render.is_empty()
            && self.after_render.is_empty()
    }

    /// Number of hooks registered for `event`.
    pub fn count(&self, event: HookEvent) -> usize {
        match event {
            HookEvent::BeforeValidate => self.before_validate.len(),
            HookEvent::BeforeCall => self.before_call.len(),
            HookEvent::BeforeRender => self.before_render.len(),
            HookEvent::AfterRender => self.after_render.len(),
        }
    }

    pub fn before_validate<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut RequestContext, &[String], &mut Params) -> Result<(), HookError>
            + Send
            + Sync
            + 'static,
    {
        self.before_validate.push(Arc::new(f));
        self
    }

    /// Adds a `before_call` hook.
    ///
    /// # Example
    ///
    /// ```rust
    /// use podium_dispatch::{Hooks, HookError};
    ///
    /// let hooks = Hooks::new().before_call(|_ctx, args| {
    ///     if args.get("id").is_none() {
    ///         return Err(HookError::before_call("missing id"));
    ///     }
    ///     Ok(())
    /// });
    /// assert!(!hooks.is_empty());
    /// ```
    pub fn before_call<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut RequestContext, &mut Arguments) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.before_call.push(Arc::new(f));
        self
    }

    pub fn before_render<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut RequestContext, &Arguments, &mut Output) -> Result<(), HookError>
            + Send
            + Sync
            + 'static,
    {
        self.before_render.push(Arc::new(f));
        self
    }

    pub fn after_render<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut RequestContext, &mut RenderResult) -> Result<(), HookError>
            + Send
            + Sync
            + 'static,
    {
        self.after_render.push(Arc::new(f));
        self
    }

    /// Prepends `parent`'s hooks to these, event by event.
    pub fn inherit_from(&mut self, parent: &Hooks) {
        fn prepend<T: Clone>(own: &mut Vec<T>, parent: &[T]) {
            let mut merged = parent.to_vec();
            merged.append(own);
            *own = merged;
        }
        prepend(&mut self.before_validate, &parent.before_validate);
        prepend(&mut self.before_call, &parent.before_call);
        prepend(&mut self.before_render, &parent.before_render);
        prepend(&mut self.after_render, &parent.after_render);
    }

    pub fn run_before_validate(
        &self,
        ctx: &mut RequestContext,
        remainder: &[String],
        params: &mut Params,
    ) -> Result<(), HookError> {
        for hook in &self.before_validate {
            hook(ctx, remainder, params)?;
        }
        Ok(())
    }

    pub fn run_before_call(
        &self,
        ctx: &mut RequestContext,
        args: &mut Arguments,
    ) -> Result<(), HookError> {
        for hook in &self.before_call {
            hook(ctx, args)?;
        }
        Ok(())
    }

    pub fn run_before_render(
        &self,
        ctx: &mut RequestContext,
        args: &Arguments,
        output: &mut Output,
    ) -> Result<(), HookError> {
        for hook in &self.before_render {
            hook(ctx, args, output)?;
        }
        Ok(())
    }

    pub fn run_after_render(
        &self,
        ctx: &mut RequestContext,
        result: &mut RenderResult,
    ) -> Result<(), HookError> {
        for hook in &self.after_render {
            hook(ctx, result)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("before_validate_count", &self.before_validate.len())
            .field("before_call_count", &self.before_call.len())
            .field("before_render_count", &self.before_render.len())
            .field("after_render_count", &self.after_render.len())
            .finish()
    }
}
