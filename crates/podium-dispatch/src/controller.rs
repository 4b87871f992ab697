//! Controllers: named sets of actions with an optional authorization guard.
//!
//! Controllers are assembled once with [`ControllerBuilder`] and shared
//! read-only afterwards. Inheritance is resolved at build time: actions of
//! the declared parents are copied in unless redefined, and redefined actions
//! whose decoration asks to inherit get the parents' decorations merged in.
//!
//! ```rust
//! use podium_dispatch::{Action, Arguments, Controller, Decoration, RequestContext};
//!
//! let base = Controller::builder("base")
//!     .action(
//!         "index",
//!         Action::new(|_ctx: &mut RequestContext, _args: Arguments| {
//!             Ok::<_, anyhow::Error>("base index")
//!         })
//!         .decorate(Decoration::builder().expose("json").build()),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let users = Controller::builder("users").extends(&base).build().unwrap();
//! assert!(users.is_exposed("index"));
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::context::RequestContext;
use crate::error::DispatchError;
use crate::handler::Action;
use crate::security::{AllowOnly, FailedAuthorizationFn};

/// Errors detected while assembling a controller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("{controller}.{action}: error handler \"{handler}\" is not an action of this controller")]
    UnknownErrorHandler {
        controller: String,
        action: String,
        handler: String,
    },

    #[error("{controller}.{action} is registered twice")]
    DuplicateAction { controller: String, action: String },
}

/// A named set of actions.
#[derive(Clone)]
pub struct Controller {
    name: String,
    actions: BTreeMap<String, Arc<Action>>,
    allow_only: Option<AllowOnly>,
    failed_authorization: Option<FailedAuthorizationFn>,
}

impl Controller {
    pub fn builder(name: impl Into<String>) -> ControllerBuilder {
        ControllerBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn action(&self, name: &str) -> Option<Arc<Action>> {
        self.actions.get(name).cloned()
    }

    /// Whether `name` exists and may be dispatched to from a request.
    pub fn is_exposed(&self, name: &str) -> bool {
        self.actions
            .get(name)
            .is_some_and(|action| action.decoration().exposed())
    }

    /// Actions sorted by name.
    pub fn actions(&self) -> impl Iterator<Item = &Arc<Action>> {
        self.actions.values()
    }

    pub fn allow_only(&self) -> Option<&AllowOnly> {
        self.allow_only.as_ref()
    }

    pub fn failed_authorization(&self) -> Option<&FailedAuthorizationFn> {
        self.failed_authorization.as_ref()
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("name", &self.name)
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .field("allow_only", &self.allow_only)
            .field("failed_authorization", &self.failed_authorization.is_some())
            .finish()
    }
}

/// Builds a [`Controller`].
pub struct ControllerBuilder {
    name: String,
    parents: Vec<Arc<Controller>>,
    actions: Vec<(String, Action)>,
    allow_only: Option<AllowOnly>,
    failed_authorization: Option<FailedAuthorizationFn>,
}

impl ControllerBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parents: Vec::new(),
            actions: Vec::new(),
            allow_only: None,
            failed_authorization: None,
        }
    }

    /// Declares a parent. Earlier parents take precedence over later ones.
    pub fn extends(mut self, parent: &Arc<Controller>) -> Self {
        self.parents.push(Arc::clone(parent));
        self
    }

    pub fn action(mut self, name: impl Into<String>, action: Action) -> Self {
        self.actions.push((name.into(), action));
        self
    }

    pub fn allow_only(mut self, allow_only: AllowOnly) -> Self {
        self.allow_only = Some(allow_only);
        self
    }

    pub fn on_failed_authorization<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut RequestContext, &str) -> Result<(), DispatchError> + Send + Sync + 'static,
    {
        self.failed_authorization = Some(Arc::new(f));
        self
    }

    /// Resolves inheritance and checks error handler names.
    pub fn build(self) -> Result<Arc<Controller>, BuildError> {
        let mut actions: BTreeMap<String, Arc<Action>> = BTreeMap::new();

        // Later parents first so earlier ones overwrite them.
        for parent in self.parents.iter().rev() {
            for (name, action) in &parent.actions {
                actions.insert(name.clone(), Arc::clone(action));
            }
        }

        let mut own = BTreeMap::new();
        for (name, action) in self.actions {
            if own.contains_key(&name) {
                return Err(BuildError::DuplicateAction {
                    controller: self.name,
                    action: name,
                });
            }
            let mut action = action.named(name.clone());
            if action.decoration().inherit() {
                for parent in self.parents.iter().rev() {
                    if let Some(inherited) = parent.actions.get(&name) {
                        action.decoration_mut().merge(inherited.decoration());
                    }
                }
            }
            own.insert(name, Arc::new(action));
        }
        actions.extend(own);

        for (name, action) in &actions {
            for intent in action.decoration().validations() {
                if let Some(handler) = intent.handler_name() {
                    if !actions.contains_key(handler) {
                        return Err(BuildError::UnknownErrorHandler {
                            controller: self.name,
                            action: name.clone(),
                            handler: handler.to_string(),
                        });
                    }
                }
            }
        }

        let allow_only = self
            .allow_only
            .or_else(|| self.parents.iter().find_map(|p| p.allow_only.clone()));
        let failed_authorization = self
            .failed_authorization
            .or_else(|| self.parents.iter().find_map(|p| p.failed_authorization.clone()));

        Ok(Arc::new(Controller {
            name: self.name,
            actions,
            allow_only,
            failed_authorization,
        }))
    }
}
