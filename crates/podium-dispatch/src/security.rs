//! Controller-level authorization.
//!
//! A controller may carry an [`AllowOnly`] guard that is checked before any of
//! its actions run. A guard is either a bare [`Predicate`], in which case the
//! dispatcher builds the denial itself, or a full [`Requirement`] that builds
//! its own response.

use http::StatusCode;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

use crate::context::{FlashStatus, Request, RequestContext};
use crate::controller::Controller;
use crate::error::DispatchError;

/// A predicate was not met. The reason is shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct NotAuthorized {
    pub reason: String,
}

impl NotAuthorized {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// A condition on the incoming request.
pub trait Predicate: Send + Sync {
    fn check_authorization(&self, request: &Request) -> Result<(), NotAuthorized>;

    fn is_met(&self, request: &Request) -> bool {
        self.check_authorization(request).is_ok()
    }
}

/// A guard that produces the denial response itself.
pub trait Requirement: Send + Sync {
    fn check_authorization(&self, ctx: &mut RequestContext) -> Result<(), DispatchError>;
}

/// A controller's authorization guard.
#[derive(Clone)]
pub enum AllowOnly {
    Predicate(Arc<dyn Predicate>),
    Requirement(Arc<dyn Requirement>),
}

impl AllowOnly {
    pub fn predicate<P: Predicate + 'static>(predicate: P) -> Self {
        AllowOnly::Predicate(Arc::new(predicate))
    }

    pub fn requirement<R: Requirement + 'static>(requirement: R) -> Self {
        AllowOnly::Requirement(Arc::new(requirement))
    }
}

impl fmt::Debug for AllowOnly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllowOnly::Predicate(_) => f.write_str("AllowOnly::Predicate"),
            AllowOnly::Requirement(_) => f.write_str("AllowOnly::Requirement"),
        }
    }
}

/// Called with the denial reason before a predicate denial is answered.
///
/// Returning an error replaces the default 401/403 answer.
pub type FailedAuthorizationFn =
    Arc<dyn Fn(&mut RequestContext, &str) -> Result<(), DispatchError> + Send + Sync>;

/// Requires an authenticated identity.
#[derive(Debug, Clone, Default)]
pub struct NotAnonymous;

pub fn not_anonymous() -> NotAnonymous {
    NotAnonymous
}

impl Predicate for NotAnonymous {
    fn check_authorization(&self, request: &Request) -> Result<(), NotAuthorized> {
        match request.identity {
            Some(_) => Ok(()),
            None => Err(NotAuthorized::new(
                "The current user must have been authenticated",
            )),
        }
    }
}

/// Requires the identity to hold a permission.
#[derive(Debug, Clone)]
pub struct HasPermission {
    permission: String,
}

pub fn has_permission(permission: impl Into<String>) -> HasPermission {
    HasPermission {
        permission: permission.into(),
    }
}

impl Predicate for HasPermission {
    fn check_authorization(&self, request: &Request) -> Result<(), NotAuthorized> {
        let granted = request
            .identity
            .as_ref()
            .is_some_and(|identity| identity.permissions.contains(&self.permission));
        if granted {
            Ok(())
        } else {
            Err(NotAuthorized::new(format!(
                "The user must have the \"{}\" permission",
                self.permission
            )))
        }
    }
}

/// Requires the identity to belong to a group.
#[derive(Debug, Clone)]
pub struct InGroup {
    group: String,
}

pub fn in_group(group: impl Into<String>) -> InGroup {
    InGroup {
        group: group.into(),
    }
}

impl Predicate for InGroup {
    fn check_authorization(&self, request: &Request) -> Result<(), NotAuthorized> {
        let member = request
            .identity
            .as_ref()
            .is_some_and(|identity| identity.groups.contains(&self.group));
        if member {
            Ok(())
        } else {
            Err(NotAuthorized::new(format!(
                "The current user must belong to the group \"{}\"",
                self.group
            )))
        }
    }
}

struct FnPredicate<F>(F);

impl<F> Predicate for FnPredicate<F>
where
    F: Fn(&Request) -> Result<(), NotAuthorized> + Send + Sync,
{
    fn check_authorization(&self, request: &Request) -> Result<(), NotAuthorized> {
        (self.0)(request)
    }
}

/// Creates a predicate from a closure.
pub fn predicate_fn<F>(f: F) -> impl Predicate
where
    F: Fn(&Request) -> Result<(), NotAuthorized> + Send + Sync + 'static,
{
    FnPredicate(f)
}

/// Answers a denial: 403 with an error flash for authenticated users, 401 with
/// a warning flash otherwise.
pub fn deny(ctx: &mut RequestContext, reason: &str) -> DispatchError {
    let (status, flash) = if not_anonymous().is_met(&ctx.request) {
        (StatusCode::FORBIDDEN, FlashStatus::Error)
    } else {
        (StatusCode::UNAUTHORIZED, FlashStatus::Warning)
    };
    warn!(status = status.as_u16(), path = %ctx.request.path, reason, "authorization denied");
    ctx.response.status = status;
    ctx.flash(reason, flash);
    DispatchError::Abort {
        status,
        comment: reason.to_string(),
    }
}

/// Checks `controller`'s guard against the current request.
pub fn check_security(
    controller: &Controller,
    ctx: &mut RequestContext,
) -> Result<(), DispatchError> {
    let predicate = match controller.allow_only() {
        None => return Ok(()),
        Some(AllowOnly::Requirement(requirement)) => return requirement.check_authorization(ctx),
        Some(AllowOnly::Predicate(predicate)) => predicate,
    };

    if let Err(denied) = predicate.check_authorization(&ctx.request) {
        if let Some(hook) = controller.failed_authorization() {
            hook(ctx, &denied.reason)?;
        }
        return Err(deny(ctx, &denied.reason));
    }
    Ok(())
}

/// A predicate with an optional custom denial.
///
/// Without a denial handler it answers exactly like a bare predicate guard.
#[derive(Clone)]
pub struct Require {
    predicate: Arc<dyn Predicate>,
    denial_handler: Option<FailedAuthorizationFn>,
}

impl Require {
    pub fn new<P: Predicate + 'static>(predicate: P) -> Self {
        Self {
            predicate: Arc::new(predicate),
            denial_handler: None,
        }
    }

    /// Runs `handler` instead of the default denial. Returning `Ok` still
    /// denies with the default answer.
    pub fn on_denial<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut RequestContext, &str) -> Result<(), DispatchError> + Send + Sync + 'static,
    {
        self.denial_handler = Some(Arc::new(handler));
        self
    }
}

impl Requirement for Require {
    fn check_authorization(&self, ctx: &mut RequestContext) -> Result<(), DispatchError> {
        let Err(denied) = self.predicate.check_authorization(&ctx.request) else {
            return Ok(());
        };
        if let Some(handler) = &self.denial_handler {
            handler(ctx, &denied.reason)?;
        }
        Err(deny(ctx, &denied.reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatchConfig;
    use crate::context::Identity;
    use crate::handler::Action;
    use crate::params::Arguments;

    fn context(identity: Option<Identity>) -> RequestContext {
        let mut request = Request::get("/admin");
        request.identity = identity;
        RequestContext::new(request, Arc::new(DispatchConfig::default()))
    }

    fn guarded(allow_only: AllowOnly) -> Arc<Controller> {
        Controller::builder("admin")
            .allow_only(allow_only)
            .action(
                "index",
                Action::new(|_ctx: &mut RequestContext, _args: Arguments| {
                    Ok::<_, anyhow::Error>("ok")
                }),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_unguarded_controller_allows() {
        let controller = Controller::builder("open").build().unwrap();
        assert!(check_security(&controller, &mut context(None)).is_ok());
    }

    #[test]
    fn test_anonymous_gets_401_warning() {
        let controller = guarded(AllowOnly::predicate(not_anonymous()));
        let mut ctx = context(None);
        let err = check_security(&controller, &mut ctx).unwrap_err();

        assert!(matches!(
            &err,
            DispatchError::Abort { status, comment }
                if *status == StatusCode::UNAUTHORIZED
                    && comment == "The current user must have been authenticated"
        ));
        assert_eq!(ctx.response.status, StatusCode::UNAUTHORIZED);
        let flash = ctx.response.flash.unwrap();
        assert_eq!(flash.status, FlashStatus::Warning);
        assert_eq!(flash.message, "The current user must have been authenticated");
    }

    #[test]
    fn test_authenticated_gets_403_error() {
        let controller = guarded(AllowOnly::predicate(has_permission("manage")));
        let mut ctx = context(Some(Identity::new("ada")));
        let err = check_security(&controller, &mut ctx).unwrap_err();

        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(ctx.response.status, StatusCode::FORBIDDEN);
        assert_eq!(ctx.response.flash.unwrap().status, FlashStatus::Error);
    }

    #[test]
    fn test_predicate_met() {
        let controller = guarded(AllowOnly::predicate(in_group("admins")));
        let mut ctx = context(Some(Identity::new("ada").with_group("admins")));
        assert!(check_security(&controller, &mut ctx).is_ok());
        assert_eq!(ctx.response.status, StatusCode::OK);
        assert!(ctx.response.flash.is_none());
    }

    #[test]
    fn test_failed_authorization_hook_runs_first() {
        let controller = Controller::builder("admin")
            .allow_only(AllowOnly::predicate(not_anonymous()))
            .on_failed_authorization(|ctx, reason| {
                ctx.response
                    .headers
                    .insert("x-denied", reason.len().into());
                Ok(())
            })
            .build()
            .unwrap();
        let mut ctx = context(None);
        let err = check_security(&controller, &mut ctx).unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert!(ctx.response.headers.contains_key("x-denied"));
    }

    #[test]
    fn test_failed_authorization_hook_short_circuits() {
        let controller = Controller::builder("admin")
            .allow_only(AllowOnly::predicate(not_anonymous()))
            .on_failed_authorization(|_ctx, _reason| {
                Err(crate::abort(StatusCode::FOUND, "login first"))
            })
            .build()
            .unwrap();
        let mut ctx = context(None);
        let err = check_security(&controller, &mut ctx).unwrap_err();
        assert_eq!(err.status(), StatusCode::FOUND);
        assert!(ctx.response.flash.is_none());
    }

    #[test]
    fn test_requirement_builds_own_response() {
        let require = Require::new(predicate_fn(|request| {
            if request.path.starts_with("/admin") {
                Err(NotAuthorized::new("admins only"))
            } else {
                Ok(())
            }
        }));
        let controller = guarded(AllowOnly::requirement(require));
        let mut ctx = context(None);
        let err = check_security(&controller, &mut ctx).unwrap_err();
        assert!(matches!(err, DispatchError::Abort { comment, .. } if comment == "admins only"));
        assert_eq!(ctx.response.status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_requirement_denial_handler() {
        let require = Require::new(not_anonymous())
            .on_denial(|_ctx, _reason| Err(crate::abort(StatusCode::SEE_OTHER, "/login")));
        let controller = guarded(AllowOnly::requirement(require));
        let err = check_security(&controller, &mut context(None)).unwrap_err();
        assert_eq!(err.status(), StatusCode::SEE_OTHER);
    }
}
