//! Dispatch errors.

use http::header::InvalidHeaderValue;
use http::StatusCode;
use thiserror::Error;

use crate::hooks::HookError;
use crate::render::RenderError;

/// Everything that can stop a request short of a rendered body.
///
/// Validation failures are not errors: they are redirected to the action's
/// error handler and never surface here.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The request was stopped with an HTTP status, e.g. by a failed
    /// authorization check.
    #[error("aborted with {status}: {comment}")]
    Abort { status: StatusCode, comment: String },

    #[error(transparent)]
    Hook(#[from] HookError),

    #[error(transparent)]
    Render(#[from] RenderError),

    /// The action itself failed.
    #[error(transparent)]
    Controller(anyhow::Error),

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("action is not exposed: {0}")]
    NotExposed(String),

    #[error("invalid response header: {0}")]
    InvalidHeader(#[from] InvalidHeaderValue),
}

impl DispatchError {
    /// The HTTP status a serving layer should answer with.
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::Abort { status, .. } => *status,
            DispatchError::UnknownAction(_) | DispatchError::NotExposed(_) => {
                StatusCode::NOT_FOUND
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Maps an action's error back to a dispatch error.
    ///
    /// Actions may return a [`DispatchError`] (typically from [`abort`])
    /// through `anyhow`; it is unwrapped instead of being reported as a
    /// controller failure.
    pub fn from_controller(err: anyhow::Error) -> Self {
        match err.downcast::<DispatchError>() {
            Ok(dispatch) => dispatch,
            Err(err) => DispatchError::Controller(err),
        }
    }
}

/// Stops the current request with `status`.
///
/// ```rust
/// use http::StatusCode;
/// use podium_dispatch::{abort, DispatchError};
///
/// let err = abort(StatusCode::NOT_FOUND, "no such user");
/// assert_eq!(err.status(), StatusCode::NOT_FOUND);
/// assert!(matches!(err, DispatchError::Abort { .. }));
/// ```
pub fn abort(status: StatusCode, comment: impl Into<String>) -> DispatchError {
    DispatchError::Abort {
        status,
        comment: comment.into(),
    }
}
