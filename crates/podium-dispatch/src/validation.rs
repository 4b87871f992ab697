//! Parameter validation.
//!
//! An action's decoration lists [`ValidationIntent`]s. Each wraps a
//! [`Validator`] and names the error handler to fall back to when it rejects
//! the parameters. [`run_validations`] applies them in order, feeding each the
//! previous one's cleaned output. A rejection is returned as a
//! [`ValidationFailure`] for the dispatcher to classify; the runner itself
//! never recovers from it.
//!
//! Failures come in three shapes:
//!
//! - [`ValidationFailure::Widget`]: a form widget tree whose leaves carry their
//!   own messages.
//! - [`ValidationFailure::Structured`]: a ready-made field to message map.
//! - [`ValidationFailure::Invalid`]: free text, one `field: message` per line.

use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::handler::Action;
use crate::params::Params;

/// A node of a form widget tree.
///
/// Nodes with a compound key are fields; nodes without one only group their
/// children.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Widget {
    /// Dotted path identifying the field within the form (e.g. `address.zip`).
    pub compound_key: Option<String>,
    pub error_msg: Option<String>,
    /// Current value of this node, a tree for grouping nodes.
    pub value: Value,
    pub children: Vec<Widget>,
}

impl Widget {
    /// A field node.
    pub fn field(compound_key: impl Into<String>, value: Value) -> Self {
        Self {
            compound_key: Some(compound_key.into()),
            value,
            ..Default::default()
        }
    }

    /// A grouping node.
    pub fn group(value: Value, children: Vec<Widget>) -> Self {
        Self {
            value,
            children,
            ..Default::default()
        }
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_msg = Some(message.into());
        self
    }
}

/// A rejected set of parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationFailure {
    #[error("form failed validation")]
    Widget(Widget),

    #[error("{}", join_errors(.errors))]
    Structured {
        errors: BTreeMap<String, String>,
        values: Value,
    },

    #[error("{message}")]
    Invalid {
        message: String,
        value: Option<Value>,
    },
}

fn join_errors(errors: &BTreeMap<String, String>) -> String {
    errors
        .iter()
        .map(|(field, message)| format!("{field}: {message}"))
        .collect::<Vec<_>>()
        .join("\n")
}

impl ValidationFailure {
    /// A free-text failure carrying no values.
    pub fn invalid(message: impl Into<String>) -> Self {
        ValidationFailure::Invalid {
            message: message.into(),
            value: None,
        }
    }

    pub fn structured(errors: BTreeMap<String, String>, values: Value) -> Self {
        ValidationFailure::Structured { errors, values }
    }
}

/// Validation outcome of the current request.
///
/// Reset at the start of every call; filled in when a failure is classified and
/// read back by error handlers to redisplay the form.
#[derive(Debug, Clone, Default)]
pub struct ValidationStatus {
    /// The intent that ran last.
    pub intent: Option<ValidationIntent>,
    /// Field (or compound key) to message. Empty unless validation failed.
    pub errors: BTreeMap<String, String>,
    /// Cleaned values on success, the submitted values on failure.
    pub values: Value,
    pub failure: Option<ValidationFailure>,
    /// Error handler requested by the failing intent.
    pub error_handler: Option<String>,
    pub chain_validation: bool,
}

impl ValidationStatus {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn error(&self, field: &str) -> Option<&str> {
        self.errors.get(field).map(String::as_str)
    }
}

/// Checks and cleans the parameters of an action.
pub trait Validator: Send + Sync {
    fn check(&self, action: &Action, params: Params) -> Result<Params, ValidationFailure>;
}

struct FnValidator<F>(F);

impl<F> Validator for FnValidator<F>
where
    F: Fn(&Action, Params) -> Result<Params, ValidationFailure> + Send + Sync,
{
    fn check(&self, action: &Action, params: Params) -> Result<Params, ValidationFailure> {
        (self.0)(action, params)
    }
}

/// Wraps a closure as a [`Validator`].
pub fn validator_fn<F>(f: F) -> impl Validator
where
    F: Fn(&Action, Params) -> Result<Params, ValidationFailure> + Send + Sync + 'static,
{
    FnValidator(f)
}

/// Cleans one field: receives the submitted value (if any) and returns the
/// cleaned value or an error message.
pub type FieldCheck = Arc<dyn Fn(Option<&Value>) -> Result<Value, String> + Send + Sync>;

/// Per-field validators.
///
/// Every field is checked; all messages are collected into one
/// [`ValidationFailure::Structured`] carrying the submitted parameters.
#[derive(Clone, Default)]
pub struct FieldValidators {
    fields: Vec<(String, FieldCheck)>,
}

impl FieldValidators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field<F>(mut self, name: impl Into<String>, check: F) -> Self
    where
        F: Fn(Option<&Value>) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.fields.push((name.into(), Arc::new(check)));
        self
    }
}

impl Validator for FieldValidators {
    fn check(&self, _action: &Action, params: Params) -> Result<Params, ValidationFailure> {
        let mut cleaned = params.clone();
        let mut errors = BTreeMap::new();
        for (name, check) in &self.fields {
            match check(params.get(name)) {
                Ok(value) => {
                    cleaned.insert(name.clone(), value);
                }
                Err(message) => {
                    errors.insert(name.clone(), message);
                }
            }
        }
        if errors.is_empty() {
            Ok(cleaned)
        } else {
            Err(ValidationFailure::structured(errors, Value::Object(params)))
        }
    }
}

/// One configured validation step of an action.
#[derive(Clone)]
pub struct ValidationIntent {
    validator: Arc<dyn Validator>,
    error_handler: Option<String>,
    chain_validation: bool,
}

impl ValidationIntent {
    pub fn new<V: Validator + 'static>(validator: V) -> Self {
        Self::from_arc(Arc::new(validator))
    }

    pub fn from_arc(validator: Arc<dyn Validator>) -> Self {
        Self {
            validator,
            error_handler: None,
            chain_validation: false,
        }
    }

    /// Names the action (on the same controller) that redisplays the form when
    /// this intent fails.
    pub fn error_handler(mut self, action: impl Into<String>) -> Self {
        self.error_handler = Some(action.into());
        self
    }

    /// Validates the error handler's own parameters too before calling it.
    pub fn chain_validation(mut self) -> Self {
        self.chain_validation = true;
        self
    }

    pub fn handler_name(&self) -> Option<&str> {
        self.error_handler.as_deref()
    }

    pub fn chains(&self) -> bool {
        self.chain_validation
    }

    pub fn check(&self, action: &Action, params: Params) -> Result<Params, ValidationFailure> {
        self.validator.check(action, params)
    }
}

impl fmt::Debug for ValidationIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationIntent")
            .field("error_handler", &self.error_handler)
            .field("chain_validation", &self.chain_validation)
            .finish_non_exhaustive()
    }
}

/// Runs an action's validation intents over `params`.
///
/// Without intents the parameters pass through untouched. On failure the
/// failing intent's error handler and chain flag are recorded in `status`.
pub fn run_validations(
    action: &Action,
    params: Params,
    status: &mut ValidationStatus,
) -> Result<Params, ValidationFailure> {
    let validations = action.decoration().validations();
    if validations.is_empty() {
        return Ok(params);
    }

    let mut validated = params;
    for intent in validations {
        status.intent = Some(intent.clone());
        match intent.check(action, validated) {
            Ok(cleaned) => validated = cleaned,
            Err(failure) => {
                status.error_handler = intent.error_handler.clone();
                status.chain_validation = intent.chain_validation;
                return Err(failure);
            }
        }
    }
    Ok(validated)
}
