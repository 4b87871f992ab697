//! Validation failure classification.
//!
//! Turns whatever shape of [`ValidationFailure`] a validator produced into the
//! uniform `field → message` map and value tree stored on the
//! [`ValidationStatus`], then resolves the action that should run instead.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::controller::Controller;
use crate::error::DispatchError;
use crate::handler::Action;
use crate::validation::{ValidationFailure, ValidationStatus, Widget};

/// Error key for messages that belong to the form as a whole.
pub const FORM_ERROR_KEY: &str = "_the_form";

/// The action to call after a validation failure.
#[derive(Debug, Clone)]
pub struct ErrorHandlerSelection {
    pub handler: Arc<Action>,
    /// Whether the handler's own validations must run before calling it.
    pub chain_validation: bool,
}

/// Collects the field nodes of a widget tree.
///
/// A node with a compound key is a field and is not descended into; any other
/// node contributes its children.
pub fn widget_fields(root: &Widget) -> Vec<&Widget> {
    fn walk<'a>(widget: &'a Widget, out: &mut Vec<&'a Widget>) {
        if widget.compound_key.as_deref().is_some_and(|key| !key.is_empty()) {
            out.push(widget);
            return;
        }
        for child in &widget.children {
            walk(child, out);
        }
    }

    let mut fields = Vec::new();
    walk(root, &mut fields);
    fields
}

/// Parses `field: message` lines into `errors`.
///
/// Splits on the first colon and trims both sides. Lines without a colon are
/// stored under [`FORM_ERROR_KEY`]. Later lines overwrite earlier ones with the
/// same key.
pub fn parse_error_text(text: &str, errors: &mut BTreeMap<String, String>) {
    for line in text.split('\n') {
        match line.split_once(':') {
            Some((field, message)) => {
                errors.insert(field.trim().to_string(), message.trim().to_string());
            }
            None => {
                errors.insert(FORM_ERROR_KEY.to_string(), line.trim().to_string());
            }
        }
    }
}

/// Records `failure` on `status` and selects the error handler.
///
/// Widget and structured failures replace the error map; text failures add to
/// it. When the failing intent named no handler, `action` is its own handler
/// and chained validation is switched off.
pub fn classify_failure(
    controller: &Controller,
    action: &Arc<Action>,
    failure: ValidationFailure,
    status: &mut ValidationStatus,
) -> Result<ErrorHandlerSelection, DispatchError> {
    match &failure {
        ValidationFailure::Widget(root) => {
            status.errors = widget_fields(root)
                .into_iter()
                .filter_map(|field| {
                    let key = field.compound_key.clone()?;
                    let message = field.error_msg.clone()?;
                    Some((key, message))
                })
                .collect();
            status.values = root.value.clone();
        }
        ValidationFailure::Structured { errors, values } => {
            status.errors = errors.clone();
            status.values = values.clone();
        }
        ValidationFailure::Invalid { message, value } => {
            parse_error_text(message, &mut status.errors);
            status.values = value
                .clone()
                .unwrap_or_else(|| Value::Object(Map::new()));
        }
    }
    status.failure = Some(failure);

    match status.error_handler.as_deref() {
        None => Ok(ErrorHandlerSelection {
            handler: Arc::clone(action),
            chain_validation: false,
        }),
        Some(name) => {
            let handler = controller
                .action(name)
                .ok_or_else(|| DispatchError::UnknownAction(name.to_string()))?;
            Ok(ErrorHandlerSelection {
                handler,
                chain_validation: status.chain_validation,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoration::Decoration;
    use crate::params::Arguments;
    use crate::RequestContext;
    use proptest::prelude::*;
    use serde_json::json;

    fn noop() -> Action {
        Action::new(|_ctx: &mut RequestContext, _args: Arguments| Ok::<_, anyhow::Error>("ok"))
            .decorate(Decoration::builder().expose("json").build())
    }

    fn controller() -> Arc<Controller> {
        Controller::builder("forms")
            .action("save", noop())
            .action("edit", noop())
            .build()
            .unwrap()
    }

    fn classify(
        failure: ValidationFailure,
        status: &mut ValidationStatus,
    ) -> ErrorHandlerSelection {
        let controller = controller();
        let save = controller.action("save").unwrap();
        classify_failure(&controller, &save, failure, status).unwrap()
    }

    #[test]
    fn test_text_failure_lines() {
        let mut status = ValidationStatus::default();
        classify(ValidationFailure::invalid("a: bad\nb: bad2"), &mut status);
        let expected: BTreeMap<String, String> = [("a", "bad"), ("b", "bad2")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(status.errors, expected);
        assert_eq!(status.values, json!({}));
    }

    #[test]
    fn test_text_failure_without_colon_is_form_error() {
        let mut status = ValidationStatus::default();
        classify(ValidationFailure::invalid("overall bad"), &mut status);
        assert_eq!(status.errors.len(), 1);
        assert_eq!(status.error(FORM_ERROR_KEY), Some("overall bad"));
    }

    #[test]
    fn test_text_failure_splits_on_first_colon() {
        let mut errors = BTreeMap::new();
        parse_error_text("when: must match hh:mm", &mut errors);
        assert_eq!(errors["when"], "must match hh:mm");
    }

    #[test]
    fn test_text_failure_last_form_error_wins() {
        let mut errors = BTreeMap::new();
        parse_error_text("first problem\nsecond problem", &mut errors);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[FORM_ERROR_KEY], "second problem");
    }

    #[test]
    fn test_text_failure_keeps_value() {
        let mut status = ValidationStatus::default();
        let failure = ValidationFailure::Invalid {
            message: "a: bad".into(),
            value: Some(json!({"a": "x"})),
        };
        classify(failure, &mut status);
        assert_eq!(status.values, json!({"a": "x"}));
    }

    #[test]
    fn test_structured_failure_copied() {
        let mut errors = BTreeMap::new();
        errors.insert("email".to_string(), "Invalid email".to_string());
        let mut status = ValidationStatus::default();
        classify(
            ValidationFailure::structured(errors.clone(), json!({"email": "nope"})),
            &mut status,
        );
        assert_eq!(status.errors, errors);
        assert_eq!(status.values, json!({"email": "nope"}));
        assert!(status.failure.is_some());
    }

    #[test]
    fn test_widget_failure_flattened() {
        let form = Widget::group(
            json!({"f1": "v1", "f2": "v2"}),
            vec![
                Widget::field("f1", json!("v1")).with_error("m1"),
                Widget::field("f2", json!("v2")).with_error("m2"),
            ],
        );
        let mut status = ValidationStatus::default();
        classify(ValidationFailure::Widget(form), &mut status);

        assert_eq!(status.errors.len(), 2);
        assert_eq!(status.error("f1"), Some("m1"));
        assert_eq!(status.error("f2"), Some("m2"));
        assert_eq!(status.values, json!({"f1": "v1", "f2": "v2"}));
    }

    #[test]
    fn test_widget_fields_nested_groups() {
        let inner = Widget::field("address.zip", json!("x")).with_error("bad zip");
        let leaf_with_children = Widget {
            compound_key: Some("tags".into()),
            children: vec![Widget::field("tags.0", json!("ignored"))],
            ..Default::default()
        };
        let form = Widget::group(
            Value::Null,
            vec![
                Widget::group(Value::Null, vec![inner]),
                leaf_with_children,
                Widget::field("name", json!("ok")),
            ],
        );

        let keys: Vec<_> = widget_fields(&form)
            .into_iter()
            .filter_map(|w| w.compound_key.as_deref())
            .collect();
        assert_eq!(keys, vec!["address.zip", "tags", "name"]);

        let mut status = ValidationStatus::default();
        classify(ValidationFailure::Widget(form), &mut status);
        assert_eq!(status.errors.len(), 1);
        assert_eq!(status.error("address.zip"), Some("bad zip"));
    }

    #[test]
    fn test_no_handler_returns_original_without_chaining() {
        let mut status = ValidationStatus {
            chain_validation: true,
            ..Default::default()
        };
        let selection = classify(ValidationFailure::invalid("x: y"), &mut status);
        assert_eq!(selection.handler.name(), "save");
        assert!(!selection.chain_validation);
    }

    #[test]
    fn test_named_handler_resolved_with_chain_flag() {
        let mut status = ValidationStatus {
            error_handler: Some("edit".into()),
            chain_validation: true,
            ..Default::default()
        };
        let selection = classify(ValidationFailure::invalid("x: y"), &mut status);
        assert_eq!(selection.handler.name(), "edit");
        assert!(selection.chain_validation);
    }

    #[test]
    fn test_unknown_handler_is_error() {
        let controller = controller();
        let save = controller.action("save").unwrap();
        let mut status = ValidationStatus {
            error_handler: Some("missing".into()),
            ..Default::default()
        };
        let err = classify_failure(
            &controller,
            &save,
            ValidationFailure::invalid("x"),
            &mut status,
        )
        .unwrap_err();
        assert!(matches!(err, DispatchError::UnknownAction(name) if name == "missing"));
    }

    proptest! {
        #[test]
        fn prop_field_lines_map_exactly(
            entries in proptest::collection::btree_map("[a-z_]{1,10}", "[a-z][a-z ]{0,20}[a-z]", 1..6)
        ) {
            let text = entries
                .iter()
                .map(|(field, message)| format!("{field}: {message}"))
                .collect::<Vec<_>>()
                .join("\n");
            let mut errors = BTreeMap::new();
            parse_error_text(&text, &mut errors);
            prop_assert_eq!(errors, entries);
        }
    }
}
