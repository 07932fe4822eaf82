//! Error types for form state and validation.

use serde::Serialize;
use thiserror::Error;

use crate::name_path::NamePath;
use crate::value::FieldValues;

/// Configuration errors, raised while turning declarative input into rules.
#[derive(Debug, Error)]
pub enum FormError {
    /// A rule pattern failed to compile.
    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A rule named a type outside the supported set.
    #[error("unknown rule type: {0}")]
    UnknownRuleType(String),

    /// Schema parsing error.
    #[error("failed to parse form schema: {0}")]
    ParseError(#[from] serde_json::Error),
}

/// A single field's validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidateError {
    /// Flat key of the failing field.
    pub field: String,
    /// The one message produced by the first failing rule.
    pub message: String,
}

impl ValidateError {
    /// Creates a new validation error.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors reported for one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorField {
    /// The field name, split from its flat key.
    pub name: NamePath,
    /// Error messages for the field.
    pub errors: Vec<String>,
}

/// Aggregate outcome of a failed `validate_fields` call.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[serde(rename_all = "camelCase")]
#[error("validation failed for {} field(s)", .error_fields.len())]
pub struct ValidateErrorInfo {
    /// Value snapshot taken when validation finished.
    pub values: FieldValues,
    /// Every failing field, in the order the fields were requested.
    pub error_fields: Vec<ErrorField>,
    /// Always `false`: validations are never cancelled.
    pub out_of_date: bool,
}

impl ValidateErrorInfo {
    /// Returns whether no field failed.
    pub fn is_empty(&self) -> bool {
        self.error_fields.is_empty()
    }

    /// Returns the number of failing fields.
    pub fn len(&self) -> usize {
        self.error_fields.len()
    }

    /// Returns the errors for a field, by flat key.
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.error_fields
            .iter()
            .find(|error_field| error_field.name.to_flat_key() == field)
            .map(|error_field| error_field.errors.as_slice())
    }

    /// Returns all errors as `(field, message)` pairs.
    pub fn all_errors(&self) -> Vec<(String, &str)> {
        self.error_fields
            .iter()
            .flat_map(|error_field| {
                let field = error_field.name.to_flat_key();
                error_field
                    .errors
                    .iter()
                    .map(move |message| (field.clone(), message.as_str()))
            })
            .collect()
    }

    /// Renders one `field: message` line per error.
    pub fn describe(&self) -> String {
        self.all_errors()
            .into_iter()
            .map(|(field, message)| format!("{field}: {message}\n"))
            .collect()
    }
}

/// Result type alias for form operations.
pub type Result<T> = std::result::Result<T, FormError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::FieldValue;

    fn sample() -> ValidateErrorInfo {
        let mut values = FieldValues::new();
        values.insert("email".to_string(), FieldValue::from(""));
        ValidateErrorInfo {
            values,
            error_fields: vec![
                ErrorField {
                    name: NamePath::from("email"),
                    errors: vec!["This field is required.".to_string()],
                },
                ErrorField {
                    name: NamePath::from("user.age"),
                    errors: vec!["Too young".to_string()],
                },
            ],
            out_of_date: false,
        }
    }

    #[test]
    fn test_info_lookup() {
        let info = sample();
        assert_eq!(info.len(), 2);
        assert_eq!(info.get("user.age"), Some(&["Too young".to_string()][..]));
        assert!(info.get("missing").is_none());
        assert_eq!(info.to_string(), "validation failed for 2 field(s)");
    }

    #[test]
    fn test_describe() {
        let info = sample();
        assert_eq!(
            info.describe(),
            "email: This field is required.\nuser.age: Too young\n"
        );
    }

    #[test]
    fn test_serialize_camel_case() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["outOfDate"], serde_json::json!(false));
        assert_eq!(
            json["errorFields"][1]["name"],
            serde_json::json!(["user", "age"])
        );
    }
}
