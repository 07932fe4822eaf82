//! Declarative form description, loadable from JSON.
//!
//! ```json
//! {
//!   "initialValues": { "user": { "age": 17 } },
//!   "fields": [
//!     { "name": ["user", "age"], "rules": [{ "type": "number", "min": 18 }] },
//!     { "name": "email", "rules": [{ "required": true }, { "type": "email" }] }
//!   ],
//!   "validateMessages": { "number": { "min": "${name} must be at least ${min}" } }
//! }
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{FormError, Result};
use crate::messages::ValidateMessages;
use crate::name_path::NamePath;
use crate::rule::{Rule, RuleType};
use crate::store::FormStore;
use crate::value::{FieldValue, NestedValue};

/// A whole form: fields, initial values and message overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormSchema {
    /// Nested initial values; must be an object when present.
    pub initial_values: Option<serde_json::Value>,
    pub fields: Vec<FieldSpec>,
    /// Overlaid on the built-in message table.
    pub validate_messages: Option<ValidateMessages>,
    /// Defaults to true when absent.
    pub preserve: Option<bool>,
}

/// One field of a [`FormSchema`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: NamePath,
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
    #[serde(default)]
    pub hidden: bool,
}

/// Built-in value transforms available to declarative rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformSpec {
    Trim,
    Lowercase,
    Uppercase,
    /// Coerces numeric strings to numbers; other values pass through.
    Number,
}

impl TransformSpec {
    /// Applies the transform.
    pub fn apply(self, value: &FieldValue) -> FieldValue {
        match (self, value) {
            (Self::Trim, FieldValue::String(s)) => FieldValue::String(s.trim().to_string()),
            (Self::Lowercase, FieldValue::String(s)) => FieldValue::String(s.to_lowercase()),
            (Self::Uppercase, FieldValue::String(s)) => FieldValue::String(s.to_uppercase()),
            (Self::Number, FieldValue::String(_)) => value
                .to_number()
                .map_or_else(|| value.clone(), FieldValue::Number),
            _ => value.clone(),
        }
    }
}

/// Serializable form of a [`Rule`]. Custom validators cannot be declared.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSpec {
    pub required: bool,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub rule_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub len: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub one_of: Option<Vec<serde_json::Value>>,
    pub whitespace: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transform: Option<TransformSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RuleSpec {
    /// Builds the rule.
    ///
    /// # Errors
    ///
    /// Returns [`FormError::UnknownRuleType`] or [`FormError::InvalidPattern`]
    /// for malformed declarations.
    pub fn to_rule(&self) -> Result<Rule> {
        let mut rule = Rule::new();
        rule.required = self.required;
        rule.whitespace = self.whitespace;
        rule.len = self.len;
        rule.min = self.min;
        rule.max = self.max;

        if let Some(rule_type) = &self.rule_type {
            rule.rule_type = Some(rule_type.parse::<RuleType>()?);
        }
        if let Some(pattern) = &self.pattern {
            let compiled = Regex::new(pattern).map_err(|source| FormError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?;
            rule.pattern = Some(compiled);
        }
        if let Some(values) = &self.one_of {
            rule = rule.one_of(values.iter().cloned().map(FieldValue::from));
        }
        if let Some(transform) = self.transform {
            rule = rule.transform(move |value| transform.apply(value));
        }
        if let Some(message) = &self.message {
            rule = rule.message(message.clone());
        }
        Ok(rule)
    }
}

impl FormSchema {
    /// Parses a schema from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`FormError::ParseError`] for malformed JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Builds a configured store: messages, preserve flag, initial values,
    /// then every field registered with its rules.
    ///
    /// # Errors
    ///
    /// Returns the first malformed rule's error; no store is produced.
    pub fn build(&self) -> Result<FormStore> {
        let fields = self
            .fields
            .iter()
            .map(|field| {
                let rules = field
                    .rules
                    .iter()
                    .map(RuleSpec::to_rule)
                    .collect::<Result<Vec<_>>>()?;
                Ok((field, rules))
            })
            .collect::<Result<Vec<_>>>()?;

        let store = FormStore::new();
        if let Some(messages) = &self.validate_messages {
            store.set_validate_messages(messages.clone());
        }
        if let Some(preserve) = self.preserve {
            store.set_preserve(preserve);
        }
        if let Some(initial_values) = &self.initial_values {
            store.set_initial_values(NestedValue::from(initial_values.clone()));
        }
        for (field, rules) in fields {
            store.register_field(&field.name, Some(rules));
            if field.hidden {
                store.set_field_hidden(&field.name, true);
            }
        }
        debug!(fields = self.fields.len(), "built form from schema");
        Ok(store)
    }
}
