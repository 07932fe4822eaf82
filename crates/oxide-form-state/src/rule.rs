//! Declarative validation rules.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use futures::future::BoxFuture;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::FormError;
use crate::value::FieldValue;

/// Error returned by a custom validator. Its text becomes the field error.
pub type ValidatorError = Box<dyn std::error::Error + Send + Sync>;

/// Pure function applied to a value before a rule's checks run.
pub type Transform = Arc<dyn Fn(&FieldValue) -> FieldValue + Send + Sync>;

/// Produces a message from the failing value and rule.
pub type MessageFn = Arc<dyn Fn(&FieldValue, &Rule) -> String + Send + Sync>;

/// Injected validation logic, possibly asynchronous.
///
/// # Example
///
/// ```ignore
/// struct UniqueUsername { taken: Vec<String> }
///
/// impl CustomValidator for UniqueUsername {
///     fn validate<'a>(
///         &'a self,
///         _rule: &'a Rule,
///         value: &'a FieldValue,
///     ) -> BoxFuture<'a, Result<(), ValidatorError>> {
///         Box::pin(async move {
///             if self.taken.iter().any(|name| Some(name.as_str()) == value.as_str()) {
///                 return Err("That username is taken.".into());
///             }
///             Ok(())
///         })
///     }
/// }
/// ```
pub trait CustomValidator: Send + Sync {
    /// Validates the (transformed) value. `Err` fails the rule.
    fn validate<'a>(
        &'a self,
        rule: &'a Rule,
        value: &'a FieldValue,
    ) -> BoxFuture<'a, Result<(), ValidatorError>>;
}

/// Adapts an async closure taking the value by ownership.
struct AsyncFnValidator<F>(F);

impl<F, Fut> CustomValidator for AsyncFnValidator<F>
where
    F: Fn(FieldValue) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ValidatorError>> + Send + 'static,
{
    fn validate<'a>(
        &'a self,
        _rule: &'a Rule,
        value: &'a FieldValue,
    ) -> BoxFuture<'a, Result<(), ValidatorError>> {
        Box::pin((self.0)(value.clone()))
    }
}

/// Adapts a synchronous closure.
struct SyncFnValidator<F>(F);

impl<F> CustomValidator for SyncFnValidator<F>
where
    F: Fn(&FieldValue) -> Result<(), ValidatorError> + Send + Sync,
{
    fn validate<'a>(
        &'a self,
        _rule: &'a Rule,
        value: &'a FieldValue,
    ) -> BoxFuture<'a, Result<(), ValidatorError>> {
        let outcome = (self.0)(value);
        Box::pin(async move { outcome })
    }
}

/// The closed set of `type` checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    String,
    Number,
    Boolean,
    Array,
    Object,
    Email,
    Url,
    Date,
    Integer,
    Float,
    Regexp,
    Hex,
}

impl RuleType {
    /// Returns the lowercase name, also the `types.*` message key.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Email => "email",
            Self::Url => "url",
            Self::Date => "date",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Regexp => "regexp",
            Self::Hex => "hex",
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleType {
    type Err = FormError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "string" => Self::String,
            "number" => Self::Number,
            "boolean" => Self::Boolean,
            "array" => Self::Array,
            "object" => Self::Object,
            "email" => Self::Email,
            "url" => Self::Url,
            "date" => Self::Date,
            "integer" => Self::Integer,
            "float" => Self::Float,
            "regexp" => Self::Regexp,
            "hex" => Self::Hex,
            other => return Err(FormError::UnknownRuleType(other.to_string())),
        })
    }
}

/// A rule-level message override.
#[derive(Clone)]
pub enum Message {
    /// Fixed text.
    Text(String),
    /// Computed from the failing value.
    Dynamic(MessageFn),
}

impl Message {
    /// Produces the message text.
    pub fn render(&self, value: &FieldValue, rule: &Rule) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Dynamic(f) => f(value, rule),
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// A declarative constraint on one field.
///
/// Checks run in a fixed order: `required`, `type`, `len`/`min`/`max`,
/// `pattern`, `enum`, `whitespace`, then the custom `validator`.
#[derive(Clone, Default)]
pub struct Rule {
    /// Fails on null, undefined and the empty string.
    pub required: bool,
    /// Type check to run.
    pub rule_type: Option<RuleType>,
    /// Exact length (strings, arrays) or value (numbers).
    pub len: Option<f64>,
    /// Minimum length or value.
    pub min: Option<f64>,
    /// Maximum length or value.
    pub max: Option<f64>,
    /// Pattern the value's text must match.
    pub pattern: Option<Regex>,
    /// Closed set of allowed values.
    pub one_of: Option<Vec<FieldValue>>,
    /// Rejects all-blank strings.
    pub whitespace: bool,
    /// Applied before the checks; the stored value is unaffected.
    pub transform: Option<Transform>,
    /// Custom validator, run last.
    pub validator: Option<Arc<dyn CustomValidator>>,
    /// Overrides every built-in message for this rule.
    pub message: Option<Message>,
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("required", &self.required)
            .field("rule_type", &self.rule_type)
            .field("len", &self.len)
            .field("min", &self.min)
            .field("max", &self.max)
            .field("pattern", &self.pattern.as_ref().map(Regex::as_str))
            .field("one_of", &self.one_of)
            .field("whitespace", &self.whitespace)
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

impl Rule {
    /// Creates a rule with no constraints.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the value required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Sets the type check.
    #[must_use]
    pub fn rule_type(mut self, rule_type: RuleType) -> Self {
        self.rule_type = Some(rule_type);
        self
    }

    /// Sets the exact length.
    #[must_use]
    pub fn len(mut self, len: impl Into<f64>) -> Self {
        self.len = Some(len.into());
        self
    }

    /// Sets the minimum length or value.
    #[must_use]
    pub fn min(mut self, min: impl Into<f64>) -> Self {
        self.min = Some(min.into());
        self
    }

    /// Sets the maximum length or value.
    #[must_use]
    pub fn max(mut self, max: impl Into<f64>) -> Self {
        self.max = Some(max.into());
        self
    }

    /// Sets the pattern.
    #[must_use]
    pub fn pattern(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }

    /// Restricts the value to a closed set.
    #[must_use]
    pub fn one_of<V: Into<FieldValue>>(mut self, values: impl IntoIterator<Item = V>) -> Self {
        self.one_of = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Rejects all-blank strings.
    #[must_use]
    pub fn whitespace(mut self) -> Self {
        self.whitespace = true;
        self
    }

    /// Sets the transform.
    #[must_use]
    pub fn transform(
        mut self,
        transform: impl Fn(&FieldValue) -> FieldValue + Send + Sync + 'static,
    ) -> Self {
        self.transform = Some(Arc::new(transform));
        self
    }

    /// Sets a custom validator.
    #[must_use]
    pub fn validator(mut self, validator: impl CustomValidator + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Sets an async closure as the custom validator.
    #[must_use]
    pub fn validator_fn<F, Fut>(self, f: F) -> Self
    where
        F: Fn(FieldValue) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ValidatorError>> + Send + 'static,
    {
        self.validator(AsyncFnValidator(f))
    }

    /// Sets a synchronous closure as the custom validator.
    #[must_use]
    pub fn validator_sync<F>(self, f: F) -> Self
    where
        F: Fn(&FieldValue) -> Result<(), ValidatorError> + Send + Sync + 'static,
    {
        self.validator(SyncFnValidator(f))
    }

    /// Sets a fixed message.
    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(Message::Text(message.into()));
        self
    }

    /// Sets a computed message.
    #[must_use]
    pub fn message_fn(
        mut self,
        f: impl Fn(&FieldValue, &Self) -> String + Send + Sync + 'static,
    ) -> Self {
        self.message = Some(Message::Dynamic(Arc::new(f)));
        self
    }
}

/// Returns whether any rule marks the field as required.
pub fn is_required(rules: &[Rule]) -> bool {
    rules.iter().any(|rule| rule.required)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_builder() {
        let rule = Rule::new()
            .required()
            .rule_type(RuleType::Number)
            .min(18)
            .max(120.5)
            .message("Adults only");

        assert!(rule.required);
        assert_eq!(rule.rule_type, Some(RuleType::Number));
        assert_eq!(rule.min, Some(18.0));
        assert_eq!(rule.max, Some(120.5));
        assert!(matches!(rule.message, Some(Message::Text(ref t)) if t == "Adults only"));
    }

    #[test]
    fn test_rule_type_from_str() {
        assert_eq!("email".parse::<RuleType>().unwrap(), RuleType::Email);
        assert_eq!("hex".parse::<RuleType>().unwrap(), RuleType::Hex);
        assert!(matches!(
            "uuid".parse::<RuleType>(),
            Err(FormError::UnknownRuleType(ref t)) if t == "uuid"
        ));
    }

    #[test]
    fn test_is_required() {
        assert!(!is_required(&[]));
        assert!(!is_required(&[Rule::new().min(1)]));
        assert!(is_required(&[Rule::new().min(1), Rule::new().required()]));
    }

    #[test]
    fn test_dynamic_message() {
        let rule = Rule::new().message_fn(|value, _| format!("bad: {}", value.to_text()));
        let message = rule.message.clone().unwrap();
        assert_eq!(message.render(&FieldValue::from(3), &rule), "bad: 3");
    }

    #[test]
    fn test_debug_shows_pattern_source() {
        let rule = Rule::new().pattern(Regex::new(r"^\d+$").unwrap());
        let debug = format!("{rule:?}");
        assert!(debug.contains(r"^\\d+$"));
    }
}
