//! Field validation: an ordered rule list against one value.

use tracing::debug;

use crate::error::ValidateError;
use crate::evaluate::evaluate;
use crate::messages::ValidateMessages;
use crate::rule::Rule;
use crate::value::FieldValue;

/// Validates field values against their rules using a message table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormValidator {
    messages: ValidateMessages,
}

impl Default for FormValidator {
    fn default() -> Self {
        Self::new(ValidateMessages::builtin())
    }
}

impl FormValidator {
    /// Creates a validator with the given message table.
    pub const fn new(messages: ValidateMessages) -> Self {
        Self { messages }
    }

    /// Returns the message table.
    pub const fn messages(&self) -> &ValidateMessages {
        &self.messages
    }

    /// Overlays `messages` on the current table.
    pub fn set_validate_messages(&mut self, messages: ValidateMessages) {
        self.messages.merge(messages);
    }

    /// Runs `rules` in order against `value`.
    ///
    /// Stops at the first failing rule and reports only its message. An
    /// empty rule list always succeeds.
    pub async fn validate_field(
        &self,
        value: &FieldValue,
        rules: &[Rule],
        field: &str,
    ) -> Result<(), ValidateError> {
        for (position, rule) in rules.iter().enumerate() {
            if let Err(message) = self.validate_rule(value, rule, field).await {
                debug!(field, rule = position, %message, "rule failed");
                return Err(ValidateError::new(field, message));
            }
        }
        Ok(())
    }

    /// Evaluates a single rule.
    pub async fn validate_rule(
        &self,
        value: &FieldValue,
        rule: &Rule,
        field: &str,
    ) -> Result<(), String> {
        evaluate(value, rule, field, &self.messages).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use futures::executor::block_on;

    use super::*;
    use crate::rule::RuleType;

    #[test]
    fn test_empty_rules_succeed() {
        let validator = FormValidator::default();
        assert!(block_on(validator.validate_field(&FieldValue::Undefined, &[], "x")).is_ok());
    }

    #[test]
    fn test_first_failure_wins() {
        let validator = FormValidator::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let rules = vec![
            Rule::new().required(),
            Rule::new().min(5).message("too short"),
            Rule::new().validator_sync(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("never reached".into())
            }),
        ];

        let err = block_on(validator.validate_field(&"abc".into(), &rules, "name")).unwrap_err();
        assert_eq!(err, ValidateError::new("name", "too short"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_later_rule_runs_when_earlier_pass() {
        let validator = FormValidator::default();
        let rules = vec![
            Rule::new().required(),
            Rule::new().rule_type(RuleType::Email),
        ];
        let err = block_on(validator.validate_field(&"abc".into(), &rules, "email")).unwrap_err();
        assert_eq!(err.message, "Enter a valid email address.");
        assert_eq!(err.to_string(), "email: Enter a valid email address.");
    }

    #[test]
    fn test_set_validate_messages_merges() {
        let mut validator = FormValidator::default();
        let overlay: ValidateMessages =
            serde_json::from_str(r#"{ "required": "Fill me in" }"#).unwrap();
        validator.set_validate_messages(overlay);

        let rules = vec![Rule::new().required(), Rule::new().rule_type(RuleType::Email)];
        let err = block_on(validator.validate_field(&"".into(), &rules, "email")).unwrap_err();
        assert_eq!(err.message, "Fill me in");
        let err = block_on(validator.validate_field(&"x".into(), &rules, "email")).unwrap_err();
        assert_eq!(err.message, "Enter a valid email address.");
    }
}
