//! Single-rule evaluation.
//!
//! [`evaluate`] applies one [`Rule`] to one value. The first failing check
//! produces the message and skips everything after it.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::messages::{interpolate, MessageParams, ValidateMessages};
use crate::rule::{Rule, RuleType};
use crate::value::FieldValue;

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("EMAIL_REGEX: invalid regex pattern")
});

static HEX_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("HEX_REGEX: invalid regex pattern")
});

/// Which bound a length/range check enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    Len,
    Min,
    Max,
}

impl Bound {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Len => "len",
            Self::Min => "min",
            Self::Max => "max",
        }
    }

    #[allow(clippy::float_cmp)]
    fn holds(self, actual: f64, expected: f64) -> bool {
        match self {
            Self::Len => actual == expected,
            Self::Min => actual >= expected,
            Self::Max => actual <= expected,
        }
    }

    const fn fallback(self) -> &'static str {
        match self {
            Self::Len => "Length must be ${len}.",
            Self::Min => "Must be at least ${min}.",
            Self::Max => "Must be at most ${max}.",
        }
    }
}

/// Everything needed to word a failure.
struct Failure<'a> {
    rule: &'a Rule,
    value: &'a FieldValue,
    field: &'a str,
    messages: &'a ValidateMessages,
}

impl Failure<'_> {
    /// Rule message, then the table entry at `path`, then `fallback`.
    fn message(&self, path: &str, fallback: &str) -> String {
        if let Some(message) = &self.rule.message {
            return message.render(self.value, self.rule);
        }
        let params = MessageParams {
            name: self.field,
            len: self.rule.len,
            min: self.rule.min,
            max: self.rule.max,
        };
        interpolate(self.messages.get(path).unwrap_or(fallback), &params)
    }
}

/// Evaluates `rule` against `value`, returning the failure message.
///
/// Empty values (null, undefined, `""`) fail a `required` rule and skip the
/// built-in checks of any other rule; the custom validator still runs.
pub async fn evaluate(
    value: &FieldValue,
    rule: &Rule,
    field: &str,
    messages: &ValidateMessages,
) -> Result<(), String> {
    let transformed = rule.transform.as_ref().map(|transform| transform(value));
    let value = transformed.as_ref().unwrap_or(value);

    let failure = Failure {
        rule,
        value,
        field,
        messages,
    };
    check_builtin(&failure)?;

    if let Some(validator) = &rule.validator {
        validator.validate(rule, value).await.map_err(|err| {
            let text = err.to_string();
            if text.is_empty() {
                interpolate(
                    messages.get("default").unwrap_or("Validation failed."),
                    &MessageParams {
                        name: field,
                        ..MessageParams::default()
                    },
                )
            } else {
                text
            }
        })?;
    }

    Ok(())
}

fn check_builtin(failure: &Failure<'_>) -> Result<(), String> {
    let Failure { rule, value, .. } = *failure;

    if value.is_empty() {
        if rule.required {
            return Err(failure.message("required", "This field is required."));
        }
        return Ok(());
    }

    if let Some(rule_type) = rule.rule_type {
        if !type_matches(value, rule_type) {
            let path = format!("types.{}", rule_type.as_str());
            return Err(failure.message(&path, "Invalid value type."));
        }
    }

    for (bound, expected) in [
        (Bound::Len, rule.len),
        (Bound::Min, rule.min),
        (Bound::Max, rule.max),
    ] {
        let (Some(expected), Some((kind, actual))) = (expected, value.measure()) else {
            continue;
        };
        if !bound.holds(actual, expected) {
            let path = format!("{}.{}", kind.as_str(), bound.as_str());
            return Err(failure.message(&path, bound.fallback()));
        }
    }

    if let Some(pattern) = &rule.pattern {
        if !pattern.is_match(&value.to_text()) {
            return Err(failure.message("pattern.mismatch", "Invalid format."));
        }
    }

    if let Some(options) = &rule.one_of {
        if !options.contains(value) {
            return Err(failure.message("enum", "Value is not an allowed choice."));
        }
    }

    if rule.whitespace {
        if let FieldValue::String(s) = value {
            if s.trim().is_empty() {
                return Err(failure.message("whitespace", "This field cannot be blank."));
            }
        }
    }

    Ok(())
}

/// Runs the check behind one `type` value.
pub fn type_matches(value: &FieldValue, rule_type: RuleType) -> bool {
    match rule_type {
        RuleType::String => matches!(value, FieldValue::String(_)),
        RuleType::Number | RuleType::Float => value.as_f64().is_some_and(|n| !n.is_nan()),
        RuleType::Boolean => matches!(value, FieldValue::Bool(_)),
        RuleType::Array => matches!(value, FieldValue::Array(_)),
        // Dates are the only object-like values a field can hold.
        RuleType::Object => matches!(value, FieldValue::Date(_)),
        RuleType::Email => EMAIL_REGEX.is_match(&value.to_text()),
        RuleType::Url => Url::parse(&value.to_text()).is_ok(),
        RuleType::Date => value.to_date().is_some(),
        RuleType::Integer => value
            .to_number()
            .is_some_and(|n| n.is_finite() && n.fract() == 0.0),
        RuleType::Regexp => Regex::new(&value.to_text()).is_ok(),
        RuleType::Hex => HEX_REGEX.is_match(&value.to_text()),
    }
}
