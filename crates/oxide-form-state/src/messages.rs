//! Fallback validation message table.
//!
//! Messages are looked up by dotted path (`required`, `types.email`,
//! `string.min`, ...). Templates may reference `${name}`, `${len}`,
//! `${min}` and `${max}`.

use serde::{Deserialize, Serialize};

use crate::value::format_number;

/// Merge a partial table over an existing one, keeping entries the overlay
/// leaves unset.
trait MergeFrom {
    fn merge_from(&mut self, other: Self);
}

impl MergeFrom for Option<String> {
    fn merge_from(&mut self, other: Self) {
        if other.is_some() {
            *self = other;
        }
    }
}

macro_rules! message_group {
    ($(#[$meta:meta])* $name:ident { $($field:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(default)]
        pub struct $name {
            $(
                #[serde(skip_serializing_if = "Option::is_none")]
                pub $field: Option<String>,
            )+
        }

        impl $name {
            fn get(&self, key: &str) -> Option<&str> {
                match key {
                    $(stringify!($field) => self.$field.as_deref(),)+
                    _ => None,
                }
            }
        }

        impl MergeFrom for $name {
            fn merge_from(&mut self, other: Self) {
                $(self.$field.merge_from(other.$field);)+
            }
        }
    };
}

message_group!(
    /// Messages for date parsing failures.
    DateMessages { format, parse, invalid }
);

message_group!(
    /// Messages for `type` check failures, one per rule type.
    TypeMessages {
        string,
        method,
        array,
        object,
        number,
        date,
        boolean,
        integer,
        float,
        regexp,
        email,
        url,
        hex,
    }
);

message_group!(
    /// Messages for `len`/`min`/`max` failures of one value kind.
    RangeMessages { len, min, max, range }
);

message_group!(
    /// Messages for `pattern` failures.
    PatternMessages { mismatch }
);

/// The nested message table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidateMessages {
    /// Used when a custom validator fails without any text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// `required` failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<String>,
    /// `enum` failures.
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub one_of: Option<String>,
    /// `whitespace` failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whitespace: Option<String>,
    pub date: DateMessages,
    pub types: TypeMessages,
    pub string: RangeMessages,
    pub number: RangeMessages,
    pub array: RangeMessages,
    pub pattern: PatternMessages,
}

impl ValidateMessages {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the built-in English table.
    pub fn builtin() -> Self {
        let text = |s: &str| Some(s.to_string());
        Self {
            default: text("Validation error on field ${name}."),
            required: text("This field is required."),
            one_of: text("Select a valid choice."),
            whitespace: text("This field cannot be blank."),
            date: DateMessages {
                format: text("Enter a date in a valid format."),
                parse: text("Could not parse the date."),
                invalid: text("Enter a valid date."),
            },
            types: TypeMessages {
                string: text("Enter a text value."),
                method: text("Enter a function."),
                array: text("Enter a list of values."),
                object: text("Enter an object."),
                number: text("Enter a number."),
                date: text("Enter a valid date."),
                boolean: text("Enter true or false."),
                integer: text("Enter a whole number."),
                float: text("Enter a number."),
                regexp: text("Enter a valid regular expression."),
                email: text("Enter a valid email address."),
                url: text("Enter a valid URL."),
                hex: text("Enter a valid hex color (#RRGGBB)."),
            },
            string: RangeMessages {
                len: text("Ensure this value has exactly ${len} characters."),
                min: text("Ensure this value has at least ${min} characters."),
                max: text("Ensure this value has at most ${max} characters."),
                range: text("Ensure this value has between ${min} and ${max} characters."),
            },
            number: RangeMessages {
                len: text("Ensure this value is equal to ${len}."),
                min: text("Ensure this value is greater than or equal to ${min}."),
                max: text("Ensure this value is less than or equal to ${max}."),
                range: text("Ensure this value is between ${min} and ${max}."),
            },
            array: RangeMessages {
                len: text("Ensure this list has exactly ${len} items."),
                min: text("Ensure this list has at least ${min} items."),
                max: text("Ensure this list has at most ${max} items."),
                range: text("Ensure this list has between ${min} and ${max} items."),
            },
            pattern: PatternMessages {
                mismatch: text("Enter a value in the expected format."),
            },
        }
    }

    /// Looks up a template by dotted path, e.g. `types.email`.
    pub fn get(&self, path: &str) -> Option<&str> {
        match path.split_once('.') {
            None => match path {
                "default" => self.default.as_deref(),
                "required" => self.required.as_deref(),
                "enum" => self.one_of.as_deref(),
                "whitespace" => self.whitespace.as_deref(),
                _ => None,
            },
            Some((group, key)) => match group {
                "date" => self.date.get(key),
                "types" => self.types.get(key),
                "string" => self.string.get(key),
                "number" => self.number.get(key),
                "array" => self.array.get(key),
                "pattern" => self.pattern.get(key),
                _ => None,
            },
        }
    }

    /// Overlays `other`; entries it leaves unset keep their current text.
    pub fn merge(&mut self, other: Self) {
        self.merge_from(other);
    }
}

impl MergeFrom for ValidateMessages {
    fn merge_from(&mut self, other: Self) {
        self.default.merge_from(other.default);
        self.required.merge_from(other.required);
        self.one_of.merge_from(other.one_of);
        self.whitespace.merge_from(other.whitespace);
        self.date.merge_from(other.date);
        self.types.merge_from(other.types);
        self.string.merge_from(other.string);
        self.number.merge_from(other.number);
        self.array.merge_from(other.array);
        self.pattern.merge_from(other.pattern);
    }
}

/// Values substituted into message templates.
#[derive(Debug, Clone, Default)]
pub struct MessageParams<'a> {
    /// Flat key of the field being validated.
    pub name: &'a str,
    pub len: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Substitutes `${...}` placeholders. Unknown placeholders and bounds the
/// rule does not set are left as written.
pub fn interpolate(template: &str, params: &MessageParams<'_>) -> String {
    let mut out = template.replace("${name}", params.name);
    for (placeholder, bound) in [
        ("${len}", params.len),
        ("${min}", params.min),
        ("${max}", params.max),
    ] {
        if let Some(bound) = bound {
            out = out.replace(placeholder, &format_number(bound));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_path() {
        let messages = ValidateMessages::builtin();
        assert_eq!(messages.get("required"), Some("This field is required."));
        assert_eq!(
            messages.get("types.email"),
            Some("Enter a valid email address.")
        );
        assert!(messages.get("number.min").is_some());
        assert!(messages.get("number.nope").is_none());
        assert!(messages.get("nope").is_none());
        assert!(ValidateMessages::new().get("required").is_none());
    }

    #[test]
    fn test_merge_keeps_unset_entries() {
        let mut messages = ValidateMessages::builtin();
        let overlay: ValidateMessages =
            serde_json::from_str(r#"{ "number": { "min": "Too small: ${min}" } }"#).unwrap();
        messages.merge(overlay);

        assert_eq!(messages.get("number.min"), Some("Too small: ${min}"));
        assert_eq!(
            messages.get("number.max"),
            ValidateMessages::builtin().get("number.max")
        );
        assert_eq!(messages.get("required"), Some("This field is required."));
    }

    #[test]
    fn test_interpolate() {
        let params = MessageParams {
            name: "user.age",
            min: Some(18.0),
            ..MessageParams::default()
        };
        assert_eq!(
            interpolate("${name} must be at least ${min}", &params),
            "user.age must be at least 18"
        );
        assert_eq!(interpolate("max ${max}", &params), "max ${max}");
    }

    #[test]
    fn test_enum_key_renamed() {
        let messages: ValidateMessages =
            serde_json::from_str(r#"{ "enum": "Pick one" }"#).unwrap();
        assert_eq!(messages.get("enum"), Some("Pick one"));
    }
}
