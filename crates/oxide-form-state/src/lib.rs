//! # oxide-form-state
//!
//! Framework-independent form state and validation.
//!
//! This crate provides:
//! - Field values and metadata keyed by hierarchical name paths
//! - Declarative validation rules with async custom validators
//! - Array fields with add/remove/move and contiguous renumbering
//! - A submit lifecycle with change notification
//! - A JSON form schema that builds a configured store
//!
//! ## Quick Start
//!
//! ```rust
//! use oxide_form_state::{FormCallbacks, FormStore, Rule, RuleType};
//! use std::sync::{Arc, Mutex};
//!
//! let store = FormStore::new();
//! store.register_field("email", Some(vec![
//!     Rule::new().required(),
//!     Rule::new().rule_type(RuleType::Email),
//! ]));
//! store.register_field(["user", "age"], Some(vec![Rule::new().rule_type(RuleType::Number).min(18)]));
//!
//! let failed = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&failed);
//! store.set_callbacks(FormCallbacks::new().on_finish_failed(move |info| {
//!     sink.lock().unwrap().extend(info.all_errors().into_iter().map(|(field, _)| field));
//! }));
//!
//! store.set_field_value("user.age", 30);
//! futures::executor::block_on(store.submit());
//!
//! assert_eq!(*failed.lock().unwrap(), vec!["email".to_string()]);
//! ```
//!
//! ## Name Paths
//!
//! Fields are addressed by [`NamePath`]. A plain string is read as a flat key,
//! so `"user.age"` and `["user", "age"]` name the same field.
//!
//! ```rust
//! use oxide_form_state::NamePath;
//!
//! assert_eq!(NamePath::from("user.age"), NamePath::from(["user", "age"]));
//! assert_eq!(NamePath::from(["a.b"]).to_flat_key(), r"a\.b");
//! ```

pub mod error;
pub mod evaluate;
pub mod messages;
pub mod name_path;
pub mod rule;
pub mod schema;
pub mod store;
pub mod validation;
pub mod value;

pub use error::{ErrorField, FormError, Result, ValidateError, ValidateErrorInfo};
pub use messages::ValidateMessages;
pub use name_path::{field_id, NamePath, PathSegment};
pub use rule::{CustomValidator, Message, Rule, RuleType, ValidatorError};
pub use schema::{FieldSpec, FormSchema, RuleSpec, TransformSpec};
pub use store::{FieldData, FieldHandle, FieldMeta, FormCallbacks, FormStore};
pub use validation::FormValidator;
pub use value::{flatten, FieldValue, FieldValues, NestedValue};
