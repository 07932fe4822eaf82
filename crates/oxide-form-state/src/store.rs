//! The form store: field values, metadata and rules keyed by flat key.
//!
//! [`FormStore`] is a cheap-to-clone handle. All clones share one state, so
//! a UI binding can keep [`FieldHandle`]s while the owner drives submits.
//! The internal lock is never held across an `.await` or while a callback
//! runs, so callbacks may call back into the store.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{ErrorField, ValidateErrorInfo};
use crate::messages::ValidateMessages;
use crate::name_path::{is_descendant, join_key, NamePath, PathSegment};
use crate::rule::Rule;
use crate::validation::FormValidator;
use crate::value::{flatten_into, FieldValue, FieldValues, NestedValue};

/// Per-field metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldMeta {
    /// Set by any value write after registration.
    pub touched: bool,
    /// Set while a validation of this field is in flight.
    pub validating: bool,
    /// Non-empty iff the last validation failed.
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Structured name, for reporting.
    pub name: NamePath,
    /// Excluded from the default validation set.
    pub hidden: bool,
}

impl FieldMeta {
    /// Creates pristine metadata for a field.
    pub const fn new(name: NamePath) -> Self {
        Self {
            touched: false,
            validating: false,
            errors: Vec::new(),
            warnings: Vec::new(),
            name,
            hidden: false,
        }
    }
}

/// A field's value and metadata, as reported to callbacks and accepted by
/// [`FormStore::set_fields`].
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct FieldData {
    pub name: NamePath,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<FieldValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub touched: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validating: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

impl FieldData {
    /// Creates an entry carrying only a name.
    pub fn new(name: impl Into<NamePath>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the value.
    #[must_use]
    pub fn value(mut self, value: impl Into<FieldValue>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Sets the touched flag.
    #[must_use]
    pub const fn touched(mut self, touched: bool) -> Self {
        self.touched = Some(touched);
        self
    }

    /// Sets the validating flag.
    #[must_use]
    pub const fn validating(mut self, validating: bool) -> Self {
        self.validating = Some(validating);
        self
    }

    /// Sets the errors.
    #[must_use]
    pub fn errors<S: Into<String>>(mut self, errors: impl IntoIterator<Item = S>) -> Self {
        self.errors = Some(errors.into_iter().map(Into::into).collect());
        self
    }
}

/// Called with the changed fields and every field.
pub type FieldsChangeFn = Arc<dyn Fn(&[FieldData], &[FieldData]) + Send + Sync>;
/// Called with the changed values and every value.
pub type ValuesChangeFn = Arc<dyn Fn(&FieldValues, &FieldValues) + Send + Sync>;
/// Called with the values of a successful submit.
pub type FinishFn = Arc<dyn Fn(&FieldValues) + Send + Sync>;
/// Called with the aggregate error of a failed submit.
pub type FinishFailedFn = Arc<dyn Fn(&ValidateErrorInfo) + Send + Sync>;

/// Optional outbound callbacks.
#[derive(Clone, Default)]
pub struct FormCallbacks {
    pub on_fields_change: Option<FieldsChangeFn>,
    pub on_values_change: Option<ValuesChangeFn>,
    pub on_finish: Option<FinishFn>,
    pub on_finish_failed: Option<FinishFailedFn>,
}

impl fmt::Debug for FormCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormCallbacks")
            .field("on_fields_change", &self.on_fields_change.is_some())
            .field("on_values_change", &self.on_values_change.is_some())
            .field("on_finish", &self.on_finish.is_some())
            .field("on_finish_failed", &self.on_finish_failed.is_some())
            .finish()
    }
}

impl FormCallbacks {
    /// Creates an empty callback set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the fields-change callback.
    #[must_use]
    pub fn on_fields_change(
        mut self,
        f: impl Fn(&[FieldData], &[FieldData]) + Send + Sync + 'static,
    ) -> Self {
        self.on_fields_change = Some(Arc::new(f));
        self
    }

    /// Sets the values-change callback.
    #[must_use]
    pub fn on_values_change(
        mut self,
        f: impl Fn(&FieldValues, &FieldValues) + Send + Sync + 'static,
    ) -> Self {
        self.on_values_change = Some(Arc::new(f));
        self
    }

    /// Sets the submit-success callback.
    #[must_use]
    pub fn on_finish(mut self, f: impl Fn(&FieldValues) + Send + Sync + 'static) -> Self {
        self.on_finish = Some(Arc::new(f));
        self
    }

    /// Sets the submit-failure callback.
    #[must_use]
    pub fn on_finish_failed(
        mut self,
        f: impl Fn(&ValidateErrorInfo) + Send + Sync + 'static,
    ) -> Self {
        self.on_finish_failed = Some(Arc::new(f));
        self
    }

    /// Replaces the callbacks `other` sets, keeping the rest.
    fn merge(&mut self, other: Self) {
        if other.on_fields_change.is_some() {
            self.on_fields_change = other.on_fields_change;
        }
        if other.on_values_change.is_some() {
            self.on_values_change = other.on_values_change;
        }
        if other.on_finish.is_some() {
            self.on_finish = other.on_finish;
        }
        if other.on_finish_failed.is_some() {
            self.on_finish_failed = other.on_finish_failed;
        }
    }
}

/// Change notification prepared under the lock, dispatched after it.
struct Notification {
    callbacks: FormCallbacks,
    changed_fields: Vec<FieldData>,
    all_fields: Vec<FieldData>,
    changed_values: Option<FieldValues>,
    all_values: FieldValues,
}

impl Notification {
    fn dispatch(self) {
        if let Some(on_fields_change) = &self.callbacks.on_fields_change {
            on_fields_change(&self.changed_fields, &self.all_fields);
        }
        if let (Some(on_values_change), Some(changed)) =
            (&self.callbacks.on_values_change, &self.changed_values)
        {
            on_values_change(changed, &self.all_values);
        }
    }
}

/// One array item's entries, keyed by the path below `<root>.<index>`.
#[derive(Debug, Default)]
struct ArrayItem {
    values: BTreeMap<String, FieldValue>,
    metas: BTreeMap<String, FieldMeta>,
    rules: BTreeMap<String, Vec<Rule>>,
}

impl ArrayItem {
    fn from_value(item: &NestedValue) -> Self {
        let mut values = FieldValues::new();
        flatten_into("", item, &mut values);
        let metas = values
            .keys()
            .map(|suffix| {
                let mut meta = FieldMeta::new(NamePath::new());
                meta.touched = true;
                (suffix.clone(), meta)
            })
            .collect();
        Self {
            values,
            metas,
            rules: BTreeMap::new(),
        }
    }
}

/// Joins an item's base key and a relative suffix.
fn item_key(base: &str, suffix: &str) -> String {
    if suffix.is_empty() {
        base.to_string()
    } else {
        format!("{base}.{suffix}")
    }
}

/// Splits `<root>.<index>[.<suffix>]` into index and suffix.
fn split_item_key<'k>(key: &'k str, root: &str) -> Option<(usize, &'k str)> {
    if !is_descendant(key, root) {
        return None;
    }
    let rest = &key[root.len() + 1..];
    let (index, suffix) = rest.split_once('.').unwrap_or((rest, ""));
    index.parse().ok().map(|index| (index, suffix))
}

struct StoreState {
    values: FieldValues,
    metas: BTreeMap<String, FieldMeta>,
    rules: BTreeMap<String, Vec<Rule>>,
    initial_values: FieldValues,
    initial_tree: BTreeMap<String, NestedValue>,
    callbacks: FormCallbacks,
    validator: Arc<FormValidator>,
    preserve: bool,
}

impl Default for StoreState {
    fn default() -> Self {
        Self {
            values: FieldValues::new(),
            metas: BTreeMap::new(),
            rules: BTreeMap::new(),
            initial_values: FieldValues::new(),
            initial_tree: BTreeMap::new(),
            callbacks: FormCallbacks::default(),
            validator: Arc::new(FormValidator::default()),
            preserve: true,
        }
    }
}

impl StoreState {
    fn meta_entry(&mut self, key: &str, name: &NamePath) -> &mut FieldMeta {
        self.metas
            .entry(key.to_string())
            .or_insert_with(|| FieldMeta::new(name.clone()))
    }

    fn value(&self, key: &str) -> FieldValue {
        self.values.get(key).cloned().unwrap_or_default()
    }

    fn field_data(&self, key: &str) -> FieldData {
        let meta = self.metas.get(key);
        FieldData {
            name: NamePath::from_flat_key(key),
            value: Some(self.value(key)),
            touched: Some(meta.is_some_and(|m| m.touched)),
            validating: Some(meta.is_some_and(|m| m.validating)),
            errors: Some(meta.map(|m| m.errors.clone()).unwrap_or_default()),
        }
    }

    fn all_fields(&self) -> Vec<FieldData> {
        self.values.keys().map(|key| self.field_data(key)).collect()
    }

    fn notification(
        &self,
        changed_fields: Vec<FieldData>,
        changed_values: Option<FieldValues>,
    ) -> Notification {
        Notification {
            callbacks: self.callbacks.clone(),
            changed_fields,
            all_fields: self.all_fields(),
            changed_values,
            all_values: self.values.clone(),
        }
    }

    /// Writes values, marking only keys whose value changed as touched.
    /// Returns the changed keys and values.
    fn write_values(&mut self, entries: Vec<(NamePath, FieldValue)>) -> FieldValues {
        let mut changed = FieldValues::new();
        for (name, value) in entries {
            let key = name.to_flat_key();
            let old = self.values.insert(key.clone(), value.clone());
            if old.unwrap_or_default() == value {
                continue;
            }
            self.meta_entry(&key, &name).touched = true;
            changed.insert(key, value);
        }
        changed
    }

    /// Values stored at `root` itself and below it.
    fn array_values(&self, root: &str) -> FieldValues {
        self.values
            .iter()
            .filter(|(key, _)| key.as_str() == root || is_descendant(key, root))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    fn remove_descendants(&mut self, root: &str) {
        self.values.retain(|key, _| !is_descendant(key, root));
        self.metas.retain(|key, _| !is_descendant(key, root));
        self.rules.retain(|key, _| !is_descendant(key, root));
    }

    /// Removes a whole value stored at `root` and its metadata, returning
    /// the value. A primitive array seeded from initial values lives here.
    fn take_root_value(&mut self, root: &str) -> Option<(FieldValue, Option<FieldMeta>)> {
        let value = self.values.remove(root)?;
        Some((value, self.metas.remove(root)))
    }

    /// Removes every indexed item below `root` and returns them in index
    /// order. Gaps in the numbering are dropped.
    fn take_array_items(&mut self, root: &str) -> Vec<ArrayItem> {
        let mut items: BTreeMap<usize, ArrayItem> = BTreeMap::new();

        // A whole array at the root splits into one item per element.
        if let Some((value, meta)) = self.take_root_value(root) {
            let touched = meta.is_some_and(|meta| meta.touched);
            let elements = match value {
                FieldValue::Array(elements) => elements,
                FieldValue::Undefined => Vec::new(),
                other => vec![other],
            };
            for (index, element) in elements.into_iter().enumerate() {
                let mut item_meta = FieldMeta::new(NamePath::new());
                item_meta.touched = touched;
                let item = items.entry(index).or_default();
                item.values.insert(String::new(), element);
                item.metas.insert(String::new(), item_meta);
            }
        }

        let keys: Vec<String> = self
            .values
            .keys()
            .chain(self.metas.keys())
            .chain(self.rules.keys())
            .filter(|key| split_item_key(key, root).is_some())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        for key in keys {
            let Some((index, suffix)) = split_item_key(&key, root) else {
                continue;
            };
            let item = items.entry(index).or_default();
            if let Some(value) = self.values.remove(&key) {
                item.values.insert(suffix.to_string(), value);
            }
            if let Some(meta) = self.metas.remove(&key) {
                item.metas.insert(suffix.to_string(), meta);
            }
            if let Some(rules) = self.rules.remove(&key) {
                item.rules.insert(suffix.to_string(), rules);
            }
        }

        items.into_values().collect()
    }

    /// Writes items back under `root`, numbered from 0.
    fn write_array_items(&mut self, root: &str, items: Vec<ArrayItem>) {
        for (index, item) in items.into_iter().enumerate() {
            let base = join_key(root, &PathSegment::Index(index));
            for (suffix, value) in item.values {
                self.values.insert(item_key(&base, &suffix), value);
            }
            for (suffix, mut meta) in item.metas {
                let key = item_key(&base, &suffix);
                meta.name = NamePath::from_flat_key(&key);
                self.metas.insert(key, meta);
            }
            for (suffix, rules) in item.rules {
                self.rules.insert(item_key(&base, &suffix), rules);
            }
        }
    }

    /// Diffs the values below `root` against an earlier snapshot. Removed
    /// keys are reported as undefined.
    fn array_changes(&self, root: &str, before: &FieldValues) -> FieldValues {
        let after = self.array_values(root);
        let mut changed: FieldValues = after
            .iter()
            .filter(|(key, value)| before.get(*key) != Some(*value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        for key in before.keys() {
            if !after.contains_key(key) {
                changed.insert(key.clone(), FieldValue::Undefined);
            }
        }
        changed
    }

    fn change_notification(&self, changed: FieldValues) -> Option<Notification> {
        if changed.is_empty() {
            return None;
        }
        let changed_fields = changed
            .iter()
            .map(|(key, value)| {
                FieldData::new(NamePath::from_flat_key(key))
                    .value(value.clone())
                    .touched(true)
            })
            .collect();
        Some(self.notification(changed_fields, Some(changed)))
    }
}

/// A field queued for validation.
struct ValidationTarget {
    key: String,
    name: NamePath,
    value: FieldValue,
    rules: Vec<Rule>,
}

/// Shared form state with registration, mutation, array operations,
/// reset and submit.
///
/// # Example
///
/// ```
/// use oxide_form_state::{FormStore, NestedValue, Rule, RuleType};
/// use serde_json::json;
///
/// let store = FormStore::with_initial_values(NestedValue::from(json!({
///     "user": { "name": "Ada", "age": 17 },
/// })));
/// store.register_field(["user", "age"], Some(vec![Rule::new().rule_type(RuleType::Number).min(18)]));
///
/// let outcome = futures::executor::block_on(store.validate_fields(None));
/// let info = outcome.unwrap_err();
/// assert_eq!(info.error_fields.len(), 1);
/// assert_eq!(info.error_fields[0].name.to_flat_key(), "user.age");
/// ```
#[derive(Clone, Default)]
pub struct FormStore {
    state: Arc<RwLock<StoreState>>,
}

impl fmt::Debug for FormStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("FormStore")
            .field("values", &state.values)
            .field("metas", &state.metas)
            .field("preserve", &state.preserve)
            .finish_non_exhaustive()
    }
}

impl FormStore {
    /// Creates an empty store with the built-in message table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with initial values.
    pub fn with_initial_values(values: impl Into<NestedValue>) -> Self {
        let store = Self::new();
        store.set_initial_values(values);
        store
    }

    // ==================== Configuration ====================

    /// Sets callbacks; callbacks `callbacks` leaves unset are kept.
    pub fn set_callbacks(&self, callbacks: FormCallbacks) {
        self.state.write().callbacks.merge(callbacks);
    }

    /// Overlays a message table on the current one.
    ///
    /// Validations already in flight keep the table they started with.
    pub fn set_validate_messages(&self, messages: ValidateMessages) {
        let mut state = self.state.write();
        Arc::make_mut(&mut state.validator).set_validate_messages(messages);
    }

    /// Returns the current message table.
    pub fn validate_messages(&self) -> ValidateMessages {
        self.state.read().validator.messages().clone()
    }

    /// Sets whether unregistered fields keep their state. Defaults to true.
    pub fn set_preserve(&self, preserve: bool) {
        self.state.write().preserve = preserve;
    }

    /// Returns the preserve flag.
    pub fn preserve(&self) -> bool {
        self.state.read().preserve
    }

    /// Seeds initial values from a nested object.
    ///
    /// Every leaf becomes both the field's reset target and its live value.
    pub fn set_initial_values(&self, values: impl Into<NestedValue>) {
        let NestedValue::Object(children) = values.into() else {
            warn!("initial values must be an object; ignoring");
            return;
        };

        let mut flat = FieldValues::new();
        for (key, child) in &children {
            flatten_into(&join_key("", &PathSegment::Key(key.clone())), child, &mut flat);
        }
        debug!(fields = flat.len(), "seeding initial values");

        let mut state = self.state.write();
        state.initial_tree.extend(children);
        state
            .initial_values
            .extend(flat.iter().map(|(k, v)| (k.clone(), v.clone())));
        state.values.extend(flat);
    }

    /// Returns the initial values as supplied, before flattening.
    pub fn initial_values(&self) -> BTreeMap<String, NestedValue> {
        self.state.read().initial_tree.clone()
    }

    /// Returns the flattened initial value of a field.
    pub fn initial_value(&self, name: impl Into<NamePath>) -> FieldValue {
        let key = name.into().to_flat_key();
        self.state
            .read()
            .initial_values
            .get(&key)
            .cloned()
            .unwrap_or_default()
    }

    // ==================== Registration ====================

    /// Registers a field and returns a live handle to it.
    ///
    /// Idempotent: an existing value or metadata entry is kept. `Some(rules)`
    /// replaces the field's rules; `None` keeps whatever is registered.
    pub fn register_field(
        &self,
        name: impl Into<NamePath>,
        rules: Option<Vec<Rule>>,
    ) -> FieldHandle {
        let name = name.into();
        let key = name.to_flat_key();
        {
            let mut state = self.state.write();
            if let Some(rules) = rules {
                state.rules.insert(key.clone(), rules);
            }
            if !state.values.contains_key(&key) {
                let initial = state.initial_values.get(&key).cloned().unwrap_or_default();
                state.values.insert(key.clone(), initial);
            }
            state.meta_entry(&key, &name);
        }
        debug!(field = %key, "registered field");
        FieldHandle {
            store: self.clone(),
            name,
            key,
        }
    }

    /// Unregisters a field. Without `preserve`, its value, metadata and
    /// rules are dropped.
    pub fn unregister_field(&self, name: impl Into<NamePath>) {
        let key = name.into().to_flat_key();
        let mut state = self.state.write();
        if state.preserve {
            return;
        }
        state.values.remove(&key);
        state.metas.remove(&key);
        state.rules.remove(&key);
        debug!(field = %key, "dropped unregistered field");
    }

    /// Returns a live handle without registering the field.
    pub fn field(&self, name: impl Into<NamePath>) -> FieldHandle {
        let name = name.into();
        let key = name.to_flat_key();
        FieldHandle {
            store: self.clone(),
            name,
            key,
        }
    }

    // ==================== Reads ====================

    /// Returns a field's value; unknown fields read as undefined.
    pub fn get_field_value(&self, name: impl Into<NamePath>) -> FieldValue {
        self.state.read().value(&name.into().to_flat_key())
    }

    /// Returns the listed values, or every value when `names` is `None`.
    pub fn get_fields_value(&self, names: Option<&[NamePath]>) -> FieldValues {
        let state = self.state.read();
        match names {
            None => state.values.clone(),
            Some(names) => names
                .iter()
                .map(|name| {
                    let key = name.to_flat_key();
                    let value = state.value(&key);
                    (key, value)
                })
                .collect(),
        }
    }

    /// Returns a field's metadata; unknown fields get pristine metadata.
    pub fn get_field_meta(&self, name: impl Into<NamePath>) -> FieldMeta {
        let name = name.into();
        self.state
            .read()
            .metas
            .get(&name.to_flat_key())
            .cloned()
            .unwrap_or_else(|| FieldMeta::new(name))
    }

    /// Returns a field's errors.
    pub fn get_field_error(&self, name: impl Into<NamePath>) -> Vec<String> {
        self.get_field_meta(name).errors
    }

    /// Returns errors for the listed fields, or every field with metadata.
    pub fn get_fields_error(&self, names: Option<&[NamePath]>) -> Vec<ErrorField> {
        let names = names.map_or_else(|| self.meta_names(), <[NamePath]>::to_vec);
        names
            .into_iter()
            .map(|name| ErrorField {
                errors: self.get_field_error(&name),
                name,
            })
            .collect()
    }

    /// Returns whether a field has been written since registration.
    pub fn is_field_touched(&self, name: impl Into<NamePath>) -> bool {
        self.get_field_meta(name).touched
    }

    /// Returns whether any listed field (or any field) is touched.
    pub fn is_fields_touched(&self, names: Option<&[NamePath]>) -> bool {
        let names = names.map_or_else(|| self.meta_names(), <[NamePath]>::to_vec);
        names.iter().any(|name| self.is_field_touched(name))
    }

    fn meta_names(&self) -> Vec<NamePath> {
        self.state
            .read()
            .metas
            .keys()
            .map(|key| NamePath::from_flat_key(key))
            .collect()
    }

    // ==================== Writes ====================

    /// Sets one field's value.
    ///
    /// Writing a value equal to the current one changes nothing and fires no
    /// callbacks.
    pub fn set_field_value(&self, name: impl Into<NamePath>, value: impl Into<FieldValue>) {
        let notification = {
            let mut state = self.state.write();
            let changed = state.write_values(vec![(name.into(), value.into())]);
            state.change_notification(changed)
        };
        if let Some(notification) = notification {
            notification.dispatch();
        }
    }

    /// Sets several values at once.
    ///
    /// Applies the same equality rule as [`set_field_value`] per key: only
    /// changed keys are touched and reported, and nothing fires when no key
    /// changed.
    ///
    /// [`set_field_value`]: Self::set_field_value
    pub fn set_fields_value<I, K, V>(&self, values: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<NamePath>,
        V: Into<FieldValue>,
    {
        let entries = values
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .collect();
        let notification = {
            let mut state = self.state.write();
            let changed = state.write_values(entries);
            state.change_notification(changed)
        };
        if let Some(notification) = notification {
            notification.dispatch();
        }
    }

    /// Overwrites values and metadata without equality checks or callbacks.
    ///
    /// Unset flags reset to `false` and unset errors to empty; an unset value
    /// leaves the stored value alone.
    pub fn set_fields(&self, fields: impl IntoIterator<Item = FieldData>) {
        let mut state = self.state.write();
        for field in fields {
            let key = field.name.to_flat_key();
            if let Some(value) = field.value {
                state.values.insert(key.clone(), value);
            }
            let meta = state.meta_entry(&key, &field.name);
            meta.touched = field.touched.unwrap_or(false);
            meta.validating = field.validating.unwrap_or(false);
            meta.errors = field.errors.unwrap_or_default();
        }
    }

    /// Marks a field as excluded from (or included in) default validation.
    pub fn set_field_hidden(&self, name: impl Into<NamePath>, hidden: bool) {
        let name = name.into();
        let key = name.to_flat_key();
        self.state.write().meta_entry(&key, &name).hidden = hidden;
    }

    /// Restores fields to their initial values and clears their metadata.
    ///
    /// With `names` as `None`, every known field is reset: anything with a
    /// value, metadata or an initial value. Fields without an initial value
    /// become undefined.
    pub fn reset_fields(&self, names: Option<&[NamePath]>) {
        let mut state = self.state.write();
        let targets: Vec<(String, NamePath)> = match names {
            Some(names) => names
                .iter()
                .map(|name| (name.to_flat_key(), name.clone()))
                .collect(),
            None => state
                .values
                .keys()
                .chain(state.metas.keys())
                .chain(state.initial_values.keys())
                .cloned()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .map(|key| {
                    let name = NamePath::from_flat_key(&key);
                    (key, name)
                })
                .collect(),
        };

        for (key, name) in targets {
            let initial = state.initial_values.get(&key).cloned().unwrap_or_default();
            state.values.insert(key.clone(), initial);
            let meta = state.meta_entry(&key, &name);
            meta.touched = false;
            meta.validating = false;
            meta.errors.clear();
            meta.warnings.clear();
        }
        debug!("reset fields");
    }

    // ==================== Array fields ====================

    /// Replaces the array rooted at `name` with `items`.
    ///
    /// Every key below `name` is removed first with its metadata and rules,
    /// as is any whole value stored at `name` itself. Each item is then
    /// flattened under `name.<index>`. As with
    /// [`clear_array_field_value`](Self::clear_array_field_value), removed
    /// keys are reported as undefined.
    pub fn set_array_field_value<T: Into<NestedValue>>(
        &self,
        name: impl Into<NamePath>,
        items: impl IntoIterator<Item = T>,
    ) {
        let root = name.into().to_flat_key();
        let mut fresh = FieldValues::new();
        for (index, item) in items.into_iter().enumerate() {
            flatten_into(
                &join_key(&root, &PathSegment::Index(index)),
                &item.into(),
                &mut fresh,
            );
        }

        let notification = {
            let mut state = self.state.write();
            let before = state.array_values(&root);
            state.take_root_value(&root);
            state.remove_descendants(&root);
            let entries = fresh
                .into_iter()
                .map(|(key, value)| (NamePath::from_flat_key(&key), value))
                .collect();
            state.write_values(entries);
            let changed = state.array_changes(&root, &before);
            state.change_notification(changed)
        };
        if let Some(notification) = notification {
            notification.dispatch();
        }
    }

    /// Removes every value, metadata entry and rule list below `name`.
    ///
    /// A whole value stored at `name` itself is kept.
    pub fn clear_array_field_value(&self, name: impl Into<NamePath>) {
        let root = name.into().to_flat_key();
        let notification = {
            let mut state = self.state.write();
            let before = state.array_values(&root);
            state.remove_descendants(&root);
            let changed = state.array_changes(&root, &before);
            state.change_notification(changed)
        };
        if let Some(notification) = notification {
            notification.dispatch();
        }
    }

    /// Inserts an item at `index` (appends when `None` or out of range).
    pub fn add_array_item(
        &self,
        name: impl Into<NamePath>,
        item: impl Into<NestedValue>,
        index: Option<usize>,
    ) {
        let item = ArrayItem::from_value(&item.into());
        self.edit_array(name.into(), move |items| {
            let at = index.map_or(items.len(), |index| index.min(items.len()));
            items.insert(at, item);
        });
    }

    /// Removes the items at `indices`; unknown indices are ignored.
    pub fn remove_array_items(
        &self,
        name: impl Into<NamePath>,
        indices: impl IntoIterator<Item = usize>,
    ) {
        let indices: BTreeSet<usize> = indices.into_iter().collect();
        self.edit_array(name.into(), move |items| {
            let mut position = 0;
            items.retain(|_| {
                let keep = !indices.contains(&position);
                position += 1;
                keep
            });
        });
    }

    /// Moves the item at `from` to `to`. Out-of-range moves do nothing.
    pub fn move_array_item(&self, name: impl Into<NamePath>, from: usize, to: usize) {
        self.edit_array(name.into(), move |items| {
            if from >= items.len() || to >= items.len() || from == to {
                return;
            }
            let item = items.remove(from);
            items.insert(to, item);
        });
    }

    /// Collects the items below `name`, applies `edit`, then renumbers.
    fn edit_array(&self, name: NamePath, edit: impl FnOnce(&mut Vec<ArrayItem>)) {
        let root = name.to_flat_key();
        let notification = {
            let mut state = self.state.write();
            let before = state.array_values(&root);
            let mut items = state.take_array_items(&root);
            edit(&mut items);
            debug!(field = %root, items = items.len(), "renumbering array field");
            state.write_array_items(&root, items);
            let changed = state.array_changes(&root, &before);
            state.change_notification(changed)
        };
        if let Some(notification) = notification {
            notification.dispatch();
        }
    }

    // ==================== Validation ====================

    /// Validates the listed fields, or every non-hidden field with
    /// metadata when `names` is `None`.
    ///
    /// Fields are validated concurrently; errors are reported in the order
    /// of the target list. Returns the value snapshot on success.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidateErrorInfo`] listing every failing field when at
    /// least one field fails.
    pub async fn validate_fields(
        &self,
        names: Option<&[NamePath]>,
    ) -> Result<FieldValues, ValidateErrorInfo> {
        let (validator, targets) = {
            let mut state = self.state.write();
            let names: Vec<NamePath> = match names {
                Some(names) => names.to_vec(),
                None => state
                    .metas
                    .iter()
                    .filter(|(_, meta)| !meta.hidden)
                    .map(|(key, _)| NamePath::from_flat_key(key))
                    .collect(),
            };
            let targets: Vec<ValidationTarget> = names
                .into_iter()
                .map(|name| {
                    let key = name.to_flat_key();
                    state.meta_entry(&key, &name).validating = true;
                    ValidationTarget {
                        value: state.value(&key),
                        rules: state.rules.get(&key).cloned().unwrap_or_default(),
                        key,
                        name,
                    }
                })
                .collect();
            (Arc::clone(&state.validator), targets)
        };
        debug!(fields = targets.len(), "validating fields");

        let outcomes = join_all(
            targets
                .iter()
                .map(|target| validator.validate_field(&target.value, &target.rules, &target.key)),
        )
        .await;

        let (values, error_fields, notification) = {
            let mut state = self.state.write();
            let mut error_fields = Vec::new();
            let mut changed_fields = Vec::with_capacity(targets.len());
            for (target, outcome) in targets.into_iter().zip(outcomes) {
                // Removed while validating, e.g. by an array clear.
                let Some(meta) = state.metas.get_mut(&target.key) else {
                    debug!(field = %target.key, "dropping result for removed field");
                    continue;
                };
                meta.validating = false;
                match outcome {
                    Ok(()) => meta.errors.clear(),
                    Err(err) => {
                        meta.errors = vec![err.message.clone()];
                        error_fields.push(ErrorField {
                            name: NamePath::from_flat_key(&target.key),
                            errors: vec![err.message],
                        });
                    }
                }
                changed_fields.push(state.field_data(&target.key));
            }
            let notification = state.notification(changed_fields, None);
            (state.values.clone(), error_fields, notification)
        };
        notification.dispatch();

        if error_fields.is_empty() {
            debug!("validation passed");
            Ok(values)
        } else {
            debug!(failed = error_fields.len(), "validation failed");
            Err(ValidateErrorInfo {
                values,
                error_fields,
                out_of_date: false,
            })
        }
    }

    /// Validates the default field set and reports through `on_finish` or
    /// `on_finish_failed`. Never returns the failure.
    pub async fn submit(&self) {
        let outcome = self.validate_fields(None).await;
        let callbacks = self.state.read().callbacks.clone();
        match outcome {
            Ok(values) => {
                info!(fields = values.len(), "form submitted");
                if let Some(on_finish) = &callbacks.on_finish {
                    on_finish(&values);
                }
            }
            Err(error_info) => {
                info!(failed = error_info.len(), "form submit failed validation");
                if let Some(on_finish_failed) = &callbacks.on_finish_failed {
                    on_finish_failed(&error_info);
                }
            }
        }
    }
}

/// A live view of one field.
#[derive(Debug, Clone)]
pub struct FieldHandle {
    store: FormStore,
    name: NamePath,
    key: String,
}

impl FieldHandle {
    /// Returns the field's name.
    pub const fn name(&self) -> &NamePath {
        &self.name
    }

    /// Returns the field's flat key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the current value.
    pub fn value(&self) -> FieldValue {
        self.store.state.read().value(&self.key)
    }

    /// Returns the current metadata.
    pub fn meta(&self) -> FieldMeta {
        self.store.get_field_meta(&self.name)
    }

    /// Sets the value through the store.
    pub fn set_value(&self, value: impl Into<FieldValue>) {
        self.store.set_field_value(&self.name, value);
    }
}
