use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::fmt;

use crate::logic::validate::{ValidationError, Validator};
use crate::model::ApiModel;

pub type ChangeCallback = Box<dyn Fn(&Value) + Send + Sync>;
pub type TouchedCallback = Box<dyn Fn() + Send + Sync>;

/// Minimal contract of a leaf input: reference choosers, taxonomy selectors,
/// enumerations and plain inputs all edit their value through it.
pub trait ValueAccessor {
    fn value(&self) -> &Value;

    /// Programmatic write; does not notify change listeners
    fn write_value(&mut self, value: Value);

    fn register_on_change(&mut self, callback: ChangeCallback);

    fn register_on_touched(&mut self, callback: TouchedCallback);

    fn mark_touched(&mut self);

    /// `None` when valid
    fn validate(&self) -> Option<Vec<ValidationError>>;
}

/// How a property is rendered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlKind {
    Field,
    /// Object property edited by one child layer
    Object { model_url: String },
    /// Array property; with an item model every element gets a child layer,
    /// otherwise the list is edited as a plain value
    Array { item_model_url: Option<String> },
}

impl ControlKind {
    pub fn is_sub_form(&self) -> bool {
        matches!(
            self,
            ControlKind::Object { .. }
                | ControlKind::Array {
                    item_model_url: Some(_)
                }
        )
    }
}

pub struct FormControl {
    pub key: String,
    pub kind: ControlKind,
    /// Resolved property schema (without nested properties)
    pub schema: ApiModel,
    /// The empty sentinel compared against by the null validator
    pub null_value: Value,
    pub validators: Vec<Validator>,
    value: Value,
    touched: bool,
    dirty: bool,
    on_change: Vec<ChangeCallback>,
    on_touched: Vec<TouchedCallback>,
}

impl fmt::Debug for FormControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormControl")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("value", &self.value)
            .field("null_value", &self.null_value)
            .field("validators", &self.validators)
            .field("touched", &self.touched)
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl FormControl {
    pub fn new(
        key: impl Into<String>,
        kind: ControlKind,
        schema: ApiModel,
        value: Value,
        null_value: Value,
        validators: Vec<Validator>,
    ) -> Self {
        Self {
            key: key.into(),
            kind,
            schema,
            null_value,
            validators,
            value,
            touched: false,
            dirty: false,
            on_change: Vec::new(),
            on_touched: Vec::new(),
        }
    }

    /// User edit: stores the value and notifies change listeners
    pub fn set_value(&mut self, value: Value) {
        self.value = value;
        self.dirty = true;
        for callback in &self.on_change {
            callback(&self.value);
        }
    }

    pub fn errors(&self) -> Vec<ValidationError> {
        self.validators
            .iter()
            .filter_map(|validator| validator.validate(&self.value))
            .collect()
    }

    pub fn is_valid(&self) -> bool {
        self.validators
            .iter()
            .all(|validator| validator.validate(&self.value).is_none())
    }

    pub fn is_touched(&self) -> bool {
        self.touched
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Edits to this property may be saved while invalid
    pub fn allows_save(&self) -> bool {
        self.schema.ext.allow_save.unwrap_or(false)
    }

    /// Entity type a reference chooser searches, with `context` from the host
    pub fn reference(&self) -> Option<&str> {
        self.schema.ext.reference.as_deref()
    }

    pub fn taxonomy(&self) -> Option<&str> {
        self.schema.ext.taxonomy.as_deref()
    }

    pub fn enum_values(&self) -> Option<&[Value]> {
        self.schema.enum_values.as_deref()
    }

    /// Display labels keyed by enum value
    pub fn enum_translation(&self) -> Option<&Value> {
        self.schema.ext.enum_translation.as_ref()
    }
}

impl ValueAccessor for FormControl {
    fn value(&self) -> &Value {
        &self.value
    }

    fn write_value(&mut self, value: Value) {
        self.value = value;
    }

    fn register_on_change(&mut self, callback: ChangeCallback) {
        self.on_change.push(callback);
    }

    fn register_on_touched(&mut self, callback: TouchedCallback) {
        self.on_touched.push(callback);
    }

    fn mark_touched(&mut self) {
        self.touched = true;
        for callback in &self.on_touched {
            callback();
        }
    }

    fn validate(&self) -> Option<Vec<ValidationError>> {
        let errors = self.errors();
        (!errors.is_empty()).then_some(errors)
    }
}

/// Controls of one layer keyed by property key, in display order
#[derive(Debug, Default)]
pub struct FormGroup {
    pub controls: IndexMap<String, FormControl>,
}

impl FormGroup {
    pub fn get(&self, key: &str) -> Option<&FormControl> {
        self.controls.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut FormControl> {
        self.controls.get_mut(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.controls.keys()
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }

    /// Own validators only; sub-form results are folded in by the tree
    pub fn is_valid(&self) -> bool {
        self.controls.values().all(FormControl::is_valid)
    }

    pub fn value(&self) -> Map<String, Value> {
        self.controls
            .iter()
            .map(|(key, control)| (key.clone(), control.value().clone()))
            .collect()
    }

    /// Write the values present in `data`, leaving other controls alone.
    /// Returns the keys whose value actually changed.
    pub fn patch_value(&mut self, data: &Map<String, Value>) -> Vec<String> {
        let mut changed = Vec::new();
        for (key, value) in data {
            if let Some(control) = self.controls.get_mut(key) {
                if control.value() != value {
                    control.write_value(value.clone());
                    changed.push(key.clone());
                }
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn title_control() -> FormControl {
        FormControl::new(
            "title",
            ControlKind::Field,
            ApiModel::default(),
            json!(""),
            json!(""),
            vec![Validator::Required, Validator::NullValue(json!(""))],
        )
    }

    #[test]
    fn test_accessor_callbacks() {
        let mut control = title_control();
        let changes = Arc::new(AtomicUsize::new(0));
        let touches = Arc::new(AtomicUsize::new(0));

        let counter = changes.clone();
        control.register_on_change(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        let counter = touches.clone();
        control.register_on_touched(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        control.write_value(json!("silent"));
        assert_eq!(changes.load(Ordering::SeqCst), 0);
        assert!(!control.is_dirty());

        control.set_value(json!("Missa brevis"));
        control.mark_touched();
        assert_eq!(changes.load(Ordering::SeqCst), 1);
        assert_eq!(touches.load(Ordering::SeqCst), 1);
        assert!(control.is_dirty() && control.is_touched());
        assert!(control.validate().is_none());
        assert!(control.reference().is_none());
        assert!(control.enum_values().is_none());
    }

    #[test]
    fn test_group_patch_reports_changes() {
        let mut group = FormGroup::default();
        group.controls.insert("title".to_string(), title_control());
        assert!(!group.is_valid());
        assert_eq!(group.get("title").unwrap().validate().unwrap().len(), 2);

        let patch = json!({"title": "Messe", "unknown": 1});
        let changed = group.patch_value(patch.as_object().unwrap());
        assert_eq!(changed, vec!["title"]);
        assert!(group.is_valid());
        assert!(group.patch_value(patch.as_object().unwrap()).is_empty());
        assert_eq!(group.value().get("title"), Some(&json!("Messe")));
    }
}
