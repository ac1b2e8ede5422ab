use serde_json::{json, Value};

use crate::logic::control::{ControlKind, FormControl, FormGroup};
use crate::logic::validate::Validator;
use crate::model::{ApiModel, PropertyFilter, SchemaNode, SchemaType, FRESH_ID};

/// Builds the control group of one resolved model
pub struct FormBuilder;

impl FormBuilder {
    pub fn build(model: &ApiModel, filter: &PropertyFilter) -> FormGroup {
        let mut group = FormGroup::default();
        for key in model.visible_keys() {
            if !filter.allows(&key) {
                continue;
            }
            if let Some(node) = model.properties.get(&key) {
                let control = Self::build_control(&key, node);
                group.controls.insert(key, control);
            }
        }
        group
    }

    pub fn build_control(key: &str, node: &SchemaNode) -> FormControl {
        let kind = Self::control_kind(node);
        let mut schema = node.meta().clone();
        schema.properties.clear();

        let null_value = Self::null_value(key, &schema);
        let value = schema.example.clone().unwrap_or_else(|| null_value.clone());
        let validators = Self::validators(key, &schema, &kind, &null_value);

        FormControl::new(key, kind, schema, value, null_value, validators)
    }

    pub fn control_kind(node: &SchemaNode) -> ControlKind {
        match node {
            SchemaNode::Ref(reference) if !reference.overrides.is_chooser() => ControlKind::Object {
                model_url: reference.reference.clone(),
            },
            node => {
                let meta = node.meta();
                if meta.is_array() && !meta.is_chooser() {
                    ControlKind::Array {
                        item_model_url: meta
                            .items
                            .as_ref()
                            .and_then(|items| items.ref_target())
                            .map(str::to_string),
                    }
                } else {
                    ControlKind::Field
                }
            }
        }
    }

    /// Default value, which doubles as the "nothing entered yet" sentinel
    pub fn null_value(key: &str, schema: &ApiModel) -> Value {
        if let Some(null_value) = &schema.ext.null_value {
            return null_value.clone();
        }
        if key == "id" {
            return json!(FRESH_ID);
        }
        // scalar types take precedence over the chooser shape
        match schema.schema_type {
            Some(SchemaType::String) => return json!(""),
            Some(SchemaType::Number) | Some(SchemaType::Integer) => return json!(FRESH_ID),
            Some(SchemaType::Array) => return json!([]),
            Some(SchemaType::Boolean) => return json!(false),
            Some(SchemaType::Object) | None => {}
        }
        if schema.is_chooser() {
            return if schema.ext.is_array.unwrap_or(false) {
                json!([])
            } else {
                json!({ "id": FRESH_ID })
            };
        }
        match schema.schema_type {
            Some(SchemaType::Object) => json!({}),
            _ => Value::Null,
        }
    }

    fn validators(
        key: &str,
        schema: &ApiModel,
        kind: &ControlKind,
        null_value: &Value,
    ) -> Vec<Validator> {
        let mut validators = Vec::new();

        if schema.is_required() {
            validators.push(Validator::Required);
        }
        if let Some(min) = schema.min_length.or(schema.min_items) {
            validators.push(Validator::MinLength(min));
        }
        if let Some(max) = schema.max_length.or(schema.max_items) {
            validators.push(Validator::MaxLength(max));
        }
        if let Some(min) = schema.minimum {
            validators.push(Validator::Minimum(min));
        }
        if let Some(max) = schema.maximum {
            validators.push(Validator::Maximum(max));
        }
        if let Some(validator) = schema.pattern.as_deref().and_then(Validator::pattern) {
            validators.push(validator);
        }
        if let Some(allowed) = &schema.enum_values {
            validators.push(Validator::OneOf(allowed.clone()));
        }
        if Self::checks_null_value(key, schema, kind) {
            validators.push(Validator::NullValue(null_value.clone()));
        }

        validators
    }

    /// Fresh-entity ids, sub-forms, plain lists and checkboxes have no meaningful
    /// placeholder unless the schema declares one explicitly.
    fn checks_null_value(key: &str, schema: &ApiModel, kind: &ControlKind) -> bool {
        if schema.ext.nullable.unwrap_or(false) || key == "id" {
            return false;
        }
        if schema.ext.null_value.is_some() {
            return true;
        }
        if *kind != ControlKind::Field {
            return false;
        }
        if schema.is_chooser() {
            return !schema.ext.is_array.unwrap_or(false);
        }
        matches!(
            schema.schema_type,
            Some(SchemaType::String) | Some(SchemaType::Number) | Some(SchemaType::Integer)
        )
    }
}
