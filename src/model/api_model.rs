use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Declared `type` of a schema node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    Object,
    Array,
    String,
    Number,
    Integer,
    Boolean,
}

/// Keeps an explicit JSON `null` as `Some(Value::Null)` instead of `None`
fn explicit_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// `x-` extension attributes driving form behaviour
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extensions {
    #[serde(rename = "x-key", default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// Display order; unset counts as 0
    #[serde(rename = "x-order", default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,

    /// Empty sentinel, also the default value of the control
    #[serde(
        rename = "x-nullValue",
        default,
        deserialize_with = "explicit_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub null_value: Option<Value>,

    #[serde(rename = "x-nullable", default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,

    /// Name of the related entity a reference chooser picks from
    #[serde(rename = "x-reference", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,

    #[serde(rename = "x-taxonomy", default, skip_serializing_if = "Option::is_none")]
    pub taxonomy: Option<String>,

    #[serde(rename = "x-isArray", default, skip_serializing_if = "Option::is_none")]
    pub is_array: Option<bool>,

    /// Property may be invalid and the form still saved
    #[serde(rename = "x-allowSave", default, skip_serializing_if = "Option::is_none")]
    pub allow_save: Option<bool>,

    #[serde(rename = "x-hidden", default, skip_serializing_if = "Option::is_none")]
    pub hidden: Option<bool>,

    #[serde(rename = "x-enumTranslation", default, skip_serializing_if = "Option::is_none")]
    pub enum_translation: Option<Value>,

    /// Projected from the parent's `required` list during resolution
    #[serde(rename = "x-required", default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
}

/// A schema node: either a raw definition or, after resolution, a flattened model
/// whose properties are concrete models or `nested/` references.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiModel {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<SchemaType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// Declaration order is display order unless `x-order` says otherwise
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub properties: IndexMap<String, SchemaNode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<SchemaNode>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,

    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,

    #[serde(
        default,
        deserialize_with = "explicit_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub example: Option<Value>,

    #[serde(rename = "minLength", default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,

    #[serde(rename = "maxLength", default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,

    #[serde(rename = "minItems", default, skip_serializing_if = "Option::is_none")]
    pub min_items: Option<usize>,

    #[serde(rename = "maxItems", default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    #[serde(flatten)]
    pub ext: Extensions,

    /// Attributes the engine does not interpret, carried through merges
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl ApiModel {
    pub fn object() -> Self {
        Self {
            schema_type: Some(SchemaType::Object),
            ..Default::default()
        }
    }

    pub fn of_type(schema_type: SchemaType) -> Self {
        Self {
            schema_type: Some(schema_type),
            ..Default::default()
        }
    }

    pub fn is_object(&self) -> bool {
        self.schema_type == Some(SchemaType::Object)
    }

    pub fn is_array(&self) -> bool {
        self.schema_type == Some(SchemaType::Array)
    }

    /// Reference choosers and taxonomy selectors are leaf controls even when object-shaped
    pub fn is_chooser(&self) -> bool {
        self.ext.reference.is_some() || self.ext.taxonomy.is_some()
    }

    pub fn is_required(&self) -> bool {
        self.ext.required.unwrap_or(false)
    }

    pub fn is_hidden(&self) -> bool {
        self.ext.hidden.unwrap_or(false)
    }

    pub fn order(&self) -> i64 {
        self.ext.order.unwrap_or(0)
    }

    /// Highest `x-order` among the declared properties, 0 when none is set
    pub fn max_property_order(&self) -> i64 {
        self.properties
            .values()
            .map(|p| p.meta().order())
            .max()
            .unwrap_or(0)
            .max(0)
    }

    /// Properties in display order: `x-order` ascending, ties by declaration order
    pub fn ordered_properties(&self) -> Vec<(&String, &SchemaNode)> {
        let mut props: Vec<(&String, &SchemaNode)> = self.properties.iter().collect();
        // sort_by_key is stable
        props.sort_by_key(|(_, node)| node.meta().order());
        props
    }

    /// Keys of non-hidden properties in display order
    pub fn visible_keys(&self) -> Vec<String> {
        self.ordered_properties()
            .into_iter()
            .filter(|(_, node)| !node.meta().is_hidden())
            .map(|(key, _)| key.clone())
            .collect()
    }
}

/// `{ "$ref": ..., ...overrides }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiModelRef {
    #[serde(rename = "$ref")]
    pub reference: String,

    /// Attributes declared next to `$ref`; they win over the target's
    #[serde(flatten)]
    pub overrides: ApiModel,
}

/// `{ "allOf": [...], ...overrides }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiModelAllOf {
    #[serde(rename = "allOf")]
    pub all_of: Vec<SchemaNode>,

    #[serde(flatten)]
    pub overrides: ApiModel,
}

/// Any position a schema can appear in: a reference, a composition or a model
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SchemaNode {
    Ref(ApiModelRef),
    AllOf(ApiModelAllOf),
    Model(ApiModel),
}

impl<'de> Deserialize<'de> for SchemaNode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let node = match &value {
            Value::Object(map) if map.contains_key("$ref") => {
                serde_json::from_value(value).map(SchemaNode::Ref)
            }
            Value::Object(map) if map.contains_key("allOf") => {
                serde_json::from_value(value).map(SchemaNode::AllOf)
            }
            _ => serde_json::from_value(value).map(SchemaNode::Model),
        };
        node.map_err(serde::de::Error::custom)
    }
}

impl SchemaNode {
    pub fn reference(reference: impl Into<String>) -> Self {
        SchemaNode::Ref(ApiModelRef {
            reference: reference.into(),
            overrides: ApiModel::default(),
        })
    }

    /// The attributes visible at this position without resolving anything
    pub fn meta(&self) -> &ApiModel {
        match self {
            SchemaNode::Ref(r) => &r.overrides,
            SchemaNode::AllOf(a) => &a.overrides,
            SchemaNode::Model(m) => m,
        }
    }

    pub fn meta_mut(&mut self) -> &mut ApiModel {
        match self {
            SchemaNode::Ref(r) => &mut r.overrides,
            SchemaNode::AllOf(a) => &mut a.overrides,
            SchemaNode::Model(m) => m,
        }
    }

    pub fn as_model(&self) -> Option<&ApiModel> {
        match self {
            SchemaNode::Model(m) => Some(m),
            _ => None,
        }
    }

    /// Target of a `$ref` node
    pub fn ref_target(&self) -> Option<&str> {
        match self {
            SchemaNode::Ref(r) => Some(r.reference.as_str()),
            _ => None,
        }
    }
}

impl From<ApiModel> for SchemaNode {
    fn from(model: ApiModel) -> Self {
        SchemaNode::Model(model)
    }
}
