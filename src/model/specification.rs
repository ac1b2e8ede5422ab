use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Id carried by fresh, not yet persisted entities
pub const FRESH_ID: i64 = -1;

fn fresh_id() -> i64 {
    FRESH_ID
}

/// The backend sends `null` for unset ids
fn id_or_fresh<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    Ok(Option::<i64>::deserialize(deserializer)?.unwrap_or(FRESH_ID))
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A `{ id, ... }` pointer to another entity (person, taxonomy entry, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRef {
    #[serde(default = "fresh_id", deserialize_with = "id_or_fresh")]
    pub id: i64,

    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl EntityRef {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            rest: Map::new(),
        }
    }

    pub fn unset() -> Self {
        Self::new(FRESH_ID)
    }

    pub fn is_unset(&self) -> bool {
        self.id == FRESH_ID
    }
}

impl Default for EntityRef {
    fn default() -> Self {
        Self::unset()
    }
}

/// Performance-practice annotation attached to a structural path of the form tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecificationRecord {
    #[serde(default = "fresh_id", deserialize_with = "id_or_fresh")]
    pub id: i64,

    /// Dot separated path, array indices as numeric segments (e.g. `voices.2.dynamics`)
    pub path: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub share: EntityRef,

    /// Spelled the way the backend spells it
    #[serde(default, deserialize_with = "null_as_default")]
    pub occurence: EntityRef,

    #[serde(default, deserialize_with = "null_as_default")]
    pub instrumentation: Vec<EntityRef>,

    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl SpecificationRecord {
    /// A fresh sentinel record for `path`
    pub fn fresh(path: impl Into<String>) -> Self {
        Self {
            id: FRESH_ID,
            path: path.into(),
            share: EntityRef::unset(),
            occurence: EntityRef::unset(),
            instrumentation: Vec::new(),
            other: Map::new(),
        }
    }
}

/// Which annotation schema a taxonomy declares for its specifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpecificationKind {
    #[serde(rename = "AA")]
    Aa,
    #[serde(rename = "AAI")]
    Aai,
}

impl SpecificationKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "AA" => Some(SpecificationKind::Aa),
            "AAI" => Some(SpecificationKind::Aai),
            _ => None,
        }
    }

    /// Model the annotation sub-form is built from
    pub fn model_name(&self) -> &'static str {
        match self {
            SpecificationKind::Aa => "SpecificationAA",
            SpecificationKind::Aai => "SpecificationAAI",
        }
    }
}
