use crate::model::SchemaNode;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

const DEFINITIONS_PREFIX: &str = "#/definitions/";
const REMOTE_PREFIX: &str = "remote/";
const NESTED_PREFIX: &str = "nested/";

/// The schema document served by the backend, fetched once per session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDocument {
    /// Model name -> raw (unresolved) schema node
    #[serde(default)]
    pub definitions: IndexMap<String, SchemaNode>,

    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl SchemaDocument {
    pub fn definition(&self, name: &str) -> Option<&SchemaNode> {
        self.definitions.get(name)
    }
}

/// Canonical cache key of a model
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModelUri {
    /// A named definition of the schema document
    Remote(String),
    /// A fragment extracted into the nested model registry
    Nested(String),
}

impl ModelUri {
    /// Canonicalize any accepted spelling:
    /// `#/definitions/X` and bare `X` become `remote/X`, `remote/` and `nested/` pass through.
    pub fn parse(raw: &str) -> Self {
        if let Some(name) = raw.strip_prefix(DEFINITIONS_PREFIX) {
            ModelUri::Remote(name.to_string())
        } else if let Some(name) = raw.strip_prefix(REMOTE_PREFIX) {
            ModelUri::Remote(name.to_string())
        } else if let Some(key) = raw.strip_prefix(NESTED_PREFIX) {
            ModelUri::Nested(key.to_string())
        } else {
            ModelUri::Remote(raw.to_string())
        }
    }

    pub fn nested(key: impl Into<String>) -> Self {
        ModelUri::Nested(key.into())
    }

    pub fn name(&self) -> &str {
        match self {
            ModelUri::Remote(name) | ModelUri::Nested(name) => name,
        }
    }

    pub fn is_nested(&self) -> bool {
        matches!(self, ModelUri::Nested(_))
    }
}

impl fmt::Display for ModelUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelUri::Remote(name) => write!(f, "{}{}", REMOTE_PREFIX, name),
            ModelUri::Nested(key) => write!(f, "{}{}", NESTED_PREFIX, key),
        }
    }
}

impl From<&str> for ModelUri {
    fn from(raw: &str) -> Self {
        ModelUri::parse(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_uris() {
        assert_eq!(ModelUri::parse("#/definitions/Opus").to_string(), "remote/Opus");
        assert_eq!(ModelUri::parse("Opus").to_string(), "remote/Opus");
        assert_eq!(ModelUri::parse("remote/Opus").to_string(), "remote/Opus");
        assert_eq!(
            ModelUri::parse("nested/Opus.parts").to_string(),
            "nested/Opus.parts"
        );
        assert!(ModelUri::parse("nested/x").is_nested());
        assert_eq!(ModelUri::parse("#/definitions/Voice").name(), "Voice");
    }
}
