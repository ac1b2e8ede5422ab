use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Properties never turned into controls
pub const HYPERMEDIA_KEYS: &[&str] = &["_links", "_embedded"];

/// Black/whitelist applied to a resolved model before building its form
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyFilter {
    #[serde(default)]
    pub exclude: Vec<String>,

    /// When set, only these keys are kept
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub only: Option<Vec<String>>,
}

impl PropertyFilter {
    pub fn excluding<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            exclude: keys.into_iter().map(Into::into).collect(),
            only: None,
        }
    }

    pub fn only<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            exclude: Vec::new(),
            only: Some(keys.into_iter().map(Into::into).collect()),
        }
    }

    pub fn allows(&self, key: &str) -> bool {
        if HYPERMEDIA_KEYS.contains(&key) || self.exclude.iter().any(|k| k == key) {
            return false;
        }
        match &self.only {
            Some(only) => only.iter().any(|k| k == key),
            None => true,
        }
    }
}

/// What the root form publishes to its host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormStatus {
    pub valid: bool,
    pub valid_for_save: bool,
    pub data: Value,
}

impl Default for FormStatus {
    fn default() -> Self {
        Self {
            valid: false,
            valid_for_save: false,
            data: Value::Null,
        }
    }
}
