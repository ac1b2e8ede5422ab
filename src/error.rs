use thiserror::Error;

/// Failures while turning a model identifier into a resolved model.
///
/// Cloneable so a single shared resolution can hand the same failure to
/// every caller waiting on it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolutionError {
    #[error("Schema has no definition named '{0}'")]
    UnknownDefinition(String),

    #[error("No nested model registered under '{0}'")]
    UnknownNestedModel(String),

    #[error("Reference cycle while resolving '{0}'")]
    ReferenceCycle(String),

    #[error("Schema source error: {0}")]
    Source(String),

    #[error("Resolution of '{uri}' timed out after {waited_ms}ms")]
    Timeout { uri: String, waited_ms: u64 },

    #[error("Resolution of '{0}' was abandoned before completing")]
    Closed(String),
}

impl ResolutionError {
    /// Transport failures are worth retrying later, definition failures are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ResolutionError::Source(_) | ResolutionError::Closed(_)
        )
    }
}

impl From<reqwest::Error> for ResolutionError {
    fn from(err: reqwest::Error) -> Self {
        ResolutionError::Source(err.to_string())
    }
}

/// Failures of structural form operations (not validation states).
#[derive(Error, Debug)]
pub enum FormError {
    #[error("No form layer at path '{0}'")]
    UnknownPath(String),

    #[error("Property at '{0}' is not an array of sub-forms")]
    NotAnArray(String),

    #[error("Index {index} is out of range for '{path}'")]
    IndexOutOfRange { path: String, index: usize },

    #[error("No control '{key}' in layer '{path}'")]
    UnknownControl { path: String, key: String },

    #[error("Form at '{0}' has no model available")]
    Unavailable(String),

    #[error("Form cannot be saved, invalid properties: {}", invalid.join(", "))]
    NotSavable { invalid: Vec<String> },

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
