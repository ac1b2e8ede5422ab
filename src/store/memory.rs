use std::path::Path;

use anyhow::{Context, Result};

use crate::error::ResolutionError;
use crate::model::SchemaDocument;
use crate::store::traits::SchemaSource;

/// Serves a document that is already in memory
#[derive(Debug, Clone)]
pub struct StaticSchemaSource {
    document: SchemaDocument,
}

impl StaticSchemaSource {
    pub fn new(document: SchemaDocument) -> Self {
        Self { document }
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let document = serde_json::from_value(value).context("Invalid schema document")?;
        Ok(Self::new(document))
    }

    /// Load a document saved to disk (e.g. a downloaded `swagger.json`)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read schema file {}", path.display()))?;
        let document = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid schema document in {}", path.display()))?;
        Ok(Self::new(document))
    }
}

#[async_trait::async_trait]
impl SchemaSource for StaticSchemaSource {
    async fn get_spec(&self) -> Result<SchemaDocument, ResolutionError> {
        Ok(self.document.clone())
    }
}
