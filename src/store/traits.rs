use crate::error::ResolutionError;
use crate::model::SchemaDocument;

/// Where the schema document comes from
///
/// Implementations are called at most once per resolver; the resolver keeps
/// the document for the rest of the session.
#[async_trait::async_trait]
pub trait SchemaSource: Send + Sync {
    async fn get_spec(&self) -> Result<SchemaDocument, ResolutionError>;
}
