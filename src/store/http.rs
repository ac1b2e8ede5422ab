use reqwest::Client;

use crate::error::ResolutionError;
use crate::model::SchemaDocument;
use crate::store::traits::SchemaSource;

/// Fetches the schema document from the backend
#[derive(Debug, Clone)]
pub struct HttpSchemaSource {
    client: Client,
    url: String,
}

impl HttpSchemaSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }

    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl SchemaSource for HttpSchemaSource {
    async fn get_spec(&self) -> Result<SchemaDocument, ResolutionError> {
        log::info!("Fetching schema document from {}", self.url);
        let document = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json::<SchemaDocument>()
            .await?;
        Ok(document)
    }
}
