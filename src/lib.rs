#![recursion_limit = "512"]

pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod seed;
pub mod store;

use std::sync::Arc;

pub use error::{FormError, ResolutionError};

// Export logic types
pub use logic::{
    ControlKind, FormBuilder, FormControl, FormGroup, FormLayer, FormOptions, FormTree,
    LayerState, ModelResolver, SchemaMerger, SharedOverlay, SpecificationEditor,
    SpecificationOverlay, ValidationError, ValidationErrorType, Validator, ValueAccessor,
};

// Export all model types
pub use model::*;

// Export seed module
pub use seed::*;

// Export store types
pub use store::{
    HttpSchemaSource, ModelCache, NestedModelRegistry, SchemaSource, StaticSchemaSource,
};

/// Schema source picked by configuration: HTTP, then a local file, then the
/// bundled demonstration schema
pub fn schema_source(
    config: &config::ResolverConfig,
) -> anyhow::Result<Arc<dyn SchemaSource>> {
    if let Some(url) = &config.schema_url {
        log::info!("Using schema document at {}", url);
        return Ok(Arc::new(HttpSchemaSource::new(url.clone())));
    }
    if let Some(path) = &config.schema_path {
        log::info!("Using schema document from {}", path);
        return Ok(Arc::new(StaticSchemaSource::from_file(path)?));
    }
    log::info!("Using the bundled opus schema");
    Ok(Arc::new(seed::opus_source()?))
}

/// A session cache wired from configuration
pub fn model_cache(config: &config::AppConfig) -> anyhow::Result<Arc<ModelCache>> {
    let resolver = ModelResolver::new(schema_source(&config.resolver)?);
    Ok(Arc::new(ModelCache::with_timeout(
        Arc::new(resolver),
        config.resolver.timeout(),
    )))
}
