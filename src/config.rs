use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::logic::FormOptions;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub resolver: ResolverConfig,
    pub form: FormConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// How long a caller waits for a model resolution
    pub timeout_ms: u64,
    /// HTTP location of the schema document
    pub schema_url: Option<String>,
    /// Local schema document, used when no URL is configured
    pub schema_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormConfig {
    pub debounce_ms: u64,
    /// Inject specification records into the form data
    pub specifications: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 2000,
            schema_url: None,
            schema_path: None,
        }
    }
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 50,
            specifications: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, an optional config file and the environment
    pub fn load() -> anyhow::Result<Self> {
        let mut config = config::Config::builder();

        config = config.add_source(config::Config::try_from(&AppConfig::default())?);

        config = config.add_source(config::File::with_name("config").required(false));

        // e.g. OPUS__RESOLVER__TIMEOUT_MS=500
        config = config.add_source(
            config::Environment::with_prefix("OPUS")
                .prefix_separator("__")
                .separator("__"),
        );

        let config = config.build()?;
        let app_config: AppConfig = config.try_deserialize()?;

        Ok(app_config)
    }
}

impl ResolverConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl FormConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Form options carrying these settings and nothing else
    pub fn options(&self) -> FormOptions {
        FormOptions {
            specifications: self.specifications,
            debounce: self.debounce(),
            ..Default::default()
        }
    }
}
