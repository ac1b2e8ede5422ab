use env_logger::Builder;
use log::LevelFilter;
use opus_forms::config::AppConfig;
use opus_forms::{model_cache, FormTree};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let config = AppConfig::load()?;
    log::info!(
        "Configuration loaded: timeout={}ms debounce={}ms",
        config.resolver.timeout_ms,
        config.form.debounce_ms
    );

    let model_name = std::env::args().nth(1).unwrap_or_else(|| "Opus".to_string());
    let cache = model_cache(&config)?;

    let model = cache.get_or_resolve(&model_name).await?;
    let form = FormTree::load(cache.clone(), &model_name, config.form.options()).await;

    let report = json!({
        "model": model.as_ref(),
        "status": form.status(),
        "nestedModels": cache.resolver().registry().len(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
