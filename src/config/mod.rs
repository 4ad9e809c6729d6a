pub mod enhance;
pub mod types;

use anyhow::{Context, Result};
use std::path::Path;

pub use types::{Config, EngineSettings, JobsConfig, LogConfig, StoreConfig, SubscriptionConfig};

pub fn load_config(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let content = load_config_content(path)?;
    let config: Config = serde_yml::from_str(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

pub fn load_config_content(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let raw_content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(enhance::expand_env_vars(&raw_content))
}

/// Engine template text: the configured file, or `None` for the built-in one.
pub fn load_engine_template(settings: &EngineSettings) -> Result<Option<String>> {
    let Some(path) = &settings.template_path else {
        return Ok(None);
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read engine template {}", path.display()))?;
    serde_json::from_str::<serde_json::Value>(&text)
        .with_context(|| format!("engine template {} is not valid JSON", path.display()))?;
    Ok(Some(text))
}
