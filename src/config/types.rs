use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use serde::Deserialize;

/// Application configuration (YAML).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub subscription: SubscriptionConfig,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        let model = &self.subscription.remark_model;
        if model.chars().count() < 2 {
            anyhow::bail!(
                "subscription.remark_model '{}' needs a separator and at least one symbol",
                model
            );
        }
        if let Some(bad) = model.chars().skip(1).find(|c| !matches!(c, 'i' | 'e' | 'o')) {
            anyhow::bail!(
                "subscription.remark_model '{}' has unknown symbol '{}' (expected i, e or o)",
                model,
                bad
            );
        }
        if self.engine.binary.as_os_str().is_empty() {
            anyhow::bail!("engine.binary is required");
        }
        if self.engine.config_path.as_os_str().is_empty() {
            anyhow::bail!("engine.config_path is required");
        }
        if self.store.path.as_os_str().is_empty() {
            anyhow::bail!("store.path is required");
        }
        if self.jobs.traffic_interval_secs == 0 || self.jobs.reconcile_interval_secs == 0 {
            anyhow::bail!("jobs intervals must be greater than zero");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// 订阅输出相关设置
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionConfig {
    /// Append remaining volume / expiry to remarks.
    #[serde(default)]
    pub show_info: bool,
    /// Separator followed by symbols from {i, e, o}.
    #[serde(default = "default_remark_model")]
    pub remark_model: String,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            show_info: false,
            remark_model: default_remark_model(),
        }
    }
}

fn default_remark_model() -> String {
    "-ieo".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineSettings {
    #[serde(default = "default_engine_binary")]
    pub binary: PathBuf,
    #[serde(default = "default_engine_config_path")]
    pub config_path: PathBuf,
    /// Management endpoint used when the engine config has no `api` inbound.
    #[serde(default = "default_api_addr")]
    pub api_addr: SocketAddr,
    /// Custom engine template; the built-in one is used when unset.
    #[serde(default)]
    pub template_path: Option<PathBuf>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            binary: default_engine_binary(),
            config_path: default_engine_config_path(),
            api_addr: default_api_addr(),
            template_path: None,
        }
    }
}

fn default_engine_binary() -> PathBuf {
    PathBuf::from("bin/xray")
}

fn default_engine_config_path() -> PathBuf {
    PathBuf::from("bin/config.json")
}

fn default_api_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 62789))
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("xpanel.json")
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobsConfig {
    #[serde(default = "default_traffic_interval")]
    pub traffic_interval_secs: u64,
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            traffic_interval_secs: default_traffic_interval(),
            reconcile_interval_secs: default_reconcile_interval(),
        }
    }
}

fn default_traffic_interval() -> u64 {
    10
}

fn default_reconcile_interval() -> u64 {
    30
}
