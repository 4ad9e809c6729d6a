//! 外部代理引擎：配置合成、进程管理与流量统计
//!
//! 本模块不实现任何代理协议，只负责生成引擎配置、启动/停止引擎进程，
//! 以及通过管理端口拉取流量。

pub mod api;
pub mod process;
pub mod supervisor;
pub mod synth;
pub mod template;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use api::{GrpcStatsConnector, StatsClient, StatsConnector};
pub use process::{EngineLauncher, EngineProcess, XrayLauncher};
pub use supervisor::{EngineState, Supervisor};
pub use synth::ConfigSynthesizer;

/// Tag of the management inbound in the engine config.
pub const API_TAG: &str = "api";

/// Engine-ready configuration.
///
/// Sections this crate does not touch stay opaque JSON. Equality is
/// structural, so two configs built from the same data compare equal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub log: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub routing: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub dns: Value,
    #[serde(default)]
    pub inbounds: Vec<InboundConfig>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub outbounds: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub transport: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub policy: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub api: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub stats: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub reverse: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub fakedns: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub observatory: Value,
    #[serde(
        rename = "burstObservatory",
        default,
        skip_serializing_if = "Value::is_null"
    )]
    pub burst_observatory: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metrics: Value,
    /// 其余顶层字段原样保留
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One inbound entry of [`EngineConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen: Option<String>,
    pub port: u16,
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub settings: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub stream_settings: Value,
    #[serde(default)]
    pub tag: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub sniffing: Value,
}

impl EngineConfig {
    /// Port of the management inbound, if the config declares one.
    pub fn api_port(&self) -> Option<u16> {
        self.inbounds
            .iter()
            .find(|ib| ib.tag == API_TAG)
            .map(|ib| ib.port)
    }

    /// Append a rule routing `domains` to the `blocked` outbound.
    ///
    /// Existing rules are kept; the new rule goes last.
    pub fn append_block_rule(&mut self, domains: &[String]) {
        if !self.routing.is_object() {
            self.routing = Value::Object(Default::default());
        }
        let Some(routing) = self.routing.as_object_mut() else {
            return;
        };
        let rules = routing
            .entry("rules")
            .or_insert_with(|| Value::Array(Vec::new()));
        if !rules.is_array() {
            *rules = Value::Array(Vec::new());
        }
        if let Value::Array(list) = rules {
            list.push(serde_json::json!({
                "type": "field",
                "outboundTag": "blocked",
                "domain": domains,
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_template_parses() {
        let config: EngineConfig = serde_json::from_str(template::DEFAULT_TEMPLATE).unwrap();
        assert_eq!(config.api_port(), Some(62789));
        assert_eq!(config.inbounds.len(), 1);
        assert!(config.reverse.is_null());
    }

    #[test]
    fn block_rule_is_appended() {
        let mut config: EngineConfig = serde_json::from_str(template::DEFAULT_TEMPLATE).unwrap();
        let before = config.routing["rules"].as_array().unwrap().len();
        config.append_block_rule(&["ads.example".to_string()]);
        let rules = config.routing["rules"].as_array().unwrap();
        assert_eq!(rules.len(), before + 1);
        assert_eq!(
            rules[before],
            json!({"type": "field", "outboundTag": "blocked", "domain": ["ads.example"]})
        );
    }

    #[test]
    fn block_rule_without_routing_section() {
        let mut config = EngineConfig::default();
        config.append_block_rule(&["x.com".to_string()]);
        assert_eq!(config.routing["rules"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn null_sections_are_not_serialized() {
        let config = EngineConfig::default();
        let text = serde_json::to_string(&config).unwrap();
        assert_eq!(text, r#"{"inbounds":[]}"#);
    }

    #[test]
    fn unknown_sections_round_trip() {
        let raw = json!({
            "metrics": {"tag": "metrics_out"},
            "inbounds": [],
            "custom": [1, 2]
        });
        let config: EngineConfig = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(config.metrics["tag"], "metrics_out");
        assert_eq!(config.extra["custom"], json!([1, 2]));
        assert_eq!(serde_json::to_value(&config).unwrap(), raw);
    }
}
