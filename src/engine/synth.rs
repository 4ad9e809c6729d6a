//! 引擎配置合成
//!
//! 模板 + 屏蔽域名规则 + 每个启用入站的净化副本。存储中的入站记录
//! 从不被修改，所有裁剪都在派生副本上进行。

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::common::{PanelError, Result};
use crate::model::{Inbound, StreamSettings};
use crate::store::InboundStore;

use super::{EngineConfig, InboundConfig};

/// Client fields the engine understands; everything else is panel metadata.
const ENGINE_CLIENT_KEYS: [&str; 5] = ["email", "id", "password", "flow", "method"];

const VISION_UDP443_FLOW: &str = "xtls-rprx-vision-udp443";
const VISION_FLOW: &str = "xtls-rprx-vision";

/// Builds [`EngineConfig`] from the store.
#[derive(Clone)]
pub struct ConfigSynthesizer {
    store: Arc<dyn InboundStore>,
}

impl ConfigSynthesizer {
    pub fn new(store: Arc<dyn InboundStore>) -> Self {
        Self { store }
    }

    /// Fresh engine config. Fails only when the template or some stored
    /// settings blob is not valid JSON.
    pub async fn build(&self) -> Result<EngineConfig> {
        let template = self.store.engine_template().await?;
        let mut config: EngineConfig = serde_json::from_str(&template)
            .map_err(|e| PanelError::malformed("engine template", e))?;

        let blocked = self.store.list_blocked_domains().await?;
        if !blocked.is_empty() {
            config.append_block_rule(&blocked);
        }

        // 先让存储重新判定到期/超额，保证下面读到的 client_stats 是最新的
        if let Err(e) = self.store.add_traffic(&[], &[]).await {
            warn!(error = %e, "traffic re-evaluation failed");
        }

        for inbound in self.store.list_enabled_inbounds().await? {
            config.inbounds.push(engine_inbound(&inbound)?);
        }
        Ok(config)
    }
}

/// Engine entry for one stored inbound.
pub fn engine_inbound(inbound: &Inbound) -> Result<InboundConfig> {
    let mut settings = inbound.settings_value()?;
    if let Some(Value::Array(clients)) = settings.get_mut("clients") {
        let list = std::mem::take(clients);
        *clients = sanitize_clients(inbound, list);
    }

    let stream_settings = if inbound.stream_settings.trim().is_empty() {
        Value::Null
    } else {
        StreamSettings::parse(&inbound.stream_settings)?.for_engine()
    };

    let sniffing = if inbound.sniffing.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&inbound.sniffing)
            .map_err(|e| PanelError::malformed(&format!("inbound {} sniffing", inbound.tag), e))?
    };

    Ok(InboundConfig {
        listen: (!inbound.listen.is_empty()).then(|| inbound.listen.clone()),
        port: inbound.port,
        protocol: inbound.protocol.as_str().to_string(),
        settings,
        stream_settings,
        tag: inbound.tag.clone(),
        sniffing,
    })
}

/// Drop blocked and disabled clients, then strip panel-only fields.
fn sanitize_clients(inbound: &Inbound, mut clients: Vec<Value>) -> Vec<Value> {
    let blocked: HashSet<&str> = inbound
        .client_stats
        .iter()
        .filter(|s| !s.enable)
        .map(|s| s.email.as_str())
        .collect();

    clients.retain(|client| {
        let email = client.get("email").and_then(Value::as_str).unwrap_or_default();
        if blocked.contains(email) {
            info!(
                tag = inbound.tag,
                email, "remove inbound user due to expiration or traffic limit"
            );
            return false;
        }
        !matches!(client.get("enable"), Some(Value::Bool(false)))
    });

    clients
        .into_iter()
        .filter_map(|client| match client {
            Value::Object(obj) => Some(Value::Object(engine_client(obj))),
            _ => None,
        })
        .collect()
}

fn engine_client(mut obj: Map<String, Value>) -> Map<String, Value> {
    obj.retain(|key, _| ENGINE_CLIENT_KEYS.contains(&key.as_str()));
    if obj.get("flow").and_then(Value::as_str) == Some(VISION_UDP443_FLOW) {
        obj.insert("flow".to_string(), VISION_FLOW.into());
    }
    obj
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClientTraffic, Protocol};
    use crate::store::{JsonStore, StoreSnapshot};
    use serde_json::json;

    fn stat(email: &str, enable: bool) -> ClientTraffic {
        ClientTraffic {
            email: email.to_string(),
            enable,
            ..Default::default()
        }
    }

    fn vless() -> Inbound {
        let mut ib = Inbound::new(Protocol::Vless, 443);
        ib.settings = json!({
            "clients": [
                {"id": "1", "email": "a", "flow": "xtls-rprx-vision-udp443", "subId": "s", "totalGB": 0, "enable": true},
                {"id": "2", "email": "b"},
                {"id": "3", "email": "c"},
                {"id": "4", "email": "d", "enable": false},
                {"id": "5", "email": "e", "password": "p", "method": "m", "tgId": 7}
            ],
            "decryption": "none"
        })
        .to_string();
        ib.stream_settings = json!({
            "network": "tcp",
            "security": "reality",
            "realitySettings": {"dest": "x.com:443", "settings": {"publicKey": "K"}},
            "externalProxy": [{"dest": "cdn.com", "port": 443}]
        })
        .to_string();
        ib.sniffing = json!({"enabled": true}).to_string();
        ib.client_stats = vec![stat("a", true), stat("b", false), stat("c", false)];
        ib
    }

    #[test]
    fn adjacent_blocked_clients_both_removed() {
        let entry = engine_inbound(&vless()).unwrap();
        let emails: Vec<&str> = entry.settings["clients"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["email"].as_str().unwrap())
            .collect();
        assert_eq!(emails, ["a", "e"]);
    }

    #[test]
    fn clients_stripped_and_flow_normalized() {
        let entry = engine_inbound(&vless()).unwrap();
        let clients = entry.settings["clients"].as_array().unwrap();
        assert_eq!(clients[0], json!({"id": "1", "email": "a", "flow": "xtls-rprx-vision"}));
        assert_eq!(
            clients[1],
            json!({"id": "5", "email": "e", "password": "p", "method": "m"})
        );
        assert_eq!(entry.settings["decryption"], "none");
    }

    #[test]
    fn stream_normalized_for_engine() {
        let entry = engine_inbound(&vless()).unwrap();
        assert!(entry.stream_settings.get("externalProxy").is_none());
        assert_eq!(
            entry.stream_settings["realitySettings"],
            json!({"dest": "x.com:443"})
        );
        assert_eq!(entry.sniffing, json!({"enabled": true}));
        assert_eq!(entry.listen, None);
        assert_eq!(entry.tag, "inbound-443");
        assert_eq!(entry.protocol, "vless");
    }

    #[test]
    fn source_record_untouched() {
        let ib = vless();
        let before = ib.settings.clone();
        engine_inbound(&ib).unwrap();
        assert_eq!(ib.settings, before);
    }

    #[test]
    fn malformed_settings_are_fatal() {
        let mut ib = vless();
        ib.settings = "{".to_string();
        assert!(engine_inbound(&ib).is_err());
    }

    #[tokio::test]
    async fn build_is_idempotent_and_injects_block_rule() {
        let mut disabled = vless();
        disabled.port = 8443;
        disabled.tag = "off".to_string();
        disabled.enable = false;
        let store = Arc::new(JsonStore::new(StoreSnapshot {
            inbounds: vec![vless(), disabled],
            blocked_domains: vec!["ads.example".to_string()],
            engine_template: None,
        }));
        let synth = ConfigSynthesizer::new(store);
        let first = synth.build().await.unwrap();
        let second = synth.build().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.inbounds.len(), 2);
        assert_eq!(first.inbounds[1].tag, "inbound-443");
        let rules = first.routing["rules"].as_array().unwrap();
        assert_eq!(rules.last().unwrap()["domain"], json!(["ads.example"]));
    }

    #[tokio::test]
    async fn bad_template_is_malformed_config() {
        let store = Arc::new(JsonStore::new(StoreSnapshot {
            engine_template: Some("not json".to_string()),
            ..Default::default()
        }));
        let err = ConfigSynthesizer::new(store).build().await.unwrap_err();
        assert_eq!(err.kind(), crate::common::PanelErrorKind::MalformedConfig);
    }

    #[tokio::test]
    async fn template_sections_survive_build() {
        let template = json!({
            "metrics": {"tag": "metrics_out"},
            "routing": {"rules": []},
            "outbounds": [],
            "xrayExperimental": {"flag": true}
        });
        let store = Arc::new(JsonStore::new(StoreSnapshot {
            engine_template: Some(template.to_string()),
            ..Default::default()
        }));
        let config = ConfigSynthesizer::new(store).build().await.unwrap();
        let out = serde_json::to_value(&config).unwrap();
        assert_eq!(out["metrics"], json!({"tag": "metrics_out"}));
        assert_eq!(out["xrayExperimental"], json!({"flag": true}));
    }
}
