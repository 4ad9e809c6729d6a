//! 入站 / 客户端 / 流量统计数据模型
//!
//! 与存储层中的行结构一一对应。`settings`、`stream_settings`、`sniffing`
//! 保持为原始 JSON 文本，由使用方按需解析。

pub mod stream;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::json::ValueExt;
use crate::common::{PanelError, Result};

pub use stream::{ExternalProxy, ForceSecurity, Network, Security, StreamSettings, Transport};

/// Marker prefix of a listen address that inherits a fallback master's listener.
pub const FALLBACK_ALIAS_MARKER: char = '@';

/// Inbound protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Vmess,
    Vless,
    Trojan,
    Shadowsocks,
    #[serde(rename = "dokodemo-door")]
    DokodemoDoor,
    Socks,
    Mixed,
    Http,
    Wireguard,
}

impl Protocol {
    /// Protocols that produce subscription links.
    pub const SUBSCRIBABLE: [Protocol; 4] = [
        Protocol::Vmess,
        Protocol::Vless,
        Protocol::Trojan,
        Protocol::Shadowsocks,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Vmess => "vmess",
            Protocol::Vless => "vless",
            Protocol::Trojan => "trojan",
            Protocol::Shadowsocks => "shadowsocks",
            Protocol::DokodemoDoor => "dokodemo-door",
            Protocol::Socks => "socks",
            Protocol::Mixed => "mixed",
            Protocol::Http => "http",
            Protocol::Wireguard => "wireguard",
        }
    }

    pub fn is_subscribable(self) -> bool {
        match self {
            Protocol::Vmess | Protocol::Vless | Protocol::Trojan | Protocol::Shadowsocks => true,
            Protocol::DokodemoDoor
            | Protocol::Socks
            | Protocol::Mixed
            | Protocol::Http
            | Protocol::Wireguard => false,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-client traffic record, keyed by (inbound, email).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientTraffic {
    pub id: i64,
    pub inbound_id: i64,
    /// false once the client exceeded its cap or expired.
    pub enable: bool,
    pub email: String,
    pub up: i64,
    pub down: i64,
    /// Unix milliseconds; 0 = never, negative = relative duration not yet started.
    pub expiry_time: i64,
    /// Byte cap; 0 = unlimited.
    pub total: i64,
}

impl ClientTraffic {
    pub fn used(&self) -> i64 {
        self.up + self.down
    }

    /// Bytes left before the cap. `None` when unlimited.
    pub fn remaining(&self) -> Option<i64> {
        (self.total > 0).then(|| self.total - self.used())
    }
}

/// Aggregate traffic delta reported by the engine for one inbound or outbound.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Traffic {
    pub is_inbound: bool,
    pub is_outbound: bool,
    pub tag: String,
    pub up: i64,
    pub down: i64,
}

/// Per-client traffic delta reported by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientTrafficDelta {
    pub email: String,
    pub up: i64,
    pub down: i64,
}

/// One credentialed user inside an inbound's settings blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub flow: String,
    #[serde(default)]
    pub security: String,
    #[serde(default)]
    pub method: String,
    #[serde(default = "default_enable")]
    pub enable: bool,
    #[serde(default)]
    pub sub_id: String,
}

fn default_enable() -> bool {
    true
}

impl Default for Client {
    fn default() -> Self {
        Self {
            id: String::new(),
            password: String::new(),
            email: String::new(),
            flow: String::new(),
            security: String::new(),
            method: String::new(),
            enable: true,
            sub_id: String::new(),
        }
    }
}

/// A proxy listener as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inbound {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub up: i64,
    #[serde(default)]
    pub down: i64,
    #[serde(default)]
    pub remark: String,
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub listen: String,
    pub port: u16,
    pub protocol: Protocol,
    #[serde(default)]
    pub settings: String,
    #[serde(default)]
    pub stream_settings: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub sniffing: String,
    #[serde(default)]
    pub client_stats: Vec<ClientTraffic>,
}

impl Inbound {
    pub fn new(protocol: Protocol, port: u16) -> Self {
        Self {
            id: 0,
            up: 0,
            down: 0,
            remark: String::new(),
            enable: true,
            listen: String::new(),
            port,
            protocol,
            settings: String::new(),
            stream_settings: String::new(),
            tag: format!("inbound-{}", port),
            sniffing: String::new(),
            client_stats: Vec::new(),
        }
    }

    /// Parsed settings blob; an empty blob reads as an empty object.
    pub fn settings_value(&self) -> Result<Value> {
        parse_blob(&self.settings)
            .map_err(|e| PanelError::malformed(&format!("inbound {} settings", self.tag), e))
    }

    /// Parsed stream settings blob; an empty blob reads as an empty object.
    pub fn stream_value(&self) -> Result<Value> {
        parse_blob(&self.stream_settings)
            .map_err(|e| PanelError::malformed(&format!("inbound {} stream settings", self.tag), e))
    }

    /// Clients listed in the settings blob; none when the blob has no list.
    pub fn clients(&self) -> Result<Vec<Client>> {
        let settings = self.settings_value()?;
        let Some(list) = settings.get("clients") else {
            return Ok(Vec::new());
        };
        serde_json::from_value(list.clone())
            .map_err(|e| PanelError::malformed(&format!("inbound {} clients", self.tag), e))
    }

    pub fn client_traffic(&self, email: &str) -> Option<&ClientTraffic> {
        self.client_stats.iter().find(|s| s.email == email)
    }

    /// Listen address is an alias resolved through a fallback master.
    pub fn is_fallback_alias(&self) -> bool {
        self.listen.starts_with(FALLBACK_ALIAS_MARKER)
    }

    /// Whether the settings blob has a fallback entry whose `dest` equals `dest`.
    pub fn has_fallback_dest(&self, dest: &str) -> bool {
        let Ok(settings) = self.settings_value() else {
            return false;
        };
        settings
            .array_at("fallbacks")
            .map(|fallbacks| {
                fallbacks.iter().any(|f| match f.get("dest") {
                    Some(Value::String(s)) => s == dest,
                    Some(Value::Number(n)) => n.to_string() == dest,
                    _ => false,
                })
            })
            .unwrap_or(false)
    }
}

fn parse_blob(text: &str) -> std::result::Result<Value, serde_json::Error> {
    if text.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(text)
}
