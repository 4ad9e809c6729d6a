//! streamSettings 的类型化视图
//!
//! 原始 JSON 保留在 [`StreamSettings`] 中（引擎配置需要原样透传），
//! 链接生成需要的字段通过访问器按网络类型提取。

use std::fmt;

use serde_json::{Map, Value};

use crate::common::json::{search_host, search_key, string_list, ValueExt};
use crate::common::{PanelError, Result};

/// Transport network kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Network {
    Tcp,
    Kcp,
    Ws,
    Grpc,
    HttpUpgrade,
    Xhttp,
    Other(String),
}

impl Network {
    pub fn parse(s: &str) -> Self {
        match s {
            "tcp" | "raw" => Network::Tcp,
            "kcp" => Network::Kcp,
            "ws" => Network::Ws,
            "grpc" => Network::Grpc,
            "httpupgrade" => Network::HttpUpgrade,
            "xhttp" => Network::Xhttp,
            other => Network::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Network::Tcp => "tcp",
            Network::Kcp => "kcp",
            Network::Ws => "ws",
            Network::Grpc => "grpc",
            Network::HttpUpgrade => "httpupgrade",
            Network::Xhttp => "xhttp",
            Network::Other(s) => s,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Network-layer parameters shared by every link format.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transport {
    pub header_type: Option<String>,
    pub path: Option<String>,
    pub host: Option<String>,
    pub seed: Option<String>,
    pub service_name: Option<String>,
    pub authority: Option<String>,
    pub multi_mode: bool,
    pub mode: Option<String>,
}

/// TLS parameters visible to clients.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TlsParams {
    pub alpn: Vec<String>,
    pub server_name: Option<String>,
    pub fingerprint: Option<String>,
    pub allow_insecure: Option<bool>,
}

/// Reality parameters; the per-link choice among lists is made by the encoder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RealityParams {
    pub server_names: Vec<String>,
    pub public_key: Option<String>,
    pub short_ids: Vec<String>,
    pub fingerprint: Option<String>,
}

/// Resolved security layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Security {
    None,
    Tls(TlsParams),
    Reality(RealityParams),
}

impl Security {
    pub fn as_str(&self) -> &'static str {
        match self {
            Security::None => "none",
            Security::Tls(_) => "tls",
            Security::Reality(_) => "reality",
        }
    }
}

/// Security override carried by an external proxy entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForceSecurity {
    /// Keep the inbound's own security.
    Same,
    /// Plain link; TLS-only parameters are dropped.
    None,
    /// Any other literal, used verbatim.
    Literal(String),
}

impl ForceSecurity {
    pub fn parse(s: &str) -> Self {
        match s {
            "same" => ForceSecurity::Same,
            "none" => ForceSecurity::None,
            other => ForceSecurity::Literal(other.to_string()),
        }
    }

    /// Security label for the link given the inbound's computed one.
    pub fn resolve<'a>(&'a self, computed: &'a str) -> &'a str {
        match self {
            ForceSecurity::Same => computed,
            ForceSecurity::None => "none",
            ForceSecurity::Literal(s) => s,
        }
    }
}

/// Alternate egress a client is fanned out to.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalProxy {
    pub force_security: ForceSecurity,
    pub dest: String,
    pub port: u16,
    pub remark: String,
}

/// Decoded streamSettings blob.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSettings {
    raw: Value,
}

impl StreamSettings {
    pub fn parse(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::from_value(Value::Object(Map::new())));
        }
        let raw = serde_json::from_str(text)
            .map_err(|e| PanelError::malformed("stream settings", e))?;
        Ok(Self::from_value(raw))
    }

    pub fn from_value(raw: Value) -> Self {
        Self { raw }
    }

    pub fn as_value(&self) -> &Value {
        &self.raw
    }

    pub fn into_value(self) -> Value {
        self.raw
    }

    pub fn network(&self) -> Network {
        Network::parse(self.raw.str_at("network").unwrap_or("tcp"))
    }

    fn section(&self, key: &str) -> &Value {
        self.raw.get(key).unwrap_or(&Value::Null)
    }

    /// Per-network transport parameters.
    pub fn transport(&self) -> Transport {
        let mut t = Transport::default();
        match self.network() {
            Network::Tcp => {
                let header = self.section("tcpSettings").get("header").unwrap_or(&Value::Null);
                t.header_type = header.non_empty_str_at("type").map(str::to_string);
                if t.header_type.as_deref() == Some("http") {
                    let request = header.get("request").unwrap_or(&Value::Null);
                    t.path = request
                        .array_at("path")
                        .and_then(|p| p.first())
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    t.host = Some(search_host(request.get("headers")));
                }
            }
            Network::Kcp => {
                let kcp = self.section("kcpSettings");
                t.header_type = kcp
                    .get("header")
                    .and_then(|h| h.non_empty_str_at("type"))
                    .map(str::to_string);
                t.seed = kcp.non_empty_str_at("seed").map(str::to_string);
            }
            Network::Ws => {
                Self::path_and_host(self.section("wsSettings"), &mut t);
            }
            Network::HttpUpgrade => {
                Self::path_and_host(self.section("httpupgradeSettings"), &mut t);
            }
            Network::Xhttp => {
                let xhttp = self.section("xhttpSettings");
                Self::path_and_host(xhttp, &mut t);
                t.mode = xhttp.non_empty_str_at("mode").map(str::to_string);
            }
            Network::Grpc => {
                let grpc = self.section("grpcSettings");
                t.service_name = grpc.str_at("serviceName").map(str::to_string);
                t.authority = grpc.non_empty_str_at("authority").map(str::to_string);
                t.multi_mode = grpc.bool_at("multiMode").unwrap_or(false);
            }
            Network::Other(_) => {}
        }
        t
    }

    fn path_and_host(section: &Value, t: &mut Transport) {
        t.path = section.str_at("path").map(str::to_string);
        t.host = Some(match section.non_empty_str_at("host") {
            Some(host) => host.to_string(),
            None => search_host(section.get("headers")),
        });
    }

    /// Security layer. Unknown labels degrade to [`Security::None`].
    pub fn security(&self) -> Security {
        match self.raw.str_at("security").unwrap_or("none") {
            "tls" => {
                let tls = self.section("tlsSettings");
                let inner = search_key(tls, "settings").unwrap_or(&Value::Null);
                Security::Tls(TlsParams {
                    alpn: string_list(tls.get("alpn")),
                    server_name: search_key(tls, "serverName")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    fingerprint: search_key(inner, "fingerprint")
                        .and_then(Value::as_str)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string),
                    allow_insecure: search_key(inner, "allowInsecure").and_then(Value::as_bool),
                })
            }
            "reality" => {
                let reality = self.section("realitySettings");
                let inner = search_key(reality, "settings").unwrap_or(&Value::Null);
                Security::Reality(RealityParams {
                    server_names: string_list(search_key(reality, "serverNames")),
                    public_key: search_key(inner, "publicKey")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    short_ids: string_list(search_key(reality, "shortIds")),
                    fingerprint: search_key(inner, "fingerprint")
                        .and_then(Value::as_str)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string),
                })
            }
            _ => Security::None,
        }
    }

    /// External proxy fallbacks; malformed entries are skipped.
    pub fn external_proxies(&self) -> Vec<ExternalProxy> {
        let Some(list) = self.raw.array_at("externalProxy") else {
            return Vec::new();
        };
        list.iter()
            .filter_map(|ep| {
                Some(ExternalProxy {
                    force_security: ForceSecurity::parse(ep.str_at("forceTls").unwrap_or("same")),
                    dest: ep.non_empty_str_at("dest")?.to_string(),
                    port: ep.port_at("port")?,
                    remark: ep.str_at("remark").unwrap_or_default().to_string(),
                })
            })
            .collect()
    }

    /// Copy the listener-facing fields of a fallback master onto this stream.
    pub fn overlay_master(&mut self, master: &StreamSettings) {
        if !self.raw.is_object() {
            self.raw = Value::Object(Map::new());
        }
        let Some(own) = self.raw.as_object_mut() else {
            return;
        };
        for key in ["security", "tlsSettings", "externalProxy"] {
            match master.raw.get(key) {
                Some(v) => {
                    own.insert(key.to_string(), v.clone());
                }
                None => {
                    own.remove(key);
                }
            }
        }
    }

    /// Copy suitable for the engine: management-only keys removed.
    ///
    /// The inner `settings` object of whichever of tlsSettings/realitySettings
    /// is present is dropped, as is the external proxy list.
    pub fn for_engine(&self) -> Value {
        let mut stream = self.raw.clone();
        if let Some(obj) = stream.as_object_mut() {
            let tls_present = obj.get("tlsSettings").is_some_and(Value::is_object);
            let section = if tls_present {
                "tlsSettings"
            } else {
                "realitySettings"
            };
            if let Some(Value::Object(sec)) = obj.get_mut(section) {
                sec.remove("settings");
            }
            obj.remove("externalProxy");
        }
        stream
    }
}
