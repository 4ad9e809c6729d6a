//! 分享链接生成：vmess / vless / trojan / shadowsocks
//!
//! 四种协议共用同一张传输参数表，vmess 编码为 base64(JSON)，其余三种编码为
//! URL 查询参数。字段缺失时尽量生成可用链接而不是报错。

use std::collections::BTreeMap;

use base64::Engine as _;
use serde_json::{Map, Value};
use tracing::warn;
use url::Url;

use crate::common::json::ValueExt;
use crate::common::random::{choose, RandomSource};
use crate::model::stream::{RealityParams, TlsParams};
use crate::model::{
    Client, ForceSecurity, Inbound, Network, Protocol, Security, StreamSettings, Transport,
};

use super::remark::RemarkFormatter;

/// Parameters removed from a link whose egress forces plain transport.
const TLS_ONLY_KEYS: [&str; 4] = ["alpn", "sni", "fp", "allowInsecure"];

const SPIDER_PATH_LEN: usize = 15;

/// One destination a link points at.
struct Egress {
    host: String,
    port: u16,
    force: ForceSecurity,
    extra_remark: String,
}

/// Per-request link encoder.
pub struct LinkEncoder<'a> {
    address: &'a str,
    remark: &'a RemarkFormatter,
    random: &'a dyn RandomSource,
    now: i64,
}

impl<'a> LinkEncoder<'a> {
    /// `address` is the host clients reach the panel's listeners at; `now` is
    /// Unix seconds used for expiry countdowns.
    pub fn new(
        address: &'a str,
        remark: &'a RemarkFormatter,
        random: &'a dyn RandomSource,
        now: i64,
    ) -> Self {
        Self {
            address,
            remark,
            random,
            now,
        }
    }

    /// Links for `client`, dispatched on the inbound's protocol.
    pub fn encode(&self, inbound: &Inbound, client: &Client, stream: &StreamSettings) -> Vec<String> {
        match inbound.protocol {
            Protocol::Vmess => self.vmess(inbound, client, stream),
            Protocol::Vless => self.vless(inbound, client, stream),
            Protocol::Trojan => self.trojan(inbound, client, stream),
            Protocol::Shadowsocks => self.shadowsocks(inbound, client, stream),
            Protocol::DokodemoDoor
            | Protocol::Socks
            | Protocol::Mixed
            | Protocol::Http
            | Protocol::Wireguard => Vec::new(),
        }
    }

    pub fn vmess(&self, inbound: &Inbound, client: &Client, stream: &StreamSettings) -> Vec<String> {
        if inbound.protocol != Protocol::Vmess {
            return Vec::new();
        }
        let network = stream.network();
        let security = stream.security();

        let mut obj = Map::new();
        obj.insert("v".into(), "2".into());
        obj.insert("net".into(), network.as_str().into());
        obj.insert("type".into(), "none".into());
        vmess_transport(&network, &stream.transport(), &mut obj);
        obj.insert("tls".into(), security.as_str().into());
        for (k, v) in self.security_fields(&security) {
            obj.insert(k.into(), v);
        }
        obj.insert("id".into(), client.id.clone().into());
        obj.insert("scy".into(), client.security.clone().into());
        if let Some(flow) = flow_for(&network, &security, client) {
            obj.insert("flow".into(), flow.into());
        }

        let egresses = self.egresses(inbound, stream);
        egresses
            .iter()
            .map(|egress| {
                let mut entry = obj.clone();
                if egress.force == ForceSecurity::None {
                    for key in TLS_ONLY_KEYS {
                        entry.remove(key);
                    }
                }
                if egress.force != ForceSecurity::Same {
                    entry.insert(
                        "tls".into(),
                        egress.force.resolve(security.as_str()).into(),
                    );
                }
                entry.insert("add".into(), egress.host.clone().into());
                entry.insert("port".into(), egress.port.into());
                entry.insert(
                    "ps".into(),
                    self.remark
                        .format(inbound, &client.email, &egress.extra_remark, self.now)
                        .into(),
                );
                let json = serde_json::to_string_pretty(&Value::Object(entry)).unwrap_or_default();
                format!(
                    "vmess://{}",
                    base64::engine::general_purpose::STANDARD.encode(json)
                )
            })
            .collect()
    }

    pub fn vless(&self, inbound: &Inbound, client: &Client, stream: &StreamSettings) -> Vec<String> {
        if inbound.protocol != Protocol::Vless {
            return Vec::new();
        }
        self.query_links("vless", &client.id, inbound, client, stream)
    }

    pub fn trojan(&self, inbound: &Inbound, client: &Client, stream: &StreamSettings) -> Vec<String> {
        if inbound.protocol != Protocol::Trojan {
            return Vec::new();
        }
        self.query_links("trojan", &client.password, inbound, client, stream)
    }

    pub fn shadowsocks(
        &self,
        inbound: &Inbound,
        client: &Client,
        stream: &StreamSettings,
    ) -> Vec<String> {
        if inbound.protocol != Protocol::Shadowsocks {
            return Vec::new();
        }
        let settings = match inbound.settings_value() {
            Ok(v) => v,
            Err(e) => {
                warn!(tag = inbound.tag, error = %e, "shadowsocks settings unreadable");
                Value::Null
            }
        };
        let method = settings
            .non_empty_str_at("method")
            .unwrap_or(client.method.as_str());
        let server_password = settings.str_at("password").unwrap_or_default();
        let secret = shadowsocks_secret(method, server_password, &client.password);
        let user_info = base64::engine::general_purpose::STANDARD.encode(secret);
        self.query_links("ss", &user_info, inbound, client, stream)
    }

    fn query_links(
        &self,
        scheme: &str,
        user_info: &str,
        inbound: &Inbound,
        client: &Client,
        stream: &StreamSettings,
    ) -> Vec<String> {
        let network = stream.network();
        let security = stream.security();

        let mut params: BTreeMap<&'static str, String> = BTreeMap::new();
        params.insert("type", network.as_str().to_string());
        query_transport(&network, &stream.transport(), &mut params);
        for (k, v) in self.security_fields(&security) {
            match v {
                Value::String(s) => {
                    params.insert(k, s);
                }
                Value::Bool(true) => {
                    params.insert(k, "1".to_string());
                }
                _ => {}
            }
        }
        if let Some(flow) = flow_for(&network, &security, client) {
            params.insert("flow", flow.to_string());
        }

        self.egresses(inbound, stream)
            .iter()
            .filter_map(|egress| {
                let mut query = params.clone();
                query.insert("security", egress.force.resolve(security.as_str()).to_string());
                if egress.force == ForceSecurity::None {
                    for key in TLS_ONLY_KEYS {
                        query.remove(key);
                    }
                }
                let remark = self
                    .remark
                    .format(inbound, &client.email, &egress.extra_remark, self.now);
                let link = build_url(scheme, user_info, &egress.host, egress.port, &query, &remark);
                if link.is_none() {
                    warn!(
                        scheme = scheme,
                        host = %egress.host,
                        email = client.email,
                        "unable to build link"
                    );
                }
                link
            })
            .collect()
    }

    /// External proxies when configured, otherwise the panel address itself.
    fn egresses(&self, inbound: &Inbound, stream: &StreamSettings) -> Vec<Egress> {
        let proxies = stream.external_proxies();
        if proxies.is_empty() {
            return vec![Egress {
                host: self.address.to_string(),
                port: inbound.port,
                force: ForceSecurity::Same,
                extra_remark: String::new(),
            }];
        }
        proxies
            .into_iter()
            .map(|ep| Egress {
                host: ep.dest,
                port: ep.port,
                force: ep.force_security,
                extra_remark: ep.remark,
            })
            .collect()
    }

    /// Security-layer fields shared by all formats.
    fn security_fields(&self, security: &Security) -> Vec<(&'static str, Value)> {
        match security {
            Security::None => Vec::new(),
            Security::Tls(tls) => tls_fields(tls),
            Security::Reality(reality) => self.reality_fields(reality),
        }
    }

    fn reality_fields(&self, reality: &RealityParams) -> Vec<(&'static str, Value)> {
        let mut fields = Vec::new();
        if let Some(sni) = choose(self.random, &reality.server_names) {
            fields.push(("sni", Value::from(sni.as_str())));
        }
        if let Some(pbk) = &reality.public_key {
            fields.push(("pbk", Value::from(pbk.as_str())));
        }
        if let Some(sid) = choose(self.random, &reality.short_ids) {
            fields.push(("sid", Value::from(sid.as_str())));
        }
        if let Some(fp) = &reality.fingerprint {
            fields.push(("fp", Value::from(fp.as_str())));
        }
        fields.push((
            "spx",
            Value::from(format!("/{}", self.random.seq(SPIDER_PATH_LEN))),
        ));
        fields
    }
}

fn tls_fields(tls: &TlsParams) -> Vec<(&'static str, Value)> {
    let mut fields = Vec::new();
    if !tls.alpn.is_empty() {
        fields.push(("alpn", Value::from(tls.alpn.join(","))));
    }
    if let Some(sni) = &tls.server_name {
        fields.push(("sni", Value::from(sni.as_str())));
    }
    if let Some(fp) = &tls.fingerprint {
        fields.push(("fp", Value::from(fp.as_str())));
    }
    if let Some(insecure) = tls.allow_insecure {
        fields.push(("allowInsecure", Value::from(insecure)));
    }
    fields
}

/// Flow applies to raw TCP under TLS or Reality only.
fn flow_for<'c>(network: &Network, security: &Security, client: &'c Client) -> Option<&'c str> {
    let secured = matches!(security, Security::Tls(_) | Security::Reality(_));
    (*network == Network::Tcp && secured && !client.flow.is_empty()).then_some(client.flow.as_str())
}

/// AEAD-2022 methods (`2022-...`) carry the server key before the user key.
pub fn shadowsocks_secret(method: &str, server_password: &str, client_password: &str) -> String {
    if method.starts_with('2') {
        format!("{}:{}:{}", method, server_password, client_password)
    } else {
        format!("{}:{}", method, client_password)
    }
}

fn put_json(obj: &mut Map<String, Value>, key: &str, value: &Option<String>) {
    if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
        obj.insert(key.to_string(), v.into());
    }
}

fn put_query(params: &mut BTreeMap<&'static str, String>, key: &'static str, value: &Option<String>) {
    if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
        params.insert(key, v.to_string());
    }
}

fn vmess_transport(network: &Network, t: &Transport, obj: &mut Map<String, Value>) {
    match network {
        Network::Tcp => {
            put_json(obj, "type", &t.header_type);
            if t.header_type.as_deref() == Some("http") {
                put_json(obj, "path", &t.path);
                put_json(obj, "host", &t.host);
            }
        }
        Network::Kcp => {
            put_json(obj, "type", &t.header_type);
            put_json(obj, "path", &t.seed);
        }
        Network::Ws | Network::HttpUpgrade => {
            put_json(obj, "path", &t.path);
            put_json(obj, "host", &t.host);
        }
        Network::Xhttp => {
            put_json(obj, "path", &t.path);
            put_json(obj, "host", &t.host);
            put_json(obj, "mode", &t.mode);
        }
        Network::Grpc => {
            put_json(obj, "path", &t.service_name);
            put_json(obj, "authority", &t.authority);
            if t.multi_mode {
                obj.insert("type".into(), "multi".into());
            }
        }
        Network::Other(_) => {}
    }
}

fn query_transport(network: &Network, t: &Transport, params: &mut BTreeMap<&'static str, String>) {
    match network {
        Network::Tcp => {
            if t.header_type.as_deref() == Some("http") {
                put_query(params, "path", &t.path);
                put_query(params, "host", &t.host);
                put_query(params, "headerType", &t.header_type);
            }
        }
        Network::Kcp => {
            put_query(params, "headerType", &t.header_type);
            put_query(params, "seed", &t.seed);
        }
        Network::Ws | Network::HttpUpgrade => {
            put_query(params, "path", &t.path);
            put_query(params, "host", &t.host);
        }
        Network::Xhttp => {
            put_query(params, "path", &t.path);
            put_query(params, "host", &t.host);
            put_query(params, "mode", &t.mode);
        }
        Network::Grpc => {
            put_query(params, "serviceName", &t.service_name);
            put_query(params, "authority", &t.authority);
            if t.multi_mode {
                params.insert("mode", "multi".to_string());
            }
        }
        Network::Other(_) => {}
    }
}

fn build_url(
    scheme: &str,
    user_info: &str,
    host: &str,
    port: u16,
    query: &BTreeMap<&'static str, String>,
    fragment: &str,
) -> Option<String> {
    let host = if host.contains(':') && !host.starts_with('[') {
        format!("[{}]", host)
    } else {
        host.to_string()
    };
    let mut url = Url::parse(&format!("{}://{}:{}", scheme, host, port)).ok()?;
    url.set_username(user_info).ok()?;
    {
        let mut pairs = url.query_pairs_mut();
        for (k, v) in query {
            pairs.append_pair(k, v);
        }
    }
    if !fragment.is_empty() {
        url.set_fragment(Some(fragment));
    }
    Some(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::random::FixedRandom;
    use serde_json::json;
    use std::collections::HashMap;

    const NOW: i64 = 1_700_000_000;

    fn inbound(protocol: Protocol, settings: Value, stream: Value) -> Inbound {
        let mut inbound = Inbound::new(protocol, 443);
        inbound.remark = "node".to_string();
        inbound.settings = settings.to_string();
        inbound.stream_settings = stream.to_string();
        inbound
    }

    fn client(email: &str) -> Client {
        Client {
            id: "b831381d-6324-4d53-ad4f-8cda48b30811".to_string(),
            password: "pa$$word".to_string(),
            email: email.to_string(),
            flow: "xtls-rprx-vision".to_string(),
            ..Default::default()
        }
    }

    fn encode(inbound: &Inbound, client: &Client) -> Vec<String> {
        let remark = RemarkFormatter::new("-ie", false).unwrap();
        let random = FixedRandom::new(1, 'z');
        let encoder = LinkEncoder::new("panel.example.com", &remark, &random, NOW);
        let stream = StreamSettings::parse(&inbound.stream_settings).unwrap();
        encoder.encode(inbound, client, &stream)
    }

    fn query(link: &str) -> HashMap<String, String> {
        let url = Url::parse(link).unwrap();
        url.query_pairs().into_owned().collect()
    }

    fn percent_decode(s: &str) -> String {
        let bytes = s.as_bytes();
        let mut out = Vec::new();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'%' && i + 2 < bytes.len() {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap();
                out.push(u8::from_str_radix(hex, 16).unwrap());
                i += 3;
            } else {
                out.push(bytes[i]);
                i += 1;
            }
        }
        String::from_utf8(out).unwrap()
    }

    fn tls_stream() -> Value {
        json!({
            "network": "tcp",
            "security": "tls",
            "tlsSettings": {
                "serverName": "sni.example.com",
                "alpn": ["h2", "http/1.1"],
                "settings": {"fingerprint": "chrome", "allowInsecure": true}
            }
        })
    }

    #[test]
    fn wrong_protocol_yields_nothing() {
        let remark = RemarkFormatter::new("-e", false).unwrap();
        let random = FixedRandom::new(0, 'a');
        let encoder = LinkEncoder::new("h", &remark, &random, NOW);
        let c = client("a");
        let stream = StreamSettings::from_value(json!({"network": "tcp"}));
        let vless = inbound(Protocol::Vless, json!({}), json!({}));
        assert!(encoder.vmess(&vless, &c, &stream).is_empty());
        assert!(encoder.trojan(&vless, &c, &stream).is_empty());
        assert!(encoder.shadowsocks(&vless, &c, &stream).is_empty());
        let vmess = inbound(Protocol::Vmess, json!({}), json!({}));
        assert!(encoder.vless(&vmess, &c, &stream).is_empty());
        let socks = inbound(Protocol::Socks, json!({}), json!({}));
        assert!(encoder.encode(&socks, &c, &stream).is_empty());
    }

    #[test]
    fn vless_tls_link() {
        let ib = inbound(Protocol::Vless, json!({"clients": []}), tls_stream());
        let links = encode(&ib, &client("alice"));
        assert_eq!(links.len(), 1);
        let link = &links[0];
        assert!(link.starts_with("vless://b831381d-6324-4d53-ad4f-8cda48b30811@panel.example.com:443?"));
        assert!(link.ends_with("#node-alice"));
        let q = query(link);
        assert_eq!(q["type"], "tcp");
        assert_eq!(q["security"], "tls");
        assert_eq!(q["alpn"], "h2,http/1.1");
        assert_eq!(q["sni"], "sni.example.com");
        assert_eq!(q["fp"], "chrome");
        assert_eq!(q["allowInsecure"], "1");
        assert_eq!(q["flow"], "xtls-rprx-vision");
    }

    #[test]
    fn flow_requires_tcp_and_security() {
        let ws = json!({"network": "ws", "security": "tls", "wsSettings": {"path": "/ws"}, "tlsSettings": {}});
        let ib = inbound(Protocol::Vless, json!({}), ws);
        let q = query(&encode(&ib, &client("a"))[0]);
        assert!(!q.contains_key("flow"));
        assert_eq!(q["path"], "/ws");

        let plain = inbound(Protocol::Vless, json!({}), json!({"network": "tcp"}));
        let q = query(&encode(&plain, &client("a"))[0]);
        assert!(!q.contains_key("flow"));
        assert_eq!(q["security"], "none");
    }

    #[test]
    fn reality_params_use_random_source() {
        let stream = json!({
            "network": "tcp",
            "security": "reality",
            "realitySettings": {
                "serverNames": ["a.com", "b.com"],
                "shortIds": ["01", "02", "03"],
                "settings": {"publicKey": "PUBKEY", "fingerprint": "safari"}
            }
        });
        let ib = inbound(Protocol::Trojan, json!({}), stream);
        let link = &encode(&ib, &client("a"))[0];
        assert!(link.starts_with("trojan://pa$$word@panel.example.com:443?"));
        let q = query(link);
        assert_eq!(q["security"], "reality");
        assert_eq!(q["sni"], "b.com");
        assert_eq!(q["sid"], "02");
        assert_eq!(q["pbk"], "PUBKEY");
        assert_eq!(q["fp"], "safari");
        assert_eq!(q["spx"], format!("/{}", "z".repeat(15)));
        assert_eq!(q["flow"], "xtls-rprx-vision");
    }

    #[test]
    fn fan_out_forced_none_drops_tls_fields() {
        let mut stream = tls_stream();
        stream["externalProxy"] = json!([
            {"forceTls": "same", "dest": "a.example.com", "port": 443, "remark": "A"},
            {"forceTls": "none", "dest": "b.example.com", "port": 80, "remark": "B"},
            {"forceTls": "tls", "dest": "c.example.com", "port": 8443, "remark": ""}
        ]);
        let ib = inbound(Protocol::Vless, json!({}), stream);
        let links = encode(&ib, &client("alice"));
        assert_eq!(links.len(), 3);

        assert!(links[0].contains("@a.example.com:443?"));
        assert!(links[0].ends_with("#node-alice"));
        let q0 = query(&links[0]);
        assert_eq!(q0["security"], "tls");
        assert_eq!(q0["sni"], "sni.example.com");

        assert!(links[1].contains("@b.example.com:80?"));
        let q1 = query(&links[1]);
        assert_eq!(q1["security"], "none");
        for key in TLS_ONLY_KEYS {
            assert!(!q1.contains_key(key), "{} should be dropped", key);
        }

        let q2 = query(&links[2]);
        assert_eq!(q2["security"], "tls");
        assert_eq!(q2["alpn"], "h2,http/1.1");
        assert!(links[2].contains("@c.example.com:8443?"));
    }

    #[test]
    fn fan_out_uses_entry_remark_as_extra() {
        let mut stream = json!({"network": "tcp"});
        stream["externalProxy"] = json!([{"forceTls": "same", "dest": "a.com", "port": 1, "remark": "CDN"}]);
        let ib = inbound(Protocol::Vless, json!({}), stream);
        let remark = RemarkFormatter::new("-eo", false).unwrap();
        let random = FixedRandom::new(0, 'a');
        let encoder = LinkEncoder::new("unused", &remark, &random, NOW);
        let stream = StreamSettings::parse(&ib.stream_settings).unwrap();
        let links = encoder.encode(&ib, &client("alice"), &stream);
        assert!(links[0].ends_with("#alice-CDN"));
    }

    #[test]
    fn shadowsocks_secret_shapes() {
        assert_eq!(
            shadowsocks_secret("2022-blake3-aes-128-gcm", "server", "client"),
            "2022-blake3-aes-128-gcm:server:client"
        );
        assert_eq!(shadowsocks_secret("aes-256-gcm", "server", "client"), "aes-256-gcm:client");
    }

    #[test]
    fn shadowsocks_link_user_info() {
        let ib = inbound(
            Protocol::Shadowsocks,
            json!({"method": "2022-blake3-aes-128-gcm", "password": "srvkey", "clients": []}),
            json!({"network": "tcp"}),
        );
        let mut c = client("a");
        c.password = "usrkey".to_string();
        let link = &encode(&ib, &c)[0];
        let url = Url::parse(link).unwrap();
        assert_eq!(url.scheme(), "ss");
        assert_eq!(url.host_str(), Some("panel.example.com"));
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(percent_decode(url.username()))
            .unwrap();
        assert_eq!(
            String::from_utf8(decoded).unwrap(),
            "2022-blake3-aes-128-gcm:srvkey:usrkey"
        );
    }

    #[test]
    fn vmess_json_payload() {
        let stream = json!({
            "network": "grpc",
            "security": "tls",
            "grpcSettings": {"serviceName": "svc", "multiMode": true},
            "tlsSettings": {"serverName": "s.com"}
        });
        let ib = inbound(Protocol::Vmess, json!({}), stream);
        let mut c = client("alice");
        c.security = "auto".to_string();
        let links = encode(&ib, &c);
        assert_eq!(links.len(), 1);
        let payload = links[0].strip_prefix("vmess://").unwrap();
        let json = base64::engine::general_purpose::STANDARD.decode(payload).unwrap();
        let obj: Value = serde_json::from_slice(&json).unwrap();
        assert_eq!(obj["v"], "2");
        assert_eq!(obj["add"], "panel.example.com");
        assert_eq!(obj["port"], 443);
        assert_eq!(obj["net"], "grpc");
        assert_eq!(obj["path"], "svc");
        assert_eq!(obj["type"], "multi");
        assert_eq!(obj["tls"], "tls");
        assert_eq!(obj["sni"], "s.com");
        assert_eq!(obj["id"], "b831381d-6324-4d53-ad4f-8cda48b30811");
        assert_eq!(obj["scy"], "auto");
        assert_eq!(obj["ps"], "node-alice");
    }

    #[test]
    fn vmess_fan_out_forced_none() {
        let mut stream = tls_stream();
        stream["externalProxy"] = json!([
            {"forceTls": "none", "dest": "x.com", "port": 80, "remark": "X"}
        ]);
        let ib = inbound(Protocol::Vmess, json!({}), stream);
        let links = encode(&ib, &client("alice"));
        let payload = links[0].strip_prefix("vmess://").unwrap();
        let obj: Value =
            serde_json::from_slice(&base64::engine::general_purpose::STANDARD.decode(payload).unwrap())
                .unwrap();
        assert_eq!(obj["tls"], "none");
        assert_eq!(obj["add"], "x.com");
        assert_eq!(obj["port"], 80);
        for key in TLS_ONLY_KEYS {
            assert!(obj.get(key).is_none());
        }
    }

    #[test]
    fn ipv6_address_is_bracketed() {
        let ib = inbound(Protocol::Vless, json!({}), json!({"network": "tcp"}));
        let remark = RemarkFormatter::new("-e", false).unwrap();
        let random = FixedRandom::new(0, 'a');
        let encoder = LinkEncoder::new("2001:db8::1", &remark, &random, NOW);
        let stream = StreamSettings::parse(&ib.stream_settings).unwrap();
        let link = &encoder.encode(&ib, &client("a"), &stream)[0];
        assert!(link.contains("@[2001:db8::1]:443?"));
    }

    fn vmess_object(link: &str) -> Value {
        let payload = link.strip_prefix("vmess://").unwrap();
        let json = base64::engine::general_purpose::STANDARD.decode(payload).unwrap();
        serde_json::from_slice(&json).unwrap()
    }

    fn xhttp_stream() -> Value {
        json!({
            "network": "xhttp",
            "security": "none",
            "xhttpSettings": {"path": "/xh", "host": "xh.example.com", "mode": "packet-up"}
        })
    }

    fn kcp_stream() -> Value {
        json!({
            "network": "kcp",
            "security": "none",
            "kcpSettings": {"header": {"type": "wechat-video"}, "seed": "s33d"}
        })
    }

    #[test]
    fn xhttp_query_params() {
        let ib = inbound(Protocol::Vless, json!({}), xhttp_stream());
        let q = query(&encode(&ib, &client("a"))[0]);
        assert_eq!(q["type"], "xhttp");
        assert_eq!(q["path"], "/xh");
        assert_eq!(q["host"], "xh.example.com");
        assert_eq!(q["mode"], "packet-up");
    }

    #[test]
    fn xhttp_vmess_fields() {
        let ib = inbound(Protocol::Vmess, json!({}), xhttp_stream());
        let obj = vmess_object(&encode(&ib, &client("a"))[0]);
        assert_eq!(obj["net"], "xhttp");
        assert_eq!(obj["path"], "/xh");
        assert_eq!(obj["host"], "xh.example.com");
        assert_eq!(obj["mode"], "packet-up");
    }

    #[test]
    fn kcp_query_params() {
        let ib = inbound(Protocol::Trojan, json!({}), kcp_stream());
        let q = query(&encode(&ib, &client("a"))[0]);
        assert_eq!(q["type"], "kcp");
        assert_eq!(q["headerType"], "wechat-video");
        assert_eq!(q["seed"], "s33d");
        assert!(!q.contains_key("path"));
    }

    #[test]
    fn kcp_vmess_seed_goes_to_path() {
        let ib = inbound(Protocol::Vmess, json!({}), kcp_stream());
        let obj = vmess_object(&encode(&ib, &client("a"))[0]);
        assert_eq!(obj["net"], "kcp");
        assert_eq!(obj["type"], "wechat-video");
        assert_eq!(obj["path"], "s33d");
    }

    #[test]
    fn raw_network_is_written_as_tcp() {
        let ib = inbound(Protocol::Vless, json!({}), json!({"network": "raw", "security": "none"}));
        let q = query(&encode(&ib, &client("a"))[0]);
        assert_eq!(q["type"], "tcp");

        let vm = inbound(Protocol::Vmess, json!({}), json!({"network": "raw"}));
        let obj = vmess_object(&encode(&vm, &client("a"))[0]);
        assert_eq!(obj["net"], "tcp");
        assert_eq!(obj["type"], "none");
    }
}
