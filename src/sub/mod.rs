//! 订阅服务
//!
//! 按订阅 ID 汇总所有入站中的客户端，生成分享链接与流量头。
//! 纯读取操作，不写回存储。

pub mod link;
pub mod remark;

use std::fmt;
use std::sync::Arc;

use base64::Engine as _;
use tracing::{debug, warn};

use crate::common::format::unix_secs;
use crate::common::{PanelError, RandomSource, Result, ThreadRandom};
use crate::model::{ClientTraffic, Inbound, StreamSettings};
use crate::store::InboundStore;

pub use link::LinkEncoder;
pub use remark::RemarkFormatter;

/// Aggregated usage line sent alongside a subscription.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriptionHeader {
    pub upload: i64,
    pub download: i64,
    /// 0 = unlimited.
    pub total: i64,
    /// Unix milliseconds; 0 = never or mixed.
    pub expire: i64,
}

impl SubscriptionHeader {
    /// Merge per-client stats in order.
    ///
    /// The first stat seeds every field. Later stats add up/down; any zero
    /// total makes the aggregate unlimited; any disagreeing expiry clears it.
    pub fn aggregate<'a>(stats: impl IntoIterator<Item = &'a ClientTraffic>) -> Self {
        let mut iter = stats.into_iter();
        let Some(first) = iter.next() else {
            return Self::default();
        };
        let mut header = Self {
            upload: first.up,
            download: first.down,
            total: first.total,
            expire: first.expiry_time.max(0),
        };
        for stat in iter {
            header.upload += stat.up;
            header.download += stat.down;
            if header.total == 0 || stat.total == 0 {
                header.total = 0;
            } else {
                header.total += stat.total;
            }
            if stat.expiry_time != header.expire {
                header.expire = 0;
            }
        }
        header
    }
}

impl fmt::Display for SubscriptionHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "upload={}; download={}; total={}; expire={}",
            self.upload,
            self.download,
            self.total,
            self.expire / 1000
        )
    }
}

/// Result of one subscription request.
#[derive(Debug, Clone, Default)]
pub struct Subscription {
    pub links: Vec<String>,
    pub header: SubscriptionHeader,
}

impl Subscription {
    /// Links joined by newlines.
    pub fn body(&self) -> String {
        self.links.join("\n")
    }

    /// Body encoded with standard base64, the usual subscription transport.
    pub fn body_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.body())
    }
}

/// Subscription aggregator.
pub struct SubService {
    store: Arc<dyn InboundStore>,
    remark: RemarkFormatter,
    random: Arc<dyn RandomSource>,
}

impl SubService {
    pub fn new(store: Arc<dyn InboundStore>, remark: RemarkFormatter) -> Self {
        Self::with_random(store, remark, Arc::new(ThreadRandom))
    }

    pub fn with_random(
        store: Arc<dyn InboundStore>,
        remark: RemarkFormatter,
        random: Arc<dyn RandomSource>,
    ) -> Self {
        Self {
            store,
            remark,
            random,
        }
    }

    /// Links and header for every enabled client holding `sub_id`.
    ///
    /// `host` is the address clients should dial (normally the host the
    /// subscription was requested through).
    pub async fn get_subscription(&self, sub_id: &str, host: &str) -> Result<Subscription> {
        self.get_subscription_at(sub_id, host, unix_secs()).await
    }

    /// [`get_subscription`](Self::get_subscription) with an explicit clock (Unix seconds).
    pub async fn get_subscription_at(
        &self,
        sub_id: &str,
        host: &str,
        now: i64,
    ) -> Result<Subscription> {
        let inbounds = self.store.find_inbounds_with_client_sub_id(sub_id).await?;
        if inbounds.is_empty() {
            return Err(PanelError::NotFound(format!("subscription {}", sub_id)));
        }

        let encoder = LinkEncoder::new(host, &self.remark, self.random.as_ref(), now);
        let mut links = Vec::new();
        let mut stats = Vec::new();

        for inbound in inbounds {
            let stream = match StreamSettings::parse(&inbound.stream_settings) {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(tag = inbound.tag, error = %e, "skip inbound with bad stream settings");
                    continue;
                }
            };
            let (inbound, stream) = self.resolve_fallback(inbound, stream).await?;
            let clients = match inbound.clients() {
                Ok(clients) => clients,
                Err(e) => {
                    warn!(tag = inbound.tag, error = %e, "skip inbound with bad settings");
                    continue;
                }
            };
            for client in clients {
                if !client.enable || client.sub_id != sub_id {
                    continue;
                }
                links.extend(encoder.encode(&inbound, &client, &stream));
                stats.push(
                    inbound
                        .client_traffic(&client.email)
                        .cloned()
                        .unwrap_or_default(),
                );
            }
        }

        debug!(sub_id, links = links.len(), "subscription built");
        Ok(Subscription {
            header: SubscriptionHeader::aggregate(&stats),
            links,
        })
    }

    /// Inherit listener fields from the fallback master of an aliased inbound.
    ///
    /// A master with unreadable stream settings still lends its listener,
    /// but the child keeps its own security.
    async fn resolve_fallback(
        &self,
        mut inbound: Inbound,
        mut stream: StreamSettings,
    ) -> Result<(Inbound, StreamSettings)> {
        if !inbound.is_fallback_alias() {
            return Ok((inbound, stream));
        }
        let Some(master) = self
            .store
            .find_inbound_by_fallback_dest(&inbound.listen)
            .await?
        else {
            debug!(tag = inbound.tag, alias = inbound.listen, "no fallback master");
            return Ok((inbound, stream));
        };
        match StreamSettings::parse(&master.stream_settings) {
            Ok(master_stream) => stream.overlay_master(&master_stream),
            Err(e) => warn!(tag = master.tag, error = %e, "fallback master has bad stream settings"),
        }
        inbound.listen = master.listen;
        inbound.port = master.port;
        Ok((inbound, stream))
    }
}
