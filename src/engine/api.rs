/// 引擎管理端口上的流量统计客户端。
///
/// 统计项沿用 V2Ray 命名：
/// - `inbound>>>{tag}>>>traffic>>>uplink` / `downlink`
/// - `outbound>>>{tag}>>>traffic>>>uplink` / `downlink`
/// - `user>>>{email}>>>traffic>>>uplink` / `downlink`
///
/// 管理端口是引擎的 gRPC `StatsService`，这里只用到 `QueryStats` 一个方法，
/// 消息按 `app/stats/command/command.proto` 手写，不依赖 protoc。
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};
use tracing::debug;

use crate::common::{PanelError, Result};
use crate::model::{ClientTrafficDelta, Traffic};

const STAT_SEPARATOR: &str = ">>>";

const QUERY_STATS_PATH: &str = "/xray.app.stats.command.StatsService/QueryStats";

/// Opens short-lived management clients.
#[async_trait]
pub trait StatsConnector: Send + Sync {
    async fn connect(&self, port: u16) -> Result<Box<dyn StatsClient>>;
}

/// One management session.
#[async_trait]
pub trait StatsClient: Send {
    /// Aggregate and per-client deltas; `reset` zeroes the counters.
    async fn fetch_traffic(&mut self, reset: bool)
        -> Result<(Vec<Traffic>, Vec<ClientTrafficDelta>)>;

    async fn close(&mut self);
}

// ── command.proto ──

#[derive(Clone, PartialEq, prost::Message)]
pub struct QueryStatsRequest {
    #[prost(string, tag = "1")]
    pub pattern: String,
    #[prost(bool, tag = "2")]
    pub reset: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct StatResult {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(int64, tag = "2")]
    pub value: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct QueryStatsResponse {
    #[prost(message, repeated, tag = "1")]
    pub stat: Vec<StatResult>,
}

/// Split raw counters into inbound/outbound and per-client deltas.
///
/// Unrecognised names are skipped. Each tag or email appears once, in first-seen order.
pub fn parse_stats(stats: &[StatResult]) -> (Vec<Traffic>, Vec<ClientTrafficDelta>) {
    let mut traffics: Vec<Traffic> = Vec::new();
    let mut clients: Vec<ClientTrafficDelta> = Vec::new();

    for stat in stats {
        let parts: Vec<&str> = stat.name.split(STAT_SEPARATOR).collect();
        let [kind, name, "traffic", direction] = parts[..] else {
            continue;
        };
        let value = stat.value.max(0);
        let uplink = match direction {
            "uplink" => true,
            "downlink" => false,
            _ => continue,
        };

        match kind {
            "inbound" | "outbound" => {
                let is_inbound = kind == "inbound";
                let idx = match traffics
                    .iter()
                    .position(|t| t.tag == name && t.is_inbound == is_inbound)
                {
                    Some(i) => i,
                    None => {
                        traffics.push(Traffic {
                            is_inbound,
                            is_outbound: !is_inbound,
                            tag: name.to_string(),
                            up: 0,
                            down: 0,
                        });
                        traffics.len() - 1
                    }
                };
                let entry = &mut traffics[idx];
                if uplink {
                    entry.up = entry.up.saturating_add(value);
                } else {
                    entry.down = entry.down.saturating_add(value);
                }
            }
            "user" => {
                let idx = match clients.iter().position(|c| c.email == name) {
                    Some(i) => i,
                    None => {
                        clients.push(ClientTrafficDelta {
                            email: name.to_string(),
                            up: 0,
                            down: 0,
                        });
                        clients.len() - 1
                    }
                };
                let entry = &mut clients[idx];
                if uplink {
                    entry.up = entry.up.saturating_add(value);
                } else {
                    entry.down = entry.down.saturating_add(value);
                }
            }
            _ => {}
        }
    }
    (traffics, clients)
}

/// gRPC `StatsService` on the management port.
#[derive(Debug, Clone)]
pub struct GrpcStatsConnector {
    host: IpAddr,
    timeout: Duration,
}

impl GrpcStatsConnector {
    pub fn new(host: IpAddr, timeout: Duration) -> Self {
        Self { host, timeout }
    }

    fn endpoint(&self, port: u16) -> String {
        match self.host {
            IpAddr::V4(ip) => format!("http://{}:{}", ip, port),
            IpAddr::V6(ip) => format!("http://[{}]:{}", ip, port),
        }
    }
}

#[async_trait]
impl StatsConnector for GrpcStatsConnector {
    async fn connect(&self, port: u16) -> Result<Box<dyn StatsClient>> {
        let uri = self.endpoint(port);
        let channel = Endpoint::from_shared(uri.clone())
            .map_err(|e| PanelError::Unavailable(format!("{}: {}", uri, e)))?
            .connect_timeout(self.timeout)
            .timeout(self.timeout)
            .connect()
            .await
            .map_err(|e| PanelError::Unavailable(format!("{}: {}", uri, e)))?;
        debug!(%uri, "stats service connected");
        Ok(Box::new(GrpcStatsClient {
            inner: Some(Grpc::new(channel)),
        }))
    }
}

struct GrpcStatsClient {
    inner: Option<Grpc<Channel>>,
}

#[async_trait]
impl StatsClient for GrpcStatsClient {
    async fn fetch_traffic(
        &mut self,
        reset: bool,
    ) -> Result<(Vec<Traffic>, Vec<ClientTrafficDelta>)> {
        let grpc = self
            .inner
            .as_mut()
            .ok_or_else(|| PanelError::Unavailable("stats client closed".into()))?;
        grpc.ready()
            .await
            .map_err(|e| PanelError::Unavailable(format!("stats service not ready: {}", e)))?;

        let request = QueryStatsRequest {
            pattern: String::new(),
            reset,
        };
        let codec = ProstCodec::<QueryStatsRequest, QueryStatsResponse>::default();
        let response = grpc
            .unary(
                tonic::Request::new(request),
                PathAndQuery::from_static(QUERY_STATS_PATH),
                codec,
            )
            .await
            .map_err(|status| {
                PanelError::Unavailable(format!(
                    "query stats: {:?} {}",
                    status.code(),
                    status.message()
                ))
            })?
            .into_inner();
        debug!(count = response.stat.len(), "stats fetched");
        Ok(parse_stats(&response.stat))
    }

    async fn close(&mut self) {
        self.inner = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat(name: &str, value: i64) -> StatResult {
        StatResult {
            name: name.to_string(),
            value,
        }
    }

    #[test]
    fn parse_groups_by_tag_and_email() {
        let (traffics, clients) = parse_stats(&[
            stat("inbound>>>inbound-443>>>traffic>>>uplink", 10),
            stat("inbound>>>inbound-443>>>traffic>>>downlink", 20),
            stat("outbound>>>direct>>>traffic>>>downlink", 5),
            stat("user>>>alice>>>traffic>>>uplink", 1),
            stat("user>>>alice>>>traffic>>>downlink", 2),
            stat("user>>>bob>>>traffic>>>downlink", 3),
        ]);
        assert_eq!(traffics.len(), 2);
        assert!(traffics[0].is_inbound);
        assert_eq!((traffics[0].up, traffics[0].down), (10, 20));
        assert!(traffics[1].is_outbound);
        assert_eq!(traffics[1].tag, "direct");
        assert_eq!(
            clients,
            vec![
                ClientTrafficDelta {
                    email: "alice".into(),
                    up: 1,
                    down: 2
                },
                ClientTrafficDelta {
                    email: "bob".into(),
                    up: 0,
                    down: 3
                },
            ]
        );
    }

    #[test]
    fn parse_skips_unknown_names() {
        let (traffics, clients) = parse_stats(&[
            stat("inbound>>>x>>>traffic>>>sideways", 1),
            stat("system>>>uptime", 1),
            stat("user>>>a>>>online>>>uplink", 1),
        ]);
        assert!(traffics.is_empty());
        assert!(clients.is_empty());
    }

    #[test]
    fn saturated_counters_do_not_overflow() {
        let (traffics, clients) = parse_stats(&[
            stat("inbound>>>t>>>traffic>>>uplink", i64::MAX),
            stat("inbound>>>t>>>traffic>>>uplink", i64::MAX),
            stat("user>>>a>>>traffic>>>downlink", i64::MAX),
            stat("user>>>a>>>traffic>>>downlink", 1),
            stat("user>>>a>>>traffic>>>uplink", -5),
        ]);
        assert_eq!(traffics[0].up, i64::MAX);
        assert_eq!(clients[0].down, i64::MAX);
        assert_eq!(clients[0].up, 0);
    }

    #[test]
    fn query_request_wire_format() {
        use prost::Message;
        let req = QueryStatsRequest {
            pattern: String::new(),
            reset: true,
        };
        // 空 pattern 不上线，只剩 field 2 = true
        assert_eq!(req.encode_to_vec(), vec![0x10, 0x01]);
    }

    #[test]
    fn query_response_decodes_from_wire() {
        use prost::Message;
        // stat { name: "a", value: 7 }
        let bytes = [0x0a, 0x05, 0x0a, 0x01, b'a', 0x10, 0x07];
        let resp = QueryStatsResponse::decode(&bytes[..]).unwrap();
        assert_eq!(resp.stat, vec![stat("a", 7)]);
        let empty = QueryStatsResponse::decode(&[][..]).unwrap();
        assert!(empty.stat.is_empty());
    }

    #[tokio::test]
    async fn connect_to_closed_port_is_unavailable() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let connector =
            GrpcStatsConnector::new("127.0.0.1".parse().unwrap(), Duration::from_secs(2));
        let err = match connector.connect(port).await {
            Ok(_) => panic!("connected to a closed port"),
            Err(e) => e,
        };
        assert!(matches!(err, PanelError::Unavailable(_)));
    }
}
