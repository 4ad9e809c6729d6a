//! 入站数据存储
//!
//! [`InboundStore`] 是核心逻辑与持久化层之间的边界。[`JsonStore`] 是基于单个
//! JSON 文件的轻量实现：启动时加载，流量回写后原子落盘（先写临时文件再重命名）。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::common::format::unix_millis;
use crate::common::json::ValueExt;
use crate::common::{PanelError, Result};
use crate::engine::template::DEFAULT_TEMPLATE;
use crate::model::{ClientTraffic, ClientTrafficDelta, Inbound, Traffic};

/// Storage collaborator.
#[async_trait]
pub trait InboundStore: Send + Sync {
    /// Enabled link-capable inbounds holding at least one client with `sub_id`.
    async fn find_inbounds_with_client_sub_id(&self, sub_id: &str) -> Result<Vec<Inbound>>;

    /// The inbound whose settings list `dest` among its fallbacks.
    async fn find_inbound_by_fallback_dest(&self, dest: &str) -> Result<Option<Inbound>>;

    async fn list_blocked_domains(&self) -> Result<Vec<String>>;

    async fn list_enabled_inbounds(&self) -> Result<Vec<Inbound>>;

    /// Base engine configuration (JSON text).
    async fn engine_template(&self) -> Result<String>;

    /// Accumulate traffic deltas and re-evaluate client limits.
    ///
    /// Returns `true` when some client stat was disabled, meaning the running
    /// engine config is stale.
    async fn add_traffic(
        &self,
        traffics: &[Traffic],
        client_traffics: &[ClientTrafficDelta],
    ) -> Result<bool>;
}

/// On-disk layout of [`JsonStore`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSnapshot {
    pub inbounds: Vec<Inbound>,
    pub blocked_domains: Vec<String>,
    pub engine_template: Option<String>,
}

/// JSON file backed store.
pub struct JsonStore {
    path: Option<PathBuf>,
    data: RwLock<StoreSnapshot>,
    template_override: Option<String>,
}

impl JsonStore {
    /// In-memory store; nothing is written to disk.
    pub fn new(snapshot: StoreSnapshot) -> Self {
        Self {
            path: None,
            data: RwLock::new(snapshot),
            template_override: None,
        }
    }

    /// Load from `path`. A missing file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let snapshot = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)
                .map_err(|e| PanelError::malformed(&path.display().to_string(), e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "store file not found, starting empty");
                StoreSnapshot::default()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path: Some(path),
            data: RwLock::new(snapshot),
            template_override: None,
        })
    }

    /// Engine template taking precedence over the stored one; never persisted.
    pub fn with_engine_template(mut self, template: Option<String>) -> Self {
        self.template_override = template;
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn snapshot(&self) -> StoreSnapshot {
        self.data.read().await.clone()
    }

    /// 持久化到磁盘（内存模式下为空操作）
    pub async fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = {
            let data = self.data.read().await;
            serde_json::to_string_pretty(&*data)?
        };
        let tmp_path = path.with_extension("tmp");
        tokio::fs::write(&tmp_path, &json).await?;
        tokio::fs::rename(&tmp_path, path).await?;
        debug!(bytes = json.len(), "store saved");
        Ok(())
    }
}

/// Cap and expiry declared for `email` in the inbound's client list.
fn client_limits(inbound: &Inbound, email: &str) -> Option<(i64, i64)> {
    let settings = inbound.settings_value().ok()?;
    let client = settings
        .array_at("clients")?
        .iter()
        .find(|c| c.str_at("email") == Some(email))?;
    Some((
        client.i64_at("totalGB").unwrap_or(0),
        client.i64_at("expiryTime").unwrap_or(0),
    ))
}

fn is_depleted(stat: &ClientTraffic, now_ms: i64) -> bool {
    (stat.total > 0 && stat.used() >= stat.total)
        || (stat.expiry_time > 0 && stat.expiry_time <= now_ms)
}

#[async_trait]
impl InboundStore for JsonStore {
    async fn find_inbounds_with_client_sub_id(&self, sub_id: &str) -> Result<Vec<Inbound>> {
        let data = self.data.read().await;
        Ok(data
            .inbounds
            .iter()
            .filter(|ib| ib.enable && ib.protocol.is_subscribable())
            .filter(|ib| {
                ib.clients()
                    .map(|clients| clients.iter().any(|c| c.sub_id == sub_id))
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn find_inbound_by_fallback_dest(&self, dest: &str) -> Result<Option<Inbound>> {
        let data = self.data.read().await;
        Ok(data
            .inbounds
            .iter()
            .find(|ib| ib.has_fallback_dest(dest))
            .cloned())
    }

    async fn list_blocked_domains(&self) -> Result<Vec<String>> {
        Ok(self.data.read().await.blocked_domains.clone())
    }

    async fn list_enabled_inbounds(&self) -> Result<Vec<Inbound>> {
        let data = self.data.read().await;
        Ok(data.inbounds.iter().filter(|ib| ib.enable).cloned().collect())
    }

    async fn engine_template(&self) -> Result<String> {
        if let Some(template) = &self.template_override {
            return Ok(template.clone());
        }
        let data = self.data.read().await;
        Ok(data
            .engine_template
            .clone()
            .unwrap_or_else(|| DEFAULT_TEMPLATE.to_string()))
    }

    async fn add_traffic(
        &self,
        traffics: &[Traffic],
        client_traffics: &[ClientTrafficDelta],
    ) -> Result<bool> {
        let now = unix_millis();
        let touched = !traffics.is_empty() || !client_traffics.is_empty();
        let mut depleted = false;
        {
            let mut data = self.data.write().await;

            for t in traffics.iter().filter(|t| t.is_inbound) {
                if let Some(ib) = data.inbounds.iter_mut().find(|ib| ib.tag == t.tag) {
                    ib.up += t.up;
                    ib.down += t.down;
                }
            }

            for delta in client_traffics {
                let existing = data
                    .inbounds
                    .iter_mut()
                    .flat_map(|ib| ib.client_stats.iter_mut())
                    .find(|s| s.email == delta.email);
                if let Some(stat) = existing {
                    stat.up += delta.up;
                    stat.down += delta.down;
                    continue;
                }
                let owner = data.inbounds.iter_mut().find(|ib| {
                    ib.clients()
                        .map(|cs| cs.iter().any(|c| c.email == delta.email))
                        .unwrap_or(false)
                });
                if let Some(ib) = owner {
                    let (total, expiry_time) = client_limits(ib, &delta.email).unwrap_or((0, 0));
                    ib.client_stats.push(ClientTraffic {
                        id: 0,
                        inbound_id: ib.id,
                        enable: true,
                        email: delta.email.clone(),
                        up: delta.up,
                        down: delta.down,
                        expiry_time,
                        total,
                    });
                }
            }

            for stat in data
                .inbounds
                .iter_mut()
                .flat_map(|ib| ib.client_stats.iter_mut())
                .filter(|s| s.enable)
            {
                if is_depleted(stat, now) {
                    stat.enable = false;
                    depleted = true;
                    info!(email = stat.email, "client disabled by traffic or expiry limit");
                }
            }
        }

        if touched || depleted {
            self.save().await?;
        }
        Ok(depleted)
    }
}
