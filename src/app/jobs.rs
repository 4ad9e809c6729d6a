//! 周期任务：流量回写与引擎状态对账

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::common::Result;
use crate::engine::Supervisor;
use crate::store::InboundStore;

/// Pulls traffic deltas from the engine and writes them to the store.
pub struct TrafficJob {
    supervisor: Arc<Supervisor>,
    store: Arc<dyn InboundStore>,
}

impl TrafficJob {
    pub fn new(supervisor: Arc<Supervisor>, store: Arc<dyn InboundStore>) -> Self {
        Self { supervisor, store }
    }

    pub async fn run_once(&self) -> Result<()> {
        if !self.supervisor.is_running() {
            return Ok(());
        }
        let (traffics, clients) = self.supervisor.fetch_traffic().await?;
        if self.store.add_traffic(&traffics, &clients).await? {
            info!("client limits reached, engine restart scheduled");
            self.supervisor.set_need_restart();
        }
        Ok(())
    }

    pub fn spawn(self: &Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = this.run_once().await {
                            debug!(error = %e, "traffic job failed");
                        }
                    }
                }
            }
        })
    }
}

/// Restarts the engine when it is down or flagged stale.
pub struct ReconcileJob {
    supervisor: Arc<Supervisor>,
}

impl ReconcileJob {
    pub fn new(supervisor: Arc<Supervisor>) -> Self {
        Self { supervisor }
    }

    /// Returns whether a restart was attempted.
    pub async fn run_once(&self) -> Result<bool> {
        let flagged = self.supervisor.take_need_restart();
        if !flagged && self.supervisor.is_running() {
            return Ok(false);
        }
        debug!(flagged, "reconciling engine");
        self.supervisor.restart(false).await?;
        Ok(true)
    }

    pub fn spawn(self: &Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = this.run_once().await {
                            warn!(error = %e, "engine reconcile failed");
                        }
                    }
                }
            }
        })
    }
}
