pub mod jobs;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::{load_engine_template, Config};
use crate::engine::{
    ConfigSynthesizer, EngineConfig, GrpcStatsConnector, Supervisor, XrayLauncher,
};
use crate::store::{InboundStore, JsonStore};
use crate::sub::{RemarkFormatter, SubService};

use jobs::{ReconcileJob, TrafficJob};

const STATS_TIMEOUT: Duration = Duration::from_secs(5);

pub struct App {
    config: Config,
    store: Arc<JsonStore>,
    synth: ConfigSynthesizer,
    supervisor: Arc<Supervisor>,
    subs: SubService,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let template = load_engine_template(&config.engine)?;
        let store = Arc::new(JsonStore::open(&config.store.path)?.with_engine_template(template));
        let dyn_store: Arc<dyn InboundStore> = store.clone();

        let remark = RemarkFormatter::new(
            &config.subscription.remark_model,
            config.subscription.show_info,
        )?;
        let subs = SubService::new(dyn_store.clone(), remark);

        let synth = ConfigSynthesizer::new(dyn_store);
        let launcher = Arc::new(XrayLauncher::new(
            config.engine.binary.clone(),
            config.engine.config_path.clone(),
            config.engine.api_addr,
        ));
        let connector = Arc::new(GrpcStatsConnector::new(
            config.engine.api_addr.ip(),
            STATS_TIMEOUT,
        ));
        let supervisor = Arc::new(Supervisor::new(synth.clone(), launcher, connector));

        Ok(Self {
            config,
            store,
            synth,
            supervisor,
            subs,
        })
    }

    pub fn subscriptions(&self) -> &SubService {
        &self.subs
    }

    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }

    /// Engine config as it would be launched right now.
    pub async fn engine_config(&self) -> Result<EngineConfig> {
        Ok(self.synth.build().await?)
    }

    /// Start the engine and the periodic jobs; return on Ctrl-C.
    pub async fn run(self) -> Result<()> {
        info!(version = env!("CARGO_PKG_VERSION"), "xpanel started");
        if let Err(e) = self.supervisor.restart(true).await {
            error!(error = %e, "initial engine start failed");
        }

        let cancel = CancellationToken::new();
        let store: Arc<dyn InboundStore> = self.store.clone();
        let traffic = Arc::new(TrafficJob::new(self.supervisor.clone(), store));
        let reconcile = Arc::new(ReconcileJob::new(self.supervisor.clone()));
        let handles = [
            traffic.spawn(
                Duration::from_secs(self.config.jobs.traffic_interval_secs),
                cancel.clone(),
            ),
            reconcile.spawn(
                Duration::from_secs(self.config.jobs.reconcile_interval_secs),
                cancel.clone(),
            ),
        ];

        tokio::signal::ctrl_c().await?;
        info!("shutting down");
        cancel.cancel();
        for handle in handles {
            let _ = handle.await;
        }
        self.supervisor.shutdown().await?;
        self.store.save().await?;
        Ok(())
    }
}
