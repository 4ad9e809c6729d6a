//! 引擎进程监管
//!
//! 持有唯一的引擎进程句柄。重启/停止由同一把异步互斥锁串行化；
//! 排队的重启拿到锁后会重新比较配置，可能变为空操作。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{debug, info, warn};

use crate::common::{PanelError, Result};
use crate::model::{ClientTrafficDelta, Traffic};

use super::api::StatsConnector;
use super::process::{EngineLauncher, EngineProcess};
use super::synth::ConfigSynthesizer;

/// Observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    NotStarted,
    Running,
    Stopped,
    Failed,
}

impl EngineState {
    pub fn as_str(self) -> &'static str {
        match self {
            EngineState::NotStarted => "not_started",
            EngineState::Running => "running",
            EngineState::Stopped => "stopped",
            EngineState::Failed => "failed",
        }
    }
}

/// Owner of the engine process.
pub struct Supervisor {
    synth: ConfigSynthesizer,
    launcher: Arc<dyn EngineLauncher>,
    connector: Arc<dyn StatsConnector>,
    lock: tokio::sync::Mutex<()>,
    process: RwLock<Option<Arc<dyn EngineProcess>>>,
    launch_error: RwLock<Option<String>>,
    result: Mutex<Option<String>>,
    need_restart: AtomicBool,
}

impl Supervisor {
    /// No process is started until the first [`restart`](Self::restart).
    pub fn new(
        synth: ConfigSynthesizer,
        launcher: Arc<dyn EngineLauncher>,
        connector: Arc<dyn StatsConnector>,
    ) -> Self {
        Self {
            synth,
            launcher,
            connector,
            lock: tokio::sync::Mutex::new(()),
            process: RwLock::new(None),
            launch_error: RwLock::new(None),
            result: Mutex::new(None),
            need_restart: AtomicBool::new(false),
        }
    }

    fn current(&self) -> Option<Arc<dyn EngineProcess>> {
        self.process
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn running(&self) -> Option<Arc<dyn EngineProcess>> {
        self.current().filter(|p| p.is_running())
    }

    /// Rebuild the config and (re)start the engine.
    ///
    /// Without `force`, a running engine whose config equals the fresh one is
    /// left alone.
    pub async fn restart(&self, force: bool) -> Result<()> {
        let _guard = self.lock.lock().await;
        debug!(force, "restart engine");

        let config = self.synth.build().await?;

        if let Some(current) = self.running() {
            if !force && *current.config() == config {
                debug!("engine config unchanged, restart not needed");
                return Ok(());
            }
            if let Err(e) = current.stop().await {
                warn!(error = %e, "failed to stop engine before restart");
            }
        }

        *self.result.lock().unwrap_or_else(PoisonError::into_inner) = None;
        match self.launcher.launch(config).await {
            Ok(process) => {
                info!(version = %process.version(), "engine launched");
                *self.process.write().unwrap_or_else(PoisonError::into_inner) = Some(process);
                *self.launch_error.write().unwrap_or_else(PoisonError::into_inner) = None;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "engine launch failed");
                *self.process.write().unwrap_or_else(PoisonError::into_inner) = None;
                *self.launch_error.write().unwrap_or_else(PoisonError::into_inner) =
                    Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Stop the running engine.
    pub async fn stop(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        debug!("stopping engine");
        match self.running() {
            Some(process) => process.stop().await,
            None => Err(PanelError::ProcessState("engine is not running".into())),
        }
    }

    /// Stop the engine if it runs; used on application exit.
    pub async fn shutdown(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        if let Some(process) = self.running() {
            process.stop().await?;
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running().is_some()
    }

    pub fn state(&self) -> EngineState {
        match self.current() {
            Some(p) if p.is_running() => EngineState::Running,
            Some(p) if p.error().is_some() => EngineState::Failed,
            Some(_) => EngineState::Stopped,
            None if self.error().is_some() => EngineState::Failed,
            None => EngineState::NotStarted,
        }
    }

    pub fn error(&self) -> Option<String> {
        if let Some(p) = self.current() {
            return p.error();
        }
        self.launch_error
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn version(&self) -> String {
        self.current()
            .map(|p| p.version())
            .unwrap_or_else(|| "Unknown".to_string())
    }

    /// Terminal output of the last process, read once it has exited.
    ///
    /// Empty while the process still runs.
    pub fn result(&self) -> String {
        let mut cached = self.result.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(result) = cached.as_ref() {
            return result.clone();
        }
        let Some(process) = self.current() else {
            return String::new();
        };
        if process.is_running() {
            return String::new();
        }
        let result = process.result();
        if !result.is_empty() {
            *cached = Some(result.clone());
        }
        result
    }

    pub fn set_need_restart(&self) {
        self.need_restart.store(true, Ordering::SeqCst);
    }

    /// Consume the need-restart flag. Only one caller observes `true` per set.
    pub fn take_need_restart(&self) -> bool {
        self.need_restart
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Traffic deltas since the last fetch (counters are reset).
    pub async fn fetch_traffic(&self) -> Result<(Vec<Traffic>, Vec<ClientTrafficDelta>)> {
        let Some(process) = self.running() else {
            debug!("traffic fetch skipped, engine is not running");
            return Err(PanelError::Unavailable("engine is not running".into()));
        };
        let mut client = self.connector.connect(process.api_port()).await?;
        let result = client.fetch_traffic(true).await;
        client.close().await;
        if let Err(e) = &result {
            debug!(error = %e, "failed to fetch engine traffic");
        }
        result
    }
}
