//! 引擎进程：启动、存活检测、终止与输出收集

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::common::{PanelError, Result};

use super::EngineConfig;

/// Lines of engine output kept as the terminal result.
const OUTPUT_LINES: usize = 100;

/// A launched engine instance.
#[async_trait]
pub trait EngineProcess: Send + Sync {
    fn is_running(&self) -> bool;

    /// Config the process was started with.
    fn config(&self) -> &EngineConfig;

    /// Abnormal exit description, if any.
    fn error(&self) -> Option<String>;

    fn version(&self) -> String;

    /// Captured output. Meaningful once the process has exited.
    fn result(&self) -> String;

    /// Port of the management endpoint.
    fn api_port(&self) -> u16;

    async fn stop(&self) -> Result<()>;
}

/// Starts engine processes.
#[async_trait]
pub trait EngineLauncher: Send + Sync {
    async fn launch(&self, config: EngineConfig) -> Result<Arc<dyn EngineProcess>>;
}

/// Launches the Xray binary.
#[derive(Debug, Clone)]
pub struct XrayLauncher {
    binary: PathBuf,
    config_path: PathBuf,
    api_addr: SocketAddr,
}

impl XrayLauncher {
    pub fn new(binary: PathBuf, config_path: PathBuf, api_addr: SocketAddr) -> Self {
        Self {
            binary,
            config_path,
            api_addr,
        }
    }

    /// `<binary> -version`, second word of the first line.
    pub async fn version(&self) -> String {
        let output = match Command::new(&self.binary).arg("-version").output().await {
            Ok(output) => output,
            Err(e) => {
                debug!(binary = %self.binary.display(), error = %e, "version check failed");
                return "Unknown".to_string();
            }
        };
        parse_version(&String::from_utf8_lossy(&output.stdout)).unwrap_or_else(|| "Unknown".into())
    }
}

fn parse_version(text: &str) -> Option<String> {
    text.lines()
        .next()?
        .split_whitespace()
        .nth(1)
        .map(str::to_string)
}

#[async_trait]
impl EngineLauncher for XrayLauncher {
    async fn launch(&self, config: EngineConfig) -> Result<Arc<dyn EngineProcess>> {
        let json = serde_json::to_string_pretty(&config)?;
        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&self.config_path, json).await?;

        let version = self.version().await;
        let mut child = Command::new(&self.binary)
            .arg("run")
            .arg("-c")
            .arg(&self.config_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                PanelError::ProcessState(format!(
                    "failed to start '{}': {}",
                    self.binary.display(),
                    e
                ))
            })?;

        let shared = Arc::new(Shared {
            running: AtomicBool::new(true),
            error: Mutex::new(None),
            output: Mutex::new(VecDeque::with_capacity(OUTPUT_LINES)),
        });
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(collect_lines(stdout, shared.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(collect_lines(stderr, shared.clone()));
        }

        let cancel = CancellationToken::new();
        let waiter = {
            let shared = shared.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    status = child.wait() => match status {
                        Ok(status) if status.success() => {
                            info!("engine exited");
                        }
                        Ok(status) => {
                            warn!(%status, "engine exited abnormally");
                            shared.set_error(format!("engine exited: {}", status));
                        }
                        Err(e) => shared.set_error(format!("wait failed: {}", e)),
                    },
                    _ = cancel.cancelled() => {
                        if let Err(e) = child.kill().await {
                            shared.set_error(format!("kill failed: {}", e));
                        }
                    }
                }
                shared.running.store(false, Ordering::SeqCst);
            })
        };

        let api_port = config.api_port().unwrap_or(self.api_addr.port());
        info!(version = %version, api_port, "engine started");
        Ok(Arc::new(XrayProcess {
            config,
            version,
            api_port,
            shared,
            cancel,
            waiter: tokio::sync::Mutex::new(Some(waiter)),
        }))
    }
}

struct Shared {
    running: AtomicBool,
    error: Mutex<Option<String>>,
    output: Mutex<VecDeque<String>>,
}

impl Shared {
    fn set_error(&self, msg: String) {
        *self.error.lock().unwrap_or_else(PoisonError::into_inner) = Some(msg);
    }

    fn push_line(&self, line: String) {
        let mut output = self.output.lock().unwrap_or_else(PoisonError::into_inner);
        if output.len() == OUTPUT_LINES {
            output.pop_front();
        }
        output.push_back(line);
    }
}

async fn collect_lines<R: AsyncRead + Unpin>(reader: R, shared: Arc<Shared>) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        shared.push_line(line);
    }
}

/// A running (or exited) Xray child process.
pub struct XrayProcess {
    config: EngineConfig,
    version: String,
    api_port: u16,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    waiter: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl EngineProcess for XrayProcess {
    fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn error(&self) -> Option<String> {
        self.shared
            .error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn version(&self) -> String {
        self.version.clone()
    }

    fn result(&self) -> String {
        let output = self
            .shared
            .output
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        output.iter().cloned().collect::<Vec<_>>().join("\n")
    }

    fn api_port(&self) -> u16 {
        self.api_port
    }

    async fn stop(&self) -> Result<()> {
        self.cancel.cancel();
        let waiter = self.waiter.lock().await.take();
        if let Some(handle) = waiter {
            handle
                .await
                .map_err(|e| PanelError::ProcessState(format!("engine waiter: {}", e)))?;
        }
        info!("engine stopped");
        Ok(())
    }
}
