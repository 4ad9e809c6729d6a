use thiserror::Error;

pub type Result<T> = std::result::Result<T, PanelError>;

#[derive(Error, Debug)]
pub enum PanelError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("malformed config: {0}")]
    MalformedConfig(String),

    #[error("process state: {0}")]
    ProcessState(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl PanelError {
    /// 将 JSON 解析错误归类为配置错误，附带出错位置说明
    pub fn malformed(context: &str, err: serde_json::Error) -> Self {
        PanelError::MalformedConfig(format!("{}: {}", context, err))
    }

    /// Whether the caller may retry later with a reasonable chance of success.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Get the kind/category of this error.
    pub fn kind(&self) -> PanelErrorKind {
        match self {
            PanelError::NotFound(_) => PanelErrorKind::NotFound,
            PanelError::MalformedConfig(_) => PanelErrorKind::MalformedConfig,
            PanelError::ProcessState(_) => PanelErrorKind::ProcessState,
            PanelError::Unavailable(_) => PanelErrorKind::Unavailable,
            PanelError::Io(_) => PanelErrorKind::Io,
            PanelError::Json(_) => PanelErrorKind::MalformedConfig,
            PanelError::Other(_) => PanelErrorKind::Other,
        }
    }
}

/// Lightweight error category for pattern matching without borrowing the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelErrorKind {
    NotFound,
    MalformedConfig,
    ProcessState,
    Unavailable,
    Io,
    Other,
}

impl PanelErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, PanelErrorKind::Unavailable | PanelErrorKind::Io)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PanelErrorKind::NotFound => "NOT_FOUND",
            PanelErrorKind::MalformedConfig => "MALFORMED_CONFIG",
            PanelErrorKind::ProcessState => "PROCESS_STATE",
            PanelErrorKind::Unavailable => "UNAVAILABLE",
            PanelErrorKind::Io => "IO",
            PanelErrorKind::Other => "OTHER",
        }
    }
}

impl From<PanelError> for std::io::Error {
    fn from(e: PanelError) -> Self {
        std::io::Error::other(e.to_string())
    }
}
