use thiserror::Error;

/// Outcome classes of a token query. Every variant is recoverable from the
/// user's point of view; they differ in how they are surfaced and whether the
/// endpoint's cached snapshot is cleared.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("Base URL is not configured or failed to parse; check BASE_URL.")]
    Config,

    #[error("Enter a token before querying.")]
    EmptyCredential,

    #[error("Token format is invalid (expected sk- followed by 48 letters or digits).")]
    MalformedCredential,

    #[error("Token info query failed: {0}")]
    BalanceQueryFailed(String),

    #[error("Call detail query failed: {0}")]
    LogQueryFailed(String),

    #[error("A query for '{0}' is already running.")]
    InFlight(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

impl QueryError {
    pub fn severity(&self) -> Severity {
        match self {
            QueryError::EmptyCredential | QueryError::InFlight(_) => Severity::Warning,
            _ => Severity::Error,
        }
    }

    /// Whether the failed cycle leaves the endpoint's snapshot reset to empty.
    pub fn resets_snapshot(&self) -> bool {
        matches!(
            self,
            QueryError::BalanceQueryFailed(_) | QueryError::LogQueryFailed(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("export failed: {0}")]
    ExportFailed(String),

    #[error("clipboard unavailable: {0}")]
    ClipboardFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Dotenv(#[from] dotenvy::Error),

    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),

    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),
}
