use thiserror::Error;

#[derive(Error, Debug)]
pub enum AlertWatchError {
    #[error("WebSocket error: {0}")]
    WebsocketError(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    DbError(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    PoolError(#[from] r2d2::Error),

    #[error("{service} responded with HTTP {status}")]
    Upstream { service: &'static str, status: u16 },

    #[error("Unexpected payload: {0}")]
    Parse(String),

    #[error("Invalid alert condition: {0}")]
    InvalidAlert(String),

    #[error("Missing credential: {0}")]
    MissingCredential(&'static str),

    #[error("Indicator error: {0}")]
    Indicator(String),

    #[error("Timed out: {0}")]
    Timeout(&'static str),

    #[error("Notification error: {0}")]
    Notify(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, AlertWatchError>;

impl From<tokio::task::JoinError> for AlertWatchError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Task(e.to_string())
    }
}
