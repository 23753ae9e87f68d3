//! Central error type shared across the collection pipeline and trading engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Parse error: {0}")]
    Parse(String),

    /// Venue returned 429; carries the retry-after hint in milliseconds.
    #[error("Rate limited by venue (retry after {retry_after_ms}ms)")]
    RateLimited { retry_after_ms: u64 },

    /// Non-retryable venue rejection (4xx other than 429).
    #[error("Venue rejected request ({status}): {message}")]
    Venue { status: u16, message: String },

    /// Circuit breaker is open for the named client; the call was never issued.
    #[error("Circuit open for {client}")]
    CircuitOpen { client: &'static str },

    #[error("Execution error: {0}")]
    Execution(String),
}

impl Error {
    /// True for failures worth retrying with backoff: timeouts, connect
    /// errors, 5xx responses, and rate limiting.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => {
                e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
            }
            Self::RateLimited { .. } | Self::Connection(_) | Self::WebSocket(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
