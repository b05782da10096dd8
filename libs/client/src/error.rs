use thiserror::Error;

/// API client errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport-level failure (connect, timeout, TLS).
    #[error("http transport: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("api error: status {status}: {message}")]
    Api { status: u16, message: String },

    /// 404 gets its own variant so delete paths can treat absence as the
    /// desired terminal state.
    #[error("not found: {0}")]
    NotFound(String),

    /// Response body did not decode.
    #[error("decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Envelope decoded but the expected data key was absent.
    #[error("response missing data field {0:?}")]
    MissingField(String),
}

pub type Result<T> = std::result::Result<T, Error>;
