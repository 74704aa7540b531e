/// Core error type.
///
/// Adapter crates map their specific errors into this type so the dispatch
/// loop can decide between a generic reply and a detailed one. Model calls
/// report through `BackendError` and never leave their query task.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("user store error: {0}")]
    Store(String),

    #[error("messaging error: {0}")]
    Messaging(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a single model call. Ends the query task that hit it.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("ollama HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("ollama error: {0}")]
    Reported(String),

    #[error("request timed out")]
    Timeout,

    #[error("http request failed: {0}")]
    Transport(String),

    #[error("decode response: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, Error>;
