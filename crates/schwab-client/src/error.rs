//! Error types for client operations

/// Errors from client construction, lifecycle and endpoint calls.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("client scope already entered")]
    AlreadyActive,

    #[error("transport construction failed: {0}")]
    TransportBuild(String),

    #[error("transport closed")]
    TransportClosed,

    #[error("teardown failed: {0}")]
    Teardown(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("HTTP request failed: {0}")]
    Http(String),
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;
