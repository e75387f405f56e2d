//! Error types for Schwab OAuth operations

/// Errors from token acquisition, refresh and storage.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("refresh token expired, re-authorization required: {0}")]
    ReauthRequired(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Whether retrying on a later cycle can succeed without operator action.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Http(_) | Error::TokenExchange(_) | Error::Io(_))
    }
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
