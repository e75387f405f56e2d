//! Schwab OAuth credential store
//!
//! Owns the bearer token used by the API client: the initial authorization
//! code exchange, refresh-token grants, and the persisted token file. The
//! client consumes it only through the [`CredentialStore`] trait.
//!
//! Credential flow:
//! 1. Operator opens `authorize::authorization_url()` and signs in
//! 2. Redirect URL is parsed with `authorize::parse_callback_code()`
//! 3. `TokenStore::authorize()` exchanges the code and writes the token file
//! 4. Later runs call `TokenStore::load()`
//! 5. The client's supervisor calls `refresh_if_needed()` periodically
//! 6. Readers take `current_token()` snapshots per request

pub mod authorize;
pub mod bearer;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod store;
pub mod token;

pub use authorize::{authorization_url, parse_callback_code};
pub use bearer::{BearerToken, RefreshOutcome};
pub use constants::*;
pub use credentials::TokenFile;
pub use error::{Error, Result};
pub use store::{CredentialStore, TokenStore, TokenStoreOptions};
pub use token::{AppCredentials, TokenResponse, exchange_code, refresh_token};
