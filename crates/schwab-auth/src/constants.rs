//! Schwab OAuth constants
//!
//! Endpoints and token lifetimes published by the Schwab developer portal.
//! The app key/secret that identify the registered application are supplied
//! by the operator at runtime and never live here.

use std::time::Duration;

/// Token endpoint for code exchange and token refresh
pub const TOKEN_ENDPOINT: &str = "https://api.schwabapi.com/v1/oauth/token";

/// Authorization endpoint the operator visits to grant access
pub const AUTHORIZE_ENDPOINT: &str = "https://api.schwabapi.com/v1/oauth/authorize";

/// Default callback registered with the app
pub const DEFAULT_CALLBACK_URL: &str = "https://127.0.0.1";

/// Access tokens are valid for 30 minutes after issue
pub const ACCESS_TOKEN_LIFETIME: Duration = Duration::from_secs(30 * 60);

/// Refresh tokens are valid for 7 days; after that the operator must re-authorize
pub const REFRESH_TOKEN_LIFETIME: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Rotate the access token once it is this close to expiry
pub const DEFAULT_REFRESH_WINDOW: Duration = Duration::from_secs(61);
