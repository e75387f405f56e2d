//! OAuth token exchange and refresh
//!
//! Handles the two token endpoint interactions:
//! 1. Authorization code exchange (initial authorization by the operator)
//! 2. Token refresh (driven by the client's background supervisor)
//!
//! Both POST a form body to the token endpoint and authenticate the app with
//! HTTP Basic `base64(app_key:app_secret)`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use common::Secret;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The registered application's key and secret.
#[derive(Debug, Clone)]
pub struct AppCredentials {
    pub key: Secret<String>,
    pub secret: Secret<String>,
}

impl AppCredentials {
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key: Secret::new(key.into()),
            secret: Secret::new(secret.into()),
        }
    }

    /// `Authorization` header value for token endpoint calls.
    pub fn basic_authorization(&self) -> String {
        let pair = format!("{}:{}", self.key.expose(), self.secret.expose());
        format!("Basic {}", STANDARD.encode(pair.as_bytes()))
    }
}

/// Response from the token endpoint for both exchange and refresh.
///
/// `expires_in` is a delta in seconds from the response time. Schwab omits the
/// refresh token on some refresh responses, in which case the caller keeps the
/// one it already holds.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    /// Seconds until the access token expires (delta, not absolute)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Exchange an authorization code for tokens.
///
/// `callback_url` must match the one registered with the app and used to build
/// the authorization URL.
pub async fn exchange_code(
    client: &reqwest::Client,
    endpoint: &str,
    app: &AppCredentials,
    code: &str,
    callback_url: &str,
) -> Result<TokenResponse> {
    let response = client
        .post(endpoint)
        .header(reqwest::header::AUTHORIZATION, app.basic_authorization())
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", callback_url),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token exchange request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::TokenExchange(format!(
            "token endpoint returned {status}: {body}"
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid token response: {e}")))
}

/// Obtain a new access token using a refresh token.
pub async fn refresh_token(
    client: &reqwest::Client,
    endpoint: &str,
    app: &AppCredentials,
    refresh: &str,
) -> Result<TokenResponse> {
    let response = client
        .post(endpoint)
        .header(reqwest::header::AUTHORIZATION, app.basic_authorization())
        .form(&[("grant_type", "refresh_token"), ("refresh_token", refresh)])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        // 400/401/403: refresh token revoked, expired or app credentials wrong
        if matches!(status.as_u16(), 400 | 401 | 403) {
            return Err(Error::InvalidCredentials(format!(
                "refresh token rejected ({status}): {body}"
            )));
        }

        return Err(Error::TokenExchange(format!(
            "token refresh returned {status}: {body}"
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid refresh response: {e}")))
}
