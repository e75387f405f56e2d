//! Initial authorization helpers
//!
//! The operator opens the authorization URL in a browser, signs in, and is
//! redirected to the app's callback URL with a `code` query parameter. The
//! redirect URL (or just the code) is handed back to [`parse_callback_code`].

use reqwest::Url;

use crate::error::{Error, Result};

/// Build the URL the operator visits to grant the app access.
pub fn authorization_url(endpoint: &str, app_key: &str, callback_url: &str) -> Result<String> {
    let url = Url::parse_with_params(
        endpoint,
        &[("client_id", app_key), ("redirect_uri", callback_url)],
    )
    .map_err(|e| Error::CredentialParse(format!("invalid authorize endpoint: {e}")))?;
    Ok(url.into())
}

/// Extract the authorization code from a pasted redirect URL or bare code.
///
/// Codes end in `@`, which shows up percent-encoded (`%40`) in the redirect URL;
/// URL parsing decodes it.
pub fn parse_callback_code(input: &str) -> Result<String> {
    let input = input.trim();
    if let Ok(url) = Url::parse(input) {
        return url
            .query_pairs()
            .find(|(k, _)| k == "code")
            .map(|(_, v)| v.into_owned())
            .filter(|code| !code.is_empty())
            .ok_or_else(|| Error::CredentialParse("redirect URL has no code parameter".into()));
    }
    if input.is_empty() {
        return Err(Error::CredentialParse("authorization code is empty".into()));
    }
    Ok(input.to_owned())
}
