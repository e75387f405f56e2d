//! Persisted token file
//!
//! Holds the last token response plus the times its access and refresh
//! tokens were issued. All writes use atomic temp-file + rename so a crash
//! mid-write never leaves a truncated file behind.

use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{ACCESS_TOKEN_LIFETIME, REFRESH_TOKEN_LIFETIME};
use crate::error::{Error, Result};
use crate::token::TokenResponse;

/// Current wall-clock time as unix milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// On-disk token state.
///
/// Issue times are unix timestamps in milliseconds. The refresh token is
/// re-issued only by an authorization code exchange, or when a refresh
/// response carries a new one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenFile {
    pub access_token_issued: u64,
    pub refresh_token_issued: u64,
    pub token: TokenResponse,
}

impl TokenFile {
    /// Build the state for a fresh authorization code exchange.
    pub fn from_exchange(token: TokenResponse, now: u64) -> Result<Self> {
        if token.refresh_token.is_none() {
            return Err(Error::TokenExchange(
                "authorization response carried no refresh token".into(),
            ));
        }
        Ok(Self {
            access_token_issued: now,
            refresh_token_issued: now,
            token,
        })
    }

    /// Apply a refresh response, keeping the old refresh token when none is returned.
    pub fn rotated(&self, mut token: TokenResponse, now: u64) -> Self {
        let refresh_token_issued = match token.refresh_token {
            Some(ref new) if Some(new) != self.token.refresh_token.as_ref() => now,
            Some(_) => self.refresh_token_issued,
            None => {
                token.refresh_token = self.token.refresh_token.clone();
                self.refresh_token_issued
            }
        };
        Self {
            access_token_issued: now,
            refresh_token_issued,
            token,
        }
    }

    /// Access token expiry as unix milliseconds.
    pub fn access_expires_at(&self) -> u64 {
        let lifetime = self
            .token
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(ACCESS_TOKEN_LIFETIME);
        self.access_token_issued
            .saturating_add(u64::try_from(lifetime.as_millis()).unwrap_or(u64::MAX))
    }

    /// Refresh token expiry as unix milliseconds.
    pub fn refresh_expires_at(&self) -> u64 {
        self.refresh_token_issued
            .saturating_add(REFRESH_TOKEN_LIFETIME.as_millis() as u64)
    }

    pub fn refresh_token(&self) -> Result<&str> {
        self.token
            .refresh_token
            .as_deref()
            .ok_or_else(|| Error::CredentialParse("token file has no refresh token".into()))
    }
}

/// Read and parse a token file.
pub async fn read_token_file(path: &Path) -> Result<TokenFile> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::NotFound(format!(
                "token file {} does not exist, authorize the app first",
                path.display()
            )));
        }
        Err(e) => return Err(Error::Io(format!("reading token file: {e}"))),
    };
    serde_json::from_str(&contents)
        .map_err(|e| Error::CredentialParse(format!("parsing token file: {e}")))
}

/// Write the token file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Sets file permissions to 0600 since the file holds tokens.
pub async fn write_atomic(path: &Path, data: &TokenFile) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::CredentialParse(format!("serializing tokens: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("token path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".tokens.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp token file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting token file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp token file: {e}")))?;

    debug!(path = %path.display(), "persisted tokens");
    Ok(())
}
