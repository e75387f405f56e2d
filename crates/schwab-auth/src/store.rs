//! Credential store: the token source consumed by the client
//!
//! [`CredentialStore`] is the contract the client's refresh supervisor
//! depends on. [`TokenStore`] implements it on top of the persisted token file
//! and the Schwab token endpoint.
//!
//! Readers call `current_token()` without locking: the snapshot lives in an
//! `ArcSwap` and is replaced whole on rotation. Rotations themselves are
//! serialized by a tokio Mutex over the persisted state, so two refresh checks
//! can never interleave.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::bearer::{BearerToken, RefreshOutcome};
use crate::constants::{DEFAULT_REFRESH_WINDOW, TOKEN_ENDPOINT};
use crate::credentials::{TokenFile, now_millis, read_token_file, write_atomic};
use crate::error::{Error, Result};
use crate::token::{self, AppCredentials};

/// Source of bearer tokens for outbound requests.
///
/// Uses `Pin<Box<dyn Future>>` so the client can hold an `Arc<dyn CredentialStore>`.
pub trait CredentialStore: Send + Sync {
    /// Rotate the access token if it is within the refresh window of expiry.
    ///
    /// Must leave the previously valid token in place when rotation fails.
    fn refresh_if_needed(&self) -> Pin<Box<dyn Future<Output = RefreshOutcome> + Send + '_>>;

    /// Snapshot of the current access token. Never blocks.
    fn current_token(&self) -> BearerToken;
}

/// Tunables for [`TokenStore`].
#[derive(Debug, Clone)]
pub struct TokenStoreOptions {
    pub token_endpoint: String,
    /// Rotate once the access token is this close to expiry
    pub refresh_window: Duration,
    /// Deadline for each token endpoint request
    pub request_timeout: Duration,
}

impl Default for TokenStoreOptions {
    fn default() -> Self {
        Self {
            token_endpoint: TOKEN_ENDPOINT.to_owned(),
            refresh_window: DEFAULT_REFRESH_WINDOW,
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// File-backed credential store for a single Schwab app.
pub struct TokenStore {
    path: PathBuf,
    app: AppCredentials,
    http: reqwest::Client,
    options: TokenStoreOptions,
    state: Mutex<TokenFile>,
    current: ArcSwap<BearerToken>,
}

impl TokenStore {
    /// Load tokens written by an earlier authorization.
    ///
    /// A persisted access token that is already due is rotated before the
    /// store is returned, so the first request after a restart never carries
    /// a stale token. A failed startup rotation is logged and the persisted
    /// token is kept; the periodic check retries it.
    ///
    /// Returns `NotFound` if the token file doesn't exist yet.
    pub async fn load(
        path: PathBuf,
        app: AppCredentials,
        options: TokenStoreOptions,
    ) -> Result<Self> {
        let file = read_token_file(&path).await?;
        let store = Self::from_file(path, app, options, file)?;
        let token = store.current_token();
        info!(
            path = %store.path.display(),
            access_expires_at = token.expires_at(),
            access_expired = token.is_expired_at(now_millis()),
            refresh_expires_at = store.refresh_expires_at().await,
            "loaded tokens"
        );

        match store.check().await {
            RefreshOutcome::NoActionNeeded => {}
            RefreshOutcome::Rotated => info!("stale access token rotated at load"),
            RefreshOutcome::Failed(e) => {
                warn!(error = %e, "startup token refresh failed, keeping persisted token");
            }
        }
        Ok(store)
    }

    /// Exchange an authorization code, persist the result and return the store.
    pub async fn authorize(
        path: PathBuf,
        app: AppCredentials,
        code: &str,
        callback_url: &str,
        options: TokenStoreOptions,
    ) -> Result<Self> {
        let http = build_http(&options)?;
        let now = now_millis();
        let response =
            token::exchange_code(&http, &options.token_endpoint, &app, code, callback_url).await?;
        let file = TokenFile::from_exchange(response, now)?;
        write_atomic(&path, &file).await?;
        info!(path = %path.display(), "authorization complete, tokens written");
        Self::from_file(path, app, options, file)
    }

    fn from_file(
        path: PathBuf,
        app: AppCredentials,
        options: TokenStoreOptions,
        file: TokenFile,
    ) -> Result<Self> {
        let http = build_http(&options)?;
        Ok(Self {
            path,
            app,
            http,
            options,
            current: ArcSwap::from_pointee(BearerToken::from(&file)),
            state: Mutex::new(file),
        })
    }

    /// Rotate the access token now, regardless of its remaining lifetime.
    pub async fn force_refresh(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        self.rotate_locked(&mut state, now_millis()).await
    }

    /// Refresh token expiry as unix milliseconds.
    pub async fn refresh_expires_at(&self) -> u64 {
        self.state.lock().await.refresh_expires_at()
    }

    async fn check(&self) -> RefreshOutcome {
        let mut state = self.state.lock().await;
        let now = now_millis();

        // `current` mirrors `state` while the lock is held
        let token = self.current.load_full();
        if !token.expires_within(self.options.refresh_window, now) {
            debug!(expires_at = token.expires_at(), "access token still valid");
            return RefreshOutcome::NoActionNeeded;
        }

        if state.refresh_expires_at() <= now {
            return RefreshOutcome::Failed(Error::ReauthRequired(format!(
                "refresh token expired at {}",
                state.refresh_expires_at()
            )));
        }

        match self.rotate_locked(&mut state, now).await {
            Ok(()) => RefreshOutcome::Rotated,
            Err(e) => RefreshOutcome::Failed(e),
        }
    }

    /// Run the refresh grant and publish the result. Caller holds the state lock.
    async fn rotate_locked(&self, state: &mut TokenFile, now: u64) -> Result<()> {
        let refresh = state.refresh_token()?;
        let response =
            token::refresh_token(&self.http, &self.options.token_endpoint, &self.app, refresh)
                .await?;
        let next = state.rotated(response, now);

        // The grant already happened upstream; publish even if persisting fails
        if let Err(e) = write_atomic(&self.path, &next).await {
            warn!(error = %e, "failed to persist refreshed tokens");
        }

        self.current.store(Arc::new(BearerToken::from(&next)));
        info!(expires_at = next.access_expires_at(), "access token rotated");
        *state = next;
        Ok(())
    }
}

impl CredentialStore for TokenStore {
    fn refresh_if_needed(&self) -> Pin<Box<dyn Future<Output = RefreshOutcome> + Send + '_>> {
        Box::pin(self.check())
    }

    fn current_token(&self) -> BearerToken {
        self.current.load().as_ref().clone()
    }
}

fn build_http(options: &TokenStoreOptions) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(options.request_timeout)
        .build()
        .map_err(|e| Error::Http(format!("building token client: {e}")))
}
