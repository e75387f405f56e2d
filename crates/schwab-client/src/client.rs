//! Client facade and its scoped lifetime
//!
//! [`Client`] wires a credential store to a transport. It is constructed
//! eagerly (config validated first, then the initial transport opened) and
//! becomes active only inside a scope:
//!
//! - [`Client::enter`] starts the refresh supervisor and returns an [`ActiveClient`]
//! - [`ActiveClient::exit`] stops the supervisor (bounded wait), then releases the transport
//! - dropping an `ActiveClient` without `exit` (early return, panic) still
//!   aborts the supervisor and releases the transport
//! - [`Client::scoped`] wraps all three around a closure

use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use schwab_auth::{BearerToken, CredentialStore};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::supervisor::{Supervisor, SupervisorState};
use crate::transport::{ReqwestFactory, Transport, TransportFactory, TransportHandle};

/// Schwab API client. Cheap to clone; clones share the transport and store.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

struct Inner {
    config: ClientConfig,
    store: Arc<dyn CredentialStore>,
    transport: Arc<Transport>,
    entered: AtomicBool,
}

impl Client {
    pub fn new(config: ClientConfig, store: Arc<dyn CredentialStore>) -> Result<Self> {
        Self::with_factory(config, store, Arc::new(ReqwestFactory))
    }

    /// Build with a custom transport factory.
    ///
    /// Configuration is validated before the factory is touched, so a bad
    /// config never opens a transport.
    pub fn with_factory(
        config: ClientConfig,
        store: Arc<dyn CredentialStore>,
        factory: Arc<dyn TransportFactory>,
    ) -> Result<Self> {
        config.validate()?;
        let transport = Transport::open(factory, config.timeout, config.use_shared_transport)?;
        info!(
            base_url = %config.base_url,
            timeout_ms = config.timeout.as_millis() as u64,
            refresh_interval_ms = config.refresh_interval.as_millis() as u64,
            shared_transport = config.use_shared_transport,
            "client initialized"
        );
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                store,
                transport: Arc::new(transport),
                entered: AtomicBool::new(false),
            }),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Transport for one call: the latest published handle in shared mode,
    /// a one-off handle otherwise.
    pub fn current_transport(&self) -> Result<Arc<TransportHandle>> {
        self.inner.transport.checkout()
    }

    pub(crate) fn transport(&self) -> &Arc<Transport> {
        &self.inner.transport
    }

    /// Snapshot of the current bearer token.
    pub fn current_token(&self) -> BearerToken {
        self.inner.store.current_token()
    }

    /// Start the refresh supervisor. A client can be entered once.
    pub fn enter(self) -> Result<ActiveClient> {
        if self.inner.entered.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyActive);
        }
        let mut supervisor = Supervisor::new(
            self.inner.store.clone(),
            self.inner.transport.clone(),
            self.inner.config.refresh_interval,
        );
        supervisor.start();
        info!("client scope entered");
        Ok(ActiveClient {
            client: self,
            supervisor: Some(supervisor),
        })
    }

    /// Run `f` inside an active scope and always tear the scope down after.
    ///
    /// Teardown problems are logged; `f`'s output is returned regardless.
    pub async fn scoped<F, Fut, T>(self, f: F) -> Result<T>
    where
        F: FnOnce(Client) -> Fut,
        Fut: Future<Output = T>,
    {
        let active = self.enter()?;
        let output = f(active.client().clone()).await;
        if let Err(e) = active.exit().await {
            warn!(error = %e, "client teardown reported an error");
        }
        Ok(output)
    }
}

/// A client inside its active scope. Derefs to [`Client`].
pub struct ActiveClient {
    client: Client,
    supervisor: Option<Supervisor>,
}

impl ActiveClient {
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn state(&self) -> SupervisorState {
        self.supervisor
            .as_ref()
            .map_or(SupervisorState::Stopped, Supervisor::state)
    }

    pub fn state_watch(&self) -> Option<watch::Receiver<SupervisorState>> {
        self.supervisor.as_ref().map(Supervisor::subscribe)
    }

    /// Stop the supervisor, then release the transport.
    ///
    /// The transport is released even if the supervisor had to be aborted;
    /// that failure is returned afterwards as `Teardown`.
    pub async fn exit(mut self) -> Result<()> {
        let stopped = match self.supervisor.take() {
            Some(supervisor) => supervisor.stop(self.client.config().stop_timeout).await,
            None => Ok(()),
        };
        self.client.inner.transport.release();
        info!("client scope exited");
        stopped
    }
}

impl Deref for ActiveClient {
    type Target = Client;

    fn deref(&self) -> &Client {
        &self.client
    }
}

impl Drop for ActiveClient {
    fn drop(&mut self) {
        if let Some(supervisor) = self.supervisor.take() {
            warn!("client scope dropped without exit, aborting supervisor");
            drop(supervisor);
            self.client.inner.transport.release();
        }
    }
}
