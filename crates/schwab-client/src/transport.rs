//! Transport handles and rotation
//!
//! A [`TransportHandle`] wraps one `reqwest::Client` (connection pool + TLS
//! state). [`Transport`] publishes the live handle through an `ArcSwap`:
//! endpoint calls take one snapshot at call start and keep it for the whole
//! call, while the supervisor swaps in a freshly built handle after a token
//! rotation.
//!
//! Retired handles are never closed at rotation. In-flight calls hold their
//! own `Arc`, and the pool is dropped once the last of them finishes. Only
//! `release()` at teardown closes the live handle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use arc_swap::ArcSwap;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Builds the HTTP client behind each transport handle.
pub trait TransportFactory: Send + Sync {
    fn build(&self, timeout: Duration) -> Result<reqwest::Client>;
}

/// Default factory: a fresh `reqwest::Client` with its own connection pool.
#[derive(Debug, Default)]
pub struct ReqwestFactory;

impl TransportFactory for ReqwestFactory {
    fn build(&self, timeout: Duration) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::TransportBuild(e.to_string()))
    }
}

/// One opened HTTP client.
///
/// `version` is 0 for the handle opened at construction and increases by one
/// on every published rotation.
#[derive(Debug)]
pub struct TransportHandle {
    client: reqwest::Client,
    version: u64,
    closed: AtomicBool,
}

impl TransportHandle {
    fn new(client: reqwest::Client, version: u64) -> Self {
        Self {
            client,
            version,
            closed: AtomicBool::new(false),
        }
    }

    /// The underlying client, or `TransportClosed` after teardown.
    pub fn client(&self) -> Result<&reqwest::Client> {
        if self.is_closed() {
            return Err(Error::TransportClosed);
        }
        Ok(&self.client)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Publisher of the live transport handle.
///
/// Single writer (the refresh supervisor), many lock-free readers.
pub struct Transport {
    factory: Arc<dyn TransportFactory>,
    timeout: Duration,
    shared: bool,
    current: ArcSwap<TransportHandle>,
    released: AtomicBool,
}

impl Transport {
    /// Open the initial handle (version 0).
    pub fn open(factory: Arc<dyn TransportFactory>, timeout: Duration, shared: bool) -> Result<Self> {
        let client = factory.build(timeout)?;
        debug!(shared, "opened initial transport");
        Ok(Self {
            factory,
            timeout,
            shared,
            current: ArcSwap::from_pointee(TransportHandle::new(client, 0)),
            released: AtomicBool::new(false),
        })
    }

    /// Latest published handle. Never blocks.
    pub fn current(&self) -> Arc<TransportHandle> {
        self.current.load_full()
    }

    /// Handle for one endpoint call.
    ///
    /// Shared mode returns the published snapshot; otherwise a one-off handle
    /// is built for the call and dropped with it.
    pub fn checkout(&self) -> Result<Arc<TransportHandle>> {
        if self.is_released() {
            return Err(Error::TransportClosed);
        }
        if self.shared {
            return Ok(self.current());
        }
        let client = self.factory.build(self.timeout)?;
        Ok(Arc::new(TransportHandle::new(client, self.current().version())))
    }

    /// Build a new handle and publish it in place of the current one.
    ///
    /// On failure the current handle stays published. Returns the new version.
    pub fn rotate(&self) -> Result<u64> {
        if self.is_released() {
            return Err(Error::TransportClosed);
        }
        let client = self.factory.build(self.timeout)?;
        let version = self.current.load().version() + 1;
        self.current
            .store(Arc::new(TransportHandle::new(client, version)));
        crate::metrics::record_rotation(version);
        Ok(version)
    }

    /// Close the live handle. Later checkouts fail with `TransportClosed`.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        let handle = self.current.load();
        handle.close();
        info!(version = handle.version(), "transport released");
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    pub fn is_shared(&self) -> bool {
        self.shared
    }
}
