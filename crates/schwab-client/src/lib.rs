//! Schwab API client with a supervised credential lifecycle
//!
//! A [`Client`] owns one HTTP transport and reads bearer tokens from a
//! [`CredentialStore`]. While the client is active a background supervisor
//! checks the store on a fixed interval; whenever the store rotates its
//! tokens, a fresh transport is built and published atomically.
//!
//! Lifecycle:
//! 1. `Client::new` validates config and opens the initial transport
//! 2. `Client::enter` starts the supervisor (`Idle` → `Running`)
//! 3. Endpoint calls snapshot the current transport and token per request
//! 4. `ActiveClient::exit` cancels the supervisor, waits (bounded), and
//!    releases the transport; later calls fail with `TransportClosed`

pub mod client;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod metrics;
pub mod request;
pub mod supervisor;
pub mod transport;

#[cfg(test)]
mod testing;

pub use client::{ActiveClient, Client};
pub use config::ClientConfig;
pub use endpoints::PriceHistoryQuery;
pub use error::{Error, Result};
pub use request::{ApiResponse, Params, ResponseBody, TimeFormat, format_list, format_time};
pub use supervisor::{Supervisor, SupervisorState};
pub use transport::{ReqwestFactory, Transport, TransportFactory, TransportHandle};

pub use schwab_auth::{BearerToken, CredentialStore, RefreshOutcome, TokenStore};
