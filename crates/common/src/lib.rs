//! Types shared by the Schwab client crates and the operator CLI

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
