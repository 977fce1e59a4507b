//! Weather-push client.
//!
//! High-level API for pushing live and sample records to a remote server.

#[allow(clippy::module_inception)]
mod client;
mod config;
mod session;
mod wire;

pub use client::*;
pub use config::*;
pub use session::*;
pub use wire::*;
