//! RAUTA Control Plane Library
//!
//! Reconciles Ingress and Gateway API resources into Domains, HTTPS edges and
//! Tunnels. The binary wires these modules to the Kubernetes API; tests drive
//! them against `client::MemoryClient`.

pub mod apis;
pub mod calculate;
pub mod client;
pub mod config;
pub mod driver;
pub mod error;
pub mod store;

#[cfg(test)]
mod fixtures;

pub use config::ControllerConfig;
pub use driver::{Driver, SyncOutcome};
pub use error::{Error, Result};
