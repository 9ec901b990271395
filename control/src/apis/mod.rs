//! Kubernetes and edge API integrations
//!
//! Watch adapters that feed the driver, the remote edge reconcilers and the
//! controller metrics.

pub mod edge;
pub mod metrics;
pub mod watchers;
