//! RAUTA Common Types
//!
//! Shared between the control plane and anything that reads the derived
//! resources it writes:
//!
//! - `crd`: custom resources (Domain, HTTPSEdge, TLSEdge, Tunnel, IPPolicy,
//!   ModuleSet, TrafficPolicy)
//! - `labels`: label and annotation keys that form the wire contract between
//!   routes and tunnels
//! - `policy`: the phase-keyed traffic policy document

pub mod crd;
pub mod labels;
pub mod policy;

pub use policy::{Action, PolicyError, Rule, TrafficPolicy};
