//! Custom resource definitions
//!
//! All RAUTA resources live in `ingress.rauta.io/v1alpha1`.

pub mod domain;
pub mod edge;
pub mod ip_policy;
pub mod modules;
pub mod traffic_policy;
pub mod tunnel;

pub use domain::{hyphenated_domain_name, Domain, DomainSpec, DomainStatus};
pub use edge::{
    HTTPSEdge, HTTPSEdgeRouteSpec, HTTPSEdgeSpec, HTTPSEdgeStatus, TLSEdge, TLSEdgeSpec,
    TLSEdgeStatus, TunnelGroupBackend, TunnelGroupBackendStatus,
};
pub use ip_policy::{IPPolicy, IPPolicyRule, IPPolicySpec, IPPolicyStatus};
pub use modules::{ModuleSet, ModuleSetModules, ModuleSetSpec};
pub use traffic_policy::{TrafficPolicy as TrafficPolicyResource, TrafficPolicySpec};
pub use tunnel::{BackendConfig, Tunnel, TunnelSpec};

/// API group for RAUTA resources
pub const GROUP: &str = "ingress.rauta.io";

/// API version for RAUTA resources
pub const VERSION: &str = "v1alpha1";
