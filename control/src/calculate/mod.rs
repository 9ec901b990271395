//! Desired-state calculators
//!
//! Pure functions over a `Store` snapshot. Each pass recomputes the complete
//! set of Domains, HTTPS edges and Tunnels from the mirrored Ingress and
//! Gateway API objects; the driver then diffs the result against the
//! backing store.
//!
//! Per-object problems (bad annotations, missing backends, unsupported
//! filters) are logged and the offending route or tunnel is skipped. A
//! calculation never fails as a whole.

pub mod annotations;
pub mod backend;
pub mod domains;
pub mod edges;
pub mod filters;
pub mod gateway_edges;
pub mod tunnels;

pub use domains::DomainSet;
pub use filters::compile_route_policy;
pub use tunnels::TunnelKey;

use crate::config::ControllerConfig;
use crate::error::Result;
use crate::store::{ObjectKey, Store};
use common::crd::{HTTPSEdge, Tunnel};
use std::collections::BTreeMap;

/// `owned-by` value stamped on ingress-derived resources
pub const OWNER_INGRESS: &str = "rauta-ingress-controller";

/// `owned-by` value stamped on gateway-derived resources
pub const OWNER_GATEWAY: &str = "rauta-gateway-api";

const OWNED_BY_KEY: &str = "owned-by";

/// Inputs to every calculation that do not come from the mirror
#[derive(Debug, Clone)]
pub struct Settings {
    /// Namespace/name of the controller deployment
    pub manager: ObjectKey,
    pub cluster_domain: String,
    pub gateway_enabled: bool,
    /// Metadata blob for ingress-derived resources
    pub ingress_metadata: String,
    /// Metadata blob for gateway-derived resources (empty when gateway is off)
    pub gateway_metadata: String,
}

impl Settings {
    pub fn from_config(config: &ControllerConfig) -> Result<Self> {
        let gateway_metadata = if config.gateway_enabled {
            owner_metadata(OWNER_GATEWAY, &config.metadata)?
        } else {
            String::new()
        };

        Ok(Self {
            manager: ObjectKey::new(&config.manager_namespace, &config.manager_name),
            cluster_domain: config.cluster_domain.clone(),
            gateway_enabled: config.gateway_enabled,
            ingress_metadata: owner_metadata(OWNER_INGRESS, &config.metadata)?,
            gateway_metadata,
        })
    }

    /// Labels identifying objects this controller instance owns
    pub fn controller_labels(&self) -> BTreeMap<String, String> {
        common::labels::controller_labels(&self.manager.namespace, &self.manager.name)
    }
}

/// JSON metadata blob: the custom map plus `owned-by` unless already set
pub fn owner_metadata(owner: &str, custom: &BTreeMap<String, String>) -> Result<String> {
    let mut metadata = custom.clone();
    metadata
        .entry(OWNED_BY_KEY.to_string())
        .or_insert_with(|| owner.to_string());
    Ok(serde_json::to_string(&metadata)?)
}

/// Everything a full pass wants to exist
#[derive(Debug, Default)]
pub struct DesiredState {
    pub domains: DomainSet,
    /// Keyed by the edge's (first) domain
    pub edges: BTreeMap<String, HTTPSEdge>,
    pub tunnels: BTreeMap<TunnelKey, Tunnel>,
}

/// Computes desired resources from a mirror snapshot
pub struct Calculator<'a> {
    store: &'a Store,
    settings: &'a Settings,
}

impl<'a> Calculator<'a> {
    pub fn new(store: &'a Store, settings: &'a Settings) -> Self {
        Self { store, settings }
    }

    /// Domains, edges and tunnels for a full pass
    pub fn calculate(&self) -> DesiredState {
        let domains = self.domains();
        let edges = self.edges(&domains);
        let tunnels = self.tunnels();
        DesiredState {
            domains,
            edges,
            tunnels,
        }
    }

    /// Edges only, for a partial pass
    pub fn calculate_edges(&self) -> BTreeMap<String, HTTPSEdge> {
        let domains = self.domains();
        self.edges(&domains)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_owner_metadata_adds_owned_by() {
        let custom = BTreeMap::from([("team".to_string(), "edge".to_string())]);
        let blob = owner_metadata(OWNER_INGRESS, &custom).unwrap();

        let parsed: Value = serde_json::from_str(&blob).unwrap();
        assert_eq!(parsed["owned-by"], "rauta-ingress-controller");
        assert_eq!(parsed["team"], "edge");
    }

    #[test]
    fn test_owner_metadata_keeps_custom_owner() {
        let custom = BTreeMap::from([("owned-by".to_string(), "platform".to_string())]);
        let blob = owner_metadata(OWNER_GATEWAY, &custom).unwrap();

        assert_eq!(blob, r#"{"owned-by":"platform"}"#);
    }

    #[test]
    fn test_gateway_metadata_empty_when_disabled() {
        let settings = Settings::from_config(&ControllerConfig::default()).unwrap();

        assert!(settings.gateway_metadata.is_empty());
        assert_eq!(
            settings.ingress_metadata,
            r#"{"owned-by":"rauta-ingress-controller"}"#
        );
        assert_eq!(
            settings.manager,
            ObjectKey::new("rauta-system", "rauta-operator")
        );
    }
}
