//! Configuration for RAUTA controller
//!
//! Loaded from `RAUTA_*` environment variables on top of defaults.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;

/// Controller configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControllerConfig {
    /// IngressClass `spec.controller` value this controller answers to
    #[serde(default = "default_controller_name")]
    pub controller_name: String,

    /// GatewayClass `spec.controllerName` value this controller answers to
    #[serde(default = "default_gateway_controller_name")]
    pub gateway_controller_name: String,

    /// Namespace of the controller deployment (stamped on owned objects)
    #[serde(default = "default_manager_namespace")]
    pub manager_namespace: String,

    /// Name of the controller deployment (stamped on owned objects)
    #[serde(default = "default_manager_name")]
    pub manager_name: String,

    /// Suffix for tunnel forwarding addresses
    #[serde(default = "default_cluster_domain")]
    pub cluster_domain: String,

    /// Watch and translate Gateway API resources (default: false)
    #[serde(default = "default_false")]
    pub gateway_enabled: bool,

    /// Skip the sync debouncer and let passes run concurrently
    #[serde(default = "default_false")]
    pub sync_allow_concurrent: bool,

    /// Custom key/values added to every derived resource's metadata blob
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,

    /// Take over objects labelled by a previous controller deployment
    #[serde(default = "default_true")]
    pub migrate_labels: bool,

    /// Base URL of the edge network API; the TLSEdge controller only runs
    /// when this is set
    #[serde(default)]
    pub edge_api_url: Option<String>,

    /// Bearer token for the edge network API
    #[serde(default, skip_serializing)]
    pub edge_api_key: Option<String>,
}

fn default_controller_name() -> String {
    "rauta.io/ingress-controller".to_string()
}

fn default_gateway_controller_name() -> String {
    "rauta.io/gateway-controller".to_string()
}

fn default_manager_namespace() -> String {
    "rauta-system".to_string()
}

fn default_manager_name() -> String {
    "rauta-operator".to_string()
}

fn default_cluster_domain() -> String {
    "svc.cluster.local".to_string()
}

fn default_false() -> bool {
    false
}

fn default_true() -> bool {
    true
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            controller_name: default_controller_name(),
            gateway_controller_name: default_gateway_controller_name(),
            manager_namespace: default_manager_namespace(),
            manager_name: default_manager_name(),
            cluster_domain: default_cluster_domain(),
            gateway_enabled: default_false(),
            sync_allow_concurrent: default_false(),
            metadata: BTreeMap::new(),
            migrate_labels: default_true(),
            edge_api_url: None,
            edge_api_key: None,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup (environment, tests)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        // Controller identity
        if let Some(val) = lookup("RAUTA_CONTROLLER_NAME") {
            config.controller_name = val;
        }
        if let Some(val) = lookup("RAUTA_GATEWAY_CONTROLLER_NAME") {
            config.gateway_controller_name = val;
        }
        if let Some(val) = lookup("RAUTA_MANAGER_NAMESPACE").or_else(|| lookup("POD_NAMESPACE")) {
            config.manager_namespace = val;
        }
        if let Some(val) = lookup("RAUTA_MANAGER_NAME") {
            config.manager_name = val;
        }
        if let Some(val) = lookup("RAUTA_CLUSTER_DOMAIN") {
            config.cluster_domain = val;
        }

        // Feature flags
        if let Some(val) = lookup("RAUTA_GATEWAY_ENABLED") {
            config.gateway_enabled = parse_bool("RAUTA_GATEWAY_ENABLED", &val)?;
        }
        if let Some(val) = lookup("RAUTA_SYNC_ALLOW_CONCURRENT") {
            config.sync_allow_concurrent = parse_bool("RAUTA_SYNC_ALLOW_CONCURRENT", &val)?;
        }
        if let Some(val) = lookup("RAUTA_MIGRATE_LABELS") {
            config.migrate_labels = parse_bool("RAUTA_MIGRATE_LABELS", &val)?;
        }

        if let Some(val) = lookup("RAUTA_METADATA") {
            config.metadata = parse_metadata(&val)?;
        }

        // Edge network API
        if let Some(val) = lookup("RAUTA_EDGE_API_URL").filter(|v| !v.trim().is_empty()) {
            let url = val.trim();
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(Error::Config(format!(
                    "RAUTA_EDGE_API_URL must start with http:// or https://, got '{}'",
                    url
                )));
            }
            config.edge_api_url = Some(url.to_string());
        }
        if let Some(val) = lookup("RAUTA_EDGE_API_KEY").filter(|v| !v.is_empty()) {
            config.edge_api_key = Some(val);
        }

        Ok(config)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    value
        .trim()
        .parse::<bool>()
        .map_err(|_| Error::Config(format!("{} must be true or false, got '{}'", key, value)))
}

/// Parse `k1=v1,k2=v2` into a map. Empty entries are ignored.
fn parse_metadata(value: &str) -> Result<BTreeMap<String, String>> {
    let mut metadata = BTreeMap::new();
    for entry in value.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (k, v) = entry.split_once('=').ok_or_else(|| {
            Error::Config(format!(
                "RAUTA_METADATA entry '{}' is not in key=value form",
                entry
            ))
        })?;
        if k.trim().is_empty() {
            return Err(Error::Config(format!(
                "RAUTA_METADATA entry '{}' has an empty key",
                entry
            )));
        }
        metadata.insert(k.trim().to_string(), v.trim().to_string());
    }
    Ok(metadata)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ControllerConfig::default();
        assert_eq!(config.controller_name, "rauta.io/ingress-controller");
        assert_eq!(config.cluster_domain, "svc.cluster.local");
        assert!(
            !config.gateway_enabled,
            "Gateway API support should be opt-in"
        );
        assert!(
            !config.sync_allow_concurrent,
            "Syncs should be debounced by default"
        );
        assert!(config.migrate_labels);
        assert_eq!(
            config.edge_api_url, None,
            "TLSEdge controller should be off without an API URL"
        );
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = ControllerConfig::from_lookup(lookup_from(&[
            ("RAUTA_MANAGER_NAME", "edge-operator"),
            ("POD_NAMESPACE", "edge"),
            ("RAUTA_GATEWAY_ENABLED", "true"),
            ("RAUTA_CLUSTER_DOMAIN", "cluster.internal"),
        ]))
        .unwrap();

        assert_eq!(config.manager_name, "edge-operator");
        assert_eq!(
            config.manager_namespace, "edge",
            "POD_NAMESPACE should be used when RAUTA_MANAGER_NAMESPACE is unset"
        );
        assert!(config.gateway_enabled);
        assert_eq!(config.cluster_domain, "cluster.internal");
    }

    #[test]
    fn test_metadata_parsing() {
        let config = ControllerConfig::from_lookup(lookup_from(&[(
            "RAUTA_METADATA",
            "team=edge, env=prod,",
        )]))
        .unwrap();

        assert_eq!(config.metadata.len(), 2);
        assert_eq!(config.metadata["team"], "edge");
        assert_eq!(config.metadata["env"], "prod");
    }

    #[test]
    fn test_malformed_values_are_config_errors() {
        let err = ControllerConfig::from_lookup(lookup_from(&[("RAUTA_METADATA", "novalue")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = ControllerConfig::from_lookup(lookup_from(&[("RAUTA_GATEWAY_ENABLED", "yes")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_edge_api_settings() {
        let config = ControllerConfig::from_lookup(lookup_from(&[
            ("RAUTA_EDGE_API_URL", " https://api.edge.example.com "),
            ("RAUTA_EDGE_API_KEY", "secret"),
        ]))
        .unwrap();
        assert_eq!(
            config.edge_api_url.as_deref(),
            Some("https://api.edge.example.com")
        );
        assert_eq!(config.edge_api_key.as_deref(), Some("secret"));

        let err = ControllerConfig::from_lookup(lookup_from(&[(
            "RAUTA_EDGE_API_URL",
            "api.edge.example.com",
        )]))
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
