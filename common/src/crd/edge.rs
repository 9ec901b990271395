//! HTTPS and TLS edges
//!
//! An edge is a termination point on the edge network bound to one or more
//! `host:port` pairs. HTTPS edges carry an ordered list of routes, each
//! pointing at a tunnel group through a label selector.

use crate::crd::modules::{
    EndpointCircuitBreaker, EndpointCompression, EndpointHeaders, EndpointIPPolicy,
    EndpointMutualTLS, EndpointWebhookVerification,
};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Route match type for path prefixes
pub const MATCH_TYPE_PATH_PREFIX: &str = "path_prefix";

/// Route match type for exact paths
pub const MATCH_TYPE_EXACT_PATH: &str = "exact_path";

// =============================================================================
// HTTPSEdge
// =============================================================================

#[derive(CustomResource, Debug, PartialEq, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "ingress.rauta.io",
    version = "v1alpha1",
    kind = "HTTPSEdge",
    singular = "httpsedge",
    plural = "httpsedges",
    status = "HTTPSEdgeStatus",
    derive = "PartialEq",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct HTTPSEdgeSpec {
    #[serde(default)]
    pub hostports: Vec<String>,

    #[serde(default)]
    pub routes: Vec<HTTPSEdgeRouteSpec>,

    pub tls_termination: Option<TLSTerminationAtEdge>,

    pub mutual_tls: Option<EndpointMutualTLS>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub metadata: String,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct HTTPSEdgeRouteSpec {
    /// Path to match, interpreted according to `match_type`
    #[serde(rename = "match")]
    pub match_path: String,

    /// `path_prefix` or `exact_path`
    pub match_type: String,

    #[serde(default)]
    pub backend: TunnelGroupBackend,

    pub compression: Option<EndpointCompression>,
    pub ip_restriction: Option<EndpointIPPolicy>,
    pub headers: Option<EndpointHeaders>,
    pub circuit_breaker: Option<EndpointCircuitBreaker>,
    pub oauth: Option<Value>,
    pub oidc: Option<Value>,
    pub saml: Option<Value>,
    pub webhook_verification: Option<EndpointWebhookVerification>,

    /// Compiled traffic policy document
    pub policy: Option<Value>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub metadata: String,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct TLSTerminationAtEdge {
    #[serde(default)]
    pub min_version: String,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct HTTPSEdgeStatus {
    pub id: Option<String>,
    pub uri: Option<String>,
    #[serde(default)]
    pub routes: Vec<HTTPSEdgeRouteStatus>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct HTTPSEdgeRouteStatus {
    pub id: Option<String>,
    #[serde(rename = "match")]
    pub match_path: String,
    pub match_type: String,
    pub backend_id: Option<String>,
}

// =============================================================================
// Tunnel group backend (route -> tunnel join)
// =============================================================================

/// Selects the tunnels that serve a route by label equality
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct TunnelGroupBackend {
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub metadata: String,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct TunnelGroupBackendStatus {
    pub id: Option<String>,
}

// =============================================================================
// TLSEdge
// =============================================================================

#[derive(CustomResource, Debug, PartialEq, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "ingress.rauta.io",
    version = "v1alpha1",
    kind = "TLSEdge",
    singular = "tlsedge",
    plural = "tlsedges",
    status = "TLSEdgeStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct TLSEdgeSpec {
    #[serde(default)]
    pub hostports: Vec<String>,

    #[serde(default)]
    pub backend: TunnelGroupBackend,

    pub ip_restriction: Option<EndpointIPPolicy>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub metadata: String,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct TLSEdgeStatus {
    pub id: Option<String>,
    pub uri: Option<String>,
    #[serde(default)]
    pub hostports: Vec<String>,
    #[serde(default)]
    pub backend: TunnelGroupBackendStatus,
}
