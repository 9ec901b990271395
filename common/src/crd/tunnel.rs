use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A path from the edge network to a Service inside the cluster.
///
/// Identity is (namespace, service, port), carried in the object labels;
/// the object name itself is generated.
#[derive(CustomResource, Debug, PartialEq, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "ingress.rauta.io",
    version = "v1alpha1",
    kind = "Tunnel",
    singular = "tunnel",
    plural = "tunnels",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct TunnelSpec {
    /// `service.namespace.clusterDomain:port`
    pub forwards_to: String,

    /// Labels the tunnel registers with; routes select on these
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    pub backend_config: Option<BackendConfig>,

    /// `http2` when the service port asks for HTTP/2 to the upstream
    pub app_protocol: Option<String>,
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    /// `HTTP` or `HTTPS`
    pub protocol: String,
}
