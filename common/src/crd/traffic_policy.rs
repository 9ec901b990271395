use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named traffic policy document.
///
/// Referenced from Ingresses through the `k8s.rauta.io/traffic-policy`
/// annotation and from HTTPRoutes through `ExtensionRef` filters.
#[derive(CustomResource, Debug, PartialEq, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "ingress.rauta.io",
    version = "v1alpha1",
    kind = "TrafficPolicy",
    singular = "trafficpolicy",
    plural = "trafficpolicies",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct TrafficPolicySpec {
    /// Phase keyed (`on_http_request`, ...) or legacy (`inbound`/`outbound`)
    pub policy: Option<Value>,
}
