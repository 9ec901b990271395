use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A public hostname registered with the edge service.
///
/// Domains are created or updated by the controller but never deleted by it.
#[derive(CustomResource, Debug, PartialEq, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "ingress.rauta.io",
    version = "v1alpha1",
    kind = "Domain",
    singular = "domain",
    plural = "domains",
    status = "DomainStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct DomainSpec {
    /// The hostname, e.g. `foo.example.com` or `*.example.com`
    pub domain: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// Opaque JSON blob identifying the deployment that owns this domain
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub metadata: String,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct DomainStatus {
    pub id: Option<String>,

    /// Managed hostname assigned by the edge service
    #[serde(default)]
    pub domain: String,

    /// Set for custom domains; the record users must point their DNS at
    pub cname_target: Option<String>,

    pub region: Option<String>,

    pub uri: Option<String>,
}

/// Object name for a hostname: `*` becomes `wildcard` and dots become hyphens.
///
/// `*.example.com` -> `wildcard-example-com`
pub fn hyphenated_domain_name(host: &str) -> String {
    host.replace('*', "wildcard").replace('.', "-")
}
