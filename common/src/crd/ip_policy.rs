use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A set of CIDR allow/deny rules held by the edge network.
///
/// Edges refer to a policy by this object's name or by the remote id
/// recorded in `status.id`.
#[derive(CustomResource, Debug, PartialEq, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "ingress.rauta.io",
    version = "v1alpha1",
    kind = "IPPolicy",
    singular = "ippolicy",
    plural = "ippolicies",
    status = "IPPolicyStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct IPPolicySpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub metadata: String,

    #[serde(default)]
    pub rules: Vec<IPPolicyRule>,
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct IPPolicyRule {
    pub cidr: String,

    /// `allow` or `deny`
    pub action: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct IPPolicyStatus {
    /// Remote policy id, empty until the policy exists on the edge network
    pub id: Option<String>,
}

impl IPPolicy {
    /// Remote id, if the policy has been created remotely
    pub fn remote_id(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.id.as_deref())
            .filter(|id| !id.is_empty())
    }
}
