//! ModuleSet: reusable bundles of edge and route modules
//!
//! Ingresses reference ModuleSets by name through the
//! `k8s.rauta.io/modules` annotation. When several are listed they are merged
//! left to right and any module set on a later ModuleSet replaces the earlier
//! one wholesale.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(CustomResource, Debug, PartialEq, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "ingress.rauta.io",
    version = "v1alpha1",
    kind = "ModuleSet",
    singular = "moduleset",
    plural = "modulesets",
    shortname = "rms",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSetSpec {
    #[serde(default)]
    pub modules: ModuleSetModules,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSetModules {
    pub compression: Option<EndpointCompression>,
    pub headers: Option<EndpointHeaders>,
    pub ip_restriction: Option<EndpointIPPolicy>,
    pub circuit_breaker: Option<EndpointCircuitBreaker>,
    /// Provider specific OAuth settings, passed through untouched
    pub oauth: Option<Value>,
    pub oidc: Option<Value>,
    pub saml: Option<Value>,
    pub webhook_verification: Option<EndpointWebhookVerification>,
    pub tls_termination: Option<EndpointTLSTermination>,
    pub mutual_tls: Option<EndpointMutualTLS>,
    /// Legacy inline traffic policy
    pub policy: Option<Value>,
}

impl ModuleSetModules {
    /// Overlay `other` on top of `self`. Modules present in `other` win.
    pub fn merge(&mut self, other: &ModuleSetModules) {
        fn overlay<T: Clone>(dst: &mut Option<T>, src: &Option<T>) {
            if let Some(value) = src {
                *dst = Some(value.clone());
            }
        }

        overlay(&mut self.compression, &other.compression);
        overlay(&mut self.headers, &other.headers);
        overlay(&mut self.ip_restriction, &other.ip_restriction);
        overlay(&mut self.circuit_breaker, &other.circuit_breaker);
        overlay(&mut self.oauth, &other.oauth);
        overlay(&mut self.oidc, &other.oidc);
        overlay(&mut self.saml, &other.saml);
        overlay(&mut self.webhook_verification, &other.webhook_verification);
        overlay(&mut self.tls_termination, &other.tls_termination);
        overlay(&mut self.mutual_tls, &other.mutual_tls);
        overlay(&mut self.policy, &other.policy);
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct EndpointCompression {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct EndpointHeaders {
    pub request: Option<HeaderModification>,
    pub response: Option<HeaderModification>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct HeaderModification {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub add: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove: Vec<String>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct EndpointIPPolicy {
    /// IP policy names or ids
    #[serde(default)]
    pub policies: Vec<String>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct EndpointCircuitBreaker {
    pub tripped_duration: Option<String>,
    pub rolling_window: Option<String>,
    pub num_buckets: Option<u32>,
    pub volume_threshold: Option<u32>,
    pub error_threshold_percentage: Option<f64>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct EndpointWebhookVerification {
    pub provider: String,
    pub secret: Option<SecretKeyRef>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeyRef {
    pub name: String,
    pub key: String,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct EndpointTLSTermination {
    pub min_version: Option<String>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct EndpointMutualTLS {
    #[serde(default)]
    pub certificate_authorities: Vec<String>,
}
