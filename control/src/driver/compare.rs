//! Equality over the fields the driver owns
//!
//! Used to decide update-or-skip. Absent and empty values compare equal so a
//! server that defaults `null` to `""` (or drops empty objects) does not
//! cause an update on every pass.

use common::crd::{DomainSpec, HTTPSEdgeRouteSpec, HTTPSEdgeSpec, TunnelSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use serde_json::Value;

fn value_eq(a: &Option<Value>, b: &Option<Value>) -> bool {
    let a = a.as_ref().filter(|v| !v.is_null());
    let b = b.as_ref().filter(|v| !v.is_null());
    a == b
}

fn str_eq(a: &Option<String>, b: &Option<String>) -> bool {
    a.as_deref().unwrap_or_default() == b.as_deref().unwrap_or_default()
}

pub fn domain_spec_eq(a: &DomainSpec, b: &DomainSpec) -> bool {
    a.domain == b.domain && a.description == b.description && a.metadata == b.metadata
}

pub fn route_eq(a: &HTTPSEdgeRouteSpec, b: &HTTPSEdgeRouteSpec) -> bool {
    a.match_path == b.match_path
        && a.match_type == b.match_type
        && a.backend.labels == b.backend.labels
        && a.compression == b.compression
        && a.ip_restriction == b.ip_restriction
        && a.headers == b.headers
        && a.circuit_breaker == b.circuit_breaker
        && value_eq(&a.oauth, &b.oauth)
        && value_eq(&a.oidc, &b.oidc)
        && value_eq(&a.saml, &b.saml)
        && a.webhook_verification == b.webhook_verification
        && value_eq(&a.policy, &b.policy)
        && a.metadata == b.metadata
}

pub fn edge_spec_eq(a: &HTTPSEdgeSpec, b: &HTTPSEdgeSpec) -> bool {
    a.hostports == b.hostports
        && a.routes.len() == b.routes.len()
        && a.routes.iter().zip(&b.routes).all(|(x, y)| route_eq(x, y))
        && a.tls_termination == b.tls_termination
        && a.mutual_tls == b.mutual_tls
        && a.description == b.description
        && a.metadata == b.metadata
}

pub fn tunnel_spec_eq(a: &TunnelSpec, b: &TunnelSpec) -> bool {
    let protocol = |s: &TunnelSpec| {
        s.backend_config
            .as_ref()
            .map(|c| c.protocol.clone())
            .unwrap_or_default()
    };
    a.forwards_to == b.forwards_to
        && a.labels == b.labels
        && protocol(a) == protocol(b)
        && str_eq(&a.app_protocol, &b.app_protocol)
}

/// Positional comparison on identity fields
pub fn owner_refs_eq(a: &[OwnerReference], b: &[OwnerReference]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| {
            x.uid == y.uid && x.name == y.name && x.kind == y.kind && x.api_version == y.api_version
        })
}
