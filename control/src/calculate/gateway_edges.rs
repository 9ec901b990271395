//! HTTPS edge calculator (Gateway API sources)
//!
//! A Gateway contributes only HTTPS listeners on port 443 whose hostname is
//! one of the gateway domains. An HTTPRoute attached to such a Gateway gets
//! one edge covering the overlap of its hostnames with those listeners, keyed
//! by the first overlapping domain. Each route rule then becomes an edge
//! route with a policy compiled from its filters.

use super::backend::{backend_ref_kind, KIND_SERVICE, PROTOCOL_HTTPS};
use super::edges::{edge_scaffold, upsert_route, HTTPS_PORT_SUFFIX};
use super::filters::compile_route_policy;
use super::Calculator;
use common::crd::edge::{MATCH_TYPE_EXACT_PATH, MATCH_TYPE_PATH_PREFIX};
use common::crd::{Domain, HTTPSEdge, HTTPSEdgeRouteSpec, TunnelGroupBackend};
use gateway_api::apis::standard::gateways::{
    Gateway, GatewayListeners, GatewayListenersAllowedRoutesNamespacesFrom,
};
use gateway_api::apis::standard::httproutes::{
    HTTPRoute, HTTPRouteParentRefs, HTTPRouteRules, HTTPRouteRulesMatchesPathType,
};
use kube::ResourceExt;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, error, info, warn};

const HTTPS_PORT: i32 = 443;
const KIND_GATEWAY: &str = "Gateway";
const KIND_HTTPROUTE: &str = "HTTPRoute";

/// True when `parent` points at `gateway`. The parent namespace defaults to
/// the route's own namespace.
fn targets_gateway(parent: &HTTPRouteParentRefs, route: &HTTPRoute, gateway: &Gateway) -> bool {
    if parent.kind.as_deref().is_some_and(|k| k != KIND_GATEWAY) {
        return false;
    }
    let parent_namespace = parent
        .namespace
        .clone()
        .unwrap_or_else(|| route.namespace().unwrap_or_default());
    parent.name == gateway.name_any() && parent_namespace == gateway.namespace().unwrap_or_default()
}

/// Whether a listener's `allowedRoutes.kinds` admits HTTPRoutes
fn admits_httproutes(listener: &GatewayListeners) -> bool {
    match listener.allowed_routes.as_ref().and_then(|a| a.kinds.as_ref()) {
        Some(kinds) if !kinds.is_empty() => kinds.iter().any(|k| k.kind == KIND_HTTPROUTE),
        _ => true,
    }
}

/// Whether a listener's `allowedRoutes.namespaces` admits the route
///
/// Label selectors are not evaluated: namespaces are not mirrored, so a
/// `Selector` listener admits nothing.
fn admits_namespace(listener: &GatewayListeners, route: &HTTPRoute, gateway: &Gateway) -> bool {
    let from = listener
        .allowed_routes
        .as_ref()
        .and_then(|a| a.namespaces.as_ref())
        .and_then(|n| n.from.as_ref());

    match from {
        None | Some(GatewayListenersAllowedRoutesNamespacesFrom::All) => true,
        Some(GatewayListenersAllowedRoutesNamespacesFrom::Same) => {
            route.namespace() == gateway.namespace()
        }
        Some(GatewayListenersAllowedRoutesNamespacesFrom::Selector) => {
            warn!(
                "Gateway {}/{} listener {} uses a namespace selector, which is not supported; route {}/{} not admitted",
                gateway.namespace().unwrap_or_default(),
                gateway.name_any(),
                listener.name,
                route.namespace().unwrap_or_default(),
                route.name_any()
            );
            false
        }
    }
}

/// Path and match type of a rule: the first match with a path wins,
/// defaulting to prefix `/`
fn rule_path(rule: &HTTPRouteRules) -> (String, &'static str) {
    rule.matches
        .iter()
        .flatten()
        .find_map(|m| m.path.as_ref())
        .map(|path| {
            let value = path.value.clone().unwrap_or_else(|| "/".to_string());
            let match_type = if matches!(path.r#type, Some(HTTPRouteRulesMatchesPathType::Exact)) {
                MATCH_TYPE_EXACT_PATH
            } else {
                MATCH_TYPE_PATH_PREFIX
            };
            (value, match_type)
        })
        .unwrap_or_else(|| ("/".to_string(), MATCH_TYPE_PATH_PREFIX))
}

impl Calculator<'_> {
    pub(crate) fn gateway_edges(
        &self,
        gateway_domains: &BTreeMap<String, Domain>,
    ) -> BTreeMap<String, HTTPSEdge> {
        let gateways = self.store.list_gateways();
        let routes = self.store.list_httproutes();

        let mut edges = BTreeMap::new();
        for gateway in &gateways {
            let usable: BTreeSet<&str> = gateway
                .spec
                .listeners
                .iter()
                .filter(|l| l.protocol == PROTOCOL_HTTPS && l.port == HTTPS_PORT)
                .filter_map(|l| l.hostname.as_deref())
                .filter(|h| gateway_domains.contains_key(*h))
                .collect();

            if usable.is_empty() {
                info!(
                    "No usable domains in gateway {}/{}, may be missing an HTTPS listener",
                    gateway.namespace().unwrap_or_default(),
                    gateway.name_any()
                );
                continue;
            }

            for route in &routes {
                let mut route_domains: Vec<String> = Vec::new();
                for parent in route.spec.parent_refs.iter().flatten() {
                    if !targets_gateway(parent, route, gateway) {
                        continue;
                    }
                    route_domains.extend(
                        route
                            .spec
                            .hostnames
                            .iter()
                            .flatten()
                            .filter(|h| usable.contains(h.as_str()))
                            .cloned(),
                    );
                }
                let Some(first) = route_domains.first().cloned() else {
                    continue;
                };

                let edge = edge_scaffold(
                    format!("{}-", route.name_any()),
                    &route.namespace().unwrap_or_default(),
                    self.settings.controller_labels(),
                    route_domains
                        .iter()
                        .map(|d| format!("{}{}", d, HTTPS_PORT_SUFFIX))
                        .collect(),
                    &self.settings.gateway_metadata,
                );
                edges.insert(first, edge);
            }
        }

        for gateway in &gateways {
            for listener in &gateway.spec.listeners {
                let Some(hostname) = listener.hostname.as_deref() else {
                    continue;
                };
                if !admits_httproutes(listener) {
                    continue;
                }
                let Some(edge) = edges.get_mut(hostname) else {
                    continue;
                };

                for route in &routes {
                    for parent in route.spec.parent_refs.iter().flatten() {
                        if !targets_gateway(parent, route, gateway)
                            || !admits_namespace(listener, route, gateway)
                        {
                            continue;
                        }
                        if !route.spec.hostnames.iter().flatten().any(|h| h == hostname) {
                            continue;
                        }
                        for rule in route.spec.rules.iter().flatten() {
                            if let Some(edge_route) = self.gateway_route(route, rule) {
                                upsert_route(&mut edge.spec.routes, edge_route);
                            }
                        }
                    }
                }
            }
        }
        edges
    }

    /// Translate one HTTPRoute rule; `None` when it must be skipped
    fn gateway_route(&self, route: &HTTPRoute, rule: &HTTPRouteRules) -> Option<HTTPSEdgeRouteSpec> {
        let namespace = route.namespace().unwrap_or_default();
        let (match_path, match_type) = rule_path(rule);

        let policy = match compile_route_policy(self.store, rule, &namespace) {
            Ok(policy) => policy,
            Err(e) => {
                error!(
                    "HTTPRoute {}/{}: failed to compile filters for {}: {}",
                    namespace,
                    route.name_any(),
                    match_path,
                    e
                );
                return None;
            }
        };

        // only the first backendRef is used; weighted backends are not supported
        let mut backend = TunnelGroupBackend::default();
        if let Some(backend_ref) = rule.backend_refs.as_ref().and_then(|refs| refs.first()) {
            if backend_ref_kind(backend_ref) == KIND_SERVICE {
                match self.resolve_gateway_backend(backend_ref, &namespace) {
                    Ok(resolved) => backend.labels = resolved.labels(&namespace),
                    Err(e) => {
                        error!(
                            "HTTPRoute {}/{}: could not resolve backend {}: {}",
                            namespace,
                            route.name_any(),
                            backend_ref.name,
                            e
                        );
                        return None;
                    }
                }
            } else {
                debug!(
                    "HTTPRoute {}/{}: backend kind {} not supported",
                    namespace,
                    route.name_any(),
                    backend_ref_kind(backend_ref)
                );
            }
        }

        Some(HTTPSEdgeRouteSpec {
            match_path,
            match_type: match_type.to_string(),
            backend,
            policy,
            metadata: self.settings.gateway_metadata.clone(),
            ..Default::default()
        })
    }
}
