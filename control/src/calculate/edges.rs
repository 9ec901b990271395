//! HTTPS edge calculator (Ingress sources)
//!
//! Every ingress domain gets a scaffold edge bound to `{domain}:443`. Each
//! (rule, path) pair with a service backend then contributes one route to the
//! edge of its rule's host. ModuleSet modules are copied onto the routes,
//! except TLS termination and mutual TLS which are edge-level.

use super::{Calculator, DomainSet};
use common::crd::edge::{TLSTerminationAtEdge, MATCH_TYPE_EXACT_PATH, MATCH_TYPE_PATH_PREFIX};
use common::crd::{
    HTTPSEdge, HTTPSEdgeRouteSpec, HTTPSEdgeSpec, ModuleSetModules, TunnelGroupBackend,
};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

pub const HTTPS_PORT_SUFFIX: &str = ":443";

/// Map an Ingress `pathType` to an edge route match type
pub fn match_type_for_path_type(path_type: &str) -> Option<&'static str> {
    match path_type {
        "" | "Prefix" | "ImplementationSpecific" => Some(MATCH_TYPE_PATH_PREFIX),
        "Exact" => Some(MATCH_TYPE_EXACT_PATH),
        _ => None,
    }
}

/// An unsaved edge with controller labels; the API server picks the name
pub(crate) fn edge_scaffold(
    generate_name: String,
    namespace: &str,
    labels: BTreeMap<String, String>,
    hostports: Vec<String>,
    metadata: &str,
) -> HTTPSEdge {
    HTTPSEdge {
        metadata: ObjectMeta {
            generate_name: Some(generate_name),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        spec: HTTPSEdgeSpec {
            hostports,
            metadata: metadata.to_string(),
            ..Default::default()
        },
        status: None,
    }
}

/// Insert a route, replacing an existing route with the same match and match
/// type in place
pub(crate) fn upsert_route(routes: &mut Vec<HTTPSEdgeRouteSpec>, route: HTTPSEdgeRouteSpec) {
    match routes
        .iter_mut()
        .find(|r| r.match_path == route.match_path && r.match_type == route.match_type)
    {
        Some(existing) => {
            info!(
                "Replacing existing route {} ({})",
                existing.match_path, existing.match_type
            );
            *existing = route;
        }
        None => routes.push(route),
    }
}

/// Route carrying the route-level modules of a merged ModuleSet
fn route_with_modules(
    match_path: String,
    match_type: &str,
    backend: TunnelGroupBackend,
    modules: &ModuleSetModules,
    policy: Option<Value>,
    metadata: &str,
) -> HTTPSEdgeRouteSpec {
    HTTPSEdgeRouteSpec {
        match_path,
        match_type: match_type.to_string(),
        backend,
        compression: modules.compression.clone(),
        ip_restriction: modules.ip_restriction.clone(),
        headers: modules.headers.clone(),
        circuit_breaker: modules.circuit_breaker.clone(),
        oauth: modules.oauth.clone(),
        oidc: modules.oidc.clone(),
        saml: modules.saml.clone(),
        webhook_verification: modules.webhook_verification.clone(),
        policy,
        metadata: metadata.to_string(),
    }
}

impl Calculator<'_> {
    /// Desired edges keyed by domain (ingress and, when enabled, gateway)
    pub fn edges(&self, domains: &DomainSet) -> BTreeMap<String, HTTPSEdge> {
        let mut edges = BTreeMap::new();
        for domain in domains.ingress.values() {
            let edge = edge_scaffold(
                format!("{}-", domain.name_any()),
                &domain.namespace().unwrap_or_default(),
                self.settings.controller_labels(),
                vec![format!("{}{}", domain.spec.domain, HTTPS_PORT_SUFFIX)],
                &self.settings.ingress_metadata,
            );
            edges.insert(domain.spec.domain.clone(), edge);
        }

        for ingress in self.store.list_managed_ingresses() {
            self.add_ingress_routes(&ingress, &mut edges);
        }

        if self.settings.gateway_enabled {
            edges.extend(self.gateway_edges(&domains.gateway));
        }
        edges
    }

    fn add_ingress_routes(&self, ingress: &Ingress, edges: &mut BTreeMap<String, HTTPSEdge>) {
        let namespace = ingress.namespace().unwrap_or_default();
        let name = ingress.name_any();

        let modules = match self.modules_for_ingress(ingress) {
            Ok(modules) => modules,
            Err(e) => {
                error!("Failed to resolve module sets for ingress {}/{}: {}", namespace, name, e);
                return;
            }
        };
        let policy = match self.route_policy_for_ingress(ingress, &modules) {
            Ok(policy) => policy,
            Err(e) => {
                error!("Failed to resolve traffic policy for ingress {}/{}: {}", namespace, name, e);
                return;
            }
        };

        let rules = ingress
            .spec
            .as_ref()
            .and_then(|s| s.rules.as_ref())
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        for rule in rules {
            let host = rule.host.clone().unwrap_or_default();
            let Some(edge) = edges.get_mut(&host) else {
                warn!(
                    "Ingress {}/{}: no edge for rule host '{}', skipping rule",
                    namespace, name, host
                );
                continue;
            };

            if let Some(min_version) = modules
                .tls_termination
                .as_ref()
                .and_then(|t| t.min_version.clone())
            {
                edge.spec.tls_termination = Some(TLSTerminationAtEdge { min_version });
            }
            if let Some(mutual_tls) = &modules.mutual_tls {
                edge.spec.mutual_tls = Some(mutual_tls.clone());
            }

            let paths = rule.http.as_ref().map(|h| h.paths.as_slice()).unwrap_or(&[]);
            for path in paths {
                let Some(match_type) = match_type_for_path_type(&path.path_type) else {
                    error!(
                        "Ingress {}/{}: unknown path type {}, skipping path",
                        namespace, name, path.path_type
                    );
                    continue;
                };

                let Some(service) = path.backend.service.as_ref() else {
                    debug!("Ingress {}/{}: skipping non-service backend", namespace, name);
                    continue;
                };

                let backend = match self.resolve_ingress_backend(service, &namespace) {
                    Ok(backend) => backend,
                    Err(e) => {
                        error!(
                            "Ingress {}/{}: could not resolve backend {}: {}",
                            namespace, name, service.name, e
                        );
                        continue;
                    }
                };

                let route = route_with_modules(
                    path.path.clone().unwrap_or_default(),
                    match_type,
                    TunnelGroupBackend {
                        labels: backend.labels(&namespace),
                        ..Default::default()
                    },
                    &modules,
                    policy.clone(),
                    &self.settings.ingress_metadata,
                );
                upsert_route(&mut edge.spec.routes, route);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::fixtures::{
        ingress, ingress_class, ingress_path, module_set, service, settings, store,
        with_annotation, INGRESS_CONTROLLER,
    };
    use crate::store::{MirrorObject, Store};
    use common::crd::modules::{EndpointCompression, EndpointMutualTLS, EndpointTLSTermination};
    use common::labels::{ANNOTATION_MODULES, PORT, SERVICE};

    fn seeded_store() -> Store {
        let store = store(false);
        store.update(ingress_class("rauta", INGRESS_CONTROLLER, false).into_object());
        store.update(service("default", "svc", "svc-uid", &[("http", 8080, None)]).into_object());
        store
    }

    fn route(path: &str, kind: &str) -> HTTPSEdgeRouteSpec {
        HTTPSEdgeRouteSpec {
            match_path: path.to_string(),
            match_type: kind.to_string(),
            ..Default::default()
        }
    }

    // ========================================================================
    // Route bookkeeping
    // ========================================================================

    #[test]
    fn test_upsert_route_replaces_duplicate_in_place() {
        let mut routes = vec![route("/a", MATCH_TYPE_PATH_PREFIX), route("/b", MATCH_TYPE_PATH_PREFIX)];

        let mut replacement = route("/a", MATCH_TYPE_PATH_PREFIX);
        replacement.metadata = "second".to_string();
        upsert_route(&mut routes, replacement);

        assert_eq!(routes.len(), 2, "Duplicate must not be appended");
        assert_eq!(routes[0].metadata, "second", "Last occurrence wins");
        assert_eq!(routes[1].match_path, "/b", "Order is preserved");

        upsert_route(&mut routes, route("/a", MATCH_TYPE_EXACT_PATH));
        assert_eq!(routes.len(), 3, "Different match type is a different route");
    }

    #[test]
    fn test_path_type_mapping() {
        assert_eq!(match_type_for_path_type("Prefix"), Some("path_prefix"));
        assert_eq!(match_type_for_path_type("Exact"), Some("exact_path"));
        assert_eq!(
            match_type_for_path_type("ImplementationSpecific"),
            Some("path_prefix")
        );
        assert_eq!(match_type_for_path_type("Regex"), None);
    }

    // ========================================================================
    // Ingress translation
    // ========================================================================

    #[test]
    fn test_single_path_ingress_yields_one_route() {
        let store = seeded_store();
        store.update(
            ingress("default", "web", "uid-1", Some("rauta"), &[("foo.example.com", "/api", "svc", 8080)])
                .into_object(),
        );
        let settings = settings(false);
        let calc = Calculator::new(&store, &settings);
        let edges = calc.edges(&calc.domains());

        assert_eq!(edges.len(), 1);
        let edge = &edges["foo.example.com"];
        assert_eq!(edge.spec.hostports, vec!["foo.example.com:443"]);
        assert_eq!(edge.metadata.generate_name.as_deref(), Some("foo-example-com-"));
        assert_eq!(edge.labels(), &settings.controller_labels());

        assert_eq!(edge.spec.routes.len(), 1);
        let route = &edge.spec.routes[0];
        assert_eq!(route.match_path, "/api");
        assert_eq!(route.match_type, "path_prefix");
        assert_eq!(route.backend.labels[SERVICE], "svc");
        assert_eq!(route.backend.labels[PORT], "8080");
        assert_eq!(route.metadata, settings.ingress_metadata);
    }

    #[test]
    fn test_paths_with_unknown_type_or_missing_backend_are_skipped() {
        let store = seeded_store();
        let mut ing = ingress("default", "web", "uid-1", Some("rauta"), &[("foo.example.com", "/", "svc", 8080)]);
        let paths = &mut ing.spec.as_mut().unwrap().rules.as_mut().unwrap()[0]
            .http
            .as_mut()
            .unwrap()
            .paths;
        paths.push(ingress_path("/weird", "Regex", "svc", 8080));
        paths.push(ingress_path("/missing", "Exact", "nope", 8080));
        store.update(ing.into_object());

        let settings = settings(false);
        let calc = Calculator::new(&store, &settings);
        let edges = calc.edges(&calc.domains());

        let routes = &edges["foo.example.com"].spec.routes;
        assert_eq!(routes.len(), 1, "Only the resolvable prefix path survives");
        assert_eq!(routes[0].match_path, "/");
    }

    #[test]
    fn test_module_set_applied_to_edge_and_routes() {
        let store = seeded_store();
        store.update(
            module_set(
                "default",
                "secure",
                ModuleSetModules {
                    compression: Some(EndpointCompression { enabled: true }),
                    tls_termination: Some(EndpointTLSTermination {
                        min_version: Some("1.3".to_string()),
                    }),
                    mutual_tls: Some(EndpointMutualTLS {
                        certificate_authorities: vec!["ca-1".to_string()],
                    }),
                    ..Default::default()
                },
            )
            .into_object(),
        );
        store.update(
            with_annotation(
                ingress("default", "web", "uid-1", Some("rauta"), &[("foo.example.com", "/", "svc", 8080)]),
                ANNOTATION_MODULES,
                "secure",
            )
            .into_object(),
        );

        let settings = settings(false);
        let calc = Calculator::new(&store, &settings);
        let edges = calc.edges(&calc.domains());
        let edge = &edges["foo.example.com"];

        assert_eq!(
            edge.spec.tls_termination.as_ref().map(|t| t.min_version.as_str()),
            Some("1.3")
        );
        assert!(edge.spec.mutual_tls.is_some());
        assert_eq!(
            edge.spec.routes[0].compression,
            Some(EndpointCompression { enabled: true })
        );
    }

    #[test]
    fn test_missing_module_set_skips_ingress_routes() {
        let store = seeded_store();
        store.update(
            with_annotation(
                ingress("default", "web", "uid-1", Some("rauta"), &[("foo.example.com", "/", "svc", 8080)]),
                ANNOTATION_MODULES,
                "absent",
            )
            .into_object(),
        );

        let settings = settings(false);
        let calc = Calculator::new(&store, &settings);
        let edges = calc.edges(&calc.domains());

        assert!(
            edges["foo.example.com"].spec.routes.is_empty(),
            "The scaffold edge exists but carries no routes"
        );
    }
}
