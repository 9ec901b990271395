//! Tunnel calculator
//!
//! One tunnel per (namespace, service, port) backend, regardless of how many
//! ingress paths or route rules point at it. Every contributing object is
//! recorded as an owner reference; owners are kept sorted by UID so the
//! driver can compare them positionally.

use super::backend::{backend_ref_kind, ResolvedBackend, KIND_SERVICE};
use super::Calculator;
use common::crd::{BackendConfig, Tunnel, TunnelSpec};
use common::labels::{tunnel_labels, PORT, SERVICE};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use tracing::{debug, error};

/// Identity of a tunnel: the backend it forwards to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TunnelKey {
    pub namespace: String,
    pub service: String,
    pub port: String,
}

impl TunnelKey {
    pub fn new(namespace: impl Into<String>, service: impl Into<String>, port: impl ToString) -> Self {
        Self {
            namespace: namespace.into(),
            service: service.into(),
            port: port.to_string(),
        }
    }

    /// Key of an existing tunnel, read from its object labels
    pub fn of(tunnel: &Tunnel) -> Self {
        let labels = tunnel.labels();
        Self::new(
            tunnel.namespace().unwrap_or_default(),
            labels.get(SERVICE).cloned().unwrap_or_default(),
            labels.get(PORT).cloned().unwrap_or_default(),
        )
    }
}

/// Owner reference pointing at a mirrored object
pub fn owner_reference<K: Resource<DynamicType = ()>>(owner: &K) -> OwnerReference {
    OwnerReference {
        api_version: K::api_version(&()).into_owned(),
        kind: K::kind(&()).into_owned(),
        name: owner.name_any(),
        uid: owner.uid().unwrap_or_default(),
        ..Default::default()
    }
}

/// A tunnel under construction; owners are keyed (and so ordered) by UID
struct PendingTunnel {
    tunnel: Tunnel,
    owners: BTreeMap<String, OwnerReference>,
}

impl Calculator<'_> {
    /// Desired tunnels keyed by backend identity
    pub fn tunnels(&self) -> BTreeMap<TunnelKey, Tunnel> {
        let mut pending: BTreeMap<TunnelKey, PendingTunnel> = BTreeMap::new();

        for ingress in self.store.list_managed_ingresses() {
            let namespace = ingress.namespace().unwrap_or_default();
            let rules = ingress
                .spec
                .as_ref()
                .and_then(|s| s.rules.as_ref())
                .map(Vec::as_slice)
                .unwrap_or(&[]);

            for path in rules
                .iter()
                .filter_map(|r| r.http.as_ref())
                .flat_map(|h| h.paths.iter())
            {
                let Some(service) = path.backend.service.as_ref() else {
                    continue;
                };
                match self.resolve_ingress_backend(service, &namespace) {
                    Ok(backend) => {
                        self.add_tunnel(&mut pending, &namespace, &backend, owner_reference(&*ingress))
                    }
                    Err(e) => error!(
                        "Ingress {}/{}: could not resolve tunnel backend {}: {}",
                        namespace,
                        ingress.name_any(),
                        service.name,
                        e
                    ),
                }
            }
        }

        if self.settings.gateway_enabled {
            for route in self.store.list_httproutes() {
                let namespace = route.namespace().unwrap_or_default();
                let backend_refs = route
                    .spec
                    .rules
                    .iter()
                    .flatten()
                    .flat_map(|r| r.backend_refs.iter().flatten());
                for backend_ref in backend_refs {
                    if backend_ref_kind(backend_ref) != KIND_SERVICE {
                        debug!(
                            "HTTPRoute {}/{}: no tunnel for backend kind {}",
                            namespace,
                            route.name_any(),
                            backend_ref_kind(backend_ref)
                        );
                        continue;
                    }
                    match self.resolve_gateway_backend(backend_ref, &namespace) {
                        Ok(backend) => {
                            self.add_tunnel(&mut pending, &namespace, &backend, owner_reference(&*route))
                        }
                        Err(e) => error!(
                            "HTTPRoute {}/{}: could not resolve tunnel backend {}: {}",
                            namespace,
                            route.name_any(),
                            backend_ref.name,
                            e
                        ),
                    }
                }
            }
        }

        pending
            .into_iter()
            .map(|(key, PendingTunnel { mut tunnel, owners })| {
                tunnel.metadata.owner_references = Some(owners.into_values().collect());
                (key, tunnel)
            })
            .collect()
    }

    fn add_tunnel(
        &self,
        pending: &mut BTreeMap<TunnelKey, PendingTunnel>,
        namespace: &str,
        backend: &ResolvedBackend,
        owner: OwnerReference,
    ) {
        let service = backend.service_name();
        let port = backend.port_number();
        let key = TunnelKey::new(namespace, &service, port);

        if !pending.contains_key(&key) {
            let tunnel = match self.tunnel_for(namespace, backend) {
                Ok(tunnel) => tunnel,
                Err(e) => {
                    error!(
                        "Service {}/{} port {}: invalid tunnel configuration: {}",
                        namespace, service, port, e
                    );
                    return;
                }
            };
            pending.insert(
                key.clone(),
                PendingTunnel {
                    tunnel,
                    owners: BTreeMap::new(),
                },
            );
        }

        if let Some(entry) = pending.get_mut(&key) {
            entry.owners.entry(owner.uid.clone()).or_insert(owner);
        }
    }

    fn tunnel_for(&self, namespace: &str, backend: &ResolvedBackend) -> crate::Result<Tunnel> {
        let service = backend.service_name();
        let port = backend.port_number();
        let protocol = backend.protocol()?;
        let app_protocol = backend.app_protocol()?;

        Ok(Tunnel {
            metadata: ObjectMeta {
                generate_name: Some(format!("{}-{}-", service, port)),
                namespace: Some(namespace.to_string()),
                labels: Some(tunnel_labels(
                    &self.settings.manager.namespace,
                    &self.settings.manager.name,
                    &service,
                    port,
                )),
                ..Default::default()
            },
            spec: TunnelSpec {
                forwards_to: format!(
                    "{}.{}.{}:{}",
                    service, namespace, self.settings.cluster_domain, port
                ),
                labels: backend.labels(namespace),
                backend_config: Some(BackendConfig { protocol }),
                app_protocol,
            },
        })
    }
}
