//! Domain calculator

use super::Calculator;
use common::crd::{hyphenated_domain_name, Domain, DomainSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Desired domains keyed by hostname, split by source
///
/// Ingress hosts win over gateway listener hostnames: a gateway hostname
/// already claimed by an ingress is left out of `gateway`.
#[derive(Debug, Default, Clone)]
pub struct DomainSet {
    pub ingress: BTreeMap<String, Domain>,
    pub gateway: BTreeMap<String, Domain>,
}

impl DomainSet {
    pub fn all(&self) -> impl Iterator<Item = &Domain> {
        self.ingress.values().chain(self.gateway.values())
    }

    pub fn len(&self) -> usize {
        self.ingress.len() + self.gateway.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn domain(host: &str, namespace: &str, metadata: &str) -> Domain {
    Domain {
        metadata: ObjectMeta {
            name: Some(hyphenated_domain_name(host)),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: DomainSpec {
            domain: host.to_string(),
            metadata: metadata.to_string(),
            ..Default::default()
        },
        status: None,
    }
}

impl Calculator<'_> {
    pub fn domains(&self) -> DomainSet {
        let ingress = self.domains_from_ingresses();
        let gateway = if self.settings.gateway_enabled {
            self.domains_from_gateways(&ingress)
        } else {
            BTreeMap::new()
        };
        DomainSet { ingress, gateway }
    }

    fn domains_from_ingresses(&self) -> BTreeMap<String, Domain> {
        let mut domains = BTreeMap::new();
        for ingress in self.store.list_managed_ingresses() {
            let namespace = ingress.namespace().unwrap_or_default();
            let rules = ingress
                .spec
                .as_ref()
                .and_then(|s| s.rules.as_ref())
                .map(Vec::as_slice)
                .unwrap_or(&[]);

            for host in rules.iter().filter_map(|r| r.host.as_deref()) {
                if host.is_empty() {
                    continue;
                }
                domains.insert(
                    host.to_string(),
                    domain(host, &namespace, &self.settings.ingress_metadata),
                );
            }
        }
        domains
    }

    fn domains_from_gateways(
        &self,
        ingress_domains: &BTreeMap<String, Domain>,
    ) -> BTreeMap<String, Domain> {
        let mut domains = BTreeMap::new();
        for gateway in self.store.list_gateways() {
            let namespace = gateway.namespace().unwrap_or_default();
            for hostname in gateway
                .spec
                .listeners
                .iter()
                .filter_map(|l| l.hostname.as_deref())
            {
                if ingress_domains.contains_key(hostname) {
                    warn!(
                        "Gateway {}/{} listener hostname {} is already claimed by an Ingress, skipping",
                        namespace,
                        gateway.name_any(),
                        hostname
                    );
                    continue;
                }
                debug!("Gateway {}/{} claims domain {}", namespace, gateway.name_any(), hostname);
                domains.insert(
                    hostname.to_string(),
                    domain(hostname, &namespace, &self.settings.gateway_metadata),
                );
            }
        }
        domains
    }
}
