//! Backend service resolution
//!
//! Maps an Ingress backend or HTTPRoute backendRef onto a concrete Service
//! port, and reads the per-port protocol hints tunnels are configured with.

use super::Calculator;
use crate::error::{Error, Result};
use common::labels::{
    backend_labels, ANNOTATION_APP_PROTOCOLS, APP_PROTOCOL_H2C, APP_PROTOCOL_HTTP2,
};
use gateway_api::apis::standard::httproutes::HTTPRouteRulesBackendRefs;
use k8s_openapi::api::core::v1::{Service, ServicePort};
use k8s_openapi::api::networking::v1::IngressServiceBackend;
use kube::ResourceExt;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

pub const PROTOCOL_HTTP: &str = "HTTP";
pub const PROTOCOL_HTTPS: &str = "HTTPS";

/// Tunnel app protocol for HTTP/2 backends
pub const APP_PROTOCOL_TUNNEL_HTTP2: &str = "http2";

pub const KIND_SERVICE: &str = "Service";

/// Kind of a backendRef, `Service` when unset
pub(crate) fn backend_ref_kind(backend: &HTTPRouteRulesBackendRefs) -> &str {
    backend.kind.as_deref().unwrap_or(KIND_SERVICE)
}

/// A Service together with the port a backend resolved to
#[derive(Debug, Clone)]
pub struct ResolvedBackend {
    pub service: Arc<Service>,
    pub port: ServicePort,
}

impl ResolvedBackend {
    pub fn service_name(&self) -> String {
        self.service.name_any()
    }

    pub fn service_uid(&self) -> String {
        self.service.uid().unwrap_or_default()
    }

    pub fn port_number(&self) -> i32 {
        self.port.port
    }

    /// Route/tunnel join labels for this backend
    pub fn labels(&self, namespace: &str) -> BTreeMap<String, String> {
        backend_labels(
            namespace,
            &self.service_uid(),
            &self.service_name(),
            self.port_number(),
        )
    }

    /// Protocol from the Service's app-protocols annotation, `HTTP` when the
    /// port is not listed
    pub fn protocol(&self) -> Result<String> {
        annotated_protocol(&self.service, self.port.name.as_deref().unwrap_or_default())
    }

    pub fn app_protocol(&self) -> Result<Option<String>> {
        port_app_protocol(&self.service, &self.port)
    }
}

impl Calculator<'_> {
    /// Resolve an Ingress service backend; the port matches by number or name
    pub(crate) fn resolve_ingress_backend(
        &self,
        backend: &IngressServiceBackend,
        namespace: &str,
    ) -> Result<ResolvedBackend> {
        let service = self.store.get::<Service>(namespace, &backend.name)?;
        let number = backend.port.as_ref().and_then(|p| p.number).unwrap_or(0);
        let name = backend
            .port
            .as_ref()
            .and_then(|p| p.name.as_deref())
            .unwrap_or_default();

        let port = find_port(&service, |port| {
            (number > 0 && port.port == number)
                || (!name.is_empty() && port.name.as_deref() == Some(name))
        })
        .ok_or_else(|| {
            Error::Lookup(format!(
                "could not find matching port for service {}/{}, backend port {}, name {}",
                namespace, backend.name, number, name
            ))
        })?;

        Ok(ResolvedBackend { service, port })
    }

    /// Resolve an HTTPRoute backendRef; cross-namespace references are not
    /// supported and the port matches by number
    pub(crate) fn resolve_gateway_backend(
        &self,
        backend: &HTTPRouteRulesBackendRefs,
        namespace: &str,
    ) -> Result<ResolvedBackend> {
        if let Some(ref_namespace) = backend.namespace.as_deref() {
            if ref_namespace != namespace {
                return Err(Error::Unsupported(format!(
                    "backendRef {} in namespace {} not supported from namespace {}",
                    backend.name, ref_namespace, namespace
                )));
            }
        }

        let service = self.store.get::<Service>(namespace, &backend.name)?;
        let number = backend.port.unwrap_or(0);
        let port = find_port(&service, |port| number > 0 && port.port == number).ok_or_else(|| {
            Error::Lookup(format!(
                "could not find matching port for service {}/{}, backend port {}",
                namespace, backend.name, number
            ))
        })?;

        Ok(ResolvedBackend { service, port })
    }
}

fn find_port(service: &Service, matches: impl Fn(&ServicePort) -> bool) -> Option<ServicePort> {
    let port = service
        .spec
        .as_ref()
        .and_then(|s| s.ports.as_ref())?
        .iter()
        .find(|p| matches(p))?
        .clone();
    debug!(
        "Found matching port for service {}: name={:?} number={}",
        service.name_any(),
        port.name,
        port.port
    );
    Some(port)
}

/// Read the `k8s.rauta.io/app-protocols` annotation for one port name
///
/// The annotation is a JSON object of port name to protocol. Only `HTTP` and
/// `HTTPS` (any case) are accepted; anything else is a configuration error.
pub fn annotated_protocol(service: &Service, port_name: &str) -> Result<String> {
    let Some(annotation) = service
        .annotations()
        .get(ANNOTATION_APP_PROTOCOLS)
        .filter(|a| !a.is_empty())
    else {
        return Ok(PROTOCOL_HTTP.to_string());
    };

    let protocols: HashMap<String, String> = serde_json::from_str(annotation).map_err(|e| {
        Error::Config(format!(
            "could not parse protocol annotation '{}' on service {}/{}: {}",
            annotation,
            service.namespace().unwrap_or_default(),
            service.name_any(),
            e
        ))
    })?;

    match protocols.get(port_name) {
        None => Ok(PROTOCOL_HTTP.to_string()),
        Some(protocol) => {
            let upper = protocol.to_uppercase();
            match upper.as_str() {
                PROTOCOL_HTTP | PROTOCOL_HTTPS => Ok(upper),
                _ => Err(Error::Config(format!(
                    "unhandled protocol annotation '{}' on service {}/{}, must be 'HTTP' or 'HTTPS'",
                    upper,
                    service.namespace().unwrap_or_default(),
                    service.name_any()
                ))),
            }
        }
    }
}

/// Map a port's `appProtocol` to the tunnel app protocol
pub fn port_app_protocol(service: &Service, port: &ServicePort) -> Result<Option<String>> {
    match port.app_protocol.as_deref() {
        None | Some("") => Ok(None),
        Some(APP_PROTOCOL_HTTP2) | Some(APP_PROTOCOL_H2C) => {
            Ok(Some(APP_PROTOCOL_TUNNEL_HTTP2.to_string()))
        }
        Some(other) => Err(Error::Config(format!(
            "unsupported appProtocol '{}' on service {}/{}, must be '{}', '{}' or empty",
            other,
            service.namespace().unwrap_or_default(),
            service.name_any(),
            APP_PROTOCOL_HTTP2,
            APP_PROTOCOL_H2C
        ))),
    }
}
