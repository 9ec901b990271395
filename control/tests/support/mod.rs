//! Shared builders for driver integration tests

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use control::client::{ClientError, Labels, MemoryClient, ObjectClient};
use control::store::{Kind, Object};
use control::{ControllerConfig, Driver};
use gateway_api::apis::standard::gatewayclasses::{GatewayClass, GatewayClassSpec};
use gateway_api::apis::standard::gateways::{Gateway, GatewayListeners, GatewaySpec};
use gateway_api::apis::standard::httproutes::{HTTPRoute, HTTPRouteParentRefs, HTTPRouteSpec};
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressClass,
    IngressClassSpec, IngressRule, IngressServiceBackend, IngressSpec, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Notify, Semaphore};

pub const INGRESS_CONTROLLER: &str = "rauta.io/ingress-controller";
pub const GATEWAY_CONTROLLER: &str = "rauta.io/gateway-controller";

pub fn config(gateway_enabled: bool) -> ControllerConfig {
    ControllerConfig {
        gateway_enabled,
        ..Default::default()
    }
}

pub fn driver(gateway_enabled: bool) -> Driver {
    Driver::new(&config(gateway_enabled)).unwrap()
}

pub fn meta(namespace: &str, name: &str, uid: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: (!namespace.is_empty()).then(|| namespace.to_string()),
        uid: (!uid.is_empty()).then(|| uid.to_string()),
        ..Default::default()
    }
}

pub fn ingress_class() -> IngressClass {
    IngressClass {
        metadata: meta("", "rauta", ""),
        spec: Some(IngressClassSpec {
            controller: Some(INGRESS_CONTROLLER.to_string()),
            ..Default::default()
        }),
    }
}

/// Service with named ports
pub fn service(namespace: &str, name: &str, uid: &str, ports: &[(&str, i32)]) -> Service {
    Service {
        metadata: meta(namespace, name, uid),
        spec: Some(ServiceSpec {
            ports: Some(
                ports
                    .iter()
                    .map(|(port_name, port)| ServicePort {
                        name: Some(port_name.to_string()),
                        port: *port,
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Ingress of class `rauta` with one Prefix path per (host, path, service, port)
pub fn ingress(
    namespace: &str,
    name: &str,
    uid: &str,
    paths: &[(&str, &str, &str, i32)],
) -> Ingress {
    Ingress {
        metadata: meta(namespace, name, uid),
        spec: Some(IngressSpec {
            ingress_class_name: Some("rauta".to_string()),
            rules: Some(
                paths
                    .iter()
                    .map(|(host, path, svc, port)| IngressRule {
                        host: Some(host.to_string()),
                        http: Some(HTTPIngressRuleValue {
                            paths: vec![HTTPIngressPath {
                                path: Some(path.to_string()),
                                path_type: "Prefix".to_string(),
                                backend: IngressBackend {
                                    service: Some(IngressServiceBackend {
                                        name: svc.to_string(),
                                        port: Some(ServiceBackendPort {
                                            number: Some(*port),
                                            ..Default::default()
                                        }),
                                    }),
                                    ..Default::default()
                                },
                            }],
                        }),
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn gateway_class() -> GatewayClass {
    GatewayClass::new(
        "rauta",
        GatewayClassSpec {
            controller_name: GATEWAY_CONTROLLER.to_string(),
            ..Default::default()
        },
    )
}

/// Gateway with one HTTPS/443 listener for `hostname`
pub fn gateway(namespace: &str, name: &str, hostname: &str) -> Gateway {
    let mut gw = Gateway::new(
        name,
        GatewaySpec {
            gateway_class_name: "rauta".to_string(),
            listeners: vec![GatewayListeners {
                name: "https".to_string(),
                hostname: Some(hostname.to_string()),
                port: 443,
                protocol: "HTTPS".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        },
    );
    gw.metadata.namespace = Some(namespace.to_string());
    gw
}

/// HTTPRoute with one PathPrefix rule forwarding to `service:port`
#[allow(clippy::too_many_arguments)]
pub fn httproute(
    namespace: &str,
    name: &str,
    uid: &str,
    gateway: &str,
    hostname: &str,
    path: &str,
    service: &str,
    port: i32,
) -> HTTPRoute {
    let mut route = HTTPRoute::new(
        name,
        HTTPRouteSpec {
            parent_refs: Some(vec![HTTPRouteParentRefs {
                name: gateway.to_string(),
                ..Default::default()
            }]),
            hostnames: Some(vec![hostname.to_string()]),
            rules: Some(vec![serde_json::from_value(serde_json::json!({
                "matches": [{"path": {"type": "PathPrefix", "value": path}}],
                "backendRefs": [{"name": service, "port": port}]
            }))
            .unwrap()]),
            ..Default::default()
        },
    );
    route.metadata.namespace = Some(namespace.to_string());
    route.metadata.uid = Some(uid.to_string());
    route
}

/// A memory client whose first Domain list blocks until `open` is called
pub struct GatedClient {
    pub inner: MemoryClient,
    armed: AtomicBool,
    pub entered: Notify,
    gate: Semaphore,
}

impl GatedClient {
    pub fn new() -> Self {
        Self {
            inner: MemoryClient::new(),
            armed: AtomicBool::new(true),
            entered: Notify::new(),
            gate: Semaphore::new(0),
        }
    }

    pub fn open(&self) {
        self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }
}

#[async_trait]
impl ObjectClient for GatedClient {
    async fn list(&self, kind: Kind, selector: Option<&Labels>) -> Result<Vec<Object>, ClientError> {
        if kind == Kind::Domain && self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            let _permit = self.gate.acquire().await;
        }
        self.inner.list(kind, selector).await
    }

    async fn create(&self, obj: &Object) -> Result<Object, ClientError> {
        self.inner.create(obj).await
    }

    async fn update(&self, obj: &Object) -> Result<Object, ClientError> {
        self.inner.update(obj).await
    }

    async fn update_status(&self, obj: &Object) -> Result<(), ClientError> {
        self.inner.update_status(obj).await
    }

    async fn delete(&self, obj: &Object) -> Result<(), ClientError> {
        self.inner.delete(obj).await
    }

    async fn patch_labels(&self, obj: &Object, labels: &Labels) -> Result<(), ClientError> {
        self.inner.patch_labels(obj, labels).await
    }
}
