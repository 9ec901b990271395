//! Object builders shared by unit tests

#![allow(clippy::unwrap_used, clippy::expect_used)]

use common::crd::{
    ModuleSet, ModuleSetModules, ModuleSetSpec, TrafficPolicyResource, TrafficPolicySpec,
};
use gateway_api::apis::standard::gatewayclasses::{GatewayClass, GatewayClassSpec};
use gateway_api::apis::standard::gateways::{Gateway, GatewayListeners, GatewaySpec};
use gateway_api::apis::standard::httproutes::{
    HTTPRoute, HTTPRouteParentRefs, HTTPRouteRules, HTTPRouteSpec,
};
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressClass,
    IngressClassSpec, IngressRule, IngressServiceBackend, IngressSpec, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::calculate::Settings;
use crate::config::ControllerConfig;
use crate::store::Store;

pub const INGRESS_CONTROLLER: &str = "rauta.io/ingress-controller";
pub const GATEWAY_CONTROLLER: &str = "rauta.io/gateway-controller";

pub fn store(gateway_enabled: bool) -> Store {
    Store::new(INGRESS_CONTROLLER, GATEWAY_CONTROLLER, gateway_enabled)
}

pub fn settings(gateway_enabled: bool) -> Settings {
    let config = ControllerConfig {
        gateway_enabled,
        ..Default::default()
    };
    Settings::from_config(&config).expect("default settings")
}

pub fn meta(namespace: &str, name: &str, uid: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: if namespace.is_empty() {
            None
        } else {
            Some(namespace.to_string())
        },
        uid: if uid.is_empty() {
            None
        } else {
            Some(uid.to_string())
        },
        ..Default::default()
    }
}

/// Service with (port name, port number, appProtocol) entries
pub fn service(
    namespace: &str,
    name: &str,
    uid: &str,
    ports: &[(&str, i32, Option<&str>)],
) -> Service {
    Service {
        metadata: meta(namespace, name, uid),
        spec: Some(ServiceSpec {
            ports: Some(
                ports
                    .iter()
                    .map(|(port_name, port, app_protocol)| ServicePort {
                        name: Some(port_name.to_string()),
                        port: *port,
                        app_protocol: app_protocol.map(str::to_string),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn ingress_path(path: &str, path_type: &str, service: &str, port: i32) -> HTTPIngressPath {
    HTTPIngressPath {
        path: Some(path.to_string()),
        path_type: path_type.to_string(),
        backend: IngressBackend {
            service: Some(IngressServiceBackend {
                name: service.to_string(),
                port: Some(ServiceBackendPort {
                    number: Some(port),
                    name: None,
                }),
            }),
            ..Default::default()
        },
    }
}

/// Ingress with one rule per (host, path, service, port) entry, Prefix paths
pub fn ingress(
    namespace: &str,
    name: &str,
    uid: &str,
    class: Option<&str>,
    paths: &[(&str, &str, &str, i32)],
) -> Ingress {
    Ingress {
        metadata: meta(namespace, name, uid),
        spec: Some(IngressSpec {
            ingress_class_name: class.map(str::to_string),
            rules: Some(
                paths
                    .iter()
                    .map(|(host, path, svc, port)| IngressRule {
                        host: Some(host.to_string()),
                        http: Some(HTTPIngressRuleValue {
                            paths: vec![ingress_path(path, "Prefix", svc, *port)],
                        }),
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn with_annotation<K: kube::Resource>(mut obj: K, key: &str, value: &str) -> K {
    obj.meta_mut()
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(key.to_string(), value.to_string());
    obj
}

pub fn ingress_class(name: &str, controller: &str, default: bool) -> IngressClass {
    let mut class = IngressClass {
        metadata: meta("", name, ""),
        spec: Some(IngressClassSpec {
            controller: Some(controller.to_string()),
            ..Default::default()
        }),
    };
    if default {
        class = with_annotation(
            class,
            common::labels::ANNOTATION_DEFAULT_INGRESS_CLASS,
            "true",
        );
    }
    class
}

pub fn gateway_class(name: &str, controller: &str) -> GatewayClass {
    let mut class = GatewayClass::new(
        name,
        GatewayClassSpec {
            controller_name: controller.to_string(),
            ..Default::default()
        },
    );
    class.metadata.uid = Some(format!("gc-{}", name));
    class
}

/// Gateway with (hostname, protocol, port) listeners
pub fn gateway(namespace: &str, name: &str, class: &str, listeners: &[(&str, &str, i32)]) -> Gateway {
    let mut gw = Gateway::new(
        name,
        GatewaySpec {
            gateway_class_name: class.to_string(),
            listeners: listeners
                .iter()
                .enumerate()
                .map(|(i, (hostname, protocol, port))| GatewayListeners {
                    name: format!("listener-{}", i),
                    hostname: Some(hostname.to_string()),
                    protocol: protocol.to_string(),
                    port: *port,
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        },
    );
    gw.metadata.namespace = Some(namespace.to_string());
    gw
}

/// HTTPRoute rule from its wire form
pub fn httproute_rule(value: Value) -> HTTPRouteRules {
    serde_json::from_value(value).expect("valid HTTPRoute rule")
}

pub fn httproute(
    namespace: &str,
    name: &str,
    uid: &str,
    gateway: &str,
    hostnames: &[&str],
    rules: Vec<HTTPRouteRules>,
) -> HTTPRoute {
    let mut route = HTTPRoute::new(
        name,
        HTTPRouteSpec {
            parent_refs: Some(vec![HTTPRouteParentRefs {
                name: gateway.to_string(),
                ..Default::default()
            }]),
            hostnames: Some(hostnames.iter().map(|h| h.to_string()).collect()),
            rules: Some(rules),
            ..Default::default()
        },
    );
    route.metadata.namespace = Some(namespace.to_string());
    route.metadata.uid = Some(uid.to_string());
    route
}

pub fn module_set(namespace: &str, name: &str, modules: ModuleSetModules) -> ModuleSet {
    let mut set = ModuleSet::new(name, ModuleSetSpec { modules });
    set.metadata.namespace = Some(namespace.to_string());
    set
}

pub fn traffic_policy(namespace: &str, name: &str, policy: Value) -> TrafficPolicyResource {
    let mut tp = TrafficPolicyResource::new(
        name,
        TrafficPolicySpec {
            policy: Some(policy),
        },
    );
    tp.metadata.namespace = Some(namespace.to_string());
    tp
}
