//! Label and annotation keys
//!
//! Labels join routes to tunnels (`backend_labels`) and mark objects as
//! owned by a controller instance (`controller_labels`). External tooling
//! selects on these keys, so they must not change.

use std::collections::BTreeMap;

// =============================================================================
// Labels
// =============================================================================

pub const CONTROLLER_NAMESPACE: &str = "k8s.rauta.io/controller-namespace";
pub const CONTROLLER_NAME: &str = "k8s.rauta.io/controller-name";
pub const NAMESPACE: &str = "k8s.rauta.io/namespace";
pub const SERVICE_UID: &str = "k8s.rauta.io/service-uid";
pub const SERVICE: &str = "k8s.rauta.io/service";
pub const PORT: &str = "k8s.rauta.io/port";

// =============================================================================
// Annotations
// =============================================================================

/// Comma separated ModuleSet names on an Ingress
pub const ANNOTATION_MODULES: &str = "k8s.rauta.io/modules";

/// TrafficPolicy name on an Ingress
pub const ANNOTATION_TRAFFIC_POLICY: &str = "k8s.rauta.io/traffic-policy";

/// JSON map of Service port name to `HTTP`/`HTTPS`
pub const ANNOTATION_APP_PROTOCOLS: &str = "k8s.rauta.io/app-protocols";

/// Legacy ingress class annotation
pub const ANNOTATION_INGRESS_CLASS: &str = "kubernetes.io/ingress.class";

/// Marks an IngressClass as the cluster default
pub const ANNOTATION_DEFAULT_INGRESS_CLASS: &str = "ingressclass.kubernetes.io/is-default-class";

/// Service port `appProtocol` values that select HTTP/2 upstreams
pub const APP_PROTOCOL_HTTP2: &str = "k8s.rauta.io/http2";
pub const APP_PROTOCOL_H2C: &str = "kubernetes.io/h2c";

/// Labels stamped on every edge owned by a controller instance
pub fn controller_labels(namespace: &str, name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (CONTROLLER_NAMESPACE.to_string(), namespace.to_string()),
        (CONTROLLER_NAME.to_string(), name.to_string()),
    ])
}

/// Object labels for a tunnel: ownership plus the (service, port) identity
pub fn tunnel_labels(
    namespace: &str,
    name: &str,
    service: &str,
    port: i32,
) -> BTreeMap<String, String> {
    let mut labels = controller_labels(namespace, name);
    labels.insert(SERVICE.to_string(), service.to_string());
    labels.insert(PORT.to_string(), port.to_string());
    labels
}

/// Labels a route selects and a tunnel registers with
pub fn backend_labels(
    namespace: &str,
    service_uid: &str,
    service: &str,
    port: i32,
) -> BTreeMap<String, String> {
    BTreeMap::from([
        (NAMESPACE.to_string(), namespace.to_string()),
        (SERVICE_UID.to_string(), service_uid.to_string()),
        (SERVICE.to_string(), service.to_string()),
        (PORT.to_string(), port.to_string()),
    ])
}
