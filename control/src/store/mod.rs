//! Object Mirror
//!
//! An in-memory copy of the cluster objects the engine derives state from.
//! Fed by the initial seed and then by watch events; never pruned on its own.
//!
//! ## Concurrency
//!
//! A single `RwLock` guards every kind. Writers replace whole entries and
//! readers clone `Arc` handles out under the read lock, so each list call
//! sees a consistent snapshot and never a torn write.

pub mod object;

pub use object::{Kind, MirrorObject, Object, ObjectKey};

use crate::error::{Error, Result};
use common::labels::{ANNOTATION_DEFAULT_INGRESS_CLASS, ANNOTATION_INGRESS_CLASS};
use gateway_api::apis::standard::gatewayclasses::GatewayClass;
use gateway_api::apis::standard::gateways::Gateway;
use gateway_api::apis::standard::httproutes::HTTPRoute;
use k8s_openapi::api::networking::v1::{Ingress, IngressClass};
use kube::ResourceExt;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

/// Helper to safely acquire read lock with poison recovery
pub(crate) fn safe_read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| {
        warn!("RwLock poisoned during read, recovering");
        poisoned.into_inner()
    })
}

/// Helper to safely acquire write lock with poison recovery
pub(crate) fn safe_write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| {
        warn!("RwLock poisoned during write, recovering");
        poisoned.into_inner()
    })
}

type Entries = HashMap<Kind, BTreeMap<ObjectKey, Object>>;

/// Thread-safe mirror of cluster objects, keyed by (kind, namespace, name)
#[derive(Debug)]
pub struct Store {
    objects: RwLock<Entries>,
    controller_name: String,
    gateway_controller_name: String,
    gateway_enabled: bool,
}

impl Store {
    pub fn new(
        controller_name: impl Into<String>,
        gateway_controller_name: impl Into<String>,
        gateway_enabled: bool,
    ) -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            controller_name: controller_name.into(),
            gateway_controller_name: gateway_controller_name.into(),
            gateway_enabled,
        }
    }

    pub fn controller_name(&self) -> &str {
        &self.controller_name
    }

    // =========================================================================
    // Generic operations
    // =========================================================================

    /// Insert or replace an object
    pub fn update(&self, obj: Object) {
        let kind = obj.kind();
        let key = obj.key();
        debug!("Mirror update: {} {}", kind, key);
        safe_write(&self.objects)
            .entry(kind)
            .or_default()
            .insert(key, obj);
    }

    pub fn update_typed<K: MirrorObject>(&self, obj: K) {
        self.update(obj.into_object());
    }

    /// Remove an object. Returns false if it was not present.
    pub fn delete(&self, kind: Kind, key: &ObjectKey) -> bool {
        debug!("Mirror delete: {} {}", kind, key);
        safe_write(&self.objects)
            .get_mut(&kind)
            .map(|entries| entries.remove(key).is_some())
            .unwrap_or(false)
    }

    pub fn get_object(&self, kind: Kind, key: &ObjectKey) -> Result<Object> {
        safe_read(&self.objects)
            .get(&kind)
            .and_then(|entries| entries.get(key))
            .cloned()
            .ok_or_else(|| Error::not_found(kind, key))
    }

    /// Look up a typed object; `Error::NotFound` when absent
    pub fn get<K: MirrorObject>(&self, namespace: &str, name: &str) -> Result<Arc<K>> {
        let obj = self.get_object(K::KIND, &ObjectKey::new(namespace, name))?;
        K::from_object(&obj).ok_or_else(|| Error::not_found(K::KIND, name))
    }

    /// Snapshot of every object of a kind, ordered by namespace then name
    pub fn list<K: MirrorObject>(&self) -> Vec<Arc<K>> {
        safe_read(&self.objects)
            .get(&K::KIND)
            .map(|entries| entries.values().filter_map(K::from_object).collect())
            .unwrap_or_default()
    }

    pub fn len(&self, kind: Kind) -> usize {
        safe_read(&self.objects)
            .get(&kind)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    // =========================================================================
    // Ingress queries
    // =========================================================================

    /// IngressClasses whose `spec.controller` is this controller
    pub fn list_managed_ingress_classes(&self) -> Vec<Arc<IngressClass>> {
        self.list::<IngressClass>()
            .into_iter()
            .filter(|class| {
                class
                    .spec
                    .as_ref()
                    .and_then(|s| s.controller.as_deref())
                    .map(|c| c == self.controller_name)
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Ingresses that resolve to one of our IngressClasses
    ///
    /// Class resolution: `spec.ingressClassName`, then the legacy
    /// `kubernetes.io/ingress.class` annotation, then any of our classes
    /// marked as the cluster default.
    pub fn list_managed_ingresses(&self) -> Vec<Arc<Ingress>> {
        let classes = self.list_managed_ingress_classes();
        if classes.is_empty() {
            return Vec::new();
        }
        self.list::<Ingress>()
            .into_iter()
            .filter(|ing| ingress_matches_classes(ing, &classes))
            .collect()
    }

    pub fn get_managed_ingress(&self, namespace: &str, name: &str) -> Result<Arc<Ingress>> {
        let ingress = self.get::<Ingress>(namespace, name)?;
        let classes = self.list_managed_ingress_classes();
        if ingress_matches_classes(&ingress, &classes) {
            Ok(ingress)
        } else {
            Err(Error::not_found(
                "managed Ingress",
                ObjectKey::new(namespace, name),
            ))
        }
    }

    // =========================================================================
    // Gateway API queries (empty unless the gateway feature is on)
    // =========================================================================

    pub fn list_managed_gateway_classes(&self) -> Vec<Arc<GatewayClass>> {
        if !self.gateway_enabled {
            return Vec::new();
        }
        self.list::<GatewayClass>()
            .into_iter()
            .filter(|class| class.spec.controller_name == self.gateway_controller_name)
            .collect()
    }

    /// Gateways whose class is handled by this controller
    pub fn list_gateways(&self) -> Vec<Arc<Gateway>> {
        let classes = self.list_managed_gateway_classes();
        self.list::<Gateway>()
            .into_iter()
            .filter(|gw| {
                classes
                    .iter()
                    .any(|class| class.name_any() == gw.spec.gateway_class_name)
            })
            .collect()
    }

    pub fn get_gateway(&self, namespace: &str, name: &str) -> Result<Arc<Gateway>> {
        let key = ObjectKey::new(namespace, name);
        self.list_gateways()
            .into_iter()
            .find(|gw| ObjectKey::of(&**gw) == key)
            .ok_or_else(|| Error::not_found("managed Gateway", key))
    }

    pub fn list_httproutes(&self) -> Vec<Arc<HTTPRoute>> {
        if !self.gateway_enabled {
            return Vec::new();
        }
        self.list::<HTTPRoute>()
    }

    pub fn get_httproute(&self, namespace: &str, name: &str) -> Result<Arc<HTTPRoute>> {
        if !self.gateway_enabled {
            return Err(Error::not_found(Kind::HTTPRoute, ObjectKey::new(namespace, name)));
        }
        self.get::<HTTPRoute>(namespace, name)
    }
}

fn ingress_matches_classes(ingress: &Ingress, classes: &[Arc<IngressClass>]) -> bool {
    let class_name = ingress
        .spec
        .as_ref()
        .and_then(|s| s.ingress_class_name.clone())
        .or_else(|| ingress.annotations().get(ANNOTATION_INGRESS_CLASS).cloned());

    match class_name {
        Some(name) => classes.iter().any(|class| class.name_any() == name),
        None => classes.iter().any(|class| {
            class
                .annotations()
                .get(ANNOTATION_DEFAULT_INGRESS_CLASS)
                .map(|v| v == "true")
                .unwrap_or(false)
        }),
    }
}
