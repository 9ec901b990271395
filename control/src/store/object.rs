//! Mirrored object kinds
//!
//! `Object` is a closed set of the cluster object types the engine reads.
//! Entries are shared behind `Arc` so listing the mirror hands out cheap
//! snapshots instead of deep copies.

use common::crd::{Domain, HTTPSEdge, ModuleSet, TrafficPolicyResource, Tunnel};
use gateway_api::apis::standard::gatewayclasses::GatewayClass;
use gateway_api::apis::standard::gateways::Gateway;
use gateway_api::apis::standard::httproutes::HTTPRoute;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::{Ingress, IngressClass};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

// =============================================================================
// ObjectKey
// =============================================================================

/// Key for object lookup: (namespace, name). Cluster scoped objects use an
/// empty namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    #[inline]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn of<K: Resource>(obj: &K) -> Self {
        Self::new(obj.namespace().unwrap_or_default(), obj.name_any())
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

// =============================================================================
// MirrorObject
// =============================================================================

/// A concrete type that can live in the mirror
pub trait MirrorObject:
    Resource<DynamicType = ()> + Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const KIND: Kind;

    fn into_object(self) -> Object;

    fn from_object(obj: &Object) -> Option<Arc<Self>>;
}

macro_rules! mirror_kinds {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        /// Kinds the engine mirrors and reconciles
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Kind {
            $($variant),*
        }

        impl Kind {
            pub const ALL: &'static [Kind] = &[$(Kind::$variant),*];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Kind::$variant => stringify!($variant)),*
                }
            }
        }

        #[derive(Debug, Clone)]
        pub enum Object {
            $($variant(Arc<$ty>)),*
        }

        impl Object {
            pub fn kind(&self) -> Kind {
                match self {
                    $(Object::$variant(_) => Kind::$variant),*
                }
            }

            pub fn meta(&self) -> &ObjectMeta {
                match self {
                    $(Object::$variant(o) => o.meta()),*
                }
            }

            pub fn meta_mut(&mut self) -> &mut ObjectMeta {
                match self {
                    $(Object::$variant(o) => Arc::make_mut(o).meta_mut()),*
                }
            }
        }

        $(
            impl MirrorObject for $ty {
                const KIND: Kind = Kind::$variant;

                fn into_object(self) -> Object {
                    Object::$variant(Arc::new(self))
                }

                fn from_object(obj: &Object) -> Option<Arc<Self>> {
                    match obj {
                        Object::$variant(o) => Some(Arc::clone(o)),
                        _ => None,
                    }
                }
            }
        )*
    };
}

mirror_kinds! {
    Ingress => Ingress,
    IngressClass => IngressClass,
    Service => Service,
    Gateway => Gateway,
    GatewayClass => GatewayClass,
    HTTPRoute => HTTPRoute,
    Domain => Domain,
    HTTPSEdge => HTTPSEdge,
    Tunnel => Tunnel,
    ModuleSet => ModuleSet,
    TrafficPolicy => TrafficPolicyResource,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Object {
    pub fn key(&self) -> ObjectKey {
        let meta = self.meta();
        ObjectKey::new(
            meta.namespace.clone().unwrap_or_default(),
            meta.name.clone().unwrap_or_default(),
        )
    }

    pub fn labels(&self) -> BTreeMap<String, String> {
        self.meta().labels.clone().unwrap_or_default()
    }

    /// Downcast to a concrete type, cloning out of the shared entry
    pub fn to_typed<K: MirrorObject>(&self) -> Option<K> {
        K::from_object(self).map(Arc::unwrap_or_clone)
    }
}
