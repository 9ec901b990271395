//! Kubernetes-backed kind handlers
//!
//! `KubeKind<K>` talks to the API server through `Api<DynamicObject>` built
//! from `K`'s `ApiResource`, converting to and from the typed object with
//! serde. Namespaced objects are addressed in their namespace; objects
//! without one go through the cluster-wide API.

use super::{ClientError, KindHandler, KindRegistry, Labels};
use crate::store::{Kind, MirrorObject, Object};
use async_trait::async_trait;
use common::crd::{Domain, HTTPSEdge, ModuleSet, TrafficPolicyResource, Tunnel};
use gateway_api::apis::standard::gatewayclasses::GatewayClass;
use gateway_api::apis::standard::gateways::Gateway;
use gateway_api::apis::standard::httproutes::HTTPRoute;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::{Ingress, IngressClass};
use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams,
};
use kube::core::TypeMeta;
use kube::Client;
use serde_json::json;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

const FIELD_MANAGER: &str = "rauta-controller";

pub struct KubeKind<K> {
    client: Client,
    resource: ApiResource,
    singular: String,
    _marker: PhantomData<fn() -> K>,
}

impl<K: MirrorObject> KubeKind<K> {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            resource: ApiResource::erase::<K>(&()),
            singular: K::kind(&()).to_lowercase(),
            _marker: PhantomData,
        }
    }

    fn api(&self, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &self.resource),
            None => Api::all_with(self.client.clone(), &self.resource),
        }
    }

    fn api_for(&self, obj: &Object) -> Api<DynamicObject> {
        self.api(obj.meta().namespace.as_deref())
    }

    fn to_dynamic(&self, obj: &Object) -> Result<DynamicObject, ClientError> {
        let typed = K::from_object(obj).ok_or(ClientError::UnsupportedKind(obj.kind()))?;
        Ok(serde_json::from_value(serde_json::to_value(typed.as_ref())?)?)
    }

    fn from_dynamic(mut dynamic: DynamicObject) -> Result<Object, ClientError> {
        // list items may omit their type meta
        dynamic.types.get_or_insert_with(|| TypeMeta {
            api_version: K::api_version(&()).into_owned(),
            kind: K::kind(&()).into_owned(),
        });
        let typed: K = serde_json::from_value(serde_json::to_value(&dynamic)?)?;
        Ok(typed.into_object())
    }

    fn name(obj: &Object) -> String {
        obj.meta().name.clone().unwrap_or_default()
    }
}

fn map_err(err: kube::Error, what: String) -> ClientError {
    match err {
        kube::Error::Api(response) if response.code == 404 => ClientError::NotFound(what),
        other => ClientError::Kube(other),
    }
}

fn label_selector(selector: &Labels) -> String {
    selector
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl<K: MirrorObject> KindHandler for KubeKind<K> {
    fn kind(&self) -> Kind {
        K::KIND
    }

    fn singular(&self) -> &str {
        &self.singular
    }

    fn plural(&self) -> &str {
        &self.resource.plural
    }

    async fn list(&self, selector: Option<&Labels>) -> Result<Vec<Object>, ClientError> {
        let mut params = ListParams::default();
        if let Some(selector) = selector {
            params = params.labels(&label_selector(selector));
        }
        let list = self
            .api(None)
            .list(&params)
            .await
            .map_err(|e| map_err(e, self.resource.plural.clone()))?;
        debug!("Listed {} {}", list.items.len(), self.resource.plural);
        list.items.into_iter().map(Self::from_dynamic).collect()
    }

    async fn create(&self, obj: &Object) -> Result<Object, ClientError> {
        let dynamic = self.to_dynamic(obj)?;
        let created = self
            .api_for(obj)
            .create(&PostParams::default(), &dynamic)
            .await
            .map_err(|e| map_err(e, obj.key().to_string()))?;
        Self::from_dynamic(created)
    }

    async fn update(&self, obj: &Object) -> Result<Object, ClientError> {
        let dynamic = self.to_dynamic(obj)?;
        let updated = self
            .api_for(obj)
            .replace(&Self::name(obj), &PostParams::default(), &dynamic)
            .await
            .map_err(|e| map_err(e, obj.key().to_string()))?;
        Self::from_dynamic(updated)
    }

    async fn update_status(&self, obj: &Object) -> Result<(), ClientError> {
        let dynamic = self.to_dynamic(obj)?;
        let status = dynamic
            .data
            .get("status")
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        self.api_for(obj)
            .patch_status(
                &Self::name(obj),
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&json!({ "status": status })),
            )
            .await
            .map_err(|e| map_err(e, obj.key().to_string()))?;
        Ok(())
    }

    async fn delete(&self, obj: &Object) -> Result<(), ClientError> {
        self.api_for(obj)
            .delete(&Self::name(obj), &DeleteParams::default())
            .await
            .map_err(|e| map_err(e, obj.key().to_string()))?;
        Ok(())
    }

    async fn patch_labels(&self, obj: &Object, labels: &Labels) -> Result<(), ClientError> {
        self.api_for(obj)
            .patch(
                &Self::name(obj),
                &PatchParams::default(),
                &Patch::Merge(&json!({ "metadata": { "labels": labels } })),
            )
            .await
            .map_err(|e| map_err(e, obj.key().to_string()))?;
        Ok(())
    }
}

impl KindRegistry {
    /// Registry with a Kubernetes handler for every mirrored kind
    pub fn kubernetes(client: Client) -> Self {
        let mut registry = Self::new();
        registry
            .register(Arc::new(KubeKind::<Ingress>::new(client.clone())))
            .register(Arc::new(KubeKind::<IngressClass>::new(client.clone())))
            .register(Arc::new(KubeKind::<Service>::new(client.clone())))
            .register(Arc::new(KubeKind::<Gateway>::new(client.clone())))
            .register(Arc::new(KubeKind::<GatewayClass>::new(client.clone())))
            .register(Arc::new(KubeKind::<HTTPRoute>::new(client.clone())))
            .register(Arc::new(KubeKind::<Domain>::new(client.clone())))
            .register(Arc::new(KubeKind::<HTTPSEdge>::new(client.clone())))
            .register(Arc::new(KubeKind::<Tunnel>::new(client.clone())))
            .register(Arc::new(KubeKind::<ModuleSet>::new(client.clone())))
            .register(Arc::new(KubeKind::<TrafficPolicyResource>::new(client)));
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_selector_format() {
        let selector = Labels::from([
            ("b".to_string(), "2".to_string()),
            ("a".to_string(), "1".to_string()),
        ]);
        assert_eq!(label_selector(&selector), "a=1,b=2");
    }
}
