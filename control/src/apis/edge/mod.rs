//! Remote edge API adapter
//!
//! The edge network's API is reached through `EdgeApi`; `http::HttpEdgeApi`
//! is the REST client the binary wires in when an API URL is configured.
//! Reconcilers in this module drive it from custom resources, resolve IP
//! policy references through `IpPolicyLookup` and write back status through
//! `StatusWriter`.

pub mod http;
pub mod tls_edge;

pub use http::HttpEdgeApi;
pub use tls_edge::TlsEdgeReconciler;

use async_trait::async_trait;
use common::crd::{IPPolicy, TLSEdge};
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, ResourceExt};
use serde_json::json;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Remote resource {0} not found")]
    NotFound(String),

    #[error("Remote API request failed: {0}")]
    Request(String),
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }
}

/// A TLS edge as the remote API reports it
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RemoteTlsEdge {
    pub id: String,
    pub uri: String,
    pub hostports: Vec<String>,
    /// Tunnel-group backend bound to the edge, if any
    pub backend_id: Option<String>,
    pub description: String,
    pub metadata: String,
}

/// Fields sent when creating or updating a TLS edge
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TlsEdgeParams {
    pub hostports: Vec<String>,
    pub backend_id: String,
    pub description: String,
    pub metadata: String,
}

/// A tunnel-group backend: selects tunnels by label
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RemoteBackend {
    pub id: String,
    pub labels: BTreeMap<String, String>,
    pub description: String,
    pub metadata: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BackendParams {
    pub labels: BTreeMap<String, String>,
    pub description: String,
    pub metadata: String,
}

#[async_trait]
pub trait EdgeApi: Send + Sync {
    async fn list_tls_edges(&self) -> Result<Vec<RemoteTlsEdge>, ApiError>;

    async fn get_tls_edge(&self, id: &str) -> Result<RemoteTlsEdge, ApiError>;

    async fn create_tls_edge(&self, params: &TlsEdgeParams) -> Result<RemoteTlsEdge, ApiError>;

    async fn update_tls_edge(
        &self,
        id: &str,
        params: &TlsEdgeParams,
    ) -> Result<RemoteTlsEdge, ApiError>;

    async fn delete_tls_edge(&self, id: &str) -> Result<(), ApiError>;

    async fn get_backend(&self, id: &str) -> Result<RemoteBackend, ApiError>;

    async fn create_backend(&self, params: &BackendParams) -> Result<RemoteBackend, ApiError>;

    async fn update_backend(
        &self,
        id: &str,
        params: &BackendParams,
    ) -> Result<RemoteBackend, ApiError>;

    /// Replace the edge's IP restriction module with these policy ids
    async fn replace_ip_restriction(&self, edge_id: &str, policy_ids: &[String])
        -> Result<(), ApiError>;

    async fn delete_ip_restriction(&self, edge_id: &str) -> Result<(), ApiError>;
}

/// Persists a TLSEdge's status subresource
#[async_trait]
pub trait StatusWriter: Send + Sync {
    async fn write_status(&self, edge: &TLSEdge) -> crate::Result<()>;
}

/// Status writes through the Kubernetes API
pub struct KubeStatusWriter {
    client: Client,
}

impl KubeStatusWriter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StatusWriter for KubeStatusWriter {
    async fn write_status(&self, edge: &TLSEdge) -> crate::Result<()> {
        let namespace = edge.namespace().unwrap_or_default();
        let api: Api<TLSEdge> = Api::namespaced(self.client.clone(), &namespace);
        let patch = json!({ "status": edge.status });
        api.patch_status(
            &edge.name_any(),
            &PatchParams::default(),
            &Patch::Merge(&patch),
        )
        .await
        .map_err(crate::client::ClientError::from)?;
        Ok(())
    }
}

/// Reads IPPolicy objects so edges can refer to them by name
#[async_trait]
pub trait IpPolicyLookup: Send + Sync {
    async fn get_ip_policy(&self, namespace: &str, name: &str) -> crate::Result<Option<IPPolicy>>;
}

/// IPPolicy reads through the Kubernetes API
pub struct KubeIpPolicies {
    client: Client,
}

impl KubeIpPolicies {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IpPolicyLookup for KubeIpPolicies {
    async fn get_ip_policy(&self, namespace: &str, name: &str) -> crate::Result<Option<IPPolicy>> {
        let api: Api<IPPolicy> = Api::namespaced(self.client.clone(), namespace);
        let policy = api
            .get_opt(name)
            .await
            .map_err(crate::client::ClientError::from)?;
        Ok(policy)
    }
}
