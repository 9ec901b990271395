//! TLSEdge reconciler
//!
//! Keeps a remote TLS edge and its tunnel-group backend in line with a
//! `TLSEdge` resource. The status subresource records the remote ids and is
//! the only link between the two: an empty `status.id` means "create",
//! anything else means "update".
//!
//! IP restrictions name policies either by IPPolicy object name (in the
//! edge's namespace) or by remote id. A change to any IPPolicy re-enqueues
//! the edges that refer to it.

use super::{
    ApiError, BackendParams, EdgeApi, IpPolicyLookup, RemoteTlsEdge, StatusWriter, TlsEdgeParams,
};
use crate::error::{Error, Result};
use common::crd::{IPPolicy, TLSEdge, TLSEdgeStatus};
use futures::StreamExt;
use kube::api::Api;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::finalizer::{finalizer, Event as FinalizerEvent};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Client, ResourceExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub const TLS_EDGE_FINALIZER: &str = "k8s.rauta.io/finalizer";

pub struct TlsEdgeReconciler {
    api: Arc<dyn EdgeApi>,
    status: Arc<dyn StatusWriter>,
    policies: Arc<dyn IpPolicyLookup>,
}

fn status_mut(edge: &mut TLSEdge) -> &mut TLSEdgeStatus {
    edge.status.get_or_insert_with(TLSEdgeStatus::default)
}

fn status_id(edge: &TLSEdge) -> Option<&str> {
    edge.status
        .as_ref()
        .and_then(|s| s.id.as_deref())
        .filter(|id| !id.is_empty())
}

fn backend_id(edge: &TLSEdge) -> Option<&str> {
    edge.status
        .as_ref()
        .and_then(|s| s.backend.id.as_deref())
        .filter(|id| !id.is_empty())
}

impl TlsEdgeReconciler {
    pub fn new(
        api: Arc<dyn EdgeApi>,
        status: Arc<dyn StatusWriter>,
        policies: Arc<dyn IpPolicyLookup>,
    ) -> Self {
        Self {
            api,
            status,
            policies,
        }
    }

    /// Create or update the remote edge depending on `status.id`
    pub async fn apply(&self, edge: &mut TLSEdge) -> Result<()> {
        if status_id(edge).is_some() {
            self.update(edge).await
        } else {
            self.create(edge).await
        }
    }

    async fn create(&self, edge: &mut TLSEdge) -> Result<()> {
        self.reconcile_backend(edge).await?;

        if let Some(existing) = self.find_edge_by_backend_labels(edge).await? {
            info!(
                "Adopting remote TLS edge {} for {}/{}",
                existing.id,
                edge.namespace().unwrap_or_default(),
                edge.name_any()
            );
            return self.write_edge_status(edge, &existing).await;
        }

        let params = self.edge_params(edge);
        let remote = self.api.create_tls_edge(&params).await?;
        info!(
            "Created remote TLS edge {} for {}/{}",
            remote.id,
            edge.namespace().unwrap_or_default(),
            edge.name_any()
        );
        self.write_edge_status(edge, &remote).await?;
        self.reconcile_ip_restriction(edge, &remote.id).await
    }

    async fn update(&self, edge: &mut TLSEdge) -> Result<()> {
        self.reconcile_backend(edge).await?;

        let id = status_id(edge).unwrap_or_default().to_string();
        let mut remote = match self.api.get_tls_edge(&id).await {
            Ok(remote) => remote,
            Err(e) => {
                if e.is_not_found() {
                    info!("Remote TLS edge {} not found, clearing id", id);
                    status_mut(edge).id = None;
                    self.status.write_status(edge).await?;
                }
                return Err(e.into());
            }
        };

        let status_hostports = edge
            .status
            .as_ref()
            .map(|s| s.hostports.clone())
            .unwrap_or_default();
        if remote.backend_id.as_deref() != backend_id(edge) || remote.hostports != status_hostports {
            let params = self.edge_params(edge);
            remote = self.api.update_tls_edge(&remote.id, &params).await?;
            info!("Updated remote TLS edge {}", remote.id);
        }

        self.write_edge_status(edge, &remote).await?;
        self.reconcile_ip_restriction(edge, &remote.id).await
    }

    /// Delete the remote edge; an already missing edge counts as deleted
    pub async fn delete(&self, edge: &mut TLSEdge) -> Result<()> {
        let Some(id) = status_id(edge).map(str::to_string) else {
            debug!("TLSEdge {} has no remote id, nothing to delete", edge.name_any());
            return Ok(());
        };
        match self.api.delete_tls_edge(&id).await {
            Ok(()) => info!("Deleted remote TLS edge {}", id),
            Err(e) if e.is_not_found() => debug!("Remote TLS edge {} already gone", id),
            Err(e) => return Err(e.into()),
        }
        status_mut(edge).id = None;
        Ok(())
    }

    fn edge_params(&self, edge: &TLSEdge) -> TlsEdgeParams {
        TlsEdgeParams {
            hostports: edge.spec.hostports.clone(),
            backend_id: backend_id(edge).unwrap_or_default().to_string(),
            description: edge.spec.description.clone(),
            metadata: edge.spec.metadata.clone(),
        }
    }

    /// Ensure the tunnel-group backend exists and selects the spec labels
    async fn reconcile_backend(&self, edge: &mut TLSEdge) -> Result<()> {
        let params = BackendParams {
            labels: edge.spec.backend.labels.clone(),
            description: edge.spec.backend.description.clone(),
            metadata: edge.spec.backend.metadata.clone(),
        };

        if let Some(id) = backend_id(edge).map(str::to_string) {
            let backend = match self.api.get_backend(&id).await {
                Ok(backend) => backend,
                Err(e) => {
                    if e.is_not_found() {
                        info!("Tunnel group backend {} not found, clearing id", id);
                        status_mut(edge).backend.id = None;
                        self.status.write_status(edge).await?;
                    }
                    return Err(e.into());
                }
            };
            if backend.labels != params.labels {
                self.api.update_backend(&backend.id, &params).await?;
                info!("Updated tunnel group backend {} labels", backend.id);
            }
            return Ok(());
        }

        let backend = self.api.create_backend(&params).await?;
        info!("Created tunnel group backend {}", backend.id);
        status_mut(edge).backend.id = Some(backend.id);
        self.status.write_status(edge).await
    }

    async fn find_edge_by_backend_labels(&self, edge: &TLSEdge) -> Result<Option<RemoteTlsEdge>> {
        let labels = &edge.spec.backend.labels;
        for remote in self.api.list_tls_edges().await? {
            let Some(id) = remote.backend_id.as_deref() else {
                continue;
            };
            let backend = match self.api.get_backend(id).await {
                Ok(backend) => backend,
                Err(ApiError::NotFound(_)) => continue,
                Err(e) => return Err(e.into()),
            };
            if &backend.labels == labels {
                return Ok(Some(remote));
            }
        }
        Ok(None)
    }

    async fn write_edge_status(&self, edge: &mut TLSEdge, remote: &RemoteTlsEdge) -> Result<()> {
        let status = status_mut(edge);
        status.id = Some(remote.id.clone());
        status.uri = Some(remote.uri.clone());
        status.hostports = remote.hostports.clone();
        status.backend.id = remote.backend_id.clone();
        self.status.write_status(edge).await
    }

    async fn reconcile_ip_restriction(&self, edge: &TLSEdge, edge_id: &str) -> Result<()> {
        match edge.spec.ip_restriction.as_ref() {
            Some(restriction) if !restriction.policies.is_empty() => {
                let namespace = edge.namespace().unwrap_or_default();
                let ids = self
                    .resolve_ip_policies(&namespace, &restriction.policies)
                    .await?;
                info!("Resolved IP policies {:?} to {:?}", restriction.policies, ids);
                self.api.replace_ip_restriction(edge_id, &ids).await?
            }
            _ => self.api.delete_ip_restriction(edge_id).await?,
        }
        Ok(())
    }

    /// Map IPPolicy names to their remote ids. A reference with no IPPolicy
    /// of that name is taken to be an id already. Duplicates are dropped.
    async fn resolve_ip_policies(
        &self,
        namespace: &str,
        names_or_ids: &[String],
    ) -> Result<Vec<String>> {
        let mut ids: Vec<String> = Vec::with_capacity(names_or_ids.len());
        for name_or_id in names_or_ids {
            let id = match self.policies.get_ip_policy(namespace, name_or_id).await? {
                None => name_or_id.clone(),
                Some(policy) => policy
                    .remote_id()
                    .map(str::to_string)
                    .ok_or_else(|| {
                        Error::Lookup(format!(
                            "IPPolicy {}/{} has no remote id yet",
                            namespace, name_or_id
                        ))
                    })?,
            };
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    // =========================================================================
    // Controller
    // =========================================================================

    async fn reconcile(edge: Arc<TLSEdge>, ctx: Arc<ReconcileContext>) -> Result<Action> {
        let namespace = edge.namespace().unwrap_or_default();
        let api: Api<TLSEdge> = Api::namespaced(ctx.client.clone(), &namespace);

        finalizer(&api, TLS_EDGE_FINALIZER, edge, move |event| async move {
            match event {
                FinalizerEvent::Apply(edge) => {
                    let mut edge = (*edge).clone();
                    ctx.reconciler.apply(&mut edge).await?;
                    Ok(Action::requeue(Duration::from_secs(300)))
                }
                FinalizerEvent::Cleanup(edge) => {
                    let mut edge = (*edge).clone();
                    ctx.reconciler.delete(&mut edge).await?;
                    Ok(Action::await_change())
                }
            }
        })
        .await
        .map_err(|e| Error::Finalizer(Box::new(e)))
    }

    fn error_policy(edge: Arc<TLSEdge>, error: &Error, _ctx: Arc<ReconcileContext>) -> Action {
        error!("TLSEdge {} reconciliation error: {}", edge.name_any(), error);
        Action::requeue(Duration::from_secs(30))
    }

    /// Start the TLSEdge controller; returns once `cancel` fires
    pub async fn run(self, client: Client, cancel: CancellationToken) {
        let api: Api<TLSEdge> = Api::all(client.clone());
        let policies: Api<IPPolicy> = Api::all(client.clone());
        let ctx = Arc::new(ReconcileContext {
            client,
            reconciler: self,
        });

        info!("Starting TLSEdge controller");

        let controller = Controller::new(api, WatcherConfig::default());
        let edges = controller.store();
        controller
            .watches(policies, WatcherConfig::default(), move |policy| {
                edges_for_ip_policy(&edges.state(), &policy)
            })
            .graceful_shutdown_on(cancel.cancelled_owned())
            .run(Self::reconcile, Self::error_policy, ctx)
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Reconciled TLSEdge: {:?}", o),
                    Err(e) => error!("TLSEdge reconciliation error: {:?}", e),
                }
            })
            .await;
    }
}

struct ReconcileContext {
    client: Client,
    reconciler: TlsEdgeReconciler,
}

/// Edges whose IP restriction names `policy`, by object name within the
/// policy's namespace or by remote id anywhere
pub(crate) fn edges_for_ip_policy(
    edges: &[Arc<TLSEdge>],
    policy: &IPPolicy,
) -> Vec<ObjectRef<TLSEdge>> {
    let name = policy.name_any();
    let namespace = policy.namespace();
    let remote_id = policy.remote_id();

    let refs: Vec<ObjectRef<TLSEdge>> = edges
        .iter()
        .filter(|edge| {
            let Some(restriction) = edge.spec.ip_restriction.as_ref() else {
                return false;
            };
            restriction.policies.iter().any(|p| {
                (p == &name && edge.namespace() == namespace) || Some(p.as_str()) == remote_id
            })
        })
        .map(|edge| ObjectRef::from_obj(edge.as_ref()))
        .collect();

    info!(
        "IPPolicy {} change re-enqueues {} TLSEdge(s)",
        name,
        refs.len()
    );
    refs
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::apis::edge::RemoteBackend;
    use async_trait::async_trait;
    use common::crd::modules::EndpointIPPolicy;
    use common::crd::{IPPolicySpec, IPPolicyStatus, TLSEdgeSpec, TunnelGroupBackend};
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    // =========================================================================
    // Fakes
    // =========================================================================

    #[derive(Default)]
    struct FakeEdgeApi {
        edges: Mutex<BTreeMap<String, RemoteTlsEdge>>,
        backends: Mutex<BTreeMap<String, RemoteBackend>>,
        ip_restrictions: Mutex<BTreeMap<String, Vec<String>>>,
        calls: Mutex<Vec<String>>,
        next_id: Mutex<u32>,
    }

    impl FakeEdgeApi {
        fn id(&self, prefix: &str) -> String {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            format!("{}_{}", prefix, next)
        }

        fn call(&self, name: &str) {
            self.calls.lock().unwrap().push(name.to_string());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn not_found(id: &str) -> ApiError {
            ApiError::NotFound(id.to_string())
        }
    }

    #[async_trait]
    impl EdgeApi for FakeEdgeApi {
        async fn list_tls_edges(&self) -> Result<Vec<RemoteTlsEdge>, ApiError> {
            self.call("list_tls_edges");
            Ok(self.edges.lock().unwrap().values().cloned().collect())
        }

        async fn get_tls_edge(&self, id: &str) -> Result<RemoteTlsEdge, ApiError> {
            self.call("get_tls_edge");
            self.edges
                .lock()
                .unwrap()
                .get(id)
                .cloned()
                .ok_or_else(|| Self::not_found(id))
        }

        async fn create_tls_edge(&self, params: &TlsEdgeParams) -> Result<RemoteTlsEdge, ApiError> {
            self.call("create_tls_edge");
            let id = self.id("edghts");
            let edge = RemoteTlsEdge {
                id: id.clone(),
                uri: format!("/edges/tls/{}", id),
                hostports: params.hostports.clone(),
                backend_id: Some(params.backend_id.clone()),
                description: params.description.clone(),
                metadata: params.metadata.clone(),
            };
            self.edges.lock().unwrap().insert(id, edge.clone());
            Ok(edge)
        }

        async fn update_tls_edge(
            &self,
            id: &str,
            params: &TlsEdgeParams,
        ) -> Result<RemoteTlsEdge, ApiError> {
            self.call("update_tls_edge");
            let mut edges = self.edges.lock().unwrap();
            let edge = edges.get_mut(id).ok_or_else(|| Self::not_found(id))?;
            edge.hostports = params.hostports.clone();
            edge.backend_id = Some(params.backend_id.clone());
            Ok(edge.clone())
        }

        async fn delete_tls_edge(&self, id: &str) -> Result<(), ApiError> {
            self.call("delete_tls_edge");
            self.edges
                .lock()
                .unwrap()
                .remove(id)
                .map(|_| ())
                .ok_or_else(|| Self::not_found(id))
        }

        async fn get_backend(&self, id: &str) -> Result<RemoteBackend, ApiError> {
            self.call("get_backend");
            self.backends
                .lock()
                .unwrap()
                .get(id)
                .cloned()
                .ok_or_else(|| Self::not_found(id))
        }

        async fn create_backend(&self, params: &BackendParams) -> Result<RemoteBackend, ApiError> {
            self.call("create_backend");
            let backend = RemoteBackend {
                id: self.id("bkdtg"),
                labels: params.labels.clone(),
                description: params.description.clone(),
                metadata: params.metadata.clone(),
            };
            self.backends
                .lock()
                .unwrap()
                .insert(backend.id.clone(), backend.clone());
            Ok(backend)
        }

        async fn update_backend(
            &self,
            id: &str,
            params: &BackendParams,
        ) -> Result<RemoteBackend, ApiError> {
            self.call("update_backend");
            let mut backends = self.backends.lock().unwrap();
            let backend = backends.get_mut(id).ok_or_else(|| Self::not_found(id))?;
            backend.labels = params.labels.clone();
            Ok(backend.clone())
        }

        async fn replace_ip_restriction(
            &self,
            edge_id: &str,
            policy_ids: &[String],
        ) -> Result<(), ApiError> {
            self.call("replace_ip_restriction");
            self.ip_restrictions
                .lock()
                .unwrap()
                .insert(edge_id.to_string(), policy_ids.to_vec());
            Ok(())
        }

        async fn delete_ip_restriction(&self, edge_id: &str) -> Result<(), ApiError> {
            self.call("delete_ip_restriction");
            self.ip_restrictions.lock().unwrap().remove(edge_id);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingStatus {
        written: Mutex<Vec<TLSEdgeStatus>>,
    }

    #[async_trait]
    impl StatusWriter for RecordingStatus {
        async fn write_status(&self, edge: &TLSEdge) -> Result<()> {
            self.written
                .lock()
                .unwrap()
                .push(edge.status.clone().unwrap_or_default());
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakePolicies {
        policies: Vec<IPPolicy>,
    }

    #[async_trait]
    impl IpPolicyLookup for FakePolicies {
        async fn get_ip_policy(&self, namespace: &str, name: &str) -> Result<Option<IPPolicy>> {
            Ok(self
                .policies
                .iter()
                .find(|p| p.namespace().as_deref() == Some(namespace) && p.name_any() == name)
                .cloned())
        }
    }

    fn ip_policy(namespace: &str, name: &str, id: Option<&str>) -> IPPolicy {
        let mut policy = IPPolicy::new(name, IPPolicySpec::default());
        policy.metadata.namespace = Some(namespace.to_string());
        policy.status = Some(IPPolicyStatus {
            id: id.map(str::to_string),
        });
        policy
    }

    fn setup() -> (Arc<FakeEdgeApi>, Arc<RecordingStatus>, TlsEdgeReconciler) {
        setup_with_policies(vec![])
    }

    fn setup_with_policies(
        policies: Vec<IPPolicy>,
    ) -> (Arc<FakeEdgeApi>, Arc<RecordingStatus>, TlsEdgeReconciler) {
        let api = Arc::new(FakeEdgeApi::default());
        let status = Arc::new(RecordingStatus::default());
        let reconciler = TlsEdgeReconciler::new(
            api.clone(),
            status.clone(),
            Arc::new(FakePolicies { policies }),
        );
        (api, status, reconciler)
    }

    fn tls_edge(policies: &[&str]) -> TLSEdge {
        let mut edge = TLSEdge::new(
            "db",
            TLSEdgeSpec {
                hostports: vec!["db.example.com:443".to_string()],
                backend: TunnelGroupBackend {
                    labels: BTreeMap::from([("app".to_string(), "db".to_string())]),
                    ..Default::default()
                },
                ip_restriction: Some(EndpointIPPolicy {
                    policies: policies.iter().map(|p| p.to_string()).collect(),
                }),
                ..Default::default()
            },
        );
        edge.metadata.namespace = Some("default".to_string());
        edge
    }

    // =========================================================================
    // Create
    // =========================================================================

    #[tokio::test]
    async fn test_create_records_remote_ids() {
        let (api, status, reconciler) = setup();
        let mut edge = tls_edge(&["ipp_1"]);

        reconciler.apply(&mut edge).await.unwrap();

        let s = edge.status.clone().unwrap();
        assert!(s.id.as_deref().unwrap().starts_with("edghts_"));
        assert!(s.backend.id.as_deref().unwrap().starts_with("bkdtg_"));
        assert_eq!(s.hostports, vec!["db.example.com:443"]);
        assert_eq!(
            api.ip_restrictions.lock().unwrap().get(s.id.as_deref().unwrap()),
            Some(&vec!["ipp_1".to_string()])
        );
        assert_eq!(
            status.written.lock().unwrap().len(),
            2,
            "Status written after backend creation and after edge creation"
        );
    }

    #[tokio::test]
    async fn test_create_without_policies_deletes_ip_restriction() {
        let (api, _status, reconciler) = setup();
        let mut edge = tls_edge(&[]);

        reconciler.apply(&mut edge).await.unwrap();

        assert!(api.calls().contains(&"delete_ip_restriction".to_string()));
        assert!(!api.calls().contains(&"replace_ip_restriction".to_string()));
    }

    #[tokio::test]
    async fn test_create_adopts_edge_with_matching_backend_labels() {
        let (api, _status, reconciler) = setup();
        let backend = api
            .create_backend(&BackendParams {
                labels: BTreeMap::from([("app".to_string(), "db".to_string())]),
                ..Default::default()
            })
            .await
            .unwrap();
        let existing = api
            .create_tls_edge(&TlsEdgeParams {
                hostports: vec!["db.example.com:443".to_string()],
                backend_id: backend.id.clone(),
                ..Default::default()
            })
            .await
            .unwrap();
        api.calls.lock().unwrap().clear();

        let mut edge = tls_edge(&[]);
        reconciler.apply(&mut edge).await.unwrap();

        assert_eq!(
            edge.status.unwrap().id.as_deref(),
            Some(existing.id.as_str()),
            "Existing remote edge should be adopted"
        );
        assert!(!api.calls().contains(&"create_tls_edge".to_string()));
    }

    // =========================================================================
    // Update
    // =========================================================================

    #[tokio::test]
    async fn test_update_only_when_hostports_change() {
        let (api, _status, reconciler) = setup();
        let mut edge = tls_edge(&[]);
        reconciler.apply(&mut edge).await.unwrap();
        api.calls.lock().unwrap().clear();

        reconciler.apply(&mut edge).await.unwrap();
        assert!(!api.calls().contains(&"update_tls_edge".to_string()));

        status_mut(&mut edge).hostports = vec!["old.example.com:443".to_string()];
        reconciler.apply(&mut edge).await.unwrap();
        assert!(api.calls().contains(&"update_tls_edge".to_string()));
    }

    #[tokio::test]
    async fn test_update_missing_remote_edge_clears_id() {
        let (api, status, reconciler) = setup();
        let mut edge = tls_edge(&[]);
        reconciler.apply(&mut edge).await.unwrap();
        let id = edge.status.as_ref().unwrap().id.clone().unwrap();
        api.edges.lock().unwrap().remove(&id);

        let err = reconciler.apply(&mut edge).await.unwrap_err();

        assert!(matches!(err, Error::Remote(ApiError::NotFound(_))));
        assert_eq!(edge.status.as_ref().unwrap().id, None);
        assert_eq!(
            status.written.lock().unwrap().last().unwrap().id,
            None,
            "Cleared id must be persisted before returning"
        );
    }

    #[tokio::test]
    async fn test_missing_backend_clears_backend_id() {
        let (api, _status, reconciler) = setup();
        let mut edge = tls_edge(&[]);
        reconciler.apply(&mut edge).await.unwrap();
        api.backends.lock().unwrap().clear();

        assert!(reconciler.apply(&mut edge).await.is_err());
        assert_eq!(edge.status.as_ref().unwrap().backend.id, None);
    }

    #[tokio::test]
    async fn test_backend_labels_updated() {
        let (api, _status, reconciler) = setup();
        let mut edge = tls_edge(&[]);
        reconciler.apply(&mut edge).await.unwrap();

        edge.spec
            .backend
            .labels
            .insert("tier".to_string(), "primary".to_string());
        reconciler.apply(&mut edge).await.unwrap();

        assert!(api.calls().contains(&"update_backend".to_string()));
        let backend_id = edge.status.as_ref().unwrap().backend.id.clone().unwrap();
        assert_eq!(api.backends.lock().unwrap()[&backend_id].labels.len(), 2);
    }

    // =========================================================================
    // Delete
    // =========================================================================

    #[tokio::test]
    async fn test_delete_tolerates_missing_remote_edge() {
        let (api, _status, reconciler) = setup();
        let mut edge = tls_edge(&[]);
        reconciler.apply(&mut edge).await.unwrap();
        api.edges.lock().unwrap().clear();

        reconciler.delete(&mut edge).await.unwrap();
        assert_eq!(edge.status.unwrap().id, None);
    }

    // =========================================================================
    // IP policies
    // =========================================================================

    #[tokio::test]
    async fn test_ip_policy_names_resolve_to_remote_ids() {
        let (api, _status, reconciler) = setup_with_policies(vec![
            ip_policy("default", "office", Some("ipp_office")),
            ip_policy("other", "vpn", Some("ipp_other_vpn")),
        ]);
        // "vpn" lives in another namespace, so it is taken as an id
        let mut edge = tls_edge(&["office", "ipp_raw", "vpn", "ipp_office"]);

        reconciler.apply(&mut edge).await.unwrap();

        let id = edge.status.unwrap().id.unwrap();
        assert_eq!(
            api.ip_restrictions.lock().unwrap().get(&id),
            Some(&vec![
                "ipp_office".to_string(),
                "ipp_raw".to_string(),
                "vpn".to_string(),
            ])
        );
    }

    #[tokio::test]
    async fn test_ip_policy_without_remote_id_fails() {
        let (api, _status, reconciler) =
            setup_with_policies(vec![ip_policy("default", "office", None)]);
        let mut edge = tls_edge(&["office"]);

        let err = reconciler.apply(&mut edge).await.unwrap_err();

        assert!(matches!(err, Error::Lookup(_)));
        assert!(!api.calls().contains(&"replace_ip_restriction".to_string()));
    }

    #[tokio::test]
    async fn test_update_reapplies_ip_restriction() {
        let (api, _status, reconciler) = setup();
        let mut edge = tls_edge(&["ipp_1"]);
        reconciler.apply(&mut edge).await.unwrap();

        edge.spec.ip_restriction = None;
        reconciler.apply(&mut edge).await.unwrap();

        let id = edge.status.unwrap().id.unwrap();
        assert!(api.calls().contains(&"delete_ip_restriction".to_string()));
        assert_eq!(api.ip_restrictions.lock().unwrap().get(&id), None);
    }

    #[test]
    fn test_edges_for_ip_policy_matches_name_and_id() {
        let by_name = tls_edge(&["office"]);
        let mut by_id = tls_edge(&["ipp_office"]);
        by_id.metadata.name = Some("by-id".to_string());
        by_id.metadata.namespace = Some("other".to_string());
        let mut elsewhere = tls_edge(&["office"]);
        elsewhere.metadata.name = Some("elsewhere".to_string());
        elsewhere.metadata.namespace = Some("other".to_string());
        let mut unrestricted = tls_edge(&[]);
        unrestricted.metadata.name = Some("open".to_string());
        unrestricted.spec.ip_restriction = None;

        let edges: Vec<Arc<TLSEdge>> = [by_name, by_id, elsewhere, unrestricted]
            .into_iter()
            .map(Arc::new)
            .collect();
        let policy = ip_policy("default", "office", Some("ipp_office"));

        let refs = edges_for_ip_policy(&edges, &policy);

        let keys: Vec<(String, Option<String>)> = refs
            .iter()
            .map(|r| (r.name.clone(), r.namespace.clone()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("db".to_string(), Some("default".to_string())),
                ("by-id".to_string(), Some("other".to_string())),
            ]
        );
    }
}
