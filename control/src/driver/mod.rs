//! Reconciliation driver
//!
//! Owns the Object Mirror and turns it into backing-store mutations:
//!
//! ```text
//! seed (once) -> calculate -> list current -> apply domains -> apply edges
//!             -> apply tunnels -> update ingress statuses
//! ```
//!
//! Watch adapters feed the mirror through the `update_*`/`delete_*` methods
//! and call `sync` (or `sync_edges` when only edge inputs changed). Syncs are
//! debounced unless concurrency is explicitly allowed.

mod apply;
mod compare;
pub mod debounce;
mod migrate;
mod status;

pub use debounce::{SyncKind, SyncOutcome};

use crate::apis::metrics::record_sync;
use crate::calculate::{Calculator, Settings};
use crate::client::{list_typed, ClientError, ObjectClient};
use crate::config::ControllerConfig;
use crate::error::{Error, Result};
use crate::store::{Kind, Object, ObjectKey, Store};
use common::crd::{Domain, HTTPSEdge, Tunnel};
use debounce::{Admission, Debouncer, SyncGuard};
use gateway_api::apis::standard::gateways::Gateway;
use gateway_api::apis::standard::httproutes::HTTPRoute;
use k8s_openapi::api::networking::v1::{Ingress, IngressClass};
use kube::ResourceExt;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Kinds loaded into the mirror at startup
const SEED_KINDS: &[Kind] = &[
    Kind::Ingress,
    Kind::IngressClass,
    Kind::Service,
    Kind::Domain,
    Kind::HTTPSEdge,
    Kind::Tunnel,
    Kind::ModuleSet,
    Kind::TrafficPolicy,
];

const GATEWAY_SEED_KINDS: &[Kind] = &[Kind::GatewayClass, Kind::Gateway, Kind::HTTPRoute];

/// Whether a caller runs the pass body
enum Entry<'a> {
    /// `None` when concurrent syncs are allowed
    Run(Option<SyncGuard<'a>>),
    Done(SyncOutcome),
}

pub struct Driver {
    store: Store,
    settings: Settings,
    debouncer: Debouncer,
    allow_concurrent: bool,
}

impl Driver {
    pub fn new(config: &ControllerConfig) -> Result<Self> {
        Ok(Self {
            store: Store::new(
                &config.controller_name,
                &config.gateway_controller_name,
                config.gateway_enabled,
            ),
            settings: Settings::from_config(config)?,
            debouncer: Debouncer::new(),
            allow_concurrent: config.sync_allow_concurrent,
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Kinds the mirror is fed with, gateway kinds included when enabled
    pub fn mirrored_kinds(&self) -> Vec<Kind> {
        let mut kinds = SEED_KINDS.to_vec();
        if self.settings.gateway_enabled {
            kinds.extend_from_slice(GATEWAY_SEED_KINDS);
        }
        kinds
    }

    // =========================================================================
    // Mirror maintenance
    // =========================================================================

    /// Bulk-load every mirrored kind. An unregistered kind is fatal.
    pub async fn seed(&self, reader: &dyn ObjectClient) -> Result<()> {
        for kind in self.mirrored_kinds() {
            let objects = reader.list(kind, None).await.map_err(|e| match e {
                ClientError::UnsupportedKind(kind) => Error::UnsupportedKind(kind.to_string()),
                other => Error::Client(other),
            })?;
            debug!("Seeding {} {} objects", objects.len(), kind);
            for obj in objects {
                self.store.update(obj);
            }
        }
        info!("Object mirror seeded");
        Ok(())
    }

    /// Store an ingress; returns it when it belongs to one of our classes
    pub fn update_ingress(&self, ingress: Ingress) -> Result<Arc<Ingress>> {
        let key = ObjectKey::of(&ingress);
        self.store.update_typed(ingress);
        self.store.get_managed_ingress(&key.namespace, &key.name)
    }

    pub fn delete_ingress(&self, ingress: &Ingress) -> bool {
        self.delete_named_ingress(&ObjectKey::of(ingress))
    }

    pub fn delete_named_ingress(&self, key: &ObjectKey) -> bool {
        self.store.delete(Kind::Ingress, key)
    }

    /// Store a gateway; returns it when its class is ours and the feature is on
    pub fn update_gateway(&self, gateway: Gateway) -> Result<Arc<Gateway>> {
        let key = ObjectKey::of(&gateway);
        self.store.update_typed(gateway);
        self.store.get_gateway(&key.namespace, &key.name)
    }

    pub fn delete_gateway(&self, gateway: &Gateway) -> bool {
        self.delete_named_gateway(&ObjectKey::of(gateway))
    }

    pub fn delete_named_gateway(&self, key: &ObjectKey) -> bool {
        self.store.delete(Kind::Gateway, key)
    }

    pub fn update_httproute(&self, route: HTTPRoute) -> Result<Arc<HTTPRoute>> {
        let key = ObjectKey::of(&route);
        self.store.update_typed(route);
        self.store.get_httproute(&key.namespace, &key.name)
    }

    pub fn delete_httproute(&self, route: &HTTPRoute) -> bool {
        self.delete_named_httproute(&ObjectKey::of(route))
    }

    pub fn delete_named_httproute(&self, key: &ObjectKey) -> bool {
        self.store.delete(Kind::HTTPRoute, key)
    }

    /// Insert or replace any mirrored object
    pub fn update_object(&self, obj: Object) {
        self.store.update(obj);
    }

    pub fn delete_object(&self, kind: Kind, key: &ObjectKey) -> bool {
        self.store.delete(kind, key)
    }

    /// Log the ingresses this controller manages, or why there are none
    pub fn print_state(&self) {
        let managed = self.store.list_managed_ingresses();
        if managed.is_empty() {
            let classes = self.store.list::<IngressClass>();
            let ours = self.store.list_managed_ingress_classes();
            warn!(
                "No managed ingresses: {} ingresses, {} ingress classes, {} with controller '{}'",
                self.store.len(Kind::Ingress),
                classes.len(),
                ours.len(),
                self.store.controller_name()
            );
            for class in classes {
                debug!(
                    "IngressClass {} controller={:?}",
                    class.name_any(),
                    class.spec.as_ref().and_then(|s| s.controller.as_deref())
                );
            }
            return;
        }
        for ingress in managed {
            info!("Managing ingress {}", ObjectKey::of(&*ingress));
        }
    }

    // =========================================================================
    // Sync
    // =========================================================================

    /// Admit a caller, or wait for the in-flight pass and return its outcome
    async fn admit(&self, kind: SyncKind, cancel: &CancellationToken) -> Result<Entry<'_>> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if self.allow_concurrent {
            return Ok(Entry::Run(None));
        }
        match self.debouncer.start(kind) {
            Admission::Run(guard) => Ok(Entry::Run(Some(guard))),
            Admission::Wait(waiter) => Ok(Entry::Done(waiter.wait(cancel).await?)),
        }
    }

    /// Full pass: domains, edges, tunnels, then ingress statuses
    pub async fn sync(
        &self,
        client: &dyn ObjectClient,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome> {
        let _guard = match self.admit(SyncKind::Full, cancel).await? {
            Entry::Run(guard) => guard,
            Entry::Done(outcome) => {
                debug!("Full sync not run: {:?}", outcome);
                return Ok(outcome);
            }
        };

        let start = Instant::now();
        let result = self.run_full(client).await;
        record_sync("full", start.elapsed().as_secs_f64(), result_label(&result));
        result.map(|()| SyncOutcome::Ran)
    }

    /// Partial pass: edges only
    pub async fn sync_edges(
        &self,
        client: &dyn ObjectClient,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome> {
        let _guard = match self.admit(SyncKind::Partial, cancel).await? {
            Entry::Run(guard) => guard,
            Entry::Done(outcome) => {
                debug!("Edge sync not run: {:?}", outcome);
                return Ok(outcome);
            }
        };

        let start = Instant::now();
        let result = self.run_edges(client).await;
        record_sync("edges", start.elapsed().as_secs_f64(), result_label(&result));
        result.map(|()| SyncOutcome::Ran)
    }

    async fn run_full(&self, client: &dyn ObjectClient) -> Result<()> {
        let desired = Calculator::new(&self.store, &self.settings).calculate();
        info!(
            "Desired state: {} domains, {} edges, {} tunnels",
            desired.domains.len(),
            desired.edges.len(),
            desired.tunnels.len()
        );

        let labels = self.settings.controller_labels();
        let domains = list_typed::<Domain>(client, None).await?;
        let edges = list_typed::<HTTPSEdge>(client, Some(&labels)).await?;
        let tunnels = list_typed::<Tunnel>(client, Some(&labels)).await?;

        apply::apply_domains(client, &desired.domains, &domains).await?;
        apply::apply_edges(client, desired.edges, &edges).await?;
        apply::apply_tunnels(client, desired.tunnels, &tunnels).await?;
        status::update_ingress_statuses(client, &self.store, &domains).await?;
        Ok(())
    }

    async fn run_edges(&self, client: &dyn ObjectClient) -> Result<()> {
        let desired = Calculator::new(&self.store, &self.settings).calculate_edges();
        let labels = self.settings.controller_labels();
        let edges = list_typed::<HTTPSEdge>(client, Some(&labels)).await?;
        apply::apply_edges(client, desired, &edges).await
    }

    /// Relabel Domains, Tunnels and HTTPSEdges owned by a previous deployment
    pub async fn migrate_labels(&self, client: &dyn ObjectClient) -> Result<usize> {
        let migrated = migrate::migrate_labels(client, &self.settings.controller_labels()).await?;
        if migrated > 0 {
            info!("Migrated controller labels on {} objects", migrated);
        }
        Ok(migrated)
    }
}

fn result_label(result: &Result<()>) -> &'static str {
    if result.is_ok() {
        "success"
    } else {
        "error"
    }
}
