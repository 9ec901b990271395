//! Watch adapters
//!
//! One kube watcher per mirrored kind keeps the Object Mirror current. After
//! a watcher's initial list completes, every event triggers a sync:
//!
//! - full sync: Ingress, IngressClass, Service, Gateway, GatewayClass,
//!   HTTPRoute, Domain
//! - edge-only sync: ModuleSet, TrafficPolicy
//! - none: HTTPSEdge, Tunnel (mirror refresh only)
//!
//! A sync that ends in `Requeue` or an error is retried after a delay until
//! it runs, is superseded, or the controller shuts down.

use crate::client::ObjectClient;
use crate::driver::{Driver, SyncKind, SyncOutcome};
use crate::error::Error;
use crate::store::{Kind, MirrorObject, Object, ObjectKey};
use common::crd::{Domain, HTTPSEdge, ModuleSet, TrafficPolicyResource, Tunnel};
use gateway_api::apis::standard::gatewayclasses::GatewayClass;
use gateway_api::apis::standard::gateways::Gateway;
use gateway_api::apis::standard::httproutes::HTTPRoute;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::{Ingress, IngressClass};
use kube::runtime::watcher::{self, Config as WatcherConfig, Event};
use kube::runtime::WatchStreamExt;
use kube::{Api, Client};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Delays before re-running a sync that did not complete
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub requeue: Duration,
    pub error: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            requeue: Duration::from_millis(500),
            error: Duration::from_secs(5),
        }
    }
}

/// Which sync an event of this kind calls for
pub fn trigger_for(kind: Kind) -> Option<SyncKind> {
    match kind {
        Kind::Ingress
        | Kind::IngressClass
        | Kind::Service
        | Kind::Gateway
        | Kind::GatewayClass
        | Kind::HTTPRoute
        | Kind::Domain => Some(SyncKind::Full),
        Kind::ModuleSet | Kind::TrafficPolicy => Some(SyncKind::Partial),
        Kind::HTTPSEdge | Kind::Tunnel => None,
    }
}

/// Run one sync, retrying on `Requeue` and errors
pub async fn run_sync(
    driver: &Driver,
    client: &dyn ObjectClient,
    kind: SyncKind,
    retry: RetryPolicy,
    cancel: &CancellationToken,
) {
    loop {
        let result = match kind {
            SyncKind::Full => driver.sync(client, cancel).await,
            SyncKind::Partial => driver.sync_edges(client, cancel).await,
        };
        let delay = match result {
            Ok(SyncOutcome::Ran) | Ok(SyncOutcome::Superseded) => return,
            Ok(SyncOutcome::Requeue) => {
                debug!("{:?} sync requeued", kind);
                retry.requeue
            }
            Err(Error::Cancelled) => return,
            Err(e) => {
                warn!("{:?} sync failed, retrying in {:?}: {}", kind, retry.error, e);
                retry.error
            }
        };
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => return,
        }
    }
}

/// Feed one object into the mirror through the driver
fn mirror_apply(driver: &Driver, obj: Object) {
    let key = obj.key();
    let managed = match obj {
        Object::Ingress(ingress) => driver.update_ingress((*ingress).clone()).map(|_| ()),
        Object::Gateway(gateway) => driver.update_gateway((*gateway).clone()).map(|_| ()),
        Object::HTTPRoute(route) => driver.update_httproute((*route).clone()).map(|_| ()),
        other => {
            driver.update_object(other);
            Ok(())
        }
    };
    if let Err(e) = managed {
        debug!("Mirrored {} is not managed: {}", key, e);
    }
}

fn mirror_delete(driver: &Driver, kind: Kind, key: &ObjectKey) {
    let removed = match kind {
        Kind::Ingress => driver.delete_named_ingress(key),
        Kind::Gateway => driver.delete_named_gateway(key),
        Kind::HTTPRoute => driver.delete_named_httproute(key),
        _ => driver.delete_object(kind, key),
    };
    if !removed {
        debug!("Deleted {} {} was not mirrored", kind, key);
    }
}

/// Apply a watch event to the mirror; true when it should trigger a sync
pub fn handle_event<K: MirrorObject>(driver: &Driver, event: Event<K>) -> bool {
    match event {
        Event::Init => {
            debug!("{} watcher (re)listing", K::KIND);
            false
        }
        Event::InitApply(obj) => {
            mirror_apply(driver, obj.into_object());
            false
        }
        Event::InitDone => {
            info!("{} watcher initial sync complete", K::KIND);
            true
        }
        Event::Apply(obj) => {
            mirror_apply(driver, obj.into_object());
            true
        }
        Event::Delete(obj) => {
            mirror_delete(driver, K::KIND, &ObjectKey::of(&obj));
            true
        }
    }
}

/// Watch one kind until cancelled
pub async fn watch_kind<K: MirrorObject>(
    kube: Client,
    driver: Arc<Driver>,
    backing: Arc<dyn ObjectClient>,
    cancel: CancellationToken,
) {
    let api: Api<K> = Api::all(kube);
    let stream = watcher::watcher(api, WatcherConfig::default()).default_backoff();
    futures::pin_mut!(stream);

    info!("Starting {} watcher", K::KIND);

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = stream.next() => event,
        };
        match event {
            Some(Ok(event)) => {
                if !handle_event(&driver, event) {
                    continue;
                }
                let Some(kind) = trigger_for(K::KIND) else {
                    continue;
                };
                let driver = driver.clone();
                let backing = backing.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    run_sync(&driver, &*backing, kind, RetryPolicy::default(), &cancel).await;
                });
            }
            Some(Err(e)) => warn!("{} watcher error: {}", K::KIND, e),
            None => break,
        }
    }

    info!("{} watcher stopped", K::KIND);
}

/// Spawn a watcher for every kind the driver mirrors
pub fn spawn_watchers(
    kube: Client,
    driver: Arc<Driver>,
    backing: Arc<dyn ObjectClient>,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    driver
        .mirrored_kinds()
        .into_iter()
        .map(|kind| {
            let (kube, driver, backing, cancel) =
                (kube.clone(), driver.clone(), backing.clone(), cancel.clone());
            match kind {
                Kind::Ingress => tokio::spawn(watch_kind::<Ingress>(kube, driver, backing, cancel)),
                Kind::IngressClass => {
                    tokio::spawn(watch_kind::<IngressClass>(kube, driver, backing, cancel))
                }
                Kind::Service => tokio::spawn(watch_kind::<Service>(kube, driver, backing, cancel)),
                Kind::Domain => tokio::spawn(watch_kind::<Domain>(kube, driver, backing, cancel)),
                Kind::HTTPSEdge => {
                    tokio::spawn(watch_kind::<HTTPSEdge>(kube, driver, backing, cancel))
                }
                Kind::Tunnel => tokio::spawn(watch_kind::<Tunnel>(kube, driver, backing, cancel)),
                Kind::ModuleSet => {
                    tokio::spawn(watch_kind::<ModuleSet>(kube, driver, backing, cancel))
                }
                Kind::TrafficPolicy => tokio::spawn(watch_kind::<TrafficPolicyResource>(
                    kube, driver, backing, cancel,
                )),
                Kind::Gateway => tokio::spawn(watch_kind::<Gateway>(kube, driver, backing, cancel)),
                Kind::GatewayClass => {
                    tokio::spawn(watch_kind::<GatewayClass>(kube, driver, backing, cancel))
                }
                Kind::HTTPRoute => {
                    tokio::spawn(watch_kind::<HTTPRoute>(kube, driver, backing, cancel))
                }
            }
        })
        .collect()
}
