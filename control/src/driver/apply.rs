//! Set reconciliation against the backing store
//!
//! Each `apply_*` walks the current objects, updates the ones still desired
//! when their owned fields differ, deletes the rest, and creates whatever is
//! left of the desired set. Any store error aborts the pass.

use super::compare::{domain_spec_eq, edge_spec_eq, owner_refs_eq, tunnel_spec_eq};
use crate::apis::metrics::record_apply;
use crate::calculate::edges::HTTPS_PORT_SUFFIX;
use crate::calculate::{DomainSet, TunnelKey};
use crate::client::ObjectClient;
use crate::error::Result;
use crate::store::{MirrorObject, ObjectKey};
use common::crd::{Domain, HTTPSEdge, Tunnel};
use kube::ResourceExt;
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

async fn create<K: MirrorObject>(client: &dyn ObjectClient, obj: K) -> Result<()> {
    let created = client.create(&obj.into_object()).await.map_err(|e| {
        error!("Failed to create {}: {}", K::KIND, e);
        e
    })?;
    info!("Created {} {}", K::KIND, created.key());
    record_apply(K::KIND.as_str(), "create");
    Ok(())
}

async fn update<K: MirrorObject>(client: &dyn ObjectClient, obj: K) -> Result<()> {
    let key = ObjectKey::of(&obj);
    client.update(&obj.into_object()).await.map_err(|e| {
        error!("Failed to update {} {}: {}", K::KIND, key, e);
        e
    })?;
    info!("Updated {} {}", K::KIND, key);
    record_apply(K::KIND.as_str(), "update");
    Ok(())
}

/// Delete, treating "already gone" as success
async fn delete<K: MirrorObject>(client: &dyn ObjectClient, obj: K) -> Result<()> {
    let key = ObjectKey::of(&obj);
    match client.delete(&obj.into_object()).await {
        Ok(()) => {
            info!("Deleted {} {}", K::KIND, key);
            record_apply(K::KIND.as_str(), "delete");
            Ok(())
        }
        Err(e) if e.is_not_found() => {
            debug!("{} {} already deleted", K::KIND, key);
            Ok(())
        }
        Err(e) => {
            error!("Failed to delete {} {}: {}", K::KIND, key, e);
            Err(e.into())
        }
    }
}

/// Create or update domains matched by namespace/name. Never deletes.
pub(crate) async fn apply_domains(
    client: &dyn ObjectClient,
    desired: &DomainSet,
    current: &[Domain],
) -> Result<()> {
    let current: BTreeMap<ObjectKey, &Domain> =
        current.iter().map(|d| (ObjectKey::of(d), d)).collect();

    for domain in desired.all() {
        match current.get(&ObjectKey::of(domain)) {
            Some(existing) => {
                if !domain_spec_eq(&existing.spec, &domain.spec) {
                    let mut updated = (*existing).clone();
                    updated.spec = domain.spec.clone();
                    update(client, updated).await?;
                }
            }
            None => create(client, domain.clone()).await?,
        }
    }
    Ok(())
}

/// Remove desired edges whose domain is held by a multi-hostport edge;
/// returns the dropped domains
fn drop_shadowed(desired: &mut BTreeMap<String, HTTPSEdge>, edge: &HTTPSEdge) -> Vec<String> {
    let mut dropped = Vec::new();
    for hostport in &edge.spec.hostports {
        let domain = hostport.trim_end_matches(HTTPS_PORT_SUFFIX);
        if desired.remove(domain).is_some() {
            warn!(
                "Desired edge for {} not applied: domain is held by multi-hostport edge {}",
                domain,
                ObjectKey::of(edge)
            );
            dropped.push(domain.to_string());
        }
    }
    dropped
}

/// Reconcile edges keyed by hostport domain
///
/// An owned edge with more than one hostport cannot be matched safely; it is
/// left untouched, and desired edges for any of its domains are dropped so
/// they are not re-created beside it.
pub(crate) async fn apply_edges(
    client: &dyn ObjectClient,
    mut desired: BTreeMap<String, HTTPSEdge>,
    current: &[HTTPSEdge],
) -> Result<()> {
    for edge in current {
        let hostports = &edge.spec.hostports;
        if hostports.len() != 1 {
            error!(
                "Existing owned edge {} has {} hostports {:?}, leaving it untouched",
                ObjectKey::of(edge),
                hostports.len(),
                hostports
            );
            drop_shadowed(&mut desired, edge);
            continue;
        }

        let domain = hostports[0].trim_end_matches(HTTPS_PORT_SUFFIX);
        match desired.remove(domain) {
            Some(wanted) => {
                if !edge_spec_eq(&edge.spec, &wanted.spec) {
                    let mut updated = edge.clone();
                    updated.spec = wanted.spec;
                    update(client, updated).await?;
                }
            }
            None => delete(client, edge.clone()).await?,
        }
    }

    for edge in desired.into_values() {
        create(client, edge).await?;
    }
    Ok(())
}

/// Reconcile tunnels keyed by (namespace, service, port); owner reference
/// changes alone trigger an update
pub(crate) async fn apply_tunnels(
    client: &dyn ObjectClient,
    mut desired: BTreeMap<TunnelKey, Tunnel>,
    current: &[Tunnel],
) -> Result<()> {
    for tunnel in current {
        match desired.remove(&TunnelKey::of(tunnel)) {
            Some(wanted) => {
                let owners_changed =
                    !owner_refs_eq(tunnel.owner_references(), wanted.owner_references());
                let spec_changed = !tunnel_spec_eq(&tunnel.spec, &wanted.spec);
                if owners_changed || spec_changed {
                    let mut updated = tunnel.clone();
                    updated.metadata.owner_references = wanted.metadata.owner_references;
                    updated.spec = wanted.spec;
                    update(client, updated).await?;
                }
            }
            None => delete(client, tunnel.clone()).await?,
        }
    }

    for tunnel in desired.into_values() {
        create(client, tunnel).await?;
    }
    Ok(())
}
