//! One-time label migration
//!
//! Objects stamped by a previous controller deployment (different manager
//! namespace or name) are relabelled so this instance owns them.

use crate::apis::metrics::record_apply;
use crate::client::{Labels, ObjectClient};
use crate::error::Result;
use crate::store::{Kind, Object};
use common::labels::{CONTROLLER_NAME, CONTROLLER_NAMESPACE};
use tracing::{error, info};

const MIGRATED_KINDS: &[Kind] = &[Kind::Domain, Kind::Tunnel, Kind::HTTPSEdge];

/// True when the object carries both controller labels and either differs
fn needs_migration(obj: &Object, ours: &Labels) -> bool {
    let labels = obj.labels();
    match (labels.get(CONTROLLER_NAMESPACE), labels.get(CONTROLLER_NAME)) {
        (Some(namespace), Some(name)) => {
            Some(namespace) != ours.get(CONTROLLER_NAMESPACE) || Some(name) != ours.get(CONTROLLER_NAME)
        }
        _ => false,
    }
}

/// Relabel foreign-owned objects; returns how many were patched
pub(crate) async fn migrate_labels(client: &dyn ObjectClient, ours: &Labels) -> Result<usize> {
    let mut migrated = 0;
    for kind in MIGRATED_KINDS {
        for obj in client.list(*kind, None).await? {
            if !needs_migration(&obj, ours) {
                continue;
            }
            client.patch_labels(&obj, ours).await.map_err(|e| {
                error!("Failed to migrate labels of {} {}: {}", kind, obj.key(), e);
                e
            })?;
            info!("Migrated controller labels of {} {}", kind, obj.key());
            record_apply(kind.as_str(), "migrate_labels");
            migrated += 1;
        }
    }
    Ok(migrated)
}
