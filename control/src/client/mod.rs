//! Backing store access
//!
//! The driver lists, creates, updates and deletes derived objects through
//! `ObjectClient`. Two implementations exist:
//!
//! - `KindRegistry` backed by kube handlers (`KubeKind<K>`), one per kind
//! - `MemoryClient`, an in-process store that records every call

pub mod kubernetes;
pub mod memory;
pub mod registry;

pub use kubernetes::KubeKind;
pub use memory::{Call, MemoryClient, Operation};
pub use registry::{KindHandler, KindRegistry};

use crate::store::{Kind, MirrorObject, Object};
use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

pub type Labels = BTreeMap<String, String>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Kind {0} is not registered")]
    UnsupportedKind(Kind),

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }
}

/// CRUD access to the authoritative object store
#[async_trait]
pub trait ObjectClient: Send + Sync {
    /// List objects of a kind, optionally filtered by exact label matches
    async fn list(&self, kind: Kind, selector: Option<&Labels>) -> Result<Vec<Object>, ClientError>;

    /// Create an object. `generateName` is honoured when `name` is unset.
    async fn create(&self, obj: &Object) -> Result<Object, ClientError>;

    async fn update(&self, obj: &Object) -> Result<Object, ClientError>;

    /// Write only the status subresource
    async fn update_status(&self, obj: &Object) -> Result<(), ClientError>;

    async fn delete(&self, obj: &Object) -> Result<(), ClientError>;

    /// Merge-patch the object's labels
    async fn patch_labels(&self, obj: &Object, labels: &Labels) -> Result<(), ClientError>;
}

/// List and downcast in one step
pub async fn list_typed<K: MirrorObject>(
    client: &dyn ObjectClient,
    selector: Option<&Labels>,
) -> Result<Vec<K>, ClientError> {
    Ok(client
        .list(K::KIND, selector)
        .await?
        .iter()
        .filter_map(Object::to_typed::<K>)
        .collect())
}

/// Exact label match used by list selectors
pub(crate) fn labels_match(labels: &Labels, selector: Option<&Labels>) -> bool {
    selector
        .map(|sel| sel.iter().all(|(k, v)| labels.get(k) == Some(v)))
        .unwrap_or(true)
}
