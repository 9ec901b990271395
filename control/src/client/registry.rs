//! Kind registry
//!
//! Maps a `Kind` to the handler that knows how to talk to the store for it.
//! Handlers are registered once at startup; asking for a kind that was never
//! registered is a configuration error.

use super::{ClientError, Labels, ObjectClient};
use crate::store::{Kind, Object};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Per-kind store access plus naming
#[async_trait]
pub trait KindHandler: Send + Sync {
    fn kind(&self) -> Kind;

    fn singular(&self) -> &str;

    fn plural(&self) -> &str;

    async fn list(&self, selector: Option<&Labels>) -> Result<Vec<Object>, ClientError>;

    async fn create(&self, obj: &Object) -> Result<Object, ClientError>;

    async fn update(&self, obj: &Object) -> Result<Object, ClientError>;

    async fn update_status(&self, obj: &Object) -> Result<(), ClientError>;

    async fn delete(&self, obj: &Object) -> Result<(), ClientError>;

    async fn patch_labels(&self, obj: &Object, labels: &Labels) -> Result<(), ClientError>;
}

#[derive(Default, Clone)]
pub struct KindRegistry {
    handlers: HashMap<Kind, Arc<dyn KindHandler>>,
}

impl KindRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn KindHandler>) -> &mut Self {
        self.handlers.insert(handler.kind(), handler);
        self
    }

    pub fn handler(&self, kind: Kind) -> Result<&Arc<dyn KindHandler>, ClientError> {
        self.handlers
            .get(&kind)
            .ok_or(ClientError::UnsupportedKind(kind))
    }

    pub fn contains(&self, kind: Kind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Registered kinds, in declaration order
    pub fn kinds(&self) -> Vec<Kind> {
        let mut kinds: Vec<Kind> = self.handlers.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

#[async_trait]
impl ObjectClient for KindRegistry {
    async fn list(&self, kind: Kind, selector: Option<&Labels>) -> Result<Vec<Object>, ClientError> {
        self.handler(kind)?.list(selector).await
    }

    async fn create(&self, obj: &Object) -> Result<Object, ClientError> {
        self.handler(obj.kind())?.create(obj).await
    }

    async fn update(&self, obj: &Object) -> Result<Object, ClientError> {
        self.handler(obj.kind())?.update(obj).await
    }

    async fn update_status(&self, obj: &Object) -> Result<(), ClientError> {
        self.handler(obj.kind())?.update_status(obj).await
    }

    async fn delete(&self, obj: &Object) -> Result<(), ClientError> {
        self.handler(obj.kind())?.delete(obj).await
    }

    async fn patch_labels(&self, obj: &Object, labels: &Labels) -> Result<(), ClientError> {
        self.handler(obj.kind())?.patch_labels(obj, labels).await
    }
}
