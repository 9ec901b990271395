//! In-memory backing store
//!
//! Behaves like the API server for the operations the driver uses and keeps
//! a log of every call, so tests can assert on exactly which mutations a
//! sync issued.

use super::{labels_match, ClientError, Labels, ObjectClient};
use crate::store::{safe_read, safe_write, Kind, MirrorObject, Object, ObjectKey};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    List,
    Create,
    Update,
    UpdateStatus,
    Delete,
    PatchLabels,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub operation: Operation,
    pub kind: Kind,
    pub key: ObjectKey,
}

#[derive(Debug, Default)]
pub struct MemoryClient {
    objects: RwLock<HashMap<Kind, BTreeMap<ObjectKey, Object>>>,
    calls: Mutex<Vec<Call>>,
    failures: Mutex<HashSet<(Operation, Kind)>>,
    generated: AtomicU64,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place an object in the store without recording a call
    pub fn insert<K: MirrorObject>(&self, obj: K) {
        let obj = obj.into_object();
        safe_write(&self.objects)
            .entry(obj.kind())
            .or_default()
            .insert(obj.key(), obj);
    }

    pub fn objects(&self, kind: Kind) -> Vec<Object> {
        safe_read(&self.objects)
            .get(&kind)
            .map(|entries| entries.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn typed<K: MirrorObject>(&self) -> Vec<K> {
        self.objects(K::KIND)
            .iter()
            .filter_map(Object::to_typed::<K>)
            .collect()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Calls of one operation against one kind
    pub fn count(&self, operation: Operation, kind: Kind) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.operation == operation && c.kind == kind)
            .count()
    }

    /// Mutating calls only (everything except list)
    pub fn mutations(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.operation != Operation::List)
            .collect()
    }

    pub fn clear_calls(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }

    /// Make every future `operation` on `kind` fail with an API error
    pub fn fail_on(&self, operation: Operation, kind: Kind) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.insert((operation, kind));
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.clear();
        }
    }

    fn record(&self, operation: Operation, kind: Kind, key: ObjectKey) -> Result<(), ClientError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(Call {
                operation,
                kind,
                key: key.clone(),
            });
        }
        let failing = self
            .failures
            .lock()
            .map(|f| f.contains(&(operation, kind)))
            .unwrap_or(false);
        if failing {
            return Err(ClientError::Kube(kube::Error::Service(
                format!("injected {:?} failure for {} {}", operation, kind, key).into(),
            )));
        }
        Ok(())
    }

    fn require(&self, kind: Kind, key: &ObjectKey) -> Result<Object, ClientError> {
        safe_read(&self.objects)
            .get(&kind)
            .and_then(|entries| entries.get(key))
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("{} {}", kind, key)))
    }

    fn store(&self, obj: Object) {
        safe_write(&self.objects)
            .entry(obj.kind())
            .or_default()
            .insert(obj.key(), obj);
    }
}

#[async_trait]
impl ObjectClient for MemoryClient {
    async fn list(&self, kind: Kind, selector: Option<&Labels>) -> Result<Vec<Object>, ClientError> {
        self.record(Operation::List, kind, ObjectKey::new("", ""))?;
        Ok(self
            .objects(kind)
            .into_iter()
            .filter(|obj| labels_match(&obj.labels(), selector))
            .collect())
    }

    async fn create(&self, obj: &Object) -> Result<Object, ClientError> {
        let mut created = obj.clone();
        let meta = created.meta_mut();
        if meta.name.as_deref().unwrap_or_default().is_empty() {
            let n = self.generated.fetch_add(1, Ordering::Relaxed);
            let prefix = meta.generate_name.clone().unwrap_or_default();
            meta.name = Some(format!("{}{:05}", prefix, n));
        }
        if meta.uid.is_none() {
            meta.uid = Some(format!("mem-uid-{}", self.generated.fetch_add(1, Ordering::Relaxed)));
        }

        self.record(Operation::Create, created.kind(), created.key())?;
        if self.require(created.kind(), &created.key()).is_ok() {
            return Err(ClientError::Kube(kube::Error::Service(
                format!("{} {} already exists", created.kind(), created.key()).into(),
            )));
        }
        self.store(created.clone());
        Ok(created)
    }

    async fn update(&self, obj: &Object) -> Result<Object, ClientError> {
        self.record(Operation::Update, obj.kind(), obj.key())?;
        self.require(obj.kind(), &obj.key())?;
        self.store(obj.clone());
        Ok(obj.clone())
    }

    async fn update_status(&self, obj: &Object) -> Result<(), ClientError> {
        self.record(Operation::UpdateStatus, obj.kind(), obj.key())?;
        self.require(obj.kind(), &obj.key())?;
        self.store(obj.clone());
        Ok(())
    }

    async fn delete(&self, obj: &Object) -> Result<(), ClientError> {
        self.record(Operation::Delete, obj.kind(), obj.key())?;
        let removed = safe_write(&self.objects)
            .get_mut(&obj.kind())
            .and_then(|entries| entries.remove(&obj.key()));
        match removed {
            Some(_) => Ok(()),
            None => Err(ClientError::NotFound(format!("{} {}", obj.kind(), obj.key()))),
        }
    }

    async fn patch_labels(&self, obj: &Object, labels: &Labels) -> Result<(), ClientError> {
        self.record(Operation::PatchLabels, obj.kind(), obj.key())?;
        let mut current = self.require(obj.kind(), &obj.key())?;
        current
            .meta_mut()
            .labels
            .get_or_insert_with(BTreeMap::new)
            .extend(labels.clone());
        self.store(current);
        Ok(())
    }
}
