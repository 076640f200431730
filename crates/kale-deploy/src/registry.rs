//! Deploy registry
//!
//! Owns every deploy record, keyed by handle. Records are immutable
//! snapshots replaced wholesale on update, so readers holding an `Arc` never
//! observe a half-applied change. Dismissed records are tombstoned, never
//! removed, and never come back.

use crate::progress::{DeployProgress, ProgressUpdate};
use crate::types::DeployHandle;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Default)]
struct Inner {
    records: BTreeMap<DeployHandle, Arc<DeployProgress>>,
    last_handle: u64,
}

/// Registry of deploy records
#[derive(Debug)]
pub struct DeployRegistry {
    inner: RwLock<Inner>,
    version: watch::Sender<u64>,
}

impl Default for DeployRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeployRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            inner: RwLock::new(Inner::default()),
            version,
        }
    }

    /// Allocate the next handle: previous maximum plus one, starting at 1
    pub fn next_handle(&self) -> DeployHandle {
        let mut inner = self.inner.write();
        inner.last_handle += 1;
        DeployHandle(inner.last_handle)
    }

    /// Merge `update` into the record for `handle`, creating it if needed
    ///
    /// Returns `false` when the record is tombstoned; the update is dropped.
    pub fn upsert(&self, handle: DeployHandle, update: ProgressUpdate) -> bool {
        {
            let mut inner = self.inner.write();
            if handle.0 > inner.last_handle {
                inner.last_handle = handle.0;
            }
            let next = match inner.records.get(&handle) {
                Some(current) if current.deleted => {
                    tracing::trace!(%handle, "update to dismissed record skipped");
                    return false;
                }
                Some(current) => current.merged(update),
                None => DeployProgress::new(handle).merged(update),
            };
            inner.records.insert(handle, Arc::new(next));
        }
        self.bump();
        true
    }

    /// Tombstone a record
    ///
    /// Returns `false` when no such record exists.
    pub fn mark_deleted(&self, handle: DeployHandle) -> bool {
        {
            let mut inner = self.inner.write();
            let Some(current) = inner.records.get(&handle) else {
                return false;
            };
            if current.deleted {
                return true;
            }
            let mut next = DeployProgress::clone(current);
            next.deleted = true;
            inner.records.insert(handle, Arc::new(next));
        }
        self.bump();
        true
    }

    /// Record for `handle`, tombstoned or not
    #[must_use]
    pub fn get(&self, handle: DeployHandle) -> Option<Arc<DeployProgress>> {
        self.inner.read().records.get(&handle).cloned()
    }

    /// Whether the record for `handle` is tombstoned
    #[must_use]
    pub fn is_deleted(&self, handle: DeployHandle) -> bool {
        self.inner
            .read()
            .records
            .get(&handle)
            .is_some_and(|r| r.deleted)
    }

    /// Non-deleted records in handle order
    #[must_use]
    pub fn visible(&self) -> Vec<Arc<DeployProgress>> {
        self.inner
            .read()
            .records
            .values()
            .filter(|r| !r.deleted)
            .cloned()
            .collect()
    }

    /// Number of records, tombstones included
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    /// Whether no record was ever created
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().records.is_empty()
    }

    /// Change notifications; the value is a monotonically increasing version
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v += 1);
    }
}
