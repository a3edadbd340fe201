//! Stored connection ledgers.
//!
//! The ledger of a root lives in the root item's metadata. Every mutation is
//! a read-modify-write under a per-root async mutex, so two destinations
//! added in the same instant cannot overwrite each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use synchub_core::{
    ConnectionLedger, ConnectionRecord, CoreError, DestinationId, Gid, ItemId, LedgerChange, NodeId,
};
use synchub_store::Store;

use crate::error::{Result, SyncError};

/// Metadata key holding a root's ledger.
pub const LEDGER_META_KEY: &str = "synchub_connections";

type LockMap = Mutex<HashMap<(NodeId, ItemId), Arc<AsyncMutex<()>>>>;

/// Reads and writes ledgers of roots on one network.
pub struct LedgerService<S: Store + ?Sized> {
    store: Arc<S>,
    locks: LockMap,
}

/// Exclusive access to one root's ledger. The lock entry is dropped from
/// the map once nobody else holds or waits for it.
struct RootGuard<'a> {
    locks: &'a LockMap,
    key: (NodeId, ItemId),
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for RootGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if locks.get(&self.key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&self.key);
        }
    }
}

impl<S: Store + ?Sized> LedgerService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn acquire(&self, root: &Gid) -> RootGuard<'_> {
        let key = (root.node_id, root.item_id);
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            locks.entry(key).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
        };
        RootGuard {
            locks: &self.locks,
            key,
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Read a root's ledger, normalizing legacy shapes.
    ///
    /// Metadata that cannot be interpreted at all reads as an empty ledger;
    /// the repairer rebuilds it from the linked copies.
    pub async fn read(&self, root: &Gid) -> Result<ConnectionLedger> {
        match self.load(root).await {
            Err(SyncError::Core(CoreError::Normalization(detail))) => {
                tracing::warn!(root = %root, error = %detail, "ignoring unreadable ledger");
                Ok(ConnectionLedger::new())
            }
            result => result,
        }
    }

    /// Read a root's ledger, failing with [`CoreError::Normalization`] when
    /// the stored metadata cannot be interpreted.
    pub async fn load(&self, root: &Gid) -> Result<ConnectionLedger> {
        let stored = self
            .store
            .get_metadata(root.node_id, root.item_id, LEDGER_META_KEY)
            .await?;
        Ok(Self::interpret(stored.as_ref())?)
    }

    fn interpret(stored: Option<&Value>) -> synchub_core::Result<ConnectionLedger> {
        match stored {
            Some(raw) => ConnectionLedger::normalize(raw),
            None => Ok(ConnectionLedger::new()),
        }
    }

    /// Upsert one entry.
    pub async fn add_connection(&self, root: &Gid, destination: &DestinationId, record: ConnectionRecord) -> Result<LedgerChange> {
        self.modify(root, |ledger| ledger.add_connection(destination, record)).await
    }

    /// Delete one entry. Absent entries are fine.
    pub async fn remove_connection(&self, root: &Gid, destination: &DestinationId) -> Result<LedgerChange> {
        self.modify(root, |ledger| ledger.remove_connection(destination)).await
    }

    /// Replace the whole ledger.
    pub async fn replace(&self, root: &Gid, ledger: &ConnectionLedger) -> Result<()> {
        let _guard = self.acquire(root).await;
        self.write(root, ledger).await
    }

    /// Drop the ledger metadata entirely.
    pub async fn clear(&self, root: &Gid) -> Result<()> {
        let _guard = self.acquire(root).await;
        self.store
            .delete_metadata(root.node_id, root.item_id, LEDGER_META_KEY)
            .await?;
        Ok(())
    }

    async fn modify<F>(&self, root: &Gid, f: F) -> Result<LedgerChange>
    where
        F: FnOnce(&mut ConnectionLedger) -> LedgerChange,
    {
        let _guard = self.acquire(root).await;

        let stored = self
            .store
            .get_metadata(root.node_id, root.item_id, LEDGER_META_KEY)
            .await?;
        // Unreadable metadata is left in place for the repairer.
        let mut ledger = Self::interpret(stored.as_ref()).map_err(|e| {
            tracing::warn!(root = %root, error = %e, "refusing to write over unreadable ledger");
            e
        })?;

        let change = f(&mut ledger);

        // A legacy shape is rewritten even when the entry was already there.
        let canonical = ledger.to_value();
        let legacy = stored.as_ref().is_some_and(|raw| *raw != canonical);
        if change.is_write() || legacy {
            self.write_value(root, &canonical).await?;
            tracing::debug!(root = %root, ?change, entries = ledger.len(), "ledger updated");
        }

        Ok(change)
    }

    async fn write(&self, root: &Gid, ledger: &ConnectionLedger) -> Result<()> {
        self.write_value(root, &ledger.to_value()).await
    }

    async fn write_value(&self, root: &Gid, value: &Value) -> Result<()> {
        self.store
            .set_metadata(root.node_id, root.item_id, LEDGER_META_KEY, value)
            .await?;
        Ok(())
    }
}
