//! In-memory implementation of the Store trait.
//!
//! Same semantics as SQLite, nothing persisted. Used by tests and by the
//! loopback transport to host whole networks in one process.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use serde_json::Value;

use synchub_core::{
    Cluster, ClusterId, ConditionId, ContentItem, DistributionId, DistributionItem,
    DistributionStatus, ItemId, NodeId, PublishStatus, ReviewId, ReviewRecord,
};

use crate::error::{Result, StoreError};
use crate::traits::{ItemQuery, MembershipSnapshot, Store};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Items per node, ordered by id.
    items: HashMap<NodeId, BTreeMap<ItemId, ContentItem>>,

    /// Metadata: (node, item) -> key -> value.
    meta: HashMap<(NodeId, ItemId), BTreeMap<String, Value>>,

    clusters: BTreeMap<ClusterId, Cluster>,

    distributions: BTreeMap<DistributionId, DistributionItem>,
    next_distribution: u64,

    reviews: BTreeMap<ReviewId, ReviewRecord>,
    next_review: u64,

    memberships: HashMap<ConditionId, MembershipSnapshot>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, MemoryStoreInner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryStoreInner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_item(&self, node: NodeId, id: ItemId) -> Result<Option<ContentItem>> {
        let inner = self.read();
        Ok(inner.items.get(&node).and_then(|items| items.get(&id)).cloned())
    }

    async fn insert_item(&self, node: NodeId, mut item: ContentItem) -> Result<ContentItem> {
        let mut inner = self.write();
        let items = inner.items.entry(node).or_default();

        if item.id == ItemId(0) {
            let next = items.keys().next_back().map_or(1, |id| id.0 + 1);
            item.id = ItemId(next);
        }
        item.node_id = node;
        items.insert(item.id, item.clone());

        Ok(item)
    }

    async fn update_item(&self, node: NodeId, item: &ContentItem) -> Result<()> {
        let mut inner = self.write();
        let slot = inner
            .items
            .get_mut(&node)
            .and_then(|items| items.get_mut(&item.id))
            .ok_or_else(|| StoreError::NotFound(format!("item {} on node {}", item.id, node)))?;

        *slot = item.clone();
        slot.node_id = node;
        Ok(())
    }

    async fn delete_item(&self, node: NodeId, id: ItemId) -> Result<bool> {
        let mut inner = self.write();
        inner.meta.remove(&(node, id));
        Ok(inner
            .items
            .get_mut(&node)
            .and_then(|items| items.remove(&id))
            .is_some())
    }

    async fn move_to_trash(&self, node: NodeId, id: ItemId) -> Result<bool> {
        let mut inner = self.write();
        match inner.items.get_mut(&node).and_then(|items| items.get_mut(&id)) {
            Some(item) => {
                item.status = PublishStatus::Trash;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn query_items(&self, node: NodeId, query: &ItemQuery) -> Result<Vec<ContentItem>> {
        let inner = self.read();
        Ok(inner
            .items
            .get(&node)
            .map(|items| items.values().filter(|item| query.matches(item)).cloned().collect())
            .unwrap_or_default())
    }

    async fn find_by_name_and_type(
        &self,
        node: NodeId,
        name: &str,
        item_type: &str,
        language: Option<&str>,
    ) -> Result<Vec<ContentItem>> {
        let inner = self.read();
        Ok(inner
            .items
            .get(&node)
            .map(|items| {
                items
                    .values()
                    .filter(|item| {
                        item.status != PublishStatus::Trash
                            && item.name == name
                            && item.item_type == item_type
                            && language.map_or(true, |lang| item.language.as_deref() == Some(lang))
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_metadata(&self, node: NodeId, item: ItemId, key: &str) -> Result<Option<Value>> {
        let inner = self.read();
        Ok(inner.meta.get(&(node, item)).and_then(|m| m.get(key)).cloned())
    }

    async fn set_metadata(&self, node: NodeId, item: ItemId, key: &str, value: &Value) -> Result<()> {
        let mut inner = self.write();
        inner
            .meta
            .entry((node, item))
            .or_default()
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn delete_metadata(&self, node: NodeId, item: ItemId, key: &str) -> Result<()> {
        let mut inner = self.write();
        if let Some(meta) = inner.meta.get_mut(&(node, item)) {
            meta.remove(key);
        }
        Ok(())
    }

    async fn list_clusters(&self) -> Result<Vec<Cluster>> {
        Ok(self.read().clusters.values().cloned().collect())
    }

    async fn get_cluster(&self, id: ClusterId) -> Result<Option<Cluster>> {
        Ok(self.read().clusters.get(&id).cloned())
    }

    async fn upsert_cluster(&self, cluster: &Cluster) -> Result<()> {
        self.write().clusters.insert(cluster.id, cluster.clone());
        Ok(())
    }

    async fn insert_distribution(&self, mut item: DistributionItem) -> Result<DistributionItem> {
        let mut inner = self.write();
        inner.next_distribution += 1;
        item.id = DistributionId(inner.next_distribution);
        inner.distributions.insert(item.id, item.clone());
        Ok(item)
    }

    async fn get_distribution(&self, id: DistributionId) -> Result<Option<DistributionItem>> {
        Ok(self.read().distributions.get(&id).cloned())
    }

    async fn update_distribution(&self, item: &DistributionItem) -> Result<()> {
        let mut inner = self.write();
        let slot = inner
            .distributions
            .get_mut(&item.id)
            .ok_or_else(|| StoreError::NotFound(format!("distribution item {}", item.id)))?;
        *slot = item.clone();
        Ok(())
    }

    async fn list_distributions(&self, status: Option<DistributionStatus>) -> Result<Vec<DistributionItem>> {
        let inner = self.read();
        Ok(inner
            .distributions
            .values()
            .filter(|item| status.map_or(true, |s| item.status == s))
            .cloned()
            .collect())
    }

    async fn delete_distribution(&self, id: DistributionId) -> Result<bool> {
        Ok(self.write().distributions.remove(&id).is_some())
    }

    async fn insert_review(&self, mut review: ReviewRecord) -> Result<ReviewRecord> {
        let mut inner = self.write();
        inner.next_review += 1;
        review.id = ReviewId(inner.next_review);
        inner.reviews.insert(review.id, review.clone());
        Ok(review)
    }

    async fn get_review(&self, id: ReviewId) -> Result<Option<ReviewRecord>> {
        Ok(self.read().reviews.get(&id).cloned())
    }

    async fn latest_review(&self, node: NodeId, item: ItemId) -> Result<Option<ReviewRecord>> {
        let inner = self.read();
        Ok(inner
            .reviews
            .values()
            .rev()
            .find(|r| r.source_node_id == node && r.item_id == item)
            .cloned())
    }

    async fn update_review(&self, review: &ReviewRecord) -> Result<()> {
        let mut inner = self.write();
        let slot = inner
            .reviews
            .get_mut(&review.id)
            .ok_or_else(|| StoreError::NotFound(format!("review {}", review.id)))?;
        *slot = review.clone();
        Ok(())
    }

    async fn get_membership(&self, condition: ConditionId) -> Result<Option<MembershipSnapshot>> {
        Ok(self.read().memberships.get(&condition).cloned())
    }

    async fn put_membership(&self, snapshot: &MembershipSnapshot) -> Result<()> {
        self.write()
            .memberships
            .insert(snapshot.condition_id, snapshot.clone());
        Ok(())
    }
}
