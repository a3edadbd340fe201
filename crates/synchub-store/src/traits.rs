//! Store trait: the content repository contract.
//!
//! Every call names the node it acts on. There is no ambient "current node";
//! callers that work across nodes pass the node id explicitly.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use synchub_core::{
    Cluster, ClusterId, ConditionId, ContentItem, DistributionId, DistributionItem,
    DistributionStatus, Gid, ItemId, NodeId, PublishStatus, ReviewId, ReviewRecord, SyncStatus,
};

use crate::error::Result;

/// Filter for [`Store::query_items`]. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemQuery {
    pub item_type: Option<String>,
    pub status: Option<PublishStatus>,
    pub sync_status: Option<SyncStatus>,
    /// Matches items whose sync id names this root, ignoring the host.
    pub sync_id: Option<Gid>,
    /// Trashed items are excluded unless set.
    pub include_trash: bool,
}

impl ItemQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of_type(mut self, item_type: impl Into<String>) -> Self {
        self.item_type = Some(item_type.into());
        self
    }

    pub fn with_status(mut self, status: PublishStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_sync_status(mut self, sync_status: SyncStatus) -> Self {
        self.sync_status = Some(sync_status);
        self
    }

    pub fn linked_to(mut self, root: &Gid) -> Self {
        self.sync_id = Some(root.local_part());
        self
    }

    pub fn including_trash(mut self) -> Self {
        self.include_trash = true;
        self
    }

    pub fn matches(&self, item: &ContentItem) -> bool {
        if !self.include_trash && item.status == PublishStatus::Trash && self.status != Some(PublishStatus::Trash) {
            return false;
        }
        self.item_type.as_ref().map_or(true, |t| *t == item.item_type)
            && self.status.map_or(true, |s| s == item.status)
            && self.sync_status.map_or(true, |s| s == item.sync_status)
            && self.sync_id.as_ref().map_or(true, |root| {
                item.sync_id.as_ref().is_some_and(|gid| gid.local_part() == *root)
            })
    }
}

/// Last known membership of a content condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipSnapshot {
    pub condition_id: ConditionId,
    /// Members, newest first.
    pub members: Vec<ItemId>,
    pub fingerprint: String,
    pub checked_at: i64,
    /// When the scheduled check should look again.
    pub next_run_at: i64,
}

/// The Store trait: async interface to the content repositories of a network.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, `spawn_blocking` keeps queries off the runtime threads.
///
/// # Design Notes
///
/// - **Explicit node**: item and metadata calls take the node they act on.
/// - **Id assignment**: inserting an item, distribution item or review with
///   id 0 assigns the next free id.
/// - **Loose metadata**: metadata values are JSON; typed interpretation
///   (e.g. connection ledgers) happens in the caller.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Item Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Get an item, including trashed ones.
    async fn get_item(&self, node: NodeId, id: ItemId) -> Result<Option<ContentItem>>;

    /// Insert an item. An id of 0 is replaced by the next free id on the
    /// node. Returns the stored item.
    async fn insert_item(&self, node: NodeId, item: ContentItem) -> Result<ContentItem>;

    /// Overwrite an existing item. Fails with `NotFound` when absent.
    async fn update_item(&self, node: NodeId, item: &ContentItem) -> Result<()>;

    /// Delete an item and its metadata. Returns whether it existed.
    async fn delete_item(&self, node: NodeId, id: ItemId) -> Result<bool>;

    /// Set the item's status to trash. Returns whether it existed.
    async fn move_to_trash(&self, node: NodeId, id: ItemId) -> Result<bool>;

    /// Items on a node matching the query, ordered by id.
    async fn query_items(&self, node: NodeId, query: &ItemQuery) -> Result<Vec<ContentItem>>;

    /// Non-trashed items with the given name and type, optionally narrowed
    /// by language. Ordered by id.
    async fn find_by_name_and_type(
        &self,
        node: NodeId,
        name: &str,
        item_type: &str,
        language: Option<&str>,
    ) -> Result<Vec<ContentItem>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Metadata Operations
    // ─────────────────────────────────────────────────────────────────────────

    async fn get_metadata(&self, node: NodeId, item: ItemId, key: &str) -> Result<Option<Value>>;

    async fn set_metadata(&self, node: NodeId, item: ItemId, key: &str, value: &Value) -> Result<()>;

    async fn delete_metadata(&self, node: NodeId, item: ItemId, key: &str) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Cluster Operations
    // ─────────────────────────────────────────────────────────────────────────

    async fn list_clusters(&self) -> Result<Vec<Cluster>>;

    async fn get_cluster(&self, id: ClusterId) -> Result<Option<Cluster>>;

    async fn upsert_cluster(&self, cluster: &Cluster) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Distribution Queue
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a queue item, assigning its id.
    async fn insert_distribution(&self, item: DistributionItem) -> Result<DistributionItem>;

    async fn get_distribution(&self, id: DistributionId) -> Result<Option<DistributionItem>>;

    /// Overwrite a queue item. Fails with `NotFound` when absent.
    async fn update_distribution(&self, item: &DistributionItem) -> Result<()>;

    /// Queue items, optionally by status, ordered by id.
    async fn list_distributions(&self, status: Option<DistributionStatus>) -> Result<Vec<DistributionItem>>;

    async fn delete_distribution(&self, id: DistributionId) -> Result<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Review Records
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a review, assigning its id.
    async fn insert_review(&self, review: ReviewRecord) -> Result<ReviewRecord>;

    async fn get_review(&self, id: ReviewId) -> Result<Option<ReviewRecord>>;

    /// The most recent review of an item.
    async fn latest_review(&self, node: NodeId, item: ItemId) -> Result<Option<ReviewRecord>>;

    /// Overwrite a review. Fails with `NotFound` when absent.
    async fn update_review(&self, review: &ReviewRecord) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Condition Membership
    // ─────────────────────────────────────────────────────────────────────────

    async fn get_membership(&self, condition: ConditionId) -> Result<Option<MembershipSnapshot>>;

    async fn put_membership(&self, snapshot: &MembershipSnapshot) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_excludes_trash_by_default() {
        let mut item = ContentItem::new(NodeId(1), ItemId(1), "article", "a");
        item.status = PublishStatus::Trash;

        assert!(!ItemQuery::new().matches(&item));
        assert!(ItemQuery::new().including_trash().matches(&item));
        assert!(ItemQuery::new().with_status(PublishStatus::Trash).matches(&item));
    }

    #[test]
    fn test_query_linked_ignores_host() {
        let mut item = ContentItem::new(NodeId(3), ItemId(9), "article", "a");
        item.sync_status = SyncStatus::Linked;
        item.sync_id = Some(Gid::local(NodeId(1), ItemId(5)).with_host("hub.example"));

        let query = ItemQuery::new().linked_to(&Gid::local(NodeId(1), ItemId(5)));
        assert!(query.matches(&item));
        assert!(!ItemQuery::new().linked_to(&Gid::local(NodeId(1), ItemId(6))).matches(&item));
    }
}
