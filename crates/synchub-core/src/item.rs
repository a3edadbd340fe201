//! Content items and their sync attributes.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::gid::Gid;
use crate::types::{ItemId, NodeId};

/// Sync role of an item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Not synchronized.
    #[default]
    None,
    /// The authoritative copy.
    Root,
    /// A copy that receives updates from a root.
    Linked,
}

impl SyncStatus {
    /// Stable string form used in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::None => "none",
            SyncStatus::Root => "root",
            SyncStatus::Linked => "linked",
        }
    }

    /// Parse the storage form.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "root" => SyncStatus::Root,
            "linked" => SyncStatus::Linked,
            _ => SyncStatus::None,
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Publication status of an item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStatus {
    #[default]
    Draft,
    Pending,
    Publish,
    Private,
    Trash,
}

impl PublishStatus {
    /// Stable string form used in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishStatus::Draft => "draft",
            PublishStatus::Pending => "pending",
            PublishStatus::Publish => "publish",
            PublishStatus::Private => "private",
            PublishStatus::Trash => "trash",
        }
    }

    /// Parse the storage form.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "pending" => PublishStatus::Pending,
            "publish" => PublishStatus::Publish,
            "private" => PublishStatus::Private,
            "trash" => PublishStatus::Trash,
            _ => PublishStatus::Draft,
        }
    }
}

/// A node-local unit of content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    /// Node-local id.
    pub id: ItemId,
    /// Owning node.
    pub node_id: NodeId,
    /// Content type, e.g. `article`.
    pub item_type: String,
    /// Slug, used to detect equivalent content on import.
    pub name: String,
    pub title: String,
    pub body: String,
    pub status: PublishStatus,
    /// Language code when the item is part of a translation set.
    pub language: Option<String>,
    /// Publication time (Unix ms).
    pub published_at: i64,
    /// Last modification time (Unix ms).
    pub modified_at: i64,
    /// Taxonomy name → term slugs.
    pub terms: BTreeMap<String, BTreeSet<String>>,
    /// Items this one depends on; they travel with it on distribution.
    pub dependencies: Vec<ItemId>,
    /// Sync role.
    pub sync_status: SyncStatus,
    /// GID of the root; `None` when not synchronized.
    pub sync_id: Option<Gid>,
}

impl ContentItem {
    /// Create an unsynchronized draft.
    pub fn new(node_id: NodeId, id: ItemId, item_type: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id,
            node_id,
            item_type: item_type.into(),
            title: name.clone(),
            name,
            body: String::new(),
            status: PublishStatus::Draft,
            language: None,
            published_at: 0,
            modified_at: 0,
            terms: BTreeMap::new(),
            dependencies: Vec::new(),
            sync_status: SyncStatus::None,
            sync_id: None,
        }
    }

    /// Whether the item is publicly published.
    pub fn is_published(&self) -> bool {
        self.status == PublishStatus::Publish
    }

    pub fn is_root(&self) -> bool {
        self.sync_status == SyncStatus::Root
    }

    pub fn is_linked(&self) -> bool {
        self.sync_status == SyncStatus::Linked
    }

    /// Whether the item carries the given term.
    pub fn has_term(&self, taxonomy: &str, term: &str) -> bool {
        self.terms
            .get(taxonomy)
            .is_some_and(|terms| terms.contains(term))
    }

    /// Add a taxonomy term.
    pub fn with_term(mut self, taxonomy: &str, term: &str) -> Self {
        self.terms
            .entry(taxonomy.to_string())
            .or_default()
            .insert(term.to_string());
        self
    }

    /// Mark as published at the given time.
    pub fn published(mut self, at: i64) -> Self {
        self.status = PublishStatus::Publish;
        self.published_at = at;
        self.modified_at = at;
        self
    }

    /// Copy the editable content of `source` onto this item.
    ///
    /// Identity (id, node) and sync attributes are preserved.
    pub fn apply_content(&mut self, source: &ContentItem) {
        self.item_type = source.item_type.clone();
        self.name = source.name.clone();
        self.title = source.title.clone();
        self.body = source.body.clone();
        self.status = source.status;
        self.language = source.language.clone();
        self.published_at = source.published_at;
        self.modified_at = source.modified_at;
        self.terms = source.terms.clone();
    }

    /// Whether the editable content of two items is identical.
    pub fn same_content(&self, other: &ContentItem) -> bool {
        self.item_type == other.item_type
            && self.name == other.name
            && self.title == other.title
            && self.body == other.body
            && self.status == other.status
            && self.language == other.language
            && self.published_at == other.published_at
            && self.terms == other.terms
    }

    /// Detach the item from synchronization.
    pub fn unlink(&mut self) {
        self.sync_status = SyncStatus::None;
        self.sync_id = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_content_preserves_identity() {
        let mut local = ContentItem::new(NodeId(3), ItemId(10), "article", "hello");
        local.sync_status = SyncStatus::Linked;
        local.sync_id = Some(Gid::local(NodeId(1), ItemId(5)));

        let mut root = ContentItem::new(NodeId(1), ItemId(5), "article", "hello")
            .published(1_000)
            .with_term("category", "news");
        root.title = "Hello World".into();

        local.apply_content(&root);

        assert_eq!(local.id, ItemId(10));
        assert_eq!(local.node_id, NodeId(3));
        assert_eq!(local.title, "Hello World");
        assert!(local.has_term("category", "news"));
        assert!(local.is_linked());
        assert!(local.same_content(&root));
    }

    #[test]
    fn test_status_string_forms() {
        for status in [SyncStatus::None, SyncStatus::Root, SyncStatus::Linked] {
            assert_eq!(SyncStatus::from_str_lossy(status.as_str()), status);
        }
        assert_eq!(SyncStatus::from_str_lossy("garbage"), SyncStatus::None);
        assert_eq!(PublishStatus::from_str_lossy("publish"), PublishStatus::Publish);
    }
}
