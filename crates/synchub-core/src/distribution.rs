//! Queued distribution work.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::gid::Gid;
use crate::ledger::DestinationId;
use crate::types::DistributionId;

/// What to do with the root at a destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionAction {
    /// Create or update the linked copy.
    #[default]
    Insert,
    /// Move the linked copy to trash.
    Trash,
    /// Delete the linked copy.
    Delete,
}

impl DistributionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistributionAction::Insert => "insert",
            DistributionAction::Trash => "trash",
            DistributionAction::Delete => "delete",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "trash" => DistributionAction::Trash,
            "delete" => DistributionAction::Delete,
            _ => DistributionAction::Insert,
        }
    }
}

impl fmt::Display for DistributionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Queue state of a distribution item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionStatus {
    #[default]
    Init,
    Started,
    Completed,
    Failed,
}

impl DistributionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistributionStatus::Init => "init",
            DistributionStatus::Started => "started",
            DistributionStatus::Completed => "completed",
            DistributionStatus::Failed => "failed",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "started" => DistributionStatus::Started,
            "completed" => DistributionStatus::Completed,
            "failed" => DistributionStatus::Failed,
            _ => DistributionStatus::Init,
        }
    }

    /// Completed or failed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DistributionStatus::Completed | DistributionStatus::Failed)
    }

    /// Init or started.
    pub fn is_pending(&self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for DistributionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of work: send one root to one destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionItem {
    pub id: DistributionId,
    pub root_gid: Gid,
    pub destination_id: DestinationId,
    pub action: DistributionAction,
    pub status: DistributionStatus,
    pub attempts: u32,
    pub enqueued_at: i64,
    pub updated_at: i64,
    pub last_error: Option<String>,
}

impl DistributionItem {
    /// A fresh `init` item. The id is assigned by the store.
    pub fn new(root_gid: Gid, destination_id: DestinationId, action: DistributionAction, now: i64) -> Self {
        Self {
            id: DistributionId(0),
            root_gid,
            destination_id,
            action,
            status: DistributionStatus::Init,
            attempts: 0,
            enqueued_at: now,
            updated_at: now,
            last_error: None,
        }
    }

    /// Whether this item would do the same work as `other`.
    pub fn same_work(&self, root_gid: &Gid, destination_id: &DestinationId, action: DistributionAction) -> bool {
        self.root_gid == *root_gid && self.destination_id == *destination_id && self.action == action
    }

    /// Pending for longer than `threshold_ms` at `now`.
    pub fn is_stuck(&self, now: i64, threshold_ms: i64) -> bool {
        self.status.is_pending() && now - self.enqueued_at >= threshold_ms
    }

    /// Key serializing runs of the same work.
    pub fn work_key(&self) -> (Gid, DestinationId) {
        (self.root_gid.clone(), self.destination_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ItemId, NodeId};

    #[test]
    fn test_stuck_after_threshold() {
        let t0 = 1_000_000;
        let mut item = DistributionItem::new(
            Gid::local(NodeId(1), ItemId(5)),
            DestinationId::Local(NodeId(2)),
            DistributionAction::Insert,
            t0,
        );
        let five_min = 300_000;
        assert!(!item.is_stuck(t0 + 60_000, five_min));
        assert!(item.is_stuck(t0 + 360_000, five_min));

        item.status = DistributionStatus::Completed;
        assert!(!item.is_stuck(t0 + 360_000, five_min));
    }

    #[test]
    fn test_status_string_forms() {
        for status in [
            DistributionStatus::Init,
            DistributionStatus::Started,
            DistributionStatus::Completed,
            DistributionStatus::Failed,
        ] {
            assert_eq!(DistributionStatus::from_str_lossy(status.as_str()), status);
        }
        assert_eq!(DistributionAction::from_str_lossy("trash"), DistributionAction::Trash);
    }
}
