//! Review gate state machine.
//!
//! ```text
//! new ──submit──▶ in_review ──approve──▶ approved (terminal)
//!                   │  ▲
//!                 deny │ (message recorded, snapshot stays authoritative)
//!                   └──┘
//! any non-terminal ──revert──▶ reverted (terminal)
//! ```
//!
//! While a record is not terminal, distribution uses the previous snapshot
//! instead of the live item.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::item::ContentItem;
use crate::types::{ClusterId, ItemId, NodeId, ReviewId, UserId};

/// Review state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewState {
    #[default]
    New,
    InReview,
    /// The change is live and has been released for distribution.
    Approved,
    /// The previous snapshot was restored onto the live item.
    Reverted,
}

impl ReviewState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewState::New => "new",
            ReviewState::InReview => "in_review",
            ReviewState::Approved => "approved",
            ReviewState::Reverted => "reverted",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "in_review" | "denied" => ReviewState::InReview,
            "approved" => ReviewState::Approved,
            "reverted" => ReviewState::Reverted,
            _ => ReviewState::New,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReviewState::Approved | ReviewState::Reverted)
    }
}

/// What a review message records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Note,
    Denial,
    Approval,
    Revert,
}

/// One entry of the review audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewMessage {
    pub kind: MessageKind,
    pub author: Option<UserId>,
    pub body: String,
    pub at: i64,
}

/// A pending or decided change to one source item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub id: ReviewId,
    pub item_id: ItemId,
    pub source_node_id: NodeId,
    pub cluster_id: ClusterId,
    pub state: ReviewState,
    /// The item as it was before the reviewed change. `None` when the item
    /// had never been distributed.
    pub previous_snapshot: Option<ContentItem>,
    pub messages: Vec<ReviewMessage>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// What distribution should send for a source item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateView<'a> {
    /// No pending review: send the live item.
    Live,
    /// Pending review: send the snapshot.
    Snapshot(&'a ContentItem),
    /// Pending review of an item that has no prior state: send nothing.
    Withheld,
}

impl ReviewRecord {
    /// Open a record in `new`.
    pub fn open(
        id: ReviewId,
        cluster_id: ClusterId,
        item: &ContentItem,
        previous_snapshot: Option<ContentItem>,
        now: i64,
    ) -> Self {
        Self {
            id,
            item_id: item.id,
            source_node_id: item.node_id,
            cluster_id,
            state: ReviewState::New,
            previous_snapshot,
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Whether the last decision on this record was a denial.
    pub fn is_denied(&self) -> bool {
        self.state == ReviewState::InReview
            && self
                .messages
                .iter()
                .rev()
                .find(|m| m.kind != MessageKind::Note)
                .is_some_and(|m| m.kind == MessageKind::Denial)
    }

    /// Record a further edit on a non-terminal record. The original snapshot
    /// is kept.
    pub fn touch(&mut self, now: i64) -> Result<()> {
        self.guard("update")?;
        self.updated_at = now;
        Ok(())
    }

    /// `new | denied → in_review`. Idempotent while in review.
    pub fn submit(&mut self, now: i64) -> Result<()> {
        self.guard("submit")?;
        self.state = ReviewState::InReview;
        self.updated_at = now;
        Ok(())
    }

    /// `in_review → approved`.
    pub fn approve(&mut self, reviewer: Option<UserId>, now: i64) -> Result<()> {
        self.require_in_review("approve")?;
        self.state = ReviewState::Approved;
        self.push_message(MessageKind::Approval, reviewer, String::new(), now);
        Ok(())
    }

    /// Record a denial. The record stays in review.
    pub fn deny(&mut self, reviewer: Option<UserId>, message: impl Into<String>, now: i64) -> Result<()> {
        self.require_in_review("deny")?;
        self.push_message(MessageKind::Denial, reviewer, message.into(), now);
        Ok(())
    }

    /// Mark reverted and hand back the snapshot to restore onto the live item.
    pub fn revert(&mut self, reviewer: Option<UserId>, message: impl Into<String>, now: i64) -> Result<Option<ContentItem>> {
        if self.state == ReviewState::Reverted {
            return Err(self.invalid("revert"));
        }
        self.state = ReviewState::Reverted;
        self.push_message(MessageKind::Revert, reviewer, message.into(), now);
        Ok(self.previous_snapshot.clone())
    }

    /// Add a free-form note.
    pub fn note(&mut self, author: Option<UserId>, body: impl Into<String>, now: i64) {
        self.push_message(MessageKind::Note, author, body.into(), now);
    }

    /// What distribution may send while this record exists.
    pub fn gate_view(&self) -> GateView<'_> {
        if self.is_terminal() {
            return GateView::Live;
        }
        match &self.previous_snapshot {
            Some(snapshot) => GateView::Snapshot(snapshot),
            None => GateView::Withheld,
        }
    }

    fn push_message(&mut self, kind: MessageKind, author: Option<UserId>, body: String, now: i64) {
        self.messages.push(ReviewMessage {
            kind,
            author,
            body,
            at: now,
        });
        self.updated_at = now;
    }

    fn guard(&self, operation: &'static str) -> Result<()> {
        if self.is_terminal() {
            return Err(self.invalid(operation));
        }
        Ok(())
    }

    fn require_in_review(&self, operation: &'static str) -> Result<()> {
        if self.state != ReviewState::InReview {
            return Err(self.invalid(operation));
        }
        Ok(())
    }

    fn invalid(&self, operation: &'static str) -> CoreError {
        CoreError::InvalidTransition {
            review: self.id,
            operation,
            state: self.state.as_str(),
        }
    }
}
