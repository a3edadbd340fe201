//! Administrative request surface.
//!
//! Requests are JSON documents tagged by `"request"`. Answers are plain
//! strings: `success::<message>` or `error::<message>`, with structured
//! results serialized as JSON after the prefix.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use synchub_core::{
    now_millis, ConflictPolicies, DestinationId, DistributionId, DistributionItem, Gid, ItemId, NodeId,
    RepairMode, ReviewId, ReviewRecord, UserId,
};
use synchub_store::{Directory, Store};
use synchub_sync::{EnqueueOptions, Transport};

use crate::error::Result;
use crate::hub::Hub;

pub const SUCCESS_PREFIX: &str = "success::";
pub const ERROR_PREFIX: &str = "error::";

/// One administrative request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum AdminRequest {
    Enqueue {
        root: Gid,
        destinations: Vec<DestinationId>,
        #[serde(default)]
        options: EnqueueOptions,
    },
    Run {
        id: DistributionId,
        #[serde(default)]
        policies: ConflictPolicies,
    },
    RunBatch {
        ids: Vec<DistributionId>,
        #[serde(default)]
        start: usize,
        #[serde(default)]
        policies: ConflictPolicies,
    },
    Requeue {
        id: DistributionId,
    },
    /// Requeue and run every failed item with attempts left.
    RetryFailed {
        #[serde(default)]
        policies: ConflictPolicies,
    },
    /// Inspect one item; `autorepair` applies low-risk fixes, `repair`
    /// (together with `autorepair`) everything.
    RepairPost {
        node: NodeId,
        item: ItemId,
        #[serde(default)]
        autorepair: bool,
        #[serde(default)]
        repair: bool,
    },
    Approve {
        review: ReviewId,
        #[serde(default)]
        reviewer: Option<UserId>,
    },
    Deny {
        review: ReviewId,
        #[serde(default)]
        reviewer: Option<UserId>,
        #[serde(default)]
        message: String,
    },
    Revert {
        review: ReviewId,
        #[serde(default)]
        reviewer: Option<UserId>,
        #[serde(default)]
        message: String,
    },
    Note {
        review: ReviewId,
        #[serde(default)]
        author: Option<UserId>,
        body: String,
    },
    GetLedger {
        root: Gid,
    },
    GetReview {
        review: ReviewId,
    },
    StuckItems {
        #[serde(default)]
        now: Option<i64>,
    },
    ScheduledCheck {
        #[serde(default)]
        now: Option<i64>,
        #[serde(default)]
        policies: ConflictPolicies,
    },
}

impl AdminRequest {
    pub fn name(&self) -> &'static str {
        match self {
            AdminRequest::Enqueue { .. } => "enqueue",
            AdminRequest::Run { .. } => "run",
            AdminRequest::RunBatch { .. } => "run_batch",
            AdminRequest::Requeue { .. } => "requeue",
            AdminRequest::RetryFailed { .. } => "retry_failed",
            AdminRequest::RepairPost { .. } => "repair_post",
            AdminRequest::Approve { .. } => "approve",
            AdminRequest::Deny { .. } => "deny",
            AdminRequest::Revert { .. } => "revert",
            AdminRequest::Note { .. } => "note",
            AdminRequest::GetLedger { .. } => "get_ledger",
            AdminRequest::GetReview { .. } => "get_review",
            AdminRequest::StuckItems { .. } => "stuck_items",
            AdminRequest::ScheduledCheck { .. } => "scheduled_check",
        }
    }
}

/// A decided review and the work it queued.
#[derive(Debug, Serialize)]
struct ReviewDecision {
    review: ReviewRecord,
    queued: Vec<DistributionItem>,
}

impl<S: Store + ?Sized, T: Transport + ?Sized, D: Directory + ?Sized> Hub<S, T, D> {
    /// Answer a JSON admin request.
    pub async fn handle_admin(&self, request: &str) -> String {
        match self.answer(request).await {
            Ok(message) => format!("{SUCCESS_PREFIX}{message}"),
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "admin request failed");
                format!("{ERROR_PREFIX}{e:#}")
            }
        }
    }

    async fn answer(&self, raw: &str) -> anyhow::Result<String> {
        let request: AdminRequest = serde_json::from_str(raw).context("unreadable admin request")?;
        let name = request.name();

        match self.dispatch(request).await {
            Ok(Value::String(message)) => Ok(message),
            Ok(value) => Ok(serde_json::to_string(&value)?),
            Err(e) => {
                let class = e.class();
                Err(anyhow::Error::new(e).context(format!("{name} failed ({class})")))
            }
        }
    }

    /// Execute a parsed request.
    pub async fn dispatch(&self, request: AdminRequest) -> Result<Value> {
        let value = match request {
            AdminRequest::Enqueue {
                root,
                destinations,
                options,
            } => serde_json::to_value(self.enqueue(&root, &destinations, &options).await?)?,
            AdminRequest::Run { id, policies } => serde_json::to_value(self.run(id, &policies).await?)?,
            AdminRequest::RunBatch { ids, start, policies } => {
                serde_json::to_value(self.run_batch(&ids, start, &policies).await)?
            }
            AdminRequest::Requeue { id } => serde_json::to_value(self.requeue(id).await?)?,
            AdminRequest::RetryFailed { policies } => serde_json::to_value(self.retry_failed(&policies).await?)?,
            AdminRequest::RepairPost {
                node,
                item,
                autorepair,
                repair,
            } => serde_json::to_value(self.repair_item(node, item, RepairMode::from_flags(autorepair, repair)).await?)?,
            AdminRequest::Approve { review, reviewer } => {
                let (review, queued) = self.approve_review(review, reviewer).await?;
                serde_json::to_value(ReviewDecision { review, queued })?
            }
            AdminRequest::Deny {
                review,
                reviewer,
                message,
            } => serde_json::to_value(self.deny_review(review, reviewer, &message).await?)?,
            AdminRequest::Revert {
                review,
                reviewer,
                message,
            } => {
                let (review, queued) = self.revert_review(review, reviewer, &message).await?;
                serde_json::to_value(ReviewDecision { review, queued })?
            }
            AdminRequest::Note { review, author, body } => {
                serde_json::to_value(self.note_review(review, author, &body).await?)?
            }
            AdminRequest::GetLedger { root } => self.get_ledger(&root).await?.to_value(),
            AdminRequest::GetReview { review } => serde_json::to_value(self.get_review(review).await?)?,
            AdminRequest::StuckItems { now } => {
                serde_json::to_value(self.stuck_items(now.unwrap_or_else(now_millis)).await?)?
            }
            AdminRequest::ScheduledCheck { now, policies } => {
                serde_json::to_value(self.run_scheduled(now.unwrap_or_else(now_millis), &policies).await?)?
            }
        };
        Ok(value)
    }
}
