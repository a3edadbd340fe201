//! Import conflict resolution.
//!
//! When a root (or one of its dependents) arrives on a destination node, the
//! destination first looks for its own linked copy of the same GID; that copy
//! is updated in place. Otherwise it looks for equivalent local content
//! (same name, type and language). Finding one is a conflict and needs a
//! policy from the caller.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{CoreError, Result};
use crate::item::{ContentItem, PublishStatus};
use crate::types::ItemId;

/// Caller-chosen answer to an import conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Overwrite the local item, keep its id, link it.
    Replace,
    /// Leave the local item untouched and do not link.
    Skip,
    /// Insert the incoming item as a new independent item.
    Keep,
}

/// Policies for one distribution, keyed by source item id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictPolicies {
    #[serde(default)]
    pub default: Option<ConflictPolicy>,
    #[serde(default)]
    pub per_item: BTreeMap<ItemId, ConflictPolicy>,
}

impl ConflictPolicies {
    /// Use `policy` for every source item.
    pub fn all(policy: ConflictPolicy) -> Self {
        Self {
            default: Some(policy),
            per_item: BTreeMap::new(),
        }
    }

    pub fn with_item(mut self, item: ItemId, policy: ConflictPolicy) -> Self {
        self.per_item.insert(item, policy);
        self
    }

    pub fn for_item(&self, item: ItemId) -> Option<ConflictPolicy> {
        self.per_item.get(&item).copied().or(self.default)
    }
}

/// What the destination does with one incoming item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ImportDecision {
    /// Update the existing linked copy.
    UpdateLinked { local: ItemId },
    /// No equivalent content: insert and link.
    Insert,
    /// Overwrite equivalent content and link it.
    Replace { local: ItemId },
    /// Leave equivalent content alone.
    Skip { local: ItemId },
    /// Insert a new item that is not linked.
    Keep,
}

impl ImportDecision {
    /// Whether the outcome leaves a linked copy behind.
    pub fn links(&self) -> bool {
        matches!(
            self,
            ImportDecision::UpdateLinked { .. } | ImportDecision::Insert | ImportDecision::Replace { .. }
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImportDecision::UpdateLinked { .. } => "update",
            ImportDecision::Insert => "insert",
            ImportDecision::Replace { .. } => "replace",
            ImportDecision::Skip { .. } => "skip",
            ImportDecision::Keep => "keep",
        }
    }
}

/// Whether `candidate` is equivalent local content for `incoming`.
///
/// The language only narrows the match when the incoming item has one.
pub fn is_equivalent(candidate: &ContentItem, incoming: &ContentItem) -> bool {
    candidate.status != PublishStatus::Trash
        && candidate.name == incoming.name
        && candidate.item_type == incoming.item_type
        && match &incoming.language {
            Some(lang) => candidate.language.as_deref() == Some(lang.as_str()),
            None => true,
        }
}

/// Decide how to import `incoming`.
///
/// `linked` is the destination's existing linked copy of the same GID,
/// `equivalent` the first equivalent local item.
pub fn decide(
    incoming: &ContentItem,
    linked: Option<&ContentItem>,
    equivalent: Option<&ContentItem>,
    policies: &ConflictPolicies,
) -> Result<ImportDecision> {
    if let Some(copy) = linked {
        return Ok(ImportDecision::UpdateLinked { local: copy.id });
    }

    let Some(existing) = equivalent else {
        return Ok(ImportDecision::Insert);
    };

    match policies.for_item(incoming.id) {
        Some(ConflictPolicy::Replace) => Ok(ImportDecision::Replace { local: existing.id }),
        Some(ConflictPolicy::Skip) => Ok(ImportDecision::Skip { local: existing.id }),
        Some(ConflictPolicy::Keep) => Ok(ImportDecision::Keep),
        None => Err(CoreError::PolicyRequired { item: incoming.id }),
    }
}
