//! Content conditions: declarative predicates selecting items for a cluster.
//!
//! A condition is evaluated over the items of one node. Evaluation is pure;
//! the caller supplies the candidate items and the current time.
//!
//! Count-limited conditions ("latest N") are order sensitive: when one item
//! enters or leaves the window, its neighbours' membership may have flipped
//! too, so the whole current set is redistributed. Conditions without a count
//! limit only ever concern the single changed item.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::item::ContentItem;
use crate::types::{ClusterId, ConditionId, ItemId, NodeId};

/// How the terms of a taxonomy filter combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermOperator {
    /// At least one term must be present.
    #[default]
    In,
    /// None of the terms may be present.
    NotIn,
    /// Every term must be present.
    All,
}

/// Restrict a condition to items carrying certain terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonomyFilter {
    pub taxonomy: String,
    pub terms: Vec<String>,
    #[serde(default)]
    pub operator: TermOperator,
}

impl TaxonomyFilter {
    pub fn matches(&self, item: &ContentItem) -> bool {
        let mut hits = self.terms.iter().map(|t| item.has_term(&self.taxonomy, t));
        match self.operator {
            TermOperator::In => hits.any(|hit| hit),
            TermOperator::NotIn => !hits.any(|hit| hit),
            TermOperator::All => hits.all(|hit| hit),
        }
    }
}

/// Restrict a condition by publication date (Unix ms).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DateWindow {
    /// Fixed bounds, both inclusive.
    Absolute {
        after: Option<i64>,
        before: Option<i64>,
    },
    /// Items published no longer than `max_age_ms` ago.
    Relative { max_age_ms: i64 },
}

impl DateWindow {
    pub fn contains(&self, published_at: i64, now: i64) -> bool {
        match self {
            DateWindow::Absolute { after, before } => {
                after.map_or(true, |a| published_at >= a) && before.map_or(true, |b| published_at <= b)
            }
            DateWindow::Relative { max_age_ms } => published_at >= now.saturating_sub(*max_age_ms),
        }
    }
}

/// A declarative rule selecting items of one node for one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentCondition {
    pub id: ConditionId,
    pub cluster_id: ClusterId,
    pub source_node_id: NodeId,
    pub content_type: String,
    #[serde(default)]
    pub taxonomy_filter: Option<TaxonomyFilter>,
    #[serde(default)]
    pub count_limit: Option<usize>,
    #[serde(default)]
    pub date_window: Option<DateWindow>,
    /// Promote matching unsynchronized items to roots before distribution.
    #[serde(default)]
    pub auto_promote_to_root: bool,
}

impl ContentCondition {
    /// A condition matching every published item of a type on a node.
    pub fn new(id: ConditionId, cluster_id: ClusterId, source_node_id: NodeId, content_type: impl Into<String>) -> Self {
        Self {
            id,
            cluster_id,
            source_node_id,
            content_type: content_type.into(),
            taxonomy_filter: None,
            count_limit: None,
            date_window: None,
            auto_promote_to_root: false,
        }
    }

    pub fn with_count_limit(mut self, limit: usize) -> Self {
        self.count_limit = Some(limit);
        self
    }

    pub fn with_taxonomy(mut self, filter: TaxonomyFilter) -> Self {
        self.taxonomy_filter = Some(filter);
        self
    }

    pub fn with_date_window(mut self, window: DateWindow) -> Self {
        self.date_window = Some(window);
        self
    }

    pub fn auto_promote(mut self) -> Self {
        self.auto_promote_to_root = true;
        self
    }

    pub fn is_count_limited(&self) -> bool {
        self.count_limit.is_some()
    }

    /// Whether membership can change with time alone.
    pub fn is_windowed(&self) -> bool {
        self.count_limit.is_some() || self.date_window.is_some()
    }

    /// Whether a single item passes every filter except the count limit.
    pub fn matches(&self, item: &ContentItem, now: i64) -> bool {
        item.node_id == self.source_node_id
            && item.item_type == self.content_type
            && item.is_published()
            && !item.is_linked()
            && self.taxonomy_filter.as_ref().map_or(true, |f| f.matches(item))
            && self
                .date_window
                .as_ref()
                .map_or(true, |w| w.contains(item.published_at, now))
    }

    /// Evaluate over candidate items, newest first, truncated to the limit.
    pub fn evaluate<'a, I>(&self, items: I, now: i64) -> Vec<ItemId>
    where
        I: IntoIterator<Item = &'a ContentItem>,
    {
        let mut matched: Vec<&ContentItem> = items
            .into_iter()
            .filter(|item| self.matches(item, now))
            .collect();

        matched.sort_by(|a, b| {
            b.published_at
                .cmp(&a.published_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        let limit = self.count_limit.unwrap_or(usize::MAX);
        matched.into_iter().take(limit).map(|item| item.id).collect()
    }

    /// Decide which items must be redistributed after `changed` moved the
    /// condition's membership from `before` to `after`.
    pub fn plan_redistribution(&self, changed: ItemId, before: &[ItemId], after: &[ItemId]) -> RedistributionPlan {
        let delta = membership_delta(changed, before, after);
        if delta.is_empty() {
            return RedistributionPlan::default();
        }

        if self.is_count_limited() {
            return RedistributionPlan {
                distribute: after.to_vec(),
                remove: delta.removed,
            };
        }

        RedistributionPlan {
            distribute: if delta.item_entered() { vec![changed] } else { Vec::new() },
            remove: if delta.item_left() { vec![changed] } else { Vec::new() },
        }
    }
}

/// Items that entered and left a condition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipDelta {
    /// The item whose change triggered the comparison.
    pub item: ItemId,
    pub added: Vec<ItemId>,
    pub removed: Vec<ItemId>,
}

impl MembershipDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// The changed item itself entered the condition.
    pub fn item_entered(&self) -> bool {
        self.added.contains(&self.item)
    }

    /// The changed item itself left the condition.
    pub fn item_left(&self) -> bool {
        self.removed.contains(&self.item)
    }
}

/// Set difference between two memberships, in membership order.
pub fn membership_delta(item: ItemId, before: &[ItemId], after: &[ItemId]) -> MembershipDelta {
    let before_set: BTreeSet<ItemId> = before.iter().copied().collect();
    let after_set: BTreeSet<ItemId> = after.iter().copied().collect();

    MembershipDelta {
        item,
        added: after
            .iter()
            .copied()
            .filter(|id| !before_set.contains(id))
            .collect(),
        removed: before
            .iter()
            .copied()
            .filter(|id| !after_set.contains(id))
            .collect(),
    }
}

/// Work derived from a membership change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedistributionPlan {
    /// Items to insert or update at the cluster's destinations.
    pub distribute: Vec<ItemId>,
    /// Items that left the condition and must be withdrawn.
    pub remove: Vec<ItemId>,
}

impl RedistributionPlan {
    pub fn is_empty(&self) -> bool {
        self.distribute.is_empty() && self.remove.is_empty()
    }
}

/// Order-independent fingerprint of a membership, for change detection
/// between scheduled checks.
pub fn membership_fingerprint(members: &[ItemId]) -> String {
    let sorted: BTreeSet<ItemId> = members.iter().copied().collect();
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"synchub-membership-v0:");
    for id in sorted {
        hasher.update(&id.get().to_le_bytes());
    }
    hex::encode(hasher.finalize().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: i64 = 86_400_000;

    fn article(id: u64, published_at: i64) -> ContentItem {
        ContentItem::new(NodeId(1), ItemId(id), "article", format!("a-{id}")).published(published_at)
    }

    fn latest(n: usize) -> ContentCondition {
        ContentCondition::new(ConditionId(1), ClusterId(1), NodeId(1), "article").with_count_limit(n)
    }

    #[test]
    fn test_evaluate_orders_newest_first_and_limits() {
        let items = vec![article(1, 100), article(2, 300), article(3, 200), article(4, 50)];
        assert_eq!(latest(3).evaluate(&items, 0), vec![ItemId(2), ItemId(3), ItemId(1)]);
    }

    #[test]
    fn test_evaluate_skips_drafts_other_types_and_nodes() {
        let mut draft = article(1, 100);
        draft.status = crate::item::PublishStatus::Draft;
        let page = ContentItem::new(NodeId(1), ItemId(2), "page", "p").published(100);
        let foreign = ContentItem::new(NodeId(9), ItemId(3), "article", "f").published(100);
        let items = vec![draft, page, foreign, article(4, 10)];

        let cond = ContentCondition::new(ConditionId(1), ClusterId(1), NodeId(1), "article");
        assert_eq!(cond.evaluate(&items, 0), vec![ItemId(4)]);
    }

    #[test]
    fn test_taxonomy_operators() {
        let tagged = article(1, 1).with_term("category", "news").with_term("category", "eu");
        let filter = |operator, terms: &[&str]| TaxonomyFilter {
            taxonomy: "category".into(),
            terms: terms.iter().map(|t| t.to_string()).collect(),
            operator,
        };

        assert!(filter(TermOperator::In, &["news", "sport"]).matches(&tagged));
        assert!(!filter(TermOperator::All, &["news", "sport"]).matches(&tagged));
        assert!(filter(TermOperator::All, &["news", "eu"]).matches(&tagged));
        assert!(filter(TermOperator::NotIn, &["sport"]).matches(&tagged));
        assert!(!filter(TermOperator::NotIn, &["eu"]).matches(&tagged));
    }

    #[test]
    fn test_relative_date_window() {
        let cond = ContentCondition::new(ConditionId(1), ClusterId(1), NodeId(1), "article")
            .with_date_window(DateWindow::Relative { max_age_ms: 7 * DAY });
        let now = 30 * DAY;
        let items = vec![article(1, now - DAY), article(2, now - 8 * DAY)];
        assert_eq!(cond.evaluate(&items, now), vec![ItemId(1)]);
        assert!(cond.is_windowed());
    }

    #[test]
    fn test_count_limited_change_redistributes_whole_set() {
        // latest 3 = {A,B,C}; publishing D pushes C out.
        let (a, b, c, d) = (ItemId(1), ItemId(2), ItemId(3), ItemId(4));
        let plan = latest(3).plan_redistribution(d, &[a, b, c], &[d, a, b]);
        assert_eq!(plan.distribute, vec![d, a, b]);
        assert_eq!(plan.remove, vec![c]);
    }

    #[test]
    fn test_unlimited_change_redistributes_only_changed_item() {
        let cond = ContentCondition::new(ConditionId(1), ClusterId(1), NodeId(1), "article");
        let plan = cond.plan_redistribution(ItemId(4), &[ItemId(1)], &[ItemId(4), ItemId(1)]);
        assert_eq!(plan.distribute, vec![ItemId(4)]);
        assert!(plan.remove.is_empty());

        let plan = cond.plan_redistribution(ItemId(1), &[ItemId(1), ItemId(2)], &[ItemId(2)]);
        assert!(plan.distribute.is_empty());
        assert_eq!(plan.remove, vec![ItemId(1)]);
    }

    #[test]
    fn test_unchanged_membership_schedules_nothing() {
        let plan = latest(3).plan_redistribution(ItemId(1), &[ItemId(1), ItemId(2)], &[ItemId(2), ItemId(1)]);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_fingerprint_is_order_independent() {
        let a = membership_fingerprint(&[ItemId(1), ItemId(2)]);
        let b = membership_fingerprint(&[ItemId(2), ItemId(1)]);
        assert_eq!(a, b);
        assert_ne!(a, membership_fingerprint(&[ItemId(1)]));
    }
}
