//! Clusters: where content goes and whether review gates it.

use serde::{Deserialize, Serialize};

use crate::condition::ContentCondition;
use crate::ledger::DestinationId;
use crate::types::{ClusterId, NodeId, UserId};

/// A named group of destinations plus the rules selecting content for them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: ClusterId,
    pub title: String,
    pub destination_ids: Vec<DestinationId>,
    #[serde(default)]
    pub review_enabled: bool,
    #[serde(default)]
    pub reviewer_ids: Vec<UserId>,
    #[serde(default)]
    pub content_conditions: Vec<ContentCondition>,
}

impl Cluster {
    pub fn new(id: ClusterId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            destination_ids: Vec::new(),
            review_enabled: false,
            reviewer_ids: Vec::new(),
            content_conditions: Vec::new(),
        }
    }

    pub fn with_destination(mut self, dest: impl Into<DestinationId>) -> Self {
        self.destination_ids.push(dest.into());
        self
    }

    /// Attach a condition, rebinding it to this cluster.
    pub fn with_condition(mut self, mut condition: ContentCondition) -> Self {
        condition.cluster_id = self.id;
        self.content_conditions.push(condition);
        self
    }

    pub fn with_review(mut self, reviewers: impl IntoIterator<Item = UserId>) -> Self {
        self.review_enabled = true;
        self.reviewer_ids = reviewers.into_iter().collect();
        self
    }

    /// Conditions reading from `node`.
    pub fn conditions_for(&self, node: NodeId) -> impl Iterator<Item = &ContentCondition> + '_ {
        self.content_conditions
            .iter()
            .filter(move |c| c.source_node_id == node)
    }

    /// Whether any condition reads from `node`.
    pub fn sources_from(&self, node: NodeId) -> bool {
        self.conditions_for(node).next().is_some()
    }

    /// Destinations excluding the source node itself.
    pub fn destinations_for(&self, source: NodeId) -> Vec<DestinationId> {
        self.destination_ids
            .iter()
            .filter(|d| **d != DestinationId::Local(source))
            .cloned()
            .collect()
    }

    /// Whether `user` may decide reviews. An empty reviewer list means any
    /// user with access to the cluster.
    pub fn can_review(&self, user: UserId) -> bool {
        self.reviewer_ids.is_empty() || self.reviewer_ids.contains(&user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConditionId;

    #[test]
    fn test_destinations_exclude_source() {
        let cluster = Cluster::new(ClusterId(1), "news")
            .with_destination(NodeId(1))
            .with_destination(NodeId(2))
            .with_destination(DestinationId::remote("far.example", NodeId(1)));

        let dests = cluster.destinations_for(NodeId(1));
        assert_eq!(dests.len(), 2);
        assert!(!dests.contains(&DestinationId::Local(NodeId(1))));
    }

    #[test]
    fn test_with_condition_rebinds_cluster() {
        let cond = ContentCondition::new(ConditionId(1), ClusterId(99), NodeId(1), "article");
        let cluster = Cluster::new(ClusterId(5), "x").with_condition(cond);
        assert_eq!(cluster.content_conditions[0].cluster_id, ClusterId(5));
        assert!(cluster.sources_from(NodeId(1)));
        assert!(!cluster.sources_from(NodeId(2)));
    }

    #[test]
    fn test_reviewers() {
        let open = Cluster::new(ClusterId(1), "open").with_review([]);
        assert!(open.can_review(UserId(3)));

        let closed = Cluster::new(ClusterId(2), "closed").with_review([UserId(1)]);
        assert!(closed.can_review(UserId(1)));
        assert!(!closed.can_review(UserId(3)));
    }
}
