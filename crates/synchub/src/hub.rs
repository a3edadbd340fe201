//! The Hub: one network's entry point.
//!
//! Content changes come in through [`Hub::on_item_changed`], which returns
//! the work they imply as a list of [`Effect`]s. The caller applies them with
//! [`Hub::apply_effects`] (or does both at once with [`Hub::handle_change`]).

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use synchub_core::{
    dedupe_key, membership_delta, membership_fingerprint, now_millis, Cluster, ClusterId, ConflictPolicies,
    ConnectionLedger, ContentCondition, ContentItem, DestinationId, DistributionAction, DistributionId,
    DistributionItem, DistributionStatus, Gid, IdempotencyStore, ItemId, MemoryIdempotency, NodeId,
    PublishStatus, RepairMode, RepairReport, ReviewId, ReviewRecord, SyncStatus, UserId,
};
use synchub_store::{Directory, ItemQuery, MembershipSnapshot, Store};
use synchub_sync::{
    BatchReport, Distributor, EnqueueOptions, LedgerService, Repairer, RunOutcome, SyncError, Transport,
};

use crate::config::HubConfig;
use crate::error::{HubError, Result};

/// One unit of work derived from a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum Effect {
    /// Make an unsynchronized item a root before it is distributed.
    PromoteToRoot { node: NodeId, item: ItemId },
    /// Hold the item's change for review instead of distributing it.
    OpenReview {
        cluster: ClusterId,
        node: NodeId,
        item: ItemId,
        previous_snapshot: Option<ContentItem>,
    },
    /// Queue a root for some destinations.
    Enqueue {
        root: Gid,
        destinations: Vec<DestinationId>,
        action: DistributionAction,
    },
}

/// What [`Hub::apply_effects`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedEffects {
    pub promoted: Vec<Gid>,
    pub reviews: Vec<ReviewRecord>,
    pub queued: Vec<DistributionItem>,
}

impl AppliedEffects {
    pub fn queued_ids(&self) -> Vec<DistributionId> {
        self.queued.iter().map(|item| item.id).collect()
    }
}

/// Everything that followed from one change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeReport {
    pub effects: Vec<Effect>,
    pub applied: AppliedEffects,
    pub batch: BatchReport,
}

/// Accumulates effects; the first action claimed for a (root, destination)
/// wins.
#[derive(Default)]
struct EffectPlan {
    effects: Vec<Effect>,
    claimed: HashSet<(Gid, DestinationId)>,
    promoted: HashSet<(NodeId, ItemId)>,
    reviewed: HashSet<(ClusterId, ItemId)>,
}

impl EffectPlan {
    fn promote(&mut self, node: NodeId, item: ItemId) {
        if self.promoted.insert((node, item)) {
            self.effects.push(Effect::PromoteToRoot { node, item });
        }
    }

    fn review(&mut self, cluster: ClusterId, node: NodeId, item: ItemId, previous_snapshot: Option<ContentItem>) {
        if self.reviewed.insert((cluster, item)) {
            self.effects.push(Effect::OpenReview {
                cluster,
                node,
                item,
                previous_snapshot,
            });
        }
    }

    fn enqueue(&mut self, root: &Gid, destinations: &[DestinationId], action: DistributionAction) {
        let fresh: Vec<DestinationId> = destinations
            .iter()
            .filter(|d| self.claimed.insert((root.clone(), (*d).clone())))
            .cloned()
            .collect();
        if fresh.is_empty() {
            return;
        }

        for effect in &mut self.effects {
            if let Effect::Enqueue {
                root: queued_root,
                destinations: queued,
                action: queued_action,
            } = effect
            {
                if queued_root == root && *queued_action == action {
                    queued.extend(fresh);
                    return;
                }
            }
        }
        self.effects.push(Effect::Enqueue {
            root: root.clone(),
            destinations: fresh,
            action,
        });
    }
}

fn extend_unique(into: &mut Vec<ItemId>, from: Vec<ItemId>) {
    for id in from {
        if !into.contains(&id) {
            into.push(id);
        }
    }
}

/// The main Hub struct.
///
/// Provides a unified API for:
/// - Turning content changes into distribution work
/// - Running the review gate
/// - Running and inspecting the distribution queue
/// - Inspecting and repairing drift
pub struct Hub<S: Store + ?Sized, T: Transport + ?Sized, D: Directory + ?Sized> {
    store: Arc<S>,
    ledger: Arc<LedgerService<S>>,
    distributor: Distributor<S, T, D>,
    repairer: Repairer<S, T, D>,
    idempotency: Arc<dyn IdempotencyStore>,
    config: HubConfig,
}

impl<S: Store + ?Sized, T: Transport + ?Sized, D: Directory + ?Sized> Hub<S, T, D> {
    /// Create a hub over a store, a transport and a directory.
    pub fn new(store: Arc<S>, transport: Arc<T>, directory: Arc<D>, config: HubConfig) -> Self {
        let ledger = Arc::new(LedgerService::new(store.clone()));
        Self::with_ledger(store, transport, directory, ledger, config)
    }

    /// Create a hub sharing an existing ledger service (and its per-root
    /// locks) with other users of the same store.
    pub fn with_ledger(
        store: Arc<S>,
        transport: Arc<T>,
        directory: Arc<D>,
        ledger: Arc<LedgerService<S>>,
        config: HubConfig,
    ) -> Self {
        Self {
            distributor: Distributor::new(
                store.clone(),
                transport.clone(),
                directory.clone(),
                ledger.clone(),
                config.distributor.clone(),
            ),
            repairer: Repairer::new(store.clone(), transport, directory, ledger.clone())
                .with_timeout(config.distributor.push_timeout()),
            store,
            ledger,
            idempotency: Arc::new(MemoryIdempotency::new()),
            config,
        }
    }

    /// Replace the idempotency store used for duplicate-trigger suppression.
    pub fn with_idempotency(mut self, idempotency: Arc<dyn IdempotencyStore>) -> Self {
        self.idempotency = idempotency;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn distributor(&self) -> &Distributor<S, T, D> {
        &self.distributor
    }

    pub fn repairer(&self) -> &Repairer<S, T, D> {
        &self.repairer
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Change Handling
    // ─────────────────────────────────────────────────────────────────────────

    /// Work implied by a change to `item` (already saved), given its state
    /// before the change.
    ///
    /// A repeated trigger for the same item inside the dedupe window yields
    /// no work.
    pub async fn on_item_changed(&self, item: &ContentItem, previous: Option<&ContentItem>) -> Result<Vec<Effect>> {
        let now = now_millis();
        let key = dedupe_key("item_changed", item.node_id, item.id);
        if !self.idempotency.claim(&key, now, self.config.dedupe_window_ms) {
            tracing::debug!(node = %item.node_id, item = %item.id, "duplicate change trigger ignored");
            return Ok(Vec::new());
        }

        let planned = self.plan_change(item, previous, now).await;
        if let Err(e) = &planned {
            // A failed attempt must not swallow the retry.
            self.idempotency.release(&key);
            tracing::warn!(node = %item.node_id, item = %item.id, error = %e, "change planning failed");
        }
        planned
    }

    async fn plan_change(&self, item: &ContentItem, previous: Option<&ContentItem>, now: i64) -> Result<Vec<Effect>> {
        let node = item.node_id;
        let mut plan = EffectPlan::default();
        let mut gated = false;

        for cluster in self.store.list_clusters().await? {
            if !cluster.sources_from(node) {
                continue;
            }

            let mut distribute = Vec::new();
            let mut remove = Vec::new();
            let mut member = false;
            for condition in cluster.conditions_for(node) {
                let (before, after) = self.memberships(condition, item, previous, now).await?;
                member |= after.contains(&item.id);
                let work = condition.plan_redistribution(item.id, &before, &after);
                extend_unique(&mut distribute, work.distribute);
                extend_unique(&mut remove, work.remove);
            }

            // Review wins over every other condition of the cluster.
            if member && cluster.review_enabled {
                gated = true;
                distribute.retain(|id| *id != item.id);
                if self.root_gid(&cluster, item, now, &mut plan).is_some() {
                    let snapshot = self.review_snapshot(item, previous.cloned()).await?;
                    plan.review(cluster.id, node, item.id, snapshot);
                }
            }

            self.plan_cluster(&cluster, node, Some(item), &distribute, &remove, now, &mut plan)
                .await?;
        }

        // Explicit links follow their root even outside any condition.
        if !gated && item.is_root() {
            let gid = Gid::local(node, item.id);
            let ledger = self.ledger.load(&gid).await?;
            if !ledger.is_empty() {
                let action = if item.status == PublishStatus::Trash {
                    DistributionAction::Trash
                } else {
                    DistributionAction::Insert
                };
                plan.enqueue(&gid, &ledger.destination_ids(), action);
            }
        }

        if plan.effects.is_empty() {
            tracing::debug!(node = %node, item = %item.id, "change implies no work");
        }
        Ok(plan.effects)
    }

    /// Apply effects in order.
    pub async fn apply_effects(&self, effects: &[Effect]) -> Result<AppliedEffects> {
        let mut applied = AppliedEffects::default();

        for effect in effects {
            match effect {
                Effect::PromoteToRoot { node, item } => {
                    let current = self.get_item(*node, *item).await?;
                    if !current.is_root() {
                        self.repairer.detach(&current).await?;
                        self.repairer.promote(*node, *item).await?;
                        applied.promoted.push(Gid::local(*node, *item));
                    }
                }
                Effect::OpenReview {
                    cluster,
                    node,
                    item,
                    previous_snapshot,
                } => {
                    let current = self.get_item(*node, *item).await?;
                    let review = self.create_review(*cluster, &current, previous_snapshot.clone()).await?;
                    applied.reviews.push(self.submit_review(review.id).await?);
                }
                Effect::Enqueue {
                    root,
                    destinations,
                    action,
                } => {
                    let queued = self
                        .distributor
                        .enqueue(root, destinations, &EnqueueOptions::new(*action))
                        .await?;
                    applied.queued.extend(queued);
                }
            }
        }

        Ok(applied)
    }

    /// Plan, apply and run the work implied by a change.
    pub async fn handle_change(
        &self,
        item: &ContentItem,
        previous: Option<&ContentItem>,
        policies: &ConflictPolicies,
    ) -> Result<ChangeReport> {
        let effects = self.on_item_changed(item, previous).await?;
        let applied = self.apply_effects(&effects).await?;
        let batch = self.distributor.run_batch(&applied.queued_ids(), 0, policies).await;
        Ok(ChangeReport {
            effects,
            applied,
            batch,
        })
    }

    /// Re-evaluate count-limited and date-windowed conditions that are due,
    /// and return the work their membership changes imply.
    ///
    /// A condition seen for the first time only records its membership.
    pub async fn scheduled_check(&self, now: i64) -> Result<Vec<Effect>> {
        let mut plan = EffectPlan::default();

        for cluster in self.store.list_clusters().await? {
            for condition in cluster.content_conditions.iter().filter(|c| c.is_windowed()) {
                let known = self.store.get_membership(condition.id).await?;
                if known.as_ref().is_some_and(|s| s.next_run_at > now) {
                    continue;
                }

                let node = condition.source_node_id;
                let members = self.evaluate(condition, now).await?;
                let fingerprint = membership_fingerprint(&members);

                if let Some(known) = known.as_ref().filter(|s| s.fingerprint != fingerprint) {
                    let delta = membership_delta(ItemId::default(), &known.members, &members);
                    tracing::info!(
                        condition = %condition.id,
                        added = delta.added.len(),
                        removed = delta.removed.len(),
                        "condition membership changed"
                    );

                    let mut distribute = if condition.is_count_limited() {
                        members.clone()
                    } else {
                        delta.added.clone()
                    };
                    if cluster.review_enabled {
                        for id in &delta.added {
                            distribute.retain(|d| d != id);
                            if let Some(item) = self.store.get_item(node, *id).await? {
                                if self.root_gid(&cluster, &item, now, &mut plan).is_some() {
                                    let snapshot = self.review_snapshot(&item, Some(item.clone())).await?;
                                    plan.review(cluster.id, node, item.id, snapshot);
                                }
                            }
                        }
                    }

                    self.plan_cluster(&cluster, node, None, &distribute, &delta.removed, now, &mut plan)
                        .await?;
                }

                self.store
                    .put_membership(&MembershipSnapshot {
                        condition_id: condition.id,
                        members,
                        fingerprint,
                        checked_at: now,
                        next_run_at: now + self.config.schedule_interval_ms,
                    })
                    .await?;
            }
        }

        Ok(plan.effects)
    }

    /// Scheduled check, applied and run.
    pub async fn run_scheduled(&self, now: i64, policies: &ConflictPolicies) -> Result<ChangeReport> {
        let effects = self.scheduled_check(now).await?;
        let applied = self.apply_effects(&effects).await?;
        let batch = self.distributor.run_batch(&applied.queued_ids(), 0, policies).await;
        Ok(ChangeReport {
            effects,
            applied,
            batch,
        })
    }

    async fn evaluate(&self, condition: &ContentCondition, now: i64) -> Result<Vec<ItemId>> {
        let candidates = self
            .store
            .query_items(
                condition.source_node_id,
                &ItemQuery::new().of_type(condition.content_type.clone()),
            )
            .await?;
        Ok(condition.evaluate(candidates.iter(), now))
    }

    /// Membership of `condition` before and after the change to `item`.
    async fn memberships(
        &self,
        condition: &ContentCondition,
        item: &ContentItem,
        previous: Option<&ContentItem>,
        now: i64,
    ) -> Result<(Vec<ItemId>, Vec<ItemId>)> {
        if !condition.is_count_limited() {
            let before = match previous {
                Some(p) if condition.matches(p, now) => vec![item.id],
                _ => Vec::new(),
            };
            let after = if condition.matches(item, now) {
                vec![item.id]
            } else {
                Vec::new()
            };
            return Ok((before, after));
        }

        let candidates = self
            .store
            .query_items(
                condition.source_node_id,
                &ItemQuery::new().of_type(condition.content_type.clone()),
            )
            .await?;
        let after = condition.evaluate(candidates.iter(), now);
        let before = condition.evaluate(
            candidates.iter().filter(|c| c.id != item.id).chain(previous),
            now,
        );

        let next_run_at = match self.store.get_membership(condition.id).await? {
            Some(known) => known.next_run_at,
            None => now + self.config.schedule_interval_ms,
        };
        self.store
            .put_membership(&MembershipSnapshot {
                condition_id: condition.id,
                fingerprint: membership_fingerprint(&after),
                members: after.clone(),
                checked_at: now,
                next_run_at,
            })
            .await?;

        Ok((before, after))
    }

    /// Queue removals and (re)distributions for one cluster.
    #[allow(clippy::too_many_arguments)]
    async fn plan_cluster(
        &self,
        cluster: &Cluster,
        node: NodeId,
        changed: Option<&ContentItem>,
        distribute: &[ItemId],
        remove: &[ItemId],
        now: i64,
        plan: &mut EffectPlan,
    ) -> Result<()> {
        let destinations = cluster.destinations_for(node);
        if destinations.is_empty() {
            return Ok(());
        }

        for id in remove {
            let gid = Gid::local(node, *id);
            match self.member(node, *id, changed).await? {
                Some(member) if member.is_root() => plan.enqueue(&gid, &destinations, DistributionAction::Trash),
                // Never distributed.
                Some(_) => {}
                None => plan.enqueue(&gid, &destinations, DistributionAction::Delete),
            }
        }

        for id in distribute {
            let Some(member) = self.member(node, *id, changed).await? else {
                continue;
            };
            if let Some(gid) = self.root_gid(cluster, &member, now, plan) {
                plan.enqueue(&gid, &destinations, DistributionAction::Insert);
            }
        }

        Ok(())
    }

    async fn member(&self, node: NodeId, id: ItemId, changed: Option<&ContentItem>) -> Result<Option<ContentItem>> {
        match changed {
            Some(item) if item.id == id => Ok(Some(item.clone())),
            _ => Ok(self.store.get_item(node, id).await?),
        }
    }

    /// The GID `member` is distributed under, promoting it when one of the
    /// conditions admitting it asks for that.
    fn root_gid(&self, cluster: &Cluster, member: &ContentItem, now: i64, plan: &mut EffectPlan) -> Option<Gid> {
        let gid = Gid::local(member.node_id, member.id);
        if member.is_root() {
            return Some(gid);
        }

        let promotable = member.sync_status == SyncStatus::None
            && cluster
                .conditions_for(member.node_id)
                .filter(|c| c.matches(member, now))
                .any(|c| c.auto_promote_to_root);
        if promotable {
            plan.promote(member.node_id, member.id);
            return Some(gid);
        }

        tracing::info!(
            cluster = %cluster.id,
            node = %member.node_id,
            item = %member.id,
            sync_status = member.sync_status.as_str(),
            "skipping non-root item"
        );
        None
    }

    /// The snapshot a new review should hold: the pre-change state, when
    /// the item has been distributed before.
    async fn review_snapshot(&self, item: &ContentItem, previous: Option<ContentItem>) -> Result<Option<ContentItem>> {
        let ledger = self.ledger.read(&Gid::local(item.node_id, item.id)).await?;
        Ok(if ledger.is_empty() { None } else { previous })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Review Gate
    // ─────────────────────────────────────────────────────────────────────────

    /// Open a review for `item`, or update the open one in place.
    ///
    /// An open record keeps its original snapshot.
    pub async fn create_review(
        &self,
        cluster: ClusterId,
        item: &ContentItem,
        previous_snapshot: Option<ContentItem>,
    ) -> Result<ReviewRecord> {
        let now = now_millis();

        if let Some(mut open) = self.store.latest_review(item.node_id, item.id).await? {
            if !open.is_terminal() {
                open.touch(now)?;
                self.store.update_review(&open).await?;
                tracing::debug!(review = %open.id, item = %item.id, "review updated in place");
                return Ok(open);
            }
        }

        let record = self
            .store
            .insert_review(ReviewRecord::open(ReviewId::default(), cluster, item, previous_snapshot, now))
            .await?;
        tracing::info!(review = %record.id, node = %item.node_id, item = %item.id, "review opened");
        Ok(record)
    }

    /// Put a review in front of reviewers.
    pub async fn submit_review(&self, id: ReviewId) -> Result<ReviewRecord> {
        let mut review = self.load_review(id).await?;
        review.submit(now_millis())?;
        self.store.update_review(&review).await?;
        Ok(review)
    }

    /// Approve and release the current item to the cluster's destinations
    /// and its ledger destinations.
    pub async fn approve_review(
        &self,
        id: ReviewId,
        reviewer: Option<UserId>,
    ) -> Result<(ReviewRecord, Vec<DistributionItem>)> {
        let mut review = self.load_review(id).await?;
        let cluster = self.reviewing_cluster(&review, reviewer).await?;

        review.approve(reviewer, now_millis())?;
        self.store.update_review(&review).await?;

        let item = self.get_item(review.source_node_id, review.item_id).await?;
        let gid = self.ensure_root(&cluster, &item).await?;

        let mut destinations = cluster.destinations_for(item.node_id);
        for destination in self.ledger.read(&gid).await?.destination_ids() {
            if !destinations.contains(&destination) {
                destinations.push(destination);
            }
        }
        let queued = self
            .distributor
            .enqueue(&gid, &destinations, &EnqueueOptions::default())
            .await?;

        tracing::info!(review = %id, gid = %gid, destinations = destinations.len(), "review approved");
        Ok((review, queued))
    }

    /// Deny with a message. The record stays in review and the snapshot
    /// remains what destinations get.
    pub async fn deny_review(&self, id: ReviewId, reviewer: Option<UserId>, message: &str) -> Result<ReviewRecord> {
        let mut review = self.load_review(id).await?;
        self.reviewing_cluster(&review, reviewer).await?;

        review.deny(reviewer, message, now_millis())?;
        self.store.update_review(&review).await?;
        tracing::info!(review = %id, "review denied");
        Ok(review)
    }

    /// Attach a free-form note; the review state is unchanged.
    pub async fn note_review(&self, id: ReviewId, author: Option<UserId>, body: &str) -> Result<ReviewRecord> {
        let mut review = self.load_review(id).await?;
        self.reviewing_cluster(&review, author).await?;

        review.note(author, body, now_millis());
        self.store.update_review(&review).await?;
        tracing::debug!(review = %id, "review note added");
        Ok(review)
    }

    /// Restore the snapshot onto the live item and close the record.
    ///
    /// If the restored item has copies, they are queued for an update.
    pub async fn revert_review(
        &self,
        id: ReviewId,
        reviewer: Option<UserId>,
        message: &str,
    ) -> Result<(ReviewRecord, Vec<DistributionItem>)> {
        let mut review = self.load_review(id).await?;
        self.reviewing_cluster(&review, reviewer).await?;

        let snapshot = review.revert(reviewer, message, now_millis())?;
        self.store.update_review(&review).await?;

        let mut queued = Vec::new();
        if let Some(snapshot) = snapshot {
            let mut item = self.get_item(review.source_node_id, review.item_id).await?;
            item.apply_content(&snapshot);
            self.store.update_item(item.node_id, &item).await?;

            if item.is_root() {
                let gid = Gid::local(item.node_id, item.id);
                let ledger = self.ledger.read(&gid).await?;
                if !ledger.is_empty() {
                    queued = self
                        .distributor
                        .enqueue(&gid, &ledger.destination_ids(), &EnqueueOptions::default())
                        .await?;
                }
            }
        }

        tracing::info!(review = %id, "review reverted");
        Ok((review, queued))
    }

    pub async fn get_review(&self, id: ReviewId) -> Result<ReviewRecord> {
        self.load_review(id).await
    }

    async fn load_review(&self, id: ReviewId) -> Result<ReviewRecord> {
        self.store
            .get_review(id)
            .await?
            .ok_or(HubError::ReviewNotFound(id))
    }

    async fn reviewing_cluster(&self, review: &ReviewRecord, reviewer: Option<UserId>) -> Result<Cluster> {
        let cluster = self
            .store
            .get_cluster(review.cluster_id)
            .await?
            .ok_or(HubError::ClusterNotFound(review.cluster_id))?;
        if let Some(user) = reviewer {
            if !cluster.can_review(user) {
                return Err(HubError::NotAReviewer {
                    user,
                    cluster: cluster.id,
                });
            }
        }
        Ok(cluster)
    }

    async fn ensure_root(&self, cluster: &Cluster, item: &ContentItem) -> Result<Gid> {
        let gid = Gid::local(item.node_id, item.id);
        if item.is_root() {
            return Ok(gid);
        }
        let promotable = item.sync_status == SyncStatus::None
            && cluster
                .conditions_for(item.node_id)
                .any(|c| c.auto_promote_to_root);
        if !promotable {
            return Err(SyncError::NotARoot(gid).into());
        }
        self.repairer.promote(item.node_id, item.id).await?;
        Ok(gid)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Explicit Sync Changes
    // ─────────────────────────────────────────────────────────────────────────

    /// Turn an item into a root of its own, leaving its old root's ledger.
    pub async fn make_root(&self, node: NodeId, item: ItemId) -> Result<ContentItem> {
        let current = self.get_item(node, item).await?;
        if current.is_root() {
            return Ok(current);
        }
        self.repairer.detach(&current).await?;
        Ok(self.repairer.promote(node, item).await?)
    }

    /// Take an item out of synchronization.
    ///
    /// A linked copy leaves its root's ledger. A root forgets its ledger;
    /// its copies are left in place for the repairer to promote.
    pub async fn unlink(&self, node: NodeId, item: ItemId) -> Result<ContentItem> {
        let mut current = self.get_item(node, item).await?;
        match current.sync_status {
            SyncStatus::None => return Ok(current),
            SyncStatus::Linked => self.repairer.detach(&current).await?,
            SyncStatus::Root => self.ledger.clear(&Gid::local(node, item)).await?,
        }
        current.unlink();
        self.store.update_item(node, &current).await?;
        tracing::info!(node = %node, item = %item, "unlinked");
        Ok(current)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queue, Ledger and Repair
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn enqueue(
        &self,
        root: &Gid,
        destinations: &[DestinationId],
        options: &EnqueueOptions,
    ) -> Result<Vec<DistributionItem>> {
        Ok(self.distributor.enqueue(root, destinations, options).await?)
    }

    pub async fn run(&self, id: DistributionId, policies: &ConflictPolicies) -> Result<RunOutcome> {
        Ok(self.distributor.run(id, policies).await?)
    }

    pub async fn run_batch(&self, ids: &[DistributionId], start: usize, policies: &ConflictPolicies) -> BatchReport {
        self.distributor.run_batch(ids, start, policies).await
    }

    pub async fn stuck_items(&self, now: i64) -> Result<Vec<DistributionItem>> {
        Ok(self.distributor.stuck_items(now).await?)
    }

    pub async fn requeue(&self, id: DistributionId) -> Result<DistributionItem> {
        Ok(self.distributor.requeue(id).await?)
    }

    pub async fn retry_failed(&self, policies: &ConflictPolicies) -> Result<BatchReport> {
        Ok(self.distributor.retry_failed(policies).await?)
    }

    pub async fn list_distributions(&self, status: Option<DistributionStatus>) -> Result<Vec<DistributionItem>> {
        Ok(self.distributor.list(status).await?)
    }

    pub async fn collect_garbage(&self, now: i64) -> Result<usize> {
        Ok(self.distributor.collect_garbage(now).await?)
    }

    /// The ledger of a root on this network.
    pub async fn get_ledger(&self, root: &Gid) -> Result<ConnectionLedger> {
        Ok(self.ledger.read(&root.local_part()).await?)
    }

    pub async fn repair_item(&self, node: NodeId, item: ItemId, mode: RepairMode) -> Result<RepairReport> {
        Ok(self.repairer.repair(node, item, mode).await?)
    }

    pub async fn inspect_node(&self, node: NodeId, mode: RepairMode) -> Result<Vec<RepairReport>> {
        Ok(self.repairer.inspect_node(node, mode).await?)
    }

    async fn get_item(&self, node: NodeId, item: ItemId) -> Result<ContentItem> {
        self.store
            .get_item(node, item)
            .await?
            .ok_or(HubError::ItemNotFound { node, item })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use synchub_core::{ConditionId, TaxonomyFilter, TermOperator};
    use synchub_store::{MemoryStore, StaticDirectory};
    use synchub_sync::NoRemotes;

    type TestHub = Hub<MemoryStore, NoRemotes, StaticDirectory>;

    fn hub() -> TestHub {
        let config = HubConfig {
            network_host: "hub.example".into(),
            dedupe_window_ms: 0,
            ..HubConfig::default()
        };
        let directory = Arc::new(StaticDirectory::new("hub.example").with_node(1).with_node(2).with_node(3));
        Hub::new(Arc::new(MemoryStore::new()), Arc::new(NoRemotes), directory, config)
    }

    async fn cluster(hub: &TestHub, condition: ContentCondition, review: bool) -> Cluster {
        let mut cluster = Cluster::new(ClusterId(1), "news")
            .with_destination(NodeId(2))
            .with_destination(NodeId(3))
            .with_condition(condition);
        if review {
            cluster = cluster.with_review(Vec::new());
        }
        hub.store().upsert_cluster(&cluster).await.unwrap();
        cluster
    }

    async fn article(hub: &TestHub, name: &str, at: i64, root: bool) -> ContentItem {
        let mut item = hub
            .store()
            .insert_item(NodeId(1), ContentItem::new(NodeId(1), ItemId(0), "article", name).published(at))
            .await
            .unwrap();
        if root {
            item.sync_status = SyncStatus::Root;
            item.sync_id = Some(Gid::local(NodeId(1), item.id));
            hub.store().update_item(NodeId(1), &item).await.unwrap();
        }
        item
    }

    #[tokio::test]
    async fn test_entering_item_is_queued_for_cluster() {
        let hub = hub();
        cluster(&hub, ContentCondition::new(ConditionId(1), ClusterId(1), NodeId(1), "article"), false).await;
        let item = article(&hub, "a", 10, true).await;

        let effects = hub.on_item_changed(&item, None).await.unwrap();
        assert_eq!(
            effects,
            vec![Effect::Enqueue {
                root: Gid::local(NodeId(1), item.id),
                destinations: vec![DestinationId::Local(NodeId(2)), DestinationId::Local(NodeId(3))],
                action: DistributionAction::Insert,
            }]
        );
    }

    #[tokio::test]
    async fn test_non_root_skipped_without_auto_promote() {
        let hub = hub();
        cluster(&hub, ContentCondition::new(ConditionId(1), ClusterId(1), NodeId(1), "article"), false).await;
        let item = article(&hub, "a", 10, false).await;

        assert!(hub.on_item_changed(&item, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_auto_promote_precedes_enqueue() {
        let hub = hub();
        cluster(
            &hub,
            ContentCondition::new(ConditionId(1), ClusterId(1), NodeId(1), "article").auto_promote(),
            false,
        )
        .await;
        let item = article(&hub, "a", 10, false).await;

        let effects = hub.on_item_changed(&item, None).await.unwrap();
        assert_eq!(effects[0], Effect::PromoteToRoot { node: NodeId(1), item: item.id });
        assert!(matches!(effects[1], Effect::Enqueue { .. }));

        let applied = hub.apply_effects(&effects).await.unwrap();
        assert_eq!(applied.promoted, vec![Gid::local(NodeId(1), item.id)]);
        assert_eq!(applied.queued.len(), 2);
        assert!(hub.store().get_item(NodeId(1), item.id).await.unwrap().unwrap().is_root());
    }

    #[tokio::test]
    async fn test_leaving_item_is_trashed() {
        let hub = hub();
        let filter = TaxonomyFilter {
            taxonomy: "category".into(),
            terms: vec!["news".into()],
            operator: TermOperator::In,
        };
        cluster(
            &hub,
            ContentCondition::new(ConditionId(1), ClusterId(1), NodeId(1), "article").with_taxonomy(filter),
            false,
        )
        .await;
        let before = article(&hub, "a", 10, true).await.with_term("category", "news");
        hub.store().update_item(NodeId(1), &before).await.unwrap();

        let mut after = before.clone();
        after.terms.clear();
        hub.store().update_item(NodeId(1), &after).await.unwrap();

        let effects = hub.on_item_changed(&after, Some(&before)).await.unwrap();
        assert!(matches!(
            &effects[..],
            [Effect::Enqueue { action: DistributionAction::Trash, .. }]
        ));
    }

    #[tokio::test]
    async fn test_review_cluster_gates_item() {
        let hub = hub();
        cluster(&hub, ContentCondition::new(ConditionId(1), ClusterId(1), NodeId(1), "article"), true).await;
        let item = article(&hub, "a", 10, true).await;

        let effects = hub.on_item_changed(&item, None).await.unwrap();
        assert_eq!(
            effects,
            vec![Effect::OpenReview {
                cluster: ClusterId(1),
                node: NodeId(1),
                item: item.id,
                previous_snapshot: None,
            }]
        );
    }

    fn windowed_hub() -> TestHub {
        let config = HubConfig {
            network_host: "hub.example".into(),
            ..HubConfig::default()
        };
        let directory = Arc::new(StaticDirectory::new("hub.example").with_node(1).with_node(2).with_node(3));
        Hub::new(Arc::new(MemoryStore::new()), Arc::new(NoRemotes), directory, config)
    }

    #[tokio::test]
    async fn test_duplicate_trigger_suppressed() {
        let hub = windowed_hub();
        cluster(&hub, ContentCondition::new(ConditionId(1), ClusterId(1), NodeId(1), "article"), false).await;
        let item = article(&hub, "a", 10, true).await;

        assert!(!hub.on_item_changed(&item, None).await.unwrap().is_empty());
        assert!(hub.on_item_changed(&item, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_change_does_not_suppress_retry() {
        let hub = windowed_hub();
        let item = article(&hub, "a", 10, true).await;
        let gid = Gid::local(NodeId(1), item.id);
        hub.store()
            .set_metadata(
                NodeId(1),
                item.id,
                synchub_sync::LEDGER_META_KEY,
                &serde_json::json!({ "3": { "item_id": 44 }, "4": { "edit": "x" } }),
            )
            .await
            .unwrap();

        assert!(hub.on_item_changed(&item, None).await.is_err());

        let mut ledger = synchub_core::ConnectionLedger::new();
        ledger.add_connection(&DestinationId::Local(NodeId(2)), synchub_core::ConnectionRecord::bare(ItemId(4)));
        hub.ledger.replace(&gid, &ledger).await.unwrap();

        let effects = hub.on_item_changed(&item, None).await.unwrap();
        assert_eq!(
            effects,
            vec![Effect::Enqueue {
                root: gid,
                destinations: vec![DestinationId::Local(NodeId(2))],
                action: DistributionAction::Insert,
            }]
        );
    }

    #[tokio::test]
    async fn test_unauthorized_reviewer() {
        let hub = hub();
        let mut c = cluster(&hub, ContentCondition::new(ConditionId(1), ClusterId(1), NodeId(1), "article"), true).await;
        c.reviewer_ids = vec![UserId(7)];
        hub.store().upsert_cluster(&c).await.unwrap();
        let item = article(&hub, "a", 10, true).await;

        let review = hub.create_review(ClusterId(1), &item, None).await.unwrap();
        hub.submit_review(review.id).await.unwrap();
        assert!(matches!(
            hub.approve_review(review.id, Some(UserId(8))).await,
            Err(HubError::NotAReviewer { .. })
        ));
        assert!(hub.approve_review(review.id, Some(UserId(7))).await.is_ok());
    }

    #[tokio::test]
    async fn test_unlink_root_clears_ledger() {
        let hub = hub();
        let item = article(&hub, "a", 10, true).await;
        let gid = Gid::local(NodeId(1), item.id);
        hub.ledger
            .add_connection(&gid, &DestinationId::Local(NodeId(2)), synchub_core::ConnectionRecord::bare(ItemId(4)))
            .await
            .unwrap();

        let unlinked = hub.unlink(NodeId(1), item.id).await.unwrap();
        assert_eq!(unlinked.sync_status, SyncStatus::None);
        assert!(hub.get_ledger(&gid).await.unwrap().is_empty());
    }

    fn action() -> impl Strategy<Value = DistributionAction> {
        prop_oneof![
            Just(DistributionAction::Insert),
            Just(DistributionAction::Trash),
            Just(DistributionAction::Delete),
        ]
    }

    proptest! {
        #[test]
        fn test_plan_claims_each_destination_once(
            calls in prop::collection::vec((1u64..=3, prop::collection::vec(1u64..=4, 0..4), action()), 0..16),
        ) {
            let mut plan = EffectPlan::default();
            let mut first = std::collections::HashMap::new();
            for (item, nodes, action) in &calls {
                let root = Gid::local(NodeId(1), ItemId(*item));
                let dests: Vec<DestinationId> = nodes.iter().map(|n| DestinationId::Local(NodeId(*n))).collect();
                for dest in &dests {
                    first.entry((root.clone(), dest.clone())).or_insert(*action);
                }
                plan.enqueue(&root, &dests, *action);
            }

            let mut seen = HashSet::new();
            for effect in &plan.effects {
                let Effect::Enqueue { root, destinations, action } = effect else {
                    unreachable!("only enqueue effects were planned");
                };
                for dest in destinations {
                    prop_assert!(seen.insert((root.clone(), dest.clone())));
                    prop_assert_eq!(first[&(root.clone(), dest.clone())], *action);
                }
            }
            prop_assert_eq!(seen.len(), first.len());
        }
    }
}
