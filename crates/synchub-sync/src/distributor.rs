//! The distribution queue.
//!
//! Each [`DistributionItem`] sends one root to one destination. Running an
//! item moves it `init → started → completed | failed`; the destination's
//! importer decides placement and the root's ledger records the result.
//!
//! Nothing here runs in the background. Stuck detection, batch runs and
//! retries are triggered by the caller.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use synchub_core::{
    now_millis, ConflictPolicies, ContentItem, DestinationId, DistributionAction, DistributionId,
    DistributionItem, DistributionStatus, GateView, Gid, PublishStatus,
};
use synchub_store::{Directory, Store};

use crate::error::{ErrorClass, Result, SyncError};
use crate::import::Importer;
use crate::ledger::LedgerService;
use crate::messages::{DistributionPayload, ImportReport};
use crate::transport::Transport;

/// Configuration for the distributor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributorConfig {
    /// Bound on one remote push.
    pub push_timeout_ms: u64,
    /// Pending items older than this are reported as stuck.
    pub stuck_threshold_ms: i64,
    /// Terminal items older than this are garbage.
    pub retention_ms: i64,
    /// Requeueing stops after this many attempts.
    pub max_attempts: u32,
}

impl Default for DistributorConfig {
    fn default() -> Self {
        Self {
            push_timeout_ms: 30_000,
            stuck_threshold_ms: 5 * 60 * 1_000,
            retention_ms: 7 * 24 * 60 * 60 * 1_000,
            max_attempts: 5,
        }
    }
}

impl DistributorConfig {
    pub fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.push_timeout_ms)
    }
}

/// Options for [`Distributor::enqueue`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueueOptions {
    /// Action for destinations without an override.
    #[serde(default)]
    pub action: DistributionAction,
    /// Per-destination actions.
    #[serde(default)]
    pub overrides: BTreeMap<DestinationId, DistributionAction>,
}

impl EnqueueOptions {
    pub fn new(action: DistributionAction) -> Self {
        Self {
            action,
            overrides: BTreeMap::new(),
        }
    }

    pub fn with_override(mut self, destination: DestinationId, action: DistributionAction) -> Self {
        self.overrides.insert(destination, action);
        self
    }

    fn action_for(&self, destination: &DestinationId) -> DistributionAction {
        self.overrides.get(destination).copied().unwrap_or(self.action)
    }
}

/// Result of running one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed { report: ImportReport },
    Failed { class: ErrorClass, error: String },
    /// Nothing was done: the item is not `init`, or the same work is
    /// already running.
    Skipped { reason: String },
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed { .. })
    }
}

/// One line of a batch report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub id: DistributionId,
    #[serde(flatten)]
    pub outcome: RunOutcome,
}

/// Aggregated result of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub entries: Vec<BatchEntry>,
    /// Index to resume from. Equal to the batch length when done.
    pub next_index: usize,
    /// Whether the batch stopped on the pause flag.
    pub paused: bool,
}

impl BatchReport {
    pub fn completed(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_completed()).count()
    }

    pub fn failed(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, RunOutcome::Failed { .. }))
            .count()
    }
}

type WorkKey = (Gid, DestinationId);

/// Removes the work key when a run ends, however it ends.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<WorkKey>>,
    key: WorkKey,
}

impl<'a> InFlight<'a> {
    fn claim(set: &'a Mutex<HashSet<WorkKey>>, key: WorkKey) -> Option<Self> {
        let mut keys = set.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if keys.insert(key.clone()) {
            Some(Self { set, key })
        } else {
            None
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut keys = self.set.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        keys.remove(&self.key);
    }
}

/// Queues and runs distribution items for one network.
pub struct Distributor<S: Store + ?Sized, T: Transport + ?Sized, D: Directory + ?Sized> {
    store: Arc<S>,
    transport: Arc<T>,
    directory: Arc<D>,
    ledger: Arc<LedgerService<S>>,
    importer: Importer<S, D>,
    config: DistributorConfig,
    in_flight: Mutex<HashSet<WorkKey>>,
    paused: AtomicBool,
}

impl<S: Store + ?Sized, T: Transport + ?Sized, D: Directory + ?Sized> Distributor<S, T, D> {
    pub fn new(
        store: Arc<S>,
        transport: Arc<T>,
        directory: Arc<D>,
        ledger: Arc<LedgerService<S>>,
        config: DistributorConfig,
    ) -> Self {
        Self {
            importer: Importer::new(store.clone(), directory.clone()),
            store,
            transport,
            directory,
            ledger,
            config,
            in_flight: Mutex::new(HashSet::new()),
            paused: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &DistributorConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queue
    // ─────────────────────────────────────────────────────────────────────────

    /// Queue one item per destination.
    ///
    /// The root's own node is never a destination. A pending `init` item for
    /// the same work is returned instead of a duplicate.
    pub async fn enqueue(
        &self,
        root_gid: &Gid,
        destinations: &[DestinationId],
        options: &EnqueueOptions,
    ) -> Result<Vec<DistributionItem>> {
        let root_gid = root_gid.local_part();
        let pending = self.store.list_distributions(Some(DistributionStatus::Init)).await?;
        let now = now_millis();

        let mut seen = HashSet::new();
        let mut queued = Vec::new();
        for destination in destinations {
            if *destination == DestinationId::Local(root_gid.node_id) || !seen.insert(destination.clone()) {
                continue;
            }
            let action = options.action_for(destination);

            if let Some(existing) = pending
                .iter()
                .find(|item| item.same_work(&root_gid, destination, action))
            {
                queued.push(existing.clone());
                continue;
            }

            let item = self
                .store
                .insert_distribution(DistributionItem::new(root_gid.clone(), destination.clone(), action, now))
                .await?;
            tracing::debug!(id = %item.id, gid = %root_gid, destination = %destination, action = %action, "enqueued");
            queued.push(item);
        }

        Ok(queued)
    }

    /// Queue items, optionally filtered by status.
    pub async fn list(&self, status: Option<DistributionStatus>) -> Result<Vec<DistributionItem>> {
        Ok(self.store.list_distributions(status).await?)
    }

    /// Pending items older than the stuck threshold at `now`.
    pub async fn stuck_items(&self, now: i64) -> Result<Vec<DistributionItem>> {
        let threshold = self.config.stuck_threshold_ms;
        Ok(self
            .store
            .list_distributions(None)
            .await?
            .into_iter()
            .filter(|item| item.is_stuck(now, threshold))
            .collect())
    }

    /// Put a failed or stuck item back to `init`.
    pub async fn requeue(&self, id: DistributionId) -> Result<DistributionItem> {
        let mut item = self
            .store
            .get_distribution(id)
            .await?
            .ok_or(SyncError::UnknownDistribution(id))?;
        let now = now_millis();

        let stuck = item.is_stuck(now, self.config.stuck_threshold_ms);
        if item.status != DistributionStatus::Failed && !stuck {
            return Err(SyncError::NotRequeueable { id, status: item.status });
        }
        if item.attempts >= self.config.max_attempts {
            return Err(SyncError::AttemptsExhausted {
                id,
                attempts: item.attempts,
            });
        }

        item.status = DistributionStatus::Init;
        item.enqueued_at = now;
        item.updated_at = now;
        self.store.update_distribution(&item).await?;
        tracing::info!(id = %id, attempts = item.attempts, "requeued");
        Ok(item)
    }

    /// Drop terminal items last touched before the retention window.
    pub async fn collect_garbage(&self, now: i64) -> Result<usize> {
        let cutoff = now - self.config.retention_ms;
        let mut removed = 0;
        for item in self.store.list_distributions(None).await? {
            if item.status.is_terminal() && item.updated_at < cutoff && self.store.delete_distribution(item.id).await? {
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::debug!(removed, "collected distribution items");
        }
        Ok(removed)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Running
    // ─────────────────────────────────────────────────────────────────────────

    /// Run one item.
    ///
    /// Failures of the push itself are recorded on the item and reported as
    /// [`RunOutcome::Failed`]; only queue bookkeeping errors are returned as
    /// `Err`.
    pub async fn run(&self, id: DistributionId, policies: &ConflictPolicies) -> Result<RunOutcome> {
        let item = self
            .store
            .get_distribution(id)
            .await?
            .ok_or(SyncError::UnknownDistribution(id))?;

        let Some(_guard) = InFlight::claim(&self.in_flight, item.work_key()) else {
            return Ok(RunOutcome::Skipped {
                reason: "same work in flight".into(),
            });
        };

        // Re-read under the claim; another run may have finished meanwhile.
        let mut item = self
            .store
            .get_distribution(id)
            .await?
            .ok_or(SyncError::UnknownDistribution(id))?;
        if item.status != DistributionStatus::Init {
            return Ok(RunOutcome::Skipped {
                reason: format!("item is {}", item.status),
            });
        }

        item.status = DistributionStatus::Started;
        item.attempts += 1;
        item.updated_at = now_millis();
        self.store.update_distribution(&item).await?;
        tracing::debug!(id = %id, gid = %item.root_gid, destination = %item.destination_id, "started");

        let outcome = match self.execute(&item, policies).await {
            Ok(report) => {
                item.status = DistributionStatus::Completed;
                item.last_error = None;
                tracing::info!(id = %id, gid = %item.root_gid, destination = %item.destination_id, "completed");
                RunOutcome::Completed { report }
            }
            Err(e) => {
                let class = e.class();
                item.status = DistributionStatus::Failed;
                item.last_error = Some(format!("{}: {}", class, e));
                tracing::warn!(
                    id = %id,
                    gid = %item.root_gid,
                    destination = %item.destination_id,
                    class = %class,
                    error = %e,
                    "distribution failed"
                );
                RunOutcome::Failed {
                    class,
                    error: e.to_string(),
                }
            }
        };

        item.updated_at = now_millis();
        self.store.update_distribution(&item).await?;
        Ok(outcome)
    }

    /// Run items in order from `start`, stopping between items when paused.
    pub async fn run_batch(&self, ids: &[DistributionId], start: usize, policies: &ConflictPolicies) -> BatchReport {
        let mut report = BatchReport {
            next_index: ids.len(),
            ..BatchReport::default()
        };

        for (index, id) in ids.iter().enumerate().skip(start) {
            if self.is_paused() {
                report.paused = true;
                report.next_index = index;
                tracing::info!(next_index = index, "batch paused");
                break;
            }

            let outcome = match self.run(*id, policies).await {
                Ok(outcome) => outcome,
                Err(e) => RunOutcome::Failed {
                    class: e.class(),
                    error: e.to_string(),
                },
            };
            report.entries.push(BatchEntry { id: *id, outcome });
        }

        report
    }

    /// Requeue every failed item that has attempts left and run them.
    pub async fn retry_failed(&self, policies: &ConflictPolicies) -> Result<BatchReport> {
        let mut ids = Vec::new();
        for item in self.store.list_distributions(Some(DistributionStatus::Failed)).await? {
            match self.requeue(item.id).await {
                Ok(requeued) => ids.push(requeued.id),
                Err(SyncError::AttemptsExhausted { .. }) => {
                    tracing::debug!(id = %item.id, "not retried, attempts exhausted");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(self.run_batch(&ids, 0, policies).await)
    }

    /// Ask running batches to stop before their next item.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Execution
    // ─────────────────────────────────────────────────────────────────────────

    async fn execute(&self, item: &DistributionItem, policies: &ConflictPolicies) -> Result<ImportReport> {
        let root_gid = item.root_gid.local_part();
        let mut payload = self.payload(&root_gid, item.action, policies).await?;

        let report = match &item.destination_id {
            DestinationId::Local(node) => self.importer.import(*node, &payload).await?,
            DestinationId::Remote { host, node_id } => {
                if !self.transport.is_active(host).await {
                    return Err(SyncError::InactiveRemote(host.clone()));
                }
                // Copies on other networks name the root with our host.
                payload.gid = root_gid.with_host(self.directory.network_host());
                let timeout = self.config.push_timeout();
                match tokio::time::timeout(timeout, self.transport.push(host, *node_id, payload)).await {
                    Ok(result) => result?,
                    Err(_) => {
                        return Err(SyncError::Timeout(format!(
                            "push to {} after {} ms",
                            item.destination_id, self.config.push_timeout_ms
                        )))
                    }
                }
            }
        };

        match &report.record {
            Some(record) => {
                self.ledger
                    .add_connection(&root_gid, &item.destination_id, record.clone())
                    .await?;
            }
            None => {
                self.ledger.remove_connection(&root_gid, &item.destination_id).await?;
            }
        }

        Ok(report)
    }

    /// Build the payload for a root, honoring the review gate.
    async fn payload(&self, root_gid: &Gid, action: DistributionAction, policies: &ConflictPolicies) -> Result<DistributionPayload> {
        let node = root_gid.node_id;
        let stored = self.store.get_item(node, root_gid.item_id).await?;

        if action != DistributionAction::Insert {
            // The root may already be trashed or gone; the destination only
            // needs the GID.
            let root = stored.unwrap_or_else(|| ContentItem::new(node, root_gid.item_id, "", ""));
            return Ok(DistributionPayload {
                gid: root_gid.clone(),
                root,
                dependents: Vec::new(),
                action,
                policies: policies.clone(),
            });
        }

        let root = stored.ok_or_else(|| SyncError::RootNotFound(root_gid.clone()))?;
        if !root.is_root() {
            return Err(SyncError::NotARoot(root_gid.clone()));
        }

        let root = match self.store.latest_review(node, root.id).await? {
            Some(review) => match review.gate_view() {
                GateView::Live => root,
                GateView::Snapshot(snapshot) => {
                    tracing::debug!(gid = %root_gid, review = %review.id, "sending review snapshot");
                    let mut gated = root.clone();
                    gated.apply_content(snapshot);
                    gated
                }
                GateView::Withheld => return Err(SyncError::HeldForReview(root_gid.clone())),
            },
            None => root,
        };

        let mut dependents = Vec::new();
        for dep in &root.dependencies {
            match self.store.get_item(node, *dep).await? {
                Some(item) if item.status != PublishStatus::Trash => dependents.push(item),
                _ => tracing::debug!(gid = %root_gid, dependency = %dep, "skipping unavailable dependency"),
            }
        }

        Ok(DistributionPayload {
            gid: root_gid.clone(),
            root,
            dependents,
            action,
            policies: policies.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use synchub_core::{ClusterId, ItemId, NodeId, ReviewId, ReviewRecord, SyncStatus};
    use synchub_store::{MemoryStore, StaticDirectory};

    use crate::transport::NoRemotes;

    type TestDistributor = Distributor<MemoryStore, NoRemotes, StaticDirectory>;

    fn setup(config: DistributorConfig) -> (Arc<MemoryStore>, Arc<LedgerService<MemoryStore>>, TestDistributor) {
        let store = Arc::new(MemoryStore::new());
        let directory = Arc::new(StaticDirectory::new("hub.example").with_node(1).with_node(2).with_node(3));
        let ledger = Arc::new(LedgerService::new(store.clone()));
        let distributor = Distributor::new(store.clone(), Arc::new(NoRemotes), directory, ledger.clone(), config);
        (store, ledger, distributor)
    }

    async fn seed_root(store: &MemoryStore) -> (ContentItem, Gid) {
        let mut root = ContentItem::new(NodeId(1), ItemId(0), "article", "hello").published(1_000);
        root.title = "Live".into();
        let mut root = store.insert_item(NodeId(1), root).await.unwrap();
        let gid = Gid::local(NodeId(1), root.id);
        root.sync_status = SyncStatus::Root;
        root.sync_id = Some(gid.clone());
        store.update_item(NodeId(1), &root).await.unwrap();
        (root, gid)
    }

    #[tokio::test]
    async fn test_enqueue_skips_source_and_reuses_pending() {
        let (store, _, distributor) = setup(DistributorConfig::default());
        let (_, gid) = seed_root(&store).await;
        let dests = [DestinationId::Local(NodeId(1)), DestinationId::Local(NodeId(2))];

        let first = distributor.enqueue(&gid, &dests, &EnqueueOptions::default()).await.unwrap();
        let second = distributor.enqueue(&gid, &dests, &EnqueueOptions::default()).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].id, second[0].id);

        let trash = distributor
            .enqueue(&gid, &dests, &EnqueueOptions::new(DistributionAction::Trash))
            .await
            .unwrap();
        assert_ne!(trash[0].id, first[0].id);
        assert_eq!(distributor.list(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_run_completes_and_records_ledger() {
        let (store, ledger, distributor) = setup(DistributorConfig::default());
        let (_, gid) = seed_root(&store).await;
        let queued = distributor
            .enqueue(&gid, &[DestinationId::Local(NodeId(2))], &EnqueueOptions::default())
            .await
            .unwrap();

        let outcome = distributor.run(queued[0].id, &ConflictPolicies::default()).await.unwrap();
        let RunOutcome::Completed { report } = outcome else {
            panic!("expected completion");
        };
        let local = report.root.linked_item().unwrap();

        let entry = ledger.read(&gid).await.unwrap();
        assert_eq!(entry.get(&DestinationId::Local(NodeId(2))).unwrap().item_id, local);

        let item = store.get_distribution(queued[0].id).await.unwrap().unwrap();
        assert_eq!(item.status, DistributionStatus::Completed);
        assert_eq!(item.attempts, 1);

        // A second run of a completed item does nothing.
        assert!(matches!(
            distributor.run(queued[0].id, &ConflictPolicies::default()).await.unwrap(),
            RunOutcome::Skipped { .. }
        ));
    }

    #[tokio::test]
    async fn test_override_trash_removes_copy_and_entry() {
        let (store, ledger, distributor) = setup(DistributorConfig::default());
        let (_, gid) = seed_root(&store).await;
        let dest = DestinationId::Local(NodeId(2));
        let queued = distributor.enqueue(&gid, &[dest.clone()], &EnqueueOptions::default()).await.unwrap();
        distributor.run(queued[0].id, &ConflictPolicies::default()).await.unwrap();

        let options = EnqueueOptions::default().with_override(dest.clone(), DistributionAction::Trash);
        let queued = distributor.enqueue(&gid, &[dest.clone()], &options).await.unwrap();
        assert_eq!(queued[0].action, DistributionAction::Trash);
        assert!(distributor
            .run(queued[0].id, &ConflictPolicies::default())
            .await
            .unwrap()
            .is_completed());

        assert!(ledger.read(&gid).await.unwrap().is_empty());
        let live = store.query_items(NodeId(2), &synchub_store::ItemQuery::new()).await.unwrap();
        assert!(live.is_empty());
    }

    #[tokio::test]
    async fn test_failure_is_recorded_and_requeueable() {
        let (store, _, distributor) = setup(DistributorConfig {
            max_attempts: 2,
            ..DistributorConfig::default()
        });
        let (_, gid) = seed_root(&store).await;
        let queued = distributor
            .enqueue(&gid, &[DestinationId::remote("far.example", NodeId(1))], &EnqueueOptions::default())
            .await
            .unwrap();
        let id = queued[0].id;

        let outcome = distributor.run(id, &ConflictPolicies::default()).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Failed { class: ErrorClass::Connection, .. }));

        let failed = store.get_distribution(id).await.unwrap().unwrap();
        assert_eq!(failed.status, DistributionStatus::Failed);
        assert_eq!(failed.attempts, 1);
        assert!(failed.last_error.unwrap().starts_with("connection"));

        distributor.requeue(id).await.unwrap();
        distributor.run(id, &ConflictPolicies::default()).await.unwrap();
        assert!(matches!(
            distributor.requeue(id).await,
            Err(SyncError::AttemptsExhausted { attempts: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_retry_failed_skips_exhausted_items() {
        let (store, _, distributor) = setup(DistributorConfig {
            max_attempts: 2,
            ..DistributorConfig::default()
        });
        let (_, gid) = seed_root(&store).await;
        let queued = distributor
            .enqueue(
                &gid,
                &[
                    DestinationId::remote("far.example", NodeId(1)),
                    DestinationId::remote("far.example", NodeId(2)),
                ],
                &EnqueueOptions::default(),
            )
            .await
            .unwrap();
        let (exhausted, retried) = (queued[0].id, queued[1].id);
        let policies = ConflictPolicies::default();

        distributor.run(exhausted, &policies).await.unwrap();
        distributor.requeue(exhausted).await.unwrap();
        distributor.run(exhausted, &policies).await.unwrap();
        distributor.run(retried, &policies).await.unwrap();

        let report = distributor.retry_failed(&policies).await.unwrap();
        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0].id, retried);

        let retried = store.get_distribution(retried).await.unwrap().unwrap();
        assert_eq!(retried.attempts, 2);
        let exhausted = store.get_distribution(exhausted).await.unwrap().unwrap();
        assert_eq!(exhausted.attempts, 2);
        assert_eq!(exhausted.status, DistributionStatus::Failed);
    }

    #[tokio::test]
    async fn test_requeue_rejects_completed() {
        let (store, _, distributor) = setup(DistributorConfig::default());
        let (_, gid) = seed_root(&store).await;
        let queued = distributor
            .enqueue(&gid, &[DestinationId::Local(NodeId(2))], &EnqueueOptions::default())
            .await
            .unwrap();
        distributor.run(queued[0].id, &ConflictPolicies::default()).await.unwrap();

        assert!(matches!(
            distributor.requeue(queued[0].id).await,
            Err(SyncError::NotRequeueable { .. })
        ));
    }

    #[tokio::test]
    async fn test_stuck_items() {
        let (store, _, distributor) = setup(DistributorConfig::default());
        let (_, gid) = seed_root(&store).await;
        let queued = distributor
            .enqueue(&gid, &[DestinationId::Local(NodeId(2))], &EnqueueOptions::default())
            .await
            .unwrap();
        let t0 = queued[0].enqueued_at;

        assert!(distributor.stuck_items(t0 + 60_000).await.unwrap().is_empty());
        let stuck = distributor.stuck_items(t0 + 6 * 60_000).await.unwrap();
        assert_eq!(stuck.len(), 1);

        distributor.run(queued[0].id, &ConflictPolicies::default()).await.unwrap();
        assert!(distributor.stuck_items(t0 + 6 * 60_000).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_batch_pause_and_resume() {
        let (store, _, distributor) = setup(DistributorConfig::default());
        let (_, gid) = seed_root(&store).await;
        let queued = distributor
            .enqueue(
                &gid,
                &[DestinationId::Local(NodeId(2)), DestinationId::Local(NodeId(3))],
                &EnqueueOptions::default(),
            )
            .await
            .unwrap();
        let ids: Vec<_> = queued.iter().map(|i| i.id).collect();

        distributor.pause();
        let paused = distributor.run_batch(&ids, 0, &ConflictPolicies::default()).await;
        assert!(paused.paused);
        assert_eq!(paused.next_index, 0);
        assert!(paused.entries.is_empty());

        distributor.resume();
        let done = distributor
            .run_batch(&ids, paused.next_index, &ConflictPolicies::default())
            .await;
        assert!(!done.paused);
        assert_eq!(done.next_index, 2);
        assert_eq!(done.completed(), 2);
    }

    #[tokio::test]
    async fn test_batch_continues_past_errors() {
        let (store, _, distributor) = setup(DistributorConfig::default());
        let (_, gid) = seed_root(&store).await;
        let queued = distributor
            .enqueue(&gid, &[DestinationId::Local(NodeId(2))], &EnqueueOptions::default())
            .await
            .unwrap();

        let report = distributor
            .run_batch(&[DistributionId(999), queued[0].id], 0, &ConflictPolicies::default())
            .await;
        assert_eq!(report.failed(), 1);
        assert_eq!(report.completed(), 1);
    }

    #[tokio::test]
    async fn test_review_snapshot_is_sent() {
        let (store, _, distributor) = setup(DistributorConfig::default());
        let (root, gid) = seed_root(&store).await;

        let mut snapshot = root.clone();
        snapshot.title = "Approved earlier".into();
        let mut review = ReviewRecord::open(ReviewId(0), ClusterId(1), &root, Some(snapshot), 0);
        review.submit(0).unwrap();
        store.insert_review(review).await.unwrap();

        let queued = distributor
            .enqueue(&gid, &[DestinationId::Local(NodeId(2))], &EnqueueOptions::default())
            .await
            .unwrap();
        let RunOutcome::Completed { report } = distributor.run(queued[0].id, &ConflictPolicies::default()).await.unwrap() else {
            panic!("expected completion");
        };
        let copy = store
            .get_item(NodeId(2), report.root.linked_item().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(copy.title, "Approved earlier");
    }

    #[tokio::test]
    async fn test_withheld_without_snapshot() {
        let (store, _, distributor) = setup(DistributorConfig::default());
        let (root, gid) = seed_root(&store).await;
        store
            .insert_review(ReviewRecord::open(ReviewId(0), ClusterId(1), &root, None, 0))
            .await
            .unwrap();

        let queued = distributor
            .enqueue(&gid, &[DestinationId::Local(NodeId(2))], &EnqueueOptions::default())
            .await
            .unwrap();
        let outcome = distributor.run(queued[0].id, &ConflictPolicies::default()).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn test_garbage_collection() {
        let (store, _, distributor) = setup(DistributorConfig::default());
        let (_, gid) = seed_root(&store).await;
        let queued = distributor
            .enqueue(&gid, &[DestinationId::Local(NodeId(2))], &EnqueueOptions::default())
            .await
            .unwrap();
        distributor.run(queued[0].id, &ConflictPolicies::default()).await.unwrap();

        let now = now_millis();
        assert_eq!(distributor.collect_garbage(now).await.unwrap(), 0);
        let later = now + DistributorConfig::default().retention_ms + 1_000;
        assert_eq!(distributor.collect_garbage(later).await.unwrap(), 1);
        assert!(distributor.list(None).await.unwrap().is_empty());
    }
}
