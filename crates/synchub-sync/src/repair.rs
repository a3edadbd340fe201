//! Drift detection and self-repair.
//!
//! The repairer gathers facts about one item (its root, the root's ledger,
//! the copies the ledger points at), hands them to the pure classifiers in
//! [`synchub_core::drift`], and applies the resulting actions the
//! [`RepairMode`] allows.

use std::sync::Arc;
use std::time::Duration;

use synchub_core::drift::{classify_entry, classify_linked, classify_root_identity, CopyLookup, RootLookup};
use synchub_core::{
    ConnectionLedger, ConnectionRecord, ContentItem, CoreError, DestinationId, DriftKind, Fault, Gid, ItemId,
    NodeId, NodeInfo, PublishStatus, RepairAction, RepairMode, RepairReport, SyncStatus,
};
use synchub_store::{Directory, ItemQuery, Store};

use crate::error::{Result, SyncError};
use crate::ledger::LedgerService;
use crate::messages::{ConnectionUpdate, RemoteItem};
use crate::transport::Transport;

/// Where a linked item's root lives.
enum RootHome {
    Local,
    Remote(String),
}

/// Bound on one remote lookup or connection update.
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(30);

/// Inspects and repairs items on one network.
pub struct Repairer<S: Store + ?Sized, T: Transport + ?Sized, D: Directory + ?Sized> {
    store: Arc<S>,
    transport: Arc<T>,
    directory: Arc<D>,
    ledger: Arc<LedgerService<S>>,
    timeout: Duration,
}

impl<S: Store + ?Sized, T: Transport + ?Sized, D: Directory + ?Sized> Repairer<S, T, D> {
    pub fn new(store: Arc<S>, transport: Arc<T>, directory: Arc<D>, ledger: Arc<LedgerService<S>>) -> Self {
        Self {
            store,
            transport,
            directory,
            ledger,
            timeout: DEFAULT_REMOTE_TIMEOUT,
        }
    }

    /// Bound every remote call by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Classify drift on one item without changing anything.
    pub async fn inspect(&self, node: NodeId, item: ItemId) -> Result<RepairReport> {
        self.repair(node, item, RepairMode::Inspect).await
    }

    /// Classify drift on one item and apply what `mode` allows.
    pub async fn repair(&self, node: NodeId, item: ItemId, mode: RepairMode) -> Result<RepairReport> {
        let current = self
            .store
            .get_item(node, item)
            .await?
            .ok_or(SyncError::ItemNotFound { node, item })?;

        let mut report = RepairReport::new(node, item);
        let (faults, home) = match current.sync_status {
            SyncStatus::None => (Vec::new(), RootHome::Local),
            SyncStatus::Root => (self.root_faults(&current).await?, RootHome::Local),
            SyncStatus::Linked => self.linked_faults(&current).await?,
        };

        for fault in faults {
            let line = if !mode.allows(fault.risk()) {
                report.repaired = false;
                match mode {
                    RepairMode::Inspect => format!("found {}; would {}", fault.kind, fault.action),
                    _ => format!("found {}; skipped {} (needs repair)", fault.kind, fault.action),
                }
            } else {
                match self.apply(&current, &fault.action, &home).await {
                    Ok(()) => {
                        tracing::info!(node = %node, item = %item, action = %fault.action, "repaired");
                        format!("found {}; did {}", fault.kind, fault.action)
                    }
                    Err(e) => {
                        report.repaired = false;
                        tracing::warn!(node = %node, item = %item, action = %fault.action, error = %e, "repair failed");
                        format!("found {}; failed to {}: {}", fault.kind, fault.action, e)
                    }
                }
            };
            report.log.push(line);
            report.faults.push(fault);
        }

        Ok(report)
    }

    /// Sweep every synced item of a node.
    pub async fn inspect_node(&self, node: NodeId, mode: RepairMode) -> Result<Vec<RepairReport>> {
        let mut items = self
            .store
            .query_items(node, &ItemQuery::new().with_sync_status(SyncStatus::Root))
            .await?;
        items.extend(
            self.store
                .query_items(node, &ItemQuery::new().with_sync_status(SyncStatus::Linked))
                .await?,
        );
        items.sort_by_key(|item| item.id);

        let mut reports = Vec::with_capacity(items.len());
        for item in items {
            reports.push(self.repair(node, item.id, mode).await?);
        }
        tracing::debug!(
            node = %node,
            items = reports.len(),
            faulty = reports.iter().filter(|r| !r.is_clean()).count(),
            "node inspected"
        );
        Ok(reports)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Explicit sync changes
    // ─────────────────────────────────────────────────────────────────────────

    /// Remove a linked item's entry from its root's ledger, wherever the
    /// root lives. Missing roots and inactive remotes are tolerated.
    pub async fn detach(&self, item: &ContentItem) -> Result<()> {
        let Some(gid) = item.sync_id.as_ref().filter(|_| item.is_linked()) else {
            return Ok(());
        };
        let root = gid.local_part();

        match self.home_of(gid) {
            RootHome::Local => {
                if self.store.get_item(root.node_id, root.item_id).await?.is_some() {
                    self.ledger
                        .remove_connection(&root, &DestinationId::Local(item.node_id))
                        .await?;
                }
            }
            RootHome::Remote(host) => {
                let update = ConnectionUpdate {
                    root,
                    destination: DestinationId::remote(self.directory.network_host(), item.node_id),
                    record: None,
                };
                if let Err(e) = self.push_update(&host, update).await {
                    tracing::warn!(host = %host, item = %item.id, error = %e, "remote ledger not updated");
                }
            }
        }
        Ok(())
    }

    /// Turn an item into a fresh root with an empty ledger.
    pub async fn promote(&self, node: NodeId, item: ItemId) -> Result<ContentItem> {
        let mut current = self
            .store
            .get_item(node, item)
            .await?
            .ok_or(SyncError::ItemNotFound { node, item })?;

        let gid = Gid::local(node, item);
        current.sync_status = SyncStatus::Root;
        current.sync_id = Some(gid.clone());
        self.store.update_item(node, &current).await?;
        self.ledger.clear(&gid).await?;

        tracing::info!(gid = %gid, "promoted to root");
        Ok(current)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Fact gathering
    // ─────────────────────────────────────────────────────────────────────────

    async fn root_faults(&self, root: &ContentItem) -> Result<Vec<Fault>> {
        let own = Gid::local(root.node_id, root.id);
        let mut faults = Vec::new();

        let claimed = match root.sync_id.as_ref() {
            Some(gid) if gid.local_part() != own && matches!(self.home_of(gid), RootHome::Local) => {
                self.store.get_item(gid.node_id, gid.item_id).await?
            }
            _ => None,
        };
        faults.extend(classify_root_identity(root, &own, claimed.as_ref()));

        let ledger = match self.load_ledger(&own).await? {
            Ok(ledger) => ledger,
            Err(fault) => {
                faults.push(fault);
                return Ok(faults);
            }
        };
        for (destination, record) in ledger.entries() {
            let fault = match &destination {
                DestinationId::Local(node) => {
                    let copy = self.store.get_item(*node, record.item_id).await?;
                    let lookup = copy.as_ref().map_or(CopyLookup::Missing, CopyLookup::Found);
                    classify_entry(&own, &destination, record, lookup)
                }
                DestinationId::Remote { host, node_id } => {
                    let fetched = self.fetch(host, *node_id, record.item_id).await;
                    let lookup = match &fetched {
                        Fetched::Found(remote) => CopyLookup::Found(&remote.item),
                        Fetched::Missing => CopyLookup::Missing,
                        Fetched::Unreachable => CopyLookup::Unreachable,
                    };
                    classify_entry(&own, &destination, record, lookup)
                }
            };
            faults.extend(fault);
        }

        Ok(faults)
    }

    async fn linked_faults(&self, item: &ContentItem) -> Result<(Vec<Fault>, RootHome)> {
        let info = self
            .directory
            .node(item.node_id)
            .ok_or(SyncError::UnknownNode(item.node_id))?;
        let record = record_on(&info, item.id);

        let Some(gid) = item.sync_id.as_ref() else {
            let destination = DestinationId::Local(item.node_id);
            let fault = classify_linked(item, &destination, record, RootLookup::Missing);
            return Ok((fault.into_iter().collect(), RootHome::Local));
        };
        let root_gid = gid.local_part();
        let home = self.home_of(gid);

        let (root, ledger, destination) = match &home {
            RootHome::Local => {
                let root = self.store.get_item(root_gid.node_id, root_gid.item_id).await?;
                let ledger = match root {
                    Some(_) => match self.load_ledger(&root_gid).await? {
                        Ok(ledger) => ledger,
                        Err(fault) => return Ok((vec![fault], home)),
                    },
                    None => ConnectionLedger::new(),
                };
                (root, ledger, DestinationId::Local(item.node_id))
            }
            RootHome::Remote(host) => {
                let destination = DestinationId::remote(self.directory.network_host(), item.node_id);
                match self.fetch(host, root_gid.node_id, root_gid.item_id).await {
                    Fetched::Found(remote) => (Some(remote.item), remote.ledger, destination),
                    Fetched::Missing => (None, ConnectionLedger::new(), destination),
                    Fetched::Unreachable => {
                        let fault = classify_linked(item, &destination, record, RootLookup::Unreachable { host });
                        return Ok((fault.into_iter().collect(), RootHome::Remote(host.clone())));
                    }
                }
            }
        };

        let recorded = match ledger.get(&destination) {
            Some(entry) if entry.item_id != item.id => self
                .store
                .get_item(item.node_id, entry.item_id)
                .await?
                .filter(|other| {
                    other.is_linked()
                        && other.status != PublishStatus::Trash
                        && other.sync_id.as_ref().is_some_and(|g| g.local_part() == root_gid)
                }),
            _ => None,
        };

        let lookup = match &root {
            Some(root) => RootLookup::Found {
                root,
                ledger: &ledger,
                recorded: recorded.as_ref(),
            },
            None => RootLookup::Missing,
        };
        let fault = classify_linked(item, &destination, record, lookup);
        Ok((fault.into_iter().collect(), home))
    }

    /// A root's ledger, or the fault describing why it cannot be read.
    async fn load_ledger(&self, root: &Gid) -> Result<std::result::Result<ConnectionLedger, Fault>> {
        match self.ledger.load(root).await {
            Ok(ledger) => Ok(Ok(ledger)),
            Err(SyncError::Core(CoreError::Normalization(detail))) => Ok(Err(Fault::new(
                DriftKind::UnreadableLedger {
                    root: root.clone(),
                    detail,
                },
                RepairAction::RebuildLedger { root: root.clone() },
            ))),
            Err(e) => Err(e),
        }
    }

    /// A ledger naming the live linked copies of `root` on this network.
    async fn collect_copies(&self, root: &Gid) -> Result<ConnectionLedger> {
        let query = ItemQuery::new().linked_to(root);
        let mut ledger = ConnectionLedger::new();
        for info in self.directory.list_nodes() {
            let mut copies = self.store.query_items(info.id, &query).await?;
            copies.retain(ContentItem::is_linked);
            if let Some(copy) = copies.iter().min_by_key(|copy| copy.id) {
                ledger.add_connection(&DestinationId::Local(info.id), record_on(&info, copy.id));
            }
        }
        Ok(ledger)
    }

    fn home_of(&self, gid: &Gid) -> RootHome {
        match &gid.remote_host {
            Some(host) if gid.is_remote_to(self.directory.network_host()) => RootHome::Remote(host.clone()),
            _ => RootHome::Local,
        }
    }

    async fn fetch(&self, host: &str, node: NodeId, item: ItemId) -> Fetched {
        let lookup = async {
            if !self.transport.is_active(host).await {
                return Ok(None);
            }
            self.transport.fetch_remote_item(host, node, item).await.map(Some)
        };
        match tokio::time::timeout(self.timeout, lookup).await {
            Ok(Ok(Some(Some(remote)))) => Fetched::Found(remote),
            Ok(Ok(Some(None))) => Fetched::Missing,
            Ok(Ok(None)) => Fetched::Unreachable,
            Ok(Err(e)) => {
                tracing::warn!(host = %host, node = %node, item = %item, error = %e, "remote lookup failed");
                Fetched::Unreachable
            }
            Err(_) => {
                tracing::warn!(
                    host = %host,
                    node = %node,
                    item = %item,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "remote lookup timed out"
                );
                Fetched::Unreachable
            }
        }
    }

    async fn push_update(&self, host: &str, update: ConnectionUpdate) -> Result<()> {
        match tokio::time::timeout(self.timeout, self.transport.push_remote_connection_update(host, update)).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout(format!(
                "connection update to {} after {} ms",
                host,
                self.timeout.as_millis()
            ))),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Actions
    // ─────────────────────────────────────────────────────────────────────────

    async fn apply(&self, item: &ContentItem, action: &RepairAction, home: &RootHome) -> Result<()> {
        match action {
            RepairAction::DeleteLedgerEntry { root, destination } => {
                self.ledger.remove_connection(root, destination).await?;
            }
            RepairAction::RestoreLedgerEntry {
                root,
                destination,
                record,
            } => match home {
                RootHome::Local => {
                    self.ledger.add_connection(root, destination, record.clone()).await?;
                }
                RootHome::Remote(host) => {
                    let update = ConnectionUpdate {
                        root: root.clone(),
                        destination: destination.clone(),
                        record: Some(record.clone()),
                    };
                    self.push_update(host, update).await?;
                }
            },
            RepairAction::RewriteSyncId { to } => {
                let mut updated = item.clone();
                updated.sync_id = Some(to.clone());
                self.store.update_item(item.node_id, &updated).await?;
            }
            RepairAction::RebuildLedger { root } => {
                let rebuilt = self.collect_copies(root).await?;
                self.ledger.replace(root, &rebuilt).await?;
                tracing::info!(root = %root, entries = rebuilt.len(), "ledger rebuilt");
            }
            RepairAction::PromoteToRoot => {
                self.promote(item.node_id, item.id).await?;
            }
            RepairAction::MoveToTrash => {
                self.store.move_to_trash(item.node_id, item.id).await?;
            }
        }
        Ok(())
    }
}

fn record_on(info: &NodeInfo, item: ItemId) -> ConnectionRecord {
    ConnectionRecord {
        item_id: item,
        edit_locator: info.edit_locator(item),
        view_locator: info.view_locator(item),
        display_locator: info.base_url.clone(),
    }
}

enum Fetched {
    Found(RemoteItem),
    Missing,
    Unreachable,
}

#[cfg(test)]
mod tests {
    use super::*;
    use synchub_store::{MemoryStore, StaticDirectory};

    use crate::messages::{DistributionPayload, ImportReport};
    use crate::transport::loopback::LoopbackNetwork;
    use crate::transport::NoRemotes;

    type LocalRepairer = Repairer<MemoryStore, NoRemotes, StaticDirectory>;

    fn setup() -> (Arc<MemoryStore>, Arc<LedgerService<MemoryStore>>, LocalRepairer) {
        let store = Arc::new(MemoryStore::new());
        let directory = Arc::new(StaticDirectory::new("hub.example").with_node(1).with_node(2));
        let ledger = Arc::new(LedgerService::new(store.clone()));
        let repairer = Repairer::new(store.clone(), Arc::new(NoRemotes), directory, ledger.clone());
        (store, ledger, repairer)
    }

    async fn put(store: &MemoryStore, node: u64, id: u64, sync_status: SyncStatus, sync_id: Option<Gid>) -> ContentItem {
        let mut item = ContentItem::new(NodeId(node), ItemId(id), "article", format!("item-{}", id)).published(1);
        item.sync_status = sync_status;
        item.sync_id = sync_id;
        store.insert_item(NodeId(node), item).await.unwrap()
    }

    fn record(item: u64) -> ConnectionRecord {
        let info = synchub_core::NodeInfo::new(NodeId(2), "https://hub.example/n2");
        ConnectionRecord {
            item_id: ItemId(item),
            edit_locator: info.edit_locator(ItemId(item)),
            view_locator: info.view_locator(ItemId(item)),
            display_locator: info.base_url.clone(),
        }
    }

    #[tokio::test]
    async fn test_missing_entry_restored() {
        let (store, ledger, repairer) = setup();
        let root = Gid::local(NodeId(1), ItemId(10));
        put(&store, 1, 10, SyncStatus::Root, Some(root.clone())).await;
        put(&store, 2, 57, SyncStatus::Linked, Some(root.clone())).await;

        let found = repairer.inspect(NodeId(2), ItemId(57)).await.unwrap();
        assert!(matches!(found.faults[0].kind, DriftKind::MissingEntry { .. }));
        assert!(!found.repaired);
        assert!(ledger.read(&root).await.unwrap().is_empty());

        let fixed = repairer.repair(NodeId(2), ItemId(57), RepairMode::Autorepair).await.unwrap();
        assert!(fixed.repaired);
        assert_eq!(fixed.log.len(), 1);
        assert_eq!(
            ledger.read(&root).await.unwrap().get(&DestinationId::Local(NodeId(2))),
            Some(&record(57))
        );

        assert!(repairer.inspect(NodeId(2), ItemId(57)).await.unwrap().is_clean());
    }

    #[tokio::test]
    async fn test_orphaned_connection_deleted() {
        let (store, ledger, repairer) = setup();
        let root = Gid::local(NodeId(1), ItemId(10));
        put(&store, 1, 10, SyncStatus::Root, Some(root.clone())).await;
        ledger
            .add_connection(&root, &DestinationId::Local(NodeId(2)), record(99))
            .await
            .unwrap();

        let report = repairer.repair(NodeId(1), ItemId(10), RepairMode::Autorepair).await.unwrap();
        assert!(matches!(report.faults[0].kind, DriftKind::OrphanedConnection { .. }));
        assert!(report.repaired);
        assert!(ledger.read(&root).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_orphaned_link_needs_repair_mode() {
        let (store, ledger, repairer) = setup();
        let gone = Gid::local(NodeId(1), ItemId(10));
        put(&store, 2, 57, SyncStatus::Linked, Some(gone)).await;

        let auto = repairer.repair(NodeId(2), ItemId(57), RepairMode::Autorepair).await.unwrap();
        assert!(matches!(auto.faults[0].kind, DriftKind::OrphanedLink { .. }));
        assert!(!auto.repaired);
        assert!(auto.log[0].contains("skipped"));

        let full = repairer.repair(NodeId(2), ItemId(57), RepairMode::Repair).await.unwrap();
        assert!(full.repaired);
        let promoted = store.get_item(NodeId(2), ItemId(57)).await.unwrap().unwrap();
        assert!(promoted.is_root());
        assert_eq!(promoted.sync_id, Some(Gid::local(NodeId(2), ItemId(57))));
        assert!(ledger.read(&Gid::local(NodeId(2), ItemId(57))).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_link_trashed() {
        let (store, ledger, repairer) = setup();
        let root = Gid::local(NodeId(1), ItemId(10));
        put(&store, 1, 10, SyncStatus::Root, Some(root.clone())).await;
        put(&store, 2, 57, SyncStatus::Linked, Some(root.clone())).await;
        put(&store, 2, 58, SyncStatus::Linked, Some(root.clone())).await;
        ledger
            .add_connection(&root, &DestinationId::Local(NodeId(2)), record(57))
            .await
            .unwrap();

        let report = repairer.repair(NodeId(2), ItemId(58), RepairMode::Repair).await.unwrap();
        assert!(matches!(report.faults[0].kind, DriftKind::DuplicateLink { kept: ItemId(57), .. }));
        assert_eq!(
            store.get_item(NodeId(2), ItemId(58)).await.unwrap().unwrap().status,
            PublishStatus::Trash
        );
    }

    #[tokio::test]
    async fn test_unreadable_ledger_rebuilt_from_copies() {
        let (store, ledger, repairer) = setup();
        let root = Gid::local(NodeId(1), ItemId(10));
        put(&store, 1, 10, SyncStatus::Root, Some(root.clone())).await;
        put(&store, 2, 57, SyncStatus::Linked, Some(root.clone())).await;
        store
            .set_metadata(
                NodeId(1),
                ItemId(10),
                crate::ledger::LEDGER_META_KEY,
                &serde_json::json!({ "3": { "item_id": 44 }, "4": { "edit": "x" } }),
            )
            .await
            .unwrap();

        let found = repairer.inspect(NodeId(1), ItemId(10)).await.unwrap();
        assert!(matches!(found.faults[0].kind, DriftKind::UnreadableLedger { .. }));
        assert_eq!(found.faults[0].action, RepairAction::RebuildLedger { root: root.clone() });

        let fixed = repairer.repair(NodeId(2), ItemId(57), RepairMode::Autorepair).await.unwrap();
        assert!(fixed.repaired, "{:?}", fixed.log);
        let rebuilt = ledger.load(&root).await.unwrap();
        assert_eq!(rebuilt.len(), 1);
        assert_eq!(rebuilt.get(&DestinationId::Local(NodeId(2))), Some(&record(57)));

        assert!(repairer.inspect(NodeId(1), ItemId(10)).await.unwrap().is_clean());
    }

    #[tokio::test]
    async fn test_root_without_sync_id_rewritten() {
        let (store, _, repairer) = setup();
        put(&store, 1, 10, SyncStatus::Root, None).await;

        let report = repairer.repair(NodeId(1), ItemId(10), RepairMode::Autorepair).await.unwrap();
        assert!(matches!(report.faults[0].kind, DriftKind::InvalidIdentity { .. }));
        assert_eq!(
            store.get_item(NodeId(1), ItemId(10)).await.unwrap().unwrap().sync_id,
            Some(Gid::local(NodeId(1), ItemId(10)))
        );
    }

    #[tokio::test]
    async fn test_inspect_node_sweeps_synced_items() {
        let (store, _, repairer) = setup();
        let root = Gid::local(NodeId(1), ItemId(10));
        put(&store, 1, 10, SyncStatus::Root, Some(root.clone())).await;
        put(&store, 2, 57, SyncStatus::Linked, Some(root.clone())).await;
        put(&store, 2, 60, SyncStatus::None, None).await;

        let reports = repairer.inspect_node(NodeId(2), RepairMode::Inspect).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].item_id, ItemId(57));
    }

    /// A remote that accepts calls and never answers the ones it stalls.
    struct StalledRemote {
        root: Option<RemoteItem>,
    }

    #[async_trait::async_trait]
    impl Transport for StalledRemote {
        async fn push(&self, _host: &str, _node: NodeId, _payload: DistributionPayload) -> Result<ImportReport> {
            std::future::pending().await
        }

        async fn fetch_remote_item(&self, _host: &str, _node: NodeId, _item: ItemId) -> Result<Option<RemoteItem>> {
            match &self.root {
                Some(root) => Ok(Some(root.clone())),
                None => std::future::pending().await,
            }
        }

        async fn push_remote_connection_update(&self, _host: &str, _update: ConnectionUpdate) -> Result<()> {
            std::future::pending().await
        }

        async fn is_active(&self, _host: &str) -> bool {
            true
        }
    }

    fn stalled(root: Option<RemoteItem>) -> (Arc<MemoryStore>, Repairer<MemoryStore, StalledRemote, StaticDirectory>) {
        let store = Arc::new(MemoryStore::new());
        let directory = Arc::new(StaticDirectory::new("hub.example").with_node(2));
        let ledger = Arc::new(LedgerService::new(store.clone()));
        let repairer = Repairer::new(store.clone(), Arc::new(StalledRemote { root }), directory, ledger)
            .with_timeout(Duration::from_millis(50));
        (store, repairer)
    }

    #[tokio::test]
    async fn test_stalled_remote_lookup_times_out() {
        let (store, repairer) = stalled(None);
        let gid = Gid::local(NodeId(1), ItemId(10)).with_host("far.example");
        let copy = put(&store, 2, 57, SyncStatus::Linked, Some(gid)).await;

        let report = tokio::time::timeout(Duration::from_secs(5), repairer.inspect(NodeId(2), ItemId(57)))
            .await
            .expect("inspect is bounded")
            .unwrap();
        assert!(matches!(report.faults[0].kind, DriftKind::UnreachableRemoteRoot { .. }));

        tokio::time::timeout(Duration::from_secs(5), repairer.detach(&copy))
            .await
            .expect("detach is bounded")
            .unwrap();
    }

    #[tokio::test]
    async fn test_stalled_connection_update_times_out() {
        let mut root = ContentItem::new(NodeId(1), ItemId(10), "article", "item-10").published(1);
        root.sync_status = SyncStatus::Root;
        root.sync_id = Some(Gid::local(NodeId(1), ItemId(10)));
        let (store, repairer) = stalled(Some(RemoteItem {
            item: root,
            ledger: ConnectionLedger::new(),
        }));
        let gid = Gid::local(NodeId(1), ItemId(10)).with_host("far.example");
        put(&store, 2, 57, SyncStatus::Linked, Some(gid)).await;

        let report = tokio::time::timeout(
            Duration::from_secs(5),
            repairer.repair(NodeId(2), ItemId(57), RepairMode::Autorepair),
        )
        .await
        .expect("repair is bounded")
        .unwrap();
        assert!(matches!(report.faults[0].kind, DriftKind::MissingEntry { .. }));
        assert!(!report.repaired);
        assert!(report.log[0].contains("timeout: connection update to far.example"), "{:?}", report.log);
    }

    #[tokio::test]
    async fn test_unreachable_remote_root() {
        let network = LoopbackNetwork::new();
        let store = Arc::new(MemoryStore::new());
        let directory = Arc::new(StaticDirectory::new("hub.example").with_node(2));
        let ledger = Arc::new(LedgerService::new(store.clone()));
        let remote_store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let remote_directory: Arc<dyn Directory> = Arc::new(StaticDirectory::new("far.example").with_node(1));
        network
            .register(remote_store.clone(), remote_directory, Arc::new(LedgerService::new(remote_store)))
            .await;
        let transport = Arc::new(
            network
                .register(
                    store.clone() as Arc<dyn Store>,
                    directory.clone() as Arc<dyn Directory>,
                    Arc::new(LedgerService::new(store.clone() as Arc<dyn Store>)),
                )
                .await,
        );
        let repairer = Repairer::new(store.clone(), transport, directory, ledger);

        let gid = Gid::local(NodeId(1), ItemId(10)).with_host("far.example");
        put(&store, 2, 57, SyncStatus::Linked, Some(gid)).await;
        network.endpoint("far.example").await.unwrap().set_active(false);

        let report = repairer.inspect(NodeId(2), ItemId(57)).await.unwrap();
        assert!(matches!(report.faults[0].kind, DriftKind::UnreachableRemoteRoot { .. }));
    }
}
