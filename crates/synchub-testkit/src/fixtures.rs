//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;

use synchub_core::{ConnectionRecord, ContentItem, DestinationId, Gid, ItemId, NodeId, SyncStatus};
use synchub_store::{Directory, MemoryStore, StaticDirectory, Store};
use synchub_sync::{LedgerService, LoopbackNetwork, LoopbackTransport};

/// Install a tracing subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call installs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
        .with_test_writer()
        .try_init();
}

/// One network backed by a memory store.
pub struct TestNetwork {
    pub store: Arc<dyn Store>,
    pub directory: Arc<StaticDirectory>,
    pub ledger: Arc<LedgerService<dyn Store>>,
}

impl TestNetwork {
    /// Create a network named `host` with the given nodes.
    pub fn new(host: &str, nodes: impl IntoIterator<Item = u64>) -> Self {
        let directory = nodes
            .into_iter()
            .fold(StaticDirectory::new(host), |dir, node| dir.with_node(node));
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        Self {
            ledger: Arc::new(LedgerService::new(store.clone())),
            store,
            directory: Arc::new(directory),
        }
    }

    pub fn host(&self) -> &str {
        self.directory.network_host()
    }

    /// The directory as a trait object.
    pub fn directory_dyn(&self) -> Arc<dyn Directory> {
        self.directory.clone()
    }

    /// Insert a published, unsynchronized item.
    pub async fn insert_item(&self, node: NodeId, item_type: &str, name: &str, published_at: i64) -> ContentItem {
        let mut item = ContentItem::new(node, ItemId(0), item_type, name).published(published_at);
        item.title = name.to_string();
        item.body = format!("body of {name}");
        self.store
            .insert_item(node, item)
            .await
            .expect("insert item")
    }

    /// Insert a published root.
    pub async fn insert_root(&self, node: NodeId, item_type: &str, name: &str, published_at: i64) -> ContentItem {
        let mut item = self.insert_item(node, item_type, name, published_at).await;
        item.sync_status = SyncStatus::Root;
        item.sync_id = Some(Gid::local(node, item.id));
        self.save(&item).await;
        item
    }

    /// Create a linked copy of a local root on `node` and record it in the
    /// root's ledger.
    pub async fn link_copy(&self, node: NodeId, root: &ContentItem) -> ContentItem {
        let gid = Gid::local(root.node_id, root.id);
        let mut copy = ContentItem::new(node, ItemId(0), root.item_type.clone(), root.name.clone());
        copy.apply_content(root);
        copy.sync_status = SyncStatus::Linked;
        copy.sync_id = Some(gid.clone());
        let copy = self.store.insert_item(node, copy).await.expect("insert copy");

        let info = self.directory.node(node).expect("node in directory");
        let record = ConnectionRecord {
            item_id: copy.id,
            edit_locator: info.edit_locator(copy.id),
            view_locator: info.view_locator(copy.id),
            display_locator: info.base_url.clone(),
        };
        self.ledger
            .add_connection(&gid, &DestinationId::Local(node), record)
            .await
            .expect("add connection");
        copy
    }

    /// Read an item back.
    pub async fn item(&self, node: NodeId, id: ItemId) -> Option<ContentItem> {
        self.store.get_item(node, id).await.expect("get item")
    }

    /// Write an item back.
    pub async fn save(&self, item: &ContentItem) {
        self.store
            .update_item(item.node_id, item)
            .await
            .expect("update item");
    }
}

/// Create several networks connected through one loopback network.
pub async fn loopback_networks(
    hosts: &[&str],
    nodes: &[u64],
) -> (Arc<LoopbackNetwork>, Vec<(TestNetwork, LoopbackTransport)>) {
    let loopback = LoopbackNetwork::new();
    let mut networks = Vec::with_capacity(hosts.len());
    for host in hosts {
        let network = TestNetwork::new(host, nodes.iter().copied());
        let transport = loopback
            .register(network.store.clone(), network.directory_dyn(), network.ledger.clone())
            .await;
        networks.push((network, transport));
    }
    (loopback, networks)
}
