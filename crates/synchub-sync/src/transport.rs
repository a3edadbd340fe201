//! Transport abstraction for reaching other networks.
//!
//! Local destinations are imported directly; anything on another network
//! goes through a [`Transport`]. Implementations may use HTTP, a message bus,
//! or (for tests and single-process setups) the loopback network below.

use async_trait::async_trait;

use synchub_core::{ItemId, NodeId};

use crate::error::{Result, SyncError};
use crate::messages::{ConnectionUpdate, DistributionPayload, ImportReport, RemoteItem};

/// Transport trait for talking to remote networks.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver a payload to a node of `host`; the remote side imports it.
    async fn push(&self, host: &str, node: NodeId, payload: DistributionPayload) -> Result<ImportReport>;

    /// Read an item and its ledger from a node of `host`.
    async fn fetch_remote_item(&self, host: &str, node: NodeId, item: ItemId) -> Result<Option<RemoteItem>>;

    /// Ask `host` to add or drop a ledger entry of one of its roots.
    async fn push_remote_connection_update(&self, host: &str, update: ConnectionUpdate) -> Result<()>;

    /// Whether the connection to `host` is active.
    async fn is_active(&self, host: &str) -> bool;
}

/// Transport for a network with no remote connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRemotes;

#[async_trait]
impl Transport for NoRemotes {
    async fn push(&self, host: &str, _node: NodeId, _payload: DistributionPayload) -> Result<ImportReport> {
        Err(SyncError::InactiveRemote(host.to_string()))
    }

    async fn fetch_remote_item(&self, host: &str, _node: NodeId, _item: ItemId) -> Result<Option<RemoteItem>> {
        Err(SyncError::InactiveRemote(host.to_string()))
    }

    async fn push_remote_connection_update(&self, host: &str, _update: ConnectionUpdate) -> Result<()> {
        Err(SyncError::InactiveRemote(host.to_string()))
    }

    async fn is_active(&self, _host: &str) -> bool {
        false
    }
}

/// In-process transport connecting several networks.
///
/// Each network registers its store and directory under its host name.
/// Payloads are CBOR-encoded on the way across so they go through the same
/// serialization a real wire would.
pub mod loopback {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::RwLock;

    use synchub_core::Gid;
    use synchub_store::{Directory, Store};

    use crate::import::Importer;
    use crate::ledger::LedgerService;
    use crate::messages::{decode, encode};

    /// One registered network.
    pub struct Endpoint {
        store: Arc<dyn Store>,
        importer: Importer<dyn Store, dyn Directory>,
        ledger: Arc<LedgerService<dyn Store>>,
        active: AtomicBool,
        delay_ms: AtomicU64,
    }

    impl Endpoint {
        /// Mark the connection (in)active.
        pub fn set_active(&self, active: bool) {
            self.active.store(active, Ordering::SeqCst);
        }

        /// Delay every push by `delay`.
        pub fn set_delay(&self, delay: Duration) {
            self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
        }

        fn is_active(&self) -> bool {
            self.active.load(Ordering::SeqCst)
        }
    }

    /// Shared registry of networks.
    #[derive(Default)]
    pub struct LoopbackNetwork {
        endpoints: RwLock<HashMap<String, Arc<Endpoint>>>,
    }

    impl LoopbackNetwork {
        /// Create a new loopback network.
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Register a network and get the transport it uses to reach the
        /// others.
        ///
        /// `ledger` must be the service the network itself uses, so remote
        /// ledger updates share its per-root locks.
        pub async fn register(
            self: &Arc<Self>,
            store: Arc<dyn Store>,
            directory: Arc<dyn Directory>,
            ledger: Arc<LedgerService<dyn Store>>,
        ) -> LoopbackTransport {
            let host = directory.network_host().to_string();
            let endpoint = Arc::new(Endpoint {
                importer: Importer::new(store.clone(), directory),
                store,
                ledger,
                active: AtomicBool::new(true),
                delay_ms: AtomicU64::new(0),
            });
            self.endpoints.write().await.insert(host.clone(), endpoint);

            LoopbackTransport {
                origin: host,
                network: Arc::clone(self),
            }
        }

        /// The endpoint registered for `host`.
        pub async fn endpoint(&self, host: &str) -> Option<Arc<Endpoint>> {
            self.endpoints.read().await.get(host).cloned()
        }
    }

    /// Transport handed to one registered network.
    pub struct LoopbackTransport {
        origin: String,
        network: Arc<LoopbackNetwork>,
    }

    impl LoopbackTransport {
        /// Host of the network using this transport.
        pub fn origin(&self) -> &str {
            &self.origin
        }

        async fn reachable(&self, host: &str) -> Result<Arc<Endpoint>> {
            match self.network.endpoint(host).await {
                Some(endpoint) if endpoint.is_active() => Ok(endpoint),
                Some(_) => Err(SyncError::InactiveRemote(host.to_string())),
                None => Err(SyncError::Transport(format!("unknown network {}", host))),
            }
        }
    }

    #[async_trait]
    impl Transport for LoopbackTransport {
        async fn push(&self, host: &str, node: NodeId, payload: DistributionPayload) -> Result<ImportReport> {
            let endpoint = self.reachable(host).await?;

            let delay = endpoint.delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let wire = encode(&payload)?;
            let received: DistributionPayload = decode(&wire)?;
            let report = endpoint.importer.import(node, &received).await?;

            decode(&encode(&report)?)
        }

        async fn fetch_remote_item(&self, host: &str, node: NodeId, item: ItemId) -> Result<Option<RemoteItem>> {
            let endpoint = self.reachable(host).await?;

            let Some(found) = endpoint.store.get_item(node, item).await? else {
                return Ok(None);
            };
            let ledger = endpoint.ledger.read(&Gid::local(node, item)).await?;

            decode(&encode(&RemoteItem { item: found, ledger })?).map(Some)
        }

        async fn push_remote_connection_update(&self, host: &str, update: ConnectionUpdate) -> Result<()> {
            let endpoint = self.reachable(host).await?;
            let update: ConnectionUpdate = decode(&encode(&update)?)?;

            match update.record {
                Some(record) => {
                    endpoint
                        .ledger
                        .add_connection(&update.root, &update.destination, record)
                        .await?;
                }
                None => {
                    endpoint
                        .ledger
                        .remove_connection(&update.root, &update.destination)
                        .await?;
                }
            }
            Ok(())
        }

        async fn is_active(&self, host: &str) -> bool {
            match self.network.endpoint(host).await {
                Some(endpoint) => endpoint.is_active(),
                None => false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::loopback::LoopbackNetwork;
    use super::*;
    use std::sync::Arc;
    use synchub_core::{
        ConflictPolicies, ConnectionRecord, ContentItem, DestinationId, DistributionAction, Gid,
    };
    use synchub_store::{Directory, MemoryStore, StaticDirectory, Store};

    use crate::ledger::LedgerService;

    async fn register(network: &Arc<LoopbackNetwork>, host: &str) -> (Arc<dyn Store>, super::loopback::LoopbackTransport) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let directory: Arc<dyn Directory> = Arc::new(StaticDirectory::new(host).with_node(1).with_node(2));
        let ledger = Arc::new(LedgerService::new(store.clone()));
        let transport = network.register(store.clone(), directory, ledger).await;
        (store, transport)
    }

    fn payload() -> DistributionPayload {
        DistributionPayload {
            gid: Gid::local(NodeId(1), ItemId(5)).with_host("a.example"),
            root: ContentItem::new(NodeId(1), ItemId(5), "article", "hello").published(1),
            dependents: Vec::new(),
            action: DistributionAction::Insert,
            policies: ConflictPolicies::default(),
        }
    }

    #[tokio::test]
    async fn test_push_imports_on_remote() {
        let network = LoopbackNetwork::new();
        let (_, a) = register(&network, "a.example").await;
        let (b_store, _) = register(&network, "b.example").await;

        let report = a.push("b.example", NodeId(2), payload()).await.unwrap();
        let local = report.root.linked_item().unwrap();

        let copy = b_store.get_item(NodeId(2), local).await.unwrap().unwrap();
        assert_eq!(copy.sync_id.unwrap().remote_host.as_deref(), Some("a.example"));
    }

    #[tokio::test]
    async fn test_inactive_remote() {
        let network = LoopbackNetwork::new();
        let (_, a) = register(&network, "a.example").await;
        register(&network, "b.example").await;

        network.endpoint("b.example").await.unwrap().set_active(false);
        assert!(!a.is_active("b.example").await);
        assert!(matches!(
            a.push("b.example", NodeId(2), payload()).await,
            Err(SyncError::InactiveRemote(_))
        ));
        assert!(!a.is_active("nowhere.example").await);
    }

    #[tokio::test]
    async fn test_connection_update_and_fetch() {
        let network = LoopbackNetwork::new();
        let (_, a) = register(&network, "a.example").await;
        let (b_store, _) = register(&network, "b.example").await;
        let root = b_store
            .insert_item(NodeId(1), ContentItem::new(NodeId(1), ItemId(0), "article", "r"))
            .await
            .unwrap();
        let root_gid = Gid::local(NodeId(1), root.id);

        a.push_remote_connection_update(
            "b.example",
            ConnectionUpdate {
                root: root_gid.clone(),
                destination: DestinationId::remote("a.example", NodeId(2)),
                record: Some(ConnectionRecord::bare(ItemId(7))),
            },
        )
        .await
        .unwrap();

        let fetched = a
            .fetch_remote_item("b.example", NodeId(1), root.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.item.id, root.id);
        assert_eq!(
            fetched
                .ledger
                .get(&DestinationId::remote("a.example", NodeId(2)))
                .unwrap()
                .item_id,
            ItemId(7)
        );
        assert!(a.fetch_remote_item("b.example", NodeId(1), ItemId(99)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_no_remotes() {
        assert!(!NoRemotes.is_active("any").await);
        assert!(NoRemotes.push("any", NodeId(1), payload()).await.is_err());
    }
}
