//! # synchub store
//!
//! The content repository contract for synchub, with SQLite and in-memory
//! implementations, plus the node directory.
//!
//! ## Overview
//!
//! The engine never touches a repository directly. Items, loosely typed
//! metadata, clusters, the distribution queue, review records and condition
//! membership snapshots all go through the [`Store`] trait. The primary
//! implementation is [`SqliteStore`], with [`MemoryStore`] for tests and
//! in-process networks.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all repository operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage
//! - [`ItemQuery`] - Filter for item queries
//! - [`Directory`] - Nodes of the local network and its host name
//!
//! ## Usage
//!
//! ```rust,no_run
//! use synchub_core::{ContentItem, ItemId, NodeId};
//! use synchub_store::{ItemQuery, SqliteStore, Store};
//!
//! async fn example() {
//!     let store = SqliteStore::open("synchub.db").unwrap();
//!
//!     let item = ContentItem::new(NodeId(1), ItemId(0), "article", "hello");
//!     let stored = store.insert_item(NodeId(1), item).await.unwrap();
//!
//!     let articles = store
//!         .query_items(NodeId(1), &ItemQuery::new().of_type("article"))
//!         .await
//!         .unwrap();
//!     assert!(articles.iter().any(|i| i.id == stored.id));
//! }
//! ```

pub mod directory;
pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use directory::{Directory, StaticDirectory};
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{ItemQuery, MembershipSnapshot, Store};
