//! # synchub
//!
//! The unified API for synchub: content synchronization and distribution
//! across nodes and networks.
//!
//! ## Overview
//!
//! synchub keeps copies of content items in step with their source:
//!
//! - **Identity**: every synchronized item is either a root or a linked copy
//!   pointing at its root through a global identifier (GID)
//! - **Connection ledger**: each root records where its copies live
//! - **Conditions**: clusters select content by type, taxonomy, count and
//!   date window, and name the destinations it goes to
//! - **Review gate**: a cluster may hold changes until a reviewer approves
//! - **Distribution**: one work item per (root, destination), with retries,
//!   stuck detection and batches
//! - **Repair**: drift between items and ledgers is found and healed
//!
//! ## Key Concepts
//!
//! - **Effects**: a content change does not act by itself; the hub returns
//!   the work it implies and the caller applies it.
//! - **Explicit node**: every call names the node it acts on.
//! - **Caller driven**: stuck checks, retries and scheduled checks run when
//!   asked.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use synchub::{Hub, HubConfig};
//! use synchub::core::{ConflictPolicies, ItemId, NodeId};
//! use synchub::store::{SqliteStore, Store};
//! use synchub::sync::NoRemotes;
//!
//! async fn example() -> synchub::Result<()> {
//!     let config = HubConfig::from_json(r#"{ "network_host": "hub.example" }"#)?;
//!     let directory = Arc::new(config.directory());
//!     let store = Arc::new(SqliteStore::open("synchub.db")?);
//!
//!     let hub = Hub::new(store, Arc::new(NoRemotes), directory, config);
//!
//!     // After saving an item, hand the change to the hub.
//!     if let Some(item) = hub.store().get_item(NodeId(1), ItemId(5)).await? {
//!         let report = hub.handle_change(&item, None, &ConflictPolicies::default()).await?;
//!         println!("{} distributions completed", report.batch.completed());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `synchub::core` - Core model (GID, items, ledgers, conditions, reviews)
//! - `synchub::store` - Storage and directory abstractions, SQLite
//! - `synchub::sync` - Distribution, import, transport and repair

pub mod admin;
pub mod config;
pub mod error;
pub mod hub;

// Re-export component crates
pub use synchub_core as core;
pub use synchub_store as store;
pub use synchub_sync as sync;

// Re-export main types for convenience
pub use admin::{AdminRequest, ERROR_PREFIX, SUCCESS_PREFIX};
pub use config::HubConfig;
pub use error::{HubError, Result};
pub use hub::{AppliedEffects, ChangeReport, Effect, Hub};

// Re-export commonly used core types
pub use synchub_core::{
    Cluster, ConflictPolicies, ConflictPolicy, ContentCondition, ContentItem, DestinationId, DistributionAction,
    DistributionItem, DistributionStatus, Gid, RepairMode, RepairReport, ReviewRecord, ReviewState,
};
