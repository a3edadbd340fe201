//! # synchub sync
//!
//! Moving content between nodes and networks, and keeping the books on it.
//!
//! ## Overview
//!
//! A root item is pushed to each destination as a [`DistributionItem`]
//! (one root, one destination). The destination's [`Importer`] decides
//! placement through the conflict rules, and the root's connection ledger
//! records where the copy landed. The [`Repairer`] re-verifies those books
//! later and heals drift.
//!
//! ## Key Properties
//!
//! - **Serialized per root**: ledger writes for one root never interleave
//! - **Serialized per work**: the same (root, destination) never runs twice
//!   at once
//! - **Caller driven**: no background tasks; stuck detection, retries and
//!   batches run when asked
//! - **Bounded**: every remote push has a timeout
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use synchub_core::{ConflictPolicies, DestinationId, Gid, ItemId, NodeId};
//! use synchub_store::{MemoryStore, StaticDirectory};
//! use synchub_sync::{Distributor, DistributorConfig, EnqueueOptions, LedgerService, NoRemotes};
//!
//! async fn example() -> synchub_sync::Result<()> {
//!     let store = Arc::new(MemoryStore::new());
//!     let directory = Arc::new(StaticDirectory::new("hub.example").with_node(1).with_node(2));
//!     let ledger = Arc::new(LedgerService::new(store.clone()));
//!     let distributor = Distributor::new(store, Arc::new(NoRemotes), directory, ledger, DistributorConfig::default());
//!
//!     let root = Gid::local(NodeId(1), ItemId(5));
//!     let queued = distributor
//!         .enqueue(&root, &[DestinationId::Local(NodeId(2))], &EnqueueOptions::default())
//!         .await?;
//!     let report = distributor
//!         .run_batch(&[queued[0].id], 0, &ConflictPolicies::default())
//!         .await;
//!     println!("{} completed", report.completed());
//!     Ok(())
//! }
//! ```
//!
//! ## Flow
//!
//! ```text
//! Source network                         Destination
//!   enqueue ─> init
//!   run     ─> started ── payload ──────> import (insert|replace|skip|keep)
//!           <─ completed <─ record ─────┘
//!   ledger.add_connection(root, destination, record)
//! ```

pub mod distributor;
pub mod error;
pub mod import;
pub mod ledger;
pub mod messages;
pub mod repair;
pub mod transport;

pub use distributor::{BatchEntry, BatchReport, Distributor, DistributorConfig, EnqueueOptions, RunOutcome};
pub use error::{ErrorClass, Result, SyncError};
pub use import::Importer;
pub use ledger::{LedgerService, LEDGER_META_KEY};
pub use messages::{ConnectionUpdate, DistributionPayload, ImportOutcome, ImportReport, RemoteItem};
pub use repair::Repairer;
pub use synchub_core::DistributionItem;
pub use transport::{
    loopback::{Endpoint, LoopbackNetwork, LoopbackTransport},
    NoRemotes, Transport,
};
