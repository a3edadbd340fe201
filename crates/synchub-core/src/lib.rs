//! # synchub core
//!
//! Pure primitives for synchub: global identifiers, connection ledgers,
//! content conditions, reviews, conflict decisions and drift classification.
//!
//! This crate contains no storage and no networking. Everything here is
//! computation over plain data, so every rule can be tested in isolation.
//!
//! ## Key Types
//!
//! - [`Gid`] - Network-wide name of a root item (`{node}-{item}[-{host}]`)
//! - [`ConnectionLedger`] - Every linked copy of a root, keyed by destination
//! - [`ContentCondition`] - Declarative rule selecting items for a cluster
//! - [`ReviewRecord`] - The review gate state machine
//! - [`DistributionItem`] - One queued push of a root to one destination
//! - [`Fault`] - A classified drift with its repair action

pub mod cluster;
pub mod condition;
pub mod conflict;
pub mod dedupe;
pub mod distribution;
pub mod drift;
pub mod error;
pub mod gid;
pub mod item;
pub mod ledger;
pub mod review;
pub mod types;

pub use cluster::Cluster;
pub use condition::{
    membership_delta, membership_fingerprint, ContentCondition, DateWindow, MembershipDelta,
    RedistributionPlan, TaxonomyFilter, TermOperator,
};
pub use conflict::{ConflictPolicies, ConflictPolicy, ImportDecision};
pub use dedupe::{dedupe_key, IdempotencyStore, MemoryIdempotency};
pub use distribution::{DistributionAction, DistributionItem, DistributionStatus};
pub use drift::{DriftKind, Fault, RepairAction, RepairMode, RepairReport, Risk};
pub use error::{CoreError, Result};
pub use gid::{make_gid, parse_gid, Gid};
pub use item::{ContentItem, PublishStatus, SyncStatus};
pub use ledger::{to_destination_ids, ConnectionLedger, ConnectionRecord, DestinationId, LedgerChange};
pub use review::{GateView, MessageKind, ReviewMessage, ReviewRecord, ReviewState};
pub use types::{
    now_millis, ClusterId, ConditionId, DistributionId, ItemId, NodeId, NodeInfo, ReviewId, UserId,
};
