//! # synchub testkit
//!
//! Testing utilities for synchub.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: in-memory networks with nodes, roots and linked copies
//! - **Generators**: Proptest strategies for property-based testing
//! - **Tracing**: a subscriber writing to the test harness
//!
//! ## Property Testing
//!
//! Use the generators with proptest:
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use synchub_testkit::generators::{apply_ops, LedgerOps};
//!
//! proptest! {
//!     #[test]
//!     fn replay_is_stable(ops: LedgerOps) {
//!         let once = apply_ops(&ops.0);
//!         let mut twice = once.clone();
//!         for op in &ops.0 { op.apply(&mut twice); }
//!         prop_assert_eq!(once, twice);
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! Quickly set up test scenarios:
//!
//! ```rust,no_run
//! use synchub_core::NodeId;
//! use synchub_testkit::fixtures::TestNetwork;
//!
//! async fn setup() {
//!     let network = TestNetwork::new("hub.example", [1, 2]);
//!     let root = network.insert_root(NodeId(1), "article", "hello", 1_000).await;
//!     let copy = network.link_copy(NodeId(2), &root).await;
//!     assert!(copy.is_linked());
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{init_tracing, loopback_networks, TestNetwork};
pub use generators::{apply_ops, LedgerOp, LedgerOps};
