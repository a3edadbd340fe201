//! Error types for the sync module.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use synchub_core::{CoreError, DistributionId, DistributionStatus, Gid, ItemId, NodeId};

/// Broad failure classes, as shown to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Malformed or unresolvable identity. Fatal, not retried.
    Identity,
    /// Remote network unreachable or inactive.
    Connection,
    /// Transient write or transport failure. Retryable.
    Distribution,
    /// Drift between sync attributes and the ledger.
    Consistency,
    /// A conflict policy is required.
    Conflict,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Identity => "identity",
            ErrorClass::Connection => "connection",
            ErrorClass::Distribution => "distribution",
            ErrorClass::Consistency => "consistency",
            ErrorClass::Conflict => "conflict",
        }
    }

    /// Whether retrying the same work may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorClass::Distribution | ErrorClass::Connection)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] synchub_store::StoreError),

    /// Pure-rule violation (identity, policy, transition).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(String),

    /// A remote call exceeded the configured timeout.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The remote network is not active.
    #[error("remote network {0} is not active")]
    InactiveRemote(String),

    /// No root item behind a GID.
    #[error("root {0} not found")]
    RootNotFound(Gid),

    /// The item behind a GID is not a root.
    #[error("item behind {0} is not a root")]
    NotARoot(Gid),

    #[error("item {item} not found on node {node}")]
    ItemNotFound { node: NodeId, item: ItemId },

    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    #[error("distribution item {0} not found")]
    UnknownDistribution(DistributionId),

    /// A pending review withholds an item that has no prior state.
    #[error("root {0} is held for review")]
    HeldForReview(Gid),

    #[error("distribution item {id} cannot be requeued while {status}")]
    NotRequeueable { id: DistributionId, status: DistributionStatus },

    #[error("distribution item {id} exhausted its {attempts} attempts")]
    AttemptsExhausted { id: DistributionId, attempts: u32 },

    /// Wire payload could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),
}

impl SyncError {
    /// The operator-facing class of this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            SyncError::Core(CoreError::PolicyRequired { .. }) => ErrorClass::Conflict,
            SyncError::Core(CoreError::Normalization(_)) => ErrorClass::Consistency,
            SyncError::Core(_) => ErrorClass::Identity,
            SyncError::RootNotFound(_)
            | SyncError::ItemNotFound { .. }
            | SyncError::UnknownNode(_)
            | SyncError::UnknownDistribution(_) => ErrorClass::Identity,
            SyncError::InactiveRemote(_) => ErrorClass::Connection,
            SyncError::NotARoot(_) => ErrorClass::Consistency,
            SyncError::Store(_)
            | SyncError::Transport(_)
            | SyncError::Timeout(_)
            | SyncError::HeldForReview(_)
            | SyncError::NotRequeueable { .. }
            | SyncError::AttemptsExhausted { .. }
            | SyncError::Codec(_) => ErrorClass::Distribution,
        }
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classes() {
        assert_eq!(
            SyncError::Core(CoreError::PolicyRequired { item: ItemId(1) }).class(),
            ErrorClass::Conflict
        );
        assert_eq!(
            SyncError::Core(CoreError::InvalidGid("x".into())).class(),
            ErrorClass::Identity
        );
        assert_eq!(SyncError::InactiveRemote("far".into()).class(), ErrorClass::Connection);
        assert_eq!(SyncError::Timeout("push".into()).class(), ErrorClass::Distribution);
        assert!(ErrorClass::Distribution.is_retryable());
        assert!(!ErrorClass::Conflict.is_retryable());
    }
}
