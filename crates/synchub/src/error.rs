//! Error types for the hub.

use synchub_core::{ClusterId, CoreError, ItemId, NodeId, ReviewId, UserId};
use synchub_store::StoreError;
use synchub_sync::{ErrorClass, SyncError};
use thiserror::Error;

/// Errors that can occur during hub operations.
#[derive(Debug, Error)]
pub enum HubError {
    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Rule violation in the core (identity, transition, policy).
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("review {0} not found")]
    ReviewNotFound(ReviewId),

    #[error("cluster {0} not found")]
    ClusterNotFound(ClusterId),

    #[error("item {item} not found on node {node}")]
    ItemNotFound { node: NodeId, item: ItemId },

    /// The user is not on the cluster's reviewer list.
    #[error("user {user} may not review cluster {cluster}")]
    NotAReviewer { user: UserId, cluster: ClusterId },

    /// Configuration could not be loaded.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Admin request or response (de)serialization.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl HubError {
    /// The operator-facing class of this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            HubError::Sync(e) => e.class(),
            HubError::Core(e) => SyncError::Core(e.clone()).class(),
            HubError::Store(_) => ErrorClass::Distribution,
            HubError::ReviewNotFound(_)
            | HubError::ClusterNotFound(_)
            | HubError::ItemNotFound { .. }
            | HubError::NotAReviewer { .. }
            | HubError::Config(_)
            | HubError::Serialization(_) => ErrorClass::Identity,
        }
    }
}

/// Result type for hub operations.
pub type Result<T> = std::result::Result<T, HubError>;
