//! Error types for synchub core.

use thiserror::Error;

use crate::types::{ItemId, ReviewId};

/// Core errors raised by pure operations (no I/O).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("invalid global identifier: {0}")]
    InvalidGid(String),

    #[error("invalid destination id: {0}")]
    InvalidDestination(String),

    #[error("review {review} cannot {operation} while {state}")]
    InvalidTransition {
        review: ReviewId,
        operation: &'static str,
        state: &'static str,
    },

    #[error("conflict on item {item}: a resolution policy is required")]
    PolicyRequired { item: ItemId },

    #[error("unreadable connection metadata: {0}")]
    Normalization(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
