//! Duplicate-trigger suppression.
//!
//! Editing environments may report one logical save several times. Callers
//! claim an `(action, item)` key before acting; a second claim inside the
//! window is refused.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::types::{ItemId, NodeId};

/// Default suppression window (ms).
pub const DEFAULT_DEDUPE_WINDOW_MS: i64 = 2_000;

/// Build the key for an action on an item.
pub fn dedupe_key(action: &str, node: NodeId, item: ItemId) -> String {
    format!("{}:{}:{}", action, node, item)
}

/// Short-lived key store.
pub trait IdempotencyStore: Send + Sync {
    /// Claim `key` at `now`. Returns false when it was already claimed less
    /// than `window_ms` ago.
    fn claim(&self, key: &str, now: i64, window_ms: i64) -> bool;

    /// Forget a key.
    fn release(&self, key: &str);
}

/// In-process idempotency store.
#[derive(Debug, Default)]
pub struct MemoryIdempotency {
    claims: Mutex<HashMap<String, i64>>,
}

impl MemoryIdempotency {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdempotencyStore for MemoryIdempotency {
    fn claim(&self, key: &str, now: i64, window_ms: i64) -> bool {
        let mut claims = match self.claims.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        // Expired keys are dropped on every claim so the map stays small.
        claims.retain(|_, at| now - *at < window_ms);

        if claims.contains_key(key) {
            return false;
        }
        claims.insert(key.to_string(), now);
        true
    }

    fn release(&self, key: &str) {
        let mut claims = match self.claims.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        claims.remove(key);
    }
}
