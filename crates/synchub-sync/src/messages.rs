//! Messages exchanged between a distributing network and a destination.
//!
//! Payloads cross network boundaries as CBOR.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use synchub_core::{
    ConflictPolicies, ConnectionLedger, ConnectionRecord, ContentItem, DestinationId,
    DistributionAction, Gid, ImportDecision, ItemId,
};

use crate::error::{Result, SyncError};

/// Everything a destination needs to place one root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionPayload {
    /// The root's GID as the destination should record it.
    pub gid: Gid,
    /// The content to place (the review gate view of the root).
    pub root: ContentItem,
    /// Items the root depends on, placed before it.
    pub dependents: Vec<ContentItem>,
    pub action: DistributionAction,
    #[serde(default)]
    pub policies: ConflictPolicies,
}

impl DistributionPayload {
    /// GID under which a dependent of the root is linked.
    pub fn dependent_gid(&self, dependent: ItemId) -> Gid {
        Gid {
            node_id: self.gid.node_id,
            item_id: dependent,
            remote_host: self.gid.remote_host.clone(),
        }
    }
}

/// What happened to one incoming item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ImportOutcome {
    /// A linked copy now exists (created, updated or replaced).
    Linked {
        source: ItemId,
        local: ItemId,
        decision: ImportDecision,
    },
    /// Equivalent local content was left alone.
    Skipped { source: ItemId, existing: ItemId },
    /// Inserted as an independent item.
    Unlinked { source: ItemId, local: ItemId },
    /// The linked copy was trashed or deleted (if there was one).
    Removed { source: ItemId, local: Option<ItemId> },
}

impl ImportOutcome {
    pub fn source(&self) -> ItemId {
        match self {
            ImportOutcome::Linked { source, .. }
            | ImportOutcome::Skipped { source, .. }
            | ImportOutcome::Unlinked { source, .. }
            | ImportOutcome::Removed { source, .. } => *source,
        }
    }

    /// The local id of the linked copy, when one remains.
    pub fn linked_item(&self) -> Option<ItemId> {
        match self {
            ImportOutcome::Linked { local, .. } => Some(*local),
            _ => None,
        }
    }
}

/// Result of importing one payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub root: ImportOutcome,
    pub dependents: Vec<ImportOutcome>,
    /// Ledger record for the root's copy, when it is linked.
    pub record: Option<ConnectionRecord>,
}

/// A root and its ledger, as read from another network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteItem {
    pub item: ContentItem,
    pub ledger: ConnectionLedger,
}

/// Ask the root's network to add or drop one ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionUpdate {
    /// The root, in its own network's form (no host).
    pub root: Gid,
    /// The copy's destination as the root's network addresses it.
    pub destination: DestinationId,
    /// `None` removes the entry.
    pub record: Option<ConnectionRecord>,
}

/// Encode a message for the wire.
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(message, &mut buf).map_err(|e| SyncError::Codec(e.to_string()))?;
    Ok(buf)
}

/// Decode a message from the wire.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::from_reader(bytes).map_err(|e| SyncError::Codec(e.to_string()))
}
