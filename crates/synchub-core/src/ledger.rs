//! Connection ledger: every linked copy of a root item.
//!
//! The ledger is owned by the root item. Local destinations are keyed by node
//! id; remote destinations by network host, then node id. Mutations are
//! idempotent upserts/deletes that report what changed so the caller can
//! skip redundant writes.
//!
//! Stored metadata from older writers comes in several shapes (flat
//! `node → item_id` maps, flat record maps, nested `{local, remote}`
//! objects, lists of records). [`ConnectionLedger::normalize`] migrates all of
//! them into the single typed form once, on read.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};
use crate::types::{ItemId, NodeId};

/// Separator between node id and host in a remote destination id.
pub const REMOTE_SEPARATOR: char = '|';

/// Where a linked copy lives.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DestinationId {
    /// A node on the local network.
    Local(NodeId),
    /// A node on a remote network.
    Remote { host: String, node_id: NodeId },
}

impl DestinationId {
    /// The node id regardless of network.
    pub fn node_id(&self) -> NodeId {
        match self {
            DestinationId::Local(node) => *node,
            DestinationId::Remote { node_id, .. } => *node_id,
        }
    }

    /// The remote host, if any.
    pub fn host(&self) -> Option<&str> {
        match self {
            DestinationId::Local(_) => None,
            DestinationId::Remote { host, .. } => Some(host),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, DestinationId::Remote { .. })
    }

    pub fn remote(host: impl Into<String>, node_id: NodeId) -> Self {
        DestinationId::Remote {
            host: host.into(),
            node_id,
        }
    }
}

impl fmt::Display for DestinationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DestinationId::Local(node) => write!(f, "{}", node),
            DestinationId::Remote { host, node_id } => {
                write!(f, "{}{}{}", node_id, REMOTE_SEPARATOR, host)
            }
        }
    }
}

impl fmt::Debug for DestinationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DestinationId({})", self)
    }
}

impl FromStr for DestinationId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || CoreError::InvalidDestination(s.to_string());
        match s.split_once(REMOTE_SEPARATOR) {
            None => s.parse().map(DestinationId::Local).map_err(|_| invalid()),
            Some((node, host)) if !host.is_empty() => Ok(DestinationId::Remote {
                host: host.to_string(),
                node_id: node.parse().map_err(|_| invalid())?,
            }),
            Some(_) => Err(invalid()),
        }
    }
}

impl TryFrom<String> for DestinationId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<DestinationId> for String {
    fn from(dest: DestinationId) -> Self {
        dest.to_string()
    }
}

impl From<NodeId> for DestinationId {
    fn from(node: NodeId) -> Self {
        DestinationId::Local(node)
    }
}

/// Where a linked copy can be found and edited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    /// Node-local id of the linked copy.
    pub item_id: ItemId,
    #[serde(default)]
    pub edit_locator: String,
    #[serde(default)]
    pub view_locator: String,
    #[serde(default)]
    pub display_locator: String,
}

impl ConnectionRecord {
    /// A record with only the item id known.
    pub fn bare(item_id: ItemId) -> Self {
        Self {
            item_id,
            ..Default::default()
        }
    }
}

/// What a ledger mutation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerChange {
    Inserted,
    Updated,
    Removed,
    /// The ledger already had the requested shape.
    Unchanged,
}

impl LedgerChange {
    /// Whether the stored ledger must be rewritten.
    pub fn is_write(&self) -> bool {
        !matches!(self, LedgerChange::Unchanged)
    }
}

/// Per-root map of every linked copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionLedger {
    #[serde(default)]
    pub local: BTreeMap<NodeId, ConnectionRecord>,
    #[serde(default)]
    pub remote: BTreeMap<String, BTreeMap<NodeId, ConnectionRecord>>,
}

impl ConnectionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert a connection. Identical records are a no-op.
    pub fn add_connection(&mut self, dest: &DestinationId, record: ConnectionRecord) -> LedgerChange {
        let slot = match dest {
            DestinationId::Local(node) => self.local.entry(*node),
            DestinationId::Remote { host, node_id } => {
                self.remote.entry(host.clone()).or_default().entry(*node_id)
            }
        };

        match slot {
            Entry::Vacant(v) => {
                v.insert(record);
                LedgerChange::Inserted
            }
            Entry::Occupied(mut o) if o.get() != &record => {
                o.insert(record);
                LedgerChange::Updated
            }
            Entry::Occupied(_) => LedgerChange::Unchanged,
        }
    }

    /// Delete a connection. Absent keys are a no-op.
    pub fn remove_connection(&mut self, dest: &DestinationId) -> LedgerChange {
        let removed = match dest {
            DestinationId::Local(node) => self.local.remove(node).is_some(),
            DestinationId::Remote { host, node_id } => {
                let removed = self
                    .remote
                    .get_mut(host)
                    .is_some_and(|nodes| nodes.remove(node_id).is_some());
                if self.remote.get(host).is_some_and(BTreeMap::is_empty) {
                    self.remote.remove(host);
                }
                removed
            }
        };

        if removed {
            LedgerChange::Removed
        } else {
            LedgerChange::Unchanged
        }
    }

    /// Look up a connection.
    pub fn get(&self, dest: &DestinationId) -> Option<&ConnectionRecord> {
        match dest {
            DestinationId::Local(node) => self.local.get(node),
            DestinationId::Remote { host, node_id } => {
                self.remote.get(host).and_then(|nodes| nodes.get(node_id))
            }
        }
    }

    /// Every connection with its destination id.
    pub fn entries(&self) -> impl Iterator<Item = (DestinationId, &ConnectionRecord)> + '_ {
        let local = self
            .local
            .iter()
            .map(|(node, rec)| (DestinationId::Local(*node), rec));
        let remote = self.remote.iter().flat_map(|(host, nodes)| {
            nodes
                .iter()
                .map(move |(node, rec)| (DestinationId::remote(host.clone(), *node), rec))
        });
        local.chain(remote)
    }

    /// Flatten into a destination set.
    pub fn destination_ids(&self) -> Vec<DestinationId> {
        self.entries().map(|(dest, _)| dest).collect()
    }

    pub fn len(&self) -> usize {
        self.local.len() + self.remote.values().map(BTreeMap::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Migrate any stored shape into a ledger.
    pub fn normalize(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::new()),
            Value::String(s) if s.is_empty() => Ok(Self::new()),
            Value::String(s) => {
                let inner: Value = serde_json::from_str(s)
                    .map_err(|e| CoreError::Normalization(e.to_string()))?;
                Self::normalize(&inner)
            }
            Value::Array(list) => {
                let mut ledger = Self::new();
                for entry in list {
                    let node = entry
                        .get("node_id")
                        .and_then(as_u64)
                        .ok_or_else(|| CoreError::Normalization(format!("list entry without node_id: {entry}")))?;
                    let record = record_from_value(entry)?;
                    let dest = match entry.get("host").and_then(Value::as_str) {
                        Some(host) if !host.is_empty() => DestinationId::remote(host, NodeId(node)),
                        _ => DestinationId::Local(NodeId(node)),
                    };
                    ledger.add_connection(&dest, record);
                }
                Ok(ledger)
            }
            Value::Object(map) if map.contains_key("local") || map.contains_key("remote") => {
                let mut ledger = Self::new();
                if let Some(Value::Object(local)) = map.get("local") {
                    for (node, rec) in local {
                        ledger.add_connection(&DestinationId::Local(parse_node(node)?), record_from_value(rec)?);
                    }
                }
                if let Some(Value::Object(remote)) = map.get("remote") {
                    for (host, nodes) in remote {
                        ledger.absorb_remote(host, nodes)?;
                    }
                }
                Ok(ledger)
            }
            Value::Object(map) => {
                let mut ledger = Self::new();
                for (key, rec) in map {
                    match key.parse::<NodeId>() {
                        Ok(node) => {
                            ledger.add_connection(&DestinationId::Local(node), record_from_value(rec)?);
                        }
                        Err(_) => ledger.absorb_remote(key, rec)?,
                    }
                }
                Ok(ledger)
            }
            other => Err(CoreError::Normalization(format!("unexpected ledger value: {other}"))),
        }
    }

    fn absorb_remote(&mut self, host: &str, nodes: &Value) -> Result<()> {
        let Value::Object(nodes) = nodes else {
            return Err(CoreError::Normalization(format!("remote entry for {host} is not a map")));
        };
        for (node, rec) in nodes {
            self.add_connection(&DestinationId::remote(host, parse_node(node)?), record_from_value(rec)?);
        }
        Ok(())
    }

    /// Canonical stored form.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Flatten a ledger into a destination set.
pub fn to_destination_ids(ledger: &ConnectionLedger) -> Vec<DestinationId> {
    ledger.destination_ids()
}

fn parse_node(key: &str) -> Result<NodeId> {
    key.parse()
        .map_err(|_| CoreError::Normalization(format!("invalid node key: {key}")))
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn string_field(map: &serde_json::Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|k| map.get(*k).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string()
}

fn record_from_value(value: &Value) -> Result<ConnectionRecord> {
    if let Some(id) = as_u64(value) {
        return Ok(ConnectionRecord::bare(ItemId(id)));
    }
    let Value::Object(map) = value else {
        return Err(CoreError::Normalization(format!("unexpected record: {value}")));
    };
    let item_id = ["item_id", "post_id", "id"]
        .iter()
        .find_map(|k| map.get(*k).and_then(as_u64))
        .ok_or_else(|| CoreError::Normalization(format!("record without item id: {value}")))?;

    Ok(ConnectionRecord {
        item_id: ItemId(item_id),
        edit_locator: string_field(map, &["edit_locator", "edit_url", "edit"]),
        view_locator: string_field(map, &["view_locator", "view_url", "permalink", "view"]),
        display_locator: string_field(map, &["display_locator", "display", "site_url"]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: u64) -> ConnectionRecord {
        ConnectionRecord {
            item_id: ItemId(id),
            edit_locator: format!("https://n.example/edit/{id}"),
            view_locator: format!("https://n.example/?p={id}"),
            display_locator: "n.example".into(),
        }
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut ledger = ConnectionLedger::new();
        let dest = DestinationId::Local(NodeId(3));

        assert_eq!(ledger.add_connection(&dest, record(44)), LedgerChange::Inserted);
        let snapshot = ledger.clone();
        assert_eq!(ledger.add_connection(&dest, record(44)), LedgerChange::Unchanged);
        assert_eq!(ledger, snapshot);

        assert_eq!(ledger.add_connection(&dest, record(45)), LedgerChange::Updated);
        assert_eq!(ledger.get(&dest).unwrap().item_id, ItemId(45));
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut ledger = ConnectionLedger::new();
        let remote = DestinationId::remote("far.example", NodeId(1));
        assert_eq!(ledger.remove_connection(&remote), LedgerChange::Unchanged);

        ledger.add_connection(&remote, record(9));
        assert_eq!(ledger.remove_connection(&remote), LedgerChange::Removed);
        assert!(ledger.remote.is_empty());
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_destination_ids_flatten() {
        let mut ledger = ConnectionLedger::new();
        ledger.add_connection(&DestinationId::Local(NodeId(3)), record(1));
        ledger.add_connection(&DestinationId::remote("far.example", NodeId(2)), record(2));

        let ids: Vec<String> = to_destination_ids(&ledger).iter().map(ToString::to_string).collect();
        assert_eq!(ids, vec!["3".to_string(), "2|far.example".to_string()]);
    }

    #[test]
    fn test_destination_id_parse() {
        assert_eq!("7".parse::<DestinationId>().unwrap(), DestinationId::Local(NodeId(7)));
        assert_eq!(
            "7|far.example".parse::<DestinationId>().unwrap(),
            DestinationId::remote("far.example", NodeId(7))
        );
        assert!("7|".parse::<DestinationId>().is_err());
        assert!("x".parse::<DestinationId>().is_err());
    }

    #[test]
    fn test_normalize_legacy_flat_ids() {
        let ledger = ConnectionLedger::normalize(&json!({"3": 44, "4": "12"})).unwrap();
        assert_eq!(ledger.get(&DestinationId::Local(NodeId(3))).unwrap().item_id, ItemId(44));
        assert_eq!(ledger.get(&DestinationId::Local(NodeId(4))).unwrap().item_id, ItemId(12));
    }

    #[test]
    fn test_normalize_flat_records_with_remote_hosts() {
        let value = json!({
            "3": {"post_id": 44, "edit": "e", "permalink": "v", "site_url": "d"},
            "far.example": {"2": {"item_id": 8}}
        });
        let ledger = ConnectionLedger::normalize(&value).unwrap();
        let local = ledger.get(&DestinationId::Local(NodeId(3))).unwrap();
        assert_eq!(local.edit_locator, "e");
        assert_eq!(local.view_locator, "v");
        assert_eq!(local.display_locator, "d");
        assert_eq!(
            ledger.get(&DestinationId::remote("far.example", NodeId(2))).unwrap().item_id,
            ItemId(8)
        );
    }

    #[test]
    fn test_normalize_canonical_roundtrip() {
        let mut ledger = ConnectionLedger::new();
        ledger.add_connection(&DestinationId::Local(NodeId(3)), record(1));
        ledger.add_connection(&DestinationId::remote("far.example", NodeId(2)), record(2));

        let stored = ledger.to_value();
        assert_eq!(ConnectionLedger::normalize(&stored).unwrap(), ledger);

        let as_string = Value::String(stored.to_string());
        assert_eq!(ConnectionLedger::normalize(&as_string).unwrap(), ledger);
    }

    #[test]
    fn test_normalize_list_shape() {
        let value = json!([
            {"node_id": 3, "item_id": 4},
            {"node_id": "5", "item_id": 6, "host": "far.example"}
        ]);
        let ledger = ConnectionLedger::normalize(&value).unwrap();
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert!(ConnectionLedger::normalize(&json!(true)).is_err());
        assert!(ConnectionLedger::normalize(&json!({"3": {"edit": "x"}})).is_err());
        assert!(ConnectionLedger::normalize(&Value::Null).unwrap().is_empty());
    }
}
