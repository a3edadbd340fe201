//! Global identifiers.
//!
//! A GID names the root copy of a content item across the whole network:
//!
//! ```text
//! {node_id}-{item_id}[-{remote_network_host}]
//! ```
//!
//! The host segment is only present when the root lives on another network.
//! It is taken verbatim as everything after the second delimiter, so hosts
//! such as `hub-eu.example` survive a round trip.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};
use crate::types::{ItemId, NodeId};

/// Segment delimiter.
pub const GID_DELIMITER: char = '-';

/// The global identifier of a root item.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Gid {
    /// Node holding the root copy.
    pub node_id: NodeId,
    /// Node-local id of the root copy.
    pub item_id: ItemId,
    /// Network host of the root when it lives on a remote network.
    pub remote_host: Option<String>,
}

/// Build a GID. An empty host is treated as "same network".
pub fn make_gid(node_id: NodeId, item_id: ItemId, remote_host: Option<&str>) -> Gid {
    Gid {
        node_id,
        item_id,
        remote_host: remote_host
            .filter(|h| !h.is_empty())
            .map(str::to_string),
    }
}

/// Parse a GID string into its components.
pub fn parse_gid(gid: &str) -> Result<Gid> {
    let mut parts = gid.trim().splitn(3, GID_DELIMITER);

    let node = parts.next().unwrap_or_default();
    let item = parts
        .next()
        .ok_or_else(|| CoreError::InvalidGid(gid.to_string()))?;
    let host = parts.next().unwrap_or_default();

    let node_id = node
        .parse::<NodeId>()
        .map_err(|_| CoreError::InvalidGid(gid.to_string()))?;
    let item_id = item
        .parse::<ItemId>()
        .map_err(|_| CoreError::InvalidGid(gid.to_string()))?;

    Ok(make_gid(node_id, item_id, Some(host)))
}

impl Gid {
    /// GID of a root on the local network.
    pub fn local(node_id: NodeId, item_id: ItemId) -> Self {
        make_gid(node_id, item_id, None)
    }

    /// Whether the root lives on a network other than `local_host`.
    pub fn is_remote_to(&self, local_host: &str) -> bool {
        matches!(&self.remote_host, Some(host) if host != local_host)
    }

    /// The same identifier as seen from the root's own network.
    pub fn local_part(&self) -> Gid {
        Gid::local(self.node_id, self.item_id)
    }

    /// The same identifier as seen from another network.
    pub fn with_host(&self, host: &str) -> Gid {
        make_gid(self.node_id, self.item_id, Some(host))
    }

    /// Whether this GID names `item` on `node` (ignoring the host).
    pub fn names(&self, node: NodeId, item: ItemId) -> bool {
        self.node_id == node && self.item_id == item
    }
}

impl fmt::Display for Gid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.node_id, GID_DELIMITER, self.item_id)?;
        if let Some(host) = &self.remote_host {
            write!(f, "{}{}", GID_DELIMITER, host)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Gid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Gid({})", self)
    }
}

impl FromStr for Gid {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        parse_gid(s)
    }
}

impl TryFrom<String> for Gid {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        parse_gid(&value)
    }
}

impl From<Gid> for String {
    fn from(gid: Gid) -> Self {
        gid.to_string()
    }
}
