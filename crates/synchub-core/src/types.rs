//! Strong type definitions for synchub.
//!
//! All identifiers are newtypes to prevent misuse at compile time: a node id
//! can never be passed where an item id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Create from a raw integer.
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            /// Get the raw integer.
            pub const fn get(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<u64>().map(Self)
            }
        }
    };
}

numeric_id!(
    /// Identifier of a node (one content repository) inside a network.
    NodeId
);

numeric_id!(
    /// Node-local identifier of a content item.
    ItemId
);

numeric_id!(
    /// Identifier of a cluster.
    ClusterId
);

numeric_id!(
    /// Identifier of a content condition.
    ConditionId
);

numeric_id!(
    /// Identifier of a queued distribution item.
    DistributionId
);

numeric_id!(
    /// Identifier of a review record.
    ReviewId
);

numeric_id!(
    /// Identifier of a user allowed to review.
    UserId
);

/// A node as known by the network directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// The node identifier.
    pub id: NodeId,
    /// Base URL used to build edit/view locators.
    pub base_url: String,
}

impl NodeInfo {
    /// Create a node entry.
    pub fn new(id: impl Into<NodeId>, base_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            base_url: base_url.into(),
        }
    }

    /// Locator of the edit screen of an item on this node.
    pub fn edit_locator(&self, item: ItemId) -> String {
        format!("{}/edit/{}", self.base_url.trim_end_matches('/'), item)
    }

    /// Public locator of an item on this node.
    pub fn view_locator(&self, item: ItemId) -> String {
        format!("{}/?p={}", self.base_url.trim_end_matches('/'), item)
    }
}

/// Current time in milliseconds.
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
