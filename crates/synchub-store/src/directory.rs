//! Node/network directory: which nodes exist and what this network is called.

use std::collections::BTreeMap;

use synchub_core::{NodeId, NodeInfo};

/// Read-only view of the local network.
pub trait Directory: Send + Sync {
    /// All nodes, ordered by id.
    fn list_nodes(&self) -> Vec<NodeInfo>;

    fn node(&self, id: NodeId) -> Option<NodeInfo>;

    /// Host name other networks use to address this one.
    fn network_host(&self) -> &str;
}

/// A directory fixed at construction time.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    host: String,
    nodes: BTreeMap<NodeId, NodeInfo>,
}

impl StaticDirectory {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            nodes: BTreeMap::new(),
        }
    }

    /// Add a node at `https://{host}/n{id}`.
    pub fn with_node(self, id: impl Into<NodeId>) -> Self {
        let id = id.into();
        let base = format!("https://{}/n{}", self.host, id);
        self.with_node_at(id, base)
    }

    pub fn with_node_at(mut self, id: impl Into<NodeId>, base_url: impl Into<String>) -> Self {
        let info = NodeInfo::new(id, base_url);
        self.nodes.insert(info.id, info);
        self
    }
}

impl Directory for StaticDirectory {
    fn list_nodes(&self) -> Vec<NodeInfo> {
        self.nodes.values().cloned().collect()
    }

    fn node(&self, id: NodeId) -> Option<NodeInfo> {
        self.nodes.get(&id).cloned()
    }

    fn network_host(&self) -> &str {
        &self.host
    }
}
