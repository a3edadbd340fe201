//! Hub configuration.

use serde::{Deserialize, Serialize};

use synchub_core::dedupe::DEFAULT_DEDUPE_WINDOW_MS;
use synchub_core::NodeInfo;
use synchub_store::StaticDirectory;
use synchub_sync::DistributorConfig;

use crate::error::{HubError, Result};

/// One day, the default interval between scheduled condition checks.
pub const DEFAULT_SCHEDULE_INTERVAL_MS: i64 = 24 * 60 * 60 * 1_000;

/// Configuration for the Hub.
///
/// Every field has a default, so a JSON document only needs the fields it
/// changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Host name of this network, stamped on GIDs leaving it.
    pub network_host: String,
    /// Nodes of this network.
    pub nodes: Vec<NodeInfo>,
    /// Window in which a repeated change trigger is ignored.
    pub dedupe_window_ms: i64,
    /// Distribution queue configuration.
    pub distributor: DistributorConfig,
    /// Interval between scheduled checks of one condition.
    pub schedule_interval_ms: i64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            network_host: "localhost".to_string(),
            nodes: Vec::new(),
            dedupe_window_ms: DEFAULT_DEDUPE_WINDOW_MS,
            distributor: DistributorConfig::default(),
            schedule_interval_ms: DEFAULT_SCHEDULE_INTERVAL_MS,
        }
    }
}

impl HubConfig {
    /// Load from a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: HubConfig = serde_json::from_str(json).map_err(|e| HubError::Config(e.to_string()))?;
        if config.network_host.is_empty() {
            return Err(HubError::Config("network_host must not be empty".into()));
        }
        Ok(config)
    }

    /// The directory described by this configuration.
    pub fn directory(&self) -> StaticDirectory {
        self.nodes
            .iter()
            .fold(StaticDirectory::new(self.network_host.clone()), |dir, node| {
                dir.with_node_at(node.id, node.base_url.clone())
            })
    }
}
