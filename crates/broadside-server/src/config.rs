//! Host session configuration

use serde::{Deserialize, Serialize};

/// Host session configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HostConfig {
    /// Depth of the session request mailbox
    pub mailbox_depth: usize,
    /// Depth of the event broadcast channel; a mirror that lags further than
    /// this behind the host must resync from a snapshot
    pub broadcast_depth: usize,
    /// Scenario file to load instead of the embedded one
    pub scenario_path: Option<String>,
    /// Seed for the host dice roller
    pub dice_seed: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            mailbox_depth: 64,
            broadcast_depth: 256,
            scenario_path: None,
            dice_seed: 0,
        }
    }
}
