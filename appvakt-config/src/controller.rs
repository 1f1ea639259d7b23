//! Reconciliation loop configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Cadence and behavior of the periodic reconcile pass.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct ControllerConfig {
    /// Seconds between reconcile passes in watch mode.
    #[validate(range(min = 5, max = 3600))]
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    /// Block network-capable applications the moment a reconcile pass first
    /// sees them, instead of waiting for an explicit block.
    #[serde(default)]
    pub auto_block_new_apps: bool,
}

fn default_refresh_interval() -> u64 {
    60
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval(),
            auto_block_new_apps: false,
        }
    }
}
