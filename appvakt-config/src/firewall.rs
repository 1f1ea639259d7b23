//! Firewall driver configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation;

/// Parameters shared by the chain and rule-table drivers.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct FirewallConfig {
    /// Dedicated chain name used by the chain driver.
    #[validate(custom(function = validation::validate_chain_name))]
    #[serde(default = "default_chain_name")]
    pub chain_name: String,

    /// Rule-name prefix used by the rule-table driver.
    #[validate(length(min = 1, max = 64))]
    #[serde(default = "default_rule_prefix")]
    pub rule_prefix: String,

    /// Bounded wait for each external firewall command, in seconds.
    #[validate(range(min = 1, max = 120))]
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

fn default_chain_name() -> String {
    "APPVAKT".into()
}
fn default_rule_prefix() -> String {
    "Appvakt-".into()
}
fn default_command_timeout() -> u64 {
    10
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            chain_name: default_chain_name(),
            rule_prefix: default_rule_prefix(),
            command_timeout_secs: default_command_timeout(),
        }
    }
}
