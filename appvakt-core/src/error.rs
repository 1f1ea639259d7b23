//! Error taxonomy shared across the controller.

use std::time::Duration;
use thiserror::Error;

/// Unified failure type for inventory, firewall and reconciliation calls.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The calling process lacks the rights the operation needs.
    #[error("elevated privileges required: {0}")]
    Privilege(String),

    /// Chain or rule-table setup failed.
    #[error("firewall initialization failed: {0}")]
    Initialization(String),

    /// The target path does not exist, or no live process was found where
    /// one is required to bind a rule.
    #[error("application target not found: {0}")]
    TargetNotFound(String),

    /// The underlying firewall call failed; the message carries the target
    /// and the platform error text.
    #[error("firewall rule mutation failed for {target}: {reason}")]
    RuleCreation { target: String, reason: String },

    /// A firewall command exceeded its bounded wait.
    #[error("firewall command timed out after {timeout:?}: {command}")]
    CommandTimeout { command: String, timeout: Duration },

    /// The blocked-set registry could not be written.
    #[error("blocked-set persistence failed: {0}")]
    Persistence(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
