//! ## appvakt-firewall
//! **Platform firewall drivers for application-scoped blocking**
//!
//! Two variants behind one capability surface:
//! - `chain`: packet-filter chain driver; rules live in a dedicated chain
//!   and bind to live process ids via the owner match.
//! - `table`: rule-table driver; named rules bind to the program path and
//!   naturally cover future process instances.
//!
//! The factory picks a variant once at process start and wraps it so that
//! mutations are serialized against reads; the selection is immutable
//! afterwards.

use std::sync::Arc;
use std::time::Duration;

use appvakt_core::error::ControlError;
use appvakt_core::inventory::ProcessInventory;

pub mod backend;
pub mod chain;
pub mod command;
pub mod privilege;
pub mod table;

pub use backend::{FirewallBackend, SerializedBackend};
pub use chain::ChainBackend;
pub use command::{CommandOutput, CommandRunner, SystemRunner};
pub use privilege::PrivilegeGate;
pub use table::TableBackend;

/// Driver knobs shared by both variants.
#[derive(Debug, Clone)]
pub struct BackendOptions {
    /// Dedicated chain name on the chain variant.
    pub chain_name: String,
    /// Rule-name prefix on the table variant.
    pub rule_prefix: String,
    /// Bounded wait for every external firewall command.
    pub command_timeout: Duration,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            chain_name: "APPVAKT".into(),
            rule_prefix: "Appvakt-".into(),
            command_timeout: Duration::from_secs(10),
        }
    }
}

/// Select the driver variant for the current platform.
///
/// The inventory is used by the chain variant to attribute pid-bound rules
/// back to their executables.
pub fn platform_backend(
    options: &BackendOptions,
    inventory: Arc<dyn ProcessInventory>,
) -> Result<Arc<dyn FirewallBackend>, ControlError> {
    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner::new(options.command_timeout));
    let gate = PrivilegeGate::effective();

    let inner: Box<dyn FirewallBackend> = match std::env::consts::OS {
        "linux" => Box::new(ChainBackend::new(
            &options.chain_name,
            runner,
            gate,
            inventory,
        )),
        "windows" => Box::new(TableBackend::new(&options.rule_prefix, runner, gate)),
        other => {
            return Err(ControlError::Initialization(format!(
                "no firewall driver for platform: {other}"
            )))
        }
    };
    Ok(Arc::new(SerializedBackend::new(inner)))
}
