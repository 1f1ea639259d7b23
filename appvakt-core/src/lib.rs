//! # appvakt-core
//!
//! Foundation layer for the application-scoped network access controller.
//! Holds the domain model shared by every other crate and the boundary
//! traits the orchestration layer is written against.
//!
//! ### Key Submodules:
//! - `target`: canonical application identity
//! - `rule`: managed firewall rule model
//! - `inventory`: live process inventory contract
//! - `registry`: durable blocked-set contract

pub mod error;
pub mod inventory;
pub mod process;
pub mod record;
pub mod registry;
pub mod rule;
pub mod target;

pub mod prelude {
    pub use crate::error::ControlError;
    pub use crate::inventory::ProcessInventory;
    pub use crate::process::ProcessHandle;
    pub use crate::record::ApplicationRecord;
    pub use crate::registry::BlockedSetRegistry;
    pub use crate::rule::{ManagedRule, RuleAction, RuleDirection};
    pub use crate::target::ApplicationTarget;
}

pub use error::ControlError;
