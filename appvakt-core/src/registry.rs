//! Contract for the durable blocked set.

use std::collections::BTreeSet;

use crate::error::ControlError;

/// Durable store for the set of canonical paths the user wants blocked.
///
/// The firewall is authoritative; the registry is an advisory cache used to
/// re-apply intent on the next reconciliation pass. Loading is therefore
/// infallible (an unreadable store yields the empty set), while a failed
/// save surfaces as [`ControlError::Persistence`] for the caller to log.
pub trait BlockedSetRegistry: Send + Sync {
    fn load(&self) -> BTreeSet<String>;

    fn save(&self, blocked: &BTreeSet<String>) -> Result<(), ControlError>;
}
