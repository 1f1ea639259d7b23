//! Contract for enumerating network-capable processes.

use std::path::Path;

use crate::process::ProcessHandle;

/// Read-only view onto the live OS process table.
///
/// Inventories are best-effort by nature: they race against process churn,
/// so entries that vanish or cannot be read mid-pass are silently skipped,
/// never surfaced as errors.
pub trait ProcessInventory: Send + Sync {
    /// One pass over the live process table. Every returned handle has a
    /// resolved, currently-accessible executable path.
    fn enumerate(&self) -> Vec<ProcessHandle>;

    /// All live processes running from exactly `canonical_path`. Empty when
    /// nothing runs from that path; never an error.
    fn find_by_path(&self, canonical_path: &Path) -> Vec<ProcessHandle> {
        self.enumerate()
            .into_iter()
            .filter(|handle| handle.executable_path == canonical_path)
            .collect()
    }

    /// Single-pid lookup, used to attribute pid-bound rules back to their
    /// executable. `None` when the process exited or cannot be read.
    fn find_by_pid(&self, pid: u32) -> Option<ProcessHandle> {
        self.enumerate().into_iter().find(|handle| handle.pid == pid)
    }

    /// Whether the process holds at least one inet-family socket endpoint,
    /// in any state.
    fn has_network_activity(&self, handle: &ProcessHandle) -> bool;
}
