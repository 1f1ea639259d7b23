//! Transient handles onto the live process table.

use std::path::PathBuf;

/// A process observed during one inventory pass.
///
/// Valid only for the lifetime of the OS process it names. Inventories
/// re-resolve handles on every pass and never cache them across calls; the
/// reconciler only borrows them for the duration of a single operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pid: u32,
    pub executable_path: PathBuf,
}

impl ProcessHandle {
    pub fn new(pid: u32, executable_path: impl Into<PathBuf>) -> Self {
        Self {
            pid,
            executable_path: executable_path.into(),
        }
    }
}
