use std::path::Path;

use netstat2::{get_sockets_info, AddressFamilyFlags, ProtocolFlags};
use parking_lot::Mutex;
use sysinfo::{Pid, ProcessRefreshKind, System, UpdateKind};
use tracing::debug;

use appvakt_core::inventory::ProcessInventory;
use appvakt_core::process::ProcessHandle;

/// [`ProcessInventory`] over the real process table.
///
/// Enumeration races against live process churn; entries whose executable
/// cannot be resolved, or that exit mid-scan, are skipped rather than
/// reported.
pub struct SystemInventory {
    system: Mutex<System>,
}

impl SystemInventory {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    fn process_refresh() -> ProcessRefreshKind {
        ProcessRefreshKind::new().with_exe(UpdateKind::Always)
    }
}

impl Default for SystemInventory {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessInventory for SystemInventory {
    fn enumerate(&self) -> Vec<ProcessHandle> {
        let mut system = self.system.lock();
        system.refresh_processes_specifics(Self::process_refresh());

        system
            .processes()
            .iter()
            .filter_map(|(pid, process)| {
                let exe = process.exe()?;
                if !exe.exists() {
                    return None;
                }
                Some(ProcessHandle::new(pid.as_u32(), exe))
            })
            .collect()
    }

    fn find_by_path(&self, canonical_path: &Path) -> Vec<ProcessHandle> {
        let handles: Vec<ProcessHandle> = self
            .enumerate()
            .into_iter()
            .filter(|handle| handle.executable_path == canonical_path)
            .collect();
        debug!(
            path = %canonical_path.display(),
            instances = handles.len(),
            "resolved live instances"
        );
        handles
    }

    fn find_by_pid(&self, pid: u32) -> Option<ProcessHandle> {
        let mut system = self.system.lock();
        if !system.refresh_process_specifics(Pid::from_u32(pid), Self::process_refresh()) {
            return None;
        }
        let process = system.process(Pid::from_u32(pid))?;
        let exe = process.exe()?;
        Some(ProcessHandle::new(pid, exe))
    }

    fn has_network_activity(&self, handle: &ProcessHandle) -> bool {
        let families = AddressFamilyFlags::IPV4 | AddressFamilyFlags::IPV6;
        let protocols = ProtocolFlags::TCP | ProtocolFlags::UDP;
        match get_sockets_info(families, protocols) {
            Ok(sockets) => sockets
                .iter()
                .any(|socket| socket.associated_pids.contains(&handle.pid)),
            Err(e) => {
                debug!(pid = handle.pid, error = %e, "socket table query failed");
                false
            }
        }
    }
}
