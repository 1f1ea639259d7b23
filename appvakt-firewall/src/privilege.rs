//! Elevation precondition for mutating firewall calls.

use appvakt_core::error::ControlError;

/// Capability check consulted before chain/table setup and every mutation.
///
/// Read-only queries are gated per driver variant: the rule-table driver
/// can query without elevation, the chain driver cannot, so the gate is
/// passed to drivers rather than applied blanket-style.
#[derive(Debug, Clone, Copy)]
pub struct PrivilegeGate {
    mode: GateMode,
}

#[derive(Debug, Clone, Copy)]
enum GateMode {
    /// Check the effective rights of the current process.
    Effective,
    /// Always pass; for tests and simulation harnesses.
    AlwaysElevated,
}

impl PrivilegeGate {
    pub fn effective() -> Self {
        Self {
            mode: GateMode::Effective,
        }
    }

    pub fn always_elevated() -> Self {
        Self {
            mode: GateMode::AlwaysElevated,
        }
    }

    pub fn is_elevated(&self) -> bool {
        match self.mode {
            GateMode::Effective => process_is_elevated(),
            GateMode::AlwaysElevated => true,
        }
    }

    pub fn require_elevated(&self) -> Result<(), ControlError> {
        if self.is_elevated() {
            Ok(())
        } else {
            Err(ControlError::Privilege(
                "firewall mutations require root/administrator rights".into(),
            ))
        }
    }
}

#[cfg(unix)]
fn process_is_elevated() -> bool {
    nix::unistd::Uid::effective().is_root()
}

#[cfg(windows)]
fn process_is_elevated() -> bool {
    // `net session` succeeds only from an elevated shell; the probe is
    // cheap and needs no extra platform bindings.
    std::process::Command::new("net")
        .arg("session")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}
