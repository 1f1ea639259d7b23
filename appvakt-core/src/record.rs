//! Query results surfaced to callers.

use std::path::PathBuf;

use serde::Serialize;

/// One currently-running, network-capable process.
///
/// `blocked` reflects actual firewall enforcement (cross-referenced against
/// managed rule state), not merely blocked-set membership, so callers see
/// what the platform is really doing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationRecord {
    pub name: String,
    pub canonical_path: PathBuf,
    pub pid: u32,
    pub blocked: bool,
}
