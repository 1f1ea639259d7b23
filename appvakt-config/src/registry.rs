//! JSON-file implementation of the blocked-set registry.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use appvakt_core::error::ControlError;
use appvakt_core::registry::BlockedSetRegistry;

/// Persists the blocked set as a pretty-printed JSON array under the
/// platform config directory.
///
/// The firewall is authoritative; this store is an advisory cache consulted
/// by the next reconcile pass, so an unreadable or corrupt file degrades to
/// the empty set instead of failing the caller.
pub struct JsonBlockedSetStore {
    path: PathBuf,
}

impl JsonBlockedSetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store under the user's config directory, e.g.
    /// `~/.config/appvakt/blocked_apps.json`.
    pub fn default_location() -> Result<Self, ControlError> {
        let base = dirs::config_dir()
            .ok_or_else(|| ControlError::Persistence("no config directory for this user".into()))?;
        Ok(Self::new(base.join("appvakt").join("blocked_apps.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BlockedSetRegistry for JsonBlockedSetStore {
    fn load(&self) -> BTreeSet<String> {
        if !self.path.exists() {
            return BTreeSet::new();
        }
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read blocked set");
                return BTreeSet::new();
            }
        };
        match serde_json::from_str(&data) {
            Ok(set) => set,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to parse blocked set");
                BTreeSet::new()
            }
        }
    }

    fn save(&self, blocked: &BTreeSet<String>) -> Result<(), ControlError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ControlError::Persistence(format!("{}: {}", parent.display(), e))
            })?;
        }
        let data = serde_json::to_string_pretty(blocked)
            .map_err(|e| ControlError::Persistence(e.to_string()))?;
        fs::write(&self.path, data)
            .map_err(|e| ControlError::Persistence(format!("{}: {}", self.path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_the_blocked_set() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonBlockedSetStore::new(dir.path().join("nested/blocked_apps.json"));

        let mut set = BTreeSet::new();
        set.insert("/usr/bin/curl".to_string());
        set.insert("/usr/bin/wget".to_string());
        store.save(&set).unwrap();

        assert_eq!(store.load(), set);
    }

    #[test]
    fn missing_file_loads_the_empty_set() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonBlockedSetStore::new(dir.path().join("blocked_apps.json"));
        assert!(store.load().is_empty());
    }

    #[test]
    fn corrupt_file_degrades_to_the_empty_set() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocked_apps.json");
        fs::write(&path, "{not json").unwrap();

        let store = JsonBlockedSetStore::new(&path);
        assert!(store.load().is_empty());
    }
}
