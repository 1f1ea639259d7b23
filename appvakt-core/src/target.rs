//! Canonical application identity.

use std::path::{Path, PathBuf};

use crate::error::ControlError;

/// An application identified by its absolute, symlink-resolved executable
/// path.
///
/// The canonical path is the stable identity key for blocking intent; the
/// name is the final path segment and is what rule tags carry. Construction
/// fails when the file does not exist at resolution time, and the fields are
/// immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ApplicationTarget {
    canonical_path: PathBuf,
    name: String,
}

impl ApplicationTarget {
    /// Resolve a user-supplied path into a target.
    pub fn resolve(path: impl AsRef<Path>) -> Result<Self, ControlError> {
        let path = path.as_ref();
        let canonical_path = path.canonicalize().map_err(|e| {
            ControlError::TargetNotFound(format!("{}: {}", path.display(), e))
        })?;
        let name = canonical_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                ControlError::TargetNotFound(format!("{}: not a file", path.display()))
            })?;
        Ok(Self {
            canonical_path,
            name,
        })
    }

    pub fn canonical_path(&self) -> &Path {
        &self.canonical_path
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for ApplicationTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.canonical_path.display())
    }
}
