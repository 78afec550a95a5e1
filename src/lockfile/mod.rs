//! Lock-state file (`apm_modules/.apm-lock`).
//!
//! The lock file is a deterministic JSON record of resolved dependency
//! SHAs: the `packages` map is keyed `owner/repo` and serialized with
//! sorted keys and 2-space indentation. Readers tolerate unknown keys so
//! older binaries can read newer lock files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::constants::{LOCKFILE_NAME, MODULES_DIR};
use crate::core::ApmError;
use crate::utils::fs::atomic_write_str;

/// The lock file root object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LockFile {
    /// Resolved state per installed package, keyed `owner/repo`.
    ///
    /// A `BTreeMap` guarantees sorted keys on serialization.
    #[serde(default)]
    pub packages: BTreeMap<String, LockEntry>,

    /// Unknown top-level keys, preserved for forward compatibility.
    #[serde(flatten)]
    pub extras: BTreeMap<String, serde_json::Value>,
}

/// Lock state for one installed package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockEntry {
    /// The ref as requested in the manifest (`None` = default branch).
    pub ref_requested: Option<String>,

    /// Commit SHA the ref resolved to at install time.
    pub resolved_sha: String,

    /// ISO-8601 UTC timestamp of the install.
    pub installed_at: String,

    /// Unknown keys, preserved.
    #[serde(flatten)]
    pub extras: BTreeMap<String, serde_json::Value>,
}

impl LockEntry {
    /// Build an entry stamped with the current UTC time.
    #[must_use]
    pub fn new(ref_requested: Option<String>, resolved_sha: String) -> Self {
        Self {
            ref_requested,
            resolved_sha,
            installed_at: chrono::Utc::now()
                .to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            extras: BTreeMap::new(),
        }
    }
}

impl LockFile {
    /// Path of the lock file for a project.
    #[must_use]
    pub fn path(project_dir: &Path) -> PathBuf {
        project_dir.join(MODULES_DIR).join(LOCKFILE_NAME)
    }

    /// Load the lock file if present.
    ///
    /// # Errors
    ///
    /// IO and JSON errors; a missing file is `Ok(None)`.
    pub fn load(project_dir: &Path) -> Result<Option<Self>, ApmError> {
        let path = Self::path(project_dir);
        if !path.is_file() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        let lock = serde_json::from_str(&content)?;
        Ok(Some(lock))
    }

    /// Serialize with sorted keys and 2-space indentation, then write
    /// atomically. A trailing newline is always present.
    pub fn save(&self, project_dir: &Path) -> Result<(), ApmError> {
        let mut rendered = serde_json::to_string_pretty(self)?;
        rendered.push('\n');
        atomic_write_str(&Self::path(project_dir), &rendered)
            .map_err(|e| ApmError::Other {
                message: e.to_string(),
            })?;
        Ok(())
    }

    /// Recorded SHA for a package key, if any.
    #[must_use]
    pub fn resolved_sha(&self, key: &str) -> Option<&str> {
        self.packages.get(key).map(|e| e.resolved_sha.as_str())
    }
}
