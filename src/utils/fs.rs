//! Atomic file operations.
//!
//! Writers throughout APM use a write-then-rename strategy so readers
//! never observe partially written files: content goes to a sibling
//! temporary file, is synced to disk, then renamed over the target.

use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Create a directory and all parents, tolerating pre-existing paths.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    }
    Ok(())
}

/// Atomically write bytes to `path`.
///
/// Writes to a sibling `.tmp` file, syncs it, then renames into place.
/// Parent directories are created as needed. The rename is atomic on the
/// same filesystem, which the sibling placement guarantees.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    let temp_path = path.with_extension("tmp");

    {
        let mut file = fs::File::create(&temp_path)
            .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;
        file.write_all(content)
            .with_context(|| format!("Failed to write temp file: {}", temp_path.display()))?;
        file.sync_all().context("Failed to sync file to disk")?;
    }

    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename temp file to: {}", path.display()))?;

    Ok(())
}

/// Atomically write a string to `path`.
pub fn atomic_write_str(path: &Path, content: &str) -> Result<()> {
    atomic_write(path, content.as_bytes())
}

/// Remove a directory tree if it exists.
pub fn remove_dir_if_exists(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path)
            .with_context(|| format!("Failed to remove directory: {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_atomic_write_basic() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("out.txt");

        atomic_write(&file, b"test content").unwrap();
        assert_eq!(fs::read(&file).unwrap(), b"test content");
    }

    #[test]
    fn test_atomic_write_overwrites() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("out.txt");

        atomic_write(&file, b"initial").unwrap();
        atomic_write(&file, b"updated").unwrap();
        assert_eq!(fs::read(&file).unwrap(), b"updated");
    }

    #[test]
    fn test_atomic_write_creates_parent() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("nested/deeper/out.txt");

        atomic_write(&file, b"nested content").unwrap();
        assert_eq!(fs::read(&file).unwrap(), b"nested content");
    }

    #[test]
    fn test_atomic_write_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("out.txt");

        atomic_write(&file, b"x").unwrap();
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_remove_dir_if_exists_idempotent() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("sub");
        fs::create_dir(&target).unwrap();

        remove_dir_if_exists(&target).unwrap();
        remove_dir_if_exists(&target).unwrap();
        assert!(!target.exists());
    }
}
