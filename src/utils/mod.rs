//! Cross-platform filesystem and path utilities.

pub mod fs;

pub use fs::{atomic_write, ensure_dir};

use std::path::{Component, Path, PathBuf};

/// Normalize a path to forward slashes for pattern matching and display.
///
/// Glob patterns are always matched against forward-slash paths relative
/// to the project root, regardless of platform.
#[must_use]
pub fn normalize_slashes(path: &Path) -> String {
    let s = path.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '/' {
        s.into_owned()
    } else {
        s.replace(std::path::MAIN_SEPARATOR, "/")
    }
}

/// Compute `target` relative to `base` using `..` segments where needed.
///
/// Both paths must be absolute or both relative to the same root. Used by
/// the emitter to rewrite Markdown links against the output directory.
#[must_use]
pub fn relative_from(target: &Path, base: &Path) -> PathBuf {
    let target_components: Vec<Component> = target.components().collect();
    let base_components: Vec<Component> = base.components().collect();

    let common = target_components
        .iter()
        .zip(base_components.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut result = PathBuf::new();
    for _ in common..base_components.len() {
        result.push("..");
    }
    for component in &target_components[common..] {
        result.push(component);
    }

    if result.as_os_str().is_empty() {
        result.push(".");
    }
    result
}

/// True when the file name starts with a dot.
#[must_use]
pub fn is_hidden_name(name: &str) -> bool {
    name.starts_with('.')
}
