//! Directory analysis cache.
//!
//! One filesystem walk per compile produces a per-directory summary
//! (depth, immediate and recursive file counts, sorted children) plus the
//! full list of candidate target files. The cache is an explicit value
//! handed to the optimizer, never hidden mutable state, so repeated or
//! parallel invocations see the same snapshot.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::constants::PRUNED_DIRS;
use crate::manifest::PlacementConfig;
use crate::utils::is_hidden_name;

/// Summary for one directory.
#[derive(Debug, Clone)]
pub struct DirectoryAnalysis {
    /// Path relative to the project root; empty for the root itself.
    pub rel_path: PathBuf,
    /// Number of path segments from the root (root = 0).
    pub depth: usize,
    /// Count of non-hidden regular files directly in the directory.
    pub immediate_files: usize,
    /// Sum of `immediate_files` over this directory and all descendants.
    pub recursive_files: usize,
    /// Sorted root-relative paths of child directories.
    pub children: Vec<PathBuf>,
}

impl DirectoryAnalysis {
    /// True when the directory has at least one child directory.
    #[must_use]
    pub fn has_descendants(&self) -> bool {
        !self.children.is_empty()
    }
}

/// Result of a single analysis walk, keyed by root-relative path.
#[derive(Debug, Clone)]
pub struct DirectoryAnalysisCache {
    root: PathBuf,
    dirs: BTreeMap<PathBuf, DirectoryAnalysis>,
    files: Vec<PathBuf>,
}

impl DirectoryAnalysisCache {
    /// Walk `root` once and build the cache.
    ///
    /// Pruned: `.git`, `apm_modules`, `node_modules`, hidden
    /// directories, every `placement.ignore` entry, and anything below
    /// `placement.max_depth`. Symlinks are not followed. Hidden files
    /// are not counted or listed.
    #[must_use]
    pub fn build(root: &Path, placement: &PlacementConfig) -> Self {
        let mut dirs: BTreeMap<PathBuf, DirectoryAnalysis> = BTreeMap::new();
        let mut files: Vec<PathBuf> = Vec::new();

        let ignore = &placement.ignore;
        let walker = WalkDir::new(root)
            .follow_links(false)
            .max_depth(placement.max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                if entry.depth() == 0 {
                    return true;
                }
                let name = entry.file_name().to_string_lossy();
                if entry.file_type().is_dir() {
                    !(PRUNED_DIRS.contains(&name.as_ref())
                        || is_hidden_name(&name)
                        || ignore.iter().any(|i| i == name.as_ref()))
                } else {
                    true
                }
            });

        for entry in walker.filter_map(Result::ok) {
            let rel = entry.path().strip_prefix(root).unwrap_or(entry.path()).to_path_buf();

            if entry.file_type().is_dir() {
                dirs.entry(rel.clone()).or_insert_with(|| DirectoryAnalysis {
                    rel_path: rel.clone(),
                    depth: entry.depth(),
                    immediate_files: 0,
                    recursive_files: 0,
                    children: Vec::new(),
                });
                if entry.depth() > 0 {
                    let parent = rel.parent().map(Path::to_path_buf).unwrap_or_default();
                    if let Some(p) = dirs.get_mut(&parent) {
                        p.children.push(rel);
                    }
                }
            } else if entry.file_type().is_file() {
                let name = entry.file_name().to_string_lossy();
                if is_hidden_name(&name) {
                    continue;
                }
                let parent = rel.parent().map(Path::to_path_buf).unwrap_or_default();
                if let Some(p) = dirs.get_mut(&parent) {
                    p.immediate_files += 1;
                }
                files.push(rel);
            }
        }

        // Children before parents: reverse lexicographic order visits
        // every descendant before its ancestor.
        let keys: Vec<PathBuf> = dirs.keys().cloned().collect();
        for key in keys.iter().rev() {
            let child_sum: usize = dirs[key]
                .children
                .clone()
                .iter()
                .filter_map(|c| dirs.get(c))
                .map(|c| c.recursive_files)
                .sum();
            let entry = dirs.get_mut(key).expect("key exists");
            entry.recursive_files = entry.immediate_files + child_sum;
            entry.children.sort();
        }

        files.sort();

        Self {
            root: root.to_path_buf(),
            dirs,
            files,
        }
    }

    /// The analyzed project root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Look up one directory by root-relative path.
    #[must_use]
    pub fn get(&self, rel_path: &Path) -> Option<&DirectoryAnalysis> {
        self.dirs.get(rel_path)
    }

    /// All analyzed directories in sorted order.
    pub fn directories(&self) -> impl Iterator<Item = &DirectoryAnalysis> {
        self.dirs.values()
    }

    /// All candidate target files, root-relative, sorted.
    #[must_use]
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Count of directories containing at least one immediate file.
    #[must_use]
    pub fn total_dirs_with_files(&self) -> usize {
        self.dirs.values().filter(|d| d.immediate_files > 0).count()
    }
}
