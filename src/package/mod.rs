//! APM package shape validation.
//!
//! A directory is a valid APM package iff it has a parseable `apm.yml`
//! with a non-empty name, and carries content: either a `.apm/` tree with
//! at least one recognized primitive file, or a workflow (`*.prompt.md`)
//! within two levels of the root.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::constants::{MODULES_DIR, PRIMITIVES_DIR};
use crate::core::ApmError;
use crate::manifest::Manifest;
use crate::primitives::{DiscoveryRoot, PrimitiveCollection, PrimitiveKind, PrimitiveOrigin, discover};

/// A validated package rooted at a directory.
#[derive(Debug)]
pub struct ApmPackage {
    /// The parsed manifest.
    pub manifest: Manifest,
    /// Package root directory.
    pub root_path: PathBuf,
    /// Primitives discovered under the root.
    pub primitives: PrimitiveCollection,
    /// Packages vendored under the package's own `apm_modules/`.
    pub sub_packages: Vec<ApmPackage>,
}

impl ApmPackage {
    /// Validate `dir` and load its manifest and primitives.
    ///
    /// # Errors
    ///
    /// [`ApmError::MissingManifest`], [`ApmError::MalformedManifest`], or
    /// [`ApmError::EmptyPackage`] per the shape rules.
    pub fn load(dir: &Path) -> Result<Self, ApmError> {
        let manifest = validate_package(dir)?;
        let found = discover(&[DiscoveryRoot {
            dir: dir.to_path_buf(),
            origin: PrimitiveOrigin::Local,
        }]);

        let mut sub_packages = Vec::new();
        let modules = dir.join(MODULES_DIR);
        if modules.is_dir() {
            let mut nested: Vec<PathBuf> = WalkDir::new(&modules)
                .min_depth(2)
                .max_depth(2)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_dir())
                .map(|e| e.path().to_path_buf())
                .collect();
            nested.sort();
            for sub in nested {
                if let Ok(pkg) = Self::load(&sub) {
                    sub_packages.push(pkg);
                }
            }
        }

        Ok(Self {
            manifest,
            root_path: dir.to_path_buf(),
            primitives: found.collection,
            sub_packages,
        })
    }
}

/// Check the package shape of `dir` and return its manifest.
///
/// # Errors
///
/// - [`ApmError::MissingManifest`] when `dir/apm.yml` does not exist
/// - [`ApmError::MalformedManifest`] when it fails to parse or validate
/// - [`ApmError::EmptyPackage`] when neither `.apm/` content nor a
///   near-root workflow file is present
pub fn validate_package(dir: &Path) -> Result<Manifest, ApmError> {
    let manifest = Manifest::load_from_dir(dir)?;

    if has_primitive_tree(dir) || has_root_workflow(dir) {
        return Ok(manifest);
    }

    Err(ApmError::EmptyPackage {
        dir: dir.display().to_string(),
    })
}

/// True when `dir/.apm/` contains at least one recognized primitive file.
fn has_primitive_tree(dir: &Path) -> bool {
    let apm_dir = dir.join(PRIMITIVES_DIR);
    if !apm_dir.is_dir() {
        return false;
    }
    WalkDir::new(&apm_dir)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .any(|e| PrimitiveKind::from_file_name(&e.file_name().to_string_lossy()).is_some())
}

/// True when a `*.prompt.md` exists at depth ≤ 2 under `dir`.
fn has_root_workflow(dir: &Path) -> bool {
    WalkDir::new(dir)
        .max_depth(2)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            !(e.file_type().is_dir() && e.file_name().to_string_lossy().starts_with('.'))
        })
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .any(|e| e.file_name().to_string_lossy().ends_with(".prompt.md"))
}
