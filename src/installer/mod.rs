//! Dependency installation.
//!
//! The installer orchestrates resolution and materialization: it builds
//! the dependency graph (fetching each node's archive into a hidden
//! staging directory at the project root), then walks the install order
//! swapping staged trees into `apm_modules/<owner>/<repo>` with atomic
//! renames, and finally writes the lock file. Nodes whose recorded SHA
//! already matches the resolved ref are skipped (unless `--update`),
//! reusing their existing lock entry so repeated installs are
//! byte-identical.
//!
//! Failure of any node aborts the command; because every node stages in
//! its own temp directory and the lock file is written last, an
//! interrupted install leaves each already-renamed node complete and
//! valid and nothing else.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

use crate::constants::{DEFAULT_MAX_PARALLEL, MODULES_DIR};
use crate::core::ApmError;
use crate::fetcher::{ArchiveFetcher, FetchedArchive};
use crate::lockfile::{LockEntry, LockFile};
use crate::manifest::Manifest;
use crate::package::validate_package;
use crate::resolver::{DependencySpec, GraphBuilder, ManifestSource, ResolvedGraph};

/// Install flags, mirroring the CLI surface.
#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Re-fetch nodes even when the recorded SHA is current.
    pub update: bool,
    /// Resolve and plan without touching `apm_modules/`.
    pub dry_run: bool,
    /// Bound on concurrent fetches.
    pub max_parallel: usize,
    /// Restrict installation to one dependency type.
    pub only: Option<OnlyKind>,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            update: false,
            dry_run: false,
            max_parallel: DEFAULT_MAX_PARALLEL,
            only: None,
        }
    }
}

/// `--only` filter values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnlyKind {
    Apm,
    Mcp,
}

/// Action the plan assigns to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanAction {
    /// Fetch and swap into place.
    Install,
    /// Already current; left untouched.
    Skip,
}

/// One resolved node in the install plan.
#[derive(Debug, Clone)]
pub struct PlanEntry {
    pub key: String,
    pub reference: Option<String>,
    pub resolved_sha: String,
    pub action: PlanAction,
}

/// Outcome of an install run.
#[derive(Debug, Default)]
pub struct InstallReport {
    /// The resolved plan, in install order.
    pub plan: Vec<PlanEntry>,
    /// Keys actually installed this run.
    pub installed: Vec<String>,
    /// Keys skipped as already current.
    pub skipped: Vec<String>,
    /// Resolution warnings (version overrides).
    pub warnings: Vec<String>,
    /// MCP dependencies, whose installation is delegated to external
    /// runtime helpers.
    pub mcp: Vec<String>,
    /// True when this was a dry run and nothing was written.
    pub dry_run: bool,
}

/// [`ManifestSource`] backed by the archive fetcher.
///
/// Each graph node is fetched at most once: the extracted archive is
/// kept in a staging map for the installer to consume. Nodes that are
/// already current (same SHA in the lock file, target present, not
/// updating) are answered from the installed tree without a download.
struct FetchingSource {
    fetcher: ArchiveFetcher,
    modules_dir: PathBuf,
    previous_lock: LockFile,
    update: bool,
    staged: Mutex<HashMap<String, FetchedArchive>>,
}

impl FetchingSource {
    fn target_for(&self, spec: &DependencySpec) -> PathBuf {
        self.modules_dir.join(&spec.owner).join(&spec.repo)
    }

    fn take_staged(&self, key: &str) -> Option<FetchedArchive> {
        self.staged.lock().expect("staging map lock").remove(key)
    }
}

impl ManifestSource for FetchingSource {
    async fn load(&self, spec: &DependencySpec) -> Result<(String, Manifest), ApmError> {
        let key = spec.key();
        let target = self.target_for(spec);

        if !self.update
            && let Some(previous) = self.previous_lock.packages.get(&key)
            && target.is_dir()
        {
            let sha = self
                .fetcher
                .resolve_ref(&spec.owner, &spec.repo, spec.reference.as_deref())
                .await?;
            if sha == previous.resolved_sha {
                debug!("{key} already at {sha}, reusing installed tree");
                let manifest = Manifest::load_from_dir(&target)?;
                return Ok((sha, manifest));
            }
        }

        let archive =
            self.fetcher.fetch(&spec.owner, &spec.repo, spec.reference.as_deref()).await?;
        let manifest = Manifest::load_from_dir(&archive.root)?;
        let sha = archive.resolved_sha.clone();
        self.staged.lock().expect("staging map lock").insert(key, archive);
        Ok((sha, manifest))
    }
}

/// Run `apm install` for the project at `project_dir`.
///
/// # Errors
///
/// Everything the manifest loader, resolver, fetcher, and package
/// validator surface. Cycle and resolution errors occur before any
/// write, leaving `apm_modules/` untouched.
pub async fn install(
    project_dir: &Path,
    options: &InstallOptions,
) -> Result<InstallReport, ApmError> {
    let manifest = Manifest::load_from_dir(project_dir)?;
    let mut report = InstallReport {
        dry_run: options.dry_run,
        mcp: manifest.dependencies.mcp.clone(),
        ..Default::default()
    };

    if options.only == Some(OnlyKind::Mcp) {
        // MCP installation is delegated to external runtime helpers;
        // the report carries the identifiers for display.
        return Ok(report);
    }

    let previous_lock = LockFile::load(project_dir)?.unwrap_or_default();

    // Staging lives under the project root so renames into apm_modules/
    // stay on one filesystem. The directory disappears on drop, which
    // also covers interrupts and resolution failures.
    let staging = tempfile::Builder::new()
        .prefix(".apm-staging-")
        .tempdir_in(project_dir)
        .map_err(ApmError::IoError)?;
    let fetcher = ArchiveFetcher::new(staging.path())?;

    let source = FetchingSource {
        fetcher,
        modules_dir: project_dir.join(MODULES_DIR),
        previous_lock: previous_lock.clone(),
        update: options.update,
        staged: Mutex::new(HashMap::new()),
    };

    let graph: ResolvedGraph = GraphBuilder::new()
        .with_parallelism(options.max_parallel)
        .build(&manifest, &source)
        .await?;

    report.warnings = graph.warnings.iter().map(ToString::to_string).collect();

    for node in &graph.install_order {
        let key = node.spec.key();
        let staged = {
            let map = source.staged.lock().expect("staging map lock");
            map.contains_key(&key)
        };
        report.plan.push(PlanEntry {
            key,
            reference: node.spec.reference.clone(),
            resolved_sha: node.resolved_sha.clone(),
            action: if staged {
                PlanAction::Install
            } else {
                PlanAction::Skip
            },
        });
    }

    if options.dry_run {
        return Ok(report);
    }

    let mut lock = LockFile::default();
    for node in &graph.install_order {
        let key = node.spec.key();
        let target = source.target_for(&node.spec);

        if let Some(archive) = source.take_staged(&key) {
            validate_package(&archive.root)?;
            archive.install_to(&target)?;
            info!("Installed {key}@{}", node.resolved_sha);
            report.installed.push(key.clone());
        } else {
            debug!("Skipping {key}: already current");
            report.skipped.push(key.clone());
        }

        // Reuse the previous timestamp when the content is unchanged so
        // repeated installs produce identical lock files.
        let installed_at = previous_lock
            .packages
            .get(&key)
            .filter(|e| e.resolved_sha == node.resolved_sha)
            .map(|e| e.installed_at.clone());
        let entry = match installed_at {
            Some(installed_at) => LockEntry {
                ref_requested: node.spec.reference.clone(),
                resolved_sha: node.resolved_sha.clone(),
                installed_at,
                extras: std::collections::BTreeMap::new(),
            },
            None => LockEntry::new(node.spec.reference.clone(), node.resolved_sha.clone()),
        };
        lock.packages.insert(key, entry);
    }

    // Lock file is written last; an interrupted install never records
    // state it did not reach.
    lock.save(project_dir)?;

    Ok(report)
}
