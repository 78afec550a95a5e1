//! Inspect and maintain installed dependencies.
//!
//! Read-only views (`list`, `tree`, `info`) work from the lock file and
//! the installed trees under `apm_modules/`; `clean` removes the whole
//! tree; `update` delegates to the installer with refresh semantics.

use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;
use std::path::Path;

use crate::constants::MODULES_DIR;
use crate::core::ApmError;
use crate::installer::{InstallOptions, install};
use crate::lockfile::LockFile;
use crate::manifest::Manifest;
use crate::package::ApmPackage;
use crate::resolver::DependencyGraph;
use crate::utils::fs::remove_dir_if_exists;

/// `apm deps <subcommand>`.
#[derive(Args)]
pub struct DepsCommand {
    #[command(subcommand)]
    command: DepsSubcommand,
}

#[derive(Subcommand)]
enum DepsSubcommand {
    /// List installed dependencies from the lock file
    List,

    /// Show the dependency tree
    Tree,

    /// Show details for one installed dependency
    Info {
        /// Package key (`owner/repo`) or bare repository name
        name: String,
    },

    /// Remove apm_modules/ entirely
    Clean,

    /// Re-fetch dependencies (optionally just one)
    Update {
        /// Package key or bare repository name to refresh
        name: Option<String>,
    },
}

impl DepsCommand {
    pub async fn execute(self, project_dir: &Path) -> Result<()> {
        match self.command {
            DepsSubcommand::List => list(project_dir),
            DepsSubcommand::Tree => tree(project_dir),
            DepsSubcommand::Info {
                name,
            } => info(project_dir, &name),
            DepsSubcommand::Clean => clean(project_dir),
            DepsSubcommand::Update {
                name,
            } => update(project_dir, name.as_deref()).await,
        }
    }
}

fn list(project_dir: &Path) -> Result<()> {
    let Some(lock) = LockFile::load(project_dir)? else {
        println!("No dependencies installed (run 'apm install')");
        return Ok(());
    };

    if lock.packages.is_empty() {
        println!("No dependencies installed");
        return Ok(());
    }

    println!("{}", "Installed dependencies:".bold());
    for (key, entry) in &lock.packages {
        let reference = entry.ref_requested.as_deref().unwrap_or("default branch");
        let sha = &entry.resolved_sha[..entry.resolved_sha.len().min(12)];
        println!("  {key}  {reference} @ {sha}  (installed {})", entry.installed_at);
    }
    Ok(())
}

/// Build the installed-dependency graph from on-disk manifests.
fn installed_graph(project_dir: &Path, lock: &LockFile) -> (String, DependencyGraph) {
    let root_name = Manifest::load_from_dir(project_dir)
        .map(|m| m.name)
        .unwrap_or_else(|_| ".".to_string());

    let mut graph = DependencyGraph::new();
    graph.ensure_node(&root_name);

    if let Ok(manifest) = Manifest::load_from_dir(project_dir) {
        for raw in &manifest.dependencies.apm {
            if let Ok(spec) = crate::resolver::DependencySpec::parse(raw) {
                graph.add_dependency(&root_name, &spec.key());
            }
        }
    }

    for key in lock.packages.keys() {
        let dir = project_dir.join(MODULES_DIR).join(key);
        if let Ok(manifest) = Manifest::load_from_dir(&dir) {
            for raw in &manifest.dependencies.apm {
                if let Ok(spec) = crate::resolver::DependencySpec::parse(raw) {
                    graph.add_dependency(key, &spec.key());
                }
            }
        }
    }

    (root_name, graph)
}

fn tree(project_dir: &Path) -> Result<()> {
    let Some(lock) = LockFile::load(project_dir)? else {
        println!("No dependencies installed (run 'apm install')");
        return Ok(());
    };

    let (root_name, graph) = installed_graph(project_dir, &lock);
    print!("{}", graph.render_tree(&root_name));
    Ok(())
}

/// Resolve a user-supplied name to a lock key: exact `owner/repo` or a
/// unique bare repository name.
fn resolve_key(lock: &LockFile, name: &str) -> Result<String, ApmError> {
    if lock.packages.contains_key(name) {
        return Ok(name.to_string());
    }
    let matches: Vec<&String> = lock
        .packages
        .keys()
        .filter(|k| k.rsplit_once('/').is_some_and(|(_, repo)| repo == name))
        .collect();
    match matches.as_slice() {
        [single] => Ok((*single).clone()),
        [] => Err(ApmError::Other {
            message: format!("dependency '{name}' is not installed"),
        }),
        several => Err(ApmError::Other {
            message: format!(
                "dependency name '{name}' is ambiguous: {}",
                several.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
            ),
        }),
    }
}

fn info(project_dir: &Path, name: &str) -> Result<()> {
    let lock = LockFile::load(project_dir)?.ok_or_else(|| ApmError::Other {
        message: "no dependencies installed (run 'apm install')".to_string(),
    })?;
    let key = resolve_key(&lock, name)?;
    let entry = &lock.packages[&key];

    let dir = project_dir.join(MODULES_DIR).join(&key);
    let package = ApmPackage::load(&dir)?;

    println!("{}", key.bold());
    println!("  name:         {}", package.manifest.name);
    println!("  version:      {}", package.manifest.version);
    if let Some(description) = &package.manifest.description {
        println!("  description:  {description}");
    }
    println!(
        "  ref:          {}",
        entry.ref_requested.as_deref().unwrap_or("default branch")
    );
    println!("  resolved sha: {}", entry.resolved_sha);
    println!("  installed at: {}", entry.installed_at);
    let p = &package.primitives;
    println!(
        "  primitives:   {} chatmodes, {} instructions, {} contexts, {} workflows",
        p.chatmodes.len(),
        p.instructions.len(),
        p.contexts.len(),
        p.workflows.len()
    );
    Ok(())
}

fn clean(project_dir: &Path) -> Result<()> {
    let modules = project_dir.join(MODULES_DIR);
    if modules.exists() {
        remove_dir_if_exists(&modules)?;
        println!("{} Removed {}", "✓".green(), modules.display());
    } else {
        println!("Nothing to clean");
    }
    Ok(())
}

async fn update(project_dir: &Path, name: Option<&str>) -> Result<()> {
    if let Some(name) = name {
        // Refresh a single package: drop its installed tree and lock
        // entry so the next install re-fetches just that node.
        let mut lock = LockFile::load(project_dir)?.ok_or_else(|| ApmError::Other {
            message: "no dependencies installed (run 'apm install')".to_string(),
        })?;
        let key = resolve_key(&lock, name)?;
        lock.packages.remove(&key);
        lock.save(project_dir)?;
        remove_dir_if_exists(&project_dir.join(MODULES_DIR).join(&key))?;

        let report = install(project_dir, &InstallOptions::default()).await?;
        println!(
            "{} Updated {key} ({} fetched, {} unchanged)",
            "✓".green(),
            report.installed.len(),
            report.skipped.len()
        );
        return Ok(());
    }

    let options = InstallOptions {
        update: true,
        ..Default::default()
    };
    let report = install(project_dir, &options).await?;
    println!(
        "{} Updated {} dependencies",
        "✓".green(),
        report.installed.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lockfile::LockEntry;

    fn lock_with(keys: &[&str]) -> LockFile {
        let mut lock = LockFile::default();
        for key in keys {
            lock.packages
                .insert((*key).to_string(), LockEntry::new(None, "abc".to_string()));
        }
        lock
    }

    #[test]
    fn test_resolve_key_exact() {
        let lock = lock_with(&["acme/ctx"]);
        assert_eq!(resolve_key(&lock, "acme/ctx").unwrap(), "acme/ctx");
    }

    #[test]
    fn test_resolve_key_bare_repo() {
        let lock = lock_with(&["acme/ctx"]);
        assert_eq!(resolve_key(&lock, "ctx").unwrap(), "acme/ctx");
    }

    #[test]
    fn test_resolve_key_ambiguous() {
        let lock = lock_with(&["acme/ctx", "other/ctx"]);
        let err = resolve_key(&lock, "ctx").unwrap_err();
        assert!(err.to_string().contains("ambiguous"));
    }

    #[test]
    fn test_resolve_key_missing() {
        let lock = lock_with(&[]);
        assert!(resolve_key(&lock, "ghost").is_err());
    }
}
