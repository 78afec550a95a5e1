//! Compile primitives into placed AGENTS.md files.
//!
//! Drives discovery, directory analysis, placement optimization, and
//! emission. `--dry-run` prints the placement plan; `--validate` runs
//! discovery in strict mode and fails when any warning is present;
//! `--watch` polls the workspace and recompiles on change.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use walkdir::WalkDir;

use crate::analysis::DirectoryAnalysisCache;
use crate::constants::PRUNED_DIRS;
use crate::core::ApmError;
use crate::emitter::{EmitOptions, emit};
use crate::manifest::Manifest;
use crate::optimizer::optimize;
use crate::primitives::{discover, project_roots};
use crate::utils::is_hidden_name;

/// `apm compile`.
#[derive(Args)]
pub struct CompileCommand {
    /// Output file name (default from the manifest, then AGENTS.md)
    #[arg(long)]
    output: Option<String>,

    /// Chatmode to prepend to the root output
    #[arg(long)]
    chatmode: Option<String>,

    /// Print the placement plan without writing files
    #[arg(long)]
    dry_run: bool,

    /// Emit bodies verbatim without rewriting relative links
    #[arg(long)]
    no_links: bool,

    /// Force constitution injection on
    #[arg(long, conflicts_with = "no_constitution")]
    with_constitution: bool,

    /// Force constitution injection off
    #[arg(long)]
    no_constitution: bool,

    /// Recompile whenever the workspace changes (1 s poll)
    #[arg(long, conflicts_with_all = ["dry_run", "validate"])]
    watch: bool,

    /// Run discovery in strict mode: warnings become errors
    #[arg(long)]
    validate: bool,
}

impl CompileCommand {
    pub async fn execute(self, project_dir: &Path) -> Result<()> {
        let manifest = Manifest::load_from_dir(project_dir)?;

        if self.validate {
            return validate_only(project_dir);
        }

        let options = self.emit_options(&manifest);

        if self.watch {
            return watch_loop(project_dir, &manifest, &options).await;
        }

        compile_once(project_dir, &manifest, &options, self.dry_run)
    }

    fn emit_options(&self, manifest: &Manifest) -> EmitOptions {
        let compilation = &manifest.compilation;
        let constitution = if self.with_constitution {
            true
        } else if self.no_constitution {
            false
        } else {
            compilation.constitution
        };

        EmitOptions {
            output_name: self
                .output
                .clone()
                .unwrap_or_else(|| compilation.output.clone()),
            resolve_links: !self.no_links && compilation.resolve_links,
            constitution,
            chatmode: self.chatmode.clone().or_else(|| compilation.chatmode.clone()),
            clean_orphaned: compilation.placement.clean_orphaned,
        }
    }
}

fn validate_only(project_dir: &Path) -> Result<()> {
    let found = discover(&project_roots(project_dir));
    for warning in &found.warnings {
        eprintln!("{}: {warning}", "warning".yellow());
    }
    if found.warnings.is_empty() {
        println!(
            "{} {} primitives valid",
            "✓".green(),
            found.collection.len()
        );
        Ok(())
    } else {
        Err(ApmError::Other {
            message: format!(
                "validation failed: {} warning(s) in strict mode",
                found.warnings.len()
            ),
        }
        .into())
    }
}

fn compile_once(
    project_dir: &Path,
    manifest: &Manifest,
    options: &EmitOptions,
    dry_run: bool,
) -> Result<()> {
    let found = discover(&project_roots(project_dir));
    for warning in &found.warnings {
        eprintln!("{}: {warning}", "warning".yellow());
    }

    let cache = DirectoryAnalysisCache::build(project_dir, &manifest.compilation.placement);
    let placements = optimize(
        &found.collection.instructions,
        &cache,
        &manifest.compilation.optimization,
    )?;

    if dry_run {
        println!("{}", "Placement plan (dry run):".bold());
        for placement in &placements.per_instruction {
            let instruction = &found.collection.instructions[placement.instruction_index];
            match placement.strategy {
                Some(strategy) => {
                    println!(
                        "  {} `{}` -> {} ({strategy}, score {:.2}, {} match(es), pollution {})",
                        instruction.name.bold(),
                        placement.pattern,
                        placement
                            .directories
                            .iter()
                            .map(|d| {
                                if d.as_os_str().is_empty() {
                                    ".".to_string()
                                } else {
                                    d.display().to_string()
                                }
                            })
                            .collect::<Vec<_>>()
                            .join(", "),
                        placement.distribution_score,
                        placement.matching_files,
                        placement.pollution
                    );
                }
                None => {
                    println!(
                        "  {} `{}` -> no matching files",
                        instruction.name.dimmed(),
                        placement.pattern
                    );
                }
            }
        }
        return Ok(());
    }

    let result = emit(
        project_dir,
        &placements,
        &found.collection.instructions,
        &found.collection.chatmodes,
        options,
        &manifest.compilation.placement,
    )?;

    println!(
        "{} compiled: {} written, {} unchanged, {} removed",
        "✓".green(),
        result.written.len(),
        result.unchanged.len(),
        result.deleted.len()
    );
    Ok(())
}

/// Poll the workspace and recompile on change.
///
/// The digest covers every non-pruned file path and modification time,
/// excluding compiled outputs so a compile does not retrigger itself.
async fn watch_loop(
    project_dir: &Path,
    manifest: &Manifest,
    options: &EmitOptions,
) -> Result<()> {
    println!("Watching for changes (ctrl-c to stop)...");
    let mut last_digest = 0u64;

    loop {
        let digest = workspace_digest(project_dir, &options.output_name);
        if digest != last_digest {
            last_digest = digest;
            if let Err(e) = compile_once(project_dir, manifest, options, false) {
                eprintln!("{}: {e:#}", "error".red());
            }
        }
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    }
}

fn workspace_digest(project_dir: &Path, output_name: &str) -> u64 {
    let mut hasher = DefaultHasher::new();

    let walker = WalkDir::new(project_dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            if PRUNED_DIRS.contains(&name.as_ref()) {
                // apm_modules content still feeds discovery
                return name == "apm_modules";
            }
            !is_hidden_name(&name) || name == ".apm" || name == ".github"
        });

    for entry in walker.filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if name == output_name || name.starts_with('.') {
            continue;
        }
        entry.path().hash(&mut hasher);
        if let Ok(meta) = entry.metadata() {
            meta.len().hash(&mut hasher);
            if let Ok(modified) = meta.modified() {
                modified.hash(&mut hasher);
            }
        }
    }

    hasher.finish()
}
