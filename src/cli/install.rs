//! Install dependencies from the manifest.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

use crate::installer::{InstallOptions, OnlyKind, PlanAction, install};

/// `apm install`.
#[derive(Args)]
pub struct InstallCommand {
    /// Restrict installation to one dependency type
    #[arg(long, value_parser = ["apm", "mcp"])]
    only: Option<String>,

    /// Re-fetch dependencies even when the lock file is current
    #[arg(long)]
    update: bool,

    /// Print the resolved plan without fetching archives into place
    #[arg(long)]
    dry_run: bool,

    /// Maximum concurrent fetches
    #[arg(long, default_value_t = crate::constants::DEFAULT_MAX_PARALLEL)]
    max_parallel: usize,
}

impl InstallCommand {
    pub async fn execute(self, project_dir: &Path) -> Result<()> {
        let options = InstallOptions {
            update: self.update,
            dry_run: self.dry_run,
            max_parallel: self.max_parallel,
            only: match self.only.as_deref() {
                Some("apm") => Some(OnlyKind::Apm),
                Some("mcp") => Some(OnlyKind::Mcp),
                _ => None,
            },
        };

        let spinner = ProgressBar::new_spinner().with_style(
            ProgressStyle::with_template("{spinner} {msg}").expect("static template"),
        );
        spinner.set_message("Resolving dependencies...");
        spinner.enable_steady_tick(Duration::from_millis(100));

        let result = install(project_dir, &options).await;
        spinner.finish_and_clear();
        let report = result?;

        for warning in &report.warnings {
            eprintln!("{}: {warning}", "warning".yellow());
        }

        if options.only == Some(OnlyKind::Mcp) {
            if report.mcp.is_empty() {
                println!("No MCP dependencies declared");
            } else {
                println!("MCP installation is delegated to the runtime helpers:");
                for id in &report.mcp {
                    println!("  {id}");
                }
            }
            return Ok(());
        }

        if report.dry_run {
            println!("{}", "Install plan (dry run):".bold());
            if report.plan.is_empty() {
                println!("  no APM dependencies declared");
            }
            for entry in &report.plan {
                let action = match entry.action {
                    PlanAction::Install => "install".green(),
                    PlanAction::Skip => "skip".dimmed(),
                };
                let reference = entry.reference.as_deref().unwrap_or("default branch");
                println!(
                    "  {action} {} ({reference} @ {})",
                    entry.key,
                    &entry.resolved_sha[..entry.resolved_sha.len().min(12)]
                );
            }
            return Ok(());
        }

        println!(
            "{} {} installed, {} up to date",
            "✓".green(),
            report.installed.len(),
            report.skipped.len()
        );
        Ok(())
    }
}
