//! Initialize a new APM project.
//!
//! Writes a starter `apm.yml` and a sample `hello-world.prompt.md` in
//! the target directory. Refuses to overwrite an existing manifest
//! unless `--force` is given.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::Path;

use crate::constants::MANIFEST_FILENAME;
use crate::core::ApmError;
use crate::utils::fs::{atomic_write_str, ensure_dir};

const SAMPLE_WORKFLOW: &str = "\
---
description: Sample workflow to verify your setup
input:
  - name
---
Say hello to ${input:name} and summarize this repository.
";

/// `apm init [name]`.
#[derive(Args)]
pub struct InitCommand {
    /// Project name (defaults to the directory name)
    name: Option<String>,

    /// Overwrite an existing manifest
    #[arg(short, long)]
    force: bool,

    /// Accept all defaults without prompting
    #[arg(short, long)]
    yes: bool,
}

impl InitCommand {
    pub async fn execute(self, project_dir: &Path) -> Result<()> {
        ensure_dir(project_dir)?;
        let manifest_path = project_dir.join(MANIFEST_FILENAME);

        if manifest_path.exists() && !self.force {
            return Err(ApmError::Other {
                message: format!(
                    "manifest already exists at {}; use --force to overwrite",
                    manifest_path.display()
                ),
            }
            .into());
        }

        let name = self.name.unwrap_or_else(|| default_name(project_dir));
        let manifest = starter_manifest(&name);
        atomic_write_str(&manifest_path, &manifest)?;

        let workflow_path = project_dir.join("hello-world.prompt.md");
        if !workflow_path.exists() || self.force {
            atomic_write_str(&workflow_path, SAMPLE_WORKFLOW)?;
        }

        println!("{} Initialized APM project '{name}'", "✓".green());
        println!("  {}", manifest_path.display());
        println!("  {}", workflow_path.display());
        println!();
        println!("Next steps:");
        println!("  apm install          # fetch dependencies");
        println!("  apm compile          # generate AGENTS.md files");
        println!("  apm run start --param name=world");
        Ok(())
    }
}

fn default_name(project_dir: &Path) -> String {
    project_dir
        .canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|f| f.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "my-project".to_string())
}

fn starter_manifest(name: &str) -> String {
    format!(
        "\
name: {name}
version: 0.1.0
scripts:
  start: \"codex hello-world.prompt.md\"
dependencies:
  apm: []
  mcp: []
compilation:
  output: AGENTS.md
  resolve_links: true
"
    )
}
