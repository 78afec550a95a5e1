//! Run, preview, and list manifest scripts.
//!
//! `run` substitutes parameters, hands the command to the host shell
//! with the environment passed through unchanged, and exits with the
//! child's exit code. `preview` prints what would run without running
//! it.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::Path;

use crate::manifest::Manifest;
use crate::primitives::{PrimitiveCollection, discover, project_roots};
use crate::scripts::{parse_params, prepare_script};

/// `apm run <script>`.
#[derive(Args)]
pub struct RunCommand {
    /// Script name from the manifest
    script: String,

    /// Parameter value, repeatable: --param key=value
    #[arg(long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,
}

impl RunCommand {
    pub async fn execute(self, project_dir: &Path) -> Result<()> {
        let (manifest, collection) = load_project(project_dir)?;
        let params = parse_params(&self.params)?;
        let prepared =
            prepare_script(project_dir, &manifest, &collection, &self.script, &params)?;

        let status = shell_command(&prepared.command)
            .current_dir(project_dir)
            .status()
            .await?;

        let code = status.code().unwrap_or(1);
        // Drop the prepared script (and its temp prompt file) before
        // exiting, since process::exit skips destructors.
        drop(prepared);
        if code == 0 {
            Ok(())
        } else {
            std::process::exit(code);
        }
    }
}

/// `apm preview <script>`.
#[derive(Args)]
pub struct PreviewCommand {
    /// Script name from the manifest
    script: String,

    /// Parameter value, repeatable: --param key=value
    #[arg(long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,
}

impl PreviewCommand {
    pub async fn execute(self, project_dir: &Path) -> Result<()> {
        let (manifest, collection) = load_project(project_dir)?;
        let params = parse_params(&self.params)?;
        let prepared =
            prepare_script(project_dir, &manifest, &collection, &self.script, &params)?;

        println!("{} {}", "command:".bold(), prepared.command);
        if let Some(body) = &prepared.prompt_body {
            println!();
            println!("{}", "prompt:".bold());
            print!("{body}");
            if !body.ends_with('\n') {
                println!();
            }
        }
        Ok(())
    }
}

/// `apm list`.
#[derive(Args)]
pub struct ListCommand {}

impl ListCommand {
    pub async fn execute(self, project_dir: &Path) -> Result<()> {
        let manifest = Manifest::load_from_dir(project_dir)?;
        if manifest.scripts.is_empty() {
            println!("No scripts defined in apm.yml");
            return Ok(());
        }

        println!("{}", "Scripts:".bold());
        for (name, command) in &manifest.scripts {
            println!("  {}  {}", name.bold(), command.dimmed());
        }
        Ok(())
    }
}

fn load_project(project_dir: &Path) -> Result<(Manifest, PrimitiveCollection)> {
    let manifest = Manifest::load_from_dir(project_dir)?;
    let found = discover(&project_roots(project_dir));
    Ok((manifest, found.collection))
}

/// Host-shell invocation with the environment passed through unchanged.
fn shell_command(command: &str) -> tokio::process::Command {
    #[cfg(windows)]
    {
        let mut cmd = tokio::process::Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    }
    #[cfg(not(windows))]
    {
        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }
}
