//! Command-line interface for APM.
//!
//! Each command lives in its own module with its own argument struct and
//! execution logic. Global options (`--verbose`, `--quiet`,
//! `--project-dir`) are available to every subcommand; dispatch is an
//! explicit match in [`Cli::execute_with_config`].
//!
//! # Commands
//!
//! - `init` - write a starter manifest and sample workflow
//! - `install` - resolve and install dependencies into `apm_modules/`
//! - `deps` - inspect or clean installed dependencies
//! - `compile` - compile primitives into placed `AGENTS.md` files
//! - `run` / `preview` - execute or preview a manifest script
//! - `list` - list manifest scripts

mod compile;
mod deps;
mod init;
mod install;
mod run;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Runtime configuration derived from global CLI flags.
///
/// Passed explicitly to commands instead of mutating process state, so
/// tests can inject configurations without touching the environment.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Log level driving the tracing filter; `None` disables logging.
    pub log_level: Option<String>,
}

/// Main CLI application structure for APM.
#[derive(Parser)]
#[command(
    name = "apm",
    about = "Agent Package Manager - dependency management and context compilation for AI-native repositories",
    version,
    author,
    long_about = "APM resolves reusable collections of AI context primitives from remote \
                  sources, compiles them into agent-facing AGENTS.md files, and runs \
                  manifest scripts against AI runtime CLIs."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output (equivalent to RUST_LOG=debug)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Project directory containing apm.yml (defaults to the current
    /// directory)
    #[arg(long, global = true)]
    project_dir: Option<PathBuf>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize a new APM project with a manifest and sample workflow
    Init(init::InitCommand),

    /// Install dependencies from apm.yml into apm_modules/
    Install(install::InstallCommand),

    /// Inspect or clean installed dependencies
    Deps(deps::DepsCommand),

    /// Compile primitives into placed AGENTS.md files
    Compile(compile::CompileCommand),

    /// Run a manifest script with parameter substitution
    Run(run::RunCommand),

    /// Show a script's substituted command and prompt without running it
    Preview(run::PreviewCommand),

    /// List scripts defined in the manifest
    List(run::ListCommand),
}

impl Cli {
    /// Build a [`CliConfig`] from the parsed global flags.
    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            Some("debug".to_string())
        } else if self.quiet {
            None
        } else {
            Some("info".to_string())
        };
        CliConfig {
            log_level,
        }
    }

    /// Execute the parsed command.
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        self.execute_with_config(config).await
    }

    /// Execute with an injected configuration.
    pub async fn execute_with_config(self, _config: CliConfig) -> Result<()> {
        let project_dir =
            self.project_dir.clone().unwrap_or_else(|| PathBuf::from("."));

        match self.command {
            Commands::Init(cmd) => cmd.execute(&project_dir).await,
            Commands::Install(cmd) => cmd.execute(&project_dir).await,
            Commands::Deps(cmd) => cmd.execute(&project_dir).await,
            Commands::Compile(cmd) => cmd.execute(&project_dir).await,
            Commands::Run(cmd) => cmd.execute(&project_dir).await,
            Commands::Preview(cmd) => cmd.execute(&project_dir).await,
            Commands::List(cmd) => cmd.execute(&project_dir).await,
        }
    }
}
