//! APM CLI entry point.
//!
//! Parses arguments, configures logging, executes the command, and maps
//! failures to the documented exit codes: 1 for user-visible failures,
//! 2 for network/auth failures during install.

use anyhow::Result;
use apm_cli::cli;
use apm_cli::core::user_friendly_error;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    let config = cli.build_config();

    // RUST_LOG wins when set; otherwise --verbose selects debug and the
    // default is quiet.
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("error"))
    } else if config.log_level.as_deref() == Some("debug") {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("off")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    match cli.execute_with_config(config).await {
        Ok(()) => Ok(()),
        Err(e) => {
            let ctx = user_friendly_error(e);
            ctx.display();
            std::process::exit(ctx.exit_code());
        }
    }
}
