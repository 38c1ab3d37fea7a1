use anyhow::Result;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use toolclaw::cli::{self, Cli, Command};
use toolclaw::config::AppConfig;

/// Log to stderr so stdout stays clean JSON.
fn setup_logging(verbose: bool, level: &str) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config_path()?;
    // init-config must work even when the existing file does not parse.
    let config = match cli.command {
        Command::InitConfig { .. } => AppConfig::default(),
        _ => AppConfig::load_from(&config_path)?,
    };
    setup_logging(cli.verbose, &config.logging.level);
    debug!(config = %config_path.display(), "Configuration loaded");

    let code = cli::run(&cli, &config).await?;
    if code != cli::EXIT_SUCCESS {
        std::process::exit(code);
    }
    Ok(())
}
