//! Wirechat CLI entry point

use clap::Parser;
use tracing::error;

use wirechat_cli::{
    cli::Cli,
    commands::CommandDispatcher,
    config::{AppConfig, Overrides},
    error::Result,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let overrides = Overrides {
        endpoint: cli.endpoint.clone(),
        user_id: cli.user_id.clone(),
        username: cli.username.clone(),
        token: cli.token.clone(),
    };
    let config = AppConfig::load_with_overrides(cli.config.as_deref(), overrides)?;

    if let Err(e) = CommandDispatcher::execute(cli, config).await {
        error!("Command execution failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Setup logging based on verbosity level
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
