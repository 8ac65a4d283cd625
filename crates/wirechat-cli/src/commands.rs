//! Command handlers for the wirechat CLI

use tracing::info;

use wirechat_core::SessionId;

use crate::app::ChatApp;
use crate::cli::{Cli, Commands};
use crate::config::AppConfig;
use crate::error::{CliError, Result};

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(cli: Cli, config: AppConfig) -> Result<()> {
        match cli.command {
            Commands::Chat { session } => {
                Self::handle_chat_command(config, session.map(SessionId::new)).await
            }
            Commands::Sessions => Self::handle_sessions_command(config).await,
            Commands::Send { session, message } => {
                Self::handle_send_command(config, SessionId::new(session), message).await
            }
            Commands::Status => Self::handle_status_command(config).await,
            Commands::Init { force } => Self::handle_init_command(force),
        }
    }

    /// Handle the interactive chat command
    async fn handle_chat_command(config: AppConfig, session: Option<SessionId>) -> Result<()> {
        let app = ChatApp::connect(config).await?;
        app.run_interactive(session).await
    }

    /// Handle the sessions listing command
    async fn handle_sessions_command(config: AppConfig) -> Result<()> {
        let mut app = ChatApp::connect(config).await?;
        app.wait_until_ready().await?;
        app.wait_for_sessions().await?;

        app.print_sessions().await;

        app.shutdown().await;
        Ok(())
    }

    /// Handle the one-shot send command
    async fn handle_send_command(
        config: AppConfig,
        session: SessionId,
        message: String,
    ) -> Result<()> {
        let mut app = ChatApp::connect(config).await?;
        app.wait_until_ready().await?;

        app.client().create_or_join(Some(session)).await?;
        let joined = app.wait_for_join().await?;
        info!(session = %joined, "joined session");

        app.client().send_message(message.as_str()).await?;

        // The server echoes accepted messages back to the sender.
        if !app.wait_for_echo(&message).await {
            app.shutdown().await;
            return Err(CliError::Startup(format!(
                "Message was sent but never echoed back by {}",
                joined
            )));
        }
        println!("Message delivered to {}", joined);

        app.client().leave().await?;
        app.shutdown().await;
        Ok(())
    }

    /// Handle the status command
    async fn handle_status_command(config: AppConfig) -> Result<()> {
        let mut app = ChatApp::connect(config).await?;
        app.wait_until_ready().await?;
        app.wait_for_sessions().await?;

        println!("Wirechat Client Status");
        println!("======================");
        println!("User: {}", app.client().profile().username);
        app.print_status().await;

        app.shutdown().await;
        Ok(())
    }

    /// Handle the init command, writing an example configuration file
    fn handle_init_command(force: bool) -> Result<()> {
        let path = AppConfig::default_config_path()?;
        if path.exists() && !force {
            println!(
                "Configuration already exists at {} (use --force to overwrite)",
                path.display()
            );
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, AppConfig::example_config())?;
        println!("Wrote example configuration to {}", path.display());
        Ok(())
    }
}
