//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// WebSocket endpoint override
    #[arg(short, long)]
    pub endpoint: Option<String>,

    /// User id override
    #[arg(long)]
    pub user_id: Option<String>,

    /// Display name override
    #[arg(long)]
    pub username: Option<String>,

    /// Access token override
    #[arg(short, long)]
    pub token: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start interactive chat mode
    Chat {
        /// Session to join on startup
        #[arg(short, long)]
        session: Option<String>,
    },
    /// List available sessions and exit
    Sessions,
    /// Send a single message to a session and exit
    Send {
        /// Target session id
        #[arg(short, long)]
        session: String,
        /// Message content
        message: String,
    },
    /// Show connection status and client statistics
    Status,
    /// Write an example configuration file
    Init {
        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },
}
