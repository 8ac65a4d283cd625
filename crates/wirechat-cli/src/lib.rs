//! Wirechat CLI library
//!
//! Core components for the wirechat command-line interface: configuration
//! loading, command dispatch, and the interactive terminal application.

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use app::ChatApp;
pub use cli::{Cli, Commands};
pub use config::AppConfig;
pub use error::{CliError, Result};

// Re-export commonly used types
pub use wirechat_client::{ChatClient, ConnectionState, Notification, WsTransport};
pub use wirechat_core::{SessionId, SessionState, UserProfile};
