//! Wirechat CLI configuration management
//!
//! Loads layered configuration with the priority order:
//! CLI args > environment variables (WIRECHAT_*) > config file > defaults.

use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use wirechat_client::ReconnectPolicy;
use wirechat_core::{UserProfile, WirechatConfig};

// ----------------------------------------------------------------------------
// Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the wirechat CLI application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server connection settings
    pub connection: ConnectionConfig,

    /// Identity used on the wire
    pub identity: IdentityConfig,

    /// Terminal interface settings
    pub cli: CliConfig,

    /// Core client configuration
    pub client: WirechatConfig,
}

/// Server connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// WebSocket endpoint of the chat server
    pub endpoint: String,

    /// How long one-shot commands wait for the connection and the first
    /// session snapshot
    pub startup_timeout_secs: u64,

    /// Reconnection backoff policy
    pub reconnect: ReconnectPolicy,
}

/// Identity and credential configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IdentityConfig {
    /// Server-side user id
    pub user_id: Option<String>,

    /// Display name attached to outgoing messages
    pub username: Option<String>,

    /// Bearer token presented during the connection upgrade
    pub token: Option<String>,
}

/// Terminal interface settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Prompt shown in interactive mode
    pub prompt: String,

    /// Prefix messages with their server timestamp
    pub show_timestamps: bool,

    /// How many history messages to print when entering a session
    pub history_limit: usize,
}

// ----------------------------------------------------------------------------
// Default Implementations
// ----------------------------------------------------------------------------

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:1337/ws".to_string(),
            startup_timeout_secs: 15,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            prompt: "wirechat> ".to_string(),
            show_timestamps: true,
            history_limit: 20,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            identity: IdentityConfig::default(),
            cli: CliConfig::default(),
            client: WirechatConfig::default(),
        }
    }
}

// ----------------------------------------------------------------------------
// Configuration Loading Logic
// ----------------------------------------------------------------------------

/// Command-line overrides applied on top of the layered sources
#[derive(Debug, Default)]
pub struct Overrides {
    pub endpoint: Option<String>,
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub token: Option<String>,
}

impl AppConfig {
    /// Load configuration with the standard priority order:
    /// 1. Command line overrides (highest priority)
    /// 2. Environment variables (WIRECHAT_*)
    /// 3. Configuration file (wirechat.toml, then ~/.wirechat/config.toml)
    /// 4. Default values (lowest priority)
    ///
    /// When an explicit `config_file` is given, it replaces the file and
    /// environment layers.
    pub fn load_with_overrides(
        config_file: Option<&str>,
        overrides: Overrides,
    ) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));

        figment = match config_file {
            Some(path) => figment.merge(Toml::file(path)),
            None => figment
                .merge(Toml::file("wirechat.toml"))
                .merge(Toml::file(Self::default_config_path()?))
                .merge(Env::prefixed("WIRECHAT_").split("__")),
        };

        if let Some(endpoint) = overrides.endpoint {
            figment = figment.merge(("connection.endpoint", endpoint));
        }
        if let Some(user_id) = overrides.user_id {
            figment = figment.merge(("identity.user_id", user_id));
        }
        if let Some(username) = overrides.username {
            figment = figment.merge(("identity.username", username));
        }
        if let Some(token) = overrides.token {
            figment = figment.merge(("identity.token", token));
        }

        let config: AppConfig = figment
            .extract()
            .map_err(|e| ConfigError::Loading(format!("Failed to load configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path (~/.wirechat/config.toml)
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir()
            .ok_or_else(|| ConfigError::Environment("No home directory available".to_string()))?;
        Ok(home.join(".wirechat").join("config.toml"))
    }

    /// Save configuration to a specific file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), ConfigError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigError::FileSystem(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialization(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path.as_ref(), toml_string)
            .map_err(|e| ConfigError::FileSystem(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connection.endpoint.is_empty() {
            return Err(ConfigError::Validation(
                "Connection endpoint must not be empty".to_string(),
            ));
        }
        if !self.connection.endpoint.starts_with("ws://")
            && !self.connection.endpoint.starts_with("wss://")
        {
            return Err(ConfigError::Validation(format!(
                "Connection endpoint must use the ws or wss scheme: {}",
                self.connection.endpoint
            )));
        }
        if self.connection.startup_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "Startup timeout must be greater than 0".to_string(),
            ));
        }
        if self.cli.history_limit == 0 {
            return Err(ConfigError::Validation(
                "History limit must be greater than 0".to_string(),
            ));
        }

        self.connection.reconnect.validate().map_err(ConfigError::Validation)?;
        self.client.validate().map_err(ConfigError::Validation)?;

        Ok(())
    }

    /// Build the user profile from the identity section
    ///
    /// The user id and username come from the account this client acts as;
    /// both must be configured before connecting.
    pub fn profile(&self) -> Result<UserProfile, ConfigError> {
        let user_id = self.identity.user_id.as_deref().ok_or_else(|| {
            ConfigError::Validation(
                "identity.user_id must be set (config file, WIRECHAT_IDENTITY__USER_ID, or --user-id)"
                    .to_string(),
            )
        })?;
        let username = self.identity.username.as_deref().ok_or_else(|| {
            ConfigError::Validation(
                "identity.username must be set (config file, WIRECHAT_IDENTITY__USERNAME, or --username)"
                    .to_string(),
            )
        })?;
        let token = self.identity.token.as_deref().unwrap_or_default();

        Ok(UserProfile::new(user_id, username, token))
    }

    /// Create example configuration file content
    pub fn example_config() -> String {
        let example = AppConfig {
            identity: IdentityConfig {
                user_id: Some("1".to_string()),
                username: Some("my-name".to_string()),
                token: Some("paste-your-jwt-here".to_string()),
            },
            ..Default::default()
        };

        toml::to_string_pretty(&example)
            .unwrap_or_else(|_| "# Failed to generate example config".to_string())
    }
}

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration loading error: {0}")]
    Loading(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment error: {0}")]
    Environment(String),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
