//! Configuration for the wirechat core
//!
//! Consolidates the tunable knobs of the messaging core into one place:
//! channel buffer sizes for the event plumbing and validation settings for
//! the message log store.

use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Channel Configuration
// ----------------------------------------------------------------------------

/// Buffer sizes for the channels wiring transport, dispatcher, and
/// subscribers together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Buffer size for inbound transport events (Transport → Dispatcher)
    pub transport_event_buffer: usize,
    /// Buffer size for each subscriber's notification channel
    pub notification_buffer: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            transport_event_buffer: 128, // network events can be bursty
            notification_buffer: 64,     // observers drain quickly
        }
    }
}

impl ChannelConfig {
    /// Create configuration optimized for testing
    pub fn testing() -> Self {
        Self {
            transport_event_buffer: 32,
            notification_buffer: 32,
        }
    }
}

// ----------------------------------------------------------------------------
// Log Store Configuration
// ----------------------------------------------------------------------------

/// Validation settings for the message log store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogStoreConfig {
    /// Reject inbound messages whose `createdAt` regresses behind the
    /// session log's tail (equal timestamps are allowed)
    pub enforce_timestamp_order: bool,
    /// Reject inbound user-originated messages with empty content
    pub strict_content_validation: bool,
    /// Maximum outbound message content length (in characters)
    pub max_content_length: usize,
}

impl Default for LogStoreConfig {
    fn default() -> Self {
        Self {
            enforce_timestamp_order: true,
            strict_content_validation: true,
            max_content_length: 4096,
        }
    }
}

impl LogStoreConfig {
    /// Create configuration that accepts whatever the server delivers,
    /// checking only per-session message id uniqueness
    pub fn permissive() -> Self {
        Self {
            enforce_timestamp_order: false,
            strict_content_validation: false,
            max_content_length: 65536,
        }
    }

    /// Create configuration optimized for testing
    pub fn testing() -> Self {
        Self {
            enforce_timestamp_order: true,
            strict_content_validation: true,
            max_content_length: 128,
        }
    }
}

// ----------------------------------------------------------------------------
// Master Configuration
// ----------------------------------------------------------------------------

/// Master configuration struct consolidating all wirechat core settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WirechatConfig {
    /// Channel buffer configuration
    pub channels: ChannelConfig,
    /// Message log store configuration
    pub store: LogStoreConfig,
}

impl WirechatConfig {
    /// Create new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create configuration optimized for testing
    pub fn testing() -> Self {
        Self {
            channels: ChannelConfig::testing(),
            store: LogStoreConfig::testing(),
        }
    }

    /// Builder method for customizing channel configuration
    pub fn with_channels(mut self, channels: ChannelConfig) -> Self {
        self.channels = channels;
        self
    }

    /// Builder method for customizing store configuration
    pub fn with_store(mut self, store: LogStoreConfig) -> Self {
        self.store = store;
        self
    }

    /// Validate the configuration for consistency and feasibility
    pub fn validate(&self) -> Result<(), String> {
        if self.channels.transport_event_buffer == 0 {
            return Err("Transport event buffer size cannot be zero".into());
        }
        if self.channels.notification_buffer == 0 {
            return Err("Notification buffer size cannot be zero".into());
        }
        if self.store.max_content_length == 0 {
            return Err("Max content length cannot be zero".into());
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
