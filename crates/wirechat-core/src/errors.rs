//! Error types for wirechat
//!
//! One enum per concern, unified into [`WirechatError`] via `#[from]`
//! conversions. The taxonomy mirrors how failures are handled: transport
//! faults surface only through the connection-state signal, protocol faults
//! are logged and dropped, server-reported errors reset the session
//! lifecycle, and validation faults are rejected locally before anything
//! reaches the wire.

use thiserror::Error;

use crate::types::{MessageId, SessionId};

// ----------------------------------------------------------------------------
// Transport Errors
// ----------------------------------------------------------------------------

/// Failures establishing or tearing down the persistent connection.
///
/// Delivery failures are absent on purpose: sends are fire-and-forget and
/// drop silently while disconnected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    #[error("Invalid endpoint '{0}'")]
    InvalidEndpoint(String),

    #[error("Transport already closed")]
    Closed,
}

// ----------------------------------------------------------------------------
// Wire / Protocol Errors
// ----------------------------------------------------------------------------

/// Malformed or unexpected inbound traffic. Never fatal: the dispatcher
/// logs the frame and keeps running.
#[derive(Error, Debug)]
pub enum WireError {
    #[error("Malformed frame: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Non-text frame from server")]
    NonTextFrame,
}

// ----------------------------------------------------------------------------
// Registry Errors
// ----------------------------------------------------------------------------

/// Snapshot violations detected by the session registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Duplicate session id '{0}' in snapshot")]
    DuplicateSession(SessionId),
}

// ----------------------------------------------------------------------------
// Store Errors
// ----------------------------------------------------------------------------

/// Ordering and integrity violations detected by the message log store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Message '{id}' already present in session '{session}'")]
    DuplicateMessage { session: SessionId, id: MessageId },

    #[error("Timestamp regression at message '{id}' in session '{session}'")]
    TimestampRegression { session: SessionId, id: MessageId },

    #[error("Empty content in user message '{id}' for session '{session}'")]
    EmptyContent { session: SessionId, id: MessageId },

    #[error("Message '{id}' claims session '{actual}' inside history for '{expected}'")]
    SessionMismatch {
        expected: SessionId,
        actual: SessionId,
        id: MessageId,
    },
}

// ----------------------------------------------------------------------------
// Lifecycle Errors
// ----------------------------------------------------------------------------

/// Rejected session lifecycle transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// A join request is already in flight. The wire protocol carries no
    /// correlation ids, so a second outstanding join would make the next
    /// confirmation ambiguous.
    #[error("A join request is already pending")]
    JoinPending,

    #[error("No active session")]
    NoActiveSession,
}

// ----------------------------------------------------------------------------
// Validation Errors
// ----------------------------------------------------------------------------

/// Locally rejected outbound input. Never reaches the transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Message content is empty")]
    EmptyMessage,

    #[error("Message content exceeds {max} characters (got {len})")]
    MessageTooLong { len: usize, max: usize },
}

// ----------------------------------------------------------------------------
// Unified Error Type
// ----------------------------------------------------------------------------

/// Top-level error for all wirechat operations.
#[derive(Error, Debug)]
pub enum WirechatError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Wire(#[from] WireError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Verbatim text of a server-pushed `error` event.
    #[error("Server reported: {0}")]
    Server(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl WirechatError {
    /// Create an error from a server-pushed `error` event payload.
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server(message.into())
    }

    /// Create a connection-establishment error.
    pub fn connect_failed(detail: impl Into<String>) -> Self {
        Self::Transport(TransportError::ConnectFailed(detail.into()))
    }

    /// Create an invalid-endpoint error.
    pub fn invalid_endpoint(endpoint: impl Into<String>) -> Self {
        Self::Transport(TransportError::InvalidEndpoint(endpoint.into()))
    }
}

/// Result alias used throughout wirechat.
pub type WirechatResult<T> = core::result::Result<T, WirechatError>;

// ----------------------------------------------------------------------------
// Current-Error Reporting
// ----------------------------------------------------------------------------

/// Which side of the contract produced a retained error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Explicit `error` event pushed by the server.
    ServerReported,
    /// Malformed or integrity-violating inbound traffic, dropped locally.
    Protocol,
}

/// The single retained "current error" presented to observers: the most
/// recent server-reported or protocol error, kept until superseded or
/// explicitly cleared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub detail: String,
}

impl ErrorReport {
    pub fn server_reported(detail: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::ServerReported,
            detail: detail.into(),
        }
    }

    pub fn protocol(detail: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Protocol,
            detail: detail.into(),
        }
    }
}

impl core::fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.kind {
            ErrorKind::ServerReported => write!(f, "server error: {}", self.detail),
            ErrorKind::Protocol => write!(f, "protocol error: {}", self.detail),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
