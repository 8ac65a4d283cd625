//! Wirechat Core
//!
//! Sans-IO core of the wirechat client: wire protocol types and codec, the
//! session registry, per-session message logs, and the join/leave lifecycle
//! state machine. Everything here is synchronous and transport-free; the
//! `wirechat-client` crate supplies the WebSocket transport and the
//! serialized event dispatch around these pieces.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod config;
pub mod errors;
pub mod lifecycle;
pub mod log_store;
pub mod protocol;
pub mod registry;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use config::{ChannelConfig, LogStoreConfig, WirechatConfig};
pub use errors::{
    ErrorKind, ErrorReport, LifecycleError, RegistryError, StoreError, TransportError,
    ValidationError, WireError, WirechatError, WirechatResult,
};
pub use lifecycle::{LifecycleController, OutboundIntent, SessionState};
pub use log_store::{LogEntry, MessageLogStore, StoreStats};
pub use protocol::{ClientEvent, ServerEvent};
pub use registry::{RegistryStats, SessionRegistry, SnapshotSummary};
pub use types::{
    AuthToken, ChatMessage, ChatSession, ChatUser, MessageId, MessageSender, SessionId, UserId,
    UserProfile,
};
