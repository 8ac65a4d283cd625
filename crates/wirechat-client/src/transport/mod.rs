//! Transport abstraction for the wirechat client
//!
//! A transport owns the single persistent connection to the remote endpoint
//! and is an explicitly lifetime-scoped object: created per login, closed at
//! logout, no globals. Implementations surface inbound traffic and
//! connection-state changes through one ordered event queue so the
//! dispatcher never has to reason about concurrent handlers.

use core::fmt;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use wirechat_core::{WireError, WirechatResult};

pub mod fake;
pub mod ws;

pub use fake::FakeTransport;
pub use ws::{ReconnectPolicy, WsTransport};

// ----------------------------------------------------------------------------
// Connection State
// ----------------------------------------------------------------------------

/// Connection lifecycle of the underlying socket. One instance per
/// transport, published through a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection; also the terminal state after `close()`.
    #[default]
    Disconnected,
    /// Connection attempt (or reconnection attempt) in progress.
    Connecting,
    /// Open and ready to carry frames.
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

// ----------------------------------------------------------------------------
// Transport Events
// ----------------------------------------------------------------------------

/// What a transport delivers into the dispatcher queue, in arrival order.
#[derive(Debug)]
pub enum TransportEvent {
    /// The connection state changed. Interleaved with frames so the
    /// dispatcher observes the change at the right point in the stream.
    StateChanged(ConnectionState),
    /// A raw inbound text frame; decoding happens in the dispatcher.
    Frame(String),
    /// Traffic the transport itself could not accept (e.g. a binary frame
    /// on a text-only protocol).
    Malformed(WireError),
}

/// Receiving half of a transport's event queue; exactly one consumer.
pub type TransportEventReceiver = mpsc::Receiver<TransportEvent>;

// ----------------------------------------------------------------------------
// Transport Trait
// ----------------------------------------------------------------------------

/// Contract between the client and its connection.
///
/// Sends are fire-and-forget: when the connection is not `Connected` a
/// frame is dropped with a trace, never an error, and delivery is confirmed
/// only by later inbound events. Nothing here blocks the caller beyond
/// enqueueing.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Establish the persistent connection. Idempotent while already
    /// connecting or connected; completion is observed via
    /// [`Transport::watch_state`], not by awaiting this call.
    async fn connect(&self) -> WirechatResult<()>;

    /// Enqueue one outbound text frame. Silently drops the frame when the
    /// connection is not `Connected`.
    async fn send_frame(&self, frame: String) -> WirechatResult<()>;

    /// Current connection state.
    fn state(&self) -> ConnectionState;

    /// Subscribe to connection-state changes.
    fn watch_state(&self) -> watch::Receiver<ConnectionState>;

    /// Tear down the connection and stop reconnecting. Terminal: the
    /// transport stays `Disconnected` afterwards.
    async fn close(&self);
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Disconnected.to_string(), "disconnected");
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
    }

    #[test]
    fn test_default_state_is_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }
}
