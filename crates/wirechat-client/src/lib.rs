//! Wirechat Client
//!
//! Async runtime around the `wirechat-core` state machines: a supervised
//! WebSocket transport with reconnection, a single-task dispatcher that
//! applies inbound server events in strict arrival order, and notification
//! fan-out to subscribers. [`ChatClient`] ties them together into the
//! session-scoped client surface, one instance per login.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod client;
pub mod observers;
pub mod transport;

mod dispatcher;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use client::{ChatClient, ClientStats};
pub use observers::{FanoutStats, Notification, SubscriberId, SubscriberRegistry};
pub use transport::{
    ConnectionState, FakeTransport, ReconnectPolicy, Transport, TransportEvent,
    TransportEventReceiver, WsTransport,
};
