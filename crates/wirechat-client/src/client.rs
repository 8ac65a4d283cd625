//! Chat client
//!
//! [`ChatClient`] is the public surface of the crate: it owns the transport
//! and the shared client state, runs the dispatcher task that applies
//! inbound events, and exposes the outbound intents plus read access to the
//! session registry and message logs.
//!
//! All state lives behind one async mutex shared with the dispatcher, so
//! intent methods and inbound events serialize against each other. The lock
//! is held across the transport handoff inside a single intent, which is
//! what guarantees a leave frame reaches the wire before the join frame
//! that displaced it.

use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use wirechat_core::{
    ChatMessage, ChatSession, ClientEvent, ErrorReport, LifecycleController, LifecycleError,
    MessageLogStore, OutboundIntent, SessionId, SessionRegistry, SessionState, UserProfile,
    ValidationError, WirechatConfig, WirechatError, WirechatResult,
};

use crate::dispatcher::EventDispatcher;
use crate::observers::{Notification, SubscriberId, SubscriberRegistry};
use crate::transport::{
    ConnectionState, ReconnectPolicy, Transport, TransportEventReceiver, WsTransport,
};

// ----------------------------------------------------------------------------
// Client Statistics
// ----------------------------------------------------------------------------

/// Statistics for client activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    /// Well-formed server events processed
    pub server_events: u64,
    /// Inbound events rejected and dropped as protocol errors
    pub protocol_errors: u64,
    /// Server-pushed error events
    pub server_errors: u64,
    /// Join and leave intents sent
    pub intents_sent: u64,
    /// Chat messages sent
    pub messages_sent: u64,
}

// ----------------------------------------------------------------------------
// Shared Client State
// ----------------------------------------------------------------------------

/// Everything the dispatcher and the intent methods mutate, behind one lock.
pub(crate) struct ClientState {
    pub(crate) registry: SessionRegistry,
    pub(crate) store: MessageLogStore,
    pub(crate) lifecycle: LifecycleController,
    pub(crate) subscribers: SubscriberRegistry,
    pub(crate) current_error: Option<ErrorReport>,
    pub(crate) stats: ClientStats,
}

impl ClientState {
    pub(crate) fn new(config: &WirechatConfig) -> Self {
        Self {
            registry: SessionRegistry::new(),
            store: MessageLogStore::new(config.store.clone()),
            lifecycle: LifecycleController::new(),
            subscribers: SubscriberRegistry::new(config.channels.notification_buffer),
            current_error: None,
            stats: ClientStats::default(),
        }
    }

    pub(crate) fn publish(&mut self, notification: Notification) {
        self.subscribers.publish(notification);
    }

    /// Drop an invalid inbound event: log it, retain it as the current
    /// error, and notify observers. Prior state is untouched.
    pub(crate) fn record_protocol_error(&mut self, detail: impl Into<String>) {
        let detail = detail.into();
        warn!(%detail, "protocol error, inbound event dropped");
        self.stats.protocol_errors += 1;
        let report = ErrorReport::protocol(detail);
        self.current_error = Some(report.clone());
        self.publish(Notification::ErrorReported { report });
    }

    /// Surface a server-pushed error. Aborts any pending lifecycle
    /// transition before observers are notified, so a handler that queries
    /// the client sees the reset state.
    pub(crate) fn record_server_error(&mut self, detail: impl Into<String>) {
        let detail = detail.into();
        warn!(%detail, "server reported an error");
        self.stats.server_errors += 1;
        let displaced = self.lifecycle.server_error();
        if displaced != SessionState::Idle {
            debug!(%displaced, "session lifecycle reset by server error");
        }
        let report = ErrorReport::server_reported(detail);
        self.current_error = Some(report.clone());
        self.publish(Notification::ErrorReported { report });
    }
}

/// Encode one event and hand it to the transport. Failures are logged, not
/// returned: frames sent while disconnected are dropped by contract, and
/// the wire protocol has no delivery acknowledgment to await.
pub(crate) async fn send_event<T: Transport>(transport: &T, event: &ClientEvent) {
    match event.encode() {
        Ok(frame) => {
            debug!(event = event.name(), "sending client event");
            if let Err(err) = transport.send_frame(frame).await {
                warn!(event = event.name(), error = %err, "transport rejected frame");
            }
        }
        Err(err) => {
            warn!(event = event.name(), error = %err, "failed to encode client event");
        }
    }
}

// ----------------------------------------------------------------------------
// Chat Client
// ----------------------------------------------------------------------------

/// Session-scoped chat client over a [`Transport`].
///
/// Created at login and discarded at logout; dropping it stops the
/// dispatcher task. Generic over the transport so tests drive it with
/// [`FakeTransport`](crate::transport::FakeTransport).
pub struct ChatClient<T: Transport> {
    profile: UserProfile,
    config: WirechatConfig,
    transport: Arc<T>,
    state: Arc<Mutex<ClientState>>,
    dispatcher: JoinHandle<()>,
}

impl<T: Transport> ChatClient<T> {
    /// Create a client over an already-built transport and its event queue.
    pub fn new(
        transport: T,
        events: TransportEventReceiver,
        profile: UserProfile,
        config: WirechatConfig,
    ) -> WirechatResult<Self> {
        config.validate().map_err(WirechatError::Config)?;

        let transport = Arc::new(transport);
        let state = Arc::new(Mutex::new(ClientState::new(&config)));
        let dispatcher = EventDispatcher::new(
            Arc::clone(&state),
            Arc::clone(&transport),
            profile.clone(),
            events,
        );
        let dispatcher = tokio::spawn(dispatcher.run());

        Ok(Self {
            profile,
            config,
            transport,
            state,
            dispatcher,
        })
    }

    /// Open the transport. Once the connection reports `Connected` the
    /// dispatcher requests the session snapshot on its own.
    pub async fn connect(&self) -> WirechatResult<()> {
        self.transport.connect().await
    }

    /// Tear down: close the transport and forget the session position
    /// without sending a leave. The server untracks this client when the
    /// connection drops.
    pub async fn close(&self) {
        self.transport.close().await;
        let mut state = self.state.lock().await;
        let displaced = state.lifecycle.reset();
        if displaced != SessionState::Idle {
            debug!(%displaced, "session position discarded on close");
        }
    }

    // ------------------------------------------------------------------
    // Outbound intents
    // ------------------------------------------------------------------

    /// Ask the server to create a fresh session (`None`) or join an
    /// existing one (`Some`).
    ///
    /// While a session is active, a leave for it is handed to the transport
    /// strictly before the join. Rejected with
    /// [`LifecycleError::JoinPending`] while another join is outstanding.
    pub async fn create_or_join(&self, target: Option<SessionId>) -> WirechatResult<()> {
        let mut state = self.state.lock().await;
        let intents = state.lifecycle.create_or_join(target)?;
        self.emit_intents(&mut state, intents).await;
        Ok(())
    }

    /// Leave the active (or pending) session.
    pub async fn leave(&self) -> WirechatResult<()> {
        let mut state = self.state.lock().await;
        let intents = state.lifecycle.leave()?;
        self.emit_intents(&mut state, intents).await;
        Ok(())
    }

    /// Send a chat message to the active session.
    ///
    /// Whitespace-only content and content over the configured length limit
    /// are rejected locally and never reach the transport. The content is
    /// sent exactly as given; trimming is only applied to the emptiness
    /// check.
    pub async fn send_message(&self, content: impl Into<String>) -> WirechatResult<()> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(ValidationError::EmptyMessage.into());
        }
        let len = content.chars().count();
        let max = self.config.store.max_content_length;
        if len > max {
            return Err(ValidationError::MessageTooLong { len, max }.into());
        }

        let mut state = self.state.lock().await;
        let session_id = state
            .lifecycle
            .active_session()
            .cloned()
            .ok_or(LifecycleError::NoActiveSession)?;
        let event = ClientEvent::SendMessage {
            user_id: self.profile.id.clone(),
            session_id,
            message: content,
        };
        send_event(self.transport.as_ref(), &event).await;
        state.stats.messages_sent += 1;
        Ok(())
    }

    /// Request a fresh session snapshot from the server.
    pub async fn refresh_sessions(&self) {
        let event = ClientEvent::GetSessions {
            user_id: self.profile.id.clone(),
        };
        send_event(self.transport.as_ref(), &event).await;
    }

    async fn emit_intents(&self, state: &mut ClientState, intents: Vec<OutboundIntent>) {
        for intent in intents {
            let event = match intent {
                OutboundIntent::Join(session_id) => ClientEvent::JoinSession {
                    user_id: self.profile.id.clone(),
                    session_id,
                },
                OutboundIntent::Leave(session_id) => ClientEvent::LeaveSession {
                    user_id: self.profile.id.clone(),
                    session_id,
                },
            };
            send_event(self.transport.as_ref(), &event).await;
            state.stats.intents_sent += 1;
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Known sessions, in server snapshot order.
    pub async fn sessions(&self) -> Vec<ChatSession> {
        self.state.lock().await.registry.sessions().to_vec()
    }

    /// Messages of one session in arrival order, or `None` when no history
    /// for it has ever been received. An empty `Some` means a known-empty
    /// session.
    pub async fn messages(&self, session_id: &SessionId) -> Option<Vec<ChatMessage>> {
        self.state.lock().await.store.messages(session_id)
    }

    /// Where this client stands with respect to session membership.
    pub async fn session_state(&self) -> SessionState {
        self.state.lock().await.lifecycle.state().clone()
    }

    /// Current transport connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.transport.state()
    }

    /// Subscribe to transport connection state changes.
    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.transport.watch_state()
    }

    /// The retained current error, if any.
    pub async fn current_error(&self) -> Option<ErrorReport> {
        self.state.lock().await.current_error.clone()
    }

    /// Dismiss the current error.
    pub async fn clear_error(&self) {
        self.state.lock().await.current_error = None;
    }

    /// Register an observer for client notifications.
    pub async fn subscribe(&self) -> (SubscriberId, mpsc::Receiver<Notification>) {
        self.state.lock().await.subscribers.subscribe()
    }

    /// Remove a previously registered observer.
    pub async fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.state.lock().await.subscribers.unsubscribe(id)
    }

    /// Get activity statistics
    pub async fn stats(&self) -> ClientStats {
        self.state.lock().await.stats
    }

    /// The signed-in user this client acts for.
    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    /// The configuration this client runs with.
    pub fn config(&self) -> &WirechatConfig {
        &self.config
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }
}

impl ChatClient<WsTransport> {
    /// Client over a WebSocket transport with the default reconnect policy.
    pub fn websocket(
        endpoint: &str,
        profile: UserProfile,
        config: WirechatConfig,
    ) -> WirechatResult<Self> {
        Self::websocket_with_policy(endpoint, profile, config, ReconnectPolicy::default())
    }

    /// Client over a WebSocket transport with an explicit reconnect policy.
    pub fn websocket_with_policy(
        endpoint: &str,
        profile: UserProfile,
        config: WirechatConfig,
        policy: ReconnectPolicy,
    ) -> WirechatResult<Self> {
        let (transport, events) = WsTransport::new(
            endpoint,
            profile.token.clone(),
            policy,
            config.channels.transport_event_buffer,
        )?;
        Self::new(transport, events, profile, config)
    }
}

impl<T: Transport> Drop for ChatClient<T> {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use crate::transport::FakeTransport;

    fn profile() -> UserProfile {
        UserProfile::new("u1", "ada", "tok")
    }

    fn client() -> ChatClient<FakeTransport> {
        let (transport, events) = FakeTransport::new(16);
        ChatClient::new(transport, events, profile(), WirechatConfig::testing()).unwrap()
    }

    #[tokio::test]
    async fn test_send_message_rejects_whitespace_only_content() {
        let client = client();
        client.connect().await.unwrap();

        let err = client.send_message("   \n\t ").await.unwrap_err();
        assert!(matches!(
            err,
            WirechatError::Validation(ValidationError::EmptyMessage)
        ));
        assert!(client.transport().sent_frames().is_empty());
    }

    #[tokio::test]
    async fn test_send_message_rejects_oversized_content() {
        let client = client();
        client.connect().await.unwrap();

        let max = client.config().store.max_content_length;
        let oversized = "x".repeat(max + 1);
        let err = client.send_message(oversized).await.unwrap_err();
        assert!(matches!(
            err,
            WirechatError::Validation(ValidationError::MessageTooLong { .. })
        ));
        assert!(client.transport().sent_frames().is_empty());
    }

    #[tokio::test]
    async fn test_send_message_requires_active_session() {
        let client = client();
        client.connect().await.unwrap();

        let err = client.send_message("hello").await.unwrap_err();
        assert!(matches!(
            err,
            WirechatError::Lifecycle(LifecycleError::NoActiveSession)
        ));
        assert!(client.transport().sent_frames().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let (transport, events) = FakeTransport::new(16);
        let config = WirechatConfig::testing().with_channels(wirechat_core::ChannelConfig {
            transport_event_buffer: 0,
            notification_buffer: 0,
        });
        let result = ChatClient::new(transport, events, profile(), config);
        assert!(matches!(result, Err(WirechatError::Config(_))));
    }
}
