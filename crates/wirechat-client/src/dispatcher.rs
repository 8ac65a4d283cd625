//! Inbound event dispatch
//!
//! One task drains the transport event queue and applies every event to the
//! shared client state under its lock, strictly in arrival order. There are
//! no concurrent handlers: by the time a notification for event N reaches a
//! subscriber, events 1..N have fully updated the state.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use wirechat_core::{ChatMessage, ChatSession, ClientEvent, ServerEvent, SessionId, UserProfile};

use crate::client::{send_event, ClientState};
use crate::observers::Notification;
use crate::transport::{ConnectionState, Transport, TransportEvent, TransportEventReceiver};

// ----------------------------------------------------------------------------
// Event Dispatcher
// ----------------------------------------------------------------------------

/// Owns the receiving half of the transport queue and routes each event to
/// its handler.
pub(crate) struct EventDispatcher<T: Transport> {
    state: Arc<Mutex<ClientState>>,
    transport: Arc<T>,
    profile: UserProfile,
    events: TransportEventReceiver,
}

impl<T: Transport> EventDispatcher<T> {
    pub(crate) fn new(
        state: Arc<Mutex<ClientState>>,
        transport: Arc<T>,
        profile: UserProfile,
        events: TransportEventReceiver,
    ) -> Self {
        Self {
            state,
            transport,
            profile,
            events,
        }
    }

    /// Drain the queue until every sender is gone.
    pub(crate) async fn run(mut self) {
        while let Some(event) = self.events.recv().await {
            self.process_event(event).await;
        }
        debug!("transport event queue closed, dispatcher stopping");
    }

    async fn process_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::StateChanged(connection) => {
                self.handle_connection_change(connection).await;
            }
            TransportEvent::Frame(frame) => match ServerEvent::decode(&frame) {
                Ok(event) => self.handle_server_event(event).await,
                Err(err) => {
                    let mut state = self.state.lock().await;
                    state.record_protocol_error(err.to_string());
                }
            },
            TransportEvent::Malformed(err) => {
                let mut state = self.state.lock().await;
                state.record_protocol_error(err.to_string());
            }
        }
    }

    /// Tell observers about the transition, and on every new connection
    /// request the session snapshot: a reconnect may span a server restart,
    /// so the session list is refetched rather than trusted.
    async fn handle_connection_change(&self, connection: ConnectionState) {
        let mut state = self.state.lock().await;
        debug!(%connection, "connection state changed");
        state.publish(Notification::ConnectionChanged { state: connection });
        if connection == ConnectionState::Connected {
            let event = ClientEvent::GetSessions {
                user_id: self.profile.id.clone(),
            };
            send_event(self.transport.as_ref(), &event).await;
        }
    }

    async fn handle_server_event(&self, event: ServerEvent) {
        let mut state = self.state.lock().await;
        debug!(event = event.name(), "server event received");
        state.stats.server_events += 1;
        match event {
            ServerEvent::SessionsList(sessions) => {
                ServerEventHandlers::sessions_list(&mut state, sessions);
            }
            ServerEvent::SessionJoined {
                session_id,
                messages,
            } => {
                ServerEventHandlers::session_joined(&mut state, session_id, messages);
            }
            ServerEvent::NewMessage(message) => {
                ServerEventHandlers::new_message(&mut state, message);
            }
            ServerEvent::Error { message } => {
                state.record_server_error(message);
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Server Event Handlers
// ----------------------------------------------------------------------------

/// Handlers for well-formed server events, one per wire event.
///
/// Each applies the event to the locked client state and publishes the
/// matching notification. An event that violates an invariant is dropped
/// whole, leaving prior state in place.
struct ServerEventHandlers;

impl ServerEventHandlers {
    /// Replace the known session set wholesale, then reinstall the embedded
    /// history of every listed session. Logs of sessions absent from the
    /// snapshot are retained.
    fn sessions_list(state: &mut ClientState, sessions: Vec<ChatSession>) {
        match state.registry.apply_snapshot(sessions) {
            Ok(summary) => {
                debug!(
                    sessions = summary.session_count,
                    replaced = summary.previous_count,
                    "session snapshot applied"
                );
                let histories: Vec<(SessionId, Vec<ChatMessage>)> = state
                    .registry
                    .sessions()
                    .iter()
                    .map(|session| (session.id.clone(), session.messages.clone()))
                    .collect();
                for (session_id, messages) in histories {
                    if let Err(err) = state.store.replace_log(&session_id, messages) {
                        state.record_protocol_error(err.to_string());
                    }
                }
                let count = state.registry.len();
                state.publish(Notification::SessionsUpdated { count });
            }
            Err(err) => state.record_protocol_error(err.to_string()),
        }
    }

    /// Install the delivered history, then flip the lifecycle to active.
    /// When the history is invalid the whole confirmation is dropped and
    /// the join stays outstanding; recovery is a leave or a server error.
    fn session_joined(state: &mut ClientState, session_id: SessionId, messages: Vec<ChatMessage>) {
        match state.store.replace_log(&session_id, messages) {
            Ok(count) => {
                let displaced = state.lifecycle.confirm_joined(session_id.clone());
                if !displaced.is_joining() {
                    debug!(%displaced, "join confirmation arrived without a pending join");
                }
                debug!(session = %session_id, messages = count, "session joined");
                state.publish(Notification::SessionJoined { session_id });
            }
            Err(err) => state.record_protocol_error(err.to_string()),
        }
    }

    /// Append a live message to the log of its embedded session.
    fn new_message(state: &mut ClientState, message: ChatMessage) {
        match state.store.append(message.clone()) {
            Ok(_) => state.publish(Notification::MessageAppended { message }),
            Err(err) => state.record_protocol_error(err.to_string()),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::DateTime;

    use wirechat_core::{
        ChatUser, ErrorKind, MessageId, MessageSender, SessionState, UserId, WirechatConfig,
    };

    fn state() -> ClientState {
        ClientState::new(&WirechatConfig::testing())
    }

    fn msg(id: &str, session: &str, content: &str, at_secs: i64) -> ChatMessage {
        ChatMessage {
            id: MessageId::new(id),
            sender: Some(MessageSender {
                id: Some(UserId::new("u1")),
                username: "ada".into(),
            }),
            content: content.into(),
            session: SessionId::new(session),
            created_at: DateTime::from_timestamp(at_secs, 0).unwrap(),
            server_message: false,
        }
    }

    fn session(id: &str, messages: Vec<ChatMessage>) -> ChatSession {
        ChatSession {
            id: SessionId::new(id),
            owner: ChatUser::new("u1", "ada"),
            messages,
        }
    }

    #[test]
    fn test_snapshot_installs_sessions_and_histories() {
        let mut state = state();
        ServerEventHandlers::sessions_list(
            &mut state,
            vec![
                session("s1", vec![msg("m1", "s1", "hi", 10)]),
                session("s2", vec![]),
            ],
        );

        assert_eq!(state.registry.len(), 2);
        assert_eq!(state.store.messages(&SessionId::new("s1")).unwrap().len(), 1);
        // Listed with no history means known-empty, not unknown.
        assert_eq!(state.store.messages(&SessionId::new("s2")), Some(vec![]));
        assert!(state.current_error.is_none());
    }

    #[test]
    fn test_rejected_snapshot_keeps_previous_sessions() {
        let mut state = state();
        ServerEventHandlers::sessions_list(&mut state, vec![session("s1", vec![])]);
        ServerEventHandlers::sessions_list(
            &mut state,
            vec![session("dup", vec![]), session("dup", vec![])],
        );

        assert_eq!(state.registry.len(), 1);
        assert!(state.registry.contains(&SessionId::new("s1")));
        let report = state.current_error.clone().unwrap();
        assert_eq!(report.kind, ErrorKind::Protocol);
        assert_eq!(state.stats.protocol_errors, 1);
    }

    #[test]
    fn test_session_joined_confirms_pending_join() {
        let mut state = state();
        let target = SessionId::new("s1");
        state
            .lifecycle
            .create_or_join(Some(target.clone()))
            .unwrap();

        ServerEventHandlers::session_joined(
            &mut state,
            target.clone(),
            vec![msg("m1", "s1", "hello", 5)],
        );

        assert_eq!(*state.lifecycle.state(), SessionState::Active(target.clone()));
        assert_eq!(state.store.messages(&target).unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_history_leaves_join_outstanding() {
        let mut state = state();
        let target = SessionId::new("s1");
        state
            .lifecycle
            .create_or_join(Some(target.clone()))
            .unwrap();

        // Duplicate message id inside the delivered history.
        ServerEventHandlers::session_joined(
            &mut state,
            target.clone(),
            vec![msg("m1", "s1", "a", 5), msg("m1", "s1", "b", 6)],
        );

        assert!(state.lifecycle.state().is_joining());
        assert_eq!(state.store.messages(&target), None);
        assert_eq!(state.current_error.clone().unwrap().kind, ErrorKind::Protocol);
    }

    #[test]
    fn test_new_message_appends_to_embedded_session() {
        let mut state = state();
        ServerEventHandlers::sessions_list(&mut state, vec![session("s1", vec![])]);
        ServerEventHandlers::new_message(&mut state, msg("m1", "s1", "hi", 10));

        assert_eq!(state.store.messages(&SessionId::new("s1")).unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_live_message_is_dropped_loudly() {
        let mut state = state();
        ServerEventHandlers::new_message(&mut state, msg("m1", "s1", "hi", 10));
        ServerEventHandlers::new_message(&mut state, msg("m1", "s1", "hi again", 11));

        assert_eq!(state.store.messages(&SessionId::new("s1")).unwrap().len(), 1);
        assert_eq!(state.stats.protocol_errors, 1);
        assert_eq!(state.current_error.clone().unwrap().kind, ErrorKind::Protocol);
    }

    #[test]
    fn test_server_error_resets_pending_join() {
        let mut state = state();
        state.lifecycle.create_or_join(None).unwrap();
        assert!(state.lifecycle.state().is_joining());

        state.record_server_error("Session is full".to_string());

        assert_eq!(*state.lifecycle.state(), SessionState::Idle);
        let report = state.current_error.clone().unwrap();
        assert_eq!(report.kind, ErrorKind::ServerReported);
        assert_eq!(report.detail, "Session is full");
    }
}
