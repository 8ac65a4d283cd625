//! Wire protocol for the wirechat transport
//!
//! Every frame on the persistent connection is a JSON text frame with an
//! adjacently tagged envelope: `{"event": "<name>", "data": <payload>}`.
//! Event names and payload field names are fixed by the server contract and
//! must not drift; the serde renames below pin them.

use serde::{Deserialize, Serialize};

use crate::errors::WireError;
use crate::types::{ChatMessage, ChatSession, SessionId, UserId};

// ----------------------------------------------------------------------------
// Outbound Events (client → server)
// ----------------------------------------------------------------------------

/// Intents emitted by the client. Fire-and-forget: confirmations arrive
/// out-of-band as [`ServerEvent`]s, matched by sequencing and session id
/// rather than request tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Request the full session snapshot.
    #[serde(rename_all = "camelCase")]
    GetSessions { user_id: UserId },

    /// Join an existing session, or request creation of a new one when
    /// `session_id` is `None` (encoded as JSON `null`).
    #[serde(rename_all = "camelCase")]
    JoinSession {
        user_id: UserId,
        session_id: Option<SessionId>,
    },

    /// Leave a session. When switching sessions this must precede the
    /// subsequent join; the server enforces single-session membership.
    #[serde(rename_all = "camelCase")]
    LeaveSession {
        user_id: UserId,
        session_id: SessionId,
    },

    /// Send a message into a session. Optimistic: the message is not
    /// appended locally until the server echoes it back.
    #[serde(rename_all = "camelCase")]
    SendMessage {
        user_id: UserId,
        session_id: SessionId,
        message: String,
    },
}

impl ClientEvent {
    /// Encode into a JSON text frame.
    pub fn encode(&self) -> Result<String, WireError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a JSON text frame, as a server (or a test double) would.
    pub fn decode(frame: &str) -> Result<Self, WireError> {
        Ok(serde_json::from_str(frame)?)
    }

    /// Wire name of the event, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::GetSessions { .. } => "get_sessions",
            ClientEvent::JoinSession { .. } => "join_session",
            ClientEvent::LeaveSession { .. } => "leave_session",
            ClientEvent::SendMessage { .. } => "send_message",
        }
    }
}

// ----------------------------------------------------------------------------
// Inbound Events (server → client)
// ----------------------------------------------------------------------------

/// Events pushed by the server. Decoded by the dispatcher and routed in
/// strict arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Full authoritative session snapshot; replaces the known set.
    SessionsList(Vec<ChatSession>),

    /// Confirms a join and delivers the session's full history.
    #[serde(rename_all = "camelCase")]
    SessionJoined {
        session_id: SessionId,
        messages: Vec<ChatMessage>,
    },

    /// A live message, routed by its embedded session id.
    NewMessage(ChatMessage),

    /// Server-reported failure; aborts any pending lifecycle transition.
    Error { message: String },
}

impl ServerEvent {
    /// Decode a JSON text frame.
    pub fn decode(frame: &str) -> Result<Self, WireError> {
        Ok(serde_json::from_str(frame)?)
    }

    /// Encode into a JSON text frame, as a server (or a test double) would.
    pub fn encode(&self) -> Result<String, WireError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Wire name of the event, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::SessionsList(_) => "sessions_list",
            ServerEvent::SessionJoined { .. } => "session_joined",
            ServerEvent::NewMessage(_) => "new_message",
            ServerEvent::Error { .. } => "error",
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn encoded(event: &ClientEvent) -> Value {
        serde_json::from_str(&event.encode().unwrap()).unwrap()
    }

    #[test]
    fn test_get_sessions_wire_shape() {
        let event = ClientEvent::GetSessions {
            user_id: UserId::new("u1"),
        };
        assert_eq!(
            encoded(&event),
            json!({ "event": "get_sessions", "data": { "userId": "u1" } })
        );
    }

    #[test]
    fn test_join_session_null_requests_creation() {
        let event = ClientEvent::JoinSession {
            user_id: UserId::new("u1"),
            session_id: None,
        };
        assert_eq!(
            encoded(&event),
            json!({
                "event": "join_session",
                "data": { "userId": "u1", "sessionId": null }
            })
        );
    }

    #[test]
    fn test_leave_and_send_wire_shapes() {
        let leave = ClientEvent::LeaveSession {
            user_id: UserId::new("u1"),
            session_id: SessionId::new("s1"),
        };
        assert_eq!(
            encoded(&leave),
            json!({
                "event": "leave_session",
                "data": { "userId": "u1", "sessionId": "s1" }
            })
        );

        let send = ClientEvent::SendMessage {
            user_id: UserId::new("u1"),
            session_id: SessionId::new("s1"),
            message: "hello".into(),
        };
        assert_eq!(
            encoded(&send),
            json!({
                "event": "send_message",
                "data": { "userId": "u1", "sessionId": "s1", "message": "hello" }
            })
        );
    }

    #[test]
    fn test_decode_sessions_list() {
        let frame = r#"{
            "event": "sessions_list",
            "data": [{
                "id": "s1",
                "users_permissions_user": { "id": "u1", "username": "ada" },
                "chat_messages": []
            }]
        }"#;
        let event = ServerEvent::decode(frame).unwrap();
        match event {
            ServerEvent::SessionsList(sessions) => {
                assert_eq!(sessions.len(), 1);
                assert_eq!(sessions[0].id, SessionId::new("s1"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_decode_session_joined() {
        let frame = r#"{
            "event": "session_joined",
            "data": {
                "sessionId": "s1",
                "messages": [{
                    "id": "m1",
                    "sender": { "id": "u1", "username": "ada" },
                    "content": "hi",
                    "session": "s1",
                    "createdAt": "2023-04-01T12:00:00.000Z",
                    "isServerMessage": false
                }]
            }
        }"#;
        let event = ServerEvent::decode(frame).unwrap();
        match event {
            ServerEvent::SessionJoined {
                session_id,
                messages,
            } => {
                assert_eq!(session_id, SessionId::new("s1"));
                assert_eq!(messages.len(), 1);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_decode_new_message_and_error() {
        let frame = r#"{
            "event": "new_message",
            "data": {
                "id": "m3",
                "content": "hi",
                "session": "s1",
                "createdAt": "2023-04-01T12:00:05.000Z",
                "isServerMessage": true
            }
        }"#;
        let event = ServerEvent::decode(frame).unwrap();
        assert_eq!(event.name(), "new_message");

        let frame = r#"{ "event": "error", "data": { "message": "session full" } }"#;
        match ServerEvent::decode(frame).unwrap() {
            ServerEvent::Error { message } => assert_eq!(message, "session full"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_unknown_event() {
        let frame = r#"{ "event": "made_up", "data": {} }"#;
        assert!(ServerEvent::decode(frame).is_err());
    }

    #[test]
    fn test_decode_rejects_malformed_payload() {
        // sessions_list with an object payload instead of a list
        let frame = r#"{ "event": "sessions_list", "data": { "bogus": true } }"#;
        assert!(ServerEvent::decode(frame).is_err());

        assert!(ServerEvent::decode("not json at all").is_err());
    }

    #[test]
    fn test_server_event_round_trip() {
        let event = ServerEvent::Error {
            message: "nope".into(),
        };
        let frame = serde_json::to_string(&event).unwrap();
        assert_eq!(ServerEvent::decode(&frame).unwrap(), event);
    }
}
