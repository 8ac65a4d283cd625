//! Core domain types for wirechat
//!
//! Identifiers are opaque, server-assigned strings wrapped in newtypes so the
//! compiler keeps session, message, and user ids from being mixed up. Entity
//! structs mirror the server's wire shapes exactly; field renames carry the
//! legacy JSON names.

use core::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Identifier Newtypes
// ----------------------------------------------------------------------------

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id! {
    /// Server-assigned session identifier, unique within the registry.
    SessionId
}

string_id! {
    /// Server-assigned message identifier, unique within its session.
    MessageId
}

string_id! {
    /// Identifier of a user account on the remote service.
    UserId
}

// ----------------------------------------------------------------------------
// Wire Entities
// ----------------------------------------------------------------------------

/// A user as the server describes one: account id plus display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatUser {
    pub id: UserId,
    pub username: String,
}

impl ChatUser {
    pub fn new(id: impl Into<UserId>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
        }
    }
}

/// Originator of a message. Server-generated notices carry a null user id
/// (and conventionally the "Server" display name), so the id is optional
/// here where [`ChatUser`] requires one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSender {
    #[serde(default)]
    pub id: Option<UserId>,
    pub username: String,
}

/// A single chat message as delivered by the server.
///
/// Once appended to a session log a message is immutable and never removed;
/// consumers treat the log as append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    /// Absent for some server-originated notices.
    #[serde(default)]
    pub sender: Option<MessageSender>,
    pub content: String,
    /// The session this message belongs to, for its whole lifetime.
    pub session: SessionId,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    /// Distinguishes server notices from user-originated messages.
    #[serde(rename = "isServerMessage", default)]
    pub server_message: bool,
}

impl ChatMessage {
    /// Display name of the originator, falling back to the reserved server
    /// label when no sender was supplied.
    pub fn sender_label(&self) -> &str {
        match &self.sender {
            Some(sender) => &sender.username,
            None => "Server",
        }
    }
}

/// A conversation session: server-assigned id, owning user, and the message
/// history the server chose to embed in the snapshot.
///
/// The owner is immutable after creation. The legacy wire names for the
/// owner and history fields are preserved via serde renames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: SessionId,
    #[serde(rename = "users_permissions_user")]
    pub owner: ChatUser,
    #[serde(rename = "chat_messages", default)]
    pub messages: Vec<ChatMessage>,
}

// ----------------------------------------------------------------------------
// Local Identity
// ----------------------------------------------------------------------------

/// Bearer credential issued by the external identity service.
///
/// The secret is deliberately excluded from `Debug` output; call
/// [`AuthToken::expose`] where the raw value is genuinely needed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Borrow the raw secret.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(..)")
    }
}

impl From<&str> for AuthToken {
    fn from(token: &str) -> Self {
        Self(token.to_owned())
    }
}

impl From<String> for AuthToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}

/// The locally signed-in user, as supplied by the external auth boundary.
/// Consumed when opening the transport and stamped into every outbound
/// intent; never mutated by this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    pub token: AuthToken,
}

impl UserProfile {
    pub fn new(
        id: impl Into<UserId>,
        username: impl Into<String>,
        token: impl Into<AuthToken>,
    ) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            token: token.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
