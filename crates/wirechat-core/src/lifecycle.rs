//! Session lifecycle controller
//!
//! State machine for the single locally active session. Pure and
//! transport-free: transitions return the ordered outbound intents the
//! caller must emit, so the machine is testable without any I/O and the
//! leave-before-join emission order is decided in exactly one place.
//!
//! The server enforces single-session membership per connection, and the
//! wire protocol has no request correlation ids. Two consequences shape the
//! transitions below: switching sessions must emit a leave for the previous
//! session before the new join, and a second join is refused outright while
//! one is still unconfirmed.

use core::fmt;

use crate::errors::LifecycleError;
use crate::types::SessionId;

// ----------------------------------------------------------------------------
// Session State
// ----------------------------------------------------------------------------

/// Where the local client stands with respect to session membership.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No session joined, nothing pending.
    #[default]
    Idle,
    /// A join intent is in flight; `None` means creation was requested.
    Joining(Option<SessionId>),
    /// Joined and receiving live messages for this session.
    Active(SessionId),
}

impl SessionState {
    pub fn is_joining(&self) -> bool {
        matches!(self, SessionState::Joining(_))
    }

    /// The active session id, if any.
    pub fn active_session(&self) -> Option<&SessionId> {
        match self {
            SessionState::Active(id) => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Joining(Some(id)) => write!(f, "joining {}", id),
            SessionState::Joining(None) => write!(f, "creating session"),
            SessionState::Active(id) => write!(f, "active in {}", id),
        }
    }
}

// ----------------------------------------------------------------------------
// Outbound Intents
// ----------------------------------------------------------------------------

/// What a transition asks the caller to put on the wire, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundIntent {
    /// Emit `join_session`; `None` requests creation of a new session.
    Join(Option<SessionId>),
    /// Emit `leave_session` for the given session.
    Leave(SessionId),
}

// ----------------------------------------------------------------------------
// Lifecycle Controller
// ----------------------------------------------------------------------------

/// Owner of the active-session pointer. Observers read the state; only the
/// operations here mutate it.
#[derive(Debug, Default)]
pub struct LifecycleController {
    state: SessionState,
}

impl LifecycleController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// The active session id, if any.
    pub fn active_session(&self) -> Option<&SessionId> {
        self.state.active_session()
    }

    /// Start joining `target`, or creating a session when `target` is
    /// `None`. When a session is currently active, the returned intents
    /// leave it first; the order of the returned vector is the required
    /// emission order.
    ///
    /// Refused while a previous join is unconfirmed: with no correlation
    /// ids on the wire, a second in-flight join would make the next
    /// confirmation ambiguous.
    pub fn create_or_join(
        &mut self,
        target: Option<SessionId>,
    ) -> Result<Vec<OutboundIntent>, LifecycleError> {
        match core::mem::take(&mut self.state) {
            SessionState::Joining(pending) => {
                self.state = SessionState::Joining(pending);
                Err(LifecycleError::JoinPending)
            }
            SessionState::Active(previous) => {
                self.state = SessionState::Joining(target.clone());
                Ok(vec![
                    OutboundIntent::Leave(previous),
                    OutboundIntent::Join(target),
                ])
            }
            SessionState::Idle => {
                self.state = SessionState::Joining(target.clone());
                Ok(vec![OutboundIntent::Join(target)])
            }
        }
    }

    /// Leave the active session, or cancel a pending join.
    ///
    /// Cancelling a pending join emits a leave for its target so the server
    /// side does not linger; a pending creation has no id to leave yet, so
    /// nothing is emitted.
    pub fn leave(&mut self) -> Result<Vec<OutboundIntent>, LifecycleError> {
        match core::mem::take(&mut self.state) {
            SessionState::Active(id) | SessionState::Joining(Some(id)) => {
                Ok(vec![OutboundIntent::Leave(id)])
            }
            SessionState::Joining(None) => Ok(Vec::new()),
            SessionState::Idle => Err(LifecycleError::NoActiveSession),
        }
    }

    /// Apply a server join confirmation. The server is authoritative, so
    /// the confirmation is accepted from any state, including a stale one
    /// arriving after a local reset. Returns the state it displaced.
    pub fn confirm_joined(&mut self, session_id: SessionId) -> SessionState {
        core::mem::replace(&mut self.state, SessionState::Active(session_id))
    }

    /// Apply a server-reported error: abort any pending transition and
    /// drop back to idle. Returns the state it displaced.
    pub fn server_error(&mut self) -> SessionState {
        core::mem::take(&mut self.state)
    }

    /// Reset on connection teardown. No leave is emitted; membership
    /// cleanup after a dropped connection is the server's job.
    pub fn reset(&mut self) -> SessionState {
        core::mem::take(&mut self.state)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
