//! Notification fan-out to client observers
//!
//! Replaces ad-hoc callback wiring with an explicit subscriber registry.
//! Each mutation of client state publishes exactly one notification, and
//! every subscriber receives every notification in registration order
//! through its own bounded queue. A subscriber that stops draining its
//! queue is disconnected rather than allowed to stall the dispatcher.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use wirechat_core::{ChatMessage, ErrorReport, SessionId};

use crate::transport::ConnectionState;

// ----------------------------------------------------------------------------
// Notifications
// ----------------------------------------------------------------------------

/// What subscribers are told about. One notification per observable state
/// change, published after the change has been applied, so a handler that
/// queries the client sees the post-change state.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// The transport connection state changed.
    ConnectionChanged { state: ConnectionState },
    /// A session snapshot was applied; the session list was replaced.
    SessionsUpdated { count: usize },
    /// A join was confirmed and the session's history installed.
    SessionJoined { session_id: SessionId },
    /// A live message was appended to a session log.
    MessageAppended { message: ChatMessage },
    /// A server-reported or protocol error became the current error.
    ErrorReported { report: ErrorReport },
}

/// Handle identifying one subscription, for targeted unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

// ----------------------------------------------------------------------------
// Subscriber Registry
// ----------------------------------------------------------------------------

/// Statistics for notification delivery
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutStats {
    /// Notifications published
    pub published: u64,
    /// Successful per-subscriber deliveries
    pub delivered: u64,
    /// Subscribers disconnected for not draining their queue
    pub dropped_subscribers: u64,
}

/// Registry of live subscribers with ordered, non-blocking fan-out.
pub struct SubscriberRegistry {
    subscribers: Vec<(SubscriberId, mpsc::Sender<Notification>)>,
    next_id: u64,
    buffer: usize,
    stats: FanoutStats,
}

impl SubscriberRegistry {
    /// Create a registry whose subscriber queues hold `buffer` pending
    /// notifications each.
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: Vec::new(),
            next_id: 0,
            buffer,
            stats: FanoutStats::default(),
        }
    }

    /// Register a subscriber. Notifications published after this call are
    /// delivered to the returned receiver; earlier ones are not replayed.
    pub fn subscribe(&mut self) -> (SubscriberId, mpsc::Receiver<Notification>) {
        let id = SubscriberId(self.next_id);
        self.next_id += 1;
        let (tx, rx) = mpsc::channel(self.buffer);
        self.subscribers.push((id, tx));
        debug!(subscriber = id.0, "observer subscribed");
        (id, rx)
    }

    /// Remove a subscriber. Returns false when the id is unknown, which
    /// includes subscribers already disconnected for falling behind.
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    /// Deliver one notification to every subscriber in registration order.
    ///
    /// Delivery never blocks: a subscriber whose queue is full is
    /// disconnected and must resubscribe and re-query the client state to
    /// recover. Subscribers that dropped their receiver are pruned silently.
    pub fn publish(&mut self, notification: Notification) {
        self.stats.published += 1;
        let Self {
            subscribers, stats, ..
        } = self;
        subscribers.retain(|(id, tx)| match tx.try_send(notification.clone()) {
            Ok(()) => {
                stats.delivered += 1;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(subscriber = id.0, "disconnecting subscriber with full queue");
                stats.dropped_subscribers += 1;
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(subscriber = id.0, "pruning closed subscriber");
                false
            }
        });
    }

    /// Number of live subscribers.
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Whether any subscriber is registered.
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Get delivery statistics
    pub fn stats(&self) -> FanoutStats {
        self.stats
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
