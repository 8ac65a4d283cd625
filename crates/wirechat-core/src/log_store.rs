//! Message log store
//!
//! Per-session ordered message logs. Consumers see each log as append-only:
//! entries are immutable and never removed, and each carries a local arrival
//! sequence number that restarts from zero on a wholesale history
//! replacement and increases strictly afterwards.
//!
//! The wire protocol carries no sequence numbers, so integrity checks are
//! derived from what the messages do carry: a re-delivered message id is
//! rejected rather than appended twice, and a `createdAt` that regresses
//! behind the log tail is rejected when `enforce_timestamp_order` is set.
//! Rejections are loud (the caller surfaces them as protocol errors), never
//! silent drops.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::config::LogStoreConfig;
use crate::errors::StoreError;
use crate::types::{ChatMessage, MessageId, SessionId};

// ----------------------------------------------------------------------------
// Log Entries
// ----------------------------------------------------------------------------

/// One stored message plus its local arrival sequence number.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// Position in arrival order, per session: contiguous from 0 after a
    /// `replace_log`, strictly increasing across subsequent appends.
    pub seq: u64,
    pub message: ChatMessage,
}

#[derive(Debug, Default)]
struct SessionLog {
    entries: Vec<LogEntry>,
    seen_ids: HashSet<MessageId>,
    next_seq: u64,
}

impl SessionLog {
    fn tail_timestamp(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.entries.last().map(|e| e.message.created_at)
    }
}

// ----------------------------------------------------------------------------
// Store Statistics
// ----------------------------------------------------------------------------

/// Counters for store activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub appended: u64,
    pub replaced_logs: u64,
    pub rejected: u64,
}

// ----------------------------------------------------------------------------
// Message Log Store
// ----------------------------------------------------------------------------

/// Ordered, integrity-checked message logs keyed by session id.
#[derive(Debug)]
pub struct MessageLogStore {
    logs: HashMap<SessionId, SessionLog>,
    config: LogStoreConfig,
    stats: StoreStats,
}

impl Default for MessageLogStore {
    fn default() -> Self {
        Self::new(LogStoreConfig::default())
    }
}

impl MessageLogStore {
    pub fn new(config: LogStoreConfig) -> Self {
        Self {
            logs: HashMap::new(),
            config,
            stats: StoreStats::default(),
        }
    }

    /// Replace a session's log wholesale with server-delivered history.
    ///
    /// Used when a session is freshly joined or re-listed in a snapshot.
    /// The incoming history is validated in full before anything is
    /// installed; on any violation the session's previous log (if one
    /// exists) is left untouched and the error is returned for the caller
    /// to surface. Returns the number of installed messages.
    pub fn replace_log(
        &mut self,
        session_id: &SessionId,
        messages: Vec<ChatMessage>,
    ) -> Result<usize, StoreError> {
        if let Err(err) = self.validate_history(session_id, &messages) {
            self.stats.rejected += 1;
            warn!(session = %session_id, error = %err, "rejected history replacement");
            return Err(err);
        }

        let count = messages.len();
        let log = SessionLog {
            seen_ids: messages.iter().map(|m| m.id.clone()).collect(),
            entries: messages
                .into_iter()
                .enumerate()
                .map(|(i, message)| LogEntry {
                    seq: i as u64,
                    message,
                })
                .collect(),
            next_seq: count as u64,
        };
        self.logs.insert(session_id.clone(), log);
        self.stats.replaced_logs += 1;
        debug!(session = %session_id, messages = count, "replaced session log");
        Ok(count)
    }

    /// Append a live inbound message, routed by its embedded session id.
    ///
    /// Creates the session's log if none exists yet, but only once the
    /// message passes validation; a rejected message leaves the whole store
    /// untouched, including the known-session set. Returns the assigned
    /// arrival sequence number.
    pub fn append(&mut self, message: ChatMessage) -> Result<u64, StoreError> {
        let session_id = message.session.clone();

        if let Some(log) = self.logs.get(&session_id) {
            if log.seen_ids.contains(&message.id) {
                self.stats.rejected += 1;
                let err = StoreError::DuplicateMessage {
                    session: session_id,
                    id: message.id,
                };
                warn!(error = %err, "rejected re-delivered message");
                return Err(err);
            }
            if self.config.enforce_timestamp_order {
                if let Some(tail) = log.tail_timestamp() {
                    if message.created_at < tail {
                        self.stats.rejected += 1;
                        let err = StoreError::TimestampRegression {
                            session: session_id,
                            id: message.id,
                        };
                        warn!(error = %err, "rejected out-of-order message");
                        return Err(err);
                    }
                }
            }
        }
        if self.config.strict_content_validation
            && !message.server_message
            && message.content.trim().is_empty()
        {
            self.stats.rejected += 1;
            return Err(StoreError::EmptyContent {
                session: session_id,
                id: message.id,
            });
        }

        let log = self.logs.entry(session_id).or_default();
        let seq = log.next_seq;
        log.next_seq += 1;
        log.seen_ids.insert(message.id.clone());
        log.entries.push(LogEntry { seq, message });
        self.stats.appended += 1;
        Ok(seq)
    }

    /// The ordered log for a session.
    ///
    /// `None` means the session is unknown to the store; `Some(&[])` means
    /// known but empty. Both render as "no messages" in a UI, but the
    /// distinction stays observable here.
    pub fn get(&self, session_id: &SessionId) -> Option<&[LogEntry]> {
        self.logs.get(session_id).map(|log| log.entries.as_slice())
    }

    /// Cloned messages of a session's log, without the sequence numbers.
    pub fn messages(&self, session_id: &SessionId) -> Option<Vec<ChatMessage>> {
        self.logs
            .get(session_id)
            .map(|log| log.entries.iter().map(|e| e.message.clone()).collect())
    }

    /// Session ids that currently have a log (including empty ones).
    pub fn known_sessions(&self) -> Vec<SessionId> {
        self.logs.keys().cloned().collect()
    }

    /// Total stored messages across all sessions.
    pub fn total_messages(&self) -> usize {
        self.logs.values().map(|log| log.entries.len()).sum()
    }

    pub fn stats(&self) -> StoreStats {
        self.stats
    }

    fn validate_history(
        &self,
        session_id: &SessionId,
        messages: &[ChatMessage],
    ) -> Result<(), StoreError> {
        let mut seen = HashSet::with_capacity(messages.len());
        let mut previous: Option<chrono::DateTime<chrono::Utc>> = None;
        for message in messages {
            if message.session != *session_id {
                return Err(StoreError::SessionMismatch {
                    expected: session_id.clone(),
                    actual: message.session.clone(),
                    id: message.id.clone(),
                });
            }
            if !seen.insert(&message.id) {
                return Err(StoreError::DuplicateMessage {
                    session: session_id.clone(),
                    id: message.id.clone(),
                });
            }
            if self.config.strict_content_validation
                && !message.server_message
                && message.content.trim().is_empty()
            {
                return Err(StoreError::EmptyContent {
                    session: session_id.clone(),
                    id: message.id.clone(),
                });
            }
            if self.config.enforce_timestamp_order {
                if let Some(prev) = previous {
                    if message.created_at < prev {
                        return Err(StoreError::TimestampRegression {
                            session: session_id.clone(),
                            id: message.id.clone(),
                        });
                    }
                }
            }
            previous = Some(message.created_at);
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
