//! Session registry
//!
//! Tracks the set of sessions the server has told us about. The server is
//! the source of truth: snapshots replace the whole set wholesale, never
//! merge, and ordering is preserved exactly as delivered because the UI
//! renders it positionally.

use std::collections::HashSet;

use tracing::debug;

use crate::errors::RegistryError;
use crate::types::{ChatSession, SessionId};

// ----------------------------------------------------------------------------
// Session Registry
// ----------------------------------------------------------------------------

/// The set of known sessions, in server-provided order.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Vec<ChatSession>,
    stats: RegistryStats,
}

/// Summary of an applied snapshot, for logging and notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotSummary {
    /// Sessions in the newly installed snapshot
    pub session_count: usize,
    /// Sessions known before this snapshot
    pub previous_count: usize,
}

/// Counters for registry activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub snapshots_applied: u64,
    pub snapshots_rejected: u64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entire known session set with a server snapshot.
    ///
    /// Rejects the snapshot (leaving the previous set intact) when it
    /// violates the id-uniqueness invariant. Message logs kept elsewhere
    /// for sessions absent from the new snapshot are not this registry's
    /// concern and are deliberately not pruned by it.
    pub fn apply_snapshot(
        &mut self,
        sessions: Vec<ChatSession>,
    ) -> Result<SnapshotSummary, RegistryError> {
        let mut seen = HashSet::with_capacity(sessions.len());
        for session in &sessions {
            if !seen.insert(&session.id) {
                self.stats.snapshots_rejected += 1;
                return Err(RegistryError::DuplicateSession(session.id.clone()));
            }
        }

        let summary = SnapshotSummary {
            session_count: sessions.len(),
            previous_count: self.sessions.len(),
        };
        self.sessions = sessions;
        self.stats.snapshots_applied += 1;
        debug!(
            sessions = summary.session_count,
            previously = summary.previous_count,
            "applied session snapshot"
        );
        Ok(summary)
    }

    /// Current sessions in server-provided order. The embedded message
    /// histories reflect the snapshot moment; live reads go through the
    /// message log store.
    pub fn sessions(&self) -> &[ChatSession] {
        &self.sessions
    }

    /// Look up one session by id.
    pub fn get(&self, id: &SessionId) -> Option<&ChatSession> {
        self.sessions.iter().find(|s| &s.id == id)
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        self.stats
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatUser;

    fn session(id: &str, owner: &str) -> ChatSession {
        ChatSession {
            id: SessionId::new(id),
            owner: ChatUser::new(owner, owner),
            messages: Vec::new(),
        }
    }

    #[test]
    fn test_snapshot_replaces_wholesale() {
        let mut registry = SessionRegistry::new();
        registry
            .apply_snapshot(vec![session("s1", "ada"), session("s2", "bob")])
            .unwrap();
        assert_eq!(registry.len(), 2);

        // Second snapshot fully replaces the first: no merge artifacts.
        let summary = registry
            .apply_snapshot(vec![session("s3", "eve")])
            .unwrap();
        assert_eq!(summary.previous_count, 2);
        assert_eq!(summary.session_count, 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.sessions()[0].id, SessionId::new("s3"));
        assert!(!registry.contains(&SessionId::new("s1")));
    }

    #[test]
    fn test_snapshot_preserves_server_order() {
        let mut registry = SessionRegistry::new();
        registry
            .apply_snapshot(vec![
                session("s9", "ada"),
                session("s1", "bob"),
                session("s5", "eve"),
            ])
            .unwrap();
        let order: Vec<&str> = registry
            .sessions()
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(order, vec!["s9", "s1", "s5"]);
    }

    #[test]
    fn test_duplicate_id_rejects_snapshot_and_keeps_previous() {
        let mut registry = SessionRegistry::new();
        registry.apply_snapshot(vec![session("s1", "ada")]).unwrap();

        let err = registry
            .apply_snapshot(vec![session("s2", "bob"), session("s2", "eve")])
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateSession(SessionId::new("s2")));

        // Previous snapshot survives the rejection.
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&SessionId::new("s1")));
        assert_eq!(registry.stats().snapshots_rejected, 1);
        assert_eq!(registry.stats().snapshots_applied, 1);
    }

    #[test]
    fn test_empty_snapshot_clears_registry() {
        let mut registry = SessionRegistry::new();
        registry.apply_snapshot(vec![session("s1", "ada")]).unwrap();
        registry.apply_snapshot(Vec::new()).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_get_by_id() {
        let mut registry = SessionRegistry::new();
        registry
            .apply_snapshot(vec![session("s1", "ada"), session("s2", "bob")])
            .unwrap();
        assert_eq!(
            registry.get(&SessionId::new("s2")).map(|s| s.owner.username.as_str()),
            Some("bob")
        );
        assert!(registry.get(&SessionId::new("nope")).is_none());
    }
}
