//! Concurrent session map with expiry-on-access

use crate::session::state::{Session, SessionId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use metrics::counter;
use std::sync::Arc;
use tracing::debug;

/// Maps session ids to records.
///
/// Expired records are evicted by the lookup that finds them. The check and
/// the eviction happen under the shard lock for that id, so a concurrent
/// lookup of the same id can never observe the expired record.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<SessionId, Arc<Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: Arc<Session>) {
        self.sessions.insert(session.id().to_string(), session);
    }

    /// Find a live record, evicting it if it has expired
    pub fn lookup(&self, id: &str) -> Option<Arc<Session>> {
        self.lookup_at(id, Utc::now())
    }

    pub fn lookup_at(&self, id: &str, now: DateTime<Utc>) -> Option<Arc<Session>> {
        match self.sessions.entry(id.to_string()) {
            Entry::Occupied(entry) if entry.get().is_expired_at(now) => {
                entry.remove();
                counter!("tinytodo_sessions_expired_total").increment(1);
                debug!("Evicted expired session on lookup");
                None
            }
            Entry::Occupied(entry) => Some(entry.get().clone()),
            Entry::Vacant(_) => None,
        }
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.remove(id).map(|(_, session)| session)
    }

    /// Drop every expired record. Lookups already evict lazily, so this only
    /// reclaims memory held by sessions nobody presents again.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut purged = 0;
        self.sessions.retain(|_, session| {
            let keep = !session.is_expired_at(now);
            if !keep {
                purged += 1;
            }
            keep
        });
        if purged > 0 {
            counter!("tinytodo_sessions_expired_total").increment(purged as u64);
        }
        purged
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
