//! # Session Table
//!
//! Per-entity state keyed by identity.
//!
//! ## Locking
//!
//! ```text
//! DashMap (sharded)           per-entity Mutex
//! ┌───────────────┐           ┌─────────────┐
//! │ shard 0 ──────┼──► Arc ──►│ SessionState│  held for one update
//! │ shard 1       │           └─────────────┘
//! │ ...           │
//! └───────────────┘
//! ```
//!
//! The shard lock is only held long enough to clone the session handle, so
//! two entities never contend on an update. The per-entity mutex serializes
//! every update for one entity regardless of which thread delivers it.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::EntityId;

/// Concurrent table of per-entity sessions.
pub struct SessionTable<S> {
    sessions: DashMap<EntityId, Arc<Mutex<S>>>,
}

impl<S> SessionTable<S> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Runs `update` with exclusive access to `entity`'s session, creating it
    /// with `init` on first sight.
    pub fn with_session<R>(
        &self,
        entity: EntityId,
        init: impl FnOnce() -> S,
        update: impl FnOnce(&mut S) -> R,
    ) -> R {
        let handle = Arc::clone(
            self.sessions
                .entry(entity)
                .or_insert_with(|| Arc::new(Mutex::new(init())))
                .value(),
        );
        let mut session = handle.lock();
        update(&mut session)
    }

    /// Runs `read` against an existing session, or returns `None`.
    pub fn with_existing<R>(&self, entity: EntityId, read: impl FnOnce(&mut S) -> R) -> Option<R> {
        let handle = self.sessions.get(&entity).map(|entry| Arc::clone(entry.value()))?;
        let mut session = handle.lock();
        Some(read(&mut session))
    }

    /// Discards `entity`'s session. Returns true if one existed.
    pub fn remove(&self, entity: EntityId) -> bool {
        self.sessions.remove(&entity).is_some()
    }

    /// Returns true if `entity` has a session.
    #[must_use]
    pub fn contains(&self, entity: EntityId) -> bool {
        self.sessions.contains_key(&entity)
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns true if no sessions are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Discards every session.
    pub fn clear(&self) {
        self.sessions.clear();
    }
}

impl<S> Default for SessionTable<S> {
    fn default() -> Self {
        Self::new()
    }
}
