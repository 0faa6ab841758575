//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Session registry
//!
//! The Registry is responsible for:
//! - Assigning session IDs
//! - Tracking the sessions that completed their handshake
//! - Handing out point-in-time snapshots for broadcasts and rosters

use crate::{Session, SessionId};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Concurrency-safe set of active sessions
///
/// Locking is confined to the DashMap shard touched by each call; nothing
/// is held once a method returns.
pub struct Registry {
    /// Active sessions (sharded concurrent map)
    sessions: DashMap<SessionId, Arc<Session>>,
    /// Next session ID (monotonically increasing)
    next_id: AtomicU64,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create an empty registry whose first ID is 1
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Reserve the next session ID
    pub fn next_id(&self) -> SessionId {
        SessionId::new(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Register a session
    ///
    /// Returns `false` without replacing anything if the ID is already
    /// registered.
    pub fn add(&self, session: Arc<Session>) -> bool {
        match self.sessions.entry(session.id()) {
            Entry::Occupied(entry) => {
                warn!(session_id = %entry.key(), "Session already registered");
                false
            }
            Entry::Vacant(entry) => {
                debug!(session_id = %session.id(), "Session registered");
                entry.insert(session);
                true
            }
        }
    }

    /// Unregister a session, returning it if it was present
    pub fn remove(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.remove(&id).map(|(_, session)| session)
    }

    /// Look up a registered session
    pub fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.get(&id).map(|entry| entry.value().clone())
    }

    /// Check whether a session is registered
    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Copy of the current membership, ordered by ID
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        let mut sessions: Vec<_> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        sessions.sort_by_key(|session| session.id());
        sessions
    }

    /// Get the number of registered sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Check if no session is registered
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("session_count", &self.len())
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish()
    }
}
