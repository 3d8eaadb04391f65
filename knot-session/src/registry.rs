//! Session registry — the authoritative peer-id → session-state map.
//!
//! Entries are stored as plain value snapshots. Writers (`upsert`,
//! `remove`) run only on the dispatch consumer thread; readers clone the
//! snapshot out under a short read lock, so application handlers never
//! hold references into live mutable state and torn reads are impossible.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::error::SessionError;
use crate::event::{ConnectionStatus, PeerId, UserStatus};

/// Immutable snapshot of one peer's session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerSnapshot {
    pub id: PeerId,
    pub connection: ConnectionStatus,
    /// Display name, absent until the peer first announces one.
    pub name: Option<String>,
    pub status_message: Option<String>,
    pub user_status: UserStatus,
    /// When any field (or activity) last changed.
    pub last_update: DateTime<Utc>,
}

impl PeerSnapshot {
    fn new(id: PeerId) -> Self {
        Self {
            id,
            connection: ConnectionStatus::Offline,
            name: None,
            status_message: None,
            user_status: UserStatus::Available,
            last_update: Utc::now(),
        }
    }
}

/// Partial update applied by `upsert`. Unset fields keep their value.
#[derive(Debug, Clone, Default)]
pub struct PeerUpdate {
    pub connection: Option<ConnectionStatus>,
    pub name: Option<String>,
    pub status_message: Option<String>,
    pub user_status: Option<UserStatus>,
}

impl PeerUpdate {
    pub fn connection(status: ConnectionStatus) -> Self {
        Self {
            connection: Some(status),
            ..Self::default()
        }
    }

    pub fn name(name: String) -> Self {
        Self {
            name: Some(name),
            ..Self::default()
        }
    }

    pub fn status_message(message: String) -> Self {
        Self {
            status_message: Some(message),
            ..Self::default()
        }
    }

    pub fn user_status(status: UserStatus) -> Self {
        Self {
            user_status: Some(status),
            ..Self::default()
        }
    }

    /// An empty update — creates the entry if missing and refreshes
    /// `last_update` (used for message activity).
    pub fn touch() -> Self {
        Self::default()
    }
}

#[derive(Default)]
struct Inner {
    peers: HashMap<PeerId, PeerSnapshot>,
    /// Identifiers that have been removed. Never leave this set, so an id
    /// cannot be resurrected within the process lifetime.
    tombstones: HashSet<PeerId>,
}

/// Map from peer identifier to [`PeerSnapshot`].
#[derive(Default)]
pub struct SessionRegistry {
    inner: RwLock<Inner>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create-or-update the entry for `id` and return the resulting
    /// snapshot. Tombstoned identifiers are rejected.
    pub fn upsert(&self, id: PeerId, update: PeerUpdate) -> Result<PeerSnapshot, SessionError> {
        let mut inner = self.inner.write();
        if inner.tombstones.contains(&id) {
            return Err(SessionError::PeerNotFound(id));
        }
        let entry = inner.peers.entry(id).or_insert_with(|| PeerSnapshot::new(id));
        if let Some(connection) = update.connection {
            entry.connection = connection;
        }
        if let Some(name) = update.name {
            entry.name = Some(name);
        }
        if let Some(message) = update.status_message {
            entry.status_message = Some(message);
        }
        if let Some(status) = update.user_status {
            entry.user_status = status;
        }
        entry.last_update = Utc::now();
        Ok(entry.clone())
    }

    /// Current snapshot for `id`, or [`SessionError::PeerNotFound`].
    pub fn get(&self, id: PeerId) -> Result<PeerSnapshot, SessionError> {
        self.inner
            .read()
            .peers
            .get(&id)
            .cloned()
            .ok_or(SessionError::PeerNotFound(id))
    }

    /// Tombstone the entry for `id`. The identifier can never be upserted
    /// again, whether or not a live entry existed; the error only reports
    /// that there was nothing to remove.
    pub fn remove(&self, id: PeerId) -> Result<(), SessionError> {
        let mut inner = self.inner.write();
        let existed = inner.peers.remove(&id).is_some();
        inner.tombstones.insert(id);
        if existed {
            Ok(())
        } else {
            Err(SessionError::PeerNotFound(id))
        }
    }

    /// Snapshot of every live peer, unordered.
    pub fn peers(&self) -> Vec<PeerSnapshot> {
        self.inner.read().peers.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().peers.is_empty()
    }
}
