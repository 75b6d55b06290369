use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

/// Transport-assigned identity of a connection.
pub type ConnectionId = u64;

/// Frames queued for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Ping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Queued,
    /// The writer is not keeping up; the queue is at capacity.
    Full,
    /// The writer task is gone.
    Closed,
}

/// One open transport session as seen by the relay.
pub struct Connection {
    id: ConnectionId,
    peer: Option<SocketAddr>,
    tx: mpsc::Sender<Outbound>,
    alive: AtomicBool,
    /// Name announced by the client's `auth` frame. Unverified.
    username: RwLock<Option<String>>,
    terminate: CancellationToken,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        peer: Option<SocketAddr>,
        tx: mpsc::Sender<Outbound>,
        terminate: CancellationToken,
    ) -> Self {
        Self {
            id,
            peer,
            tx,
            alive: AtomicBool::new(true),
            username: RwLock::new(None),
            terminate,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::Release);
    }

    pub fn username(&self) -> Option<String> {
        self.username
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn set_username(&self, username: Option<String>) {
        *self
            .username
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = username;
    }

    /// Open means the writer is still draining and nobody asked for termination.
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed() && !self.terminate.is_cancelled()
    }

    /// Queue a frame without waiting.
    pub fn send(&self, frame: Outbound) -> SendOutcome {
        match self.tx.try_send(frame) {
            Ok(()) => SendOutcome::Queued,
            Err(TrySendError::Full(_)) => SendOutcome::Full,
            Err(TrySendError::Closed(_)) => SendOutcome::Closed,
        }
    }

    /// Force-close: the connection task drops the socket without a close
    /// handshake. Idempotent.
    pub fn terminate(&self) {
        self.terminate.cancel();
    }

    pub fn termination(&self) -> &CancellationToken {
        &self.terminate
    }
}

/// What a [`Registry::for_each`] visitor wants done with the visited connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Keep,
    Remove,
}

/// Set of currently open connections.
///
/// Backed by a sharded map, so registration and removal can race with a
/// broadcast snapshot or a liveness sweep without a global lock. `slots`
/// counts registered connections and never exceeds `max`.
pub struct Registry {
    conns: DashMap<ConnectionId, Arc<Connection>>,
    next_id: AtomicU64,
    slots: AtomicUsize,
    max: usize,
}

impl Registry {
    /// A registry with no connection limit.
    pub fn new() -> Self {
        Self::with_capacity(usize::MAX)
    }

    /// A registry that refuses registrations beyond `max` connections.
    pub fn with_capacity(max: usize) -> Self {
        Self {
            conns: DashMap::new(),
            next_id: AtomicU64::new(1),
            slots: AtomicUsize::new(0),
            max,
        }
    }

    pub fn next_id(&self) -> ConnectionId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a connection, resetting it to alive.
    ///
    /// Returns false, leaving the registry untouched, when it already holds
    /// `max` connections. Re-registering a known id replaces it without
    /// taking another slot.
    pub fn register(&self, conn: Arc<Connection>) -> bool {
        match self.conns.entry(conn.id()) {
            Entry::Occupied(mut entry) => {
                conn.set_alive(true);
                entry.insert(conn);
                true
            }
            Entry::Vacant(entry) => {
                let reserved = self
                    .slots
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                        (n < self.max).then_some(n + 1)
                    })
                    .is_ok();
                if reserved {
                    conn.set_alive(true);
                    entry.insert(conn);
                }
                reserved
            }
        }
    }

    /// Remove a connection. Returns false if it was already gone.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        let removed = self.conns.remove(&id).is_some();
        if removed {
            self.slots.fetch_sub(1, Ordering::AcqRel);
        }
        removed
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.conns.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.conns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }

    /// Record a liveness acknowledgment. Returns false for unknown connections.
    pub fn mark_alive(&self, id: ConnectionId) -> bool {
        match self.conns.get(&id) {
            Some(entry) => {
                entry.value().set_alive(true);
                true
            }
            None => false,
        }
    }

    pub fn identify(&self, id: ConnectionId, username: Option<String>) -> bool {
        match self.conns.get(&id) {
            Some(entry) => {
                entry.value().set_username(username);
                true
            }
            None => false,
        }
    }

    /// Visit every connection; those the visitor marks [`Visit::Remove`] are
    /// dropped from the registry. Returns the number removed.
    ///
    /// Shard locks are held while the visitor runs, so it must not call back
    /// into the registry.
    pub fn for_each<F>(&self, mut visitor: F) -> usize
    where
        F: FnMut(&Connection) -> Visit,
    {
        let mut removed = 0;
        self.conns.retain(|_, conn| match visitor(conn) {
            Visit::Keep => true,
            Visit::Remove => {
                removed += 1;
                false
            }
        });
        if removed > 0 {
            self.slots.fetch_sub(removed, Ordering::AcqRel);
        }
        removed
    }

    /// Clone out the current set so a caller can send without holding any
    /// registry lock.
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.conns.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Terminate and drop every connection.
    pub fn terminate_all(&self) -> usize {
        self.for_each(|conn| {
            conn.terminate();
            Visit::Remove
        })
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
