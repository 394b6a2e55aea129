//! Broadcast hub: the set of live push connections.
//!
//! Each connection is a bounded outbox drained by its socket task (see
//! `ws.rs`). Messages are serialized once and shared as `Arc<str>`. A closed
//! outbox means the socket task has ended, and a full one means the client
//! stopped reading; either way the member is dropped on that delivery
//! attempt. Dropping the sender ends the socket task, which also
//! unregisters itself on exit.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tracing::{debug, error, warn};

use super::snapshot::{Snapshot, SnapshotCache};
use super::ws::WsMessage;

pub type ConnectionId = u64;

/// Serialized frame shared by every recipient.
pub type Frame = Arc<str>;

/// Frames a connection may have queued before it counts as stalled.
pub const OUTBOX_CAPACITY: usize = 64;

struct Members {
    outboxes: HashMap<ConnectionId, mpsc::Sender<Frame>>,
    /// The snapshot `snapshot_frame` was serialized from.
    framed: Snapshot,
    /// Serialized `issues_updated` frame for `framed`.
    snapshot_frame: Frame,
}

struct HubInner {
    cache: SnapshotCache,
    members: Mutex<Members>,
    next_id: AtomicU64,
}

#[derive(Clone)]
pub struct BroadcastHub {
    inner: Arc<HubInner>,
}

impl BroadcastHub {
    pub fn new(cache: SnapshotCache) -> Self {
        let framed = cache.current();
        let snapshot_frame = snapshot_frame(&framed);
        Self {
            inner: Arc::new(HubInner {
                cache,
                members: Mutex::new(Members {
                    outboxes: HashMap::new(),
                    framed,
                    snapshot_frame,
                }),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// The snapshot most recently published.
    pub fn current_snapshot(&self) -> Snapshot {
        self.inner.cache.current()
    }

    /// Observe every snapshot replacement.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.inner.cache.subscribe()
    }

    /// Add a connection. The returned receiver already holds the current
    /// snapshot, queued ahead of any later broadcast.
    pub fn register(&self) -> (ConnectionId, mpsc::Receiver<Frame>) {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(OUTBOX_CAPACITY);

        let mut members = self.lock();
        // The cache is shared with whoever built the hub; reframe if it was
        // replaced without going through `publish_snapshot`.
        let current = self.inner.cache.current();
        if !Arc::ptr_eq(&current, &members.framed) {
            members.snapshot_frame = snapshot_frame(&current);
            members.framed = current;
        }
        // The receiver is alive and empty here, so this cannot fail.
        let _ = tx.try_send(members.snapshot_frame.clone());
        members.outboxes.insert(id, tx);
        debug!(connection = id, members = members.outboxes.len(), "client registered");
        (id, rx)
    }

    /// Remove a connection. Returns false if it was already gone.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        let mut members = self.lock();
        let removed = members.outboxes.remove(&id).is_some();
        if removed {
            debug!(connection = id, members = members.outboxes.len(), "client unregistered");
        }
        removed
    }

    /// Send `msg` to every live connection, returning how many accepted it.
    pub fn broadcast(&self, msg: &WsMessage) -> usize {
        let Some(frame) = serialize(msg) else {
            return 0;
        };
        let mut members = self.lock();
        deliver(&mut members, &frame)
    }

    /// Replace the cached snapshot and push it to every connection.
    ///
    /// The swap and the fan-out happen under the membership lock, so a
    /// client registering concurrently gets either the old snapshot followed
    /// by this broadcast, or the new snapshot alone.
    pub fn publish_snapshot(&self, snapshot: Snapshot) -> usize {
        let Some(frame) = serialize(&WsMessage::IssuesUpdated(snapshot.clone())) else {
            return 0;
        };
        let mut members = self.lock();
        self.inner.cache.replace(snapshot.clone());
        members.framed = snapshot;
        members.snapshot_frame = frame.clone();
        deliver(&mut members, &frame)
    }

    pub fn connection_count(&self) -> usize {
        self.lock().outboxes.len()
    }

    pub fn is_registered(&self, id: ConnectionId) -> bool {
        self.lock().outboxes.contains_key(&id)
    }

    fn lock(&self) -> MutexGuard<'_, Members> {
        self.inner
            .members
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn deliver(members: &mut Members, frame: &Frame) -> usize {
    members.outboxes.retain(|id, tx| match tx.try_send(frame.clone()) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!(connection = *id, queued = OUTBOX_CAPACITY, "dropping stalled connection");
            false
        }
        Err(TrySendError::Closed(_)) => {
            warn!(connection = *id, "dropping closed connection");
            false
        }
    });
    members.outboxes.len()
}

fn snapshot_frame(snapshot: &Snapshot) -> Frame {
    serialize(&WsMessage::IssuesUpdated(snapshot.clone()))
        .unwrap_or_else(|| Arc::from(r#"{"type":"issues_updated","data":[]}"#))
}

fn serialize(msg: &WsMessage) -> Option<Frame> {
    match serde_json::to_string(msg) {
        Ok(json) => Some(Arc::from(json)),
        Err(e) => {
            error!(error = %e, "failed to serialize push message");
            None
        }
    }
}
