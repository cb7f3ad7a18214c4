//! Session State Store
//!
//! Holds the authoritative snapshot of one session. Any number of readers may
//! take snapshots or listen for [`StoreChange`] notifications; mutation is
//! crate-private and performed only by the session controller.

use chrono::Utc;
use log::{debug, warn};
use parking_lot::RwLock;
use tokio::sync::broadcast;

use super::state::{SessionSnapshot, SessionStatus};
use crate::events::ProgressUpdate;
use crate::types::SessionId;

/// Change notification sent after every applied mutation
#[derive(Debug, Clone, PartialEq)]
pub enum StoreChange {
    Status {
        old: SessionStatus,
        new: SessionStatus,
    },
    Progress,
    ItemsAppended {
        added: usize,
        total: usize,
    },
    SessionId(SessionId),
    Error(String),
    Reset,
}

/// Reactive holder for one session's state
pub struct SessionStore<P, I> {
    inner: RwLock<SessionSnapshot<P, I>>,
    changes: broadcast::Sender<StoreChange>,
}

impl<P, I> SessionStore<P, I>
where
    P: ProgressUpdate,
    I: Clone,
{
    pub fn new(buffer: usize) -> Self {
        let (changes, _) = broadcast::channel(buffer.max(1));
        Self {
            inner: RwLock::new(SessionSnapshot::default()),
            changes,
        }
    }

    // Readers

    pub fn snapshot(&self) -> SessionSnapshot<P, I> {
        self.inner.read().clone()
    }

    /// Listen for changes; lagging receivers should re-read a snapshot
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.read().status
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.inner.read().session_id.clone()
    }

    pub fn error(&self) -> Option<String> {
        self.inner.read().error.clone()
    }

    pub fn progress(&self) -> P {
        self.inner.read().progress.clone()
    }

    pub fn item_count(&self) -> usize {
        self.inner.read().items.len()
    }

    /// Items delivered after the first `seen`, for incremental rendering
    pub fn items_since(&self, seen: usize) -> Vec<I> {
        let inner = self.inner.read();
        inner.items.get(seen..).map(<[I]>::to_vec).unwrap_or_default()
    }

    fn notify(&self, change: StoreChange) {
        // No receivers is fine
        let _ = self.changes.send(change);
    }

    // Mutations (controller only)

    /// Apply a status change if the lifecycle allows it
    pub(crate) fn set_status(&self, status: SessionStatus) -> bool {
        let old = {
            let mut inner = self.inner.write();
            let old = inner.status;
            if old == status {
                return true;
            }
            if !old.can_transition_to(status) {
                warn!("Ignoring status change {} -> {}", old, status);
                return false;
            }
            inner.status = status;
            inner.last_activity = Some(Utc::now());
            if status == SessionStatus::Running && inner.started_at.is_none() {
                inner.started_at = inner.last_activity;
            }
            old
        };

        debug!("Session status {} -> {}", old, status);
        self.notify(StoreChange::Status { old, new: status });
        true
    }

    pub(crate) fn merge_progress(&self, update: P) {
        {
            let mut inner = self.inner.write();
            inner.progress.merge(update);
            inner.last_activity = Some(Utc::now());
        }
        self.notify(StoreChange::Progress);
    }

    /// Append in the given order; returns the new total
    pub(crate) fn append_items(&self, items: Vec<I>) -> usize {
        if items.is_empty() {
            return self.item_count();
        }
        let added = items.len();
        let total = {
            let mut inner = self.inner.write();
            inner.items.extend(items);
            inner.last_activity = Some(Utc::now());
            inner.items.len()
        };
        self.notify(StoreChange::ItemsAppended { added, total });
        total
    }

    /// Record the host-assigned id. An id, once set, never changes.
    pub(crate) fn set_session_id(&self, id: SessionId) -> bool {
        {
            let mut inner = self.inner.write();
            if let Some(current) = inner.session_id.as_ref() {
                if *current == id {
                    return true;
                }
                warn!("Refusing to replace session id {} with {}", current, id);
                return false;
            }
            inner.session_id = Some(id.clone());
        }
        self.notify(StoreChange::SessionId(id));
        true
    }

    pub(crate) fn set_error(&self, message: impl Into<String>) {
        let message = message.into();
        {
            let mut inner = self.inner.write();
            inner.error = Some(message.clone());
            inner.last_activity = Some(Utc::now());
        }
        self.notify(StoreChange::Error(message));
    }

    /// Forget the previous session before a new `start`
    pub(crate) fn reset(&self) {
        *self.inner.write() = SessionSnapshot::default();
        self.notify(StoreChange::Reset);
    }
}

impl<P, I> std::fmt::Debug for SessionStore<P, I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("SessionStore")
            .field("session_id", &inner.session_id)
            .field("status", &inner.status)
            .field("items", &inner.items.len())
            .field("error", &inner.error)
            .finish()
    }
}
