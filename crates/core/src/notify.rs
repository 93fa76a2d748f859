//! Process-wide change notifications for persisted state.
//!
//! The storage layer fires one notification per successful snapshot or queue
//! persist, scoped by user id. Delivery is fire-and-forget: late subscribers
//! simply re-read state the next time they need it.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

/// One persisted-state change, scoped to a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub user_id: String,
}

/// Publish/subscribe hub for state change notifications.
///
/// A multi-step operation can open a batch scope for a user to suppress the
/// per-save notification storm; a single forced notification fires when the
/// scope closes.
pub struct ChangeNotifier {
    tx: broadcast::Sender<StateChange>,
    // user_id -> open batch scopes
    suppressed: Mutex<HashMap<String, usize>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            suppressed: Mutex::new(HashMap::new()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.tx.subscribe()
    }

    /// Notify observers of a change to this user's persisted state.
    ///
    /// Suppressed while the user has an open batch scope; send errors (no
    /// live subscribers) are ignored.
    pub fn notify(&self, user_id: &str) {
        let suppressed = self
            .suppressed
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if suppressed.get(user_id).copied().unwrap_or(0) > 0 {
            return;
        }
        drop(suppressed);
        self.send(user_id);
    }

    /// Open a batch scope for `user_id`. Notifications for that user are
    /// suppressed until the returned guard drops, at which point exactly one
    /// notification fires. Scopes nest; only the outermost exit notifies.
    pub fn batch<'a>(&'a self, user_id: &str) -> NotificationBatch<'a> {
        let mut suppressed = self
            .suppressed
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *suppressed.entry(user_id.to_string()).or_insert(0) += 1;
        NotificationBatch {
            notifier: self,
            user_id: user_id.to_string(),
        }
    }

    fn send(&self, user_id: &str) {
        let _ = self.tx.send(StateChange {
            user_id: user_id.to_string(),
        });
    }

    fn end_batch(&self, user_id: &str) {
        let mut suppressed = self
            .suppressed
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let finished = match suppressed.get_mut(user_id) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count == 0
            }
            None => false,
        };
        if finished {
            suppressed.remove(user_id);
            drop(suppressed);
            self.send(user_id);
        }
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped suppression window returned by [`ChangeNotifier::batch`].
pub struct NotificationBatch<'a> {
    notifier: &'a ChangeNotifier,
    user_id: String,
}

impl Drop for NotificationBatch<'_> {
    fn drop(&mut self) {
        self.notifier.end_batch(&self.user_id);
    }
}
