//! Per-conversation mutual exclusion for the processing stage.
//!
//! At most one AI turn runs per conversation at a time: a second
//! concurrent turn would race on conversation-scoped mutable state (mode
//! flags, pagination cursors) held by the orchestrator. Overlapping events
//! are dropped, not queued — queued turns would produce stale responses
//! arriving after newer ones.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::{Mutex as TurnLock, OwnedMutexGuard};
use tracing::debug;

/// The conversation already has a turn in flight.
///
/// This is a signal, not a fault: the caller is expected to drop the
/// triggering event.
#[derive(Debug, Error)]
#[error("conversation {conversation_id} already has a turn in flight")]
pub struct SessionBusy {
    /// Conversation whose lock was held.
    pub conversation_id: String,
}

/// Scoped permit for one processing turn.
///
/// Releases the conversation's lock on drop, on every exit path —
/// normal completion, error, or cancellation of the holding task.
#[derive(Debug)]
pub struct SessionGuard {
    conversation_id: String,
    _permit: OwnedMutexGuard<()>,
}

impl SessionGuard {
    /// Conversation this guard serializes.
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        debug!(conversation_id = %self.conversation_id, "processing turn released");
    }
}

/// Per-conversation exclusive gate for the processing stage.
///
/// Locks are created lazily on first use and kept for the life of the
/// process. The outer map guard covers only the entry lookup, so creating
/// one conversation's lock never contends with another conversation's
/// acquisition.
#[derive(Debug, Default)]
pub struct SessionGate {
    locks: Mutex<HashMap<String, Arc<TurnLock<()>>>>,
}

impl SessionGate {
    /// Create an empty gate.
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, HashMap<String, Arc<TurnLock<()>>>> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Try to claim the processing turn for a conversation.
    ///
    /// Non-blocking: if the lock is already held this returns
    /// [`SessionBusy`] immediately and the caller drops the event.
    pub fn try_acquire(&self, conversation_id: &str) -> Result<SessionGuard, SessionBusy> {
        let lock = {
            let mut map = self.map();
            Arc::clone(map.entry(conversation_id.to_owned()).or_default())
        };

        match lock.try_lock_owned() {
            Ok(permit) => {
                debug!(conversation_id = %conversation_id, "processing turn acquired");
                Ok(SessionGuard {
                    conversation_id: conversation_id.to_owned(),
                    _permit: permit,
                })
            }
            Err(_) => Err(SessionBusy {
                conversation_id: conversation_id.to_owned(),
            }),
        }
    }

    /// Whether a conversation currently has a turn in flight.
    pub fn held(&self, conversation_id: &str) -> bool {
        let lock = {
            let map = self.map();
            map.get(conversation_id).map(Arc::clone)
        };
        match lock {
            Some(lock) => lock.try_lock().is_err(),
            None => false,
        }
    }
}
