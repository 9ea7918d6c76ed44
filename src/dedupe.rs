//! Inbound event duplicate check.
//!
//! Chat platforms redeliver events on reconnect, so the first step of the
//! control flow is a duplicate check against a bounded window of recently
//! seen event ids. Oldest ids fall out first; the window is a memory
//! bound, not a correctness guarantee — an id older than the window is
//! treated as fresh.

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

/// Default window size.
const DEFAULT_WINDOW: usize = 1024;

struct Inner {
    seen: HashSet<String>,
    order: VecDeque<String>,
}

/// Bounded window of recently observed event ids.
pub struct EventDeduper {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl Default for EventDeduper {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl EventDeduper {
    /// Create a window holding up to `capacity` ids (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                seen: HashSet::new(),
                order: VecDeque::new(),
            }),
            capacity: capacity.max(1),
        }
    }

    fn guard(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record an event id. Returns true if it is fresh, false if it was
    /// seen within the window (the caller drops the event).
    pub fn observe(&self, event_id: &str) -> bool {
        let mut inner = self.guard();
        if inner.seen.contains(event_id) {
            debug!(event_id = %event_id, "duplicate event dropped");
            return false;
        }

        if inner.order.len() >= self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.seen.remove(&oldest);
            }
        }
        inner.seen.insert(event_id.to_owned());
        inner.order.push_back(event_id.to_owned());
        true
    }

    /// Number of ids currently in the window.
    pub fn len(&self) -> usize {
        self.guard().order.len()
    }

    /// Whether the window is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
