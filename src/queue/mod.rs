//! Priority-aware, rate-limited outbound delivery queue.
//!
//! Multiplexes many conversations' outbound messages onto a single
//! delivery path. Each conversation holds an ordered queue; one background
//! worker ([`worker`]) drains them under a global rate ceiling and a
//! per-conversation cooldown, with `ALPHA` items preempting the scan
//! order.
//!
//! The queue is a single-instance service object. Enqueue never blocks:
//! a conversation at capacity rejects with [`EnqueueError::QueueFull`]
//! and the caller decides whether to surface that.

pub mod worker;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::DeliveryConfig;
use crate::moderation::Moderator;
use crate::sender::Sender;
use crate::types::Priority;

/// A queued, ready-to-deliver piece of outbound content.
///
/// Owned by its conversation's queue from enqueue until the worker pops
/// it; destroyed after one delivery attempt, success or failure. Aborting
/// the task that produced it does not retract it.
#[derive(Debug, Clone)]
pub struct SendItem {
    /// Opaque item identifier (uuid v4).
    pub id: String,
    /// Conversation the item belongs to.
    pub conversation_key: String,
    /// Outbound text, pre-moderation.
    pub text: String,
    /// Opaque routing payload handed through to the sender.
    pub metadata: serde_json::Value,
    /// Urgency tier.
    pub priority: Priority,
    /// When the item was enqueued.
    pub created_at: DateTime<Utc>,
}

/// Synchronous acknowledgment of an accepted enqueue.
#[derive(Debug, Clone, Serialize)]
pub struct EnqueueReceipt {
    /// Id of the accepted item.
    pub id: String,
    /// Conversation it was queued under.
    pub conversation_key: String,
    /// Queue depth for that conversation after insertion.
    pub queue_len: usize,
}

/// Admission failure. Reported synchronously; the item was not queued.
#[derive(Debug, Error)]
pub enum EnqueueError {
    /// The conversation's queue is at capacity.
    #[error("delivery queue full for conversation {conversation_key} (capacity {capacity})")]
    QueueFull {
        /// Conversation whose queue is full.
        conversation_key: String,
        /// The configured per-conversation capacity.
        capacity: usize,
    },
}

/// Queue depth of one conversation, for the status snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationDepth {
    /// Conversation key.
    pub conversation_key: String,
    /// Items currently queued.
    pub queued: usize,
}

/// Point-in-time introspection snapshot for operators.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    /// Items queued across all conversations.
    pub total_queued: usize,
    /// Conversations with a queue (empty or not).
    pub conversation_count: usize,
    /// Per-conversation depths, first 20 conversations in scan order.
    pub conversations: Vec<ConversationDepth>,
    /// Configured global rate ceiling, messages per second.
    pub global_rps: f64,
    /// Configured per-conversation cooldown in milliseconds.
    pub cooldown_ms: u64,
    /// Configured per-conversation capacity.
    pub max_queue_per_conversation: usize,
}

/// How many conversations the status snapshot lists individually.
const STATUS_CONVERSATION_LIMIT: usize = 20;

struct QueueState {
    /// Ordered items per conversation.
    queues: HashMap<String, VecDeque<SendItem>>,
    /// Conversation keys in first-enqueue order. Both worker sweeps
    /// iterate this, so the scan bias is explicit policy: the
    /// earliest-seen conversation wins ties under contention.
    scan_order: Vec<String>,
    /// Last dispatch per conversation.
    last_sent: HashMap<String, Instant>,
    /// Last dispatch across all conversations.
    global_last_sent: Option<Instant>,
}

/// Multi-conversation outbound mailbox with one background worker.
pub struct DeliveryQueue {
    config: DeliveryConfig,
    state: Mutex<QueueState>,
    shutdown_tx: watch::Sender<bool>,
    worker_started: AtomicBool,
}

impl DeliveryQueue {
    /// Create a queue with the given delivery configuration.
    pub fn new(config: DeliveryConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            state: Mutex::new(QueueState {
                queues: HashMap::new(),
                scan_order: Vec::new(),
                last_sent: HashMap::new(),
                global_last_sent: None,
            }),
            shutdown_tx,
            worker_started: AtomicBool::new(false),
        }
    }

    /// The delivery configuration this queue runs under.
    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    fn guard(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue outbound text for a conversation.
    ///
    /// Items are inserted ahead of the first queued item with a lower
    /// urgency (numerically greater priority rank), so each priority band
    /// stays FIFO and higher bands always drain first. The linear scan is
    /// fine at the bounded capacities involved. Routine responses go out
    /// at [`Priority::Gamma`].
    ///
    /// # Errors
    ///
    /// [`EnqueueError::QueueFull`] when the conversation is at capacity;
    /// the call never blocks.
    pub fn enqueue(
        &self,
        conversation_key: &str,
        text: &str,
        metadata: serde_json::Value,
        priority: Priority,
    ) -> Result<EnqueueReceipt, EnqueueError> {
        let capacity = self.config.max_queue_per_conversation;
        let mut state = self.guard();

        if !state.queues.contains_key(conversation_key) {
            state.scan_order.push(conversation_key.to_owned());
        }
        let queue = state.queues.entry(conversation_key.to_owned()).or_default();

        if queue.len() >= capacity {
            warn!(
                conversation_key = %conversation_key,
                capacity,
                "delivery queue full, rejecting message"
            );
            return Err(EnqueueError::QueueFull {
                conversation_key: conversation_key.to_owned(),
                capacity,
            });
        }

        let item = SendItem {
            id: Uuid::new_v4().to_string(),
            conversation_key: conversation_key.to_owned(),
            text: text.to_owned(),
            metadata,
            priority,
            created_at: Utc::now(),
        };
        let id = item.id.clone();

        let position = queue
            .iter()
            .position(|queued| queued.priority.rank() > priority.rank());
        match position {
            Some(index) => queue.insert(index, item),
            None => queue.push_back(item),
        }

        let queue_len = queue.len();
        debug!(
            conversation_key = %conversation_key,
            item_id = %id,
            priority = %priority,
            queue_len,
            "message enqueued"
        );
        Ok(EnqueueReceipt {
            id,
            conversation_key: conversation_key.to_owned(),
            queue_len,
        })
    }

    /// Point-in-time snapshot of queue depths and rate configuration.
    pub fn status(&self) -> QueueStatus {
        let state = self.guard();
        let conversations = state
            .scan_order
            .iter()
            .take(STATUS_CONVERSATION_LIMIT)
            .map(|key| ConversationDepth {
                conversation_key: key.clone(),
                queued: state.queues.get(key).map_or(0, VecDeque::len),
            })
            .collect();
        QueueStatus {
            total_queued: state.queues.values().map(VecDeque::len).sum(),
            conversation_count: state.queues.len(),
            conversations,
            global_rps: self.config.global_rps,
            cooldown_ms: self.config.cooldown_ms,
            max_queue_per_conversation: self.config.max_queue_per_conversation,
        }
    }

    /// Pop the next item eligible for dispatch, stamping the rate-limit
    /// timestamps at pop time.
    ///
    /// Two sweeps over the scan order: first any conversation whose head
    /// item is `ALPHA` (gated only by the global interval), then the fair
    /// sweep (gated by the conversation cooldown and the global
    /// interval). Returns `None` when nothing is eligible this tick.
    pub(crate) fn next_eligible(&self) -> Option<SendItem> {
        let now = Instant::now();
        let global_interval = self.config.global_interval();
        let cooldown = self.config.cooldown();
        let mut state = self.guard();

        let global_ok = state
            .global_last_sent
            .is_none_or(|last| now.duration_since(last) >= global_interval);
        if !global_ok {
            return None;
        }

        // ALPHA sweep: head-of-queue urgency preempts fairness and skips
        // the conversation cooldown.
        let alpha_key = state.scan_order.iter().find(|key| {
            state
                .queues
                .get(key.as_str())
                .and_then(VecDeque::front)
                .is_some_and(|item| item.priority == Priority::Alpha)
        });
        if let Some(key) = alpha_key.cloned() {
            return Self::pop_head(&mut state, &key, now);
        }

        // Fair sweep: first-enqueue order, one item from the first
        // conversation whose cooldown has elapsed.
        let fair_key = state.scan_order.iter().find(|key| {
            let non_empty = state
                .queues
                .get(key.as_str())
                .is_some_and(|q| !q.is_empty());
            let cooled = state
                .last_sent
                .get(key.as_str())
                .is_none_or(|last| now.duration_since(*last) >= cooldown);
            non_empty && cooled
        });
        if let Some(key) = fair_key.cloned() {
            return Self::pop_head(&mut state, &key, now);
        }

        None
    }

    fn pop_head(state: &mut QueueState, key: &str, now: Instant) -> Option<SendItem> {
        let item = state.queues.get_mut(key)?.pop_front()?;
        state.last_sent.insert(key.to_owned(), now);
        state.global_last_sent = Some(now);
        Some(item)
    }

    /// Spawn the single background worker.
    ///
    /// There is exactly one worker per queue: dispatches are strictly
    /// sequential, which is what makes send ordering observable by the
    /// platform well-defined. A second call is refused and returns
    /// `None`.
    pub fn start(
        self: &Arc<Self>,
        moderator: Arc<dyn Moderator>,
        sender: Arc<dyn Sender>,
    ) -> Option<JoinHandle<()>> {
        if self.worker_started.swap(true, Ordering::SeqCst) {
            warn!("delivery worker already started, ignoring");
            return None;
        }
        let queue = Arc::clone(self);
        let shutdown_rx = self.shutdown_tx.subscribe();
        Some(tokio::spawn(worker::run(queue, moderator, sender, shutdown_rx)))
    }

    /// Signal the worker to shut down.
    ///
    /// Cooperative: the worker observes the signal between ticks and
    /// exits after finishing any in-flight dispatch.
    pub fn stop(&self) {
        info!("delivery queue stop requested");
        let _ = self.shutdown_tx.send(true);
    }
}
