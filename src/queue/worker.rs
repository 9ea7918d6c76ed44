//! The delivery worker: a single cooperative background task.
//!
//! Each pass pops at most one eligible item and dispatches it —
//! moderation, then the platform send — before scanning again. When
//! nothing is eligible
//! the worker sleeps one tick, which is also where it observes shutdown.
//! Because there is exactly one worker and it never dispatches two items
//! concurrently, the send order observed by the platform is strictly
//! sequential.
//!
//! A failed dispatch is one structured log record; the item is dropped
//! (no retry) and the loop continues. Nothing a sender or moderator does
//! can take the worker down.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, warn};

use super::{DeliveryQueue, SendItem};
use crate::moderation::{ModerationStage, Moderator};
use crate::sender::Sender;

/// Fixed text delivered in place of a blocked message. The platform gets
/// a response either way: delivery never fails silently, and blocked
/// content never leaves the process.
pub const REFUSAL_TEXT: &str = "Computer: Unable to comply.";

/// Run the delivery loop until shutdown is signalled.
///
/// Spawned by [`DeliveryQueue::start`]; not intended to be called
/// directly outside of tests.
pub(crate) async fn run(
    queue: Arc<DeliveryQueue>,
    moderator: Arc<dyn Moderator>,
    sender: Arc<dyn Sender>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let tick = queue.config().tick_interval();
    info!(tick_ms = queue.config().tick_ms, "delivery worker started");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        match queue.next_eligible() {
            Some(item) => dispatch(moderator.as_ref(), sender.as_ref(), item).await,
            None => {
                tokio::select! {
                    _ = tokio::time::sleep(tick) => {}
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        }
    }

    info!("delivery worker stopped");
}

/// One delivery attempt: moderate, substitute on block, send, drop on error.
async fn dispatch(moderator: &dyn Moderator, sender: &dyn Sender, item: SendItem) {
    let verdict = moderator
        .check(&item.text, ModerationStage::Output, &item.metadata)
        .await;

    let text = if verdict.allow {
        item.text.as_str()
    } else {
        warn!(
            item_id = %item.id,
            conversation_key = %item.conversation_key,
            reason = %verdict.reason,
            provider = %verdict.provider,
            "outbound text blocked, delivering refusal instead"
        );
        REFUSAL_TEXT
    };

    if let Err(e) = sender
        .send(text, &item.metadata, &item.id, &verdict)
        .await
    {
        error!(
            item_id = %item.id,
            conversation_key = %item.conversation_key,
            provider = %verdict.provider,
            error = %e,
            "delivery failed, dropping item"
        );
    }
}
