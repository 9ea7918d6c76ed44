//! odn — the concurrency and scheduling core of a conversational AI agent.
//!
//! Routes admitted requests through a per-conversation processing gate and
//! schedules the resulting outbound messages onto a single rate-limited
//! delivery path. Three service objects, constructed once at process start
//! and handed to the orchestrator by reference:
//!
//! - [`registry::TaskRegistry`] — lifecycle bookkeeping for admitted work
//! - [`gate::SessionGate`] — one AI turn at a time per conversation
//! - [`queue::DeliveryQueue`] — priority-ordered, rate-limited outbound
//!   mailbox with one background worker
//!
//! Platform I/O and text moderation are external collaborators behind the
//! [`sender::Sender`] and [`moderation::Moderator`] traits.
//!
//! Single process, in-memory only. Delivery is at-most-once: a failed send
//! is logged and dropped, never retried.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod dedupe;
pub mod gate;
pub mod logging;
pub mod moderation;
pub mod queue;
pub mod registry;
pub mod sender;
pub mod types;
