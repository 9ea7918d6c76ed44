//! Shared vocabulary: priority tiers and task lifecycle states.
//!
//! Both are closed enums so illegal states are unrepresentable — there is
//! no "priority 4" and no free-form state string anywhere in the core.

use serde::{Deserialize, Serialize};

/// Urgency tier of a task or outbound message.
///
/// `Alpha` is the most urgent and is eligible for preemptive delivery
/// scheduling; `Beta` and `Gamma` share bandwidth round-robin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Critical — operator commands, security responses.
    Alpha,
    /// Operational — status and personnel traffic.
    Beta,
    /// Research — knowledge-base lookups, background answers.
    Gamma,
}

impl Priority {
    /// Numeric rank, 1 (most urgent) through 3.
    ///
    /// Queue insertion compares ranks: a smaller rank goes ahead of a
    /// larger one.
    pub fn rank(self) -> u8 {
        match self {
            Self::Alpha => 1,
            Self::Beta => 2,
            Self::Gamma => 3,
        }
    }

    /// Parse a numeric rank back into a tier. Returns `None` outside 1..=3.
    pub fn from_rank(rank: u8) -> Option<Self> {
        match rank {
            1 => Some(Self::Alpha),
            2 => Some(Self::Beta),
            3 => Some(Self::Gamma),
            _ => None,
        }
    }

    /// Uppercase label for operator-facing output.
    pub fn label(self) -> &'static str {
        match self {
            Self::Alpha => "ALPHA",
            Self::Beta => "BETA",
            Self::Gamma => "GAMMA",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Lifecycle state of a tracked task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Admitted, not yet picked up by the orchestrator.
    Pending,
    /// An AI turn is processing this task.
    Running,
    /// Parked by the orchestrator, may resume later.
    Shelved,
    /// Finished normally.
    Completed,
    /// Cancelled via the registry.
    Aborted,
}

impl TaskState {
    /// Whether the task still counts as in-flight for `list_active`.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Running | Self::Shelved)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Shelved => "SHELVED",
            Self::Completed => "COMPLETED",
            Self::Aborted => "ABORTED",
        };
        f.write_str(label)
    }
}
