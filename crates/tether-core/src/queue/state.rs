//! Job state machine for the queue.

use serde::{Deserialize, Serialize};

/// Job lifecycle.
///
/// - Pending -> Processing -> Resolved
/// - Pending -> Processing -> Rejected
/// - Pending -> Processing -> Pending (rejected with redelivery, after backoff)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting for a worker (possibly delayed by backoff).
    Pending,

    /// Leased by a worker.
    Processing,

    Resolved,

    /// Failed with no redelivery left.
    Rejected,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Resolved | JobState::Rejected)
    }

    pub fn is_runnable(self) -> bool {
        matches!(self, JobState::Pending)
    }
}
