use serde::{Deserialize, Serialize};

/// Jobs per lifecycle state for one queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub pending: usize,
    pub processing: usize,
    pub resolved: usize,
    pub rejected: usize,
}

impl QueueCounts {
    pub fn total(&self) -> usize {
        self.pending + self.processing + self.resolved + self.rejected
    }
}
