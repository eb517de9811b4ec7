//! Job payload and status view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ids::JobId;
use super::queue_name::QueueName;
use super::snapshot::RequestSnapshot;
use crate::queue::JobState;

/// What travels through the broker for one deferred request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobBody {
    pub snapshot: RequestSnapshot,
    /// Application state restored on replay.
    pub state: Value,
}

impl JobBody {
    pub fn new(snapshot: RequestSnapshot) -> Self {
        let state = snapshot.state.clone();
        Self { snapshot, state }
    }
}

/// Serializable view of a job's progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_id: JobId,
    pub queue: QueueName,
    pub state: JobState,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
