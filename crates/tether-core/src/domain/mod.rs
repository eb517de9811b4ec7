//! Domain model: ids, snapshots, job payloads, outcomes, queue naming.

pub mod ids;
pub mod job;
pub mod outcome;
pub mod queue_config;
pub mod queue_name;
pub mod settlement;
pub mod snapshot;

pub use ids::{BridgeId, JobId};
pub use job::{JobBody, JobStatus};
pub use outcome::{Failure, JobOutcome, Reply, RetryDirective};
pub use queue_config::QueueConfig;
pub use queue_name::{NamingMode, QueueName, resolve_name, slugify};
pub use settlement::OutcomeCell;
pub use snapshot::RequestSnapshot;
