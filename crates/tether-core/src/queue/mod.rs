//! Queue module: job state, redelivery backoff, and the in-memory broker.

mod memory;
mod record;
mod retry;
mod state;

pub use memory::InMemoryBroker;
pub use record::JobRecord;
pub use retry::RetryPolicy;
pub use state::JobState;
