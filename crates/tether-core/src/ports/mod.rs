//! Ports: interfaces to collaborators the bridge does not own.

pub mod broker;

pub use self::broker::{Broker, JobLease};
