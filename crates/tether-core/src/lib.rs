//! tether-core
//!
//! Bridges synchronous requests onto a job queue and back.
//!
//! A live request passing a [`app::QueueMiddleware`] is captured into a
//! [`domain::RequestSnapshot`], published as a job and held open until the
//! job settles or the queue's timeout fires. A worker leases the job,
//! rebuilds the request and replays it through the same [`pipeline::Pipeline`];
//! the replay marker makes the middleware step aside so the business logic
//! runs instead of being queued again.
//!
//! # Modules
//! - **domain**: ids, snapshots, job bodies, outcomes, queue naming, the reply cell
//! - **pipeline**: request/response/context and the middleware chain
//! - **ports**: the broker interface
//! - **queue**: job state, backoff, and the in-memory broker
//! - **app**: bridge, registry, dispatcher, middleware, processor, reconciler, workers
//! - **error**: error types

pub mod app;
pub mod domain;
pub mod error;
pub mod observability;
pub mod pipeline;
pub mod ports;
pub mod queue;

pub use app::{Bridge, QueueOptions, WorkerPool};
pub use pipeline::Pipeline;
