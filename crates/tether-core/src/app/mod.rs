//! App layer: wires the broker port, the pipeline and the domain together.
//!
//! # Components
//! - **Bridge / BridgeBuilder**: construction, broker source, per-route queue middleware
//! - **QueueRegistry**: one binding per queue name, announced to workers
//! - **Dispatcher**: publish + wait for the single outcome, with timeout
//! - **QueueMiddleware**: live requests dispatch, replayed requests pass through
//! - **ReplayProcessor**: worker-side replay and resolve/reject
//! - **Reconciler**: outcome -> response
//! - **WorkerPool**: consumers for every asserted queue

pub mod builder;
pub mod config;
pub mod dispatcher;
pub mod middleware;
pub mod processor;
pub mod reconciler;
pub mod registry;
pub mod worker_loop;

pub use self::builder::{Bridge, BridgeBuilder};
pub use self::config::{BridgeOptions, BridgeSettings, BrokerSettings, QueueOptions};
pub use self::dispatcher::Dispatcher;
pub use self::middleware::QueueMiddleware;
pub use self::processor::{JobHandler, ReplayProcessor};
pub use self::reconciler::{DefaultReconciler, Reconciler, reconcile};
pub use self::registry::{Queue, QueueRegistry};
pub use self::worker_loop::WorkerPool;
