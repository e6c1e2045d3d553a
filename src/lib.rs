//! A Tokio-based bounded worker pool with admission timeouts, per-task panic
//! isolation, and a graceful drain-to-completion shutdown.

mod bus;
mod error;
mod logger;
mod options;
mod pool;
mod recovery;
mod task;

pub use bus::{EventBus, EventHandler};
pub use error::PoolError;
pub use logger::{Logger, TracingLogger};
pub use options::{PoolOptions, DEFAULT_CAPACITY, DEFAULT_SUBMIT_TIMEOUT, MAX_CAPACITY};
pub use pool::WorkerPool;
pub use task::{Task, TaskFuture};
