use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::OwnedSemaphorePermit;
use tokio_util::task::task_tracker::TaskTrackerToken;

lazy_static::lazy_static! {
  static ref NEXT_TASK_ID_COUNTER: AtomicU64 = AtomicU64::new(0);
}

/// The type of future the pool executes for async tasks.
pub type TaskFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// A unit of work accepted by the pool. The pool never inspects it; any
/// state the task captures belongs to the caller.
pub enum Task {
  /// Polled on the runtime's worker threads.
  Async(TaskFuture),
  /// Run on the runtime's blocking thread pool.
  Blocking(Box<dyn FnOnce() + Send + 'static>),
}

impl Task {
  pub fn from_future<F>(future: F) -> Self
  where
    F: Future<Output = ()> + Send + 'static,
  {
    Task::Async(Box::pin(future))
  }

  pub fn from_fn<F>(f: F) -> Self
  where
    F: FnOnce() + Send + 'static,
  {
    Task::Blocking(Box::new(f))
  }

  fn kind(&self) -> &'static str {
    match self {
      Task::Async(_) => "async",
      Task::Blocking(_) => "blocking",
    }
  }
}

impl fmt::Debug for Task {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("Task").field(&self.kind()).finish()
  }
}

pub(crate) fn next_task_id() -> u64 {
  NEXT_TASK_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A task travelling from `submit` to the dispatch loop, together with the
/// capacity permit it was granted.
pub(crate) struct AdmittedTask {
  pub(crate) task_id: u64,
  pub(crate) task: Task,
  pub(crate) permit: OwnedSemaphorePermit,
}

impl fmt::Debug for AdmittedTask {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("AdmittedTask")
      .field("task_id", &self.task_id)
      .field("task", &self.task)
      .finish_non_exhaustive()
  }
}

/// Held by a running task for its whole execution.
///
/// Fields drop in declaration order: the completion token is returned to the
/// tracker first, then the capacity permit goes back to the semaphore. This
/// happens on every exit path, including a recovered panic.
#[derive(Debug)]
pub(crate) struct ExecutionGuard {
  _completion: TaskTrackerToken,
  _permit: OwnedSemaphorePermit,
}

impl ExecutionGuard {
  pub(crate) fn new(completion: TaskTrackerToken, permit: OwnedSemaphorePermit) -> Self {
    Self {
      _completion: completion,
      _permit: permit,
    }
  }
}
