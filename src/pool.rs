use crate::error::PoolError;
use crate::logger::Logger;
use crate::options::PoolOptions;
use crate::recovery::{self, PanicCaptureScope};
use crate::task::{next_task_id, AdmittedTask, ExecutionGuard, Task};

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::poll_fn;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle as TokioHandle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info_span, trace, Instrument};

/// A bounded worker pool.
///
/// At most `capacity` tasks run at once. `submit` waits up to the configured
/// submit timeout for a free slot, then hands the task to a background
/// dispatch loop which launches it on its own Tokio task. A panic inside a
/// task is caught and reported; it never reaches the pool or other tasks.
/// `release` stops admissions and waits for every admitted task to finish.
pub struct WorkerPool {
  pool_name: Arc<String>,
  capacity: usize,
  submit_timeout: Duration,
  semaphore: Arc<Semaphore>,
  handoff_tx: kanal::AsyncSender<AdmittedTask>,
  tracker: TaskTracker,
  shutdown_token: CancellationToken,
  logger: Arc<dyn Logger>,
  dispatch_join_handle: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for WorkerPool {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("WorkerPool")
      .field("pool_name", &self.pool_name)
      .field("capacity", &self.capacity)
      .field("submit_timeout", &self.submit_timeout)
      .field("available_permits", &self.semaphore.available_permits())
      .field("running_tasks", &self.tracker.len())
      .field("released", &self.shutdown_token.is_cancelled())
      .finish_non_exhaustive()
  }
}

impl WorkerPool {
  /// Builds the pool and starts its dispatch loop on `tokio_handle`.
  pub fn new(pool_name: &str, options: PoolOptions, tokio_handle: TokioHandle) -> Arc<Self> {
    recovery::install_panic_hook();
    let pool_name = Arc::new(pool_name.to_string());
    let resolved = options.resolve(&pool_name);
    // Zero capacity: a handoff completes only once the dispatch loop has taken the task.
    let (handoff_tx, handoff_rx) = kanal::bounded_async(0);
    let tracker = TaskTracker::new();

    let pool = Arc::new(Self {
      pool_name: pool_name.clone(),
      capacity: resolved.capacity,
      submit_timeout: resolved.submit_timeout,
      semaphore: Arc::new(Semaphore::new(resolved.capacity)),
      handoff_tx,
      tracker: tracker.clone(),
      shutdown_token: CancellationToken::new(),
      logger: resolved.logger.clone(),
      dispatch_join_handle: Mutex::new(None),
    });

    let loop_pool_name = pool_name.clone();
    let loop_logger = resolved.logger;
    let loop_tokio_handle = tokio_handle.clone();
    let dispatch_join_handle = tokio_handle.spawn(
      async move {
        Self::run_dispatch_loop(loop_pool_name, handoff_rx, tracker, loop_logger, loop_tokio_handle).await;
      }
      .instrument(info_span!("worker_pool_dispatch_loop", name = %pool_name)),
    );
    *pool.dispatch_join_handle.lock() = Some(dispatch_join_handle);

    debug!(
      pool_name = %pool.pool_name,
      capacity = pool.capacity,
      submit_timeout = ?pool.submit_timeout,
      "Worker pool created."
    );
    pool
  }

  pub fn name(&self) -> &str {
    &self.pool_name
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn submit_timeout(&self) -> Duration {
    self.submit_timeout
  }

  /// Number of admitted tasks that have not finished yet.
  pub fn running_task_count(&self) -> usize {
    self.tracker.len()
  }

  /// Capacity slots currently free.
  pub fn available_permits(&self) -> usize {
    self.semaphore.available_permits()
  }

  /// Whether shutdown has been signaled, by `release` or by dropping the pool.
  pub fn is_released(&self) -> bool {
    self.shutdown_token.is_cancelled()
  }

  /// Submits an async task.
  ///
  /// # Errors
  /// Returns `PoolError::Released` if the pool is shutting down, or
  /// `PoolError::SubmitTimeout` if no slot freed up within the submit timeout.
  /// In both cases the task is dropped without running.
  pub async fn submit<F>(&self, task: F) -> Result<(), PoolError>
  where
    F: Future<Output = ()> + Send + 'static,
  {
    self.submit_task(Task::from_future(task)).await
  }

  /// Submits a blocking closure. It runs on the runtime's blocking thread
  /// pool but still counts against this pool's capacity.
  ///
  /// # Errors
  /// Same as [`WorkerPool::submit`].
  pub async fn submit_blocking<F>(&self, task: F) -> Result<(), PoolError>
  where
    F: FnOnce() + Send + 'static,
  {
    self.submit_task(Task::from_fn(task)).await
  }

  /// Submits an already-built [`Task`].
  ///
  /// # Errors
  /// Same as [`WorkerPool::submit`].
  pub async fn submit_task(&self, task: Task) -> Result<(), PoolError> {
    if self.shutdown_token.is_cancelled() {
      debug!(pool_name = %self.pool_name, "Submit: pool already released.");
      return Err(PoolError::Released);
    }

    let permit = tokio::select! {
      biased;
      _ = self.shutdown_token.cancelled() => {
        debug!(pool_name = %self.pool_name, "Submit: shutdown signaled while waiting for capacity.");
        return Err(PoolError::Released);
      }
      acquired = self.semaphore.clone().acquire_owned() => match acquired {
        Ok(permit) => permit,
        Err(_) => {
          error!(pool_name = %self.pool_name, "Submit: capacity semaphore closed unexpectedly.");
          return Err(PoolError::Released);
        }
      },
      _ = tokio::time::sleep(self.submit_timeout) => {
        self.logger.printf(format_args!("submit worker task timeout"));
        return Err(PoolError::SubmitTimeout);
      }
    };

    let task_id = next_task_id();
    trace!(
      pool_name = %self.pool_name,
      %task_id,
      available = self.semaphore.available_permits(),
      "Submit: acquired permit, handing task to dispatch loop."
    );

    // The handoff has no timeout of its own. If the loop has already stopped,
    // the channel is closed and the task (with its permit) is dropped here.
    match self.handoff_tx.send(AdmittedTask { task_id, task, permit }).await {
      Ok(()) => Ok(()),
      Err(send_error) => {
        debug!(
          pool_name = %self.pool_name,
          %task_id,
          "Submit: dispatch loop is gone, task not admitted: {:?}",
          send_error
        );
        Err(PoolError::Released)
      }
    }
  }

  /// Stops accepting tasks and waits until every admitted task has finished.
  ///
  /// There is no timeout: a task that never returns keeps this call pending.
  /// Calling it more than once is harmless; later calls wait for the same drain.
  pub async fn release(&self) {
    if self.shutdown_token.is_cancelled() {
      debug!(pool_name = %self.pool_name, "Release: shutdown already signaled.");
    } else {
      debug!(pool_name = %self.pool_name, "Release: signaling shutdown.");
      self.signal_shutdown();
    }

    let handle_to_await = self.dispatch_join_handle.lock().take();
    if let Some(handle) = handle_to_await {
      if let Err(join_error) = handle.await {
        error!(pool_name = %self.pool_name, "Release: dispatch loop failed to join: {:?}", join_error);
      }
    }

    // The loop has stopped, so no further tokens can be handed out.
    self.tracker.close();
    debug!(
      pool_name = %self.pool_name,
      running = self.tracker.len(),
      "Release: waiting for admitted tasks to drain."
    );
    self.tracker.wait().await;

    self.logger.printf(format_args!("release"));
  }

  fn signal_shutdown(&self) {
    self.shutdown_token.cancel();
    let _ = self.handoff_tx.close();
  }

  async fn run_dispatch_loop(
    pool_name: Arc<String>,
    handoff_rx: kanal::AsyncReceiver<AdmittedTask>,
    tracker: TaskTracker,
    logger: Arc<dyn Logger>,
    tasks_tokio_handle: TokioHandle,
  ) {
    debug!(name = %*pool_name, "Dispatch loop started.");

    // `recv` fails once shutdown closes the handoff channel.
    while let Ok(admitted) = handoff_rx.recv().await {
      Self::launch(&pool_name, &tracker, &logger, &tasks_tokio_handle, admitted);
    }

    debug!(
      name = %*pool_name,
      "Dispatch loop stopped. Tasks still running: {}",
      tracker.len()
    );
  }

  fn launch(
    pool_name: &Arc<String>,
    tracker: &TaskTracker,
    logger: &Arc<dyn Logger>,
    tasks_tokio_handle: &TokioHandle,
    admitted: AdmittedTask,
  ) {
    let AdmittedTask { task_id, task, permit } = admitted;
    let guard = ExecutionGuard::new(tracker.token(), permit);
    let logger = logger.clone();
    trace!(name = %pool_name, %task_id, ?task, "Launching task.");

    match task {
      Task::Async(mut future) => {
        let panic_pool_name = pool_name.clone();
        tasks_tokio_handle.spawn(
          async move {
            let _guard = guard;
            // Each poll may run on a different worker thread.
            let scoped = poll_fn(move |cx| {
              let _scope = PanicCaptureScope::enter();
              future.as_mut().poll(cx)
            });
            if let Err(panic_payload) = AssertUnwindSafe(scoped).catch_unwind().await {
              error!(pool_name = %panic_pool_name, %task_id, "Task panicked during execution.");
              recovery::report_panic(logger.as_ref(), panic_payload.as_ref());
            }
          }
          .instrument(info_span!("pool_task", pool_name = %pool_name, %task_id)),
        );
      }
      Task::Blocking(body) => {
        let span = info_span!("pool_task", pool_name = %pool_name, %task_id);
        tasks_tokio_handle.spawn_blocking(move || {
          let _entered = span.enter();
          let _guard = guard;
          let outcome = {
            let _scope = PanicCaptureScope::enter();
            std::panic::catch_unwind(AssertUnwindSafe(body))
          };
          if let Err(panic_payload) = outcome {
            error!("Task panicked during execution.");
            recovery::report_panic(logger.as_ref(), panic_payload.as_ref());
          }
        });
      }
    }
  }
}

impl Drop for WorkerPool {
  fn drop(&mut self) {
    // Never blocks: in-flight tasks keep running on the runtime.
    if !self.shutdown_token.is_cancelled() {
      debug!(
        pool_name = %*self.pool_name,
        "WorkerPool dropped without release. Signaling shutdown."
      );
      self.signal_shutdown();
    }
  }
}
