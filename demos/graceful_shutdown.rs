use worker_pool::{PoolError, PoolOptions, WorkerPool};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::info;

async fn work_task_fn(id: usize, duration_s: u64) {
  info!("Task {} starting (will run for {}s)", id, duration_s);
  tokio::time::sleep(Duration::from_secs(duration_s)).await;
  info!("Task {} finished after {}s", id, duration_s);
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();
  info!("--- Graceful Shutdown Example ---");

  let pool = WorkerPool::new(
    "graceful_shutdown_pool",
    PoolOptions::new().with_capacity(2),
    Handle::current(),
  );

  // Capacity 2: tasks 0 and 1 start right away.
  for i in 0..2 {
    match pool.submit(work_task_fn(i, 2)).await {
      Ok(()) => info!("Submitted task {}", i),
      Err(e) => tracing::error!("Failed to submit task {}: {}", i, e),
    }
  }

  // Both slots are busy for 2s, so this gives up after the default 500ms.
  match pool.submit(work_task_fn(2, 1)).await {
    Err(PoolError::SubmitTimeout) => info!("Third task timed out waiting for capacity, as expected."),
    other => tracing::error!("Unexpected result for third task: {:?}", other),
  }

  info!(
    "Running: {}, free slots: {}",
    pool.running_task_count(),
    pool.available_permits()
  );

  let pool_for_release = pool.clone();
  let release_jh = tokio::spawn(async move {
    info!("Calling pool.release()...");
    pool_for_release.release().await;
    info!("pool.release() returned; every admitted task has finished.");
  });

  tokio::time::sleep(Duration::from_millis(50)).await;
  info!("Attempting to submit task after release began...");
  match pool.submit(work_task_fn(99, 1)).await {
    Ok(()) => tracing::error!("LATE SUBMISSION SUCCEEDED (UNEXPECTED!)"),
    Err(e) => info!("Late submission correctly failed: {}", e),
  }

  release_jh.await.expect("Release task failed");
  info!("--- Graceful Shutdown Example End ---");
}
