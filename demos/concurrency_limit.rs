use worker_pool::{PoolOptions, WorkerPool};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tracing::info;

async fn long_task_fn(id: usize) {
  info!("Task {} starting (concurrency test - should take 1s)", id);
  tokio::time::sleep(Duration::from_secs(1)).await;
  info!("Task {} finished", id);
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();

  info!("--- Concurrency Limit Example (Limit: 3) ---");

  let capacity = 3;
  let pool = WorkerPool::new(
    "concurrency_pool",
    PoolOptions::new()
      .with_capacity(capacity)
      .with_submit_timeout(Duration::from_secs(3)),
    Handle::current(),
  );

  let num_tasks = 10;
  info!(
    "Submitting {} tasks, each takes 1 sec. With capacity {}, this should take ~{} secs.",
    num_tasks,
    capacity,
    (num_tasks as f32 / capacity as f32).ceil()
  );

  let started = Instant::now();
  for i in 0..num_tasks {
    if let Err(e) = pool.submit(long_task_fn(i)).await {
      tracing::error!("Failed to submit task {}: {}", i, e);
    }
  }

  info!("All tasks submitted. Releasing pool.");
  pool.release().await;
  info!("Pool released after {:?}.", started.elapsed());
  info!("--- Concurrency Limit Example End ---");
}
