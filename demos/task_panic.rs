use worker_pool::{PoolOptions, WorkerPool};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::info;

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();
  info!("--- Task Panic Example ---");

  let pool = WorkerPool::new("panic_pool", PoolOptions::new().with_capacity(1), Handle::current());

  pool
    .submit(async {
      info!("Panicking Task: Starting...");
      tokio::time::sleep(Duration::from_millis(100)).await;
      info!("Panicking Task: About to panic!");
      panic!("This task is designed to panic!");
    })
    .await
    .expect("Failed to submit panicking task");

  let follow_up_ran = Arc::new(AtomicBool::new(false));
  let flag = follow_up_ran.clone();
  pool
    .submit(async move {
      info!("Follow-up Task: running after the panic.");
      flag.store(true, Ordering::SeqCst);
    })
    .await
    .expect("Failed to submit follow-up task");

  info!("Releasing pool.");
  pool.release().await;
  info!(
    "Pool released. Follow-up task ran: {}",
    follow_up_ran.load(Ordering::SeqCst)
  );
  info!("--- Task Panic Example End ---");
}
