use worker_pool::{EventBus, PoolOptions, WorkerPool};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn setup_tracing_for_test() {
  use std::sync::Once;
  use tracing_subscriber::{fmt, EnvFilter};
  static TRACING_INIT: Once = Once::new();

  TRACING_INIT.call_once(|| {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,worker_pool=debug"));

    fmt::Subscriber::builder()
      .with_env_filter(filter)
      .with_test_writer()
      .try_init()
      .ok();
  });
}

fn event_pool(name: &str) -> Arc<WorkerPool> {
  WorkerPool::new(
    name,
    PoolOptions::new()
      .with_capacity(8)
      .with_submit_timeout(Duration::from_secs(2)),
    tokio::runtime::Handle::current(),
  )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_publish_reaches_every_subscriber_of_topic() {
  setup_tracing_for_test();
  let bus = EventBus::<u64>::new(event_pool("test_bus_fanout"));
  let total = Arc::new(AtomicUsize::new(0));

  for _ in 0..3 {
    let total = total.clone();
    bus.subscribe("orders", move |amount: u64| {
      total.fetch_add(amount as usize, Ordering::SeqCst);
    });
  }
  let other_topic_hits = Arc::new(AtomicUsize::new(0));
  {
    let hits = other_topic_hits.clone();
    bus.subscribe("refunds", move |_| {
      hits.fetch_add(1, Ordering::SeqCst);
    });
  }
  assert_eq!(bus.handler_count("orders"), 3);
  assert_eq!(bus.handler_count("refunds"), 1);

  assert_eq!(bus.publish("orders", 5).await, 3);
  assert_eq!(bus.publish("orders", 7).await, 3);

  bus.quit().await;

  assert_eq!(total.load(Ordering::SeqCst), 3 * (5 + 7));
  assert_eq!(other_topic_hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_publish_without_subscribers_delivers_nothing() {
  setup_tracing_for_test();
  let bus = EventBus::<String>::new(event_pool("test_bus_empty"));
  assert_eq!(bus.handler_count("nobody"), 0);
  assert_eq!(bus.publish("nobody", "hello".to_string()).await, 0);
  bus.quit().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_panicking_handler_does_not_block_other_handlers() {
  setup_tracing_for_test();
  let bus = EventBus::<&'static str>::new(event_pool("test_bus_panic"));
  let received = Arc::new(AtomicUsize::new(0));

  bus.subscribe("alerts", |_| panic!("handler failure"));
  {
    let received = received.clone();
    bus.subscribe("alerts", move |_| {
      received.fetch_add(1, Ordering::SeqCst);
    });
  }

  assert_eq!(bus.publish("alerts", "disk full").await, 2);
  assert_eq!(bus.publish("alerts", "cpu hot").await, 2);
  bus.quit().await;

  assert_eq!(received.load(Ordering::SeqCst), 2);
  assert_eq!(bus.pool().available_permits(), 8);
}

#[tokio::test]
async fn test_publish_after_quit_is_dropped() {
  setup_tracing_for_test();
  let bus = EventBus::<u32>::new(event_pool("test_bus_after_quit"));
  let received = Arc::new(AtomicUsize::new(0));
  {
    let received = received.clone();
    bus.subscribe("ticks", move |_| {
      received.fetch_add(1, Ordering::SeqCst);
    });
  }

  bus.quit().await;
  assert_eq!(bus.publish("ticks", 1).await, 0);
  assert_eq!(received.load(Ordering::SeqCst), 0);
  assert!(bus.pool().is_released());
}

#[tokio::test]
async fn test_bus_shares_pool_with_direct_submitters() {
  setup_tracing_for_test();
  let pool = event_pool("test_bus_shared_pool");
  let bus = EventBus::<u8>::new(pool.clone());
  let hits = Arc::new(AtomicUsize::new(0));
  {
    let hits = hits.clone();
    bus.subscribe("ping", move |_| {
      hits.fetch_add(1, Ordering::SeqCst);
    });
  }

  let direct_hits = hits.clone();
  pool
    .submit(async move {
      direct_hits.fetch_add(10, Ordering::SeqCst);
    })
    .await
    .unwrap();
  assert_eq!(bus.publish("ping", 0).await, 1);

  pool.release().await;
  assert_eq!(hits.load(Ordering::SeqCst), 11);
}
