use worker_pool::{EventBus, PoolOptions, WorkerPool};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::info;

#[derive(Debug, Clone)]
struct OrderPlaced {
  order_id: u64,
  amount_cents: u64,
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();
  info!("--- Event Bus Example ---");

  let pool = WorkerPool::new(
    "event_pool",
    PoolOptions::new()
      .with_capacity(5000)
      .with_submit_timeout(Duration::from_millis(500)),
    Handle::current(),
  );
  let bus = EventBus::<OrderPlaced>::new(pool);

  bus.subscribe("order.placed", |event: OrderPlaced| {
    info!("Billing: charging {} cents for order {}", event.amount_cents, event.order_id);
  });
  bus.subscribe("order.placed", |event: OrderPlaced| {
    info!("Shipping: preparing order {}", event.order_id);
  });

  for order_id in 1..=3 {
    let delivered = bus
      .publish(
        "order.placed",
        OrderPlaced {
          order_id,
          amount_cents: order_id * 1250,
        },
      )
      .await;
    info!("Order {} delivered to {} handlers", order_id, delivered);
  }

  bus.quit().await;
  info!("--- Event Bus Example End ---");
}
