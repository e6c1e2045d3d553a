//! Topic-based publish/subscribe on top of a [`WorkerPool`].
//!
//! Each published message is delivered to every handler of its topic as a
//! separate pool task, so handlers run concurrently, bounded by the pool's
//! capacity, and a panicking handler only affects its own delivery.

use crate::pool::WorkerPool;

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

/// A subscriber callback. Handlers run on the blocking thread pool.
pub type EventHandler<M> = Arc<dyn Fn(M) + Send + Sync + 'static>;

pub struct EventBus<M: Clone + Send + 'static> {
  pool: Arc<WorkerPool>,
  handlers: DashMap<String, Vec<EventHandler<M>>>,
}

impl<M: Clone + Send + 'static> fmt::Debug for EventBus<M> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("EventBus")
      .field("pool", &self.pool.name())
      .field("topic_count", &self.handlers.len())
      .finish()
  }
}

impl<M: Clone + Send + 'static> EventBus<M> {
  /// Creates a bus that delivers through `pool`. The bus does not own the
  /// pool exclusively; other components may keep submitting to it.
  pub fn new(pool: Arc<WorkerPool>) -> Self {
    Self {
      pool,
      handlers: DashMap::new(),
    }
  }

  pub fn pool(&self) -> &Arc<WorkerPool> {
    &self.pool
  }

  pub fn subscribe<F>(&self, topic: impl Into<String>, handler: F)
  where
    F: Fn(M) + Send + Sync + 'static,
  {
    let topic = topic.into();
    debug!(pool_name = %self.pool.name(), %topic, "Subscribing handler.");
    self.handlers.entry(topic).or_default().push(Arc::new(handler));
  }

  pub fn handler_count(&self, topic: &str) -> usize {
    self.handlers.get(topic).map_or(0, |handlers| handlers.len())
  }

  /// Submits one delivery per handler subscribed to `topic` and returns how
  /// many were admitted. Rejected deliveries are logged and skipped.
  pub async fn publish(&self, topic: &str, message: M) -> usize {
    // Snapshot the handler list so no map guard is held across an await.
    let handlers: Vec<EventHandler<M>> = match self.handlers.get(topic) {
      Some(entry) => entry.value().clone(),
      None => {
        debug!(pool_name = %self.pool.name(), %topic, "Publish: no subscribers.");
        return 0;
      }
    };

    let mut delivered = 0;
    for handler in handlers {
      let message = message.clone();
      match self.pool.submit_blocking(move || handler(message)).await {
        Ok(()) => delivered += 1,
        Err(e) => {
          warn!(pool_name = %self.pool.name(), %topic, "Publish: delivery rejected: {}", e);
        }
      }
    }
    delivered
  }

  /// Releases the underlying pool, waiting for in-flight deliveries.
  pub async fn quit(&self) {
    self.pool.release().await;
  }
}
