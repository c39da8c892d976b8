//! Order change feed for tracking pages.
//!
//! A single background task holds a `PgListener` on `order_events` and fans
//! decoded events out through a broadcast channel. Each SSE connection
//! subscribes and filters for its own order.

use std::convert::Infallible;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use sqlx::PgPool;
use sqlx::postgres::PgListener;
use tokio::sync::broadcast;

use pizzaria_core::realtime::{ChangeEvent, ORDER_EVENTS};

/// Buffered events per subscriber before it starts lagging.
const CHANNEL_CAPACITY: usize = 1024;

/// Upper bound between reconnect attempts.
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// Fan-out of order change notifications.
#[derive(Clone)]
pub struct OrderFeed {
    sender: broadcast::Sender<ChangeEvent>,
}

impl Default for OrderFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderFeed {
    /// Create a feed with no listener attached.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Subscribe to future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to current subscribers.
    pub fn publish(&self, event: ChangeEvent) {
        // No subscribers is the common case between page views.
        let _ = self.sender.send(event);
    }

    /// Spawn the listener task. It reconnects with exponential backoff and
    /// runs for the lifetime of the process.
    pub fn spawn_listener(&self, pool: PgPool) -> tokio::task::JoinHandle<()> {
        let feed = self.clone();
        tokio::spawn(async move { feed.run(pool).await })
    }

    async fn run(self, pool: PgPool) {
        let mut backoff = reconnect_backoff();
        loop {
            let Err(e) = self.listen(&pool, &mut backoff).await;
            let delay = backoff.next_backoff().unwrap_or(MAX_RECONNECT_DELAY);
            tracing::warn!(error = %e, ?delay, "order feed disconnected, reconnecting");
            tokio::time::sleep(delay).await;
        }
    }

    /// Only returns when the connection fails.
    async fn listen(
        &self,
        pool: &PgPool,
        backoff: &mut ExponentialBackoff,
    ) -> Result<Infallible, sqlx::Error> {
        let mut listener = PgListener::connect_with(pool).await?;
        listener.listen(ORDER_EVENTS).await?;
        backoff.reset();
        tracing::info!(channel = ORDER_EVENTS, "order feed listening");

        loop {
            let notification = listener.recv().await?;
            match ChangeEvent::parse(notification.payload()) {
                Ok(event) => self.publish(event),
                Err(e) => tracing::warn!(
                    error = %e,
                    channel = notification.channel(),
                    "ignoring malformed order event"
                ),
            }
        }
    }
}

fn reconnect_backoff() -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(500))
        .with_max_interval(MAX_RECONNECT_DELAY)
        .with_max_elapsed_time(None)
        .build()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pizzaria_core::realtime::ChangeOp;
    use pizzaria_core::{OrderId, OrderStatus};

    use super::*;

    fn event(order_id: i32, status: OrderStatus) -> ChangeEvent {
        ChangeEvent {
            table: "order".to_string(),
            op: ChangeOp::Update,
            order_id: OrderId::new(order_id),
            status: status.as_str().to_string(),
        }
    }

    #[tokio::test]
    async fn test_subscribers_receive_published_events() {
        let feed = OrderFeed::new();
        let mut first = feed.subscribe();
        let mut second = feed.subscribe();

        feed.publish(event(1, OrderStatus::Preparing));

        assert_eq!(first.recv().await.unwrap().order_id, OrderId::new(1));
        assert_eq!(
            second.recv().await.unwrap().order_status(),
            Some(OrderStatus::Preparing)
        );
    }

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        OrderFeed::new().publish(event(1, OrderStatus::Finished));
    }

    #[test]
    fn test_reconnect_never_gives_up() {
        let mut backoff = reconnect_backoff();
        for _ in 0..50 {
            let delay = backoff.next_backoff().unwrap();
            // Randomization can stretch a delay by half.
            assert!(delay < MAX_RECONNECT_DELAY * 2);
        }
    }
}
