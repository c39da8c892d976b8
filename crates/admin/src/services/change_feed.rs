//! Database change feed for the back office.
//!
//! One background task listens on `order_events` and `delivery_events` and
//! republishes decoded events on a broadcast channel. Board and delivery
//! pages do not patch themselves per event: [`reloads`] collapses a burst
//! into a single "reload" tick after a quiet window.

use std::convert::Infallible;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use futures::Stream;
use sqlx::PgPool;
use sqlx::postgres::PgListener;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::Instant;

use pizzaria_core::realtime::{ChangeEvent, DELIVERY_EVENTS, ORDER_EVENTS};

/// Buffered events per subscriber before it starts lagging.
const CHANNEL_CAPACITY: usize = 1024;

/// Upper bound between reconnect attempts.
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// Fan-out of order and delivery change notifications.
#[derive(Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeFeed {
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
            tracing::warn!(error = %e, ?delay, "change feed disconnected, reconnecting");
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
        listener.listen_all([ORDER_EVENTS, DELIVERY_EVENTS]).await?;
        backoff.reset();
        tracing::info!("change feed listening");

        loop {
            let notification = listener.recv().await?;
            match ChangeEvent::parse(notification.payload()) {
                Ok(event) => self.publish(event),
                Err(e) => tracing::warn!(
                    error = %e,
                    channel = notification.channel(),
                    "ignoring malformed change event"
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

/// One tick per burst of matching events.
///
/// After a matching event the stream waits until `window` passes with no
/// further matching event, then yields once. A lagged receiver counts as a
/// change. The stream ends when the feed is dropped.
pub fn reloads(
    mut receiver: broadcast::Receiver<ChangeEvent>,
    window: Duration,
    wanted: fn(&ChangeEvent) -> bool,
) -> impl Stream<Item = ()> {
    async_stream::stream! {
        loop {
            match receiver.recv().await {
                Ok(event) if !wanted(&event) => continue,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "change stream lagged, forcing reload");
                }
                Err(RecvError::Closed) => break,
            }

            let quiet = tokio::time::sleep(window);
            tokio::pin!(quiet);
            loop {
                tokio::select! {
                    () = &mut quiet => break,
                    next = receiver.recv() => match next {
                        Ok(event) if !wanted(&event) => {}
                        Ok(_) | Err(RecvError::Lagged(_)) => {
                            quiet.as_mut().reset(Instant::now() + window);
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            yield ();
        }
    }
}

/// Events that change the kanban board.
#[must_use]
pub fn affects_board(_event: &ChangeEvent) -> bool {
    // Courier assignment shows on cards, so delivery events count too.
    true
}

/// Events that change the delivery list.
#[must_use]
pub fn affects_deliveries(event: &ChangeEvent) -> bool {
    event.table == "delivery" || event.order_status().is_some_and(|s| s.is_terminal())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use futures::StreamExt;

    use pizzaria_core::realtime::ChangeOp;
    use pizzaria_core::{OrderId, OrderStatus};

    use super::*;

    fn order_event(order_id: i32, status: OrderStatus) -> ChangeEvent {
        ChangeEvent {
            table: "order".to_string(),
            op: ChangeOp::Update,
            order_id: OrderId::new(order_id),
            status: status.as_str().to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_collapses_into_one_reload() {
        let feed = ChangeFeed::new();
        let stream = reloads(feed.subscribe(), Duration::from_millis(300), affects_board);
        tokio::pin!(stream);

        for id in 1..=5 {
            feed.publish(order_event(id, OrderStatus::Preparing));
        }
        assert_eq!(stream.next().await, Some(()));

        drop(feed);
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_bursts_reload_separately() {
        let feed = ChangeFeed::new();
        let stream = reloads(feed.subscribe(), Duration::from_millis(300), affects_board);
        tokio::pin!(stream);

        feed.publish(order_event(1, OrderStatus::Preparing));
        assert_eq!(stream.next().await, Some(()));

        feed.publish(order_event(2, OrderStatus::Preparing));
        assert_eq!(stream.next().await, Some(()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_spread_out_burst_waits_for_quiet() {
        let feed = ChangeFeed::new();
        let stream = reloads(feed.subscribe(), Duration::from_millis(300), affects_board);
        tokio::pin!(stream);

        let publisher = feed.clone();
        let started = Instant::now();
        tokio::spawn(async move {
            for id in 1..=4 {
                publisher.publish(order_event(id, OrderStatus::Preparing));
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        });

        assert_eq!(stream.next().await, Some(()));
        // Last event at 600 ms, then a full quiet window.
        assert!(started.elapsed() >= Duration::from_millis(900));
        assert!(
            tokio::time::timeout(Duration::from_secs(2), stream.next())
                .await
                .is_err()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unwanted_events_are_ignored() {
        let feed = ChangeFeed::new();
        let stream = reloads(
            feed.subscribe(),
            Duration::from_millis(300),
            affects_deliveries,
        );
        tokio::pin!(stream);

        feed.publish(order_event(1, OrderStatus::Preparing));
        drop(feed);
        assert_eq!(stream.next().await, None);
    }

    #[test]
    fn test_delivery_list_cares_about_terminal_orders() {
        assert!(affects_deliveries(&order_event(1, OrderStatus::Cancelled)));
        assert!(!affects_deliveries(&order_event(1, OrderStatus::Preparing)));
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
