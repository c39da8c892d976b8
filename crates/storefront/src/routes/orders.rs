//! Order tracking page and live status stream.

use std::convert::Infallible;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, State},
    response::{
        IntoResponse, Response, Sse,
        sse::{Event, KeepAlive},
    },
};
use futures::Stream;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tower_sessions::Session;
use tracing::instrument;

use pizzaria_core::order::StatusChange;
use pizzaria_core::report::local_datetime;
use pizzaria_core::{CustomerId, Fulfillment, OrderId, OrderStatus};

use super::Layout;
use crate::db::OrderRepository;
use crate::db::orders::OrderDetail;
use crate::error::{AppError, Result};
use crate::filters;
use crate::middleware::RequireAuth;
use crate::state::AppState;

/// One step of the progress bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingStep {
    pub status: OrderStatus,
    pub label: &'static str,
    pub done: bool,
    pub current: bool,
}

/// Progress steps for an order. Pickup orders skip the delivery step and
/// cancelled orders show no progress.
#[must_use]
pub fn tracking_steps(fulfillment: Fulfillment, current: OrderStatus) -> Vec<TrackingStep> {
    if current == OrderStatus::Cancelled {
        return Vec::new();
    }

    let path: &[OrderStatus] = match fulfillment {
        Fulfillment::Delivery => &[
            OrderStatus::Pending,
            OrderStatus::Preparing,
            OrderStatus::OutForDelivery,
            OrderStatus::Finished,
        ],
        Fulfillment::Pickup => &[
            OrderStatus::Pending,
            OrderStatus::Preparing,
            OrderStatus::Finished,
        ],
    };
    let reached = path.iter().position(|s| *s == current).unwrap_or(0);

    path.iter()
        .enumerate()
        .map(|(i, status)| TrackingStep {
            status: *status,
            label: status.label(),
            done: i <= reached,
            current: i == reached,
        })
        .collect()
}

/// Timeline row with a local timestamp.
#[derive(Debug, Clone)]
pub struct TimelineEntry {
    pub label: &'static str,
    pub at: String,
}

impl From<&StatusChange> for TimelineEntry {
    fn from(change: &StatusChange) -> Self {
        Self {
            label: change.to_status.label(),
            at: local_datetime(change.created_at),
        }
    }
}

/// Payload of a `status` SSE event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusPayload {
    pub status: OrderStatus,
    pub label: &'static str,
    pub terminal: bool,
}

impl From<OrderStatus> for StatusPayload {
    fn from(status: OrderStatus) -> Self {
        Self {
            status,
            label: status.label(),
            terminal: status.is_terminal(),
        }
    }
}

fn status_event(status: OrderStatus) -> Event {
    let payload = StatusPayload::from(status);
    Event::default()
        .event("status")
        .json_data(payload)
        .unwrap_or_else(|_| Event::default().event("status").data(status.as_str()))
}

/// Order tracking template.
#[derive(Template, WebTemplate)]
#[template(path = "orders/show.html")]
pub struct OrderTemplate {
    pub layout: Layout,
    pub detail: OrderDetail,
    pub placed_at: String,
    pub steps: Vec<TrackingStep>,
    pub timeline: Vec<TimelineEntry>,
}

/// Display an order with its progress and timeline.
#[instrument(skip(state, session, customer), fields(order_id = %id))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(customer): RequireAuth,
    Path(id): Path<OrderId>,
) -> Result<Response> {
    let detail = OrderRepository::new(state.pool())
        .detail(id, customer.id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("pedido {id}")))?;

    Ok(OrderTemplate {
        layout: Layout::load(&state, &session).await,
        placed_at: local_datetime(detail.order.created_at),
        steps: tracking_steps(detail.order.fulfillment, detail.order.status),
        timeline: detail.history.iter().map(TimelineEntry::from).collect(),
        detail,
    }
    .into_response())
}

/// Stream status changes for one order as server-sent events.
///
/// The current status is sent first so a reconnecting page never misses a
/// change. The stream ends once the order reaches a terminal status.
#[instrument(skip(state, customer), fields(order_id = %id))]
pub async fn events(
    State(state): State<AppState>,
    RequireAuth(customer): RequireAuth,
    Path(id): Path<OrderId>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    // Subscribe before reading the status so nothing falls in between.
    let receiver = state.orders().subscribe();
    let current = OrderRepository::new(state.pool())
        .status(id, customer.id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("pedido {id}")))?;

    let stream = status_stream(state, customer.id, id, current, receiver);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn status_stream(
    state: AppState,
    customer_id: CustomerId,
    order_id: OrderId,
    current: OrderStatus,
    mut receiver: tokio::sync::broadcast::Receiver<pizzaria_core::realtime::ChangeEvent>,
) -> impl Stream<Item = std::result::Result<Event, Infallible>> {
    async_stream::stream! {
        let mut last = current;
        yield Ok(status_event(last));
        if last.is_terminal() {
            return;
        }

        loop {
            let next = match receiver.recv().await {
                Ok(event) if event.order_id == order_id => event.order_status(),
                Ok(_) => None,
                Err(RecvError::Lagged(skipped)) => {
                    // Re-read the status rather than guess what was dropped.
                    tracing::debug!(skipped, "order stream lagged, reloading status");
                    OrderRepository::new(state.pool())
                        .status(order_id, customer_id)
                        .await
                        .ok()
                        .flatten()
                }
                Err(RecvError::Closed) => return,
            };

            if let Some(status) = next
                && status != last
            {
                last = status;
                yield Ok(status_event(status));
                if status.is_terminal() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use futures::StreamExt;
    use pizzaria_core::realtime::{ChangeEvent, ChangeOp};

    use super::*;

    #[test]
    fn test_delivery_steps() {
        let steps = tracking_steps(Fulfillment::Delivery, OrderStatus::Preparing);
        assert_eq!(steps.len(), 4);
        assert!(steps[0].done && !steps[0].current);
        assert!(steps[1].done && steps[1].current);
        assert!(!steps[2].done);
    }

    #[test]
    fn test_pickup_skips_delivery_step() {
        let steps = tracking_steps(Fulfillment::Pickup, OrderStatus::Finished);
        assert_eq!(steps.len(), 3);
        assert!(steps.iter().all(|s| s.status != OrderStatus::OutForDelivery));
        assert!(steps.iter().all(|s| s.done));
    }

    #[test]
    fn test_cancelled_has_no_steps() {
        assert!(tracking_steps(Fulfillment::Delivery, OrderStatus::Cancelled).is_empty());
    }

    #[test]
    fn test_status_payload() {
        let json = serde_json::to_value(StatusPayload::from(OrderStatus::OutForDelivery)).unwrap();
        assert_eq!(json["status"], "saiu_entrega");
        assert_eq!(json["label"], "Saiu para entrega");
        assert_eq!(json["terminal"], false);
    }

    fn order_event(order_id: i32, status: &str) -> ChangeEvent {
        ChangeEvent {
            table: "order".to_string(),
            op: ChangeOp::Update,
            order_id: OrderId::new(order_id),
            status: status.to_string(),
        }
    }

    #[tokio::test]
    async fn test_stream_filters_other_orders_and_ends_on_terminal() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        let feed = crate::services::OrderFeed::new();
        let state = AppState::new(crate::config::StorefrontConfig::for_tests(), pool, feed.clone());
        let receiver = feed.subscribe();

        let stream = status_stream(
            state,
            CustomerId::new(1),
            OrderId::new(7),
            OrderStatus::Pending,
            receiver,
        );

        feed.publish(order_event(8, "preparando"));
        feed.publish(order_event(7, "preparando"));
        feed.publish(order_event(7, "preparando"));
        feed.publish(order_event(7, "finalizado"));

        let events: Vec<_> = stream.collect().await;
        // Initial status, then one event per distinct change.
        assert_eq!(events.len(), 3);
    }
}
