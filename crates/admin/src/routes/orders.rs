//! Order detail and the printable kitchen ticket.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};

use pizzaria_core::OrderId;
use pizzaria_core::order::StatusChange;
use pizzaria_core::report::local_datetime;

use crate::db::OrderRepository;
use crate::db::orders::Ticket;
use crate::error::{AppError, Result};
use crate::middleware::RequireAdminAuth;
use crate::state::AppState;

/// Ticket page, printed from the board. No layout chrome.
#[derive(Template, WebTemplate)]
#[template(path = "orders/ticket.html")]
pub struct TicketTemplate {
    pub store_name: String,
    pub ticket: Ticket,
    pub placed_at: String,
    pub timeline: Vec<TimelineRow>,
}

/// A status change as printed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineRow {
    pub label: &'static str,
    pub changed_by: String,
    pub at: String,
}

/// Printable rows for an order's history, oldest first.
#[must_use]
pub fn timeline(history: &[StatusChange]) -> Vec<TimelineRow> {
    history
        .iter()
        .map(|change| TimelineRow {
            label: change.to_status.label(),
            changed_by: change.changed_by.clone().unwrap_or_else(|| "-".to_string()),
            at: local_datetime(change.created_at),
        })
        .collect()
}

async fn load(state: &AppState, id: OrderId) -> Result<Ticket> {
    OrderRepository::new(state.pool())
        .ticket(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("pedido {id}")))
}

/// Order with items and status history.
pub async fn show(
    State(state): State<AppState>,
    RequireAdminAuth(_admin): RequireAdminAuth,
    Path(id): Path<OrderId>,
) -> Result<Json<Ticket>> {
    Ok(Json(load(&state, id).await?))
}

/// Printable ticket.
pub async fn ticket(
    State(state): State<AppState>,
    RequireAdminAuth(_admin): RequireAdminAuth,
    Path(id): Path<OrderId>,
) -> Result<impl IntoResponse> {
    let ticket = load(&state, id).await?;
    Ok(TicketTemplate {
        store_name: state.config().store_name.clone(),
        placed_at: local_datetime(ticket.order.created_at),
        timeline: timeline(&ticket.history),
        ticket,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeZone, Utc};
    use pizzaria_core::OrderStatus;

    use super::*;

    #[test]
    fn test_timeline_in_local_time() {
        let history = vec![
            StatusChange {
                from_status: None,
                to_status: OrderStatus::Pending,
                changed_by: None,
                created_at: Utc.with_ymd_and_hms(2024, 5, 10, 22, 5, 0).unwrap(),
            },
            StatusChange {
                from_status: Some(OrderStatus::Pending),
                to_status: OrderStatus::Preparing,
                changed_by: Some("Bruno".to_string()),
                created_at: Utc.with_ymd_and_hms(2024, 5, 10, 22, 9, 0).unwrap(),
            },
        ];

        let rows = timeline(&history);
        assert_eq!(rows[0].changed_by, "-");
        assert_eq!(rows[0].at, "10/05/2024 19:05");
        assert_eq!(rows[1].label, OrderStatus::Preparing.label());
        assert_eq!(rows[1].changed_by, "Bruno");
    }
}
