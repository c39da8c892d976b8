//! Deliveries, courier assignment and the courier list.

use std::convert::Infallible;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{Sse, sse::Event, sse::KeepAlive},
};
use chrono::{TimeDelta, Utc};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tracing::instrument;

use pizzaria_core::{CourierId, DeliveryStatus, Fulfillment, OrderId, Phone};

use super::kanban::reload_event;
use crate::db::deliveries::{Courier, DeliveryRow};
use crate::db::{DeliveryRepository, OrderRepository};
use crate::error::{AppError, Result};
use crate::middleware::{RequireAdminAuth, RequireManager};
use crate::services::change_feed::{affects_deliveries, reloads};
use crate::state::AppState;

/// Finished runs stay in the list this many hours.
const CLOSED_DELIVERIES_HOURS: i64 = 12;

/// Body of a courier assignment.
#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub courier_id: CourierId,
}

/// Body of a delivery status change.
#[derive(Debug, Deserialize)]
pub struct AdvanceRequest {
    pub from: DeliveryStatus,
    pub to: DeliveryStatus,
}

/// Courier fields as edited by a manager.
#[derive(Debug, Deserialize)]
pub struct CourierForm {
    pub name: String,
    pub phone: Phone,
    #[serde(default = "default_active")]
    pub active: bool,
}

const fn default_active() -> bool {
    true
}

impl CourierForm {
    fn name(&self) -> Result<&str> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(AppError::BadRequest("informe o nome do motoboy".to_string()));
        }
        Ok(name)
    }
}

/// Reject edges outside the delivery flow before touching the database.
fn check_advance(request: &AdvanceRequest) -> Result<()> {
    if request.from.can_transition_to(request.to) {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!(
            "entrega não pode ir de {} para {}",
            request.from, request.to
        )))
    }
}

/// Running deliveries and those closed in the last hours.
pub async fn list(
    State(state): State<AppState>,
    RequireAdminAuth(_admin): RequireAdminAuth,
) -> Result<Json<Vec<DeliveryRow>>> {
    let since = Utc::now() - TimeDelta::hours(CLOSED_DELIVERIES_HOURS);
    Ok(Json(DeliveryRepository::new(state.pool()).list(since).await?))
}

/// One `reload` event per burst of delivery changes.
pub async fn events(
    State(state): State<AppState>,
    RequireAdminAuth(_admin): RequireAdminAuth,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let ticks = reloads(
        state.changes().subscribe(),
        state.config().realtime_debounce,
        affects_deliveries,
    );
    Sse::new(ticks.map(|()| Ok(reload_event()))).keep_alive(KeepAlive::default())
}

/// Assign or reassign the courier of a delivery order.
#[instrument(skip(state, admin, request), fields(order_id = %id, admin_id = %admin.id))]
pub async fn assign(
    State(state): State<AppState>,
    RequireAdminAuth(admin): RequireAdminAuth,
    Path(id): Path<OrderId>,
    Json(request): Json<AssignRequest>,
) -> Result<Json<DeliveryRow>> {
    let card = OrderRepository::new(state.pool())
        .card(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("pedido {id}")))?;
    if card.fulfillment != Fulfillment::Delivery {
        return Err(AppError::BadRequest(
            "pedido para retirada não tem entrega".to_string(),
        ));
    }
    if card.status.is_terminal() {
        return Err(AppError::BadRequest(format!(
            "pedido já está {}",
            card.status.label()
        )));
    }

    let deliveries = DeliveryRepository::new(state.pool());
    let courier = deliveries
        .courier(request.courier_id)
        .await?
        .filter(|c| c.active)
        .ok_or_else(|| AppError::BadRequest("motoboy inativo ou inexistente".to_string()))?;

    deliveries.assign(id, courier.id).await?;
    tracing::info!(courier_id = %courier.id, "courier assigned");

    deliveries
        .for_order(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::Internal("delivery vanished after assignment".to_string()))
}

/// Mark a delivery picked up or delivered.
#[instrument(skip(state, _admin, request), fields(order_id = %id))]
pub async fn advance(
    State(state): State<AppState>,
    RequireAdminAuth(_admin): RequireAdminAuth,
    Path(id): Path<OrderId>,
    Json(request): Json<AdvanceRequest>,
) -> Result<Json<DeliveryRow>> {
    check_advance(&request)?;

    let deliveries = DeliveryRepository::new(state.pool());
    deliveries.set_status(id, request.from, request.to).await?;

    deliveries
        .for_order(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("entrega do pedido {id}")))
}

/// All couriers.
pub async fn couriers(
    State(state): State<AppState>,
    RequireAdminAuth(_admin): RequireAdminAuth,
) -> Result<Json<Vec<Courier>>> {
    Ok(Json(DeliveryRepository::new(state.pool()).couriers().await?))
}

/// Add a courier.
pub async fn create_courier(
    State(state): State<AppState>,
    RequireManager(_admin): RequireManager,
    Json(form): Json<CourierForm>,
) -> Result<(StatusCode, Json<Courier>)> {
    let courier = DeliveryRepository::new(state.pool())
        .create_courier(form.name()?, &form.phone)
        .await?;
    Ok((StatusCode::CREATED, Json(courier)))
}

/// Replace a courier's details.
pub async fn update_courier(
    State(state): State<AppState>,
    RequireManager(_admin): RequireManager,
    Path(id): Path<CourierId>,
    Json(form): Json<CourierForm>,
) -> Result<Json<Courier>> {
    let courier = DeliveryRepository::new(state.pool())
        .update_courier(id, form.name()?, &form.phone, form.active)
        .await?;
    Ok(Json(courier))
}

/// Remove a courier without deliveries.
pub async fn delete_courier(
    State(state): State<AppState>,
    RequireManager(_admin): RequireManager,
    Path(id): Path<CourierId>,
) -> Result<StatusCode> {
    DeliveryRepository::new(state.pool()).delete_courier(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_only_forward_delivery_edges_pass() {
        let ok = AdvanceRequest {
            from: DeliveryStatus::Waiting,
            to: DeliveryStatus::OnRoute,
        };
        assert!(check_advance(&ok).is_ok());

        let back = AdvanceRequest {
            from: DeliveryStatus::Delivered,
            to: DeliveryStatus::OnRoute,
        };
        assert!(matches!(check_advance(&back), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_courier_form_validates_phone_and_name() {
        let form: CourierForm =
            serde_json::from_str(r#"{"name":"  Zé  ","phone":"(11) 98765-4321"}"#).unwrap();
        assert!(form.active);
        assert_eq!(form.name().unwrap(), "Zé");

        assert!(serde_json::from_str::<CourierForm>(r#"{"name":"Zé","phone":"123"}"#).is_err());

        let blank: CourierForm =
            serde_json::from_str(r#"{"name":" ","phone":"11987654321"}"#).unwrap();
        assert!(blank.name().is_err());
    }
}
