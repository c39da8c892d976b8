//! NFC-e emission, cancellation and the receipt list.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use tracing::instrument;

use pizzaria_core::OrderId;

use super::LimitQuery;
use crate::db::FiscalRepository;
use crate::db::fiscal::FiscalReceipt;
use crate::error::{AppError, Result};
use crate::middleware::{RequireAdminAuth, RequireManager};
use crate::services::FiscalService;
use crate::state::AppState;

/// Body of a cancellation.
#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub reason: String,
}

/// Recent receipts.
pub async fn recent(
    State(state): State<AppState>,
    RequireAdminAuth(_admin): RequireAdminAuth,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<FiscalReceipt>>> {
    Ok(Json(FiscalRepository::new(state.pool()).recent(query.get()).await?))
}

/// The receipt of one order.
pub async fn show(
    State(state): State<AppState>,
    RequireAdminAuth(_admin): RequireAdminAuth,
    Path(id): Path<OrderId>,
) -> Result<Json<FiscalReceipt>> {
    FiscalRepository::new(state.pool())
        .receipt_for(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("nota do pedido {id}")))
}

/// Emit the NFC-e of a finished order. Repeating the call returns the
/// existing receipt.
#[instrument(skip(state, admin), fields(order_id = %id, admin_id = %admin.id))]
pub async fn emit(
    State(state): State<AppState>,
    RequireAdminAuth(admin): RequireAdminAuth,
    Path(id): Path<OrderId>,
) -> Result<Json<FiscalReceipt>> {
    let receipt = FiscalService::new(state.pool(), state.http()).emit(id).await?;
    Ok(Json(receipt))
}

/// Cancel an authorized NFC-e.
#[instrument(skip(state, admin, request), fields(order_id = %id, admin_id = %admin.id))]
pub async fn cancel(
    State(state): State<AppState>,
    RequireManager(admin): RequireManager,
    Path(id): Path<OrderId>,
    Json(request): Json<CancelRequest>,
) -> Result<Json<FiscalReceipt>> {
    let receipt = FiscalService::new(state.pool(), state.http())
        .cancel(id, request.reason.trim())
        .await?;
    tracing::info!("fiscal receipt cancelled");
    Ok(Json(receipt))
}
