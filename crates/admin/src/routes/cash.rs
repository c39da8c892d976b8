//! Cash register: open, entries, close and history.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use pizzaria_core::cash::{CashEntry, CashError, CashSummary, validate_balance, validate_entry};
use pizzaria_core::{CashEntryKind, CashRegisterId, Money, OrderId, PaymentMethod};

use super::LimitQuery;
use crate::db::CashRepository;
use crate::db::cash::{CashRegister, NewCashEntry};
use crate::error::{AppError, Result};
use crate::middleware::{RequireAdminAuth, RequireManager};
use crate::state::AppState;

/// A session with its entries and totals.
#[derive(Debug, Serialize)]
pub struct RegisterView {
    pub register: CashRegister,
    pub entries: Vec<CashEntry>,
    pub summary: CashSummary,
}

/// Body of an open request.
#[derive(Debug, Deserialize)]
pub struct OpenRequest {
    pub opening_balance: Money,
}

/// Body of a manual entry.
#[derive(Debug, Deserialize)]
pub struct EntryRequest {
    pub kind: CashEntryKind,
    pub payment_method: PaymentMethod,
    pub amount: Money,
    pub description: Option<String>,
    pub order_id: Option<OrderId>,
}

/// Body of a close request.
#[derive(Debug, Deserialize)]
pub struct CloseRequest {
    pub counted_balance: Money,
    pub notes: Option<String>,
}

/// Blank strings count as absent.
fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

async fn view(repo: &CashRepository<'_>, register: CashRegister) -> Result<RegisterView> {
    let entries = repo.entries(register.id).await?;
    let summary = CashSummary::compute(register.opening_balance, &entries);
    Ok(RegisterView {
        register,
        entries,
        summary,
    })
}

/// The open session with entries and running totals; `null` when closed.
pub async fn current(
    State(state): State<AppState>,
    RequireAdminAuth(_admin): RequireAdminAuth,
) -> Result<Json<Option<RegisterView>>> {
    let repo = CashRepository::new(state.pool());
    let Some(register) = repo.current().await? else {
        return Ok(Json(None));
    };
    Ok(Json(Some(view(&repo, register).await?)))
}

/// A past or current session.
pub async fn show(
    State(state): State<AppState>,
    RequireAdminAuth(_admin): RequireAdminAuth,
    Path(id): Path<CashRegisterId>,
) -> Result<Json<RegisterView>> {
    let repo = CashRepository::new(state.pool());
    let register = repo
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("caixa {id}")))?;
    Ok(Json(view(&repo, register).await?))
}

/// Sessions newest first.
pub async fn history(
    State(state): State<AppState>,
    RequireAdminAuth(_admin): RequireAdminAuth,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<CashRegister>>> {
    Ok(Json(CashRepository::new(state.pool()).history(query.get()).await?))
}

/// Open the register.
#[instrument(skip(state, admin, request), fields(admin_id = %admin.id))]
pub async fn open(
    State(state): State<AppState>,
    RequireAdminAuth(admin): RequireAdminAuth,
    Json(request): Json<OpenRequest>,
) -> Result<(StatusCode, Json<CashRegister>)> {
    validate_balance(request.opening_balance)?;
    let register = CashRepository::new(state.pool())
        .open(request.opening_balance, &admin.name)
        .await?;
    tracing::info!(register_id = %register.id, "cash register opened");
    Ok((StatusCode::CREATED, Json(register)))
}

/// Add a manual entry to the open register.
#[instrument(skip(state, admin, request), fields(admin_id = %admin.id, kind = %request.kind))]
pub async fn add_entry(
    State(state): State<AppState>,
    RequireAdminAuth(admin): RequireAdminAuth,
    Json(request): Json<EntryRequest>,
) -> Result<(StatusCode, Json<CashEntry>)> {
    validate_entry(request.kind, request.payment_method, request.amount)?;

    let entry = NewCashEntry {
        kind: request.kind,
        payment_method: request.payment_method,
        amount: request.amount,
        description: non_blank(request.description.as_deref()),
        order_id: request.order_id,
        created_by: &admin.name,
    };
    let created = CashRepository::new(state.pool())
        .add_entry(&entry)
        .await?
        .ok_or(CashError::NotOpen)?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Close the open register with the counted balance.
#[instrument(skip(state, admin, request), fields(admin_id = %admin.id))]
pub async fn close(
    State(state): State<AppState>,
    RequireManager(admin): RequireManager,
    Json(request): Json<CloseRequest>,
) -> Result<Json<RegisterView>> {
    validate_balance(request.counted_balance)?;

    let repo = CashRepository::new(state.pool());
    let open = repo.current().await?.ok_or(CashError::NotOpen)?;
    let (register, summary) = repo
        .close(
            open.id,
            request.counted_balance,
            &admin.name,
            non_blank(request.notes.as_deref()),
        )
        .await?;
    let entries = repo.entries(register.id).await?;

    tracing::info!(
        register_id = %register.id,
        expected = %summary.expected_cash,
        counted = %request.counted_balance,
        "cash register closed"
    );
    Ok(Json(RegisterView {
        register,
        entries,
        summary,
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_request_parses_wire_names() {
        let request: EntryRequest = serde_json::from_str(
            r#"{"kind":"sangria","payment_method":"dinheiro","amount":"50.00","description":"troco"}"#,
        )
        .unwrap();
        assert_eq!(request.kind, CashEntryKind::Withdrawal);
        assert_eq!(request.amount, Money::from_cents(5000));
        assert!(request.order_id.is_none());
    }

    #[test]
    fn test_blank_notes_are_dropped() {
        assert_eq!(non_blank(Some("  ")), None);
        assert_eq!(non_blank(Some(" ok ")), Some("ok"));
        assert_eq!(non_blank(None), None);
    }
}
