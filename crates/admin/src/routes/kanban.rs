//! Kanban board page, card moves and the board's reload stream.

use std::convert::Infallible;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Json,
    extract::{Path, State},
    response::{
        IntoResponse, Sse,
        sse::{Event, KeepAlive},
    },
};
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use pizzaria_core::kanban::{KanbanBoard, OrderCard};
use pizzaria_core::order::StatusChange;
use pizzaria_core::report::local_datetime;
use pizzaria_core::{Fulfillment, Money, OrderId, OrderStatus};

use super::Layout;
use crate::error::Result;
use crate::filters;
use crate::middleware::RequireAdminAuth;
use crate::services::KanbanService;
use crate::services::change_feed::{affects_board, reloads};
use crate::state::AppState;

/// Board page template.
#[derive(Template, WebTemplate)]
#[template(path = "kanban/index.html")]
pub struct BoardTemplate {
    pub layout: Layout,
    pub columns: Vec<ColumnView>,
}

/// A column as rendered on the page.
#[derive(Debug, Clone)]
pub struct ColumnView {
    pub status: OrderStatus,
    pub label: &'static str,
    pub total: Money,
    pub cards: Vec<CardView>,
}

/// A card as rendered on the page.
#[derive(Debug, Clone)]
pub struct CardView {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub customer_name: String,
    pub is_delivery: bool,
    pub payment: &'static str,
    pub total: Money,
    pub item_count: i64,
    pub courier_name: Option<String>,
    pub placed_at: String,
    pub waiting_minutes: i64,
}

impl CardView {
    fn new(card: &OrderCard, now: DateTime<Utc>) -> Self {
        Self {
            order_id: card.order_id,
            status: card.status,
            customer_name: card.customer_name.clone(),
            is_delivery: card.fulfillment == Fulfillment::Delivery,
            payment: card.payment_method.label(),
            total: card.total,
            item_count: card.item_count,
            courier_name: card.courier_name.clone(),
            placed_at: local_datetime(card.created_at),
            waiting_minutes: (now - card.created_at).num_minutes().max(0),
        }
    }
}

/// Page columns for a board as of `now`.
#[must_use]
pub fn board_view(board: &KanbanBoard, now: DateTime<Utc>) -> Vec<ColumnView> {
    board
        .columns()
        .iter()
        .map(|column| ColumnView {
            status: column.status,
            label: column.label(),
            total: column.total(),
            cards: column.cards.iter().map(|c| CardView::new(c, now)).collect(),
        })
        .collect()
}

/// Body of a move request. `from` is the column the operator saw the card
/// in; a stale value is rejected.
#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    pub from: OrderStatus,
    pub to: OrderStatus,
}

/// Reply to a committed move.
#[derive(Debug, Serialize)]
pub struct MoveResponse {
    pub change: StatusChange,
    pub board: KanbanBoard,
}

fn service(state: &AppState) -> KanbanService<'_> {
    KanbanService::new(state.pool(), state.http(), &state.config().store_name)
}

/// Render the board.
pub async fn index(
    State(state): State<AppState>,
    RequireAdminAuth(_admin): RequireAdminAuth,
    session: Session,
) -> Result<impl IntoResponse> {
    let board = service(&state).board().await?;
    Ok(BoardTemplate {
        layout: Layout::load(&state, &session).await,
        columns: board_view(&board, Utc::now()),
    })
}

/// Board as JSON, for the page script after a reload tick.
pub async fn board(
    State(state): State<AppState>,
    RequireAdminAuth(_admin): RequireAdminAuth,
) -> Result<Json<KanbanBoard>> {
    Ok(Json(service(&state).board().await?))
}

/// Move a card between columns.
#[instrument(skip(state, admin, request), fields(order_id = %id, admin_id = %admin.id))]
pub async fn move_card(
    State(state): State<AppState>,
    RequireAdminAuth(admin): RequireAdminAuth,
    Path(id): Path<OrderId>,
    Json(request): Json<MoveRequest>,
) -> Result<Json<MoveResponse>> {
    let outcome = service(&state)
        .move_card(id, request.from, request.to, &admin.name)
        .await?;
    Ok(Json(MoveResponse {
        change: outcome.change,
        board: outcome.board,
    }))
}

/// One `reload` event per burst of order or delivery changes.
pub async fn events(
    State(state): State<AppState>,
    RequireAdminAuth(_admin): RequireAdminAuth,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let ticks = reloads(
        state.changes().subscribe(),
        state.config().realtime_debounce,
        affects_board,
    );
    Sse::new(ticks.map(|()| Ok(reload_event()))).keep_alive(KeepAlive::default())
}

/// The event the page scripts listen for.
pub fn reload_event() -> Event {
    Event::default().event("reload").data("{}")
}
