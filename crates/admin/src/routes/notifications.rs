//! WhatsApp send history and test messages.

use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;
use tracing::instrument;

use pizzaria_core::Phone;

use super::LimitQuery;
use crate::db::NotificationRepository;
use crate::db::notifications::NotificationRecord;
use crate::error::Result;
use crate::middleware::{RequireAdminAuth, RequireManager};
use crate::services::Notifier;
use crate::state::AppState;

/// Body of a test message request.
#[derive(Debug, Deserialize)]
pub struct TestRequest {
    pub phone: Phone,
}

/// Send attempts, newest first.
pub async fn history(
    State(state): State<AppState>,
    RequireAdminAuth(_admin): RequireAdminAuth,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<NotificationRecord>>> {
    Ok(Json(
        NotificationRepository::new(state.pool())
            .history(query.get())
            .await?,
    ))
}

/// Send a test message with the saved settings. Provider failures come
/// back as a `falhou` record, not an error.
#[instrument(skip(state, admin, request), fields(admin_id = %admin.id))]
pub async fn send_test(
    State(state): State<AppState>,
    RequireManager(admin): RequireManager,
    Json(request): Json<TestRequest>,
) -> Result<Json<NotificationRecord>> {
    let record = Notifier::new(state.pool(), state.http(), &state.config().store_name)
        .test(&request.phone)
        .await?;
    Ok(Json(record))
}
