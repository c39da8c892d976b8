//! Customer reviews and replies.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};

use pizzaria_core::ReviewId;

use super::DEFAULT_LIST_LIMIT;
use crate::db::ReviewRepository;
use crate::db::reviews::{RatingSummary, Review};
use crate::error::{AppError, Result};
use crate::middleware::RequireAdminAuth;
use crate::state::AppState;

/// Longest reply accepted.
const MAX_REPLY_CHARS: usize = 1000;

/// `?unanswered=true` lists only reviews without a reply.
#[derive(Debug, Default, Deserialize)]
pub struct ReviewQuery {
    #[serde(default)]
    pub unanswered: bool,
}

/// Reviews with the overall rating.
#[derive(Debug, Serialize)]
pub struct ReviewList {
    pub summary: RatingSummary,
    pub reviews: Vec<Review>,
}

/// Body of a reply.
#[derive(Debug, Deserialize)]
pub struct ReplyRequest {
    pub reply: String,
}

fn check_reply(reply: &str) -> Result<&str> {
    let reply = reply.trim();
    if reply.is_empty() {
        return Err(AppError::BadRequest("resposta vazia".to_string()));
    }
    if reply.chars().count() > MAX_REPLY_CHARS {
        return Err(AppError::BadRequest(format!(
            "resposta deve ter no máximo {MAX_REPLY_CHARS} caracteres"
        )));
    }
    Ok(reply)
}

/// Reviews newest first, with count and average.
pub async fn list(
    State(state): State<AppState>,
    RequireAdminAuth(_admin): RequireAdminAuth,
    Query(query): Query<ReviewQuery>,
) -> Result<Json<ReviewList>> {
    let repo = ReviewRepository::new(state.pool());
    Ok(Json(ReviewList {
        summary: repo.summary().await?,
        reviews: repo.list(query.unanswered, DEFAULT_LIST_LIMIT).await?,
    }))
}

/// Set or replace the store's reply.
pub async fn reply(
    State(state): State<AppState>,
    RequireAdminAuth(_admin): RequireAdminAuth,
    Path(id): Path<ReviewId>,
    Json(request): Json<ReplyRequest>,
) -> Result<Json<Review>> {
    let text = check_reply(&request.reply)?;
    Ok(Json(ReviewRepository::new(state.pool()).reply(id, text).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_is_trimmed_and_bounded() {
        assert_eq!(check_reply("  Obrigado!  ").ok(), Some("Obrigado!"));
        assert!(check_reply("   ").is_err());
        assert!(check_reply(&"a".repeat(MAX_REPLY_CHARS + 1)).is_err());
    }
}
