//! Loyalty program settings, rewards catalogue and balances.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Serialize;
use tracing::instrument;

use pizzaria_core::RewardId;
use pizzaria_core::loyalty::{LoyaltyConfig, Reward};

use crate::db::LoyaltyRepository;
use crate::db::loyalty::{LoyaltyCustomer, RewardInput};
use crate::error::{AppError, Result};
use crate::middleware::{RequireAdminAuth, RequireManager};
use crate::state::AppState;

const TOP_CUSTOMERS: i64 = 20;

/// Everything the loyalty screen shows.
#[derive(Debug, Serialize)]
pub struct LoyaltyOverview {
    pub config: LoyaltyConfig,
    pub rewards: Vec<Reward>,
    pub top_customers: Vec<LoyaltyCustomer>,
}

fn check_reward(input: &RewardInput) -> Result<()> {
    if input.name.trim().is_empty() {
        return Err(AppError::BadRequest("informe o nome da recompensa".to_string()));
    }
    if input.points_cost <= 0 {
        return Err(AppError::BadRequest(
            "custo em pontos deve ser maior que zero".to_string(),
        ));
    }
    if input.discount.is_negative() {
        return Err(AppError::BadRequest("desconto não pode ser negativo".to_string()));
    }
    Ok(())
}

/// Settings, rewards and the customers with most points.
pub async fn overview(
    State(state): State<AppState>,
    RequireAdminAuth(_admin): RequireAdminAuth,
) -> Result<Json<LoyaltyOverview>> {
    let repo = LoyaltyRepository::new(state.pool());
    Ok(Json(LoyaltyOverview {
        config: repo.config().await?,
        rewards: repo.rewards().await?,
        top_customers: repo.top_customers(TOP_CUSTOMERS).await?,
    }))
}

/// Replace the program settings.
#[instrument(skip(state, admin, config), fields(admin_id = %admin.id))]
pub async fn save_config(
    State(state): State<AppState>,
    RequireManager(admin): RequireManager,
    Json(config): Json<LoyaltyConfig>,
) -> Result<Json<LoyaltyConfig>> {
    config.validate()?;
    let repo = LoyaltyRepository::new(state.pool());
    repo.save_config(&config).await?;
    tracing::info!(enabled = config.enabled, "loyalty settings saved");
    Ok(Json(repo.config().await?))
}

/// Add a reward.
pub async fn create_reward(
    State(state): State<AppState>,
    RequireManager(_admin): RequireManager,
    Json(input): Json<RewardInput>,
) -> Result<(StatusCode, Json<Reward>)> {
    check_reward(&input)?;
    let reward = LoyaltyRepository::new(state.pool())
        .create_reward(&input)
        .await?;
    Ok((StatusCode::CREATED, Json(reward)))
}

/// Replace a reward.
pub async fn update_reward(
    State(state): State<AppState>,
    RequireManager(_admin): RequireManager,
    Path(id): Path<RewardId>,
    Json(input): Json<RewardInput>,
) -> Result<Json<Reward>> {
    check_reward(&input)?;
    let reward = LoyaltyRepository::new(state.pool())
        .update_reward(id, &input)
        .await?;
    Ok(Json(reward))
}

/// Remove a reward.
pub async fn delete_reward(
    State(state): State<AppState>,
    RequireManager(_admin): RequireManager,
    Path(id): Path<RewardId>,
) -> Result<StatusCode> {
    LoyaltyRepository::new(state.pool()).delete_reward(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pizzaria_core::Money;

    use super::*;

    fn input(points_cost: i32, discount: Money) -> RewardInput {
        RewardInput {
            name: "Refrigerante 2L".to_string(),
            description: None,
            points_cost,
            discount,
            active: true,
        }
    }

    #[test]
    fn test_reward_needs_positive_cost() {
        assert!(check_reward(&input(100, Money::from_cents(1200))).is_ok());
        assert!(check_reward(&input(0, Money::from_cents(1200))).is_err());
        assert!(check_reward(&input(100, Money::from_cents(-1))).is_err());
    }

    #[test]
    fn test_reward_needs_a_name() {
        let mut blank = input(100, Money::ZERO);
        blank.name = "   ".to_string();
        assert!(matches!(check_reward(&blank), Err(AppError::BadRequest(_))));
    }
}
