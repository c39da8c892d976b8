//! Loyalty program reads for checkout and the account page.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

use pizzaria_core::{CustomerId, OrderId, RewardId};
use pizzaria_core::loyalty::{LoyaltyConfig, Reward};

use super::{RepositoryError, query_with_retry};

/// One line of a customer's points statement.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LoyaltyEntry {
    pub order_id: Option<OrderId>,
    /// Positive for earned points, negative for redemptions.
    pub points: i32,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Repository for loyalty program reads.
pub struct LoyaltyRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> LoyaltyRepository<'a> {
    /// Create a new loyalty repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Current program settings.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails after retries.
    pub async fn config(&self) -> Result<LoyaltyConfig, RepositoryError> {
        let config = query_with_retry(|| {
            sqlx::query_as::<_, LoyaltyConfig>(
                r"
                SELECT enabled, points_per_real, min_order_value, points_expiry_days
                FROM loyalty_config WHERE id = 1
                ",
            )
            .fetch_optional(self.pool)
        })
        .await?;
        Ok(config.unwrap_or_default())
    }

    /// Rewards currently offered, cheapest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails after retries.
    pub async fn active_rewards(&self) -> Result<Vec<Reward>, RepositoryError> {
        query_with_retry(|| {
            sqlx::query_as::<_, Reward>(
                r"
                SELECT id, name, description, points_cost, discount, active
                FROM reward WHERE active
                ORDER BY points_cost
                ",
            )
            .fetch_all(self.pool)
        })
        .await
    }

    /// A reward by id, active or not.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn reward(&self, id: RewardId) -> Result<Option<Reward>, RepositoryError> {
        let reward = sqlx::query_as::<_, Reward>(
            "SELECT id, name, description, points_cost, discount, active FROM reward WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(reward)
    }

    /// The customer's most recent point movements, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails after retries.
    pub async fn statement(
        &self,
        customer_id: CustomerId,
        limit: i64,
    ) -> Result<Vec<LoyaltyEntry>, RepositoryError> {
        query_with_retry(|| {
            sqlx::query_as::<_, LoyaltyEntry>(
                r"
                SELECT order_id, points, description, created_at
                FROM loyalty_transaction
                WHERE customer_id = $1
                ORDER BY created_at DESC, id DESC
                LIMIT $2
                ",
            )
            .bind(customer_id)
            .bind(limit)
            .fetch_all(self.pool)
        })
        .await
    }
}
