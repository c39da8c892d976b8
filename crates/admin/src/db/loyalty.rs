//! Loyalty program settings, rewards catalogue and point credits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::instrument;

use pizzaria_core::loyalty::{LoyaltyConfig, Reward};
use pizzaria_core::{CustomerId, Money, OrderId, RewardId};

use super::{RepositoryError, query_with_retry};

const REWARD_COLUMNS: &str = "id, name, description, points_cost, discount, active";

/// Reward fields as edited in settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RewardInput {
    pub name: String,
    pub description: Option<String>,
    pub points_cost: i32,
    pub discount: Money,
    pub active: bool,
}

/// A customer with their points balance.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LoyaltyCustomer {
    pub customer_id: CustomerId,
    pub name: String,
    pub phone: String,
    pub loyalty_points: i32,
}

/// Repository for the loyalty program.
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

    /// Replace the program settings.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    #[instrument(skip(self, config), fields(enabled = config.enabled))]
    pub async fn save_config(&self, config: &LoyaltyConfig) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO loyalty_config (id, enabled, points_per_real, min_order_value, points_expiry_days)
            VALUES (1, $1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
               SET enabled = EXCLUDED.enabled,
                   points_per_real = EXCLUDED.points_per_real,
                   min_order_value = EXCLUDED.min_order_value,
                   points_expiry_days = EXCLUDED.points_expiry_days
            ",
        )
        .bind(config.enabled)
        .bind(config.points_per_real)
        .bind(config.min_order_value)
        .bind(config.points_expiry_days)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Every reward, active first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails after retries.
    pub async fn rewards(&self) -> Result<Vec<Reward>, RepositoryError> {
        let sql = format!("SELECT {REWARD_COLUMNS} FROM reward ORDER BY active DESC, points_cost");
        query_with_retry(|| sqlx::query_as::<_, Reward>(&sql).fetch_all(self.pool)).await
    }

    /// Add a reward.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_reward(&self, input: &RewardInput) -> Result<Reward, RepositoryError> {
        let reward = sqlx::query_as::<_, Reward>(&format!(
            r"
            INSERT INTO reward (name, description, points_cost, discount, active)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {REWARD_COLUMNS}
            "
        ))
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.points_cost)
        .bind(input.discount)
        .bind(input.active)
        .fetch_one(self.pool)
        .await?;
        Ok(reward)
    }

    /// Replace a reward.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the reward does not exist.
    #[instrument(skip(self, input), fields(reward_id = %id))]
    pub async fn update_reward(
        &self,
        id: RewardId,
        input: &RewardInput,
    ) -> Result<Reward, RepositoryError> {
        sqlx::query_as::<_, Reward>(&format!(
            r"
            UPDATE reward
               SET name = $2, description = $3, points_cost = $4, discount = $5, active = $6
             WHERE id = $1
            RETURNING {REWARD_COLUMNS}
            "
        ))
        .bind(id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.points_cost)
        .bind(input.discount)
        .bind(input.active)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Delete a reward. Past redemptions keep their ledger rows.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the reward does not exist.
    #[instrument(skip(self), fields(reward_id = %id))]
    pub async fn delete_reward(&self, id: RewardId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM reward WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Customers with the largest balances.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails after retries.
    pub async fn top_customers(&self, limit: i64) -> Result<Vec<LoyaltyCustomer>, RepositoryError> {
        query_with_retry(|| {
            sqlx::query_as::<_, LoyaltyCustomer>(
                r"
                SELECT id AS customer_id, name, phone, loyalty_points
                FROM customer
                WHERE loyalty_points > 0
                ORDER BY loyalty_points DESC, name
                LIMIT $1
                ",
            )
            .bind(limit)
            .fetch_all(self.pool)
        })
        .await
    }

    /// Credit the points earned by a finished order, once.
    ///
    /// The ledger's unique index on credited orders makes a repeated credit
    /// a no-op; the balance only moves when the ledger row is new. Returns
    /// `false` when the order had already been credited.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a statement fails.
    #[instrument(skip(self), fields(order_id = %order_id, customer_id = %customer_id, points))]
    pub async fn credit_order(
        &self,
        order_id: OrderId,
        customer_id: CustomerId,
        points: i32,
    ) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r"
            INSERT INTO loyalty_transaction (customer_id, order_id, points, description)
            VALUES ($1, $2, $3, 'Pontos do pedido #' || $2)
            ON CONFLICT (order_id) WHERE order_id IS NOT NULL AND points > 0 DO NOTHING
            ",
        )
        .bind(customer_id)
        .bind(order_id)
        .bind(points)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("UPDATE customer SET loyalty_points = loyalty_points + $2 WHERE id = $1")
            .bind(customer_id)
            .bind(points)
            .execute(&mut *tx)
            .await?;
        sqlx::query(r#"UPDATE "order" SET points_earned = $2 WHERE id = $1"#)
            .bind(order_id)
            .bind(points)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Zero the balances with no point movement since `cutoff`, writing a
    /// negative ledger row for each. Returns how many customers lost points.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the statement fails.
    #[instrument(skip(self))]
    pub async fn expire_points(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r"
            WITH stale AS (
                SELECT c.id, c.loyalty_points
                FROM customer c
                WHERE c.loyalty_points > 0
                  AND NOT EXISTS (
                      SELECT 1 FROM loyalty_transaction t
                      WHERE t.customer_id = c.id AND t.created_at >= $1
                  )
                FOR UPDATE
            ),
            ledger AS (
                INSERT INTO loyalty_transaction (customer_id, points, description)
                SELECT id, -loyalty_points, 'Pontos expirados' FROM stale
            )
            UPDATE customer c
            SET loyalty_points = GREATEST(c.loyalty_points - stale.loyalty_points, 0)
            FROM stale
            WHERE c.id = stale.id
            ",
        )
        .bind(cutoff)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
