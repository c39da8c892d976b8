//! Customer reviews and store replies.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::instrument;

use pizzaria_core::{OrderId, ReviewId};

use super::{RepositoryError, query_with_retry};

/// A review with the reviewer's name.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Review {
    pub id: ReviewId,
    pub order_id: OrderId,
    pub customer_name: Option<String>,
    /// 1 to 5.
    pub rating: i16,
    pub comment: Option<String>,
    pub reply: Option<String>,
    pub replied_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Average rating and count.
#[derive(Debug, Clone, Copy, Serialize, sqlx::FromRow)]
pub struct RatingSummary {
    pub count: i64,
    /// `None` when there are no reviews.
    pub average: Option<f64>,
}

const REVIEW_SELECT: &str = r"
    SELECT r.id, r.order_id, c.name AS customer_name, r.rating, r.comment, r.reply,
           r.replied_at, r.created_at
    FROM review r
    LEFT JOIN customer c ON c.id = r.customer_id
";

/// Repository for reviews.
pub struct ReviewRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ReviewRepository<'a> {
    /// Create a new review repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Reviews newest first, optionally only those still without a reply.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails after retries.
    pub async fn list(&self, unanswered_only: bool, limit: i64) -> Result<Vec<Review>, RepositoryError> {
        let sql = format!(
            r"{REVIEW_SELECT}
            WHERE NOT $1 OR r.reply IS NULL
            ORDER BY r.created_at DESC
            LIMIT $2
            "
        );
        query_with_retry(|| {
            sqlx::query_as::<_, Review>(&sql)
                .bind(unanswered_only)
                .bind(limit)
                .fetch_all(self.pool)
        })
        .await
    }

    /// Count and average rating over all reviews.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails after retries.
    pub async fn summary(&self) -> Result<RatingSummary, RepositoryError> {
        query_with_retry(|| {
            sqlx::query_as::<_, RatingSummary>(
                "SELECT COUNT(*) AS count, AVG(rating)::FLOAT8 AS average FROM review",
            )
            .fetch_one(self.pool)
        })
        .await
    }

    /// Set (or replace) the store's reply.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the review does not exist.
    #[instrument(skip(self, reply), fields(review_id = %id))]
    pub async fn reply(&self, id: ReviewId, reply: &str) -> Result<Review, RepositoryError> {
        let updated = sqlx::query("UPDATE review SET reply = $2, replied_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(reply)
            .execute(self.pool)
            .await?;
        if updated.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        let review = sqlx::query_as::<_, Review>(&format!("{REVIEW_SELECT} WHERE r.id = $1"))
            .bind(id)
            .fetch_one(self.pool)
            .await?;
        Ok(review)
    }
}
