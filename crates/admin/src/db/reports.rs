//! Order and item loads for sales reports.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;

use pizzaria_core::report::{ReportItem, ReportOrder};

use super::{RepositoryError, query_with_retry};

/// Repository for report data. Periods are half-open: `[from, to)`.
pub struct ReportRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ReportRepository<'a> {
    /// Create a new report repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Orders placed in the period, oldest first. Includes cancelled ones.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails after retries.
    #[instrument(skip(self))]
    pub async fn orders(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ReportOrder>, RepositoryError> {
        query_with_retry(|| {
            sqlx::query_as::<_, ReportOrder>(
                r#"
                SELECT id AS order_id, created_at, customer_name, status, fulfillment,
                       payment_method, subtotal, delivery_fee, discount, total
                FROM "order"
                WHERE created_at >= $1 AND created_at < $2
                ORDER BY created_at, id
                "#,
            )
            .bind(from)
            .bind(to)
            .fetch_all(self.pool)
        })
        .await
    }

    /// Items of the orders placed in the period.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails after retries.
    #[instrument(skip(self))]
    pub async fn items(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ReportItem>, RepositoryError> {
        query_with_retry(|| {
            sqlx::query_as::<_, ReportItem>(
                r#"
                SELECT i.order_id, i.product_name, i.quantity, i.line_total
                FROM order_item i
                JOIN "order" o ON o.id = i.order_id
                WHERE o.created_at >= $1 AND o.created_at < $2
                "#,
            )
            .bind(from)
            .bind(to)
            .fetch_all(self.pool)
        })
        .await
    }
}
