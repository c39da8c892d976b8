//! Order creation and tracking queries.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::instrument;

use pizzaria_core::checkout::{OrderItemDraft, OrderTotals};
use pizzaria_core::order::{OrderLine, StatusChange};
use pizzaria_core::{
    AddressId, CustomerId, DeliveryZoneId, Fulfillment, Money, OrderId, OrderStatus, PaymentMethod,
    RewardId,
};

use super::{RepositoryError, query_with_retry};

/// Everything needed to write a new order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub customer_id: CustomerId,
    pub customer_name: String,
    pub customer_phone: String,
    pub fulfillment: Fulfillment,
    pub payment_method: PaymentMethod,
    pub address_id: Option<AddressId>,
    pub delivery_zone_id: Option<DeliveryZoneId>,
    pub totals: OrderTotals,
    pub change_for: Option<Money>,
    pub notes: Option<String>,
    pub items: Vec<OrderItemDraft>,
    pub redemption: Option<Redemption>,
}

/// A reward redeemed at checkout, debited in the same transaction.
#[derive(Debug, Clone, Copy)]
pub struct Redemption {
    pub reward_id: RewardId,
    pub points_cost: i32,
}

/// Order header as shown to the customer.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderHeader {
    pub id: OrderId,
    pub customer_id: Option<CustomerId>,
    pub status: OrderStatus,
    pub fulfillment: Fulfillment,
    pub payment_method: PaymentMethod,
    pub address_text: Option<String>,
    pub subtotal: Money,
    pub delivery_fee: Money,
    pub discount: Money,
    pub total: Money,
    pub change_for: Option<Money>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Order with its items and status timeline.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    pub order: OrderHeader,
    pub items: Vec<OrderLine>,
    pub history: Vec<StatusChange>,
}

/// One row of the customer's order history.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderSummary {
    pub id: OrderId,
    pub status: OrderStatus,
    pub fulfillment: Fulfillment,
    pub total: Money,
    pub item_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Repository for order database operations.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Write an order through `create_order(...)` and debit any redeemed
    /// reward, all in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the customer no longer has the
    /// points for the redeemed reward, `RepositoryError::Database` otherwise.
    #[instrument(skip(self, order), fields(customer_id = %order.customer_id, total = %order.totals.total))]
    pub async fn create(&self, order: &NewOrder) -> Result<OrderId, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let order_id: OrderId = sqlx::query_scalar(
            r"
            SELECT create_order($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ",
        )
        .bind(order.customer_id)
        .bind(&order.customer_name)
        .bind(&order.customer_phone)
        .bind(order.fulfillment)
        .bind(order.payment_method)
        .bind(order.address_id)
        .bind(order.delivery_zone_id)
        .bind(order.totals.subtotal)
        .bind(order.totals.delivery_fee)
        .bind(order.totals.discount)
        .bind(order.totals.total)
        .bind(order.change_for)
        .bind(&order.notes)
        .bind(Json(&order.items))
        .fetch_one(&mut *tx)
        .await?;

        if let Some(redemption) = order.redemption {
            let debited = sqlx::query(
                r"
                UPDATE customer SET loyalty_points = loyalty_points - $2
                WHERE id = $1 AND loyalty_points >= $2
                ",
            )
            .bind(order.customer_id)
            .bind(redemption.points_cost)
            .execute(&mut *tx)
            .await?;

            if debited.rows_affected() == 0 {
                // Dropping the transaction rolls the order back too.
                return Err(RepositoryError::Conflict(
                    "insufficient loyalty points".to_string(),
                ));
            }

            sqlx::query(
                r"
                INSERT INTO loyalty_transaction (customer_id, order_id, reward_id, points, description)
                VALUES ($1, $2, $3, $4, 'Resgate no pedido')
                ",
            )
            .bind(order.customer_id)
            .bind(order_id)
            .bind(redemption.reward_id)
            .bind(-redemption.points_cost)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(order_id)
    }

    /// Load an order belonging to `customer_id` with items and history.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails after retries.
    #[instrument(skip(self), fields(order_id = %order_id, customer_id = %customer_id))]
    pub async fn detail(
        &self,
        order_id: OrderId,
        customer_id: CustomerId,
    ) -> Result<Option<OrderDetail>, RepositoryError> {
        let header = query_with_retry(|| {
            sqlx::query_as::<_, OrderHeader>(
                r#"
                SELECT id, customer_id, status, fulfillment, payment_method, address_text,
                       subtotal, delivery_fee, discount, total, change_for, notes, created_at
                FROM "order"
                WHERE id = $1 AND customer_id = $2
                "#,
            )
            .bind(order_id)
            .bind(customer_id)
            .fetch_optional(self.pool)
        })
        .await?;

        let Some(order) = header else {
            return Ok(None);
        };

        let items = query_with_retry(|| {
            sqlx::query_as::<_, OrderLine>(
                r"
                SELECT order_id, product_name, size, flavors, add_ons,
                       COALESCE(stuffed_crust, 'null'::jsonb) AS stuffed_crust,
                       quantity, unit_price, line_total, notes
                FROM order_item
                WHERE order_id = $1
                ORDER BY id
                ",
            )
            .bind(order_id)
            .fetch_all(self.pool)
        })
        .await?;

        let history = self.history(order_id).await?;

        Ok(Some(OrderDetail {
            order,
            items,
            history,
        }))
    }

    /// Status timeline of an order, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails after retries.
    pub async fn history(&self, order_id: OrderId) -> Result<Vec<StatusChange>, RepositoryError> {
        query_with_retry(|| {
            sqlx::query_as::<_, StatusChange>(
                r"
                SELECT from_status, to_status, changed_by, created_at
                FROM order_status_history
                WHERE order_id = $1
                ORDER BY created_at, id
                ",
            )
            .bind(order_id)
            .fetch_all(self.pool)
        })
        .await
    }

    /// Current status of an order owned by `customer_id`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails after retries.
    pub async fn status(
        &self,
        order_id: OrderId,
        customer_id: CustomerId,
    ) -> Result<Option<OrderStatus>, RepositoryError> {
        query_with_retry(|| {
            sqlx::query_scalar::<_, OrderStatus>(
                r#"SELECT status FROM "order" WHERE id = $1 AND customer_id = $2"#,
            )
            .bind(order_id)
            .bind(customer_id)
            .fetch_optional(self.pool)
        })
        .await
    }

    /// The customer's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails after retries.
    #[instrument(skip(self), fields(customer_id = %customer_id))]
    pub async fn for_customer(
        &self,
        customer_id: CustomerId,
        limit: i64,
    ) -> Result<Vec<OrderSummary>, RepositoryError> {
        query_with_retry(|| {
            sqlx::query_as::<_, OrderSummary>(
                r#"
                SELECT o.id, o.status, o.fulfillment, o.total, o.created_at,
                       COALESCE(SUM(i.quantity), 0)::BIGINT AS item_count
                FROM "order" o
                LEFT JOIN order_item i ON i.order_id = o.id
                WHERE o.customer_id = $1
                GROUP BY o.id
                ORDER BY o.created_at DESC
                LIMIT $2
                "#,
            )
            .bind(customer_id)
            .bind(limit)
            .fetch_all(self.pool)
        })
        .await
    }
}
