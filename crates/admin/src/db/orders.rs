//! Kanban board, kitchen ticket and status move queries.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::instrument;

use pizzaria_core::kanban::OrderCard;
use pizzaria_core::order::{OrderLine, StatusChange};
use pizzaria_core::{CustomerId, Fulfillment, Money, OrderId, OrderStatus, PaymentMethod, Phone};

use super::{RepositoryError, query_with_retry};

/// Message shown when another operator moved the order first.
pub const CONCURRENT_CHANGE: &str = "o pedido foi alterado por outra pessoa; recarregue o quadro";

const CARD_SELECT: &str = r#"
    SELECT o.id AS order_id, o.status, o.customer_name, o.fulfillment, o.payment_method,
           o.total, o.created_at,
           COALESCE((SELECT SUM(i.quantity) FROM order_item i WHERE i.order_id = o.id), 0)::BIGINT
               AS item_count,
           (SELECT c.name FROM delivery d JOIN courier c ON c.id = d.courier_id
             WHERE d.order_id = o.id AND d.status <> 'cancelada') AS courier_name
    FROM "order" o
"#;

/// Order header as printed on the kitchen ticket.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TicketOrder {
    pub id: OrderId,
    pub status: OrderStatus,
    pub customer_name: String,
    pub customer_phone: String,
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

/// Ticket header with items and status history.
#[derive(Debug, Clone, Serialize)]
pub struct Ticket {
    pub order: TicketOrder,
    pub items: Vec<OrderLine>,
    pub history: Vec<StatusChange>,
}

/// Who an order belongs to and what it cost; used by post-move side effects.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderContact {
    pub id: OrderId,
    pub customer_id: Option<CustomerId>,
    pub customer_name: String,
    pub customer_phone: String,
    pub status: OrderStatus,
    pub fulfillment: Fulfillment,
    pub payment_method: PaymentMethod,
    pub total: Money,
}

impl OrderContact {
    /// The stored phone, if it still parses.
    #[must_use]
    pub fn phone(&self) -> Option<Phone> {
        Phone::parse(&self.customer_phone).ok()
    }
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

    /// Cards for the board: every open order, plus finished and cancelled
    /// orders last touched after `closed_since`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails after retries.
    #[instrument(skip(self))]
    pub async fn board_cards(
        &self,
        closed_since: DateTime<Utc>,
    ) -> Result<Vec<OrderCard>, RepositoryError> {
        let sql = format!(
            r"{CARD_SELECT}
            WHERE o.status IN ('pendente', 'preparando', 'saiu_entrega')
               OR o.updated_at >= $1
            ORDER BY o.created_at, o.id
            "
        );
        query_with_retry(|| {
            sqlx::query_as::<_, OrderCard>(&sql)
                .bind(closed_since)
                .fetch_all(self.pool)
        })
        .await
    }

    /// A single board card.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails after retries.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn card(&self, order_id: OrderId) -> Result<Option<OrderCard>, RepositoryError> {
        let sql = format!("{CARD_SELECT} WHERE o.id = $1");
        query_with_retry(|| {
            sqlx::query_as::<_, OrderCard>(&sql)
                .bind(order_id)
                .fetch_optional(self.pool)
        })
        .await
    }

    /// Load an order with items and history for the kitchen ticket.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails after retries.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn ticket(&self, order_id: OrderId) -> Result<Option<Ticket>, RepositoryError> {
        let header = query_with_retry(|| {
            sqlx::query_as::<_, TicketOrder>(
                r#"
                SELECT id, status, customer_name, customer_phone, fulfillment, payment_method,
                       address_text, subtotal, delivery_fee, discount, total, change_for,
                       notes, created_at
                FROM "order"
                WHERE id = $1
                "#,
            )
            .bind(order_id)
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

        let history = query_with_retry(|| {
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
        .await?;

        Ok(Some(Ticket {
            order,
            items,
            history,
        }))
    }

    /// Customer contact and totals of an order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails after retries.
    pub async fn contact(&self, order_id: OrderId) -> Result<Option<OrderContact>, RepositoryError> {
        query_with_retry(|| {
            sqlx::query_as::<_, OrderContact>(
                r#"
                SELECT id, customer_id, customer_name, customer_phone, status, fulfillment,
                       payment_method, total
                FROM "order"
                WHERE id = $1
                "#,
            )
            .bind(order_id)
            .fetch_optional(self.pool)
        })
        .await
    }

    /// Move an order from `from` to `to` and append the history row, in one
    /// transaction.
    ///
    /// The update only matches while the row still has status `from`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` when the order is no longer in
    /// `from` (or does not exist); nothing is written in that case.
    #[instrument(skip(self, changed_by), fields(order_id = %order_id, from = %from, to = %to))]
    pub async fn transition(
        &self,
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        changed_by: &str,
    ) -> Result<StatusChange, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(r#"UPDATE "order" SET status = $3 WHERE id = $1 AND status = $2"#)
            .bind(order_id)
            .bind(from)
            .bind(to)
            .execute(&mut *tx)
            .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            tracing::info!("status changed concurrently, move rejected");
            return Err(RepositoryError::Conflict(CONCURRENT_CHANGE.to_string()));
        }

        let change = sqlx::query_as::<_, StatusChange>(
            r"
            INSERT INTO order_status_history (order_id, from_status, to_status, changed_by)
            VALUES ($1, $2, $3, $4)
            RETURNING from_status, to_status, changed_by, created_at
            ",
        )
        .bind(order_id)
        .bind(from)
        .bind(to)
        .bind(changed_by)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(change)
    }
}
