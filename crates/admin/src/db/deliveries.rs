//! Couriers (motoboys) and delivery runs.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::instrument;

use pizzaria_core::{CourierId, DeliveryId, DeliveryStatus, Money, OrderId, OrderStatus, Phone};

use super::{RepositoryError, conflict_on_reference, query_with_retry};

const COURIER_COLUMNS: &str = "id, name, phone, active, created_at";

const DELIVERY_SELECT: &str = r#"
    SELECT d.id, d.order_id, d.courier_id, c.name AS courier_name, d.status,
           d.assigned_at, d.picked_up_at, d.delivered_at,
           o.customer_name, o.address_text, o.total, o.status AS order_status
    FROM delivery d
    JOIN courier c ON c.id = d.courier_id
    JOIN "order" o ON o.id = d.order_id
"#;

/// A courier.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Courier {
    pub id: CourierId,
    pub name: String,
    pub phone: Phone,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// A delivery run joined with its courier and order.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DeliveryRow {
    pub id: DeliveryId,
    pub order_id: OrderId,
    pub courier_id: CourierId,
    pub courier_name: String,
    pub status: DeliveryStatus,
    pub assigned_at: DateTime<Utc>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub customer_name: String,
    pub address_text: Option<String>,
    pub total: Money,
    pub order_status: OrderStatus,
}

/// Repository for couriers and deliveries.
pub struct DeliveryRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> DeliveryRepository<'a> {
    /// Create a new delivery repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Couriers
    // =========================================================================

    /// All couriers, active first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails after retries.
    pub async fn couriers(&self) -> Result<Vec<Courier>, RepositoryError> {
        let sql = format!("SELECT {COURIER_COLUMNS} FROM courier ORDER BY active DESC, name");
        query_with_retry(|| sqlx::query_as::<_, Courier>(&sql).fetch_all(self.pool)).await
    }

    /// A courier by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn courier(&self, id: CourierId) -> Result<Option<Courier>, RepositoryError> {
        let courier = sqlx::query_as::<_, Courier>(&format!(
            "SELECT {COURIER_COLUMNS} FROM courier WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(courier)
    }

    /// Add a courier.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    #[instrument(skip(self, phone))]
    pub async fn create_courier(&self, name: &str, phone: &Phone) -> Result<Courier, RepositoryError> {
        let courier = sqlx::query_as::<_, Courier>(&format!(
            "INSERT INTO courier (name, phone) VALUES ($1, $2) RETURNING {COURIER_COLUMNS}"
        ))
        .bind(name)
        .bind(phone)
        .fetch_one(self.pool)
        .await?;
        Ok(courier)
    }

    /// Replace a courier's details.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the courier does not exist.
    #[instrument(skip(self, phone), fields(courier_id = %id))]
    pub async fn update_courier(
        &self,
        id: CourierId,
        name: &str,
        phone: &Phone,
        active: bool,
    ) -> Result<Courier, RepositoryError> {
        sqlx::query_as::<_, Courier>(&format!(
            r"
            UPDATE courier SET name = $2, phone = $3, active = $4
            WHERE id = $1
            RETURNING {COURIER_COLUMNS}
            "
        ))
        .bind(id)
        .bind(name)
        .bind(phone)
        .bind(active)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Delete a courier who never delivered anything.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if deliveries reference the
    /// courier; deactivate instead. `RepositoryError::NotFound` if missing.
    #[instrument(skip(self), fields(courier_id = %id))]
    pub async fn delete_courier(&self, id: CourierId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM courier WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| {
                conflict_on_reference(e, "motoboy possui entregas; desative em vez de excluir")
            })?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    // =========================================================================
    // Deliveries
    // =========================================================================

    /// Deliveries still running, plus those closed after `closed_since`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails after retries.
    pub async fn list(&self, closed_since: DateTime<Utc>) -> Result<Vec<DeliveryRow>, RepositoryError> {
        let sql = format!(
            r"{DELIVERY_SELECT}
            WHERE d.status IN ('aguardando', 'em_rota')
               OR COALESCE(d.delivered_at, d.assigned_at) >= $1
            ORDER BY d.assigned_at
            "
        );
        query_with_retry(|| {
            sqlx::query_as::<_, DeliveryRow>(&sql)
                .bind(closed_since)
                .fetch_all(self.pool)
        })
        .await
    }

    /// The delivery of an order, if one was assigned.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails after retries.
    pub async fn for_order(&self, order_id: OrderId) -> Result<Option<DeliveryRow>, RepositoryError> {
        let sql = format!("{DELIVERY_SELECT} WHERE d.order_id = $1");
        query_with_retry(|| {
            sqlx::query_as::<_, DeliveryRow>(&sql)
                .bind(order_id)
                .fetch_optional(self.pool)
        })
        .await
    }

    /// Assign (or reassign) a courier. The run starts over as `aguardando`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the upsert fails.
    #[instrument(skip(self), fields(order_id = %order_id, courier_id = %courier_id))]
    pub async fn assign(
        &self,
        order_id: OrderId,
        courier_id: CourierId,
    ) -> Result<DeliveryId, RepositoryError> {
        let id = sqlx::query_scalar::<_, DeliveryId>(
            r"
            INSERT INTO delivery (order_id, courier_id)
            VALUES ($1, $2)
            ON CONFLICT (order_id) DO UPDATE
               SET courier_id = EXCLUDED.courier_id,
                   status = 'aguardando',
                   assigned_at = NOW(),
                   picked_up_at = NULL,
                   delivered_at = NULL
            RETURNING id
            ",
        )
        .bind(order_id)
        .bind(courier_id)
        .fetch_one(self.pool)
        .await?;
        Ok(id)
    }

    /// Move a delivery from `from` to `to`, stamping pickup or arrival time.
    /// Only matches while the run is still in `from`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the run is no longer in `from`.
    #[instrument(skip(self), fields(order_id = %order_id, from = %from, to = %to))]
    pub async fn set_status(
        &self,
        order_id: OrderId,
        from: DeliveryStatus,
        to: DeliveryStatus,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE delivery
               SET status = $3,
                   picked_up_at = CASE WHEN $3 = 'em_rota'::delivery_status THEN NOW() ELSE picked_up_at END,
                   delivered_at = CASE WHEN $3 = 'entregue'::delivery_status THEN NOW() ELSE delivered_at END
             WHERE order_id = $1 AND status = $2
            ",
        )
        .bind(order_id)
        .bind(from)
        .bind(to)
        .execute(self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(
                "entrega alterada por outra pessoa".to_string(),
            ));
        }
        Ok(())
    }

    /// Cancel a running delivery so the courier is free again.
    /// Returns `false` when there was nothing to release.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn release(&self, order_id: OrderId) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE delivery SET status = 'cancelada'
            WHERE order_id = $1 AND status IN ('aguardando', 'em_rota')
            ",
        )
        .bind(order_id)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
