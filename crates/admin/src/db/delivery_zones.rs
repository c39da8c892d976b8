//! Delivery fee zones as managed in settings.

use serde::Deserialize;
use sqlx::PgPool;
use tracing::instrument;

use pizzaria_core::delivery::{DeliveryFeeError, DeliveryFeeZone};
use pizzaria_core::{Cep, DeliveryZoneId, Money};

use super::{RepositoryError, query_with_retry};

const ZONE_COLUMNS: &str =
    "id, name, cep_start, cep_end, fee, min_order, free_above, estimated_minutes, active";

/// Zone fields as edited in settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ZoneInput {
    pub name: String,
    pub cep_start: Cep,
    pub cep_end: Cep,
    pub fee: Money,
    pub min_order: Option<Money>,
    pub free_above: Option<Money>,
    pub estimated_minutes: i32,
    pub active: bool,
}

impl ZoneInput {
    /// Check the CEP range before it reaches the database.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryFeeError::InvalidRange`] if start is after end.
    pub fn validate(&self) -> Result<(), DeliveryFeeError> {
        if self.cep_start.as_u32() > self.cep_end.as_u32() {
            return Err(DeliveryFeeError::InvalidRange {
                start: self.cep_start.clone(),
                end: self.cep_end.clone(),
            });
        }
        Ok(())
    }
}

/// Repository for delivery zones.
pub struct DeliveryZoneRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> DeliveryZoneRepository<'a> {
    /// Create a new delivery zone repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Every zone, ordered by range start.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails after retries.
    pub async fn list(&self) -> Result<Vec<DeliveryFeeZone>, RepositoryError> {
        let sql = format!("SELECT {ZONE_COLUMNS} FROM delivery_fee_zone ORDER BY cep_start, id");
        query_with_retry(|| sqlx::query_as::<_, DeliveryFeeZone>(&sql).fetch_all(self.pool)).await
    }

    /// A zone by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails after retries.
    pub async fn get(&self, id: DeliveryZoneId) -> Result<Option<DeliveryFeeZone>, RepositoryError> {
        let sql = format!("SELECT {ZONE_COLUMNS} FROM delivery_fee_zone WHERE id = $1");
        query_with_retry(|| {
            sqlx::query_as::<_, DeliveryFeeZone>(&sql)
                .bind(id)
                .fetch_optional(self.pool)
        })
        .await
    }

    /// Add a zone.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create(&self, input: &ZoneInput) -> Result<DeliveryFeeZone, RepositoryError> {
        let zone = sqlx::query_as::<_, DeliveryFeeZone>(&format!(
            r"
            INSERT INTO delivery_fee_zone
                (name, cep_start, cep_end, fee, min_order, free_above, estimated_minutes, active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {ZONE_COLUMNS}
            "
        ))
        .bind(&input.name)
        .bind(&input.cep_start)
        .bind(&input.cep_end)
        .bind(input.fee)
        .bind(input.min_order)
        .bind(input.free_above)
        .bind(input.estimated_minutes)
        .bind(input.active)
        .fetch_one(self.pool)
        .await?;
        Ok(zone)
    }

    /// Replace a zone.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the zone does not exist.
    #[instrument(skip(self, input), fields(zone_id = %id))]
    pub async fn update(
        &self,
        id: DeliveryZoneId,
        input: &ZoneInput,
    ) -> Result<DeliveryFeeZone, RepositoryError> {
        sqlx::query_as::<_, DeliveryFeeZone>(&format!(
            r"
            UPDATE delivery_fee_zone
               SET name = $2, cep_start = $3, cep_end = $4, fee = $5, min_order = $6,
                   free_above = $7, estimated_minutes = $8, active = $9
             WHERE id = $1
            RETURNING {ZONE_COLUMNS}
            "
        ))
        .bind(id)
        .bind(&input.name)
        .bind(&input.cep_start)
        .bind(&input.cep_end)
        .bind(input.fee)
        .bind(input.min_order)
        .bind(input.free_above)
        .bind(input.estimated_minutes)
        .bind(input.active)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Delete a zone. Past orders keep their fee and lose the reference.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the zone does not exist.
    #[instrument(skip(self), fields(zone_id = %id))]
    pub async fn delete(&self, id: DeliveryZoneId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM delivery_fee_zone WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn input(start: &str, end: &str) -> ZoneInput {
        ZoneInput {
            name: "Centro".to_string(),
            cep_start: start.parse().unwrap(),
            cep_end: end.parse().unwrap(),
            fee: Money::from_cents(500),
            min_order: None,
            free_above: None,
            estimated_minutes: 40,
            active: true,
        }
    }

    #[test]
    fn test_validate_accepts_single_cep_range() {
        assert!(input("01000-000", "01000-000").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_range() {
        let err = input("02000-000", "01000-000").validate().unwrap_err();
        assert!(matches!(err, DeliveryFeeError::InvalidRange { .. }));
    }
}
