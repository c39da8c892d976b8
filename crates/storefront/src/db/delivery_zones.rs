//! Delivery fee zone lookup.

use sqlx::PgPool;
use tracing::instrument;

use pizzaria_core::Cep;
use pizzaria_core::delivery::DeliveryFeeZone;

use super::{RepositoryError, query_with_retry};

/// Repository for delivery zone lookups.
pub struct DeliveryZoneRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> DeliveryZoneRepository<'a> {
    /// Create a new delivery zone repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// The narrowest active zone covering `cep`, if any.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails after retries.
    #[instrument(skip(self), fields(cep = %cep))]
    pub async fn for_cep(&self, cep: &Cep) -> Result<Option<DeliveryFeeZone>, RepositoryError> {
        query_with_retry(|| {
            sqlx::query_as::<_, DeliveryFeeZone>(
                r"
                SELECT id, name, cep_start, cep_end, fee, min_order, free_above,
                       estimated_minutes, active
                FROM delivery_zone_for_cep($1)
                ",
            )
            .bind(cep)
            .fetch_optional(self.pool)
        })
        .await
    }
}
