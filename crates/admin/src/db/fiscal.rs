//! NFC-e provider settings and issued receipts.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::Serialize;
use sqlx::PgPool;
use tracing::instrument;

use pizzaria_core::{FiscalEnvironment, FiscalReceiptId, FiscalReceiptStatus, OrderId};

use super::{RepositoryError, query_with_retry};

const RECEIPT_COLUMNS: &str = "id, order_id, status, environment, access_key, number, series, \
                               error_message, created_at, updated_at";

/// A receipt left `pendente` longer than this is assumed abandoned and may
/// be emitted again.
const STALE_PENDING: &str = "2 minutes";

/// Provider settings. The token never leaves the server.
#[derive(Debug, Clone)]
pub struct FiscalConfig {
    pub enabled: bool,
    pub api_url: Option<String>,
    pub api_token: Option<SecretString>,
    pub environment: FiscalEnvironment,
}

#[derive(sqlx::FromRow)]
struct FiscalConfigRow {
    enabled: bool,
    api_url: Option<String>,
    api_token: Option<String>,
    environment: FiscalEnvironment,
}

impl From<FiscalConfigRow> for FiscalConfig {
    fn from(row: FiscalConfigRow) -> Self {
        Self {
            enabled: row.enabled,
            api_url: row.api_url,
            api_token: row.api_token.filter(|t| !t.is_empty()).map(SecretString::from),
            environment: row.environment,
        }
    }
}

impl Default for FiscalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: None,
            api_token: None,
            environment: FiscalEnvironment::Homologation,
        }
    }
}

/// An NFC-e for one order.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FiscalReceipt {
    pub id: FiscalReceiptId,
    pub order_id: OrderId,
    pub status: FiscalReceiptStatus,
    pub environment: FiscalEnvironment,
    /// 44-digit chave de acesso, once authorized.
    pub access_key: Option<String>,
    pub number: Option<String>,
    pub series: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Repository for fiscal receipts.
pub struct FiscalRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> FiscalRepository<'a> {
    /// Create a new fiscal repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Current provider settings.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails after retries.
    pub async fn config(&self) -> Result<FiscalConfig, RepositoryError> {
        let row = query_with_retry(|| {
            sqlx::query_as::<_, FiscalConfigRow>(
                "SELECT enabled, api_url, api_token, environment FROM fiscal_config WHERE id = 1",
            )
            .fetch_optional(self.pool)
        })
        .await?;
        Ok(row.map(FiscalConfig::from).unwrap_or_default())
    }

    /// Save provider settings. A `None` token keeps the stored one.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    #[instrument(skip(self, api_token))]
    pub async fn save_config(
        &self,
        enabled: bool,
        api_url: Option<&str>,
        api_token: Option<&str>,
        environment: FiscalEnvironment,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO fiscal_config (id, enabled, api_url, api_token, environment)
            VALUES (1, $1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
               SET enabled = EXCLUDED.enabled,
                   api_url = EXCLUDED.api_url,
                   api_token = COALESCE(EXCLUDED.api_token, fiscal_config.api_token),
                   environment = EXCLUDED.environment
            ",
        )
        .bind(enabled)
        .bind(api_url)
        .bind(api_token)
        .bind(environment)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// The receipt of an order, if one was ever requested.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails after retries.
    pub async fn receipt_for(&self, order_id: OrderId) -> Result<Option<FiscalReceipt>, RepositoryError> {
        let sql = format!("SELECT {RECEIPT_COLUMNS} FROM fiscal_receipt WHERE order_id = $1");
        query_with_retry(|| {
            sqlx::query_as::<_, FiscalReceipt>(&sql)
                .bind(order_id)
                .fetch_optional(self.pool)
        })
        .await
    }

    /// Most recent receipts, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails after retries.
    pub async fn recent(&self, limit: i64) -> Result<Vec<FiscalReceipt>, RepositoryError> {
        let sql = format!(
            "SELECT {RECEIPT_COLUMNS} FROM fiscal_receipt ORDER BY created_at DESC LIMIT $1"
        );
        query_with_retry(|| {
            sqlx::query_as::<_, FiscalReceipt>(&sql)
                .bind(limit)
                .fetch_all(self.pool)
        })
        .await
    }

    /// Claim the right to emit for an order, leaving the receipt `pendente`.
    ///
    /// Succeeds for a new order, a rejected receipt, or a pending receipt
    /// abandoned for a while. Returns `None` when another emission is in
    /// flight or the receipt is already authorized or cancelled.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the upsert fails.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn claim(
        &self,
        order_id: OrderId,
        environment: FiscalEnvironment,
    ) -> Result<Option<FiscalReceipt>, RepositoryError> {
        let receipt = sqlx::query_as::<_, FiscalReceipt>(&format!(
            r"
            INSERT INTO fiscal_receipt (order_id, status, environment)
            VALUES ($1, 'pendente', $2)
            ON CONFLICT (order_id) DO UPDATE
               SET status = 'pendente', environment = EXCLUDED.environment,
                   error_message = NULL, updated_at = NOW()
             WHERE fiscal_receipt.status = 'rejeitada'
                OR (fiscal_receipt.status = 'pendente'
                    AND fiscal_receipt.updated_at < NOW() - INTERVAL '{STALE_PENDING}')
            RETURNING {RECEIPT_COLUMNS}
            "
        ))
        .bind(order_id)
        .bind(environment)
        .fetch_optional(self.pool)
        .await?;
        Ok(receipt)
    }

    /// Store the provider's authorization.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn authorize(
        &self,
        order_id: OrderId,
        access_key: &str,
        number: Option<&str>,
        series: Option<&str>,
    ) -> Result<FiscalReceipt, RepositoryError> {
        sqlx::query_as::<_, FiscalReceipt>(&format!(
            r"
            UPDATE fiscal_receipt
               SET status = 'autorizada', access_key = $2, number = $3, series = $4,
                   error_message = NULL, updated_at = NOW()
             WHERE order_id = $1
            RETURNING {RECEIPT_COLUMNS}
            "
        ))
        .bind(order_id)
        .bind(access_key)
        .bind(number)
        .bind(series)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Store a rejection or transport failure; the order may be retried.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    #[instrument(skip(self, error_message), fields(order_id = %order_id))]
    pub async fn reject(
        &self,
        order_id: OrderId,
        error_message: &str,
    ) -> Result<FiscalReceipt, RepositoryError> {
        sqlx::query_as::<_, FiscalReceipt>(&format!(
            r"
            UPDATE fiscal_receipt
               SET status = 'rejeitada', error_message = $2, updated_at = NOW()
             WHERE order_id = $1
            RETURNING {RECEIPT_COLUMNS}
            "
        ))
        .bind(order_id)
        .bind(error_message)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Mark an authorized receipt as cancelled with the provider.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` unless the receipt is authorized.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn mark_cancelled(&self, order_id: OrderId) -> Result<FiscalReceipt, RepositoryError> {
        sqlx::query_as::<_, FiscalReceipt>(&format!(
            r"
            UPDATE fiscal_receipt
               SET status = 'cancelada', updated_at = NOW()
             WHERE order_id = $1 AND status = 'autorizada'
            RETURNING {RECEIPT_COLUMNS}
            "
        ))
        .bind(order_id)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| RepositoryError::Conflict("só notas autorizadas podem ser canceladas".to_string()))
    }
}
