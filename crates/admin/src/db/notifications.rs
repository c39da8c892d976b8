//! WhatsApp provider settings and the send log.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::Serialize;
use sqlx::PgPool;
use tracing::instrument;

use pizzaria_core::{NotificationId, NotificationStatus, OrderId, OrderStatus};

use super::{RepositoryError, query_with_retry};

/// Provider settings. The token never leaves the server.
#[derive(Debug, Clone)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub api_url: Option<String>,
    pub api_token: Option<SecretString>,
    /// Statuses that trigger a message.
    pub notify_statuses: Vec<OrderStatus>,
}

impl NotificationConfig {
    /// Returns `true` if moving an order to `status` should message the
    /// customer.
    #[must_use]
    pub fn notifies(&self, status: OrderStatus) -> bool {
        self.enabled && self.notify_statuses.contains(&status)
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: None,
            api_token: None,
            notify_statuses: vec![
                OrderStatus::Preparing,
                OrderStatus::OutForDelivery,
                OrderStatus::Finished,
            ],
        }
    }
}

#[derive(sqlx::FromRow)]
struct NotificationConfigRow {
    enabled: bool,
    api_url: Option<String>,
    api_token: Option<String>,
    notify_statuses: Vec<OrderStatus>,
}

impl From<NotificationConfigRow> for NotificationConfig {
    fn from(row: NotificationConfigRow) -> Self {
        Self {
            enabled: row.enabled,
            api_url: row.api_url,
            api_token: row.api_token.filter(|t| !t.is_empty()).map(SecretString::from),
            notify_statuses: row.notify_statuses,
        }
    }
}

/// One send attempt.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct NotificationRecord {
    pub id: NotificationId,
    pub order_id: Option<OrderId>,
    pub phone: String,
    pub message: String,
    pub status: NotificationStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Repository for notification settings and history.
pub struct NotificationRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> NotificationRepository<'a> {
    /// Create a new notification repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Current provider settings.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails after retries.
    pub async fn config(&self) -> Result<NotificationConfig, RepositoryError> {
        let row = query_with_retry(|| {
            sqlx::query_as::<_, NotificationConfigRow>(
                r"
                SELECT enabled, api_url, api_token, notify_statuses
                FROM notification_config WHERE id = 1
                ",
            )
            .fetch_optional(self.pool)
        })
        .await?;
        Ok(row.map(NotificationConfig::from).unwrap_or_default())
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
        notify_statuses: &[OrderStatus],
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO notification_config (id, enabled, api_url, api_token, notify_statuses)
            VALUES (1, $1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
               SET enabled = EXCLUDED.enabled,
                   api_url = EXCLUDED.api_url,
                   api_token = COALESCE(EXCLUDED.api_token, notification_config.api_token),
                   notify_statuses = EXCLUDED.notify_statuses
            ",
        )
        .bind(enabled)
        .bind(api_url)
        .bind(api_token)
        .bind(notify_statuses)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Append a send attempt to the history.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    #[instrument(skip(self, phone, message, error_message), fields(order_id = ?order_id, status = %status))]
    pub async fn record(
        &self,
        order_id: Option<OrderId>,
        phone: &str,
        message: &str,
        status: NotificationStatus,
        error_message: Option<&str>,
    ) -> Result<NotificationRecord, RepositoryError> {
        let record = sqlx::query_as::<_, NotificationRecord>(
            r"
            INSERT INTO notification_history (order_id, phone, message, status, error_message)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, order_id, phone, message, status, error_message, created_at
            ",
        )
        .bind(order_id)
        .bind(phone)
        .bind(message)
        .bind(status)
        .bind(error_message)
        .fetch_one(self.pool)
        .await?;
        Ok(record)
    }

    /// Most recent attempts, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails after retries.
    pub async fn history(&self, limit: i64) -> Result<Vec<NotificationRecord>, RepositoryError> {
        query_with_retry(|| {
            sqlx::query_as::<_, NotificationRecord>(
                r"
                SELECT id, order_id, phone, message, status, error_message, created_at
                FROM notification_history
                ORDER BY created_at DESC
                LIMIT $1
                ",
            )
            .bind(limit)
            .fetch_all(self.pool)
        })
        .await
    }
}
