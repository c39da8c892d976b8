//! Database operations for the back office.
//!
//! ## Tables used
//!
//! - `order`, `order_item`, `order_status_history` - Kanban board, tickets, status moves
//! - `courier`, `delivery` - Couriers and delivery assignments
//! - `cash_register`, `cash_entry` - Register sessions and their entries
//! - `loyalty_config`, `reward`, `loyalty_transaction`, `customer.loyalty_points` - Loyalty
//! - `fiscal_config`, `fiscal_receipt` - NFC-e emission
//! - `notification_config`, `notification_history` - WhatsApp messages
//! - `review` - Customer reviews and replies
//! - `delivery_fee_zone` - Delivery zones
//! - `admin.admin_user`, `admin.session` - Back-office accounts and sessions
//!
//! # Migrations
//!
//! Migrations live in `migrations/` at the workspace root and run via:
//! ```bash
//! cargo run -p pizzaria-cli -- migrate
//! ```

pub mod admin_users;
pub mod cash;
pub mod deliveries;
pub mod delivery_zones;
pub mod fiscal;
pub mod loyalty;
pub mod notifications;
pub mod orders;
pub mod reports;
pub mod reviews;

use std::future::Future;
use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use admin_users::AdminUserRepository;
pub use cash::CashRepository;
pub use deliveries::DeliveryRepository;
pub use delivery_zones::DeliveryZoneRepository;
pub use fiscal::FiscalRepository;
pub use loyalty::LoyaltyRepository;
pub use notifications::NotificationRepository;
pub use orders::OrderRepository;
pub use reports::ReportRepository;
pub use reviews::ReviewRepository;

/// Attempts made by [`query_with_retry`] before giving up.
pub const RETRY_ATTEMPTS: u32 = 3;

/// Delay before the first retry; doubled on each subsequent one.
pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(5)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Returns `true` for errors worth retrying: pool exhaustion and I/O failures.
#[must_use]
pub const fn is_transient(error: &sqlx::Error) -> bool {
    matches!(
        error,
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
    )
}

/// Run a read query, retrying transient failures with exponential backoff.
///
/// # Errors
///
/// Returns the last error once [`RETRY_ATTEMPTS`] are exhausted, or the
/// first non-transient error immediately.
pub async fn query_with_retry<T, F, Fut>(mut operation: F) -> Result<T, RepositoryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    let policy = ExponentialBackoffBuilder::new()
        .with_initial_interval(RETRY_BASE_DELAY)
        .with_multiplier(2.0)
        .with_randomization_factor(0.0)
        .with_max_elapsed_time(None)
        .build();

    let mut attempt = 0;
    backoff::future::retry(policy, || {
        attempt += 1;
        let current = attempt;
        let query = operation();
        async move {
            query.await.map_err(|e| {
                if current < RETRY_ATTEMPTS && is_transient(&e) {
                    tracing::warn!(attempt = current, error = %e, "transient database error, retrying");
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        }
    })
    .await
    .map_err(RepositoryError::from)
}

/// Map a unique-constraint violation to [`RepositoryError::Conflict`].
pub(crate) fn conflict_on_unique(error: sqlx::Error, message: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = error
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(message.to_string());
    }
    RepositoryError::Database(error)
}

/// Map a foreign-key violation (row still referenced) to
/// [`RepositoryError::Conflict`].
pub(crate) fn conflict_on_reference(error: sqlx::Error, message: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = error
        && db_err.is_foreign_key_violation()
    {
        return RepositoryError::Conflict(message.to_string());
    }
    RepositoryError::Database(error)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(is_transient(&sqlx::Error::PoolTimedOut));
        assert!(is_transient(&sqlx::Error::PoolClosed));
        assert!(!is_transient(&sqlx::Error::RowNotFound));
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result = query_with_retry(|| {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(sqlx::Error::PoolTimedOut)
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_three_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), _> = query_with_retry(|| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(sqlx::Error::PoolTimedOut)
            }
        })
        .await;

        assert!(matches!(
            result,
            Err(RepositoryError::Database(sqlx::Error::PoolTimedOut))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), RETRY_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), _> = query_with_retry(|| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(sqlx::Error::RowNotFound)
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
