//! Background expiry of idle loyalty balances.

use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;
use tokio::time::{MissedTickBehavior, interval};

use crate::db::{LoyaltyRepository, RepositoryError};

/// Time between expiry sweeps.
pub const EXPIRY_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Run one sweep with the current settings. Returns the number of
/// customers whose points expired.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if loading settings or the update fails.
pub async fn expire_idle_points(pool: &PgPool) -> Result<u64, RepositoryError> {
    let loyalty = LoyaltyRepository::new(pool);
    let Some(cutoff) = loyalty.config().await?.expiry_cutoff(Utc::now()) else {
        return Ok(0);
    };
    loyalty.expire_points(cutoff).await
}

/// Spawn the sweep loop. The first sweep runs at startup.
pub fn spawn_expiry_sweep(pool: PgPool) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticks = interval(EXPIRY_SWEEP_INTERVAL);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticks.tick().await;
            match expire_idle_points(&pool).await {
                Ok(0) => tracing::debug!("no loyalty points expired"),
                Ok(customers) => tracing::info!(customers, "loyalty points expired"),
                Err(e) => tracing::error!(error = %e, "loyalty expiry sweep failed"),
            }
        }
    })
}
