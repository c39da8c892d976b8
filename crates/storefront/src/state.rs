//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use sqlx::PgPool;

use pizzaria_core::Cep;
use pizzaria_core::delivery::DeliveryFeeZone;

use crate::config::StorefrontConfig;
use crate::db::{DeliveryZoneRepository, MenuRepository, MenuSnapshot, RepositoryError};
use crate::services::OrderFeed;

/// Menu and zone lookups are cached briefly; admin edits show up within a minute.
const CACHE_TTL: Duration = Duration::from_secs(60);

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: PgPool,
    menu: Cache<(), Arc<MenuSnapshot>>,
    zones: Cache<Cep, Option<DeliveryFeeZone>>,
    orders: OrderFeed,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(config: StorefrontConfig, pool: PgPool, orders: OrderFeed) -> Self {
        let menu = Cache::builder()
            .max_capacity(1)
            .time_to_live(CACHE_TTL)
            .build();
        let zones = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(CACHE_TTL)
            .build();

        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                menu,
                zones,
                orders,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Order change feed for tracking pages.
    #[must_use]
    pub fn orders(&self) -> &OrderFeed {
        &self.inner.orders
    }

    /// Current menu, from cache when fresh.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the menu has to be loaded and the load fails.
    pub async fn menu(&self) -> Result<Arc<MenuSnapshot>, RepositoryError> {
        if let Some(menu) = self.inner.menu.get(&()).await {
            return Ok(menu);
        }
        let menu = Arc::new(MenuRepository::new(self.pool()).snapshot().await?);
        self.inner.menu.insert((), Arc::clone(&menu)).await;
        Ok(menu)
    }

    /// Delivery zone covering `cep`, from cache when fresh.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the lookup query fails.
    pub async fn zone_for(&self, cep: &Cep) -> Result<Option<DeliveryFeeZone>, RepositoryError> {
        if let Some(zone) = self.inner.zones.get(cep).await {
            return Ok(zone);
        }
        let zone = DeliveryZoneRepository::new(self.pool()).for_cep(cep).await?;
        self.inner.zones.insert(cep.clone(), zone.clone()).await;
        Ok(zone)
    }
}
