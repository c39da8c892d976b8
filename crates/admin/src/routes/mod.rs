//! HTTP route handlers for the back office.
//!
//! # Route Structure
//!
//! ```text
//! # Auth
//! GET  /auth/login                       - Login page
//! POST /auth/login                       - Login action
//! POST /auth/logout                      - Logout action
//!
//! # Board (requires auth)
//! GET  /                                 - Kanban board
//! GET  /orders/{id}/ticket               - Printable kitchen ticket
//!
//! # JSON API (requires auth, manager where noted)
//! GET  /api/board                        - Board columns
//! GET  /api/board/events                 - "reload" ticks (SSE)
//! GET  /api/orders/{id}                  - Order with items and history
//! POST /api/orders/{id}/move             - Move a card {from, to}
//! POST /api/orders/{id}/courier          - Assign a courier
//! POST /api/orders/{id}/delivery         - Advance the delivery {from, to}
//! GET  /api/orders/{id}/fiscal           - Receipt of an order
//! POST /api/orders/{id}/fiscal           - Emit the NFC-e
//! POST /api/orders/{id}/fiscal/cancel    - Cancel the NFC-e (manager)
//! GET  /api/deliveries                   - Running and recent deliveries
//! GET  /api/deliveries/events            - "reload" ticks (SSE)
//! GET  /api/couriers                     - Couriers
//! POST /api/couriers                     - Add a courier (manager)
//! PUT  /api/couriers/{id}                - Update a courier (manager)
//! DELETE /api/couriers/{id}              - Remove a courier (manager)
//! GET  /api/cash                         - Open register, entries and summary
//! POST /api/cash/open                    - Open the register
//! POST /api/cash/entries                 - Add an entry
//! POST /api/cash/close                   - Close the register (manager)
//! GET  /api/cash/history                 - Closed registers
//! GET  /api/cash/{id}                    - One register with its entries
//! GET  /api/loyalty                      - Settings, rewards and top customers
//! PUT  /api/loyalty                      - Save settings (manager)
//! POST /api/loyalty/rewards              - Add a reward (manager)
//! PUT  /api/loyalty/rewards/{id}         - Update a reward (manager)
//! DELETE /api/loyalty/rewards/{id}       - Remove a reward (manager)
//! GET  /api/fiscal                       - Recent receipts
//! GET  /api/notifications                - Send history
//! POST /api/notifications/test           - Send a test message
//! GET  /api/reviews                      - Reviews and rating summary
//! POST /api/reviews/{id}/reply           - Reply to a review
//! GET  /api/reports/sales                - Sales report (manager)
//! GET  /api/reports/orders.csv           - Orders as CSV (manager)
//! GET  /api/settings/zones               - Delivery zones
//! POST /api/settings/zones               - Add a zone (manager)
//! PUT  /api/settings/zones/{id}          - Update a zone (manager)
//! DELETE /api/settings/zones/{id}        - Remove a zone (manager)
//! GET  /api/settings/fiscal              - Provider settings (manager)
//! PUT  /api/settings/fiscal              - Save provider settings (manager)
//! GET  /api/settings/notifications       - WhatsApp settings (manager)
//! PUT  /api/settings/notifications       - Save WhatsApp settings (manager)
//! GET  /api/admin-users                  - Operators (manager)
//! POST /api/admin-users                  - Add an operator (owner)
//! POST /api/admin-users/{id}/active      - Activate or deactivate (owner)
//! ```

pub mod admin_users;
pub mod auth;
pub mod cash;
pub mod deliveries;
pub mod fiscal;
pub mod kanban;
pub mod loyalty;
pub mod notifications;
pub mod orders;
pub mod reports;
pub mod reviews;
pub mod settings;

use axum::{
    Router,
    response::Redirect,
    routing::{get, post, put},
};
use serde::Deserialize;
use tower_sessions::Session;

use crate::models::{CurrentAdmin, session_keys};
use crate::state::AppState;

/// Rows returned by list endpoints that take no explicit limit.
pub const DEFAULT_LIST_LIMIT: i64 = 50;

/// Data every page layout needs.
#[derive(Debug, Clone)]
pub struct Layout {
    pub store_name: String,
    pub admin: Option<CurrentAdmin>,
}

impl Layout {
    /// Build the layout from the session.
    pub async fn load(state: &AppState, session: &Session) -> Self {
        let admin = session
            .get::<CurrentAdmin>(session_keys::CURRENT_ADMIN)
            .await
            .ok()
            .flatten();

        Self {
            store_name: state.config().store_name.clone(),
            admin,
        }
    }
}

/// Redirect back to a form page with a message in `?error=`.
#[must_use]
pub fn redirect_with_error(path: &str, message: &str) -> Redirect {
    let encoded: String = url::form_urlencoded::byte_serialize(message.as_bytes()).collect();
    let separator = if path.contains('?') { '&' } else { '?' };
    Redirect::to(&format!("{path}{separator}error={encoded}"))
}

/// Query parameters for error/success display.
#[derive(Debug, Default, Deserialize)]
pub struct MessageQuery {
    pub error: Option<String>,
    pub success: Option<String>,
}

/// `?limit=` for list endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

impl LimitQuery {
    /// Requested limit clamped to 1..=500.
    #[must_use]
    pub fn get(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, 500)
    }
}

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/logout", post(auth::logout))
}

/// Create the JSON API router.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/board", get(kanban::board))
        .route("/board/events", get(kanban::events))
        .route("/orders/{id}", get(orders::show))
        .route("/orders/{id}/move", post(kanban::move_card))
        .route("/orders/{id}/courier", post(deliveries::assign))
        .route("/orders/{id}/delivery", post(deliveries::advance))
        .route("/orders/{id}/fiscal", get(fiscal::show).post(fiscal::emit))
        .route("/orders/{id}/fiscal/cancel", post(fiscal::cancel))
        .route("/deliveries", get(deliveries::list))
        .route("/deliveries/events", get(deliveries::events))
        .route("/couriers", get(deliveries::couriers).post(deliveries::create_courier))
        .route(
            "/couriers/{id}",
            put(deliveries::update_courier).delete(deliveries::delete_courier),
        )
        .route("/cash", get(cash::current))
        .route("/cash/open", post(cash::open))
        .route("/cash/entries", post(cash::add_entry))
        .route("/cash/close", post(cash::close))
        .route("/cash/history", get(cash::history))
        .route("/cash/{id}", get(cash::show))
        .route("/loyalty", get(loyalty::overview).put(loyalty::save_config))
        .route("/loyalty/rewards", post(loyalty::create_reward))
        .route(
            "/loyalty/rewards/{id}",
            put(loyalty::update_reward).delete(loyalty::delete_reward),
        )
        .route("/fiscal", get(fiscal::recent))
        .route("/notifications", get(notifications::history))
        .route("/notifications/test", post(notifications::send_test))
        .route("/reviews", get(reviews::list))
        .route("/reviews/{id}/reply", post(reviews::reply))
        .route("/reports/sales", get(reports::sales))
        .route("/reports/orders.csv", get(reports::orders_csv_export))
        .nest("/settings", settings_routes())
        .route("/admin-users", get(admin_users::list).post(admin_users::create))
        .route("/admin-users/{id}/active", post(admin_users::set_active))
}

/// Create the settings routes router.
pub fn settings_routes() -> Router<AppState> {
    Router::new()
        .route("/zones", get(settings::zones).post(settings::create_zone))
        .route(
            "/zones/{id}",
            put(settings::update_zone).delete(settings::delete_zone),
        )
        .route(
            "/fiscal",
            get(settings::fiscal).put(settings::save_fiscal),
        )
        .route(
            "/notifications",
            get(settings::notifications).put(settings::save_notifications),
        )
}

/// Create the page routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(kanban::index))
        .route("/orders/{id}/ticket", get(orders::ticket))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::response::IntoResponse;

    use super::*;

    #[test]
    fn test_redirect_with_error_encodes_message() {
        let response = redirect_with_error("/auth/login", "senha inválida").into_response();
        assert_eq!(
            response.headers()["location"],
            "/auth/login?error=senha+inv%C3%A1lida"
        );
    }

    #[test]
    fn test_limit_is_clamped() {
        assert_eq!(LimitQuery::default().get(), DEFAULT_LIST_LIMIT);
        assert_eq!(LimitQuery { limit: Some(0) }.get(), 1);
        assert_eq!(LimitQuery { limit: Some(10_000) }.get(), 500);
    }
}
