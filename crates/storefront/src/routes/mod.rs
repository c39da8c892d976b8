//! HTTP route handlers for the storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                          - Menu
//!
//! # Cart (session-backed)
//! GET  /cart                      - Cart page
//! POST /cart/add                  - Add a configured item from the menu form
//! POST /cart/update               - Set a line's quantity (0 removes)
//! POST /cart/remove               - Remove a line
//! POST /cart/clear                - Empty the cart
//! GET  /api/cart                  - Cart as JSON
//! POST /api/cart/actions          - Apply a `CartAction` (JSON), returns the cart
//!
//! # Checkout (requires auth)
//! GET  /checkout                  - Checkout form
//! POST /checkout                  - Place the order
//! GET  /api/delivery/quote?cep=   - Delivery fee for a CEP and the current cart
//!
//! # Orders (requires auth)
//! GET  /orders/{id}               - Tracking page
//! GET  /orders/{id}/events        - Status changes (SSE)
//!
//! # Auth
//! GET  /auth/login                - Login page
//! POST /auth/login                - Login action
//! GET  /auth/register             - Register page
//! POST /auth/register             - Register action
//! POST /auth/logout               - Logout action
//!
//! # Account (requires auth)
//! GET  /account                   - Profile, addresses, loyalty balance
//! POST /account/profile           - Update name and phone
//! GET  /account/orders            - Order history
//! POST /account/addresses         - Add an address
//! POST /account/addresses/{id}    - Update an address
//! POST /account/addresses/{id}/delete  - Delete an address
//! POST /account/addresses/{id}/default - Make an address the default
//! ```

pub mod account;
pub mod auth;
pub mod cart;
pub mod checkout;
pub mod menu;
pub mod orders;

use axum::{
    Router,
    response::Redirect,
    routing::{get, post},
};
use tower_sessions::Session;

use crate::models::{CurrentCustomer, session_keys};
use crate::state::AppState;

/// Data every page layout needs.
#[derive(Debug, Clone)]
pub struct Layout {
    pub store_name: String,
    pub customer: Option<CurrentCustomer>,
    pub cart_count: u32,
}

impl Layout {
    /// Build the layout from the session.
    pub async fn load(state: &AppState, session: &Session) -> Self {
        let customer = session
            .get::<CurrentCustomer>(session_keys::CURRENT_CUSTOMER)
            .await
            .ok()
            .flatten();
        let cart_count = cart::load_cart(session).await.item_count();

        Self {
            store_name: state.config().store_name.clone(),
            customer,
            cart_count,
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
#[derive(Debug, Default, serde::Deserialize)]
pub struct MessageQuery {
    pub error: Option<String>,
    pub success: Option<String>,
}

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/register", get(auth::register_page).post(auth::register))
        .route("/logout", post(auth::logout))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/add", post(cart::add))
        .route("/update", post(cart::update))
        .route("/remove", post(cart::remove))
        .route("/clear", post(cart::clear))
}

/// Create the JSON API router.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/cart", get(cart::json))
        .route("/cart/actions", post(cart::apply_action))
        .route("/delivery/quote", get(checkout::quote))
}

/// Create the order tracking routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/{id}", get(orders::show))
        .route("/{id}/events", get(orders::events))
}

/// Create the account routes router.
pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(account::index))
        .route("/profile", post(account::update_profile))
        .route("/orders", get(account::orders))
        .route("/addresses", post(account::create_address))
        .route("/addresses/{id}", post(account::update_address))
        .route("/addresses/{id}/delete", post(account::delete_address))
        .route("/addresses/{id}/default", post(account::set_default_address))
}

/// Create all routes for the storefront except auth and API, which get
/// their own rate limiters in `main`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(menu::index))
        .nest("/cart", cart_routes())
        .route("/checkout", get(checkout::show).post(checkout::place))
        .nest("/orders", order_routes())
        .nest("/account", account_routes())
}
