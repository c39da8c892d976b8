//! Integration tests for the pizzaria platform.
//!
//! # Running Tests
//!
//! ```bash
//! # Cross-crate tests, no database needed
//! cargo test -p pizzaria-integration-tests
//!
//! # Live back-office tests: start the admin server, then
//! ADMIN_TEST_EMAIL=... ADMIN_TEST_PASSWORD=... \
//!     cargo test -p pizzaria-integration-tests -- --ignored
//! ```
//!
//! # Test Files
//!
//! - `kanban_flow` - board moves, undo and move preconditions
//! - `cart_checkout` - cart pricing, merging and checkout totals
//! - `sales_reports` - report aggregation, CSV export and periods
//! - `change_feed` - reload debouncing over the change feed
//! - `admin_api` - login and board endpoints against a running server

use chrono::{DateTime, TimeZone, Utc};
use pizzaria_core::kanban::OrderCard;
use pizzaria_core::{Fulfillment, Money, OrderId, OrderStatus, PaymentMethod};

/// A delivery order card placed at `placed_at`.
#[must_use]
pub fn card(id: i32, status: OrderStatus, placed_at: DateTime<Utc>) -> OrderCard {
    OrderCard {
        order_id: OrderId::new(id),
        status,
        customer_name: format!("Cliente {id}"),
        fulfillment: Fulfillment::Delivery,
        payment_method: PaymentMethod::Pix,
        total: Money::from_cents(5000),
        item_count: 1,
        courier_name: None,
        created_at: placed_at,
    }
}

/// Fixed instant used by the tests: 10/05/2024 19:00 in store local time.
#[must_use]
pub fn evening() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 10, 22, 0, 0)
        .single()
        .unwrap_or_default()
}
