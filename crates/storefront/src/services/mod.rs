//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `auth` - Customer registration and password login
//! - `order_feed` - Database change feed for order tracking

pub mod auth;
pub mod order_feed;

pub use order_feed::OrderFeed;
