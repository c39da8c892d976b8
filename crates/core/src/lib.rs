//! Pizzaria Core - Shared domain library.
//!
//! This crate provides the types and pure logic used across all Pizzaria
//! components:
//! - `storefront` - Customer-facing menu, cart, checkout and order tracking
//! - `admin` - Back-office (kanban, deliveries, cash register, loyalty, fiscal)
//! - `cli` - Command-line tools for migrations, seeding and management
//!
//! # Architecture
//!
//! The core crate contains only types and logic - no I/O, no database access,
//! no HTTP clients. Everything here is deterministic and unit-testable.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, money, contact data and statuses
//! - [`cart`] - Cart pricing reducer
//! - [`kanban`] - Order board grouping and the move command
//! - [`checkout`] - Order totals for checkout
//! - [`delivery`] - Delivery fee zones
//! - [`cash`] - Cash register session summaries
//! - [`loyalty`] - Loyalty points and reward redemption
//! - [`order`] - Stored order items and status timeline
//! - [`realtime`] - Change notification payloads
//! - [`report`] - Sales report aggregation and CSV export
//! - [`validation`] - Form-facing validation results

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod cash;
pub mod checkout;
pub mod delivery;
pub mod kanban;
pub mod loyalty;
pub mod order;
pub mod realtime;
pub mod report;
pub mod secret;
pub mod types;
pub mod validation;

pub use types::*;
