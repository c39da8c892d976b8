//! Pizzaria back office library.
//!
//! This crate provides the admin functionality as a library, allowing it
//! to be tested and reused (the CLI creates operators through it).
//!
//! # Security
//!
//! Operators can move orders, touch the cash register and hold the fiscal
//! and WhatsApp provider tokens. Deploy behind the store network only.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod filters;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
