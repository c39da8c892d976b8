//! Core types for the Pizzaria platform.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod cep;
pub mod email;
pub mod id;
pub mod money;
pub mod phone;
pub mod status;

pub use cep::{Cep, CepError};
pub use email::{Email, EmailError};
pub use id::*;
pub use money::{Money, MoneyError};
pub use phone::{Phone, PhoneError};
pub use status::*;
