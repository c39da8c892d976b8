//! Domain models for the storefront.

pub mod customer;
pub mod session;

pub use customer::{Address, AddressForm, Customer, NewAddress};
pub use session::{CurrentCustomer, keys as session_keys};
