//! Server-side repricing of a session cart.
//!
//! The cart arrives from the customer's session and carries the prices that
//! were current when each line was added. Before an order is written every
//! component is priced again against the live menu.

use super::{Cart, CartError};
use crate::{AddOnId, Money, ProductId, StuffedCrustId};

/// Current menu prices.
pub trait PriceCatalog {
    /// Price of `product` at `size`, or `None` if it is not sold that way.
    fn product_price(&self, product: ProductId, size: &str) -> Option<Money>;

    /// Price of an active add-on.
    fn add_on_price(&self, add_on: AddOnId) -> Option<Money>;

    /// Price of an active stuffed crust at `size`.
    fn stuffed_crust_price(&self, crust: StuffedCrustId, size: &str) -> Option<Money>;
}

/// Replace every price in `cart` with the catalog price and re-derive totals.
///
/// Returns `true` if any price changed.
///
/// # Errors
///
/// Returns [`CartError::Unavailable`] naming the first component that is no
/// longer sold; the cart is left unchanged in that case.
pub fn reprice<C: PriceCatalog + ?Sized>(cart: &mut Cart, catalog: &C) -> Result<bool, CartError> {
    let mut repriced = cart.clone();
    let mut changed = false;

    for line in repriced.lines_mut() {
        let price = catalog
            .product_price(line.product_id, &line.size)
            .ok_or_else(|| CartError::Unavailable(format!("{} ({})", line.name, line.size)))?;
        changed |= line.price != price;
        line.price = price;

        for flavor in &mut line.flavors {
            let price = catalog
                .product_price(flavor.product_id, &line.size)
                .ok_or_else(|| CartError::Unavailable(flavor.name.clone()))?;
            changed |= flavor.price != price;
            flavor.price = price;
        }

        for add_on in &mut line.add_ons {
            let price = catalog
                .add_on_price(add_on.id)
                .ok_or_else(|| CartError::Unavailable(add_on.name.clone()))?;
            changed |= add_on.price != price;
            add_on.price = price;
        }

        if let Some(crust) = line.stuffed_crust.as_mut() {
            let price = catalog
                .stuffed_crust_price(crust.id, &line.size)
                .ok_or_else(|| CartError::Unavailable(crust.name.clone()))?;
            changed |= crust.price != price;
            crust.price = price;
        }
    }

    repriced.reprice_all();
    *cart = repriced;
    Ok(changed)
}
