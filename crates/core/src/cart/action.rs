//! Reducer-style entry point for cart mutations.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AddOn, Cart, CartError, NewItem, StuffedCrust};
use crate::{Money, ProductId};

/// A single cart mutation, as posted by the storefront.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CartAction {
    /// Add a configuration (merging with an identical line).
    Add(NewItem),
    /// Remove a line.
    Remove {
        /// Target line.
        line_id: Uuid,
    },
    /// Set the quantity of a line; zero removes it.
    SetQuantity {
        /// Target line.
        line_id: Uuid,
        /// New quantity.
        quantity: u32,
    },
    /// Replace the add-ons of a line.
    SetAddOns {
        /// Target line.
        line_id: Uuid,
        /// New add-ons.
        add_ons: Vec<AddOn>,
    },
    /// Replace or clear the stuffed crust of a line.
    SetStuffedCrust {
        /// Target line.
        line_id: Uuid,
        /// New crust, or `None` to remove it.
        stuffed_crust: Option<StuffedCrust>,
    },
    /// Change the size of a line.
    ChangeSize {
        /// Target line.
        line_id: Uuid,
        /// New size key.
        size: String,
        /// Product price at the new size.
        price: Money,
        /// Flavor prices at the new size.
        #[serde(default)]
        flavor_prices: Vec<(ProductId, Money)>,
    },
    /// Set or clear the notes of a line.
    SetNotes {
        /// Target line.
        line_id: Uuid,
        /// New notes.
        notes: Option<String>,
    },
    /// Set or clear the notes of one flavor.
    SetFlavorNotes {
        /// Target line.
        line_id: Uuid,
        /// Flavor to annotate.
        flavor_id: ProductId,
        /// New notes.
        notes: Option<String>,
    },
    /// Empty the cart.
    Clear,
}

impl Cart {
    /// Apply an action to the cart.
    ///
    /// # Errors
    ///
    /// Propagates the [`CartError`] of the underlying operation; the cart is
    /// left unchanged on error.
    pub fn apply(&mut self, action: CartAction) -> Result<(), CartError> {
        match action {
            CartAction::Add(item) => self.add(item).map(|_| ()),
            CartAction::Remove { line_id } => self.remove(line_id),
            CartAction::SetQuantity { line_id, quantity } => self.set_quantity(line_id, quantity),
            CartAction::SetAddOns { line_id, add_ons } => self.set_add_ons(line_id, add_ons),
            CartAction::SetStuffedCrust {
                line_id,
                stuffed_crust,
            } => self.set_stuffed_crust(line_id, stuffed_crust),
            CartAction::ChangeSize {
                line_id,
                size,
                price,
                flavor_prices,
            } => self.change_size(line_id, &size, price, &flavor_prices),
            CartAction::SetNotes { line_id, notes } => self.set_notes(line_id, notes),
            CartAction::SetFlavorNotes {
                line_id,
                flavor_id,
                notes,
            } => self.set_flavor_notes(line_id, flavor_id, notes),
            CartAction::Clear => {
                self.clear();
                Ok(())
            }
        }
    }
}
