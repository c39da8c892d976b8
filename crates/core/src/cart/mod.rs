//! Shopping cart with derived pricing.
//!
//! The cart is an ordered list of lines plus a derived total. Every mutation
//! re-derives the affected line's unit price and the cart total, rounding to
//! cents at each step:
//!
//! ```text
//! base       = max(product price, flavor prices)     (split pizzas)
//! unit price = base + Σ add-ons + stuffed crust
//! line total = unit price × quantity
//! cart total = Σ line totals
//! ```
//!
//! Lines with the same [`LineKey`] are merged instead of duplicated.

mod action;
mod catalog;
mod key;

pub use action::CartAction;
pub use catalog::{PriceCatalog, reprice};
pub use key::LineKey;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AddOnId, Money, ProductId, StuffedCrustId};

/// Maximum quantity of a single cart line.
pub const MAX_QUANTITY: u32 = 50;

/// Maximum number of flavors on a split pizza.
pub const MAX_FLAVORS: usize = 3;

/// Errors returned by cart operations.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CartError {
    /// No line with this id.
    #[error("item não encontrado no carrinho")]
    LineNotFound(Uuid),
    /// The line has no flavor with this product id.
    #[error("sabor não encontrado no item")]
    FlavorNotFound(ProductId),
    /// Attempt to add zero units.
    #[error("quantidade deve ser maior que zero")]
    ZeroQuantity,
    /// Too many flavors on one pizza.
    #[error("no máximo {max} sabores por pizza")]
    TooManyFlavors {
        /// Allowed maximum.
        max: usize,
    },
    /// A product, add-on or crust is no longer sold at the given size.
    #[error("item indisponível: {0}")]
    Unavailable(String),
}

/// One flavor of a (possibly split) pizza.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flavor {
    /// Product the flavor comes from.
    pub product_id: ProductId,
    /// Display name.
    pub name: String,
    /// Price of a whole pizza of this flavor at the line's size.
    pub price: Money,
    /// Per-flavor instructions ("sem cebola").
    #[serde(default)]
    pub notes: Option<String>,
}

/// Paid extra topping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddOn {
    /// Add-on id.
    pub id: AddOnId,
    /// Display name.
    pub name: String,
    /// Price per unit of the line.
    pub price: Money,
}

/// Stuffed crust option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StuffedCrust {
    /// Crust id.
    pub id: StuffedCrustId,
    /// Display name.
    pub name: String,
    /// Price per unit of the line.
    pub price: Money,
}

/// Input for adding a configuration to the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewItem {
    /// Product being added.
    pub product_id: ProductId,
    /// Display name.
    pub name: String,
    /// Size key (`broto`, `media`, `grande`, `familia`, `unico`).
    pub size: String,
    /// Product price at `size`.
    pub price: Money,
    /// Flavors for pizzas; empty for drinks and sides.
    #[serde(default)]
    pub flavors: Vec<Flavor>,
    /// Extra toppings.
    #[serde(default)]
    pub add_ons: Vec<AddOn>,
    /// Optional stuffed crust.
    #[serde(default)]
    pub stuffed_crust: Option<StuffedCrust>,
    /// Units to add.
    pub quantity: u32,
    /// Free-text instructions for the whole item.
    #[serde(default)]
    pub notes: Option<String>,
}

/// A priced cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    /// Stable id used by forms and the API.
    pub line_id: Uuid,
    /// Product the line was added from.
    pub product_id: ProductId,
    /// Display name.
    pub name: String,
    /// Size key.
    pub size: String,
    /// Product price at `size`, before flavors are considered.
    pub price: Money,
    /// Pizza flavors.
    pub flavors: Vec<Flavor>,
    /// Extra toppings.
    pub add_ons: Vec<AddOn>,
    /// Optional stuffed crust.
    pub stuffed_crust: Option<StuffedCrust>,
    /// Units, always within `1..=MAX_QUANTITY`.
    pub quantity: u32,
    /// Derived: `base + add-ons + crust`.
    pub unit_price: Money,
    /// Derived: `unit_price × quantity`.
    pub line_total: Money,
    /// Free-text instructions.
    pub notes: Option<String>,
}

impl CartLine {
    fn from_new(item: NewItem) -> Self {
        let mut line = Self {
            line_id: Uuid::new_v4(),
            product_id: item.product_id,
            name: item.name,
            size: item.size,
            price: item.price,
            flavors: item.flavors,
            add_ons: item.add_ons,
            stuffed_crust: item.stuffed_crust,
            quantity: item.quantity.clamp(1, MAX_QUANTITY),
            unit_price: Money::ZERO,
            line_total: Money::ZERO,
            notes: normalize_notes(item.notes),
        };
        line.reprice();
        line
    }

    /// Identity of this configuration.
    #[must_use]
    pub fn key(&self) -> LineKey {
        LineKey::new(
            self.product_id,
            &self.size,
            self.flavors.iter().map(|f| f.product_id),
            self.add_ons.iter().map(|a| a.id),
            self.stuffed_crust.as_ref().map(|c| c.id),
        )
    }

    /// Price before extras. Split pizzas cost as much as their most
    /// expensive flavor.
    #[must_use]
    pub fn base_price(&self) -> Money {
        self.flavors
            .iter()
            .map(|f| f.price)
            .fold(self.price, Money::max)
    }

    /// Sum of add-on prices for one unit.
    #[must_use]
    pub fn add_ons_total(&self) -> Money {
        self.add_ons.iter().map(|a| a.price).sum()
    }

    fn reprice(&mut self) {
        let crust = self
            .stuffed_crust
            .as_ref()
            .map_or(Money::ZERO, |c| c.price);
        self.unit_price = self.base_price() + self.add_ons_total() + crust;
        self.line_total = self.unit_price * self.quantity;
    }
}

/// The customer's cart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    lines: Vec<CartLine>,
    total: Money,
}

impl Cart {
    /// An empty cart.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines in insertion order.
    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// Derived cart total.
    #[must_use]
    pub const fn total(&self) -> Money {
        self.total
    }

    /// Returns `true` if the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Total number of units across lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    /// Look up a line by id.
    #[must_use]
    pub fn line(&self, line_id: Uuid) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.line_id == line_id)
    }

    /// Add a configuration, merging with an identical line if present.
    ///
    /// Returns the id of the line that now holds the units.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::ZeroQuantity`] or [`CartError::TooManyFlavors`].
    pub fn add(&mut self, item: NewItem) -> Result<Uuid, CartError> {
        if item.quantity == 0 {
            return Err(CartError::ZeroQuantity);
        }
        if item.flavors.len() > MAX_FLAVORS {
            return Err(CartError::TooManyFlavors { max: MAX_FLAVORS });
        }

        let incoming = CartLine::from_new(item);
        let key = incoming.key();

        let line_id = if let Some(existing) = self.lines.iter_mut().find(|l| l.key() == key) {
            existing.quantity = existing
                .quantity
                .saturating_add(incoming.quantity)
                .min(MAX_QUANTITY);
            if existing.notes.is_none() {
                existing.notes = incoming.notes;
            }
            existing.reprice();
            existing.line_id
        } else {
            let id = incoming.line_id;
            self.lines.push(incoming);
            id
        };

        self.recompute_total();
        Ok(line_id)
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::LineNotFound`] if the id is unknown.
    pub fn remove(&mut self, line_id: Uuid) -> Result<(), CartError> {
        let index = self.index_of(line_id)?;
        self.lines.remove(index);
        self.recompute_total();
        Ok(())
    }

    /// Set a line's quantity. Zero removes the line; other values are
    /// clamped to `1..=MAX_QUANTITY`.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::LineNotFound`] if the id is unknown.
    pub fn set_quantity(&mut self, line_id: Uuid, quantity: u32) -> Result<(), CartError> {
        if quantity == 0 {
            return self.remove(line_id);
        }
        self.update_line(line_id, |line| {
            line.quantity = quantity.min(MAX_QUANTITY);
            Ok(())
        })
    }

    /// Replace a line's add-ons.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::LineNotFound`] if the id is unknown.
    pub fn set_add_ons(&mut self, line_id: Uuid, add_ons: Vec<AddOn>) -> Result<(), CartError> {
        self.update_line(line_id, |line| {
            line.add_ons = add_ons;
            Ok(())
        })?;
        self.merge_duplicates_of(line_id);
        Ok(())
    }

    /// Replace or clear a line's stuffed crust.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::LineNotFound`] if the id is unknown.
    pub fn set_stuffed_crust(
        &mut self,
        line_id: Uuid,
        crust: Option<StuffedCrust>,
    ) -> Result<(), CartError> {
        self.update_line(line_id, |line| {
            line.stuffed_crust = crust;
            Ok(())
        })?;
        self.merge_duplicates_of(line_id);
        Ok(())
    }

    /// Change a line's size along with the prices valid for the new size.
    ///
    /// `flavor_prices` carries the new price of each flavor; flavors missing
    /// from it keep their current price.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::LineNotFound`] if the id is unknown.
    pub fn change_size(
        &mut self,
        line_id: Uuid,
        size: &str,
        price: Money,
        flavor_prices: &[(ProductId, Money)],
    ) -> Result<(), CartError> {
        self.update_line(line_id, |line| {
            size.clone_into(&mut line.size);
            line.price = price;
            for flavor in &mut line.flavors {
                if let Some((_, new_price)) =
                    flavor_prices.iter().find(|(id, _)| *id == flavor.product_id)
                {
                    flavor.price = *new_price;
                }
            }
            Ok(())
        })?;
        self.merge_duplicates_of(line_id);
        Ok(())
    }

    /// Set or clear a line's notes. No price effect.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::LineNotFound`] if the id is unknown.
    pub fn set_notes(&mut self, line_id: Uuid, notes: Option<String>) -> Result<(), CartError> {
        self.update_line(line_id, |line| {
            line.notes = normalize_notes(notes);
            Ok(())
        })
    }

    /// Set or clear the notes of one flavor of a line. No price effect.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::LineNotFound`] or [`CartError::FlavorNotFound`].
    pub fn set_flavor_notes(
        &mut self,
        line_id: Uuid,
        flavor_id: ProductId,
        notes: Option<String>,
    ) -> Result<(), CartError> {
        self.update_line(line_id, |line| {
            let flavor = line
                .flavors
                .iter_mut()
                .find(|f| f.product_id == flavor_id)
                .ok_or(CartError::FlavorNotFound(flavor_id))?;
            flavor.notes = normalize_notes(notes);
            Ok(())
        })
    }

    /// Remove every line.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.total = Money::ZERO;
    }

    fn index_of(&self, line_id: Uuid) -> Result<usize, CartError> {
        self.lines
            .iter()
            .position(|l| l.line_id == line_id)
            .ok_or(CartError::LineNotFound(line_id))
    }

    fn update_line<F>(&mut self, line_id: Uuid, f: F) -> Result<(), CartError>
    where
        F: FnOnce(&mut CartLine) -> Result<(), CartError>,
    {
        let line = self
            .lines
            .iter_mut()
            .find(|l| l.line_id == line_id)
            .ok_or(CartError::LineNotFound(line_id))?;
        f(line)?;
        line.reprice();
        self.recompute_total();
        Ok(())
    }

    /// After an edit changed a line's identity, fold it into an earlier line
    /// with the same key.
    fn merge_duplicates_of(&mut self, line_id: Uuid) {
        let Ok(index) = self.index_of(line_id) else {
            return;
        };
        let Some(key) = self.lines.get(index).map(CartLine::key) else {
            return;
        };
        let Some(target) = self
            .lines
            .iter()
            .position(|l| l.line_id != line_id && l.key() == key)
        else {
            return;
        };

        let moved = self.lines.remove(index);
        // `target` shifts left when it was after the removed line.
        let target = if target > index { target - 1 } else { target };
        if let Some(line) = self.lines.get_mut(target) {
            line.quantity = line
                .quantity
                .saturating_add(moved.quantity)
                .min(MAX_QUANTITY);
            if line.notes.is_none() {
                line.notes = moved.notes;
            }
            line.reprice();
        }
        self.recompute_total();
    }

    fn recompute_total(&mut self) {
        self.total = self.lines.iter().map(|l| l.line_total).sum();
    }

    /// Re-derive every line from its current components.
    pub(crate) fn reprice_all(&mut self) {
        for line in &mut self.lines {
            line.reprice();
        }
        self.recompute_total();
    }

    pub(crate) fn lines_mut(&mut self) -> &mut [CartLine] {
        &mut self.lines
    }
}

fn normalize_notes(notes: Option<String>) -> Option<String> {
    notes
        .map(|n| n.trim().to_owned())
        .filter(|n| !n.is_empty())
}
