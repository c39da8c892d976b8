//! Composite identity of a cart line.

use serde::Serialize;

use crate::{AddOnId, ProductId, StuffedCrustId};

/// Identity used to decide whether two cart lines are the same configuration.
///
/// Flavor and add-on ids are sorted on construction, so the key is
/// insensitive to the order in which the customer picked them. Notes and
/// prices are not part of the identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct LineKey {
    product_id: ProductId,
    size: String,
    flavors: Vec<ProductId>,
    add_ons: Vec<AddOnId>,
    stuffed_crust: Option<StuffedCrustId>,
}

impl LineKey {
    /// Build a normalized key.
    #[must_use]
    pub fn new(
        product_id: ProductId,
        size: &str,
        flavors: impl IntoIterator<Item = ProductId>,
        add_ons: impl IntoIterator<Item = AddOnId>,
        stuffed_crust: Option<StuffedCrustId>,
    ) -> Self {
        let mut flavors: Vec<ProductId> = flavors.into_iter().collect();
        flavors.sort_unstable();
        let mut add_ons: Vec<AddOnId> = add_ons.into_iter().collect();
        add_ons.sort_unstable();

        Self {
            product_id,
            size: size.trim().to_lowercase(),
            flavors,
            add_ons,
            stuffed_crust,
        }
    }

    /// Product the line was added from.
    #[must_use]
    pub const fn product_id(&self) -> ProductId {
        self.product_id
    }

    /// Normalized size.
    #[must_use]
    pub fn size(&self) -> &str {
        &self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(id: i32) -> ProductId {
        ProductId::new(id)
    }

    fn a(id: i32) -> AddOnId {
        AddOnId::new(id)
    }

    #[test]
    fn test_order_insensitive() {
        let left = LineKey::new(p(1), "grande", [p(3), p(2)], [a(9), a(4)], None);
        let right = LineKey::new(p(1), "grande", [p(2), p(3)], [a(4), a(9)], None);
        assert_eq!(left, right);
    }

    #[test]
    fn test_size_is_normalized() {
        let left = LineKey::new(p(1), " Grande ", [], [], None);
        let right = LineKey::new(p(1), "grande", [], [], None);
        assert_eq!(left, right);
        assert_eq!(left.size(), "grande");
    }

    #[test]
    fn test_every_component_distinguishes() {
        let base = LineKey::new(p(1), "media", [p(2)], [a(1)], None);
        assert_ne!(base, LineKey::new(p(5), "media", [p(2)], [a(1)], None));
        assert_ne!(base, LineKey::new(p(1), "grande", [p(2)], [a(1)], None));
        assert_ne!(base, LineKey::new(p(1), "media", [p(3)], [a(1)], None));
        assert_ne!(base, LineKey::new(p(1), "media", [p(2)], [a(2)], None));
        assert_ne!(
            base,
            LineKey::new(p(1), "media", [p(2)], [a(1)], Some(StuffedCrustId::new(1)))
        );
    }
}
