//! Stored order items and status history, as shown on order pages and
//! kitchen tickets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checkout::{ExtraDraft, FlavorDraft};
use crate::{AddOnId, Money, OrderId, OrderStatus, StuffedCrustId};

/// One persisted order item.
///
/// Columns holding JSON must never be SQL `NULL`; select the crust with
/// `COALESCE(stuffed_crust, 'null'::jsonb)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct OrderLine {
    /// Order the item belongs to.
    pub order_id: OrderId,
    /// Product name at purchase time.
    pub product_name: String,
    /// Size at purchase time.
    pub size: String,
    /// Flavors; two or more make a split pizza.
    #[cfg_attr(feature = "postgres", sqlx(json))]
    pub flavors: Vec<FlavorDraft>,
    /// Add-ons with their prices.
    #[cfg_attr(feature = "postgres", sqlx(json))]
    pub add_ons: Vec<ExtraDraft<AddOnId>>,
    /// Stuffed crust, if any.
    #[cfg_attr(feature = "postgres", sqlx(json))]
    pub stuffed_crust: Option<ExtraDraft<StuffedCrustId>>,
    /// Units.
    pub quantity: i32,
    /// Unit price at purchase time.
    pub unit_price: Money,
    /// `unit_price × quantity`.
    pub line_total: Money,
    /// Item notes.
    pub notes: Option<String>,
}

impl OrderLine {
    /// Human description, e.g. `Pizza grande meia Mussarela / Calabresa`.
    #[must_use]
    pub fn title(&self) -> String {
        if self.flavors.len() > 1 {
            let names: Vec<&str> = self.flavors.iter().map(|f| f.name.as_str()).collect();
            format!("Pizza {} ({})", self.size, names.join(" / "))
        } else {
            format!("{} ({})", self.product_name, self.size)
        }
    }

    /// Extras line, e.g. `+ Bacon, + Borda Catupiry`; empty when none.
    #[must_use]
    pub fn extras(&self) -> String {
        self.add_ons
            .iter()
            .map(|a| format!("+ {}", a.name))
            .chain(
                self.stuffed_crust
                    .iter()
                    .map(|c| format!("+ Borda {}", c.name)),
            )
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Flavor notes as `Sabor: nota` pairs.
    #[must_use]
    pub fn flavor_notes(&self) -> Vec<String> {
        self.flavors
            .iter()
            .filter_map(|f| f.notes.as_ref().map(|n| format!("{}: {n}", f.name)))
            .collect()
    }
}

/// One row of an order's status timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct StatusChange {
    /// Previous status; `None` for the creation row.
    pub from_status: Option<OrderStatus>,
    /// New status.
    pub to_status: OrderStatus,
    /// Who made the change (operator name or `cliente`).
    pub changed_by: Option<String>,
    /// When it happened.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProductId;

    fn flavor(id: i32, name: &str, notes: Option<&str>) -> FlavorDraft {
        FlavorDraft {
            product_id: ProductId::new(id),
            name: name.to_owned(),
            notes: notes.map(str::to_owned),
        }
    }

    fn line(flavors: Vec<FlavorDraft>) -> OrderLine {
        OrderLine {
            order_id: OrderId::new(1),
            product_name: "Mussarela".to_owned(),
            size: "grande".to_owned(),
            flavors,
            add_ons: vec![ExtraDraft {
                id: AddOnId::new(1),
                name: "Bacon".to_owned(),
                price: Money::from_cents(500),
            }],
            stuffed_crust: Some(ExtraDraft {
                id: StuffedCrustId::new(1),
                name: "Catupiry".to_owned(),
                price: Money::from_cents(800),
            }),
            quantity: 1,
            unit_price: Money::from_cents(5300),
            line_total: Money::from_cents(5300),
            notes: None,
        }
    }

    #[test]
    fn test_titles() {
        assert_eq!(
            line(vec![flavor(1, "Mussarela", None)]).title(),
            "Mussarela (grande)"
        );
        assert_eq!(
            line(vec![
                flavor(1, "Mussarela", None),
                flavor(2, "Calabresa", None)
            ])
            .title(),
            "Pizza grande (Mussarela / Calabresa)"
        );
    }

    #[test]
    fn test_extras_and_flavor_notes() {
        let item = line(vec![
            flavor(1, "Mussarela", Some("sem orégano")),
            flavor(2, "Calabresa", None),
        ]);
        assert_eq!(item.extras(), "+ Bacon, + Borda Catupiry");
        assert_eq!(item.flavor_notes(), vec!["Mussarela: sem orégano".to_owned()]);
    }
}
