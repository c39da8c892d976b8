//! Order totals and checkout validation.
//!
//! Turns a (repriced) cart plus the customer's choices into the values the
//! `create_order` database function receives.

use serde::{Deserialize, Serialize};

use crate::cart::{Cart, CartLine};
use crate::delivery::{DeliveryFeeError, DeliveryQuote};
use crate::{AddOnId, Fulfillment, Money, PaymentMethod, ProductId, StuffedCrustId};

/// Errors raised while validating a checkout.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckoutError {
    /// Nothing to order.
    #[error("carrinho vazio")]
    EmptyCart,
    /// Delivery chosen without an address.
    #[error("endereço de entrega obrigatório")]
    AddressRequired,
    /// Change requested for a non-cash payment.
    #[error("troco só pode ser informado para pagamento em dinheiro")]
    ChangeNotCash,
    /// Change amount smaller than the total.
    #[error("troco para {change_for} é menor que o total {total}")]
    ChangeTooLow {
        /// Amount the customer will pay with.
        change_for: Money,
        /// Order total.
        total: Money,
    },
    /// Delivery quote failed.
    #[error(transparent)]
    Delivery(#[from] DeliveryFeeError),
}

/// Monetary breakdown of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrderTotals {
    /// Cart total.
    pub subtotal: Money,
    /// Delivery fee (zero for pickup).
    pub delivery_fee: Money,
    /// Loyalty or coupon discount.
    pub discount: Money,
    /// `subtotal + delivery_fee - discount`, never negative.
    pub total: Money,
}

impl OrderTotals {
    /// Compute totals. The discount never takes the total below zero.
    #[must_use]
    pub fn compute(subtotal: Money, delivery_fee: Money, discount: Money) -> Self {
        let gross = subtotal + delivery_fee;
        let discount = discount.min(gross);
        Self {
            subtotal,
            delivery_fee,
            discount,
            total: gross.saturating_sub(discount),
        }
    }
}

/// Customer choices submitted with the checkout form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutChoices {
    /// Delivery or pickup.
    pub fulfillment: Fulfillment,
    /// Whether an address was selected.
    pub has_address: bool,
    /// Payment method.
    pub payment_method: PaymentMethod,
    /// Cash amount the customer will pay with, if change is needed.
    pub change_for: Option<Money>,
    /// Discount to apply.
    pub discount: Money,
}

/// Validate a checkout and compute its totals.
///
/// `delivery` is the quote for the selected address; it is ignored for
/// pickup orders.
///
/// # Errors
///
/// Returns a [`CheckoutError`] describing the first problem found.
pub fn prepare(
    cart: &Cart,
    choices: &CheckoutChoices,
    delivery: Option<Result<DeliveryQuote, DeliveryFeeError>>,
) -> Result<OrderTotals, CheckoutError> {
    if cart.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }

    let delivery_fee = if choices.fulfillment.requires_address() {
        if !choices.has_address {
            return Err(CheckoutError::AddressRequired);
        }
        delivery.ok_or(CheckoutError::AddressRequired)??.fee
    } else {
        Money::ZERO
    };

    let totals = OrderTotals::compute(cart.total(), delivery_fee, choices.discount);

    if let Some(change_for) = choices.change_for {
        if choices.payment_method != PaymentMethod::Cash {
            return Err(CheckoutError::ChangeNotCash);
        }
        if change_for < totals.total {
            return Err(CheckoutError::ChangeTooLow {
                change_for,
                total: totals.total,
            });
        }
    }

    Ok(totals)
}

/// One order item as passed to the `create_order` function (JSON array).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItemDraft {
    /// Product id.
    pub product_id: ProductId,
    /// Name at the time of purchase.
    pub product_name: String,
    /// Size key.
    pub size: String,
    /// Flavor ids and names, for split pizzas.
    pub flavors: Vec<FlavorDraft>,
    /// Add-ons at purchase prices.
    pub add_ons: Vec<ExtraDraft<AddOnId>>,
    /// Stuffed crust at purchase price.
    pub stuffed_crust: Option<ExtraDraft<StuffedCrustId>>,
    /// Units.
    pub quantity: u32,
    /// Unit price.
    pub unit_price: Money,
    /// `unit_price × quantity`.
    pub line_total: Money,
    /// Item notes.
    pub notes: Option<String>,
}

/// Flavor snapshot stored with an order item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlavorDraft {
    /// Flavor product id.
    pub product_id: ProductId,
    /// Flavor name.
    pub name: String,
    /// Flavor notes.
    pub notes: Option<String>,
}

/// Priced extra (add-on or crust) snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraDraft<Id> {
    /// Extra id.
    pub id: Id,
    /// Name at purchase time.
    pub name: String,
    /// Price at purchase time.
    pub price: Money,
}

impl From<&CartLine> for OrderItemDraft {
    fn from(line: &CartLine) -> Self {
        Self {
            product_id: line.product_id,
            product_name: line.name.clone(),
            size: line.size.clone(),
            flavors: line
                .flavors
                .iter()
                .map(|f| FlavorDraft {
                    product_id: f.product_id,
                    name: f.name.clone(),
                    notes: f.notes.clone(),
                })
                .collect(),
            add_ons: line
                .add_ons
                .iter()
                .map(|a| ExtraDraft {
                    id: a.id,
                    name: a.name.clone(),
                    price: a.price,
                })
                .collect(),
            stuffed_crust: line.stuffed_crust.as_ref().map(|c| ExtraDraft {
                id: c.id,
                name: c.name.clone(),
                price: c.price,
            }),
            quantity: line.quantity,
            unit_price: line.unit_price,
            line_total: line.line_total,
            notes: line.notes.clone(),
        }
    }
}

/// Snapshot every cart line for order creation.
#[must_use]
pub fn order_items(cart: &Cart) -> Vec<OrderItemDraft> {
    cart.lines().iter().map(OrderItemDraft::from).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::DeliveryZoneId;
    use crate::cart::NewItem;

    fn cart(total_cents: i64) -> Cart {
        let mut cart = Cart::new();
        cart.add(NewItem {
            product_id: ProductId::new(1),
            name: "Portuguesa".to_owned(),
            size: "grande".to_owned(),
            price: Money::from_cents(total_cents),
            flavors: Vec::new(),
            add_ons: Vec::new(),
            stuffed_crust: None,
            quantity: 1,
            notes: Some("cortar em 8".to_owned()),
        })
        .unwrap();
        cart
    }

    fn choices(fulfillment: Fulfillment) -> CheckoutChoices {
        CheckoutChoices {
            fulfillment,
            has_address: fulfillment.requires_address(),
            payment_method: PaymentMethod::Cash,
            change_for: None,
            discount: Money::ZERO,
        }
    }

    fn quote(fee: i64) -> Result<DeliveryQuote, DeliveryFeeError> {
        Ok(DeliveryQuote {
            zone_id: DeliveryZoneId::new(1),
            zone_name: "Centro".to_owned(),
            fee: Money::from_cents(fee),
            free: fee == 0,
            estimated_minutes: 40,
        })
    }

    #[test]
    fn test_delivery_totals() {
        let totals = prepare(&cart(5000), &choices(Fulfillment::Delivery), Some(quote(700))).unwrap();
        assert_eq!(totals.subtotal, Money::from_cents(5000));
        assert_eq!(totals.delivery_fee, Money::from_cents(700));
        assert_eq!(totals.total, Money::from_cents(5700));
    }

    #[test]
    fn test_pickup_ignores_delivery() {
        let totals = prepare(&cart(5000), &choices(Fulfillment::Pickup), None).unwrap();
        assert_eq!(totals.total, Money::from_cents(5000));
    }

    #[test]
    fn test_rejections() {
        assert_eq!(
            prepare(&Cart::new(), &choices(Fulfillment::Pickup), None),
            Err(CheckoutError::EmptyCart)
        );

        let mut no_address = choices(Fulfillment::Delivery);
        no_address.has_address = false;
        assert_eq!(
            prepare(&cart(5000), &no_address, Some(quote(0))),
            Err(CheckoutError::AddressRequired)
        );

        let mut low_change = choices(Fulfillment::Pickup);
        low_change.change_for = Some(Money::from_cents(2000));
        assert!(matches!(
            prepare(&cart(5000), &low_change, None),
            Err(CheckoutError::ChangeTooLow { .. })
        ));

        let mut pix_change = choices(Fulfillment::Pickup);
        pix_change.payment_method = PaymentMethod::Pix;
        pix_change.change_for = Some(Money::from_cents(10_000));
        assert_eq!(
            prepare(&cart(5000), &pix_change, None),
            Err(CheckoutError::ChangeNotCash)
        );

        let uncovered = Err(DeliveryFeeError::NotCovered(crate::Cep::parse("99999999").unwrap()));
        assert!(matches!(
            prepare(&cart(5000), &choices(Fulfillment::Delivery), Some(uncovered)),
            Err(CheckoutError::Delivery(_))
        ));
    }

    #[test]
    fn test_discount_never_goes_negative() {
        let totals = OrderTotals::compute(
            Money::from_cents(1000),
            Money::from_cents(500),
            Money::from_cents(5000),
        );
        assert_eq!(totals.discount, Money::from_cents(1500));
        assert_eq!(totals.total, Money::ZERO);
    }

    #[test]
    fn test_order_items_snapshot_lines() {
        let items = order_items(&cart(4200));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].unit_price, Money::from_cents(4200));
        assert_eq!(items[0].notes.as_deref(), Some("cortar em 8"));
        let json = serde_json::to_value(&items).unwrap();
        assert_eq!(json[0]["line_total"], "42.00");
    }
}
