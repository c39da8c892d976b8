//! Checkout and order placement.
//!
//! The session cart is repriced against the live menu, the delivery fee
//! comes from the zone covering the address CEP, and an optional loyalty
//! reward becomes a discount. The order is then written through
//! `create_order(...)` in a single transaction.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form, Json,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use pizzaria_core::cart::reprice;
use pizzaria_core::checkout::{self, CheckoutChoices};
use pizzaria_core::delivery::{DeliveryFeeError, DeliveryQuote};
use pizzaria_core::loyalty::{self, Reward};
use pizzaria_core::{AddressId, Cep, Fulfillment, Money, OrderId, PaymentMethod, RewardId};

use super::cart::{CartView, load_cart, save_cart};
use super::{Layout, MessageQuery, redirect_with_error};
use crate::db::orders::{NewOrder, Redemption};
use crate::db::{CustomerRepository, LoyaltyRepository, OrderRepository};
use crate::error::{AppError, Result, add_breadcrumb};
use crate::filters;
use crate::middleware::RequireAuth;
use crate::models::{Address, CurrentCustomer};
use crate::state::AppState;

// =============================================================================
// Form Types
// =============================================================================

/// Checkout form data. Optional selects post empty strings.
#[derive(Debug, Deserialize)]
pub struct CheckoutForm {
    pub fulfillment: Fulfillment,
    #[serde(default)]
    pub address_id: String,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub change_for: String,
    #[serde(default)]
    pub reward_id: String,
    #[serde(default)]
    pub notes: String,
}

/// Checkout form after parsing the optional fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub fulfillment: Fulfillment,
    pub address_id: Option<AddressId>,
    pub payment_method: PaymentMethod,
    pub change_for: Option<Money>,
    pub reward_id: Option<RewardId>,
    pub notes: Option<String>,
}

impl CheckoutForm {
    /// Parse the optional fields.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` for malformed ids or amounts.
    pub fn parse(self) -> Result<CheckoutRequest> {
        let address_id = non_empty(&self.address_id)
            .map(str::parse::<AddressId>)
            .transpose()
            .map_err(|_| AppError::BadRequest("endereço inválido".to_string()))?;
        let change_for = non_empty(&self.change_for)
            .map(Money::parse)
            .transpose()
            .map_err(|e| AppError::BadRequest(format!("troco: {e}")))?;
        let reward_id = non_empty(&self.reward_id)
            .map(str::parse::<RewardId>)
            .transpose()
            .map_err(|_| AppError::BadRequest("recompensa inválida".to_string()))?;

        Ok(CheckoutRequest {
            fulfillment: self.fulfillment,
            // Pickup orders never carry an address.
            address_id: address_id.filter(|_| self.fulfillment.requires_address()),
            payment_method: self.payment_method,
            change_for,
            reward_id,
            notes: non_empty(&self.notes).map(str::to_string),
        })
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

/// Query for the delivery quote endpoint.
#[derive(Debug, Deserialize)]
pub struct QuoteQuery {
    pub cep: String,
}

/// Delivery quote response.
#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    pub cep: Cep,
    pub subtotal: Money,
    pub quote: DeliveryQuote,
}

// =============================================================================
// Templates
// =============================================================================

/// Checkout page template.
#[derive(Template, WebTemplate)]
#[template(path = "checkout/show.html")]
pub struct CheckoutTemplate {
    pub layout: Layout,
    pub cart: CartView,
    pub addresses: Vec<Address>,
    pub payment_methods: &'static [PaymentMethod],
    pub rewards: Vec<Reward>,
    pub points: i32,
    /// Quote for the default address, or why there is none.
    pub default_quote: Option<std::result::Result<DeliveryQuote, String>>,
    pub error: Option<String>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Display the checkout form.
#[instrument(skip(state, session, customer), fields(customer_id = %customer.id))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(customer): RequireAuth,
    Query(query): Query<MessageQuery>,
) -> Result<Response> {
    let cart = load_cart(&session).await;
    if cart.is_empty() {
        return Ok(Redirect::to("/cart").into_response());
    }

    let customers = CustomerRepository::new(state.pool());
    let profile = customers
        .get_by_id(customer.id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("customer no longer exists".to_string()))?;
    let addresses = customers.addresses(customer.id).await?;

    let default_quote = match addresses.iter().find(|a| a.is_default) {
        Some(address) => Some(
            quote_for(&state, &address.cep, cart.total())
                .await?
                .map_err(|e| e.to_string()),
        ),
        None => None,
    };

    let loyalty = LoyaltyRepository::new(state.pool());
    let rewards = if loyalty.config().await?.enabled {
        loyalty
            .active_rewards()
            .await?
            .into_iter()
            .filter(|r| r.points_cost <= profile.loyalty_points)
            .collect()
    } else {
        Vec::new()
    };

    Ok(CheckoutTemplate {
        layout: Layout::load(&state, &session).await,
        cart: CartView::from(&cart),
        addresses,
        payment_methods: PaymentMethod::ALL,
        rewards,
        points: profile.loyalty_points,
        default_quote,
        error: query.error,
    }
    .into_response())
}

/// Place the order.
///
/// Customer-correctable problems (closed zone, low change, missing address,
/// stale prices) redirect back to the form with a message.
#[instrument(skip(state, session, customer, form), fields(customer_id = %customer.id))]
pub async fn place(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(customer): RequireAuth,
    Form(form): Form<CheckoutForm>,
) -> Result<Response> {
    let outcome = match form.parse() {
        Ok(request) => place_order(&state, &session, &customer, request).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(Placement::Created(order_id)) => {
            add_breadcrumb(
                "checkout",
                "Order placed",
                Some(&[("order_id", order_id.to_string().as_str())]),
            );
            Ok(Redirect::to(&format!("/orders/{order_id}")).into_response())
        }
        Ok(Placement::PricesChanged) => Ok(redirect_with_error(
            "/checkout",
            "Os preços do cardápio mudaram. Confira o total e confirme novamente.",
        )
        .into_response()),
        Err(e) if e.status().is_client_error() => {
            tracing::info!(error = %e, "checkout rejected");
            Ok(redirect_with_error("/checkout", &e.public_message()).into_response())
        }
        Err(e) => Err(e),
    }
}

/// Result of a checkout attempt that did not fail.
enum Placement {
    Created(OrderId),
    /// The cart was repriced and saved; the customer must confirm again.
    PricesChanged,
}

async fn place_order(
    state: &AppState,
    session: &Session,
    customer: &CurrentCustomer,
    request: CheckoutRequest,
) -> Result<Placement> {
    let mut cart = load_cart(session).await;
    let menu = state.menu().await?;
    if reprice(&mut cart, &*menu)? {
        save_cart(session, &cart).await?;
        return Ok(Placement::PricesChanged);
    }

    let customers = CustomerRepository::new(state.pool());
    let profile = customers
        .get_by_id(customer.id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("customer no longer exists".to_string()))?;

    let address = match request.address_id {
        Some(id) => Some(
            customers
                .address(customer.id, id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("endereço {id}")))?,
        ),
        None => None,
    };

    let delivery = match (&address, request.fulfillment.requires_address()) {
        (Some(address), true) => Some(quote_for(state, &address.cep, cart.total()).await?),
        _ => None,
    };
    let zone_id = delivery
        .as_ref()
        .and_then(|q| q.as_ref().ok())
        .map(|q| q.zone_id);

    let (discount, redemption) = match request.reward_id {
        Some(reward_id) => {
            let loyalty = LoyaltyRepository::new(state.pool());
            let config = loyalty.config().await?;
            let reward = loyalty
                .reward(reward_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("recompensa {reward_id}")))?;
            loyalty::redeem(&config, profile.loyalty_points, &reward)?;
            (
                reward.discount,
                Some(Redemption {
                    reward_id,
                    points_cost: reward.points_cost,
                }),
            )
        }
        None => (Money::ZERO, None),
    };

    let choices = CheckoutChoices {
        fulfillment: request.fulfillment,
        has_address: address.is_some(),
        payment_method: request.payment_method,
        change_for: request.change_for,
        discount,
    };
    let totals = checkout::prepare(&cart, &choices, delivery)?;

    let order = NewOrder {
        customer_id: customer.id,
        customer_name: profile.name.clone(),
        customer_phone: profile.phone.as_str().to_string(),
        fulfillment: request.fulfillment,
        payment_method: request.payment_method,
        address_id: address.as_ref().map(|a| a.id),
        delivery_zone_id: zone_id,
        totals,
        change_for: request.change_for,
        notes: request.notes,
        items: checkout::order_items(&cart),
        redemption,
    };
    let order_id = OrderRepository::new(state.pool()).create(&order).await?;
    tracing::info!(order_id = %order_id, total = %totals.total, "order created");

    cart.clear();
    save_cart(session, &cart).await?;
    Ok(Placement::Created(order_id))
}

/// Quote delivery to `cep` for a subtotal.
///
/// The outer `Result` is a lookup failure; the inner one is the quote.
async fn quote_for(
    state: &AppState,
    cep: &Cep,
    subtotal: Money,
) -> Result<std::result::Result<DeliveryQuote, DeliveryFeeError>> {
    let zone = state.zone_for(cep).await?;
    Ok(zone.map_or_else(
        || Err(DeliveryFeeError::NotCovered(cep.clone())),
        |zone| zone.quote(subtotal),
    ))
}

/// Delivery fee for a CEP and the current cart.
#[instrument(skip(state, session))]
pub async fn quote(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<QuoteQuery>,
) -> Result<Json<QuoteResponse>> {
    let cep = Cep::parse(&query.cep).map_err(|e| AppError::BadRequest(e.to_string()))?;
    let subtotal = load_cart(&session).await.total();

    let quote = quote_for(&state, &cep, subtotal)
        .await?
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    Ok(Json(QuoteResponse {
        cep,
        subtotal,
        quote,
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn form(fulfillment: Fulfillment) -> CheckoutForm {
        CheckoutForm {
            fulfillment,
            address_id: "3".to_string(),
            payment_method: PaymentMethod::Cash,
            change_for: "R$ 100,00".to_string(),
            reward_id: String::new(),
            notes: "  ".to_string(),
        }
    }

    #[test]
    fn test_parse_delivery_form() {
        let request = form(Fulfillment::Delivery).parse().unwrap();
        assert_eq!(request.address_id, Some(AddressId::new(3)));
        assert_eq!(request.change_for, Some(Money::from_cents(10_000)));
        assert_eq!(request.reward_id, None);
        assert_eq!(request.notes, None);
    }

    #[test]
    fn test_pickup_drops_address() {
        let request = form(Fulfillment::Pickup).parse().unwrap();
        assert_eq!(request.address_id, None);
    }

    #[test]
    fn test_bad_change_amount() {
        let mut bad = form(Fulfillment::Pickup);
        bad.change_for = "cem reais".to_string();
        assert!(matches!(bad.parse(), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_form_deserializes_wire_values() {
        let form: CheckoutForm = serde_json::from_value(serde_json::json!({
            "fulfillment": "retirada",
            "payment_method": "pix",
        }))
        .unwrap();
        let request = form.parse().unwrap();
        assert_eq!(request.fulfillment, Fulfillment::Pickup);
        assert_eq!(request.payment_method, PaymentMethod::Pix);
    }
}
