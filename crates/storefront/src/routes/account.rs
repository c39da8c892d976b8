//! Account route handlers: profile, addresses, order history and loyalty.
//!
//! These routes require authentication.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use pizzaria_core::loyalty::Reward;
use pizzaria_core::report::local_datetime;
use pizzaria_core::{AddressId, Money, OrderId, Phone};

use super::{Layout, MessageQuery, redirect_with_error};
use crate::db::orders::OrderSummary;
use crate::db::{CustomerRepository, LoyaltyRepository, OrderRepository};
use crate::error::{AppError, Result};
use crate::filters;
use crate::middleware::RequireAuth;
use crate::models::{Address, AddressForm, CurrentCustomer, Customer};
use crate::state::AppState;

/// Orders shown on the account overview.
const RECENT_ORDERS: i64 = 5;

/// Orders shown on the history page.
const HISTORY_LIMIT: i64 = 50;

/// Point movements shown on the account overview.
const STATEMENT_LIMIT: i64 = 10;

/// Order history row for templates.
#[derive(Debug, Clone)]
pub struct OrderRow {
    pub id: OrderId,
    pub status: &'static str,
    pub fulfillment: &'static str,
    pub total: Money,
    pub item_count: i64,
    pub placed_at: String,
}

impl From<OrderSummary> for OrderRow {
    fn from(order: OrderSummary) -> Self {
        Self {
            id: order.id,
            status: order.status.label(),
            fulfillment: match order.fulfillment {
                pizzaria_core::Fulfillment::Delivery => "Entrega",
                pizzaria_core::Fulfillment::Pickup => "Retirada",
            },
            total: order.total,
            item_count: order.item_count,
            placed_at: local_datetime(order.created_at),
        }
    }
}

/// Loyalty statement row for templates.
#[derive(Debug, Clone)]
pub struct StatementRow {
    pub points: i32,
    pub description: String,
    pub at: String,
}

/// Account overview page template.
#[derive(Template, WebTemplate)]
#[template(path = "account/index.html")]
pub struct AccountIndexTemplate {
    pub layout: Layout,
    pub customer: Customer,
    pub addresses: Vec<Address>,
    pub recent_orders: Vec<OrderRow>,
    pub loyalty_enabled: bool,
    pub rewards: Vec<Reward>,
    pub statement: Vec<StatementRow>,
    pub error: Option<String>,
    pub success: Option<String>,
}

/// Order history page template.
#[derive(Template, WebTemplate)]
#[template(path = "account/orders.html")]
pub struct AccountOrdersTemplate {
    pub layout: Layout,
    pub orders: Vec<OrderRow>,
}

/// Profile update form.
#[derive(Debug, Deserialize)]
pub struct ProfileForm {
    pub name: String,
    pub phone: String,
}

async fn load_customer(state: &AppState, customer: &CurrentCustomer) -> Result<Customer> {
    CustomerRepository::new(state.pool())
        .get_by_id(customer.id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("customer no longer exists".to_string()))
}

fn with_success(path: &str, message: &str) -> Redirect {
    let encoded: String = url::form_urlencoded::byte_serialize(message.as_bytes()).collect();
    Redirect::to(&format!("{path}?success={encoded}"))
}

/// Display the account overview.
#[instrument(skip(state, session, current), fields(customer_id = %current.id))]
pub async fn index(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(current): RequireAuth,
    Query(query): Query<MessageQuery>,
) -> Result<Response> {
    let customer = load_customer(&state, &current).await?;
    let addresses = CustomerRepository::new(state.pool())
        .addresses(current.id)
        .await?;
    let recent_orders = OrderRepository::new(state.pool())
        .for_customer(current.id, RECENT_ORDERS)
        .await?
        .into_iter()
        .map(OrderRow::from)
        .collect();

    let loyalty = LoyaltyRepository::new(state.pool());
    let config = loyalty.config().await?;
    let (rewards, statement) = if config.enabled {
        let statement = loyalty
            .statement(current.id, STATEMENT_LIMIT)
            .await?
            .into_iter()
            .map(|entry| StatementRow {
                points: entry.points,
                description: entry.description,
                at: local_datetime(entry.created_at),
            })
            .collect();
        (loyalty.active_rewards().await?, statement)
    } else {
        (Vec::new(), Vec::new())
    };

    Ok(AccountIndexTemplate {
        layout: Layout::load(&state, &session).await,
        customer,
        addresses,
        recent_orders,
        loyalty_enabled: config.enabled,
        rewards,
        statement,
        error: query.error,
        success: query.success,
    }
    .into_response())
}

/// Update name and phone.
#[instrument(skip(state, session, current, form), fields(customer_id = %current.id))]
pub async fn update_profile(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(current): RequireAuth,
    Form(form): Form<ProfileForm>,
) -> Result<Response> {
    let name = form.name.trim();
    if name.is_empty() {
        return Ok(redirect_with_error("/account", "Informe seu nome.").into_response());
    }
    let phone = match Phone::parse(&form.phone) {
        Ok(phone) => phone,
        Err(e) => return Ok(redirect_with_error("/account", &e.to_string()).into_response()),
    };

    let customer = CustomerRepository::new(state.pool())
        .update_profile(current.id, name, &phone)
        .await?;

    // Keep the header greeting in sync.
    let refreshed = CurrentCustomer {
        name: customer.name,
        ..current
    };
    session
        .insert(crate::models::session_keys::CURRENT_CUSTOMER, &refreshed)
        .await
        .map_err(|e| AppError::Internal(format!("session: {e}")))?;

    tracing::info!("profile updated");
    Ok(with_success("/account", "Dados atualizados.").into_response())
}

/// Display the full order history.
#[instrument(skip(state, session, current), fields(customer_id = %current.id))]
pub async fn orders(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(current): RequireAuth,
) -> Result<Response> {
    let orders = OrderRepository::new(state.pool())
        .for_customer(current.id, HISTORY_LIMIT)
        .await?
        .into_iter()
        .map(OrderRow::from)
        .collect();

    Ok(AccountOrdersTemplate {
        layout: Layout::load(&state, &session).await,
        orders,
    }
    .into_response())
}

/// Add an address. The first address becomes the default.
#[instrument(skip(state, current, form), fields(customer_id = %current.id))]
pub async fn create_address(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    Form(form): Form<AddressForm>,
) -> Result<Response> {
    let address = match form.validate() {
        Ok(address) => address,
        Err((field, check)) => {
            tracing::debug!(field, "address rejected");
            let message = check.error.unwrap_or_else(|| "Endereço inválido".to_string());
            return Ok(redirect_with_error("/account", &message).into_response());
        }
    };

    let created = CustomerRepository::new(state.pool())
        .create_address(current.id, &address)
        .await?;
    tracing::info!(address_id = %created.id, "address created");

    Ok(with_success("/account", "Endereço adicionado.").into_response())
}

/// Replace an address.
#[instrument(skip(state, current, form), fields(customer_id = %current.id, address_id = %id))]
pub async fn update_address(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    Path(id): Path<AddressId>,
    Form(form): Form<AddressForm>,
) -> Result<Response> {
    let address = match form.validate() {
        Ok(address) => address,
        Err((_, check)) => {
            let message = check.error.unwrap_or_else(|| "Endereço inválido".to_string());
            return Ok(redirect_with_error("/account", &message).into_response());
        }
    };

    CustomerRepository::new(state.pool())
        .update_address(current.id, id, &address)
        .await?;

    Ok(with_success("/account", "Endereço atualizado.").into_response())
}

/// Delete an address.
#[instrument(skip(state, current), fields(customer_id = %current.id, address_id = %id))]
pub async fn delete_address(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    Path(id): Path<AddressId>,
) -> Result<Response> {
    let deleted = CustomerRepository::new(state.pool())
        .delete_address(current.id, id)
        .await?;
    if !deleted {
        return Err(AppError::NotFound(format!("endereço {id}")));
    }

    Ok(with_success("/account", "Endereço removido.").into_response())
}

/// Make an address the default.
#[instrument(skip(state, current), fields(customer_id = %current.id, address_id = %id))]
pub async fn set_default_address(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    Path(id): Path<AddressId>,
) -> Result<Response> {
    CustomerRepository::new(state.pool())
        .set_default_address(current.id, id)
        .await?;

    Ok(with_success("/account", "Endereço padrão alterado.").into_response())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeZone, Utc};
    use pizzaria_core::{Fulfillment, OrderStatus};

    use super::*;

    #[test]
    fn test_order_row_labels() {
        let row = OrderRow::from(OrderSummary {
            id: OrderId::new(12),
            status: OrderStatus::OutForDelivery,
            fulfillment: Fulfillment::Delivery,
            total: Money::from_cents(5_100),
            item_count: 2,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 22, 0, 0).unwrap(),
        });
        assert_eq!(row.status, "Saiu para entrega");
        assert_eq!(row.fulfillment, "Entrega");
        assert_eq!(row.placed_at, "01/05/2024 19:00");
    }

    #[test]
    fn test_success_redirect_encodes() {
        let response = with_success("/account", "Endereço removido.").into_response();
        assert_eq!(
            response.headers()["location"],
            "/account?success=Endere%C3%A7o+removido."
        );
    }
}
