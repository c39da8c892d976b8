//! Cart route handlers.
//!
//! The cart lives in the session as a serialized [`Cart`]. Form posts
//! redirect back to the cart page; `/api/cart/actions` takes a JSON
//! [`CartAction`] and returns the updated cart.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form, Json,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;
use uuid::Uuid;

use pizzaria_core::cart::{Cart, CartAction, CartError, CartLine, NewItem, reprice};
use pizzaria_core::{AddOnId, Money, ProductId, StuffedCrustId};

use super::{Layout, MessageQuery, redirect_with_error};
use crate::db::MenuSnapshot;
use crate::db::menu::ItemChoice;
use crate::error::{AppError, Result};
use crate::filters;
use crate::models::session_keys;
use crate::state::AppState;

// =============================================================================
// Session Helpers
// =============================================================================

/// The session cart, or an empty one.
pub async fn load_cart(session: &Session) -> Cart {
    session
        .get::<Cart>(session_keys::CART)
        .await
        .ok()
        .flatten()
        .unwrap_or_default()
}

/// Store the cart in the session.
///
/// # Errors
///
/// Returns `AppError::Internal` if the session store fails.
pub async fn save_cart(session: &Session, cart: &Cart) -> Result<()> {
    session
        .insert(session_keys::CART, cart)
        .await
        .map_err(|e| AppError::Internal(format!("session write failed: {e}")))
}

// =============================================================================
// View Types
// =============================================================================

/// One cart line as rendered.
#[derive(Debug, Clone)]
pub struct LineView {
    pub line_id: Uuid,
    pub title: String,
    pub details: Vec<String>,
    pub notes: Option<String>,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
}

impl From<&CartLine> for LineView {
    fn from(line: &CartLine) -> Self {
        let title = if line.flavors.len() > 1 {
            let names: Vec<&str> = line.flavors.iter().map(|f| f.name.as_str()).collect();
            format!("Pizza {} ({})", line.size, names.join(" / "))
        } else {
            format!("{} ({})", line.name, line.size)
        };

        let mut details: Vec<String> = line
            .add_ons
            .iter()
            .map(|a| format!("+ {} ({})", a.name, a.price))
            .collect();
        if let Some(crust) = &line.stuffed_crust {
            details.push(format!("+ Borda {} ({})", crust.name, crust.price));
        }
        details.extend(
            line.flavors
                .iter()
                .filter_map(|f| f.notes.as_ref().map(|n| format!("{}: {n}", f.name))),
        );

        Self {
            line_id: line.line_id,
            title,
            details,
            notes: line.notes.clone(),
            quantity: line.quantity,
            unit_price: line.unit_price,
            line_total: line.line_total,
        }
    }
}

/// Cart display data for templates.
#[derive(Debug, Clone)]
pub struct CartView {
    pub lines: Vec<LineView>,
    pub total: Money,
    pub item_count: u32,
}

impl From<&Cart> for CartView {
    fn from(cart: &Cart) -> Self {
        Self {
            lines: cart.lines().iter().map(LineView::from).collect(),
            total: cart.total(),
            item_count: cart.item_count(),
        }
    }
}

// =============================================================================
// Form Types
// =============================================================================

/// Build an [`ItemChoice`] from the menu form.
///
/// The form repeats `flavor` and `add_on` for multiple selections, so it is
/// read as raw pairs.
///
/// # Errors
///
/// Returns `AppError::BadRequest` for missing or malformed fields.
pub fn parse_item_choice(pairs: &[(String, String)]) -> Result<ItemChoice> {
    fn bad(field: &str) -> AppError {
        AppError::BadRequest(format!("campo inválido: {field}"))
    }

    let mut product_id = None;
    let mut size = None;
    let mut extra_flavors = Vec::new();
    let mut add_ons = Vec::new();
    let mut stuffed_crust = None;
    let mut quantity = 1;
    let mut notes = None;

    for (key, value) in pairs {
        let value = value.trim();
        match key.as_str() {
            "product_id" => {
                product_id = Some(value.parse::<ProductId>().map_err(|_| bad("produto"))?);
            }
            "size" => size = Some(value.to_string()),
            "flavor" if !value.is_empty() => {
                extra_flavors.push(value.parse::<ProductId>().map_err(|_| bad("sabor"))?);
            }
            "add_on" => add_ons.push(value.parse::<AddOnId>().map_err(|_| bad("adicional"))?),
            "stuffed_crust" if !value.is_empty() => {
                stuffed_crust = Some(value.parse::<StuffedCrustId>().map_err(|_| bad("borda"))?);
            }
            "quantity" => quantity = value.parse::<u32>().map_err(|_| bad("quantidade"))?,
            "notes" if !value.is_empty() => notes = Some(value.to_string()),
            _ => {}
        }
    }

    Ok(ItemChoice {
        product_id: product_id.ok_or_else(|| bad("produto"))?,
        size: size.ok_or_else(|| bad("tamanho"))?,
        extra_flavors,
        add_ons,
        stuffed_crust,
        quantity,
        notes,
    })
}

/// Update cart form data.
#[derive(Debug, Deserialize)]
pub struct UpdateCartForm {
    pub line_id: Uuid,
    pub quantity: u32,
}

/// Remove from cart form data.
#[derive(Debug, Deserialize)]
pub struct RemoveFromCartForm {
    pub line_id: Uuid,
}

// =============================================================================
// Templates
// =============================================================================

/// Cart page template.
#[derive(Template, WebTemplate)]
#[template(path = "cart/show.html")]
pub struct CartShowTemplate {
    pub layout: Layout,
    pub cart: CartView,
    pub error: Option<String>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Display cart page.
#[instrument(skip(state, session))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<MessageQuery>,
) -> impl IntoResponse {
    let cart = load_cart(&session).await;
    CartShowTemplate {
        layout: Layout::load(&state, &session).await,
        cart: CartView::from(&cart),
        error: query.error,
    }
}

/// Add a configured item from the menu form.
#[instrument(skip(state, session, form))]
pub async fn add(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<Vec<(String, String)>>,
) -> Result<Response> {
    let choice = match parse_item_choice(&form) {
        Ok(choice) => choice,
        Err(e) => return Ok(redirect_with_error("/", &e.public_message()).into_response()),
    };

    let menu = state.menu().await?;
    let item = match menu.new_item(&choice) {
        Ok(item) => item,
        Err(e) => return Ok(redirect_with_error("/", &e.to_string()).into_response()),
    };

    let mut cart = load_cart(&session).await;
    let name = item.name.clone();
    if let Err(e) = cart.add(item) {
        return Ok(redirect_with_error("/", &e.to_string()).into_response());
    }
    save_cart(&session, &cart).await?;

    crate::error::add_breadcrumb("cart", "Added item", Some(&[("product", name.as_str())]));
    Ok(Redirect::to("/cart").into_response())
}

/// Set a line's quantity; zero removes it, above the maximum clamps.
#[instrument(skip(session))]
pub async fn update(session: Session, Form(form): Form<UpdateCartForm>) -> Result<Response> {
    let mut cart = load_cart(&session).await;
    match cart.set_quantity(form.line_id, form.quantity) {
        Ok(()) => {
            save_cart(&session, &cart).await?;
            Ok(Redirect::to("/cart").into_response())
        }
        Err(e) => Ok(redirect_with_error("/cart", &e.to_string()).into_response()),
    }
}

/// Remove a line.
#[instrument(skip(session))]
pub async fn remove(session: Session, Form(form): Form<RemoveFromCartForm>) -> Result<Response> {
    let mut cart = load_cart(&session).await;
    if let Err(e) = cart.remove(form.line_id) {
        return Ok(redirect_with_error("/cart", &e.to_string()).into_response());
    }
    save_cart(&session, &cart).await?;
    Ok(Redirect::to("/cart").into_response())
}

/// Empty the cart.
#[instrument(skip(session))]
pub async fn clear(session: Session) -> Result<Redirect> {
    let mut cart = load_cart(&session).await;
    cart.clear();
    save_cart(&session, &cart).await?;
    Ok(Redirect::to("/cart"))
}

/// The cart as JSON.
pub async fn json(session: Session) -> Json<Cart> {
    Json(load_cart(&session).await)
}

/// Apply a cart action and return the updated cart.
///
/// Prices posted by the client are never trusted: added items are rebuilt
/// from the menu and the whole cart is repriced after the action.
#[instrument(skip(state, session, action))]
pub async fn apply_action(
    State(state): State<AppState>,
    session: Session,
    Json(action): Json<CartAction>,
) -> Result<Json<Cart>> {
    let menu = state.menu().await?;
    let action = canonical_action(action, &menu)?;

    let mut cart = load_cart(&session).await;
    cart.apply(action)?;
    reprice(&mut cart, &*menu)?;
    save_cart(&session, &cart).await?;

    Ok(Json(cart))
}

/// Rebuild an `Add` from the menu so names, flavors and prices come from
/// the catalog. Other actions are repriced after they are applied.
fn canonical_action(
    action: CartAction,
    menu: &MenuSnapshot,
) -> std::result::Result<CartAction, CartError> {
    match action {
        CartAction::Add(item) => menu.new_item(&choice_from(&item)).map(CartAction::Add),
        other => Ok(other),
    }
}

fn choice_from(item: &NewItem) -> ItemChoice {
    ItemChoice {
        product_id: item.product_id,
        size: item.size.clone(),
        extra_flavors: item
            .flavors
            .iter()
            .map(|f| f.product_id)
            .filter(|id| *id != item.product_id)
            .collect(),
        add_ons: item.add_ons.iter().map(|a| a.id).collect(),
        stuffed_crust: item.stuffed_crust.as_ref().map(|c| c.id),
        quantity: item.quantity,
        notes: item.notes.clone(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use pizzaria_core::cart::{AddOn, Flavor};

    use super::*;
    use crate::db::menu::tests::sample_menu;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_parse_item_choice_with_repeated_fields() {
        let choice = parse_item_choice(&pairs(&[
            ("product_id", "1"),
            ("size", "grande"),
            ("flavor", "2"),
            ("flavor", ""),
            ("add_on", "1"),
            ("stuffed_crust", "1"),
            ("quantity", "2"),
            ("notes", "  "),
        ]))
        .unwrap();

        assert_eq!(choice.product_id, ProductId::new(1));
        assert_eq!(choice.extra_flavors, vec![ProductId::new(2)]);
        assert_eq!(choice.add_ons, vec![AddOnId::new(1)]);
        assert_eq!(choice.stuffed_crust, Some(StuffedCrustId::new(1)));
        assert_eq!(choice.quantity, 2);
        assert_eq!(choice.notes, None);
    }

    #[test]
    fn test_parse_item_choice_requires_product_and_size() {
        assert!(parse_item_choice(&pairs(&[("size", "grande")])).is_err());
        assert!(parse_item_choice(&pairs(&[("product_id", "1")])).is_err());
        assert!(parse_item_choice(&pairs(&[("product_id", "x"), ("size", "m")])).is_err());
    }

    #[test]
    fn test_client_prices_are_replaced_by_menu_prices() {
        let menu = sample_menu();
        let forged = NewItem {
            product_id: ProductId::new(1),
            name: "Mussarela".to_string(),
            size: "grande".to_string(),
            price: Money::from_cents(1),
            flavors: vec![
                Flavor {
                    product_id: ProductId::new(1),
                    name: "Mussarela".to_string(),
                    price: Money::from_cents(1),
                    notes: None,
                },
                Flavor {
                    product_id: ProductId::new(2),
                    name: "Calabresa".to_string(),
                    price: Money::from_cents(1),
                    notes: None,
                },
            ],
            add_ons: vec![AddOn {
                id: AddOnId::new(1),
                name: "Bacon".to_string(),
                price: Money::ZERO,
            }],
            stuffed_crust: None,
            quantity: 1,
            notes: None,
        };

        let CartAction::Add(item) = canonical_action(CartAction::Add(forged), &menu).unwrap()
        else {
            panic!("expected an add action");
        };
        let mut cart = Cart::new();
        cart.add(item).unwrap();

        // Calabresa grande (46) is the most expensive flavor, plus bacon (5).
        assert_eq!(cart.total(), Money::from_cents(5100));
    }

    #[test]
    fn test_line_view_for_split_pizza() {
        let menu = sample_menu();
        let item = menu
            .new_item(&ItemChoice {
                product_id: ProductId::new(1),
                size: "grande".to_string(),
                extra_flavors: vec![ProductId::new(2)],
                add_ons: vec![AddOnId::new(1)],
                stuffed_crust: Some(StuffedCrustId::new(1)),
                quantity: 2,
                notes: None,
            })
            .unwrap();
        let mut cart = Cart::new();
        cart.add(item).unwrap();

        let view = CartView::from(&cart);
        assert_eq!(view.item_count, 2);
        assert_eq!(view.lines[0].title, "Pizza grande (Mussarela / Calabresa)");
        assert_eq!(view.lines[0].details.len(), 2);
        // 46 + 5 + 10 = 61 per unit.
        assert_eq!(view.total, Money::from_cents(12_200));
    }
}
