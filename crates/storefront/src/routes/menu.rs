//! Menu page.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Query, State},
    response::IntoResponse,
};
use tower_sessions::Session;
use tracing::instrument;

use pizzaria_core::ProductId;
use pizzaria_core::cart::{AddOn, MAX_FLAVORS};

use super::{Layout, MessageQuery};
use crate::db::menu::{CrustOption, MenuCategory};
use crate::error::Result;
use crate::filters;
use crate::state::AppState;

/// A pizza offered as an extra flavor.
#[derive(Debug, Clone)]
pub struct FlavorOption {
    pub id: ProductId,
    pub name: String,
}

/// Menu page template.
#[derive(Template, WebTemplate)]
#[template(path = "menu/index.html")]
pub struct MenuTemplate {
    pub layout: Layout,
    pub categories: Vec<MenuCategory>,
    pub flavors: Vec<FlavorOption>,
    pub add_ons: Vec<AddOn>,
    pub crusts: Vec<CrustOption>,
    /// Extra flavor selects per pizza (the product itself is the first).
    pub extra_flavor_slots: Vec<usize>,
    pub error: Option<String>,
}

/// Display the menu.
#[instrument(skip(state, session))]
pub async fn index(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<MessageQuery>,
) -> Result<impl IntoResponse> {
    let menu = state.menu().await?;

    let flavors = menu
        .categories
        .iter()
        .flat_map(|c| c.products.iter())
        .filter(|p| p.is_pizza)
        .map(|p| FlavorOption {
            id: p.id,
            name: p.name.clone(),
        })
        .collect();

    Ok(MenuTemplate {
        layout: Layout::load(&state, &session).await,
        categories: menu.categories.clone(),
        flavors,
        add_ons: menu.add_ons.clone(),
        crusts: menu.stuffed_crusts.clone(),
        extra_flavor_slots: (1..MAX_FLAVORS).collect(),
        error: query.error,
    })
}
