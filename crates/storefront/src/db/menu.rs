//! Menu catalogue queries.
//!
//! The whole active menu is small, so it is loaded in one go into a
//! [`MenuSnapshot`] and cached in [`crate::state::AppState`].

use std::collections::BTreeMap;

use sqlx::PgPool;
use tracing::instrument;

use pizzaria_core::cart::{AddOn, CartError, Flavor, MAX_FLAVORS, NewItem, PriceCatalog, StuffedCrust};
use pizzaria_core::{AddOnId, Money, ProductId, StuffedCrustId};

use super::{RepositoryError, query_with_retry};

/// One size a product or crust is sold in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizePrice {
    pub size: String,
    pub price: Money,
}

/// A product as listed on the menu page.
#[derive(Debug, Clone)]
pub struct MenuProduct {
    pub id: ProductId,
    pub name: String,
    pub description: Option<String>,
    /// Pizzas accept split flavors and stuffed crusts.
    pub is_pizza: bool,
    pub prices: Vec<SizePrice>,
}

impl MenuProduct {
    /// Price at `size`, if sold that way.
    #[must_use]
    pub fn price_for(&self, size: &str) -> Option<Money> {
        self.prices
            .iter()
            .find(|p| p.size.eq_ignore_ascii_case(size.trim()))
            .map(|p| p.price)
    }
}

/// A menu section.
#[derive(Debug, Clone)]
pub struct MenuCategory {
    pub name: String,
    pub products: Vec<MenuProduct>,
}

/// A stuffed crust with its per-size prices.
#[derive(Debug, Clone)]
pub struct CrustOption {
    pub id: StuffedCrustId,
    pub name: String,
    pub prices: Vec<SizePrice>,
}

/// Customer choices for a new cart item, as posted by the menu form.
#[derive(Debug, Clone)]
pub struct ItemChoice {
    pub product_id: ProductId,
    pub size: String,
    /// Extra flavors for a split pizza, not counting `product_id`.
    pub extra_flavors: Vec<ProductId>,
    pub add_ons: Vec<AddOnId>,
    pub stuffed_crust: Option<StuffedCrustId>,
    pub quantity: u32,
    pub notes: Option<String>,
}

/// The active menu at a point in time.
#[derive(Debug, Clone, Default)]
pub struct MenuSnapshot {
    pub categories: Vec<MenuCategory>,
    pub add_ons: Vec<AddOn>,
    pub stuffed_crusts: Vec<CrustOption>,
}

impl MenuSnapshot {
    /// Look up an active product.
    #[must_use]
    pub fn product(&self, id: ProductId) -> Option<&MenuProduct> {
        self.categories
            .iter()
            .flat_map(|c| c.products.iter())
            .find(|p| p.id == id)
    }

    /// Look up an active add-on.
    #[must_use]
    pub fn add_on(&self, id: AddOnId) -> Option<&AddOn> {
        self.add_ons.iter().find(|a| a.id == id)
    }

    /// Look up an active stuffed crust.
    #[must_use]
    pub fn stuffed_crust(&self, id: StuffedCrustId) -> Option<&CrustOption> {
        self.stuffed_crusts.iter().find(|c| c.id == id)
    }

    /// Price every component of a customer's choice against this menu.
    ///
    /// For pizzas the product itself is the first flavor; extra flavors make
    /// a split pizza.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::Unavailable`] when a component is not sold at
    /// the chosen size, [`CartError::TooManyFlavors`] or
    /// [`CartError::ZeroQuantity`].
    pub fn new_item(&self, choice: &ItemChoice) -> Result<NewItem, CartError> {
        if choice.quantity == 0 {
            return Err(CartError::ZeroQuantity);
        }

        let product = self
            .product(choice.product_id)
            .ok_or_else(|| CartError::Unavailable(format!("produto {}", choice.product_id)))?;
        let size = choice.size.trim().to_lowercase();
        let price = product
            .price_for(&size)
            .ok_or_else(|| CartError::Unavailable(format!("{} ({size})", product.name)))?;

        let mut flavors = Vec::new();
        if product.is_pizza {
            flavors.push(Flavor {
                product_id: product.id,
                name: product.name.clone(),
                price,
                notes: None,
            });
            for &flavor_id in &choice.extra_flavors {
                if flavors.iter().any(|f: &Flavor| f.product_id == flavor_id) {
                    continue;
                }
                if flavors.len() == MAX_FLAVORS {
                    return Err(CartError::TooManyFlavors { max: MAX_FLAVORS });
                }
                let flavor = self
                    .product(flavor_id)
                    .filter(|p| p.is_pizza)
                    .ok_or(CartError::FlavorNotFound(flavor_id))?;
                let flavor_price = flavor
                    .price_for(&size)
                    .ok_or_else(|| CartError::Unavailable(format!("{} ({size})", flavor.name)))?;
                flavors.push(Flavor {
                    product_id: flavor.id,
                    name: flavor.name.clone(),
                    price: flavor_price,
                    notes: None,
                });
            }
        }

        let add_ons = choice
            .add_ons
            .iter()
            .map(|&id| {
                self.add_on(id)
                    .cloned()
                    .ok_or_else(|| CartError::Unavailable(format!("adicional {id}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let stuffed_crust = match choice.stuffed_crust {
            Some(id) if product.is_pizza => {
                let crust = self
                    .stuffed_crust(id)
                    .ok_or_else(|| CartError::Unavailable(format!("borda {id}")))?;
                let crust_price = self
                    .stuffed_crust_price(id, &size)
                    .ok_or_else(|| CartError::Unavailable(format!("{} ({size})", crust.name)))?;
                Some(StuffedCrust {
                    id,
                    name: crust.name.clone(),
                    price: crust_price,
                })
            }
            _ => None,
        };

        Ok(NewItem {
            product_id: product.id,
            name: product.name.clone(),
            size,
            price,
            flavors,
            add_ons,
            stuffed_crust,
            quantity: choice.quantity,
            notes: choice.notes.clone(),
        })
    }
}

impl PriceCatalog for MenuSnapshot {
    fn product_price(&self, product: ProductId, size: &str) -> Option<Money> {
        self.product(product)?.price_for(size)
    }

    fn add_on_price(&self, add_on: AddOnId) -> Option<Money> {
        self.add_on(add_on).map(|a| a.price)
    }

    fn stuffed_crust_price(&self, crust: StuffedCrustId, size: &str) -> Option<Money> {
        self.stuffed_crust(crust)?
            .prices
            .iter()
            .find(|p| p.size.eq_ignore_ascii_case(size.trim()))
            .map(|p| p.price)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: ProductId,
    category: String,
    name: String,
    description: Option<String>,
    is_pizza: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct PriceRow {
    owner_id: i32,
    size: String,
    price: Money,
}

#[derive(Debug, sqlx::FromRow)]
struct AddOnRow {
    id: AddOnId,
    name: String,
    price: Money,
}

#[derive(Debug, sqlx::FromRow)]
struct CrustRow {
    id: StuffedCrustId,
    name: String,
}

/// Repository for menu queries.
pub struct MenuRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> MenuRepository<'a> {
    /// Create a new menu repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Load the active menu.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    #[instrument(skip(self))]
    pub async fn snapshot(&self) -> Result<MenuSnapshot, RepositoryError> {
        let products = query_with_retry(|| {
            sqlx::query_as::<_, ProductRow>(
                r"
                SELECT p.id, c.name AS category, p.name, p.description, p.is_pizza
                FROM product p
                JOIN category c ON c.id = p.category_id
                WHERE p.active
                ORDER BY c.position, c.name, p.name
                ",
            )
            .fetch_all(self.pool)
        })
        .await?;

        let product_prices = query_with_retry(|| {
            sqlx::query_as::<_, PriceRow>(
                r"
                SELECT product_id AS owner_id, size, price
                FROM product_price
                ORDER BY price
                ",
            )
            .fetch_all(self.pool)
        })
        .await?;

        let add_ons = query_with_retry(|| {
            sqlx::query_as::<_, AddOnRow>(
                "SELECT id, name, price FROM add_on WHERE active ORDER BY name",
            )
            .fetch_all(self.pool)
        })
        .await?;

        let crusts = query_with_retry(|| {
            sqlx::query_as::<_, CrustRow>(
                "SELECT id, name FROM stuffed_crust WHERE active ORDER BY name",
            )
            .fetch_all(self.pool)
        })
        .await?;

        let crust_prices = query_with_retry(|| {
            sqlx::query_as::<_, PriceRow>(
                r"
                SELECT stuffed_crust_id AS owner_id, size, price
                FROM stuffed_crust_price
                ORDER BY price
                ",
            )
            .fetch_all(self.pool)
        })
        .await?;

        Ok(assemble(products, product_prices, add_ons, crusts, crust_prices))
    }
}

fn group_prices(rows: Vec<PriceRow>) -> BTreeMap<i32, Vec<SizePrice>> {
    let mut grouped: BTreeMap<i32, Vec<SizePrice>> = BTreeMap::new();
    for row in rows {
        grouped.entry(row.owner_id).or_default().push(SizePrice {
            size: row.size.trim().to_lowercase(),
            price: row.price,
        });
    }
    grouped
}

fn assemble(
    products: Vec<ProductRow>,
    product_prices: Vec<PriceRow>,
    add_ons: Vec<AddOnRow>,
    crusts: Vec<CrustRow>,
    crust_prices: Vec<PriceRow>,
) -> MenuSnapshot {
    let mut product_prices = group_prices(product_prices);
    let mut crust_prices = group_prices(crust_prices);

    let mut categories: Vec<MenuCategory> = Vec::new();
    for row in products {
        let Some(prices) = product_prices.remove(&row.id.as_i32()) else {
            // Products without a price are not orderable.
            continue;
        };
        let product = MenuProduct {
            id: row.id,
            name: row.name,
            description: row.description,
            is_pizza: row.is_pizza,
            prices,
        };
        match categories.last_mut() {
            Some(category) if category.name == row.category => category.products.push(product),
            _ => categories.push(MenuCategory {
                name: row.category,
                products: vec![product],
            }),
        }
    }

    MenuSnapshot {
        categories,
        add_ons: add_ons
            .into_iter()
            .map(|a| AddOn {
                id: a.id,
                name: a.name,
                price: a.price,
            })
            .collect(),
        stuffed_crusts: crusts
            .into_iter()
            .filter_map(|c| {
                crust_prices.remove(&c.id.as_i32()).map(|prices| CrustOption {
                    id: c.id,
                    name: c.name,
                    prices,
                })
            })
            .collect(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;

    fn sizes(pairs: &[(&str, i64)]) -> Vec<SizePrice> {
        pairs
            .iter()
            .map(|&(size, cents)| SizePrice {
                size: size.to_string(),
                price: Money::from_cents(cents),
            })
            .collect()
    }

    /// A small menu: two pizzas, one drink, one add-on, one crust.
    pub(crate) fn sample_menu() -> MenuSnapshot {
        MenuSnapshot {
            categories: vec![
                MenuCategory {
                    name: "Pizzas".to_string(),
                    products: vec![
                        MenuProduct {
                            id: ProductId::new(1),
                            name: "Mussarela".to_string(),
                            description: None,
                            is_pizza: true,
                            prices: sizes(&[("media", 3000), ("grande", 4000)]),
                        },
                        MenuProduct {
                            id: ProductId::new(2),
                            name: "Calabresa".to_string(),
                            description: None,
                            is_pizza: true,
                            prices: sizes(&[("media", 3400), ("grande", 4600)]),
                        },
                    ],
                },
                MenuCategory {
                    name: "Bebidas".to_string(),
                    products: vec![MenuProduct {
                        id: ProductId::new(10),
                        name: "Refrigerante".to_string(),
                        description: None,
                        is_pizza: false,
                        prices: sizes(&[("unico", 800)]),
                    }],
                },
            ],
            add_ons: vec![AddOn {
                id: AddOnId::new(1),
                name: "Bacon".to_string(),
                price: Money::from_cents(500),
            }],
            stuffed_crusts: vec![CrustOption {
                id: StuffedCrustId::new(1),
                name: "Catupiry".to_string(),
                prices: sizes(&[("media", 800), ("grande", 1000)]),
            }],
        }
    }

    fn choice(product: i32, size: &str) -> ItemChoice {
        ItemChoice {
            product_id: ProductId::new(product),
            size: size.to_string(),
            extra_flavors: Vec::new(),
            add_ons: Vec::new(),
            stuffed_crust: None,
            quantity: 1,
            notes: None,
        }
    }

    #[test]
    fn test_new_item_prices_every_component() {
        let menu = sample_menu();
        let mut c = choice(1, " Grande ");
        c.add_ons = vec![AddOnId::new(1)];
        c.stuffed_crust = Some(StuffedCrustId::new(1));

        let item = menu.new_item(&c).unwrap();
        assert_eq!(item.size, "grande");
        assert_eq!(item.price, Money::from_cents(4000));
        assert_eq!(item.flavors.len(), 1);
        assert_eq!(item.add_ons[0].price, Money::from_cents(500));
        assert_eq!(item.stuffed_crust.unwrap().price, Money::from_cents(1000));
    }

    #[test]
    fn test_split_pizza_flavors() {
        let menu = sample_menu();
        let mut c = choice(1, "media");
        c.extra_flavors = vec![ProductId::new(2), ProductId::new(1)];

        let item = menu.new_item(&c).unwrap();
        let ids: Vec<_> = item.flavors.iter().map(|f| f.product_id).collect();
        assert_eq!(ids, vec![ProductId::new(1), ProductId::new(2)]);
        assert_eq!(item.flavors[1].price, Money::from_cents(3400));
    }

    #[test]
    fn test_non_pizza_ignores_flavors_and_crust() {
        let menu = sample_menu();
        let mut c = choice(10, "unico");
        c.extra_flavors = vec![ProductId::new(2)];
        c.stuffed_crust = Some(StuffedCrustId::new(1));

        let item = menu.new_item(&c).unwrap();
        assert!(item.flavors.is_empty());
        assert!(item.stuffed_crust.is_none());
    }

    #[test]
    fn test_unavailable_components() {
        let menu = sample_menu();
        assert!(matches!(
            menu.new_item(&choice(1, "broto")),
            Err(CartError::Unavailable(_))
        ));
        assert!(matches!(
            menu.new_item(&choice(99, "media")),
            Err(CartError::Unavailable(_))
        ));

        let mut c = choice(1, "media");
        c.extra_flavors = vec![ProductId::new(10)];
        assert_eq!(
            menu.new_item(&c).unwrap_err(),
            CartError::FlavorNotFound(ProductId::new(10))
        );

        let mut c = choice(1, "media");
        c.quantity = 0;
        assert_eq!(menu.new_item(&c).unwrap_err(), CartError::ZeroQuantity);
    }

    #[test]
    fn test_catalog_lookup_is_case_insensitive() {
        let menu = sample_menu();
        assert_eq!(
            menu.product_price(ProductId::new(2), "GRANDE"),
            Some(Money::from_cents(4600))
        );
        assert_eq!(
            menu.stuffed_crust_price(StuffedCrustId::new(1), "media"),
            Some(Money::from_cents(800))
        );
        assert_eq!(menu.add_on_price(AddOnId::new(7)), None);
    }

    #[test]
    fn test_assemble_groups_by_category_and_skips_unpriced() {
        let menu = assemble(
            vec![
                ProductRow {
                    id: ProductId::new(1),
                    category: "Pizzas".to_string(),
                    name: "Mussarela".to_string(),
                    description: None,
                    is_pizza: true,
                },
                ProductRow {
                    id: ProductId::new(2),
                    category: "Pizzas".to_string(),
                    name: "Sem preço".to_string(),
                    description: None,
                    is_pizza: true,
                },
                ProductRow {
                    id: ProductId::new(3),
                    category: "Bebidas".to_string(),
                    name: "Suco".to_string(),
                    description: None,
                    is_pizza: false,
                },
            ],
            vec![
                PriceRow {
                    owner_id: 1,
                    size: "Media".to_string(),
                    price: Money::from_cents(3000),
                },
                PriceRow {
                    owner_id: 3,
                    size: "unico".to_string(),
                    price: Money::from_cents(700),
                },
            ],
            Vec::new(),
            vec![CrustRow {
                id: StuffedCrustId::new(4),
                name: "Cheddar".to_string(),
            }],
            Vec::new(),
        );

        assert_eq!(menu.categories.len(), 2);
        assert_eq!(menu.categories[0].products.len(), 1);
        assert_eq!(menu.categories[0].products[0].prices[0].size, "media");
        assert!(menu.stuffed_crusts.is_empty());
    }
}
