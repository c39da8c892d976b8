//! Seed the menu from a YAML file.
//!
//! The file is read and validated in full before the database is touched,
//! then applied in one transaction. Rows are matched by name, so running
//! the same file twice updates prices instead of duplicating items.
//!
//! ```yaml
//! categories:
//!   - name: Pizzas
//!     products:
//!       - name: Calabresa
//!         description: Calabresa, cebola e azeitona
//!         pizza: true
//!         prices: { broto: "32,00", grande: "55,00" }
//! add_ons:
//!   - name: Bacon
//!     price: "6,00"
//! stuffed_crusts:
//!   - name: Catupiry
//!     prices: { grande: "12,00" }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::Deserialize;
use sqlx::{Postgres, Transaction};
use tracing::{error, info};

use pizzaria_core::Money;

use super::connect;

/// Size used for products sold in a single size.
const SINGLE_SIZE: &str = "unico";

/// Whole menu file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MenuFile {
    #[serde(default)]
    pub categories: Vec<CategorySeed>,
    #[serde(default)]
    pub add_ons: Vec<AddOnSeed>,
    #[serde(default)]
    pub stuffed_crusts: Vec<StuffedCrustSeed>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CategorySeed {
    pub name: String,
    #[serde(default)]
    pub products: Vec<ProductSeed>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductSeed {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub pizza: bool,
    /// Size to price. A bare `price` is shorthand for the single size.
    #[serde(default)]
    pub prices: BTreeMap<String, String>,
    #[serde(default)]
    pub price: Option<String>,
}

impl ProductSeed {
    fn price_table(&self) -> BTreeMap<String, String> {
        let mut prices = self.prices.clone();
        if let Some(price) = &self.price {
            prices.insert(SINGLE_SIZE.to_owned(), price.clone());
        }
        prices
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddOnSeed {
    pub name: String,
    pub price: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StuffedCrustSeed {
    pub name: String,
    pub prices: BTreeMap<String, String>,
}

/// Counts reported after a run.
#[derive(Debug, Default)]
pub struct SeedSummary {
    pub categories: usize,
    pub products: usize,
    pub add_ons: usize,
    pub stuffed_crusts: usize,
}

fn check_prices(label: &str, prices: &BTreeMap<String, String>, errors: &mut Vec<String>) {
    if prices.is_empty() {
        errors.push(format!("{label}: no prices"));
    }
    for (size, price) in prices {
        if size.trim().is_empty() {
            errors.push(format!("{label}: empty size name"));
        }
        if let Err(e) = Money::parse_price(price) {
            errors.push(format!("{label} ({size}): {e}"));
        }
    }
}

fn check_unique<'a>(
    kind: &str,
    names: impl Iterator<Item = &'a str>,
    errors: &mut Vec<String>,
) {
    let mut seen = HashSet::new();
    for name in names {
        if name.trim().is_empty() {
            errors.push(format!("{kind} with an empty name"));
        } else if !seen.insert(name.trim().to_lowercase()) {
            errors.push(format!("{kind} '{name}' appears twice"));
        }
    }
}

/// Every problem in the file, empty when it can be applied.
#[must_use]
pub fn validate_menu(menu: &MenuFile) -> Vec<String> {
    let mut errors = Vec::new();

    check_unique(
        "category",
        menu.categories.iter().map(|c| c.name.as_str()),
        &mut errors,
    );
    for category in &menu.categories {
        check_unique(
            &format!("product in '{}'", category.name),
            category.products.iter().map(|p| p.name.as_str()),
            &mut errors,
        );
        for product in &category.products {
            check_prices(&product.name, &product.price_table(), &mut errors);
        }
    }

    check_unique(
        "add-on",
        menu.add_ons.iter().map(|a| a.name.as_str()),
        &mut errors,
    );
    for add_on in &menu.add_ons {
        if let Err(e) = Money::parse_price(&add_on.price) {
            errors.push(format!("{}: {e}", add_on.name));
        }
    }

    check_unique(
        "stuffed crust",
        menu.stuffed_crusts.iter().map(|c| c.name.as_str()),
        &mut errors,
    );
    for crust in &menu.stuffed_crusts {
        check_prices(&crust.name, &crust.prices, &mut errors);
    }

    errors
}

fn price(input: &str) -> Result<Money, Box<dyn std::error::Error>> {
    Ok(Money::parse_price(input)?)
}

async fn upsert_product(
    tx: &mut Transaction<'_, Postgres>,
    category_id: i32,
    product: &ProductSeed,
) -> Result<(), Box<dyn std::error::Error>> {
    let name = product.name.trim();
    let existing: Option<i32> =
        sqlx::query_scalar("SELECT id FROM product WHERE category_id = $1 AND name = $2")
            .bind(category_id)
            .bind(name)
            .fetch_optional(&mut **tx)
            .await?;

    let product_id: i32 = match existing {
        Some(id) => {
            sqlx::query(
                r"
                UPDATE product
                SET description = $2, is_pizza = $3, active = TRUE, updated_at = NOW()
                WHERE id = $1
                ",
            )
            .bind(id)
            .bind(product.description.as_deref())
            .bind(product.pizza)
            .execute(&mut **tx)
            .await?;
            id
        }
        None => {
            sqlx::query_scalar(
                r"
                INSERT INTO product (category_id, name, description, is_pizza)
                VALUES ($1, $2, $3, $4)
                RETURNING id
                ",
            )
            .bind(category_id)
            .bind(name)
            .bind(product.description.as_deref())
            .bind(product.pizza)
            .fetch_one(&mut **tx)
            .await?
        }
    };

    for (size, amount) in product.price_table() {
        sqlx::query(
            r"
            INSERT INTO product_price (product_id, size, price)
            VALUES ($1, $2, $3)
            ON CONFLICT (product_id, size) DO UPDATE SET price = EXCLUDED.price
            ",
        )
        .bind(product_id)
        .bind(size.trim())
        .bind(price(&amount)?)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn apply(
    tx: &mut Transaction<'_, Postgres>,
    menu: &MenuFile,
) -> Result<SeedSummary, Box<dyn std::error::Error>> {
    let mut summary = SeedSummary::default();

    for (position, category) in (0_i32..).zip(&menu.categories) {
        let category_id: i32 = sqlx::query_scalar(
            r"
            INSERT INTO category (name, position)
            VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE SET position = EXCLUDED.position
            RETURNING id
            ",
        )
        .bind(category.name.trim())
        .bind(position)
        .fetch_one(&mut **tx)
        .await?;
        summary.categories += 1;

        for product in &category.products {
            upsert_product(tx, category_id, product).await?;
            summary.products += 1;
        }
    }

    for add_on in &menu.add_ons {
        sqlx::query(
            r"
            INSERT INTO add_on (name, price)
            VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE SET price = EXCLUDED.price, active = TRUE
            ",
        )
        .bind(add_on.name.trim())
        .bind(price(&add_on.price)?)
        .execute(&mut **tx)
        .await?;
        summary.add_ons += 1;
    }

    for crust in &menu.stuffed_crusts {
        let crust_id: i32 = sqlx::query_scalar(
            r"
            INSERT INTO stuffed_crust (name)
            VALUES ($1)
            ON CONFLICT (name) DO UPDATE SET active = TRUE
            RETURNING id
            ",
        )
        .bind(crust.name.trim())
        .fetch_one(&mut **tx)
        .await?;

        for (size, amount) in &crust.prices {
            sqlx::query(
                r"
                INSERT INTO stuffed_crust_price (stuffed_crust_id, size, price)
                VALUES ($1, $2, $3)
                ON CONFLICT (stuffed_crust_id, size) DO UPDATE SET price = EXCLUDED.price
                ",
            )
            .bind(crust_id)
            .bind(size.trim())
            .bind(price(amount)?)
            .execute(&mut **tx)
            .await?;
        }
        summary.stuffed_crusts += 1;
    }

    Ok(summary)
}

/// Seed the menu from `file_path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, fails
/// validation, or a database operation fails. Nothing is written unless
/// the whole file applies.
pub async fn menu(file_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(format!("File not found: {file_path}").into());
    }

    info!(path = %file_path, "Loading menu from file");
    let content = tokio::fs::read_to_string(path).await?;
    let menu: MenuFile = serde_yaml::from_str(&content)?;

    let errors = validate_menu(&menu);
    if !errors.is_empty() {
        error!("Menu validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        return Err(format!("{} validation errors found", errors.len()).into());
    }

    let pool = connect().await?;
    let mut tx = pool.begin().await?;
    let summary = apply(&mut tx, &menu).await?;
    tx.commit().await?;

    info!("Seeding complete!");
    info!("  Categories: {}", summary.categories);
    info!("  Products: {}", summary.products);
    info!("  Add-ons: {}", summary.add_ons);
    info!("  Stuffed crusts: {}", summary.stuffed_crusts);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const MENU: &str = r#"
categories:
  - name: Pizzas
    products:
      - name: Calabresa
        pizza: true
        prices: { broto: "32,00", grande: "55,00" }
  - name: Bebidas
    products:
      - name: Guaraná 2L
        price: "12,00"
add_ons:
  - name: Bacon
    price: "6,00"
stuffed_crusts:
  - name: Catupiry
    prices: { grande: "12,00" }
"#;

    #[test]
    fn test_valid_menu_has_no_errors() {
        let menu: MenuFile = serde_yaml::from_str(MENU).unwrap();
        assert!(validate_menu(&menu).is_empty());

        let drink = &menu.categories[1].products[0];
        assert_eq!(
            drink.price_table().get(SINGLE_SIZE).map(String::as_str),
            Some("12,00")
        );
    }

    #[test]
    fn test_reports_every_problem() {
        let menu: MenuFile = serde_yaml::from_str(
            r#"
categories:
  - name: Pizzas
    products:
      - name: Mussarela
        prices: { grande: "-5" }
      - name: mussarela
        prices: { grande: "40" }
      - name: Sem preço
add_ons:
  - name: Bacon
    price: "abc"
"#,
        )
        .unwrap();

        let errors = validate_menu(&menu);
        assert_eq!(errors.len(), 4, "{errors:?}");
        assert!(errors.iter().any(|e| e.contains("appears twice")));
        assert!(errors.iter().any(|e| e.contains("no prices")));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(serde_yaml::from_str::<MenuFile>("categorias: []").is_err());
    }
}
