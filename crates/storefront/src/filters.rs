//! Askama filters for the storefront pages.

use std::fmt::Display;

/// Returns the current year.
///
/// Usage in templates: `{{ ""|current_year }}`
#[allow(clippy::unnecessary_wraps)]
#[askama::filter_fn]
pub fn current_year(_value: impl Display, _env: &dyn askama::Values) -> askama::Result<i32> {
    use chrono::Datelike;
    Ok(chrono::Utc::now().year())
}

/// Item count with the right plural.
///
/// Usage in templates: `{{ cart.item_count|items }}`
#[allow(clippy::unnecessary_wraps)]
#[askama::filter_fn]
pub fn items(count: impl Display, _env: &dyn askama::Values) -> askama::Result<String> {
    Ok(items_label(&count.to_string()))
}

fn items_label(count: &str) -> String {
    if count == "1" {
        "1 item".to_string()
    } else {
        format!("{count} itens")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_items_label() {
        assert_eq!(items_label("0"), "0 itens");
        assert_eq!(items_label("1"), "1 item");
    }
}
