//! Askama filters for the back office pages.

use std::borrow::Borrow;
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

/// How long a card has been waiting, e.g. `há 1h05`.
///
/// Usage in templates: `{{ card.waiting_minutes|waiting }}`
#[allow(clippy::unnecessary_wraps)]
#[askama::filter_fn]
pub fn waiting(minutes: impl Borrow<i64>, _env: &dyn askama::Values) -> askama::Result<String> {
    Ok(waiting_label(*minutes.borrow()))
}

/// Item count with the right plural.
///
/// Usage in templates: `{{ card.item_count|items }}`
#[allow(clippy::unnecessary_wraps)]
#[askama::filter_fn]
pub fn items(count: impl Display, _env: &dyn askama::Values) -> askama::Result<String> {
    Ok(items_label(&count.to_string()))
}

fn waiting_label(minutes: i64) -> String {
    match minutes {
        i64::MIN..=0 => "agora".to_string(),
        1..=59 => format!("há {minutes} min"),
        _ => format!("há {}h{:02}", minutes / 60, minutes % 60),
    }
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
    fn test_waiting_label() {
        assert_eq!(waiting_label(0), "agora");
        assert_eq!(waiting_label(12), "há 12 min");
        assert_eq!(waiting_label(65), "há 1h05");
    }

    #[test]
    fn test_items_label() {
        assert_eq!(items_label("1"), "1 item");
        assert_eq!(items_label("3"), "3 itens");
    }
}
