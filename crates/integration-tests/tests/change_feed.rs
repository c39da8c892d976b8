//! Reload ticks produced from database change notifications.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use futures::StreamExt;

use pizzaria_admin::services::ChangeFeed;
use pizzaria_admin::services::change_feed::{affects_board, affects_deliveries, reloads};
use pizzaria_core::realtime::ChangeEvent;

const WINDOW: Duration = Duration::from_millis(50);

fn event(payload: &str) -> ChangeEvent {
    ChangeEvent::parse(payload).unwrap()
}

#[tokio::test]
async fn test_a_burst_of_changes_is_one_reload() {
    let feed = ChangeFeed::new();
    let ticks = reloads(feed.subscribe(), WINDOW, affects_board);
    tokio::pin!(ticks);

    for status in ["pendente", "preparando", "saiu_entrega"] {
        feed.publish(event(&format!(
            r#"{{"table":"order","op":"UPDATE","order_id":12,"status":"{status}"}}"#
        )));
    }
    assert_eq!(ticks.next().await, Some(()));

    drop(feed);
    assert_eq!(ticks.next().await, None);
}

#[tokio::test]
async fn test_delivery_list_ignores_kitchen_progress() {
    let feed = ChangeFeed::new();
    let ticks = reloads(feed.subscribe(), WINDOW, affects_deliveries);
    tokio::pin!(ticks);

    feed.publish(event(
        r#"{"table":"order","op":"UPDATE","order_id":3,"status":"preparando"}"#,
    ));
    let quiet = tokio::time::timeout(WINDOW * 3, ticks.next()).await;
    assert!(quiet.is_err(), "kitchen progress must not reload deliveries");

    feed.publish(event(
        r#"{"table":"delivery","op":"UPDATE","order_id":3,"status":"em_rota"}"#,
    ));
    assert_eq!(ticks.next().await, Some(()));
}
