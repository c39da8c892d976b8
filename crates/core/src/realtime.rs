//! Change notification payloads published by database triggers.
//!
//! Triggers call `pg_notify` on [`ORDER_EVENTS`] and [`DELIVERY_EVENTS`]
//! with a JSON object `{"table", "op", "order_id", "status"}`.

use serde::{Deserialize, Serialize};

use crate::{DeliveryStatus, OrderId, OrderStatus};

/// Channel carrying order inserts and status updates.
pub const ORDER_EVENTS: &str = "order_events";

/// Channel carrying delivery inserts and updates.
pub const DELIVERY_EVENTS: &str = "delivery_events";

/// Row operation that fired the trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

/// One decoded notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Table the row belongs to (`order` or `delivery`).
    pub table: String,
    /// Operation.
    pub op: ChangeOp,
    /// Order the change concerns.
    pub order_id: OrderId,
    /// Status column after the change, as stored.
    pub status: String,
}

impl ChangeEvent {
    /// Decode a notification payload.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error for malformed payloads.
    pub fn parse(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// The order status, when this is an `order` row event.
    #[must_use]
    pub fn order_status(&self) -> Option<OrderStatus> {
        (self.table == "order")
            .then(|| self.status.parse().ok())
            .flatten()
    }

    /// The delivery status, when this is a `delivery` row event.
    #[must_use]
    pub fn delivery_status(&self) -> Option<DeliveryStatus> {
        (self.table == "delivery")
            .then(|| self.status.parse().ok())
            .flatten()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_order_event() {
        let event = ChangeEvent::parse(
            r#"{"table":"order","op":"UPDATE","order_id":42,"status":"preparando"}"#,
        )
        .unwrap();
        assert_eq!(event.op, ChangeOp::Update);
        assert_eq!(event.order_id, OrderId::new(42));
        assert_eq!(event.order_status(), Some(OrderStatus::Preparing));
        assert_eq!(event.delivery_status(), None);
    }

    #[test]
    fn test_parse_delivery_event() {
        let event = ChangeEvent::parse(
            r#"{"table":"delivery","op":"INSERT","order_id":7,"status":"aguardando"}"#,
        )
        .unwrap();
        assert_eq!(event.delivery_status(), Some(DeliveryStatus::Waiting));
        assert_eq!(event.order_status(), None);
    }

    #[test]
    fn test_malformed_payload() {
        assert!(ChangeEvent::parse("not json").is_err());
        assert!(ChangeEvent::parse(r#"{"table":"order"}"#).is_err());
    }
}
