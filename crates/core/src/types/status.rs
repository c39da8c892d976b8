//! Status and category enums persisted as `PostgreSQL` enum types.
//!
//! Wire values (serde and database) are the Portuguese labels used by the
//! store staff; Rust variant names are English.

use serde::{Deserialize, Serialize};

/// Error returned when a wire value does not match any variant.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("valor inválido para {kind}: {value}")]
pub struct UnknownVariant {
    /// Enum being parsed.
    pub kind: &'static str,
    /// Offending input.
    pub value: String,
}

/// Declares a fieldless enum with a fixed wire value per variant.
///
/// Generates serde/sqlx renames, `as_str`, `ALL`, `Display` and `FromStr`.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident as $pg:literal {
            $(
                $(#[$vmeta:meta])*
                $variant:ident => $wire:literal,
            )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[cfg_attr(feature = "postgres", derive(sqlx::Type))]
        #[cfg_attr(feature = "postgres", sqlx(type_name = $pg))]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $wire)]
                #[cfg_attr(feature = "postgres", sqlx(rename = $wire))]
                $variant,
            )+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// The wire value stored in the database.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $wire,)+
                }
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok(Self::$variant),)+
                    _ => Err(UnknownVariant {
                        kind: stringify!($name),
                        value: s.to_owned(),
                    }),
                }
            }
        }
    };
}

wire_enum! {
    /// Lifecycle status of an order; one Kanban column per status.
    pub enum OrderStatus as "order_status" {
        /// Received, waiting for the kitchen.
        Pending => "pendente",
        /// In the kitchen.
        Preparing => "preparando",
        /// Handed to a courier.
        OutForDelivery => "saiu_entrega",
        /// Delivered or picked up.
        Finished => "finalizado",
        /// Cancelled by the store.
        Cancelled => "cancelado",
    }
}

impl OrderStatus {
    /// Statuses reachable in one move from `self`.
    ///
    /// `Finished` and `Cancelled` are terminal.
    #[must_use]
    pub const fn allowed_transitions(self) -> &'static [Self] {
        match self {
            Self::Pending => &[Self::Preparing, Self::Cancelled],
            Self::Preparing => &[Self::OutForDelivery, Self::Finished, Self::Cancelled],
            Self::OutForDelivery => &[Self::Finished, Self::Cancelled],
            Self::Finished | Self::Cancelled => &[],
        }
    }

    /// Returns `true` if `next` is an edge of the transition table.
    ///
    /// A status never transitions to itself.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        self.allowed_transitions().contains(&next)
    }

    /// Returns `true` for statuses with no outgoing transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// Column heading shown to operators and customers.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pendente",
            Self::Preparing => "Em preparo",
            Self::OutForDelivery => "Saiu para entrega",
            Self::Finished => "Finalizado",
            Self::Cancelled => "Cancelado",
        }
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// Returns `true` only for edges of the fixed order-status adjacency list.
#[must_use]
pub fn validate_transition(current: OrderStatus, next: OrderStatus) -> bool {
    current.can_transition_to(next)
}

wire_enum! {
    /// How the customer receives the order.
    pub enum Fulfillment as "fulfillment_type" {
        /// Delivered to an address by a courier.
        Delivery => "entrega",
        /// Picked up at the counter.
        Pickup => "retirada",
    }
}

impl Fulfillment {
    /// Returns `true` when an address and delivery fee apply.
    #[must_use]
    pub const fn requires_address(self) -> bool {
        matches!(self, Self::Delivery)
    }
}

wire_enum! {
    /// Payment method chosen at checkout or recorded on a cash entry.
    pub enum PaymentMethod as "payment_method" {
        /// Physical cash.
        Cash => "dinheiro",
        /// Instant transfer.
        Pix => "pix",
        /// Credit card.
        CreditCard => "credito",
        /// Debit card.
        DebitCard => "debito",
        /// Meal voucher card.
        MealVoucher => "vale_refeicao",
    }
}

impl PaymentMethod {
    /// Human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Cash => "Dinheiro",
            Self::Pix => "Pix",
            Self::CreditCard => "Cartão de crédito",
            Self::DebitCard => "Cartão de débito",
            Self::MealVoucher => "Vale-refeição",
        }
    }
}

wire_enum! {
    /// Progress of a delivery run.
    pub enum DeliveryStatus as "delivery_status" {
        /// Courier assigned, order not yet collected.
        Waiting => "aguardando",
        /// Courier on the way.
        OnRoute => "em_rota",
        /// Handed to the customer.
        Delivered => "entregue",
        /// Released because the order was cancelled or reassigned.
        Cancelled => "cancelada",
    }
}

impl DeliveryStatus {
    /// Returns `true` if `next` follows `self` in the delivery flow.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Waiting, Self::OnRoute | Self::Cancelled)
                | (Self::OnRoute, Self::Delivered | Self::Cancelled)
        )
    }
}

wire_enum! {
    /// Kind of cash register entry (lançamento).
    pub enum CashEntryKind as "cash_entry_kind" {
        /// Payment received for an order.
        Sale => "venda",
        /// Cash added to the drawer (suprimento).
        Supply => "suprimento",
        /// Cash removed from the drawer (sangria).
        Withdrawal => "sangria",
        /// Expense paid from the drawer.
        Expense => "despesa",
    }
}

impl CashEntryKind {
    /// Returns `true` for entries that add money to the register.
    #[must_use]
    pub const fn is_inflow(self) -> bool {
        matches!(self, Self::Sale | Self::Supply)
    }
}

wire_enum! {
    /// Whether a cash register session is open.
    pub enum CashRegisterStatus as "cash_register_status" {
        /// Accepting entries.
        Open => "aberto",
        /// Closed with a counted balance.
        Closed => "fechado",
    }
}

wire_enum! {
    /// Result of an NFC-e emission.
    pub enum FiscalReceiptStatus as "fiscal_receipt_status" {
        /// Sent to the provider, awaiting authorization.
        Pending => "pendente",
        /// Authorized by the tax authority.
        Authorized => "autorizada",
        /// Rejected by the provider or the tax authority.
        Rejected => "rejeitada",
        /// Cancelled after authorization.
        Cancelled => "cancelada",
    }
}

wire_enum! {
    /// NFC-e provider environment.
    pub enum FiscalEnvironment as "fiscal_environment" {
        /// Testing environment.
        Homologation => "homologacao",
        /// Production environment.
        Production => "producao",
    }
}

wire_enum! {
    /// Outcome of a customer notification attempt.
    pub enum NotificationStatus as "notification_status" {
        /// Accepted by the messaging provider.
        Sent => "enviada",
        /// Provider or network failure.
        Failed => "falhou",
    }
}

wire_enum! {
    /// Back-office role with different permission levels.
    pub enum AdminRole as "admin_role" {
        /// Full access, including operator management and settings.
        Owner => "dono",
        /// Store management: reports, cash register, loyalty, fiscal.
        Manager => "gerente",
        /// Day-to-day operation: kanban, deliveries, cash entries.
        Attendant => "atendente",
    }
}

impl AdminRole {
    /// Returns `true` if the role may change store settings and see reports.
    #[must_use]
    pub const fn can_manage(self) -> bool {
        matches!(self, Self::Owner | Self::Manager)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const EDGES: &[(OrderStatus, OrderStatus)] = &[
        (OrderStatus::Pending, OrderStatus::Preparing),
        (OrderStatus::Pending, OrderStatus::Cancelled),
        (OrderStatus::Preparing, OrderStatus::OutForDelivery),
        (OrderStatus::Preparing, OrderStatus::Finished),
        (OrderStatus::Preparing, OrderStatus::Cancelled),
        (OrderStatus::OutForDelivery, OrderStatus::Finished),
        (OrderStatus::OutForDelivery, OrderStatus::Cancelled),
    ];

    #[test]
    fn test_transition_table_is_exact() {
        for &current in OrderStatus::ALL {
            for &next in OrderStatus::ALL {
                let expected = EDGES.contains(&(current, next));
                assert_eq!(
                    validate_transition(current, next),
                    expected,
                    "{current} -> {next}"
                );
            }
        }
    }

    #[test]
    fn test_self_transition_always_rejected() {
        for &status in OrderStatus::ALL {
            assert!(!validate_transition(status, status));
        }
    }

    #[test]
    fn test_finished_is_terminal() {
        assert!(OrderStatus::Finished.is_terminal());
        assert!(!validate_transition(OrderStatus::Finished, OrderStatus::Cancelled));
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(!OrderStatus::Pending.is_terminal());
    }

    #[test]
    fn test_wire_values_roundtrip() {
        assert_eq!(OrderStatus::OutForDelivery.as_str(), "saiu_entrega");
        assert_eq!(
            "finalizado".parse::<OrderStatus>().unwrap(),
            OrderStatus::Finished
        );
        assert_eq!(
            serde_json::to_string(&OrderStatus::Cancelled).unwrap(),
            "\"cancelado\""
        );
        let err = "entregue".parse::<OrderStatus>().unwrap_err();
        assert_eq!(err.kind, "OrderStatus");
    }

    #[test]
    fn test_delivery_status_flow() {
        assert!(DeliveryStatus::Waiting.can_transition_to(DeliveryStatus::OnRoute));
        assert!(DeliveryStatus::OnRoute.can_transition_to(DeliveryStatus::Delivered));
        assert!(!DeliveryStatus::Delivered.can_transition_to(DeliveryStatus::OnRoute));
        assert!(!DeliveryStatus::Waiting.can_transition_to(DeliveryStatus::Delivered));
    }

    #[test]
    fn test_cash_entry_direction() {
        assert!(CashEntryKind::Sale.is_inflow());
        assert!(CashEntryKind::Supply.is_inflow());
        assert!(!CashEntryKind::Withdrawal.is_inflow());
        assert!(!CashEntryKind::Expense.is_inflow());
    }

    #[test]
    fn test_admin_role_permissions() {
        assert!(AdminRole::Owner.can_manage());
        assert!(AdminRole::Manager.can_manage());
        assert!(!AdminRole::Attendant.can_manage());
        assert_eq!("gerente".parse::<AdminRole>().unwrap(), AdminRole::Manager);
    }
}
