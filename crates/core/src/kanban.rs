//! Order board grouped by status, and the move command operators issue on it.
//!
//! A move is an explicit [`MoveCard`] command. `apply` validates the edge
//! against the transition table and moves the card optimistically; if the
//! database write fails afterwards, `undo` puts the card back exactly where
//! it was.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Fulfillment, Money, OrderId, OrderStatus, PaymentMethod};

/// Errors produced when moving a card.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// The order is not on the board.
    #[error("pedido #{0} não encontrado")]
    NotFound(OrderId),
    /// The card is not in the column the move started from.
    #[error("pedido #{order_id} está em \"{}\", não em \"{}\"", actual.label(), expected.label())]
    StatusMismatch {
        /// Order being moved.
        order_id: OrderId,
        /// Column the operator dragged from.
        expected: OrderStatus,
        /// Column the card is actually in.
        actual: OrderStatus,
    },
    /// The edge is not in the transition table.
    #[error("não é possível mover de \"{}\" para \"{}\"", from.label(), to.label())]
    NotAllowed {
        /// Current status.
        from: OrderStatus,
        /// Requested status.
        to: OrderStatus,
    },
    /// `undo` called on a command that was never applied.
    #[error("movimento não aplicado")]
    NotApplied,
}

/// One order as shown on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct OrderCard {
    /// Order id.
    pub order_id: OrderId,
    /// Current status.
    pub status: OrderStatus,
    /// Customer display name.
    pub customer_name: String,
    /// Delivery or pickup.
    pub fulfillment: Fulfillment,
    /// Payment method chosen at checkout.
    pub payment_method: PaymentMethod,
    /// Order total.
    pub total: Money,
    /// Number of units across items.
    pub item_count: i64,
    /// Assigned courier, if any.
    pub courier_name: Option<String>,
    /// When the order was placed.
    pub created_at: DateTime<Utc>,
}

/// One board column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    /// Status this column holds.
    pub status: OrderStatus,
    /// Cards, oldest first.
    pub cards: Vec<OrderCard>,
}

impl Column {
    /// Heading shown above the column.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        self.status.label()
    }

    /// Sum of the totals of the cards in this column.
    #[must_use]
    pub fn total(&self) -> Money {
        self.cards.iter().map(|c| c.total).sum()
    }
}

/// Orders grouped into one column per status, in [`OrderStatus::ALL`] order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KanbanBoard {
    columns: Vec<Column>,
}

impl Default for KanbanBoard {
    fn default() -> Self {
        Self {
            columns: OrderStatus::ALL
                .iter()
                .map(|&status| Column {
                    status,
                    cards: Vec::new(),
                })
                .collect(),
        }
    }
}

// `columns` always holds one entry per status, so `column_index` is in bounds.
#[allow(clippy::indexing_slicing)]
impl KanbanBoard {
    /// Build a board from cards in any order.
    #[must_use]
    pub fn from_cards(cards: impl IntoIterator<Item = OrderCard>) -> Self {
        let mut board = Self::default();
        for card in cards {
            board.column_mut(card.status).cards.push(card);
        }
        for column in &mut board.columns {
            column.cards.sort_by_key(|c| (c.created_at, c.order_id));
        }
        board
    }

    /// Columns in display order.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// The column for `status`.
    #[must_use]
    pub fn column(&self, status: OrderStatus) -> &Column {
        let index = column_index(status);
        &self.columns[index]
    }

    fn column_mut(&mut self, status: OrderStatus) -> &mut Column {
        let index = column_index(status);
        &mut self.columns[index]
    }

    /// Number of cards per status, in display order.
    #[must_use]
    pub fn counts(&self) -> Vec<(OrderStatus, usize)> {
        self.columns
            .iter()
            .map(|c| (c.status, c.cards.len()))
            .collect()
    }

    /// Total number of cards on the board.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.iter().map(|c| c.cards.len()).sum()
    }

    /// Returns `true` if the board has no cards.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Find a card by order id.
    #[must_use]
    pub fn find(&self, order_id: OrderId) -> Option<&OrderCard> {
        self.columns
            .iter()
            .flat_map(|c| c.cards.iter())
            .find(|c| c.order_id == order_id)
    }

    /// Add a card loaded outside the board query, such as a closed order
    /// past the display window. A card already on the board is left as is.
    pub fn include(&mut self, card: OrderCard) {
        if self.position(card.order_id).is_some() {
            return;
        }
        let column = self.column_mut(card.status);
        column.cards.push(card);
        column.cards.sort_by_key(|c| (c.created_at, c.order_id));
    }

    fn position(&self, order_id: OrderId) -> Option<(usize, usize)> {
        self.columns.iter().enumerate().find_map(|(col, column)| {
            column
                .cards
                .iter()
                .position(|c| c.order_id == order_id)
                .map(|row| (col, row))
        })
    }
}

const fn column_index(status: OrderStatus) -> usize {
    match status {
        OrderStatus::Pending => 0,
        OrderStatus::Preparing => 1,
        OrderStatus::OutForDelivery => 2,
        OrderStatus::Finished => 3,
        OrderStatus::Cancelled => 4,
    }
}

/// Where a card sat before a move.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Snapshot {
    column: usize,
    row: usize,
    card: OrderCard,
}

/// Command moving one card between columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveCard {
    order_id: OrderId,
    from: OrderStatus,
    to: OrderStatus,
    previous: Option<Snapshot>,
}

#[allow(clippy::indexing_slicing)]
impl MoveCard {
    /// A move of `order_id` from the `from` column to `to`.
    #[must_use]
    pub const fn new(order_id: OrderId, from: OrderStatus, to: OrderStatus) -> Self {
        Self {
            order_id,
            from,
            to,
            previous: None,
        }
    }

    /// Order being moved.
    #[must_use]
    pub const fn order_id(&self) -> OrderId {
        self.order_id
    }

    /// Column the move starts from.
    #[must_use]
    pub const fn from(&self) -> OrderStatus {
        self.from
    }

    /// Destination column.
    #[must_use]
    pub const fn to(&self) -> OrderStatus {
        self.to
    }

    /// Returns `true` after a successful `apply` that has not been undone.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        self.previous.is_some()
    }

    /// Check the move against the transition table without a board.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError::NotAllowed`] for edges outside the table.
    pub fn validate(&self) -> Result<(), TransitionError> {
        if self.from.can_transition_to(self.to) {
            Ok(())
        } else {
            Err(TransitionError::NotAllowed {
                from: self.from,
                to: self.to,
            })
        }
    }

    /// Validate and perform the move. The card goes to the end of the
    /// destination column.
    ///
    /// # Errors
    ///
    /// The board is untouched when an error is returned.
    pub fn apply(&mut self, board: &mut KanbanBoard) -> Result<(), TransitionError> {
        let (column, row) = board
            .position(self.order_id)
            .ok_or(TransitionError::NotFound(self.order_id))?;
        let actual = board.columns[column].status;
        if actual != self.from {
            return Err(TransitionError::StatusMismatch {
                order_id: self.order_id,
                expected: self.from,
                actual,
            });
        }
        self.validate()?;

        let card = board.columns[column].cards.remove(row);
        self.previous = Some(Snapshot {
            column,
            row,
            card: card.clone(),
        });

        let mut moved = card;
        moved.status = self.to;
        board.column_mut(self.to).cards.push(moved);
        Ok(())
    }

    /// Reverse a previous `apply`, restoring the card and its position.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError::NotApplied`] if there is nothing to undo.
    pub fn undo(&mut self, board: &mut KanbanBoard) -> Result<(), TransitionError> {
        let snapshot = self.previous.take().ok_or(TransitionError::NotApplied)?;

        if let Some((column, row)) = board.position(self.order_id) {
            board.columns[column].cards.remove(row);
        }
        let cards = &mut board.columns[snapshot.column].cards;
        let row = snapshot.row.min(cards.len());
        cards.insert(row, snapshot.card);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn card(id: i32, status: OrderStatus, minute: u32) -> OrderCard {
        OrderCard {
            order_id: OrderId::new(id),
            status,
            customer_name: format!("Cliente {id}"),
            fulfillment: Fulfillment::Delivery,
            payment_method: PaymentMethod::Pix,
            total: Money::from_cents(5000),
            item_count: 1,
            courier_name: None,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 19, minute, 0).unwrap(),
        }
    }

    fn board() -> KanbanBoard {
        KanbanBoard::from_cards([
            card(3, OrderStatus::Pending, 10),
            card(1, OrderStatus::Pending, 5),
            card(2, OrderStatus::Preparing, 1),
            card(4, OrderStatus::Finished, 0),
        ])
    }

    #[test]
    fn test_columns_in_fixed_order_sorted_oldest_first() {
        let board = board();
        let statuses: Vec<_> = board.columns().iter().map(|c| c.status).collect();
        assert_eq!(statuses, OrderStatus::ALL);

        let pending: Vec<_> = board
            .column(OrderStatus::Pending)
            .cards
            .iter()
            .map(|c| c.order_id)
            .collect();
        assert_eq!(pending, [OrderId::new(1), OrderId::new(3)]);
        assert_eq!(board.len(), 4);
        assert_eq!(board.column(OrderStatus::Pending).total(), Money::from_cents(10_000));
    }

    #[test]
    fn test_apply_moves_card_and_updates_status() {
        let mut board = board();
        let mut command = MoveCard::new(OrderId::new(1), OrderStatus::Pending, OrderStatus::Preparing);
        command.apply(&mut board).unwrap();

        assert!(command.is_applied());
        let moved = board.find(OrderId::new(1)).unwrap();
        assert_eq!(moved.status, OrderStatus::Preparing);
        assert_eq!(board.column(OrderStatus::Pending).cards.len(), 1);
        assert_eq!(board.column(OrderStatus::Preparing).cards.len(), 2);
    }

    #[test]
    fn test_undo_restores_exact_position() {
        let original = board();
        let mut board = original.clone();
        let mut command = MoveCard::new(OrderId::new(1), OrderStatus::Pending, OrderStatus::Cancelled);
        command.apply(&mut board).unwrap();
        command.undo(&mut board).unwrap();

        assert_eq!(board, original);
        assert!(!command.is_applied());
        assert_eq!(command.undo(&mut board), Err(TransitionError::NotApplied));
    }

    #[test]
    fn test_rejected_move_leaves_board_untouched() {
        let original = board();
        let mut board = original.clone();

        let mut skip = MoveCard::new(OrderId::new(1), OrderStatus::Pending, OrderStatus::Finished);
        assert_eq!(
            skip.apply(&mut board),
            Err(TransitionError::NotAllowed {
                from: OrderStatus::Pending,
                to: OrderStatus::Finished
            })
        );

        let mut terminal = MoveCard::new(OrderId::new(4), OrderStatus::Finished, OrderStatus::Cancelled);
        assert!(terminal.apply(&mut board).is_err());

        let mut stale = MoveCard::new(OrderId::new(2), OrderStatus::Pending, OrderStatus::Preparing);
        assert!(matches!(
            stale.apply(&mut board),
            Err(TransitionError::StatusMismatch { actual: OrderStatus::Preparing, .. })
        ));

        let mut missing = MoveCard::new(OrderId::new(99), OrderStatus::Pending, OrderStatus::Preparing);
        assert_eq!(
            missing.apply(&mut board),
            Err(TransitionError::NotFound(OrderId::new(99)))
        );

        assert_eq!(board, original);
    }

    #[test]
    fn test_error_messages_use_labels() {
        let err = TransitionError::NotAllowed {
            from: OrderStatus::Finished,
            to: OrderStatus::Cancelled,
        };
        assert_eq!(
            err.to_string(),
            "não é possível mover de \"Finalizado\" para \"Cancelado\""
        );
    }

    #[test]
    fn test_counts() {
        let counts = board().counts();
        assert_eq!(counts[0], (OrderStatus::Pending, 2));
        assert_eq!(counts[4], (OrderStatus::Cancelled, 0));
    }

    #[test]
    fn test_include_adds_missing_card_once() {
        let mut board = board();
        board.include(card(9, OrderStatus::Finished, 30));
        board.include(card(9, OrderStatus::Finished, 30));
        board.include(card(1, OrderStatus::Cancelled, 0));

        let finished: Vec<i32> = board
            .column(OrderStatus::Finished)
            .cards
            .iter()
            .map(|c| c.order_id.as_i32())
            .collect();
        assert_eq!(finished, vec![4, 9]);
        assert_eq!(board.find(OrderId::new(1)).unwrap().status, OrderStatus::Pending);
        assert!(board.column(OrderStatus::Cancelled).cards.is_empty());
    }
}
