//! Order board moves and their side effects.
//!
//! A move is applied to a freshly loaded board first, so rejected edges
//! never reach the database. Orders missing from the board (closed ones
//! past the display window) are loaded by id and checked the same way. The status write itself is conditional (see
//! [`OrderRepository::transition`]); if it fails the move is undone on the
//! board and the error returned. Side effects run after the commit and are
//! only logged when they fail.

use chrono::{DateTime, TimeDelta, Utc};
use sqlx::PgPool;
use thiserror::Error;
use tracing::instrument;

use pizzaria_core::kanban::{KanbanBoard, MoveCard, OrderCard, TransitionError};
use pizzaria_core::order::StatusChange;
use pizzaria_core::{DeliveryStatus, Fulfillment, OrderId, OrderStatus};

use crate::db::{
    CashRepository, DeliveryRepository, LoyaltyRepository, OrderRepository, RepositoryError,
};
use crate::services::notifications::Notifier;

/// Finished and cancelled cards stay on the board this many hours.
const CLOSED_CARDS_HOURS: i64 = 12;

/// Errors returned by a board move.
#[derive(Debug, Error)]
pub enum MoveError {
    /// Edge rejected by the transition table or the board state.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// Pickup orders are handed over at the counter.
    #[error("pedido para retirada não sai para entrega")]
    PickupNotDeliverable,

    /// A delivery order needs a courier before it leaves.
    #[error("atribua um motoboy antes de enviar o pedido")]
    CourierRequired,

    /// Repository/database error, including concurrent changes.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// A committed move and the board after it.
#[derive(Debug)]
pub struct MoveOutcome {
    pub board: KanbanBoard,
    pub change: StatusChange,
}

/// Checks that depend on the order rather than the transition table.
///
/// # Errors
///
/// Returns [`MoveError::PickupNotDeliverable`] or
/// [`MoveError::CourierRequired`] for orders that cannot go out.
pub fn check_preconditions(card: &OrderCard, to: OrderStatus) -> Result<(), MoveError> {
    if to == OrderStatus::OutForDelivery {
        if card.fulfillment == Fulfillment::Pickup {
            return Err(MoveError::PickupNotDeliverable);
        }
        if card.courier_name.is_none() {
            return Err(MoveError::CourierRequired);
        }
    }
    Ok(())
}

/// Apply `command` to `board` and check the order's preconditions.
///
/// `stored` is the order as loaded by id. It is added to the board when the
/// board query left it out, so closed orders past the display window get the
/// same transition checks as visible ones. On error the board is unchanged.
///
/// # Errors
///
/// Returns `MoveError::Transition` for unknown orders, stale `from` or
/// rejected edges, and the precondition errors.
pub fn stage_move(
    board: &mut KanbanBoard,
    stored: Option<OrderCard>,
    command: &mut MoveCard,
) -> Result<OrderCard, MoveError> {
    if let Some(card) = stored {
        board.include(card);
    }
    command.apply(board)?;

    let card = board
        .find(command.order_id())
        .cloned()
        .ok_or(TransitionError::NotFound(command.order_id()))?;
    if let Err(e) = check_preconditions(&card, command.to()) {
        command.undo(board)?;
        return Err(e);
    }
    Ok(card)
}

/// Kanban operations.
pub struct KanbanService<'a> {
    pool: &'a PgPool,
    http: &'a reqwest::Client,
    store_name: &'a str,
}

impl<'a> KanbanService<'a> {
    /// Create a kanban service.
    #[must_use]
    pub const fn new(pool: &'a PgPool, http: &'a reqwest::Client, store_name: &'a str) -> Self {
        Self {
            pool,
            http,
            store_name,
        }
    }

    /// Oldest moment a closed card is still shown.
    fn closed_since() -> DateTime<Utc> {
        Utc::now() - TimeDelta::hours(CLOSED_CARDS_HOURS)
    }

    /// Load the current board.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the load fails after retries.
    pub async fn board(&self) -> Result<KanbanBoard, RepositoryError> {
        let cards = OrderRepository::new(self.pool)
            .board_cards(Self::closed_since())
            .await?;
        Ok(KanbanBoard::from_cards(cards))
    }

    /// Move an order between columns on behalf of `operator`.
    ///
    /// # Errors
    ///
    /// Returns `MoveError::Transition` for rejected edges or a stale `from`,
    /// the precondition errors, and `MoveError::Repository` (with
    /// `RepositoryError::Conflict`) when another operator moved it first.
    #[instrument(skip(self, operator), fields(order_id = %order_id, from = %from, to = %to))]
    pub async fn move_card(
        &self,
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        operator: &str,
    ) -> Result<MoveOutcome, MoveError> {
        let mut board = self.board().await?;
        let stored = match board.find(order_id) {
            Some(_) => None,
            None => OrderRepository::new(self.pool).card(order_id).await?,
        };
        let mut command = MoveCard::new(order_id, from, to);
        let card = stage_move(&mut board, stored, &mut command)?;

        let change = match OrderRepository::new(self.pool)
            .transition(order_id, from, to, operator)
            .await
        {
            Ok(change) => change,
            Err(e) => {
                command.undo(&mut board)?;
                tracing::info!(error = %e, "move rolled back");
                return Err(e.into());
            }
        };

        tracing::info!("order moved");
        self.after_move(&card, to, operator).await;

        Ok(MoveOutcome { board, change })
    }

    async fn after_move(&self, card: &OrderCard, to: OrderStatus, operator: &str) {
        let order_id = card.order_id;
        let deliveries = DeliveryRepository::new(self.pool);

        match to {
            OrderStatus::Cancelled => {
                if let Err(e) = deliveries.release(order_id).await {
                    tracing::error!(error = %e, %order_id, "failed to release delivery");
                }
            }
            OrderStatus::OutForDelivery => {
                if let Err(e) = deliveries
                    .set_status(order_id, DeliveryStatus::Waiting, DeliveryStatus::OnRoute)
                    .await
                {
                    tracing::warn!(error = %e, %order_id, "delivery not marked on route");
                }
            }
            OrderStatus::Finished => self.finish(card, operator).await,
            OrderStatus::Pending | OrderStatus::Preparing => {}
        }

        self.spawn_notification(order_id, to);
    }

    async fn finish(&self, card: &OrderCard, operator: &str) {
        let order_id = card.order_id;

        if card.fulfillment == Fulfillment::Delivery
            && let Err(e) = DeliveryRepository::new(self.pool)
                .set_status(order_id, DeliveryStatus::OnRoute, DeliveryStatus::Delivered)
                .await
        {
            tracing::warn!(error = %e, %order_id, "delivery not marked delivered");
        }

        if let Err(e) = self.credit_loyalty(order_id).await {
            tracing::error!(error = %e, %order_id, "failed to credit loyalty points");
        }

        match CashRepository::new(self.pool)
            .record_sale(order_id, card.payment_method, card.total, operator)
            .await
        {
            Ok(true) => tracing::debug!(%order_id, "sale recorded in cash register"),
            Ok(false) => tracing::debug!(%order_id, "no open register or sale already recorded"),
            Err(e) => tracing::error!(error = %e, %order_id, "failed to record sale"),
        }
    }

    async fn credit_loyalty(&self, order_id: OrderId) -> Result<(), RepositoryError> {
        let loyalty = LoyaltyRepository::new(self.pool);
        let config = loyalty.config().await?;
        let Some(contact) = OrderRepository::new(self.pool).contact(order_id).await? else {
            return Ok(());
        };
        let Some(customer_id) = contact.customer_id else {
            return Ok(());
        };

        let points = config.points_for(contact.total);
        if points > 0 && loyalty.credit_order(order_id, customer_id, points).await? {
            tracing::info!(%order_id, points, "loyalty points credited");
        }
        Ok(())
    }

    /// The provider may be slow; the move response does not wait for it.
    fn spawn_notification(&self, order_id: OrderId, status: OrderStatus) {
        let pool = self.pool.clone();
        let http = self.http.clone();
        let store_name = self.store_name.to_owned();

        tokio::spawn(async move {
            let contact = match OrderRepository::new(&pool).contact(order_id).await {
                Ok(Some(contact)) => contact,
                Ok(None) => return,
                Err(e) => {
                    tracing::error!(error = %e, %order_id, "failed to load order for notification");
                    return;
                }
            };
            if let Err(e) = Notifier::new(&pool, &http, &store_name)
                .order_status(&contact, status)
                .await
            {
                tracing::error!(error = %e, %order_id, "failed to notify customer");
            }
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pizzaria_core::{Money, PaymentMethod};

    use super::*;

    fn card(fulfillment: Fulfillment, courier: Option<&str>) -> OrderCard {
        OrderCard {
            order_id: OrderId::new(9),
            status: OrderStatus::Preparing,
            customer_name: "Carla".to_string(),
            fulfillment,
            payment_method: PaymentMethod::Cash,
            total: Money::from_cents(6200),
            item_count: 2,
            courier_name: courier.map(str::to_string),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_delivery_needs_courier_to_go_out() {
        let err = check_preconditions(&card(Fulfillment::Delivery, None), OrderStatus::OutForDelivery)
            .unwrap_err();
        assert!(matches!(err, MoveError::CourierRequired));

        assert!(
            check_preconditions(
                &card(Fulfillment::Delivery, Some("Zé")),
                OrderStatus::OutForDelivery
            )
            .is_ok()
        );
    }

    #[test]
    fn test_pickup_never_goes_out_for_delivery() {
        let err = check_preconditions(&card(Fulfillment::Pickup, Some("Zé")), OrderStatus::OutForDelivery)
            .unwrap_err();
        assert!(matches!(err, MoveError::PickupNotDeliverable));
    }

    #[test]
    fn test_other_moves_have_no_preconditions() {
        let pickup = card(Fulfillment::Pickup, None);
        assert!(check_preconditions(&pickup, OrderStatus::Finished).is_ok());
        assert!(check_preconditions(&pickup, OrderStatus::Cancelled).is_ok());
    }

    #[test]
    fn test_transition_errors_keep_their_message() {
        let err = MoveError::from(TransitionError::NotAllowed {
            from: OrderStatus::Finished,
            to: OrderStatus::Cancelled,
        });
        assert_eq!(
            err.to_string(),
            "não é possível mover de \"Finalizado\" para \"Cancelado\""
        );
    }

    #[test]
    fn test_closed_order_off_the_board_gets_the_transition_check() {
        let mut board = KanbanBoard::default();
        let finished = OrderCard {
            status: OrderStatus::Finished,
            created_at: Utc::now() - TimeDelta::days(2),
            ..card(Fulfillment::Pickup, None)
        };
        let mut command = MoveCard::new(finished.order_id, OrderStatus::Finished, OrderStatus::Cancelled);

        let err = stage_move(&mut board, Some(finished), &mut command).unwrap_err();
        assert!(matches!(
            err,
            MoveError::Transition(TransitionError::NotAllowed {
                from: OrderStatus::Finished,
                to: OrderStatus::Cancelled,
            })
        ));
        assert!(!command.is_applied());
    }

    #[test]
    fn test_unknown_order_is_not_found() {
        let mut board = KanbanBoard::default();
        let mut command = MoveCard::new(OrderId::new(404), OrderStatus::Pending, OrderStatus::Preparing);
        let err = stage_move(&mut board, None, &mut command).unwrap_err();
        assert!(matches!(err, MoveError::Transition(TransitionError::NotFound(_))));
    }

    #[test]
    fn test_failed_precondition_undoes_the_move() {
        let mut board = KanbanBoard::from_cards([card(Fulfillment::Delivery, None)]);
        let before = board.clone();
        let mut command = MoveCard::new(OrderId::new(9), OrderStatus::Preparing, OrderStatus::OutForDelivery);

        let err = stage_move(&mut board, None, &mut command).unwrap_err();
        assert!(matches!(err, MoveError::CourierRequired));
        assert_eq!(board, before);
    }

    #[test]
    fn test_staged_move_returns_the_moved_card() {
        let mut board = KanbanBoard::from_cards([card(Fulfillment::Pickup, None)]);
        let mut command = MoveCard::new(OrderId::new(9), OrderStatus::Preparing, OrderStatus::Finished);

        let staged = stage_move(&mut board, None, &mut command).unwrap();
        assert_eq!(staged.status, OrderStatus::Finished);
        assert_eq!(board.column(OrderStatus::Finished).cards.len(), 1);
    }
}
