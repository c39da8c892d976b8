//! Board moves as the back office performs them: optimistic apply, undo on
//! a failed write, and the order-level checks that run before the write.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use chrono::TimeDelta;

use pizzaria_admin::services::MoveError;
use pizzaria_admin::services::kanban::{check_preconditions, stage_move};
use pizzaria_core::kanban::{KanbanBoard, MoveCard, TransitionError};
use pizzaria_core::{Fulfillment, OrderId, OrderStatus};
use pizzaria_integration_tests::{card, evening};

fn board() -> KanbanBoard {
    let t = evening();
    KanbanBoard::from_cards([
        card(1, OrderStatus::Pending, t),
        card(2, OrderStatus::Pending, t + TimeDelta::minutes(2)),
        card(3, OrderStatus::Preparing, t + TimeDelta::minutes(4)),
        card(4, OrderStatus::Finished, t + TimeDelta::minutes(6)),
    ])
}

fn ids(board: &KanbanBoard, status: OrderStatus) -> Vec<i32> {
    board
        .column(status)
        .cards
        .iter()
        .map(|c| c.order_id.as_i32())
        .collect()
}

#[test]
fn test_failed_write_restores_board_exactly() {
    let mut board = board();
    let before = board.clone();

    let mut command = MoveCard::new(OrderId::new(1), OrderStatus::Pending, OrderStatus::Preparing);
    command.apply(&mut board).unwrap();
    assert_eq!(ids(&board, OrderStatus::Pending), vec![2]);
    assert_eq!(ids(&board, OrderStatus::Preparing), vec![3, 1]);
    assert_eq!(
        board.find(OrderId::new(1)).unwrap().status,
        OrderStatus::Preparing
    );

    command.undo(&mut board).unwrap();
    assert_eq!(board, before);
    assert!(!command.is_applied());
}

#[test]
fn test_a_walk_through_the_happy_path() {
    let mut board = board();
    for (from, to) in [
        (OrderStatus::Preparing, OrderStatus::OutForDelivery),
        (OrderStatus::OutForDelivery, OrderStatus::Finished),
    ] {
        MoveCard::new(OrderId::new(3), from, to)
            .apply(&mut board)
            .unwrap();
    }
    assert_eq!(ids(&board, OrderStatus::Finished), vec![4, 3]);
    assert_eq!(board.len(), 4);
}

#[test]
fn test_stale_column_is_rejected_and_board_untouched() {
    let mut board = board();
    let before = board.clone();

    let err = MoveCard::new(OrderId::new(3), OrderStatus::Pending, OrderStatus::Preparing)
        .apply(&mut board)
        .unwrap_err();
    assert!(matches!(
        err,
        TransitionError::StatusMismatch {
            actual: OrderStatus::Preparing,
            ..
        }
    ));
    assert_eq!(board, before);
}

#[test]
fn test_terminal_orders_do_not_move() {
    let mut board = board();
    for to in [OrderStatus::Pending, OrderStatus::Preparing, OrderStatus::Cancelled] {
        let err = MoveCard::new(OrderId::new(4), OrderStatus::Finished, to)
            .apply(&mut board)
            .unwrap_err();
        assert!(matches!(err, TransitionError::NotAllowed { .. }));
    }
}

#[test]
fn test_skipping_preparation_is_not_allowed() {
    let command = MoveCard::new(OrderId::new(1), OrderStatus::Pending, OrderStatus::Finished);
    assert!(command.validate().is_err());
}

#[test]
fn test_undo_without_apply_fails() {
    let mut board = board();
    let mut command = MoveCard::new(OrderId::new(1), OrderStatus::Pending, OrderStatus::Preparing);
    assert_eq!(command.undo(&mut board), Err(TransitionError::NotApplied));
}

#[test]
fn test_going_out_needs_a_delivery_order_with_courier() {
    let mut delivery = card(5, OrderStatus::Preparing, evening());
    assert!(matches!(
        check_preconditions(&delivery, OrderStatus::OutForDelivery),
        Err(MoveError::CourierRequired)
    ));

    delivery.courier_name = Some("Zé".to_string());
    assert!(check_preconditions(&delivery, OrderStatus::OutForDelivery).is_ok());

    let mut pickup = delivery.clone();
    pickup.fulfillment = Fulfillment::Pickup;
    assert!(matches!(
        check_preconditions(&pickup, OrderStatus::OutForDelivery),
        Err(MoveError::PickupNotDeliverable)
    ));
    assert!(check_preconditions(&pickup, OrderStatus::Finished).is_ok());
}

#[test]
fn test_old_finished_order_is_refused_by_the_transition_table() {
    // Board query only returns closed orders from the last hours.
    let mut board = board();
    let old = card(40, OrderStatus::Finished, evening() - TimeDelta::days(3));
    let before = board.clone();

    let mut command = MoveCard::new(OrderId::new(40), OrderStatus::Finished, OrderStatus::Cancelled);
    let err = stage_move(&mut board, Some(old), &mut command).unwrap_err();

    assert!(matches!(
        err,
        MoveError::Transition(TransitionError::NotAllowed { .. })
    ));
    assert_eq!(ids(&board, OrderStatus::Cancelled), Vec::<i32>::new());
    assert_eq!(board.len(), before.len() + 1);
}
