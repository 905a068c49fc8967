//! Integration tests for `Transaction`: settlement lifecycle, overdue
//! marking, and split validation exercised the way the orchestrator uses
//! them.

use simcash_core::Transaction;

#[test]
fn settle_transitions_through_partial_to_full() {
    let mut tx = Transaction::new("A".to_string(), "B".to_string(), 1_000, 0, 10);
    assert!(tx.is_pending());
    tx.settle(400, 1).unwrap();
    assert!(tx.is_pending());
    assert!(!tx.is_fully_settled());
    assert_eq!(tx.remaining_amount(), 600);

    tx.settle(600, 2).unwrap();
    assert!(tx.is_fully_settled());
    assert_eq!(tx.remaining_amount(), 0);
}

#[test]
fn settle_rejects_amount_exceeding_remaining() {
    let mut tx = Transaction::new("A".to_string(), "B".to_string(), 1_000, 0, 10);
    assert!(tx.settle(1_001, 1).is_err());
}

#[test]
fn mark_overdue_only_applies_while_pending() {
    let mut tx = Transaction::new("A".to_string(), "B".to_string(), 1_000, 0, 10);
    tx.mark_overdue();
    assert!(tx.is_past_deadline(11));
    tx.settle(1_000, 5).unwrap();
    tx.mark_overdue();
    assert!(tx.is_fully_settled());
}

#[test]
fn split_child_inherits_lineage_fields() {
    let mut tx = Transaction::with_priority("A".to_string(), "B".to_string(), 1_000, 0, 10, 7, true);
    let child = tx.split_child(400);
    assert_eq!(child.parent_id.as_deref(), Some(tx.id.as_str()));
    assert_eq!(child.sender_id, "A");
    assert_eq!(child.receiver_id, "B");
    assert_eq!(child.priority, 7);
    assert_eq!(child.deadline_tick, 10);
    tx.settle(1_000, 3).unwrap();
    assert!(tx.is_fully_settled());
}

#[test]
fn validate_split_requires_divisible_and_exact_sum() {
    let indivisible = Transaction::new("A".to_string(), "B".to_string(), 1_000, 0, 10);
    assert!(indivisible.validate_split(&[500, 500]).is_err());

    let divisible = Transaction::with_priority("A".to_string(), "B".to_string(), 1_000, 0, 10, 5, true);
    assert!(divisible.validate_split(&[500, 500]).is_ok());
    assert!(divisible.validate_split(&[500, 400]).is_err());
    assert!(divisible.validate_split(&[1_000]).is_err());
}
