//! Transaction model: a single payment obligation between two agents.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Lifecycle status of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    Pending,
    PartiallySettled,
    Settled,
    Overdue,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransactionError {
    #[error("transaction already settled")]
    AlreadySettled,
    #[error("settle amount {amount} exceeds remaining {remaining}")]
    ExceedsRemaining { amount: i64, remaining: i64 },
    #[error("settle amount must be positive, got {0}")]
    NonPositiveAmount(i64),
    #[error("transaction is not divisible")]
    NotDivisible,
    #[error("split parts must sum to the remaining amount: parts sum to {actual}, remaining is {expected}")]
    SplitSumMismatch { expected: i64, actual: i64 },
    #[error("split requires at least 2 parts, got {0}")]
    SplitTooFewParts(usize),
    #[error("split part amounts must be positive, got {0}")]
    SplitNonPositivePart(i64),
}

/// A payment obligation from `sender_id` to `receiver_id`.
///
/// Money fields are integer cents. `amount_settled` only ever grows; the
/// transaction becomes immutable once it reaches the terminal `Settled`
/// status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub parent_id: Option<String>,
    pub sender_id: String,
    pub receiver_id: String,
    pub amount: i64,
    pub amount_settled: i64,
    pub priority: u8,
    pub divisible: bool,
    pub arrival_tick: usize,
    pub deadline_tick: usize,
    pub settlement_tick: Option<usize>,
    pub status: TransactionStatus,
}

impl Transaction {
    /// Create a fresh, pending transaction with a random ID.
    ///
    /// `sender_id` and `receiver_id` must differ; this is enforced by
    /// callers (the arrival generator never proposes self-payments).
    pub fn new(
        sender_id: String,
        receiver_id: String,
        amount: i64,
        arrival_tick: usize,
        deadline_tick: usize,
    ) -> Self {
        Self::with_priority(sender_id, receiver_id, amount, arrival_tick, deadline_tick, 5, false)
    }

    pub fn with_priority(
        sender_id: String,
        receiver_id: String,
        amount: i64,
        arrival_tick: usize,
        deadline_tick: usize,
        priority: u8,
        divisible: bool,
    ) -> Self {
        assert!(amount > 0, "transaction amount must be positive");
        assert!(deadline_tick >= arrival_tick, "deadline cannot precede arrival");
        Self {
            id: Uuid::new_v4().to_string(),
            parent_id: None,
            sender_id,
            receiver_id,
            amount,
            amount_settled: 0,
            priority,
            divisible,
            arrival_tick,
            deadline_tick,
            settlement_tick: None,
            status: TransactionStatus::Pending,
        }
    }

    /// Construct a split child inheriting sender/receiver/deadline/priority
    /// from `self`, carrying `self.id` as its `parent_id`.
    pub fn split_child(&self, amount: i64) -> Self {
        let mut child = Transaction::with_priority(
            self.sender_id.clone(),
            self.receiver_id.clone(),
            amount,
            self.arrival_tick,
            self.deadline_tick,
            self.priority,
            self.divisible,
        );
        child.parent_id = Some(self.id.clone());
        child
    }

    pub fn remaining_amount(&self) -> i64 {
        self.amount - self.amount_settled
    }

    pub fn is_pending(&self) -> bool {
        matches!(
            self.status,
            TransactionStatus::Pending | TransactionStatus::PartiallySettled | TransactionStatus::Overdue
        )
    }

    pub fn is_fully_settled(&self) -> bool {
        self.status == TransactionStatus::Settled
    }

    pub fn is_past_deadline(&self, current_tick: usize) -> bool {
        current_tick > self.deadline_tick
    }

    /// Apply a settlement of `amount` cents at `tick`. Transitions to
    /// `Settled` when the remaining amount reaches zero, else
    /// `PartiallySettled`.
    pub fn settle(&mut self, amount: i64, tick: usize) -> Result<(), TransactionError> {
        if self.status == TransactionStatus::Settled {
            return Err(TransactionError::AlreadySettled);
        }
        if amount <= 0 {
            return Err(TransactionError::NonPositiveAmount(amount));
        }
        let remaining = self.remaining_amount();
        if amount > remaining {
            return Err(TransactionError::ExceedsRemaining { amount, remaining });
        }
        self.amount_settled += amount;
        if self.amount_settled == self.amount {
            self.status = TransactionStatus::Settled;
            self.settlement_tick = Some(tick);
        } else {
            self.status = TransactionStatus::PartiallySettled;
        }
        Ok(())
    }

    pub fn mark_overdue(&mut self) {
        if self.is_pending() {
            self.status = TransactionStatus::Overdue;
        }
    }

    /// Validate and build the split children for `Split([a1..ak])`.
    ///
    /// Requires `divisible`, `k >= 2`, every part positive, and the parts
    /// summing exactly to the remaining unsettled amount.
    pub fn validate_split(&self, parts: &[i64]) -> Result<(), TransactionError> {
        if !self.divisible {
            return Err(TransactionError::NotDivisible);
        }
        if parts.len() < 2 {
            return Err(TransactionError::SplitTooFewParts(parts.len()));
        }
        for &p in parts {
            if p <= 0 {
                return Err(TransactionError::SplitNonPositivePart(p));
            }
        }
        let sum: i64 = parts.iter().sum();
        let remaining = self.remaining_amount();
        if sum != remaining {
            return Err(TransactionError::SplitSumMismatch {
                expected: remaining,
                actual: sum,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx() -> Transaction {
        Transaction::new("A".into(), "B".into(), 1_000, 0, 10)
    }

    #[test]
    fn new_transaction_is_pending() {
        let t = tx();
        assert_eq!(t.status, TransactionStatus::Pending);
        assert_eq!(t.remaining_amount(), 1_000);
        assert!(t.parent_id.is_none());
    }

    #[test]
    fn full_settlement_transitions_to_settled() {
        let mut t = tx();
        t.settle(1_000, 3).unwrap();
        assert_eq!(t.status, TransactionStatus::Settled);
        assert_eq!(t.settlement_tick, Some(3));
    }

    #[test]
    fn partial_settlement_transitions_to_partially_settled() {
        let mut t = tx();
        t.settle(400, 1).unwrap();
        assert_eq!(t.status, TransactionStatus::PartiallySettled);
        assert_eq!(t.remaining_amount(), 600);
        assert!(t.settlement_tick.is_none());
        t.settle(600, 2).unwrap();
        assert_eq!(t.status, TransactionStatus::Settled);
        assert_eq!(t.settlement_tick, Some(2));
    }

    #[test]
    fn settling_beyond_remaining_is_rejected() {
        let mut t = tx();
        let err = t.settle(1_001, 0).unwrap_err();
        assert_eq!(err, TransactionError::ExceedsRemaining { amount: 1_001, remaining: 1_000 });
    }

    #[test]
    fn split_requires_divisible() {
        let t = tx();
        assert_eq!(t.validate_split(&[500, 500]).unwrap_err(), TransactionError::NotDivisible);
    }

    #[test]
    fn split_requires_sum_match() {
        let mut t = tx();
        t.divisible = true;
        assert_eq!(
            t.validate_split(&[400, 500]).unwrap_err(),
            TransactionError::SplitSumMismatch { expected: 1_000, actual: 900 }
        );
    }

    #[test]
    fn split_child_inherits_sender_receiver_deadline_priority() {
        let mut t = tx();
        t.divisible = true;
        t.priority = 7;
        let child = t.split_child(300);
        assert_eq!(child.sender_id, t.sender_id);
        assert_eq!(child.receiver_id, t.receiver_id);
        assert_eq!(child.deadline_tick, t.deadline_tick);
        assert_eq!(child.priority, t.priority);
        assert_eq!(child.parent_id, Some(t.id.clone()));
        assert_eq!(child.amount, 300);
    }
}
