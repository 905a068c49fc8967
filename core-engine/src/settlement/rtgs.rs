//! RTGS settlement: routes a Q1 release decision into an immediate atomic
//! transfer, a partial transfer plus Q2 remainder, or a full Q2 enqueue; and
//! scans Q2 in FIFO order for entries that can now clear.
//!
//! Every settlement -- immediate or out of Q2 -- is a single atomic pairwise
//! transfer: `sender.balance -= delta; receiver.balance += delta` happen
//! together via [`SimulationState::with_two_agents_mut`], never separately.

use crate::models::event::Event;
use crate::models::state::SimulationState;
use crate::models::transaction::TransactionError;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SettlementError {
    #[error("unknown agent '{0}'")]
    UnknownAgent(String),
    #[error("unknown transaction '{0}'")]
    UnknownTransaction(String),
    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

/// What happened when a transaction was offered to RTGS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Fully settled at the time of release.
    SettledFull,
    /// Settled for part of the remaining amount; the rest sits in Q2.
    SettledPartial,
    /// Nothing settled; the whole remaining amount sits in Q2.
    Queued,
}

/// Compute the amount a sender can move toward `remaining` right now:
/// `min(remaining, max(0, balance + unsecured_cap))`.
fn deliverable(state: &SimulationState, sender_id: &str, remaining: i64) -> Result<i64, SettlementError> {
    let sender = state
        .get_agent(sender_id)
        .ok_or_else(|| SettlementError::UnknownAgent(sender_id.to_string()))?;
    Ok(remaining.min(sender.available_liquidity()))
}

/// Apply an atomic transfer of `delta` cents from `sender_id` to
/// `receiver_id`, settle `delta` cents against `tx_id`, and return whether
/// the transaction reached Settled.
fn apply_transfer(
    state: &mut SimulationState,
    tx_id: &str,
    sender_id: &str,
    receiver_id: &str,
    delta: i64,
    tick: usize,
) -> Result<bool, SettlementError> {
    state
        .with_two_agents_mut(sender_id, receiver_id, |sender, receiver| {
            sender.debit(delta);
            receiver.credit(delta);
        })
        .ok_or_else(|| SettlementError::UnknownAgent(sender_id.to_string()))?;

    let tx = state
        .get_transaction_mut(tx_id)
        .ok_or_else(|| SettlementError::UnknownTransaction(tx_id.to_string()))?;
    tx.settle(delta, tick)?;
    Ok(tx.is_fully_settled())
}

/// Release a freshly policy-approved transaction (§4.6 step 2). `tx_id` must
/// not already be queued in Q2.
pub fn release(state: &mut SimulationState, tx_id: &str, tick: usize) -> Result<ReleaseOutcome, SettlementError> {
    let (sender_id, receiver_id, remaining, divisible) = {
        let tx = state
            .get_transaction(tx_id)
            .ok_or_else(|| SettlementError::UnknownTransaction(tx_id.to_string()))?;
        (tx.sender_id.clone(), tx.receiver_id.clone(), tx.remaining_amount(), tx.divisible)
    };

    let delta = deliverable(state, &sender_id, remaining)?;

    if delta == remaining {
        apply_transfer(state, tx_id, &sender_id, &receiver_id, delta, tick)?;
        state.log_event(Event::RtgsImmediateSettlement {
            tick,
            tx_id: tx_id.to_string(),
            sender_id,
            receiver_id,
            amount: delta,
        });
        return Ok(ReleaseOutcome::SettledFull);
    }

    if delta > 0 && divisible {
        apply_transfer(state, tx_id, &sender_id, &receiver_id, delta, tick)?;
        state.log_event(Event::RtgsImmediateSettlement {
            tick,
            tx_id: tx_id.to_string(),
            sender_id: sender_id.clone(),
            receiver_id: receiver_id.clone(),
            amount: delta,
        });
        state.queue2_push(tx_id.to_string(), tick);
        if let Some(sender) = state.get_agent_mut(&sender_id) {
            sender.add_q2_ref(tx_id.to_string());
        }
        state.log_event(Event::QueuedRtgs {
            tick,
            tx_id: tx_id.to_string(),
            sender_id,
            receiver_id,
            amount: state.get_transaction(tx_id).unwrap().remaining_amount(),
        });
        return Ok(ReleaseOutcome::SettledPartial);
    }

    state.queue2_push(tx_id.to_string(), tick);
    if let Some(sender) = state.get_agent_mut(&sender_id) {
        sender.add_q2_ref(tx_id.to_string());
    }
    state.log_event(Event::QueuedRtgs { tick, tx_id: tx_id.to_string(), sender_id, receiver_id, amount: remaining });
    Ok(ReleaseOutcome::Queued)
}

/// Outcome of one Q2 FIFO scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueProcessingResult {
    pub settled_count: usize,
    pub settled_value: i64,
    pub remaining_queue_size: usize,
}

/// Scan Q2 in FIFO order, attempting RTGS settlement of each entry against
/// current balances (§4.6, "Queue-2 release"). Entries that still cannot
/// clear (or only clear partially on a divisible transaction) stay queued.
pub fn scan_queue2(state: &mut SimulationState, tick: usize) -> QueueProcessingResult {
    let tx_ids: Vec<String> = state.queue2_ids().to_vec();
    let mut result = QueueProcessingResult::default();

    for tx_id in tx_ids {
        let Some(tx) = state.get_transaction(&tx_id) else { continue };
        if tx.is_fully_settled() {
            let sender_id = tx.sender_id.clone();
            state.queue2_remove(&tx_id);
            if let Some(sender) = state.get_agent_mut(&sender_id) {
                sender.remove_q2_ref(&tx_id);
            }
            continue;
        }
        let (sender_id, receiver_id, remaining, divisible) =
            (tx.sender_id.clone(), tx.receiver_id.clone(), tx.remaining_amount(), tx.divisible);
        let Ok(delta) = deliverable(state, &sender_id, remaining) else { continue };
        if delta <= 0 {
            continue;
        }
        if delta < remaining && !divisible {
            continue;
        }

        let enqueued_at = state.queue2_enqueued_at(&tx_id).unwrap_or(tick);
        let queue_wait_ticks = tick.saturating_sub(enqueued_at);

        if apply_transfer(state, &tx_id, &sender_id, &receiver_id, delta, tick).unwrap_or(false) {
            state.queue2_remove(&tx_id);
            if let Some(sender) = state.get_agent_mut(&sender_id) {
                sender.remove_q2_ref(&tx_id);
            }
        }
        result.settled_count += 1;
        result.settled_value += delta;

        state.log_event(Event::Queue2LiquidityRelease {
            tick,
            tx_id: tx_id.clone(),
            sender_id: sender_id.clone(),
            receiver_id: receiver_id.clone(),
            amount: delta,
            queue_wait_ticks,
        });
        state.log_event(Event::Settlement {
            tick,
            tx_id,
            sender_id,
            receiver_id,
            amount: delta,
            release_reason: "queue2_liquidity_release".to_string(),
        });
    }

    result.remaining_queue_size = state.queue2_size();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Agent, SimulationState, Transaction};

    fn two_agents(balance_a: i64, cap_a: i64, balance_b: i64) -> SimulationState {
        SimulationState::new(vec![
            Agent::new("A".into(), balance_a, cap_a),
            Agent::new("B".into(), balance_b, 0),
        ])
    }

    #[test]
    fn release_settles_fully_when_liquidity_available() {
        let mut state = two_agents(1_000_000, 0, 1_000_000);
        let tx = Transaction::new("A".into(), "B".into(), 100_000, 0, 10);
        let tx_id = tx.id.clone();
        state.add_transaction(tx);

        let outcome = release(&mut state, &tx_id, 0).unwrap();
        assert_eq!(outcome, ReleaseOutcome::SettledFull);
        assert_eq!(state.get_agent("A").unwrap().balance(), 900_000);
        assert_eq!(state.get_agent("B").unwrap().balance(), 1_100_000);
        assert_eq!(state.queue2_size(), 0);
    }

    #[test]
    fn release_queues_indivisible_transaction_without_partial_settlement() {
        let mut state = two_agents(10_000, 0, 0);
        let tx = Transaction::new("A".into(), "B".into(), 50_000, 0, 10);
        let tx_id = tx.id.clone();
        state.add_transaction(tx);

        let outcome = release(&mut state, &tx_id, 0).unwrap();
        assert_eq!(outcome, ReleaseOutcome::Queued);
        assert_eq!(state.get_agent("A").unwrap().balance(), 10_000);
        assert_eq!(state.queue2_size(), 1);
    }

    #[test]
    fn release_settles_partial_for_divisible_transaction() {
        let mut state = two_agents(10_000, 0, 0);
        let mut tx = Transaction::new("A".into(), "B".into(), 50_000, 0, 10);
        tx.divisible = true;
        let tx_id = tx.id.clone();
        state.add_transaction(tx);

        let outcome = release(&mut state, &tx_id, 0).unwrap();
        assert_eq!(outcome, ReleaseOutcome::SettledPartial);
        assert_eq!(state.get_agent("A").unwrap().balance(), 0);
        assert_eq!(state.get_transaction(&tx_id).unwrap().remaining_amount(), 40_000);
        assert_eq!(state.queue2_size(), 1);
    }

    #[test]
    fn queue2_scan_releases_once_liquidity_appears() {
        let mut state = two_agents(0, 0, 0);
        let tx = Transaction::new("A".into(), "B".into(), 50_000, 0, 10);
        let tx_id = tx.id.clone();
        state.add_transaction(tx);
        release(&mut state, &tx_id, 0).unwrap();
        assert_eq!(state.queue2_size(), 1);

        state.get_agent_mut("A").unwrap().credit(50_000);
        let result = scan_queue2(&mut state, 3);
        assert_eq!(result.settled_count, 1);
        assert_eq!(result.remaining_queue_size, 0);
        assert!(state.get_transaction(&tx_id).unwrap().is_fully_settled());
    }
}
