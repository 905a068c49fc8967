//! Evaluation context: the closed set of fields a tree's `{field: name}`
//! operand may reference, built fresh for each transaction evaluated.

use crate::models::{Agent, SimulationState, Transaction};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("unknown context field '{0}'")]
    UnknownField(String),
}

/// The full closed set of field names `{field: "..."}` may reference.
/// Keep this list and [`EvalContext::build`] in lockstep — this is the
/// vocabulary validation checks policies against before they ever run.
pub const FIELD_NAMES: &[&str] = &[
    "balance",
    "unsecured_cap",
    "unsecured_cap_remaining",
    "available_liquidity",
    "posted_collateral",
    "max_collateral_capacity",
    "remaining_collateral_capacity",
    "q1_size",
    "q2_size",
    "amount",
    "remaining_amount",
    "priority",
    "arrival_tick",
    "deadline_tick",
    "ticks_to_deadline",
    "is_past_deadline",
    "is_divisible",
    "incoming_liquidity_estimate",
    "current_tick",
    "tick_of_day",
    "ticks_per_day",
];

/// Field values for one (transaction, agent, tick) evaluation. Built once
/// per transaction per tick and handed to the interpreter; never mutated
/// mid-evaluation.
#[derive(Debug, Clone)]
pub struct EvalContext {
    fields: HashMap<String, f64>,
}

impl EvalContext {
    /// Build the context for a payment-tree evaluation of `tx`, owned by
    /// `agent`. `incoming_liquidity_estimate` is the sum of amounts
    /// expected to arrive at `agent` via its own Q2 references this tick —
    /// a rough forward-looking signal, not a guarantee.
    pub fn for_transaction(
        tx: &Transaction,
        agent: &Agent,
        state: &SimulationState,
        tick: usize,
        ticks_per_day: usize,
    ) -> Self {
        let mut fields = Self::agent_fields(agent, state, tick, ticks_per_day);
        fields.insert("amount".into(), tx.amount as f64);
        fields.insert("remaining_amount".into(), tx.remaining_amount() as f64);
        fields.insert("priority".into(), tx.priority as f64);
        fields.insert("arrival_tick".into(), tx.arrival_tick as f64);
        fields.insert("deadline_tick".into(), tx.deadline_tick as f64);
        fields.insert(
            "ticks_to_deadline".into(),
            tx.deadline_tick as f64 - tick as f64,
        );
        fields.insert("is_past_deadline".into(), bool_f64(tx.is_past_deadline(tick)));
        fields.insert("is_divisible".into(), bool_f64(tx.divisible));
        Self { fields }
    }

    /// Build the context for a collateral- or bank-tree evaluation, which
    /// has no single transaction in view.
    pub fn for_agent(agent: &Agent, state: &SimulationState, tick: usize, ticks_per_day: usize) -> Self {
        Self { fields: Self::agent_fields(agent, state, tick, ticks_per_day) }
    }

    fn agent_fields(
        agent: &Agent,
        state: &SimulationState,
        tick: usize,
        ticks_per_day: usize,
    ) -> HashMap<String, f64> {
        let remaining_capacity = agent
            .max_collateral_capacity()
            .map(|cap| (cap - agent.posted_collateral()).max(0))
            .unwrap_or(i64::MAX);
        let incoming: i64 = agent
            .q2_refs()
            .iter()
            .filter_map(|id| state.get_transaction(id))
            .filter(|tx| tx.receiver_id == agent.id())
            .map(|tx| tx.remaining_amount())
            .sum();

        let mut fields = HashMap::new();
        fields.insert("balance".into(), agent.balance() as f64);
        fields.insert("unsecured_cap".into(), agent.unsecured_cap() as f64);
        fields.insert(
            "unsecured_cap_remaining".into(),
            (agent.unsecured_cap() + agent.balance()).max(0) as f64,
        );
        fields.insert("available_liquidity".into(), agent.available_liquidity() as f64);
        fields.insert("posted_collateral".into(), agent.posted_collateral() as f64);
        fields.insert(
            "max_collateral_capacity".into(),
            agent.max_collateral_capacity().unwrap_or(i64::MAX) as f64,
        );
        fields.insert("remaining_collateral_capacity".into(), remaining_capacity as f64);
        fields.insert("q1_size".into(), agent.q1_size() as f64);
        fields.insert("q2_size".into(), agent.q2_refs().len() as f64);
        fields.insert("incoming_liquidity_estimate".into(), incoming as f64);
        fields.insert("current_tick".into(), tick as f64);
        fields.insert("tick_of_day".into(), (tick % ticks_per_day) as f64);
        fields.insert("ticks_per_day".into(), ticks_per_day as f64);
        fields
    }

    pub fn get_field(&self, name: &str) -> Result<f64, ContextError> {
        self.fields.get(name).copied().ok_or_else(|| ContextError::UnknownField(name.to_string()))
    }
}

fn bool_f64(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SimulationState;

    #[test]
    fn transaction_fields_are_populated() {
        let agent = Agent::new("A".into(), 1_000, 200).with_max_collateral_capacity(5_000);
        let state = SimulationState::new(vec![agent.clone()]);
        let tx = Transaction::new("A".into(), "B".into(), 300, 2, 12);
        let ctx = EvalContext::for_transaction(&tx, &agent, &state, 5, 10);
        assert_eq!(ctx.get_field("balance").unwrap(), 1_000.0);
        assert_eq!(ctx.get_field("amount").unwrap(), 300.0);
        assert_eq!(ctx.get_field("ticks_to_deadline").unwrap(), 7.0);
        assert_eq!(ctx.get_field("remaining_collateral_capacity").unwrap(), 5_000.0);
    }

    #[test]
    fn unknown_field_is_an_error() {
        let agent = Agent::new("A".into(), 0, 0);
        let state = SimulationState::new(vec![agent.clone()]);
        let ctx = EvalContext::for_agent(&agent, &state, 0, 10);
        assert_eq!(ctx.get_field("nonexistent"), Err(ContextError::UnknownField("nonexistent".into())));
    }
}
