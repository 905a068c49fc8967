//! Agent (bank) model: ledger, queues, and policy-visible state registers.

use crate::costs::CostKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AgentError {
    #[error("insufficient liquidity: need {required}, have {available}")]
    InsufficientLiquidity { required: i64, available: i64 },
    #[error("collateral withdrawal of {amount} exceeds posted collateral {posted}")]
    InsufficientCollateral { amount: i64, posted: i64 },
    #[error("posting {amount} would exceed max collateral capacity {capacity}")]
    ExceedsCollateralCapacity { amount: i64, capacity: i64 },
    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(i64),
}

/// An insertion-ordered string→f64 map used for policy-visible state
/// registers. Small (a handful of entries per agent), so a linear scan
/// is simpler and just as fast as a hash map here, and iteration order
/// stays stable for diagnostics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterStore {
    entries: Vec<(String, f64)>,
    persistent: Vec<String>,
}

impl RegisterStore {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| *v)
    }

    pub fn set(&mut self, name: &str, value: f64) {
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| k == name) {
            entry.1 = value;
        } else {
            self.entries.push((name.to_string(), value));
        }
    }

    /// Mark `name` as surviving the end-of-day reset (default: reset daily).
    pub fn mark_persistent(&mut self, name: &str) {
        if !self.persistent.iter().any(|k| k == name) {
            self.persistent.push(name.to_string());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Clear every register not marked persistent. Called by the scheduler
    /// at each end-of-day boundary.
    pub fn reset_daily(&mut self) {
        self.entries.retain(|(k, _)| self.persistent.iter().any(|p| p == k));
    }
}

/// A bank participating in the payment system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    id: String,
    balance: i64,
    unsecured_cap: i64,
    posted_collateral: i64,
    max_collateral_capacity: Option<i64>,
    /// Own queue of submitted-but-not-yet-routed transaction IDs, insertion order.
    q1: Vec<String>,
    /// Transaction IDs this agent currently has sitting in the central queue.
    q2_refs: Vec<String>,
    cost_accumulators: HashMap<CostKind, i64>,
    registers: RegisterStore,
}

impl Agent {
    pub fn new(id: String, balance: i64, unsecured_cap: i64) -> Self {
        assert!(unsecured_cap >= 0, "unsecured_cap must be non-negative");
        Self {
            id,
            balance,
            unsecured_cap,
            posted_collateral: 0,
            max_collateral_capacity: None,
            q1: Vec::new(),
            q2_refs: Vec::new(),
            cost_accumulators: HashMap::new(),
            registers: RegisterStore::default(),
        }
    }

    pub fn with_max_collateral_capacity(mut self, capacity: i64) -> Self {
        self.max_collateral_capacity = Some(capacity);
        self
    }

    /// Set the agent's opening `posted_collateral` directly, bypassing the
    /// balance debit `post_collateral` performs — this is initial state at
    /// construction, not a ledger movement.
    pub fn with_posted_collateral(mut self, amount: i64) -> Self {
        self.posted_collateral = amount;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn balance(&self) -> i64 {
        self.balance
    }

    pub fn unsecured_cap(&self) -> i64 {
        self.unsecured_cap
    }

    pub fn set_unsecured_cap(&mut self, cap: i64) {
        self.unsecured_cap = cap;
    }

    pub fn posted_collateral(&self) -> i64 {
        self.posted_collateral
    }

    pub fn max_collateral_capacity(&self) -> Option<i64> {
        self.max_collateral_capacity
    }

    /// `balance + unsecured_cap`, floored at 0: the most this agent can pay
    /// out right now without going past its unsecured cap.
    pub fn available_liquidity(&self) -> i64 {
        (self.balance + self.unsecured_cap).max(0)
    }

    pub fn can_pay(&self, amount: i64) -> bool {
        amount <= self.available_liquidity()
    }

    pub fn is_using_credit(&self) -> bool {
        self.balance < 0
    }

    pub fn credit_used(&self) -> i64 {
        (-self.balance).max(0)
    }

    pub fn debit(&mut self, amount: i64) {
        self.balance -= amount;
    }

    pub fn credit(&mut self, amount: i64) {
        self.balance += amount;
    }

    pub fn post_collateral(&mut self, amount: i64) -> Result<(), AgentError> {
        if amount <= 0 {
            return Err(AgentError::NonPositiveAmount(amount));
        }
        if let Some(capacity) = self.max_collateral_capacity {
            if self.posted_collateral + amount > capacity {
                return Err(AgentError::ExceedsCollateralCapacity { amount, capacity });
            }
        }
        self.posted_collateral += amount;
        self.balance -= amount;
        Ok(())
    }

    pub fn release_collateral(&mut self, amount: i64) -> Result<(), AgentError> {
        if amount <= 0 {
            return Err(AgentError::NonPositiveAmount(amount));
        }
        if amount > self.posted_collateral {
            return Err(AgentError::InsufficientCollateral { amount, posted: self.posted_collateral });
        }
        self.posted_collateral -= amount;
        self.balance += amount;
        Ok(())
    }

    // -- Q1 ----------------------------------------------------------------

    pub fn q1(&self) -> &[String] {
        &self.q1
    }

    pub fn push_q1(&mut self, tx_id: String) {
        self.q1.push(tx_id);
    }

    pub fn remove_from_q1(&mut self, tx_id: &str) {
        self.q1.retain(|id| id != tx_id);
    }

    pub fn q1_size(&self) -> usize {
        self.q1.len()
    }

    // -- Q2 references -------------------------------------------------------

    pub fn q2_refs(&self) -> &[String] {
        &self.q2_refs
    }

    pub fn add_q2_ref(&mut self, tx_id: String) {
        self.q2_refs.push(tx_id);
    }

    pub fn remove_q2_ref(&mut self, tx_id: &str) {
        self.q2_refs.retain(|id| id != tx_id);
    }

    // -- Costs ---------------------------------------------------------------

    pub fn accrue_cost(&mut self, kind: CostKind, amount: i64) {
        debug_assert!(amount >= 0, "cost accumulators are strictly monotonic");
        *self.cost_accumulators.entry(kind).or_insert(0) += amount;
    }

    pub fn accumulated_cost(&self, kind: CostKind) -> i64 {
        *self.cost_accumulators.get(&kind).unwrap_or(&0)
    }

    pub fn accumulated_costs(&self) -> &HashMap<CostKind, i64> {
        &self.cost_accumulators
    }

    // -- State registers -------------------------------------------------------

    pub fn registers(&self) -> &RegisterStore {
        &self.registers
    }

    pub fn set_register(&mut self, name: &str, value: f64) {
        self.registers.set(name, value);
    }

    pub fn get_register(&self, name: &str) -> Option<f64> {
        self.registers.get(name)
    }

    pub fn mark_register_persistent(&mut self, name: &str) {
        self.registers.mark_persistent(name);
    }

    pub fn reset_daily_registers(&mut self) {
        self.registers.reset_daily();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn available_liquidity_combines_balance_and_cap() {
        let a = Agent::new("A".into(), 100, 50);
        assert_eq!(a.available_liquidity(), 150);
    }

    #[test]
    fn available_liquidity_floors_at_zero() {
        let a = Agent::new("A".into(), -200, 50);
        assert_eq!(a.available_liquidity(), 0);
    }

    #[test]
    fn debit_and_credit_move_balance() {
        let mut a = Agent::new("A".into(), 100, 0);
        a.debit(40);
        assert_eq!(a.balance(), 60);
        a.credit(10);
        assert_eq!(a.balance(), 70);
    }

    #[test]
    fn debit_into_unsecured_cap_is_using_credit() {
        let mut a = Agent::new("A".into(), 100, 500);
        a.debit(300);
        assert_eq!(a.balance(), -200);
        assert!(a.is_using_credit());
        assert_eq!(a.credit_used(), 200);
    }

    #[test]
    fn post_collateral_moves_cash_into_collateral() {
        let mut a = Agent::new("A".into(), 1_000, 0);
        a.post_collateral(300).unwrap();
        assert_eq!(a.balance(), 700);
        assert_eq!(a.posted_collateral(), 300);
    }

    #[test]
    fn post_collateral_respects_capacity() {
        let mut a = Agent::new("A".into(), 1_000, 0).with_max_collateral_capacity(200);
        let err = a.post_collateral(300).unwrap_err();
        assert_eq!(err, AgentError::ExceedsCollateralCapacity { amount: 300, capacity: 200 });
    }

    #[test]
    fn release_collateral_cannot_exceed_posted() {
        let mut a = Agent::new("A".into(), 1_000, 0);
        a.post_collateral(100).unwrap();
        let err = a.release_collateral(200).unwrap_err();
        assert_eq!(err, AgentError::InsufficientCollateral { amount: 200, posted: 100 });
    }

    #[test]
    fn cost_accumulators_are_monotonic_and_per_kind() {
        let mut a = Agent::new("A".into(), 0, 0);
        a.accrue_cost(CostKind::Overdraft, 5);
        a.accrue_cost(CostKind::Overdraft, 3);
        a.accrue_cost(CostKind::Delay, 1);
        assert_eq!(a.accumulated_cost(CostKind::Overdraft), 8);
        assert_eq!(a.accumulated_cost(CostKind::Delay), 1);
        assert_eq!(a.accumulated_cost(CostKind::Collateral), 0);
    }

    #[test]
    fn registers_reset_daily_unless_persistent() {
        let mut a = Agent::new("A".into(), 0, 0);
        a.set_register("cooldown", 3.0);
        a.set_register("lifetime_counter", 10.0);
        a.mark_register_persistent("lifetime_counter");
        a.reset_daily_registers();
        assert_eq!(a.get_register("cooldown"), None);
        assert_eq!(a.get_register("lifetime_counter"), Some(10.0));
    }
}
