//! Simulation state: the single owner of agents, transactions, the
//! central queue, and the event log for one engine instance.

use crate::models::{Agent, Event, EventLog, Transaction};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct SimulationState {
    agents: HashMap<String, Agent>,
    /// Lexicographically sorted once at construction: the stable iteration
    /// order every order-sensitive phase of the tick loop uses.
    agent_ids: Vec<String>,
    transactions: HashMap<String, Transaction>,
    /// Central Q2, FIFO insertion order.
    queue2: Vec<String>,
    queue2_enqueued_at: HashMap<String, usize>,
    event_log: EventLog,
}

impl SimulationState {
    pub fn new(agents: Vec<Agent>) -> Self {
        let mut agent_ids: Vec<String> = agents.iter().map(|a| a.id().to_string()).collect();
        agent_ids.sort();
        let agents = agents.into_iter().map(|a| (a.id().to_string(), a)).collect();
        Self {
            agents,
            agent_ids,
            transactions: HashMap::new(),
            queue2: Vec::new(),
            queue2_enqueued_at: HashMap::new(),
            event_log: EventLog::new(),
        }
    }

    // -- Agents ----------------------------------------------------------------

    pub fn get_agent(&self, id: &str) -> Option<&Agent> {
        self.agents.get(id)
    }

    pub fn get_agent_mut(&mut self, id: &str) -> Option<&mut Agent> {
        self.agents.get_mut(id)
    }

    /// Borrow one agent and the event log simultaneously — the cost engine
    /// needs both at once to accrue and log in the same call. Safe because
    /// `agents` and `event_log` are disjoint fields.
    pub fn agent_and_log_mut(&mut self, id: &str) -> Option<(&mut Agent, &mut EventLog)> {
        let agent = self.agents.get_mut(id)?;
        Some((agent, &mut self.event_log))
    }

    /// Run `f` with mutable access to both `a` and `b` at once. Temporarily
    /// removes both from the map (and reinserts them afterward) since a
    /// `HashMap` cannot hand out two live mutable references otherwise.
    /// Returns `None` without calling `f` if either ID is missing or
    /// they're equal (a transaction's sender and receiver are never the
    /// same agent).
    pub fn with_two_agents_mut<F>(&mut self, a: &str, b: &str, f: F) -> Option<()>
    where
        F: FnOnce(&mut Agent, &mut Agent),
    {
        if a == b {
            return None;
        }
        let mut agent_a = self.agents.remove(a)?;
        let mut agent_b = match self.agents.remove(b) {
            Some(agent_b) => agent_b,
            None => {
                self.agents.insert(a.to_string(), agent_a);
                return None;
            }
        };
        f(&mut agent_a, &mut agent_b);
        self.agents.insert(a.to_string(), agent_a);
        self.agents.insert(b.to_string(), agent_b);
        Some(())
    }

    pub fn get_all_agent_ids(&self) -> &[String] {
        &self.agent_ids
    }

    pub fn num_agents(&self) -> usize {
        self.agent_ids.len()
    }

    pub fn total_balance(&self) -> i64 {
        self.agents.values().map(|a| a.balance()).sum()
    }

    pub fn total_posted_collateral(&self) -> i64 {
        self.agents.values().map(|a| a.posted_collateral()).sum()
    }

    // -- Transactions --------------------------------------------------------

    pub fn get_transaction(&self, id: &str) -> Option<&Transaction> {
        self.transactions.get(id)
    }

    pub fn get_transaction_mut(&mut self, id: &str) -> Option<&mut Transaction> {
        self.transactions.get_mut(id)
    }

    pub fn add_transaction(&mut self, tx: Transaction) {
        self.transactions.insert(tx.id.clone(), tx);
    }

    pub fn num_transactions(&self) -> usize {
        self.transactions.len()
    }

    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.values()
    }

    pub fn transactions_for_day(&self, day: usize, ticks_per_day: usize) -> Vec<&Transaction> {
        let start = day * ticks_per_day;
        let end = start + ticks_per_day;
        self.transactions
            .values()
            .filter(|t| t.arrival_tick >= start && t.arrival_tick < end)
            .collect()
    }

    pub fn transactions_near_deadline(&self, current_tick: usize, within_ticks: usize) -> Vec<&Transaction> {
        self.transactions
            .values()
            .filter(|t| t.is_pending() && t.deadline_tick.saturating_sub(current_tick) <= within_ticks)
            .collect()
    }

    // -- Queue 2 (central) -----------------------------------------------------

    pub fn queue2_ids(&self) -> &[String] {
        &self.queue2
    }

    pub fn queue2_size(&self) -> usize {
        self.queue2.len()
    }

    pub fn queue2_push(&mut self, tx_id: String, tick: usize) {
        self.queue2_enqueued_at.insert(tx_id.clone(), tick);
        self.queue2.push(tx_id);
    }

    pub fn queue2_remove(&mut self, tx_id: &str) {
        self.queue2.retain(|id| id != tx_id);
        self.queue2_enqueued_at.remove(tx_id);
    }

    pub fn queue2_enqueued_at(&self, tx_id: &str) -> Option<usize> {
        self.queue2_enqueued_at.get(tx_id).copied()
    }

    // -- Event log ---------------------------------------------------------------

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    pub fn event_log_mut(&mut self) -> &mut EventLog {
        &mut self.event_log
    }

    pub fn log_event(&mut self, event: Event) {
        self.event_log.log(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SimulationState {
        SimulationState::new(vec![
            Agent::new("B".into(), 100, 0),
            Agent::new("A".into(), 200, 0),
        ])
    }

    #[test]
    fn agent_ids_are_sorted_for_stable_iteration() {
        let s = state();
        assert_eq!(s.get_all_agent_ids(), &["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn two_agents_mut_rejects_same_id() {
        let mut s = state();
        assert!(s.with_two_agents_mut("A", "A", |_, _| {}).is_none());
    }

    #[test]
    fn two_agents_mut_transfers_atomically() {
        let mut s = state();
        s.with_two_agents_mut("A", "B", |sender, receiver| {
            sender.debit(50);
            receiver.credit(50);
        });
        assert_eq!(s.get_agent("A").unwrap().balance(), 150);
        assert_eq!(s.get_agent("B").unwrap().balance(), 150);
    }

    #[test]
    fn queue2_tracks_enqueue_tick() {
        let mut s = state();
        s.queue2_push("t1".into(), 3);
        assert_eq!(s.queue2_size(), 1);
        assert_eq!(s.queue2_enqueued_at("t1"), Some(3));
        s.queue2_remove("t1");
        assert_eq!(s.queue2_size(), 0);
        assert_eq!(s.queue2_enqueued_at("t1"), None);
    }
}
