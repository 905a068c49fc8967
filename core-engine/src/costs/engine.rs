//! Cost application: every cost, whether a per-tick accrual or a one-time
//! penalty, flows through [`accrue`] so the agent's accumulator and the
//! event log never drift apart.

use crate::costs::CostKind;
use crate::models::{Agent, Event, EventLog};

/// Charge `agent` `amount` cents of `kind` cost at `tick`, updating its
/// accumulator and logging a matching `CostAccrual` event. A zero-amount
/// charge is a no-op that still skips the event (nothing observable
/// happened).
pub fn accrue(agent: &mut Agent, kind: CostKind, amount: i64, tick: usize, log: &mut EventLog) {
    if amount <= 0 {
        return;
    }
    agent.accrue_cost(kind, amount);
    log.log(Event::CostAccrual {
        tick,
        agent_id: agent.id().to_string(),
        cost_type: kind,
        amount,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accrue_updates_agent_and_logs_event() {
        let mut agent = Agent::new("A".into(), 0, 0);
        let mut log = EventLog::new();
        accrue(&mut agent, CostKind::Overdraft, 42, 7, &mut log);
        assert_eq!(agent.accumulated_cost(CostKind::Overdraft), 42);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn zero_amount_is_a_silent_no_op() {
        let mut agent = Agent::new("A".into(), 0, 0);
        let mut log = EventLog::new();
        accrue(&mut agent, CostKind::Overdraft, 0, 7, &mut log);
        assert_eq!(agent.accumulated_cost(CostKind::Overdraft), 0);
        assert!(log.is_empty());
    }
}
