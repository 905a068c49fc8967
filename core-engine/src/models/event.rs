//! The event log: an append-only, typed audit trail. Every observable
//! state change the engine makes is recorded here, in the same order the
//! tick-phase loop produces it. The log is the canonical source of truth
//! for any statistic a consumer wants to reconstruct after the fact.

use crate::costs::CostKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum Event {
    Arrival {
        tick: usize,
        tx_id: String,
        sender_id: String,
        receiver_id: String,
        amount: i64,
        deadline_tick: usize,
        priority: u8,
    },
    PolicyRelease {
        tick: usize,
        tx_id: String,
        agent_id: String,
    },
    PolicyHold {
        tick: usize,
        tx_id: String,
        agent_id: String,
    },
    PolicySplit {
        tick: usize,
        parent_id: String,
        child_ids: Vec<String>,
        agent_id: String,
    },
    CollateralPosted {
        tick: usize,
        agent_id: String,
        amount: i64,
        reason: String,
    },
    CollateralReleased {
        tick: usize,
        agent_id: String,
        amount: i64,
        reason: String,
    },
    StateRegisterSet {
        tick: usize,
        agent_id: String,
        register_key: String,
        old_value: Option<f64>,
        new_value: f64,
        reason: String,
    },
    RtgsImmediateSettlement {
        tick: usize,
        tx_id: String,
        sender_id: String,
        receiver_id: String,
        amount: i64,
    },
    QueuedRtgs {
        tick: usize,
        tx_id: String,
        sender_id: String,
        receiver_id: String,
        amount: i64,
    },
    Queue2LiquidityRelease {
        tick: usize,
        tx_id: String,
        sender_id: String,
        receiver_id: String,
        amount: i64,
        queue_wait_ticks: usize,
    },
    /// Generic companion emitted alongside every non-RTGS-immediate
    /// settlement (Q2 release, LSM offset, LSM cycle) so code that only
    /// cares "did money move" doesn't need to special-case the mechanism.
    Settlement {
        tick: usize,
        tx_id: String,
        sender_id: String,
        receiver_id: String,
        amount: i64,
        release_reason: String,
    },
    LsmBilateralOffset {
        tick: usize,
        agent_a: String,
        agent_b: String,
        tx_ids: Vec<String>,
        net_amount: i64,
        net_payer: Option<String>,
    },
    LsmCycleSettlement {
        tick: usize,
        agents: Vec<String>,
        net_positions: Vec<(String, i64)>,
        tx_ids: Vec<String>,
    },
    CostAccrual {
        tick: usize,
        agent_id: String,
        cost_type: CostKind,
        amount: i64,
    },
    TransactionWentOverdue {
        tick: usize,
        tx_id: String,
        agent_id: String,
    },
    EndOfDay {
        tick: usize,
        day: usize,
    },
    ScenarioEventExecuted {
        tick: usize,
        description: String,
    },
    SimulationStart {
        tick: usize,
        seed: u64,
        num_agents: usize,
    },
    SimulationEnd {
        tick: usize,
    },
}

impl Event {
    pub fn tick(&self) -> usize {
        match self {
            Event::Arrival { tick, .. }
            | Event::PolicyRelease { tick, .. }
            | Event::PolicyHold { tick, .. }
            | Event::PolicySplit { tick, .. }
            | Event::CollateralPosted { tick, .. }
            | Event::CollateralReleased { tick, .. }
            | Event::StateRegisterSet { tick, .. }
            | Event::RtgsImmediateSettlement { tick, .. }
            | Event::QueuedRtgs { tick, .. }
            | Event::Queue2LiquidityRelease { tick, .. }
            | Event::Settlement { tick, .. }
            | Event::LsmBilateralOffset { tick, .. }
            | Event::LsmCycleSettlement { tick, .. }
            | Event::CostAccrual { tick, .. }
            | Event::TransactionWentOverdue { tick, .. }
            | Event::EndOfDay { tick, .. }
            | Event::ScenarioEventExecuted { tick, .. }
            | Event::SimulationStart { tick, .. }
            | Event::SimulationEnd { tick, .. } => *tick,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Event::Arrival { .. } => "Arrival",
            Event::PolicyRelease { .. } => "PolicyRelease",
            Event::PolicyHold { .. } => "PolicyHold",
            Event::PolicySplit { .. } => "PolicySplit",
            Event::CollateralPosted { .. } => "CollateralPosted",
            Event::CollateralReleased { .. } => "CollateralReleased",
            Event::StateRegisterSet { .. } => "StateRegisterSet",
            Event::RtgsImmediateSettlement { .. } => "RtgsImmediateSettlement",
            Event::QueuedRtgs { .. } => "QueuedRtgs",
            Event::Queue2LiquidityRelease { .. } => "Queue2LiquidityRelease",
            Event::Settlement { .. } => "Settlement",
            Event::LsmBilateralOffset { .. } => "LsmBilateralOffset",
            Event::LsmCycleSettlement { .. } => "LsmCycleSettlement",
            Event::CostAccrual { .. } => "CostAccrual",
            Event::TransactionWentOverdue { .. } => "TransactionWentOverdue",
            Event::EndOfDay { .. } => "EndOfDay",
            Event::ScenarioEventExecuted { .. } => "ScenarioEventExecuted",
            Event::SimulationStart { .. } => "SimulationStart",
            Event::SimulationEnd { .. } => "SimulationEnd",
        }
    }

    /// Transaction ID this event concerns, if any.
    pub fn tx_id(&self) -> Option<&str> {
        match self {
            Event::Arrival { tx_id, .. }
            | Event::PolicyRelease { tx_id, .. }
            | Event::PolicyHold { tx_id, .. }
            | Event::RtgsImmediateSettlement { tx_id, .. }
            | Event::QueuedRtgs { tx_id, .. }
            | Event::Queue2LiquidityRelease { tx_id, .. }
            | Event::Settlement { tx_id, .. }
            | Event::TransactionWentOverdue { tx_id, .. } => Some(tx_id),
            Event::PolicySplit { parent_id, .. } => Some(parent_id),
            _ => None,
        }
    }

    /// Agent ID most directly associated with this event, if any.
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            Event::Arrival { sender_id, .. } => Some(sender_id),
            Event::PolicyRelease { agent_id, .. }
            | Event::PolicyHold { agent_id, .. }
            | Event::PolicySplit { agent_id, .. }
            | Event::CollateralPosted { agent_id, .. }
            | Event::CollateralReleased { agent_id, .. }
            | Event::StateRegisterSet { agent_id, .. }
            | Event::CostAccrual { agent_id, .. }
            | Event::TransactionWentOverdue { agent_id, .. } => Some(agent_id),
            Event::RtgsImmediateSettlement { sender_id, .. }
            | Event::QueuedRtgs { sender_id, .. }
            | Event::Queue2LiquidityRelease { sender_id, .. }
            | Event::Settlement { sender_id, .. } => Some(sender_id),
            _ => None,
        }
    }
}

/// Append-only event stream. The default sink is this in-memory vector;
/// §9's "event sink" interface for streaming to external storage is the
/// external collaborator's concern, not the engine's — the engine only
/// needs something it can push onto and iterate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn events_at_tick(&self, tick: usize) -> Vec<&Event> {
        self.events.iter().filter(|e| e.tick() == tick).collect()
    }

    pub fn events_of_type(&self, event_type: &str) -> Vec<&Event> {
        self.events.iter().filter(|e| e.event_type() == event_type).collect()
    }

    pub fn events_for_tx(&self, tx_id: &str) -> Vec<&Event> {
        self.events.iter().filter(|e| e.tx_id() == Some(tx_id)).collect()
    }

    pub fn events_for_agent(&self, agent_id: &str) -> Vec<&Event> {
        self.events.iter().filter(|e| e.agent_id() == Some(agent_id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_and_event_type_accessors() {
        let e = Event::Arrival {
            tick: 3,
            tx_id: "t1".into(),
            sender_id: "A".into(),
            receiver_id: "B".into(),
            amount: 100,
            deadline_tick: 10,
            priority: 5,
        };
        assert_eq!(e.tick(), 3);
        assert_eq!(e.event_type(), "Arrival");
        assert_eq!(e.tx_id(), Some("t1"));
        assert_eq!(e.agent_id(), Some("A"));
    }

    #[test]
    fn event_log_filters() {
        let mut log = EventLog::new();
        log.log(Event::Arrival {
            tick: 0,
            tx_id: "t1".into(),
            sender_id: "A".into(),
            receiver_id: "B".into(),
            amount: 10,
            deadline_tick: 5,
            priority: 5,
        });
        log.log(Event::EndOfDay { tick: 0, day: 0 });
        assert_eq!(log.len(), 2);
        assert_eq!(log.events_at_tick(0).len(), 2);
        assert_eq!(log.events_of_type("Arrival").len(), 1);
        assert_eq!(log.events_for_tx("t1").len(), 1);
        assert_eq!(log.events_for_agent("A").len(), 1);
    }
}
