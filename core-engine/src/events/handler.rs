//! Applies scripted scenario events (§4.9 phase 1) against live state: the
//! engine asks for every event due at a tick, applies each in declaration
//! order, and logs one `ScenarioEventExecuted` per event.

use crate::arrivals::ArrivalGenerator;
use crate::events::types::{ScenarioEvent, ScheduledEvent};
use crate::models::state::SimulationState;
use crate::models::Event;

/// Handles scenario event scheduling and execution.
pub struct ScenarioEventHandler {
    events: Vec<ScheduledEvent>,
}

impl ScenarioEventHandler {
    pub fn new(events: Vec<ScheduledEvent>) -> Self {
        Self { events }
    }

    /// All events scheduled to fire at `tick`.
    pub fn get_events_for_tick(&self, tick: usize) -> Vec<&ScenarioEvent> {
        self.events.iter().filter(|scheduled| scheduled.schedule.should_execute(tick)).map(|s| &s.event).collect()
    }

    /// Apply every event due at `tick`, in declaration order. A malformed
    /// reference (unknown agent) is a fatal configuration error, not a skip.
    pub fn execute_tick_events(
        &self,
        state: &mut SimulationState,
        arrivals: &mut ArrivalGenerator,
        tick: usize,
    ) -> Result<usize, String> {
        let due: Vec<ScenarioEvent> = self.get_events_for_tick(tick).into_iter().cloned().collect();
        for event in &due {
            execute(event, state, arrivals, tick)?;
            state.log_event(Event::ScenarioEventExecuted { tick, description: describe(event) });
        }
        Ok(due.len())
    }
}

fn execute(
    event: &ScenarioEvent,
    state: &mut SimulationState,
    arrivals: &mut ArrivalGenerator,
    _tick: usize,
) -> Result<(), String> {
    match event {
        ScenarioEvent::DirectTransfer { from_agent, to_agent, amount } => {
            state
                .with_two_agents_mut(from_agent, to_agent, |sender, receiver| {
                    sender.debit(*amount);
                    receiver.credit(*amount);
                })
                .ok_or_else(|| format!("unknown agent in direct_transfer: {from_agent} or {to_agent}"))?;
        }

        ScenarioEvent::CollateralAdjustment { agent, delta } => {
            let a = state.get_agent_mut(agent).ok_or_else(|| format!("unknown agent: {agent}"))?;
            if *delta >= 0 {
                a.post_collateral(*delta).map_err(|e| e.to_string())?;
            } else {
                let withdraw = (-*delta).min(a.posted_collateral());
                a.release_collateral(withdraw).map_err(|e| e.to_string())?;
            }
        }

        ScenarioEvent::GlobalArrivalRateChange { multiplier } => {
            arrivals.multiply_all_rates(*multiplier);
        }

        ScenarioEvent::AgentArrivalRateChange { agent, multiplier } => {
            let base = arrivals.get_rate(agent).ok_or_else(|| format!("unknown agent: {agent}"))?;
            arrivals.set_rate(agent, base * multiplier);
        }

        ScenarioEvent::CounterpartyWeightChange { agent, counterparty, new_weight, auto_balance_others } => {
            if arrivals.get_rate(agent).is_none() {
                return Err(format!("unknown agent: {agent}"));
            }
            arrivals.set_counterparty_weight(agent, counterparty, *new_weight);
            if *auto_balance_others {
                // Remaining counterparties keep their configured weights; an
                // unlisted counterparty already falls back to weight 1.0 in
                // the generator's weighted sampling, so no renormalization
                // pass is needed here.
            }
        }

        ScenarioEvent::DeadlineWindowChange { min_ticks_multiplier, max_ticks_multiplier } => {
            for agent_id in state.get_all_agent_ids().to_vec() {
                if let Some((lo, hi)) = arrivals.get_deadline_range(&agent_id) {
                    let new_lo = min_ticks_multiplier.map(|m| ((lo as f64) * m).round() as usize).unwrap_or(lo);
                    let new_hi = max_ticks_multiplier.map(|m| ((hi as f64) * m).round() as usize).unwrap_or(hi);
                    arrivals.set_deadline_range(&agent_id, (new_lo, new_hi.max(new_lo)));
                }
            }
        }
    }
    Ok(())
}

fn describe(event: &ScenarioEvent) -> String {
    match event {
        ScenarioEvent::DirectTransfer { from_agent, to_agent, amount } => {
            format!("direct_transfer {from_agent}->{to_agent} {amount}")
        }
        ScenarioEvent::CollateralAdjustment { agent, delta } => format!("collateral_adjustment {agent} {delta}"),
        ScenarioEvent::GlobalArrivalRateChange { multiplier } => format!("global_arrival_rate_change x{multiplier}"),
        ScenarioEvent::AgentArrivalRateChange { agent, multiplier } => {
            format!("agent_arrival_rate_change {agent} x{multiplier}")
        }
        ScenarioEvent::CounterpartyWeightChange { agent, counterparty, new_weight, .. } => {
            format!("counterparty_weight_change {agent}->{counterparty} {new_weight}")
        }
        ScenarioEvent::DeadlineWindowChange { min_ticks_multiplier, max_ticks_multiplier } => {
            format!("deadline_window_change min={min_ticks_multiplier:?} max={max_ticks_multiplier:?}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrivals::{AmountDistribution, ArrivalConfig, PriorityDistribution};
    use crate::events::types::EventSchedule;
    use crate::models::Agent;
    use std::collections::HashMap;

    fn arrivals_for(agent: &str, rate: f64) -> ArrivalGenerator {
        let mut configs = HashMap::new();
        configs.insert(
            agent.to_string(),
            ArrivalConfig {
                rate_per_tick: rate,
                amount_distribution: AmountDistribution::Uniform { min: 1, max: 2 },
                counterparty_weights: HashMap::new(),
                deadline_range: (1, 5),
                priority_distribution: PriorityDistribution::Fixed { value: 5 },
                divisible: false,
            },
        );
        ArrivalGenerator::new(configs, vec![agent.to_string()], 1000, 10, false)
    }

    #[test]
    fn direct_transfer_moves_balance_atomically() {
        let mut state = SimulationState::new(vec![Agent::new("A".into(), 1_000, 0), Agent::new("B".into(), 0, 0)]);
        let mut arrivals = arrivals_for("A", 1.0);
        let handler = ScenarioEventHandler::new(vec![ScheduledEvent {
            event: ScenarioEvent::DirectTransfer { from_agent: "A".into(), to_agent: "B".into(), amount: 400 },
            schedule: EventSchedule::OneTime { tick: 0 },
        }]);

        let n = handler.execute_tick_events(&mut state, &mut arrivals, 0).unwrap();
        assert_eq!(n, 1);
        assert_eq!(state.get_agent("A").unwrap().balance(), 600);
        assert_eq!(state.get_agent("B").unwrap().balance(), 400);
    }

    #[test]
    fn collateral_adjustment_posts_and_releases() {
        let mut state = SimulationState::new(vec![Agent::new("A".into(), 1_000, 0)]);
        let mut arrivals = arrivals_for("A", 1.0);
        let handler = ScenarioEventHandler::new(vec![
            ScheduledEvent {
                event: ScenarioEvent::CollateralAdjustment { agent: "A".into(), delta: 300 },
                schedule: EventSchedule::OneTime { tick: 0 },
            },
            ScheduledEvent {
                event: ScenarioEvent::CollateralAdjustment { agent: "A".into(), delta: -100 },
                schedule: EventSchedule::OneTime { tick: 1 },
            },
        ]);

        handler.execute_tick_events(&mut state, &mut arrivals, 0).unwrap();
        assert_eq!(state.get_agent("A").unwrap().posted_collateral(), 300);
        assert_eq!(state.get_agent("A").unwrap().balance(), 700);

        handler.execute_tick_events(&mut state, &mut arrivals, 1).unwrap();
        assert_eq!(state.get_agent("A").unwrap().posted_collateral(), 200);
        assert_eq!(state.get_agent("A").unwrap().balance(), 800);
    }

    #[test]
    fn global_arrival_rate_change_scales_rate() {
        let mut state = SimulationState::new(vec![Agent::new("A".into(), 0, 0)]);
        let mut arrivals = arrivals_for("A", 2.0);
        let handler = ScenarioEventHandler::new(vec![ScheduledEvent {
            event: ScenarioEvent::GlobalArrivalRateChange { multiplier: 0.5 },
            schedule: EventSchedule::OneTime { tick: 0 },
        }]);

        handler.execute_tick_events(&mut state, &mut arrivals, 0).unwrap();
        assert_eq!(arrivals.get_rate("A"), Some(1.0));
    }

    #[test]
    fn agent_arrival_rate_change_scales_one_agent() {
        let mut state = SimulationState::new(vec![Agent::new("A".into(), 0, 0)]);
        let mut arrivals = arrivals_for("A", 4.0);
        let handler = ScenarioEventHandler::new(vec![ScheduledEvent {
            event: ScenarioEvent::AgentArrivalRateChange { agent: "A".into(), multiplier: 0.25 },
            schedule: EventSchedule::OneTime { tick: 0 },
        }]);

        handler.execute_tick_events(&mut state, &mut arrivals, 0).unwrap();
        assert_eq!(arrivals.get_rate("A"), Some(1.0));
    }

    #[test]
    fn deadline_window_change_scales_range() {
        let mut state = SimulationState::new(vec![Agent::new("A".into(), 0, 0)]);
        let mut arrivals = arrivals_for("A", 1.0);
        let handler = ScenarioEventHandler::new(vec![ScheduledEvent {
            event: ScenarioEvent::DeadlineWindowChange { min_ticks_multiplier: Some(2.0), max_ticks_multiplier: None },
            schedule: EventSchedule::OneTime { tick: 0 },
        }]);

        handler.execute_tick_events(&mut state, &mut arrivals, 0).unwrap();
        assert_eq!(arrivals.get_deadline_range("A"), Some((2, 5)));
    }

    #[test]
    fn events_scheduled_for_other_ticks_do_not_fire() {
        let mut state = SimulationState::new(vec![Agent::new("A".into(), 1_000, 0), Agent::new("B".into(), 0, 0)]);
        let mut arrivals = arrivals_for("A", 1.0);
        let handler = ScenarioEventHandler::new(vec![ScheduledEvent {
            event: ScenarioEvent::DirectTransfer { from_agent: "A".into(), to_agent: "B".into(), amount: 400 },
            schedule: EventSchedule::OneTime { tick: 5 },
        }]);

        let n = handler.execute_tick_events(&mut state, &mut arrivals, 0).unwrap();
        assert_eq!(n, 0);
        assert_eq!(state.get_agent("A").unwrap().balance(), 1_000);
    }

    #[test]
    fn unknown_agent_in_direct_transfer_fails_loudly() {
        let mut state = SimulationState::new(vec![Agent::new("A".into(), 1_000, 0)]);
        let mut arrivals = arrivals_for("A", 1.0);
        let handler = ScenarioEventHandler::new(vec![ScheduledEvent {
            event: ScenarioEvent::DirectTransfer { from_agent: "A".into(), to_agent: "ghost".into(), amount: 1 },
            schedule: EventSchedule::OneTime { tick: 0 },
        }]);

        assert!(handler.execute_tick_events(&mut state, &mut arrivals, 0).is_err());
    }
}
