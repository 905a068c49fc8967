//! Orchestrator: engine construction, the per-tick phase schedule (§4.9),
//! and every read-only query an external driver needs between ticks.
//!
//! The phase order inside [`Orchestrator::tick`] is fixed and must never be
//! reordered: scripted events, arrivals, collateral/bank trees, the
//! settlement pipeline, LSM, the Q2 liquidity scan, overdue marking, cost
//! accrual, end-of-day, and (on the final tick) simulation end.

use std::collections::HashMap;

use crate::arrivals::{ArrivalConfig, ArrivalGenerator};
use crate::core::time::TimeManager;
use crate::costs::{accrue, bps_of, CostKind, CostRates};
use crate::events::{ScenarioEventHandler, ScheduledEvent};
use crate::models::event::Event;
use crate::models::{Agent, SimulationState, Transaction, TransactionStatus};
use crate::policy::tree::ValidationError;
use crate::policy::{evaluate_bank_tree, evaluate_collateral_tree, evaluate_payment_tree, BankAction, CollateralAction, PaymentAction, PolicyConfig};
use crate::rng::RngManager;
use crate::settlement::{lsm, rtgs, LsmConfig};
use thiserror::Error;

// -- Configuration ---------------------------------------------------------

/// One agent's construction-time configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub id: String,
    pub opening_balance: i64,
    pub unsecured_cap: i64,
    pub max_collateral_capacity: Option<i64>,
    pub opening_posted_collateral: i64,
    pub policy: PolicyConfig,
    pub arrival_config: Option<ArrivalConfig>,
}

impl AgentConfig {
    pub fn new(id: impl Into<String>, opening_balance: i64, unsecured_cap: i64, policy: PolicyConfig) -> Self {
        Self {
            id: id.into(),
            opening_balance,
            unsecured_cap,
            max_collateral_capacity: None,
            opening_posted_collateral: 0,
            policy,
            arrival_config: None,
        }
    }
}

/// A scripted transaction, injected verbatim at its arrival tick (§4.3 mode 2).
#[derive(Debug, Clone)]
pub struct ScriptedArrival {
    pub tick: usize,
    pub sender_id: String,
    pub receiver_id: String,
    pub amount: i64,
    pub deadline_tick: usize,
    pub priority: u8,
    pub divisible: bool,
}

/// Shape of the priority boost curve applied as ticks-to-deadline shrinks.
/// Purely an input to Q1 ordering and policy context; never persisted into
/// the transaction record (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationCurve {
    Linear,
    Step,
}

#[derive(Debug, Clone)]
pub struct PriorityEscalationConfig {
    pub enabled: bool,
    pub curve: EscalationCurve,
    pub start_escalating_at_ticks: usize,
    pub max_boost: u8,
}

impl Default for PriorityEscalationConfig {
    fn default() -> Self {
        Self { enabled: false, curve: EscalationCurve::Linear, start_escalating_at_ticks: 0, max_boost: 0 }
    }
}

impl PriorityEscalationConfig {
    fn boost(&self, ticks_to_deadline: i64) -> u8 {
        if !self.enabled || self.start_escalating_at_ticks == 0 || ticks_to_deadline > self.start_escalating_at_ticks as i64 {
            return 0;
        }
        if ticks_to_deadline <= 0 {
            return self.max_boost;
        }
        match self.curve {
            EscalationCurve::Step => self.max_boost,
            EscalationCurve::Linear => {
                let frac = 1.0 - (ticks_to_deadline as f64 / self.start_escalating_at_ticks as f64);
                (self.max_boost as f64 * frac).round().clamp(0.0, self.max_boost as f64) as u8
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub ticks_per_day: usize,
    pub num_days: usize,
    pub rng_seed: u64,
    pub agents: Vec<AgentConfig>,
    pub lsm_config: LsmConfig,
    /// Run LSM every `lsm_cadence_ticks` ticks (1 = every tick).
    pub lsm_cadence_ticks: usize,
    pub cost_rates: CostRates,
    pub scenario_events: Vec<ScheduledEvent>,
    pub scripted_arrivals: Vec<ScriptedArrival>,
    pub priority_escalation: PriorityEscalationConfig,
    pub deadline_cap_at_eod: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            ticks_per_day: 1,
            num_days: 1,
            rng_seed: 1,
            agents: Vec::new(),
            lsm_config: LsmConfig::default(),
            lsm_cadence_ticks: 1,
            cost_rates: CostRates::default(),
            scenario_events: Vec::new(),
            scripted_arrivals: Vec::new(),
            priority_escalation: PriorityEscalationConfig::default(),
            deadline_cap_at_eod: true,
        }
    }
}

// -- Errors ------------------------------------------------------------------

/// Fatal, construction-time configuration errors (§7).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("no agents configured")]
    NoAgents,
    #[error("ticks_per_day must be >= 1")]
    TicksPerDayZero,
    #[error("num_days must be >= 1")]
    NumDaysZero,
    #[error("duplicate agent id '{0}'")]
    DuplicateAgentId(String),
    #[error("agent '{0}' has a negative unsecured_cap")]
    NegativeUnsecuredCap(String),
    #[error("agent '{0}' has a negative opening_posted_collateral")]
    NegativeOpeningCollateral(String),
    #[error("policy for agent '{agent_id}' is invalid: {errors:?}")]
    InvalidPolicy { agent_id: String, errors: Vec<ValidationError> },
    #[error("scripted arrival at tick {tick} is outside the simulation horizon (total_ticks={total_ticks})")]
    ScriptedArrivalOutsideHorizon { tick: usize, total_ticks: usize },
    #[error("scripted arrival references unknown agent '{0}'")]
    UnknownAgentInScriptedArrival(String),
    #[error("scenario event scheduled at tick {tick} is outside the simulation horizon (total_ticks={total_ticks})")]
    ScenarioEventOutsideHorizon { tick: usize, total_ticks: usize },
}

/// Fatal, tick-time errors (§7: policy evaluation errors and invariant
/// violations). The engine guarantees no partial tick mutations become
/// observable after one of these — callers should treat the orchestrator
/// as unusable past this point.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("policy evaluation failed for agent '{agent_id}' at tick {tick}: {message}")]
    PolicyEvaluation { agent_id: String, tick: usize, message: String },
    #[error("scenario event execution failed at tick {tick}: {message}")]
    ScenarioEvent { tick: usize, message: String },
    #[error("money conservation violated: expected {expected}, got {actual}")]
    ConservationViolation { expected: i64, actual: i64 },
}

// -- Results -----------------------------------------------------------------

/// Summary returned by one call to [`Orchestrator::tick`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickResult {
    pub tick: usize,
    pub num_arrivals: usize,
    pub num_settlements: usize,
    pub num_lsm_releases: usize,
    pub total_cost_this_tick: i64,
}

/// Aggregate metrics derived from current state (§6).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SystemMetrics {
    pub total_parent_arrivals: usize,
    pub total_parent_settlements: usize,
    pub settlement_rate: f64,
    pub total_events: usize,
}

// -- Construction-time validation --------------------------------------------

fn validate_config(config: &OrchestratorConfig) -> Result<(), ConfigError> {
    if config.agents.is_empty() {
        return Err(ConfigError::NoAgents);
    }
    if config.ticks_per_day == 0 {
        return Err(ConfigError::TicksPerDayZero);
    }
    if config.num_days == 0 {
        return Err(ConfigError::NumDaysZero);
    }

    let mut seen = std::collections::HashSet::new();
    for agent in &config.agents {
        if !seen.insert(agent.id.clone()) {
            return Err(ConfigError::DuplicateAgentId(agent.id.clone()));
        }
        if agent.unsecured_cap < 0 {
            return Err(ConfigError::NegativeUnsecuredCap(agent.id.clone()));
        }
        if agent.opening_posted_collateral < 0 {
            return Err(ConfigError::NegativeOpeningCollateral(agent.id.clone()));
        }
        if let Err(errors) = agent.policy.validate() {
            return Err(ConfigError::InvalidPolicy { agent_id: agent.id.clone(), errors });
        }
    }

    let total_ticks = config.ticks_per_day * config.num_days;
    let agent_ids: std::collections::HashSet<&str> = config.agents.iter().map(|a| a.id.as_str()).collect();

    for scripted in &config.scripted_arrivals {
        if scripted.tick >= total_ticks {
            return Err(ConfigError::ScriptedArrivalOutsideHorizon { tick: scripted.tick, total_ticks });
        }
        if !agent_ids.contains(scripted.sender_id.as_str()) {
            return Err(ConfigError::UnknownAgentInScriptedArrival(scripted.sender_id.clone()));
        }
        if !agent_ids.contains(scripted.receiver_id.as_str()) {
            return Err(ConfigError::UnknownAgentInScriptedArrival(scripted.receiver_id.clone()));
        }
    }

    for scheduled in &config.scenario_events {
        let first_tick = match scheduled.schedule {
            crate::events::EventSchedule::OneTime { tick } => tick,
            crate::events::EventSchedule::Repeating { start_tick, .. } => start_tick,
        };
        if first_tick >= total_ticks {
            return Err(ConfigError::ScenarioEventOutsideHorizon { tick: first_tick, total_ticks });
        }
    }

    Ok(())
}

/// `(priority desc, arrival_tick asc, tx_id asc)`, with optional priority
/// escalation folded into the effective priority used only for ordering.
fn ordered_q1(
    state: &SimulationState,
    agent_id: &str,
    tick: usize,
    escalation: &PriorityEscalationConfig,
) -> Vec<String> {
    let Some(agent) = state.get_agent(agent_id) else { return Vec::new() };
    let mut entries: Vec<(u8, usize, String)> = agent
        .q1()
        .iter()
        .filter_map(|tx_id| {
            let tx = state.get_transaction(tx_id)?;
            let ticks_to_deadline = tx.deadline_tick as i64 - tick as i64;
            let effective_priority = tx.priority.saturating_add(escalation.boost(ticks_to_deadline));
            Some((effective_priority, tx.arrival_tick, tx_id.clone()))
        })
        .collect();
    entries.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));
    entries.into_iter().map(|(_, _, id)| id).collect()
}

// -- Orchestrator --------------------------------------------------------------

pub struct Orchestrator {
    state: SimulationState,
    time: TimeManager,
    rng: RngManager,
    seed: u64,
    arrivals: ArrivalGenerator,
    scenario_handler: ScenarioEventHandler,
    scripted_arrivals: Vec<ScriptedArrival>,
    policies: HashMap<String, PolicyConfig>,
    cost_rates: CostRates,
    lsm_config: LsmConfig,
    lsm_cadence_ticks: usize,
    priority_escalation: PriorityEscalationConfig,
    total_ticks: usize,
    initial_total: i64,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Result<Self, ConfigError> {
        validate_config(&config)?;

        let total_ticks = config.ticks_per_day * config.num_days;
        let mut agent_ids = Vec::with_capacity(config.agents.len());
        let mut agents = Vec::with_capacity(config.agents.len());
        let mut policies = HashMap::with_capacity(config.agents.len());
        let mut arrival_configs: HashMap<String, ArrivalConfig> = HashMap::new();

        for agent_cfg in &config.agents {
            agent_ids.push(agent_cfg.id.clone());
            let mut agent = Agent::new(agent_cfg.id.clone(), agent_cfg.opening_balance, agent_cfg.unsecured_cap);
            if let Some(capacity) = agent_cfg.max_collateral_capacity {
                agent = agent.with_max_collateral_capacity(capacity);
            }
            if agent_cfg.opening_posted_collateral > 0 {
                agent = agent.with_posted_collateral(agent_cfg.opening_posted_collateral);
            }
            agents.push(agent);
            policies.insert(agent_cfg.id.clone(), agent_cfg.policy.clone());
            if let Some(arrival_config) = &agent_cfg.arrival_config {
                arrival_configs.insert(agent_cfg.id.clone(), arrival_config.clone());
            }
        }

        let initial_total: i64 =
            agents.iter().map(|a| a.balance() + a.posted_collateral()).sum();
        let state = SimulationState::new(agents);

        let arrivals = ArrivalGenerator::new(
            arrival_configs,
            agent_ids,
            total_ticks.saturating_sub(1),
            config.ticks_per_day,
            config.deadline_cap_at_eod,
        );
        let scenario_handler = ScenarioEventHandler::new(config.scenario_events);
        let rng = RngManager::from_label(config.rng_seed, "arrivals", 0);

        let mut orchestrator = Self {
            state,
            time: TimeManager::new(config.ticks_per_day),
            rng,
            seed: config.rng_seed,
            arrivals,
            scenario_handler,
            scripted_arrivals: config.scripted_arrivals,
            policies,
            cost_rates: config.cost_rates,
            lsm_config: config.lsm_config,
            lsm_cadence_ticks: config.lsm_cadence_ticks.max(1),
            priority_escalation: config.priority_escalation,
            total_ticks,
            initial_total,
        };
        orchestrator.state.log_event(Event::SimulationStart {
            tick: 0,
            seed: orchestrator.seed,
            num_agents: orchestrator.state.num_agents(),
        });
        Ok(orchestrator)
    }

    // -- Tick loop -----------------------------------------------------------

    /// Advance the simulation by exactly one tick, running every phase in
    /// the fixed order from §4.9. Returns a summary of what happened, or a
    /// fatal [`EngineError`] that leaves the orchestrator unusable.
    pub fn tick(&mut self) -> Result<TickResult, EngineError> {
        let tick = self.time.current_tick();
        let mut result = TickResult { tick, ..Default::default() };

        // Phase 1: scripted scenario events.
        self.scenario_handler
            .execute_tick_events(&mut self.state, &mut self.arrivals, tick)
            .map_err(|message| EngineError::ScenarioEvent { tick, message })?;

        // Phase 2: arrivals (stochastic + scripted).
        result.num_arrivals += self.generate_stochastic_arrivals(tick);
        result.num_arrivals += self.inject_scripted_arrivals(tick);

        // Phase 3: collateral and bank trees.
        self.run_collateral_and_bank_trees(tick)?;

        // Phase 4: settlement pipeline over Q1.
        result.num_settlements += self.run_settlement_pipeline(tick)?;

        // Phase 5: LSM (if due this tick).
        if tick % self.lsm_cadence_ticks == 0 {
            let mut lsm_rng = RngManager::from_label(self.seed, &format!("lsm:{tick}"), 0);
            let summary = lsm::run(&mut self.state, tick, &self.lsm_config, &mut lsm_rng);
            result.num_lsm_releases += summary.bilateral_offsets + summary.cycles_settled;
        }

        // Phase 6: Q2 liquidity-release scan.
        let scan = rtgs::scan_queue2(&mut self.state, tick);
        result.num_settlements += scan.settled_count;

        // Phase 7: overdue marking + deadline penalty.
        self.mark_overdue_and_penalize(tick);

        // Phase 8: per-tick cost accrual.
        result.total_cost_this_tick = self.accrue_tick_costs(tick);

        // Phase 9: end of day.
        if (tick + 1) % self.time.ticks_per_day() == 0 {
            let day = tick / self.time.ticks_per_day();
            self.state.log_event(Event::EndOfDay { tick, day });
            for agent_id in self.state.get_all_agent_ids().to_vec() {
                if let Some(agent) = self.state.get_agent_mut(&agent_id) {
                    agent.reset_daily_registers();
                }
            }
        }

        // Phase 10: simulation end.
        if tick + 1 == self.total_ticks {
            self.charge_eod_penalties(tick);
            self.state.log_event(Event::SimulationEnd { tick });
        }

        self.check_conservation(tick)?;
        self.time.advance_tick();
        Ok(result)
    }

    fn generate_stochastic_arrivals(&mut self, tick: usize) -> usize {
        let mut count = 0;
        for agent_id in self.state.get_all_agent_ids().to_vec() {
            let txs = self.arrivals.generate_for_agent(&agent_id, tick, &mut self.rng);
            for tx in txs {
                self.log_arrival_and_enqueue(tx);
                count += 1;
            }
        }
        count
    }

    fn inject_scripted_arrivals(&mut self, tick: usize) -> usize {
        let mut count = 0;
        for scripted in self.scripted_arrivals.clone() {
            if scripted.tick != tick {
                continue;
            }
            let tx = Transaction::with_priority(
                scripted.sender_id,
                scripted.receiver_id,
                scripted.amount,
                tick,
                scripted.deadline_tick,
                scripted.priority,
                scripted.divisible,
            );
            self.log_arrival_and_enqueue(tx);
            count += 1;
        }
        count
    }

    fn log_arrival_and_enqueue(&mut self, tx: Transaction) {
        let event = Event::Arrival {
            tick: tx.arrival_tick,
            tx_id: tx.id.clone(),
            sender_id: tx.sender_id.clone(),
            receiver_id: tx.receiver_id.clone(),
            amount: tx.amount,
            deadline_tick: tx.deadline_tick,
            priority: tx.priority,
        };
        let sender_id = tx.sender_id.clone();
        let tx_id = tx.id.clone();
        self.state.add_transaction(tx);
        if let Some(sender) = self.state.get_agent_mut(&sender_id) {
            sender.push_q1(tx_id);
        }
        self.state.log_event(event);
    }

    fn run_collateral_and_bank_trees(&mut self, tick: usize) -> Result<(), EngineError> {
        let ticks_per_day = self.time.ticks_per_day();
        for agent_id in self.state.get_all_agent_ids().to_vec() {
            let Some(policy) = self.policies.get(&agent_id).cloned() else { continue };

            if tick == 0 {
                if let Some(tree) = &policy.def.strategic_collateral_tree {
                    self.apply_collateral_action(&agent_id, tree, &policy, tick, ticks_per_day, "strategic")?;
                }
            }
            if let Some(tree) = &policy.def.end_of_tick_collateral_tree {
                self.apply_collateral_action(&agent_id, tree, &policy, tick, ticks_per_day, "end_of_tick")?;
            }
            if let Some(tree) = &policy.def.bank_tree {
                self.apply_bank_action(&agent_id, tree, &policy, tick, ticks_per_day)?;
            }
        }
        Ok(())
    }

    fn apply_collateral_action(
        &mut self,
        agent_id: &str,
        tree: &crate::policy::tree::TreeNode,
        policy: &PolicyConfig,
        tick: usize,
        ticks_per_day: usize,
        reason: &str,
    ) -> Result<(), EngineError> {
        let action = {
            let agent = self.state.get_agent(agent_id).expect("agent exists");
            evaluate_collateral_tree(tree, agent, &self.state, tick, ticks_per_day, &policy.def.parameters)
                .map_err(|e| EngineError::PolicyEvaluation { agent_id: agent_id.to_string(), tick, message: e.to_string() })?
        };
        match action {
            CollateralAction::Post(amount) if amount > 0 => {
                let agent = self.state.get_agent_mut(agent_id).expect("agent exists");
                match agent.post_collateral(amount) {
                    Ok(()) => self.state.log_event(Event::CollateralPosted {
                        tick,
                        agent_id: agent_id.to_string(),
                        amount,
                        reason: reason.to_string(),
                    }),
                    Err(e) => {
                        return Err(EngineError::PolicyEvaluation {
                            agent_id: agent_id.to_string(),
                            tick,
                            message: e.to_string(),
                        })
                    }
                }
            }
            CollateralAction::Release(amount) if amount > 0 => {
                let agent = self.state.get_agent_mut(agent_id).expect("agent exists");
                match agent.release_collateral(amount) {
                    Ok(()) => self.state.log_event(Event::CollateralReleased {
                        tick,
                        agent_id: agent_id.to_string(),
                        amount,
                        reason: reason.to_string(),
                    }),
                    Err(e) => {
                        return Err(EngineError::PolicyEvaluation {
                            agent_id: agent_id.to_string(),
                            tick,
                            message: e.to_string(),
                        })
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn apply_bank_action(
        &mut self,
        agent_id: &str,
        tree: &crate::policy::tree::TreeNode,
        policy: &PolicyConfig,
        tick: usize,
        ticks_per_day: usize,
    ) -> Result<(), EngineError> {
        let action = {
            let agent = self.state.get_agent(agent_id).expect("agent exists");
            evaluate_bank_tree(tree, agent, &self.state, tick, ticks_per_day, &policy.def.parameters)
                .map_err(|e| EngineError::PolicyEvaluation { agent_id: agent_id.to_string(), tick, message: e.to_string() })?
        };
        if let BankAction::SetRegister(key, new_value) = action {
            let agent = self.state.get_agent_mut(agent_id).expect("agent exists");
            let old_value = agent.get_register(&key);
            agent.set_register(&key, new_value);
            self.state.log_event(Event::StateRegisterSet {
                tick,
                agent_id: agent_id.to_string(),
                register_key: key,
                old_value,
                new_value,
                reason: "bank_tree".to_string(),
            });
        }
        Ok(())
    }

    /// Per agent in stable ID order, evaluate the payment tree over Q1 in
    /// `(priority desc, arrival_tick asc, tx_id asc)` order, routing each
    /// decision to RTGS/Q2 or applying a split (§4.6).
    fn run_settlement_pipeline(&mut self, tick: usize) -> Result<usize, EngineError> {
        let ticks_per_day = self.time.ticks_per_day();
        let mut settlements = 0usize;

        for agent_id in self.state.get_all_agent_ids().to_vec() {
            let Some(policy) = self.policies.get(&agent_id).cloned() else { continue };
            let Some(payment_tree) = policy.def.payment_tree.clone() else { continue };

            let mut queue = ordered_q1(&self.state, &agent_id, tick, &self.priority_escalation);
            let mut idx = 0;
            while idx < queue.len() {
                let tx_id = queue[idx].clone();
                idx += 1;

                let Some(tx) = self.state.get_transaction(&tx_id) else { continue };
                if !tx.is_pending() {
                    continue;
                }

                let action = {
                    let tx = self.state.get_transaction(&tx_id).unwrap();
                    let agent = self.state.get_agent(&agent_id).unwrap();
                    evaluate_payment_tree(&payment_tree, tx, agent, &self.state, tick, ticks_per_day, &policy.def.parameters)
                        .map_err(|e| EngineError::PolicyEvaluation { agent_id: agent_id.clone(), tick, message: e.to_string() })?
                };

                match action {
                    PaymentAction::Release => {
                        if let Some(agent) = self.state.get_agent_mut(&agent_id) {
                            agent.remove_from_q1(&tx_id);
                        }
                        self.state.log_event(Event::PolicyRelease { tick, tx_id: tx_id.clone(), agent_id: agent_id.clone() });
                        rtgs::release(&mut self.state, &tx_id, tick)
                            .map_err(|e| EngineError::PolicyEvaluation { agent_id: agent_id.clone(), tick, message: e.to_string() })?;
                        settlements += 1;
                    }
                    PaymentAction::Hold => {
                        self.state.log_event(Event::PolicyHold { tick, tx_id: tx_id.clone(), agent_id: agent_id.clone() });
                    }
                    PaymentAction::Split(parts) => {
                        let child_ids = self.apply_split(&agent_id, &tx_id, &parts, tick)?;
                        queue.extend(child_ids);
                    }
                }
            }
        }
        Ok(settlements)
    }

    /// Validate and apply a `Split([a1..ak])` decision: remove the parent
    /// from Q1, create its children, and enqueue them for this same
    /// settlement pass (§4.4, §4.6).
    fn apply_split(&mut self, agent_id: &str, tx_id: &str, parts: &[i64], tick: usize) -> Result<Vec<String>, EngineError> {
        let parent = self.state.get_transaction(tx_id).expect("tx exists").clone();
        parent.validate_split(parts).map_err(|e| EngineError::PolicyEvaluation {
            agent_id: agent_id.to_string(),
            tick,
            message: e.to_string(),
        })?;

        if let Some(agent) = self.state.get_agent_mut(agent_id) {
            agent.remove_from_q1(tx_id);
        }

        let mut child_ids = Vec::with_capacity(parts.len());
        for &amount in parts {
            let child = parent.split_child(amount);
            child_ids.push(child.id.clone());
            self.state.add_transaction(child);
        }
        for child_id in &child_ids {
            if let Some(agent) = self.state.get_agent_mut(agent_id) {
                agent.push_q1(child_id.clone());
            }
        }

        self.state.log_event(Event::PolicySplit {
            tick,
            parent_id: tx_id.to_string(),
            child_ids: child_ids.clone(),
            agent_id: agent_id.to_string(),
        });

        if let Some((agent, log)) = self.state.agent_and_log_mut(agent_id) {
            accrue(agent, CostKind::SplitFriction, self.cost_rates.split_friction_cost, tick, log);
        }

        Ok(child_ids)
    }

    fn mark_overdue_and_penalize(&mut self, tick: usize) {
        let mut tx_ids: Vec<String> = self.state.transactions().map(|t| t.id.clone()).collect();
        tx_ids.sort();
        for tx_id in tx_ids {
            let Some(tx) = self.state.get_transaction(&tx_id) else { continue };
            if tx.is_pending() && tx.is_past_deadline(tick) && tx.status != TransactionStatus::Overdue {
                let sender_id = tx.sender_id.clone();
                self.state.get_transaction_mut(&tx_id).unwrap().mark_overdue();
                self.state.log_event(Event::TransactionWentOverdue { tick, tx_id: tx_id.clone(), agent_id: sender_id.clone() });
                if let Some((agent, log)) = self.state.agent_and_log_mut(&sender_id) {
                    accrue(agent, CostKind::Deadline, self.cost_rates.deadline_penalty, tick, log);
                }
            }
        }
    }

    fn accrue_tick_costs(&mut self, tick: usize) -> i64 {
        let mut total = 0i64;

        for agent_id in self.state.get_all_agent_ids().to_vec() {
            let (overdraft_amount, collateral_amount) = {
                let agent = self.state.get_agent(&agent_id).unwrap();
                let overdraft = if agent.balance() < 0 { bps_of(-agent.balance(), self.cost_rates.overdraft_bps_per_tick) } else { 0 };
                let collateral = bps_of(agent.posted_collateral(), self.cost_rates.collateral_bps_per_tick);
                (overdraft, collateral)
            };
            if let Some((agent, log)) = self.state.agent_and_log_mut(&agent_id) {
                accrue(agent, CostKind::Overdraft, overdraft_amount, tick, log);
                accrue(agent, CostKind::Collateral, collateral_amount, tick, log);
            }
            total += overdraft_amount + collateral_amount;
        }

        let mut tx_ids: Vec<String> = self.state.transactions().map(|t| t.id.clone()).collect();
        tx_ids.sort();
        for tx_id in tx_ids {
            let Some(tx) = self.state.get_transaction(&tx_id) else { continue };
            if !tx.is_pending() {
                continue;
            }
            let overdue = tx.status == TransactionStatus::Overdue;
            let sender_id = tx.sender_id.clone();
            let bps = if overdue {
                self.cost_rates.delay_bps_per_tick * self.cost_rates.overdue_delay_multiplier
            } else {
                self.cost_rates.delay_bps_per_tick
            };
            let amount = bps_of(tx.remaining_amount(), bps);
            if let Some((agent, log)) = self.state.agent_and_log_mut(&sender_id) {
                accrue(agent, CostKind::Delay, amount, tick, log);
            }
            total += amount;
        }

        total
    }

    fn charge_eod_penalties(&mut self, tick: usize) {
        let mut tx_ids: Vec<String> = self.state.transactions().map(|t| t.id.clone()).collect();
        tx_ids.sort();
        for tx_id in tx_ids {
            let Some(tx) = self.state.get_transaction(&tx_id) else { continue };
            if tx.is_fully_settled() {
                continue;
            }
            let sender_id = tx.sender_id.clone();
            if let Some((agent, log)) = self.state.agent_and_log_mut(&sender_id) {
                accrue(agent, CostKind::Eod, self.cost_rates.eod_penalty, tick, log);
            }
        }
    }

    fn check_conservation(&self, tick: usize) -> Result<(), EngineError> {
        let actual = self.state.total_balance() + self.state.total_posted_collateral();
        if actual != self.initial_total {
            return Err(EngineError::ConservationViolation { expected: self.initial_total, actual });
        }
        let _ = tick;
        Ok(())
    }

    // -- Queries (§6) ----------------------------------------------------------

    pub fn current_tick(&self) -> usize {
        self.time.current_tick()
    }

    pub fn current_day(&self) -> usize {
        self.time.current_day()
    }

    pub fn total_ticks(&self) -> usize {
        self.total_ticks
    }

    pub fn ticks_per_day(&self) -> usize {
        self.time.ticks_per_day()
    }

    pub fn get_agent_ids(&self) -> &[String] {
        self.state.get_all_agent_ids()
    }

    pub fn get_agent_balance(&self, id: &str) -> Option<i64> {
        self.state.get_agent(id).map(|a| a.balance())
    }

    pub fn get_agent_unsecured_cap(&self, id: &str) -> Option<i64> {
        self.state.get_agent(id).map(|a| a.unsecured_cap())
    }

    pub fn get_agent_collateral_posted(&self, id: &str) -> Option<i64> {
        self.state.get_agent(id).map(|a| a.posted_collateral())
    }

    pub fn get_agent_accumulated_costs(&self, id: &str) -> Option<HashMap<CostKind, i64>> {
        self.state.get_agent(id).map(|a| a.accumulated_costs().clone())
    }

    pub fn get_queue1_size(&self, id: &str) -> Option<usize> {
        self.state.get_agent(id).map(|a| a.q1_size())
    }

    pub fn get_queue1_contents(&self, id: &str) -> Option<Vec<String>> {
        self.state.get_agent(id).map(|a| a.q1().to_vec())
    }

    pub fn get_queue2_size(&self) -> usize {
        self.state.queue2_size()
    }

    pub fn get_rtgs_queue_contents(&self) -> Vec<String> {
        self.state.queue2_ids().to_vec()
    }

    pub fn get_transaction_details(&self, tx_id: &str) -> Option<&Transaction> {
        self.state.get_transaction(tx_id)
    }

    pub fn get_transactions_for_day(&self, day: usize) -> Vec<&Transaction> {
        self.state.transactions_for_day(day, self.time.ticks_per_day())
    }

    pub fn get_transactions_near_deadline(&self, within_ticks: usize) -> Vec<&Transaction> {
        self.state.transactions_near_deadline(self.current_tick(), within_ticks)
    }

    pub fn get_tick_events(&self, tick: usize) -> Vec<&Event> {
        self.state.event_log().events_at_tick(tick)
    }

    pub fn get_all_events(&self) -> &[Event] {
        self.state.event_log().events()
    }

    /// Whether `tx_id` (and, if it was split, every descendant child) has
    /// fully covered the original amount.
    fn is_effectively_settled(&self, tx_id: &str) -> bool {
        self.effectively_settled_amount(tx_id) >= self.state.get_transaction(tx_id).map(|t| t.amount).unwrap_or(i64::MAX)
    }

    fn effectively_settled_amount(&self, tx_id: &str) -> i64 {
        let Some(tx) = self.state.get_transaction(tx_id) else { return 0 };
        let children: Vec<&Transaction> = self.state.transactions().filter(|t| t.parent_id.as_deref() == Some(tx_id)).collect();
        if children.is_empty() {
            return tx.amount_settled;
        }
        tx.amount_settled + children.iter().map(|c| self.effectively_settled_amount(&c.id)).sum::<i64>()
    }

    /// Settlement rate counts parent transactions only (§6, §8 invariant 3):
    /// split children never count as additional arrivals or settlements.
    pub fn get_system_metrics(&self) -> SystemMetrics {
        let parents: Vec<&Transaction> = self.state.transactions().filter(|t| t.parent_id.is_none()).collect();
        let total_parent_arrivals = parents.len();
        let total_parent_settlements = parents.iter().filter(|t| self.is_effectively_settled(&t.id)).count();
        let settlement_rate =
            if total_parent_arrivals == 0 { 0.0 } else { total_parent_settlements as f64 / total_parent_arrivals as f64 };
        SystemMetrics {
            total_parent_arrivals,
            total_parent_settlements,
            settlement_rate,
            total_events: self.state.event_log().len(),
        }
    }
}
