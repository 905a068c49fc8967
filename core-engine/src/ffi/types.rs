//! Conversions across the FFI boundary: Python dicts in, Python dicts out.
//! Rust state never crosses this boundary by reference (§6) — every value
//! here is copied into a primitive, string, or dict/list.

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};

use crate::events::{EventSchedule, ScenarioEvent, ScheduledEvent};
use crate::models::Transaction;
use crate::orchestrator::{AgentConfig, EscalationCurve, OrchestratorConfig, PriorityEscalationConfig, ScriptedArrival, TickResult};
use crate::policy::PolicyConfig;

fn get_item<'py>(dict: &Bound<'py, PyDict>, key: &str) -> PyResult<Bound<'py, PyAny>> {
    dict.get_item(key)?.ok_or_else(|| PyValueError::new_err(format!("missing required config field '{key}'")))
}

fn get_opt<'py>(dict: &Bound<'py, PyDict>, key: &str) -> PyResult<Option<Bound<'py, PyAny>>> {
    Ok(dict.get_item(key)?)
}

/// Build an [`OrchestratorConfig`] from a Python dict matching the shape
/// documented on `Orchestrator.new` (§6 construction API).
pub fn parse_orchestrator_config(config: &Bound<'_, PyDict>) -> PyResult<OrchestratorConfig> {
    let ticks_per_day: usize = get_item(config, "ticks_per_day")?.extract()?;
    let num_days: usize = get_item(config, "num_days")?.extract()?;
    let rng_seed: u64 = get_item(config, "rng_seed")?.extract()?;

    let agents_list = get_item(config, "agents")?;
    let agents_list: &Bound<'_, PyList> = agents_list.downcast()?;
    let mut agents = Vec::with_capacity(agents_list.len());
    for item in agents_list.iter() {
        let agent_dict: &Bound<'_, PyDict> = item.downcast()?;
        agents.push(parse_agent_config(agent_dict)?);
    }

    let mut cfg = OrchestratorConfig { ticks_per_day, num_days, rng_seed, agents, ..Default::default() };

    if let Some(v) = get_opt(config, "lsm_cadence_ticks")? {
        cfg.lsm_cadence_ticks = v.extract()?;
    }
    if let Some(v) = get_opt(config, "deadline_cap_at_eod")? {
        cfg.deadline_cap_at_eod = v.extract()?;
    }
    if let Some(v) = get_opt(config, "scripted_arrivals")? {
        let list: &Bound<'_, PyList> = v.downcast()?;
        for item in list.iter() {
            let d: &Bound<'_, PyDict> = item.downcast()?;
            cfg.scripted_arrivals.push(parse_scripted_arrival(d)?);
        }
    }
    if let Some(v) = get_opt(config, "priority_escalation")? {
        let d: &Bound<'_, PyDict> = v.downcast()?;
        cfg.priority_escalation = parse_priority_escalation(d)?;
    }
    if let Some(v) = get_opt(config, "scenario_events")? {
        let list: &Bound<'_, PyList> = v.downcast()?;
        for item in list.iter() {
            let d: &Bound<'_, PyDict> = item.downcast()?;
            cfg.scenario_events.push(parse_scheduled_event(d)?);
        }
    }

    Ok(cfg)
}

fn parse_agent_config(d: &Bound<'_, PyDict>) -> PyResult<AgentConfig> {
    let id: String = get_item(d, "id")?.extract()?;
    let opening_balance: i64 = get_item(d, "opening_balance")?.extract()?;
    let unsecured_cap: i64 = get_item(d, "unsecured_cap")?.extract()?;
    let policy_json: String = get_item(d, "policy")?.extract()?;
    let policy = PolicyConfig::from_json(&policy_json).map_err(|e| PyValueError::new_err(format!("invalid policy JSON for agent '{id}': {e}")))?;

    let mut agent = AgentConfig::new(id, opening_balance, unsecured_cap, policy);
    if let Some(v) = get_opt(d, "max_collateral_capacity")? {
        agent.max_collateral_capacity = Some(v.extract()?);
    }
    if let Some(v) = get_opt(d, "opening_posted_collateral")? {
        agent.opening_posted_collateral = v.extract()?;
    }
    Ok(agent)
}

fn parse_scripted_arrival(d: &Bound<'_, PyDict>) -> PyResult<ScriptedArrival> {
    Ok(ScriptedArrival {
        tick: get_item(d, "tick")?.extract()?,
        sender_id: get_item(d, "sender_id")?.extract()?,
        receiver_id: get_item(d, "receiver_id")?.extract()?,
        amount: get_item(d, "amount")?.extract()?,
        deadline_tick: get_item(d, "deadline_tick")?.extract()?,
        priority: get_item(d, "priority")?.extract()?,
        divisible: get_item(d, "divisible")?.extract()?,
    })
}

fn parse_priority_escalation(d: &Bound<'_, PyDict>) -> PyResult<PriorityEscalationConfig> {
    let curve_str: String = get_opt(d, "curve")?.map(|v| v.extract()).transpose()?.unwrap_or_else(|| "linear".to_string());
    let curve = match curve_str.as_str() {
        "linear" => EscalationCurve::Linear,
        "step" => EscalationCurve::Step,
        other => return Err(PyValueError::new_err(format!("unknown escalation curve '{other}'"))),
    };
    Ok(PriorityEscalationConfig {
        enabled: get_opt(d, "enabled")?.map(|v| v.extract()).transpose()?.unwrap_or(false),
        curve,
        start_escalating_at_ticks: get_opt(d, "start_escalating_at_ticks")?.map(|v| v.extract()).transpose()?.unwrap_or(0),
        max_boost: get_opt(d, "max_boost")?.map(|v| v.extract()).transpose()?.unwrap_or(0),
    })
}

fn parse_scheduled_event(d: &Bound<'_, PyDict>) -> PyResult<ScheduledEvent> {
    let kind: String = get_item(d, "type")?.extract()?;
    let event = match kind.as_str() {
        "direct_transfer" => ScenarioEvent::DirectTransfer {
            from_agent: get_item(d, "from_agent")?.extract()?,
            to_agent: get_item(d, "to_agent")?.extract()?,
            amount: get_item(d, "amount")?.extract()?,
        },
        "collateral_adjustment" => ScenarioEvent::CollateralAdjustment {
            agent: get_item(d, "agent")?.extract()?,
            delta: get_item(d, "delta")?.extract()?,
        },
        "global_arrival_rate_change" => ScenarioEvent::GlobalArrivalRateChange { multiplier: get_item(d, "multiplier")?.extract()? },
        "agent_arrival_rate_change" => ScenarioEvent::AgentArrivalRateChange {
            agent: get_item(d, "agent")?.extract()?,
            multiplier: get_item(d, "multiplier")?.extract()?,
        },
        "counterparty_weight_change" => ScenarioEvent::CounterpartyWeightChange {
            agent: get_item(d, "agent")?.extract()?,
            counterparty: get_item(d, "counterparty")?.extract()?,
            new_weight: get_item(d, "new_weight")?.extract()?,
            auto_balance_others: get_opt(d, "auto_balance_others")?.map(|v| v.extract()).transpose()?.unwrap_or(false),
        },
        "deadline_window_change" => ScenarioEvent::DeadlineWindowChange {
            min_ticks_multiplier: get_opt(d, "min_ticks_multiplier")?.map(|v| v.extract()).transpose()?,
            max_ticks_multiplier: get_opt(d, "max_ticks_multiplier")?.map(|v| v.extract()).transpose()?,
        },
        other => return Err(PyValueError::new_err(format!("unknown scenario event type '{other}'"))),
    };

    let schedule_kind: String = get_item(d, "schedule")?.extract()?;
    let schedule = match schedule_kind.as_str() {
        "one_time" => EventSchedule::OneTime { tick: get_item(d, "tick")?.extract()? },
        "repeating" => EventSchedule::Repeating {
            start_tick: get_item(d, "start_tick")?.extract()?,
            interval: get_item(d, "interval")?.extract()?,
        },
        other => return Err(PyValueError::new_err(format!("unknown event schedule kind '{other}'"))),
    };

    Ok(ScheduledEvent { event, schedule })
}

/// Convert one [`Transaction`] into the dict shape consumed by the
/// TransactionRecord schema on the Python side.
pub fn transaction_to_py<'py>(py: Python<'py>, tx: &Transaction, ticks_per_day: usize) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new(py);
    dict.set_item("tx_id", &tx.id)?;
    dict.set_item("parent_id", tx.parent_id.as_deref())?;
    dict.set_item("sender_id", &tx.sender_id)?;
    dict.set_item("receiver_id", &tx.receiver_id)?;
    dict.set_item("amount", tx.amount)?;
    dict.set_item("amount_settled", tx.amount_settled)?;
    dict.set_item("priority", tx.priority)?;
    dict.set_item("divisible", tx.divisible)?;
    dict.set_item("arrival_tick", tx.arrival_tick)?;
    dict.set_item("deadline_tick", tx.deadline_tick)?;
    dict.set_item("settlement_tick", tx.settlement_tick)?;
    dict.set_item("status", format!("{:?}", tx.status))?;
    dict.set_item("arrival_day", tx.arrival_tick / ticks_per_day)?;
    Ok(dict)
}

/// Convert one [`TickResult`] into the dict shape returned by `tick()`.
pub fn tick_result_to_py<'py>(py: Python<'py>, result: &TickResult) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new(py);
    dict.set_item("tick", result.tick)?;
    dict.set_item("num_arrivals", result.num_arrivals)?;
    dict.set_item("num_settlements", result.num_settlements)?;
    dict.set_item("num_lsm_releases", result.num_lsm_releases)?;
    dict.set_item("total_cost_this_tick", result.total_cost_this_tick)?;
    Ok(dict)
}
