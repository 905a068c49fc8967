//! Payment Simulator Core - Rust Engine
//!
//! High-performance payment settlement simulator with deterministic execution.
//!
//! # Architecture
//!
//! - **core**: Time management and initialization
//! - **models**: Domain types (Agent, Transaction, State)
//! - **policy**: Cash manager policies (Queue 1 decisions)
//! - **orchestrator**: Main simulation loop
//! - **settlement**: Settlement engines (RTGS, LSM)
//! - **rng**: Deterministic random number generation
//!
//! # Critical Invariants
//!
//! 1. All money values are i64 (cents)
//! 2. All randomness is deterministic (seeded RNG)
//! 3. FFI boundary is minimal and safe

// Module declarations
pub mod arrivals;
pub mod core;
pub mod costs;
pub mod events;
pub mod models;
pub mod orchestrator;
pub mod policy;
pub mod rng;
pub mod settlement;

// Re-exports for convenience
pub use arrivals::{AmountDistribution, ArrivalConfig, ArrivalGenerator};
pub use core::time::TimeManager;
pub use costs::{CostKind, CostRates};
pub use models::{Agent, AgentError, Event, EventLog, SimulationState, Transaction, TransactionError, TransactionStatus};
pub use orchestrator::{
    AgentConfig, ConfigError, EngineError, Orchestrator, OrchestratorConfig, PolicyConfig,
    PriorityEscalationConfig, ScriptedArrival, SystemMetrics, TickResult,
};
pub use rng::RngManager;
pub use settlement::{LsmConfig, LsmSummary, SettlementError};

// FFI module (when feature enabled)
#[cfg(feature = "pyo3")]
pub mod ffi;

// PyO3 exports (when feature enabled)
#[cfg(feature = "pyo3")]
use pyo3::prelude::*;

/// Get the policy schema documentation as a JSON string: the closed
/// vocabulary a policy author needs before writing a tree.
#[cfg(feature = "pyo3")]
#[pyfunction]
#[pyo3(name = "get_policy_schema")]
fn py_get_policy_schema() -> PyResult<String> {
    serde_json::to_string(&policy::tree::policy_schema())
        .map_err(|e| pyo3::exceptions::PyRuntimeError::new_err(e.to_string()))
}

/// Validate a policy tree JSON string, returning every validation error
/// found rather than stopping at the first (§7).
///
/// Returns a JSON string:
/// - On success: `{"valid": true, "policy_id": "...", "version": "..."}`
/// - On failure: `{"valid": false, "errors": [{"node_id": "...", "message": "..."}]}`
#[cfg(feature = "pyo3")]
#[pyfunction]
#[pyo3(name = "validate_policy")]
fn py_validate_policy(policy_json: &str) -> PyResult<String> {
    use serde_json::json;

    let def: policy::tree::DecisionTreeDef = match serde_json::from_str(policy_json) {
        Ok(def) => def,
        Err(e) => {
            return Ok(json!({
                "valid": false,
                "errors": [{"node_id": "", "message": format!("JSON parsing failed: {e}")}]
            })
            .to_string())
        }
    };

    match policy::tree::validate_policy(&def) {
        Ok(()) => Ok(json!({
            "valid": true,
            "policy_id": def.policy_id,
            "version": def.version,
        })
        .to_string()),
        Err(errors) => {
            let error_list: Vec<_> =
                errors.iter().map(|e| json!({"node_id": e.node_id, "message": e.message})).collect();
            Ok(json!({"valid": false, "errors": error_list}).to_string())
        }
    }
}

#[cfg(feature = "pyo3")]
#[pymodule]
fn simcash_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<ffi::orchestrator::PyOrchestrator>()?;
    m.add_function(wrap_pyfunction!(py_get_policy_schema, m)?)?;
    m.add_function(wrap_pyfunction!(py_validate_policy, m)?)?;
    Ok(())
}
