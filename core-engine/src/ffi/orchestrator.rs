//! PyO3 wrapper for Orchestrator
//!
//! This module provides the Python interface to the Rust orchestrator.

use pyo3::exceptions::PyRuntimeError;
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};

use super::types::{parse_orchestrator_config, tick_result_to_py, transaction_to_py};
use crate::orchestrator::Orchestrator as RustOrchestrator;

/// Python wrapper for Rust Orchestrator
///
/// This class provides the main entry point for Python code to create
/// and control simulations.
///
/// # Example (from Python)
///
/// ```python
/// from payment_simulator._core import Orchestrator
///
/// config = {
///     "ticks_per_day": 100,
///     "num_days": 1,
///     "rng_seed": 12345,
///     "agents": [
///         {
///             "id": "BANK_A",
///             "opening_balance": 1_000_000,
///             "unsecured_cap": 500_000,
///             "policy": policy_json_string,
///         },
///     ],
/// }
///
/// orch = Orchestrator(config)
/// result = orch.tick()
/// print(f"Tick {result['tick']}: {result['num_settlements']} settlements")
/// ```
#[pyclass(name = "Orchestrator")]
pub struct PyOrchestrator {
    inner: RustOrchestrator,
}

#[pymethods]
impl PyOrchestrator {
    #[new]
    fn new(config: &Bound<'_, PyDict>) -> PyResult<Self> {
        let rust_config = parse_orchestrator_config(config)?;
        let inner = RustOrchestrator::new(rust_config)
            .map_err(|e| PyRuntimeError::new_err(format!("failed to create orchestrator: {e}")))?;
        Ok(PyOrchestrator { inner })
    }

    /// Execute one simulation tick, running every phase of the fixed
    /// tick-loop order exactly once.
    fn tick(&mut self, py: Python) -> PyResult<Py<PyDict>> {
        let result = self.inner.tick().map_err(|e| PyRuntimeError::new_err(format!("tick execution failed: {e}")))?;
        Ok(tick_result_to_py(py, &result)?.into())
    }

    fn current_tick(&self) -> usize {
        self.inner.current_tick()
    }

    fn current_day(&self) -> usize {
        self.inner.current_day()
    }

    fn total_ticks(&self) -> usize {
        self.inner.total_ticks()
    }

    // -- Agent queries --------------------------------------------------------

    fn get_agent_ids(&self) -> Vec<String> {
        self.inner.get_agent_ids().to_vec()
    }

    fn get_agent_balance(&self, agent_id: &str) -> Option<i64> {
        self.inner.get_agent_balance(agent_id)
    }

    fn get_agent_unsecured_cap(&self, agent_id: &str) -> Option<i64> {
        self.inner.get_agent_unsecured_cap(agent_id)
    }

    fn get_agent_collateral_posted(&self, agent_id: &str) -> Option<i64> {
        self.inner.get_agent_collateral_posted(agent_id)
    }

    fn get_agent_accumulated_costs(&self, py: Python, agent_id: &str) -> PyResult<Option<Py<PyDict>>> {
        let Some(costs) = self.inner.get_agent_accumulated_costs(agent_id) else { return Ok(None) };
        let dict = PyDict::new(py);
        for (kind, amount) in costs {
            dict.set_item(kind.as_str(), amount)?;
        }
        Ok(Some(dict.into()))
    }

    // -- Queue queries ---------------------------------------------------------

    fn get_queue1_size(&self, agent_id: &str) -> Option<usize> {
        self.inner.get_queue1_size(agent_id)
    }

    fn get_queue1_contents(&self, agent_id: &str) -> Option<Vec<String>> {
        self.inner.get_queue1_contents(agent_id)
    }

    fn get_queue2_size(&self) -> usize {
        self.inner.get_queue2_size()
    }

    fn get_rtgs_queue_contents(&self) -> Vec<String> {
        self.inner.get_rtgs_queue_contents()
    }

    // -- Transaction queries ----------------------------------------------------

    fn get_transaction_details(&self, py: Python, tx_id: &str) -> PyResult<Option<Py<PyDict>>> {
        let Some(tx) = self.inner.get_transaction_details(tx_id) else { return Ok(None) };
        Ok(Some(transaction_to_py(py, tx, self.inner.ticks_per_day())?.into()))
    }

    fn get_transactions_for_day(&self, py: Python, day: usize) -> PyResult<Py<PyList>> {
        let transactions = self.inner.get_transactions_for_day(day);
        let ticks_per_day = self.inner.ticks_per_day();
        let py_list = PyList::empty(py);
        for tx in transactions {
            py_list.append(transaction_to_py(py, tx, ticks_per_day)?)?;
        }
        Ok(py_list.into())
    }

    fn get_transactions_near_deadline(&self, py: Python, within_ticks: usize) -> PyResult<Py<PyList>> {
        let transactions = self.inner.get_transactions_near_deadline(within_ticks);
        let ticks_per_day = self.inner.ticks_per_day();
        let py_list = PyList::empty(py);
        for tx in transactions {
            py_list.append(transaction_to_py(py, tx, ticks_per_day)?)?;
        }
        Ok(py_list.into())
    }

    // -- Event and metrics queries ------------------------------------------------

    fn get_tick_events(&self, py: Python, tick: usize) -> PyResult<Py<PyList>> {
        let events = self.inner.get_tick_events(tick);
        let py_list = PyList::empty(py);
        for event in events {
            py_list.append(serde_json::to_string(event).map_err(|e| PyRuntimeError::new_err(e.to_string()))?)?;
        }
        Ok(py_list.into())
    }

    fn get_all_events(&self, py: Python) -> PyResult<Py<PyList>> {
        let py_list = PyList::empty(py);
        for event in self.inner.get_all_events() {
            py_list.append(serde_json::to_string(event).map_err(|e| PyRuntimeError::new_err(e.to_string()))?)?;
        }
        Ok(py_list.into())
    }

    fn get_system_metrics(&self, py: Python) -> PyResult<Py<PyDict>> {
        let metrics = self.inner.get_system_metrics();
        let dict = PyDict::new(py);
        dict.set_item("total_parent_arrivals", metrics.total_parent_arrivals)?;
        dict.set_item("total_parent_settlements", metrics.total_parent_settlements)?;
        dict.set_item("settlement_rate", metrics.settlement_rate)?;
        dict.set_item("total_events", metrics.total_events)?;
        Ok(dict.into())
    }
}
