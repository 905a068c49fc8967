//! Orchestrator - main simulation loop
//!
//! Implements the complete tick loop integrating all simulation components.
//!
//! See `engine.rs` for full implementation.

pub mod engine;

pub use engine::{
    AgentConfig, ConfigError, EngineError, EscalationCurve, Orchestrator, OrchestratorConfig,
    PriorityEscalationConfig, ScriptedArrival, SystemMetrics, TickResult,
};
pub use crate::costs::CostRates;
pub use crate::policy::PolicyConfig;
