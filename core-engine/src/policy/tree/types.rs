//! Decision tree wire format: the JSON-shaped DSL a policy is authored in.
//!
//! A tree is a plain Rust tree (`Box` children), not a graph keyed by
//! `node_id` — so structural cycles are impossible by construction. The
//! `node_id` on every node exists purely for diagnostics and validation
//! provenance, never for traversal.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One agent's full policy: up to four independent trees plus named
/// parameters shared by all of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTreeDef {
    pub version: String,
    pub policy_id: String,
    #[serde(default)]
    pub description: Option<String>,

    /// Required in practice (an agent with no payment tree can never release
    /// anything) but optional at the type level so collateral-only fixtures
    /// can omit it.
    #[serde(default)]
    pub payment_tree: Option<TreeNode>,

    /// Evaluated once, at tick 0.
    #[serde(default)]
    pub strategic_collateral_tree: Option<TreeNode>,

    /// Evaluated every tick, after the settlement pipeline.
    #[serde(default)]
    pub end_of_tick_collateral_tree: Option<TreeNode>,

    /// Agent-level, per-tick, independent of any single transaction.
    #[serde(default)]
    pub bank_tree: Option<TreeNode>,

    #[serde(default)]
    pub parameters: HashMap<String, f64>,
}

/// Which of the four trees a node belongs to, for action-set validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeKind {
    Payment,
    Collateral,
    Bank,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TreeNode {
    Condition {
        node_id: String,
        #[serde(default)]
        description: String,
        condition: Expression,
        on_true: Box<TreeNode>,
        on_false: Box<TreeNode>,
    },
    Action {
        node_id: String,
        action: ActionType,
        #[serde(default)]
        parameters: HashMap<String, Value>,
    },
}

impl TreeNode {
    pub fn node_id(&self) -> &str {
        match self {
            TreeNode::Condition { node_id, .. } => node_id,
            TreeNode::Action { node_id, .. } => node_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum Expression {
    #[serde(rename = "==")]
    Equal { left: Value, right: Value },
    #[serde(rename = "!=")]
    NotEqual { left: Value, right: Value },
    #[serde(rename = "<")]
    LessThan { left: Value, right: Value },
    #[serde(rename = "<=")]
    LessOrEqual { left: Value, right: Value },
    #[serde(rename = ">")]
    GreaterThan { left: Value, right: Value },
    #[serde(rename = ">=")]
    GreaterOrEqual { left: Value, right: Value },
    #[serde(rename = "and")]
    And { conditions: Vec<Expression> },
    #[serde(rename = "or")]
    Or { conditions: Vec<Expression> },
    #[serde(rename = "not")]
    Not { condition: Box<Expression> },
}

/// An operand: a context field, a named parameter, a literal, a state
/// register, or a nested arithmetic computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Field { field: String },
    Param { param: String },
    Register { register: String },
    Literal { value: f64 },
    Compute { compute: Box<Computation> },
}

/// `{op, left, right}` arithmetic. Division by zero evaluates to 0, per
/// the policy evaluator being total (never faults on bad runtime input).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum Computation {
    #[serde(rename = "+")]
    Add { left: Value, right: Value },
    #[serde(rename = "-")]
    Subtract { left: Value, right: Value },
    #[serde(rename = "*")]
    Multiply { left: Value, right: Value },
    #[serde(rename = "/")]
    Divide { left: Value, right: Value },
    #[serde(rename = "min")]
    Min { left: Value, right: Value },
    #[serde(rename = "max")]
    Max { left: Value, right: Value },
}

/// The closed action vocabulary. Which variants are legal in which tree
/// kind is enforced by [`crate::policy::tree::validation`], not by the
/// type system, so one enum can flow through all three tree kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionType {
    /// payment_tree: submit the transaction in full.
    Release,
    /// payment_tree: leave the transaction in Q1 this tick.
    Hold,
    /// payment_tree: split into the listed part amounts (cents), each a
    /// positive integer; parts must sum to the remaining amount.
    Split { parts: Vec<i64> },
    /// strategic_collateral_tree / end_of_tick_collateral_tree.
    PostCollateral { amount: Value },
    /// strategic_collateral_tree / end_of_tick_collateral_tree.
    ReleaseCollateral { amount: Value },
    /// strategic_collateral_tree / end_of_tick_collateral_tree.
    HoldCollateral,
    /// bank_tree: set a state register to an explicit value.
    SetStateRegister { key: String, value: Value },
    /// bank_tree: take no action.
    NoOp,
}
