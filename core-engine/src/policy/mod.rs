//! Policy evaluation: turn a per-agent decision tree into a concrete action
//! against a transaction or the agent itself. Evaluation is pure and total —
//! it reads `Agent`/`Transaction`/`SimulationState` and a tick, and returns
//! a value; it never mutates anything. Applying the resulting action is the
//! settlement pipeline's and cost engine's job, not the evaluator's.

pub mod tree;

use crate::models::{Agent, SimulationState, Transaction};
use std::collections::HashMap;
use tree::{evaluate_value, traverse_tree, ActionType, DecisionTreeDef, EvalContext, EvalError, RegisterReader, TreeNode};

impl RegisterReader for Agent {
    fn get_register(&self, name: &str) -> Option<f64> {
        Agent::get_register(self, name)
    }
}

/// A fully loaded, validated policy for one agent.
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    pub def: DecisionTreeDef,
}

impl PolicyConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let def: DecisionTreeDef = serde_json::from_str(json)?;
        Ok(Self { def })
    }

    pub fn validate(&self) -> tree::ValidationResult {
        tree::validate_policy(&self.def)
    }
}

/// Outcome of evaluating `payment_tree` against a single transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentAction {
    Release,
    Hold,
    Split(Vec<i64>),
}

/// Outcome of evaluating a collateral tree (strategic or end-of-tick).
#[derive(Debug, Clone, PartialEq)]
pub enum CollateralAction {
    Post(i64),
    Release(i64),
    Hold,
}

/// Outcome of evaluating `bank_tree`.
#[derive(Debug, Clone, PartialEq)]
pub enum BankAction {
    SetRegister(String, f64),
    NoOp,
}

pub fn evaluate_payment_tree(
    tree: &TreeNode,
    tx: &Transaction,
    agent: &Agent,
    state: &SimulationState,
    tick: usize,
    ticks_per_day: usize,
    params: &HashMap<String, f64>,
) -> Result<PaymentAction, EvalError> {
    let ctx = EvalContext::for_transaction(tx, agent, state, tick, ticks_per_day);
    let node = traverse_tree(tree, &ctx, params, agent)?;
    match node {
        TreeNode::Action { action: ActionType::Release, .. } => Ok(PaymentAction::Release),
        TreeNode::Action { action: ActionType::Hold, .. } => Ok(PaymentAction::Hold),
        TreeNode::Action { action: ActionType::Split { parts }, .. } => Ok(PaymentAction::Split(parts.clone())),
        _ => unreachable!("validate_policy rejects non-payment actions in payment_tree"),
    }
}

pub fn evaluate_collateral_tree(
    tree: &TreeNode,
    agent: &Agent,
    state: &SimulationState,
    tick: usize,
    ticks_per_day: usize,
    params: &HashMap<String, f64>,
) -> Result<CollateralAction, EvalError> {
    let ctx = EvalContext::for_agent(agent, state, tick, ticks_per_day);
    let node = traverse_tree(tree, &ctx, params, agent)?;
    match node {
        TreeNode::Action { action: ActionType::PostCollateral { amount }, .. } => {
            let n = evaluate_value(amount, &ctx, params, agent)?;
            Ok(CollateralAction::Post(n.round() as i64))
        }
        TreeNode::Action { action: ActionType::ReleaseCollateral { amount }, .. } => {
            let n = evaluate_value(amount, &ctx, params, agent)?;
            Ok(CollateralAction::Release(n.round() as i64))
        }
        TreeNode::Action { action: ActionType::HoldCollateral, .. } => Ok(CollateralAction::Hold),
        _ => unreachable!("validate_policy rejects non-collateral actions in a collateral tree"),
    }
}

pub fn evaluate_bank_tree(
    tree: &TreeNode,
    agent: &Agent,
    state: &SimulationState,
    tick: usize,
    ticks_per_day: usize,
    params: &HashMap<String, f64>,
) -> Result<BankAction, EvalError> {
    let ctx = EvalContext::for_agent(agent, state, tick, ticks_per_day);
    let node = traverse_tree(tree, &ctx, params, agent)?;
    match node {
        TreeNode::Action { action: ActionType::SetStateRegister { key, value }, .. } => {
            let n = evaluate_value(value, &ctx, params, agent)?;
            Ok(BankAction::SetRegister(key.clone(), n))
        }
        TreeNode::Action { action: ActionType::NoOp, .. } => Ok(BankAction::NoOp),
        _ => unreachable!("validate_policy rejects non-bank actions in bank_tree"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tree::{Expression, Value};

    fn fifo_tree() -> TreeNode {
        TreeNode::Action { node_id: "A1".into(), action: ActionType::Release, parameters: HashMap::new() }
    }

    #[test]
    fn payment_tree_release_action() {
        let agent = Agent::new("A".into(), 1_000, 0);
        let state = SimulationState::new(vec![agent.clone()]);
        let tx = Transaction::new("A".into(), "B".into(), 100, 0, 10);
        let action = evaluate_payment_tree(&fifo_tree(), &tx, &agent, &state, 0, 10, &HashMap::new()).unwrap();
        assert_eq!(action, PaymentAction::Release);
    }

    #[test]
    fn payment_tree_holds_when_balance_insufficient() {
        let tree = TreeNode::Condition {
            node_id: "N1".into(),
            description: String::new(),
            condition: Expression::GreaterOrEqual { left: Value::Field { field: "balance".into() }, right: Value::Field { field: "amount".into() } },
            on_true: Box::new(TreeNode::Action { node_id: "A1".into(), action: ActionType::Release, parameters: HashMap::new() }),
            on_false: Box::new(TreeNode::Action { node_id: "A2".into(), action: ActionType::Hold, parameters: HashMap::new() }),
        };
        let agent = Agent::new("A".into(), 50, 0);
        let state = SimulationState::new(vec![agent.clone()]);
        let tx = Transaction::new("A".into(), "B".into(), 100, 0, 10);
        let action = evaluate_payment_tree(&tree, &tx, &agent, &state, 0, 10, &HashMap::new()).unwrap();
        assert_eq!(action, PaymentAction::Hold);
    }

    #[test]
    fn collateral_tree_post_amount_from_parameter() {
        let mut params = HashMap::new();
        params.insert("post_amount".to_string(), 500.0);
        let tree = TreeNode::Action {
            node_id: "C1".into(),
            action: ActionType::PostCollateral { amount: Value::Param { param: "post_amount".into() } },
            parameters: HashMap::new(),
        };
        let agent = Agent::new("A".into(), 1_000, 0);
        let state = SimulationState::new(vec![agent.clone()]);
        let action = evaluate_collateral_tree(&tree, &agent, &state, 0, 10, &params).unwrap();
        assert_eq!(action, CollateralAction::Post(500));
    }

    #[test]
    fn bank_tree_set_register() {
        let tree = TreeNode::Action {
            node_id: "B1".into(),
            action: ActionType::SetStateRegister { key: "cooldown".into(), value: Value::Literal { value: 3.0 } },
            parameters: HashMap::new(),
        };
        let agent = Agent::new("A".into(), 0, 0);
        let state = SimulationState::new(vec![agent.clone()]);
        let action = evaluate_bank_tree(&tree, &agent, &state, 0, 10, &HashMap::new()).unwrap();
        assert_eq!(action, BankAction::SetRegister("cooldown".into(), 3.0));
    }
}
