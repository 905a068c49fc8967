//! Tree evaluation: resolve operands, evaluate conditions, and walk a tree
//! to its terminal action node. Traversal is iterative (a `while let` loop
//! over `&TreeNode`, not recursive) so a pathological policy cannot blow
//! the stack — see the design note on stack-allocated evaluation.

use crate::policy::tree::context::{ContextError, EvalContext};
use crate::policy::tree::types::{Computation, Expression, TreeNode, Value};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum EvalError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error("unknown policy parameter '{0}'")]
    UnknownParameter(String),
    #[error("unknown state register '{0}'")]
    UnknownRegister(String),
}

/// Read-only register access during evaluation. A missing register reads
/// as 0.0 — registers are an open, agent-declared mapping (§3), so
/// referencing one that hasn't been set yet is routine, not an error.
pub trait RegisterReader {
    fn get_register(&self, name: &str) -> Option<f64>;
}

pub fn evaluate_value(
    value: &Value,
    ctx: &EvalContext,
    params: &HashMap<String, f64>,
    registers: &dyn RegisterReader,
) -> Result<f64, EvalError> {
    match value {
        Value::Field { field } => Ok(ctx.get_field(field)?),
        Value::Param { param } => params
            .get(param)
            .copied()
            .ok_or_else(|| EvalError::UnknownParameter(param.clone())),
        Value::Register { register } => Ok(registers.get_register(register).unwrap_or(0.0)),
        Value::Literal { value } => Ok(*value),
        Value::Compute { compute } => evaluate_computation(compute, ctx, params, registers),
    }
}

pub fn evaluate_computation(
    computation: &Computation,
    ctx: &EvalContext,
    params: &HashMap<String, f64>,
    registers: &dyn RegisterReader,
) -> Result<f64, EvalError> {
    let pair = |l: &Value, r: &Value| -> Result<(f64, f64), EvalError> {
        Ok((
            evaluate_value(l, ctx, params, registers)?,
            evaluate_value(r, ctx, params, registers)?,
        ))
    };
    match computation {
        Computation::Add { left, right } => {
            let (l, r) = pair(left, right)?;
            Ok(l + r)
        }
        Computation::Subtract { left, right } => {
            let (l, r) = pair(left, right)?;
            Ok(l - r)
        }
        Computation::Multiply { left, right } => {
            let (l, r) = pair(left, right)?;
            Ok(l * r)
        }
        Computation::Divide { left, right } => {
            let (l, r) = pair(left, right)?;
            if r == 0.0 {
                Ok(0.0)
            } else {
                Ok(l / r)
            }
        }
        Computation::Min { left, right } => {
            let (l, r) = pair(left, right)?;
            Ok(l.min(r))
        }
        Computation::Max { left, right } => {
            let (l, r) = pair(left, right)?;
            Ok(l.max(r))
        }
    }
}

pub fn evaluate_expression(
    expr: &Expression,
    ctx: &EvalContext,
    params: &HashMap<String, f64>,
    registers: &dyn RegisterReader,
) -> Result<bool, EvalError> {
    const EPS: f64 = 1e-9;
    let pair = |l: &Value, r: &Value| -> Result<(f64, f64), EvalError> {
        Ok((
            evaluate_value(l, ctx, params, registers)?,
            evaluate_value(r, ctx, params, registers)?,
        ))
    };
    Ok(match expr {
        Expression::Equal { left, right } => {
            let (l, r) = pair(left, right)?;
            (l - r).abs() < EPS
        }
        Expression::NotEqual { left, right } => {
            let (l, r) = pair(left, right)?;
            (l - r).abs() >= EPS
        }
        Expression::LessThan { left, right } => {
            let (l, r) = pair(left, right)?;
            l < r
        }
        Expression::LessOrEqual { left, right } => {
            let (l, r) = pair(left, right)?;
            l <= r
        }
        Expression::GreaterThan { left, right } => {
            let (l, r) = pair(left, right)?;
            l > r
        }
        Expression::GreaterOrEqual { left, right } => {
            let (l, r) = pair(left, right)?;
            l >= r
        }
        Expression::And { conditions } => {
            for c in conditions {
                if !evaluate_expression(c, ctx, params, registers)? {
                    return Ok(false);
                }
            }
            true
        }
        Expression::Or { conditions } => {
            for c in conditions {
                if evaluate_expression(c, ctx, params, registers)? {
                    return Ok(true);
                }
            }
            false
        }
        Expression::Not { condition } => !evaluate_expression(condition, ctx, params, registers)?,
    })
}

/// Walk `root` to its terminal action node, returning that node. Iterative:
/// each step re-binds a `&TreeNode` reference, so there is no recursion
/// depth tied to tree depth.
pub fn traverse_tree<'a>(
    root: &'a TreeNode,
    ctx: &EvalContext,
    params: &HashMap<String, f64>,
    registers: &dyn RegisterReader,
) -> Result<&'a TreeNode, EvalError> {
    let mut node = root;
    loop {
        match node {
            TreeNode::Action { .. } => return Ok(node),
            TreeNode::Condition { condition, on_true, on_false, .. } => {
                node = if evaluate_expression(condition, ctx, params, registers)? {
                    on_true
                } else {
                    on_false
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::tree::types::ActionType;

    struct NoRegisters;
    impl RegisterReader for NoRegisters {
        fn get_register(&self, _name: &str) -> Option<f64> {
            None
        }
    }

    fn ctx_with(fields: &[(&str, f64)]) -> EvalContext {
        use crate::models::{Agent, SimulationState, Transaction};
        let agent = Agent::new("A".into(), fields.iter().find(|(k, _)| *k == "balance").map(|(_, v)| *v as i64).unwrap_or(0), 0);
        let state = SimulationState::new(vec![agent.clone()]);
        let tx = Transaction::new("A".into(), "B".into(), fields.iter().find(|(k, _)| *k == "amount").map(|(_, v)| *v as i64).unwrap_or(1), 0, 10);
        EvalContext::for_transaction(&tx, &agent, &state, 0, 10)
    }

    #[test]
    fn division_by_zero_evaluates_to_zero() {
        let ctx = ctx_with(&[]);
        let params = HashMap::new();
        let comp = Computation::Divide {
            left: Value::Literal { value: 5.0 },
            right: Value::Literal { value: 0.0 },
        };
        assert_eq!(evaluate_computation(&comp, &ctx, &params, &NoRegisters).unwrap(), 0.0);
    }

    #[test]
    fn traverse_picks_on_true_branch() {
        let ctx = ctx_with(&[("balance", 1_000.0)]);
        let params = HashMap::new();
        let tree = TreeNode::Condition {
            node_id: "N1".into(),
            description: String::new(),
            condition: Expression::GreaterThan {
                left: Value::Field { field: "balance".into() },
                right: Value::Literal { value: 0.0 },
            },
            on_true: Box::new(TreeNode::Action {
                node_id: "A1".into(),
                action: ActionType::Release,
                parameters: HashMap::new(),
            }),
            on_false: Box::new(TreeNode::Action {
                node_id: "A2".into(),
                action: ActionType::Hold,
                parameters: HashMap::new(),
            }),
        };
        let result = traverse_tree(&tree, &ctx, &params, &NoRegisters).unwrap();
        assert_eq!(result.node_id(), "A1");
    }

    #[test]
    fn and_short_circuits() {
        let ctx = ctx_with(&[]);
        let params = HashMap::new();
        let expr = Expression::And {
            conditions: vec![
                Expression::Equal { left: Value::Literal { value: 1.0 }, right: Value::Literal { value: 2.0 } },
                Expression::Equal { left: Value::Param { param: "missing".into() }, right: Value::Literal { value: 0.0 } },
            ],
        };
        // Second condition references an undefined param; short-circuit on the
        // first false condition must prevent us from ever evaluating it.
        assert_eq!(evaluate_expression(&expr, &ctx, &params, &NoRegisters).unwrap(), false);
    }
}
