//! Static policy validation: every check that can be made before a policy
//! ever sees a transaction. Run once, at `Orchestrator::new`, against every
//! agent's policy. An invalid policy is a configuration error (fatal).

use crate::policy::tree::context::FIELD_NAMES;
use crate::policy::tree::types::{ActionType, Computation, DecisionTreeDef, Expression, TreeKind, TreeNode, Value};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub node_id: String,
    pub message: String,
}

pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// Validate every tree present in `def`. Collects every error found rather
/// than stopping at the first, so a policy author gets the whole list at
/// once.
pub fn validate_policy(def: &DecisionTreeDef) -> ValidationResult {
    let mut errors = Vec::new();
    let mut seen_node_ids = HashSet::new();

    if let Some(tree) = &def.payment_tree {
        validate_tree(tree, TreeKind::Payment, &def.parameters, &mut seen_node_ids, &mut errors);
    }
    if let Some(tree) = &def.strategic_collateral_tree {
        validate_tree(tree, TreeKind::Collateral, &def.parameters, &mut seen_node_ids, &mut errors);
    }
    if let Some(tree) = &def.end_of_tick_collateral_tree {
        validate_tree(tree, TreeKind::Collateral, &def.parameters, &mut seen_node_ids, &mut errors);
    }
    if let Some(tree) = &def.bank_tree {
        validate_tree(tree, TreeKind::Bank, &def.parameters, &mut seen_node_ids, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_tree(
    node: &TreeNode,
    kind: TreeKind,
    params: &std::collections::HashMap<String, f64>,
    seen_node_ids: &mut HashSet<String>,
    errors: &mut Vec<ValidationError>,
) {
    let node_id = node.node_id().to_string();
    if !seen_node_ids.insert(node_id.clone()) {
        errors.push(ValidationError { node_id: node_id.clone(), message: format!("duplicate node_id '{}'", node_id) });
    }

    match node {
        TreeNode::Condition { condition, on_true, on_false, .. } => {
            validate_expression(condition, &node_id, params, errors);
            validate_tree(on_true, kind, params, seen_node_ids, errors);
            validate_tree(on_false, kind, params, seen_node_ids, errors);
        }
        TreeNode::Action { action, .. } => {
            validate_action(action, kind, &node_id, params, errors);
        }
    }
}

fn validate_action(
    action: &ActionType,
    kind: TreeKind,
    node_id: &str,
    params: &std::collections::HashMap<String, f64>,
    errors: &mut Vec<ValidationError>,
) {
    let allowed = matches!(
        (kind, action),
        (TreeKind::Payment, ActionType::Release)
            | (TreeKind::Payment, ActionType::Hold)
            | (TreeKind::Payment, ActionType::Split { .. })
            | (TreeKind::Collateral, ActionType::PostCollateral { .. })
            | (TreeKind::Collateral, ActionType::ReleaseCollateral { .. })
            | (TreeKind::Collateral, ActionType::HoldCollateral)
            | (TreeKind::Bank, ActionType::SetStateRegister { .. })
            | (TreeKind::Bank, ActionType::NoOp)
    );
    if !allowed {
        errors.push(ValidationError {
            node_id: node_id.to_string(),
            message: format!("action {:?} is not permitted in a {:?} tree", action, kind),
        });
    }

    match action {
        ActionType::Split { parts } => {
            if parts.len() < 2 {
                errors.push(ValidationError { node_id: node_id.to_string(), message: "split requires at least 2 parts".into() });
            }
            if parts.iter().any(|p| *p <= 0) {
                errors.push(ValidationError { node_id: node_id.to_string(), message: "split parts must be positive".into() });
            }
        }
        ActionType::PostCollateral { amount } | ActionType::ReleaseCollateral { amount } => {
            validate_value(amount, node_id, params, errors);
        }
        ActionType::SetStateRegister { value, .. } => {
            validate_value(value, node_id, params, errors);
        }
        _ => {}
    }
}

fn validate_expression(
    expr: &Expression,
    node_id: &str,
    params: &std::collections::HashMap<String, f64>,
    errors: &mut Vec<ValidationError>,
) {
    match expr {
        Expression::Equal { left, right }
        | Expression::NotEqual { left, right }
        | Expression::LessThan { left, right }
        | Expression::LessOrEqual { left, right }
        | Expression::GreaterThan { left, right }
        | Expression::GreaterOrEqual { left, right } => {
            validate_value(left, node_id, params, errors);
            validate_value(right, node_id, params, errors);
        }
        Expression::And { conditions } | Expression::Or { conditions } => {
            for c in conditions {
                validate_expression(c, node_id, params, errors);
            }
        }
        Expression::Not { condition } => validate_expression(condition, node_id, params, errors),
    }
}

fn validate_value(
    value: &Value,
    node_id: &str,
    params: &std::collections::HashMap<String, f64>,
    errors: &mut Vec<ValidationError>,
) {
    match value {
        Value::Field { field } => {
            if !FIELD_NAMES.contains(&field.as_str()) {
                errors.push(ValidationError { node_id: node_id.to_string(), message: format!("unknown field '{}'", field) });
            }
        }
        Value::Param { param } => {
            if !params.contains_key(param) {
                errors.push(ValidationError { node_id: node_id.to_string(), message: format!("undeclared parameter '{}'", param) });
            }
        }
        Value::Register { .. } | Value::Literal { .. } => {}
        Value::Compute { compute } => validate_computation(compute, node_id, params, errors),
    }
}

fn validate_computation(
    computation: &Computation,
    node_id: &str,
    params: &std::collections::HashMap<String, f64>,
    errors: &mut Vec<ValidationError>,
) {
    let (l, r) = match computation {
        Computation::Add { left, right }
        | Computation::Subtract { left, right }
        | Computation::Multiply { left, right }
        | Computation::Divide { left, right }
        | Computation::Min { left, right }
        | Computation::Max { left, right } => (left, right),
    };
    validate_value(l, node_id, params, errors);
    validate_value(r, node_id, params, errors);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn action(node_id: &str, action: ActionType) -> TreeNode {
        TreeNode::Action { node_id: node_id.into(), action, parameters: Map::new() }
    }

    #[test]
    fn duplicate_node_ids_are_rejected() {
        let def = DecisionTreeDef {
            version: "1.0".into(),
            policy_id: "p".into(),
            description: None,
            payment_tree: Some(TreeNode::Condition {
                node_id: "N1".into(),
                description: String::new(),
                condition: Expression::Equal { left: Value::Literal { value: 1.0 }, right: Value::Literal { value: 1.0 } },
                on_true: Box::new(action("N1", ActionType::Release)),
                on_false: Box::new(action("A2", ActionType::Hold)),
            }),
            strategic_collateral_tree: None,
            end_of_tick_collateral_tree: None,
            bank_tree: None,
            parameters: Map::new(),
        };
        let errors = validate_policy(&def).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("duplicate node_id")));
    }

    #[test]
    fn action_forbidden_in_tree_kind_is_rejected() {
        let def = DecisionTreeDef {
            version: "1.0".into(),
            policy_id: "p".into(),
            description: None,
            payment_tree: Some(action("A1", ActionType::PostCollateral { amount: Value::Literal { value: 1.0 } })),
            strategic_collateral_tree: None,
            end_of_tick_collateral_tree: None,
            bank_tree: None,
            parameters: Map::new(),
        };
        let errors = validate_policy(&def).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("not permitted")));
    }

    #[test]
    fn unknown_field_reference_is_rejected() {
        let def = DecisionTreeDef {
            version: "1.0".into(),
            policy_id: "p".into(),
            description: None,
            payment_tree: Some(TreeNode::Condition {
                node_id: "N1".into(),
                description: String::new(),
                condition: Expression::GreaterThan { left: Value::Field { field: "not_a_real_field".into() }, right: Value::Literal { value: 0.0 } },
                on_true: Box::new(action("A1", ActionType::Release)),
                on_false: Box::new(action("A2", ActionType::Hold)),
            }),
            strategic_collateral_tree: None,
            end_of_tick_collateral_tree: None,
            bank_tree: None,
            parameters: Map::new(),
        };
        let errors = validate_policy(&def).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("unknown field")));
    }

    #[test]
    fn valid_policy_passes() {
        let mut parameters = Map::new();
        parameters.insert("threshold".to_string(), 100.0);
        let def = DecisionTreeDef {
            version: "1.0".into(),
            policy_id: "p".into(),
            description: None,
            payment_tree: Some(TreeNode::Condition {
                node_id: "N1".into(),
                description: String::new(),
                condition: Expression::GreaterThan { left: Value::Field { field: "balance".into() }, right: Value::Param { param: "threshold".into() } },
                on_true: Box::new(action("A1", ActionType::Release)),
                on_false: Box::new(action("A2", ActionType::Hold)),
            }),
            strategic_collateral_tree: None,
            end_of_tick_collateral_tree: None,
            bank_tree: None,
            parameters,
        };
        assert!(validate_policy(&def).is_ok());
    }
}
