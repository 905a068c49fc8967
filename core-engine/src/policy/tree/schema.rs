//! The closed vocabulary a policy author (or a validating UI) needs before
//! writing a tree: field names, and which actions are legal in which tree.
//! Exposed to the PyO3 boundary via `py_get_policy_schema`.

use crate::policy::tree::context::FIELD_NAMES;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct PolicySchema {
    pub fields: Vec<&'static str>,
    pub payment_actions: Vec<&'static str>,
    pub collateral_actions: Vec<&'static str>,
    pub bank_actions: Vec<&'static str>,
    pub comparison_ops: Vec<&'static str>,
    pub compute_ops: Vec<&'static str>,
}

pub fn policy_schema() -> PolicySchema {
    PolicySchema {
        fields: FIELD_NAMES.to_vec(),
        payment_actions: vec!["release", "hold", "split"],
        collateral_actions: vec!["post_collateral", "release_collateral", "hold_collateral"],
        bank_actions: vec!["set_state_register", "no_op"],
        comparison_ops: vec!["==", "!=", "<", "<=", ">", ">="],
        compute_ops: vec!["+", "-", "*", "/", "min", "max"],
    }
}
