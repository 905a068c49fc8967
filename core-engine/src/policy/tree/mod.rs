//! JSON decision-tree policy DSL.
//!
//! - `types`: wire format (`DecisionTreeDef`, `TreeNode`, `Expression`, ...).
//! - `context`: the closed field vocabulary and per-evaluation context.
//! - `interpreter`: expression/value evaluation and tree traversal.
//! - `validation`: static checks run once at construction.
//! - `schema`: the closed vocabulary exposed to external policy authors.

pub mod context;
pub mod interpreter;
pub mod schema;
pub mod types;
pub mod validation;

pub use context::{ContextError, EvalContext, FIELD_NAMES};
pub use interpreter::{evaluate_computation, evaluate_expression, evaluate_value, traverse_tree, EvalError, RegisterReader};
pub use schema::{policy_schema, PolicySchema};
pub use types::{ActionType, Computation, DecisionTreeDef, Expression, TreeKind, TreeNode, Value};
pub use validation::{validate_policy, ValidationError, ValidationResult};
