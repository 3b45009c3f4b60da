//! Template and expression resolution.
//!
//! Three grammars share one context and one value domain:
//!
//! 1. `${...}` interpolation: best-effort substitution inside strings;
//!    unresolved references keep their placeholder.
//! 2. `{{...}}` templates: expressions over `variables`, `locals`, `steps`,
//!    and `workflow` with the template function set.
//! 3. HCL expressions: `condition` and `loop.over` with `var.*`,
//!    `step.*.outputs.*`, and the condition function set.

mod context;
pub mod expr;
pub mod funcs;
pub mod interpolate;
pub mod locals;
pub mod template;

pub use context::{EvalContext, LoopBinding};
pub use expr::{eval_condition, evaluate_sequence, ExprError, ScopeMode};
pub use interpolate::{infer_type, interpolate};
pub use template::{resolve_param, resolve_value};
