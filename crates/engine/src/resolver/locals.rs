//! Fixed-point resolution of locals and deferred variable defaults.
//!
//! Each pass resolves every still-pending entry against the current context
//! and commits those whose result no longer carries a template marker.
//! Passes repeat until nothing changes or the iteration cap is reached, then
//! a few extra passes re-resolve markers buried inside complex values.
//! Entries that never resolve keep their source text.

use crate::resolver::template::{contains_marker, resolve_value};
use crate::resolver::EvalContext;
use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

/// Scalar passes before giving up on cross-references.
const SCALAR_PASSES: usize = 10;
/// Extra passes for markers inside complex values.
const COMPLEX_PASSES: usize = 3;

/// Where a pending entry commits once resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Variable,
    Local,
}

/// Resolve pending entries into the context by fixed point.
///
/// Scalars arrive as `Value::String` holding their source text; complex
/// defaults arrive as value trees with template text at the leaves.
pub fn resolve_fixed_point(pending: Vec<(String, Value, Binding)>, ctx: &mut EvalContext) {
    let mut pending: IndexMap<String, (Value, Binding)> = pending
        .into_iter()
        .map(|(name, value, binding)| (name, (value, binding)))
        .collect();

    for pass in 0..SCALAR_PASSES {
        if pending.is_empty() {
            break;
        }
        let mut progressed = false;
        let keys: Vec<String> = pending.keys().cloned().collect();
        for key in keys {
            let (raw, binding) = pending[&key].clone();
            let resolved = resolve_value(&raw, ctx);
            if !value_has_marker(&resolved) {
                commit(ctx, &key, resolved, binding);
                pending.shift_remove(&key);
                progressed = true;
            }
        }
        if !progressed {
            debug!(pass, remaining = pending.len(), "locals fixed point stalled");
            break;
        }
    }

    // Anything left keeps its source text.
    for (key, (raw, binding)) in pending {
        commit(ctx, &key, raw, binding);
    }

    // Re-resolve markers that only became resolvable after commits, e.g.
    // inside objects and lists.
    for _ in 0..COMPLEX_PASSES {
        let mut changed = false;
        let local_keys: Vec<String> = ctx.locals.keys().cloned().collect();
        for key in local_keys {
            let current = ctx.locals[&key].clone();
            if value_has_marker(&current) {
                let resolved = resolve_value(&current, ctx);
                if resolved != current {
                    ctx.locals.insert(key, resolved);
                    changed = true;
                }
            }
        }
        let variable_keys: Vec<String> = ctx.variables.keys().cloned().collect();
        for key in variable_keys {
            let current = ctx.variables[&key].clone();
            if value_has_marker(&current) {
                let resolved = resolve_value(&current, ctx);
                if resolved != current {
                    ctx.variables.insert(key, resolved);
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }
}

fn commit(ctx: &mut EvalContext, name: &str, value: Value, binding: Binding) {
    match binding {
        Binding::Variable => ctx.variables.insert(name.to_string(), value),
        Binding::Local => ctx.locals.insert(name.to_string(), value),
    };
}

/// Whether any string in the tree still carries a template marker.
pub fn value_has_marker(value: &Value) -> bool {
    match value {
        Value::String(text) => contains_marker(text),
        Value::Array(items) => items.iter().any(value_has_marker),
        Value::Object(map) => map.values().any(value_has_marker),
        _ => false,
    }
}
