//! `{{...}}` template resolution.
//!
//! Each delimited region holds one expression evaluated in the template
//! scope (`variables`, `locals`, `steps`, `workflow`) with the template
//! function set. Regions that fail to parse or evaluate keep their source
//! text, which is what the locals fixed point keys on.

use crate::resolver::expr::{evaluate, ScopeMode};
use crate::resolver::interpolate::{infer_type, interpolate, interpolate_whole, stringify};
use crate::resolver::EvalContext;
use serde_json::Value;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Whether a string still carries unresolved template or interpolation
/// markers.
pub fn contains_marker(input: &str) -> bool {
    input.contains(OPEN) || input.contains("${")
}

/// Substitute every `{{...}}` region in a string.
pub fn resolve_string(input: &str, ctx: &EvalContext) -> String {
    let mut output = String::new();
    let mut remaining = input;

    while let Some(start) = remaining.find(OPEN) {
        let (before, after) = remaining.split_at(start);
        output.push_str(before);

        let Some(end) = after.find(CLOSE) else {
            output.push_str(after);
            return output;
        };
        let region = &after[..end + CLOSE.len()];
        let expression = after[OPEN.len()..end].trim();
        match evaluate(expression, ctx, ScopeMode::Template) {
            Ok(value) => output.push_str(&stringify(&value)),
            Err(_) => output.push_str(region),
        }
        remaining = &after[end + CLOSE.len()..];
    }

    output.push_str(remaining);
    output
}

/// When the whole string is one `{{...}}` region, return the typed value.
pub fn resolve_whole(input: &str, ctx: &EvalContext) -> Option<Value> {
    let trimmed = input.trim();
    let inner = trimmed.strip_prefix(OPEN)?.strip_suffix(CLOSE)?;
    if inner.contains(OPEN) {
        return None;
    }
    evaluate(inner.trim(), ctx, ScopeMode::Template).ok()
}

/// Resolve one templated parameter string to its final typed value:
/// templates first, then `${...}` interpolation, then type inference.
pub fn resolve_param(raw: &str, ctx: &EvalContext) -> Value {
    if let Some(value) = resolve_whole(raw, ctx) {
        return value;
    }
    if let Some(value) = interpolate_whole(raw, ctx) {
        return value;
    }
    let substituted = resolve_string(raw, ctx);
    let substituted = interpolate(&substituted, ctx);
    infer_type(&substituted)
}

/// Resolve templates across a value tree, recursing into mappings and
/// sequences.
pub fn resolve_value(value: &Value, ctx: &EvalContext) -> Value {
    match value {
        Value::String(text) => resolve_param(text, ctx),
        Value::Array(items) => Value::Array(items.iter().map(|item| resolve_value(item, ctx)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| (key.clone(), resolve_value(item, ctx)))
                .collect(),
        ),
        other => other.clone(),
    }
}
