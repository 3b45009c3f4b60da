//! `${...}` interpolation.
//!
//! Best-effort substitution of `var.<name>`, `local.<name>`, `loop.<field>`,
//! and `<step>.<output>` references inside strings. Unresolved references
//! keep their literal placeholder so whatever consumes the string downstream
//! can show why a reference failed.

use crate::resolver::EvalContext;
use serde_json::Value;

/// Substitute every `${...}` region in a string.
pub fn interpolate(input: &str, ctx: &EvalContext) -> String {
    let mut output = String::new();
    let mut remaining = input;

    while let Some(start) = remaining.find("${") {
        let (before, after) = remaining.split_at(start);
        output.push_str(before);

        let Some(end) = after.find('}') else {
            // Unterminated marker: keep the rest verbatim.
            output.push_str(after);
            return output;
        };
        let expression = after[2..end].trim();
        match resolve_reference(expression, ctx) {
            Some(value) => output.push_str(&stringify(&value)),
            None => output.push_str(&after[..end + 1]),
        }
        remaining = &after[end + 1..];
    }

    output.push_str(remaining);
    output
}

/// When the whole string is a single `${...}` reference, return its typed
/// value instead of a stringified form.
pub fn interpolate_whole(input: &str, ctx: &EvalContext) -> Option<Value> {
    let trimmed = input.trim();
    let inner = trimmed.strip_prefix("${")?.strip_suffix('}')?;
    if inner.contains("${") {
        return None;
    }
    resolve_reference(inner.trim(), ctx)
}

/// Resolve one reference expression against the context.
pub fn resolve_reference(expression: &str, ctx: &EvalContext) -> Option<Value> {
    if let Some(rest) = expression.strip_prefix("var.") {
        return navigate(&Value::Object(ctx.variables.clone()), rest);
    }
    if let Some(rest) = expression.strip_prefix("local.") {
        return navigate(&Value::Object(ctx.locals.clone()), rest);
    }
    if let Some(binding) = &ctx.loop_binding {
        if expression == "loop" || expression.starts_with("loop.") {
            let rest = expression.strip_prefix("loop").unwrap().trim_start_matches('.');
            return navigate(&binding.as_value(), rest);
        }
        if expression == binding.variable {
            return Some(binding.element.clone());
        }
        if let Some(rest) = expression.strip_prefix(&format!("{}.", binding.variable)) {
            return navigate(&binding.element, rest);
        }
    }

    // `<step>.<output>` with an optional `outputs` segment for clarity.
    let (step, rest) = expression.split_once('.')?;
    let outputs = ctx.steps.get(step)?;
    let rest = rest.strip_prefix("outputs.").unwrap_or(rest);
    navigate(&Value::Object(outputs.clone()), rest)
}

/// Walk a dot path with optional numeric segments into a value tree.
fn navigate(root: &Value, path: &str) -> Option<Value> {
    if path.is_empty() {
        return Some(root.clone());
    }
    let mut current = root;
    for segment in path.split('.') {
        match current {
            Value::Object(map) => current = map.get(segment)?,
            Value::Array(items) => {
                let index: usize = segment.parse().ok()?;
                current = items.get(index)?;
            }
            _ => return None,
        }
    }
    Some(current.clone())
}

/// String form used when splicing values into text.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Recover typed values from interpolated strings: booleans, integers, and
/// floats arrive at plugins as their natural types.
pub fn infer_type(input: &str) -> Value {
    match input {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(integer) = input.parse::<i64>() {
        return Value::from(integer);
    }
    if input.contains('.')
        && let Ok(float) = input.parse::<f64>()
        && let Some(number) = serde_json::Number::from_f64(float)
    {
        return Value::Number(number);
    }
    Value::String(input.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn sample_context() -> EvalContext {
        let mut ctx = EvalContext::default();
        ctx.variables.insert("env".into(), json!("staging"));
        ctx.variables.insert("count".into(), json!(3));
        ctx.locals.insert("region".into(), json!("us-east"));
        let mut outputs = HashMap::new();
        outputs.insert("id".to_string(), json!("app-1"));
        outputs.insert("meta".to_string(), json!({"owner": "core"}));
        ctx.insert_step_outputs("create", &outputs);
        ctx
    }

    #[test]
    fn substitutes_variables_locals_and_step_outputs() {
        let ctx = sample_context();
        assert_eq!(
            interpolate("deploy ${var.env} in ${local.region} for ${create.id}", &ctx),
            "deploy staging in us-east for app-1"
        );
        assert_eq!(interpolate("${create.outputs.id}", &ctx), "app-1");
        assert_eq!(interpolate("${create.meta.owner}", &ctx), "core");
    }

    #[test]
    fn unresolved_references_keep_their_placeholder() {
        let ctx = sample_context();
        assert_eq!(interpolate("value: ${var.missing}", &ctx), "value: ${var.missing}");
        assert_eq!(interpolate("value: ${nope.out}", &ctx), "value: ${nope.out}");
    }

    #[test]
    fn unterminated_marker_is_preserved() {
        let ctx = sample_context();
        assert_eq!(interpolate("broken ${var.env", &ctx), "broken ${var.env");
    }

    #[test]
    fn whole_reference_stays_typed() {
        let ctx = sample_context();
        assert_eq!(interpolate_whole("${var.count}", &ctx), Some(json!(3)));
        assert_eq!(interpolate_whole("${create.meta}", &ctx), Some(json!({"owner": "core"})));
        assert_eq!(interpolate_whole("count is ${var.count}", &ctx), None);
    }

    #[test]
    fn loop_bindings_resolve() {
        let ctx = sample_context().with_loop("item", json!("b"), 1, 3);
        assert_eq!(interpolate("element ${item} at ${loop.index}", &ctx), "element b at 1");
        assert_eq!(interpolate("${loop.first}", &ctx), "false");
    }

    #[test]
    fn type_inference_recovers_scalars() {
        assert_eq!(infer_type("true"), json!(true));
        assert_eq!(infer_type("false"), json!(false));
        assert_eq!(infer_type("42"), json!(42));
        assert_eq!(infer_type("-7"), json!(-7));
        assert_eq!(infer_type("2.5"), json!(2.5));
        assert_eq!(infer_type("hello"), json!("hello"));
        assert_eq!(infer_type(""), json!(""));
    }
}
