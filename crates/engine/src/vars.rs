//! Variable merge: defaults, overrides, validation, sensitivity.

use crate::error::EngineError;
use crate::model::Workflow;
use crate::parser;
use crate::resolver::interpolate::stringify;
use crate::resolver::locals::{resolve_fixed_point, Binding};
use crate::resolver::template::contains_marker;
use crate::resolver::{eval_condition, expr, EvalContext, ScopeMode};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Outcome of the variable merge phase.
#[derive(Debug)]
pub struct MergedVariables {
    pub ctx: EvalContext,
    /// Names whose values are redacted in persisted state and logs.
    pub sensitive: HashSet<String>,
}

/// Merge workflow defaults with provided variables and resolve locals.
///
/// Provided values win over defaults. Defaults carrying template markers are
/// deferred into the fixed-point pass together with locals so they can
/// reference each other. Required variables without a value and failing
/// `validation` blocks are fatal.
pub fn merge_variables(
    workflow: &Workflow,
    provided: HashMap<String, Value>,
) -> Result<MergedVariables, EngineError> {
    let mut ctx = EvalContext::for_workflow(workflow);
    for (name, value) in provided {
        ctx.variables.insert(name, value);
    }

    let mut pending = Vec::new();
    for variable in &workflow.variables {
        if ctx.variables.contains_key(&variable.name) {
            continue;
        }
        let Some(default) = &variable.default else { continue };
        let raw = parser::raw_string(default);
        if contains_marker(&raw) {
            pending.push((variable.name.clone(), parser::expr_to_lazy_value(default), Binding::Variable));
            continue;
        }
        match expr::eval_expr(default, &ctx, ScopeMode::Condition) {
            Ok(value) => {
                ctx.variables.insert(variable.name.clone(), value);
            }
            Err(_) => pending.push((variable.name.clone(), Value::String(raw), Binding::Variable)),
        }
    }
    for (name, raw) in &workflow.locals {
        pending.push((name.clone(), Value::String(raw.clone()), Binding::Local));
    }
    resolve_fixed_point(pending, &mut ctx);

    for variable in &workflow.variables {
        if variable.required && !ctx.variables.contains_key(&variable.name) {
            return Err(EngineError::validation(format!(
                "required variable '{}' has no value",
                variable.name
            )));
        }
    }

    for variable in &workflow.variables {
        let Some(validation) = &variable.validation else { continue };
        if !ctx.variables.contains_key(&variable.name) {
            continue;
        }
        if !eval_condition(&validation.condition, &ctx) {
            return Err(EngineError::validation(validation.error_message.clone()));
        }
    }

    let sensitive = workflow
        .variables
        .iter()
        .filter(|variable| variable.sensitive)
        .map(|variable| variable.name.clone())
        .collect();

    Ok(MergedVariables { ctx, sensitive })
}

/// Replacement for sensitive values in persisted records.
pub const REDACTED: &str = "<sensitive>";

/// Redact sensitive variable values inside a variable map.
pub fn redact_variables(variables: &mut HashMap<String, Value>, sensitive: &HashSet<String>) {
    for name in sensitive {
        if let Some(slot) = variables.get_mut(name) {
            *slot = Value::String(REDACTED.to_string());
        }
    }
}

/// Redact output values that carry a sensitive variable's value, whether
/// verbatim or embedded inside a larger templated string. Recurses into
/// arrays and objects so nested outputs cannot smuggle a secret out.
pub fn redact_outputs(
    outputs: &mut HashMap<String, Value>,
    sensitive: &HashSet<String>,
    resolved: &serde_json::Map<String, Value>,
) {
    let secrets: Vec<String> = sensitive
        .iter()
        .filter_map(|name| resolved.get(name))
        .filter(|value| !value.is_null())
        .map(stringify)
        .filter(|text| !text.is_empty())
        .collect();
    if secrets.is_empty() {
        return;
    }
    for value in outputs.values_mut() {
        redact_value(value, &secrets);
    }
}

fn redact_value(value: &mut Value, secrets: &[String]) {
    match value {
        Value::String(text) => {
            if secrets.iter().any(|secret| text.contains(secret.as_str())) {
                *value = Value::String(REDACTED.to_string());
            }
        }
        Value::Array(items) => {
            for item in items {
                redact_value(item, secrets);
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                redact_value(item, secrets);
            }
        }
        other => {
            // Non-string secrets (numbers, booleans) redact on exact match.
            if secrets.iter().any(|secret| *secret == stringify(other)) {
                *other = Value::String(REDACTED.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_workflow;
    use serde_json::json;

    const SOURCE: &str = r#"
workflow "vars" {
  variable "env" {
    type    = string
    default = "staging"
  }

  variable "bucket" {
    type    = string
    default = "corynth-${var.env}"
  }

  variable "token" {
    type      = string
    required  = true
    sensitive = true
  }

  variable "replicas" {
    type    = number
    default = 2
    validation {
      condition     = "var.replicas > 0"
      error_message = "replicas must be positive"
    }
  }

  locals {
    region = "us-${var.env}"
  }

  step "noop" {
    plugin = "shell"
    action = "exec"
  }
}
"#;

    #[test]
    fn defaults_overrides_and_locals_merge() {
        let workflow = parse_workflow(SOURCE).expect("parse");
        let mut provided = HashMap::new();
        provided.insert("env".to_string(), json!("prod"));
        provided.insert("token".to_string(), json!("s3cret"));

        let merged = merge_variables(&workflow, provided).expect("merge");
        assert_eq!(merged.ctx.variables["env"], json!("prod"));
        assert_eq!(merged.ctx.variables["bucket"], json!("corynth-prod"));
        assert_eq!(merged.ctx.variables["replicas"], json!(2));
        assert_eq!(merged.ctx.locals["region"], json!("us-prod"));
        assert!(merged.sensitive.contains("token"));
    }

    #[test]
    fn missing_required_variable_is_fatal() {
        let workflow = parse_workflow(SOURCE).expect("parse");
        let error = merge_variables(&workflow, HashMap::new()).expect_err("should fail");
        assert!(error.to_string().contains("required variable 'token'"), "got: {error}");
    }

    #[test]
    fn failing_validation_reports_its_message() {
        let workflow = parse_workflow(SOURCE).expect("parse");
        let mut provided = HashMap::new();
        provided.insert("token".to_string(), json!("s3cret"));
        provided.insert("replicas".to_string(), json!(0));

        let error = merge_variables(&workflow, provided).expect_err("should fail");
        assert!(error.to_string().contains("replicas must be positive"), "got: {error}");
    }

    #[test]
    fn redaction_masks_sensitive_values() {
        let mut sensitive = HashSet::new();
        sensitive.insert("token".to_string());

        let mut variables = HashMap::new();
        variables.insert("token".to_string(), json!("s3cret"));
        variables.insert("env".to_string(), json!("prod"));
        redact_variables(&mut variables, &sensitive);
        assert_eq!(variables["token"], json!(REDACTED));
        assert_eq!(variables["env"], json!("prod"));

        let mut resolved = serde_json::Map::new();
        resolved.insert("token".to_string(), json!("s3cret"));
        let mut outputs = HashMap::new();
        outputs.insert("leaked".to_string(), json!("s3cret"));
        outputs.insert("fine".to_string(), json!("ok"));
        redact_outputs(&mut outputs, &sensitive, &resolved);
        assert_eq!(outputs["leaked"], json!(REDACTED));
        assert_eq!(outputs["fine"], json!("ok"));
    }

    #[test]
    fn redaction_catches_embedded_and_nested_secrets() {
        let mut sensitive = HashSet::new();
        sensitive.insert("token".to_string());
        let mut resolved = serde_json::Map::new();
        resolved.insert("token".to_string(), json!("s3cret"));

        let mut outputs = HashMap::new();
        outputs.insert("embedded".to_string(), json!("token=s3cret"));
        outputs.insert("nested".to_string(), json!({"auth": ["Bearer s3cret", "anon"], "host": "db"}));
        outputs.insert("clean".to_string(), json!(["a", "b"]));
        redact_outputs(&mut outputs, &sensitive, &resolved);

        assert_eq!(outputs["embedded"], json!(REDACTED));
        assert_eq!(outputs["nested"]["auth"][0], json!(REDACTED));
        assert_eq!(outputs["nested"]["auth"][1], json!("anon"));
        assert_eq!(outputs["nested"]["host"], json!("db"));
        assert_eq!(outputs["clean"], json!(["a", "b"]));
    }
}
