//! HCL workflow file parser.
//!
//! Parses a `workflow "name" { ... }` document into the [`Workflow`] model
//! and validates everything that can be checked before execution: unique
//! step names, known dependency references, duration strings, retry
//! strategies, and parallel-group membership.

use crate::error::EngineError;
use crate::model::{
    Backoff, ContinueOn, LoopSpec, OutputDecl, ParallelGroup, RetryPolicy, Step, StepTemplate, Variable,
    VariableValidation, Workflow, WorkflowDependency, WorkflowTrigger,
};
use corynth_types::parse_duration;
use hcl::expr::{Expression, ObjectKey, TemplateExpr};
use hcl::{Block, Body};
use indexmap::IndexMap;
use std::path::Path;

/// Load and parse a workflow file.
pub async fn load_workflow_file(path: &Path) -> Result<Workflow, EngineError> {
    let source = tokio::fs::read_to_string(path)
        .await
        .map_err(|error| EngineError::parse(format!("cannot read {}: {error}", path.display())))?;
    parse_workflow(&source)
}

/// Parse workflow source text.
pub fn parse_workflow(source: &str) -> Result<Workflow, EngineError> {
    let body: Body = hcl::parse(source).map_err(|error| EngineError::parse(error.to_string()))?;

    let block = body
        .blocks()
        .find(|block| block.identifier() == "workflow")
        .ok_or_else(|| EngineError::parse("missing 'workflow' block"))?;
    let name = block_label(block).ok_or_else(|| EngineError::parse("workflow block requires a name label"))?;

    let mut workflow = Workflow {
        name,
        ..Workflow::default()
    };

    for attribute in block.body().attributes() {
        let expr = attribute.expr();
        match attribute.key() {
            "description" => workflow.description = Some(raw_string(expr)),
            "version" => workflow.version = Some(raw_string(expr)),
            "on_success" => workflow.on_success = string_list(expr, "on_success")?,
            "on_failure" => workflow.on_failure = string_list(expr, "on_failure")?,
            "extends" => workflow.extends = string_list(expr, "extends")?,
            "imports" => workflow.imports = string_list(expr, "imports")?,
            "metadata" => workflow.metadata = string_map(expr),
            other => {
                return Err(EngineError::parse(format!("unknown workflow attribute '{other}'")));
            }
        }
    }

    for inner in block.body().blocks() {
        match inner.identifier() {
            "variable" => workflow.variables.push(parse_variable(inner)?),
            "locals" => {
                for attribute in inner.body().attributes() {
                    workflow
                        .locals
                        .insert(attribute.key().to_string(), raw_string(attribute.expr()));
                }
            }
            "template" => {
                let label = block_label(inner)
                    .ok_or_else(|| EngineError::parse("template block requires a name label"))?;
                workflow.templates.insert(label, parse_template(inner)?);
            }
            "step" => workflow.steps.push(parse_step(inner)?),
            "parallel_group" => workflow.parallel_groups.push(parse_parallel_group(inner)?),
            "output" => {
                let label = block_label(inner)
                    .ok_or_else(|| EngineError::parse("output block requires a name label"))?;
                workflow.outputs.insert(label, parse_output(inner)?);
            }
            "depends_on_workflow" => workflow.dependencies.push(parse_dependency(inner)?),
            "trigger_workflow" => workflow.triggers.push(parse_trigger(inner)?),
            other => {
                return Err(EngineError::parse(format!("unknown workflow block '{other}'")));
            }
        }
    }

    expand_templates(&mut workflow)?;
    validate_workflow(&workflow)?;
    Ok(workflow)
}

fn parse_variable(block: &Block) -> Result<Variable, EngineError> {
    let name = block_label(block).ok_or_else(|| EngineError::parse("variable block requires a name label"))?;
    let mut variable = Variable {
        name,
        type_expr: None,
        default: None,
        description: None,
        required: false,
        sensitive: false,
        validation: None,
    };

    for attribute in block.body().attributes() {
        let expr = attribute.expr();
        match attribute.key() {
            "type" => variable.type_expr = Some(raw_string(expr)),
            "default" => variable.default = Some(expr.clone()),
            "description" => variable.description = Some(raw_string(expr)),
            "required" => variable.required = boolean(expr, "required")?,
            "sensitive" => variable.sensitive = boolean(expr, "sensitive")?,
            other => {
                return Err(EngineError::parse(format!(
                    "unknown attribute '{other}' on variable '{}'",
                    variable.name
                )));
            }
        }
    }

    for inner in block.body().blocks() {
        if inner.identifier() == "validation" {
            let mut condition = None;
            let mut error_message = None;
            for attribute in inner.body().attributes() {
                match attribute.key() {
                    "condition" => condition = Some(raw_string(attribute.expr())),
                    "error_message" => error_message = Some(raw_string(attribute.expr())),
                    _ => {}
                }
            }
            variable.validation = Some(VariableValidation {
                condition: condition.ok_or_else(|| {
                    EngineError::parse(format!("validation block on variable '{}' needs a condition", variable.name))
                })?,
                error_message: error_message.unwrap_or_else(|| format!("variable '{}' failed validation", variable.name)),
            });
        }
    }

    Ok(variable)
}

fn parse_template(block: &Block) -> Result<StepTemplate, EngineError> {
    let mut template = StepTemplate::default();
    for attribute in block.body().attributes() {
        match attribute.key() {
            "plugin" => template.plugin = raw_string(attribute.expr()),
            "action" => template.action = raw_string(attribute.expr()),
            "params" => template.params = string_map(attribute.expr()),
            _ => {}
        }
    }
    for inner in block.body().blocks() {
        if inner.identifier() == "params" {
            for attribute in inner.body().attributes() {
                template
                    .params
                    .insert(attribute.key().to_string(), raw_string(attribute.expr()));
            }
        }
    }
    Ok(template)
}

fn parse_step(block: &Block) -> Result<Step, EngineError> {
    let name = block_label(block).ok_or_else(|| EngineError::parse("step block requires a name label"))?;
    let mut step = Step {
        name,
        ..Step::default()
    };

    for attribute in block.body().attributes() {
        let expr = attribute.expr();
        match attribute.key() {
            "plugin" => step.plugin = raw_string(expr),
            "action" => step.action = raw_string(expr),
            "template" => step.template_ref = Some(raw_string(expr)),
            "params" => step.params = string_map(expr),
            "condition" => step.condition = Some(raw_string(expr)),
            "timeout" => {
                let raw = raw_string(expr);
                let timeout = parse_duration(&raw).map_err(|_| {
                    EngineError::validation(format!("step '{}' has invalid timeout '{raw}'", step.name))
                })?;
                step.timeout = Some(timeout);
            }
            "depends_on" => step.depends_on = string_list(expr, "depends_on")?,
            "outputs" => step.outputs = string_map(expr),
            "subworkflow" => step.subworkflow = Some(raw_string(expr)),
            "continue_on" => step.continue_on = parse_continue_on_expr(expr),
            other => {
                return Err(EngineError::parse(format!(
                    "unknown attribute '{other}' on step '{}'",
                    step.name
                )));
            }
        }
    }

    for inner in block.body().blocks() {
        match inner.identifier() {
            "params" => {
                for attribute in inner.body().attributes() {
                    step.params.insert(attribute.key().to_string(), raw_string(attribute.expr()));
                }
            }
            "retry" => step.retry = Some(parse_retry(inner, &step.name)?),
            "loop" => step.loop_spec = Some(parse_loop(inner, &step.name)?),
            "continue_on" => {
                let mut continue_on = ContinueOn::default();
                for attribute in inner.body().attributes() {
                    match attribute.key() {
                        "error" => continue_on.error = boolean(attribute.expr(), "continue_on.error")?,
                        "failure" => continue_on.failure = boolean(attribute.expr(), "continue_on.failure")?,
                        _ => {}
                    }
                }
                step.continue_on = continue_on;
            }
            "outputs" => {
                for attribute in inner.body().attributes() {
                    step.outputs.insert(attribute.key().to_string(), raw_string(attribute.expr()));
                }
            }
            other => {
                return Err(EngineError::parse(format!("unknown block '{other}' in step '{}'", step.name)));
            }
        }
    }

    Ok(step)
}

fn parse_continue_on_expr(expr: &Expression) -> ContinueOn {
    let mut continue_on = ContinueOn::default();
    if let Expression::Object(entries) = expr {
        for (key, value) in entries {
            let flag = matches!(value, Expression::Bool(true));
            match object_key(key).as_str() {
                "error" => continue_on.error = flag,
                "failure" => continue_on.failure = flag,
                _ => {}
            }
        }
    }
    continue_on
}

fn parse_retry(block: &Block, step: &str) -> Result<RetryPolicy, EngineError> {
    let mut retry = RetryPolicy::default();
    for attribute in block.body().attributes() {
        let expr = attribute.expr();
        match attribute.key() {
            "max_attempts" => {
                retry.max_attempts = unsigned(expr, "retry.max_attempts")? as u32;
            }
            "delay" => {
                let raw = raw_string(expr);
                retry.delay = parse_duration(&raw).map_err(|_| {
                    EngineError::validation(format!("step '{step}' has invalid retry delay '{raw}'"))
                })?;
            }
            "backoff" => {
                let raw = raw_string(expr);
                retry.backoff = Backoff::parse(&raw).ok_or_else(|| {
                    EngineError::validation(format!(
                        "step '{step}' has invalid retry backoff '{raw}'; expected linear, exponential, or fixed"
                    ))
                })?;
            }
            _ => {}
        }
    }
    Ok(retry)
}

fn parse_loop(block: &Block, step: &str) -> Result<LoopSpec, EngineError> {
    let mut over = None;
    let mut variable = None;
    let mut parallel = false;
    let mut max_workers = 4usize;

    for attribute in block.body().attributes() {
        let expr = attribute.expr();
        match attribute.key() {
            // `over` and `items` are synonyms; `over` wins when both appear.
            "over" => over = Some(raw_string(expr)),
            "items" => {
                if over.is_none() {
                    over = Some(raw_string(expr));
                }
            }
            "variable" => variable = Some(raw_string(expr)),
            "parallel" => parallel = boolean(expr, "loop.parallel")?,
            "max_workers" => max_workers = unsigned(expr, "loop.max_workers")? as usize,
            _ => {}
        }
    }

    let over = over.ok_or_else(|| EngineError::validation(format!("loop on step '{step}' needs 'over' or 'items'")))?;
    let variable =
        variable.ok_or_else(|| EngineError::validation(format!("loop on step '{step}' needs a 'variable' binding")))?;
    Ok(LoopSpec {
        over,
        variable,
        parallel,
        max_workers: max_workers.max(1),
    })
}

fn parse_parallel_group(block: &Block) -> Result<ParallelGroup, EngineError> {
    let name = block_label(block).unwrap_or_else(|| "default".to_string());
    let mut steps = Vec::new();
    for attribute in block.body().attributes() {
        if attribute.key() == "steps" {
            steps = string_list(attribute.expr(), "parallel_group.steps")?;
        }
    }
    Ok(ParallelGroup { name, steps })
}

fn parse_output(block: &Block) -> Result<OutputDecl, EngineError> {
    let mut value = None;
    let mut description = None;
    for attribute in block.body().attributes() {
        match attribute.key() {
            "value" => value = Some(raw_string(attribute.expr())),
            "description" => description = Some(raw_string(attribute.expr())),
            _ => {}
        }
    }
    Ok(OutputDecl {
        value: value.ok_or_else(|| EngineError::parse("output block needs a 'value' attribute"))?,
        description,
    })
}

fn parse_dependency(block: &Block) -> Result<WorkflowDependency, EngineError> {
    let mut dependency = WorkflowDependency {
        required: true,
        ..WorkflowDependency::default()
    };
    for attribute in block.body().attributes() {
        let expr = attribute.expr();
        match attribute.key() {
            "workflow_file" => dependency.workflow_file = raw_string(expr),
            "variables" => dependency.variables = string_map(expr),
            "import_vars" => dependency.import_vars = string_list(expr, "import_vars")?,
            "import_all" => dependency.import_all = boolean(expr, "import_all")?,
            "required" => dependency.required = boolean(expr, "required")?,
            _ => {}
        }
    }
    if dependency.workflow_file.is_empty() {
        return Err(EngineError::parse("depends_on_workflow block needs a workflow_file"));
    }
    Ok(dependency)
}

fn parse_trigger(block: &Block) -> Result<WorkflowTrigger, EngineError> {
    let mut trigger = WorkflowTrigger::default();
    for attribute in block.body().attributes() {
        let expr = attribute.expr();
        match attribute.key() {
            "workflow_file" => trigger.workflow_file = raw_string(expr),
            "variables" => trigger.variables = string_map(expr),
            "export_vars" => trigger.export_vars = string_list(expr, "export_vars")?,
            "export_all" => trigger.export_all = boolean(expr, "export_all")?,
            "on_success" => trigger.on_success = boolean(expr, "on_success")?,
            "on_failure" => trigger.on_failure = boolean(expr, "on_failure")?,
            _ => {}
        }
    }
    if trigger.workflow_file.is_empty() {
        return Err(EngineError::parse("trigger_workflow block needs a workflow_file"));
    }
    Ok(trigger)
}

/// Fill plugin/action/params from a referenced template; step params win.
fn expand_templates(workflow: &mut Workflow) -> Result<(), EngineError> {
    let templates = workflow.templates.clone();
    for step in &mut workflow.steps {
        let Some(reference) = &step.template_ref else { continue };
        let template = templates.get(reference).ok_or_else(|| {
            EngineError::validation(format!("step '{}' references unknown template '{reference}'", step.name))
        })?;
        if step.plugin.is_empty() {
            step.plugin = template.plugin.clone();
        }
        if step.action.is_empty() {
            step.action = template.action.clone();
        }
        let mut params = template.params.clone();
        params.extend(step.params.clone());
        step.params = params;
    }
    Ok(())
}

fn validate_workflow(workflow: &Workflow) -> Result<(), EngineError> {
    let mut seen = std::collections::HashSet::new();
    for step in &workflow.steps {
        if !seen.insert(step.name.as_str()) {
            return Err(EngineError::validation(format!("duplicate step name '{}'", step.name)));
        }
        if step.plugin.is_empty() && step.subworkflow.is_none() {
            return Err(EngineError::validation(format!("step '{}' has no plugin", step.name)));
        }
        if step.action.is_empty() && step.subworkflow.is_none() {
            return Err(EngineError::validation(format!("step '{}' has no action", step.name)));
        }
        for dependency in &step.depends_on {
            if workflow.step(dependency).is_none() {
                return Err(EngineError::validation(format!(
                    "step '{}' depends on unknown step '{dependency}'",
                    step.name
                )));
            }
            if dependency == &step.name {
                return Err(EngineError::validation(format!("step '{}' cannot depend on itself", step.name)));
            }
        }
        if let Some(retry) = &step.retry
            && retry.max_attempts == 0
        {
            return Err(EngineError::validation(format!(
                "step '{}' retry.max_attempts must be at least 1",
                step.name
            )));
        }
    }

    for hook in workflow.on_success.iter().chain(&workflow.on_failure) {
        if workflow.step(hook).is_none() {
            return Err(EngineError::validation(format!("hook references unknown step '{hook}'")));
        }
    }
    for group in &workflow.parallel_groups {
        for member in &group.steps {
            if workflow.step(member).is_none() {
                return Err(EngineError::validation(format!(
                    "parallel group '{}' references unknown step '{member}'",
                    group.name
                )));
            }
        }
    }
    Ok(())
}

fn block_label(block: &Block) -> Option<String> {
    block.labels().first().map(|label| label.as_str().to_string())
}

/// Source text of an expression, with `${...}` markers preserved so the
/// resolver can interpolate later.
pub(crate) fn raw_string(expr: &Expression) -> String {
    match expr {
        Expression::String(text) => text.clone(),
        Expression::TemplateExpr(template) => template_text(template),
        Expression::Number(number) => number.to_string(),
        Expression::Bool(flag) => flag.to_string(),
        Expression::Null => String::new(),
        other => hcl::format::to_string(other).unwrap_or_default(),
    }
}

fn template_text(template: &TemplateExpr) -> String {
    match template {
        TemplateExpr::QuotedString(raw) => raw.clone(),
        TemplateExpr::Heredoc(heredoc) => heredoc.template.clone(),
    }
}

/// Convert a default expression into a lazily resolvable value tree:
/// structure becomes typed immediately, leaf strings keep their template
/// text for the fixed-point pass.
pub(crate) fn expr_to_lazy_value(expr: &Expression) -> serde_json::Value {
    match expr {
        Expression::Null => serde_json::Value::Null,
        Expression::Bool(flag) => serde_json::Value::Bool(*flag),
        Expression::Number(number) => number
            .as_i64()
            .map(serde_json::Value::from)
            .or_else(|| number.as_f64().and_then(serde_json::Number::from_f64).map(serde_json::Value::Number))
            .unwrap_or(serde_json::Value::Null),
        Expression::Array(items) => serde_json::Value::Array(items.iter().map(expr_to_lazy_value).collect()),
        Expression::Object(entries) => serde_json::Value::Object(
            entries
                .iter()
                .map(|(key, value)| (object_key(key), expr_to_lazy_value(value)))
                .collect(),
        ),
        other => serde_json::Value::String(raw_string(other)),
    }
}

fn string_list(expr: &Expression, field: &str) -> Result<Vec<String>, EngineError> {
    match expr {
        Expression::Array(items) => Ok(items.iter().map(raw_string).collect()),
        _ => Err(EngineError::parse(format!("'{field}' must be a list of strings"))),
    }
}

fn string_map(expr: &Expression) -> IndexMap<String, String> {
    let mut map = IndexMap::new();
    if let Expression::Object(entries) = expr {
        for (key, value) in entries {
            map.insert(object_key(key), raw_string(value));
        }
    }
    map
}

fn object_key(key: &ObjectKey) -> String {
    match key {
        ObjectKey::Identifier(identifier) => identifier.to_string(),
        ObjectKey::Expression(expr) => raw_string(expr),
        _ => String::new(),
    }
}

fn boolean(expr: &Expression, field: &str) -> Result<bool, EngineError> {
    match expr {
        Expression::Bool(flag) => Ok(*flag),
        _ => Err(EngineError::parse(format!("'{field}' must be a boolean"))),
    }
}

fn unsigned(expr: &Expression, field: &str) -> Result<u64, EngineError> {
    match expr {
        Expression::Number(number) => number
            .as_u64()
            .ok_or_else(|| EngineError::parse(format!("'{field}' must be a non-negative integer"))),
        _ => Err(EngineError::parse(format!("'{field}' must be a number"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"
workflow "deploy" {
  description = "Build and ship"
  version     = "1.2.0"

  variable "env" {
    type    = string
    default = "staging"
  }

  variable "token" {
    type      = string
    required  = true
    sensitive = true
  }

  locals {
    region = "us-${var.env}"
  }

  step "build" {
    plugin = "shell"
    action = "exec"
    params = {
      command = "make build-${var.env}"
    }
    retry {
      max_attempts = 3
      delay        = "10s"
      backoff      = "exponential"
    }
    timeout = "5m"
  }

  step "ship" {
    plugin     = "shell"
    action     = "exec"
    depends_on = ["build"]
    params = {
      command = "make ship"
    }
    continue_on {
      error = true
    }
    outputs = {
      release = "stdout"
    }
  }

  output "release" {
    value = "${step.ship.release}"
  }

  depends_on_workflow {
    workflow_file = "source.hcl"
    import_vars   = ["shared_value"]
  }

  trigger_workflow {
    workflow_file = "notify.hcl"
    on_success    = true
    export_vars   = ["release"]
  }
}
"#;

    #[test]
    fn parses_a_complete_workflow() {
        let workflow = parse_workflow(SOURCE).expect("parse");
        assert_eq!(workflow.name, "deploy");
        assert_eq!(workflow.description.as_deref(), Some("Build and ship"));
        assert_eq!(workflow.variables.len(), 2);
        assert!(workflow.variables[1].required);
        assert!(workflow.variables[1].sensitive);
        assert_eq!(workflow.locals["region"], "us-${var.env}");

        assert_eq!(workflow.steps.len(), 2);
        let build = &workflow.steps[0];
        assert_eq!(build.plugin, "shell");
        assert_eq!(build.params["command"], "make build-${var.env}");
        let retry = build.retry.as_ref().expect("retry");
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.backoff, Backoff::Exponential);
        assert_eq!(build.timeout, Some(std::time::Duration::from_secs(300)));

        let ship = &workflow.steps[1];
        assert_eq!(ship.depends_on, vec!["build"]);
        assert!(ship.continue_on.error);
        assert_eq!(ship.outputs["release"], "stdout");

        assert_eq!(workflow.outputs["release"].value, "${step.ship.release}");
        assert_eq!(workflow.dependencies.len(), 1);
        assert!(workflow.dependencies[0].required);
        assert_eq!(workflow.triggers.len(), 1);
        assert!(workflow.triggers[0].on_success);
    }

    #[test]
    fn rejects_unknown_dependencies_and_duplicates() {
        let source = r#"
workflow "bad" {
  step "one" {
    plugin     = "shell"
    action     = "exec"
    depends_on = ["missing"]
  }
}
"#;
        let error = parse_workflow(source).expect_err("should fail");
        assert!(error.to_string().contains("unknown step 'missing'"), "got: {error}");

        let duplicate = r#"
workflow "bad" {
  step "one" {
    plugin = "shell"
    action = "exec"
  }
  step "one" {
    plugin = "shell"
    action = "exec"
  }
}
"#;
        let error = parse_workflow(duplicate).expect_err("should fail");
        assert!(error.to_string().contains("duplicate step name"), "got: {error}");
    }

    #[test]
    fn rejects_invalid_retry_and_duration() {
        let source = r#"
workflow "bad" {
  step "one" {
    plugin = "shell"
    action = "exec"
    retry {
      max_attempts = 2
      delay        = "soon"
    }
  }
}
"#;
        let error = parse_workflow(source).expect_err("should fail");
        assert!(error.to_string().contains("invalid retry delay"), "got: {error}");

        let source = r#"
workflow "bad" {
  step "one" {
    plugin = "shell"
    action = "exec"
    retry {
      max_attempts = 2
      backoff      = "random"
    }
  }
}
"#;
        let error = parse_workflow(source).expect_err("should fail");
        assert!(error.to_string().contains("invalid retry backoff"), "got: {error}");
    }

    #[test]
    fn expands_step_templates() {
        let source = r#"
workflow "templated" {
  template "runner" {
    plugin = "shell"
    action = "exec"
    params = {
      shell = "bash"
    }
  }

  step "job" {
    template = "runner"
    params = {
      command = "true"
    }
  }
}
"#;
        let workflow = parse_workflow(source).expect("parse");
        let step = &workflow.steps[0];
        assert_eq!(step.plugin, "shell");
        assert_eq!(step.action, "exec");
        assert_eq!(step.params["shell"], "bash");
        assert_eq!(step.params["command"], "true");
    }

    #[test]
    fn loop_requires_over_and_variable() {
        let source = r#"
workflow "looped" {
  step "fan" {
    plugin = "shell"
    action = "exec"
    loop {
      over     = "[\"a\", \"b\"]"
      variable = "item"
      parallel = true
      max_workers = 2
    }
  }
}
"#;
        let workflow = parse_workflow(source).expect("parse");
        let loop_spec = workflow.steps[0].loop_spec.as_ref().expect("loop");
        assert_eq!(loop_spec.variable, "item");
        assert!(loop_spec.parallel);
        assert_eq!(loop_spec.max_workers, 2);

        let missing = r#"
workflow "looped" {
  step "fan" {
    plugin = "shell"
    action = "exec"
    loop {
      variable = "item"
    }
  }
}
"#;
        assert!(parse_workflow(missing).is_err());
    }
}
