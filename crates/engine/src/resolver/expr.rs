//! HCL-shaped expression evaluation.
//!
//! hcl-rs supplies the grammar; evaluation happens here over
//! `serde_json::Value` so conditions, loop sequences, and `{{...}}` templates
//! all share one value domain and one function dispatch.

use crate::resolver::funcs::{self, number_value, to_f64, truthy};
use crate::resolver::interpolate;
use crate::resolver::EvalContext;
use hcl::expr::{
    BinaryOperator, Expression, ObjectKey, Operation, TemplateExpr, TraversalOperator, UnaryOperator,
};
use hcl::template::{Element, Template};
use serde_json::{Map, Value};
use std::str::FromStr;
use thiserror::Error;

/// Expression parse or evaluation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprError {
    #[error("expression parse error: {0}")]
    Parse(String),
    #[error("expression error: {0}")]
    Eval(String),
}

impl ExprError {
    pub fn eval(message: impl Into<String>) -> Self {
        Self::Eval(message.into())
    }
}

/// Which roots and functions an expression sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeMode {
    /// `var.*`, `local.*`, `step.<name>.outputs.*`, `loop.*` with the
    /// condition function set.
    Condition,
    /// `variables.*`, `locals.*`, `steps.<name>.outputs.*`, `workflow.*`
    /// with the template function set.
    Template,
}

/// Parse a standalone expression.
pub fn parse_expression(raw: &str) -> Result<Expression, ExprError> {
    let wrapped = format!("__expr = {raw}\n");
    let body = hcl::parse(&wrapped).map_err(|error| ExprError::Parse(error.to_string()))?;
    body.attributes()
        .next()
        .map(|attribute| attribute.expr().clone())
        .ok_or_else(|| ExprError::Parse("empty expression".into()))
}

/// Parse and evaluate an expression against a context.
pub fn evaluate(raw: &str, ctx: &EvalContext, mode: ScopeMode) -> Result<Value, ExprError> {
    let expression = parse_expression(raw)?;
    eval_expr(&expression, ctx, mode)
}

/// Condition semantics: empty means true, evaluation failures fall back to
/// interpolation plus string truthiness so `${...}`-shaped conditions work.
pub fn eval_condition(raw: &str, ctx: &EvalContext) -> bool {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return true;
    }
    match evaluate(trimmed, ctx, ScopeMode::Condition) {
        Ok(value) => truthy(&value),
        Err(_) => {
            let substituted = interpolate::interpolate(trimmed, ctx);
            truthy(&Value::String(substituted))
        }
    }
}

/// Evaluate a loop's `over`/`items` expression into a sequence.
///
/// Lists iterate their elements, objects iterate their keys, and a string
/// result is parsed as a JSON array.
pub fn evaluate_sequence(raw: &str, ctx: &EvalContext) -> Result<Vec<Value>, ExprError> {
    let value = match evaluate(raw, ctx, ScopeMode::Condition) {
        Ok(value) => value,
        Err(_) => Value::String(interpolate::interpolate(raw, ctx)),
    };
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(map) => Ok(map.keys().map(|key| Value::String(key.clone())).collect()),
        Value::String(text) => serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|parsed| parsed.as_array().cloned())
            .ok_or_else(|| ExprError::eval(format!("loop expression '{raw}' did not produce a sequence"))),
        other => Err(ExprError::eval(format!(
            "loop expression '{raw}' produced {other} instead of a sequence"
        ))),
    }
}

pub fn eval_expr(expression: &Expression, ctx: &EvalContext, mode: ScopeMode) -> Result<Value, ExprError> {
    match expression {
        Expression::Null => Ok(Value::Null),
        Expression::Bool(flag) => Ok(Value::Bool(*flag)),
        Expression::Number(number) => Ok(convert_number(number)),
        Expression::String(text) => Ok(Value::String(text.clone())),
        Expression::TemplateExpr(template) => eval_template_expr(template, ctx, mode),
        Expression::Array(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(eval_expr(item, ctx, mode)?);
            }
            Ok(Value::Array(values))
        }
        Expression::Object(entries) => {
            let mut map = Map::new();
            for (key, value) in entries {
                let key = match key {
                    ObjectKey::Identifier(identifier) => identifier.to_string(),
                    ObjectKey::Expression(expr) => match eval_expr(expr, ctx, mode)? {
                        Value::String(text) => text,
                        other => other.to_string(),
                    },
                    _ => String::new(),
                };
                map.insert(key, eval_expr(value, ctx, mode)?);
            }
            Ok(Value::Object(map))
        }
        Expression::Variable(variable) => Ok(root_value(variable.as_str(), ctx, mode).unwrap_or(Value::Null)),
        Expression::Traversal(traversal) => {
            let mut current = eval_expr(&traversal.expr, ctx, mode)?;
            for operator in &traversal.operators {
                current = apply_traversal(current, operator, ctx, mode)?;
            }
            Ok(current)
        }
        Expression::FuncCall(call) => {
            let name = call.name.to_string();
            let mut args = Vec::with_capacity(call.args.len());
            for argument in &call.args {
                args.push(eval_expr(argument, ctx, mode)?);
            }
            if call.expand_final {
                match args.pop() {
                    Some(Value::Array(tail)) => args.extend(tail),
                    Some(other) => args.push(other),
                    None => {}
                }
            }
            match mode {
                ScopeMode::Condition => funcs::call_condition(&name, args),
                ScopeMode::Template => funcs::call_template(&name, args),
            }
        }
        Expression::Parenthesis(inner) => eval_expr(inner, ctx, mode),
        Expression::Conditional(conditional) => {
            if truthy(&eval_expr(&conditional.cond_expr, ctx, mode)?) {
                eval_expr(&conditional.true_expr, ctx, mode)
            } else {
                eval_expr(&conditional.false_expr, ctx, mode)
            }
        }
        Expression::Operation(operation) => eval_operation(operation, ctx, mode),
        other => Err(ExprError::eval(format!("unsupported expression: {other:?}"))),
    }
}

fn eval_template_expr(template: &TemplateExpr, ctx: &EvalContext, mode: ScopeMode) -> Result<Value, ExprError> {
    let raw = match template {
        TemplateExpr::QuotedString(raw) => raw.as_str(),
        TemplateExpr::Heredoc(heredoc) => heredoc.template.as_str(),
    };
    let Ok(parsed) = Template::from_str(raw) else {
        return Ok(Value::String(raw.to_string()));
    };

    let elements = parsed.elements();
    // A lone interpolation keeps its typed value.
    if elements.len() == 1
        && let Element::Interpolation(interpolation) = &elements[0]
    {
        return eval_expr(&interpolation.expr, ctx, mode);
    }

    let mut output = String::new();
    for element in elements {
        match element {
            Element::Literal(text) => output.push_str(text),
            Element::Interpolation(interpolation) => {
                let value = eval_expr(&interpolation.expr, ctx, mode)?;
                output.push_str(&interpolate::stringify(&value));
            }
            Element::Directive(_) => {
                return Err(ExprError::eval("template directives are not supported"));
            }
        }
    }
    Ok(Value::String(output))
}

fn apply_traversal(
    current: Value,
    operator: &TraversalOperator,
    ctx: &EvalContext,
    mode: ScopeMode,
) -> Result<Value, ExprError> {
    match operator {
        TraversalOperator::GetAttr(identifier) => Ok(lookup(&current, identifier.as_str())),
        TraversalOperator::Index(index_expr) => {
            let index = eval_expr(index_expr, ctx, mode)?;
            match (&current, &index) {
                (Value::Array(items), _) => {
                    let position = to_f64(&index)
                        .ok_or_else(|| ExprError::eval("sequence index must be a number"))?
                        as usize;
                    Ok(items.get(position).cloned().unwrap_or(Value::Null))
                }
                (Value::Object(map), Value::String(key)) => Ok(map.get(key).cloned().unwrap_or(Value::Null)),
                _ => Ok(Value::Null),
            }
        }
        TraversalOperator::LegacyIndex(position) => match &current {
            Value::Array(items) => Ok(items.get(*position as usize).cloned().unwrap_or(Value::Null)),
            _ => Ok(Value::Null),
        },
        _ => Err(ExprError::eval("splat expressions are not supported")),
    }
}

fn lookup(value: &Value, key: &str) -> Value {
    match value {
        Value::Object(map) => map.get(key).cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn eval_operation(operation: &Operation, ctx: &EvalContext, mode: ScopeMode) -> Result<Value, ExprError> {
    match operation {
        Operation::Unary(unary) => {
            let value = eval_expr(&unary.expr, ctx, mode)?;
            match unary.operator {
                UnaryOperator::Not => Ok(Value::Bool(!truthy(&value))),
                UnaryOperator::Neg => {
                    let number = to_f64(&value).ok_or_else(|| ExprError::eval("cannot negate a non-number"))?;
                    Ok(number_value(-number))
                }
            }
        }
        Operation::Binary(binary) => {
            let operator = binary.operator;
            // Short-circuit logical operators before evaluating the rhs.
            if operator == BinaryOperator::And {
                let left = eval_expr(&binary.lhs_expr, ctx, mode)?;
                if !truthy(&left) {
                    return Ok(Value::Bool(false));
                }
                return Ok(Value::Bool(truthy(&eval_expr(&binary.rhs_expr, ctx, mode)?)));
            }
            if operator == BinaryOperator::Or {
                let left = eval_expr(&binary.lhs_expr, ctx, mode)?;
                if truthy(&left) {
                    return Ok(Value::Bool(true));
                }
                return Ok(Value::Bool(truthy(&eval_expr(&binary.rhs_expr, ctx, mode)?)));
            }

            let left = eval_expr(&binary.lhs_expr, ctx, mode)?;
            let right = eval_expr(&binary.rhs_expr, ctx, mode)?;
            match operator {
                BinaryOperator::Eq => Ok(Value::Bool(funcs::loose_eq(&left, &right))),
                BinaryOperator::NotEq => Ok(Value::Bool(!funcs::loose_eq(&left, &right))),
                BinaryOperator::Less => numeric_compare(&left, &right, |a, b| a < b),
                BinaryOperator::LessEq => numeric_compare(&left, &right, |a, b| a <= b),
                BinaryOperator::Greater => numeric_compare(&left, &right, |a, b| a > b),
                BinaryOperator::GreaterEq => numeric_compare(&left, &right, |a, b| a >= b),
                BinaryOperator::Plus => numeric_arithmetic(&left, &right, |a, b| a + b),
                BinaryOperator::Minus => numeric_arithmetic(&left, &right, |a, b| a - b),
                BinaryOperator::Mul => numeric_arithmetic(&left, &right, |a, b| a * b),
                BinaryOperator::Div => {
                    if to_f64(&right) == Some(0.0) {
                        return Err(ExprError::eval("division by zero"));
                    }
                    numeric_arithmetic(&left, &right, |a, b| a / b)
                }
                BinaryOperator::Mod => {
                    if to_f64(&right) == Some(0.0) {
                        return Err(ExprError::eval("division by zero"));
                    }
                    numeric_arithmetic(&left, &right, |a, b| a % b)
                }
                BinaryOperator::And | BinaryOperator::Or => unreachable!("handled above"),
            }
        }
    }
}

fn numeric_compare(left: &Value, right: &Value, ordering: fn(f64, f64) -> bool) -> Result<Value, ExprError> {
    match (to_f64(left), to_f64(right)) {
        (Some(a), Some(b)) => Ok(Value::Bool(ordering(a, b))),
        _ => Err(ExprError::eval("comparison operands must be numbers")),
    }
}

fn numeric_arithmetic(left: &Value, right: &Value, apply: fn(f64, f64) -> f64) -> Result<Value, ExprError> {
    match (to_f64(left), to_f64(right)) {
        (Some(a), Some(b)) => Ok(number_value(apply(a, b))),
        _ => Err(ExprError::eval("arithmetic operands must be numbers")),
    }
}

fn convert_number(number: &hcl::Number) -> Value {
    if let Some(integer) = number.as_i64() {
        return Value::from(integer);
    }
    number
        .as_f64()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn root_value(name: &str, ctx: &EvalContext, mode: ScopeMode) -> Option<Value> {
    if let Some(binding) = &ctx.loop_binding {
        if name == binding.variable {
            return Some(binding.element.clone());
        }
        if name == "loop" {
            return Some(binding.as_value());
        }
    }
    match mode {
        ScopeMode::Condition => match name {
            "var" => Some(Value::Object(ctx.variables.clone())),
            "local" => Some(Value::Object(ctx.locals.clone())),
            "step" => Some(ctx.steps_as_value()),
            _ => None,
        },
        ScopeMode::Template => match name {
            "variables" | "var" => Some(Value::Object(ctx.variables.clone())),
            "locals" | "local" => Some(Value::Object(ctx.locals.clone())),
            "steps" | "step" => Some(ctx.steps_as_value()),
            "workflow" => Some(Value::Object(ctx.workflow.clone())),
            _ => None,
        },
    }
}
