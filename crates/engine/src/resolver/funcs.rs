//! Function sets for the two expression scopes.
//!
//! Conditions and loops use the HCL-shaped set (`equal`, `lessthan`, `if`,
//! ...); `{{...}}` templates use the text-oriented set (`default`, `join`,
//! `index`, ...). Arithmetic coerces operands through f64 and restores
//! integers when the result has no fractional part.

use crate::resolver::expr::ExprError;
use chrono::Utc;
use serde_json::{Number, Value};

/// Dispatch a condition/loop function call.
pub fn call_condition(name: &str, args: Vec<Value>) -> Result<Value, ExprError> {
    match name {
        "abs" => unary_number(name, &args, f64::abs),
        "ceil" => unary_number(name, &args, f64::ceil),
        "floor" => unary_number(name, &args, f64::floor),
        "signum" => unary_number(name, &args, f64::signum),
        "max" => fold_numbers(name, &args, f64::max),
        "min" => fold_numbers(name, &args, f64::min),
        "length" => {
            let value = single(name, &args)?;
            let length = match value {
                Value::Array(items) => items.len(),
                Value::Object(map) => map.len(),
                Value::String(text) => text.chars().count(),
                Value::Null => 0,
                _ => 1,
            };
            Ok(Value::from(length))
        }
        "strlen" => Ok(Value::from(string_arg(name, &args, 0)?.chars().count())),
        "upper" => Ok(Value::String(string_arg(name, &args, 0)?.to_uppercase())),
        "lower" => Ok(Value::String(string_arg(name, &args, 0)?.to_lowercase())),
        "split" => split(name, &args),
        "join" => join(name, &args),
        "equal" => Ok(Value::Bool(loose_eq(arg(name, &args, 0)?, arg(name, &args, 1)?))),
        "notequal" => Ok(Value::Bool(!loose_eq(arg(name, &args, 0)?, arg(name, &args, 1)?))),
        "lessthan" => compare(name, &args, |a, b| a < b),
        "lessequal" => compare(name, &args, |a, b| a <= b),
        "greaterthan" => compare(name, &args, |a, b| a > b),
        "greaterequal" => compare(name, &args, |a, b| a >= b),
        "and" => Ok(Value::Bool(args.iter().all(truthy))),
        "or" => Ok(Value::Bool(args.iter().any(truthy))),
        "not" => Ok(Value::Bool(!truthy(arg(name, &args, 0)?))),
        "if" => {
            let condition = truthy(arg(name, &args, 0)?);
            Ok(if condition {
                arg(name, &args, 1)?.clone()
            } else {
                arg(name, &args, 2)?.clone()
            })
        }
        "substr" => {
            let text = string_arg(name, &args, 0)?;
            let offset = number_arg(name, &args, 1)? as usize;
            let length = number_arg(name, &args, 2)? as usize;
            Ok(Value::String(text.chars().skip(offset).take(length).collect()))
        }
        _ => Err(ExprError::eval(format!("unknown function '{name}'"))),
    }
}

/// Dispatch a template function call.
pub fn call_template(name: &str, args: Vec<Value>) -> Result<Value, ExprError> {
    match name {
        "json" => {
            let value = single(name, &args)?;
            serde_json::to_string(value)
                .map(Value::String)
                .map_err(|error| ExprError::eval(format!("json: {error}")))
        }
        "default" => {
            let value = arg(name, &args, 0)?;
            let fallback = arg(name, &args, 1)?;
            let empty = matches!(value, Value::Null) || matches!(value, Value::String(text) if text.is_empty());
            Ok(if empty { fallback.clone() } else { value.clone() })
        }
        "upper" => Ok(Value::String(string_arg(name, &args, 0)?.to_uppercase())),
        "lower" => Ok(Value::String(string_arg(name, &args, 0)?.to_lowercase())),
        "title" => Ok(Value::String(title_case(&string_arg(name, &args, 0)?))),
        "join" => join(name, &args),
        "split" => split(name, &args),
        "replace" => {
            let text = string_arg(name, &args, 0)?;
            let from = string_arg(name, &args, 1)?;
            let to = string_arg(name, &args, 2)?;
            Ok(Value::String(text.replace(&from, &to)))
        }
        "contains" => {
            let haystack = arg(name, &args, 0)?;
            let needle = arg(name, &args, 1)?;
            let found = match haystack {
                Value::String(text) => text.contains(&coerce_string(needle)),
                Value::Array(items) => items.iter().any(|item| loose_eq(item, needle)),
                Value::Object(map) => map.contains_key(&coerce_string(needle)),
                _ => false,
            };
            Ok(Value::Bool(found))
        }
        "hasPrefix" => Ok(Value::Bool(
            string_arg(name, &args, 0)?.starts_with(&string_arg(name, &args, 1)?),
        )),
        "hasSuffix" => Ok(Value::Bool(
            string_arg(name, &args, 0)?.ends_with(&string_arg(name, &args, 1)?),
        )),
        "trim" => Ok(Value::String(string_arg(name, &args, 0)?.trim().to_string())),
        "trimPrefix" => {
            let text = string_arg(name, &args, 0)?;
            let prefix = string_arg(name, &args, 1)?;
            Ok(Value::String(text.strip_prefix(&prefix).unwrap_or(&text).to_string()))
        }
        "trimSuffix" => {
            let text = string_arg(name, &args, 0)?;
            let suffix = string_arg(name, &args, 1)?;
            Ok(Value::String(text.strip_suffix(&suffix).unwrap_or(&text).to_string()))
        }
        "add" => arithmetic(name, &args, |a, b| a + b),
        "sub" => arithmetic(name, &args, |a, b| a - b),
        "mul" => arithmetic(name, &args, |a, b| a * b),
        "div" => {
            let divisor = number_arg(name, &args, 1)?;
            if divisor == 0.0 {
                return Err(ExprError::eval("div: division by zero"));
            }
            arithmetic(name, &args, |a, b| a / b)
        }
        "mod" => {
            let divisor = number_arg(name, &args, 1)?;
            if divisor == 0.0 {
                return Err(ExprError::eval("mod: division by zero"));
            }
            arithmetic(name, &args, |a, b| a % b)
        }
        "len" => call_condition("length", args),
        "index" => index(name, &args),
        "timestamp" => Ok(Value::String(Utc::now().to_rfc3339())),
        "field" => {
            let object = arg(name, &args, 0)?;
            let key = string_arg(name, &args, 1)?;
            Ok(object.get(&key).cloned().unwrap_or(Value::Null))
        }
        _ => Err(ExprError::eval(format!("unknown function '{name}'"))),
    }
}

/// Truthiness: booleans as-is, strings by content, numbers by non-zero.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::String(text) => !text.is_empty() && text != "false" && text != "0",
        Value::Number(number) => number.as_f64().map(|float| float != 0.0).unwrap_or(false),
        Value::Null => false,
        _ => true,
    }
}

/// Numeric coercion used by arithmetic and ordering comparisons.
pub fn to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        Value::Bool(true) => Some(1.0),
        Value::Bool(false) => Some(0.0),
        _ => None,
    }
}

/// Equality with numeric coercion so `"3" == 3` holds across the string
/// parameter boundary.
pub fn loose_eq(left: &Value, right: &Value) -> bool {
    if left == right {
        return true;
    }
    match (to_f64(left), to_f64(right)) {
        (Some(a), Some(b)) => a == b,
        _ => coerce_string(left) == coerce_string(right),
    }
}

/// Number result: integer when nothing is lost, float otherwise.
pub fn number_value(float: f64) -> Value {
    if float.is_finite() && float.fract() == 0.0 && float.abs() <= i64::MAX as f64 {
        return Value::from(float as i64);
    }
    Number::from_f64(float).map(Value::Number).unwrap_or(Value::Null)
}

fn coerce_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn arg<'a>(name: &str, args: &'a [Value], index: usize) -> Result<&'a Value, ExprError> {
    args.get(index)
        .ok_or_else(|| ExprError::eval(format!("{name}: missing argument {index}")))
}

fn single<'a>(name: &str, args: &'a [Value]) -> Result<&'a Value, ExprError> {
    arg(name, args, 0)
}

fn string_arg(name: &str, args: &[Value], index: usize) -> Result<String, ExprError> {
    Ok(coerce_string(arg(name, args, index)?))
}

fn number_arg(name: &str, args: &[Value], index: usize) -> Result<f64, ExprError> {
    let value = arg(name, args, index)?;
    to_f64(value).ok_or_else(|| ExprError::eval(format!("{name}: argument {index} is not a number")))
}

fn unary_number(name: &str, args: &[Value], apply: fn(f64) -> f64) -> Result<Value, ExprError> {
    Ok(number_value(apply(number_arg(name, args, 0)?)))
}

fn fold_numbers(name: &str, args: &[Value], fold: fn(f64, f64) -> f64) -> Result<Value, ExprError> {
    if args.is_empty() {
        return Err(ExprError::eval(format!("{name}: needs at least one argument")));
    }
    let mut accumulator = number_arg(name, args, 0)?;
    for index in 1..args.len() {
        accumulator = fold(accumulator, number_arg(name, args, index)?);
    }
    Ok(number_value(accumulator))
}

fn arithmetic(name: &str, args: &[Value], apply: fn(f64, f64) -> f64) -> Result<Value, ExprError> {
    Ok(number_value(apply(number_arg(name, args, 0)?, number_arg(name, args, 1)?)))
}

fn compare(name: &str, args: &[Value], ordering: fn(f64, f64) -> bool) -> Result<Value, ExprError> {
    Ok(Value::Bool(ordering(number_arg(name, args, 0)?, number_arg(name, args, 1)?)))
}

fn split(name: &str, args: &[Value]) -> Result<Value, ExprError> {
    let separator = string_arg(name, args, 0)?;
    let text = string_arg(name, args, 1)?;
    Ok(Value::Array(
        text.split(&separator).map(|part| Value::String(part.to_string())).collect(),
    ))
}

fn join(name: &str, args: &[Value]) -> Result<Value, ExprError> {
    let separator = string_arg(name, args, 0)?;
    let list = match arg(name, args, 1)? {
        Value::Array(items) => items.iter().map(coerce_string).collect::<Vec<_>>(),
        other => vec![coerce_string(other)],
    };
    Ok(Value::String(list.join(&separator)))
}

/// `index(collection, key)`: mappings by string key, sequences by integer
/// index; a string target is parsed as JSON and re-indexed.
fn index(name: &str, args: &[Value]) -> Result<Value, ExprError> {
    let target = arg(name, args, 0)?;
    let key = arg(name, args, 1)?;

    let target = match target {
        Value::String(text) => {
            serde_json::from_str::<Value>(text).map_err(|_| ExprError::eval("index: string target is not valid JSON"))?
        }
        other => other.clone(),
    };

    match &target {
        Value::Object(map) => Ok(map.get(&coerce_string(key)).cloned().unwrap_or(Value::Null)),
        Value::Array(items) => {
            let position =
                to_f64(key).ok_or_else(|| ExprError::eval("index: sequence index must be a number"))? as usize;
            Ok(items.get(position).cloned().unwrap_or(Value::Null))
        }
        _ => Err(ExprError::eval("index: target is not indexable")),
    }
}

fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut characters = word.chars();
            match characters.next() {
                Some(first) => first.to_uppercase().collect::<String>() + characters.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
