//! Conversion between engine values and the wire `Value`.
//!
//! The wire form carries six variants: null, string, number (double), bool,
//! ordered list, and string-keyed object. Numbers ride as doubles; integral
//! doubles decode back to JSON integers, so values built from these variants
//! round-trip structurally.

use crate::pb;
use crate::pb::value::Kind;
use serde_json::Value;
use std::collections::HashMap;

/// Encode an engine value into its wire form.
pub fn encode_value(value: &Value) -> pb::Value {
    let kind = match value {
        Value::Null => Kind::NullValue(true),
        Value::Bool(flag) => Kind::BoolValue(*flag),
        Value::Number(number) => Kind::NumberValue(number.as_f64().unwrap_or(0.0)),
        Value::String(text) => Kind::StringValue(text.clone()),
        Value::Array(items) => Kind::ListValue(pb::ValueList {
            items: items.iter().map(encode_value).collect(),
        }),
        Value::Object(entries) => Kind::ObjectValue(pb::ValueObject {
            entries: entries.iter().map(|(key, item)| (key.clone(), encode_value(item))).collect(),
        }),
    };
    pb::Value { kind: Some(kind) }
}

/// Decode a wire value back into an engine value.
///
/// A number with no fractional part is restored as an integer so callers can
/// recover integer parameters via truncation.
pub fn decode_value(value: &pb::Value) -> Value {
    match &value.kind {
        None | Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(flag)) => Value::Bool(*flag),
        Some(Kind::StringValue(text)) => Value::String(text.clone()),
        Some(Kind::NumberValue(number)) => decode_number(*number),
        Some(Kind::ListValue(list)) => Value::Array(list.items.iter().map(decode_value).collect()),
        Some(Kind::ObjectValue(object)) => Value::Object(
            object
                .entries
                .iter()
                .map(|(key, item)| (key.clone(), decode_value(item)))
                .collect(),
        ),
    }
}

fn decode_number(number: f64) -> Value {
    if number.is_finite() && number.fract() == 0.0 && number >= i64::MIN as f64 && number <= i64::MAX as f64 {
        return Value::Number(serde_json::Number::from(number as i64));
    }
    match serde_json::Number::from_f64(number) {
        Some(parsed) => Value::Number(parsed),
        None => Value::Null,
    }
}

/// Encode a string-keyed parameter map for an RPC request.
pub fn encode_params(params: &HashMap<String, Value>) -> HashMap<String, pb::Value> {
    params.iter().map(|(key, value)| (key.clone(), encode_value(value))).collect()
}

/// Decode an RPC response's output map.
pub fn decode_outputs(outputs: &HashMap<String, pb::Value>) -> HashMap<String, Value> {
    outputs.iter().map(|(key, value)| (key.clone(), decode_value(value))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_nested_values() {
        let original = json!({
            "name": "corynth",
            "count": 3,
            "ratio": 0.5,
            "enabled": true,
            "missing": null,
            "servers": ["a", "b", {"port": 8080}],
            "nested": {"deep": {"flag": false}}
        });

        let decoded = decode_value(&encode_value(&original));
        assert_eq!(decoded, original);
    }

    #[test]
    fn integral_doubles_decode_as_integers() {
        let wire = pb::Value {
            kind: Some(Kind::NumberValue(42.0)),
        };
        assert_eq!(decode_value(&wire), json!(42));

        let wire = pb::Value {
            kind: Some(Kind::NumberValue(2.5)),
        };
        assert_eq!(decode_value(&wire), json!(2.5));
    }

    #[test]
    fn missing_kind_decodes_to_null() {
        assert_eq!(decode_value(&pb::Value { kind: None }), serde_json::Value::Null);
    }

    #[test]
    fn param_maps_round_trip() {
        let mut params = HashMap::new();
        params.insert("command".to_string(), json!("echo hi"));
        params.insert("retries".to_string(), json!(2));

        let decoded = decode_outputs(&encode_params(&params));
        assert_eq!(decoded, params);
    }
}
