//! Decoded request values: the boundary type between the externally
//! supplied JSON/AST layer and the value coercer (C4). See SPEC_FULL.md §3
//! `InputValue`.

use indexmap::IndexMap;

/// An untyped request value, already stripped of JSON-vs-GraphQL-literal
/// distinctions the coercer doesn't care about.
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// A bare GraphQL enum value literal, e.g. `RED` in `color: RED`.
    Enum(String),
    List(Vec<InputValue>),
    Object(IndexMap<String, InputValue>),
}

impl InputValue {
    pub fn is_null(&self) -> bool {
        matches!(self, InputValue::Null)
    }
}

/// Converts a generic JSON value into an [`InputValue`], applying the
/// number-preserving post-processing spec.md §4.9/C9 requires: a JSON
/// number with no fractional part becomes an `Int`, otherwise a `Float`.
/// GraphQL enum literals don't exist in JSON (variables are always
/// strings there), so `InputValue::Enum` is never produced by this path;
/// it's produced only when converting literal argument values out of the
/// parsed query AST (see [`crate::ast`]).
pub fn json_to_input_value(value: &serde_json::Value) -> InputValue {
    match value {
        serde_json::Value::Null => InputValue::Null,
        serde_json::Value::Bool(b) => InputValue::Bool(*b),
        serde_json::Value::Number(n) => normalize_json_number(n),
        serde_json::Value::String(s) => InputValue::String(s.clone()),
        serde_json::Value::Array(items) => {
            InputValue::List(items.iter().map(json_to_input_value).collect())
        }
        serde_json::Value::Object(map) => {
            let mut out = IndexMap::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), json_to_input_value(v));
            }
            InputValue::Object(out)
        }
    }
}

fn normalize_json_number(n: &serde_json::Number) -> InputValue {
    if let Some(i) = n.as_i64() {
        InputValue::Int(i)
    } else if let Some(u) = n.as_u64() {
        // Whole-number JSON numbers become integers even if they overflow
        // i64 but fit in u64; narrow to i64 best-effort per §4.4 "overflow
        // is permitted and unspecified".
        InputValue::Int(u as i64)
    } else {
        InputValue::Float(n.as_f64().unwrap_or(0.0))
    }
}

/// The result of coercion (C4): a value shaped exactly like the target
/// `ShapeHint`, ready for a resolver's generated argument-binding code to
/// convert into the concrete Rust argument tuple.
#[derive(Debug, Clone, PartialEq)]
pub enum CoercedValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// The resolved ordinal of an enum value.
    EnumOrdinal(i64),
    List(Vec<CoercedValue>),
    Object(IndexMap<String, CoercedValue>),
    /// A custom scalar's decoded representation, type-erased.
    CustomScalar(std::sync::Arc<dyn std::any::Any + Send + Sync>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_numbers_become_int() {
        let v = serde_json::json!(42);
        assert_eq!(json_to_input_value(&v), InputValue::Int(42));
    }

    #[test]
    fn fractional_numbers_become_float() {
        let v = serde_json::json!(4.5);
        assert_eq!(json_to_input_value(&v), InputValue::Float(4.5));
    }

    #[test]
    fn whole_number_written_with_decimal_point_is_still_float() {
        // serde_json parses `4.0` into a Number that reports no exact i64,
        // matching "fractional JSON numbers become floats" even when the
        // fractional part is zero syntactically.
        let v: serde_json::Value = serde_json::from_str("4.0").unwrap();
        assert_eq!(json_to_input_value(&v), InputValue::Float(4.0));
    }

    #[test]
    fn nested_object_roundtrip() {
        let v = serde_json::json!({"a": 1, "b": [1, 2.5, "x", null]});
        match json_to_input_value(&v) {
            InputValue::Object(map) => {
                assert_eq!(map.get("a"), Some(&InputValue::Int(1)));
                assert_eq!(
                    map.get("b"),
                    Some(&InputValue::List(vec![
                        InputValue::Int(1),
                        InputValue::Float(2.5),
                        InputValue::String("x".into()),
                        InputValue::Null,
                    ]))
                );
            }
            other => panic!("expected object, got {other:?}"),
        }
    }
}
