//! Value coercer (C4). Converts an untyped [`InputValue`] — sourced from
//! either JSON request variables or a literal in the parsed query AST —
//! into a [`CoercedValue`] shaped exactly like a [`ShapeHint`] target,
//! producing a [`CoercionError`] carrying the dotted/bracketed member path
//! to the offending value (§4.4).

use indexmap::IndexMap;

use crate::enums::EnumDictionary;
use crate::error::CoercionError;
use crate::shape::{CustomScalarShape, Primitive, ShapeHint};
use crate::value::{CoercedValue, InputValue};

/// Coerces `value` against `target`, looking up enum ordinals in `enums`.
/// `path` is the member path accumulated so far, used only to build error
/// messages — the root call passes `""`.
pub fn coerce(
    value: &InputValue,
    target: &ShapeHint,
    enums: &EnumDictionary,
    path: &str,
) -> Result<CoercedValue, CoercionError> {
    match target {
        ShapeHint::Option(inner) => {
            if value.is_null() {
                Ok(CoercedValue::Null)
            } else {
                coerce(value, inner, enums, path)
            }
        }
        ShapeHint::Scalar(prim) => coerce_scalar(value, *prim, path),
        ShapeHint::CustomScalar(make_shape) => coerce_custom_scalar(value, make_shape(), path),
        ShapeHint::Enum(enum_type_name) => coerce_enum(value, enum_type_name, enums, path),
        ShapeHint::List(elem) => coerce_list(value, elem, enums, path),
        ShapeHint::Map(key, elem) => coerce_map(value, key, elem, enums, path),
        ShapeHint::Record(make_shape) => coerce_input_object(value, &make_shape(), enums, path),
        ShapeHint::Function(_) => Err(CoercionError::new(
            path,
            "a function type cannot appear as an argument or input field type",
        )),
    }
}

fn coerce_scalar(value: &InputValue, prim: Primitive, path: &str) -> Result<CoercedValue, CoercionError> {
    if value.is_null() {
        return Err(CoercionError::new(path, "null is not valid for a non-nullable field"));
    }
    match (prim, value) {
        (Primitive::Int, InputValue::Int(i)) => Ok(CoercedValue::Int(*i)),
        (Primitive::Int, InputValue::Float(f)) if f.fract() == 0.0 => Ok(CoercedValue::Int(*f as i64)),
        (Primitive::Int, InputValue::String(s)) => s
            .parse::<i64>()
            .map(CoercedValue::Int)
            .map_err(|_| CoercionError::new(path, format!("`{s}` is not a valid Int"))),

        (Primitive::Float, InputValue::Float(f)) => Ok(CoercedValue::Float(*f)),
        (Primitive::Float, InputValue::Int(i)) => Ok(CoercedValue::Float(*i as f64)),
        (Primitive::Float, InputValue::String(s)) => s
            .parse::<f64>()
            .map(CoercedValue::Float)
            .map_err(|_| CoercionError::new(path, format!("`{s}` is not a valid Float"))),

        (Primitive::String, InputValue::String(s)) => Ok(CoercedValue::String(s.clone())),

        (Primitive::Id, InputValue::String(s)) => Ok(CoercedValue::String(s.clone())),
        (Primitive::Id, InputValue::Int(i)) => Ok(CoercedValue::String(i.to_string())),

        (Primitive::Bool, InputValue::Bool(b)) => Ok(CoercedValue::Bool(*b)),
        (Primitive::Bool, InputValue::String(s)) if s == "true" => Ok(CoercedValue::Bool(true)),
        (Primitive::Bool, InputValue::String(s)) if s == "false" => Ok(CoercedValue::Bool(false)),

        _ => Err(CoercionError::new(
            path,
            format!("cannot coerce {value:?} to {prim:?}"),
        )),
    }
}

fn coerce_enum(
    value: &InputValue,
    enum_type_name: &str,
    enums: &EnumDictionary,
    path: &str,
) -> Result<CoercedValue, CoercionError> {
    let name = match value {
        InputValue::Enum(name) => name.as_str(),
        InputValue::String(name) => name.as_str(),
        InputValue::Null => {
            return Err(CoercionError::new(path, "null is not valid for a non-nullable field"))
        }
        other => return Err(CoercionError::new(path, format!("{other:?} is not a valid enum literal"))),
    };
    enums
        .ordinal_of(enum_type_name, name)
        .map(CoercedValue::EnumOrdinal)
        .ok_or_else(|| {
            CoercionError::new(path, format!("`{name}` is not a member of enum `{enum_type_name}`"))
        })
}

fn coerce_custom_scalar(
    value: &InputValue,
    shape: CustomScalarShape,
    path: &str,
) -> Result<CoercedValue, CoercionError> {
    let text = match value {
        InputValue::String(s) => s.clone(),
        other => serde_json::to_string(&input_value_to_json(other))
            .map_err(|e| CoercionError::new(path, e.to_string()))?,
    };
    (shape.decode)(&text)
        .map(CoercedValue::CustomScalar)
        .map_err(|reason| CoercionError::new(path, reason))
}

fn coerce_list(
    value: &InputValue,
    elem: &ShapeHint,
    enums: &EnumDictionary,
    path: &str,
) -> Result<CoercedValue, CoercionError> {
    match value {
        InputValue::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                let item_path = format!("{path}[{i}]");
                out.push(coerce(item, elem, enums, &item_path)?);
            }
            Ok(CoercedValue::List(out))
        }
        InputValue::Null => Err(CoercionError::new(path, "null is not valid for a non-nullable field")),
        // A single, non-list value is accepted and wrapped, matching
        // GraphQL's list input coercion rule.
        other => Ok(CoercedValue::List(vec![coerce(other, elem, enums, path)?])),
    }
}

fn coerce_map(
    value: &InputValue,
    key_hint: &ShapeHint,
    elem: &ShapeHint,
    enums: &EnumDictionary,
    path: &str,
) -> Result<CoercedValue, CoercionError> {
    let InputValue::Object(fields) = value else {
        return Err(CoercionError::new(path, "expected an input object for a map field"));
    };
    // The map key type only constrains what's legal (int or string,
    // enforced at schema-build time, §4.2); the wire representation of an
    // input-object key is always a string.
    let _ = key_hint;
    let mut out = IndexMap::with_capacity(fields.len());
    for (k, v) in fields {
        let value_path = format!("{path}.{k}");
        out.insert(k.clone(), coerce(v, elem, enums, &value_path)?);
    }
    Ok(CoercedValue::Object(out))
}

/// Coerces an input object against its record type's real per-member
/// shapes, reusing the field analyzer (C2) via [`crate::descriptor::input_field_shapes`]
/// so members typed as enums or nested input objects coerce the same way a
/// declared argument would (§3.1 scenario: enum-valued input object member).
fn coerce_input_object(
    value: &InputValue,
    shape: &crate::shape::RecordShape,
    enums: &EnumDictionary,
    path: &str,
) -> Result<CoercedValue, CoercionError> {
    let InputValue::Object(fields) = value else {
        return Err(CoercionError::new(path, "expected an input object"));
    };
    let member_shapes = crate::descriptor::input_field_shapes(shape)
        .map_err(|e| CoercionError::new(path, e.to_string()))?;
    let mut out = IndexMap::with_capacity(fields.len());
    for (k, v) in fields {
        let field_path = format!("{path}.{k}");
        let Some(target) = member_shapes.get(k) else {
            return Err(CoercionError::new(
                &field_path,
                format!("`{k}` is not a member of `{}`", shape.type_name),
            ));
        };
        out.insert(k.clone(), coerce(v, target, enums, &field_path)?);
    }
    Ok(CoercedValue::Object(out))
}

fn input_value_to_json(value: &InputValue) -> serde_json::Value {
    match value {
        InputValue::Null => serde_json::Value::Null,
        InputValue::Bool(b) => serde_json::json!(b),
        InputValue::Int(i) => serde_json::json!(i),
        InputValue::Float(f) => serde_json::json!(f),
        InputValue::String(s) | InputValue::Enum(s) => serde_json::json!(s),
        InputValue::List(items) => serde_json::Value::Array(items.iter().map(input_value_to_json).collect()),
        InputValue::Object(fields) => {
            serde_json::Value::Object(fields.iter().map(|(k, v)| (k.clone(), input_value_to_json(v))).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn enums() -> EnumDictionary {
        let mut raw = HashMap::new();
        raw.insert("Color".to_string(), vec!["RED".to_string(), "BLUE".to_string()]);
        EnumDictionary::build(raw)
    }

    #[test]
    fn null_unwraps_to_none_under_option() {
        let c = coerce(&InputValue::Null, &ShapeHint::Option(Box::new(ShapeHint::Scalar(Primitive::Int))), &enums(), "").unwrap();
        assert_eq!(c, CoercedValue::Null);
    }

    #[test]
    fn null_rejected_for_non_nullable_scalar() {
        assert!(coerce(&InputValue::Null, &ShapeHint::Scalar(Primitive::Int), &enums(), "").is_err());
    }

    #[test]
    fn string_to_bool_accepts_only_true_false() {
        assert_eq!(
            coerce(&InputValue::String("true".into()), &ShapeHint::Scalar(Primitive::Bool), &enums(), "").unwrap(),
            CoercedValue::Bool(true)
        );
        assert!(coerce(&InputValue::String("yes".into()), &ShapeHint::Scalar(Primitive::Bool), &enums(), "").is_err());
    }

    #[test]
    fn enum_name_resolves_to_ordinal() {
        let c = coerce(&InputValue::Enum("BLUE".into()), &ShapeHint::Enum("Color"), &enums(), "").unwrap();
        assert_eq!(c, CoercedValue::EnumOrdinal(1));
    }

    #[test]
    fn unknown_enum_member_is_an_error() {
        assert!(coerce(&InputValue::Enum("GREEN".into()), &ShapeHint::Enum("Color"), &enums(), "").is_err());
    }

    #[test]
    fn single_value_is_wrapped_into_a_list() {
        let c = coerce(&InputValue::Int(3), &ShapeHint::List(Box::new(ShapeHint::Scalar(Primitive::Int))), &enums(), "").unwrap();
        assert_eq!(c, CoercedValue::List(vec![CoercedValue::Int(3)]));
    }

    #[test]
    fn list_element_error_carries_bracketed_index() {
        let input = InputValue::List(vec![InputValue::Int(1), InputValue::String("oops".into())]);
        let err = coerce(&input, &ShapeHint::List(Box::new(ShapeHint::Scalar(Primitive::Bool))), &enums(), "p").unwrap_err();
        assert_eq!(err.path, "p[1]");
    }

    fn point_shape() -> crate::shape::RecordShape {
        use crate::shape::{FieldSpec, Primitive as P, RecordShape, ShapeHint as SH};
        static FIELDS: &[FieldSpec] = &[FieldSpec {
            rust_name: "i",
            tag: "",
            legacy_tag: None,
            shape: SH::List(Box::new(SH::Scalar(P::Bool))),
            embedded: false,
        }];
        RecordShape {
            type_name: "Point",
            fields: std::sync::Arc::new(FIELDS.to_vec()),
            resolve: |_, _, _| Box::pin(async { unreachable!() }),
        }
    }

    #[test]
    fn nested_object_member_error_carries_dotted_path() {
        let mut fields = IndexMap::new();
        fields.insert("i".to_string(), InputValue::List(vec![InputValue::Bool(true), InputValue::String("x".into())]));
        let input = InputValue::Object(fields);
        let err = coerce_input_object(&input, &point_shape(), &enums(), "p").unwrap_err();
        assert_eq!(err.path, "p.i[1]");
    }

    #[test]
    fn input_object_coerces_unknown_field_as_error() {
        let mut fields = IndexMap::new();
        fields.insert("bogus".to_string(), InputValue::Int(1));
        let input = InputValue::Object(fields);
        let err = coerce_input_object(&input, &point_shape(), &enums(), "p").unwrap_err();
        assert_eq!(err.path, "p.bogus");
    }

    #[test]
    fn whole_float_coerces_to_int_target() {
        let c = coerce(&InputValue::Float(4.0), &ShapeHint::Scalar(Primitive::Int), &enums(), "").unwrap();
        assert_eq!(c, CoercedValue::Int(4));
    }
}
