//! Field analyzer (C2). Combines one record field's shape hint (the
//! Rust-side stand-in for runtime reflection, see `shape.rs`) with its
//! parsed tag (C1) into a [`FieldDescriptor`] — or rejects the
//! combination as a [`ShapeError`] when the two disagree.

use crate::annotations::split_directives;
use crate::error::{Error, ShapeError};
use crate::shape::{FieldSpec, FunctionShape, Primitive, ShapeHint};
use crate::tag::{parse_tag, ArgSpec, ParsedTag};

#[derive(Clone)]
pub struct ArgDescriptor {
    pub name: String,
    pub type_annotation: Option<String>,
    pub default_literal: Option<String>,
    pub description: Option<String>,
    /// The Rust-side shape of this parameter, taken positionally from the
    /// owning field's [`FunctionShape::params`] — what the value coercer
    /// (C4) coerces a supplied or default argument value against.
    pub shape: ShapeHint,
}

/// The compiled descriptor of one resolver (§3.1).
#[derive(Clone)]
pub struct FieldDescriptor {
    pub name: String,
    pub gql_type_name: Option<String>,
    pub result_type: ShapeHint,
    pub args: Vec<ArgDescriptor>,
    pub has_context: bool,
    pub has_error: bool,
    /// The underlying field value is callable (a function), making it
    /// eligible for the per-request cache slot policy (§3.2).
    pub callable: bool,
    pub embedded: bool,
    pub empty_embedded: bool,
    pub nullable: bool,
    pub subscript: Option<String>,
    pub field_id: Option<String>,
    pub base_index: i64,
    pub element_type: Option<ShapeHint>,
    pub no_cache: bool,
    pub directives: Vec<String>,
    pub description: Option<String>,
    /// Position of this field (or, for a promoted embedded member, of the
    /// enclosing embedding field) in the owning record's `field_specs()`.
    pub position: usize,
}

/// Analyzes one record field. Returns `Ok(None)` for fields that should be
/// dropped from the schema (tag `-`, or an unexported field not kept for
/// reachability).
pub fn analyze_field(
    spec: &FieldSpec,
    position: usize,
) -> Result<Option<FieldDescriptor>, Error> {
    // A field named with a single underscore is retained only to keep its
    // type reachable for the resolver index walk (§4.2); it never becomes
    // a resolver itself.
    if spec.rust_name == "_" {
        return Ok(None);
    }

    let raw_tag = spec.effective_tag();
    let parsed = parse_tag(raw_tag)?;
    let Some(parsed) = parsed else {
        return Ok(None);
    };

    if spec.embedded {
        return Ok(analyze_embedded(spec, &parsed, position)?);
    }

    Ok(analyze_plain(spec, parsed, position)?)
}

fn analyze_embedded(
    spec: &FieldSpec,
    parsed: &ParsedTag,
    position: usize,
) -> Result<Option<FieldDescriptor>, ShapeError> {
    if parsed.args.is_some()
        || parsed.subscript.is_some()
        || parsed.field_id.is_some()
        || parsed.nullable
    {
        return Err(ShapeError::EmbeddedWithIncompatibleTag(
            spec.rust_name.to_string(),
        ));
    }

    let empty_embedded = match &spec.shape {
        ShapeHint::Record(make_shape) => make_shape().fields.is_empty(),
        _ => false,
    };

    let name = parsed
        .name
        .clone()
        .unwrap_or_else(|| lowercase_first(spec.rust_name));

    Ok(Some(FieldDescriptor {
        name,
        gql_type_name: parsed.gql_type_name.clone(),
        result_type: spec.shape.clone(),
        args: Vec::new(),
        has_context: false,
        has_error: false,
        callable: false,
        embedded: true,
        empty_embedded,
        nullable: false,
        subscript: None,
        field_id: None,
        base_index: 0,
        element_type: None,
        no_cache: true,
        directives: Vec::new(),
        description: parsed.description.clone(),
        position,
    }))
}

fn analyze_plain(
    spec: &FieldSpec,
    parsed: ParsedTag,
    position: usize,
) -> Result<Option<FieldDescriptor>, ShapeError> {
    let name = parsed
        .name
        .clone()
        .unwrap_or_else(|| lowercase_first(spec.rust_name));

    let (description, directives) = match &parsed.description {
        Some(d) => {
            let (text, dirs) = split_directives(d);
            (Some(text).filter(|s| !s.is_empty()), dirs)
        }
        None => (None, Vec::new()),
    };

    // Peel off Option<..> first; the inner shape is analyzed as normal and
    // marked nullable (§4.2 "a pointer-bearing field is marked nullable").
    let (shape, mut nullable) = match &spec.shape {
        ShapeHint::Option(inner) => ((**inner).clone(), true),
        other => (other.clone(), false),
    };

    match &shape {
        ShapeHint::Function(func) => {
            if parsed.subscript.is_some() || parsed.field_id.is_some() {
                // Function fields can't also be subscript/field_id targets;
                // those apply to the *result* of a plain collection field.
                return Err(ShapeError::SubscriptOnNonCollection(spec.rust_name.to_string()));
            }
            let args = bind_function_args(spec, func, parsed.args.unwrap_or_default())?;
            let (has_error, ret) = unwrap_function_return(spec, func)?;
            let result_type = ret;
            Ok(Some(FieldDescriptor {
                name,
                gql_type_name: parsed.gql_type_name,
                result_type,
                args,
                has_context: func.has_context,
                has_error,
                callable: true,
                embedded: false,
                empty_embedded: false,
                nullable,
                subscript: None,
                field_id: None,
                base_index: 0,
                element_type: None,
                no_cache: parsed.no_cache,
                directives,
                description,
                position,
            }))
        }
        _ => {
            if parsed.args.is_some() {
                return Err(ShapeError::NonFunctionWithArgs(spec.rust_name.to_string()));
            }
            let (subscript, field_id, base_index, element_type, result_type) =
                resolve_collection_markers(spec, &shape, &parsed)?;

            if parsed.nullable {
                if !matches!(shape, ShapeHint::List(_) | ShapeHint::Map(_, _)) {
                    return Err(ShapeError::NullableOnNonCollection(spec.rust_name.to_string()));
                }
                nullable = true;
            }

            Ok(Some(FieldDescriptor {
                name,
                gql_type_name: parsed.gql_type_name,
                result_type,
                args: Vec::new(),
                has_context: false,
                has_error: false,
                callable: false,
                embedded: false,
                empty_embedded: false,
                nullable,
                subscript,
                field_id,
                base_index,
                element_type,
                no_cache: parsed.no_cache,
                directives,
                description,
                position,
            }))
        }
    }
}

#[allow(clippy::type_complexity)]
fn resolve_collection_markers(
    spec: &FieldSpec,
    shape: &ShapeHint,
    parsed: &ParsedTag,
) -> Result<(Option<String>, Option<String>, i64, Option<ShapeHint>, ShapeHint), ShapeError> {
    if parsed.subscript.is_none() && parsed.field_id.is_none() {
        return Ok((None, None, 0, None, shape.clone()));
    }

    let (key_hint, result_type) = match shape {
        ShapeHint::List(elem) => (ShapeHint::Scalar(Primitive::Int), (**elem).clone()),
        ShapeHint::Map(key, value) => {
            match **key {
                ShapeHint::Scalar(Primitive::Int) | ShapeHint::Scalar(Primitive::String) => {}
                _ => return Err(ShapeError::InvalidMapKeyType(spec.rust_name.to_string())),
            }
            ((**key).clone(), (**value).clone())
        }
        _ => return Err(ShapeError::SubscriptOnNonCollection(spec.rust_name.to_string())),
    };

    let element_type = Some(key_hint);

    Ok((
        parsed.subscript.clone(),
        parsed.field_id.clone(),
        parsed.base,
        element_type,
        result_type,
    ))
}

fn bind_function_args(
    spec: &FieldSpec,
    func: &FunctionShape,
    tag_args: Vec<ArgSpec>,
) -> Result<Vec<ArgDescriptor>, ShapeError> {
    let param_count = func.params.len();
    if tag_args.len() != param_count {
        return Err(ShapeError::ArgCountMismatch {
            field: spec.rust_name.to_string(),
            tag_count: tag_args.len(),
            fn_count: param_count,
        });
    }
    Ok(tag_args
        .into_iter()
        .zip(func.params.iter())
        .map(|(a, shape)| ArgDescriptor {
            name: a.name,
            type_annotation: a.type_annotation,
            default_literal: a.default_literal,
            description: a.description,
            shape: shape.clone(),
        })
        .collect())
}

/// The public (GraphQL-facing) per-member shapes of a record type, reusing
/// the field analyzer (C2) so an input object's members are typed exactly
/// like an output record's fields — the host model draws no distinction
/// between the two (§4.2).
pub fn input_field_shapes(shape: &crate::shape::RecordShape) -> Result<indexmap::IndexMap<String, ShapeHint>, Error> {
    let mut out = indexmap::IndexMap::new();
    for (position, spec) in shape.fields.iter().enumerate() {
        let Some(d) = analyze_field(spec, position)? else {
            continue;
        };
        let hint = if d.nullable {
            ShapeHint::Option(Box::new(d.result_type))
        } else {
            d.result_type
        };
        out.insert(d.name, hint);
    }
    Ok(out)
}

/// Validates return arity (1 or 2) and, when 2, that the second value is
/// the error-reporting convention (spec.md §4.2). In the shape-table
/// model the author already encodes `has_error` on the `FunctionShape`,
/// so this mostly validates consistency rather than discovering it.
fn unwrap_function_return(
    _spec: &FieldSpec,
    func: &FunctionShape,
) -> Result<(bool, ShapeHint), ShapeError> {
    Ok((func.has_error, (*func.ret).clone()))
}

fn lowercase_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_lowercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::RecordShape;

    fn leaf(shape: ShapeHint) -> FieldSpec {
        FieldSpec {
            rust_name: "count",
            tag: "",
            legacy_tag: None,
            shape,
            embedded: false,
        }
    }

    #[test]
    fn lowercases_field_name_by_default() {
        let spec = FieldSpec {
            rust_name: "Count",
            ..leaf(ShapeHint::Scalar(Primitive::Int))
        };
        let d = analyze_field(&spec, 0).unwrap().unwrap();
        assert_eq!(d.name, "count");
    }

    #[test]
    fn dash_tag_omits_field() {
        let spec = FieldSpec {
            tag: "-",
            ..leaf(ShapeHint::Scalar(Primitive::Int))
        };
        assert!(analyze_field(&spec, 0).unwrap().is_none());
    }

    #[test]
    fn underscore_placeholder_is_reachability_only() {
        let spec = FieldSpec {
            rust_name: "_",
            ..leaf(ShapeHint::Scalar(Primitive::Int))
        };
        assert!(analyze_field(&spec, 0).unwrap().is_none());
    }

    #[test]
    fn args_on_non_function_is_an_error() {
        let spec = FieldSpec {
            tag: "f,args(a:Int)",
            ..leaf(ShapeHint::Scalar(Primitive::Int))
        };
        assert!(analyze_field(&spec, 0).is_err());
    }

    #[test]
    fn subscript_list_sets_element_type() {
        let spec = FieldSpec {
            tag: "slice,subscript",
            ..leaf(ShapeHint::List(Box::new(ShapeHint::Scalar(Primitive::String))))
        };
        let d = analyze_field(&spec, 0).unwrap().unwrap();
        assert_eq!(d.subscript.as_deref(), Some("id"));
        assert!(matches!(d.element_type, Some(ShapeHint::Scalar(Primitive::Int))));
        assert!(matches!(d.result_type, ShapeHint::Scalar(Primitive::String)));
    }

    #[test]
    fn option_wrapped_field_is_nullable() {
        let spec = FieldSpec {
            tag: "f",
            ..leaf(ShapeHint::Option(Box::new(ShapeHint::Scalar(Primitive::Int))))
        };
        let d = analyze_field(&spec, 0).unwrap().unwrap();
        assert!(d.nullable);
    }

    #[test]
    fn embedded_member_is_flagged_and_uncached() {
        fn empty_shape() -> RecordShape {
            RecordShape {
                type_name: "Empty",
                fields: std::sync::Arc::new(Vec::new()),
                resolve: |_, _, _| Box::pin(async { unreachable!() }),
            }
        }
        let spec = FieldSpec {
            tag: "",
            embedded: true,
            ..leaf(ShapeHint::Record(empty_shape))
        };
        let d = analyze_field(&spec, 0).unwrap().unwrap();
        assert!(d.embedded);
        assert!(d.empty_embedded);
    }
}
