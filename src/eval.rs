//! Selection evaluator (C5, spec.md §4.5) — the engine's core. Walks a
//! prepared operation's selection set against a root or nested record
//! value, dispatching each selection, gathering and coercing arguments,
//! consulting the per-request cache (C6), and assembling an ordered JSON
//! result. A resolver error anywhere aborts the whole evaluation (§9's
//! "stop on first error" resolution) by propagating through `?`.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use indexmap::IndexMap;

use crate::ast::{self, Field, FragmentDefinition, Selection, SelectionSet};
use crate::cache::Fingerprint;
use crate::coerce::coerce;
use crate::concurrency::{evaluate_siblings, with_cancellation};
use crate::context::{FieldCallContext, RequestState};
use crate::error::{CoercionError, FieldError};
use crate::literal::parse_default_literal;
use crate::ordered::OrderedMap;
use crate::registry::{ResolverEntry, TypeIndex};
use crate::shape::{MapKey, Primitive, RecordShape, ResolvedValue, ShapeHint};
use crate::value::{CoercedValue, InputValue};

/// A type-erased record value, as carried by [`ResolvedValue::Record`].
pub type RecordValue = Arc<dyn Any + Send + Sync>;

/// Evaluates one selection set against a record value, returning the
/// ordered `{key: value}` result (§4.5, §3.3 duplicate-key rejection).
/// Sibling selections run concurrently unless `state` says otherwise (§5).
pub fn evaluate_selection_set<'a>(
    state: &'a RequestState,
    set: &'a SelectionSet,
    fragments: &'a IndexMap<String, FragmentDefinition>,
    value: &'a RecordValue,
    shape: &'a RecordShape,
) -> BoxFuture<'a, Result<OrderedMap, FieldError>> {
    Box::pin(async move {
        if state.cancellation.is_cancelled() {
            return Err(FieldError::Cancelled);
        }

        let type_index = state.registry.type_of(shape.type_name).cloned();
        let parallel = state.concurrent_siblings_allowed();

        let futures: Vec<_> = set
            .iter()
            .map(|sel| evaluate_selection(state, sel, fragments, value, shape, type_index.clone()))
            .collect();
        let per_selection = evaluate_siblings(parallel, futures).await?;

        let mut out = OrderedMap::with_capacity(set.len());
        for pairs in per_selection {
            for (key, json) in pairs {
                out.insert(key, json)?;
            }
        }
        Ok(out)
    })
}

/// Dispatches one selection: a field, an inline fragment, or a named
/// fragment spread (§4.5 "dispatch per selection"). Fragments and inline
/// fragments contribute the flattened pairs of their own nested selection
/// set, filtered by type condition; a condition that doesn't match the
/// concrete record's type contributes nothing, since this engine has no
/// notion of interface/union membership beyond the record's own type name.
fn evaluate_selection<'a>(
    state: &'a RequestState,
    sel: &'a Selection,
    fragments: &'a IndexMap<String, FragmentDefinition>,
    value: &'a RecordValue,
    shape: &'a RecordShape,
    type_index: Option<Arc<TypeIndex>>,
) -> BoxFuture<'a, Result<Vec<(String, serde_json::Value)>, FieldError>> {
    Box::pin(async move {
        match sel {
            Selection::Field(field) => {
                if ast::is_skipped(&field.directives) {
                    return Ok(Vec::new());
                }
                if field.name == "__typename" {
                    return Ok(vec![(
                        field.output_key().to_string(),
                        serde_json::json!(shape.type_name),
                    )]);
                }
                let entry = type_index
                    .as_ref()
                    .and_then(|ti| ti.fields.get(&field.name))
                    .cloned()
                    .ok_or_else(|| FieldError::UnknownField(field.name.clone()))?;
                let json = resolve_field(state, &entry, field, fragments, value, shape).await?;
                Ok(vec![(field.output_key().to_string(), json)])
            }
            Selection::InlineFragment(frag) => {
                if ast::is_skipped(&frag.directives) {
                    return Ok(Vec::new());
                }
                if let Some(cond) = &frag.type_condition {
                    if cond != shape.type_name {
                        return Ok(Vec::new());
                    }
                }
                let nested =
                    evaluate_selection_set(state, &frag.selection_set, fragments, value, shape).await?;
                Ok(nested.into_pairs())
            }
            Selection::FragmentSpread(spread) => {
                if ast::is_skipped(&spread.directives) {
                    return Ok(Vec::new());
                }
                let def = fragments
                    .get(&spread.fragment_name)
                    .ok_or_else(|| FieldError::UnknownField(spread.fragment_name.clone()))?;
                if def.type_condition != shape.type_name {
                    return Ok(Vec::new());
                }
                let nested =
                    evaluate_selection_set(state, &def.selection_set, fragments, value, shape).await?;
                Ok(nested.into_pairs())
            }
        }
    })
}

/// Resolves one field selection end to end (§4.5.2): gathers and coerces
/// its arguments and subscript key, walks through any embedding path to
/// reach the record that actually owns the resolver, consults the cache
/// slot when one was allocated, invokes the resolver, and encodes the
/// result (recursing into nested selections for record-typed results).
async fn resolve_field<'a>(
    state: &'a RequestState,
    entry: &'a ResolverEntry,
    field: &'a Field,
    fragments: &'a IndexMap<String, FragmentDefinition>,
    root_value: &'a RecordValue,
    root_shape: &'a RecordShape,
) -> Result<serde_json::Value, FieldError> {
    let computed = resolve_field_value(state, entry, field, root_value, root_shape).await?;
    encode_field_result(state, &computed, &entry.descriptor, field, fragments).await
}

/// The argument/subscript/embed/cache machinery of [`resolve_field`], minus
/// the final by-kind JSON encoding — shared with the subscription root
/// walk (§4.8), which needs the raw [`ResolvedValue::Stream`] rather than
/// an encoded value.
///
/// `subscript` is a synthetic *argument* the client supplies; it is never
/// passed to the resolver (§4.5.2 step 3) but used afterwards to pick the
/// single addressed element out of the returned collection. `field_id`
/// carries no client argument at all — it names a synthetic field the
/// *elements* of the collection carry, handled entirely at encode time by
/// [`encode_field_result`].
async fn resolve_field_value<'a>(
    state: &'a RequestState,
    entry: &'a ResolverEntry,
    field: &'a Field,
    root_value: &'a RecordValue,
    root_shape: &'a RecordShape,
) -> Result<Arc<ResolvedValue>, FieldError> {
    let descriptor = &entry.descriptor;

    let mut args = IndexMap::with_capacity(descriptor.args.len());
    for arg in &descriptor.args {
        let coerced = match field.arguments.get(&arg.name) {
            Some(supplied) => coerce(supplied, &arg.shape, &state.enums, &arg.name)?,
            None => {
                let literal = arg
                    .default_literal
                    .as_deref()
                    .map(parse_default_literal)
                    .unwrap_or(InputValue::Null);
                coerce(&literal, &arg.shape, &state.enums, &arg.name)?
            }
        };
        args.insert(arg.name.clone(), coerced);
    }

    let subscript_key = match descriptor.subscript.as_deref() {
        Some(arg_name) => {
            let default_key_shape = ShapeHint::Scalar(Primitive::Int);
            let key_shape = descriptor.element_type.as_ref().unwrap_or(&default_key_shape);
            let raw = field
                .arguments
                .get(arg_name)
                .cloned()
                .unwrap_or(InputValue::Null);
            let coerced = coerce(&raw, key_shape, &state.enums, arg_name)?;
            Some(apply_base(coerced_to_map_key(&coerced)?, descriptor.base_index))
        }
        None => None,
    };

    let (owner_value, owner_shape) =
        walk_embed_path(state, root_value, root_shape, &entry.embed_path).await?;

    let fingerprint = build_fingerprint(&args, subscript_key.as_ref());
    let ctx = FieldCallContext::new(state)
        .with_args(args)
        .with_subscript(subscript_key.clone());

    let compute = || async {
        let raw = with_cancellation(
            &state.cancellation,
            invoke_resolver(&owner_shape, &owner_value, &ctx, descriptor.position),
        )
        .await?;
        match &subscript_key {
            Some(key) => pick_subscript_element(raw, key),
            None => Ok(raw),
        }
    };

    let computed: Arc<ResolvedValue> = if let Some(slot) = &entry.cache_slot {
        slot.get_or_compute(fingerprint, compute).await?
    } else {
        Arc::new(compute().await?)
    };

    Ok(computed)
}

/// Narrows a resolved collection down to the single element addressed by a
/// `subscript` field's synthetic key (§4.5.2 step 5 "if the field is
/// subscript, instead pick the single element at the synthetic index").
fn pick_subscript_element(value: ResolvedValue, key: &MapKey) -> Result<ResolvedValue, FieldError> {
    match value {
        ResolvedValue::List(mut items) => {
            let index = match key {
                MapKey::Int(i) => *i,
                MapKey::String(s) => {
                    return Err(FieldError::NoSuchElement(format!(
                        "list subscript key must be an integer, got `{s}`"
                    )))
                }
            };
            if index < 0 || index as usize >= items.len() {
                return Err(FieldError::NoSuchElement(index.to_string()));
            }
            Ok(items.remove(index as usize))
        }
        ResolvedValue::Map(mut entries) => {
            match entries.iter().position(|(k, _)| k == key) {
                Some(pos) => Ok(entries.remove(pos).1),
                None => Err(FieldError::NoSuchElement(key.to_string())),
            }
        }
        _ => Err(FieldError::Panicked(
            "subscript field did not resolve to a list or map".to_string(),
        )),
    }
}

/// Resolves a subscription operation's top-level selection set into its raw
/// `(output key, ResolvedValue)` pairs, without the by-kind JSON encoding
/// [`evaluate_selection_set`] performs — a subscription's top-level fields
/// are expected to produce [`ResolvedValue::Stream`] (§4.8 "for each
/// top-level selection that yields a streaming channel"), which the
/// ordinary encoder has no representation for. Fragments/inline fragments
/// at the top level are flattened the same way [`evaluate_selection`] does.
pub fn resolve_subscription_root<'a>(
    state: &'a RequestState,
    set: &'a SelectionSet,
    fragments: &'a IndexMap<String, FragmentDefinition>,
    value: &'a RecordValue,
    shape: &'a RecordShape,
) -> BoxFuture<'a, Result<Vec<(String, Arc<ResolvedValue>)>, FieldError>> {
    Box::pin(async move {
        let type_index = state.registry.type_of(shape.type_name).cloned();
        let mut out = Vec::with_capacity(set.len());
        for sel in set {
            match sel {
                Selection::Field(field) => {
                    if ast::is_skipped(&field.directives) {
                        continue;
                    }
                    let entry = type_index
                        .as_ref()
                        .and_then(|ti| ti.fields.get(&field.name))
                        .cloned()
                        .ok_or_else(|| FieldError::UnknownField(field.name.clone()))?;
                    let resolved = resolve_field_value(state, &entry, field, value, shape).await?;
                    out.push((field.output_key().to_string(), resolved));
                }
                Selection::InlineFragment(frag) => {
                    if ast::is_skipped(&frag.directives) {
                        continue;
                    }
                    if let Some(cond) = &frag.type_condition {
                        if cond != shape.type_name {
                            continue;
                        }
                    }
                    let nested =
                        resolve_subscription_root(state, &frag.selection_set, fragments, value, shape)
                            .await?;
                    out.extend(nested);
                }
                Selection::FragmentSpread(spread) => {
                    if ast::is_skipped(&spread.directives) {
                        continue;
                    }
                    let def = fragments
                        .get(&spread.fragment_name)
                        .ok_or_else(|| FieldError::UnknownField(spread.fragment_name.clone()))?;
                    if def.type_condition != shape.type_name {
                        continue;
                    }
                    let nested =
                        resolve_subscription_root(state, &def.selection_set, fragments, value, shape)
                            .await?;
                    out.extend(nested);
                }
            }
        }
        Ok(out)
    })
}

/// Walks through `embed_path` — positions of enclosing `embedded` fields —
/// to reach the record that actually owns the resolver at the leaf
/// descriptor's position (§3.1 `embedded`, §4.3 promotion). Embedded
/// fields never declare args/subscript, so an empty call context suffices.
async fn walk_embed_path(
    state: &RequestState,
    value: &RecordValue,
    shape: &RecordShape,
    embed_path: &[usize],
) -> Result<(RecordValue, RecordShape), FieldError> {
    let mut cur_value = value.clone();
    let mut cur_shape = shape.clone();
    for &position in embed_path {
        let ctx = FieldCallContext::new(state);
        match invoke_resolver(&cur_shape, &cur_value, &ctx, position).await? {
            ResolvedValue::Record(next_value, next_shape) => {
                cur_value = next_value;
                cur_shape = next_shape;
            }
            _ => {
                return Err(FieldError::Panicked(
                    "embedded field did not resolve to a record".to_string(),
                ))
            }
        }
    }
    Ok((cur_value, cur_shape))
}

/// Invokes a record shape's type-erased resolver, converting a panic inside
/// user resolver code into a [`FieldError::Panicked`] rather than
/// unwinding through the evaluator (§4.5.2, §7).
async fn invoke_resolver(
    shape: &RecordShape,
    value: &RecordValue,
    ctx: &FieldCallContext<'_>,
    position: usize,
) -> Result<ResolvedValue, FieldError> {
    #[cfg(feature = "tracing")]
    let _span = tracing::trace_span!("resolve_field", type_name = shape.type_name, position).entered();
    #[cfg(feature = "log")]
    log::trace!("resolving field {}#{}", shape.type_name, position);

    let fut = (shape.resolve)(value.as_ref(), ctx, position);
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            #[cfg(feature = "tracing")]
            tracing::warn!(type_name = shape.type_name, position, "resolver panicked");
            #[cfg(feature = "log")]
            log::warn!("resolver panicked at {}#{}", shape.type_name, position);
            Err(FieldError::Panicked(panic_message(&panic)))
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "resolver panicked with a non-string payload".to_string()
    }
}

/// Encodes a resolved value into its JSON representation, recursing into a
/// nested record's own selection set (§4.5.2 "by kind" dispatch). Lists and
/// maps encode element-wise, preserving the host collection's observed
/// order; an enum ordinal is looked up by name in the request's enum
/// dictionary (§3.4); a custom scalar defers to its registered encode hook.
pub(crate) fn encode_resolved<'a>(
    state: &'a RequestState,
    value: &'a ResolvedValue,
    field: &'a Field,
    fragments: &'a IndexMap<String, FragmentDefinition>,
) -> BoxFuture<'a, Result<serde_json::Value, FieldError>> {
    Box::pin(async move {
        match value {
            ResolvedValue::Null => Ok(serde_json::Value::Null),
            ResolvedValue::Bool(b) => Ok(serde_json::json!(b)),
            ResolvedValue::Int(i) => Ok(serde_json::json!(i)),
            ResolvedValue::Float(f) => Ok(serde_json::json!(f)),
            ResolvedValue::String(s) => Ok(serde_json::json!(s)),
            ResolvedValue::EnumOrdinal(ordinal, enum_type) => {
                let (ordinal, enum_type) = (*ordinal, *enum_type);
                match state.enums.name_of(enum_type, ordinal) {
                    Some(name) => Ok(serde_json::json!(name)),
                    None => Err(FieldError::Panicked(format!(
                        "ordinal {ordinal} has no member in enum `{enum_type}`"
                    ))),
                }
            }
            ResolvedValue::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(encode_resolved(state, item, field, fragments).await?);
                }
                Ok(serde_json::Value::Array(out))
            }
            ResolvedValue::Map(entries) => {
                // A map field's GraphQL-visible type is `[T]` (§3.1 "result
                // type ... for list/map/set fields, the element type"); keys
                // only ever surface via `subscript`/`field_id`, handled
                // before and around this function respectively, so a plain
                // map still just emits its values in observed order.
                let mut out = Vec::with_capacity(entries.len());
                for (_, item) in entries {
                    out.push(encode_resolved(state, item, field, fragments).await?);
                }
                Ok(serde_json::Value::Array(out))
            }
            ResolvedValue::Record(record_value, record_shape) => {
                let nested = evaluate_selection_set(
                    state,
                    &field.selection_set,
                    fragments,
                    record_value,
                    record_shape,
                )
                .await?;
                Ok(nested.into_json())
            }
            ResolvedValue::CustomScalar(inner, custom_shape) => {
                Ok((custom_shape.encode)(inner.as_ref()))
            }
            ResolvedValue::Stream(_) => Err(FieldError::Panicked(
                "a stream value can only be produced by a subscription's root field".to_string(),
            )),
        }
    })
}

/// Encodes one field's resolved value, taking `field_id` into account: a
/// plain field (or one already narrowed by `subscript` in
/// [`resolve_field_value`]) encodes the ordinary way; a `field_id` field's
/// list/map elements each carry a synthesized `id`-named field derived from
/// their position or key (§4.5.2 step 5).
async fn encode_field_result<'a>(
    state: &'a RequestState,
    computed: &'a ResolvedValue,
    descriptor: &'a crate::descriptor::FieldDescriptor,
    field: &'a Field,
    fragments: &'a IndexMap<String, FragmentDefinition>,
) -> Result<serde_json::Value, FieldError> {
    match &descriptor.field_id {
        Some(id_name) => {
            encode_with_field_id(state, computed, id_name, descriptor.base_index, field, fragments).await
        }
        None => encode_resolved(state, computed, field, fragments).await,
    }
}

/// Encodes a `field_id` field's collection, synthesizing each element's id
/// (offset by `base_index` for a list; a map key carries no offset, §3.1
/// "base-index ... only meaningful with subscript or field-id on a list").
fn encode_with_field_id<'a>(
    state: &'a RequestState,
    computed: &'a ResolvedValue,
    id_name: &'a str,
    base_index: i64,
    field: &'a Field,
    fragments: &'a IndexMap<String, FragmentDefinition>,
) -> BoxFuture<'a, Result<serde_json::Value, FieldError>> {
    Box::pin(async move {
        match computed {
            ResolvedValue::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    let synthetic_id = serde_json::json!(index as i64 + base_index);
                    out.push(
                        encode_element_with_synthetic_id(state, item, id_name, synthetic_id, field, fragments)
                            .await?,
                    );
                }
                Ok(serde_json::Value::Array(out))
            }
            ResolvedValue::Map(entries) => {
                let mut out = Vec::with_capacity(entries.len());
                for (key, item) in entries {
                    let synthetic_id = map_key_to_json(key);
                    out.push(
                        encode_element_with_synthetic_id(state, item, id_name, synthetic_id, field, fragments)
                            .await?,
                    );
                }
                Ok(serde_json::Value::Array(out))
            }
            other => encode_resolved(state, other, field, fragments).await,
        }
    })
}

/// Encodes one `field_id` collection element, substituting `synthetic_id`
/// for the selection named `id_name` when the element is a record — the
/// synthesized value exists only in the response, never as a real resolver.
async fn encode_element_with_synthetic_id<'a>(
    state: &'a RequestState,
    item: &'a ResolvedValue,
    id_name: &'a str,
    synthetic_id: serde_json::Value,
    field: &'a Field,
    fragments: &'a IndexMap<String, FragmentDefinition>,
) -> Result<serde_json::Value, FieldError> {
    match item {
        ResolvedValue::Record(record_value, record_shape) => {
            let nested = evaluate_selection_set_with_synthetic_id(
                state,
                &field.selection_set,
                fragments,
                record_value,
                record_shape,
                id_name,
                &synthetic_id,
            )
            .await?;
            Ok(nested.into_json())
        }
        other => encode_resolved(state, other, field, fragments).await,
    }
}

/// Like [`evaluate_selection_set`], but a selection named `id_name` resolves
/// to `synthetic_id` directly rather than through the resolver index — the
/// mechanism behind `field_id` (§3.1, §4.5.2 step 5 "each element carries
/// its key as id").
fn evaluate_selection_set_with_synthetic_id<'a>(
    state: &'a RequestState,
    set: &'a SelectionSet,
    fragments: &'a IndexMap<String, FragmentDefinition>,
    value: &'a RecordValue,
    shape: &'a RecordShape,
    id_name: &'a str,
    synthetic_id: &'a serde_json::Value,
) -> BoxFuture<'a, Result<OrderedMap, FieldError>> {
    Box::pin(async move {
        if state.cancellation.is_cancelled() {
            return Err(FieldError::Cancelled);
        }

        let type_index = state.registry.type_of(shape.type_name).cloned();
        let parallel = state.concurrent_siblings_allowed();

        let futures: Vec<_> = set
            .iter()
            .map(|sel| {
                evaluate_selection_with_synthetic_id(
                    state,
                    sel,
                    fragments,
                    value,
                    shape,
                    type_index.clone(),
                    id_name,
                    synthetic_id,
                )
            })
            .collect();
        let per_selection = evaluate_siblings(parallel, futures).await?;

        let mut out = OrderedMap::with_capacity(set.len());
        for pairs in per_selection {
            for (key, json) in pairs {
                out.insert(key, json)?;
            }
        }
        Ok(out)
    })
}

fn evaluate_selection_with_synthetic_id<'a>(
    state: &'a RequestState,
    sel: &'a Selection,
    fragments: &'a IndexMap<String, FragmentDefinition>,
    value: &'a RecordValue,
    shape: &'a RecordShape,
    type_index: Option<Arc<TypeIndex>>,
    id_name: &'a str,
    synthetic_id: &'a serde_json::Value,
) -> BoxFuture<'a, Result<Vec<(String, serde_json::Value)>, FieldError>> {
    Box::pin(async move {
        match sel {
            Selection::Field(f) if f.name == id_name => {
                if ast::is_skipped(&f.directives) {
                    return Ok(Vec::new());
                }
                Ok(vec![(f.output_key().to_string(), synthetic_id.clone())])
            }
            Selection::InlineFragment(frag) => {
                if ast::is_skipped(&frag.directives) {
                    return Ok(Vec::new());
                }
                if let Some(cond) = &frag.type_condition {
                    if cond != shape.type_name {
                        return Ok(Vec::new());
                    }
                }
                let nested = evaluate_selection_set_with_synthetic_id(
                    state,
                    &frag.selection_set,
                    fragments,
                    value,
                    shape,
                    id_name,
                    synthetic_id,
                )
                .await?;
                Ok(nested.into_pairs())
            }
            Selection::FragmentSpread(spread) => {
                if ast::is_skipped(&spread.directives) {
                    return Ok(Vec::new());
                }
                let def = fragments
                    .get(&spread.fragment_name)
                    .ok_or_else(|| FieldError::UnknownField(spread.fragment_name.clone()))?;
                if def.type_condition != shape.type_name {
                    return Ok(Vec::new());
                }
                let nested = evaluate_selection_set_with_synthetic_id(
                    state,
                    &def.selection_set,
                    fragments,
                    value,
                    shape,
                    id_name,
                    synthetic_id,
                )
                .await?;
                Ok(nested.into_pairs())
            }
            _ => evaluate_selection(state, sel, fragments, value, shape, type_index).await,
        }
    })
}

fn map_key_to_json(key: &MapKey) -> serde_json::Value {
    match key {
        MapKey::Int(i) => serde_json::json!(i),
        MapKey::String(s) => serde_json::json!(s),
    }
}

/// Subtracts a field's declared `base` offset from an integer subscript key
/// (§3.1 `base=N`), so the resolver always receives a zero-based index
/// regardless of the schema author's chosen display numbering. Non-integer
/// keys (string subscripts) are unaffected — `base` only makes sense
/// against an ordinal index.
fn apply_base(key: MapKey, base: i64) -> MapKey {
    match key {
        MapKey::Int(i) => MapKey::Int(i - base),
        other => other,
    }
}

fn coerced_to_map_key(value: &CoercedValue) -> Result<MapKey, FieldError> {
    match value {
        CoercedValue::Int(i) => Ok(MapKey::Int(*i)),
        CoercedValue::String(s) => Ok(MapKey::String(s.clone())),
        other => Err(FieldError::Coercion(CoercionError::new(
            "",
            format!("subscript key must be an integer or string, got {other:?}"),
        ))),
    }
}

fn map_key_to_coerced(key: &MapKey) -> CoercedValue {
    match key {
        MapKey::Int(i) => CoercedValue::Int(*i),
        MapKey::String(s) => CoercedValue::String(s.clone()),
    }
}

/// Builds the cache fingerprint for one resolver invocation (§4.6): the
/// declared argument tuple in order, plus a synthetic `$subscript` entry
/// when the field addressed one collection element — relevant only for a
/// field explicitly marked `@cacheControl`, since a subscript/field_id
/// field is never otherwise callable (and so never otherwise cached).
fn build_fingerprint(args: &IndexMap<String, CoercedValue>, subscript: Option<&MapKey>) -> Fingerprint {
    let subscript_coerced = subscript.map(map_key_to_coerced);
    let mut pairs: Vec<(&str, &CoercedValue)> = args.iter().map(|(k, v)| (k.as_str(), v)).collect();
    if let Some(sc) = &subscript_coerced {
        pairs.push(("$subscript", sc));
    }
    if pairs.is_empty() {
        Fingerprint::zero_args()
    } else {
        Fingerprint::of(&pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FieldCallContext as Ctx;
    use crate::registry::ResolverIndex;
    use crate::shape::{FieldSpec, FunctionShape, Resolvable};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Resolvable for Counter {
        fn type_name() -> &'static str {
            "Counter"
        }
        fn field_specs() -> &'static [FieldSpec] {
            static FIELDS: &[FieldSpec] = &[FieldSpec {
                rust_name: "hits",
                tag: "hits,args(a:Int=0)",
                legacy_tag: None,
                shape: ShapeHint::Function(FunctionShape {
                    has_context: false,
                    has_error: false,
                    params: vec![ShapeHint::Scalar(Primitive::Int)],
                    ret: Box::new(ShapeHint::Scalar(Primitive::Int)),
                }),
                embedded: false,
            }];
            FIELDS
        }
        async fn resolve_field(
            &self,
            ctx: &Ctx<'_>,
            position: usize,
        ) -> Result<ResolvedValue, FieldError> {
            assert_eq!(position, 0);
            self.calls.fetch_add(1, Ordering::SeqCst);
            let a = match ctx.args.get("a") {
                Some(CoercedValue::Int(i)) => *i,
                _ => 0,
            };
            Ok(ResolvedValue::Int(a))
        }
    }

    fn field(name: &str, args: Vec<(&str, InputValue)>) -> Field {
        Field {
            alias: None,
            name: name.to_string(),
            arguments: args.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            directives: Vec::new(),
            selection_set: Vec::new(),
        }
    }

    fn state(index: ResolverIndex) -> RequestState {
        RequestState::new(
            Arc::new(index),
            Arc::new(crate::enums::EnumDictionary::build(HashMap::new())),
            IndexMap::new(),
            false,
        )
    }

    #[tokio::test]
    async fn same_fingerprint_hits_cache_once() {
        let root = RecordShape::of::<Counter>();
        let index = ResolverIndex::build(&[root.clone()], true).unwrap();
        let st = state(index);
        let calls = Arc::new(AtomicUsize::new(0));
        let value: RecordValue = Arc::new(Counter { calls: calls.clone() });
        let fragments = IndexMap::new();

        let set = vec![Selection::Field(field("hits", vec![("a", InputValue::Int(1))]))];
        evaluate_selection_set(&st, &set, &fragments, &value, &root).await.unwrap();
        evaluate_selection_set(&st, &set, &fragments, &value, &root).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_args_invoke_separately() {
        let root = RecordShape::of::<Counter>();
        let index = ResolverIndex::build(&[root.clone()], true).unwrap();
        let st = state(index);
        let calls = Arc::new(AtomicUsize::new(0));
        let value: RecordValue = Arc::new(Counter { calls: calls.clone() });
        let fragments = IndexMap::new();

        let set_a = vec![Selection::Field(field("hits", vec![("a", InputValue::Int(1))]))];
        let set_b = vec![Selection::Field(field("hits", vec![("a", InputValue::Int(2))]))];
        evaluate_selection_set(&st, &set_a, &fragments, &value, &root).await.unwrap();
        evaluate_selection_set(&st, &set_b, &fragments, &value, &root).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn typename_is_special_cased() {
        let root = RecordShape::of::<Counter>();
        let index = ResolverIndex::build(&[root.clone()], true).unwrap();
        let st = state(index);
        let value: RecordValue = Arc::new(Counter {
            calls: Arc::new(AtomicUsize::new(0)),
        });
        let fragments = IndexMap::new();
        let set = vec![Selection::Field(field("__typename", vec![]))];
        let result = evaluate_selection_set(&st, &set, &fragments, &value, &root).await.unwrap();
        assert_eq!(result.into_json(), serde_json::json!({"__typename": "Counter"}));
    }

    #[tokio::test]
    async fn skip_directive_omits_key() {
        let root = RecordShape::of::<Counter>();
        let index = ResolverIndex::build(&[root.clone()], true).unwrap();
        let st = state(index);
        let value: RecordValue = Arc::new(Counter {
            calls: Arc::new(AtomicUsize::new(0)),
        });
        let fragments = IndexMap::new();
        let mut f = field("hits", vec![("a", InputValue::Int(1))]);
        let mut skip_args = IndexMap::new();
        skip_args.insert("if".to_string(), InputValue::Bool(true));
        f.directives.push(ast::Directive {
            name: "skip".to_string(),
            arguments: skip_args,
        });
        let set = vec![Selection::Field(f)];
        let result = evaluate_selection_set(&st, &set, &fragments, &value, &root).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn unknown_field_is_an_error() {
        let root = RecordShape::of::<Counter>();
        let index = ResolverIndex::build(&[root.clone()], true).unwrap();
        let st = state(index);
        let value: RecordValue = Arc::new(Counter {
            calls: Arc::new(AtomicUsize::new(0)),
        });
        let fragments = IndexMap::new();
        let set = vec![Selection::Field(field("nope", vec![]))];
        let err = evaluate_selection_set(&st, &set, &fragments, &value, &root).await;
        assert!(matches!(err, Err(FieldError::UnknownField(_))));
    }

    struct Slice;

    #[async_trait::async_trait]
    impl Resolvable for Slice {
        fn type_name() -> &'static str {
            "Slice"
        }
        fn field_specs() -> &'static [FieldSpec] {
            static FIELDS: &[FieldSpec] = &[FieldSpec {
                rust_name: "slice",
                tag: "slice,subscript",
                legacy_tag: None,
                shape: ShapeHint::List(Box::new(ShapeHint::Scalar(Primitive::String))),
                embedded: false,
            }];
            FIELDS
        }
        async fn resolve_field(&self, _ctx: &Ctx<'_>, _position: usize) -> Result<ResolvedValue, FieldError> {
            Ok(ResolvedValue::List(vec![
                ResolvedValue::String("zero".to_string()),
                ResolvedValue::String("".to_string()),
                ResolvedValue::String("two".to_string()),
            ]))
        }
    }

    #[tokio::test]
    async fn subscript_picks_single_element() {
        let root = RecordShape::of::<Slice>();
        let index = ResolverIndex::build(&[root.clone()], true).unwrap();
        let st = state(index);
        let value: RecordValue = Arc::new(Slice);
        let fragments = IndexMap::new();
        let set = vec![Selection::Field(field("slice", vec![("id", InputValue::Int(2))]))];
        let result = evaluate_selection_set(&st, &set, &fragments, &value, &root).await.unwrap();
        assert_eq!(result.into_json(), serde_json::json!({"slice": "two"}));
    }

    #[tokio::test]
    async fn subscript_out_of_range_is_no_such_element() {
        let root = RecordShape::of::<Slice>();
        let index = ResolverIndex::build(&[root.clone()], true).unwrap();
        let st = state(index);
        let value: RecordValue = Arc::new(Slice);
        let fragments = IndexMap::new();
        let set = vec![Selection::Field(field("slice", vec![("id", InputValue::Int(9))]))];
        let err = evaluate_selection_set(&st, &set, &fragments, &value, &root).await;
        assert!(matches!(err, Err(FieldError::NoSuchElement(_))));
    }

    struct Person {
        name: String,
    }

    #[async_trait::async_trait]
    impl Resolvable for Person {
        fn type_name() -> &'static str {
            "Person"
        }
        fn field_specs() -> &'static [FieldSpec] {
            static FIELDS: &[FieldSpec] = &[FieldSpec {
                rust_name: "name",
                tag: "",
                legacy_tag: None,
                shape: ShapeHint::Scalar(Primitive::String),
                embedded: false,
            }];
            FIELDS
        }
        async fn resolve_field(&self, _ctx: &Ctx<'_>, position: usize) -> Result<ResolvedValue, FieldError> {
            assert_eq!(position, 0);
            Ok(ResolvedValue::String(self.name.clone()))
        }
    }

    struct Roster;

    #[async_trait::async_trait]
    impl Resolvable for Roster {
        fn type_name() -> &'static str {
            "Roster"
        }
        fn field_specs() -> &'static [FieldSpec] {
            static FIELDS: &[FieldSpec] = &[FieldSpec {
                rust_name: "members",
                tag: "members,field_id,base=1",
                legacy_tag: None,
                shape: ShapeHint::List(Box::new(ShapeHint::Record(|| RecordShape::of::<Person>()))),
                embedded: false,
            }];
            FIELDS
        }
        async fn resolve_field(&self, _ctx: &Ctx<'_>, _position: usize) -> Result<ResolvedValue, FieldError> {
            Ok(ResolvedValue::List(vec![
                ResolvedValue::Record(Arc::new(Person { name: "Ada".to_string() }), RecordShape::of::<Person>()),
                ResolvedValue::Record(Arc::new(Person { name: "Lin".to_string() }), RecordShape::of::<Person>()),
            ]))
        }
    }

    #[tokio::test]
    async fn field_id_synthesizes_id_offset_by_base() {
        let root = RecordShape::of::<Roster>();
        let index = ResolverIndex::build(&[root.clone()], true).unwrap();
        let st = state(index);
        let value: RecordValue = Arc::new(Roster);
        let fragments = IndexMap::new();
        let mut members_field = field("members", vec![]);
        members_field.selection_set = vec![
            Selection::Field(field("id", vec![])),
            Selection::Field(field("name", vec![])),
        ];
        let set = vec![Selection::Field(members_field)];
        let result = evaluate_selection_set(&st, &set, &fragments, &value, &root).await.unwrap();
        assert_eq!(
            result.into_json(),
            serde_json::json!({"members": [
                {"id": 1, "name": "Ada"},
                {"id": 2, "name": "Lin"},
            ]})
        );
    }

    struct Bag;

    #[async_trait::async_trait]
    impl Resolvable for Bag {
        fn type_name() -> &'static str {
            "Bag"
        }
        fn field_specs() -> &'static [FieldSpec] {
            static FIELDS: &[FieldSpec] = &[FieldSpec {
                rust_name: "items",
                tag: "",
                legacy_tag: None,
                shape: ShapeHint::Map(
                    Box::new(ShapeHint::Scalar(Primitive::String)),
                    Box::new(ShapeHint::Scalar(Primitive::Int)),
                ),
                embedded: false,
            }];
            FIELDS
        }
        async fn resolve_field(&self, _ctx: &Ctx<'_>, _position: usize) -> Result<ResolvedValue, FieldError> {
            Ok(ResolvedValue::Map(vec![
                (MapKey::String("a".to_string()), ResolvedValue::Int(1)),
                (MapKey::String("b".to_string()), ResolvedValue::Int(2)),
            ]))
        }
    }

    #[tokio::test]
    async fn plain_map_field_encodes_as_array_of_values() {
        let root = RecordShape::of::<Bag>();
        let index = ResolverIndex::build(&[root.clone()], true).unwrap();
        let st = state(index);
        let value: RecordValue = Arc::new(Bag);
        let fragments = IndexMap::new();
        let set = vec![Selection::Field(field("items", vec![]))];
        let result = evaluate_selection_set(&st, &set, &fragments, &value, &root).await.unwrap();
        assert_eq!(result.into_json(), serde_json::json!({"items": [1, 2]}));
    }
}
