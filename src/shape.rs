//! Compile-time shape tables standing in for the source system's runtime
//! reflection (see SPEC_FULL.md §1 host-language adaptation, spec.md §9).
//!
//! Every record type that participates in a schema implements
//! [`Resolvable`], returning a static [`RecordShape`]: the sum-type
//! descriptor design note recommends (`struct | function | list | map |
//! scalar | enum`) plus a type-erased per-field accessor. The tag parser
//! (C1) and field analyzer (C2) still run once at schema-build time,
//! unchanged from spec.md — only the source of per-field shape
//! information moves from reflection to this table.

use std::any::Any;
use std::fmt;

use futures::future::BoxFuture;

use crate::error::FieldError;

/// A resolved value, the currency the selection evaluator (C5) operates on.
/// This is the Rust realization of "by kind" dispatch in spec.md §4.5.2.
pub enum ResolvedValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// An enum value; carries the ordinal plus its declared enum type name
    /// so the evaluator can look the member name up via the enum
    /// dictionary (§3.4) without needing the originating field's shape in
    /// scope at encode time.
    EnumOrdinal(i64, &'static str),
    List(Vec<ResolvedValue>),
    /// Preserves the host map's observed insertion order (§4.5 "Ordering").
    Map(Vec<(MapKey, ResolvedValue)>),
    /// A nested record, type-erased; `shape` is how the evaluator recurses.
    Record(std::sync::Arc<dyn Any + Send + Sync>, RecordShape),
    /// A custom scalar value, encoded via its registered hook.
    CustomScalar(std::sync::Arc<dyn Any + Send + Sync>, CustomScalarShape),
    /// A streaming channel (subscriptions only); the evaluator hands this
    /// to the subscription protocol layer rather than encoding it inline.
    Stream(futures::stream::BoxStream<'static, Result<ResolvedValue, FieldError>>),
}

impl fmt::Debug for ResolvedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedValue::Null => write!(f, "Null"),
            ResolvedValue::Bool(b) => write!(f, "Bool({b})"),
            ResolvedValue::Int(i) => write!(f, "Int({i})"),
            ResolvedValue::Float(v) => write!(f, "Float({v})"),
            ResolvedValue::String(s) => write!(f, "String({s:?})"),
            ResolvedValue::EnumOrdinal(o, name) => write!(f, "EnumOrdinal({name}, {o})"),
            ResolvedValue::List(items) => f.debug_list().entries(items).finish(),
            ResolvedValue::Map(entries) => f.debug_map().entries(entries.iter().map(|(k, v)| (k, v))).finish(),
            ResolvedValue::Record(_, shape) => write!(f, "Record({})", shape.type_name),
            ResolvedValue::CustomScalar(_, shape) => write!(f, "CustomScalar({})", shape.type_name),
            ResolvedValue::Stream(_) => write!(f, "Stream"),
        }
    }
}

/// A map/subscript key: spec.md §4.2 requires map keys be integer or string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MapKey {
    Int(i64),
    String(String),
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapKey::Int(i) => write!(f, "{i}"),
            MapKey::String(s) => write!(f, "{s}"),
        }
    }
}

/// One of the host-shape hints a [`FieldSpec`] carries; combined with the
/// tag string by the field analyzer (C2) to produce a [`FieldDescriptor`].
#[derive(Clone)]
pub enum ShapeHint {
    Scalar(Primitive),
    /// Names a registered custom scalar type.
    CustomScalar(fn() -> CustomScalarShape),
    /// Names an enum type (looked up in the enum dictionary, §3.4).
    Enum(&'static str),
    /// A pointer-bearing field; analyzed type continues with the inner hint.
    Option(Box<ShapeHint>),
    List(Box<ShapeHint>),
    Map(Box<ShapeHint>, Box<ShapeHint>),
    /// A nested record type; the `fn` defers construction of its
    /// [`RecordShape`] so mutually-recursive record graphs don't require
    /// an eagerly-built, infinitely large table.
    Record(fn() -> RecordShape),
    Function(FunctionShape),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Primitive {
    Int,
    Float,
    String,
    Bool,
    Id,
}

#[derive(Clone)]
pub struct FunctionShape {
    pub has_context: bool,
    pub has_error: bool,
    pub params: Vec<ShapeHint>,
    pub ret: Box<ShapeHint>,
}

/// Static per-field metadata a [`Resolvable`] implementation supplies: the
/// field's Rust identifier (reflection would have given us this), its raw
/// tag string(s), and its shape hint.
#[derive(Clone)]
pub struct FieldSpec {
    /// The record field's Rust name. A leading `_` marks a field kept only
    /// to register a reachable type, mirroring "unexported fields named
    /// with a single underscore are retained" (spec.md §4.2).
    pub rust_name: &'static str,
    /// The current tag key's value.
    pub tag: &'static str,
    /// The legacy `graphql` tag key's value, if present (spec.md §6, §9).
    pub legacy_tag: Option<&'static str>,
    pub shape: ShapeHint,
    /// This field is an anonymous composition whose members should be
    /// promoted into the enclosing record (spec.md §3.1 `embedded`).
    pub embedded: bool,
}

impl FieldSpec {
    /// The tag string the field analyzer should use: current key first,
    /// falling back to the legacy `graphql` key.
    pub fn effective_tag(&self) -> &'static str {
        if !self.tag.is_empty() {
            self.tag
        } else {
            self.legacy_tag.unwrap_or("")
        }
    }
}

pub type ResolveFieldFn =
    for<'a> fn(&'a (dyn Any + Send + Sync), &'a crate::context::FieldCallContext<'a>, usize) -> BoxFuture<'a, Result<ResolvedValue, FieldError>>;

/// The compiled, type-erased descriptor of one record type: a vtable of
/// sorts, built once by [`RecordShape::of`].
#[derive(Clone)]
pub struct RecordShape {
    pub type_name: &'static str,
    pub fields: std::sync::Arc<Vec<FieldSpec>>,
    pub resolve: ResolveFieldFn,
}

impl RecordShape {
    pub fn of<T: Resolvable>() -> Self {
        Self {
            type_name: T::type_name(),
            fields: std::sync::Arc::new(T::field_specs().to_vec()),
            resolve: resolve_shim::<T>,
        }
    }
}

fn resolve_shim<'a, T: Resolvable>(
    value: &'a (dyn Any + Send + Sync),
    ctx: &'a crate::context::FieldCallContext<'a>,
    position: usize,
) -> BoxFuture<'a, Result<ResolvedValue, FieldError>> {
    match value.downcast_ref::<T>() {
        Some(record) => Box::pin(record.resolve_field(ctx, position)),
        None => Box::pin(async move {
            Err(FieldError::Panicked(format!(
                "record shape/value type mismatch for `{}`",
                T::type_name()
            )))
        }),
    }
}

/// A custom scalar's encode/decode hooks, type-erased the same way
/// [`RecordShape`] erases per-record resolution.
#[derive(Clone)]
pub struct CustomScalarShape {
    pub type_name: &'static str,
    pub encode: fn(&(dyn Any + Send + Sync)) -> serde_json::Value,
    pub decode: fn(&str) -> Result<std::sync::Arc<dyn Any + Send + Sync>, String>,
}

/// Implemented by every record type reachable from a schema's root
/// records. Stands in for the source system's runtime reflection: the
/// shape table ([`field_specs`]) takes the place of iterating struct
/// fields, and [`resolve_field`] takes the place of dynamically invoking
/// a field/method by index.
#[async_trait::async_trait]
pub trait Resolvable: Send + Sync + Sized + 'static {
    fn type_name() -> &'static str;
    fn field_specs() -> &'static [FieldSpec];

    /// Produces the value for the field at `position` in [`field_specs`].
    /// For callable fields, `ctx` carries the already-coerced argument
    /// tuple (and the cancellation context, when the field declared one).
    async fn resolve_field(
        &self,
        ctx: &crate::context::FieldCallContext<'_>,
        position: usize,
    ) -> Result<ResolvedValue, FieldError>;
}
