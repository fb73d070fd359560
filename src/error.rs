//! Error types shared across the engine.
//!
//! Mirrors the error-kind taxonomy: tag-syntax and shape errors are fatal
//! to schema construction; coercion and resolver errors are collected per
//! selection; dispatch and protocol errors surface at the transport
//! boundary that callers own.

use thiserror::Error;

/// Raised while parsing a single tag string (C1).
#[derive(Debug, Clone, Error)]
#[error("invalid tag `{tag}`: unexpected segment `{segment}`")]
pub struct TagError {
    /// The full tag string that failed to parse.
    pub tag: String,
    /// The offending substring.
    pub segment: String,
}

impl TagError {
    pub(crate) fn new(tag: impl Into<String>, segment: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            segment: segment.into(),
        }
    }
}

/// Raised while combining a record field's shape with its tag (C2), or
/// while walking reachable types to build the resolver index (C3).
#[derive(Debug, Clone, Error)]
pub enum ShapeError {
    /// `args` was present on a tag but the field is not callable.
    #[error("field `{0}` has an args() tag but is not a function")]
    ArgsOnNonFunction(String),
    /// The tag's arg count does not match the function's parameter count.
    #[error("field `{field}` declares {tag_count} tag argument(s) but the function takes {fn_count}")]
    ArgCountMismatch {
        field: String,
        tag_count: usize,
        fn_count: usize,
    },
    /// A function's second return value is not an error-reporting type.
    #[error("field `{0}` returns two values but the second is not an error type")]
    SecondReturnNotError(String),
    /// `subscript` combined with `args`.
    #[error("field `{0}`: subscript cannot be combined with args")]
    SubscriptWithArgs(String),
    /// `subscript` combined with `field_id`.
    #[error("field `{0}`: subscript and field_id are mutually exclusive")]
    SubscriptWithFieldId(String),
    /// `base` given without `subscript`/`field_id`.
    #[error("field `{0}`: base requires subscript or field_id")]
    BaseWithoutSubscriptOrFieldId(String),
    /// `subscript`/`field_id` on a type that is not a list or map.
    #[error("field `{0}`: subscript/field_id requires a list or map type")]
    SubscriptOnNonCollection(String),
    /// A map's key type is neither integer nor string.
    #[error("field `{0}`: map key type must be integer or string")]
    InvalidMapKeyType(String),
    /// `nullable` on a field that isn't a pointer/collection.
    #[error("field `{0}`: nullable is only valid on collections or optional fields")]
    NullableOnNonCollection(String),
    /// Embedding combined with attributes that don't apply to it.
    #[error("field `{0}`: embedded fields cannot declare args/subscript/field_id/nullable")]
    EmbeddedWithIncompatibleTag(String),
    /// A non-function field declared `args(...)`.
    #[error("field `{0}` is not callable but declares arguments")]
    NonFunctionWithArgs(String),
    /// A duplicate GraphQL field name was registered for one record type.
    #[error("duplicate field `{field}` on type `{type_name}`")]
    DuplicateField { type_name: String, field: String },
    /// A cycle was entered before the placeholder guard could prevent it.
    #[error("type `{0}` recurses into itself without an intervening nullable/list boundary")]
    UnguardedRecursion(String),
}

/// Raised while coercing an untyped request value into a resolver's target
/// type (C4). Carries the member path the way `§4.4` requires, e.g. `p.i[3]`.
#[derive(Debug, Clone, Error)]
#[error("cannot coerce value at `{path}`: {reason}")]
pub struct CoercionError {
    /// Dotted/bracketed path to the offending member.
    pub path: String,
    /// Human-readable reason.
    pub reason: String,
}

impl CoercionError {
    pub(crate) fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn prefix(mut self, outer: &str) -> Self {
        self.path = format!("{}{}", outer, self.path);
        self
    }
}

/// A single error attached to one selection in the response `errors` array.
#[derive(Debug, Clone, Error)]
pub enum FieldError {
    /// The value coercer rejected an argument.
    #[error(transparent)]
    Coercion(#[from] CoercionError),
    /// The user-supplied resolver function returned a non-nil error.
    #[error("resolver error: {0}")]
    Resolver(String),
    /// The selection named a field the resolver index has no entry for.
    /// Defensive only; the external validator should have caught this.
    #[error("no such field `{0}`")]
    UnknownField(String),
    /// Two selections at the same level produced the same output key.
    #[error("duplicate key `{0}` in selection result")]
    DuplicateKey(String),
    /// A subscript argument did not address an existing element.
    #[error("no element at subscript `{0}`")]
    NoSuchElement(String),
    /// The request's cancellation context fired before a resolver finished.
    #[error("operation cancelled")]
    Cancelled,
    /// A resolver panicked; converted here rather than propagated.
    #[error("resolver panicked: {0}")]
    Panicked(String),
}

/// Errors produced by the (out-of-scope, externally supplied) schema/query
/// parser and validator, surfaced verbatim.
#[derive(Debug, Clone, Error)]
#[error("query error: {0}")]
pub struct QueryError(pub String);

/// Transport-level errors: bad JSON, unsupported HTTP method, and similar.
/// Distinguished from `FieldError` because these produce a non-200 response
/// with no `data`, rather than a populated `errors` array.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    #[error("invalid request body: {0}")]
    InvalidBody(String),
    #[error("unsupported method `{0}`")]
    UnsupportedMethod(String),
    #[error(transparent)]
    Query(#[from] QueryError),
}

/// The umbrella error type re-exported at the crate root, the way the
/// teacher re-exports its own `Error`.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error(transparent)]
    Tag(#[from] TagError),
    #[error(transparent)]
    Shape(#[from] ShapeError),
    #[error(transparent)]
    Field(#[from] FieldError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
