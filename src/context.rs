//! Per-request state (§3.5). One [`RequestState`] is built per incoming
//! request/subscription and threaded through every resolver call via
//! [`FieldCallContext`]; nothing here is shared across requests, which is
//! what lets cache slots and coercion run without any cross-request lock.

use std::sync::Arc;

use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;

use crate::enums::EnumDictionary;
use crate::registry::ResolverIndex;
use crate::value::CoercedValue;

/// State shared by every resolver call within one request.
pub struct RequestState {
    pub registry: Arc<ResolverIndex>,
    pub enums: Arc<EnumDictionary>,
    /// Query/mutation variable bindings, already JSON-decoded (§4.9).
    pub variables: IndexMap<String, serde_json::Value>,
    /// True while evaluating a mutation's top-level selection set: siblings
    /// run strictly in order rather than concurrently (§5).
    pub serial_siblings: bool,
    /// Schema-wide override forcing serial evaluation everywhere,
    /// independent of operation kind (§5 "a global switch may force fully
    /// serial evaluation for debugging").
    pub force_serial: bool,
    pub cancellation: CancellationToken,
}

impl RequestState {
    pub fn new(
        registry: Arc<ResolverIndex>,
        enums: Arc<EnumDictionary>,
        variables: IndexMap<String, serde_json::Value>,
        force_serial: bool,
    ) -> Self {
        Self {
            registry,
            enums,
            variables,
            serial_siblings: false,
            force_serial,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn concurrent_siblings_allowed(&self) -> bool {
        !self.serial_siblings && !self.force_serial
    }
}

/// The context handed to one resolver invocation: the request-wide state
/// plus this particular call's already-coerced arguments and subscript.
pub struct FieldCallContext<'a> {
    pub state: &'a RequestState,
    /// Coerced argument values, keyed by declared argument name, in the
    /// order bound by the field analyzer (C2) — empty for non-callable
    /// fields.
    pub args: IndexMap<String, CoercedValue>,
    /// The already-coerced subscript/field_id key, when the selection
    /// addressed one element of a list/map field (§4.2).
    pub subscript: Option<crate::shape::MapKey>,
}

impl<'a> FieldCallContext<'a> {
    pub fn new(state: &'a RequestState) -> Self {
        Self {
            state,
            args: IndexMap::new(),
            subscript: None,
        }
    }

    pub fn with_args(mut self, args: IndexMap<String, CoercedValue>) -> Self {
        self.args = args;
        self
    }

    pub fn with_subscript(mut self, subscript: Option<crate::shape::MapKey>) -> Self {
        self.subscript = subscript;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancellation.is_cancelled()
    }
}
