//! Request dispatch (C9, §4.9). Takes an already-decoded [`RequestEnvelope`]
//! — the out-of-scope HTTP/JSON transport's output — and the schema's root
//! records, and returns a [`Response`] ready for `{data, errors?}`
//! serialization. CORS, method routing, and HTTP status concerns are
//! intentionally not modeled here (§1 Non-goals "HTTP transport sockets");
//! only the number-normalization and root-record selection logic spec.md
//! §4.9 actually assigns to this component live here.

use std::sync::Arc;

use indexmap::IndexMap;
use itertools::Itertools;
use serde::Deserialize;

use crate::ast::{AstProvider, FragmentDefinition, OperationKind, Selection, SelectionSet};
use crate::context::RequestState;
use crate::enums::EnumDictionary;
use crate::error::DispatchError;
use crate::eval::{self, RecordValue};
use crate::message::ErrorPayload;
use crate::registry::ResolverIndex;
use crate::shape::RecordShape;

/// A decoded `{query, operationName?, variables?}` request body (§6 HTTP,
/// §4.9 "decode ... using a number-preserving JSON mode").
#[derive(Debug, Clone, Deserialize)]
pub struct RequestEnvelope {
    pub query: String,
    #[serde(rename = "operationName", default)]
    pub operation_name: Option<String>,
    #[serde(default)]
    pub variables: serde_json::Map<String, serde_json::Value>,
}

/// The result of executing one request: an ordered `data` value (§3.3) plus
/// whatever field errors were collected before evaluation stopped (§9
/// "stop on first error" is kept, so there is at most one here in
/// practice, but the shape stays a `Vec` to match the wire envelope).
#[derive(Debug, Clone)]
pub struct Response {
    pub data: serde_json::Value,
    pub errors: Vec<ErrorPayload>,
}

impl Response {
    /// Builds the `{"data": ..., "errors"?: [...]}` envelope (§6 "Success
    /// body"). `errors` is omitted entirely when empty, matching the `?`
    /// in spec.md's own grammar for the field.
    pub fn into_json(self) -> serde_json::Value {
        let mut obj = serde_json::Map::with_capacity(2);
        obj.insert("data".to_string(), self.data);
        if !self.errors.is_empty() {
            let errors = self
                .errors
                .into_iter()
                .map(|e| serde_json::json!({ "message": e.message }))
                .collect();
            obj.insert("errors".to_string(), serde_json::Value::Array(errors));
        }
        serde_json::Value::Object(obj)
    }
}

/// One configured root record: its compiled shape plus the concrete,
/// type-erased value to resolve fields against (typically a unit struct or
/// a small context-holding struct per schema).
pub type Root = (RecordShape, RecordValue);

/// Executes one query or mutation request end to end: parses it via the
/// supplied [`AstProvider`], picks the first configured root record whose
/// type actually has a matching top-level field (§4.9 "multiple roots are
/// allowed ... the first to produce any top-level field wins"), and
/// evaluates its selection set (C5).
///
/// Subscription operations are rejected here — they belong to the
/// websocket transport (C8, [`crate::subscription`]), not this path.
pub async fn execute_request(
    registry: &Arc<ResolverIndex>,
    enums: &Arc<EnumDictionary>,
    ast_provider: &dyn AstProvider,
    schema_text: &str,
    query_roots: &[Root],
    mutation_roots: &[Root],
    envelope: RequestEnvelope,
    force_serial: bool,
) -> Result<Response, DispatchError> {
    let variables: IndexMap<String, serde_json::Value> = envelope.variables.into_iter().collect();

    let op = ast_provider.prepare(
        schema_text,
        &envelope.query,
        envelope.operation_name.as_deref(),
        &variables,
    )?;

    let roots = match op.kind {
        OperationKind::Query => query_roots,
        OperationKind::Mutation => mutation_roots,
        OperationKind::Subscription => {
            return Err(DispatchError::UnsupportedMethod(
                "subscription operations must be dispatched over the websocket transport".to_string(),
            ))
        }
    };

    let (shape, value) = select_root(registry, roots, &op.selection_set, &op.fragments).ok_or_else(|| {
        let candidates = roots.iter().map(|(s, _)| s.type_name).join(", ");
        DispatchError::InvalidBody(format!(
            "no configured root record among [{candidates}] has a matching top-level field"
        ))
    })?;

    let mut state = RequestState::new(registry.clone(), enums.clone(), variables, force_serial);
    state.serial_siblings = op.kind == OperationKind::Mutation;

    match eval::evaluate_selection_set(&state, &op.selection_set, &op.fragments, value, shape).await {
        Ok(result) => Ok(Response {
            data: result.into_json(),
            errors: Vec::new(),
        }),
        Err(e) => Ok(Response {
            data: serde_json::Value::Null,
            errors: vec![ErrorPayload::from(&e)],
        }),
    }
}

/// Picks the first root whose record type declares at least one of the
/// operation's top-level field names, falling through inline fragments and
/// fragment spreads along the way. Falls back to the first configured root
/// if none matches (so a genuinely empty selection, or one the external
/// validator should already have rejected, still has something to
/// evaluate against rather than failing dispatch outright).
fn select_root<'a>(
    registry: &ResolverIndex,
    roots: &'a [Root],
    set: &SelectionSet,
    fragments: &IndexMap<String, FragmentDefinition>,
) -> Option<&'a Root> {
    roots
        .iter()
        .find(|(shape, _)| selection_matches_type(registry, shape.type_name, set, fragments))
        .or_else(|| roots.first())
}

fn selection_matches_type(
    registry: &ResolverIndex,
    type_name: &str,
    set: &SelectionSet,
    fragments: &IndexMap<String, FragmentDefinition>,
) -> bool {
    let Some(type_index) = registry.type_of(type_name) else {
        return false;
    };
    set.iter().any(|sel| match sel {
        Selection::Field(f) => f.name == "__typename" || type_index.fields.contains_key(&f.name),
        Selection::InlineFragment(frag) => {
            frag.type_condition
                .as_deref()
                .map(|cond| cond == type_name)
                .unwrap_or(true)
                && selection_matches_type(registry, type_name, &frag.selection_set, fragments)
        }
        Selection::FragmentSpread(spread) => fragments
            .get(&spread.fragment_name)
            .map(|def| {
                def.type_condition == type_name
                    && selection_matches_type(registry, type_name, &def.selection_set, fragments)
            })
            .unwrap_or(false),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Directive, Field, PreparedOperation};
    use crate::error::{FieldError, QueryError};
    use crate::shape::{FieldSpec, Primitive, Resolvable, ResolvedValue, ShapeHint};
    use std::collections::HashMap;

    struct QueryRoot;

    #[async_trait::async_trait]
    impl Resolvable for QueryRoot {
        fn type_name() -> &'static str {
            "Query"
        }
        fn field_specs() -> &'static [FieldSpec] {
            static FIELDS: &[FieldSpec] = &[FieldSpec {
                rust_name: "ping",
                tag: "",
                legacy_tag: None,
                shape: ShapeHint::Scalar(Primitive::String),
                embedded: false,
            }];
            FIELDS
        }
        async fn resolve_field(
            &self,
            _ctx: &crate::context::FieldCallContext<'_>,
            _position: usize,
        ) -> Result<ResolvedValue, FieldError> {
            Ok(ResolvedValue::String("pong".to_string()))
        }
    }

    struct MutationRoot;

    #[async_trait::async_trait]
    impl Resolvable for MutationRoot {
        fn type_name() -> &'static str {
            "Mutation"
        }
        fn field_specs() -> &'static [FieldSpec] {
            static FIELDS: &[FieldSpec] = &[];
            FIELDS
        }
        async fn resolve_field(
            &self,
            _ctx: &crate::context::FieldCallContext<'_>,
            _position: usize,
        ) -> Result<ResolvedValue, FieldError> {
            unreachable!()
        }
    }

    struct PingProvider;

    impl AstProvider for PingProvider {
        fn prepare(
            &self,
            _schema_text: &str,
            _query: &str,
            _operation_name: Option<&str>,
            _variables: &IndexMap<String, serde_json::Value>,
        ) -> Result<PreparedOperation, QueryError> {
            Ok(PreparedOperation {
                kind: OperationKind::Query,
                selection_set: vec![Selection::Field(Field {
                    alias: None,
                    name: "ping".to_string(),
                    arguments: IndexMap::new(),
                    directives: Vec::<Directive>::new(),
                    selection_set: Vec::new(),
                })],
                fragments: IndexMap::new(),
            })
        }
    }

    fn roots() -> (Vec<Root>, Vec<Root>) {
        let query_shape = RecordShape::of::<QueryRoot>();
        let mutation_shape = RecordShape::of::<MutationRoot>();
        (
            vec![(query_shape, Arc::new(QueryRoot) as RecordValue)],
            vec![(mutation_shape, Arc::new(MutationRoot) as RecordValue)],
        )
    }

    #[tokio::test]
    async fn picks_the_matching_root_and_executes() {
        let (query_roots, mutation_roots) = roots();
        let registry = Arc::new(
            ResolverIndex::build(
                &query_roots.iter().map(|(s, _)| s.clone()).collect::<Vec<_>>(),
                true,
            )
            .unwrap(),
        );
        let enums = Arc::new(EnumDictionary::build(HashMap::new()));
        let envelope = RequestEnvelope {
            query: "{ping}".to_string(),
            operation_name: None,
            variables: serde_json::Map::new(),
        };

        let response = execute_request(
            &registry,
            &enums,
            &PingProvider,
            "",
            &query_roots,
            &mutation_roots,
            envelope,
            false,
        )
        .await
        .unwrap();

        assert_eq!(response.data, serde_json::json!({"ping": "pong"}));
        assert!(response.errors.is_empty());
    }

    #[test]
    fn response_envelope_omits_errors_when_empty() {
        let response = Response {
            data: serde_json::json!({"a": 1}),
            errors: Vec::new(),
        };
        assert_eq!(response.into_json(), serde_json::json!({"data": {"a": 1}}));
    }

    #[test]
    fn response_envelope_includes_errors_when_present() {
        let response = Response {
            data: serde_json::Value::Null,
            errors: vec![ErrorPayload { message: "boom".to_string() }],
        };
        let json = response.into_json();
        assert_eq!(json["errors"][0]["message"], "boom");
    }
}
