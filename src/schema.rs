//! Public schema API (§1, §6). Grounded on the teacher's own re-exported
//! `async_graphql::{Schema, SchemaBuilder}` shape — `SchemaBuilder::build`
//! producing an immutable, cloneable `Schema` that exposes `execute` for
//! query/mutation requests — generalized to this engine's tag-annotated
//! `Resolvable` records instead of the teacher's `#[Object]` macro output,
//! and extended with `connection` for the websocket subscription transport
//! (C8) the teacher's bare re-export never had to model itself.

use std::collections::HashMap;
use std::sync::Arc;

use crate::ast::AstProvider;
use crate::dispatch::{self, Root};
use crate::enums::EnumDictionary;
use crate::error::{DispatchError, Error};
use crate::parser_adapter::AsyncGraphqlParserProvider;
use crate::registry::ResolverIndex;
use crate::shape::{RecordShape, Resolvable};
use crate::subscription::{Connection, ConnectionConfig, Dialect, ProtocolTimings};

pub use dispatch::{RequestEnvelope, Response};

/// Builds a [`Schema`]: accumulates root records and the A3 configuration
/// switches (function-cache, no-concurrency, subscription timings, legacy
/// tag-key fallback already lives on [`crate::descriptor`] and needs no
/// switch here since it's unconditional, §9) before compiling the resolver
/// index once via [`ResolverIndex::build`].
pub struct SchemaBuilder {
    schema_text: String,
    query_roots: Vec<Root>,
    mutation_roots: Vec<Root>,
    subscription_root: Option<Root>,
    enum_members: HashMap<String, Vec<String>>,
    ast_provider: Arc<dyn AstProvider>,
    cache_enabled: bool,
    force_serial: bool,
    timings: ProtocolTimings,
}

impl SchemaBuilder {
    /// Starts a builder for the given schema text (handed verbatim to the
    /// [`AstProvider`] on every request; this crate never parses or
    /// validates it itself, §1).
    pub fn new(schema_text: impl Into<String>) -> Self {
        Self {
            schema_text: schema_text.into(),
            query_roots: Vec::new(),
            mutation_roots: Vec::new(),
            subscription_root: None,
            enum_members: HashMap::new(),
            ast_provider: Arc::new(AsyncGraphqlParserProvider::default()),
            cache_enabled: true,
            force_serial: false,
            timings: ProtocolTimings::default(),
        }
    }

    /// Registers one query root record. Multiple roots are searched in
    /// order at dispatch time (§4.9); the first to declare the requested
    /// top-level field wins.
    pub fn query_root<T: Resolvable>(mut self, value: T) -> Self {
        self.query_roots.push((RecordShape::of::<T>(), Arc::new(value)));
        self
    }

    /// Registers one mutation root record, same ordering rule as query
    /// roots.
    pub fn mutation_root<T: Resolvable>(mut self, value: T) -> Self {
        self.mutation_roots.push((RecordShape::of::<T>(), Arc::new(value)));
        self
    }

    /// Registers the (single) subscription root record used by every
    /// websocket connection this schema hands out (§4.8).
    pub fn subscription_root<T: Resolvable>(mut self, value: T) -> Self {
        self.subscription_root = Some((RecordShape::of::<T>(), Arc::new(value)));
        self
    }

    /// Declares an enum type's ordinal-to-member-name table (§3.4).
    pub fn enum_type(mut self, name: impl Into<String>, members: Vec<String>) -> Self {
        self.enum_members.insert(name.into(), members);
        self
    }

    /// Overrides the default `async-graphql-parser`-backed [`AstProvider`]
    /// (§6 "External interfaces").
    pub fn ast_provider(mut self, provider: Arc<dyn AstProvider>) -> Self {
        self.ast_provider = provider;
        self
    }

    /// The function-cache switch (§3.2): when `false`, only fields that
    /// explicitly carry `@cacheControl` still get a cache slot.
    pub fn cache_enabled(mut self, on: bool) -> Self {
        self.cache_enabled = on;
        self
    }

    /// The no-concurrency switch (§5): forces every selection set,
    /// including query siblings, to evaluate strictly in order.
    pub fn force_serial(mut self, on: bool) -> Self {
        self.force_serial = on;
        self
    }

    /// Overrides the subscription protocol's handshake/keep-alive/pong
    /// timing defaults (§4.8, A3).
    pub fn timings(mut self, timings: ProtocolTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Compiles the resolver index over every reachable type from every
    /// registered root (C2/C3) and freezes the result into a [`Schema`].
    pub fn build(self) -> Result<Schema, Error> {
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!(
            "schema_build",
            query_roots = self.query_roots.len(),
            mutation_roots = self.mutation_roots.len(),
            subscription_root = self.subscription_root.is_some()
        )
        .entered();
        #[cfg(feature = "log")]
        log::debug!(
            "building schema: {} query roots, {} mutation roots, subscription root: {}",
            self.query_roots.len(),
            self.mutation_roots.len(),
            self.subscription_root.is_some()
        );

        let mut all_roots: Vec<RecordShape> = Vec::with_capacity(
            self.query_roots.len() + self.mutation_roots.len() + self.subscription_root.is_some() as usize,
        );
        all_roots.extend(self.query_roots.iter().map(|(shape, _)| shape.clone()));
        all_roots.extend(self.mutation_roots.iter().map(|(shape, _)| shape.clone()));
        if let Some((shape, _)) = &self.subscription_root {
            all_roots.push(shape.clone());
        }

        let registry = Arc::new(ResolverIndex::build(&all_roots, self.cache_enabled)?);
        let enums = Arc::new(EnumDictionary::build(self.enum_members));

        #[cfg(feature = "tracing")]
        tracing::debug!(types = registry.types.len(), "schema build complete");
        #[cfg(feature = "log")]
        log::debug!("schema build complete: {} reachable types", registry.types.len());

        Ok(Schema {
            registry,
            enums,
            schema_text: self.schema_text,
            ast_provider: self.ast_provider,
            query_roots: self.query_roots,
            mutation_roots: self.mutation_roots,
            subscription_root: self.subscription_root,
            force_serial: self.force_serial,
            timings: self.timings,
        })
    }
}

/// A compiled, immutable schema ready to execute requests against. Cheap to
/// clone: every field is either `Copy`, an `Arc`, or shared read-only data.
#[derive(Clone)]
pub struct Schema {
    registry: Arc<ResolverIndex>,
    enums: Arc<EnumDictionary>,
    schema_text: String,
    ast_provider: Arc<dyn AstProvider>,
    query_roots: Vec<Root>,
    mutation_roots: Vec<Root>,
    subscription_root: Option<Root>,
    force_serial: bool,
    timings: ProtocolTimings,
}

impl Schema {
    /// Executes one query or mutation request (C9). Returns `Err` only for
    /// transport-level failures (bad query text, unsupported operation
    /// kind); field-level errors surface inside a successful `Response`'s
    /// `errors` array instead (§7).
    pub async fn execute(&self, envelope: RequestEnvelope) -> Result<Response, DispatchError> {
        dispatch::execute_request(
            &self.registry,
            &self.enums,
            self.ast_provider.as_ref(),
            &self.schema_text,
            &self.query_roots,
            &self.mutation_roots,
            envelope,
            self.force_serial,
        )
        .await
    }

    /// Opens a new websocket connection against this schema's subscription
    /// root (C8). Returns `None` if no subscription root was registered.
    pub fn connection(&self, dialect: Dialect) -> Option<Connection> {
        let (shape, value) = self.subscription_root.clone()?;
        let config = Arc::new(ConnectionConfig {
            registry: self.registry.clone(),
            enums: self.enums.clone(),
            schema_text: self.schema_text.clone(),
            ast_provider: self.ast_provider.clone(),
            subscription_root: shape,
            root_value: value,
            force_serial: self.force_serial,
            timings: self.timings,
        });
        Some(Connection::new(config, dialect))
    }
}
