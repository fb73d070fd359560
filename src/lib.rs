//! # recordql
//!
//! A GraphQL request-execution engine over tag-annotated record types.
//!
//! Rather than a procedural-macro DSL (`#[Object]`, `#[derive(SimpleObject)]`
//! and friends), a schema's types are ordinary Rust record types carrying a
//! per-field tag string — `graphql:"name"` in spirit, read at schema-build
//! time through the [`Resolvable`](shape::Resolvable) trait this crate asks
//! every participating record to implement (reflection's role, in a
//! language that doesn't have it). The tag parser (C1) and field analyzer
//! (C2) turn that per-field metadata into a compiled [`RecordShape`], and
//! [`registry::ResolverIndex`] compiles every record type reachable from a
//! schema's root records into a single lookup table once, at
//! [`schema::SchemaBuilder::build`] time.
//!
//! ## Layout
//!
//! - [`tag`], [`descriptor`] — C1/C2: tag-string parsing and field analysis.
//! - [`coerce`], [`value`] — C4: untyped request values coerced into a
//!   resolver's target type.
//! - [`registry`] — C3: the compiled per-schema resolver index.
//! - [`eval`] — C5: the selection evaluator.
//! - [`cache`] — C6: per-request function memoization.
//! - [`concurrency`] — C7/§5: sibling fan-out, serial-mutation ordering, and
//!   cancellation.
//! - [`message`], [`subscription`] — C8/§4.8: the `graphql-ws` and
//!   `graphql-transport-ws` websocket subscription protocols.
//! - [`dispatch`] — C9/§4.9: request-envelope decoding and root-record
//!   selection.
//! - [`ast`], [`parser_adapter`] — the out-of-scope external query
//!   parser/validator's boundary, plus a default implementation wrapping
//!   `async-graphql-parser`.
//! - [`schema`] — the public entry point tying the above together.
//!
//! ## Out of scope
//!
//! The GraphQL text-to-AST parser and query validator, HTTP transport
//! sockets, persistence, authentication, federation/stitching, and
//! introspection data construction are all external to this crate; see
//! [`ast::AstProvider`] for the boundary a caller supplies.

#![forbid(unsafe_code)]

mod annotations;
pub mod ast;
pub mod cache;
pub mod coerce;
pub mod concurrency;
pub mod context;
pub mod descriptor;
pub mod dispatch;
pub mod enums;
pub mod error;
pub mod eval;
pub mod literal;
pub mod message;
pub mod ordered;
pub mod parser_adapter;
pub mod registry;
pub mod schema;
pub mod shape;
mod tag;
pub mod subscription;
pub mod value;

#[doc(hidden)]
pub use async_trait;
#[doc(hidden)]
pub use futures;
#[doc(hidden)]
pub use indexmap;
#[doc(hidden)]
pub use serde_json;

pub use ast::{AstProvider, OperationKind, PreparedOperation};
pub use dispatch::{RequestEnvelope, Response};
pub use enums::EnumDictionary;
pub use error::{DispatchError, Error, FieldError, QueryError, Result};
pub use registry::ResolverIndex;
pub use schema::{Schema, SchemaBuilder};
pub use shape::{RecordShape, Resolvable, ResolvedValue};
pub use subscription::{Connection, Dialect, ProtocolTimings};
