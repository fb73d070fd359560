//! Subscription protocol state machine (C8, §4.8). Transport-agnostic: a
//! [`Connection`] is driven by handing it [`Input`] messages and draining
//! the [`Output`] stream each call returns, the same shape as the pack's
//! own `juniper_graphql_ws::Connection` — binding this to a real socket
//! (axum/warp/actix) is left to a caller, per §1's "out of scope: HTTP
//! transport".

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, BoxStream, StreamExt};
use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;

use crate::ast::{AstProvider, Field, PreparedOperation, Selection};
use crate::context::RequestState;
use crate::enums::EnumDictionary;
use crate::error::FieldError;
use crate::eval::{self, RecordValue};
use crate::message::{legacy, transport, ErrorPayload};
use crate::registry::ResolverIndex;
use crate::shape::{RecordShape, ResolvedValue};

/// Close codes defined by §6/§4.8.
pub mod close_code {
    pub const NORMAL: u16 = 1000;
    pub const UNSUPPORTED_DATA: u16 = 1003;
    pub const ABNORMAL: u16 = 1006;
    pub const MALFORMED: u16 = 4400;
    pub const DUPLICATE_SUBSCRIBER: u16 = 4409;
    pub const TOO_MANY_INIT_REQUESTS: u16 = 4429;
}

/// Negotiated websocket sub-protocol, selected at Upgrade time (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// `graphql-ws`.
    Legacy,
    /// `graphql-transport-ws`.
    Transport,
}

/// Protocol-level timing knobs (§4.8, A3 configuration). Defaults match the
/// values spec.md states explicitly.
#[derive(Debug, Clone, Copy)]
pub struct ProtocolTimings {
    pub handshake_timeout: Duration,
    pub keep_alive_interval: Duration,
    pub pong_timeout: Duration,
}

impl Default for ProtocolTimings {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            keep_alive_interval: Duration::from_secs(20),
            pong_timeout: Duration::from_secs(5),
        }
    }
}

/// Shared, immutable per-connection configuration: the compiled schema, the
/// subscription root value/shape, and the external query parser (§1, §6).
pub struct ConnectionConfig {
    pub registry: Arc<ResolverIndex>,
    pub enums: Arc<EnumDictionary>,
    pub schema_text: String,
    pub ast_provider: Arc<dyn AstProvider>,
    pub subscription_root: RecordShape,
    pub root_value: RecordValue,
    pub force_serial: bool,
    pub timings: ProtocolTimings,
}

/// One message arriving from the client, tagged by the dialect it was
/// decoded under.
#[derive(Debug, Clone)]
pub enum Input {
    Legacy(legacy::ClientMessage),
    Transport(transport::ClientMessage),
    /// The client initiated normal closing of the connection.
    Close,
}

/// A reaction the caller should forward to the client, or the final signal
/// that the socket should close (always the last item on that path).
#[derive(Debug)]
pub enum Output {
    Legacy(legacy::ServerMessage),
    Transport(transport::ServerMessage),
    Close { code: u16, message: String },
}

impl Output {
    fn single(self) -> BoxStream<'static, Output> {
        stream::iter(vec![self]).boxed()
    }
}

enum ConnectionState {
    /// The server is waiting for `connection_init`, with a deadline the
    /// caller enforces externally (this state machine has no timer of its
    /// own for the handshake — see [`ProtocolTimings::handshake_timeout`]).
    AwaitingInit,
    Ready {
        stoppers: HashMap<String, CancellationToken>,
    },
    Closing,
}

/// Drives one websocket connection's protocol state through
/// `awaiting-init → ready → closing` (§4.8 "Lifecycle").
pub struct Connection {
    config: Arc<ConnectionConfig>,
    dialect: Dialect,
    state: ConnectionState,
}

impl Connection {
    pub fn new(config: Arc<ConnectionConfig>, dialect: Dialect) -> Self {
        Self {
            config,
            dialect,
            state: ConnectionState::AwaitingInit,
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// A keep-alive tick reaction for [`ProtocolTimings::keep_alive_interval`]
    /// elapsing in the `ready` state (§4.8 "On each tick"). Returns nothing
    /// once the connection has left `ready`.
    pub fn keep_alive_tick(&self) -> BoxStream<'static, Output> {
        match (&self.state, self.dialect) {
            (ConnectionState::Ready { .. }, Dialect::Legacy) => {
                Output::Legacy(legacy::ServerMessage::ConnectionKeepAlive).single()
            }
            (ConnectionState::Ready { .. }, Dialect::Transport) => {
                Output::Transport(transport::ServerMessage::Pong { payload: None }).single()
            }
            _ => stream::empty().boxed(),
        }
    }

    /// Handles one incoming message, returning the reactions to forward to
    /// the client. For a `subscribe`/`start`, the returned stream runs for
    /// as long as the subscription is alive, ending in a `complete`
    /// message once the producer's channel closes or the operation is
    /// cancelled (§4.8).
    pub async fn handle_input(&mut self, input: Input) -> BoxStream<'static, Output> {
        let state = std::mem::replace(&mut self.state, ConnectionState::Closing);
        let (next_state, reaction) = handle(state, &self.config, self.dialect, input).await;
        self.state = next_state;
        reaction
    }

    /// Cancels every in-flight operation and transitions to `closing`
    /// (§4.8 "Shutdown": "cancel all operation contexts; drain the read
    /// goroutine; close the socket").
    pub fn shut_down(&mut self) {
        if let ConnectionState::Ready { stoppers } = std::mem::replace(&mut self.state, ConnectionState::Closing) {
            for (_, token) in stoppers {
                token.cancel();
            }
        }
    }
}

async fn handle(
    state: ConnectionState,
    config: &Arc<ConnectionConfig>,
    dialect: Dialect,
    input: Input,
) -> (ConnectionState, BoxStream<'static, Output>) {
    #[cfg(feature = "tracing")]
    let _span = tracing::debug_span!("ws_connection", dialect = ?dialect).entered();

    match state {
        ConnectionState::AwaitingInit => match input {
            Input::Legacy(legacy::ClientMessage::ConnectionInit { .. })
            | Input::Transport(transport::ClientMessage::ConnectionInit { .. }) => {
                #[cfg(feature = "log")]
                log::debug!("connection_init accepted ({:?} dialect)", dialect);

                let mut msgs = vec![ack(dialect)];
                if dialect == Dialect::Legacy {
                    msgs.push(Output::Legacy(legacy::ServerMessage::ConnectionKeepAlive));
                }
                (
                    ConnectionState::Ready { stoppers: HashMap::new() },
                    stream::iter(msgs).boxed(),
                )
            }
            Input::Close => (ConnectionState::Closing, stream::empty().boxed()),
            _ => {
                let code = match dialect {
                    Dialect::Legacy => close_code::UNSUPPORTED_DATA,
                    Dialect::Transport => close_code::MALFORMED,
                };
                #[cfg(feature = "tracing")]
                tracing::warn!(code, "closing: message received before connection_init");
                #[cfg(feature = "log")]
                log::warn!("closing connection with code {}: message before connection_init", code);
                (
                    ConnectionState::Closing,
                    Output::Close {
                        code,
                        message: "expected connection_init".to_string(),
                    }
                    .single(),
                )
            }
        },
        ConnectionState::Ready { mut stoppers } => {
            let reaction = match input {
                Input::Legacy(legacy::ClientMessage::Start { id, payload }) => {
                    start_operation(
                        &mut stoppers,
                        config,
                        dialect,
                        id,
                        payload.query,
                        payload.variables,
                        payload.operation_name,
                    )
                }
                Input::Transport(transport::ClientMessage::Subscribe { id, payload }) => {
                    start_operation(
                        &mut stoppers,
                        config,
                        dialect,
                        id,
                        payload.query,
                        payload.variables,
                        payload.operation_name,
                    )
                }
                Input::Legacy(legacy::ClientMessage::Stop { id })
                | Input::Transport(transport::ClientMessage::Complete { id }) => {
                    if let Some(token) = stoppers.remove(&id) {
                        token.cancel();
                    }
                    stream::empty().boxed()
                }
                Input::Legacy(legacy::ClientMessage::ConnectionTerminate) => {
                    for (_, token) in stoppers.drain() {
                        token.cancel();
                    }
                    return (
                        ConnectionState::Closing,
                        Output::Close {
                            code: close_code::NORMAL,
                            message: "connection_terminate".to_string(),
                        }
                        .single(),
                    );
                }
                Input::Transport(transport::ClientMessage::Ping { .. }) => {
                    Output::Transport(transport::ServerMessage::Pong { payload: None }).single()
                }
                Input::Transport(transport::ClientMessage::Pong { .. }) => stream::empty().boxed(),
                Input::Close => {
                    for (_, token) in stoppers.drain() {
                        token.cancel();
                    }
                    return (
                        ConnectionState::Closing,
                        Output::Close {
                            code: close_code::NORMAL,
                            message: "normal closure".to_string(),
                        }
                        .single(),
                    );
                }
                Input::Legacy(legacy::ClientMessage::ConnectionInit { .. })
                | Input::Transport(transport::ClientMessage::ConnectionInit { .. }) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(code = close_code::TOO_MANY_INIT_REQUESTS, "closing: duplicate connection_init");
                    #[cfg(feature = "log")]
                    log::warn!("closing connection: duplicate connection_init");

                    for (_, token) in stoppers.drain() {
                        token.cancel();
                    }
                    return (
                        ConnectionState::Closing,
                        Output::Close {
                            code: close_code::TOO_MANY_INIT_REQUESTS,
                            message: "too many init requests".to_string(),
                        }
                        .single(),
                    );
                }
            };
            (ConnectionState::Ready { stoppers }, reaction)
        }
        ConnectionState::Closing => (ConnectionState::Closing, stream::empty().boxed()),
    }
}

fn ack(dialect: Dialect) -> Output {
    match dialect {
        Dialect::Legacy => Output::Legacy(legacy::ServerMessage::ConnectionAck),
        Dialect::Transport => Output::Transport(transport::ServerMessage::ConnectionAck),
    }
}

fn next_message(dialect: Dialect, id: String, data: serde_json::Value, errors: Vec<ErrorPayload>) -> Output {
    match dialect {
        Dialect::Legacy => Output::Legacy(legacy::ServerMessage::Data {
            id,
            payload: legacy::DataPayload { data, errors },
        }),
        Dialect::Transport => Output::Transport(transport::ServerMessage::Next {
            id,
            payload: transport::NextPayload { data, errors },
        }),
    }
}

fn error_message(dialect: Dialect, id: String, messages: Vec<String>) -> Output {
    let payload = messages.into_iter().map(|message| ErrorPayload { message }).collect();
    match dialect {
        Dialect::Legacy => Output::Legacy(legacy::ServerMessage::Error { id, payload }),
        Dialect::Transport => Output::Transport(transport::ServerMessage::Error { id, payload }),
    }
}

fn complete_message(dialect: Dialect, id: String) -> Output {
    match dialect {
        Dialect::Legacy => Output::Legacy(legacy::ServerMessage::Complete { id }),
        Dialect::Transport => Output::Transport(transport::ServerMessage::Complete { id }),
    }
}

fn placeholder_field(key: &str) -> Field {
    Field {
        alias: None,
        name: key.to_string(),
        arguments: IndexMap::new(),
        directives: Vec::new(),
        selection_set: Vec::new(),
    }
}

/// Begins one subscribe/start operation (§4.8 "Incoming subscribe/start").
/// Rejects a duplicate operation id with `4409`; otherwise parses the
/// query, resolves the subscription root's top-level fields, and returns a
/// stream that forwards every value each field's channel produces as a
/// `next`/`data` message, finishing with `complete` once every channel has
/// closed (or the operation was cancelled).
fn start_operation(
    stoppers: &mut HashMap<String, CancellationToken>,
    config: &Arc<ConnectionConfig>,
    dialect: Dialect,
    id: String,
    query: String,
    variables: serde_json::Map<String, serde_json::Value>,
    operation_name: Option<String>,
) -> BoxStream<'static, Output> {
    if stoppers.contains_key(&id) {
        #[cfg(feature = "tracing")]
        tracing::warn!(operation_id = %id, "closing: duplicate subscription id");
        #[cfg(feature = "log")]
        log::warn!("closing connection: duplicate subscription id `{id}`");
        return Output::Close {
            code: close_code::DUPLICATE_SUBSCRIBER,
            message: format!("subscriber for `{id}` already exists"),
        }
        .single();
    }

    #[cfg(feature = "tracing")]
    tracing::debug!(operation_id = %id, "starting subscription operation");
    #[cfg(feature = "log")]
    log::debug!("starting subscription operation `{id}`");

    let cancellation = CancellationToken::new();
    stoppers.insert(id.clone(), cancellation.clone());

    let config = config.clone();
    futures::stream::once(async move {
        run_operation(config, dialect, id, query, variables, operation_name, cancellation).await
    })
    .flatten()
    .boxed()
}

async fn run_operation(
    config: Arc<ConnectionConfig>,
    dialect: Dialect,
    id: String,
    query: String,
    variables: serde_json::Map<String, serde_json::Value>,
    operation_name: Option<String>,
    cancellation: CancellationToken,
) -> BoxStream<'static, Output> {
    let vars: IndexMap<String, serde_json::Value> = variables.into_iter().collect();

    let op: PreparedOperation = match config
        .ast_provider
        .prepare(&config.schema_text, &query, operation_name.as_deref(), &vars)
    {
        Ok(op) => op,
        Err(e) => {
            return stream::iter(vec![
                error_message(dialect, id.clone(), vec![e.to_string()]),
                complete_message(dialect, id),
            ])
            .boxed();
        }
    };
    let op = Arc::new(op);

    let mut request_state = RequestState::new(
        config.registry.clone(),
        config.enums.clone(),
        vars,
        config.force_serial,
    );
    request_state.cancellation = cancellation;
    let request_state = Arc::new(request_state);

    let resolved = eval::resolve_subscription_root(
        &request_state,
        &op.selection_set,
        &op.fragments,
        &config.root_value,
        &config.subscription_root,
    )
    .await;

    let resolved = match resolved {
        Ok(r) => r,
        Err(e) => {
            return stream::iter(vec![
                error_message(dialect, id.clone(), vec![e.to_string()]),
                complete_message(dialect, id),
            ])
            .boxed();
        }
    };

    let fields_by_key: HashMap<String, Field> = op
        .selection_set
        .iter()
        .filter_map(|sel| match sel {
            Selection::Field(f) => Some((f.output_key().to_string(), f.clone())),
            _ => None,
        })
        .collect();

    let mut producers: Vec<BoxStream<'static, Output>> = Vec::with_capacity(resolved.len());
    for (key, arc_value) in resolved {
        let field = fields_by_key.get(&key).cloned().unwrap_or_else(|| placeholder_field(&key));
        let state = request_state.clone();
        let op = op.clone();
        let id = id.clone();

        let value = match Arc::try_unwrap(arc_value) {
            Ok(v) => v,
            Err(_) => {
                producers.push(
                    error_message(
                        dialect,
                        id.clone(),
                        vec![format!("field `{key}` value is shared and cannot be streamed")],
                    )
                    .single(),
                );
                continue;
            }
        };

        match value {
            ResolvedValue::Stream(inner) => {
                let key_for_items = key.clone();
                let encoded = inner.then(move |item| {
                    let state = state.clone();
                    let field = field.clone();
                    let op = op.clone();
                    let key = key_for_items.clone();
                    async move {
                        match item {
                            Ok(resolved_item) => {
                                match eval::encode_resolved(&state, &resolved_item, &field, &op.fragments).await {
                                    Ok(json) => Ok(keyed_object(key, json)),
                                    Err(e) => Err(e),
                                }
                            }
                            Err(e) => Err(e),
                        }
                    }
                });
                producers.push(to_output_stream(encoded, dialect, id));
            }
            other => {
                let json = eval::encode_resolved(&request_state, &other, &field, &op.fragments).await;
                let msg = match json {
                    Ok(data) => next_message(dialect, id.clone(), keyed_object(key, data), Vec::new()),
                    Err(e) => error_message(dialect, id.clone(), vec![e.to_string()]),
                };
                producers.push(msg.single());
            }
        }
    }

    let final_id = id.clone();
    let data_stream = interruptible(stream::select_all(producers).boxed(), request_state.cancellation.clone());
    data_stream
        .chain(stream::iter(vec![complete_message(dialect, final_id)]))
        .boxed()
}

fn keyed_object(key: String, value: serde_json::Value) -> serde_json::Value {
    let mut obj = serde_json::Map::with_capacity(1);
    obj.insert(key, value);
    serde_json::Value::Object(obj)
}

fn to_output_stream(
    s: impl futures::Stream<Item = Result<serde_json::Value, FieldError>> + Send + 'static,
    dialect: Dialect,
    id: String,
) -> BoxStream<'static, Output> {
    s.map(move |item| match item {
        Ok(data) => next_message(dialect, id.clone(), data, Vec::new()),
        Err(e) => error_message(dialect, id.clone(), vec![e.to_string()]),
    })
    .boxed()
}

/// Wraps `s` so it ends as soon as `cancel` fires, rather than when the
/// underlying producer closes (§5 "a cancelled context aborts all in-flight
/// sibling tasks"; §4.8 "cancel the operation's context" on `complete`/
/// `stop`).
fn interruptible(
    s: BoxStream<'static, Output>,
    cancel: CancellationToken,
) -> BoxStream<'static, Output> {
    stream::unfold((s, cancel), |(mut s, cancel)| async move {
        if cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            _ = cancel.cancelled() => None,
            next = s.next() => next.map(|item| (item, (s, cancel))),
        }
    })
    .boxed()
}
