//! Subscription websocket message types (C8, §4.8, §6). Two protocol
//! dialects are supported, selected by the negotiated
//! `Sec-WebSocket-Protocol` value at upgrade time: the original
//! `graphql-ws` (`legacy` below) and its successor `graphql-transport-ws`
//! (`transport` below). Grounded on the pack's own two-dialect split
//! (`juniper_graphql_ws`'s `graphql_ws`/`graphql_transport_ws` submodules),
//! adapted here to a single non-generic scalar representation
//! (`serde_json::Value`) since this engine, unlike `juniper`, isn't
//! generic over a custom scalar-value type.

use serde::{Deserialize, Serialize};

/// One entry of a response's `errors` array (§4.5.2, §6 success body).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorPayload {
    pub message: String,
}

impl From<&crate::error::FieldError> for ErrorPayload {
    fn from(err: &crate::error::FieldError) -> Self {
        ErrorPayload {
            message: err.to_string(),
        }
    }
}

/// The original `graphql-ws` subprotocol (§4.8 "Old dialect"): keep-alive
/// named `ka`, subscribe/cancel via `start`/`stop`, data typed `data`.
pub mod legacy {
    use super::ErrorPayload;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Deserialize)]
    #[serde(tag = "type", rename_all = "snake_case")]
    pub enum ClientMessage {
        ConnectionInit {
            #[serde(default)]
            payload: serde_json::Value,
        },
        Start {
            id: String,
            payload: StartPayload,
        },
        Stop {
            id: String,
        },
        ConnectionTerminate,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct StartPayload {
        pub query: String,
        #[serde(default)]
        pub variables: serde_json::Map<String, serde_json::Value>,
        #[serde(rename = "operationName", default)]
        pub operation_name: Option<String>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub struct DataPayload {
        pub data: serde_json::Value,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        pub errors: Vec<ErrorPayload>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize)]
    #[serde(tag = "type", rename_all = "snake_case")]
    pub enum ServerMessage {
        ConnectionAck,
        #[serde(rename = "ka")]
        ConnectionKeepAlive,
        ConnectionError {
            payload: ErrorPayload,
        },
        Data {
            id: String,
            payload: DataPayload,
        },
        Error {
            id: String,
            payload: Vec<ErrorPayload>,
        },
        Complete {
            id: String,
        },
    }
}

/// The successor `graphql-transport-ws` subprotocol (§4.8 "New dialect"):
/// request/response `ping`/`pong` keep-alive, subscribe/cancel via
/// `subscribe`/`complete`, data typed `next`.
pub mod transport {
    use super::ErrorPayload;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Deserialize)]
    #[serde(tag = "type", rename_all = "snake_case")]
    pub enum ClientMessage {
        ConnectionInit {
            #[serde(default)]
            payload: serde_json::Value,
        },
        Ping {
            #[serde(default)]
            payload: serde_json::Value,
        },
        Pong {
            #[serde(default)]
            payload: serde_json::Value,
        },
        Subscribe {
            id: String,
            payload: SubscribePayload,
        },
        Complete {
            id: String,
        },
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct SubscribePayload {
        pub query: String,
        #[serde(default)]
        pub variables: serde_json::Map<String, serde_json::Value>,
        #[serde(rename = "operationName", default)]
        pub operation_name: Option<String>,
        #[serde(default)]
        pub extensions: serde_json::Map<String, serde_json::Value>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub struct NextPayload {
        pub data: serde_json::Value,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        pub errors: Vec<ErrorPayload>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize)]
    #[serde(tag = "type", rename_all = "snake_case")]
    pub enum ServerMessage {
        ConnectionAck,
        Pong {
            #[serde(skip_serializing_if = "Option::is_none")]
            payload: Option<serde_json::Value>,
        },
        Next {
            id: String,
            payload: NextPayload,
        },
        Error {
            id: String,
            payload: Vec<ErrorPayload>,
        },
        Complete {
            id: String,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_keep_alive_serializes_as_ka() {
        let msg = legacy::ServerMessage::ConnectionKeepAlive;
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, serde_json::json!({"type": "ka"}));
    }

    #[test]
    fn legacy_start_deserializes() {
        let raw = serde_json::json!({
            "type": "start",
            "id": "1",
            "payload": {"query": "{x}"},
        });
        match serde_json::from_value::<legacy::ClientMessage>(raw).unwrap() {
            legacy::ClientMessage::Start { id, payload } => {
                assert_eq!(id, "1");
                assert_eq!(payload.query, "{x}");
            }
            other => panic!("expected Start, got {other:?}"),
        }
    }

    #[test]
    fn transport_subscribe_deserializes() {
        let raw = serde_json::json!({
            "type": "subscribe",
            "id": "x",
            "payload": {"query": "subscription{message}"},
        });
        match serde_json::from_value::<transport::ClientMessage>(raw).unwrap() {
            transport::ClientMessage::Subscribe { id, payload } => {
                assert_eq!(id, "x");
                assert_eq!(payload.query, "subscription{message}");
            }
            other => panic!("expected Subscribe, got {other:?}"),
        }
    }

    #[test]
    fn transport_next_serializes() {
        let msg = transport::ServerMessage::Next {
            id: "x".to_string(),
            payload: transport::NextPayload {
                data: serde_json::json!({"message": "hello"}),
                errors: Vec::new(),
            },
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "next", "id": "x", "payload": {"data": {"message": "hello"}}})
        );
    }

    #[test]
    fn transport_complete_round_trips_by_id() {
        let raw = serde_json::json!({"type": "complete", "id": "x"});
        match serde_json::from_value::<transport::ClientMessage>(raw).unwrap() {
            transport::ClientMessage::Complete { id } => assert_eq!(id, "x"),
            other => panic!("expected Complete, got {other:?}"),
        }
    }
}
