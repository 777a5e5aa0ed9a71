//! `graphql-transport-ws` message subset.
//!
//! Client: `connection_init`, `subscribe`, `complete`, `ping`, `pong`.
//! Server: `connection_ack`, `next`, `error`, `complete`, `ping`, `pong`.
//! A subscription names its topic(s) in the payload instead of a GraphQL
//! document:
//!
//! ```json
//! {"id": "1", "type": "subscribe", "payload": {"topic": "tasks"}}
//! ```

use crypto_core::bearer_token;
use event_broker::Event;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const SUBPROTOCOL: &str = "graphql-transport-ws";

/// Close codes used by the protocol
pub mod close_codes {
    pub const UNAUTHORIZED: u16 = 4401;
    pub const FORBIDDEN: u16 = 4403;
    pub const INIT_TIMEOUT: u16 = 4408;
    pub const SUBSCRIBER_EXISTS: u16 = 4409;
    pub const TOO_MANY_INIT: u16 = 4429;
    pub const BAD_REQUEST: u16 = 4400;
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    ConnectionInit {
        #[serde(default)]
        payload: Option<Value>,
    },
    Subscribe {
        id: String,
        payload: SubscribePayload,
    },
    Complete {
        id: String,
    },
    Ping {
        #[serde(default)]
        payload: Option<Value>,
    },
    Pong {
        #[serde(default)]
        payload: Option<Value>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SubscribePayload {
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
}

impl SubscribePayload {
    /// Every requested topic, `topic` first
    pub fn requested_topics(&self) -> Vec<String> {
        self.topic
            .iter()
            .chain(self.topics.iter())
            .filter(|t| !t.trim().is_empty())
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ConnectionAck,
    Next {
        id: String,
        payload: Value,
    },
    Error {
        id: String,
        payload: Vec<ErrorPayload>,
    },
    Complete {
        id: String,
    },
    Ping,
    Pong {
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorPayload {
    pub message: String,
}

impl ServerMessage {
    /// `next` frame for a broker event: `{"data": {<kind>: <payload>}}`
    pub fn next(id: &str, event: &Event) -> Self {
        let mut data = serde_json::Map::new();
        data.insert(event.kind.clone(), event.payload.clone());
        ServerMessage::Next {
            id: id.to_string(),
            payload: json!({
                "data": data,
                "extensions": {
                    "topic": event.topic,
                    "sequence": event.sequence,
                    "publishedAt": event.published_at,
                },
            }),
        }
    }

    pub fn error(id: &str, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            id: id.to_string(),
            payload: vec![ErrorPayload {
                message: message.into(),
            }],
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Bearer token from a `connection_init` payload (`Authorization` or
/// `authorization`, with or without the `Bearer ` prefix)
pub fn extract_bearer(payload: Option<&Value>) -> Option<&str> {
    let payload = payload?;
    let value = payload
        .get("Authorization")
        .or_else(|| payload.get("authorization"))?
        .as_str()?;

    match bearer_token(value) {
        Some(token) => Some(token),
        None if !value.trim().is_empty() && !value.contains(' ') => Some(value.trim()),
        None => None,
    }
}
