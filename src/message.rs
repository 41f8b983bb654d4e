use crate::error::ConnectionError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Server error type signaling that the client exceeded the backend rate limit
pub const LIMIT_EXCEEDED_ERROR: &str = "LimitExceededError";

/// Server error type signaling that the connection holds too many subscriptions
pub const MAX_SUBSCRIPTIONS_REACHED_ERROR: &str = "MaxSubscriptionsReachedError";

/// Type of an outbound frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboundKind {
    /// Opens the protocol session after the socket connects
    ConnectionInit,
    /// Starts a subscription
    Start,
    /// Stops a subscription
    Stop,
    /// Application-level ping
    Ping,
    /// Ends the protocol session
    ConnectionTerminate,
}

/// Outbound protocol message.
///
/// Encodes as `{"type": ..., "id": ..., "payload": ...}` with `id` and
/// `payload` omitted when absent; inbound frames use the same envelope.
/// Immutable once constructed. Interceptors that need to rewrite a message
/// consume it and build a new one with [`OutboundMessage::with_payload`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMessage {
    #[serde(rename = "type")]
    kind: OutboundKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<Value>,
}

impl OutboundMessage {
    /// Create a message from its parts
    pub fn new(kind: OutboundKind, id: Option<String>, payload: Option<Value>) -> Self {
        Self { kind, id, payload }
    }

    /// `connection_init` with an optional payload
    pub fn connection_init(payload: Option<Value>) -> Self {
        Self::new(OutboundKind::ConnectionInit, None, payload)
    }

    /// `start` for the subscription identified by `id`
    pub fn start(id: impl Into<String>, payload: Value) -> Self {
        Self::new(OutboundKind::Start, Some(id.into()), Some(payload))
    }

    /// `stop` for the subscription identified by `id`
    pub fn stop(id: impl Into<String>) -> Self {
        Self::new(OutboundKind::Stop, Some(id.into()), None)
    }

    /// Application-level `ping`
    pub fn ping() -> Self {
        Self::new(OutboundKind::Ping, None, None)
    }

    pub fn kind(&self) -> OutboundKind {
        self.kind
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    /// Copy of this message with the payload replaced
    pub fn with_payload(self, payload: Option<Value>) -> Self {
        Self { payload, ..self }
    }

    /// Serialize to the wire representation
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Type of an inbound frame
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "String")]
pub enum InboundKind {
    ConnectionAck,
    KeepAlive,
    StartAck,
    Data,
    Complete,
    Error,
    ConnectionError,
    /// Type not known to this client; forwarded untouched
    Other(String),
}

impl From<String> for InboundKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "connection_ack" => InboundKind::ConnectionAck,
            "ka" => InboundKind::KeepAlive,
            "start_ack" => InboundKind::StartAck,
            "data" => InboundKind::Data,
            "complete" => InboundKind::Complete,
            "error" => InboundKind::Error,
            "connection_error" => InboundKind::ConnectionError,
            _ => InboundKind::Other(value),
        }
    }
}

impl InboundKind {
    pub fn as_str(&self) -> &str {
        match self {
            InboundKind::ConnectionAck => "connection_ack",
            InboundKind::KeepAlive => "ka",
            InboundKind::StartAck => "start_ack",
            InboundKind::Data => "data",
            InboundKind::Complete => "complete",
            InboundKind::Error => "error",
            InboundKind::ConnectionError => "connection_error",
            InboundKind::Other(other) => other,
        }
    }
}

impl fmt::Display for InboundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inbound protocol message as parsed from a text frame
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InboundMessage {
    #[serde(rename = "type")]
    pub kind: InboundKind,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub payload: Option<Value>,
}

impl InboundMessage {
    /// Parse a text frame
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Keep-alive interval advertised by a `connection_ack`
    pub fn connection_timeout(&self) -> Option<Duration> {
        self.payload
            .as_ref()?
            .get("connectionTimeoutMs")?
            .as_u64()
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    /// `errorType` values carried by an error payload.
    ///
    /// Accepts both `{"errors": [{"errorType": ...}]}` and a bare `{"errorType": ...}`.
    pub fn error_types(&self) -> Vec<&str> {
        let Some(payload) = self.payload.as_ref() else {
            return Vec::new();
        };

        let mut types: Vec<&str> = payload
            .get("errors")
            .and_then(Value::as_array)
            .map(|errors| {
                errors
                    .iter()
                    .filter_map(|e| e.get("errorType").and_then(Value::as_str))
                    .collect()
            })
            .unwrap_or_default();

        if let Some(t) = payload.get("errorType").and_then(Value::as_str) {
            types.push(t);
        }
        types
    }

    /// Convert an error message into the error delivered to listeners
    pub fn to_connection_error(&self) -> ConnectionError {
        let types = self.error_types();
        let id = self.id.clone();
        let payload = self.payload.clone();

        if types.contains(&LIMIT_EXCEEDED_ERROR) {
            return ConnectionError::RateLimited { id, payload };
        }
        if types.contains(&MAX_SUBSCRIPTIONS_REACHED_ERROR) {
            return ConnectionError::MaxSubscriptionsReached { id, payload };
        }
        match id {
            Some(id) => ConnectionError::Subscription { id, payload },
            None => ConnectionError::Protocol(payload),
        }
    }
}
