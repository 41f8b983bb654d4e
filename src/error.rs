use serde_json::Value;
use thiserror::Error;

/// Categorizes connection errors for listener decision-making.
///
/// This is a lightweight, cloneable representation of the error type
/// that listeners can match on without inspecting payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Socket could not be opened, went stale, or the init message failed
    ConnectionFailure,
    /// Outbound message could not be intercepted or serialized, or was
    /// written before `connection_init` went out
    EncodingFailure,
    /// Backend signaled too many requests
    RateLimited,
    /// Backend refused a subscription because the connection is full
    MaxSubscriptionsReached,
    /// Abrupt close or read error from the socket
    TransportError,
    /// Server-reported error scoped to one subscription
    Subscription,
    /// Server-reported error scoped to the whole connection
    Protocol,
    /// Inbound frame was not a valid protocol envelope
    InvalidMessage,
}

/// Error delivered to listeners through [`ConnectionEvent::Error`].
///
/// Errors without a subscription id are connection-scope; errors that carry
/// one are meant for the subscriber that issued that id.
///
/// [`ConnectionEvent::Error`]: crate::ConnectionEvent::Error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionError {
    /// Connection could not be established or was presumed dead
    #[error("Connection failure: {0}")]
    ConnectionFailure(String),

    /// Outbound message could not be encoded or was not sent
    #[error("Encoding failure{}: {message}", fmt_id(.id))]
    EncodingFailure { id: Option<String>, message: String },

    /// Backend rate limit exceeded
    #[error("Rate limited{}", fmt_id(.id))]
    RateLimited { id: Option<String>, payload: Option<Value> },

    /// Backend refused the subscription because the connection is full
    #[error("Max subscriptions reached{}", fmt_id(.id))]
    MaxSubscriptionsReached { id: Option<String>, payload: Option<Value> },

    /// Socket closed abruptly or failed to read
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Server error for a specific subscription
    #[error("Subscription {id} failed")]
    Subscription { id: String, payload: Option<Value> },

    /// Server error not tied to any subscription
    #[error("Protocol error")]
    Protocol(Option<Value>),

    /// Inbound frame could not be parsed
    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

fn fmt_id(id: &Option<String>) -> String {
    match id {
        Some(id) => format!(" for subscription {}", id),
        None => String::new(),
    }
}

impl ConnectionError {
    /// Get the kind of this error for decision-making.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConnectionError::ConnectionFailure(_) => ErrorKind::ConnectionFailure,
            ConnectionError::EncodingFailure { .. } => ErrorKind::EncodingFailure,
            ConnectionError::RateLimited { .. } => ErrorKind::RateLimited,
            ConnectionError::MaxSubscriptionsReached { .. } => ErrorKind::MaxSubscriptionsReached,
            ConnectionError::TransportError(_) => ErrorKind::TransportError,
            ConnectionError::Subscription { .. } => ErrorKind::Subscription,
            ConnectionError::Protocol(_) => ErrorKind::Protocol,
            ConnectionError::InvalidMessage(_) => ErrorKind::InvalidMessage,
        }
    }

    /// Correlation id of the subscription this error belongs to, if any.
    pub fn subscription_id(&self) -> Option<&str> {
        match self {
            ConnectionError::EncodingFailure { id, .. }
            | ConnectionError::RateLimited { id, .. }
            | ConnectionError::MaxSubscriptionsReached { id, .. } => id.as_deref(),
            ConnectionError::Subscription { id, .. } => Some(id),
            ConnectionError::ConnectionFailure(_)
            | ConnectionError::TransportError(_)
            | ConnectionError::Protocol(_)
            | ConnectionError::InvalidMessage(_) => None,
        }
    }

    /// Whether this error applies to the whole connection.
    pub fn is_connection_scope(&self) -> bool {
        self.subscription_id().is_none()
    }
}

/// Errors returned by interceptors and transports
#[derive(Error, Debug)]
pub enum Error {
    /// WebSocket protocol error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Connection failed (timeout, refused, bad request)
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Interceptor rejected or could not rewrite a value
    #[error("Interceptor error: {0}")]
    Interceptor(String),

    /// Provider worker has shut down
    #[error("Provider is shut down")]
    ShutDown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scope_follows_subscription_id() {
        let scoped = ConnectionError::RateLimited {
            id: Some("sub-1".to_string()),
            payload: None,
        };
        assert_eq!(scoped.subscription_id(), Some("sub-1"));
        assert!(!scoped.is_connection_scope());

        let global = ConnectionError::RateLimited {
            id: None,
            payload: Some(json!({"errors": []})),
        };
        assert!(global.is_connection_scope());
        assert_eq!(global.kind(), ErrorKind::RateLimited);
    }

    #[test]
    fn test_display_includes_subscription() {
        let err = ConnectionError::EncodingFailure {
            id: Some("abc".to_string()),
            message: "bad payload".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Encoding failure for subscription abc: bad payload"
        );

        let err = ConnectionError::ConnectionFailure("stale".to_string());
        assert_eq!(err.to_string(), "Connection failure: stale");
    }
}
