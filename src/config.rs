use std::time::Duration;
use url::Url;

/// Sub-protocol token sent in `Sec-WebSocket-Protocol` at socket-open time
pub const GRAPHQL_WS_PROTOCOL: &str = "graphql-ws";

/// Default time without inbound activity before the connection is presumed dead
pub const DEFAULT_STALE_CONNECTION_TIMEOUT: Duration = Duration::from_secs(300);

/// Default coalescing window for connection-scope rate-limit errors
pub const DEFAULT_ERROR_THROTTLE_WINDOW: Duration = Duration::from_millis(150);

/// Configuration for a connection provider
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Realtime endpoint the socket connects to
    pub url: Url,
    /// Sub-protocol advertised during the WebSocket handshake
    pub sub_protocol: String,
    /// Inbound-activity timeout before the watchdog force-closes the socket
    pub stale_connection_timeout: Duration,
    /// Window over which connection-scope rate-limit errors are coalesced
    pub error_throttle_window: Duration,
    /// Payload attached to the `connection_init` message
    pub connection_init_payload: Option<serde_json::Value>,
}

impl ProviderConfig {
    /// Create a new builder for the given endpoint
    pub fn builder(url: impl Into<String>) -> ProviderConfigBuilder {
        ProviderConfigBuilder {
            url: url.into(),
            sub_protocol: GRAPHQL_WS_PROTOCOL.to_string(),
            stale_connection_timeout: DEFAULT_STALE_CONNECTION_TIMEOUT,
            error_throttle_window: DEFAULT_ERROR_THROTTLE_WINDOW,
            connection_init_payload: None,
        }
    }
}

/// Builder for ProviderConfig
#[derive(Debug, Clone)]
pub struct ProviderConfigBuilder {
    url: String,
    sub_protocol: String,
    stale_connection_timeout: Duration,
    error_throttle_window: Duration,
    connection_init_payload: Option<serde_json::Value>,
}

impl ProviderConfigBuilder {
    /// Set the sub-protocol token
    pub fn sub_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.sub_protocol = protocol.into();
        self
    }

    /// Set the stale-connection timeout
    pub fn stale_connection_timeout(mut self, timeout: Duration) -> Self {
        self.stale_connection_timeout = timeout;
        self
    }

    /// Set the error throttle window
    pub fn error_throttle_window(mut self, window: Duration) -> Self {
        self.error_throttle_window = window;
        self
    }

    /// Set the payload sent with `connection_init`
    pub fn connection_init_payload(mut self, payload: serde_json::Value) -> Self {
        self.connection_init_payload = Some(payload);
        self
    }

    /// Build the configuration with validation.
    ///
    /// Returns an error for unparseable or non-WebSocket URLs and zero durations.
    pub fn build(self) -> Result<ProviderConfig, ConfigError> {
        let url = Url::parse(&self.url).map_err(|e| ConfigError::InvalidUrl(e.to_string()))?;

        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(ConfigError::InvalidUrl(format!(
                "unsupported scheme '{}', expected ws or wss",
                url.scheme()
            )));
        }

        if self.sub_protocol.trim().is_empty() {
            return Err(ConfigError::InvalidSubProtocol(
                "sub_protocol cannot be empty".to_string(),
            ));
        }

        if self.stale_connection_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "stale_connection_timeout must be > 0".to_string(),
            ));
        }

        if self.error_throttle_window.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "error_throttle_window must be > 0".to_string(),
            ));
        }

        Ok(ProviderConfig {
            url,
            sub_protocol: self.sub_protocol,
            stale_connection_timeout: self.stale_connection_timeout,
            error_throttle_window: self.error_throttle_window,
            connection_init_payload: self.connection_init_payload,
        })
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Invalid endpoint URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    /// Invalid sub-protocol
    #[error("Invalid sub-protocol: {0}")]
    InvalidSubProtocol(String),
    /// Invalid timeout or window
    #[error("Invalid timeout configuration: {0}")]
    InvalidTimeout(String),
}

/// Connection-related configuration for [`WebSocketTransport`]
///
/// [`WebSocketTransport`]: crate::WebSocketTransport
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Timeout for completing the WebSocket handshake
    pub connect_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = ProviderConfig::builder("wss://example.com/graphql/realtime")
            .build()
            .expect("valid config");

        assert_eq!(config.sub_protocol, "graphql-ws");
        assert_eq!(config.stale_connection_timeout, Duration::from_secs(300));
        assert_eq!(config.error_throttle_window, Duration::from_millis(150));
        assert!(config.connection_init_payload.is_none());
    }

    #[test]
    fn test_builder_rejects_http_scheme() {
        let result = ProviderConfig::builder("https://example.com").build();
        assert!(matches!(result, Err(ConfigError::InvalidUrl(_))));
    }

    #[test]
    fn test_builder_rejects_garbage_url() {
        let result = ProviderConfig::builder("not a url").build();
        assert!(matches!(result, Err(ConfigError::InvalidUrl(_))));
    }

    #[test]
    fn test_builder_rejects_zero_durations() {
        let result = ProviderConfig::builder("ws://localhost:4000")
            .stale_connection_timeout(Duration::ZERO)
            .build();
        assert!(matches!(result, Err(ConfigError::InvalidTimeout(_))));

        let result = ProviderConfig::builder("ws://localhost:4000")
            .error_throttle_window(Duration::ZERO)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_rejects_empty_sub_protocol() {
        let result = ProviderConfig::builder("ws://localhost:4000")
            .sub_protocol("  ")
            .build();
        assert!(matches!(result, Err(ConfigError::InvalidSubProtocol(_))));
    }
}
