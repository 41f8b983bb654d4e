//! # graphql-ws-provider
//!
//! Client-side connection provider for the `graphql-ws` subscription protocol.
//!
//! ## Features
//!
//! - **Shared connection** driven by any number of named listeners
//! - **Serialized state machine** - every operation and callback runs on one worker
//! - **Interceptor pipelines** for signing requests and messages, sync or async
//! - **Stale-connection watchdog** reset by keep-alives and any inbound frame
//! - **Rate-limit error coalescing** so bursts reach listeners as one event
//! - **Connectivity-driven reconnect** of sockets that went stale offline
//! - **Metrics** for observability
//!
//! ## Example
//!
//! ```ignore
//! use graphql_ws_provider::{
//!     ConnectionEvent, ConnectionProvider, HeaderInterceptor, OutboundMessage, ProviderConfig,
//!     SyncInterceptors, WebSocketTransport,
//! };
//!
//! let config = ProviderConfig::builder("wss://example.com/graphql/realtime").build()?;
//! let interceptors = SyncInterceptors::new()
//!     .with_connection_interceptor(HeaderInterceptor::try_from_pairs([("x-api-key", "key")])?);
//!
//! let provider = ConnectionProvider::new(config, interceptors, WebSocketTransport::default());
//! provider.add_listener("subscriptions", |event: &ConnectionEvent| {
//!     println!("{:?}", event);
//! });
//! provider.connect();
//! provider.write(OutboundMessage::start("sub-1", serde_json::json!({ "data": "..." })));
//! ```

mod config;
mod connectivity;
mod error;
mod event;
mod interceptor;
mod listener;
mod message;
mod metrics;
mod provider;
mod throttle;
mod transport;
mod watchdog;
mod websocket;

#[cfg(test)]
mod test_support;

pub use config::{
    ConfigError, ProviderConfig, ProviderConfigBuilder, TransportConfig,
    DEFAULT_ERROR_THROTTLE_WINDOW, DEFAULT_STALE_CONNECTION_TIMEOUT, GRAPHQL_WS_PROTOCOL,
};
pub use connectivity::{
    ConnectivityMonitor, ConnectivitySender, NoConnectivity, ReachabilityCallback,
    WatchConnectivity,
};
pub use error::{ConnectionError, Error, ErrorKind};
pub use event::{ConnectionEvent, ConnectionState};
pub use interceptor::{
    AsyncConnectionInterceptor, AsyncInterceptors, AsyncMessageInterceptor, ConnectionInterceptor,
    ConnectionRequest, HeaderInterceptor, Interception, InterceptorPipeline, MessageInterceptor,
    SyncInterceptors,
};
pub use message::{
    InboundKind, InboundMessage, OutboundKind, OutboundMessage, LIMIT_EXCEEDED_ERROR,
    MAX_SUBSCRIPTIONS_REACHED_ERROR,
};
pub use metrics::{Metrics, MetricsSnapshot};
pub use provider::ConnectionProvider;
pub use transport::{Transport, TransportDelegate};
pub use websocket::WebSocketTransport;

// Re-export http types for connection headers
pub use http::{HeaderMap, HeaderName, HeaderValue};

/// Result type for graphql-ws-provider operations
pub type Result<T> = std::result::Result<T, Error>;
