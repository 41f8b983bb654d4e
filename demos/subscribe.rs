//! Example: Subscribing through a graphql-ws endpoint
//!
//! Opens the shared connection, starts one subscription once the server
//! acknowledges the connection, and prints everything the provider reports.
//!
//! Run with: GRAPHQL_WS_URL=wss://... API_KEY=... cargo run --example subscribe

use graphql_ws_provider::{
    ConnectionEvent, ConnectionProvider, ConnectionState, HeaderInterceptor, InboundKind,
    OutboundMessage, ProviderConfig, SyncInterceptors, WebSocketTransport,
};
use serde_json::json;
use std::time::Duration;
use tracing::{info, warn, Level};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .init();

    let url = std::env::var("GRAPHQL_WS_URL")
        .unwrap_or_else(|_| "wss://example.com/graphql/realtime".to_string());
    let api_key = std::env::var("API_KEY").unwrap_or_default();

    let config = ProviderConfig::builder(url).build()?;
    let interceptors = SyncInterceptors::new()
        .with_connection_interceptor(HeaderInterceptor::try_from_pairs([(
            "x-api-key",
            api_key.as_str(),
        )])?);

    let provider = ConnectionProvider::new(config, interceptors, WebSocketTransport::default());

    let writer = provider.clone();
    provider.add_listener("demo", move |event: &ConnectionEvent| match event {
        ConnectionEvent::StateChanged(ConnectionState::Connected) => {
            info!("Socket open, waiting for connection_ack");
        }
        ConnectionEvent::StateChanged(state) => info!("State: {}", state),
        ConnectionEvent::MessageReceived(message) => {
            if message.kind == InboundKind::ConnectionAck {
                writer.write(OutboundMessage::start(
                    "demo-1",
                    json!({
                        "data": json!({ "query": "subscription { onCreateTodo { id name } }" })
                            .to_string(),
                    }),
                ));
            }
            info!("Received {}: {:?}", message.kind, message.payload);
        }
        ConnectionEvent::Error(error) => warn!("Error ({:?}): {}", error.kind(), error),
    });

    provider.connect();

    tokio::time::sleep(Duration::from_secs(60)).await;

    provider.write(OutboundMessage::stop("demo-1"));
    provider.remove_listener("demo");

    let snapshot = provider.metrics().snapshot();
    info!(
        "Done: {} connections, {} messages received, {} errors",
        snapshot.connections_total, snapshot.messages_received_total, snapshot.errors_total
    );

    Ok(())
}
