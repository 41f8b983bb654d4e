use crate::config::TransportConfig;
use crate::error::Error;
use crate::interceptor::ConnectionRequest;
use crate::transport::{Transport, TransportDelegate};
use futures_util::{SinkExt, StreamExt};
use http::HeaderValue;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{
    connect_async, tungstenite::client::IntoClientRequest, tungstenite::handshake::client::Request,
    tungstenite::Message,
};
use tracing::{debug, info, trace, warn};

/// Commands for the socket task
#[derive(Debug)]
enum SocketCommand {
    /// Send a text frame
    Send(String),
    /// Gracefully close the socket
    Close,
}

struct Session {
    id: u64,
    /// Handshake completed; frames are only accepted from here on
    open: bool,
    command_tx: mpsc::UnboundedSender<SocketCommand>,
}

/// [`Transport`] backed by `tokio-tungstenite`.
///
/// Holds at most one socket. `close()` during an in-flight handshake marks the
/// attempt abandoned; the socket is dropped as soon as the handshake completes.
/// Frames sent before the handshake completes are dropped, never queued.
pub struct WebSocketTransport {
    config: TransportConfig,
    session: Mutex<Option<Session>>,
    next_session_id: AtomicU64,
}

impl WebSocketTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            session: Mutex::new(None),
            next_session_id: AtomicU64::new(1),
        }
    }

    /// Mark the session open if it is still the current one
    fn mark_open(&self, session_id: u64) -> bool {
        match self.session.lock().as_mut() {
            Some(session) if session.id == session_id => {
                session.open = true;
                true
            }
            _ => false,
        }
    }

    /// Forget the session if it is still the current one
    fn release(&self, session_id: u64) -> bool {
        let mut session = self.session.lock();
        if session.as_ref().is_some_and(|s| s.id == session_id) {
            *session = None;
            true
        } else {
            false
        }
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new(TransportConfig::default())
    }
}

impl Transport for WebSocketTransport {
    async fn connect(&self, request: ConnectionRequest, delegate: TransportDelegate) {
        let session_id = self.next_session_id.fetch_add(1, Ordering::SeqCst);
        let (command_tx, mut command_rx) = mpsc::unbounded_channel();
        {
            let mut session = self.session.lock();
            if let Some(previous) = session.replace(Session {
                id: session_id,
                open: false,
                command_tx,
            }) {
                debug!("[SOCKET-{}] Replacing socket {}", session_id, previous.id);
                let _ = previous.command_tx.send(SocketCommand::Close);
            }
        }

        let handshake = match build_request(&request) {
            Ok(handshake) => handshake,
            Err(e) => {
                if self.release(session_id) {
                    delegate.disconnected(Some(e.to_string()));
                }
                return;
            }
        };

        debug!(
            "[SOCKET-{}] Connecting to {} (protocols={:?}, headers={})",
            session_id,
            request.url.origin().ascii_serialization(),
            request.sub_protocols,
            request.headers.len()
        );

        let started = Instant::now();
        let ws_stream = match timeout(self.config.connect_timeout, connect_async(handshake)).await {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => {
                if self.release(session_id) {
                    delegate.disconnected(Some(Error::WebSocket(e).to_string()));
                }
                return;
            }
            Err(_) => {
                if self.release(session_id) {
                    delegate.disconnected(Some(
                        Error::ConnectionFailed("connection timeout".to_string()).to_string(),
                    ));
                }
                return;
            }
        };

        let (mut write, mut read) = ws_stream.split();

        if !self.mark_open(session_id) {
            debug!(
                "[SOCKET-{}] Handshake finished after close was requested, dropping socket",
                session_id
            );
            let _ = write.send(Message::Close(None)).await;
            return;
        }

        info!(
            "[SOCKET-{}] Connected in {:?}",
            session_id,
            started.elapsed()
        );
        delegate.connected();

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            trace!("[SOCKET-{}] Received {} bytes", session_id, text.len());
                            delegate.text_received(text);
                        }
                        Some(Ok(Message::Ping(data))) => {
                            trace!("[SOCKET-{}] Received ping, sending pong", session_id);
                            if let Err(e) = write.send(Message::Pong(data)).await {
                                warn!("[SOCKET-{}] Failed to send pong: {}", session_id, e);
                                if self.release(session_id) {
                                    delegate.disconnected(Some(e.to_string()));
                                }
                                return;
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            info!("[SOCKET-{}] Received close frame: {:?}", session_id, frame);
                            if self.release(session_id) {
                                delegate.disconnected(None);
                            }
                            return;
                        }
                        Some(Ok(_)) => {
                            trace!("[SOCKET-{}] Ignoring non-text frame", session_id);
                        }
                        Some(Err(e)) => {
                            warn!("[SOCKET-{}] WebSocket error: {}", session_id, e);
                            if self.release(session_id) {
                                delegate.disconnected(Some(e.to_string()));
                            }
                            return;
                        }
                        None => {
                            info!("[SOCKET-{}] WebSocket stream ended", session_id);
                            if self.release(session_id) {
                                delegate.disconnected(None);
                            }
                            return;
                        }
                    }
                }

                cmd = command_rx.recv() => {
                    match cmd {
                        Some(SocketCommand::Send(text)) => {
                            if let Err(e) = write.send(Message::Text(text)).await {
                                warn!("[SOCKET-{}] Failed to send message: {}", session_id, e);
                                if self.release(session_id) {
                                    delegate.disconnected(Some(e.to_string()));
                                }
                                return;
                            }
                        }
                        Some(SocketCommand::Close) | None => {
                            debug!("[SOCKET-{}] Closing on request", session_id);
                            let _ = write.send(Message::Close(None)).await;
                            return;
                        }
                    }
                }
            }
        }
    }

    fn send(&self, text: String) {
        match self.session.lock().as_ref() {
            Some(session) if session.open => {
                let _ = session.command_tx.send(SocketCommand::Send(text));
            }
            Some(session) => debug!(
                "[SOCKET-{}] Handshake in progress, dropping outbound frame",
                session.id
            ),
            None => debug!("[SOCKET] No open socket, dropping outbound frame"),
        }
    }

    fn close(&self) {
        if let Some(session) = self.session.lock().take() {
            let _ = session.command_tx.send(SocketCommand::Close);
        }
    }
}

/// Build the handshake request, including sub-protocols and extra headers
fn build_request(request: &ConnectionRequest) -> Result<Request, Error> {
    let mut handshake = request
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| Error::ConnectionFailed(format!("Invalid WebSocket request: {}", e)))?;

    for (name, value) in &request.headers {
        handshake.headers_mut().insert(name.clone(), value.clone());
    }

    if !request.sub_protocols.is_empty() {
        let protocols = HeaderValue::from_str(&request.sub_protocols.join(", "))
            .map_err(|e| Error::ConnectionFailed(format!("Invalid sub-protocol: {}", e)))?;
        handshake
            .headers_mut()
            .insert(http::header::SEC_WEBSOCKET_PROTOCOL, protocols);
    }

    Ok(handshake)
}
