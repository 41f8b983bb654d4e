use crate::config::ProviderConfig;
use crate::connectivity::{ConnectivityMonitor, NoConnectivity};
use crate::error::{ConnectionError, Error};
use crate::event::{ConnectionEvent, ConnectionState};
use crate::interceptor::{ConnectionRequest, Interception, InterceptorPipeline};
use crate::listener::{EventDispatcher, ListenerCallback, ListenerRegistry};
use crate::message::{InboundKind, InboundMessage, OutboundKind, OutboundMessage};
use crate::metrics::Metrics;
use crate::throttle::{Admission, ErrorThrottle};
use crate::transport::{Transport, TransportDelegate, TransportEvent};
use crate::watchdog::CountdownWatchdog;
use crate::Result;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Work items admitted to the provider worker.
///
/// Every public operation and every transport, timer and connectivity
/// callback becomes one of these and runs to completion before the next.
pub(crate) enum Command {
    Connect,
    Disconnect,
    Write(OutboundMessage),
    AddListener {
        id: String,
        callback: ListenerCallback,
    },
    RemoveListener {
        id: String,
    },
    RequestIntercepted {
        epoch: u64,
        result: Result<ConnectionRequest>,
    },
    MessageIntercepted {
        epoch: u64,
        kind: OutboundKind,
        id: Option<String>,
        result: Result<OutboundMessage>,
    },
    Transport {
        epoch: u64,
        event: TransportEvent,
    },
    WatchdogFired {
        generation: u64,
    },
    ThrottleWindowClosed,
    Connectivity {
        reachable: bool,
    },
    Shutdown,
}

/// Handle to a shared graphql-ws connection.
///
/// Cloning is cheap; all clones drive the same connection. Every operation is
/// fire-and-forget: outcomes are observed only through listener events. The
/// worker stops, closing the socket, once the last clone is dropped.
///
/// # Example
///
/// ```ignore
/// use graphql_ws_provider::{
///     ConnectionEvent, ConnectionProvider, ProviderConfig, SyncInterceptors, WebSocketTransport,
/// };
///
/// let config = ProviderConfig::builder("wss://example.com/graphql/realtime").build()?;
/// let provider = ConnectionProvider::new(config, SyncInterceptors::new(), WebSocketTransport::default());
///
/// provider.add_listener("subscriptions", |event: &ConnectionEvent| {
///     println!("{:?}", event);
/// });
/// provider.connect();
/// ```
#[derive(Clone)]
pub struct ConnectionProvider {
    inner: Arc<ProviderHandle>,
}

struct ProviderHandle {
    commands: mpsc::UnboundedSender<Command>,
    status: Arc<RwLock<ConnectionState>>,
    metrics: Arc<Metrics>,
    _task: JoinHandle<()>,
}

impl Drop for ProviderHandle {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

impl ConnectionProvider {
    /// Create a provider without a connectivity signal.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<P, T>(config: ProviderConfig, pipeline: P, transport: T) -> Self
    where
        P: InterceptorPipeline,
        T: Transport,
    {
        Self::with_connectivity(config, pipeline, transport, NoConnectivity)
    }

    /// Create a provider that reconnects stale sockets when connectivity returns.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_connectivity<P, T, C>(
        config: ProviderConfig,
        pipeline: P,
        transport: T,
        connectivity: C,
    ) -> Self
    where
        P: InterceptorPipeline,
        T: Transport,
        C: ConnectivityMonitor,
    {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let status = Arc::new(RwLock::new(ConnectionState::Disconnected));
        let metrics = Arc::new(Metrics::new());

        let connectivity_tx = commands.clone();
        connectivity.start(Box::new(move |reachable| {
            let _ = connectivity_tx.send(Command::Connectivity { reachable });
        }));

        let worker = ProviderWorker::new(
            config,
            pipeline,
            transport,
            commands.clone(),
            status.clone(),
            metrics.clone(),
        );
        let task = tokio::spawn(worker.run(command_rx));

        Self {
            inner: Arc::new(ProviderHandle {
                commands,
                status,
                metrics,
                _task: task,
            }),
        }
    }

    /// Open the shared connection, or echo the current state if already open
    pub fn connect(&self) {
        self.submit(Command::Connect);
    }

    /// Close the socket and stop the watchdog; listeners stay registered
    pub fn disconnect(&self) {
        self.submit(Command::Disconnect);
    }

    /// Intercept, encode and send a protocol message.
    ///
    /// Anything other than `connection_init` is rejected with
    /// [`ErrorKind::EncodingFailure`](crate::ErrorKind::EncodingFailure) until
    /// `connection_init` has been sent on the current socket.
    pub fn write(&self, message: OutboundMessage) {
        self.submit(Command::Write(message));
    }

    /// Register `callback` under `id`, replacing any callback already there
    pub fn add_listener(
        &self,
        id: impl Into<String>,
        callback: impl Fn(&ConnectionEvent) + Send + Sync + 'static,
    ) {
        self.submit(Command::AddListener {
            id: id.into(),
            callback: Arc::new(callback),
        });
    }

    /// Remove the listener registered under `id`.
    ///
    /// Removing the last listener tears the connection down.
    pub fn remove_listener(&self, id: impl Into<String>) {
        self.submit(Command::RemoveListener { id: id.into() });
    }

    /// Last state the worker transitioned to
    pub fn status(&self) -> ConnectionState {
        *self.inner.status.read()
    }

    /// Get the metrics for this provider
    pub fn metrics(&self) -> Arc<Metrics> {
        self.inner.metrics.clone()
    }

    fn submit(&self, command: Command) {
        if self.inner.commands.send(command).is_err() {
            error!("[PROVIDER] {}", Error::ShutDown);
        }
    }

    #[cfg(test)]
    pub(crate) fn submit_raw(&self, command: Command) {
        self.submit(command);
    }
}

/// Sole owner of connection state
struct ProviderWorker<P, T> {
    config: ProviderConfig,
    pipeline: P,
    transport: Arc<T>,
    commands: mpsc::UnboundedSender<Command>,
    status: ConnectionState,
    status_mirror: Arc<RwLock<ConnectionState>>,
    listeners: ListenerRegistry,
    dispatcher: EventDispatcher,
    watchdog: CountdownWatchdog,
    stale_timeout: Duration,
    throttle: ErrorThrottle,
    throttle_timer: Option<JoinHandle<()>>,
    is_stale: bool,
    /// `connection_init` has gone out on the current socket
    init_sent: bool,
    /// Identifies the current connect attempt and socket; bumped on every
    /// connect and teardown so late results from older ones are dropped
    epoch: u64,
    metrics: Arc<Metrics>,
}

impl<P: InterceptorPipeline, T: Transport> ProviderWorker<P, T> {
    fn new(
        config: ProviderConfig,
        pipeline: P,
        transport: T,
        commands: mpsc::UnboundedSender<Command>,
        status_mirror: Arc<RwLock<ConnectionState>>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let watchdog_tx = commands.clone();
        let watchdog = CountdownWatchdog::new(move |generation| {
            let _ = watchdog_tx.send(Command::WatchdogFired { generation });
        });

        Self {
            stale_timeout: config.stale_connection_timeout,
            throttle: ErrorThrottle::new(config.error_throttle_window),
            config,
            pipeline,
            transport: Arc::new(transport),
            commands,
            status: ConnectionState::Disconnected,
            status_mirror,
            listeners: ListenerRegistry::new(),
            dispatcher: EventDispatcher::spawn(),
            watchdog,
            throttle_timer: None,
            is_stale: false,
            init_sent: false,
            epoch: 0,
            metrics,
        }
    }

    async fn run(mut self, mut command_rx: mpsc::UnboundedReceiver<Command>) {
        debug!("[PROVIDER] Worker started for {}", self.config.url.origin().ascii_serialization());

        while let Some(command) = command_rx.recv().await {
            match command {
                Command::Connect => self.connect(),
                Command::Disconnect => self.disconnect(),
                Command::Write(message) => self.write(message),
                Command::AddListener { id, callback } => self.add_listener(id, callback),
                Command::RemoveListener { id } => self.remove_listener(&id),
                Command::RequestIntercepted { epoch, result } => {
                    self.on_request_intercepted(epoch, result)
                }
                Command::MessageIntercepted {
                    epoch,
                    kind,
                    id,
                    result,
                } => self.on_message_intercepted(epoch, kind, id, result),
                Command::Transport { epoch, event } => self.on_transport_event(epoch, event),
                Command::WatchdogFired { generation } => self.on_watchdog_fired(generation),
                Command::ThrottleWindowClosed => self.on_throttle_window_closed(),
                Command::Connectivity { reachable } => self.on_connectivity(reachable),
                Command::Shutdown => break,
            }
        }

        self.transport.close();
        self.watchdog.invalidate();
        if let Some(timer) = self.throttle_timer.take() {
            timer.abort();
        }
        info!("[PROVIDER] Worker stopped");
    }

    // ========== Public operations ==========

    fn connect(&mut self) {
        if self.status != ConnectionState::Disconnected {
            debug!("[PROVIDER] connect() while {}, echoing state", self.status);
            self.publish(ConnectionEvent::StateChanged(self.status));
            return;
        }
        if self.listeners.is_empty() {
            warn!("[PROVIDER] connect() with no listeners registered, ignoring");
            return;
        }

        self.epoch += 1;
        self.set_status(ConnectionState::Connecting);

        let request = ConnectionRequest::new(
            self.config.url.clone(),
            vec![self.config.sub_protocol.clone()],
        );
        match self.pipeline.intercept_request(request, &self.config.url) {
            Interception::Ready(result) => self.on_request_intercepted(self.epoch, result),
            Interception::Pending(intercepted) => {
                trace!("[PROVIDER] Connection request suspended in interceptors");
                let commands = self.commands.clone();
                let epoch = self.epoch;
                tokio::spawn(async move {
                    let result = intercepted.await;
                    let _ = commands.send(Command::RequestIntercepted { epoch, result });
                });
            }
        }
    }

    fn disconnect(&mut self) {
        info!("[PROVIDER] Disconnect requested");
        self.teardown();
    }

    fn write(&mut self, message: OutboundMessage) {
        let kind = message.kind();
        let id = message.id().map(str::to_owned);

        match self.pipeline.intercept_message(message, &self.config.url) {
            Interception::Ready(result) => self.on_message_intercepted(self.epoch, kind, id, result),
            Interception::Pending(intercepted) => {
                trace!("[PROVIDER] {:?} message suspended in interceptors", kind);
                let commands = self.commands.clone();
                let epoch = self.epoch;
                tokio::spawn(async move {
                    let result = intercepted.await;
                    let _ = commands.send(Command::MessageIntercepted {
                        epoch,
                        kind,
                        id,
                        result,
                    });
                });
            }
        }
    }

    fn add_listener(&mut self, id: String, callback: ListenerCallback) {
        if self.listeners.insert(id.clone(), callback) {
            debug!("[PROVIDER] Replaced listener '{}'", id);
        } else {
            debug!("[PROVIDER] Added listener '{}' ({} total)", id, self.listeners.len());
        }
    }

    fn remove_listener(&mut self, id: &str) {
        if !self.listeners.remove(id) {
            trace!("[PROVIDER] Listener '{}' was not registered", id);
            return;
        }
        debug!("[PROVIDER] Removed listener '{}' ({} left)", id, self.listeners.len());

        if self.listeners.is_empty() {
            info!("[PROVIDER] Last listener removed, closing connection");
            self.teardown();
        }
    }

    // ========== Completions and callbacks ==========

    fn on_request_intercepted(&mut self, epoch: u64, result: Result<ConnectionRequest>) {
        if epoch != self.epoch || self.status != ConnectionState::Connecting {
            debug!("[PROVIDER] Discarding connection request from abandoned connect");
            return;
        }

        match result {
            Ok(request) => self.open_transport(request),
            Err(e) => {
                warn!("[PROVIDER] Connection request interceptor failed: {}", e);
                self.fail_connection(ConnectionError::ConnectionFailure(format!(
                    "connection request interceptor failed: {}",
                    e
                )));
            }
        }
    }

    fn open_transport(&mut self, request: ConnectionRequest) {
        info!(
            "[PROVIDER] Opening socket to {}",
            request.url.origin().ascii_serialization()
        );
        let delegate = TransportDelegate::new(self.epoch, self.commands.clone());
        let transport = self.transport.clone();
        tokio::spawn(async move {
            transport.connect(request, delegate).await;
        });
    }

    fn on_message_intercepted(
        &mut self,
        epoch: u64,
        kind: OutboundKind,
        id: Option<String>,
        result: Result<OutboundMessage>,
    ) {
        if kind == OutboundKind::ConnectionInit && epoch != self.epoch {
            debug!("[PROVIDER] Discarding connection_init for a closed socket");
            return;
        }
        if kind != OutboundKind::ConnectionInit && !self.init_sent {
            // The server drops the session on any frame ahead of connection_init
            warn!(
                "[PROVIDER] {:?} written while {} before connection_init, not sent",
                kind, self.status
            );
            self.report(ConnectionError::EncodingFailure {
                id,
                message: format!("connection is {}, session not initialised", self.status),
            });
            return;
        }

        let encoded = result.and_then(|message| message.encode().map_err(Error::from));
        match encoded {
            Ok(text) => {
                trace!("[PROVIDER] Sending {:?} ({} bytes)", kind, text.len());
                self.transport.send(text);
                self.metrics.record_message_sent();
                if kind == OutboundKind::ConnectionInit {
                    self.init_sent = true;
                }
            }
            Err(e) if kind == OutboundKind::ConnectionInit => {
                warn!("[PROVIDER] Failed to encode connection_init: {}", e);
                self.fail_connection(ConnectionError::ConnectionFailure(format!(
                    "failed to encode connection_init: {}",
                    e
                )));
            }
            Err(e) => {
                warn!("[PROVIDER] Failed to encode {:?} message: {}", kind, e);
                self.report(ConnectionError::EncodingFailure {
                    id,
                    message: e.to_string(),
                });
            }
        }
    }

    fn on_transport_event(&mut self, epoch: u64, event: TransportEvent) {
        if epoch != self.epoch {
            trace!("[PROVIDER] Ignoring event from superseded socket: {:?}", event);
            return;
        }

        match event {
            TransportEvent::Connected => {
                if self.status != ConnectionState::Connecting {
                    warn!("[PROVIDER] Socket connected while {}, ignoring", self.status);
                    return;
                }
                info!("[PROVIDER] Socket connected");
                self.metrics.record_connection();
                self.is_stale = false;
                self.stale_timeout = self.config.stale_connection_timeout;
                self.set_status(ConnectionState::Connected);
                self.watchdog.reset(self.stale_timeout);
                self.write(OutboundMessage::connection_init(
                    self.config.connection_init_payload.clone(),
                ));
            }
            TransportEvent::Disconnected(None) => {
                info!("[PROVIDER] Socket closed");
                self.teardown();
            }
            TransportEvent::Disconnected(Some(reason)) => {
                let was_connecting = self.status == ConnectionState::Connecting;
                warn!("[PROVIDER] Socket failed: {}", reason);
                self.teardown();
                self.report(if was_connecting {
                    ConnectionError::ConnectionFailure(reason)
                } else {
                    ConnectionError::TransportError(reason)
                });
            }
            TransportEvent::TextReceived(text) => self.on_text(text),
        }
    }

    fn on_text(&mut self, text: String) {
        self.metrics.record_message_received();
        self.watchdog.reset(self.stale_timeout);

        let message = match InboundMessage::parse(&text) {
            Ok(message) => message,
            Err(e) => {
                warn!("[PROVIDER] Unparseable frame: {}", e);
                self.report(ConnectionError::InvalidMessage(e.to_string()));
                return;
            }
        };

        match message.kind {
            InboundKind::KeepAlive => {
                trace!("[PROVIDER] Keep-alive received");
            }
            InboundKind::ConnectionAck => {
                if let Some(timeout) = message.connection_timeout() {
                    debug!("[PROVIDER] Server keep-alive timeout is {:?}", timeout);
                    self.stale_timeout = timeout;
                    self.watchdog.reset(timeout);
                }
                self.publish(ConnectionEvent::MessageReceived(message));
            }
            InboundKind::Error => {
                self.report(message.to_connection_error());
            }
            InboundKind::ConnectionError => {
                warn!("[PROVIDER] Server rejected the connection: {:?}", message.payload);
                self.teardown();
                self.report(message.to_connection_error());
            }
            _ => {
                self.publish(ConnectionEvent::MessageReceived(message));
            }
        }
    }

    fn on_watchdog_fired(&mut self, generation: u64) {
        if !self.watchdog.accept(generation) {
            trace!("[PROVIDER] Ignoring cancelled watchdog fire {}", generation);
            return;
        }
        warn!(
            "[PROVIDER] No activity for {:?}, closing stale connection",
            self.stale_timeout
        );
        self.metrics.record_stale_timeout();
        let timeout = self.stale_timeout;
        self.teardown();
        self.report(ConnectionError::ConnectionFailure(format!(
            "no activity for {:?}, connection presumed dead",
            timeout
        )));
    }

    fn on_throttle_window_closed(&mut self) {
        self.throttle_timer = None;
        if let Some((error, occurrences)) = self.throttle.flush() {
            if occurrences > 1 {
                debug!(
                    "[PROVIDER] Coalesced {} rate-limit errors into one",
                    occurrences
                );
                self.metrics.record_errors_coalesced(occurrences as u64 - 1);
            }
            self.publish(ConnectionEvent::Error(error));
        }
    }

    fn on_connectivity(&mut self, reachable: bool) {
        if !reachable {
            if self.status == ConnectionState::Connected {
                info!("[PROVIDER] Connectivity lost, marking connection stale");
                self.is_stale = true;
            }
            return;
        }

        if self.is_stale {
            info!("[PROVIDER] Connectivity restored, reopening stale connection");
            self.metrics.record_reconnection();
            self.disconnect();
            self.connect();
            self.is_stale = false;
        }
    }

    // ========== Helpers ==========

    /// Close the socket, stop the watchdog and move to `Disconnected`
    fn teardown(&mut self) {
        self.transport.close();
        self.watchdog.invalidate();
        self.epoch += 1;
        self.is_stale = false;
        self.init_sent = false;
        self.set_status(ConnectionState::Disconnected);
    }

    fn fail_connection(&mut self, error: ConnectionError) {
        self.teardown();
        self.report(error);
    }

    fn set_status(&mut self, status: ConnectionState) {
        if self.status == status {
            return;
        }
        debug!("[PROVIDER] {} -> {}", self.status, status);
        self.status = status;
        *self.status_mirror.write() = status;
        self.publish(ConnectionEvent::StateChanged(status));
    }

    /// Route an error through the throttle to listeners
    fn report(&mut self, error: ConnectionError) {
        self.metrics.record_error();
        match self.throttle.submit(error) {
            Admission::Deliver(error) => self.publish(ConnectionEvent::Error(error)),
            Admission::Buffered { schedule: None } => {
                trace!("[PROVIDER] Rate-limit error buffered in open window");
            }
            Admission::Buffered {
                schedule: Some(window),
            } => {
                let commands = self.commands.clone();
                self.throttle_timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(window).await;
                    let _ = commands.send(Command::ThrottleWindowClosed);
                }));
            }
        }
    }

    fn publish(&self, event: ConnectionEvent) {
        self.dispatcher.publish(&self.listeners, event);
    }
}
