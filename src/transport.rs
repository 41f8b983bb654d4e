use crate::interceptor::ConnectionRequest;
use crate::provider::Command;
use std::future::Future;
use tokio::sync::mpsc;

/// Socket-level event reported by a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TransportEvent {
    Connected,
    Disconnected(Option<String>),
    TextReceived(String),
}

/// Callback surface handed to [`Transport::connect`].
///
/// Each delegate is bound to one socket-open attempt. Events reported after
/// the provider has moved on to another socket are ignored, so a transport
/// never needs to know whether its socket is still wanted.
#[derive(Clone)]
pub struct TransportDelegate {
    epoch: u64,
    commands: mpsc::UnboundedSender<Command>,
}

impl TransportDelegate {
    pub(crate) fn new(epoch: u64, commands: mpsc::UnboundedSender<Command>) -> Self {
        Self { epoch, commands }
    }

    /// The socket finished its handshake
    pub fn connected(&self) {
        self.report(TransportEvent::Connected);
    }

    /// The socket closed; `error` is set for abrupt closes and failed opens
    pub fn disconnected(&self, error: Option<String>) {
        self.report(TransportEvent::Disconnected(error));
    }

    /// A text frame arrived
    pub fn text_received(&self, text: String) {
        self.report(TransportEvent::TextReceived(text));
    }

    fn report(&self, event: TransportEvent) {
        // Provider gone; nothing left to notify
        let _ = self.commands.send(Command::Transport {
            epoch: self.epoch,
            event,
        });
    }
}

impl std::fmt::Debug for TransportDelegate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportDelegate")
            .field("epoch", &self.epoch)
            .finish()
    }
}

/// Raw message socket used by the provider.
///
/// The provider owns exactly one transport and only ever has one socket open
/// through it. `connect` runs on its own task and may take as long as the
/// handshake needs; the outcome is reported through the delegate.
pub trait Transport: Send + Sync + 'static {
    /// Open a socket for `request`, replacing any previous one
    fn connect(
        &self,
        request: ConnectionRequest,
        delegate: TransportDelegate,
    ) -> impl Future<Output = ()> + Send;

    /// Send a text frame on the open socket; dropped if none is open or its
    /// handshake is still in progress
    fn send(&self, text: String);

    /// Close the open socket, or abandon an in-flight handshake
    fn close(&self);
}
