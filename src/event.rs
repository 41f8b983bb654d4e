use crate::error::ConnectionError;
use crate::message::InboundMessage;
use std::fmt;

/// Logical state of the shared connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No socket; initial state and the end of every connection cycle
    #[default]
    Disconnected,
    /// Socket open requested, waiting for the transport
    Connecting,
    /// Socket open and `connection_init` sent
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// Event delivered to every registered listener
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// Connection state changed, or `connect()` was called while not disconnected
    StateChanged(ConnectionState),
    /// Protocol message received from the server
    MessageReceived(InboundMessage),
    /// Connection- or subscription-scope error
    Error(ConnectionError),
}
