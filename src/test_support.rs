use crate::event::ConnectionEvent;
use crate::interceptor::ConnectionRequest;
use crate::listener::ListenerCallback;
use crate::transport::{Transport, TransportDelegate};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::time::Duration;

#[derive(Default)]
struct MockState {
    requests: Vec<ConnectionRequest>,
    delegates: Vec<TransportDelegate>,
    sent: Vec<String>,
    closes: usize,
}

/// Transport that records every call and lets the test drive the delegate
#[derive(Clone, Default)]
pub(crate) struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect_count(&self) -> usize {
        self.state.lock().requests.len()
    }

    pub fn requests(&self) -> Vec<ConnectionRequest> {
        self.state.lock().requests.clone()
    }

    /// Delegate handed to the most recent `connect`
    pub fn delegate(&self) -> TransportDelegate {
        self.state
            .lock()
            .delegates
            .last()
            .cloned()
            .expect("connect was never called")
    }

    pub fn sent(&self) -> Vec<String> {
        self.state.lock().sent.clone()
    }

    pub fn close_count(&self) -> usize {
        self.state.lock().closes
    }
}

impl Transport for MockTransport {
    async fn connect(&self, request: ConnectionRequest, delegate: TransportDelegate) {
        let mut state = self.state.lock();
        state.requests.push(request);
        state.delegates.push(delegate);
    }

    fn send(&self, text: String) {
        self.state.lock().sent.push(text);
    }

    fn close(&self) {
        self.state.lock().closes += 1;
    }
}

/// Listener callback that appends every event to the returned log
pub(crate) fn recorder() -> (ListenerCallback, Arc<Mutex<Vec<ConnectionEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let callback: ListenerCallback = Arc::new(move |event: &ConnectionEvent| {
        sink.lock().push(event.clone());
    });
    (callback, events)
}

/// Let queued worker and dispatcher tasks drain
pub(crate) async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
