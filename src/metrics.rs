use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics for observability
///
/// Counters are updated by the provider worker and can be read from any
/// thread. Use `snapshot()` for a point-in-time view of all of them.
///
/// # Example
/// ```ignore
/// let metrics = provider.metrics();
/// println!("Connections: {}", metrics.connections());
/// println!("Coalesced rate-limit errors: {}", metrics.errors_coalesced());
/// ```
#[derive(Debug, Default)]
pub struct Metrics {
    connections_total: AtomicU64,
    reconnections_total: AtomicU64,
    messages_received_total: AtomicU64,
    messages_sent_total: AtomicU64,
    errors_total: AtomicU64,
    errors_coalesced_total: AtomicU64,
    stale_timeouts_total: AtomicU64,
}

impl Metrics {
    /// Create a new Metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    // ========== Getters ==========

    /// Get total sockets that reached `Connected`
    pub fn connections(&self) -> u64 {
        self.connections_total.load(Ordering::Relaxed)
    }

    /// Get total connectivity-triggered reconnects
    pub fn reconnections(&self) -> u64 {
        self.reconnections_total.load(Ordering::Relaxed)
    }

    /// Get total inbound frames
    pub fn messages_received(&self) -> u64 {
        self.messages_received_total.load(Ordering::Relaxed)
    }

    /// Get total outbound frames handed to the transport
    pub fn messages_sent(&self) -> u64 {
        self.messages_sent_total.load(Ordering::Relaxed)
    }

    /// Get total errors raised, before throttling
    pub fn errors(&self) -> u64 {
        self.errors_total.load(Ordering::Relaxed)
    }

    /// Get total rate-limit errors swallowed by the throttle
    pub fn errors_coalesced(&self) -> u64 {
        self.errors_coalesced_total.load(Ordering::Relaxed)
    }

    /// Get total watchdog expiries
    pub fn stale_timeouts(&self) -> u64 {
        self.stale_timeouts_total.load(Ordering::Relaxed)
    }

    // ========== Recording methods (called internally) ==========

    pub(crate) fn record_connection(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reconnection(&self) {
        self.reconnections_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_message_received(&self) {
        self.messages_received_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_message_sent(&self) {
        self.messages_sent_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_errors_coalesced(&self, count: u64) {
        self.errors_coalesced_total
            .fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_stale_timeout(&self) {
        self.stale_timeouts_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Acquire),
            reconnections_total: self.reconnections_total.load(Ordering::Acquire),
            messages_received_total: self.messages_received_total.load(Ordering::Acquire),
            messages_sent_total: self.messages_sent_total.load(Ordering::Acquire),
            errors_total: self.errors_total.load(Ordering::Acquire),
            errors_coalesced_total: self.errors_coalesced_total.load(Ordering::Acquire),
            stale_timeouts_total: self.stale_timeouts_total.load(Ordering::Acquire),
        }
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub reconnections_total: u64,
    pub messages_received_total: u64,
    pub messages_sent_total: u64,
    pub errors_total: u64,
    pub errors_coalesced_total: u64,
    pub stale_timeouts_total: u64,
}
