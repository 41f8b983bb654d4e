use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Duration;

type FireCallback = Arc<dyn Fn(u64) + Send + Sync>;

/// Resettable countdown that invokes a callback when it is not reset in time.
///
/// Each arm gets a generation number which is passed to the callback. The
/// timer task re-checks the generation before firing, but a fire can still be
/// in flight when the owner invalidates, so the owner must confirm it with
/// [`CountdownWatchdog::accept`] before acting on it.
pub(crate) struct CountdownWatchdog {
    generation: Arc<AtomicU64>,
    pending: Option<JoinHandle<()>>,
    on_fire: FireCallback,
}

impl CountdownWatchdog {
    /// Create an idle watchdog
    pub fn new(on_fire: impl Fn(u64) + Send + Sync + 'static) -> Self {
        Self {
            generation: Arc::new(AtomicU64::new(0)),
            pending: None,
            on_fire: Arc::new(on_fire),
        }
    }

    /// Cancel any pending deadline and schedule a new one `interval` from now.
    ///
    /// Must be called from within a tokio runtime.
    pub fn reset(&mut self, interval: Duration) {
        self.cancel_pending();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let current = self.generation.clone();
        let on_fire = self.on_fire.clone();

        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            if current.load(Ordering::SeqCst) == generation {
                on_fire(generation);
            }
        }));
    }

    /// Cancel any pending deadline without firing
    pub fn invalidate(&mut self) {
        self.cancel_pending();
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Whether a deadline is currently outstanding
    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }

    /// Confirm a fire reported for `generation`.
    ///
    /// Returns `true` only for the current arm, which is then consumed. Fires
    /// from earlier arms or after [`invalidate`](Self::invalidate) return `false`.
    pub fn accept(&mut self, generation: u64) -> bool {
        if self.pending.is_some() && self.generation.load(Ordering::SeqCst) == generation {
            self.pending = None;
            true
        } else {
            false
        }
    }

    fn cancel_pending(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}

impl Drop for CountdownWatchdog {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}

impl std::fmt::Debug for CountdownWatchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountdownWatchdog")
            .field("generation", &self.generation.load(Ordering::SeqCst))
            .field("armed", &self.is_armed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recording_watchdog() -> (CountdownWatchdog, Arc<Mutex<Vec<u64>>>) {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = fired.clone();
        let watchdog = CountdownWatchdog::new(move |generation| sink.lock().push(generation));
        (watchdog, fired)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_after_interval() {
        let (mut watchdog, fired) = recording_watchdog();
        watchdog.reset(Duration::from_millis(100));

        tokio::time::sleep(Duration::from_millis(99)).await;
        assert!(fired.lock().is_empty());

        tokio::time::sleep(Duration::from_millis(50)).await;
        let generations = fired.lock().clone();
        assert_eq!(generations.len(), 1);
        assert!(watchdog.accept(generations[0]));
        assert!(!watchdog.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_pushes_deadline_out() {
        let (mut watchdog, fired) = recording_watchdog();
        watchdog.reset(Duration::from_millis(100));

        tokio::time::sleep(Duration::from_millis(80)).await;
        watchdog.reset(Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(fired.lock().is_empty());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(fired.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_prevents_fire() {
        let (mut watchdog, fired) = recording_watchdog();
        watchdog.reset(Duration::from_millis(100));
        watchdog.invalidate();
        assert!(!watchdog.is_armed());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(fired.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_fire_rejected_after_invalidate() {
        let (mut watchdog, fired) = recording_watchdog();
        watchdog.reset(Duration::from_millis(100));

        tokio::time::sleep(Duration::from_millis(150)).await;
        let generation = fired.lock()[0];

        // Owner invalidates before it gets around to handling the fire
        watchdog.invalidate();
        assert!(!watchdog.accept(generation));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_generation_rejected() {
        let (mut watchdog, _fired) = recording_watchdog();
        watchdog.reset(Duration::from_millis(100));
        watchdog.reset(Duration::from_millis(100));

        // Generation 1 was superseded by generation 2
        assert!(!watchdog.accept(1));
        assert!(watchdog.accept(2));
    }
}
