use tokio::sync::watch;
use tracing::debug;

/// Callback receiving reachability transitions (`true` = online)
pub type ReachabilityCallback = Box<dyn Fn(bool) + Send + Sync>;

/// Source of device connectivity transitions.
///
/// The provider calls `start` once at construction; the monitor then reports
/// every online/offline transition through the callback for as long as it runs.
pub trait ConnectivityMonitor: Send + 'static {
    fn start(self, on_update: ReachabilityCallback);
}

/// Monitor that never reports anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoConnectivity;

impl ConnectivityMonitor for NoConnectivity {
    fn start(self, _on_update: ReachabilityCallback) {}
}

/// Handle used by platform glue to push reachability into a [`WatchConnectivity`]
#[derive(Debug, Clone)]
pub struct ConnectivitySender {
    tx: watch::Sender<bool>,
}

impl ConnectivitySender {
    /// Report the current reachability; repeated values are not forwarded
    pub fn set_reachable(&self, reachable: bool) {
        self.tx.send_if_modified(|current| {
            if *current == reachable {
                false
            } else {
                *current = reachable;
                true
            }
        });
    }

    pub fn is_reachable(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Monitor fed by a [`ConnectivitySender`]
#[derive(Debug)]
pub struct WatchConnectivity {
    rx: watch::Receiver<bool>,
}

impl WatchConnectivity {
    /// Create a monitor and its sender, starting from `initially_reachable`
    pub fn new(initially_reachable: bool) -> (ConnectivitySender, Self) {
        let (tx, rx) = watch::channel(initially_reachable);
        (ConnectivitySender { tx }, Self { rx })
    }
}

impl ConnectivityMonitor for WatchConnectivity {
    fn start(self, on_update: ReachabilityCallback) {
        let mut rx = self.rx;
        rx.borrow_and_update();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let reachable = *rx.borrow_and_update();
                debug!("[CONNECTIVITY] Reachability changed: {}", reachable);
                on_update(reachable);
            }
            debug!("[CONNECTIVITY] Sender dropped, monitor stopped");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tokio::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_reports_transitions_only() {
        let (sender, monitor) = WatchConnectivity::new(true);
        let updates = Arc::new(Mutex::new(Vec::new()));
        let sink = updates.clone();
        monitor.start(Box::new(move |reachable| sink.lock().push(reachable)));

        sender.set_reachable(true);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(updates.lock().is_empty());

        sender.set_reachable(false);
        tokio::time::sleep(Duration::from_millis(1)).await;
        sender.set_reachable(true);
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(*updates.lock(), vec![false, true]);
        assert!(sender.is_reachable());
    }
}
