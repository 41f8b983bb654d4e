use crate::error::{ConnectionError, ErrorKind};
use tokio::time::Duration;

/// Outcome of offering an error to the throttle
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Admission {
    /// Deliver this error immediately
    Deliver(ConnectionError),
    /// Error was buffered; if `schedule` is set, the caller must call
    /// [`ErrorThrottle::flush`] after that delay
    Buffered { schedule: Option<Duration> },
}

/// Coalesces connection-scope rate-limit errors.
///
/// The first qualifying error opens a window; later ones only replace the
/// pending error and never extend the window. When the window closes the
/// most recent error is released. Anything else passes straight through.
#[derive(Debug)]
pub(crate) struct ErrorThrottle {
    window: Duration,
    pending: Option<ConnectionError>,
    window_open: bool,
    occurrences: usize,
}

impl ErrorThrottle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
            window_open: false,
            occurrences: 0,
        }
    }

    /// Whether an error of this shape is subject to coalescing
    pub fn applies_to(error: &ConnectionError) -> bool {
        error.kind() == ErrorKind::RateLimited && error.is_connection_scope()
    }

    /// Offer an error to the throttle
    pub fn submit(&mut self, error: ConnectionError) -> Admission {
        if !Self::applies_to(&error) {
            return Admission::Deliver(error);
        }

        self.pending = Some(error);
        self.occurrences += 1;

        if self.window_open {
            return Admission::Buffered { schedule: None };
        }
        self.window_open = true;
        Admission::Buffered {
            schedule: Some(self.window),
        }
    }

    /// Close the current window.
    ///
    /// Returns the latest buffered error and how many occurrences it stands for.
    pub fn flush(&mut self) -> Option<(ConnectionError, usize)> {
        if !std::mem::take(&mut self.window_open) {
            return None;
        }
        let occurrences = std::mem::take(&mut self.occurrences);
        self.pending.take().map(|error| (error, occurrences))
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rate_limited(n: u64) -> ConnectionError {
        ConnectionError::RateLimited {
            id: None,
            payload: Some(json!({ "n": n })),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_occurrence_opens_window() {
        let mut throttle = ErrorThrottle::new(Duration::from_millis(150));
        assert_eq!(
            throttle.submit(rate_limited(1)),
            Admission::Buffered {
                schedule: Some(Duration::from_millis(150))
            }
        );
        assert!(throttle.flush().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_latest_wins_within_window() {
        let mut throttle = ErrorThrottle::new(Duration::from_millis(150));
        throttle.submit(rate_limited(1));
        for n in 2..=5 {
            assert_eq!(
                throttle.submit(rate_limited(n)),
                Admission::Buffered { schedule: None }
            );
        }

        let (error, occurrences) = throttle.flush().expect("pending error");
        assert_eq!(error, rate_limited(5));
        assert_eq!(occurrences, 5);
        assert!(throttle.flush().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_reopens_after_flush() {
        let mut throttle = ErrorThrottle::new(Duration::from_millis(150));
        throttle.submit(rate_limited(1));
        throttle.flush();

        assert!(matches!(
            throttle.submit(rate_limited(2)),
            Admission::Buffered { schedule: Some(_) }
        ));
    }

    #[test]
    fn test_scoped_and_other_errors_bypass() {
        let mut throttle = ErrorThrottle::new(Duration::from_millis(150));
        let scoped = ConnectionError::RateLimited {
            id: Some("sub-1".to_string()),
            payload: None,
        };
        assert_eq!(throttle.submit(scoped.clone()), Admission::Deliver(scoped));

        let transport = ConnectionError::TransportError("reset".to_string());
        assert_eq!(
            throttle.submit(transport.clone()),
            Admission::Deliver(transport)
        );
        assert!(throttle.flush().is_none());
    }
}
