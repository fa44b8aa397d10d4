use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{AuthError, AuthErrorKind};
use crate::ports::Clock;

/// Upper bound on retained error records. Old entries fall off the ring;
/// an explicit `clear` is the only other way records disappear.
const MAX_LOG_ENTRIES: usize = 100;

/// In-process authentication error log plus publish/subscribe fan-out.
///
/// Constructed explicitly and passed where needed so tests can run
/// against fresh isolated instances instead of ambient globals.
pub struct AuthErrorBus {
    clock: Arc<dyn Clock>,
    inner: Mutex<BusInner>,
    next_id: AtomicU64,
}

struct BusInner {
    log: VecDeque<AuthError>,
    subscribers: Vec<(u64, mpsc::UnboundedSender<AuthError>)>,
}

/// Handle returned from [`AuthErrorBus::subscribe`]. Dropping the
/// receiver detaches the subscription on the next publish.
pub struct ErrorSubscription {
    pub id: u64,
    pub rx: mpsc::UnboundedReceiver<AuthError>,
}

impl AuthErrorBus {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            inner: Mutex::new(BusInner {
                log: VecDeque::new(),
                subscribers: Vec::new(),
            }),
            next_id: AtomicU64::new(0),
        }
    }

    /// Classify a failure and broadcast it. Returns the recorded error so
    /// callers can surface it in their own snapshot.
    pub fn create_error(
        &self,
        kind: AuthErrorKind,
        message: impl Into<String>,
        retryable: Option<bool>,
    ) -> AuthError {
        let err = AuthError::new(kind, message, retryable, self.clock.now());
        self.publish(err.clone());
        err
    }

    /// Append to the log and deliver to every subscriber current at this
    /// instant. The subscriber list is snapshotted first, so an
    /// unsubscribe racing the notification cannot affect delivery to the
    /// other subscribers for this event.
    pub fn publish(&self, err: AuthError) {
        debug!(kind = %err.kind, retryable = err.retryable, "auth error published");

        let senders: Vec<mpsc::UnboundedSender<AuthError>> = {
            let mut inner = self.inner.lock().expect("error bus lock poisoned");
            inner.log.push_back(err.clone());
            if inner.log.len() > MAX_LOG_ENTRIES {
                inner.log.pop_front();
            }
            // Prune subscribers whose receivers are gone
            inner.subscribers.retain(|(_, tx)| !tx.is_closed());
            inner.subscribers.iter().map(|(_, tx)| tx.clone()).collect()
        };

        for tx in senders {
            if tx.send(err.clone()).is_err() {
                warn!("auth error subscriber dropped during notification");
            }
        }
    }

    /// Register a subscriber. Delivery is ordered per subscriber and
    /// unbounded, so errors raised while a listener is still draining
    /// earlier ones are never dropped.
    pub fn subscribe(&self) -> ErrorSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .lock()
            .expect("error bus lock poisoned")
            .subscribers
            .push((id, tx));
        ErrorSubscription { id, rx }
    }

    pub fn unsubscribe(&self, id: u64) {
        self.inner
            .lock()
            .expect("error bus lock poisoned")
            .subscribers
            .retain(|(sub_id, _)| *sub_id != id);
    }

    /// Errors recorded within the trailing window, newest last. Older
    /// entries stay in the log until an explicit clear or ring overflow.
    pub fn recent(&self, window: Duration) -> Vec<AuthError> {
        let cutoff = self.clock.now() - window;
        self.inner
            .lock()
            .expect("error bus lock poisoned")
            .log
            .iter()
            .filter(|e| e.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    /// Full log, oldest first
    pub fn all(&self) -> Vec<AuthError> {
        self.inner
            .lock()
            .expect("error bus lock poisoned")
            .log
            .iter()
            .cloned()
            .collect()
    }

    /// Explicitly drop every recorded error
    pub fn clear(&self) {
        self.inner.lock().expect("error bus lock poisoned").log.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ManualClock;

    fn bus_with_clock() -> (Arc<ManualClock>, AuthErrorBus) {
        let clock = Arc::new(ManualClock::default());
        let bus = AuthErrorBus::new(clock.clone());
        (clock, bus)
    }

    #[tokio::test]
    async fn delivers_to_all_current_subscribers_in_order() {
        let (_clock, bus) = bus_with_clock();
        let mut sub_a = bus.subscribe();
        let mut sub_b = bus.subscribe();

        bus.create_error(AuthErrorKind::NetworkError, "first", None);
        bus.create_error(AuthErrorKind::Unauthorized, "second", None);

        for sub in [&mut sub_a, &mut sub_b] {
            let first = sub.rx.recv().await.unwrap();
            let second = sub.rx.recv().await.unwrap();
            assert_eq!(first.kind, AuthErrorKind::NetworkError);
            assert_eq!(second.kind, AuthErrorKind::Unauthorized);
        }
    }

    #[tokio::test]
    async fn unsubscribe_does_not_affect_other_subscribers() {
        let (_clock, bus) = bus_with_clock();
        let sub_a = bus.subscribe();
        let mut sub_b = bus.subscribe();

        bus.unsubscribe(sub_a.id);
        bus.create_error(AuthErrorKind::RefreshFailed, "gone", None);

        assert_eq!(sub_b.rx.recv().await.unwrap().kind, AuthErrorKind::RefreshFailed);
    }

    #[test]
    fn recent_excludes_old_errors_without_deleting_them() {
        let (clock, bus) = bus_with_clock();
        bus.create_error(AuthErrorKind::NetworkError, "old", None);
        clock.advance(std::time::Duration::from_secs(120));
        bus.create_error(AuthErrorKind::Unauthorized, "fresh", None);

        let recent = bus.recent(Duration::seconds(60));
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].kind, AuthErrorKind::Unauthorized);
        // Still in the full log
        assert_eq!(bus.all().len(), 2);

        bus.clear();
        assert!(bus.all().is_empty());
    }

    #[test]
    fn log_is_ring_bounded() {
        let (_clock, bus) = bus_with_clock();
        for i in 0..(MAX_LOG_ENTRIES + 10) {
            bus.create_error(AuthErrorKind::NetworkError, format!("err {i}"), None);
        }
        assert_eq!(bus.all().len(), MAX_LOG_ENTRIES);
    }
}
