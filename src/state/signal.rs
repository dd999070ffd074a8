//! Busy accounting and change notifications.

use async_channel::{Receiver, Sender, TrySendError};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::query::QueryPhase;
use crate::services::RecordId;

/// Operations that hold the busy flag while in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Connect,
    Generate,
    Execute,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Connect => "database connection",
            OperationKind::Generate => "query generation",
            OperationKind::Execute => "query execution",
        }
    }

    fn index(self) -> usize {
        match self {
            OperationKind::Connect => 0,
            OperationKind::Generate => 1,
            OperationKind::Execute => 2,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handling of a call that overlaps an in-flight call of the same kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConcurrencyPolicy {
    /// Let both run; the one resolving last wins the shared slots
    #[default]
    Allow,
    /// Fail the new call without contacting the server
    RejectWhileInFlight,
}

/// Change notifications for observers of the session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    BusyChanged(bool),
    ErrorChanged(Option<String>),
    SuccessChanged(Option<String>),
    DatabaseConnectionChanged(bool),
    AiConnectionsChanged,
    SelectionChanged(Option<RecordId>),
    HistoryChanged,
    QueryPhaseChanged(QueryPhase),
    /// A history item could not be saved after a successful generation
    HistoryWriteFailed { item_id: RecordId, error: String },
}

const EVENT_BUFFER: usize = 256;

pub(crate) struct Signal {
    in_flight: [AtomicUsize; 3],
    policy: ConcurrencyPolicy,
    /// One bounded channel per subscriber
    subscribers: Mutex<Vec<Sender<SessionEvent>>>,
    closed: AtomicBool,
}

impl Signal {
    pub(crate) fn new(policy: ConcurrencyPolicy) -> Self {
        Self {
            in_flight: Default::default(),
            policy,
            subscribers: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn policy(&self) -> ConcurrencyPolicy {
        self.policy
    }

    pub(crate) fn is_busy(&self) -> bool {
        self.in_flight
            .iter()
            .any(|count| count.load(Ordering::SeqCst) > 0)
    }

    #[cfg(test)]
    pub(crate) fn in_flight(&self, kind: OperationKind) -> usize {
        self.in_flight[kind.index()].load(Ordering::SeqCst)
    }

    /// Mark an operation as in flight.
    ///
    /// Returns `None` when the policy rejects an overlapping call.
    pub(crate) fn acquire(&self, kind: OperationKind) -> Option<BusyGuard<'_>> {
        let was_busy = self.is_busy();
        let counter = &self.in_flight[kind.index()];

        match self.policy {
            ConcurrencyPolicy::Allow => {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            ConcurrencyPolicy::RejectWhileInFlight => {
                if counter
                    .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
                {
                    return None;
                }
            }
        }

        if !was_busy {
            self.emit(SessionEvent::BusyChanged(true));
        }
        Some(BusyGuard { signal: self, kind })
    }

    /// Deliver `event` to every live subscriber. A subscriber whose buffer
    /// is full misses the event; closed subscribers are pruned.
    pub(crate) fn emit(&self, event: SessionEvent) {
        self.subscribers().retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::trace!("Subscriber buffer full, dropped {:?}", event);
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });
    }

    /// A receiver that sees every event emitted from now on
    pub(crate) fn subscribe(&self) -> Receiver<SessionEvent> {
        let (tx, rx) = async_channel::bounded(EVENT_BUFFER);
        if self.closed.load(Ordering::SeqCst) {
            tx.close();
        } else {
            self.subscribers().push(tx);
        }
        rx
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        for tx in self.subscribers().drain(..) {
            tx.close();
        }
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<Sender<SessionEvent>>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Holds the busy flag for one operation; released on drop
pub(crate) struct BusyGuard<'a> {
    signal: &'a Signal,
    kind: OperationKind,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.signal.in_flight[self.kind.index()].fetch_sub(1, Ordering::SeqCst);
        if !self.signal.is_busy() {
            self.signal.emit(SessionEvent::BusyChanged(false));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_tracks_every_guard() {
        let signal = Signal::new(ConcurrencyPolicy::Allow);
        let receiver = signal.subscribe();
        assert!(!signal.is_busy());

        let first = signal.acquire(OperationKind::Generate).unwrap();
        let second = signal.acquire(OperationKind::Generate).unwrap();
        assert_eq!(signal.in_flight(OperationKind::Generate), 2);

        drop(first);
        assert!(signal.is_busy());
        drop(second);
        assert!(!signal.is_busy());

        let events: Vec<SessionEvent> = std::iter::from_fn(|| receiver.try_recv().ok()).collect();
        assert_eq!(
            events,
            vec![SessionEvent::BusyChanged(true), SessionEvent::BusyChanged(false)]
        );
    }

    #[test]
    fn test_reject_policy_is_per_kind() {
        let signal = Signal::new(ConcurrencyPolicy::RejectWhileInFlight);

        let connect = signal.acquire(OperationKind::Connect).unwrap();
        assert!(signal.acquire(OperationKind::Connect).is_none());
        assert_eq!(signal.in_flight(OperationKind::Connect), 1);

        // Other kinds are unaffected
        let execute = signal.acquire(OperationKind::Execute);
        assert!(execute.is_some());

        drop(connect);
        assert!(signal.acquire(OperationKind::Connect).is_some());
    }

    #[test]
    fn test_closed_channel_drops_events() {
        let signal = Signal::new(ConcurrencyPolicy::Allow);
        let receiver = signal.subscribe();
        signal.close();
        signal.emit(SessionEvent::HistoryChanged);
        assert!(receiver.try_recv().is_err());
        assert!(signal.subscribe().is_closed());
    }

    #[test]
    fn test_every_subscriber_sees_every_event() {
        let signal = Signal::new(ConcurrencyPolicy::Allow);
        let first = signal.subscribe();
        let second = signal.subscribe();

        signal.emit(SessionEvent::ErrorChanged(Some("boom".into())));

        let expected = SessionEvent::ErrorChanged(Some("boom".into()));
        assert_eq!(first.try_recv().ok(), Some(expected.clone()));
        assert_eq!(second.try_recv().ok(), Some(expected));
    }

    #[test]
    fn test_late_subscriber_gets_only_fresh_events() {
        let signal = Signal::new(ConcurrencyPolicy::Allow);
        for i in 0..300 {
            signal.emit(SessionEvent::ErrorChanged(Some(format!("e{}", i))));
        }

        let late = signal.subscribe();
        signal.emit(SessionEvent::HistoryChanged);

        assert_eq!(late.try_recv().ok(), Some(SessionEvent::HistoryChanged));
        assert!(late.try_recv().is_err());
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let signal = Signal::new(ConcurrencyPolicy::Allow);
        let kept = signal.subscribe();
        drop(signal.subscribe());

        signal.emit(SessionEvent::HistoryChanged);

        assert_eq!(signal.subscribers().len(), 1);
        assert_eq!(kept.try_recv().ok(), Some(SessionEvent::HistoryChanged));
    }
}
