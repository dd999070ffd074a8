//! The shared session container and its lifecycle.

use async_channel::Receiver;
use async_lock::RwLock;
use std::sync::Arc;

use super::query::QueryPhase;
use super::signal::{BusyGuard, ConcurrencyPolicy, OperationKind, SessionEvent, Signal};
use crate::services::{
    AiApi, AiConnection, ApiClient, DatabaseApi, DatabaseSchema, HistoryApi, HistoryItem,
    RecordId,
};

/// The remote collaborators a session talks to
#[derive(Clone)]
pub struct Collaborators {
    pub database: Arc<dyn DatabaseApi>,
    pub ai: Arc<dyn AiApi>,
    pub history: Arc<dyn HistoryApi>,
}

impl Collaborators {
    /// Route all three collaborators through one HTTP client
    pub fn from_client(client: ApiClient) -> Self {
        let client = Arc::new(client);
        Self {
            database: client.clone(),
            ai: client.clone(),
            history: client,
        }
    }
}

/// Mutable session fields. Only reachable through `Session`.
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub(crate) database_connected: bool,
    pub(crate) database_schema: Option<DatabaseSchema>,
    pub(crate) ai_connections: Vec<AiConnection>,
    /// Id into `ai_connections`, resolved on every read
    pub(crate) selected_connection: Option<RecordId>,
    /// Most recent first
    pub(crate) history_items: Vec<HistoryItem>,
    pub(crate) error: Option<String>,
    pub(crate) success_message: Option<String>,
    pub(crate) query_phase: QueryPhase,
}

impl SessionState {
    pub(crate) fn selected(&self) -> Option<&AiConnection> {
        let id = self.selected_connection.as_ref()?;
        self.ai_connections.iter().find(|c| &c.id == id)
    }

    pub(crate) fn contains_connection(&self, id: &RecordId) -> bool {
        self.ai_connections.iter().any(|c| &c.id == id)
    }
}

/// Point-in-time copy of the session for presentation
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub database_connected: bool,
    pub database_schema: Option<DatabaseSchema>,
    pub ai_connections: Vec<AiConnection>,
    pub selected_connection: Option<AiConnection>,
    pub history_items: Vec<HistoryItem>,
    pub error: Option<String>,
    pub success_message: Option<String>,
    pub busy: bool,
    pub query_phase: QueryPhase,
}

struct Inner {
    state: RwLock<SessionState>,
    signal: Signal,
    collaborators: Collaborators,
}

/// Session-wide state shared by connection management, the AI connection
/// registry, the query orchestrator and the notification slots.
///
/// Cloning is cheap and every clone sees the same state. The lock is never
/// held across a remote call.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    pub fn new(collaborators: Collaborators, policy: ConcurrencyPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(SessionState::default()),
                signal: Signal::new(policy),
                collaborators,
            }),
        }
    }

    /// Run the startup probes concurrently: the silent schema check and
    /// the AI connection load.
    pub async fn init(&self) {
        tracing::info!("Initializing session");
        futures::join!(self.check_existing_connection(), self.load_connections());
    }

    /// Recover from a presentation failure: drop notifications and the
    /// query phase, then re-run the startup probes.
    pub async fn reset(&self) {
        {
            let mut state = self.inner.state.write().await;
            state.error = None;
            state.success_message = None;
            state.query_phase = QueryPhase::Idle;
        }
        self.emit(SessionEvent::ErrorChanged(None));
        self.emit(SessionEvent::SuccessChanged(None));
        self.emit(SessionEvent::QueryPhaseChanged(QueryPhase::Idle));
        self.init().await;
    }

    /// Return every field to its initial value and close the event channel
    pub async fn teardown(&self) {
        *self.inner.state.write().await = SessionState::default();
        self.inner.signal.close();
        tracing::info!("Session torn down");
    }

    /// Receive change notifications.
    ///
    /// Events are buffered; a full buffer drops new events.
    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        self.inner.signal.subscribe()
    }

    pub fn policy(&self) -> ConcurrencyPolicy {
        self.inner.signal.policy()
    }

    // ========== Reads ==========

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.inner.state.read().await;
        SessionSnapshot {
            database_connected: state.database_connected,
            database_schema: state.database_schema.clone(),
            ai_connections: state.ai_connections.clone(),
            selected_connection: state.selected().cloned(),
            history_items: state.history_items.clone(),
            error: state.error.clone(),
            success_message: state.success_message.clone(),
            busy: self.is_busy(),
            query_phase: state.query_phase,
        }
    }

    pub async fn is_database_connected(&self) -> bool {
        self.inner.state.read().await.database_connected
    }

    pub async fn database_schema(&self) -> Option<DatabaseSchema> {
        self.inner.state.read().await.database_schema.clone()
    }

    pub async fn ai_connections(&self) -> Vec<AiConnection> {
        self.inner.state.read().await.ai_connections.clone()
    }

    pub async fn selected_connection(&self) -> Option<AiConnection> {
        self.inner.state.read().await.selected().cloned()
    }

    pub async fn history_items(&self) -> Vec<HistoryItem> {
        self.inner.state.read().await.history_items.clone()
    }

    pub async fn error(&self) -> Option<String> {
        self.inner.state.read().await.error.clone()
    }

    pub async fn success_message(&self) -> Option<String> {
        self.inner.state.read().await.success_message.clone()
    }

    pub async fn query_phase(&self) -> QueryPhase {
        self.inner.state.read().await.query_phase
    }

    /// True while a connect, generate or execute call is in flight
    pub fn is_busy(&self) -> bool {
        self.inner.signal.is_busy()
    }

    // ========== Notification slots ==========

    /// Acknowledge the current error
    pub async fn clear_error(&self) {
        let cleared = self.inner.state.write().await.error.take().is_some();
        if cleared {
            self.emit(SessionEvent::ErrorChanged(None));
        }
    }

    /// Acknowledge the current success message
    pub async fn clear_success_message(&self) {
        let cleared = self.inner.state.write().await.success_message.take().is_some();
        if cleared {
            self.emit(SessionEvent::SuccessChanged(None));
        }
    }

    pub(crate) async fn set_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.inner.state.write().await.error = Some(message.clone());
        self.emit(SessionEvent::ErrorChanged(Some(message)));
    }

    pub(crate) async fn set_success(&self, message: impl Into<String>) {
        let message = message.into();
        self.inner.state.write().await.success_message = Some(message.clone());
        self.emit(SessionEvent::SuccessChanged(Some(message)));
    }

    // ========== Internals shared by the operations ==========

    pub(crate) fn state(&self) -> &RwLock<SessionState> {
        &self.inner.state
    }

    pub(crate) fn collaborators(&self) -> &Collaborators {
        &self.inner.collaborators
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        self.inner.signal.emit(event);
    }

    /// Take the busy flag for `kind` and clear the error slot.
    ///
    /// When the policy rejects an overlapping call the error slot explains
    /// why and `None` is returned.
    pub(crate) async fn begin(&self, kind: OperationKind) -> Option<BusyGuard<'_>> {
        match self.inner.signal.acquire(kind) {
            Some(guard) => {
                self.clear_error().await;
                Some(guard)
            }
            None => {
                tracing::warn!("Rejected overlapping {}", kind);
                self.set_error(format!("A {} is already in progress", kind))
                    .await;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::{MockBackend, sample_connections, sample_schema};

    #[test]
    fn test_init_runs_both_probes() {
        smol::block_on(async {
            let (session, backend) = MockBackend::new()
                .with_schema(Ok(sample_schema()))
                .with_connections(Ok(sample_connections()))
                .into_session(ConcurrencyPolicy::Allow);

            session.init().await;

            let snapshot = session.snapshot().await;
            assert!(snapshot.database_connected);
            assert_eq!(snapshot.database_schema, Some(sample_schema()));
            assert_eq!(snapshot.ai_connections.len(), 3);
            assert_eq!(snapshot.selected_connection, Some(sample_connections()[0].clone()));
            assert_eq!(snapshot.error, None);
            assert!(!snapshot.busy);
            assert_eq!(backend.calls_to("schema"), 1);
            assert_eq!(backend.calls_to("list_connections"), 1);
        });
    }

    #[test]
    fn test_notification_slots_replace_and_clear() {
        smol::block_on(async {
            let (session, _) = MockBackend::new().into_session(ConcurrencyPolicy::Allow);

            session.set_error("first").await;
            session.set_error("second").await;
            assert_eq!(session.error().await.as_deref(), Some("second"));

            session.set_success("saved").await;
            session.clear_error().await;
            assert_eq!(session.error().await, None);
            assert_eq!(session.success_message().await.as_deref(), Some("saved"));

            session.clear_success_message().await;
            assert_eq!(session.success_message().await, None);
        });
    }

    #[test]
    fn test_reset_clears_notifications_and_reprobes() {
        smol::block_on(async {
            let (session, backend) = MockBackend::new()
                .with_connections(Ok(sample_connections()))
                .into_session(ConcurrencyPolicy::Allow);

            session.init().await;
            session.set_error("render failure").await;
            session.set_success("saved").await;

            session.reset().await;

            let snapshot = session.snapshot().await;
            assert_eq!(snapshot.error, None);
            assert_eq!(snapshot.success_message, None);
            assert_eq!(snapshot.query_phase, QueryPhase::Idle);
            assert_eq!(backend.calls_to("schema"), 2);
            assert_eq!(backend.calls_to("list_connections"), 2);
        });
    }

    #[test]
    fn test_teardown_restores_defaults_and_closes_events() {
        smol::block_on(async {
            let (session, _) = MockBackend::new()
                .with_schema(Ok(sample_schema()))
                .with_connections(Ok(sample_connections()))
                .into_session(ConcurrencyPolicy::Allow);

            session.init().await;
            let events = session.subscribe();
            session.teardown().await;

            let snapshot = session.snapshot().await;
            assert!(!snapshot.database_connected);
            assert!(snapshot.ai_connections.is_empty());
            assert_eq!(snapshot.selected_connection, None);

            // Buffered events drain, then the channel reports closed
            while events.try_recv().is_ok() {}
            assert!(events.is_closed());
        });
    }
}
