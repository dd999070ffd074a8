//! The prompt-to-rows pipeline: generate SQL from a prompt, then execute it.
//!
//! Callers compose the two steps; nothing here re-runs a query on its own.

use super::session::Session;
use super::signal::{OperationKind, SessionEvent};
use crate::services::{GenerateSqlRequest, GeneratedQuery, HistoryItem, QueryResult};

const EMPTY_PROMPT: &str = "Please enter a question";
const EMPTY_QUERY: &str = "Please enter a SQL query";
const NOT_CONNECTED: &str = "Please connect to a database first";
const NO_AI_CONNECTION: &str = "Please select an AI connection first";

/// Where the last prompt submission stands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueryPhase {
    #[default]
    Idle,
    GeneratingSql,
    GenerationFailed,
    Generated,
    ExecutingSql,
    ExecutionFailed,
    Executed,
}

impl QueryPhase {
    /// A remote call for this phase is outstanding
    pub fn is_in_flight(&self) -> bool {
        matches!(self, QueryPhase::GeneratingSql | QueryPhase::ExecutingSql)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, QueryPhase::GenerationFailed | QueryPhase::ExecutionFailed)
    }
}

impl Session {
    /// Generate SQL for a natural-language prompt.
    ///
    /// Requires a non-empty prompt, a connected database and a selected AI
    /// connection, checked in that order. A successful generation is saved
    /// to history; failing to save it does not affect the result.
    pub async fn submit_prompt(&self, prompt: &str) -> Option<GeneratedQuery> {
        let prompt = prompt.trim();
        let request = match self.prepare_generation(prompt).await {
            Ok(request) => request,
            Err(message) => {
                self.set_error(message).await;
                return None;
            }
        };

        let _busy = self.begin(OperationKind::Generate).await?;
        self.set_query_phase(QueryPhase::GeneratingSql).await;
        tracing::info!(
            "Generating SQL with {} {}",
            request.service_kind,
            request.model_name
        );

        match self.collaborators().ai.generate_sql(&request).await {
            Ok(generated) => {
                self.set_query_phase(QueryPhase::Generated).await;
                self.record_history(HistoryItem::new(prompt, &generated)).await;
                Some(generated)
            }
            Err(e) => {
                tracing::warn!("SQL generation failed: {}", e);
                self.set_query_phase(QueryPhase::GenerationFailed).await;
                self.set_error(format!("Failed to generate query: {}", e))
                    .await;
                None
            }
        }
    }

    /// Run SQL against the connected database.
    ///
    /// `Some` with no rows is a successful query that matched nothing;
    /// `None` means the query did not run.
    pub async fn execute_query(&self, sql: &str) -> Option<QueryResult> {
        let sql = sql.trim();
        if sql.is_empty() {
            self.set_error(EMPTY_QUERY).await;
            return None;
        }
        if !self.is_database_connected().await {
            self.set_error(NOT_CONNECTED).await;
            return None;
        }

        let _busy = self.begin(OperationKind::Execute).await?;
        self.set_query_phase(QueryPhase::ExecutingSql).await;

        match self.collaborators().database.execute(sql).await {
            Ok(result) => {
                tracing::info!("Query returned {} rows", result.len());
                self.set_query_phase(QueryPhase::Executed).await;
                Some(result)
            }
            Err(e) => {
                tracing::warn!("Query execution failed: {}", e);
                self.set_query_phase(QueryPhase::ExecutionFailed).await;
                self.set_error(format!("Failed to execute query: {}", e))
                    .await;
                None
            }
        }
    }

    /// Return the pipeline to `Idle` once its outcome has been shown.
    ///
    /// Phases with a call still outstanding are left alone.
    pub async fn acknowledge_query_phase(&self) -> QueryPhase {
        let phase = {
            let mut state = self.state().write().await;
            let phase = state.query_phase;
            if !phase.is_in_flight() {
                state.query_phase = QueryPhase::Idle;
            }
            phase
        };
        if !phase.is_in_flight() && phase != QueryPhase::Idle {
            self.emit(SessionEvent::QueryPhaseChanged(QueryPhase::Idle));
        }
        phase
    }

    async fn prepare_generation(&self, prompt: &str) -> Result<GenerateSqlRequest, &'static str> {
        if prompt.is_empty() {
            return Err(EMPTY_PROMPT);
        }
        let state = self.state().read().await;
        if !state.database_connected {
            return Err(NOT_CONNECTED);
        }
        let connection = state.selected().ok_or(NO_AI_CONNECTION)?;
        Ok(GenerateSqlRequest::new(prompt, connection))
    }

    /// Save a generated query. Failure is logged and reported as an event
    /// only.
    async fn record_history(&self, item: HistoryItem) {
        match self.collaborators().history.add(&item).await {
            Ok(()) => {
                tracing::debug!("Saved history item {}", item.id);
                self.state().write().await.history_items.insert(0, item);
                self.emit(SessionEvent::HistoryChanged);
            }
            Err(e) => {
                tracing::warn!("Failed to save history item {}: {}", item.id, e);
                self.emit(SessionEvent::HistoryWriteFailed {
                    item_id: item.id,
                    error: e.to_string(),
                });
            }
        }
    }

    async fn set_query_phase(&self, phase: QueryPhase) {
        self.state().write().await.query_phase = phase;
        self.emit(SessionEvent::QueryPhaseChanged(phase));
    }
}
