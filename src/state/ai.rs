//! AI connection registry: the configured model endpoints and which one is
//! selected.

use super::session::Session;
use super::signal::SessionEvent;
use crate::services::{NewAiConnection, RecordId, ValidationError};

impl Session {
    /// Replace the AI connections with the server's list.
    ///
    /// Keeps a selection that is still present, otherwise selects the first
    /// connection.
    pub async fn load_connections(&self) {
        match self.collaborators().ai.list_connections().await {
            Ok(connections) => {
                let selected = {
                    let mut state = self.state().write().await;
                    state.ai_connections = connections;
                    let stale = state
                        .selected_connection
                        .as_ref()
                        .is_some_and(|id| !state.contains_connection(id));
                    if stale {
                        state.selected_connection = None;
                    }
                    if state.selected_connection.is_none() {
                        state.selected_connection =
                            state.ai_connections.first().map(|c| c.id.clone());
                    }
                    tracing::info!("Loaded {} AI connections", state.ai_connections.len());
                    state.selected_connection.clone()
                };
                self.emit(SessionEvent::AiConnectionsChanged);
                self.emit(SessionEvent::SelectionChanged(selected));
            }
            Err(e) => {
                tracing::warn!("Failed to load AI connections: {}", e);
                {
                    let mut state = self.state().write().await;
                    state.ai_connections.clear();
                    state.selected_connection = None;
                }
                self.emit(SessionEvent::AiConnectionsChanged);
                self.emit(SessionEvent::SelectionChanged(None));
                self.set_error(format!("Could not load AI connections: {}", e))
                    .await;
            }
        }
    }

    /// Select a connection by id.
    ///
    /// An unknown id leaves the selection unchanged and is not an error.
    pub async fn select_connection(&self, id: &RecordId) -> bool {
        {
            let mut state = self.state().write().await;
            if !state.contains_connection(id) {
                tracing::debug!("Ignoring selection of unknown AI connection {}", id);
                return false;
            }
            state.selected_connection = Some(id.clone());
        }
        self.emit(SessionEvent::SelectionChanged(Some(id.clone())));
        true
    }

    /// Add a connection locally. Invalid input sets the error slot.
    pub async fn add_ai_connection(
        &self,
        connection: NewAiConnection,
    ) -> Result<RecordId, ValidationError> {
        let connection = match connection.into_connection() {
            Ok(connection) => connection,
            Err(e) => {
                self.set_error(e.to_string()).await;
                return Err(e);
            }
        };

        let id = connection.id.clone();
        tracing::info!(
            "Adding AI connection {} ({} {})",
            connection.name,
            connection.service_kind,
            connection.model_name
        );
        self.state().write().await.ai_connections.push(connection);
        self.emit(SessionEvent::AiConnectionsChanged);
        self.set_success("AI connection added").await;
        Ok(id)
    }

    /// Remove a connection locally, dropping the selection if it pointed
    /// at it.
    pub async fn remove_ai_connection(&self, id: &RecordId) -> bool {
        let deselected = {
            let mut state = self.state().write().await;
            let before = state.ai_connections.len();
            state.ai_connections.retain(|c| &c.id != id);
            if state.ai_connections.len() == before {
                return false;
            }
            let deselect = state.selected_connection.as_ref() == Some(id);
            if deselect {
                state.selected_connection = None;
            }
            deselect
        };

        self.emit(SessionEvent::AiConnectionsChanged);
        if deselected {
            self.emit(SessionEvent::SelectionChanged(None));
        }
        self.set_success("AI connection removed").await;
        true
    }
}
