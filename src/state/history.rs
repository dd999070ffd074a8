//! Query history kept by the server.

use std::cmp::Reverse;

use super::session::Session;
use super::signal::SessionEvent;
use crate::services::RecordId;

impl Session {
    /// Replace the local history with the server's, most recent first
    pub async fn load_history(&self) -> bool {
        match self.collaborators().history.list().await {
            Ok(mut items) => {
                items.sort_by_key(|item| Reverse(item.created_at));
                tracing::info!("Loaded {} history items", items.len());
                self.state().write().await.history_items = items;
                self.emit(SessionEvent::HistoryChanged);
                true
            }
            Err(e) => {
                tracing::warn!("Failed to load history: {}", e);
                self.set_error(format!("Could not load query history: {}", e))
                    .await;
                false
            }
        }
    }

    pub async fn delete_history_item(&self, id: &RecordId) -> bool {
        match self.collaborators().history.delete(id).await {
            Ok(()) => {
                self.state()
                    .write()
                    .await
                    .history_items
                    .retain(|item| &item.id != id);
                self.emit(SessionEvent::HistoryChanged);
                self.set_success("History item deleted").await;
                true
            }
            Err(e) => {
                tracing::warn!("Failed to delete history item {}: {}", id, e);
                self.set_error(format!("Could not delete history item: {}", e))
                    .await;
                false
            }
        }
    }

    pub async fn clear_history(&self) -> bool {
        match self.collaborators().history.clear().await {
            Ok(()) => {
                self.state().write().await.history_items.clear();
                self.emit(SessionEvent::HistoryChanged);
                self.set_success("History cleared").await;
                true
            }
            Err(e) => {
                tracing::warn!("Failed to clear history: {}", e);
                self.set_error(format!("Could not clear query history: {}", e))
                    .await;
                false
            }
        }
    }
}
