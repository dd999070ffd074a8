//! Database connectivity: the startup probe, user-initiated connects and
//! side-effect-free connection tests.

use super::session::Session;
use super::signal::{OperationKind, SessionEvent};
use crate::services::ApiError;

const CONNECTED_MESSAGE: &str = "Connected to database";
const EMPTY_CONNECTION_STRING: &str = "Please enter a connection string";

/// Outcome of a connection test. Never touches the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionTest {
    pub ok: bool,
}

/// How a failed schema fetch is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SchemaFailure {
    /// Mark the session disconnected and log; nothing reaches the user
    Silent,
    /// Leave state untouched and hand the error to the caller
    Surface,
}

impl Session {
    /// Probe for a connection the server already holds.
    ///
    /// Failure only marks the session disconnected.
    pub async fn check_existing_connection(&self) {
        let _ = self.fetch_schema(SchemaFailure::Silent).await;
    }

    /// Connect the server to a database and load its schema.
    ///
    /// Returns false and sets the error slot on failure, leaving the
    /// previous connection state in place.
    pub async fn connect(&self, connection_string: &str) -> bool {
        let connection_string = connection_string.trim();
        if connection_string.is_empty() {
            self.set_error(EMPTY_CONNECTION_STRING).await;
            return false;
        }

        let Some(_busy) = self.begin(OperationKind::Connect).await else {
            return false;
        };

        tracing::info!("Connecting to database");
        let result = async {
            self.collaborators().database.connect(connection_string).await?;
            self.fetch_schema(SchemaFailure::Surface).await
        }
        .await;

        match result {
            Ok(()) => {
                tracing::info!("Database connected");
                self.set_success(CONNECTED_MESSAGE).await;
                true
            }
            Err(e) => {
                tracing::warn!("Database connection failed: {}", e);
                self.set_error(format!("Failed to connect to database: {}", e))
                    .await;
                false
            }
        }
    }

    /// Ask the server whether `connection_string` works, without keeping it
    pub async fn test_connection(&self, connection_string: &str) -> ConnectionTest {
        let connection_string = connection_string.trim();
        if connection_string.is_empty() {
            return ConnectionTest { ok: false };
        }

        match self.collaborators().database.test_connection(connection_string).await {
            Ok(ok) => {
                tracing::debug!("Connection test returned {}", ok);
                ConnectionTest { ok }
            }
            Err(e) => {
                tracing::warn!("Connection test failed: {}", e);
                ConnectionTest { ok: false }
            }
        }
    }

    async fn fetch_schema(&self, failure: SchemaFailure) -> Result<(), ApiError> {
        match self.collaborators().database.schema().await {
            Ok(schema) => {
                {
                    let mut state = self.state().write().await;
                    state.database_connected = true;
                    state.database_schema = Some(schema);
                }
                self.emit(SessionEvent::DatabaseConnectionChanged(true));
                Ok(())
            }
            Err(e) => {
                if failure == SchemaFailure::Silent {
                    tracing::debug!("No existing database connection: {}", e);
                    self.state().write().await.database_connected = false;
                    self.emit(SessionEvent::DatabaseConnectionChanged(false));
                }
                Err(e)
            }
        }
    }
}
