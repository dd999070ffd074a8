//! Remote collaborator interface.
//!
//! This module provides:
//! - `DatabaseApi`, `AiApi`, `HistoryApi` - The seams the session talks through
//! - `client` - `ApiClient`, the HTTP implementation of all three
//! - `error` - `ApiError`, normalized collaborator failures
//! - `types` - Domain and wire types

mod client;
mod error;
mod types;

use async_trait::async_trait;

pub use client::ApiClient;
pub use error::ApiError;
pub use types::{
    AiConnection, CellValue, DatabaseSchema, GenerateSqlRequest, GeneratedQuery, HistoryItem,
    NewAiConnection, QueryResult, RecordId, Row, ServiceKind, ValidationError,
};

/// Database connectivity and query execution
#[async_trait]
pub trait DatabaseApi: Send + Sync {
    /// Open the server-side connection described by `connection_string`
    async fn connect(&self, connection_string: &str) -> Result<(), ApiError>;

    /// Probe a connection string without keeping the connection
    async fn test_connection(&self, connection_string: &str) -> Result<bool, ApiError>;

    /// Schema of the currently connected database
    async fn schema(&self) -> Result<DatabaseSchema, ApiError>;

    async fn execute(&self, sql: &str) -> Result<QueryResult, ApiError>;
}

/// SQL generation and AI connection configuration
#[async_trait]
pub trait AiApi: Send + Sync {
    async fn generate_sql(&self, request: &GenerateSqlRequest) -> Result<GeneratedQuery, ApiError>;

    async fn list_connections(&self) -> Result<Vec<AiConnection>, ApiError>;
}

/// Persisted prompt history
#[async_trait]
pub trait HistoryApi: Send + Sync {
    async fn list(&self) -> Result<Vec<HistoryItem>, ApiError>;

    async fn add(&self, item: &HistoryItem) -> Result<(), ApiError>;

    async fn delete(&self, id: &RecordId) -> Result<(), ApiError>;

    async fn clear(&self) -> Result<(), ApiError>;
}
