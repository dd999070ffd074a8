//! Scripted in-memory collaborators for session tests.

use async_channel::{Receiver, Sender};
use async_trait::async_trait;
use serde_json::json;
use std::sync::{Arc, Mutex};

use super::{Collaborators, ConcurrencyPolicy, Session};
use crate::services::{
    AiApi, AiConnection, ApiError, DatabaseApi, DatabaseSchema, GenerateSqlRequest,
    GeneratedQuery, HistoryApi, HistoryItem, QueryResult, RecordId, ServiceKind,
};

/// Holds gated calls until the test releases them
pub struct GateHandle {
    pub entered: Receiver<&'static str>,
    pub release: Sender<()>,
}

struct Gate {
    ops: Vec<&'static str>,
    entered: Sender<&'static str>,
    release: Receiver<()>,
}

struct Script {
    schema: Result<DatabaseSchema, ApiError>,
    connect: Result<(), ApiError>,
    test: Result<bool, ApiError>,
    execute: Result<QueryResult, ApiError>,
    generate: Result<GeneratedQuery, ApiError>,
    connections: Result<Vec<AiConnection>, ApiError>,
    history: Result<Vec<HistoryItem>, ApiError>,
    history_write: Result<(), ApiError>,
    history_delete: Result<(), ApiError>,
    history_clear: Result<(), ApiError>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            schema: Err(ApiError::Detail("Not connected to a database".into())),
            connect: Ok(()),
            test: Ok(true),
            execute: Ok(QueryResult::default()),
            generate: Ok(GeneratedQuery {
                query: "SELECT 1".into(),
                explanation: "Selects one".into(),
            }),
            connections: Ok(Vec::new()),
            history: Ok(Vec::new()),
            history_write: Ok(()),
            history_delete: Ok(()),
            history_clear: Ok(()),
        }
    }
}

#[derive(Default)]
struct Recorded {
    calls: Vec<&'static str>,
    connected_with: Vec<String>,
    executed: Vec<String>,
    generate_requests: Vec<GenerateSqlRequest>,
    added_history: Vec<HistoryItem>,
}

/// Stands in for all three collaborators
#[derive(Default)]
pub struct MockBackend {
    script: Mutex<Script>,
    recorded: Mutex<Recorded>,
    gate: Option<Gate>,
}

macro_rules! scripted {
    ($with:ident, $set:ident, $field:ident, $ty:ty) => {
        pub fn $with(self, result: $ty) -> Self {
            self.$set(result);
            self
        }

        pub fn $set(&self, result: $ty) {
            self.script.lock().unwrap().$field = result;
        }
    };
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    scripted!(with_schema, set_schema, schema, Result<DatabaseSchema, ApiError>);
    scripted!(with_connect, set_connect, connect, Result<(), ApiError>);
    scripted!(with_test, set_test, test, Result<bool, ApiError>);
    scripted!(with_execute, set_execute, execute, Result<QueryResult, ApiError>);
    scripted!(with_generate, set_generate, generate, Result<GeneratedQuery, ApiError>);
    scripted!(with_connections, set_connections, connections, Result<Vec<AiConnection>, ApiError>);
    scripted!(with_history, set_history, history, Result<Vec<HistoryItem>, ApiError>);
    scripted!(with_history_write, set_history_write, history_write, Result<(), ApiError>);
    scripted!(with_history_delete, set_history_delete, history_delete, Result<(), ApiError>);
    scripted!(with_history_clear, set_history_clear, history_clear, Result<(), ApiError>);

    /// Block the named calls until released through the returned handle
    pub fn gated(mut self, ops: &[&'static str]) -> (Self, GateHandle) {
        let (entered_tx, entered_rx) = async_channel::unbounded();
        let (release_tx, release_rx) = async_channel::unbounded();
        self.gate = Some(Gate {
            ops: ops.to_vec(),
            entered: entered_tx,
            release: release_rx,
        });
        (
            self,
            GateHandle {
                entered: entered_rx,
                release: release_tx,
            },
        )
    }

    pub fn into_session(self, policy: ConcurrencyPolicy) -> (Session, Arc<MockBackend>) {
        let backend = Arc::new(self);
        let collaborators = Collaborators {
            database: backend.clone(),
            ai: backend.clone(),
            history: backend.clone(),
        };
        (Session::new(collaborators, policy), backend)
    }

    pub fn calls_to(&self, op: &str) -> usize {
        self.recorded
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|call| **call == op)
            .count()
    }

    pub fn connected_with(&self) -> Vec<String> {
        self.recorded.lock().unwrap().connected_with.clone()
    }

    pub fn executed(&self) -> Vec<String> {
        self.recorded.lock().unwrap().executed.clone()
    }

    pub fn generate_requests(&self) -> Vec<GenerateSqlRequest> {
        self.recorded.lock().unwrap().generate_requests.clone()
    }

    pub fn added_history(&self) -> Vec<HistoryItem> {
        self.recorded.lock().unwrap().added_history.clone()
    }

    async fn enter(&self, op: &'static str) {
        self.recorded.lock().unwrap().calls.push(op);
        if let Some(gate) = self.gate.as_ref().filter(|gate| gate.ops.contains(&op)) {
            gate.entered.send(op).await.unwrap();
            gate.release.recv().await.unwrap();
        }
    }

    fn script<T>(&self, read: impl FnOnce(&Script) -> T) -> T {
        read(&self.script.lock().unwrap())
    }
}

#[async_trait]
impl DatabaseApi for MockBackend {
    async fn connect(&self, connection_string: &str) -> Result<(), ApiError> {
        self.recorded
            .lock()
            .unwrap()
            .connected_with
            .push(connection_string.to_string());
        self.enter("connect").await;
        self.script(|s| s.connect.clone())
    }

    async fn test_connection(&self, _connection_string: &str) -> Result<bool, ApiError> {
        self.enter("test_connection").await;
        self.script(|s| s.test.clone())
    }

    async fn schema(&self) -> Result<DatabaseSchema, ApiError> {
        self.enter("schema").await;
        self.script(|s| s.schema.clone())
    }

    async fn execute(&self, sql: &str) -> Result<QueryResult, ApiError> {
        self.recorded.lock().unwrap().executed.push(sql.to_string());
        self.enter("execute").await;
        self.script(|s| s.execute.clone())
    }
}

#[async_trait]
impl AiApi for MockBackend {
    async fn generate_sql(&self, request: &GenerateSqlRequest) -> Result<GeneratedQuery, ApiError> {
        self.recorded
            .lock()
            .unwrap()
            .generate_requests
            .push(request.clone());
        self.enter("generate_sql").await;
        self.script(|s| s.generate.clone())
    }

    async fn list_connections(&self) -> Result<Vec<AiConnection>, ApiError> {
        self.enter("list_connections").await;
        self.script(|s| s.connections.clone())
    }
}

#[async_trait]
impl HistoryApi for MockBackend {
    async fn list(&self) -> Result<Vec<HistoryItem>, ApiError> {
        self.enter("list_history").await;
        self.script(|s| s.history.clone())
    }

    async fn add(&self, item: &HistoryItem) -> Result<(), ApiError> {
        self.enter("add_history").await;
        let result = self.script(|s| s.history_write.clone());
        if result.is_ok() {
            self.recorded.lock().unwrap().added_history.push(item.clone());
        }
        result
    }

    async fn delete(&self, _id: &RecordId) -> Result<(), ApiError> {
        self.enter("delete_history").await;
        self.script(|s| s.history_delete.clone())
    }

    async fn clear(&self) -> Result<(), ApiError> {
        self.enter("clear_history").await;
        self.script(|s| s.history_clear.clone())
    }
}

// ===== Sample data =====

pub fn sample_connections() -> Vec<AiConnection> {
    vec![
        AiConnection {
            id: RecordId::from(1),
            name: "OpenAI GPT-4".into(),
            service_kind: ServiceKind::OpenAi,
            model_name: "gpt-4".into(),
            api_key: Some("sk-test".into()),
            endpoint: None,
        },
        AiConnection {
            id: RecordId::from(2),
            name: "Azure GPT-3.5".into(),
            service_kind: ServiceKind::AzureOpenAi,
            model_name: "gpt-35-turbo".into(),
            api_key: Some("azure-test".into()),
            endpoint: Some("https://example.openai.azure.com".into()),
        },
        AiConnection {
            id: RecordId::from(3),
            name: "Local Llama".into(),
            service_kind: ServiceKind::Ollama,
            model_name: "llama2".into(),
            api_key: None,
            endpoint: Some("http://localhost:11434".into()),
        },
    ]
}

pub fn sample_schema() -> DatabaseSchema {
    DatabaseSchema::new(json!({
        "tables": [
            {"name": "orders", "columns": ["id", "customer_id", "total", "created_at"]},
            {"name": "customers", "columns": ["id", "name", "email"]}
        ]
    }))
}

/// `count` order rows, newest first
pub fn orders_result(count: usize) -> QueryResult {
    let rows = (0..count)
        .map(|i| {
            json!({
                "id": 100 - i,
                "customer_id": i % 3 + 1,
                "total": 19.99 + i as f64,
                "created_at": format!("2024-05-{:02}T12:00:00", 20 - i)
            })
        })
        .collect::<Vec<_>>();
    serde_json::from_value(json!(rows)).unwrap()
}
