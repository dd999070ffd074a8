//! Domain and wire types shared by the session core and the HTTP client.
//!
//! This module contains:
//! - `RecordId` - Opaque identifier for AI connections and history items
//! - `ServiceKind` / `AiConnection` - Configured AI model endpoints
//! - `HistoryItem` - A saved prompt and the SQL generated for it
//! - `DatabaseSchema` / `QueryResult` - Database payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number, Value};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use uuid::Uuid;

// =============================================================================
// Identifiers
// =============================================================================

/// Identifier of an AI connection or history item.
///
/// The server hands out numeric ids while locally created AI connections
/// use UUIDs, so both forms are accepted and kept as text. Numeric ids are
/// written back as numbers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordId(String);

impl RecordId {
    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Millisecond timestamp id, strictly increasing within the process.
    ///
    /// History items must carry an integer id.
    pub fn next_numeric() -> Self {
        static LAST: AtomicI64 = AtomicI64::new(0);

        let now = Utc::now().timestamp_millis();
        let previous = LAST
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(now.max(last + 1)))
            .unwrap_or_else(|last| last);
        Self::from(now.max(previous + 1))
    }

    fn as_number(&self) -> Option<i64> {
        self.0.parse().ok().filter(|n: &i64| n.to_string() == self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl Serialize for RecordId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.as_number() {
            Some(n) => serializer.serialize_i64(n),
            None => serializer.serialize_str(&self.0),
        }
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(i64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Self(n.to_string()),
            Raw::Text(s) => Self(s),
        })
    }
}

// =============================================================================
// AI Connections
// =============================================================================

/// AI service backing a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceKind {
    #[serde(rename = "OpenAI")]
    OpenAi,
    #[serde(rename = "AzureOpenAI")]
    AzureOpenAi,
    #[serde(rename = "Ollama")]
    Ollama,
}

impl ServiceKind {
    /// Get the display string for this service
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::OpenAi => "OpenAI",
            ServiceKind::AzureOpenAi => "Azure OpenAI",
            ServiceKind::Ollama => "Ollama",
        }
    }

    /// Get all available services
    pub fn all() -> Vec<ServiceKind> {
        vec![
            ServiceKind::OpenAi,
            ServiceKind::AzureOpenAi,
            ServiceKind::Ollama,
        ]
    }

    /// Whether connections of this kind must carry an API key
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, ServiceKind::Ollama)
    }

    /// Whether connections of this kind must carry an endpoint
    pub fn requires_endpoint(&self) -> bool {
        matches!(self, ServiceKind::AzureOpenAi | ServiceKind::Ollama)
    }

    /// Model name suggested when creating a connection
    pub fn default_model(&self) -> &'static str {
        match self {
            ServiceKind::OpenAi => "gpt-4",
            ServiceKind::AzureOpenAi => "gpt-35-turbo",
            ServiceKind::Ollama => "llama2",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configured AI model endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiConnection {
    pub id: RecordId,
    pub name: String,
    #[serde(rename = "service_type")]
    pub service_kind: ServiceKind,
    pub model_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// Input for a connection added by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAiConnection {
    pub name: String,
    pub service_kind: ServiceKind,
    pub model_name: String,
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
}

/// Rejected AI connection input
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Connection name is required")]
    MissingName,
    #[error("Model name is required")]
    MissingModelName,
    #[error("{0} connections require an API key")]
    MissingApiKey(ServiceKind),
    #[error("{0} connections require an endpoint")]
    MissingEndpoint(ServiceKind),
}

impl NewAiConnection {
    pub fn new(
        name: impl Into<String>,
        service_kind: ServiceKind,
        model_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            service_kind,
            model_name: model_name.into(),
            api_key: None,
            endpoint: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Check required fields for the chosen service
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingName);
        }
        if self.model_name.trim().is_empty() {
            return Err(ValidationError::MissingModelName);
        }
        if self.service_kind.requires_api_key() && is_blank(&self.api_key) {
            return Err(ValidationError::MissingApiKey(self.service_kind));
        }
        if self.service_kind.requires_endpoint() && is_blank(&self.endpoint) {
            return Err(ValidationError::MissingEndpoint(self.service_kind));
        }
        Ok(())
    }

    /// Validate and assign a fresh id
    pub fn into_connection(self) -> Result<AiConnection, ValidationError> {
        self.validate()?;
        Ok(AiConnection {
            id: RecordId::generate(),
            name: self.name.trim().to_string(),
            service_kind: self.service_kind,
            model_name: self.model_name.trim().to_string(),
            api_key: non_blank(self.api_key),
            endpoint: non_blank(self.endpoint),
        })
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|v| v.trim().is_empty())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// =============================================================================
// SQL Generation
// =============================================================================

/// Request sent to the AI collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerateSqlRequest {
    pub prompt: String,
    #[serde(rename = "ai_model")]
    pub model_name: String,
    #[serde(rename = "ai_service")]
    pub service_kind: ServiceKind,
}

impl GenerateSqlRequest {
    pub fn new(prompt: impl Into<String>, connection: &AiConnection) -> Self {
        Self {
            prompt: prompt.into(),
            model_name: connection.model_name.clone(),
            service_kind: connection.service_kind,
        }
    }
}

/// SQL produced for a prompt, with a plain-language explanation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedQuery {
    pub query: String,
    #[serde(rename = "summary")]
    pub explanation: String,
}

// =============================================================================
// History
// =============================================================================

/// A successful prompt-to-SQL generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub id: RecordId,
    #[serde(rename = "timestamp", with = "timestamp")]
    pub created_at: DateTime<Utc>,
    pub prompt: String,
    #[serde(rename = "query")]
    pub generated_query: String,
    #[serde(rename = "summary")]
    pub explanation: String,
}

impl HistoryItem {
    pub fn new(prompt: impl Into<String>, generated: &GeneratedQuery) -> Self {
        Self {
            id: RecordId::next_numeric(),
            created_at: Utc::now(),
            prompt: prompt.into(),
            generated_query: generated.query.clone(),
            explanation: generated.explanation.clone(),
        }
    }
}

/// Timestamps are written as RFC 3339. Naive timestamps from the server are
/// read as UTC.
mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    const NAIVE_FORMATS: [&str; 3] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
    ];

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp `{}`", raw)))
    }

    pub(super) fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NAIVE_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
            .map(|dt| dt.and_utc())
    }
}

// =============================================================================
// Database Payloads
// =============================================================================

/// Structural description of the connected database.
///
/// Opaque to the session; only a best-effort table listing is offered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatabaseSchema(Value);

impl DatabaseSchema {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Names of the tables described by the schema, if it lists any
    pub fn table_names(&self) -> Vec<String> {
        let tables = match &self.0 {
            Value::Array(tables) => tables,
            Value::Object(map) => match map.get("tables") {
                Some(Value::Array(tables)) => tables,
                _ => return Vec::new(),
            },
            _ => return Vec::new(),
        };

        tables
            .iter()
            .filter_map(|table| match table {
                Value::String(name) => Some(name.clone()),
                Value::Object(map) => map.get("name").and_then(Value::as_str).map(str::to_string),
                _ => None,
            })
            .collect()
    }
}

/// Scalar value of a result cell
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Bool(bool),
    Number(Number),
    Text(String),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => f.write_str("NULL"),
            CellValue::Bool(b) => write!(f, "{}", b),
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Text(s) => f.write_str(s),
        }
    }
}

/// One result row: column name to scalar value, in column order
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct Row(Map<String, Value>);

impl Row {
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn get(&self, column: &str) -> Option<CellValue> {
        self.0.get(column).map(to_cell)
    }

    pub fn cells(&self) -> impl Iterator<Item = (&str, CellValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), to_cell(v)))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for Row {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = Map::<String, Value>::deserialize(deserializer)?;
        if let Some((column, _)) = map.iter().find(|(_, v)| v.is_array() || v.is_object()) {
            return Err(serde::de::Error::custom(format!(
                "column `{}` holds a non-scalar value",
                column
            )));
        }
        Ok(Self(map))
    }
}

fn to_cell(value: &Value) -> CellValue {
    match value {
        Value::Bool(b) => CellValue::Bool(*b),
        Value::Number(n) => CellValue::Number(n.clone()),
        Value::String(s) => CellValue::Text(s.clone()),
        // Rows are checked for scalars on decode
        Value::Null | Value::Array(_) | Value::Object(_) => CellValue::Null,
    }
}

/// Rows returned by an executed query.
///
/// An empty result is a successful execution that matched nothing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryResult {
    rows: Vec<Row>,
}

impl QueryResult {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// Column names, taken from the first row
    pub fn columns(&self) -> Vec<String> {
        self.rows
            .first()
            .map(|row| row.columns().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
