//! HTTP client for the database, AI and history endpoints.

use async_trait::async_trait;
use futures::FutureExt;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::io::{self, Read};
use std::time::Duration;
use url::Url;

use super::error::{ApiError, ErrorPayload};
use super::types::{
    AiConnection, DatabaseSchema, GenerateSqlRequest, GeneratedQuery, HistoryItem, QueryResult,
    RecordId,
};
use super::{AiApi, DatabaseApi, HistoryApi};
use crate::config::AppConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Largest response body read before giving up
const MAX_RESPONSE_BYTES: u64 = 64 * 1024 * 1024;

/// Status and raw body of a response
#[derive(Debug)]
struct Reply {
    status: u16,
    body: Vec<u8>,
}

impl Reply {
    /// The body of a 2xx reply; any other status is an error
    fn into_text(self) -> Result<String, ApiError> {
        let body = String::from_utf8(self.body).map_err(|e| ApiError::from_bytes(e.as_bytes()))?;
        if (200..300).contains(&self.status) {
            Ok(body)
        } else {
            tracing::debug!("Request failed with status {}", self.status);
            Err(ApiError::from_status(self.status, &body))
        }
    }
}

#[derive(Debug, Deserialize)]
struct TestConnectionResponse {
    success: bool,
}

/// Client for the remote collaborator.
///
/// Implements all three collaborator traits against one base URL.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: Url,
    timeout: Duration,
}

impl ApiClient {
    /// `base_url` is expected to end with `/` so relative paths nest under it
    pub fn new(base_url: Url, timeout: Duration) -> Self {
        Self { base_url, timeout }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.api_base_url.clone(), config.request_timeout)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, ApiError> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|e| ApiError::Transport(format!("Invalid endpoint {}: {}", path, e)))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// Send a request and return the body of a successful response.
    ///
    /// ureq is synchronous, so the request runs on the blocking pool and
    /// races the configured timeout. The agent carries the same timeout so
    /// an abandoned request does not outlive it.
    async fn send(&self, method: Method, url: Url, body: Option<String>) -> Result<String, ApiError> {
        let path = url.path().to_string();
        let timeout = self.timeout;
        tracing::debug!("{} {}", method, path);

        let request = smol::unblock(move || -> Result<Reply, ApiError> {
            let agent = ureq::AgentBuilder::new().timeout(timeout).build();
            let request = agent
                .request(method.as_str(), url.as_str())
                .set("accept", "application/json");

            let result = match (method, body) {
                (Method::Post, body) => request
                    .set("content-type", "application/json")
                    .send_string(body.as_deref().unwrap_or_default()),
                (Method::Get | Method::Delete, _) => request.call(),
            };
            let response = match result {
                Ok(response) => response,
                Err(ureq::Error::Status(_, response)) => response,
                Err(ureq::Error::Transport(transport)) => return Err(transport_error(&transport)),
            };

            let status = response.status();
            let mut body = Vec::new();
            response
                .into_reader()
                .take(MAX_RESPONSE_BYTES)
                .read_to_end(&mut body)
                .map_err(|e| io_error(&e))?;
            Ok(Reply { status, body })
        });
        let timer = smol::Timer::after(timeout);

        let reply = futures::select! {
            result = Box::pin(request).fuse() => result?,
            _ = Box::pin(timer).fuse() => {
                tracing::warn!("{} {} timed out after {:?}", method, path, timeout);
                return Err(ApiError::Unresponsive);
            }
        };
        reply.into_text()
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.endpoint(path, &[])?;
        decode(&self.send(Method::Get, url, None).await?)
    }
}

/// Decode a typed payload, treating a `detail` body as a failure
fn decode<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    if let Some(err) = ErrorPayload::parse(body).as_ref().and_then(ErrorPayload::detail_error) {
        return Err(err);
    }
    serde_json::from_str(body).map_err(|e| {
        tracing::debug!("Failed to decode response: {}", e);
        ApiError::from_body(body)
    })
}

/// Decode the body of a 2xx acknowledgement; only a `detail` field fails it
fn decode_ack(body: &str) -> Result<(), ApiError> {
    match ErrorPayload::parse(body).as_ref().and_then(ErrorPayload::detail_error) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn transport_error(transport: &ureq::Transport) -> ApiError {
    match std::error::Error::source(transport).and_then(|e| e.downcast_ref::<io::Error>()) {
        Some(e) => io_error(e),
        None => ApiError::Transport(transport.to_string()),
    }
}

fn io_error(e: &io::Error) -> ApiError {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ApiError::Unresponsive,
        _ => ApiError::Transport(e.to_string()),
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<String, ApiError> {
    serde_json::to_string(value)
        .map_err(|e| ApiError::Transport(format!("Failed to serialize request: {}", e)))
}

#[async_trait]
impl DatabaseApi for ApiClient {
    async fn connect(&self, connection_string: &str) -> Result<(), ApiError> {
        let url = self.endpoint("database/connect", &[("connection_string", connection_string)])?;
        decode_ack(&self.send(Method::Post, url, None).await?)
    }

    async fn test_connection(&self, connection_string: &str) -> Result<bool, ApiError> {
        let url = self.endpoint("database/test", &[("connection_string", connection_string)])?;
        let response: TestConnectionResponse = decode(&self.send(Method::Post, url, None).await?)?;
        Ok(response.success)
    }

    async fn schema(&self) -> Result<DatabaseSchema, ApiError> {
        self.get("database/schema").await
    }

    async fn execute(&self, sql: &str) -> Result<QueryResult, ApiError> {
        let url = self.endpoint("database/execute", &[("query", sql)])?;
        decode(&self.send(Method::Post, url, None).await?)
    }
}

#[async_trait]
impl AiApi for ApiClient {
    async fn generate_sql(&self, request: &GenerateSqlRequest) -> Result<GeneratedQuery, ApiError> {
        let url = self.endpoint("ai/query", &[])?;
        decode(&self.send(Method::Post, url, Some(encode(request)?)).await?)
    }

    async fn list_connections(&self) -> Result<Vec<AiConnection>, ApiError> {
        self.get("ai/connections").await
    }
}

#[async_trait]
impl HistoryApi for ApiClient {
    async fn list(&self) -> Result<Vec<HistoryItem>, ApiError> {
        self.get("history/").await
    }

    async fn add(&self, item: &HistoryItem) -> Result<(), ApiError> {
        let url = self.endpoint("history/", &[])?;
        decode_ack(&self.send(Method::Post, url, Some(encode(item)?)).await?)
    }

    async fn delete(&self, id: &RecordId) -> Result<(), ApiError> {
        let url = self.endpoint(&format!("history/{}", id), &[])?;
        decode_ack(&self.send(Method::Delete, url, None).await?)
    }

    async fn clear(&self) -> Result<(), ApiError> {
        let url = self.endpoint("history/", &[])?;
        decode_ack(&self.send(Method::Delete, url, None).await?)
    }
}
