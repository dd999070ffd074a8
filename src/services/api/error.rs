//! Normalized collaborator failures.

use serde::Deserialize;
use serde_json::Value;

/// A failed call to the remote collaborator.
///
/// `Display` yields the single human-readable line shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The server explained the failure in a `detail` field
    #[error("{0}")]
    Detail(String),
    /// The server explained the failure in a `message` field
    #[error("{0}")]
    Message(String),
    /// A non-success status with no explanation in the body
    #[error("Error: {0}")]
    Status(u16),
    /// The body was neither the expected payload nor an error payload
    #[error("Unexpected response from server")]
    UnexpectedResponse { body: String },
    /// The request was sent but no response arrived in time
    #[error("Server did not respond")]
    Unresponsive,
    /// The request could not be sent
    #[error("{0}")]
    Transport(String),
}

/// Error body shapes produced by the server
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorPayload {
    #[serde(default)]
    pub detail: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorPayload {
    pub(crate) fn parse(body: &str) -> Option<Self> {
        serde_json::from_str(body).ok()
    }

    /// The `detail` field as an error, if present
    pub(crate) fn detail_error(&self) -> Option<ApiError> {
        self.detail.as_ref().map(|detail| {
            ApiError::Detail(match detail {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
        })
    }
}

const MAX_BODY_PREVIEW: usize = 512;

impl ApiError {
    /// Build the error for a body that did not match the expected payload
    pub(crate) fn from_body(body: &str) -> Self {
        let payload = ErrorPayload::parse(body);
        if let Some(err) = payload.as_ref().and_then(ErrorPayload::detail_error) {
            return err;
        }
        match payload.and_then(|p| p.message) {
            Some(message) => ApiError::Message(message),
            None => ApiError::UnexpectedResponse {
                body: preview(body),
            },
        }
    }

    /// Build the error for a non-success status: `detail`, then `message`,
    /// then the status code itself
    pub(crate) fn from_status(status: u16, body: &str) -> Self {
        match ApiError::from_body(body) {
            ApiError::UnexpectedResponse { .. } => ApiError::Status(status),
            err => err,
        }
    }

    /// Build the error for a body that is not valid UTF-8
    pub(crate) fn from_bytes(bytes: &[u8]) -> Self {
        ApiError::UnexpectedResponse {
            body: preview(&String::from_utf8_lossy(bytes)),
        }
    }
}

fn preview(body: &str) -> String {
    body.chars().take(MAX_BODY_PREVIEW).collect()
}
