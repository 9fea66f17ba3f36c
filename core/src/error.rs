//! Error types for the API client.
//!
//! # Design
//! Every failed response is surfaced as an `Err`, never as a normal value.
//! A non-2xx response with a JSON body keeps that body verbatim in `Server`;
//! one whose body is not JSON becomes `Parse`, which reports the generic
//! fallback body. A 401 that the caller should answer by sending the user to
//! the login page is wrapped in `AuthRequired`, so the underlying failure is
//! still available through `source`.

use serde_json::{json, Value};

/// Message reported when a failed response carries no readable JSON body.
pub const FALLBACK_MESSAGE: &str = "An error occurred";

/// Errors returned by the gateway and everything built on it.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The server returned a non-2xx status with a JSON body.
    #[error("HTTP {status}: {}", describe(.body))]
    Server { status: u16, body: Value },

    /// The server returned a non-2xx status and the body was not JSON.
    #[error("HTTP {status}: {}", FALLBACK_MESSAGE)]
    Parse { status: u16 },

    /// A 401 outside of an auth flow; the caller should navigate to
    /// `redirect_to`.
    #[error("authentication required (redirect to {redirect_to})")]
    AuthRequired {
        redirect_to: String,
        #[source]
        source: Box<ApiError>,
    },

    /// The request never produced a response.
    #[error("transport failed: {0}")]
    Transport(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// A 2xx body could not be read as JSON or lacked the expected shape.
    #[error("deserialization failed: {0}")]
    Deserialization(String),
}

impl ApiError {
    /// HTTP status of the failed response, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Server { status, .. } | ApiError::Parse { status } => Some(*status),
            ApiError::AuthRequired { source, .. } => source.status(),
            _ => None,
        }
    }

    /// Structured error body: the server's JSON, or the fallback object when
    /// the body was unreadable. Local failures report their own message.
    pub fn body(&self) -> Value {
        match self {
            ApiError::Server { body, .. } => body.clone(),
            ApiError::Parse { .. } => json!({ "message": FALLBACK_MESSAGE }),
            ApiError::AuthRequired { source, .. } => source.body(),
            other => json!({ "message": other.to_string() }),
        }
    }

    /// Human-readable message taken from the body's `error` or `message`
    /// field.
    pub fn message(&self) -> Option<String> {
        message_field(&self.body()).map(str::to_string)
    }

    /// Where the caller should navigate, when the failure requires login.
    pub fn redirect_to(&self) -> Option<&str> {
        match self {
            ApiError::AuthRequired { redirect_to, .. } => Some(redirect_to),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

fn message_field(body: &Value) -> Option<&str> {
    body.get("error")
        .or_else(|| body.get("message"))
        .and_then(Value::as_str)
}

fn describe(body: &Value) -> String {
    message_field(body).map_or_else(|| body.to_string(), str::to_string)
}
