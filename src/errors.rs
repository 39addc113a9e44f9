use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("failed to encode params: {0}")]
    Params(#[source] serde_json::Error),
    #[error("failed to decode message: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Transport-level failures. These are reported to the local caller and never
/// travel to the peer as a protocol error.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode response: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected HTTP status: {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error("peer sent no response")]
    EmptyReply,
    #[error("connection closed without response")]
    ConnectionClosed,
    #[error("connection is no longer usable after an earlier failure")]
    Disconnected,
    #[error("call deadline exceeded")]
    DeadlineExceeded,
    #[error("call cancelled")]
    Cancelled,
}

/// Rejections of the HTTP endpoint that happen before any JSON-RPC processing.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("method not allowed: {method}")]
    MethodNotAllowed { method: String },
    #[error("unsupported content type: {content_type}")]
    UnsupportedContentType { content_type: String },
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub details: serde_json::Value,
}

impl HttpError {
    pub fn method_not_allowed(method: impl Into<String>) -> Self {
        Self::MethodNotAllowed {
            method: method.into(),
        }
    }

    pub fn unsupported_content_type(content_type: impl Into<String>) -> Self {
        Self::UnsupportedContentType {
            content_type: content_type.into(),
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, code, details) = match &self {
            Self::MethodNotAllowed { method } => (
                StatusCode::METHOD_NOT_ALLOWED,
                "method_not_allowed",
                json!({ "method": method, "allowed": ["POST"] }),
            ),
            Self::UnsupportedContentType { content_type } => (
                StatusCode::BAD_REQUEST,
                "unsupported_content_type",
                json!({ "content_type": content_type, "expected": "application/json" }),
            ),
        };

        tracing::warn!(status = status.as_u16(), error = %self, "http request rejected");

        (
            status,
            Json(ErrorResponse {
                code: code.to_string(),
                message: self.to_string(),
                details,
            }),
        )
            .into_response()
    }
}
