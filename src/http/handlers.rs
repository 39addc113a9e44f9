//! Axum handlers for the JSON-RPC endpoint

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::errors::HttpError;
use crate::http::RpcState;
use crate::protocol::CallContext;

pub const JSON_CONTENT_TYPE: &str = "application/json";

pub async fn rpc_endpoint(
    State(state): State<RpcState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, HttpError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if !is_json_content_type(content_type) {
        return Err(HttpError::unsupported_content_type(content_type));
    }

    // Not derived from the server context: shutdown never cancels a request.
    let ctx = CallContext::background();
    let response = match state.dispatcher.handle_payload(&ctx, &body).await {
        Some(reply) => (StatusCode::OK, Json(reply)).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    };
    Ok(response)
}

pub async fn method_not_allowed(method: Method) -> HttpError {
    HttpError::method_not_allowed(method.as_str())
}

/// Accepts `application/json` with optional parameters such as a charset.
pub fn is_json_content_type(value: &str) -> bool {
    value
        .split(';')
        .next()
        .map(str::trim)
        .is_some_and(|mime| mime.eq_ignore_ascii_case(JSON_CONTENT_TYPE))
}

#[cfg(test)]
mod tests {
    use super::is_json_content_type;

    #[test]
    fn json_content_types_are_recognized() {
        assert!(is_json_content_type("application/json"));
        assert!(is_json_content_type("application/json; charset=utf-8"));
        assert!(is_json_content_type("Application/JSON"));
        assert!(!is_json_content_type("text/plain"));
        assert!(!is_json_content_type("application/jsonl"));
        assert!(!is_json_content_type(""));
    }
}
