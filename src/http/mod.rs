//! JSON-RPC over HTTP
//!
//! One POST per exchange. The server exposes a single path; protocol errors
//! are answered with status 200, only transport violations (wrong method,
//! wrong content type) get a 4xx.

pub mod client;
pub mod handlers;

use std::{net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use axum::{middleware, routing::post, Router};
use tokio::net::{TcpListener, ToSocketAddrs};
use tracing::info;

use crate::api::Server;
use crate::errors::TransportError;
use crate::logging;
use crate::protocol::{CallContext, Dispatcher, Handler};

pub use client::HttpClient;

#[derive(Clone)]
pub struct RpcState {
    pub dispatcher: Arc<Dispatcher>,
}

pub fn build_router(path: &str, dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route(
            path,
            post(handlers::rpc_endpoint).fallback(handlers::method_not_allowed),
        )
        .layer(middleware::from_fn(logging::request_logging_middleware))
        .with_state(RpcState { dispatcher })
}

pub struct HttpServer {
    listener: TcpListener,
    path: String,
    dispatcher: Dispatcher,
}

impl HttpServer {
    pub async fn bind(
        addr: impl ToSocketAddrs + std::fmt::Debug,
        path: impl Into<String>,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: format!("{addr:?}"),
                source,
            })?;

        let mut path = path.into();
        if !path.starts_with('/') {
            path.insert(0, '/');
        }

        Ok(Self {
            listener,
            path,
            dispatcher: Dispatcher::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[async_trait]
impl Server for HttpServer {
    fn register<H: Handler>(&mut self, method: impl Into<String>, handler: H) {
        self.dispatcher.register(method, handler);
    }

    /// Serves until `ctx` is cancelled. Shutdown stops accepting new
    /// connections and waits for in-flight requests to finish.
    async fn run(self, ctx: CallContext) -> Result<(), TransportError> {
        let Self {
            listener,
            path,
            dispatcher,
        } = self;

        info!(addr = ?listener.local_addr().ok(), path = %path, "http server listening");

        let app = build_router(&path, Arc::new(dispatcher));
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async move { ctx.done().await })
            .await?;

        info!("http server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::calculator;

    fn app() -> Router {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register("add", calculator::add);
        dispatcher.register("subtract", calculator::subtract);
        build_router("/rpc", Arc::new(dispatcher))
    }

    fn rpc_post(body: &'static str) -> Request<Body> {
        Request::builder()
            .uri("/rpc")
            .method("POST")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .expect("request build")
    }

    async fn body_text(response: axum::response::Response) -> String {
        let body = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        String::from_utf8(body.to_vec()).expect("utf-8 body")
    }

    #[tokio::test]
    async fn add_returns_sum() {
        let response = app()
            .oneshot(rpc_post(
                r#"{"jsonrpc":"2.0","method":"add","params":{"a":5,"b":3},"id":1}"#,
            ))
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok()),
            Some("application/json")
        );
        assert_eq!(
            body_text(response).await,
            r#"{"jsonrpc":"2.0","result":8,"id":1}"#
        );
    }

    #[tokio::test]
    async fn protocol_errors_keep_status_ok() {
        let response = app()
            .oneshot(rpc_post(
                r#"{"jsonrpc":"2.0","method":"add","params":"invalid","id":4}"#,
            ))
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&body_text(response).await).expect("json body");
        assert_eq!(body["error"]["code"], -32602);
        assert_eq!(body["id"], 4);
    }

    #[tokio::test]
    async fn malformed_body_is_parse_error() {
        let response = app()
            .oneshot(rpc_post("{\"jsonrpc\":"))
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_text(response).await,
            r#"{"jsonrpc":"2.0","error":{"code":-32700,"message":"Parse error"},"id":null}"#
        );
    }

    #[tokio::test]
    async fn get_is_method_not_allowed() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/rpc")
                    .method("GET")
                    .body(Body::empty())
                    .expect("request build"),
            )
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        let body: Value = serde_json::from_str(&body_text(response).await).expect("json body");
        assert_eq!(body["code"], "method_not_allowed");
        assert!(body.get("jsonrpc").is_none());
    }

    #[tokio::test]
    async fn non_json_content_type_is_bad_request() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/rpc")
                    .method("POST")
                    .header(header::CONTENT_TYPE, "text/plain")
                    .body(Body::from(r#"{"jsonrpc":"2.0","method":"add","id":1}"#))
                    .expect("request build"),
            )
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_str(&body_text(response).await).expect("json body");
        assert_eq!(body["code"], "unsupported_content_type");
    }

    #[tokio::test]
    async fn missing_content_type_is_bad_request() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/rpc")
                    .method("POST")
                    .body(Body::from(r#"{"jsonrpc":"2.0","method":"add","id":1}"#))
                    .expect("request build"),
            )
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn other_paths_are_not_found() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/")
                    .method("POST")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"jsonrpc":"2.0","method":"add","id":1}"#))
                    .expect("request build"),
            )
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn batch_returns_array_of_responses() {
        let response = app()
            .oneshot(rpc_post(
                r#"[{"jsonrpc":"2.0","method":"add","params":{"a":1,"b":2},"id":1},
                    {"jsonrpc":"2.0","method":"subtract","params":{"a":10,"b":4},"id":2},
                    {"jsonrpc":"2.0","method":"add","params":{"a":1,"b":1}}]"#,
            ))
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&body_text(response).await).expect("json body");
        assert_eq!(
            body,
            json!([
                {"jsonrpc": "2.0", "result": 3, "id": 1},
                {"jsonrpc": "2.0", "result": 6, "id": 2}
            ])
        );
    }

    #[tokio::test]
    async fn notification_has_no_content() {
        let response = app()
            .oneshot(rpc_post(
                r#"{"jsonrpc":"2.0","method":"add","params":{"a":1,"b":2}}"#,
            ))
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(body_text(response).await, "");
    }
}
