use async_trait::async_trait;
use reqwest::{header, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::api::{is_all_notifications, Client};
use crate::errors::TransportError;
use crate::http::handlers::JSON_CONTENT_TYPE;
use crate::protocol::{CallContext, Reply, Request, Response};

/// JSON-RPC client issuing one POST per exchange.
#[derive(Debug, Clone)]
pub struct HttpClient {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(endpoint, reqwest::Client::new())
    }

    pub fn with_client(endpoint: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            endpoint: endpoint.into(),
            client,
        }
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        ctx: &CallContext,
        message: &T,
    ) -> Result<reqwest::Response, TransportError> {
        let body = serde_json::to_vec(message).map_err(TransportError::Encode)?;

        let response = ctx
            .bound(async {
                self.client
                    .post(&self.endpoint)
                    .header(header::CONTENT_TYPE, JSON_CONTENT_TYPE)
                    .header(header::ACCEPT, JSON_CONTENT_TYPE)
                    .body(body)
                    .send()
                    .await
                    .map_err(TransportError::from)
            })
            .await?;

        let status = response.status();
        debug!(endpoint = %self.endpoint, status = status.as_u16(), "rpc post completed");
        if !status.is_success() {
            return Err(TransportError::HttpStatus(status));
        }
        Ok(response)
    }

    async fn exchange<T, R>(&self, ctx: &CallContext, message: &T) -> Result<R, TransportError>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self.post(ctx, message).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Err(TransportError::EmptyReply);
        }

        let body = ctx
            .bound(async { response.bytes().await.map_err(TransportError::from) })
            .await?;
        serde_json::from_slice(&body).map_err(TransportError::Decode)
    }
}

#[async_trait]
impl Client for HttpClient {
    async fn call(&self, ctx: &CallContext, request: &Request) -> Result<Response, TransportError> {
        self.exchange(ctx, request).await
    }

    async fn call_batch(
        &self,
        ctx: &CallContext,
        requests: &[Request],
    ) -> Result<Reply, TransportError> {
        if is_all_notifications(requests) {
            self.post(ctx, requests).await?;
            return Ok(Reply::Batch(Vec::new()));
        }
        self.exchange(ctx, requests).await
    }

    async fn notify(&self, ctx: &CallContext, request: &Request) -> Result<(), TransportError> {
        self.post(ctx, &request.clone().into_notification()).await?;
        Ok(())
    }
}
