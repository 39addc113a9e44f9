//! Method dispatch
//!
//! Turns the raw bytes of one incoming payload into the reply a transport
//! should write back, if any. Every adapter goes through
//! [`Dispatcher::handle_payload`], so they all resolve messages the same way:
//! unparseable bytes give `Parse error`, a wrong version tag or malformed
//! request shape gives `Invalid Request`, an unknown method gives
//! `Method not found`, and anything else is answered by the registered handler.

use std::{collections::HashMap, future::Future, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error, info};

use super::{
    context::CallContext,
    message::{ErrorObject, Id, Reply, Request, Response},
};

/// Processes requests for one method. A response is returned even for
/// notifications; the dispatcher drops it.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, ctx: CallContext, request: Request) -> Response;
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(CallContext, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    async fn handle(&self, ctx: CallContext, request: Request) -> Response {
        (self)(ctx, request).await
    }
}

/// Method name to handler table. Frozen once a server starts serving.
#[derive(Default, Clone)]
pub struct Dispatcher {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H: Handler>(&mut self, method: impl Into<String>, handler: H) {
        self.handlers.insert(method.into(), Arc::new(handler));
    }

    /// `None` when nothing must be written back.
    pub async fn handle_payload(&self, ctx: &CallContext, payload: &[u8]) -> Option<Reply> {
        let value: Value = match serde_json::from_slice(payload) {
            Ok(value) => value,
            Err(err) => {
                debug!(error = %err, "payload is not valid JSON");
                return Some(Reply::Single(Response::failure(
                    Id::Absent,
                    ErrorObject::parse_error(),
                )));
            }
        };

        match value {
            Value::Array(batch) if batch.is_empty() => Some(Reply::Single(Response::failure(
                Id::Absent,
                ErrorObject::invalid_request(),
            ))),
            Value::Array(batch) => {
                let mut responses = Vec::with_capacity(batch.len());
                for item in batch {
                    if let Some(response) = self.handle_value(ctx, item).await {
                        responses.push(response);
                    }
                }
                (!responses.is_empty()).then_some(Reply::Batch(responses))
            }
            single => self.handle_value(ctx, single).await.map(Reply::Single),
        }
    }

    async fn handle_value(&self, ctx: &CallContext, value: Value) -> Option<Response> {
        match decode_request(value) {
            Ok(request) => self.dispatch(ctx, request).await,
            Err(id) => Some(Response::failure(id, ErrorObject::invalid_request())),
        }
    }

    pub async fn dispatch(&self, ctx: &CallContext, request: Request) -> Option<Response> {
        let notification = request.is_notification();
        let method = request.method.clone();
        let response = self.resolve(ctx, request).await;

        info!(
            method = %method,
            id = %response.id(),
            outcome = if response.is_error() { "failure" } else { "success" },
            notification,
            "rpc call dispatched"
        );

        (!notification).then_some(response)
    }

    async fn resolve(&self, ctx: &CallContext, request: Request) -> Response {
        if !request.has_supported_version() || request.method.is_empty() {
            return Response::failure(request.id, ErrorObject::invalid_request());
        }

        let Some(handler) = self.handlers.get(&request.method) else {
            return Response::failure(request.id, ErrorObject::method_not_found());
        };

        let handler = Arc::clone(handler);
        let id = request.id.clone();
        let ctx = ctx.clone();

        // The handler runs on its own task so a panic only fails this request.
        match tokio::spawn(async move { handler.handle(ctx, request).await }).await {
            Ok(response) => response,
            Err(err) => {
                error!(id = %id, error = %err, "handler did not complete");
                Response::failure(id, ErrorObject::internal_error())
            }
        }
    }
}

fn decode_request(value: Value) -> Result<Request, Id> {
    let id = value
        .get("id")
        .and_then(Id::from_value)
        .unwrap_or_default();

    if !value.is_object() {
        return Err(id);
    }

    serde_json::from_value(value).map_err(|err| {
        debug!(error = %err, "payload is not a valid request object");
        id
    })
}
