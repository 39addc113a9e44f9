//! Transport-independent client and server contracts
//!
//! Every transport implements these the same way, so call sites can switch
//! between HTTP, TCP and stdio by changing only the constructor.

use async_trait::async_trait;

use crate::errors::TransportError;
use crate::protocol::{CallContext, Handler, Reply, Request, Response};

#[async_trait]
pub trait Client: Send + Sync {
    async fn call(&self, ctx: &CallContext, request: &Request) -> Result<Response, TransportError>;

    /// A batch of only notifications yields an empty batch without waiting
    /// for the server.
    async fn call_batch(
        &self,
        ctx: &CallContext,
        requests: &[Request],
    ) -> Result<Reply, TransportError>;

    async fn notify(&self, ctx: &CallContext, request: &Request) -> Result<(), TransportError>;
}

#[async_trait]
pub trait Server: Sized + Send {
    fn register<H: Handler>(&mut self, method: impl Into<String>, handler: H);

    async fn run(self, ctx: CallContext) -> Result<(), TransportError>;
}

pub(crate) fn is_all_notifications(requests: &[Request]) -> bool {
    !requests.is_empty() && requests.iter().all(Request::is_notification)
}
