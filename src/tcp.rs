//! Persistent newline-delimited JSON-RPC over TCP
//!
//! The server spawns one task per accepted connection; each connection is an
//! independent sequential message loop. The client keeps one connection open
//! and pairs every request line with exactly one reply line.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::net::{
    tcp::{OwnedReadHalf, OwnedWriteHalf},
    TcpListener, TcpStream, ToSocketAddrs,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{is_all_notifications, Client, Server};
use crate::errors::TransportError;
use crate::lines::{serve_lines, LineChannel};
use crate::protocol::{CallContext, Dispatcher, Handler, Reply, Request, Response};

/// Pause after a failed accept so a persistent error (e.g. out of file
/// descriptors) does not spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

pub struct TcpServer {
    listener: TcpListener,
    dispatcher: Dispatcher,
}

impl TcpServer {
    pub async fn bind(addr: impl ToSocketAddrs + std::fmt::Debug) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: format!("{addr:?}"),
                source,
            })?;

        Ok(Self {
            listener,
            dispatcher: Dispatcher::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.listener.local_addr()?)
    }
}

#[async_trait]
impl Server for TcpServer {
    fn register<H: Handler>(&mut self, method: impl Into<String>, handler: H) {
        self.dispatcher.register(method, handler);
    }

    /// Accepts connections until `ctx` is cancelled, then closes the
    /// listener. Connections that are already open keep being served until
    /// their peer disconnects, and their handlers never observe `ctx`.
    async fn run(self, ctx: CallContext) -> Result<(), TransportError> {
        let Self {
            listener,
            dispatcher,
        } = self;
        let dispatcher = Arc::new(dispatcher);

        info!(addr = ?listener.local_addr().ok(), "tcp server listening");

        loop {
            let accepted = tokio::select! {
                _ = ctx.done() => break,
                accepted = listener.accept() => accepted,
            };

            let (stream, peer) = match accepted {
                Ok(connection) => connection,
                Err(err) => {
                    warn!(error = %err, "failed to accept connection");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move {
                handle_connection(stream, peer, &dispatcher).await;
            });
        }

        info!("tcp server stopped accepting connections");
        Ok(())
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, dispatcher: &Dispatcher) {
    debug!(%peer, "connection opened");

    let (reader, writer) = stream.into_split();
    // Each connection is its own root: server shutdown neither stops the loop
    // nor cancels handlers running on it.
    let ctx = CallContext::background();
    let never = CancellationToken::new();

    match serve_lines(dispatcher, &ctx, &never, reader, writer).await {
        Ok(()) => debug!(%peer, "connection closed"),
        Err(err) => warn!(%peer, error = %err, "connection terminated"),
    }
}

pub struct TcpClient {
    channel: LineChannel<OwnedReadHalf, OwnedWriteHalf>,
}

impl TcpClient {
    pub async fn connect(addr: impl ToSocketAddrs + std::fmt::Debug) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|source| TransportError::Connect {
                addr: format!("{addr:?}"),
                source,
            })?;

        Ok(Self::from_stream(stream))
    }

    pub fn from_stream(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            channel: LineChannel::new(reader, writer),
        }
    }
}

#[async_trait]
impl Client for TcpClient {
    async fn call(&self, ctx: &CallContext, request: &Request) -> Result<Response, TransportError> {
        self.channel.call(ctx, request).await
    }

    async fn call_batch(
        &self,
        ctx: &CallContext,
        requests: &[Request],
    ) -> Result<Reply, TransportError> {
        if is_all_notifications(requests) {
            self.channel.send(ctx, requests).await?;
            return Ok(Reply::Batch(Vec::new()));
        }
        self.channel.exchange(ctx, requests).await
    }

    async fn notify(&self, ctx: &CallContext, request: &Request) -> Result<(), TransportError> {
        self.channel
            .send(ctx, &request.clone().into_notification())
            .await
    }
}
