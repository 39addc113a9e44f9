//! Newline-delimited JSON-RPC over a pair of byte streams
//!
//! The server normally reads stdin and writes stdout. stdout is the protocol
//! channel only: logs must go to stderr (see [`crate::logging::init_logging`]).
//! The client drives a peer whose input and output are wired to it directly,
//! typically a child process.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::{
    io::{AsyncRead, AsyncWrite, Stdin, Stdout},
    process::{Child, ChildStdin, ChildStdout, Command},
};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::api::{is_all_notifications, Client, Server};
use crate::errors::TransportError;
use crate::lines::{serve_lines, LineChannel};
use crate::protocol::{CallContext, Dispatcher, Handler, Reply, Request, Response};

pub struct StdioServer<R = Stdin, W = Stdout> {
    reader: R,
    writer: W,
    dispatcher: Dispatcher,
}

impl StdioServer {
    pub fn new() -> Self {
        Self::with_streams(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl Default for StdioServer {
    fn default() -> Self {
        Self::new()
    }
}

impl<R, W> StdioServer<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn with_streams(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            dispatcher: Dispatcher::new(),
        }
    }
}

#[async_trait]
impl<R, W> Server for StdioServer<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    fn register<H: Handler>(&mut self, method: impl Into<String>, handler: H) {
        self.dispatcher.register(method, handler);
    }

    /// Processes one line at a time until end of input. Cancelling `ctx`
    /// stops the loop before the next line is read; a handler already running
    /// gets its own context and finishes.
    async fn run(self, ctx: CallContext) -> Result<(), TransportError> {
        let stop: &CancellationToken = ctx.token();
        let handler_ctx = CallContext::background();
        info!("stdio server started");

        let result = serve_lines(
            &self.dispatcher,
            &handler_ctx,
            stop,
            self.reader,
            self.writer,
        )
        .await;

        info!("stdio server stopped");
        result
    }
}

pub struct StdioClient<R = ChildStdout, W = ChildStdin> {
    channel: LineChannel<R, W>,
}

impl StdioClient {
    /// Starts `command` with piped stdin and stdout and returns a client
    /// talking to it. The child's stderr is inherited.
    pub fn spawn(command: &mut Command) -> Result<(Self, Child), TransportError> {
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(TransportError::Io(std::io::Error::other(
                "child process has no piped stdio",
            )));
        };

        Ok((Self::with_streams(stdout, stdin), child))
    }
}

impl<R, W> StdioClient<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// `reader` carries the peer's output, `writer` feeds the peer's input.
    pub fn with_streams(reader: R, writer: W) -> Self {
        Self {
            channel: LineChannel::new(reader, writer),
        }
    }
}

#[async_trait]
impl<R, W> Client for StdioClient<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
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

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};
    use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    use super::*;
    use crate::protocol::{ErrorCode, Id};

    fn echo_server(reader: DuplexStream, writer: DuplexStream) -> StdioServer<DuplexStream, DuplexStream> {
        let mut server = StdioServer::with_streams(reader, writer);
        server.register("echo", |_ctx: CallContext, request: Request| async move {
            let params = request.params.clone().unwrap_or(Value::Null);
            Response::success(request.id, params)
        });
        server
    }

    #[tokio::test]
    async fn malformed_line_gets_parse_error_and_loop_continues() {
        let (mut input, server_in) = duplex(4096);
        let (server_out, output) = duplex(4096);
        let server = tokio::spawn(echo_server(server_in, server_out).run(CallContext::background()));

        input
            .write_all(b"not-json\n\n   \n{\"jsonrpc\":\"2.0\",\"method\":\"echo\",\"params\":\"hi\",\"id\":2}\n")
            .await
            .expect("write input");
        drop(input);

        let mut lines = BufReader::new(output).lines();
        let first = lines.next_line().await.expect("read line").expect("first line");
        let second = lines.next_line().await.expect("read line").expect("second line");
        let end = lines.next_line().await.expect("read line");

        assert_eq!(
            first,
            r#"{"jsonrpc":"2.0","error":{"code":-32700,"message":"Parse error"},"id":null}"#
        );
        assert_eq!(second, r#"{"jsonrpc":"2.0","result":"hi","id":2}"#);
        assert_eq!(end, None);
        server.await.expect("server task").expect("server result");
    }

    #[tokio::test]
    async fn notifications_produce_no_output() {
        let (mut input, server_in) = duplex(4096);
        let (server_out, output) = duplex(4096);
        let server = tokio::spawn(echo_server(server_in, server_out).run(CallContext::background()));

        input
            .write_all(b"{\"jsonrpc\":\"2.0\",\"method\":\"echo\",\"params\":1}\n{\"jsonrpc\":\"2.0\",\"method\":\"nope\"}\n")
            .await
            .expect("write input");
        drop(input);

        let mut lines = BufReader::new(output).lines();
        assert_eq!(lines.next_line().await.expect("read line"), None);
        server.await.expect("server task").expect("server result");
    }

    #[tokio::test]
    async fn client_and_server_talk_over_wired_streams() {
        let (client_out, server_in) = duplex(4096);
        let (server_out, client_in) = duplex(4096);
        let ctx = CallContext::background();
        let server = tokio::spawn(echo_server(server_in, server_out).run(ctx.clone()));
        let client = StdioClient::with_streams(client_in, client_out);

        let request = Request::new("echo")
            .with_params(&json!({"k": "v"}))
            .expect("params encode")
            .with_id("s-1");
        let response = client.call(&ctx, &request).await.expect("call");
        assert_eq!(response.id(), &Id::from("s-1"));
        assert_eq!(response.result(), Some(&json!({"k": "v"})));

        client.notify(&ctx, &request).await.expect("notify");

        let batch = client
            .call_batch(&ctx, &[request.clone(), Request::new("missing").with_id(2)])
            .await
            .expect("batch call");
        let responses = batch.into_responses();
        assert_eq!(responses.len(), 2);
        assert_eq!(
            responses[1].error().map(|err| err.code),
            Some(ErrorCode::MethodNotFound)
        );

        drop(client);
        server.await.expect("server task").expect("server result");
    }
}
