//! Newline-delimited JSON framing shared by the TCP and stdio transports
//!
//! Each message is one JSON value followed by `\n`. The server side runs a
//! strictly sequential loop per stream; the client side pairs every request
//! line with exactly one reply line.

use serde::{de::DeserializeOwned, Serialize};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    sync::Mutex,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::errors::TransportError;
use crate::protocol::{CallContext, Dispatcher, Request, Response};

pub(crate) fn encode_line<T: Serialize + ?Sized>(message: &T) -> Result<Vec<u8>, TransportError> {
    let mut line = serde_json::to_vec(message).map_err(TransportError::Encode)?;
    line.push(b'\n');
    Ok(line)
}

pub(crate) async fn serve_lines<R, W>(
    dispatcher: &Dispatcher,
    ctx: &CallContext,
    stop: &CancellationToken,
    reader: R,
    mut writer: W,
) -> Result<(), TransportError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();

    loop {
        line.clear();
        let read = tokio::select! {
            biased;
            _ = stop.cancelled() => return Ok(()),
            read = reader.read_until(b'\n', &mut line) => read?,
        };
        if read == 0 {
            return Ok(());
        }

        let payload = line.trim_ascii();
        if payload.is_empty() {
            continue;
        }

        let Some(reply) = dispatcher.handle_payload(ctx, payload).await else {
            continue;
        };

        let encoded = match encode_line(&reply) {
            Ok(encoded) => encoded,
            Err(err) => {
                error!(error = %err, "dropping reply that could not be encoded");
                continue;
            }
        };
        writer.write_all(&encoded).await?;
        writer.flush().await?;
    }
}

struct Halves<R, W> {
    reader: BufReader<R>,
    writer: W,
}

impl<R, W> Halves<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn write(&mut self, line: &[u8]) -> Result<(), TransportError> {
        self.writer.write_all(line).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn round_trip(&mut self, line: &[u8]) -> Result<Vec<u8>, TransportError> {
        self.write(line).await?;

        let mut reply = Vec::new();
        if self.reader.read_until(b'\n', &mut reply).await? == 0 {
            return Err(TransportError::ConnectionClosed);
        }
        Ok(reply)
    }
}

/// Client end of a line-framed stream.
///
/// Calls are serialized: one request line out, one reply line in. When an
/// exchange fails halfway (I/O error, deadline, cancellation, peer closed)
/// the stream is discarded, since a late reply would otherwise be read by
/// the next call. Later calls then fail with
/// [`TransportError::Disconnected`].
pub(crate) struct LineChannel<R, W> {
    halves: Mutex<Option<Halves<R, W>>>,
}

impl<R, W> LineChannel<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub(crate) fn new(reader: R, writer: W) -> Self {
        Self {
            halves: Mutex::new(Some(Halves {
                reader: BufReader::new(reader),
                writer,
            })),
        }
    }

    /// A request without an id is delivered like over HTTP, then reported as
    /// [`TransportError::EmptyReply`] since the peer never answers it.
    pub(crate) async fn call(
        &self,
        ctx: &CallContext,
        request: &Request,
    ) -> Result<Response, TransportError> {
        if request.is_notification() {
            self.send(ctx, request).await?;
            return Err(TransportError::EmptyReply);
        }
        self.exchange(ctx, request).await
    }

    pub(crate) async fn exchange<Q, T>(
        &self,
        ctx: &CallContext,
        message: &Q,
    ) -> Result<T, TransportError>
    where
        Q: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let line = encode_line(message)?;
        let mut guard = ctx
            .bound(async { Ok::<_, TransportError>(self.halves.lock().await) })
            .await?;
        let halves = guard.as_mut().ok_or(TransportError::Disconnected)?;

        let outcome = ctx.bound(halves.round_trip(&line)).await;
        if let Err(err) = &outcome {
            debug!(error = %err, "discarding stream after failed exchange");
            *guard = None;
        }

        let reply = outcome?;
        serde_json::from_slice(reply.trim_ascii()).map_err(TransportError::Decode)
    }

    pub(crate) async fn send<Q>(
        &self,
        ctx: &CallContext,
        message: &Q,
    ) -> Result<(), TransportError>
    where
        Q: Serialize + ?Sized,
    {
        let line = encode_line(message)?;
        let mut guard = ctx
            .bound(async { Ok::<_, TransportError>(self.halves.lock().await) })
            .await?;
        let halves = guard.as_mut().ok_or(TransportError::Disconnected)?;

        let outcome = ctx.bound(halves.write(&line)).await;
        if outcome.is_err() {
            *guard = None;
        }
        outcome
    }
}
