//! Per-connection request loop.
//!
//! A connection is greeted with an unsolicited welcome envelope, then
//! frames are read, dispatched and answered strictly one at a time, so
//! responses leave in the order their requests completed framing.
//! Malformed frames and command failures produce error envelopes; only
//! I/O failure, peer close or server shutdown ends the loop.

use crate::commands::Registry;
use crate::dispatch::Dispatcher;
use crate::framer::LineFramer;
use crate::protocol::{decode_frame, now_iso8601, Response};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tracing::{debug, trace};

/// Connection-level failures. These end the connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connection I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),
}

/// The greeting sent once per connection before any request is read.
pub fn welcome(registry: &Registry) -> Response {
    Response::success(
        json!({
            "message": "Welcome to the command server. Send JSON messages terminated by a newline.",
            "server_time": now_iso8601(),
            "available_commands": registry.names(),
        }),
        None,
    )
}

/// Serve one client until it disconnects, fails, or shutdown is signalled.
///
/// Shutdown is observed between reads; a frame already being processed
/// is answered before the connection closes.
pub async fn handle_connection<S>(
    stream: S,
    conn: &str,
    dispatcher: Arc<Dispatcher>,
    read_buffer_size: usize,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut framer = LineFramer::with_capacity(read_buffer_size);
    let mut chunk = vec![0u8; read_buffer_size.max(1)];

    write_response(&mut writer, &welcome(dispatcher.registry())).await?;

    loop {
        let n = tokio::select! {
            read = reader.read(&mut chunk) => read?,
            _ = stopped(&mut shutdown) => {
                debug!(conn, "Closing connection for shutdown");
                break;
            }
        };

        if n == 0 {
            trace!(conn, pending = framer.pending(), "Connection closed by client");
            break;
        }

        framer.extend(&chunk[..n]);
        while let Some(frame) = framer.next_frame() {
            let response = match decode_frame(&frame) {
                Ok(message) => dispatcher.dispatch(&message, conn),
                Err(e) => {
                    debug!(conn, error = %e.message, "Malformed frame");
                    Response::error(e, None)
                }
            };
            write_response(&mut writer, &response).await?;
        }
    }

    // Best effort: the peer may already be gone.
    let _ = writer.shutdown().await;
    Ok(())
}

/// Resolves once shutdown is signalled or the server side has gone away.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|&stop| stop).await;
}

async fn write_response<W>(writer: &mut W, response: &Response) -> Result<(), ConnectionError>
where
    W: AsyncWrite + Unpin,
{
    let frame = response.to_frame()?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}
