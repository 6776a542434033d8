//! Downstream forwarding of decoded frames to the visualizer.
//!
//! The visualizer expects one newline-terminated line per frame with the
//! motion flags as `0`/`1`. Forwarding is best-effort: a write either goes
//! through or is reported, never queued, never retried.

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::decoder::SensorFrame;

/// Errors from writing to the downstream consumer.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    /// The write or flush failed (broken pipe, reset peer).
    #[error("downstream write failed: {0}")]
    Io(#[from] std::io::Error),

    /// The sink was already released.
    #[error("downstream sink closed")]
    Closed,
}

/// Something that accepts forwarded frame lines.
///
/// The bridge runs with exactly one sink; a fan-out sink can implement this
/// trait without touching the ingest loop.
#[async_trait]
pub trait EventSink: Send {
    /// Write one complete line (including its trailing newline).
    ///
    /// # Errors
    ///
    /// Returns [`ForwardError`] when the line could not be written.
    async fn send_line(&mut self, line: &str) -> Result<(), ForwardError>;

    /// Close the sink. Further sends fail with [`ForwardError::Closed`].
    ///
    /// # Errors
    ///
    /// Returns [`ForwardError`] if the underlying shutdown fails.
    async fn release(&mut self) -> Result<(), ForwardError>;
}

/// [`EventSink`] over any async byte stream.
pub struct StreamSink<W> {
    writer: Option<W>,
}

impl<W> StreamSink<W> {
    /// Wrap a connected writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Some(writer),
        }
    }

    /// Borrow the inner writer, if not yet released.
    pub fn get_ref(&self) -> Option<&W> {
        self.writer.as_ref()
    }
}

#[async_trait]
impl<W> EventSink for StreamSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send_line(&mut self, line: &str) -> Result<(), ForwardError> {
        let writer = self.writer.as_mut().ok_or(ForwardError::Closed)?;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn release(&mut self) -> Result<(), ForwardError> {
        match self.writer.take() {
            Some(mut writer) => Ok(writer.shutdown().await?),
            None => Ok(()),
        }
    }
}

/// Accept the single visualizer connection.
///
/// Blocks until a consumer connects. Later connection attempts are never
/// accepted; they sit in the listen backlog until the listener is dropped.
///
/// # Errors
///
/// Returns an I/O error if `accept` fails.
pub async fn accept_consumer(
    listener: &TcpListener,
) -> std::io::Result<(StreamSink<TcpStream>, SocketAddr)> {
    let (stream, peer) = listener.accept().await?;
    if let Err(e) = stream.set_nodelay(true) {
        debug!(error = %e, "failed to set TCP_NODELAY on consumer socket");
    }
    info!(%peer, "visualizer connected");
    Ok((StreamSink::new(stream), peer))
}

/// Serialize a frame into its downstream wire form.
pub fn encode_frame(frame: &SensorFrame) -> String {
    format!("{frame}\n")
}

/// Writes frames to an [`EventSink`], tracking consecutive failures.
pub struct EventForwarder<S> {
    sink: S,
    failures: u64,
}

impl<S: EventSink> EventForwarder<S> {
    /// Create a forwarder over the given sink.
    pub fn new(sink: S) -> Self {
        Self { sink, failures: 0 }
    }

    /// Forward one frame.
    ///
    /// The first failure after a success is logged at `warn`; repeats while
    /// the peer stays gone drop to `debug` so a vanished visualizer does not
    /// flood the log.
    ///
    /// # Errors
    ///
    /// Returns the sink's [`ForwardError`]. Callers are expected to log and
    /// carry on.
    pub async fn forward(&mut self, frame: &SensorFrame) -> Result<(), ForwardError> {
        let line = encode_frame(frame);
        match self.sink.send_line(&line).await {
            Ok(()) => {
                if self.failures > 0 {
                    info!(failed_writes = self.failures, "downstream writes recovered");
                }
                self.failures = 0;
                Ok(())
            }
            Err(e) => {
                if self.failures == 0 {
                    warn!(error = %e, "failed to forward frame to visualizer");
                } else {
                    debug!(error = %e, failed_writes = self.failures, "forward still failing");
                }
                self.failures = self.failures.saturating_add(1);
                Err(e)
            }
        }
    }

    /// Number of consecutive failed writes.
    pub fn consecutive_failures(&self) -> u64 {
        self.failures
    }

    /// Borrow the underlying sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Release the underlying sink.
    ///
    /// # Errors
    ///
    /// Returns the sink's release error.
    pub async fn release(&mut self) -> Result<(), ForwardError> {
        self.sink.release().await
    }
}
