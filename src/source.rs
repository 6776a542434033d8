//! Upstream line sources.
//!
//! The serial device is read on a dedicated OS thread with a short read
//! timeout; complete lines are handed to the async side through a bounded
//! channel. When the channel is full the reader blocks instead of dropping
//! lines, so nothing read before the visualizer connects is lost.

use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use async_trait::async_trait;
use serialport::{DataBits, FlowControl, Parity, StopBits};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::SerialConfig;

/// Lines buffered between the reader thread and the ingest loop.
pub const LINE_CHANNEL_CAPACITY: usize = 256;

/// Errors from opening or releasing an upstream source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The serial device could not be opened.
    #[error("failed to open serial port {port}: {source}")]
    Open {
        /// Device path.
        port: String,
        /// Driver error.
        source: serialport::Error,
    },

    /// The reader thread could not be started.
    #[error("failed to spawn serial reader: {0}")]
    Spawn(std::io::Error),

    /// The reader thread panicked.
    #[error("serial reader thread panicked")]
    ReaderPanicked,
}

/// Async supplier of raw text lines.
#[async_trait]
pub trait LineSource: Send {
    /// Next raw line as read, possibly still carrying its line terminator.
    ///
    /// `None` means the source has ended and will produce nothing further.
    async fn next_line(&mut self) -> Option<String>;

    /// Stop reading and free the underlying device.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if teardown did not complete cleanly.
    async fn release(&mut self) -> Result<(), SourceError>;
}

/// A plain channel is a source; handy for replaying captured sweeps.
#[async_trait]
impl LineSource for mpsc::Receiver<String> {
    async fn next_line(&mut self) -> Option<String> {
        self.recv().await
    }

    async fn release(&mut self) -> Result<(), SourceError> {
        self.close();
        Ok(())
    }
}

/// Serial-port backed [`LineSource`].
pub struct SerialSource {
    lines: mpsc::Receiver<String>,
    shutdown: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl SerialSource {
    /// Open the device and start the reader thread.
    ///
    /// The thread waits `settle_ms` before the first read: boards like the
    /// Arduino Uno reset when the port opens and print garbage meanwhile.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Open`] if the device cannot be opened, or
    /// [`SourceError::Spawn`] if the thread cannot be started.
    pub fn open(config: &SerialConfig) -> Result<Self, SourceError> {
        let port = serialport::new(&config.port, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(config.read_timeout_ms))
            .open()
            .map_err(|source| SourceError::Open {
                port: config.port.clone(),
                source,
            })?;

        info!(port = %config.port, baud_rate = config.baud_rate, "serial port opened");

        let settle = Duration::from_millis(config.settle_ms);
        let backoff = Duration::from_millis(config.read_timeout_ms);
        Self::spawn(port, settle, backoff)
    }

    /// Start a reader thread over any blocking byte stream.
    ///
    /// After a failed read the thread sleeps `error_backoff` and reads again.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Spawn`] if the thread cannot be started.
    pub fn spawn<R>(
        reader: R,
        settle: Duration,
        error_backoff: Duration,
    ) -> Result<Self, SourceError>
    where
        R: Read + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);

        let handle = thread::Builder::new()
            .name("serial-reader".to_owned())
            .spawn(move || {
                if !settle.is_zero() {
                    thread::sleep(settle);
                }
                read_lines(reader, &tx, &flag, error_backoff);
            })
            .map_err(SourceError::Spawn)?;

        Ok(Self {
            lines: rx,
            shutdown,
            reader: Some(handle),
        })
    }
}

#[async_trait]
impl LineSource for SerialSource {
    async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    /// Joins the reader thread off the async workers. The wait is bounded
    /// by the settle delay or one read timeout.
    async fn release(&mut self) -> Result<(), SourceError> {
        self.shutdown.store(true, Ordering::Relaxed);
        self.lines.close();
        let Some(handle) = self.reader.take() else {
            return Ok(());
        };
        match tokio::task::spawn_blocking(move || handle.join()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) | Err(_) => Err(SourceError::ReaderPanicked),
        }
    }
}

impl Drop for SerialSource {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

/// Reader thread body: split the byte stream on `\n` and forward each line.
///
/// Read timeouts are the normal idle case and just re-check the shutdown
/// flag; a partial line survives a timeout because `read_until` keeps what
/// it already consumed. Other read errors are logged and retried after
/// `error_backoff`. Returns on EOF, shutdown, or when the receiving side is
/// gone.
fn read_lines<R: Read>(
    reader: R,
    tx: &mpsc::Sender<String>,
    shutdown: &AtomicBool,
    error_backoff: Duration,
) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut read_errors: u64 = 0;

    while !shutdown.load(Ordering::Relaxed) {
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => {
                if !buf.is_empty() {
                    send_line(tx, &mut buf);
                }
                info!("serial stream ended");
                return;
            }
            Ok(_) => {
                if read_errors > 0 {
                    info!(failed_reads = read_errors, "serial reads recovered");
                    read_errors = 0;
                }
                if buf.last() != Some(&b'\n') {
                    // EOF mid-line; flush what we have and let the next read report EOF.
                    debug!("partial line at end of stream");
                }
                if !send_line(tx, &mut buf) {
                    debug!("line receiver dropped, stopping serial reader");
                    return;
                }
            }
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => {
                if read_errors == 0 {
                    warn!(error = %e, "serial read failed, retrying");
                } else {
                    debug!(error = %e, failed_reads = read_errors, "serial read still failing");
                }
                read_errors = read_errors.saturating_add(1);
                thread::sleep(error_backoff);
            }
        }
    }
    debug!("serial reader shut down");
}

/// Hand the buffered bytes over as one line. `false` once the receiver is gone.
fn send_line(tx: &mpsc::Sender<String>, buf: &mut Vec<u8>) -> bool {
    let line = String::from_utf8_lossy(buf).into_owned();
    buf.clear();
    tx.blocking_send(line).is_ok()
}
