//! The ingest loop: read line → decode → forward → gate → notify.
//!
//! One task, one line at a time. A bad line or a failed write/send is
//! counted and logged and never ends the loop; only the shutdown future
//! does. If the upstream source ends first, the loop idles until shutdown.

use std::future::Future;

use chrono::{DateTime, Utc};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::alert::AlertGate;
use crate::decoder::{decode_line, DecodeError, LineEvent, SensorFrame};
use crate::forwarder::{EventForwarder, EventSink};
use crate::notify::{DeliveryReport, Notifier};
use crate::source::LineSource;

/// Lifecycle of an [`IngestLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Constructed; not yet reading.
    Starting,
    /// Reading and processing lines.
    Running,
    /// Releasing resources.
    Draining,
    /// Everything released.
    Stopped,
}

/// Per-run counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Raw lines received from the source.
    pub lines_read: u64,
    /// Lines decoded as frames.
    pub frames: u64,
    /// Blank lines.
    pub empty_lines: u64,
    /// `DANGER!` banners.
    pub danger_lines: u64,
    /// Lines that failed to decode.
    pub decode_failures: u64,
    /// Frames that could not be written downstream.
    pub forward_failures: u64,
    /// Alerts let through the gate and handed to the notifier.
    pub alerts_dispatched: u64,
}

/// Final result of [`IngestLoop::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    /// Counters at stop time.
    pub stats: IngestStats,
    /// Whether the upstream source ended before shutdown was requested.
    pub source_ended: bool,
}

/// What happened to a single line.
#[derive(Debug)]
pub enum LineOutcome {
    /// Blank line.
    Empty,
    /// `DANGER!` banner, logged.
    Danger,
    /// The line did not decode.
    DecodeFailed(DecodeError),
    /// A frame was decoded and pushed through the pipeline.
    Frame {
        /// The decoded frame.
        frame: SensorFrame,
        /// Whether the downstream write succeeded.
        forwarded: bool,
        /// Fan-out result if the gate dispatched an alert.
        delivery: Option<DeliveryReport>,
    },
}

/// Orchestrates the pipeline and owns every long-lived resource.
pub struct IngestLoop<S, K> {
    source: S,
    forwarder: EventForwarder<K>,
    gate: AlertGate,
    notifier: Notifier,
    listener: Option<TcpListener>,
    state: LoopState,
    stats: IngestStats,
}

impl<S, K> IngestLoop<S, K>
where
    S: LineSource,
    K: EventSink,
{
    /// Assemble a loop in [`LoopState::Starting`].
    pub fn new(source: S, sink: K, gate: AlertGate, notifier: Notifier) -> Self {
        Self {
            source,
            forwarder: EventForwarder::new(sink),
            gate,
            notifier,
            listener: None,
            state: LoopState::Starting,
            stats: IngestStats::default(),
        }
    }

    /// Hold the listening socket so it is closed during drain.
    pub fn with_listener(mut self, listener: TcpListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Counters so far.
    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    /// The alert gate, for inspecting cooldown state.
    pub fn gate(&self) -> &AlertGate {
        &self.gate
    }

    /// Push one raw line through decode, forward and alerting.
    pub async fn process_line(&mut self, raw: &str, now: DateTime<Utc>) -> LineOutcome {
        bump(&mut self.stats.lines_read);

        let frame = match decode_line(raw) {
            Ok(LineEvent::Frame(frame)) => frame,
            Ok(LineEvent::Empty) => {
                bump(&mut self.stats.empty_lines);
                return LineOutcome::Empty;
            }
            Ok(LineEvent::DangerText(text)) => {
                bump(&mut self.stats.danger_lines);
                warn!(line = %text, "device reported DANGER");
                return LineOutcome::Danger;
            }
            Err(e) => {
                bump(&mut self.stats.decode_failures);
                warn!(error = %e, line = %raw.trim(), "failed to decode line");
                return LineOutcome::DecodeFailed(e);
            }
        };
        bump(&mut self.stats.frames);

        let forwarded = match self.forwarder.forward(&frame).await {
            Ok(()) => true,
            Err(_) => {
                bump(&mut self.stats.forward_failures);
                false
            }
        };
        debug!(%frame, forwarded, "frame processed");

        let delivery = match self.gate.evaluate(&frame, now) {
            Some(alert) => {
                bump(&mut self.stats.alerts_dispatched);
                info!(
                    angle = frame.angle,
                    distance = frame.distance,
                    x = alert.coordinate.x,
                    y = alert.coordinate.y,
                    "obstruction alert raised"
                );
                Some(self.notifier.notify(&alert.message).await)
            }
            None => None,
        };

        LineOutcome::Frame {
            frame,
            forwarded,
            delivery,
        }
    }

    /// Run until `shutdown` completes, then release everything.
    ///
    /// Shutdown is checked before each read, so once it fires no new line
    /// is taken; a line already being processed finishes first. A source
    /// that ends is no longer polled; the loop then waits for shutdown.
    pub async fn run<F>(mut self, shutdown: F) -> IngestReport
    where
        F: Future<Output = ()>,
    {
        self.state = LoopState::Running;
        info!("ingest loop running");

        tokio::pin!(shutdown);
        let mut source_ended = false;
        loop {
            tokio::select! {
                biased;
                () = &mut shutdown => break,
                line = self.source.next_line(), if !source_ended => match line {
                    Some(raw) => {
                        self.process_line(&raw, Utc::now()).await;
                    }
                    None => {
                        warn!("upstream source ended, waiting for shutdown");
                        source_ended = true;
                    }
                },
            }
        }
        info!("shutdown requested, draining");

        self.state = LoopState::Draining;
        self.release_all().await;
        self.state = LoopState::Stopped;

        info!(
            lines = self.stats.lines_read,
            frames = self.stats.frames,
            decode_failures = self.stats.decode_failures,
            forward_failures = self.stats.forward_failures,
            alerts = self.stats.alerts_dispatched,
            source_ended,
            "ingest loop stopped"
        );

        IngestReport {
            stats: self.stats,
            source_ended,
        }
    }

    /// Release sink, source and listener; each step runs even if an earlier
    /// one failed.
    async fn release_all(&mut self) {
        if let Err(e) = self.forwarder.release().await {
            warn!(error = %e, "failed to close visualizer connection");
        }
        if let Err(e) = self.source.release().await {
            warn!(error = %e, "failed to release upstream source");
        }
        if let Some(listener) = self.listener.take() {
            drop(listener);
            debug!("listening socket closed");
        }
    }
}

fn bump(counter: &mut u64) {
    *counter = counter.saturating_add(1);
}
