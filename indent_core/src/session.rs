//! Session controller: one move-and-acquire cycle at a time.
//!
//! A cycle runs through named phases:
//! `PreMoveDelay -> FlushInput -> IssueMove -> MidFlightTare -> Acquire -> Seal`.
//! The tare after the move is a rig calibration step, not an accident of timing.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use eyre::Report;
use indent_traits::Transport;
use indent_traits::clock::Clock;

use crate::accumulator::{TracePoint, absolute, accumulate};
use crate::codec::{Codec, Command};
use crate::config::{CompletionCfg, SessionCfg, SignConfig};
use crate::detector::{CompletionDetector, DetectorState};
use crate::error::{IndentError, Result};
use crate::hw_error::{LinkOp, map_hw_error};
use crate::reader::{Reader, ReaderEvent};
use crate::runner::watchdog_budget_ms;
use crate::sink::SinkFanout;
use crate::telemetry::{Sample, TelemetryParser};
use crate::trace::{Segment, Trace};
use crate::util::as_ms;

/// Phase of the cycle in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    PreMoveDelay,
    FlushInput,
    IssueMove,
    MidFlightTare,
    Acquire,
    Seal,
}

/// State shared across the whole run: the link, the cumulative offset and
/// the running flag. Only the controller mutates the offset.
pub struct ControllerState {
    pub(crate) transport: Box<dyn Transport + Send>,
    pub(crate) offset_mm: f64,
    pub(crate) running: Arc<AtomicBool>,
}

impl core::fmt::Debug for ControllerState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ControllerState")
            .field("offset_mm", &self.offset_mm)
            .field("running", &self.running.load(Ordering::Relaxed))
            .finish()
    }
}

impl ControllerState {
    pub fn new(transport: Box<dyn Transport + Send>, running: Arc<AtomicBool>) -> Self {
        Self {
            transport,
            offset_mm: 0.0,
            running,
        }
    }
}

pub struct Controller {
    pub(crate) state: ControllerState,
    pub(crate) reader: Option<Reader>,
    pub(crate) codec: Codec,
    pub(crate) parser: TelemetryParser,
    pub(crate) completion: CompletionCfg,
    pub(crate) session: SessionCfg,
    pub(crate) signs: SignConfig,
    pub(crate) sinks: SinkFanout,
    pub(crate) trace: Trace,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    pub(crate) phase: Option<SessionPhase>,
    /// Set once the link has failed for good; every later call reports it.
    pub(crate) link_lost: Option<String>,
    pub(crate) closed: bool,
}

impl core::fmt::Debug for Controller {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Controller")
            .field("offset_mm", &self.state.offset_mm)
            .field("segments", &self.trace.segment_count())
            .field("points", &self.trace.len())
            .field("phase", &self.phase)
            .field("closed", &self.closed)
            .finish()
    }
}

impl Controller {
    /// Start building a controller.
    pub fn builder() -> crate::builder::ControllerBuilder {
        crate::builder::ControllerBuilder::default()
    }

    /// Absolute trace of every sealed segment so far.
    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    /// Current cumulative offset (absolute displacement of the last sealed sample).
    pub fn offset_mm(&self) -> f64 {
        self.state.offset_mm
    }

    /// Flag cleared to cancel the wait in progress and stop the reader.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.state.running.clone()
    }

    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::Acquire)
    }

    /// Phase of the cycle in progress, if any.
    pub fn phase(&self) -> Option<SessionPhase> {
        self.phase
    }

    /// Default sign conventions from configuration.
    pub fn signs(&self) -> SignConfig {
        self.signs
    }

    fn usable(&self) -> std::result::Result<(), IndentError> {
        if self.closed {
            return Err(IndentError::State("controller is shut down".into()));
        }
        if let Some(why) = &self.link_lost {
            return Err(IndentError::Connection(format!("link lost: {why}")));
        }
        Ok(())
    }

    fn write(&mut self, cmd: Command) -> std::result::Result<(), IndentError> {
        self.usable()?;
        let wire = cmd.encode(self.signs.motion)?;
        self.state
            .transport
            .send_line(&wire)
            .map_err(|e| map_hw_error(&*e, LinkOp::Write))?;
        tracing::debug!(command = cmd.name(), wire = %wire, "command sent");
        Ok(())
    }

    /// Send one command without waiting for any response.
    pub fn send(&mut self, cmd: Command) -> Result<()> {
        self.write(cmd).map_err(Report::new)
    }

    /// Zero the load cell.
    pub fn tare(&mut self) -> Result<()> {
        self.send(Command::Tare)
    }

    pub fn set_calibration(&mut self, factor: i64) -> Result<()> {
        self.send(Command::SetCalibration(factor))?;
        tracing::info!(factor, "calibration factor sent");
        Ok(())
    }

    /// Stop the motor (`No`); the link stays open.
    pub fn stop(&mut self) -> Result<()> {
        self.send(Command::Stop)
    }

    /// Start a relative move without acquiring a segment.
    pub fn move_by(&mut self, distance_mm: f64) -> Result<()> {
        self.send(Command::MoveBy(distance_mm))
    }

    /// Sleep in poll-sized slices so a cleared running flag cancels promptly.
    fn pause(&self, d: Duration) -> std::result::Result<(), IndentError> {
        let start = self.clock.now();
        let slice = Duration::from_millis(self.session.poll_ms.max(1));
        loop {
            if !self.is_running() {
                return Err(IndentError::Cancelled);
            }
            let elapsed = self.clock.now().saturating_duration_since(start);
            if elapsed >= d {
                return Ok(());
            }
            self.clock.sleep(slice.min(d - elapsed));
        }
    }

    /// Start the reader, or restart one that stopped because the running
    /// flag was cleared. A reader that died on a link failure is never
    /// replaced; the failure loses the link.
    fn ensure_reader(&mut self) -> std::result::Result<(), IndentError> {
        if let Some(r) = &self.reader {
            if r.is_alive() {
                return Ok(());
            }
            if let Some(cause) = r.take_failure() {
                return Err(self.lose_link(cause));
            }
            tracing::debug!("reader stopped after cancellation; restarting");
        }
        // Join the old thread before a new one takes the link.
        self.reader = None;
        let lines = self
            .state
            .transport
            .reader()
            .map_err(|e| map_hw_error(&*e, LinkOp::Open))?;
        self.reader = Some(Reader::spawn(
            lines,
            self.codec.clone(),
            self.parser.clone(),
            self.session.queue_capacity,
            self.state.running.clone(),
            self.clock.clone(),
        ));
        tracing::debug!("reader thread started");
        Ok(())
    }

    /// Move by `distance_mm` and collect telemetry until the segment completes.
    ///
    /// The sealed segment is appended to the trace and the offset advanced.
    /// On any failure the trace and offset are left exactly as they were.
    pub fn move_and_acquire(&mut self, distance_mm: f64, signs: SignConfig) -> Result<Segment> {
        let out = self.cycle(distance_mm, signs);
        self.phase = None;
        out.map_err(Report::new)
    }

    fn cycle(
        &mut self,
        distance_mm: f64,
        signs: SignConfig,
    ) -> std::result::Result<Segment, IndentError> {
        self.usable()?;
        if !self.is_running() {
            return Err(IndentError::Cancelled);
        }
        let wire = Command::MoveBy(distance_mm).encode(signs.motion)?;
        self.ensure_reader().map_err(aborted)?;

        self.phase = Some(SessionPhase::PreMoveDelay);
        self.pause(Duration::from_millis(self.session.pre_move_delay_ms))?;

        self.phase = Some(SessionPhase::FlushInput);
        self.state
            .transport
            .clear_input()
            .map_err(|e| aborted(map_hw_error(&*e, LinkOp::Read)))?;
        let drained = self.reader_ref()?.drain();
        let stale = drained.map_err(|e| self.lose_link(e))?;
        if stale > 0 {
            tracing::debug!(stale, "discarded queued input before move");
        }
        self.reader_ref()?.set_sign(signs.displacement);

        self.phase = Some(SessionPhase::IssueMove);
        self.state
            .transport
            .send_line(&wire)
            .map_err(|e| aborted(map_hw_error(&*e, LinkOp::Write)))?;
        let started = self.clock.now();
        let budget = Duration::from_millis(watchdog_budget_ms(&self.completion, distance_mm));
        tracing::info!(
            distance_mm,
            wire = %wire,
            watchdog_ms = as_ms(budget),
            "segment started"
        );

        self.phase = Some(SessionPhase::MidFlightTare);
        self.pause(Duration::from_millis(self.session.tare_delay_ms))?;
        self.write(Command::Tare).map_err(aborted)?;

        self.phase = Some(SessionPhase::Acquire);
        let offset = self.state.offset_mm;
        let mut detector = CompletionDetector::new(&self.completion, started, budget);
        let (samples, rejected) = self.acquire(&mut detector, offset)?;
        let stop_reason = detector
            .stop_reason()
            .ok_or_else(|| IndentError::State("acquisition ended before completion".into()))?;

        self.phase = Some(SessionPhase::Seal);
        let (points, next) = accumulate(offset, &samples);
        self.sinks.commit(&points)?;
        self.trace.push_segment(&points);
        self.state.offset_mm = next;

        let segment = Segment {
            requested_mm: distance_mm,
            stop_reason,
            points,
            offset_before_mm: offset,
            offset_after_mm: next,
            rejected_lines: rejected,
            duration: self.clock.now().saturating_duration_since(started),
        };
        tracing::info!(
            distance_mm,
            samples = segment.len(),
            rejected,
            reason = %stop_reason,
            offset_mm = next,
            "segment sealed"
        );
        Ok(segment)
    }

    fn reader_ref(&self) -> std::result::Result<&Reader, IndentError> {
        self.reader
            .as_ref()
            .ok_or_else(|| IndentError::State("reader not started".into()))
    }

    /// Drain reader events into the detector until it reports `Done`.
    fn acquire(
        &mut self,
        detector: &mut CompletionDetector,
        offset: f64,
    ) -> std::result::Result<(Vec<Sample>, usize), IndentError> {
        let poll = Duration::from_millis(self.session.poll_ms.max(1));
        let mut samples = Vec::new();
        let mut rejected = 0usize;
        loop {
            if !self.is_running() {
                tracing::warn!(samples = samples.len(), "acquisition cancelled");
                return Err(IndentError::Cancelled);
            }
            let now = self.clock.now();
            match detector.poll(now) {
                Ok(DetectorState::Done(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = %e, "segment watchdog expired");
                    return Err(e);
                }
            }
            let wait = detector
                .next_deadline(now)
                .clamp(Duration::from_millis(1), poll);
            let received = self.reader_ref()?.recv_timeout(wait);
            let event = received.map_err(|e| self.lose_link(e))?;
            match event {
                None => {}
                Some(ReaderEvent::Sample(s)) => {
                    if detector.on_sample(s.displacement_raw_mm, s.at) {
                        self.sinks.publish(&TracePoint {
                            displacement_mm: absolute(offset, s.displacement_raw_mm),
                            force_n: s.force_n,
                        });
                        samples.push(s);
                    }
                }
                Some(ReaderEvent::Marker { kind, at }) => {
                    detector.on_marker(kind, at);
                    tracing::debug!(?kind, state = ?detector.state(), "marker applied");
                }
                Some(ReaderEvent::Rejected(_)) => rejected += 1,
                Some(ReaderEvent::Failed(e)) => return Err(self.lose_link(e)),
            }
        }
        Ok((samples, rejected))
    }

    /// Tear down after an unrecoverable link failure; returns the abort error.
    fn lose_link(&mut self, cause: IndentError) -> IndentError {
        tracing::error!(error = %cause, "link failed; closing");
        self.link_lost = Some(cause.to_string());
        self.reader = None;
        if let Err(e) = self.state.transport.close() {
            tracing::warn!(error = %e, "close after link failure");
        }
        aborted(cause)
    }

    /// Send `No`, stop the reader and close the link. Idempotent.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        if self.link_lost.is_none()
            && let Err(e) = self.write(Command::Stop)
        {
            tracing::warn!(error = %e, "stop command failed during shutdown");
        }
        self.state.running.store(false, Ordering::Release);
        // Dropping the reader joins its thread.
        self.reader = None;
        self.closed = true;
        self.state
            .transport
            .close()
            .map_err(|e| Report::new(map_hw_error(&*e, LinkOp::Close)))?;
        tracing::info!(
            segments = self.trace.segment_count(),
            points = self.trace.len(),
            offset_mm = self.state.offset_mm,
            "controller shut down"
        );
        Ok(())
    }
}

fn aborted(e: IndentError) -> IndentError {
    match e {
        IndentError::SegmentAborted(_)
        | IndentError::Cancelled
        | IndentError::StabilizationTimeout { .. } => e,
        other => IndentError::SegmentAborted(other.to_string()),
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!(error = %e, "controller shutdown on drop failed");
        }
    }
}
