//! Background line reader.
//!
//! Spawns a thread that owns the receiving half of the link, classifies and
//! parses every line, and pushes typed events through a bounded channel.
//! It is the only caller of `read_line`.
//!
//! Each `Reader` spawns exactly one thread, which exits within one read
//! timeout of the running flag being cleared and is joined on drop.
//!
//! Flushing is a handshake: `drain` requests a new generation and waits
//! until the thread has finished its current read and discarded the link's
//! framing buffer. Every line is tagged with the generation acknowledged
//! before its read began, so nothing read across a flush is delivered.
use crossbeam_channel as xch;
use indent_traits::LineReader;
use indent_traits::clock::Clock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::codec::{Codec, Decoded, MarkerKind};
use crate::config::SignConvention;
use crate::error::IndentError;
use crate::hw_error::{LinkOp, map_hw_error};
use crate::telemetry::{ParseFailure, RawLine, Sample, TelemetryParser};

/// How long a blocked send waits before re-checking the shutdown flags.
const SEND_RETRY: Duration = Duration::from_millis(50);
/// Upper bound on waiting for the thread to acknowledge a flush.
const FLUSH_ACK_LIMIT: Duration = Duration::from_secs(2);
const FLUSH_ACK_POLL: Duration = Duration::from_millis(1);

/// What the reader hands to the session controller.
#[derive(Debug, Clone, PartialEq)]
pub enum ReaderEvent {
    Sample(Sample),
    Marker { kind: MarkerKind, at: Instant },
    Rejected(ParseFailure),
    /// The link failed; the thread has exited.
    Failed(IndentError),
}

type FailureSlot = Arc<Mutex<Option<IndentError>>>;

pub struct Reader {
    /// Events tagged with the generation current when their read began.
    rx: xch::Receiver<(u64, ReaderEvent)>,
    /// Shared cooperative-shutdown flag (cleared by the controller or Ctrl-C).
    running: Arc<AtomicBool>,
    /// Private stop request used on drop.
    stop: Arc<AtomicBool>,
    invert: Arc<AtomicBool>,
    /// Generation requested by the last `drain`.
    generation: Arc<AtomicU64>,
    /// Generation the thread has switched to.
    acked: Arc<AtomicU64>,
    /// Link failure recorded by the thread before it exits. Kept outside the
    /// channel so a full queue can never swallow it.
    failure: FailureSlot,
    lines_seen: Arc<AtomicU64>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl core::fmt::Debug for Reader {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Reader")
            .field("queued", &self.rx.len())
            .field("lines_seen", &self.lines_seen())
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl Reader {
    pub fn spawn<C: Clock + Send + 'static>(
        mut lines: Box<dyn LineReader + Send>,
        codec: Codec,
        parser: TelemetryParser,
        capacity: usize,
        running: Arc<AtomicBool>,
        clock: C,
    ) -> Self {
        let (tx, rx) = xch::bounded(capacity.max(1));
        let stop = Arc::new(AtomicBool::new(false));
        let invert = Arc::new(AtomicBool::new(false));
        let generation = Arc::new(AtomicU64::new(0));
        let acked = Arc::new(AtomicU64::new(0));
        let failure: FailureSlot = Arc::new(Mutex::new(None));
        let lines_seen = Arc::new(AtomicU64::new(0));

        let keep_going = {
            let running = running.clone();
            let stop = stop.clone();
            move || running.load(Ordering::Acquire) && !stop.load(Ordering::Acquire)
        };
        let invert_t = invert.clone();
        let gen_t = generation.clone();
        let acked_t = acked.clone();
        let failure_t = failure.clone();
        let seen_t = lines_seen.clone();

        let join_handle = std::thread::spawn(move || {
            let mut tag = 0;
            while keep_going() {
                let requested = gen_t.load(Ordering::Acquire);
                if requested != tag {
                    lines.discard_buffered();
                    tag = requested;
                    acked_t.store(tag, Ordering::Release);
                }
                let text = match lines.read_line() {
                    Ok(Some(text)) => text,
                    Ok(None) => continue,
                    Err(e) => match map_hw_error(&*e, LinkOp::Read) {
                        IndentError::ReadTimeout => continue,
                        err => {
                            tracing::error!(error = %err, "link read failed; reader exiting");
                            *failure_t.lock().unwrap_or_else(PoisonError::into_inner) = Some(err);
                            break;
                        }
                    },
                };
                seen_t.fetch_add(1, Ordering::Relaxed);
                let raw = RawLine::new(text, clock.now());
                let event = match codec.classify(&raw.text) {
                    Decoded::Completion { kind, token } => {
                        tracing::debug!(token, ?kind, "completion marker");
                        ReaderEvent::Marker {
                            kind,
                            at: raw.received_at,
                        }
                    }
                    Decoded::Telemetry => {
                        let sign = SignConvention::from_inverted(invert_t.load(Ordering::Acquire));
                        match parser.parse(&raw, sign) {
                            Ok(sample) => ReaderEvent::Sample(sample),
                            Err(bad) => {
                                tracing::warn!(
                                    reason = %bad.reason,
                                    line = %bad.original,
                                    "malformed telemetry line"
                                );
                                ReaderEvent::Rejected(bad)
                            }
                        }
                    }
                    Decoded::Unclassified => {
                        tracing::debug!(line = %raw.text, "unclassified line");
                        continue;
                    }
                };

                // Block while the queue is full, but keep observing shutdown.
                let mut pending = (tag, event);
                loop {
                    match tx.send_timeout(pending, SEND_RETRY) {
                        Ok(()) => break,
                        Err(xch::SendTimeoutError::Timeout(ev)) => {
                            if !keep_going() {
                                break;
                            }
                            pending = ev;
                        }
                        Err(xch::SendTimeoutError::Disconnected(_)) => {
                            tracing::debug!("reader consumer disconnected, exiting thread");
                            return;
                        }
                    }
                }
            }
            tracing::trace!("reader thread exiting cleanly");
        });

        Self {
            rx,
            running,
            stop,
            invert,
            generation,
            acked,
            failure,
            lines_seen,
            join_handle: Some(join_handle),
        }
    }

    /// Sign convention for displacement values parsed from now on.
    pub fn set_sign(&self, sign: SignConvention) {
        self.invert.store(sign.is_inverted(), Ordering::Release);
    }

    /// Next current-generation event, waiting at most `timeout`.
    ///
    /// `Ok(None)` on timeout. Once the thread has exited and the queue is
    /// empty, a recorded link failure comes back as `Failed` exactly once;
    /// after that (or after a clean exit) every call is an error.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<ReaderEvent>, IndentError> {
        let deadline = Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(left) {
                Ok((tag, ev)) => {
                    if tag == self.generation.load(Ordering::Acquire) {
                        return Ok(Some(ev));
                    }
                    tracing::trace!(?ev, "dropping event from previous generation");
                }
                Err(xch::RecvTimeoutError::Timeout) => return Ok(None),
                Err(xch::RecvTimeoutError::Disconnected) => {
                    return match self.take_failure() {
                        Some(e) => Ok(Some(ReaderEvent::Failed(e))),
                        None => Err(IndentError::Read("reader thread stopped".into())),
                    };
                }
            }
        }
    }

    /// Start a new generation and wait for the thread to switch to it.
    ///
    /// Queued events, the line being read when the flush was requested and
    /// the link's framing buffer are all discarded. Returns how many queued
    /// events were dropped, or the link failure if the thread has died.
    pub fn drain(&self) -> Result<usize, IndentError> {
        let target = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let started = Instant::now();
        let mut dropped = self.rx.try_iter().count();
        // Emptying the queue also frees a thread blocked on a full channel.
        while self.acked.load(Ordering::Acquire) < target
            && self.is_alive()
            && self.running.load(Ordering::Acquire)
        {
            if started.elapsed() >= FLUSH_ACK_LIMIT {
                tracing::warn!(
                    waited_ms = started.elapsed().as_millis() as u64,
                    "reader did not acknowledge flush"
                );
                break;
            }
            std::thread::sleep(FLUSH_ACK_POLL);
            dropped += self.rx.try_iter().count();
        }
        dropped += self.rx.try_iter().count();
        match self.take_failure() {
            Some(e) => Err(e),
            None => Ok(dropped),
        }
    }

    /// The link failure, if the thread recorded one and nobody took it yet.
    pub fn take_failure(&self) -> Option<IndentError> {
        self.failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn lines_seen(&self) -> u64 {
        self.lines_seen.load(Ordering::Relaxed)
    }

    pub fn is_alive(&self) -> bool {
        self.join_handle
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Reader {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);

        // The thread exits between reads, or after the current read_line
        // returns (bounded by the link's read timeout).
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("reader thread joined"),
                Err(e) => tracing::warn!(?e, "reader thread panicked during shutdown"),
            }
        }
    }
}
