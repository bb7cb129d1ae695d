//! Per-segment completion detection.
//!
//! `Moving -> Stabilizing -> Done`. An end marker finishes the segment at
//! once; a stop marker opens a grace window that keeps draining trailing
//! telemetry; the debounce heuristic goes straight from `Moving` to `Done`.
//! A wall-clock watchdog bounds the `Moving` phase of every segment.

use std::time::{Duration, Instant};

use crate::codec::MarkerKind;
use crate::config::CompletionCfg;
use crate::error::IndentError;

/// Why a segment ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    ExplicitEnd,
    StabilityDebounce,
    PostStopTimeout,
}

impl StopReason {
    pub fn as_str(self) -> &'static str {
        match self {
            StopReason::ExplicitEnd => "explicit_end",
            StopReason::StabilityDebounce => "stability_debounce",
            StopReason::PostStopTimeout => "post_stop_timeout",
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    Moving,
    /// Stop marker seen at `since`; trailing samples accepted until grace expires.
    Stabilizing { since: Instant },
    Done(StopReason),
}

#[derive(Debug, Clone)]
pub struct CompletionDetector {
    cfg: CompletionCfg,
    started: Instant,
    watchdog: Duration,
    state: DetectorState,
    last_displacement: Option<f64>,
    stable_count: u32,
    accepted: usize,
}

impl CompletionDetector {
    /// Start detecting for a segment whose move was issued at `started`.
    pub fn new(cfg: &CompletionCfg, started: Instant, watchdog: Duration) -> Self {
        Self {
            cfg: cfg.clone(),
            started,
            watchdog,
            state: DetectorState::Moving,
            last_displacement: None,
            stable_count: 0,
            accepted: 0,
        }
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, DetectorState::Done(_))
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        match self.state {
            DetectorState::Done(r) => Some(r),
            _ => None,
        }
    }

    /// Samples accepted into the segment so far.
    pub fn accepted(&self) -> usize {
        self.accepted
    }

    fn grace(&self) -> Duration {
        Duration::from_millis(self.cfg.grace_ms)
    }

    /// Feed a completion marker received at `at`.
    pub fn on_marker(&mut self, kind: MarkerKind, at: Instant) {
        if !self.cfg.mode.uses_markers() {
            return;
        }
        match (self.state, kind) {
            (DetectorState::Done(_), _) => {}
            (_, MarkerKind::End) => self.state = DetectorState::Done(StopReason::ExplicitEnd),
            (DetectorState::Moving, MarkerKind::Stopped) => {
                self.state = if self.cfg.grace_ms == 0 {
                    DetectorState::Done(StopReason::PostStopTimeout)
                } else {
                    DetectorState::Stabilizing { since: at }
                };
            }
            // A repeated stop marker does not extend the grace window.
            (DetectorState::Stabilizing { .. }, MarkerKind::Stopped) => {}
        }
    }

    /// Feed a parsed displacement received at `at`.
    ///
    /// Returns `true` when the sample belongs to the segment. The sample that
    /// trips the debounce is included; samples after `Done` are not.
    pub fn on_sample(&mut self, displacement_mm: f64, at: Instant) -> bool {
        match self.state {
            DetectorState::Done(_) => false,
            DetectorState::Stabilizing { since } => {
                if at.saturating_duration_since(since) > self.grace() {
                    self.state = DetectorState::Done(StopReason::PostStopTimeout);
                    false
                } else {
                    self.accepted += 1;
                    true
                }
            }
            DetectorState::Moving => {
                self.accepted += 1;
                if self.cfg.mode.uses_debounce() {
                    self.debounce(displacement_mm);
                }
                true
            }
        }
    }

    fn debounce(&mut self, displacement_mm: f64) {
        match self.last_displacement {
            Some(prev) if (displacement_mm - prev).abs() < self.cfg.epsilon_mm => {
                self.stable_count += 1;
            }
            _ => self.stable_count = 0,
        }
        self.last_displacement = Some(displacement_mm);
        if self.stable_count >= self.cfg.debounce_threshold {
            self.state = DetectorState::Done(StopReason::StabilityDebounce);
        }
    }

    /// Advance time-driven transitions and enforce the watchdog.
    pub fn poll(&mut self, now: Instant) -> Result<DetectorState, IndentError> {
        if let DetectorState::Stabilizing { since } = self.state
            && now.saturating_duration_since(since) >= self.grace()
        {
            self.state = DetectorState::Done(StopReason::PostStopTimeout);
        }
        // The grace window is bounded on its own; the watchdog guards `Moving`.
        if self.state != DetectorState::Moving {
            return Ok(self.state);
        }
        let elapsed = now.saturating_duration_since(self.started);
        if elapsed >= self.watchdog {
            return Err(IndentError::StabilizationTimeout {
                elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                samples: self.accepted,
            });
        }
        Ok(self.state)
    }

    /// Time left before the next time-driven transition (grace or watchdog).
    pub fn next_deadline(&self, now: Instant) -> Duration {
        match self.state {
            DetectorState::Stabilizing { since } => {
                (since + self.grace()).saturating_duration_since(now)
            }
            DetectorState::Moving => (self.started + self.watchdog).saturating_duration_since(now),
            DetectorState::Done(_) => Duration::ZERO,
        }
    }
}
