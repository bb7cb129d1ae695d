//! Runtime configuration types for the acquisition controller.
//!
//! These are the structs consumed by `Controller` and its components.
//! They are separate from the TOML-deserialized config in `indent_config`.

/// Sign applied to a device-reported or host-requested displacement.
///
/// Rigs have been wired both ways, so neither direction is assumed correct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignConvention {
    #[default]
    AsReported,
    Inverted,
}

impl SignConvention {
    pub fn from_inverted(inverted: bool) -> Self {
        if inverted {
            SignConvention::Inverted
        } else {
            SignConvention::AsReported
        }
    }

    #[inline]
    pub fn apply(self, value: f64) -> f64 {
        match self {
            SignConvention::AsReported => value,
            SignConvention::Inverted => -value,
        }
    }

    pub fn is_inverted(self) -> bool {
        self == SignConvention::Inverted
    }
}

/// Sign conventions for one move: what is sent, and how telemetry is read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SignConfig {
    /// Applied to displacement values parsed from telemetry.
    pub displacement: SignConvention,
    /// Applied to the distance encoded into a move command.
    pub motion: SignConvention,
}

/// Which completion signals end a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopDetection {
    /// Completion marker or debounce heuristic, whichever comes first.
    #[default]
    Both,
    /// Completion marker only.
    Marker,
    /// Debounce heuristic only; markers are ignored.
    Debounce,
}

impl StopDetection {
    pub fn uses_markers(self) -> bool {
        matches!(self, StopDetection::Both | StopDetection::Marker)
    }

    pub fn uses_debounce(self) -> bool {
        matches!(self, StopDetection::Both | StopDetection::Debounce)
    }
}

/// Wire-level vocabulary of the rig firmware.
#[derive(Debug, Clone)]
pub struct ProtocolCfg {
    /// Substrings that end a segment immediately.
    pub end_markers: Vec<String>,
    /// Substrings that start the post-stop grace period.
    pub stop_markers: Vec<String>,
    pub force_marker: String,
    pub displacement_marker: String,
}

impl Default for ProtocolCfg {
    fn default() -> Self {
        Self {
            end_markers: vec!["END".into()],
            stop_markers: vec!["Motor Stopped".into()],
            force_marker: "Force:".into(),
            displacement_marker: "Displacement:".into(),
        }
    }
}

/// Completion detection configuration (per segment).
#[derive(Debug, Clone)]
pub struct CompletionCfg {
    pub mode: StopDetection,
    /// Readings closer than this (mm) count as unchanged. Default: 0.01 mm.
    pub epsilon_mm: f64,
    /// Consecutive unchanged readings that end a segment.
    pub debounce_threshold: u32,
    /// Drain window after a stop marker (ms).
    pub grace_ms: u64,
    /// Hard cap on a segment, measured from the move command (ms).
    pub watchdog_ms: u64,
    /// Additional watchdog budget per millimetre of requested travel (ms).
    pub watchdog_per_mm_ms: u64,
}

impl Default for CompletionCfg {
    fn default() -> Self {
        Self {
            mode: StopDetection::Both,
            epsilon_mm: 0.01,
            debounce_threshold: 20,
            grace_ms: 2000,
            watchdog_ms: 60_000,
            watchdog_per_mm_ms: 0,
        }
    }
}

/// Session sequencing and queueing.
#[derive(Debug, Clone)]
pub struct SessionCfg {
    /// Pause before the move command (ms).
    pub pre_move_delay_ms: u64,
    /// Delay between the move command and the mid-flight tare (ms).
    pub tare_delay_ms: u64,
    /// Foreground wake-up interval while waiting on the reader (ms).
    pub poll_ms: u64,
    /// Bounded reader queue capacity.
    pub queue_capacity: usize,
}

impl Default for SessionCfg {
    fn default() -> Self {
        Self {
            pre_move_delay_ms: 3000,
            tare_delay_ms: 500,
            poll_ms: 20,
            queue_capacity: 256,
        }
    }
}
