#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Acquisition and motion-completion core for the indentation rig (hardware-agnostic).
//!
//! All device I/O goes through `indent_traits::Transport` and
//! `indent_traits::LineReader`, so the same controller drives a serial port,
//! the simulated rig, or a scripted mock.
//!
//! ## Architecture
//!
//! - **Codec**: commands to wire strings, received lines to markers/telemetry (`codec`)
//! - **Parser**: `Force:<f>N, Displacement:<d>mm` to `Sample` or `ParseFailure` (`telemetry`)
//! - **Detector**: `Moving -> Stabilizing -> Done` with debounce, grace and watchdog (`detector`)
//! - **Accumulator**: device-relative segments onto one absolute axis (`accumulator`)
//! - **Reader**: background thread feeding a bounded channel (`reader`)
//! - **Controller**: the move-and-acquire cycle (`session`), built with `ControllerBuilder`
//! - **Sinks**: live display and append-only CSV log (`sink`)

pub mod accumulator;
pub mod builder;
pub mod codec;
pub mod config;
pub mod conversions;
pub mod detector;
pub mod error;
pub mod hw_error;
pub mod mocks;
pub mod reader;
pub mod runner;
pub mod session;
pub mod sink;
pub mod telemetry;
pub mod trace;
pub mod util;

pub use accumulator::{TracePoint, absolute, accumulate};
pub use builder::ControllerBuilder;
pub use codec::{Codec, Command, Decoded, MarkerKind};
pub use config::{
    CompletionCfg, ProtocolCfg, SessionCfg, SignConfig, SignConvention, StopDetection,
};
pub use detector::{CompletionDetector, DetectorState, StopReason};
pub use error::{BuildError, IndentError};
pub use runner::{PlanSummary, run_plan, watchdog_budget_ms};
pub use session::{Controller, ControllerState, SessionPhase};
pub use sink::{CsvLogSink, SampleSink, SinkFanout};
pub use telemetry::{ParseFailure, ParseFailureReason, RawLine, Sample, TelemetryParser};
pub use trace::{Segment, Trace};
