//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();
/// Completion knobs of the current run (for JSON error details).
pub static LAST_LIMITS: OnceLock<CliLimits> = OnceLock::new();

#[derive(Copy, Clone, Debug)]
pub struct CliLimits {
    pub watchdog_ms: u64,
    pub watchdog_per_mm_ms: u64,
    pub grace_ms: u64,
}

#[derive(Parser, Debug)]
#[command(name = "indenter", version, about = "Indentation rig acquisition CLI")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/indenter.toml")]
    pub config: PathBuf,

    /// Drive the built-in simulated rig instead of the serial port
    #[arg(long, action = ArgAction::SetTrue)]
    pub sim: bool,

    /// Log and report as JSON lines instead of pretty text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); overrides [logging].level
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Zero the load cell
    Tare,
    /// Send the calibration factor to the controller
    Calibrate {
        /// Factor to send (defaults to device.calibration_factor)
        #[arg(long)]
        factor: Option<i64>,
    },
    /// Move once and record the resulting force/displacement segment
    Move {
        /// Relative distance in millimetres (negative retracts)
        #[arg(long, allow_negative_numbers = true)]
        mm: f64,
        /// Append the trace to this CSV (overrides [output].csv)
        #[arg(long, value_name = "FILE")]
        csv: Option<PathBuf>,
    },
    /// Run a sequence of relative moves, one segment each
    Run {
        /// Relative distances in millimetres, in order
        #[arg(long, num_args = 1.., required = true, allow_negative_numbers = true)]
        moves: Vec<f64>,
        /// Append the trace to this CSV (overrides [output].csv)
        #[arg(long, value_name = "FILE")]
        csv: Option<PathBuf>,
        /// Disable the live text view
        #[arg(long, action = ArgAction::SetTrue)]
        no_display: bool,
    },
    /// Halt the motor
    Stop,
    /// Quick health check (link opens, commands are accepted)
    SelfCheck,
}
