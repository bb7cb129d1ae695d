#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and trace CSV loading for the indentation rig.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - The trace CSV loader enforces the two-column header written by the
//!   acquisition log so fitting code always sees the same layout.
use serde::Deserialize;

/// Header of the displacement column in the tabular trace log.
pub const DISPLACEMENT_HEADER: &str = "Displacement (mm)";
/// Header of the force column in the tabular trace log.
pub const FORCE_HEADER: &str = "Force (N)";

/// One row of the tabular trace log.
///
/// Expected headers:
/// Displacement (mm),Force (N)
///
/// Example:
/// Displacement (mm),Force (N)
/// 0.00,0.00
/// 0.50,1.25
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct TraceRow {
    #[serde(rename = "Displacement (mm)")]
    pub displacement_mm: f64,
    #[serde(rename = "Force (N)")]
    pub force_n: f64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Serial {
    /// Device path or COM port name.
    pub port: String,
    pub baud: u32,
    /// Per-read timeout (ms); bounds how long the reader blocks.
    pub timeout_ms: u64,
    /// Wait after opening while the controller board resets (ms).
    pub open_settle_ms: u64,
}

impl Default for Serial {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud: 115_200,
            timeout_ms: 1000,
            open_settle_ms: 2000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Device {
    /// Load-cell calibration factor sent as `cal <factor>`.
    pub calibration_factor: i64,
    /// Send the calibration factor once after connecting.
    pub calibrate_on_start: bool,
}

impl Default for Device {
    fn default() -> Self {
        Self {
            calibration_factor: 45_000,
            calibrate_on_start: true,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Protocol {
    /// Tokens that end a segment immediately.
    pub end_markers: Vec<String>,
    /// Tokens that start the post-stop grace period.
    pub stop_markers: Vec<String>,
    pub force_marker: String,
    pub displacement_marker: String,
}

impl Default for Protocol {
    fn default() -> Self {
        Self {
            end_markers: vec!["END".into()],
            stop_markers: vec!["Motor Stopped".into()],
            force_marker: "Force:".into(),
            displacement_marker: "Displacement:".into(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Signs {
    /// Negate the displacement reported by the device.
    pub invert_displacement: bool,
    /// Negate the distance sent with each move command.
    pub invert_move: bool,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CompletionMode {
    /// Accept either a completion marker or the debounce heuristic.
    #[default]
    Both,
    /// Only a completion marker ends a segment (watchdog still applies).
    Marker,
    /// Only the debounce heuristic ends a segment.
    Debounce,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Completion {
    pub mode: CompletionMode,
    /// Displacement change below which two readings count as "unchanged".
    pub epsilon_mm: f64,
    /// Consecutive unchanged readings that end a segment.
    pub debounce_threshold: u32,
    /// Keep draining telemetry this long after a stop marker (ms).
    pub grace_ms: u64,
    /// Hard cap on a single segment (ms).
    pub watchdog_ms: u64,
    /// Extra watchdog budget per millimetre of requested travel (ms).
    pub watchdog_per_mm_ms: u64,
}

impl Default for Completion {
    fn default() -> Self {
        Self {
            mode: CompletionMode::Both,
            epsilon_mm: 0.01,
            debounce_threshold: 20,
            grace_ms: 2000,
            watchdog_ms: 60_000,
            watchdog_per_mm_ms: 0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Session {
    /// Pause before issuing the move (ms).
    pub pre_move_delay_ms: u64,
    /// Delay between the move command and the mid-flight tare (ms).
    pub tare_delay_ms: u64,
    /// Foreground wake-up interval while waiting for completion (ms).
    pub poll_ms: u64,
    /// Capacity of the reader -> controller queue.
    pub queue_capacity: usize,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            pre_move_delay_ms: 3000,
            tare_delay_ms: 500,
            poll_ms: 20,
            queue_capacity: 256,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Output {
    /// Appendable tabular log of the absolute trace.
    pub csv: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SimMarkerKind {
    End,
    #[default]
    Stopped,
    None,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Simulation {
    pub period_ms: u64,
    pub speed_mm_s: f64,
    pub stiffness_n_per_mm: f64,
    pub contact_mm: f64,
    pub marker: SimMarkerKind,
    /// Inject a malformed telemetry line every n lines (0 disables).
    pub noise_lines: u32,
}

impl Default for Simulation {
    fn default() -> Self {
        Self {
            period_ms: 10,
            speed_mm_s: 5.0,
            stiffness_n_per_mm: 2.0,
            contact_mm: 0.5,
            marker: SimMarkerKind::Stopped,
            noise_lines: 0,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub serial: Serial,
    #[serde(default)]
    pub device: Device,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default)]
    pub signs: Signs,
    #[serde(default)]
    pub completion: Completion,
    #[serde(default)]
    pub session: Session,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub logging: Logging,
    /// Parameters of the built-in simulated rig (`--sim`).
    #[serde(default)]
    pub simulation: Simulation,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read and validate a config file.
pub fn load_file(path: &std::path::Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {:?}: {}", path, e))?;
    let cfg = load_toml(&text).map_err(|e| eyre::eyre!("parse config {:?}: {}", path, e))?;
    cfg.validate()?;
    Ok(cfg)
}

pub fn load_trace_csv(path: &std::path::Path) -> eyre::Result<Vec<TraceRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open trace CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = [DISPLACEMENT_HEADER, FORCE_HEADER];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "trace CSV must have headers '{},{}', got: {}",
            DISPLACEMENT_HEADER,
            FORCE_HEADER,
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<TraceRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }
    Ok(rows)
}

fn check_markers(key: &str, markers: &[String]) -> eyre::Result<()> {
    if markers.iter().any(|m| m.trim().is_empty()) {
        eyre::bail!("{key} must not contain empty markers");
    }
    Ok(())
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Serial
        if self.serial.baud == 0 {
            eyre::bail!("serial.baud must be > 0");
        }
        if self.serial.timeout_ms == 0 {
            eyre::bail!("serial.timeout_ms must be >= 1");
        }
        if self.serial.open_settle_ms > 60_000 {
            eyre::bail!("serial.open_settle_ms is unreasonably large (>60s)");
        }

        // Protocol
        check_markers("protocol.end_markers", &self.protocol.end_markers)?;
        check_markers("protocol.stop_markers", &self.protocol.stop_markers)?;
        if self.protocol.force_marker.is_empty() || self.protocol.displacement_marker.is_empty() {
            eyre::bail!("protocol.force_marker and protocol.displacement_marker must be non-empty");
        }
        if self.protocol.force_marker == self.protocol.displacement_marker {
            eyre::bail!("protocol.force_marker must differ from protocol.displacement_marker");
        }

        // Completion
        if !(self.completion.epsilon_mm > 0.0 && self.completion.epsilon_mm <= 10.0) {
            eyre::bail!("completion.epsilon_mm must be in (0.0, 10.0]");
        }
        if self.completion.debounce_threshold == 0 {
            eyre::bail!("completion.debounce_threshold must be >= 1");
        }
        if self.completion.grace_ms > 60_000 {
            eyre::bail!("completion.grace_ms is unreasonably large (>60s)");
        }
        if self.completion.watchdog_ms == 0 {
            eyre::bail!("completion.watchdog_ms must be >= 1");
        }
        if self.completion.mode == CompletionMode::Marker
            && self.protocol.end_markers.is_empty()
            && self.protocol.stop_markers.is_empty()
        {
            eyre::bail!("completion.mode = \"marker\" requires at least one protocol marker");
        }

        // Session
        if self.session.poll_ms == 0 {
            eyre::bail!("session.poll_ms must be >= 1");
        }
        if self.session.queue_capacity == 0 {
            eyre::bail!("session.queue_capacity must be >= 1");
        }
        if self.session.pre_move_delay_ms > 60_000 || self.session.tare_delay_ms > 60_000 {
            eyre::bail!("session delays are unreasonably large (>60s)");
        }

        // Simulation
        if self.simulation.period_ms == 0 {
            eyre::bail!("simulation.period_ms must be >= 1");
        }
        if !(self.simulation.speed_mm_s > 0.0) {
            eyre::bail!("simulation.speed_mm_s must be > 0");
        }

        Ok(())
    }
}
