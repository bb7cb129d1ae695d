//! Acquisition front-end: config mapping, link assembly, and move execution.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use eyre::{Result, WrapErr};
use indent_config::{Config, SimMarkerKind};
use indent_core::{Controller, CsvLogSink, PlanSummary, SignConfig, run_plan};
use indent_hardware::{SimConfig, SimMarker, SimulatedRig};
use indent_traits::Transport;

use crate::cli::{CliLimits, LAST_LIMITS};

/// What a command needs from the controller beyond the config file.
#[derive(Debug, Default)]
pub struct LinkOptions {
    pub sim: bool,
    /// Send `device.calibration_factor` after connecting, if the config asks for it.
    pub calibrate: bool,
    pub csv: Option<PathBuf>,
    pub display: bool,
}

pub fn sim_config(sim: &indent_config::Simulation) -> SimConfig {
    SimConfig {
        period: Duration::from_millis(sim.period_ms),
        speed_mm_s: sim.speed_mm_s,
        stiffness_n_per_mm: sim.stiffness_n_per_mm,
        contact_mm: sim.contact_mm,
        marker: match sim.marker {
            SimMarkerKind::End => SimMarker::End,
            SimMarkerKind::Stopped => SimMarker::Stopped,
            SimMarkerKind::None => SimMarker::None,
        },
        noise_every: sim.noise_lines,
    }
}

/// Open the device link; the simulated rig needs no settle time.
fn open_transport(cfg: &Config, sim: bool) -> Result<(Box<dyn Transport + Send>, Duration)> {
    if sim {
        tracing::info!(marker = ?cfg.simulation.marker, "using simulated rig");
        return Ok((
            Box::new(SimulatedRig::new(sim_config(&cfg.simulation))),
            Duration::ZERO,
        ));
    }
    #[cfg(feature = "hardware")]
    {
        if cfg.serial.port.trim().is_empty() {
            eyre::bail!("invalid configuration: serial.port is missing (or pass --sim)");
        }
        let link = indent_hardware::SerialTransport::open(
            &cfg.serial.port,
            cfg.serial.baud,
            Duration::from_millis(cfg.serial.timeout_ms),
        )
        .map_err(|e| eyre::Report::new(indent_core::IndentError::Connection(e.to_string())))
        .wrap_err_with(|| format!("open serial port {}", cfg.serial.port))?;
        return Ok((
            Box::new(link),
            Duration::from_millis(cfg.serial.open_settle_ms),
        ));
    }
    #[cfg(not(feature = "hardware"))]
    {
        eyre::bail!(
            "serial support is not compiled in; rebuild with --features hardware or pass --sim"
        )
    }
}

/// Map the config, assemble sinks and connect.
pub fn connect(cfg: &Config, opts: &LinkOptions, running: Arc<AtomicBool>) -> Result<Controller> {
    let _ = LAST_LIMITS.set(CliLimits {
        watchdog_ms: cfg.completion.watchdog_ms,
        watchdog_per_mm_ms: cfg.completion.watchdog_per_mm_ms,
        grace_ms: cfg.completion.grace_ms,
    });
    let (transport, settle) = open_transport(cfg, opts.sim)?;

    let mut builder = Controller::builder()
        .with_transport(transport)
        .with_protocol((&cfg.protocol).into())
        .with_completion((&cfg.completion).into())
        .with_session((&cfg.session).into())
        .with_signs((&cfg.signs).into())
        .with_running_flag(running)
        .with_open_settle(settle)
        .with_calibration(
            (opts.calibrate && cfg.device.calibrate_on_start)
                .then_some(cfg.device.calibration_factor),
        );

    if let Some(path) = csv_target(cfg, opts) {
        let sink = open_csv(&path)?;
        tracing::info!(path = %path.display(), "appending trace to CSV");
        builder = builder.with_durable_sink(sink);
    }
    if opts.display {
        builder = builder.with_live_sink(indent_ui::LiveDisplay::stdout());
    }
    builder.try_build().wrap_err("connect to rig")
}

/// `--csv` wins over `[output].csv`.
pub fn csv_target(cfg: &Config, opts: &LinkOptions) -> Option<PathBuf> {
    opts.csv
        .clone()
        .or_else(|| cfg.output.csv.as_ref().map(PathBuf::from))
}

fn open_csv(path: &Path) -> Result<CsvLogSink> {
    CsvLogSink::open(path)
        .map_err(eyre::Report::new)
        .wrap_err_with(|| format!("open CSV log {}", path.display()))
}

/// Run the moves, then shut the link down whatever the outcome.
///
/// The controller is dropped before returning so the live view finishes its line.
pub fn run_moves(
    mut controller: Controller,
    moves: &[f64],
    signs: SignConfig,
) -> Result<PlanSummary> {
    let out = run_plan(&mut controller, moves, signs);
    let closed = controller.shutdown();
    drop(controller);
    let summary = out?;
    closed.wrap_err("shut down link")?;
    Ok(summary)
}

pub fn summary_json(summary: &PlanSummary, csv: Option<&Path>) -> serde_json::Value {
    use serde_json::json;
    let reasons: Vec<&str> = summary.stop_reasons.iter().map(|r| r.as_str()).collect();
    json!({
        "segments": summary.segments,
        "samples": summary.samples,
        "rejected_lines": summary.rejected_lines,
        "final_offset_mm": indent_core::util::round2(summary.final_offset_mm),
        "stop_reasons": reasons,
        "csv": csv.map(|p| p.display().to_string()),
    })
}

pub fn summary_text(summary: &PlanSummary) -> String {
    let reasons: Vec<&str> = summary.stop_reasons.iter().map(|r| r.as_str()).collect();
    format!(
        "acquisition complete: {} segment(s), {} samples, {} rejected line(s), final offset {} mm [{}]",
        summary.segments,
        summary.samples,
        summary.rejected_lines,
        indent_core::util::two_decimals(summary.final_offset_mm),
        reasons.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use indent_core::StopReason;

    fn fast_config() -> Config {
        let mut cfg = indent_config::load_toml(
            r#"
[session]
pre_move_delay_ms = 0
tare_delay_ms = 0
poll_ms = 2

[completion]
grace_ms = 0
watchdog_ms = 2000

[simulation]
period_ms = 1
speed_mm_s = 200.0
marker = "end"
"#,
        )
        .unwrap();
        cfg.device.calibrate_on_start = true;
        cfg
    }

    #[test]
    fn sim_config_maps_marker_and_noise() {
        let mut sim = indent_config::Simulation::default();
        sim.marker = SimMarkerKind::None;
        sim.noise_lines = 4;
        let mapped = sim_config(&sim);
        assert_eq!(mapped.marker, SimMarker::None);
        assert_eq!(mapped.noise_every, 4);
        assert_eq!(mapped.period, Duration::from_millis(10));
    }

    #[test]
    fn sim_run_reports_offset() {
        let cfg = fast_config();
        let opts = LinkOptions {
            sim: true,
            calibrate: true,
            ..LinkOptions::default()
        };
        let controller = connect(&cfg, &opts, Arc::new(AtomicBool::new(true))).unwrap();
        let signs = controller.signs();
        let summary = run_moves(controller, &[0.5, 0.25], signs).unwrap();
        assert_eq!(summary.segments, 2);
        assert_eq!(
            summary.stop_reasons,
            vec![StopReason::ExplicitEnd, StopReason::ExplicitEnd]
        );
        assert!((summary.final_offset_mm - 0.75).abs() < 1e-9);
        let text = summary_text(&summary);
        assert!(text.contains("final offset 0.75 mm"), "{text}");
        let json = summary_json(&summary, None);
        assert_eq!(json["segments"], 2);
        assert_eq!(json["stop_reasons"][0], "explicit_end");
    }

    #[cfg(not(feature = "hardware"))]
    #[test]
    fn serial_without_feature_is_reported() {
        let cfg = fast_config();
        let err = connect(&cfg, &LinkOptions::default(), Arc::new(AtomicBool::new(true)))
            .unwrap_err();
        assert!(err.to_string().contains("--sim"), "{err}");
    }
}
