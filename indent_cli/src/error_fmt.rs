//! Human-readable error descriptions and structured JSON error formatting.

use crate::cli::LAST_LIMITS;
use indent_core::error::{BuildError, IndentError};

/// Stable name for the error kind, shared by the JSON output and logs.
pub fn error_kind_name(e: &IndentError) -> &'static str {
    match e {
        IndentError::Connection(_) => "Connection",
        IndentError::Write(_) => "Write",
        IndentError::Read(_) => "Read",
        IndentError::ReadTimeout => "ReadTimeout",
        IndentError::SegmentAborted(_) => "SegmentAborted",
        IndentError::StabilizationTimeout { .. } => "StabilizationTimeout",
        IndentError::Cancelled => "Cancelled",
        IndentError::Config(_) => "Config",
        IndentError::Sink(_) => "Sink",
        IndentError::State(_) => "State",
    }
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingTransport => {
                "What happened: No device link was provided to the controller.\nLikely causes: The serial port or simulated rig failed to open.\nHow to fix: Check [serial].port, or pass --sim to use the simulated rig.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
        };
    }

    if let Some(ie) = err.downcast_ref::<IndentError>() {
        return match ie {
            IndentError::StabilizationTimeout { elapsed_ms, samples } => format!(
                "What happened: The move did not complete within {elapsed_ms} ms ({samples} samples collected).\nLikely causes: The controller never sent END or Motor Stopped, the displacement kept changing, or the watchdog is too short for the distance.\nHow to fix: Check the firmware output, or raise completion.watchdog_ms / completion.watchdog_per_mm_ms."
            ),
            IndentError::SegmentAborted(why) => format!(
                "What happened: The segment was aborted ({why}).\nLikely causes: The link failed mid-move or a sink could not be written.\nHow to fix: Nothing from the aborted move was recorded; fix the cause and repeat the move."
            ),
            IndentError::Connection(why) => format!(
                "What happened: The link to the rig failed ({why}).\nLikely causes: Cable unplugged, wrong port, or the port is held by another program.\nHow to fix: Check [serial].port and baud, reconnect, then rerun."
            ),
            IndentError::Cancelled => "What happened: The run was cancelled.\nLikely causes: Ctrl-C or another shutdown request.\nHow to fix: Segments sealed before the cancel are kept; rerun the remaining moves.".to_string(),
            IndentError::ReadTimeout => "What happened: The rig did not answer in time.\nLikely causes: Controller not powered or still resetting.\nHow to fix: Power-cycle the controller and consider raising serial.open_settle_ms.".to_string(),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("parse config") || lower.contains("read config") {
        return format!(
            "What happened: The config file could not be loaded.\nLikely causes: Wrong --config path or a TOML syntax error.\nHow to fix: Check the path and the TOML. Original: {msg}"
        );
    }

    if lower.contains("must be") || lower.contains("invalid configuration") {
        return format!(
            "What happened: Configuration is invalid.\nLikely causes: Out-of-range or missing values ({msg}).\nHow to fix: Edit the TOML config and try again."
        );
    }

    if lower.contains("trace csv must have headers") {
        return "Invalid headers in trace CSV. Expected 'Displacement (mm),Force (N)'.".to_string();
    }

    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes per failure kind; everything else is 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<IndentError>() {
        Some(IndentError::SegmentAborted(_)) => 3,
        Some(IndentError::StabilizationTimeout { .. }) => 4,
        Some(IndentError::Connection(_)) => 5,
        Some(IndentError::Cancelled) => 6,
        _ => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let msg = humanize(err);
    let Some(ie) = err.downcast_ref::<IndentError>() else {
        return json!({ "reason": "Error", "message": msg }).to_string();
    };
    let details = match ie {
        IndentError::StabilizationTimeout { elapsed_ms, samples } => Some(json!({
            "elapsed_ms": elapsed_ms,
            "samples": samples,
            "watchdog_ms": LAST_LIMITS.get().map(|l| l.watchdog_ms),
            "watchdog_per_mm_ms": LAST_LIMITS.get().map(|l| l.watchdog_per_mm_ms),
            "grace_ms": LAST_LIMITS.get().map(|l| l.grace_ms),
        })),
        _ => None,
    };
    let mut obj = json!({
        "reason": error_kind_name(ie),
        "message": msg,
        "exit_code": exit_code_for_error(err),
    });
    if let Some(d) = details {
        obj["details"] = d;
    }
    obj.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::WrapErr;
    use rstest::rstest;

    fn wrapped(e: IndentError) -> eyre::Report {
        Err::<(), _>(eyre::Report::new(e))
            .wrap_err("move 1 of 2 (0.5 mm) failed")
            .unwrap_err()
    }

    #[rstest]
    #[case(IndentError::SegmentAborted("read failed".into()), 3)]
    #[case(IndentError::StabilizationTimeout { elapsed_ms: 10, samples: 2 }, 4)]
    #[case(IndentError::Connection("gone".into()), 5)]
    #[case(IndentError::Cancelled, 6)]
    #[case(IndentError::Sink("disk full".into()), 1)]
    fn exit_codes_survive_context(#[case] e: IndentError, #[case] code: i32) {
        assert_eq!(exit_code_for_error(&wrapped(e)), code);
    }

    #[test]
    fn timeout_json_has_reason_and_details() {
        let err = wrapped(IndentError::StabilizationTimeout {
            elapsed_ms: 1500,
            samples: 7,
        });
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&err)).unwrap();
        assert_eq!(v["reason"], "StabilizationTimeout");
        assert_eq!(v["details"]["samples"], 7);
        assert_eq!(v["exit_code"], 4);
        assert!(v["message"].as_str().unwrap().contains("watchdog"));
    }

    #[test]
    fn untyped_errors_fall_back() {
        let err = eyre::eyre!("completion.epsilon_mm must be in (0.0, 10.0]");
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&err)).unwrap();
        assert_eq!(v["reason"], "Error");
        assert!(humanize(&err).starts_with("What happened: Configuration is invalid"));
        assert_eq!(exit_code_for_error(&err), 1);
    }
}
