//! `From` implementations bridging `indent_config` types to `indent_core` types.

use crate::config::{CompletionCfg, ProtocolCfg, SessionCfg, SignConfig, SignConvention, StopDetection};

// ── StopDetection ────────────────────────────────────────────────────────────

impl From<indent_config::CompletionMode> for StopDetection {
    fn from(m: indent_config::CompletionMode) -> Self {
        match m {
            indent_config::CompletionMode::Both => StopDetection::Both,
            indent_config::CompletionMode::Marker => StopDetection::Marker,
            indent_config::CompletionMode::Debounce => StopDetection::Debounce,
        }
    }
}

// ── CompletionCfg ────────────────────────────────────────────────────────────

impl From<&indent_config::Completion> for CompletionCfg {
    fn from(c: &indent_config::Completion) -> Self {
        Self {
            mode: c.mode.into(),
            epsilon_mm: c.epsilon_mm,
            debounce_threshold: c.debounce_threshold,
            grace_ms: c.grace_ms,
            watchdog_ms: c.watchdog_ms,
            watchdog_per_mm_ms: c.watchdog_per_mm_ms,
        }
    }
}

// ── ProtocolCfg ──────────────────────────────────────────────────────────────

impl From<&indent_config::Protocol> for ProtocolCfg {
    fn from(c: &indent_config::Protocol) -> Self {
        Self {
            end_markers: c.end_markers.clone(),
            stop_markers: c.stop_markers.clone(),
            force_marker: c.force_marker.clone(),
            displacement_marker: c.displacement_marker.clone(),
        }
    }
}

// ── SessionCfg ───────────────────────────────────────────────────────────────

impl From<&indent_config::Session> for SessionCfg {
    fn from(c: &indent_config::Session) -> Self {
        Self {
            pre_move_delay_ms: c.pre_move_delay_ms,
            tare_delay_ms: c.tare_delay_ms,
            poll_ms: c.poll_ms,
            queue_capacity: c.queue_capacity,
        }
    }
}

// ── SignConfig ───────────────────────────────────────────────────────────────

impl From<&indent_config::Signs> for SignConfig {
    fn from(c: &indent_config::Signs) -> Self {
        Self {
            displacement: SignConvention::from_inverted(c.invert_displacement),
            motion: SignConvention::from_inverted(c.invert_move),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_file_maps_onto_runtime_types() {
        let cfg = indent_config::load_toml(
            r#"
[signs]
invert_displacement = true

[completion]
mode = "marker"
debounce_threshold = 7
grace_ms = 150
"#,
        )
        .unwrap();
        let signs: SignConfig = (&cfg.signs).into();
        assert_eq!(signs.displacement, SignConvention::Inverted);
        assert_eq!(signs.motion, SignConvention::AsReported);
        let completion: CompletionCfg = (&cfg.completion).into();
        assert_eq!(completion.mode, StopDetection::Marker);
        assert_eq!(completion.debounce_threshold, 7);
        assert_eq!(completion.grace_ms, 150);
        let protocol: ProtocolCfg = (&cfg.protocol).into();
        assert_eq!(protocol.stop_markers, vec!["Motor Stopped".to_string()]);
    }
}
