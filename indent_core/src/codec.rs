//! Wire encoding of rig commands and classification of received lines.
//!
//! The firmware speaks newline-terminated ASCII in both directions:
//! `t` tares, `cal <int>` sets the load-cell factor, a signed decimal starts a
//! relative move in millimetres, and `No` stops the motor and ends the session.

use crate::config::{ProtocolCfg, SignConvention};
use crate::error::IndentError;

/// Logical command sent to the rig.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Tare,
    SetCalibration(i64),
    MoveBy(f64),
    Stop,
}

impl Command {
    /// Encode to the wire string (without the trailing newline).
    ///
    /// `motion` is applied to `MoveBy` distances only. Moves always carry a
    /// decimal point so the firmware never sees an ambiguous integer token.
    pub fn encode(&self, motion: SignConvention) -> Result<String, IndentError> {
        match *self {
            Command::Tare => Ok("t".to_string()),
            Command::SetCalibration(f) => Ok(format!("cal {f}")),
            Command::MoveBy(d) => {
                if !d.is_finite() {
                    return Err(IndentError::Config(format!(
                        "move distance must be finite, got {d}"
                    )));
                }
                let d = motion.apply(d);
                // Avoid sending "-0.0" for a zero move under an inverted convention.
                let d = if d == 0.0 { 0.0 } else { d };
                let mut s = d.to_string();
                if !s.contains('.') {
                    s.push_str(".0");
                }
                Ok(s)
            }
            Command::Stop => Ok("No".to_string()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Tare => "tare",
            Command::SetCalibration(_) => "set_calibration",
            Command::MoveBy(_) => "move_by",
            Command::Stop => "stop",
        }
    }
}

/// Completion marker flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    /// Segment is over now.
    End,
    /// Motor has stopped; trailing telemetry may still arrive.
    Stopped,
}

/// Result of classifying one received line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded<'a> {
    Completion { kind: MarkerKind, token: &'a str },
    Telemetry,
    Unclassified,
}

/// Line classifier configured with the rig's marker vocabulary.
#[derive(Debug, Clone)]
pub struct Codec {
    protocol: ProtocolCfg,
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(ProtocolCfg::default())
    }
}

impl Codec {
    pub fn new(protocol: ProtocolCfg) -> Self {
        Self { protocol }
    }

    pub fn protocol(&self) -> &ProtocolCfg {
        &self.protocol
    }

    /// Classify `line`: completion markers win over telemetry, anything else
    /// is unclassified. End markers are checked before stop markers.
    pub fn classify<'a>(&'a self, line: &str) -> Decoded<'a> {
        if let Some(token) = find_token(&self.protocol.end_markers, line) {
            return Decoded::Completion {
                kind: MarkerKind::End,
                token,
            };
        }
        if let Some(token) = find_token(&self.protocol.stop_markers, line) {
            return Decoded::Completion {
                kind: MarkerKind::Stopped,
                token,
            };
        }
        if line.contains(self.protocol.force_marker.as_str())
            && line.contains(self.protocol.displacement_marker.as_str())
        {
            return Decoded::Telemetry;
        }
        Decoded::Unclassified
    }
}

fn find_token<'a>(tokens: &'a [String], line: &str) -> Option<&'a str> {
    tokens
        .iter()
        .find(|t| !t.is_empty() && line.contains(t.as_str()))
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Command::Tare, "t")]
    #[case(Command::SetCalibration(45000), "cal 45000")]
    #[case(Command::SetCalibration(-12), "cal -12")]
    #[case(Command::MoveBy(2.5), "2.5")]
    #[case(Command::MoveBy(-1.0), "-1.0")]
    #[case(Command::MoveBy(3.0), "3.0")]
    #[case(Command::MoveBy(0.0), "0.0")]
    #[case(Command::Stop, "No")]
    fn encodes_wire_strings(#[case] cmd: Command, #[case] wire: &str) {
        assert_eq!(cmd.encode(SignConvention::AsReported).unwrap(), wire);
    }

    #[test]
    fn inverted_motion_flips_moves_only() {
        let inv = SignConvention::Inverted;
        assert_eq!(Command::MoveBy(1.25).encode(inv).unwrap(), "-1.25");
        assert_eq!(Command::MoveBy(0.0).encode(inv).unwrap(), "0.0");
        assert_eq!(Command::SetCalibration(7).encode(inv).unwrap(), "cal 7");
    }

    #[test]
    fn non_finite_move_is_rejected() {
        let err = Command::MoveBy(f64::NAN)
            .encode(SignConvention::AsReported)
            .unwrap_err();
        assert!(matches!(err, IndentError::Config(_)));
    }

    #[rstest]
    #[case("END", Decoded::Completion { kind: MarkerKind::End, token: "END" })]
    #[case("Motor Stopped at 5.00", Decoded::Completion { kind: MarkerKind::Stopped, token: "Motor Stopped" })]
    #[case("Force:1.00N, Displacement:0.10mm", Decoded::Telemetry)]
    #[case("Force:1.00N", Decoded::Unclassified)]
    #[case("Load cell tared", Decoded::Unclassified)]
    fn classifies_lines(#[case] line: &str, #[case] expected: Decoded<'static>) {
        let codec = Codec::default();
        assert_eq!(codec.classify(line), expected);
    }

    #[test]
    fn marker_wins_over_telemetry() {
        let codec = Codec::default();
        assert_eq!(
            codec.classify("Force:1.00N, Displacement:0.10mm END"),
            Decoded::Completion {
                kind: MarkerKind::End,
                token: "END"
            }
        );
    }
}
