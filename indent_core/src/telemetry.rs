//! Telemetry line parsing.
//!
//! Lines have the fixed shape `Force:<number>N, Displacement:<number>mm`.
//! Malformed lines yield a [`ParseFailure`] value; they never abort the stream.

use std::fmt;
use std::time::Instant;

use crate::config::{ProtocolCfg, SignConvention};

/// Separator between the force and displacement fields.
pub const FIELD_SEPARATOR: &str = ", ";

/// A text line received from the rig, stamped on receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    pub text: String,
    pub received_at: Instant,
}

impl RawLine {
    pub fn new(text: impl Into<String>, received_at: Instant) -> Self {
        Self {
            text: text.into(),
            received_at,
        }
    }
}

/// One force/displacement reading. Both values are finite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub force_n: f64,
    /// Device-relative displacement, sign convention already applied.
    pub displacement_raw_mm: f64,
    pub at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseFailureReason {
    MissingSeparator,
    UnexpectedFieldCount,
    MissingForceMarker,
    MissingDisplacementMarker,
    InvalidForce,
    InvalidDisplacement,
    NonFinite,
}

impl ParseFailureReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ParseFailureReason::MissingSeparator => "missing_separator",
            ParseFailureReason::UnexpectedFieldCount => "unexpected_field_count",
            ParseFailureReason::MissingForceMarker => "missing_force_marker",
            ParseFailureReason::MissingDisplacementMarker => "missing_displacement_marker",
            ParseFailureReason::InvalidForce => "invalid_force",
            ParseFailureReason::InvalidDisplacement => "invalid_displacement",
            ParseFailureReason::NonFinite => "non_finite",
        }
    }
}

impl fmt::Display for ParseFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rejected telemetry line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    pub reason: ParseFailureReason,
    pub original: String,
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:?}", self.reason, self.original)
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryParser {
    force_marker: String,
    displacement_marker: String,
}

impl Default for TelemetryParser {
    fn default() -> Self {
        Self::new(&ProtocolCfg::default())
    }
}

impl TelemetryParser {
    pub fn new(protocol: &ProtocolCfg) -> Self {
        Self {
            force_marker: protocol.force_marker.clone(),
            displacement_marker: protocol.displacement_marker.clone(),
        }
    }

    /// Parse one telemetry line; `sign` is applied to the displacement.
    pub fn parse(&self, line: &RawLine, sign: SignConvention) -> Result<Sample, ParseFailure> {
        let (force_n, displacement) =
            self.parse_fields(&line.text).map_err(|reason| ParseFailure {
                reason,
                original: line.text.clone(),
            })?;
        Ok(Sample {
            force_n,
            displacement_raw_mm: sign.apply(displacement),
            at: line.received_at,
        })
    }

    fn parse_fields(&self, text: &str) -> Result<(f64, f64), ParseFailureReason> {
        let mut fields = text.trim().split(FIELD_SEPARATOR);
        let (Some(force_field), Some(disp_field)) = (fields.next(), fields.next()) else {
            return Err(ParseFailureReason::MissingSeparator);
        };
        if fields.next().is_some() {
            return Err(ParseFailureReason::UnexpectedFieldCount);
        }

        let force = field_value(force_field, &self.force_marker, "N")
            .ok_or(ParseFailureReason::MissingForceMarker)?
            .parse::<f64>()
            .map_err(|_| ParseFailureReason::InvalidForce)?;
        let displacement = field_value(disp_field, &self.displacement_marker, "mm")
            .ok_or(ParseFailureReason::MissingDisplacementMarker)?
            .parse::<f64>()
            .map_err(|_| ParseFailureReason::InvalidDisplacement)?;

        if !force.is_finite() || !displacement.is_finite() {
            return Err(ParseFailureReason::NonFinite);
        }
        Ok((force, displacement))
    }
}

/// Strip `marker` and an optional unit suffix, tolerating whitespace around both.
fn field_value<'a>(field: &'a str, marker: &str, unit: &str) -> Option<&'a str> {
    let rest = field.trim().strip_prefix(marker)?.trim();
    Some(rest.strip_suffix(unit).unwrap_or(rest).trim())
}
