//! Append-only absolute trace and per-segment records.

use std::io::Write;
use std::ops::Range;
use std::time::Duration;

use crate::accumulator::TracePoint;
use crate::detector::StopReason;
use crate::util::two_decimals;

/// Column headers of the tabular log.
pub const CSV_HEADER: [&str; 2] = [indent_config::DISPLACEMENT_HEADER, indent_config::FORCE_HEADER];

/// One sealed move.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Distance requested by the caller, before any motion sign flip.
    pub requested_mm: f64,
    pub stop_reason: StopReason,
    /// Absolute points, in arrival order.
    pub points: Vec<TracePoint>,
    /// Offset before this segment was applied.
    pub offset_before_mm: f64,
    /// Offset after sealing (absolute displacement of the last point).
    pub offset_after_mm: f64,
    /// Telemetry lines rejected by the parser while this segment was open.
    pub rejected_lines: usize,
    /// Move command to seal.
    pub duration: Duration,
}

impl Segment {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Concatenation of every sealed segment of a run.
///
/// Only `push_segment` mutates it, so earlier points are never rewritten.
#[derive(Debug, Clone, Default)]
pub struct Trace {
    points: Vec<TracePoint>,
    spans: Vec<Range<usize>>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_segment(&mut self, points: &[TracePoint]) {
        let start = self.points.len();
        self.points.extend_from_slice(points);
        self.spans.push(start..self.points.len());
    }

    pub fn points(&self) -> &[TracePoint] {
        &self.points
    }

    pub fn segment_count(&self) -> usize {
        self.spans.len()
    }

    /// Points of the `idx`-th sealed segment.
    pub fn segment(&self, idx: usize) -> Option<&[TracePoint]> {
        self.spans.get(idx).map(|r| &self.points[r.clone()])
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Write the whole trace as a fresh tabular log (header included).
    pub fn write_csv<W: Write>(&self, w: W) -> csv::Result<()> {
        let mut wtr = csv::Writer::from_writer(w);
        wtr.write_record(CSV_HEADER)?;
        for p in &self.points {
            wtr.write_record([two_decimals(p.displacement_mm), two_decimals(p.force_n)])?;
        }
        wtr.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(d: f64, f: f64) -> TracePoint {
        TracePoint {
            displacement_mm: d,
            force_n: f,
        }
    }

    #[test]
    fn segments_are_addressable_after_append() {
        let mut t = Trace::new();
        t.push_segment(&[pt(0.0, 0.0), pt(1.0, 0.5)]);
        t.push_segment(&[]);
        t.push_segment(&[pt(1.5, 0.7)]);
        assert_eq!(t.segment_count(), 3);
        assert_eq!(t.len(), 3);
        assert_eq!(t.segment(0).map(<[_]>::len), Some(2));
        assert_eq!(t.segment(1).map(<[_]>::len), Some(0));
        assert_eq!(t.segment(2), Some(&[pt(1.5, 0.7)][..]));
        assert!(t.segment(3).is_none());
    }

    #[test]
    fn csv_has_header_and_two_decimals() {
        let mut t = Trace::new();
        t.push_segment(&[pt(5.0, 1.234), pt(5.5, -0.001)]);
        let mut buf = Vec::new();
        t.write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(
            text,
            "Displacement (mm),Force (N)\n5.00,1.23\n5.50,0.00\n"
        );
    }
}
