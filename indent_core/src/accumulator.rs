//! Stitch device-relative segments into one absolute displacement axis.

use crate::telemetry::Sample;

/// A sample on the absolute displacement axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TracePoint {
    pub displacement_mm: f64,
    pub force_n: f64,
}

/// Absolute displacement of a device-relative reading.
#[inline]
pub fn absolute(offset_mm: f64, raw_mm: f64) -> f64 {
    offset_mm + raw_mm
}

/// Offset every sample of a sealed segment by `offset_mm`.
///
/// Returns the absolute points and the new cumulative offset, which is the
/// absolute displacement of the last sample. An empty segment leaves the
/// offset unchanged.
pub fn accumulate(offset_mm: f64, samples: &[Sample]) -> (Vec<TracePoint>, f64) {
    let points: Vec<TracePoint> = samples
        .iter()
        .map(|s| TracePoint {
            displacement_mm: absolute(offset_mm, s.displacement_raw_mm),
            force_n: s.force_n,
        })
        .collect();
    let next = points.last().map_or(offset_mm, |p| p.displacement_mm);
    (points, next)
}
