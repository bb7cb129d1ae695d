use eyre::WrapErr;

use crate::config::{CompletionCfg, SignConfig};
use crate::detector::StopReason;
use crate::error::Result as CoreResult;
use crate::session::Controller;

/// Watchdog budget for one segment, in milliseconds.
///
/// Base budget plus a per-millimetre allowance for the requested travel, so
/// long moves on a slow rig are not cut off by a budget sized for short ones.
/// Never below 1 ms.
#[inline]
pub fn watchdog_budget_ms(cfg: &CompletionCfg, distance_mm: f64) -> u64 {
    cfg.watchdog_ms
        .saturating_add(travel_allowance_ms(cfg.watchdog_per_mm_ms, distance_mm))
        .max(1)
}

/// Per-millimetre share of the watchdog, rounded up and saturating.
#[inline]
fn travel_allowance_ms(per_mm_ms: u64, distance_mm: f64) -> u64 {
    if per_mm_ms == 0 || !distance_mm.is_finite() {
        return 0;
    }
    let v = (per_mm_ms as f64) * distance_mm.abs();
    if v >= u64::MAX as f64 {
        u64::MAX
    } else {
        v.ceil() as u64
    }
}

/// Outcome of a multi-move plan.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanSummary {
    pub segments: usize,
    pub samples: usize,
    pub rejected_lines: usize,
    pub final_offset_mm: f64,
    pub stop_reasons: Vec<StopReason>,
}

/// Run `moves` in order, stopping at the first failing segment.
///
/// The trace keeps every segment sealed before the failure.
pub fn run_plan(
    controller: &mut Controller,
    moves: &[f64],
    signs: SignConfig,
) -> CoreResult<PlanSummary> {
    let mut summary = PlanSummary {
        segments: 0,
        samples: 0,
        rejected_lines: 0,
        final_offset_mm: controller.offset_mm(),
        stop_reasons: Vec::with_capacity(moves.len()),
    };
    for (idx, &distance_mm) in moves.iter().enumerate() {
        let segment = controller
            .move_and_acquire(distance_mm, signs)
            .wrap_err_with(|| {
                format!(
                    "move {} of {} ({distance_mm} mm) failed after {} sealed segment(s)",
                    idx + 1,
                    moves.len(),
                    summary.segments
                )
            })?;
        summary.segments += 1;
        summary.samples += segment.len();
        summary.rejected_lines += segment.rejected_lines;
        summary.final_offset_mm = segment.offset_after_mm;
        summary.stop_reasons.push(segment.stop_reason);
    }
    tracing::info!(
        segments = summary.segments,
        samples = summary.samples,
        offset_mm = summary.final_offset_mm,
        "plan complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn cfg(base: u64, per_mm: u64) -> CompletionCfg {
        CompletionCfg {
            watchdog_ms: base,
            watchdog_per_mm_ms: per_mm,
            ..CompletionCfg::default()
        }
    }

    #[rstest]
    #[case(1_000, 0, 25.0, 1_000)]
    #[case(1_000, 200, 2.5, 1_500)]
    #[case(1_000, 200, -2.5, 1_500)]
    #[case(1_000, 3, 0.1, 1_001)]
    #[case(0, 0, 1.0, 1)]
    #[case(u64::MAX, 10, 1.0, u64::MAX)]
    #[case(500, 10, f64::INFINITY, 500)]
    fn budget_scales_with_travel(
        #[case] base: u64,
        #[case] per_mm: u64,
        #[case] distance: f64,
        #[case] expected: u64,
    ) {
        assert_eq!(watchdog_budget_ms(&cfg(base, per_mm), distance), expected);
    }
}
