//! Full stack against the in-process simulated rig.

use indent_core::{
    CompletionCfg, Controller, SessionCfg, SignConfig, StopDetection, StopReason, run_plan,
};
use indent_hardware::{SimConfig, SimMarker, SimulatedRig};
use rstest::rstest;
use std::time::Duration;

fn rig(marker: SimMarker) -> SimulatedRig {
    SimulatedRig::new(SimConfig {
        period: Duration::from_millis(1),
        speed_mm_s: 50.0,
        stiffness_n_per_mm: 2.0,
        contact_mm: 0.0,
        marker,
        noise_every: 7,
    })
}

fn controller(rig: &SimulatedRig, mode: StopDetection) -> Controller {
    Controller::builder()
        .with_transport(rig.clone())
        .with_session(SessionCfg {
            pre_move_delay_ms: 0,
            tare_delay_ms: 5,
            poll_ms: 5,
            queue_capacity: 256,
        })
        .with_completion(CompletionCfg {
            mode,
            epsilon_mm: 0.01,
            debounce_threshold: 5,
            grace_ms: 50,
            watchdog_ms: 5_000,
            watchdog_per_mm_ms: 0,
        })
        .with_calibration(Some(45_000))
        .try_build()
        .unwrap()
}

#[rstest]
#[case(SimMarker::End, StopDetection::Marker, StopReason::ExplicitEnd)]
#[case(SimMarker::Stopped, StopDetection::Marker, StopReason::PostStopTimeout)]
#[case(SimMarker::None, StopDetection::Debounce, StopReason::StabilityDebounce)]
fn plan_stitches_moves_for_every_marker_style(
    #[case] marker: SimMarker,
    #[case] mode: StopDetection,
    #[case] reason: StopReason,
) {
    let rig = rig(marker);
    let mut c = controller(&rig, mode);

    let summary = run_plan(&mut c, &[0.5, 0.25], SignConfig::default()).unwrap();

    assert_eq!(summary.segments, 2);
    assert_eq!(summary.stop_reasons, vec![reason, reason]);
    assert!((summary.final_offset_mm - 0.75).abs() < 1e-9, "{summary:?}");
    assert!(summary.rejected_lines > 0);
    assert_eq!(rig.calibration(), 45_000);
    assert!((rig.position_mm() - 0.75).abs() < 1e-9);

    let sent = rig.sent_lines();
    assert_eq!(&sent[..4], ["cal 45000", "0.5", "t", "0.25"]);

    let last = c.trace().points().last().map(|p| p.displacement_mm);
    assert!(last.is_some_and(|d| (d - 0.75).abs() < 1e-9), "{last:?}");
}

#[test]
fn inverted_rig_reads_back_positive() {
    let rig = rig(SimMarker::End);
    let mut c = controller(&rig, StopDetection::Marker);
    let flipped = indent_core::SignConfig {
        displacement: indent_core::SignConvention::Inverted,
        motion: indent_core::SignConvention::Inverted,
    };

    let seg = c.move_and_acquire(0.5, flipped).unwrap();

    assert!((rig.position_mm() + 0.5).abs() < 1e-9);
    assert!((seg.offset_after_mm - 0.5).abs() < 1e-9);
}
