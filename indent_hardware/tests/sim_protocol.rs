use indent_hardware::sim::NOISE_LINE;
use indent_hardware::{SimConfig, SimMarker, SimulatedRig};
use indent_traits::{LineReader, Transport};
use rstest::rstest;
use std::time::Duration;

fn fast(marker: SimMarker, noise_every: u32) -> SimulatedRig {
    SimulatedRig::new(SimConfig {
        period: Duration::from_millis(1),
        speed_mm_s: 100.0,
        stiffness_n_per_mm: 4.0,
        contact_mm: 0.2,
        marker,
        noise_every,
    })
}

/// Read until `pred` matches or `limit` lines have been seen.
fn read_until(
    reader: &mut dyn LineReader,
    limit: usize,
    pred: impl Fn(&str) -> bool,
) -> Vec<String> {
    let mut seen = Vec::new();
    for _ in 0..limit {
        if let Some(line) = reader.read_line().unwrap() {
            let stop = pred(&line);
            seen.push(line);
            if stop {
                break;
            }
        }
    }
    seen
}

#[rstest]
#[case(SimMarker::End, Some("END"))]
#[case(SimMarker::Stopped, Some("Motor Stopped"))]
#[case(SimMarker::None, None)]
fn marker_style_is_configurable(#[case] marker: SimMarker, #[case] token: Option<&str>) {
    let mut rig = fast(marker, 0);
    let mut reader = rig.reader().unwrap();
    rig.send_line("0.5").unwrap();
    let lines = read_until(reader.as_mut(), 40, |l| l == "END" || l == "Motor Stopped");
    assert_eq!(
        lines.iter().rev().find(|l| !l.starts_with("Force:")).map(String::as_str),
        token.or(Some("Moving 0.5 mm"))
    );
}

#[test]
fn displacement_is_relative_to_each_move() {
    let mut rig = fast(SimMarker::End, 0);
    let mut reader = rig.reader().unwrap();
    rig.send_line("0.5").unwrap();
    read_until(reader.as_mut(), 40, |l| l == "END");
    rig.send_line("-0.3").unwrap();
    let lines = read_until(reader.as_mut(), 40, |l| l == "END");
    let at_target = &lines[lines.len() - 2];
    assert!(at_target.ends_with("Displacement:-0.30mm"), "{at_target}");
    assert!((rig.position_mm() - 0.2).abs() < 1e-9);
}

#[test]
fn force_grows_past_contact() {
    let mut rig = fast(SimMarker::End, 0);
    let mut reader = rig.reader().unwrap();
    rig.send_line("0.7").unwrap();
    let lines = read_until(reader.as_mut(), 40, |l| l == "END");
    // 0.5 mm past contact at 4 N/mm.
    assert!(lines[lines.len() - 2].starts_with("Force:2.00N"), "{lines:?}");
}

#[test]
fn noise_lines_follow_telemetry() {
    let mut rig = fast(SimMarker::End, 3);
    let mut reader = rig.reader().unwrap();
    rig.send_line("1.0").unwrap();
    let lines = read_until(reader.as_mut(), 80, |l| l == "END");
    let noise = lines.iter().filter(|l| *l == NOISE_LINE).count();
    let telemetry = lines
        .iter()
        .filter(|l| l.starts_with("Force:") && *l != NOISE_LINE)
        .count();
    assert_eq!(noise, telemetry / 3);
}

#[test]
fn unknown_command_is_echoed_not_fatal() {
    let mut rig = fast(SimMarker::End, 0);
    let mut reader = rig.reader().unwrap();
    rig.send_line("jog").unwrap();
    assert_eq!(
        reader.read_line().unwrap().as_deref(),
        Some("Unknown command: jog")
    );
    rig.send_line("cal x").unwrap();
    assert_eq!(
        reader.read_line().unwrap().as_deref(),
        Some("Invalid calibration: x")
    );
}
