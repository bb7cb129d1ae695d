//! Reader thread lifecycle: prompt exit, no leaks, events in order.

use indent_core::mocks::{ScriptedTransport, Step};
use indent_core::reader::{Reader, ReaderEvent};
use indent_core::{Codec, MarkerKind, ParseFailureReason, SignConvention, TelemetryParser};
use indent_traits::clock::MonotonicClock;
use indent_traits::{BoxError, LineReader, Transport};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

fn spawn(link: &mut ScriptedTransport, running: Arc<AtomicBool>) -> Reader {
    Reader::spawn(
        link.reader().unwrap(),
        Codec::default(),
        TelemetryParser::default(),
        8,
        running,
        MonotonicClock::new(),
    )
}

fn next(reader: &Reader) -> ReaderEvent {
    reader
        .recv_timeout(Duration::from_secs(1))
        .unwrap()
        .expect("event within a second")
}

#[test]
fn events_arrive_typed_and_in_order() {
    let mut link = ScriptedTransport::new();
    link.preload([
        "Load cell tared",
        "Force:1.00N, Displacement:0.50mm",
        "Force:abcN, Displacement:1.0mm",
        "Motor Stopped",
    ]);
    let reader = spawn(&mut link, Arc::new(AtomicBool::new(true)));

    match next(&reader) {
        ReaderEvent::Sample(s) => assert_eq!(s.displacement_raw_mm, 0.5),
        other => panic!("expected sample, got {other:?}"),
    }
    match next(&reader) {
        ReaderEvent::Rejected(f) => assert_eq!(f.reason, ParseFailureReason::InvalidForce),
        other => panic!("expected rejection, got {other:?}"),
    }
    assert!(matches!(
        next(&reader),
        ReaderEvent::Marker {
            kind: MarkerKind::Stopped,
            ..
        }
    ));
    assert_eq!(reader.lines_seen(), 4);
}

#[test]
fn sign_switch_applies_to_later_lines() {
    let mut link = ScriptedTransport::new();
    let reader = spawn(&mut link, Arc::new(AtomicBool::new(true)));
    reader.set_sign(SignConvention::Inverted);
    link.preload(["Force:0.00N, Displacement:0.75mm"]);
    match next(&reader) {
        ReaderEvent::Sample(s) => assert_eq!(s.displacement_raw_mm, -0.75),
        other => panic!("expected sample, got {other:?}"),
    }
}

#[test]
fn clearing_running_flag_stops_thread_promptly() {
    let mut link = ScriptedTransport::new();
    let running = Arc::new(AtomicBool::new(true));
    let reader = spawn(&mut link, running.clone());
    std::thread::sleep(Duration::from_millis(20));
    assert!(reader.is_alive());

    running.store(false, Ordering::Release);
    let t0 = Instant::now();
    while reader.is_alive() && t0.elapsed() < Duration::from_secs(1) {
        std::thread::sleep(Duration::from_millis(2));
    }
    assert!(!reader.is_alive());
    assert!(reader.recv_timeout(Duration::from_millis(10)).is_err());
}

#[test]
fn drop_joins_thread_even_with_full_queue() {
    let mut link = ScriptedTransport::new();
    link.preload(vec!["Force:1.00N, Displacement:1.00mm"; 64]);
    let reader = spawn(&mut link, Arc::new(AtomicBool::new(true)));
    std::thread::sleep(Duration::from_millis(30));

    let t0 = Instant::now();
    drop(reader);
    assert!(t0.elapsed() < Duration::from_secs(1));
}

#[test]
fn many_readers_dont_leak_threads() {
    let mut link = ScriptedTransport::new();
    for _ in 0..10 {
        let reader = spawn(&mut link, Arc::new(AtomicBool::new(true)));
        std::thread::sleep(Duration::from_millis(5));
        drop(reader);
    }
}

#[test]
fn read_failure_is_reported_then_thread_exits() {
    let mut link = ScriptedTransport::new();
    link.on_move(vec![Step::Fail("framing error".into())]);
    let reader = spawn(&mut link, Arc::new(AtomicBool::new(true)));
    link.send_line("1.0").unwrap();

    assert!(matches!(next(&reader), ReaderEvent::Failed(_)));
    let t0 = Instant::now();
    while reader.is_alive() && t0.elapsed() < Duration::from_secs(1) {
        std::thread::sleep(Duration::from_millis(2));
    }
    assert!(!reader.is_alive());
}

#[test]
fn drain_discards_queued_events() {
    let mut link = ScriptedTransport::new();
    link.preload(vec!["Force:1.00N, Displacement:1.00mm"; 3]);
    let reader = spawn(&mut link, Arc::new(AtomicBool::new(true)));
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(reader.drain().unwrap(), 3);
    assert!(reader.recv_timeout(Duration::from_millis(20)).unwrap().is_none());
}

#[test]
fn failure_behind_full_queue_is_still_reported() {
    let mut link = ScriptedTransport::new();
    link.preload(["Force:1.00N, Displacement:1.00mm"]);
    link.on_move(vec![Step::Fail("framing error".into())]);
    link.send_line("1.0").unwrap();
    let reader = Reader::spawn(
        link.reader().unwrap(),
        Codec::default(),
        TelemetryParser::default(),
        1,
        Arc::new(AtomicBool::new(true)),
        MonotonicClock::new(),
    );

    // The sample fills the queue before the failing read.
    let t0 = Instant::now();
    while reader.is_alive() && t0.elapsed() < Duration::from_secs(1) {
        std::thread::sleep(Duration::from_millis(2));
    }
    assert!(!reader.is_alive());

    assert!(matches!(next(&reader), ReaderEvent::Sample(_)));
    match next(&reader) {
        ReaderEvent::Failed(e) => assert!(e.to_string().contains("framing error"), "{e}"),
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(reader.recv_timeout(Duration::from_millis(10)).is_err());
}

#[test]
fn drain_reports_failure_of_dead_thread() {
    let mut link = ScriptedTransport::new();
    link.on_move(vec![Step::Fail("framing error".into())]);
    link.send_line("1.0").unwrap();
    let reader = spawn(&mut link, Arc::new(AtomicBool::new(true)));
    let t0 = Instant::now();
    while reader.is_alive() && t0.elapsed() < Duration::from_secs(1) {
        std::thread::sleep(Duration::from_millis(2));
    }

    assert!(reader.drain().is_err());
    // Taken once; the thread is simply gone afterwards.
    assert!(reader.take_failure().is_none());
}

/// Link whose reads block on a channel; counts buffer discards.
struct GatedLines {
    gate: crossbeam_channel::Receiver<String>,
    discards: Arc<AtomicUsize>,
}

impl LineReader for GatedLines {
    fn read_line(&mut self) -> Result<Option<String>, BoxError> {
        Ok(self.gate.recv_timeout(Duration::from_millis(500)).ok())
    }

    fn discard_buffered(&mut self) {
        self.discards.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn line_read_across_a_flush_is_dropped() {
    let (gate_tx, gate) = crossbeam_channel::unbounded();
    let discards = Arc::new(AtomicUsize::new(0));
    let reader = Reader::spawn(
        Box::new(GatedLines {
            gate,
            discards: discards.clone(),
        }),
        Codec::default(),
        TelemetryParser::default(),
        8,
        Arc::new(AtomicBool::new(true)),
        MonotonicClock::new(),
    );
    // Let the thread block inside its first read.
    std::thread::sleep(Duration::from_millis(20));

    let late = gate_tx.clone();
    let feeder = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(40));
        late.send("Force:9.00N, Displacement:9.00mm".to_string()).unwrap();
    });
    // Returns only once the blocked read has completed and been discarded.
    reader.drain().unwrap();
    feeder.join().unwrap();

    assert_eq!(discards.load(Ordering::SeqCst), 1);
    assert!(reader.recv_timeout(Duration::from_millis(50)).unwrap().is_none());

    gate_tx
        .send("Force:0.50N, Displacement:0.25mm".to_string())
        .unwrap();
    match next(&reader) {
        ReaderEvent::Sample(s) => assert_eq!(s.displacement_raw_mm, 0.25),
        other => panic!("expected sample, got {other:?}"),
    }
}
