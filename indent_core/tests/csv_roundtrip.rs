//! The tabular log reads back as the trace, to two decimals.

use indent_core::mocks::ScriptedTransport;
use indent_core::util::round2;
use indent_core::{CompletionCfg, Controller, CsvLogSink, SessionCfg, SignConfig, StopDetection};

fn controller(link: &ScriptedTransport, csv: &std::path::Path) -> Controller {
    Controller::builder()
        .with_transport(link.clone())
        .with_session(SessionCfg {
            pre_move_delay_ms: 0,
            tare_delay_ms: 0,
            poll_ms: 5,
            queue_capacity: 64,
        })
        .with_completion(CompletionCfg {
            mode: StopDetection::Marker,
            watchdog_ms: 2_000,
            ..CompletionCfg::default()
        })
        .with_durable_sink(CsvLogSink::open(csv).unwrap())
        .try_build()
        .unwrap()
}

#[test]
fn logged_trace_reloads_exactly() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trace.csv");
    let link = ScriptedTransport::new();
    link.on_move_lines([
        "Force:0.00N, Displacement:0.00mm",
        "Force:0.37N, Displacement:1.25mm",
        "Force:1.91N, Displacement:2.50mm",
        "END",
    ]);
    link.on_move_lines([
        "Force:1.90N, Displacement:0.00mm",
        "Force:-0.12N, Displacement:-1.33mm",
        "END",
    ]);

    let mut c = controller(&link, &path);
    c.move_and_acquire(2.5, SignConfig::default()).unwrap();
    c.move_and_acquire(-1.33, SignConfig::default()).unwrap();
    let trace: Vec<(f64, f64)> = c
        .trace()
        .points()
        .iter()
        .map(|p| (round2(p.displacement_mm), round2(p.force_n)))
        .collect();
    c.shutdown().unwrap();

    let rows = indent_config::load_trace_csv(&path).unwrap();
    let reloaded: Vec<(f64, f64)> = rows.iter().map(|r| (r.displacement_mm, r.force_n)).collect();
    assert_eq!(reloaded, trace);
    assert_eq!(reloaded.len(), 5);
    assert_eq!(reloaded[4], (1.17, -0.12));
}

#[test]
fn second_run_appends_without_second_header() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trace.csv");
    for _ in 0..2 {
        let link = ScriptedTransport::new();
        link.on_move_lines(["Force:1.00N, Displacement:0.50mm", "END"]);
        let mut c = controller(&link, &path);
        c.move_and_acquire(0.5, SignConfig::default()).unwrap();
    }
    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text.matches("Displacement (mm)").count(), 1);
    assert_eq!(indent_config::load_trace_csv(&path).unwrap().len(), 2);
}

#[test]
fn trace_write_csv_matches_loader_contract() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("export.csv");
    let link = ScriptedTransport::new();
    link.on_move_lines(["Force:0.50N, Displacement:0.10mm", "END"]);
    let mut c = controller(&link, &dir.path().join("log.csv"));
    c.move_and_acquire(0.1, SignConfig::default()).unwrap();

    let file = std::fs::File::create(&path).unwrap();
    c.trace().write_csv(file).unwrap();
    let rows = indent_config::load_trace_csv(&path).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!((rows[0].displacement_mm, rows[0].force_n), (0.1, 0.5));
}
