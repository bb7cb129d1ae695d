//! Consumers of accepted samples.
//!
//! Live sinks (displays) see every point as it is accepted and must not block;
//! a failing live sink is logged and skipped. Durable sinks (the tabular log)
//! receive a segment only once it is sealed, so an aborted segment never
//! reaches them.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use indent_traits::BoxError;

use crate::accumulator::TracePoint;
use crate::error::IndentError;
use crate::trace::CSV_HEADER;
use crate::util::two_decimals;

pub trait SampleSink: Send {
    fn accept(&mut self, point: &TracePoint) -> Result<(), BoxError>;

    fn flush(&mut self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Forget points accepted since the last successful flush.
    fn discard(&mut self) {}
}

impl<T: SampleSink + ?Sized> SampleSink for Box<T> {
    fn accept(&mut self, point: &TracePoint) -> Result<(), BoxError> {
        (**self).accept(point)
    }

    fn flush(&mut self) -> Result<(), BoxError> {
        (**self).flush()
    }

    fn discard(&mut self) {
        (**self).discard()
    }
}

fn encode_rows<'a, I>(rows: I) -> Result<Vec<u8>, BoxError>
where
    I: IntoIterator<Item = [&'a str; 2]>,
{
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    for row in rows {
        wtr.write_record(row)?;
    }
    wtr.into_inner().map_err(|e| e.error().to_string().into())
}

/// Appendable two-column CSV log of absolute points.
///
/// The header is written only when the file is empty, so repeated runs keep
/// extending one table. Accepted rows are staged in memory and reach the
/// file in a single write on `flush`; a failed write is truncated away.
pub struct CsvLogSink {
    file: File,
    path: PathBuf,
    staged: Vec<u8>,
    staged_rows: u64,
    rows: u64,
}

impl core::fmt::Debug for CsvLogSink {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CsvLogSink")
            .field("path", &self.path)
            .field("rows", &self.rows)
            .field("staged_rows", &self.staged_rows)
            .finish()
    }
}

impl CsvLogSink {
    pub fn open(path: &Path) -> Result<Self, IndentError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| IndentError::Sink(format!("open {}: {e}", path.display())))?;
        let empty = file
            .metadata()
            .map_err(|e| IndentError::Sink(format!("stat {}: {e}", path.display())))?
            .len()
            == 0;
        let mut sink = Self {
            file,
            path: path.to_path_buf(),
            staged: Vec::new(),
            staged_rows: 0,
            rows: 0,
        };
        if empty {
            let header = encode_rows([CSV_HEADER])
                .map_err(|e| IndentError::Sink(format!("encode header: {e}")))?;
            sink.write_block(&header)
                .map_err(|e| IndentError::Sink(format!("write header {}: {e}", path.display())))?;
        }
        tracing::debug!(path = %path.display(), new_file = empty, "csv log opened");
        Ok(sink)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows written to the file through this handle.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Append `block` or leave the file at its previous length.
    fn write_block(&mut self, block: &[u8]) -> std::io::Result<()> {
        let before = self.file.metadata()?.len();
        let written = self
            .file
            .write_all(block)
            .and_then(|()| self.file.flush());
        if let Err(e) = written {
            if let Err(undo) = self.file.set_len(before) {
                tracing::error!(
                    path = %self.path.display(),
                    error = %undo,
                    "could not truncate partial csv write"
                );
            }
            return Err(e);
        }
        Ok(())
    }
}

impl SampleSink for CsvLogSink {
    fn accept(&mut self, point: &TracePoint) -> Result<(), BoxError> {
        let d = two_decimals(point.displacement_mm);
        let f = two_decimals(point.force_n);
        let row = encode_rows([[d.as_str(), f.as_str()]])?;
        self.staged.extend_from_slice(&row);
        self.staged_rows += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), BoxError> {
        if self.staged.is_empty() {
            return Ok(());
        }
        let block = std::mem::take(&mut self.staged);
        let rows = std::mem::take(&mut self.staged_rows);
        self.write_block(&block)?;
        self.rows += rows;
        Ok(())
    }

    fn discard(&mut self) {
        if self.staged_rows > 0 {
            tracing::debug!(rows = self.staged_rows, "discarding staged csv rows");
        }
        self.staged.clear();
        self.staged_rows = 0;
    }
}

/// Routes accepted points to every registered sink.
#[derive(Default)]
pub struct SinkFanout {
    live: Vec<Box<dyn SampleSink>>,
    durable: Vec<Box<dyn SampleSink>>,
}

impl core::fmt::Debug for SinkFanout {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SinkFanout")
            .field("live", &self.live.len())
            .field("durable", &self.durable.len())
            .finish()
    }
}

impl SinkFanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_live(&mut self, sink: Box<dyn SampleSink>) {
        self.live.push(sink);
    }

    pub fn add_durable(&mut self, sink: Box<dyn SampleSink>) {
        self.durable.push(sink);
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty() && self.durable.is_empty()
    }

    /// Forward one point to the live sinks. Never fails.
    pub fn publish(&mut self, point: &TracePoint) {
        for (idx, sink) in self.live.iter_mut().enumerate() {
            if let Err(e) = sink.accept(point) {
                tracing::warn!(sink = idx, error = %e, "live sink rejected sample");
            }
        }
    }

    /// Write a sealed segment to the durable sinks and flush them.
    ///
    /// Every durable sink accepts the whole segment before any is flushed,
    /// and a rejection discards what was staged everywhere. A flush failure
    /// after an earlier sink flushed still leaves that sink holding the
    /// segment.
    pub fn commit(&mut self, points: &[TracePoint]) -> Result<(), IndentError> {
        let staged = self
            .durable
            .iter_mut()
            .try_for_each(|sink| points.iter().try_for_each(|p| sink.accept(p)));
        if let Err(e) = staged {
            for sink in &mut self.durable {
                sink.discard();
            }
            return Err(IndentError::Sink(e.to_string()));
        }
        for sink in &mut self.durable {
            sink.flush().map_err(|e| IndentError::Sink(e.to_string()))?;
        }
        for (idx, sink) in self.live.iter_mut().enumerate() {
            if let Err(e) = sink.flush() {
                tracing::warn!(sink = idx, error = %e, "live sink flush failed");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::RecordingSink;

    fn pt(d: f64, f: f64) -> TracePoint {
        TracePoint {
            displacement_mm: d,
            force_n: f,
        }
    }

    struct FailingSink;

    impl SampleSink for FailingSink {
        fn accept(&mut self, _point: &TracePoint) -> Result<(), BoxError> {
            Err("display gone".into())
        }
    }

    #[test]
    fn live_failure_does_not_stop_other_sinks() {
        let rec = RecordingSink::new();
        let mut fan = SinkFanout::new();
        fan.add_live(Box::new(FailingSink));
        fan.add_live(Box::new(rec.clone()));
        fan.publish(&pt(1.0, 2.0));
        assert_eq!(rec.points(), vec![pt(1.0, 2.0)]);
    }

    #[test]
    fn durable_failure_surfaces_as_sink_error() {
        let mut fan = SinkFanout::new();
        fan.add_durable(Box::new(FailingSink));
        let err = fan.commit(&[pt(0.0, 0.0)]).unwrap_err();
        assert!(matches!(err, IndentError::Sink(_)));
    }

    #[test]
    fn csv_header_written_once_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.csv");
        {
            let mut sink = CsvLogSink::open(&path).unwrap();
            sink.accept(&pt(0.0, 0.0)).unwrap();
            sink.flush().unwrap();
        }
        {
            let mut sink = CsvLogSink::open(&path).unwrap();
            sink.accept(&pt(1.25, 2.5)).unwrap();
            sink.flush().unwrap();
            assert_eq!(sink.rows(), 1);
        }
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "Displacement (mm),Force (N)\n0.00,0.00\n1.25,2.50\n");
    }

    #[test]
    fn rows_reach_the_file_only_on_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.csv");
        let mut sink = CsvLogSink::open(&path).unwrap();
        sink.accept(&pt(0.5, 1.0)).unwrap();
        sink.accept(&pt(0.75, 1.5)).unwrap();
        assert_eq!(sink.rows(), 0);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Displacement (mm),Force (N)\n");

        sink.flush().unwrap();
        assert_eq!(sink.rows(), 2);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "Displacement (mm),Force (N)\n0.50,1.00\n0.75,1.50\n"
        );
    }

    /// Durable sink that rejects the first segment it sees.
    struct RejectOnce {
        rejected: bool,
    }

    impl SampleSink for RejectOnce {
        fn accept(&mut self, _point: &TracePoint) -> Result<(), BoxError> {
            if self.rejected {
                return Ok(());
            }
            self.rejected = true;
            Err("disk quota".into())
        }
    }

    #[test]
    fn rejected_segment_leaves_no_rows_in_any_durable_sink() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.csv");
        let mut fan = SinkFanout::new();
        fan.add_durable(Box::new(CsvLogSink::open(&path).unwrap()));
        fan.add_durable(Box::new(RejectOnce { rejected: false }));

        let err = fan.commit(&[pt(0.1, 1.0), pt(0.2, 2.0)]).unwrap_err();
        assert!(matches!(err, IndentError::Sink(msg) if msg.contains("disk quota")));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Displacement (mm),Force (N)\n");

        // The staged rows are gone, not carried into the next segment.
        fan.commit(&[pt(0.3, 3.0)]).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "Displacement (mm),Force (N)\n0.30,3.00\n"
        );
    }
}
