//! Test and helper mocks for indent_core.
//!
//! `ScriptedTransport` replays canned device output: lines queued with
//! `on_move` are released when the next move command is written, which mirrors
//! a rig that only streams telemetry while the motor runs.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use indent_traits::{BoxError, LineReader, Transport};

use crate::accumulator::TracePoint;
use crate::sink::SampleSink;

/// One scripted step of device output.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Deliver a line.
    Line(String),
    /// Block the reader this long before the next step.
    Pause(Duration),
    /// Fail the read with this message.
    Fail(String),
}

impl Step {
    pub fn line(text: impl Into<String>) -> Self {
        Step::Line(text.into())
    }

    pub fn pause_ms(ms: u64) -> Self {
        Step::Pause(Duration::from_millis(ms))
    }
}

#[derive(Debug, Default)]
struct Script {
    ready: VecDeque<Step>,
    per_move: VecDeque<Vec<Step>>,
    sent: Vec<String>,
    fail_writes: Option<String>,
    clears: usize,
    closed: bool,
}

/// Scripted in-memory link. Clones share state, so a test can keep a handle
/// for inspection after moving one into the controller.
#[derive(Debug, Clone)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
    /// Idle read latency when nothing is queued (stands in for the port timeout).
    idle: Duration,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(Script::default())),
            idle: Duration::from_millis(2),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        // A poisoned script means a test already panicked; keep going with the data.
        self.script.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Queue output that is readable immediately.
    pub fn preload<I, S>(&self, lines: I) -> &Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock()
            .ready
            .extend(lines.into_iter().map(|l| Step::Line(l.into())));
        self
    }

    /// Queue output released by the next move command.
    pub fn on_move(&self, steps: Vec<Step>) -> &Self {
        self.lock().per_move.push_back(steps);
        self
    }

    /// Convenience: `on_move` with plain lines.
    pub fn on_move_lines<I, S>(&self, lines: I) -> &Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.on_move(lines.into_iter().map(|l| Step::Line(l.into())).collect())
    }

    /// Make every subsequent write fail with `msg` (`None` restores writes).
    pub fn fail_writes(&self, msg: Option<&str>) {
        self.lock().fail_writes = msg.map(str::to_string);
    }

    /// Every line written so far, in order.
    pub fn sent(&self) -> Vec<String> {
        self.lock().sent.clone()
    }

    pub fn clears(&self) -> usize {
        self.lock().clears
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

fn is_move(line: &str) -> bool {
    line.parse::<f64>().is_ok()
}

impl Transport for ScriptedTransport {
    fn send_line(&mut self, line: &str) -> Result<(), BoxError> {
        let mut s = self.lock();
        if s.closed {
            return Err("link closed".into());
        }
        if let Some(msg) = &s.fail_writes {
            return Err(msg.clone().into());
        }
        s.sent.push(line.to_string());
        if is_move(line)
            && let Some(batch) = s.per_move.pop_front()
        {
            s.ready.extend(batch);
        }
        Ok(())
    }

    fn clear_input(&mut self) -> Result<(), BoxError> {
        let mut s = self.lock();
        s.clears += 1;
        s.ready.clear();
        Ok(())
    }

    fn reader(&mut self) -> Result<Box<dyn LineReader + Send>, BoxError> {
        Ok(Box::new(ScriptedReader {
            inner: self.clone(),
        }))
    }

    fn close(&mut self) -> Result<(), BoxError> {
        self.lock().closed = true;
        Ok(())
    }
}

struct ScriptedReader {
    inner: ScriptedTransport,
}

impl LineReader for ScriptedReader {
    fn read_line(&mut self) -> Result<Option<String>, BoxError> {
        let step = {
            let mut s = self.inner.lock();
            if s.closed {
                return Err("link closed".into());
            }
            s.ready.pop_front()
        };
        match step {
            Some(Step::Line(l)) => Ok(Some(l)),
            Some(Step::Pause(d)) => {
                std::thread::sleep(d);
                Ok(None)
            }
            Some(Step::Fail(msg)) => Err(msg.into()),
            None => {
                std::thread::sleep(self.inner.idle);
                Ok(None)
            }
        }
    }
}

/// Sink that records every accepted point; clones share the record.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    points: Arc<Mutex<Vec<TracePoint>>>,
    flushes: Arc<Mutex<usize>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn points(&self) -> Vec<TracePoint> {
        self.points.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn flushes(&self) -> usize {
        self.flushes.lock().map(|f| *f).unwrap_or_default()
    }
}

impl SampleSink for RecordingSink {
    fn accept(&mut self, point: &TracePoint) -> Result<(), BoxError> {
        self.points
            .lock()
            .map_err(|_| "recording sink poisoned")?
            .push(*point);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), BoxError> {
        *self.flushes.lock().map_err(|_| "recording sink poisoned")? += 1;
        Ok(())
    }
}
