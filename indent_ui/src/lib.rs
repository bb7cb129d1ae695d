#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Best-effort live text view of the trace being acquired.
//!
//! `LiveDisplay` is a `SampleSink` whose `accept` never blocks: points go
//! through a bounded channel with `try_send` and are dropped when the render
//! thread falls behind. The render thread redraws one status line at most
//! once per refresh interval.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel as xch;
use indent_core::{SampleSink, TracePoint};
use indent_traits::BoxError;

/// Default redraw interval.
pub const DEFAULT_REFRESH: Duration = Duration::from_millis(100);
/// Points buffered between the acquisition loop and the render thread.
pub const QUEUE_CAPACITY: usize = 1024;
const BAR_WIDTH: usize = 24;

/// Running summary shown on the status line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayState {
    pub points: u64,
    pub last: Option<TracePoint>,
    pub peak_force_n: f64,
    pub min_displacement_mm: f64,
    pub max_displacement_mm: f64,
}

impl DisplayState {
    pub fn update(&mut self, p: &TracePoint) {
        if self.points == 0 {
            self.min_displacement_mm = p.displacement_mm;
            self.max_displacement_mm = p.displacement_mm;
        } else {
            self.min_displacement_mm = self.min_displacement_mm.min(p.displacement_mm);
            self.max_displacement_mm = self.max_displacement_mm.max(p.displacement_mm);
        }
        self.peak_force_n = self.peak_force_n.max(p.force_n.abs());
        self.points += 1;
        self.last = Some(*p);
    }

    /// One status line: position, force, a force bar scaled to the peak so far.
    pub fn render(&self) -> String {
        let Some(last) = self.last else {
            return "waiting for telemetry...".to_string();
        };
        let filled = if self.peak_force_n > 0.0 {
            let frac = (last.force_n.abs() / self.peak_force_n).clamp(0.0, 1.0);
            (frac * BAR_WIDTH as f64).round() as usize
        } else {
            0
        };
        format!(
            "d={:>8.2} mm  F={:>8.2} N  [{}{}]  n={}  range=[{:.2}, {:.2}] mm",
            last.displacement_mm,
            last.force_n,
            "#".repeat(filled),
            " ".repeat(BAR_WIDTH - filled),
            self.points,
            self.min_displacement_mm,
            self.max_displacement_mm,
        )
    }
}

pub struct LiveDisplay {
    tx: Option<xch::Sender<TracePoint>>,
    dropped: Arc<AtomicU64>,
    join_handle: Option<std::thread::JoinHandle<DisplayState>>,
}

impl core::fmt::Debug for LiveDisplay {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LiveDisplay")
            .field("dropped", &self.dropped())
            .field("running", &self.join_handle.is_some())
            .finish()
    }
}

impl LiveDisplay {
    /// Render to stdout at the default cadence.
    pub fn stdout() -> Self {
        Self::spawn(std::io::stdout(), DEFAULT_REFRESH)
    }

    /// Render to `out`, redrawing at most once per `refresh`.
    pub fn spawn<W: Write + Send + 'static>(mut out: W, refresh: Duration) -> Self {
        let (tx, rx) = xch::bounded::<TracePoint>(QUEUE_CAPACITY);
        let dropped = Arc::new(AtomicU64::new(0));
        let refresh = refresh.max(Duration::from_millis(1));

        let join_handle = std::thread::spawn(move || {
            let mut state = DisplayState::default();
            let mut dirty = false;
            let mut last_draw = Instant::now();
            loop {
                match rx.recv_timeout(refresh) {
                    Ok(p) => {
                        state.update(&p);
                        // Coalesce whatever else is already queued.
                        for p in rx.try_iter() {
                            state.update(&p);
                        }
                        dirty = true;
                    }
                    Err(xch::RecvTimeoutError::Timeout) => {}
                    Err(xch::RecvTimeoutError::Disconnected) => break,
                }
                if dirty && last_draw.elapsed() >= refresh {
                    draw(&mut out, &state);
                    dirty = false;
                    last_draw = Instant::now();
                }
            }
            if state.points > 0 {
                draw(&mut out, &state);
                let _ = writeln!(out);
                let _ = out.flush();
            }
            tracing::trace!(points = state.points, "live display exiting");
            state
        });

        Self {
            tx: Some(tx),
            dropped,
            join_handle: Some(join_handle),
        }
    }

    /// Points discarded because the render thread was behind.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stop rendering and return the final summary.
    pub fn finish(mut self) -> Option<DisplayState> {
        self.stop()
    }

    fn stop(&mut self) -> Option<DisplayState> {
        // Closing the channel ends the render loop.
        self.tx = None;
        let handle = self.join_handle.take()?;
        match handle.join() {
            Ok(state) => Some(state),
            Err(e) => {
                tracing::warn!(?e, "live display thread panicked");
                None
            }
        }
    }
}

fn draw<W: Write>(out: &mut W, state: &DisplayState) {
    // Rendering is advisory; a broken terminal must not disturb acquisition.
    let _ = write!(out, "\r{}", state.render());
    let _ = out.flush();
}

impl SampleSink for LiveDisplay {
    fn accept(&mut self, point: &TracePoint) -> Result<(), BoxError> {
        let Some(tx) = &self.tx else {
            return Err("live display stopped".into());
        };
        match tx.try_send(*point) {
            Ok(()) => Ok(()),
            Err(xch::TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(xch::TrySendError::Disconnected(_)) => Err("live display stopped".into()),
        }
    }
}

impl Drop for LiveDisplay {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
