//! In-process simulated indentation rig.
//!
//! Speaks the same newline protocol as the controller firmware: `t` tares the load
//! cell, `cal <n>` sets the calibration factor, a signed decimal starts a relative
//! move, and `No` halts the motor. While connected it streams
//! `Force:<f>N, Displacement:<d>mm` lines where displacement is relative to the
//! start of the last move, and force grows linearly once the tip passes the
//! contact point.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use indent_traits::{BoxError, LineReader, Transport};

use crate::error::HwError;

/// Telemetry-shaped line with a non-numeric force, as seen from noisy links.
pub const NOISE_LINE: &str = "Force:abcN, Displacement:1.0mm";

/// How the simulated firmware announces the end of a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimMarker {
    /// Emit `END` once the target is reached.
    End,
    /// Emit `Motor Stopped` once the target is reached.
    Stopped,
    /// Emit nothing; the host must infer completion.
    None,
}

#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Interval between telemetry lines.
    pub period: Duration,
    /// Travel speed while a move is in progress.
    pub speed_mm_s: f64,
    /// Linear contact stiffness.
    pub stiffness_n_per_mm: f64,
    /// Absolute position at which the tip touches the sample.
    pub contact_mm: f64,
    pub marker: SimMarker,
    /// Follow every n-th telemetry line with a malformed one (0 disables).
    pub noise_every: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(10),
            speed_mm_s: 5.0,
            stiffness_n_per_mm: 2.0,
            contact_mm: 0.5,
            marker: SimMarker::Stopped,
            noise_every: 0,
        }
    }
}

#[derive(Debug, Default)]
struct RigState {
    position_mm: f64,
    move_origin_mm: f64,
    target_mm: f64,
    moving: bool,
    marker_pending: bool,
    tare_n: f64,
    calibration: i64,
    replies: VecDeque<String>,
    lines_emitted: u64,
    sent: Vec<String>,
    closed: bool,
}

impl RigState {
    fn force_n(&self, cfg: &SimConfig) -> f64 {
        let depth = (self.position_mm - cfg.contact_mm).max(0.0);
        cfg.stiffness_n_per_mm * depth - self.tare_n
    }

    fn advance(&mut self, cfg: &SimConfig) {
        if !self.moving {
            return;
        }
        let step = cfg.speed_mm_s * cfg.period.as_secs_f64();
        let remaining = self.target_mm - self.position_mm;
        if remaining.abs() <= step {
            self.position_mm = self.target_mm;
            self.moving = false;
            self.marker_pending = cfg.marker != SimMarker::None;
        } else {
            self.position_mm += step.copysign(remaining);
        }
    }
}

/// Simulated rig; clones share one physical state.
#[derive(Debug, Clone)]
pub struct SimulatedRig {
    cfg: SimConfig,
    state: Arc<Mutex<RigState>>,
}

impl Default for SimulatedRig {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

impl SimulatedRig {
    pub fn new(cfg: SimConfig) -> Self {
        Self {
            cfg,
            state: Arc::new(Mutex::new(RigState::default())),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, RigState>, HwError> {
        self.state
            .lock()
            .map_err(|_| HwError::Serial("simulated rig state poisoned".into()))
    }

    /// Absolute tip position, for tests and diagnostics.
    pub fn position_mm(&self) -> f64 {
        self.lock().map(|s| s.position_mm).unwrap_or(f64::NAN)
    }

    /// Commands received so far, in order.
    pub fn sent_lines(&self) -> Vec<String> {
        self.lock().map(|s| s.sent.clone()).unwrap_or_default()
    }

    pub fn calibration(&self) -> i64 {
        self.lock().map(|s| s.calibration).unwrap_or_default()
    }

    pub fn is_moving(&self) -> bool {
        self.lock().map(|s| s.moving).unwrap_or(false)
    }
}

impl Transport for SimulatedRig {
    fn send_line(&mut self, line: &str) -> Result<(), BoxError> {
        let cfg = self.cfg.clone();
        let mut s = self.lock()?;
        if s.closed {
            return Err(Box::new(HwError::Closed));
        }
        let cmd = line.trim();
        s.sent.push(cmd.to_string());
        if cmd == "t" {
            let force = s.force_n(&cfg);
            s.tare_n += force;
            s.replies.push_back("Load cell tared".into());
        } else if cmd == "No" {
            s.moving = false;
            s.replies.push_back("Exiting".into());
        } else if let Some(arg) = cmd.strip_prefix("cal ") {
            match arg.trim().parse::<i64>() {
                Ok(f) => {
                    s.calibration = f;
                    s.replies.push_back(format!("Calibration factor set to {f}"));
                }
                Err(_) => s.replies.push_back(format!("Invalid calibration: {arg}")),
            }
        } else if let Some(d) = cmd.parse::<f64>().ok().filter(|d| d.is_finite()) {
            s.move_origin_mm = s.position_mm;
            s.target_mm = s.position_mm + d;
            s.moving = true;
            s.marker_pending = false;
            s.replies.push_back(format!("Moving {d} mm"));
        } else {
            s.replies.push_back(format!("Unknown command: {cmd}"));
        }
        Ok(())
    }

    fn clear_input(&mut self) -> Result<(), BoxError> {
        self.lock()?.replies.clear();
        Ok(())
    }

    fn reader(&mut self) -> Result<Box<dyn LineReader + Send>, BoxError> {
        Ok(Box::new(SimReader { rig: self.clone() }))
    }

    fn close(&mut self) -> Result<(), BoxError> {
        self.lock()?.closed = true;
        Ok(())
    }
}

struct SimReader {
    rig: SimulatedRig,
}

impl LineReader for SimReader {
    fn read_line(&mut self) -> Result<Option<String>, BoxError> {
        {
            let mut s = self.rig.lock()?;
            if s.closed {
                return Err(Box::new(HwError::Closed));
            }
            if let Some(reply) = s.replies.pop_front() {
                return Ok(Some(reply));
            }
        }
        std::thread::sleep(self.rig.cfg.period);

        let cfg = &self.rig.cfg;
        let mut s = self.rig.lock()?;
        if s.closed {
            return Err(Box::new(HwError::Closed));
        }
        // The marker follows the telemetry line reported at the target.
        if s.marker_pending {
            s.marker_pending = false;
            let token = match cfg.marker {
                SimMarker::End => "END",
                SimMarker::Stopped => "Motor Stopped",
                SimMarker::None => return Ok(None),
            };
            return Ok(Some(token.to_string()));
        }
        s.advance(cfg);
        s.lines_emitted += 1;
        if cfg.noise_every > 0 && s.lines_emitted % u64::from(cfg.noise_every) == 0 {
            s.replies.push_back(NOISE_LINE.to_string());
        }
        let force = s.force_n(cfg);
        let displacement = s.position_mm - s.move_origin_mm;
        Ok(Some(format!(
            "Force:{force:.2}N, Displacement:{displacement:.2}mm"
        )))
    }
}
