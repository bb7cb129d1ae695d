//! Builder for `Controller`.
//!
//! A transport is mandatory; everything else falls back to the rig defaults.
//! `try_build()` validates the runtime config, optionally waits for the board
//! to settle and sends the calibration factor.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use indent_traits::Transport;
use indent_traits::clock::{Clock, MonotonicClock};

use crate::codec::Codec;
use crate::config::{CompletionCfg, ProtocolCfg, SessionCfg, SignConfig};
use crate::error::{BuildError, Result};
use crate::session::{Controller, ControllerState};
use crate::sink::{SampleSink, SinkFanout};
use crate::telemetry::TelemetryParser;
use crate::trace::Trace;

#[derive(Default)]
pub struct ControllerBuilder {
    transport: Option<Box<dyn Transport + Send>>,
    protocol: Option<ProtocolCfg>,
    completion: Option<CompletionCfg>,
    session: Option<SessionCfg>,
    signs: Option<SignConfig>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    running: Option<Arc<AtomicBool>>,
    sinks: SinkFanout,
    calibration: Option<i64>,
    open_settle: Duration,
}

impl core::fmt::Debug for ControllerBuilder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ControllerBuilder")
            .field("transport", &self.transport.is_some())
            .field("completion", &self.completion)
            .field("session", &self.session)
            .field("signs", &self.signs)
            .field("sinks", &self.sinks)
            .field("calibration", &self.calibration)
            .finish()
    }
}

impl ControllerBuilder {
    pub fn with_transport(mut self, transport: impl Transport + Send + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    pub fn with_protocol(mut self, protocol: ProtocolCfg) -> Self {
        self.protocol = Some(protocol);
        self
    }

    pub fn with_completion(mut self, completion: CompletionCfg) -> Self {
        self.completion = Some(completion);
        self
    }

    pub fn with_session(mut self, session: SessionCfg) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_signs(mut self, signs: SignConfig) -> Self {
        self.signs = Some(signs);
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + Send + Sync + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Share an externally owned running flag (e.g. one cleared by a signal handler).
    pub fn with_running_flag(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = Some(running);
        self
    }

    pub fn with_live_sink(mut self, sink: impl SampleSink + 'static) -> Self {
        self.sinks.add_live(Box::new(sink));
        self
    }

    pub fn with_durable_sink(mut self, sink: impl SampleSink + 'static) -> Self {
        self.sinks.add_durable(Box::new(sink));
        self
    }

    /// Send `cal <factor>` once the controller is built.
    pub fn with_calibration(mut self, factor: Option<i64>) -> Self {
        self.calibration = factor;
        self
    }

    /// Wait this long before the first command while the board resets.
    pub fn with_open_settle(mut self, settle: Duration) -> Self {
        self.open_settle = settle;
        self
    }

    pub fn try_build(self) -> Result<Controller> {
        let transport = self
            .transport
            .ok_or_else(|| eyre::Report::new(BuildError::MissingTransport))?;
        let protocol = self.protocol.unwrap_or_default();
        let completion = self.completion.unwrap_or_default();
        let session = self.session.unwrap_or_default();
        validate(&protocol, &completion, &session).map_err(eyre::Report::new)?;

        let clock: Arc<dyn Clock + Send + Sync> =
            self.clock.unwrap_or_else(|| Arc::new(MonotonicClock::new()));
        let running = self
            .running
            .unwrap_or_else(|| Arc::new(AtomicBool::new(true)));

        let mut controller = Controller {
            state: ControllerState::new(transport, running),
            reader: None,
            parser: TelemetryParser::new(&protocol),
            codec: Codec::new(protocol),
            completion,
            session,
            signs: self.signs.unwrap_or_default(),
            sinks: self.sinks,
            trace: Trace::new(),
            clock,
            phase: None,
            link_lost: None,
            closed: false,
        };

        if !self.open_settle.is_zero() {
            tracing::debug!(
                settle_ms = crate::util::as_ms(self.open_settle),
                "waiting for board reset"
            );
            controller.clock.sleep(self.open_settle);
        }
        if let Some(factor) = self.calibration {
            controller.set_calibration(factor)?;
        }
        Ok(controller)
    }
}

fn validate(
    protocol: &ProtocolCfg,
    completion: &CompletionCfg,
    session: &SessionCfg,
) -> std::result::Result<(), BuildError> {
    if protocol.force_marker.is_empty() || protocol.displacement_marker.is_empty() {
        return Err(BuildError::InvalidConfig("telemetry markers must be non-empty"));
    }
    if !(completion.epsilon_mm.is_finite() && completion.epsilon_mm > 0.0) {
        return Err(BuildError::InvalidConfig("epsilon_mm must be > 0"));
    }
    if completion.debounce_threshold == 0 {
        return Err(BuildError::InvalidConfig("debounce_threshold must be >= 1"));
    }
    if completion.watchdog_ms == 0 {
        return Err(BuildError::InvalidConfig("watchdog_ms must be >= 1"));
    }
    if completion.mode.uses_markers()
        && !completion.mode.uses_debounce()
        && protocol.end_markers.is_empty()
        && protocol.stop_markers.is_empty()
    {
        return Err(BuildError::InvalidConfig(
            "marker-only completion needs at least one marker",
        ));
    }
    if session.poll_ms == 0 {
        return Err(BuildError::InvalidConfig("poll_ms must be >= 1"));
    }
    if session.queue_capacity == 0 {
        return Err(BuildError::InvalidConfig("queue_capacity must be >= 1"));
    }
    Ok(())
}
