//! Software-emulated digital delay / pulse generator.

use crate::common::{CallLog, CommandGate, ErrorConfig, MockMode, MockRng, TimingConfig, TriggerLine};
use acq_core::{Clock, HwError, HwErrorKind, PulseConfig, Pulser, PulserError, SystemClock};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Emulated pulse generator implementing [`Pulser`].
///
/// `start` puts the configured train on the attached [`TriggerLine`] at the
/// current clock reading, plus a random start latency of up to
/// `start_jitter` in realistic and chaos modes.
pub struct EmulatedPulser {
    name: String,
    mode: MockMode,
    error_config: ErrorConfig,
    clock: Arc<dyn Clock>,
    gate: CommandGate,
    line: TriggerLine,
    call_log: CallLog,
    rng: MockRng,
    start_jitter: Duration,
    config: Option<PulseConfig>,
}

impl EmulatedPulser {
    pub fn new(line: TriggerLine) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
        Self {
            name: "emulated_pulser".to_string(),
            mode: MockMode::Instant,
            error_config: ErrorConfig::none(),
            gate: CommandGate::new(Duration::ZERO, clock.clone()),
            clock,
            line,
            call_log: CallLog::new(),
            rng: MockRng::new(Some(0)),
            start_jitter: Duration::ZERO,
            config: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_mode(mut self, mode: MockMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_errors(mut self, config: ErrorConfig) -> Self {
        self.error_config = config;
        self
    }

    /// Use `clock` for timing. Resets the command gate.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.gate = CommandGate::new(self.gate.min_interval(), clock.clone());
        self.clock = clock;
        self
    }

    pub fn with_timing(mut self, timing: TimingConfig) -> Self {
        self.gate = CommandGate::new(timing.min_command_interval, self.clock.clone());
        self
    }

    pub fn with_call_log(mut self, log: CallLog) -> Self {
        self.call_log = log;
        self
    }

    /// Upper bound of the start latency, with a seed for reproducible runs.
    pub fn with_start_jitter(mut self, amplitude: Duration, seed: u64) -> Self {
        self.start_jitter = amplitude;
        self.rng = MockRng::new(Some(seed));
        self
    }

    /// Currently configured train.
    pub fn config(&self) -> Option<PulseConfig> {
        self.config
    }

    fn command(&mut self, operation: &'static str) -> Result<(), PulserError> {
        if self.mode.paces_commands() {
            self.gate.wait();
        }
        self.call_log.record(format!("{}: {}", self.name, operation));
        if self.mode.injects_faults() {
            self.error_config.check(&self.name, operation)?;
        }
        Ok(())
    }

    fn start_latency(&self) -> Duration {
        if !self.mode.paces_commands() || self.start_jitter.is_zero() {
            return Duration::ZERO;
        }
        let amplitude = u32::try_from(self.start_jitter.as_micros()).unwrap_or(u32::MAX);
        Duration::from_micros(self.rng.jitter(amplitude).unsigned_abs())
    }
}

impl Pulser for EmulatedPulser {
    fn name(&self) -> &str {
        &self.name
    }

    fn configure(&mut self, config: &PulseConfig) -> Result<(), PulserError> {
        self.command("configure")?;
        if config.width.is_zero() || config.width > config.period {
            return Err(HwError::new(
                &self.name,
                HwErrorKind::Configuration,
                format!(
                    "Pulse width {:?} must be positive and no longer than period {:?}",
                    config.width, config.period
                ),
            ));
        }
        debug!(
            pulser = %self.name,
            width_us = config.width.as_micros() as u64,
            period_us = config.period.as_micros() as u64,
            count = config.count,
            "Pulse train configured"
        );
        self.config = Some(*config);
        Ok(())
    }

    fn start(&mut self) -> Result<(), PulserError> {
        self.command("start")?;
        let config = self.config.ok_or_else(|| {
            HwError::new(&self.name, HwErrorKind::Configuration, "Start before configure")
        })?;
        let at = self.clock.now() + self.start_latency();
        self.line.fire(config, at);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), PulserError> {
        self.command("stop")?;
        let now = self.clock.now();
        if !self.line.is_active(now) {
            warn!(pulser = %self.name, "Stop requested with no train running");
        }
        self.line.cease(now);
        Ok(())
    }

    fn is_busy(&mut self) -> Result<bool, PulserError> {
        self.command("is_busy")?;
        Ok(self.line.is_active(self.clock.now()))
    }
}
