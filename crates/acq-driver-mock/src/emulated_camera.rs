//! Software-emulated area detector.
//!
//! The camera keeps no background thread. Progress is a function of the shared
//! clock: in internal-trigger mode frames complete one frame period apart from
//! the native trigger, in external-trigger mode one frame completes per pulse
//! seen on the attached [`TriggerLine`].

use crate::common::{CallLog, CommandGate, ErrorConfig, MockMode, TimingConfig, TriggerLine};
use crate::pattern::generate_test_pattern;
use acq_core::estimator::estimate;
use acq_core::{
    Clock, Frame, FrameCount, FrameDims, Hardware, HwError, HwErrorKind, NativeStatus,
    SequenceKind, SystemClock, TriggerMode, ValidatedSpec,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

// =============================================================================
// EmulatedCameraBuilder
// =============================================================================

/// Builder for [`EmulatedCamera`].
pub struct EmulatedCameraBuilder {
    name: String,
    raw_dims: FrameDims,
    bit_depth: u32,
    native_buffers: u64,
    internal_kinds: Vec<SequenceKind>,
    reports_native_status: bool,
    mode: MockMode,
    error_config: ErrorConfig,
    timing: TimingConfig,
    clock: Arc<dyn Clock>,
    trigger_line: Option<TriggerLine>,
    call_log: CallLog,
}

impl EmulatedCameraBuilder {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            name: "emulated_camera".to_string(),
            raw_dims: FrameDims::new(width, height),
            bit_depth: 16,
            native_buffers: 16,
            internal_kinds: vec![
                SequenceKind::OneShot,
                SequenceKind::Continuous,
                SequenceKind::Multiframe,
                SequenceKind::Strobe,
            ],
            reports_native_status: false,
            mode: MockMode::Instant,
            error_config: ErrorConfig::none(),
            timing: TimingConfig::default(),
            clock: Arc::new(SystemClock::new()),
            trigger_line: None,
            call_log: CallLog::new(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn bit_depth(mut self, bit_depth: u32) -> Self {
        self.bit_depth = bit_depth;
        self
    }

    /// Size of the on-board circular frame buffer.
    pub fn native_buffers(mut self, count: u64) -> Self {
        self.native_buffers = count.max(1);
        self
    }

    /// The camera can only capture on an external trigger.
    pub fn external_trigger_only(mut self) -> Self {
        self.internal_kinds.clear();
        self
    }

    pub fn internal_trigger_kinds(mut self, kinds: Vec<SequenceKind>) -> Self {
        self.internal_kinds = kinds;
        self
    }

    /// Report progress through `native_status` instead of leaving it to the
    /// controller's estimate.
    pub fn native_status(mut self, enabled: bool) -> Self {
        self.reports_native_status = enabled;
        self
    }

    pub fn mode(mut self, mode: MockMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn error_config(mut self, config: ErrorConfig) -> Self {
        self.error_config = config;
        self
    }

    pub fn timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Attach the trigger input to `line`.
    pub fn trigger_line(mut self, line: TriggerLine) -> Self {
        self.trigger_line = Some(line);
        self
    }

    pub fn call_log(mut self, log: CallLog) -> Self {
        self.call_log = log;
        self
    }

    pub fn build(self) -> EmulatedCamera {
        let gate = CommandGate::new(self.timing.min_command_interval, self.clock.clone());
        EmulatedCamera {
            name: self.name,
            raw_dims: self.raw_dims,
            bit_depth: self.bit_depth,
            native_buffers: self.native_buffers,
            internal_kinds: self.internal_kinds,
            reports_native_status: self.reports_native_status,
            mode: self.mode,
            error_config: self.error_config,
            timing: self.timing,
            clock: self.clock,
            trigger_line: self.trigger_line,
            call_log: self.call_log,
            gate,
            session: None,
            frames_before: 0,
        }
    }
}

// =============================================================================
// EmulatedCamera
// =============================================================================

#[derive(Debug, Clone)]
struct CameraSession {
    spec: ValidatedSpec,
    trigger_mode: TriggerMode,
    started_at: Option<Duration>,
    halted_at: Option<Duration>,
}

/// Emulated area detector implementing [`Hardware`].
///
/// # Example
///
/// ```rust,ignore
/// let camera = EmulatedCamera::builder(640, 480)
///     .bit_depth(12)
///     .native_status(true)
///     .build();
/// let controller = AcquisitionController::builder(Box::new(camera)).build();
/// ```
pub struct EmulatedCamera {
    name: String,
    raw_dims: FrameDims,
    bit_depth: u32,
    native_buffers: u64,
    internal_kinds: Vec<SequenceKind>,
    reports_native_status: bool,
    mode: MockMode,
    error_config: ErrorConfig,
    timing: TimingConfig,
    clock: Arc<dyn Clock>,
    trigger_line: Option<TriggerLine>,
    call_log: CallLog,
    gate: CommandGate,
    session: Option<CameraSession>,
    /// Frames produced by earlier sessions.
    frames_before: u64,
}

impl EmulatedCamera {
    pub fn builder(width: u32, height: u32) -> EmulatedCameraBuilder {
        EmulatedCameraBuilder::new(width, height)
    }

    pub fn raw_dims(&self) -> FrameDims {
        self.raw_dims
    }

    /// Cumulative frames produced so far.
    pub fn total_frames(&self) -> u64 {
        self.frames_before + self.progress().2
    }

    /// Pacing, fault injection and call recording shared by every command.
    fn command(&mut self, operation: &'static str) -> Result<(), HwError> {
        if self.mode.paces_commands() {
            self.gate.wait();
        }
        self.call_log.record(format!("{}: {}", self.name, operation));
        if self.mode.injects_faults() {
            self.error_config.check(&self.name, operation)?;
        }
        Ok(())
    }

    /// Capture start: native trigger time, or the first edge on the line.
    fn capture_start(&self, session: &CameraSession) -> Option<Duration> {
        match session.trigger_mode {
            TriggerMode::Internal => session.started_at,
            TriggerMode::External => self.trigger_line.as_ref().and_then(TriggerLine::fired_at),
        }
    }

    /// `(busy, last_frame_number, frames_in_session)` at the current time.
    fn progress(&self) -> (bool, i64, u64) {
        let Some(session) = &self.session else {
            return (false, -1, 0);
        };
        let Some(start) = self.capture_start(session) else {
            return (session.halted_at.is_none(), -1, 0);
        };
        let now = session.halted_at.unwrap_or_else(|| self.clock.now());

        let (busy, done) = match (session.spec.frame_period(), &self.trigger_line) {
            (Some(_), _) => {
                let est = estimate(&session.spec, now.saturating_sub(start), 0);
                (est.busy, est.frames_completed)
            }
            (None, Some(line)) => {
                let pulses = line.pulses_completed(now);
                let busy = match session.spec.num_frames() {
                    FrameCount::Finite(n) => pulses < n,
                    FrameCount::Indeterminate => true,
                };
                (busy, pulses)
            }
            (None, None) => (true, 0),
        };
        let busy = busy && session.halted_at.is_none();
        (busy, i64::try_from(done).unwrap_or(i64::MAX) - 1, done)
    }

    fn halt(&mut self) {
        let now = self.clock.now();
        if let Some(session) = self.session.as_mut() {
            session.halted_at.get_or_insert(now);
        }
    }
}

impl Hardware for EmulatedCamera {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, spec), fields(camera = %self.name, kind = %spec.kind()))]
    fn prepare(&mut self, spec: &ValidatedSpec, trigger_mode: TriggerMode) -> Result<(), HwError> {
        self.command("prepare")?;
        if trigger_mode == TriggerMode::Internal && !self.supports_internal_trigger(spec.kind()) {
            return Err(HwError::new(
                &self.name,
                HwErrorKind::Configuration,
                format!("'{}' sequences need an external trigger", spec.kind()),
            ));
        }
        self.frames_before = self.total_frames();
        if trigger_mode == TriggerMode::External {
            // Edges from an earlier train belong to the earlier session.
            if let Some(line) = &self.trigger_line {
                line.clear();
            }
        }
        self.session = Some(CameraSession {
            spec: spec.clone(),
            trigger_mode,
            started_at: None,
            halted_at: None,
        });
        debug!(?trigger_mode, frames_before = self.frames_before, "Camera prepared");
        Ok(())
    }

    fn native_trigger(&mut self) -> Result<(), HwError> {
        self.command("trigger")?;
        let now = self.clock.now();
        let session = self.session.as_mut().ok_or_else(|| {
            HwError::new(&self.name, HwErrorKind::Configuration, "Trigger before prepare")
        })?;
        if session.trigger_mode == TriggerMode::External {
            return Err(HwError::new(
                &self.name,
                HwErrorKind::Configuration,
                "Software trigger ignored in external-trigger mode",
            ));
        }
        session.started_at = Some(now);
        Ok(())
    }

    fn native_stop(&mut self) -> Result<(), HwError> {
        self.command("stop")?;
        self.halt();
        Ok(())
    }

    fn native_abort(&mut self) -> Result<(), HwError> {
        self.command("abort")?;
        self.halt();
        Ok(())
    }

    fn native_status(&mut self) -> Result<Option<NativeStatus>, HwError> {
        if !self.reports_native_status {
            return Ok(None);
        }
        self.command("status")?;
        let (busy, last_frame_number, done) = self.progress();
        Ok(Some(NativeStatus {
            busy,
            last_frame_number,
            total_frames: self.frames_before + done,
        }))
    }

    fn read_raw_frame(&mut self, absolute_index: u64) -> Result<Frame, HwError> {
        self.command("read_raw_frame")?;
        let produced = self.total_frames();
        if absolute_index >= produced || produced - absolute_index > self.native_buffers {
            return Err(HwError::new(
                &self.name,
                HwErrorKind::Hardware,
                format!(
                    "Frame {absolute_index} not in buffer (produced {produced}, {} slots)",
                    self.native_buffers
                ),
            ));
        }
        if self.mode.paces_commands() && !self.timing.frame_readout.is_zero() {
            self.clock.sleep(self.timing.frame_readout);
        }
        generate_test_pattern(self.raw_dims, self.bit_depth, absolute_index)
            .map_err(|e| HwError::new(&self.name, HwErrorKind::Configuration, e.to_string()))
    }

    fn supports_internal_trigger(&self, kind: SequenceKind) -> bool {
        self.internal_kinds.contains(&kind)
    }
}
