//! Acquisition state machine.
//!
//! [`AcquisitionController`] owns one device's acquisition lifecycle:
//!
//! ```text
//!          arm()            trigger()
//!   Idle ────────▶ Armed ────────────▶ Triggered
//!    ▲               │                     │
//!    │  stop()/abort()                     │ busy=false observed,
//!    └───────────────┴─────────────────────┘ stop() or abort()
//! ```
//!
//! The controller is single-threaded and poll driven: nothing happens in the
//! background. Callers poll [`get_extended_status`] until `busy` is false,
//! or use [`wait_for_completion`] with an interval of their choosing. A
//! multi-threaded host must serialize calls to one controller itself.
//!
//! [`get_extended_status`]: AcquisitionController::get_extended_status
//! [`wait_for_completion`]: AcquisitionController::wait_for_completion

use crate::clock::{Clock, SystemClock};
use crate::error::{AcquisitionError, Result};
use crate::estimator;
use crate::frame::{Frame, FrameDims};
use crate::hardware::{FrameCorrector, Hardware, NativeStatus, Pulser};
use crate::normalize::{FrameNormalizer, FrameTransform};
use crate::pool::FrameSlotPool;
use crate::sequence::{FrameCount, SequenceSpec, ValidatedSpec};
use crate::trigger::{TriggerCoordinator, TriggerMode, TriggerPlan};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Default number of frame slots, matching a typical native buffer count.
pub const DEFAULT_POOL_CAPACITY: usize = 30;

/// Lifecycle state of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionState {
    Idle,
    Armed,
    Triggered,
}

impl fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Armed => "armed",
            Self::Triggered => "triggered",
        };
        f.write_str(label)
    }
}

/// Status returned by [`AcquisitionController::get_extended_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExtendedStatus {
    pub state: AcquisitionState,
    pub busy: bool,
    /// Session-relative number of the most recent frame, `-1` if none.
    pub last_frame_number: i64,
    /// Cumulative frame counter.
    pub total_num_frames: u64,
}

/// A frame returned by [`AcquisitionController::read_frame`].
#[derive(Debug, Clone, PartialEq)]
pub struct AcquiredFrame {
    /// Session-relative frame number.
    pub frame_number: u64,
    pub absolute_index: u64,
    pub frame: Frame,
    /// Metadata captured at arm time.
    pub metadata: Option<Value>,
}

/// Bookkeeping for one armed sequence. Replaced wholesale on every arm.
#[derive(Debug, Clone)]
pub struct AcquisitionSession {
    pub state: AcquisitionState,
    /// Clock reading at trigger time.
    pub start_instant: Option<Duration>,
    /// Cumulative frame counter snapshot taken at arm time.
    pub frames_completed_before_start: u64,
    pub spec: ValidatedSpec,
    pub trigger_plan: TriggerPlan,
    /// Number of pool slots reserved for this session.
    window: usize,
    /// Highest cumulative frame count observed so far.
    frames_seen: u64,
    last_frame_number: i64,
    /// Frozen once the session finishes.
    final_status: Option<ExtendedStatus>,
}

impl AcquisitionSession {
    /// Frames captured in this session, as last observed.
    pub fn frames_captured(&self) -> u64 {
        self.frames_seen - self.frames_completed_before_start
    }

    pub fn is_finished(&self) -> bool {
        self.final_status.is_some()
    }

    fn status(&self) -> ExtendedStatus {
        self.final_status.unwrap_or(ExtendedStatus {
            state: self.state,
            busy: self.state == AcquisitionState::Triggered,
            last_frame_number: self.last_frame_number,
            total_num_frames: self.frames_seen,
        })
    }

    /// Progress of the triggered session: the device's own report when it
    /// has one, otherwise an estimate from the time since trigger.
    fn progress(&self, native: Option<NativeStatus>, now: Duration) -> NativeStatus {
        native.unwrap_or_else(|| {
            let elapsed = self
                .start_instant
                .map_or(Duration::ZERO, |t0| now.saturating_sub(t0));
            let est =
                estimator::estimate(&self.spec, elapsed, self.frames_completed_before_start);
            NativeStatus {
                busy: est.busy,
                last_frame_number: est.last_frame_number,
                total_frames: est.frames_completed,
            }
        })
    }

    /// Fold `progress` into the session and mark the new frames captured.
    /// The cumulative counter never moves backwards.
    fn record(&mut self, progress: NativeStatus, pool: &mut FrameSlotPool) {
        if progress.total_frames < self.frames_seen {
            warn!(
                reported = progress.total_frames,
                previous = self.frames_seen,
                "Frame counter went backwards; holding previous value"
            );
        }
        let total = progress.total_frames.max(self.frames_seen);
        let capacity = pool.capacity() as u64;
        let first_new = self.frames_seen.max(total.saturating_sub(capacity));
        for index in first_new..total {
            pool.mark_captured(index);
        }
        pool.advance_head(total);
        self.frames_seen = total;
        self.last_frame_number = self.last_frame_number.max(progress.last_frame_number);
    }

    fn finish(&mut self) -> ExtendedStatus {
        self.state = AcquisitionState::Idle;
        let status = ExtendedStatus {
            state: AcquisitionState::Idle,
            busy: false,
            last_frame_number: self.last_frame_number,
            total_num_frames: self.frames_seen,
        };
        self.final_status = Some(status);
        status
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`AcquisitionController`].
pub struct AcquisitionControllerBuilder {
    hardware: Box<dyn Hardware>,
    pulser: Option<Box<dyn Pulser>>,
    clock: Arc<dyn Clock>,
    trigger_mode: TriggerMode,
    internal_trigger_threshold: Duration,
    pool_capacity: usize,
    frame_transform: FrameTransform,
    canonical_dims: Option<FrameDims>,
    min_interframe_gap: Option<Duration>,
}

impl AcquisitionControllerBuilder {
    pub fn pulser(mut self, pulser: Box<dyn Pulser>) -> Self {
        self.pulser = Some(pulser);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn trigger_mode(mut self, mode: TriggerMode) -> Self {
        self.trigger_mode = mode;
        self
    }

    /// Exposures at or above this are timed by the auxiliary pulser even if
    /// the hardware can trigger itself. Defaults to never.
    pub fn internal_trigger_threshold(mut self, threshold: Duration) -> Self {
        self.internal_trigger_threshold = threshold;
        self
    }

    pub fn pool_capacity(mut self, capacity: usize) -> Self {
        self.pool_capacity = capacity;
        self
    }

    pub fn frame_transform(mut self, transform: FrameTransform) -> Self {
        self.frame_transform = transform;
        self
    }

    pub fn canonical_dims(mut self, dims: FrameDims) -> Self {
        self.canonical_dims = Some(dims);
        self
    }

    pub fn min_interframe_gap(mut self, gap: Duration) -> Self {
        self.min_interframe_gap = Some(gap);
        self
    }

    pub fn build(self) -> AcquisitionController {
        AcquisitionController {
            hardware: self.hardware,
            pulser: self.pulser,
            clock: self.clock,
            trigger_mode: self.trigger_mode,
            internal_trigger_threshold: self.internal_trigger_threshold,
            min_interframe_gap: self.min_interframe_gap,
            pool: FrameSlotPool::new(self.pool_capacity),
            normalizer: FrameNormalizer::new(self.frame_transform, self.canonical_dims),
            session: None,
            frames_total: 0,
        }
    }
}

// =============================================================================
// Controller
// =============================================================================

/// Device-independent acquisition lifecycle for one device.
pub struct AcquisitionController {
    hardware: Box<dyn Hardware>,
    pulser: Option<Box<dyn Pulser>>,
    clock: Arc<dyn Clock>,
    trigger_mode: TriggerMode,
    internal_trigger_threshold: Duration,
    min_interframe_gap: Option<Duration>,
    pool: FrameSlotPool,
    normalizer: FrameNormalizer,
    session: Option<AcquisitionSession>,
    /// Cumulative frame counter across sessions.
    frames_total: u64,
}

impl fmt::Debug for AcquisitionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcquisitionController")
            .field("hardware", &self.hardware.name())
            .field("pulser", &self.pulser.as_ref().map(|p| p.name().to_string()))
            .field("trigger_mode", &self.trigger_mode)
            .field("state", &self.state())
            .field("frames_total", &self.frames_total)
            .finish()
    }
}

impl AcquisitionController {
    pub fn builder(hardware: Box<dyn Hardware>) -> AcquisitionControllerBuilder {
        AcquisitionControllerBuilder {
            hardware,
            pulser: None,
            clock: Arc::new(SystemClock::new()),
            trigger_mode: TriggerMode::Internal,
            internal_trigger_threshold: Duration::MAX,
            pool_capacity: DEFAULT_POOL_CAPACITY,
            frame_transform: FrameTransform::identity(),
            canonical_dims: None,
            min_interframe_gap: None,
        }
    }

    pub fn state(&self) -> AcquisitionState {
        self.session
            .as_ref()
            .map_or(AcquisitionState::Idle, |s| s.state)
    }

    pub fn session(&self) -> Option<&AcquisitionSession> {
        self.session.as_ref()
    }

    pub fn pool(&self) -> &FrameSlotPool {
        &self.pool
    }

    pub fn trigger_mode(&self) -> TriggerMode {
        self.trigger_mode
    }

    pub fn set_trigger_mode(&mut self, mode: TriggerMode) {
        self.trigger_mode = mode;
    }

    pub fn hardware_name(&self) -> &str {
        self.hardware.name()
    }

    /// Arm for `spec` without arm-time metadata.
    pub fn arm(&mut self, spec: SequenceSpec) -> Result<()> {
        self.arm_inner(spec, None)
    }

    /// Arm for `spec`, correlating `metadata` (e.g. motor positions) with
    /// every frame of the session.
    pub fn arm_with_metadata(&mut self, spec: SequenceSpec, metadata: Value) -> Result<()> {
        self.arm_inner(spec, Some(metadata))
    }

    #[instrument(skip_all, fields(device = %self.hardware.name(), kind = %spec.kind))]
    fn arm_inner(&mut self, spec: SequenceSpec, metadata: Option<Value>) -> Result<()> {
        let state = self.state();
        if state == AcquisitionState::Armed {
            return Err(AcquisitionError::InvalidStateTransition {
                state,
                operation: "arm",
            });
        }

        let mut validated = spec.validate()?;
        if let Some(gap) = self.min_interframe_gap {
            validated = validated.with_min_interframe_gap(gap);
        }
        let coordinator =
            TriggerCoordinator::new(self.internal_trigger_threshold, self.pulser.is_some());
        let plan = coordinator.plan(
            &validated,
            self.trigger_mode,
            self.hardware.supports_internal_trigger(validated.kind()),
        )?;

        if state == AcquisitionState::Triggered {
            debug!("Aborting running acquisition before re-arm");
            self.abort()?;
        }

        let before = match self
            .hardware
            .native_status()
            .map_err(AcquisitionError::Hardware)?
        {
            Some(native) => native.total_frames.max(self.frames_total),
            None => self.frames_total,
        };

        let (hw_spec, hw_mode) = plan.hardware_setup(&validated, self.trigger_mode);
        self.hardware
            .prepare(&hw_spec, hw_mode)
            .map_err(AcquisitionError::Hardware)?;

        let window = match validated.num_frames() {
            FrameCount::Finite(n) => usize::try_from(n).unwrap_or(usize::MAX),
            FrameCount::Indeterminate => self.pool.capacity(),
        }
        .min(self.pool.capacity());
        self.pool.advance_head(before);
        self.pool.reset_window(before, window, metadata);
        self.frames_total = before;

        info!(
            frames = %validated.num_frames(),
            use_pulser = plan.use_auxiliary_pulser,
            frames_before = before,
            "Armed"
        );
        self.session = Some(AcquisitionSession {
            state: AcquisitionState::Armed,
            start_instant: None,
            frames_completed_before_start: before,
            spec: validated,
            trigger_plan: plan,
            window,
            frames_seen: before,
            last_frame_number: -1,
            final_status: None,
        });
        Ok(())
    }

    /// Start the armed sequence.
    #[instrument(skip(self), fields(device = %self.hardware.name()))]
    pub fn trigger(&mut self) -> Result<()> {
        let session = match self.session.as_mut() {
            Some(s) if s.state == AcquisitionState::Armed => s,
            Some(s) if s.state == AcquisitionState::Triggered => {
                return Err(AcquisitionError::InvalidStateTransition {
                    state: s.state,
                    operation: "trigger",
                })
            }
            _ => return Err(AcquisitionError::NotArmed),
        };

        if let Some(config) = session.trigger_plan.pulse_config() {
            let pulser = self
                .pulser
                .as_mut()
                .ok_or(AcquisitionError::NoAuxiliaryPulser)?;
            debug!(
                width_s = config.width.as_secs_f64(),
                period_s = config.period.as_secs_f64(),
                count = config.count,
                "Configuring auxiliary pulser"
            );
            pulser.configure(&config).map_err(AcquisitionError::Pulser)?;
            pulser.start().map_err(AcquisitionError::Pulser)?;
        } else {
            self.hardware
                .native_trigger()
                .map_err(AcquisitionError::Hardware)?;
        }

        session.start_instant = Some(self.clock.now());
        session.state = AcquisitionState::Triggered;
        info!(kind = %session.spec.kind(), "Triggered");
        Ok(())
    }

    /// Stop the running sequence after the frame in progress.
    ///
    /// Progress is sampled once more before the devices are stopped, so the
    /// cumulative counter includes frames completed since the last poll.
    ///
    /// Idempotent. On a collaborator failure the state is left unchanged.
    #[instrument(skip(self), fields(device = %self.hardware.name()))]
    pub fn stop(&mut self) -> Result<()> {
        let state = self.state();
        if state == AcquisitionState::Idle {
            return Ok(());
        }

        if state == AcquisitionState::Triggered {
            let native = self
                .hardware
                .native_status()
                .map_err(AcquisitionError::Hardware)?;
            self.sample_progress(native);
        }

        if let Some(session) = self.session.as_ref() {
            if session.trigger_plan.use_auxiliary_pulser {
                if let Some(pulser) = self.pulser.as_mut() {
                    if pulser.is_busy().map_err(AcquisitionError::Pulser)? {
                        pulser.stop().map_err(AcquisitionError::Pulser)?;
                    }
                }
            }
        }
        self.hardware
            .native_stop()
            .map_err(AcquisitionError::Hardware)?;

        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        let status = session.finish();
        info!(
            last_frame_number = status.last_frame_number,
            total = status.total_num_frames,
            "Stopped"
        );
        Ok(())
    }

    /// Abandon the current session.
    ///
    /// A triggered session gets a last progress sample first. Unsaved frames
    /// of the session are then dropped from the pool, including frames past
    /// the arm-time window. Bookkeeping is always reset; the first
    /// collaborator failure, if any, is reported afterwards.
    #[instrument(skip(self), fields(device = %self.hardware.name()))]
    pub fn abort(&mut self) -> Result<()> {
        let mut first_error: Option<AcquisitionError> = None;

        if self.state() == AcquisitionState::Triggered {
            match self.hardware.native_status() {
                Ok(native) => self.sample_progress(native),
                Err(e) => {
                    warn!(error = %e, "Final status read failed during abort");
                    first_error.get_or_insert(AcquisitionError::Hardware(e));
                }
            }
        }

        if let Some(session) = self.session.take() {
            if session.trigger_plan.use_auxiliary_pulser {
                if let Some(pulser) = self.pulser.as_mut() {
                    if let Err(e) = pulser.stop() {
                        warn!(error = %e, "Pulser stop failed during abort");
                        first_error.get_or_insert(AcquisitionError::Pulser(e));
                    }
                }
            }
            let start = session.frames_completed_before_start;
            let reserved = start.saturating_add(session.window as u64);
            self.pool.discard(start..session.frames_seen.max(reserved));
            self.frames_total = self.frames_total.max(session.frames_seen);
        }

        if let Err(e) = self.hardware.native_abort() {
            warn!(error = %e, "Hardware abort failed");
            first_error.get_or_insert(AcquisitionError::Hardware(e));
        }

        info!("Aborted");
        first_error.map_or(Ok(()), Err)
    }

    /// Fold one progress reading into the triggered session.
    fn sample_progress(&mut self, native: Option<NativeStatus>) {
        let now = self.clock.now();
        if let Some(session) = self.session.as_mut() {
            let progress = session.progress(native, now);
            session.record(progress, &mut self.pool);
            self.frames_total = self.frames_total.max(session.frames_seen);
        }
    }

    /// Current status. Valid in every state.
    ///
    /// While triggered, progress comes from the device when it can report it
    /// and from elapsed time otherwise. The first poll that observes
    /// `busy == false` finishes the session; later polls return the same
    /// final status.
    pub fn get_extended_status(&mut self) -> Result<ExtendedStatus> {
        let Some(session) = self.session.as_mut() else {
            return Ok(ExtendedStatus {
                state: AcquisitionState::Idle,
                busy: false,
                last_frame_number: -1,
                total_num_frames: self.frames_total,
            });
        };
        if let Some(status) = session.final_status {
            return Ok(status);
        }

        let native = self
            .hardware
            .native_status()
            .map_err(AcquisitionError::Hardware)?;

        if session.state == AcquisitionState::Armed {
            let native = native.unwrap_or(NativeStatus {
                busy: false,
                last_frame_number: -1,
                total_frames: session.frames_completed_before_start,
            });
            return Ok(ExtendedStatus {
                state: AcquisitionState::Armed,
                busy: native.busy,
                last_frame_number: native.last_frame_number,
                total_num_frames: native.total_frames,
            });
        }

        let progress = session.progress(native, self.clock.now());
        session.record(progress, &mut self.pool);
        self.frames_total = self.frames_total.max(session.frames_seen);

        if !progress.busy {
            let status = session.finish();
            info!(
                device = %self.hardware.name(),
                last_frame_number = status.last_frame_number,
                total = status.total_num_frames,
                "Acquisition complete"
            );
            return Ok(status);
        }
        Ok(session.status())
    }

    /// Poll until the session is no longer busy.
    ///
    /// Sleeps `poll_interval` between polls using the controller's clock.
    pub fn wait_for_completion(
        &mut self,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<ExtendedStatus> {
        let started = self.clock.now();
        loop {
            let status = self.get_extended_status()?;
            if !status.busy {
                return Ok(status);
            }
            if self.clock.now().saturating_sub(started) >= timeout {
                return Err(AcquisitionError::WaitTimeout(timeout));
            }
            self.clock.sleep(poll_interval);
        }
    }

    /// Read and normalize session-relative frame `n`.
    ///
    /// Readiness is judged from the most recent status poll. Frames remain
    /// readable after the session finishes, until the next arm.
    pub fn read_frame(&mut self, n: u64) -> Result<AcquiredFrame> {
        let session = self.session.as_ref().ok_or(AcquisitionError::NotArmed)?;
        let captured = session.frames_captured();
        if n >= captured {
            return Err(AcquisitionError::FrameNotReady {
                requested: n,
                last_available: i64::try_from(captured).unwrap_or(i64::MAX) - 1,
            });
        }
        let absolute_index = session.frames_completed_before_start + n;
        let metadata = self.pool.resolve(absolute_index)?.correlated_metadata.clone();

        let raw = self
            .hardware
            .read_raw_frame(absolute_index)
            .map_err(AcquisitionError::Hardware)?;
        let frame = self.normalizer.normalize(&raw)?;
        debug!(n, absolute_index, width = frame.width, height = frame.height, "Frame read");

        Ok(AcquiredFrame {
            frame_number: n,
            absolute_index,
            frame,
            metadata,
        })
    }

    /// [`read_frame`](Self::read_frame) followed by the correction pipeline.
    pub fn read_corrected_frame(
        &mut self,
        n: u64,
        corrector: &mut dyn FrameCorrector,
    ) -> Result<AcquiredFrame> {
        let mut acquired = self.read_frame(n)?;
        acquired.frame = corrector.correct(acquired.frame)?;
        Ok(acquired)
    }

    /// Record that session-relative frame `n` has been consumed. Idempotent.
    ///
    /// Like [`read_frame`](Self::read_frame), only frames the last status
    /// poll reported as captured qualify.
    pub fn mark_frame_saved(&mut self, n: u64) -> Result<()> {
        let session = self.session.as_ref().ok_or(AcquisitionError::NotArmed)?;
        let captured = session.frames_captured();
        if n >= captured {
            return Err(AcquisitionError::FrameNotReady {
                requested: n,
                last_available: i64::try_from(captured).unwrap_or(i64::MAX) - 1,
            });
        }
        let absolute_index = session.frames_completed_before_start + n;
        self.pool.mark_saved(absolute_index)
    }
}
