//! Trigger planning.
//!
//! Some detectors only ever capture on an external trigger input. To offer
//! "internal" triggering on such hardware, an auxiliary pulse generator is
//! wired to the trigger input and programmed to emit the pulse train the
//! sequence needs. This module decides, once per arm, whether to do that and
//! with what timing.
//!
//! # Pulse timing
//!
//! ```text
//!   width        period
//!  ┌──────┐     ┌──────┐     ┌──────┐
//!  │      │     │      │     │      │
//! ─┘      └─────┘      └─────┘      └───
//!  ←──────────→
//! ```
//!
//! Single-frame style pulses use a period just above the width (factor 1.001)
//! so the generator never merges consecutive pulses.

use crate::error::{AcquisitionError, SequenceError};
use crate::sequence::{SequenceKind, ValidatedSpec};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Requested trigger source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerMode {
    /// Capture starts when the controller says so.
    #[default]
    Internal,
    /// Capture starts on an external signal; the controller only arms.
    External,
}

/// Settings pushed to an auxiliary pulser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseConfig {
    pub width: Duration,
    pub period: Duration,
    pub count: u32,
}

impl PulseConfig {
    /// Time from the first rising edge until the train has finished.
    pub fn train_duration(&self) -> Duration {
        match self.count {
            0 => Duration::ZERO,
            n => self.period.saturating_mul(n - 1).saturating_add(self.width),
        }
    }
}

/// Outcome of trigger planning. Computed once per arm, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TriggerPlan {
    pub use_auxiliary_pulser: bool,
    pub pulse_width: Duration,
    pub pulse_period: Duration,
    pub pulse_count: u32,
}

impl TriggerPlan {
    /// Plan that passes the trigger straight to the hardware.
    pub fn direct() -> Self {
        Self::default()
    }

    /// Pulser settings, when the plan uses the pulser.
    pub fn pulse_config(&self) -> Option<PulseConfig> {
        self.use_auxiliary_pulser.then(|| PulseConfig {
            width: self.pulse_width,
            period: self.pulse_period,
            count: self.pulse_count,
        })
    }

    /// Sequence and trigger mode the hardware itself must be prepared with.
    ///
    /// With the pulser in charge the hardware waits for external pulses, and
    /// the pulse width sets each exposure. Gated sequences keep their own
    /// layout because the single long pulse is the gate.
    pub fn hardware_setup(
        &self,
        spec: &ValidatedSpec,
        requested: TriggerMode,
    ) -> (ValidatedSpec, TriggerMode) {
        if !self.use_auxiliary_pulser {
            return (spec.clone(), requested);
        }
        let hw_spec = match (spec.kind(), spec.num_frames().finite()) {
            (SequenceKind::Gated, _) | (_, None) => spec.clone(),
            (_, Some(count)) => ValidatedSpec::pulse_driven(count),
        };
        (hw_spec, TriggerMode::External)
    }
}

/// Decides between native and pulser-synthesized triggering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerCoordinator {
    internal_threshold: Duration,
    pulser_available: bool,
}

impl TriggerCoordinator {
    pub fn new(internal_threshold: Duration, pulser_available: bool) -> Self {
        Self {
            internal_threshold,
            pulser_available,
        }
    }

    pub fn internal_threshold(&self) -> Duration {
        self.internal_threshold
    }

    pub fn pulser_available(&self) -> bool {
        self.pulser_available
    }

    pub fn plan(
        &self,
        spec: &ValidatedSpec,
        requested: TriggerMode,
        hw_can_internal_trigger: bool,
    ) -> Result<TriggerPlan, AcquisitionError> {
        plan(
            spec,
            requested,
            hw_can_internal_trigger,
            self.pulser_available,
            self.internal_threshold,
        )
    }
}

/// Compute the trigger plan for `spec`.
///
/// The pulser is used when internal triggering is requested, a pulser is
/// available, and either the hardware cannot trigger itself or the exposure
/// reaches `internal_threshold`.
///
/// A sequence without a finite, timed pulse train (continuous, duration)
/// stays on the hardware's own trigger when the hardware can trigger itself.
///
/// # Errors
///
/// `UnsupportedForAuxiliaryTrigger` when such a sequence targets hardware
/// that only accepts external triggers.
pub fn plan(
    spec: &ValidatedSpec,
    requested: TriggerMode,
    hw_can_internal_trigger: bool,
    aux_pulser_available: bool,
    internal_threshold: Duration,
) -> Result<TriggerPlan, AcquisitionError> {
    if requested == TriggerMode::External {
        return Ok(TriggerPlan::direct());
    }

    let exposure = spec.exposure_time_of(0);
    let long_exposure = exposure.is_some_and(|e| e >= internal_threshold);
    let wants_pulser = !hw_can_internal_trigger || long_exposure;

    if !wants_pulser {
        return Ok(TriggerPlan::direct());
    }
    if !aux_pulser_available {
        if !hw_can_internal_trigger {
            warn!(
                kind = %spec.kind(),
                "Hardware cannot trigger internally and no pulser is attached; passing trigger to hardware"
            );
        }
        return Ok(TriggerPlan::direct());
    }

    let Some((width, period, pulses)) = pulse_train(spec)? else {
        if hw_can_internal_trigger {
            debug!(
                kind = %spec.kind(),
                "Sequence has no finite pulse train; hardware triggers itself"
            );
            return Ok(TriggerPlan::direct());
        }
        return Err(AcquisitionError::UnsupportedForAuxiliaryTrigger { kind: spec.kind() });
    };

    let plan = TriggerPlan {
        use_auxiliary_pulser: true,
        pulse_width: width,
        pulse_period: period,
        pulse_count: pulses,
    };
    debug!(
        kind = %spec.kind(),
        width_s = width.as_secs_f64(),
        period_s = period.as_secs_f64(),
        count = pulses,
        "Using auxiliary pulser for internal trigger"
    );
    Ok(plan)
}

/// Width, period and pulse count for `spec`, or `None` when the sequence
/// has no finite, timed train.
fn pulse_train(
    spec: &ValidatedSpec,
) -> Result<Option<(Duration, Duration, u32)>, AcquisitionError> {
    let (Some(exposure), Some(period), Some(count)) = (
        spec.exposure_time_of(0),
        spec.frame_period(),
        spec.num_frames().finite(),
    ) else {
        return Ok(None);
    };
    let Ok(count) = u32::try_from(count) else {
        return Ok(None);
    };

    let train = match spec.kind() {
        SequenceKind::OneShot | SequenceKind::Strobe => (exposure, stretched(exposure)?, count),
        SequenceKind::Multiframe => (exposure, period, count),
        SequenceKind::Gated => {
            let width = period.checked_mul(count).ok_or_else(|| out_of_range(spec))?;
            (width, stretched(width)?, 1)
        }
        SequenceKind::Continuous | SequenceKind::Duration => return Ok(None),
    };
    Ok(Some(train))
}

/// `d × 1.001`, in exact integer arithmetic.
fn stretched(d: Duration) -> Result<Duration, AcquisitionError> {
    d.checked_add(d / 1000).ok_or(AcquisitionError::Validation(
        SequenceError::ParameterOutOfRange {
            index: 0,
            value: d.as_secs_f64(),
        },
    ))
}

fn out_of_range(spec: &ValidatedSpec) -> AcquisitionError {
    AcquisitionError::Validation(SequenceError::ParameterOutOfRange {
        index: 0,
        value: spec.parameters()[0],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::{FrameCount, SequenceSpec};

    const THRESHOLD: Duration = Duration::from_millis(50);

    fn validated(spec: SequenceSpec) -> ValidatedSpec {
        spec.validate().unwrap()
    }

    #[test]
    fn test_multiframe_on_external_only_hardware() {
        let spec = validated(SequenceSpec::multiframe(4, 0.1, 0.2));
        let plan = plan(&spec, TriggerMode::Internal, false, true, THRESHOLD).unwrap();
        assert!(plan.use_auxiliary_pulser);
        assert_eq!(plan.pulse_count, 4);
        assert_eq!(plan.pulse_period, Duration::from_millis(200));
        assert_eq!(plan.pulse_width, Duration::from_millis(100));
    }

    #[test]
    fn test_external_mode_never_uses_pulser() {
        let spec = validated(SequenceSpec::multiframe(4, 0.1, 0.2));
        let plan = plan(&spec, TriggerMode::External, false, true, THRESHOLD).unwrap();
        assert_eq!(plan, TriggerPlan::direct());
        assert!(plan.pulse_config().is_none());
    }

    #[test]
    fn test_short_exposure_on_capable_hardware_is_direct() {
        let spec = validated(SequenceSpec::one_shot(0.01));
        let plan = plan(&spec, TriggerMode::Internal, true, true, THRESHOLD).unwrap();
        assert!(!plan.use_auxiliary_pulser);
    }

    #[test]
    fn test_long_exposure_uses_pulser_even_on_capable_hardware() {
        let spec = validated(SequenceSpec::one_shot(2.0));
        let plan = plan(&spec, TriggerMode::Internal, true, true, THRESHOLD).unwrap();
        assert!(plan.use_auxiliary_pulser);
        assert_eq!(plan.pulse_count, 1);
        assert_eq!(plan.pulse_width, Duration::from_secs(2));
        assert_eq!(plan.pulse_period, Duration::from_millis(2002));
    }

    #[test]
    fn test_gated_is_one_long_pulse() {
        let spec = validated(SequenceSpec::gated(5, 0.1, 0.2));
        let plan = plan(&spec, TriggerMode::Internal, false, true, THRESHOLD).unwrap();
        assert_eq!(plan.pulse_count, 1);
        assert_eq!(plan.pulse_width, Duration::from_secs(1));
        assert_eq!(plan.pulse_period, Duration::from_millis(1001));
    }

    #[test]
    fn test_strobe_pulses_once_per_frame() {
        let spec = validated(SequenceSpec::strobe(3, 0.1));
        let plan = plan(&spec, TriggerMode::Internal, false, true, THRESHOLD).unwrap();
        assert_eq!(plan.pulse_count, 3);
        assert_eq!(plan.pulse_width, Duration::from_millis(100));
        assert_eq!(plan.pulse_period, Duration::from_micros(100_100));
    }

    #[test]
    fn test_continuous_cannot_be_pulsed() {
        let spec = validated(SequenceSpec::continuous(0.1));
        let err = plan(&spec, TriggerMode::Internal, false, true, THRESHOLD).unwrap_err();
        assert!(matches!(
            err,
            AcquisitionError::UnsupportedForAuxiliaryTrigger {
                kind: SequenceKind::Continuous
            }
        ));

        let duration = validated(SequenceSpec::duration(2));
        assert!(plan(&duration, TriggerMode::Internal, false, true, THRESHOLD).is_err());
    }

    #[test]
    fn test_long_continuous_on_capable_hardware_stays_native() {
        let spec = validated(SequenceSpec::continuous(0.1));
        let plan = plan(&spec, TriggerMode::Internal, true, true, THRESHOLD).unwrap();
        assert_eq!(plan, TriggerPlan::direct());

        let gated = validated(SequenceSpec::gated(5, 0.1, 0.2));
        let plan = super::plan(&gated, TriggerMode::Internal, true, true, THRESHOLD).unwrap();
        assert!(plan.use_auxiliary_pulser);
    }

    #[test]
    fn test_missing_pulser_falls_back_to_hardware() {
        let spec = validated(SequenceSpec::continuous(0.1));
        let plan = plan(&spec, TriggerMode::Internal, false, false, THRESHOLD).unwrap();
        assert_eq!(plan, TriggerPlan::direct());
    }

    #[test]
    fn test_hardware_setup_under_pulser() {
        let spec = validated(SequenceSpec::multiframe(4, 0.1, 0.2));
        let coordinator = TriggerCoordinator::new(THRESHOLD, true);
        let plan = coordinator.plan(&spec, TriggerMode::Internal, false).unwrap();
        let (hw_spec, mode) = plan.hardware_setup(&spec, TriggerMode::Internal);
        assert_eq!(mode, TriggerMode::External);
        assert_eq!(hw_spec.kind(), SequenceKind::Duration);
        assert_eq!(hw_spec.num_frames(), FrameCount::Finite(4));

        let config = plan.pulse_config().unwrap();
        assert_eq!(config.count, 4);
        assert_eq!(config.train_duration(), Duration::from_millis(700));
    }
}
