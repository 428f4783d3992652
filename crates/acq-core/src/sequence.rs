//! Acquisition sequence descriptions.
//!
//! A [`SequenceSpec`] is the caller's request: a kind plus an ordered list of
//! numeric parameters whose meaning depends on the kind. Arming requires a
//! [`ValidatedSpec`], produced by [`validate`], which has already checked the
//! arity and ranges and precomputed the timing accessors.
//!
//! # Parameter layouts
//!
//! | kind         | parameters                          |
//! |--------------|-------------------------------------|
//! | `one_shot`   | `[exposure]`                        |
//! | `continuous` | `[exposure]`                        |
//! | `multiframe` | `[count, exposure, frame_period]`   |
//! | `strobe`     | `[count, exposure]`                 |
//! | `duration`   | `[count]`                           |
//! | `gated`      | `[count, exposure, frame_period]`   |
//!
//! Times are in seconds. For `multiframe` and `gated` the frame period is its
//! own field and is never assumed to equal the exposure time.

use crate::error::SequenceError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Largest frame count accepted (integers above this are not exact in `f64`).
const MAX_FRAME_COUNT: f64 = 9_007_199_254_740_992.0;

/// Kind of acquisition sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceKind {
    /// A single frame.
    OneShot,
    /// Frames until stopped.
    #[serde(alias = "stream")]
    Continuous,
    /// A fixed number of frames at a fixed frame period.
    Multiframe,
    /// One frame per external strobe pulse.
    Strobe,
    /// Exposure length set by the width of each trigger pulse.
    Duration,
    /// Frames accumulated while an external gate is open.
    Gated,
}

impl SequenceKind {
    /// Number of parameters the kind requires.
    pub fn arity(&self) -> usize {
        match self {
            Self::OneShot | Self::Continuous | Self::Duration => 1,
            Self::Strobe => 2,
            Self::Multiframe | Self::Gated => 3,
        }
    }

    /// Configuration name of the kind.
    pub fn name(&self) -> &'static str {
        match self {
            Self::OneShot => "one_shot",
            Self::Continuous => "continuous",
            Self::Multiframe => "multiframe",
            Self::Strobe => "strobe",
            Self::Duration => "duration",
            Self::Gated => "gated",
        }
    }
}

impl fmt::Display for SequenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SequenceKind {
    type Err = SequenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "one_shot" | "oneshot" => Ok(Self::OneShot),
            "continuous" | "stream" => Ok(Self::Continuous),
            "multiframe" => Ok(Self::Multiframe),
            "strobe" => Ok(Self::Strobe),
            "duration" => Ok(Self::Duration),
            "gated" => Ok(Self::Gated),
            _ => Err(SequenceError::UnsupportedSequenceType {
                name: s.to_string(),
            }),
        }
    }
}

/// Total number of frames a sequence will produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameCount {
    Finite(u64),
    /// Grows without bound until the sequence is stopped.
    Indeterminate,
}

impl FrameCount {
    pub fn finite(&self) -> Option<u64> {
        match self {
            Self::Finite(n) => Some(*n),
            Self::Indeterminate => None,
        }
    }
}

impl fmt::Display for FrameCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finite(n) => write!(f, "{}", n),
            Self::Indeterminate => f.write_str("indeterminate"),
        }
    }
}

/// Unvalidated acquisition request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceSpec {
    pub kind: SequenceKind,
    pub parameters: Vec<f64>,
}

impl SequenceSpec {
    pub fn new(kind: SequenceKind, parameters: Vec<f64>) -> Self {
        Self { kind, parameters }
    }

    pub fn one_shot(exposure_s: f64) -> Self {
        Self::new(SequenceKind::OneShot, vec![exposure_s])
    }

    pub fn continuous(exposure_s: f64) -> Self {
        Self::new(SequenceKind::Continuous, vec![exposure_s])
    }

    pub fn multiframe(count: u64, exposure_s: f64, frame_period_s: f64) -> Self {
        Self::new(
            SequenceKind::Multiframe,
            vec![count as f64, exposure_s, frame_period_s],
        )
    }

    pub fn strobe(count: u64, exposure_s: f64) -> Self {
        Self::new(SequenceKind::Strobe, vec![count as f64, exposure_s])
    }

    pub fn duration(count: u64) -> Self {
        Self::new(SequenceKind::Duration, vec![count as f64])
    }

    pub fn gated(count: u64, exposure_s: f64, frame_period_s: f64) -> Self {
        Self::new(
            SequenceKind::Gated,
            vec![count as f64, exposure_s, frame_period_s],
        )
    }

    /// Build a spec from a kind name, as found in configuration files.
    pub fn from_name(name: &str, parameters: Vec<f64>) -> Result<Self, SequenceError> {
        Ok(Self::new(name.parse()?, parameters))
    }

    /// Validate this request.
    pub fn validate(&self) -> Result<ValidatedSpec, SequenceError> {
        validate(self.clone())
    }
}

/// A sequence request that passed validation.
///
/// Immutable; a new one is produced for every arm.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSpec {
    spec: SequenceSpec,
    frames: FrameCount,
    exposure: Option<Duration>,
    frame_period: Option<Duration>,
}

/// Validate a sequence request.
///
/// Rejects wrong arity, non-finite values, non-positive exposures, periods and
/// frame counts, and fractional frame counts.
pub fn validate(spec: SequenceSpec) -> Result<ValidatedSpec, SequenceError> {
    let kind = spec.kind;
    let p = &spec.parameters;

    if p.len() != kind.arity() {
        return Err(SequenceError::WrongArity {
            kind,
            expected: kind.arity(),
            actual: p.len(),
        });
    }
    if let Some((index, &value)) = p.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        return Err(SequenceError::NonFiniteParameter { index, value });
    }

    let (frames, exposure, frame_period) = match kind {
        SequenceKind::OneShot => {
            let exposure = exposure_param(p, 0)?;
            (FrameCount::Finite(1), Some(exposure), Some(exposure))
        }
        SequenceKind::Continuous => {
            let exposure = exposure_param(p, 0)?;
            (FrameCount::Indeterminate, Some(exposure), Some(exposure))
        }
        SequenceKind::Multiframe | SequenceKind::Gated => {
            let count = count_param(p, 0)?;
            let exposure = exposure_param(p, 1)?;
            let period = period_param(p, 2)?;
            (FrameCount::Finite(count), Some(exposure), Some(period))
        }
        SequenceKind::Strobe => {
            let count = count_param(p, 0)?;
            let exposure = exposure_param(p, 1)?;
            (FrameCount::Finite(count), Some(exposure), Some(exposure))
        }
        SequenceKind::Duration => (FrameCount::Finite(count_param(p, 0)?), None, None),
    };

    Ok(ValidatedSpec {
        spec,
        frames,
        exposure,
        frame_period,
    })
}

fn seconds(index: usize, value: f64) -> Result<Duration, SequenceError> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| SequenceError::ParameterOutOfRange { index, value })
}

fn exposure_param(p: &[f64], index: usize) -> Result<Duration, SequenceError> {
    let value = p[index];
    if value <= 0.0 {
        return Err(SequenceError::NonPositiveExposure { value });
    }
    seconds(index, value)
}

fn period_param(p: &[f64], index: usize) -> Result<Duration, SequenceError> {
    let value = p[index];
    if value <= 0.0 {
        return Err(SequenceError::NonPositivePeriod { value });
    }
    seconds(index, value)
}

fn count_param(p: &[f64], index: usize) -> Result<u64, SequenceError> {
    let value = p[index];
    if value < 1.0 {
        return Err(SequenceError::NonPositiveFrameCount { value });
    }
    if value.fract() != 0.0 {
        return Err(SequenceError::FractionalFrameCount { value });
    }
    if value > MAX_FRAME_COUNT {
        return Err(SequenceError::ParameterOutOfRange { index, value });
    }
    Ok(value as u64)
}

impl ValidatedSpec {
    pub fn kind(&self) -> SequenceKind {
        self.spec.kind
    }

    pub fn parameters(&self) -> &[f64] {
        &self.spec.parameters
    }

    pub fn spec(&self) -> &SequenceSpec {
        &self.spec
    }

    pub fn into_spec(self) -> SequenceSpec {
        self.spec
    }

    /// Total requested frame count.
    pub fn num_frames(&self) -> FrameCount {
        self.frames
    }

    /// Exposure of frame `frame_index`. `None` for duration sequences, whose
    /// exposure is set by the trigger pulse width.
    pub fn exposure_time_of(&self, _frame_index: u64) -> Option<Duration> {
        self.exposure
    }

    /// Time between the starts of consecutive frames. `None` for duration
    /// sequences.
    pub fn frame_period(&self) -> Option<Duration> {
        self.frame_period
    }

    /// Expected wall-clock length of the whole sequence, if bounded and timed.
    pub fn total_sequence_time(&self) -> Option<Duration> {
        match (self.spec.kind, self.frames, self.frame_period) {
            (SequenceKind::OneShot, _, _) => self.exposure,
            (_, FrameCount::Finite(n), Some(period)) => period.checked_mul(u32::try_from(n).ok()?),
            _ => None,
        }
    }

    /// Raise the frame period of multiframe/gated sequences so that at least
    /// `gap` separates the end of one exposure from the start of the next.
    pub fn with_min_interframe_gap(mut self, gap: Duration) -> Self {
        if !matches!(self.spec.kind, SequenceKind::Multiframe | SequenceKind::Gated) {
            return self;
        }
        let (Some(exposure), Some(period)) = (self.exposure, self.frame_period) else {
            return self;
        };
        let Some(minimum) = exposure.checked_add(gap) else {
            return self;
        };
        if period < minimum {
            tracing::debug!(
                kind = %self.spec.kind,
                requested_s = period.as_secs_f64(),
                adjusted_s = minimum.as_secs_f64(),
                "Frame period raised to honour minimum inter-frame gap"
            );
            self.frame_period = Some(minimum);
            self.spec.parameters[2] = minimum.as_secs_f64();
        }
        self
    }

    /// Duration-mode sequence of `count` frames, used for hardware that is
    /// clocked by an auxiliary pulser.
    pub(crate) fn pulse_driven(count: u64) -> Self {
        Self {
            spec: SequenceSpec::duration(count),
            frames: FrameCount::Finite(count),
            exposure: None,
            frame_period: None,
        }
    }
}

/// Total requested frame count of `spec`.
pub fn num_frames(spec: &ValidatedSpec) -> FrameCount {
    spec.num_frames()
}

/// Exposure of frame `frame_index` of `spec`.
pub fn exposure_time_of(spec: &ValidatedSpec, frame_index: u64) -> Option<Duration> {
    spec.exposure_time_of(frame_index)
}

/// Frame period of `spec`.
pub fn frame_period_of(spec: &ValidatedSpec) -> Option<Duration> {
    spec.frame_period()
}
