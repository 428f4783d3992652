//! Error types for the acquisition core.
//!
//! The taxonomy follows the lifecycle of an acquisition:
//!
//! - [`SequenceError`]: a sequence request failed validation. Always raised
//!   before any hardware call and never retried.
//! - [`HwError`]: a collaborator (camera, pulser) reported a failure. Surfaced
//!   verbatim; the core performs no automatic retry because retry policy is
//!   device specific.
//! - [`NormalizeError`]: a raw frame could not be turned into the canonical frame.
//! - [`AcquisitionError`]: the top-level error returned by
//!   [`AcquisitionController`](crate::controller::AcquisitionController),
//!   wrapping all of the above plus caller protocol violations.
//!
//! All variants are returned to the caller; nothing is swallowed.

use crate::controller::AcquisitionState;
use crate::sequence::SequenceKind;
use thiserror::Error;

/// Result alias for acquisition operations.
pub type Result<T> = std::result::Result<T, AcquisitionError>;

// =============================================================================
// Collaborator Errors
// =============================================================================

/// Broad classification of a collaborator failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwErrorKind {
    Initialization,
    Configuration,
    Communication,
    Hardware,
    Timeout,
    Unknown,
}

impl std::fmt::Display for HwErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            HwErrorKind::Initialization => "initialization",
            HwErrorKind::Configuration => "configuration",
            HwErrorKind::Communication => "communication",
            HwErrorKind::Hardware => "hardware",
            HwErrorKind::Timeout => "timeout",
            HwErrorKind::Unknown => "unknown",
        };
        write!(f, "{}", label)
    }
}

/// Failure reported by a hardware collaborator.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Device '{device}' {kind} error: {message}")]
pub struct HwError {
    pub device: String,
    pub kind: HwErrorKind,
    pub message: String,
}

impl HwError {
    pub fn new(device: impl Into<String>, kind: HwErrorKind, message: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            kind,
            message: message.into(),
        }
    }

    /// Whether the failure is a timeout.
    pub fn is_timeout(&self) -> bool {
        self.kind == HwErrorKind::Timeout
    }
}

/// Auxiliary pulsers report failures with the same shape as cameras.
pub type PulserError = HwError;

/// Failure reported by the correction pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Frame correction failed: {0}")]
pub struct CorrectionError(pub String);

// =============================================================================
// Sequence Validation
// =============================================================================

/// A sequence request that cannot be armed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SequenceError {
    /// The sequence type name is not one the core knows how to run.
    #[error("Unsupported sequence type '{name}'")]
    UnsupportedSequenceType { name: String },

    /// Wrong number of parameters for the sequence kind.
    #[error("Sequence '{kind}' takes {expected} parameters, got {actual}")]
    WrongArity {
        kind: SequenceKind,
        expected: usize,
        actual: usize,
    },

    /// NaN or infinite parameter.
    #[error("Sequence parameter {index} is not finite ({value})")]
    NonFiniteParameter { index: usize, value: f64 },

    /// Parameter too large to be represented as a duration or count.
    #[error("Sequence parameter {index} is out of range ({value})")]
    ParameterOutOfRange { index: usize, value: f64 },

    #[error("Exposure time must be positive, got {value} s")]
    NonPositiveExposure { value: f64 },

    #[error("Frame count must be positive, got {value}")]
    NonPositiveFrameCount { value: f64 },

    #[error("Frame count must be a whole number, got {value}")]
    FractionalFrameCount { value: f64 },

    #[error("Frame period must be positive, got {value} s")]
    NonPositivePeriod { value: f64 },
}

// =============================================================================
// Frame Normalization
// =============================================================================

/// A raw frame that cannot be normalized.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    /// The raw frame cannot contain the canonical frame after trimming.
    #[error(
        "Raw frame {raw_width}x{raw_height} is too small for canonical \
         {canonical_width}x{canonical_height} at rotation {rotation}"
    )]
    RawTooSmall {
        raw_width: u32,
        raw_height: u32,
        canonical_width: u32,
        canonical_height: u32,
        rotation: u16,
    },

    /// The pixel buffer does not match the declared dimensions.
    #[error("Frame buffer holds {actual} bytes, dimensions require {expected}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    /// Bit depth with no byte-aligned pixel representation.
    #[error("Unsupported bit depth {0}")]
    UnsupportedBitDepth(u32),

    /// Rotation other than 0, 90, 180 or 270 degrees.
    #[error("Unsupported rotation {0} degrees")]
    UnsupportedRotation(u16),
}

// =============================================================================
// Top-Level Error
// =============================================================================

/// Error returned by the acquisition controller.
#[derive(Error, Debug)]
pub enum AcquisitionError {
    /// Bad sequence request; rejected before any hardware call.
    #[error("Invalid sequence: {0}")]
    Validation(#[from] SequenceError),

    /// Operation requires an armed (or previously armed) session.
    #[error("Controller is not armed")]
    NotArmed,

    /// Operation is not valid in the current state.
    #[error("Cannot {operation} while {state}")]
    InvalidStateTransition {
        state: AcquisitionState,
        operation: &'static str,
    },

    /// Camera / detector collaborator failure, surfaced unchanged.
    #[error(transparent)]
    Hardware(HwError),

    /// Auxiliary pulser failure, surfaced unchanged.
    #[error("Auxiliary pulser: {0}")]
    Pulser(HwError),

    /// The requested frame has already been overwritten in the slot pool.
    #[error("Frame {requested} is stale; oldest frame still held is {oldest_available}")]
    StaleFrameRequested { requested: u64, oldest_available: u64 },

    /// The requested frame has not been acquired yet.
    #[error("Frame {requested} is not ready (last acquired frame: {last_available})")]
    FrameNotReady { requested: u64, last_available: i64 },

    /// The sequence cannot be clocked by a finite pulse train.
    #[error("Sequence '{kind}' cannot be driven by the auxiliary pulser")]
    UnsupportedForAuxiliaryTrigger { kind: SequenceKind },

    /// The trigger plan requires a pulser but none is attached.
    #[error("Trigger plan requires an auxiliary pulser but none is attached")]
    NoAuxiliaryPulser,

    #[error("Frame normalization failed: {0}")]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    Correction(#[from] CorrectionError),

    /// `wait_for_completion` gave up.
    #[error("Acquisition still busy after {0:?}")]
    WaitTimeout(std::time::Duration),
}

impl AcquisitionError {
    /// Whether the error is a caller protocol violation (not a device fault).
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::NotArmed | Self::InvalidStateTransition { .. }
        )
    }

    /// Whether the error originates in a collaborator.
    pub fn is_device_error(&self) -> bool {
        matches!(self, Self::Hardware(_) | Self::Pulser(_))
    }
}
