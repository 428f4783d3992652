//! Collaborator interfaces.
//!
//! The controller drives three collaborators it does not implement:
//!
//! - [`Hardware`]: one implementation per device family (emulated camera,
//!   network camera, CMOS detector with a serial protocol, ...).
//! - [`Pulser`]: an auxiliary pulse generator wired to an external trigger
//!   input.
//! - [`FrameCorrector`]: the correction pipeline (mask, bias, dark current,
//!   flood field) applied to normalized frames.
//!
//! Implementations are responsible for any rate limiting their physical
//! protocol needs; calls may block for that reason.

use crate::error::{CorrectionError, HwError, PulserError};
use crate::frame::Frame;
use crate::sequence::{SequenceKind, ValidatedSpec};
use crate::trigger::{PulseConfig, TriggerMode};

/// Progress reported by a device that tracks it itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeStatus {
    pub busy: bool,
    /// Session-relative number of the most recent frame, `-1` if none.
    pub last_frame_number: i64,
    /// Cumulative frame counter of the device.
    pub total_frames: u64,
}

/// A physical (or emulated) acquisition device.
pub trait Hardware: Send {
    /// Device name used in logs.
    fn name(&self) -> &str;

    /// Program the device for `spec`. Must not start capture.
    fn prepare(&mut self, spec: &ValidatedSpec, trigger_mode: TriggerMode) -> Result<(), HwError>;

    /// Start capture of the prepared sequence.
    fn native_trigger(&mut self) -> Result<(), HwError>;

    /// Stop after the frame in progress.
    fn native_stop(&mut self) -> Result<(), HwError>;

    /// Stop immediately, discarding the frame in progress.
    fn native_abort(&mut self) -> Result<(), HwError>;

    /// Device-reported progress, or `None` when the device cannot report it
    /// and the caller must estimate from elapsed time.
    fn native_status(&mut self) -> Result<Option<NativeStatus>, HwError>;

    /// Fetch raw frame `absolute_index` from the device buffer.
    fn read_raw_frame(&mut self, absolute_index: u64) -> Result<Frame, HwError>;

    /// Whether the device can time `kind` sequences by itself.
    fn supports_internal_trigger(&self, kind: SequenceKind) -> bool;
}

/// Auxiliary pulse generator.
pub trait Pulser: Send {
    fn name(&self) -> &str;

    fn configure(&mut self, config: &PulseConfig) -> Result<(), PulserError>;

    fn start(&mut self) -> Result<(), PulserError>;

    fn stop(&mut self) -> Result<(), PulserError>;

    fn is_busy(&mut self) -> Result<bool, PulserError>;
}

/// Correction pipeline applied after normalization.
///
/// The controller passes the result through unchanged.
pub trait FrameCorrector {
    fn correct(&mut self, frame: Frame) -> Result<Frame, CorrectionError>;
}

impl<F> FrameCorrector for F
where
    F: FnMut(Frame) -> Result<Frame, CorrectionError>,
{
    fn correct(&mut self, frame: Frame) -> Result<Frame, CorrectionError> {
        self(frame)
    }
}
