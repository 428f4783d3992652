//! Device-independent acquisition lifecycle for imaging detectors.
//!
//! Every area detector, network camera and video digitizer driver exposes the
//! same lifecycle to its caller:
//!
//! ```text
//! arm(sequence) → trigger() → poll get_extended_status() → read_frame(n) → correct
//! ```
//!
//! This crate implements that lifecycle once. Device families plug in through
//! the [`Hardware`] trait; devices that can only capture on an external
//! trigger can be driven through an auxiliary [`Pulser`].
//!
//! # Components
//!
//! - [`sequence`] - validated acquisition requests and their timing
//! - [`estimator`] - progress estimation from elapsed time
//! - [`trigger`] - native vs. pulser-synthesized triggering
//! - [`pool`] - circular frame-slot metadata pool
//! - [`normalize`] - trim, rotate and reflect raw frames
//! - [`controller`] - the state machine tying these together
//! - [`config`] - TOML/environment configuration loading
//!
//! # Example
//!
//! ```rust,ignore
//! use acq_core::{AcquisitionController, SequenceSpec};
//! use std::time::Duration;
//!
//! let mut controller = AcquisitionController::builder(Box::new(camera))
//!     .pool_capacity(16)
//!     .build();
//! controller.arm(SequenceSpec::multiframe(4, 0.1, 0.2))?;
//! controller.trigger()?;
//! controller.wait_for_completion(Duration::from_millis(20), Duration::from_secs(5))?;
//! let frame = controller.read_frame(3)?;
//! ```

pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod estimator;
pub mod frame;
pub mod hardware;
pub mod normalize;
pub mod pool;
pub mod sequence;
pub mod trigger;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AcquisitionConfig, ConfigLoadError};
pub use controller::{
    AcquiredFrame, AcquisitionController, AcquisitionControllerBuilder, AcquisitionSession,
    AcquisitionState, ExtendedStatus,
};
pub use error::{
    AcquisitionError, CorrectionError, HwError, HwErrorKind, NormalizeError, PulserError, Result,
    SequenceError,
};
pub use estimator::{estimate, EstimatedStatus};
pub use frame::{Frame, FrameDims, FrameView, FrameViewMut};
pub use hardware::{FrameCorrector, Hardware, NativeStatus, Pulser};
pub use normalize::{normalize, FrameNormalizer, FrameTransform};
pub use pool::{FrameSlot, FrameSlotPool};
pub use sequence::{FrameCount, SequenceKind, SequenceSpec, ValidatedSpec};
pub use trigger::{plan, PulseConfig, TriggerCoordinator, TriggerMode, TriggerPlan};
