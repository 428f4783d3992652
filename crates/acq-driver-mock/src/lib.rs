//! Emulated devices for the acquisition core
//!
//! This crate provides software stand-ins for the collaborators an
//! [`AcquisitionController`](acq_core::AcquisitionController) drives, so the
//! full lifecycle can be exercised without physical hardware.
//!
//! # Available Devices
//!
//! - [`EmulatedCamera`] - area detector with internal and external triggering
//! - [`EmulatedPulser`] - pulse generator driving a [`TriggerLine`]
//!
//! # Timing
//!
//! Devices read time from an injected [`Clock`](acq_core::Clock). With a
//! [`ManualClock`](acq_core::ManualClock) a test advances time explicitly and
//! every status poll is deterministic.
//!
//! ```rust,ignore
//! use acq_core::{AcquisitionController, ManualClock, SequenceSpec};
//! use acq_driver_mock::{EmulatedCamera, EmulatedPulser, TriggerLine};
//! use std::sync::Arc;
//!
//! let clock = ManualClock::new();
//! let line = TriggerLine::new();
//! let camera = EmulatedCamera::builder(64, 48)
//!     .external_trigger_only()
//!     .trigger_line(line.clone())
//!     .clock(Arc::new(clock.clone()))
//!     .build();
//! let pulser = EmulatedPulser::new(line).with_clock(Arc::new(clock.clone()));
//!
//! let mut controller = AcquisitionController::builder(Box::new(camera))
//!     .pulser(Box::new(pulser))
//!     .clock(Arc::new(clock.clone()))
//!     .build();
//! controller.arm(SequenceSpec::strobe(5, 0.01))?;
//! controller.trigger()?;
//! ```

pub mod common;
mod emulated_camera;
mod emulated_pulser;
mod pattern;

pub use common::{
    CallLog, CommandGate, ErrorConfig, ErrorScenario, MockMode, MockRng, TimingConfig, TriggerLine,
};
pub use emulated_camera::{EmulatedCamera, EmulatedCameraBuilder};
pub use emulated_pulser::EmulatedPulser;
pub use pattern::{decode_frame_number, generate_test_pattern, MARKER_PIXELS};
