//! Shared infrastructure for emulated devices.
//!
//! - **mode**: Operational modes (Instant, Realistic, Chaos)
//! - **timing**: Device delays and the inter-command gate
//! - **errors**: Fault injection
//! - **rng**: Seeded random number generator
//! - **line**: Trigger line joining a pulser output to a camera input
//! - **log**: Shared record of device calls

pub mod errors;
pub mod line;
pub mod log;
pub mod mode;
pub mod rng;
pub mod timing;

pub use errors::{ErrorConfig, ErrorScenario};
pub use line::TriggerLine;
pub use log::CallLog;
pub use mode::MockMode;
pub use rng::MockRng;
pub use timing::{CommandGate, TimingConfig};
