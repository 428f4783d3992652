//! Command pacing for realistic mode.
//!
//! Some detector protocols reject a command that arrives too soon after the
//! previous one. [`CommandGate`] models that: every command first waits until
//! the device's minimum inter-command interval has passed.

use acq_core::Clock;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Hardware-like delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimingConfig {
    /// Minimum time between the starts of two commands.
    pub min_command_interval: Duration,
    /// Time to transfer one frame out of the device.
    pub frame_readout: Duration,
}

impl TimingConfig {
    /// CMOS detector behind a serial control link.
    pub fn serial_detector() -> Self {
        Self {
            min_command_interval: Duration::from_millis(10),
            frame_readout: Duration::from_millis(20),
        }
    }

    /// Network camera polled over HTTP.
    pub fn network_camera() -> Self {
        Self {
            min_command_interval: Duration::from_millis(2),
            frame_readout: Duration::from_millis(33),
        }
    }

    /// Pulse generator on a GPIB/serial bus.
    pub fn pulse_generator() -> Self {
        Self {
            min_command_interval: Duration::from_millis(5),
            frame_readout: Duration::ZERO,
        }
    }
}

/// Enforces a minimum interval between commands.
pub struct CommandGate {
    min_interval: Duration,
    clock: Arc<dyn Clock>,
    last_command: Option<Duration>,
}

impl CommandGate {
    pub fn new(min_interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            min_interval,
            clock,
            last_command: None,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Block until a command may be sent, then record it as sent.
    ///
    /// Returns how long the caller was held.
    pub fn wait(&mut self) -> Duration {
        let mut held = Duration::ZERO;
        if let Some(last) = self.last_command {
            let since = self.clock.now().saturating_sub(last);
            if since < self.min_interval {
                held = self.min_interval - since;
                trace!(held_us = held.as_micros() as u64, "Command gate holding");
                self.clock.sleep(held);
            }
        }
        self.last_command = Some(self.clock.now());
        held
    }
}

impl std::fmt::Debug for CommandGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandGate")
            .field("min_interval", &self.min_interval)
            .field("last_command", &self.last_command)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acq_core::ManualClock;

    #[test]
    fn test_default_timing_is_zero() {
        let config = TimingConfig::default();
        assert_eq!(config.min_command_interval, Duration::ZERO);
        assert_eq!(config.frame_readout, Duration::ZERO);
    }

    #[test]
    fn test_gate_holds_back_to_back_commands() {
        let clock = ManualClock::new();
        let mut gate = CommandGate::new(Duration::from_millis(10), Arc::new(clock.clone()));

        assert_eq!(gate.wait(), Duration::ZERO);
        clock.advance(Duration::from_millis(3));
        assert_eq!(gate.wait(), Duration::from_millis(7));
        assert_eq!(clock.now(), Duration::from_millis(10));

        clock.advance(Duration::from_millis(25));
        assert_eq!(gate.wait(), Duration::ZERO);
    }
}
