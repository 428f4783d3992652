//! Operational modes for emulated devices.
//!
//! - **Instant**: commands complete immediately, no injected faults
//! - **Realistic**: commands are paced like a slow serial or network link
//! - **Chaos**: realistic pacing plus fault injection from an [`ErrorConfig`]
//!
//! [`ErrorConfig`]: super::ErrorConfig

/// Operational mode of an emulated device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MockMode {
    /// Zero delays, deterministic - for unit tests
    #[default]
    Instant,
    /// Minimum inter-command delay enforced - for integration tests
    Realistic,
    /// Pacing plus injected failures - for resilience testing
    Chaos,
}

impl MockMode {
    /// Whether commands wait for the device's minimum inter-command delay.
    pub fn paces_commands(&self) -> bool {
        !matches!(self, MockMode::Instant)
    }

    /// Whether the device consults its error configuration.
    pub fn injects_faults(&self) -> bool {
        matches!(self, MockMode::Chaos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mode() {
        assert_eq!(MockMode::default(), MockMode::Instant);
    }

    #[test]
    fn test_mode_behaviour() {
        assert!(!MockMode::Instant.paces_commands());
        assert!(MockMode::Realistic.paces_commands());
        assert!(MockMode::Chaos.paces_commands());
        assert!(!MockMode::Realistic.injects_faults());
        assert!(MockMode::Chaos.injects_faults());
    }
}
