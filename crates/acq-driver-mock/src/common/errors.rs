//! Fault injection for emulated devices.
//!
//! Faults are described per device operation (`"prepare"`, `"trigger"`,
//! `"read_raw_frame"`, ...) and surface as ordinary [`HwError`]s, so the
//! controller sees exactly what a failing physical device would produce.

use super::rng::MockRng;
use acq_core::{HwError, HwErrorKind};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// A scripted failure.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorScenario {
    /// `operation` succeeds `successes` times, then fails every time.
    FailAfter {
        operation: &'static str,
        successes: u32,
    },
    /// `operation` always times out.
    Timeout { operation: &'static str },
    /// The first call of any operation loses the link; it never comes back.
    CommunicationLoss,
    /// The first call of any operation latches a detector fault code.
    DetectorFault { code: u32 },
}

#[derive(Debug, Default)]
struct FaultState {
    calls: HashMap<&'static str, u32>,
    link_lost: bool,
    fault_code: Option<u32>,
}

/// Shared fault configuration. Clones share counters and latched faults.
#[derive(Clone, Debug)]
pub struct ErrorConfig {
    rates: Arc<HashMap<&'static str, f64>>,
    scenarios: Arc<Vec<ErrorScenario>>,
    rng: Arc<MockRng>,
    state: Arc<Mutex<FaultState>>,
}

impl ErrorConfig {
    fn build(rates: HashMap<&'static str, f64>, scenarios: Vec<ErrorScenario>, seed: Option<u64>) -> Self {
        Self {
            rates: Arc::new(rates),
            scenarios: Arc::new(scenarios),
            rng: Arc::new(MockRng::new(seed)),
            state: Arc::new(Mutex::new(FaultState::default())),
        }
    }

    /// No faults.
    pub fn none() -> Self {
        Self::build(HashMap::new(), Vec::new(), Some(0))
    }

    /// Every operation fails with probability `rate`, reproducibly for a
    /// given seed.
    pub fn random_failures_seeded(rate: f64, seed: Option<u64>) -> Self {
        Self::build(HashMap::from([("*", rate)]), Vec::new(), seed)
    }

    /// Per-operation failure probabilities; `"*"` applies to the rest.
    pub fn with_rates(rates: HashMap<&'static str, f64>) -> Self {
        Self::build(rates, Vec::new(), None)
    }

    pub fn scenario(scenario: ErrorScenario) -> Self {
        Self::scenarios(vec![scenario])
    }

    pub fn scenarios(scenarios: Vec<ErrorScenario>) -> Self {
        Self::build(HashMap::new(), scenarios, Some(0))
    }

    /// Decide whether `operation` on `device` fails now.
    pub fn check(&self, device: &str, operation: &'static str) -> Result<(), HwError> {
        let mut state = self.state.lock();

        if state.link_lost {
            return Err(HwError::new(device, HwErrorKind::Communication, "Link lost"));
        }
        if let Some(code) = state.fault_code {
            return Err(HwError::new(
                device,
                HwErrorKind::Hardware,
                format!("Detector fault {code:#06x}"),
            ));
        }

        let calls = {
            let count = state.calls.entry(operation).or_insert(0);
            *count += 1;
            *count
        };

        for scenario in self.scenarios.iter() {
            match *scenario {
                ErrorScenario::FailAfter {
                    operation: op,
                    successes,
                } if op == operation && calls > successes => {
                    return Err(HwError::new(
                        device,
                        HwErrorKind::Hardware,
                        format!("Injected '{operation}' failure after {successes} calls"),
                    ));
                }
                ErrorScenario::Timeout { operation: op } if op == operation => {
                    return Err(HwError::new(
                        device,
                        HwErrorKind::Timeout,
                        format!("No reply to '{operation}'"),
                    ));
                }
                ErrorScenario::CommunicationLoss => {
                    state.link_lost = true;
                    return Err(HwError::new(device, HwErrorKind::Communication, "Link lost"));
                }
                ErrorScenario::DetectorFault { code } => {
                    state.fault_code = Some(code);
                    return Err(HwError::new(
                        device,
                        HwErrorKind::Hardware,
                        format!("Detector fault {code:#06x}"),
                    ));
                }
                _ => {}
            }
        }

        let rate = self
            .rates
            .get(operation)
            .or_else(|| self.rates.get("*"))
            .copied()
            .unwrap_or(0.0);
        if self.rng.should_fail(rate) {
            return Err(HwError::new(
                device,
                HwErrorKind::Communication,
                format!("Random failure on '{operation}'"),
            ));
        }
        Ok(())
    }

    /// Clear counters and latched faults.
    pub fn reset(&self) {
        *self.state.lock() = FaultState::default();
    }
}

impl Default for ErrorConfig {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_errors() {
        let config = ErrorConfig::none();
        assert!((0..100).all(|_| config.check("cam", "prepare").is_ok()));
    }

    #[test]
    fn test_fail_after() {
        let config = ErrorConfig::scenario(ErrorScenario::FailAfter {
            operation: "read_raw_frame",
            successes: 3,
        });
        for _ in 0..3 {
            config.check("cam", "read_raw_frame").unwrap();
        }
        assert!(config.check("cam", "read_raw_frame").is_err());
        // Other operations are unaffected.
        config.check("cam", "prepare").unwrap();

        config.reset();
        config.check("cam", "read_raw_frame").unwrap();
    }

    #[test]
    fn test_timeout_kind() {
        let config = ErrorConfig::scenario(ErrorScenario::Timeout { operation: "trigger" });
        let err = config.check("cam", "trigger").unwrap_err();
        assert!(err.is_timeout());
        assert!(config.check("cam", "prepare").is_ok());
    }

    #[test]
    fn test_communication_loss_latches() {
        let config = ErrorConfig::scenario(ErrorScenario::CommunicationLoss);
        let shared = config.clone();
        assert_eq!(
            config.check("cam", "prepare").unwrap_err().kind,
            HwErrorKind::Communication
        );
        assert!(shared.check("cam", "stop").is_err());
    }

    #[test]
    fn test_detector_fault_code() {
        let config = ErrorConfig::scenario(ErrorScenario::DetectorFault { code: 0x42 });
        let err = config.check("cam", "prepare").unwrap_err();
        assert_eq!(err.kind, HwErrorKind::Hardware);
        assert!(err.message.contains("0x0042"), "{}", err.message);
    }

    #[test]
    fn test_per_operation_rates() {
        let config = ErrorConfig::with_rates(HashMap::from([("trigger", 1.0), ("*", 0.0)]));
        assert!(config.check("cam", "trigger").is_err());
        assert!(config.check("cam", "prepare").is_ok());
    }

    #[test]
    fn test_seeded_failures_are_reproducible() {
        let a = ErrorConfig::random_failures_seeded(0.5, Some(99));
        let b = ErrorConfig::random_failures_seeded(0.5, Some(99));
        let run = |c: &ErrorConfig| (0..64).map(|_| c.check("cam", "x").is_ok()).collect::<Vec<_>>();
        assert_eq!(run(&a), run(&b));
    }
}
