//! Emulated trigger cable.
//!
//! An [`EmulatedPulser`](crate::EmulatedPulser) drives the line and an
//! [`EmulatedCamera`](crate::EmulatedCamera) in external-trigger mode reads
//! it, the same way a coaxial cable joins a pulse generator output to a
//! detector trigger input.

use acq_core::PulseConfig;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
struct LineState {
    train: Option<PulseConfig>,
    fired_at: Option<Duration>,
    ceased_at: Option<Duration>,
}

/// Shared trigger line. Clones observe the same signal.
#[derive(Debug, Clone, Default)]
pub struct TriggerLine {
    state: Arc<Mutex<LineState>>,
}

impl TriggerLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start emitting `train` at clock reading `at`.
    pub fn fire(&self, train: PulseConfig, at: Duration) {
        let mut state = self.state.lock();
        state.train = Some(train);
        state.fired_at = Some(at);
        state.ceased_at = None;
    }

    /// Stop emitting at clock reading `at`.
    pub fn cease(&self, at: Duration) {
        let mut state = self.state.lock();
        if state.fired_at.is_some() && state.ceased_at.is_none() {
            state.ceased_at = Some(at);
        }
    }

    /// Forget any previous train.
    pub fn clear(&self) {
        *self.state.lock() = LineState::default();
    }

    pub fn fired_at(&self) -> Option<Duration> {
        self.state.lock().fired_at
    }

    /// Number of complete pulses (falling edge seen) by clock reading `now`.
    pub fn pulses_completed(&self, now: Duration) -> u64 {
        let state = self.state.lock();
        let (Some(train), Some(fired)) = (state.train, state.fired_at) else {
            return 0;
        };
        let end = state.ceased_at.map_or(now, |c| c.min(now));
        let on_line = end.saturating_sub(fired);
        if on_line < train.width {
            return 0;
        }
        let period = train.period.as_nanos().max(1);
        let after_first = (on_line - train.width).as_nanos() / period;
        let pulses = u64::try_from(after_first).unwrap_or(u64::MAX).saturating_add(1);
        pulses.min(u64::from(train.count))
    }

    /// Whether the line is still emitting at `now`.
    pub fn is_active(&self, now: Duration) -> bool {
        let state = self.state.lock();
        match (state.train, state.fired_at, state.ceased_at) {
            (Some(train), Some(fired), None) => now.saturating_sub(fired) < train.train_duration(),
            _ => false,
        }
    }
}
