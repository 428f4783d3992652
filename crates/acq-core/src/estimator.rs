//! Elapsed-time progress estimation.
//!
//! Devices that cannot report acquisition progress (software-emulated cameras,
//! network cameras) are tracked by assuming frames complete exactly one frame
//! period apart, starting at the trigger instant.

use crate::sequence::{FrameCount, SequenceKind, ValidatedSpec};
use std::time::Duration;

/// Progress derived from elapsed time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EstimatedStatus {
    pub busy: bool,
    /// Session-relative number of the most recent frame, `-1` if none.
    pub last_frame_number: i64,
    /// Cumulative frame counter, including frames from earlier sessions.
    pub frames_completed: u64,
}

impl EstimatedStatus {
    /// Status of a session in which nothing has happened yet.
    pub fn not_started(frames_completed_before_start: u64) -> Self {
        Self {
            busy: true,
            last_frame_number: -1,
            frames_completed: frames_completed_before_start,
        }
    }
}

/// Whole frame periods contained in `elapsed`.
///
/// Computed in integer nanoseconds and rounded down, so a frame only counts
/// once its full period has elapsed.
pub fn frames_elapsed(elapsed: Duration, frame_period: Duration) -> u64 {
    let period = frame_period.as_nanos();
    if period == 0 {
        return 0;
    }
    u64::try_from(elapsed.as_nanos() / period).unwrap_or(u64::MAX)
}

/// Estimate progress using the sequence's own frame period.
pub fn estimate(
    spec: &ValidatedSpec,
    elapsed: Duration,
    frames_completed_before_start: u64,
) -> EstimatedStatus {
    estimate_with_period(spec, elapsed, spec.frame_period(), frames_completed_before_start)
}

/// Estimate progress `elapsed` after the trigger.
///
/// `frame_period` is `None` only for pulse-width gated sequences, which have
/// no timing of their own and always report "busy, nothing yet".
pub fn estimate_with_period(
    spec: &ValidatedSpec,
    elapsed: Duration,
    frame_period: Option<Duration>,
    frames_completed_before_start: u64,
) -> EstimatedStatus {
    let before = frames_completed_before_start;
    let Some(period) = frame_period else {
        return EstimatedStatus::not_started(before);
    };
    let n = frames_elapsed(elapsed, period);

    match (spec.kind(), spec.num_frames()) {
        (SequenceKind::OneShot, _) => {
            if n < 1 {
                EstimatedStatus::not_started(before)
            } else {
                EstimatedStatus {
                    busy: false,
                    last_frame_number: 0,
                    frames_completed: before.saturating_add(1),
                }
            }
        }
        (_, FrameCount::Indeterminate) => EstimatedStatus {
            busy: true,
            last_frame_number: 0,
            frames_completed: before.saturating_add(n),
        },
        (_, FrameCount::Finite(count)) => {
            let done = n.min(count);
            EstimatedStatus {
                busy: n < count,
                last_frame_number: i64::try_from(done).unwrap_or(i64::MAX) - 1,
                frames_completed: before.saturating_add(done),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::SequenceSpec;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_one_shot_finishes_after_exposure() {
        let spec = SequenceSpec::one_shot(0.5).validate().unwrap();
        let early = estimate(&spec, ms(200), 7);
        assert_eq!(early, EstimatedStatus::not_started(7));

        let late = estimate(&spec, ms(600), 7);
        assert!(!late.busy);
        assert_eq!(late.last_frame_number, 0);
        assert_eq!(late.frames_completed, 8);
    }

    #[test]
    fn test_continuous_never_finishes() {
        let spec = SequenceSpec::continuous(0.1).validate().unwrap();
        let s = estimate(&spec, Duration::from_secs(100), 2);
        assert!(s.busy);
        assert_eq!(s.last_frame_number, 0);
        assert_eq!(s.frames_completed, 1002);
    }

    #[test]
    fn test_multiframe_uses_frame_period_not_exposure() {
        let spec = SequenceSpec::multiframe(4, 0.1, 0.2).validate().unwrap();
        // Exposure-based counting would report 5 frames here.
        let s = estimate(&spec, ms(500), 0);
        assert!(s.busy);
        assert_eq!(s.last_frame_number, 1);
        assert_eq!(s.frames_completed, 2);
    }

    #[test]
    fn test_multiframe_busy_until_count_periods() {
        let cases = [(1u64, 0.01, 0.013), (4, 0.1, 0.2), (7, 0.05, 0.3), (100, 0.001, 0.0017)];
        for (count, exposure, period) in cases {
            let spec = SequenceSpec::multiframe(count, exposure, period)
                .validate()
                .unwrap();
            let total = spec.frame_period().unwrap() * count as u32;

            for step in 0..200u32 {
                let t = total.mul_f64(f64::from(step) / 200.0);
                assert!(estimate(&spec, t, 0).busy, "count={count} t={t:?}");
            }
            assert!(estimate(&spec, total - Duration::from_nanos(1), 0).busy);
            assert!(!estimate(&spec, total, 0).busy);
            assert!(!estimate(&spec, total * 3, 0).busy);
        }
    }

    #[test]
    fn test_frames_completed_is_monotonic() {
        let specs = [
            SequenceSpec::one_shot(0.3),
            SequenceSpec::continuous(0.07),
            SequenceSpec::multiframe(5, 0.1, 0.25),
            SequenceSpec::strobe(3, 0.2),
            SequenceSpec::gated(2, 0.1, 0.4),
        ];
        for spec in specs {
            let spec = spec.validate().unwrap();
            let mut previous = 0;
            for step in 0..400u64 {
                let s = estimate(&spec, ms(step * 7), 10);
                assert!(s.frames_completed >= previous, "{:?} at {}ms", spec.kind(), step * 7);
                previous = s.frames_completed;
            }
        }
    }

    #[test]
    fn test_finite_kinds_do_not_overshoot() {
        let spec = SequenceSpec::strobe(3, 0.1).validate().unwrap();
        let s = estimate(&spec, Duration::from_secs(10), 5);
        assert!(!s.busy);
        assert_eq!(s.last_frame_number, 2);
        assert_eq!(s.frames_completed, 8);
    }

    #[test]
    fn test_duration_without_period_stays_busy() {
        let spec = SequenceSpec::duration(3).validate().unwrap();
        let s = estimate(&spec, Duration::from_secs(10), 4);
        assert_eq!(s, EstimatedStatus::not_started(4));
    }
}
