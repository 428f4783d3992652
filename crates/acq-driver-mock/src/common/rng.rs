//! Seeded RNG for reproducible fault injection.

use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Thread-safe ChaCha8 generator.
///
/// With a seed, every run makes the same failure decisions; without one the
/// generator is seeded from the OS.
pub struct MockRng {
    state: Mutex<ChaCha8Rng>,
}

impl MockRng {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = seed.map_or_else(ChaCha8Rng::from_entropy, ChaCha8Rng::seed_from_u64);
        Self {
            state: Mutex::new(rng),
        }
    }

    /// Bernoulli draw with probability `rate` (clamped to `[0, 1]`).
    pub fn should_fail(&self, rate: f64) -> bool {
        match rate {
            r if r.is_nan() || r <= 0.0 => false,
            r if r >= 1.0 => true,
            r => self.state.lock().gen_bool(r),
        }
    }

    /// Uniform value in `[-amplitude, amplitude]`.
    pub fn jitter(&self, amplitude: u32) -> i64 {
        if amplitude == 0 {
            return 0;
        }
        let a = i64::from(amplitude);
        self.state.lock().gen_range(-a..=a)
    }
}

impl Default for MockRng {
    fn default() -> Self {
        Self::new(None)
    }
}

impl std::fmt::Debug for MockRng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MockRng { .. }")
    }
}
