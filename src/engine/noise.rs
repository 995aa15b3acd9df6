//! Finish-time perturbation.
//!
//! Driver and track variance is modelled as bounded noise added to each
//! entrant's nominal time. The source is injected so races can be replayed
//! from a seed.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Supplies one perturbation (in seconds) per entrant.
pub trait NoiseSource {
    fn perturbation(&mut self) -> f64;
}

/// No variance: finish times are exactly the nominal times.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoNoise;

impl NoiseSource for NoNoise {
    fn perturbation(&mut self) -> f64 {
        0.0
    }
}

/// Uniform noise in `[-bound, +bound]` seconds.
#[derive(Debug, Clone)]
pub struct UniformNoise<R> {
    bound: f64,
    rng: R,
}

impl<R: Rng> UniformNoise<R> {
    pub fn new(bound: f64, rng: R) -> Self {
        let bound = if bound.is_finite() { bound.abs() } else { 0.0 };
        Self { bound, rng }
    }
}

impl UniformNoise<StdRng> {
    /// Reproducible noise: the same seed yields the same sequence.
    pub fn seeded(bound: f64, seed: u64) -> Self {
        Self::new(bound, StdRng::seed_from_u64(seed))
    }

    /// Fresh OS-seeded noise for live races.
    pub fn from_os_rng(bound: f64) -> Self {
        Self::new(bound, StdRng::from_os_rng())
    }
}

impl<R: Rng> NoiseSource for UniformNoise<R> {
    fn perturbation(&mut self) -> f64 {
        if self.bound == 0.0 {
            return 0.0;
        }
        self.rng.random_range(-self.bound..=self.bound)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
