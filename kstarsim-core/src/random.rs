//! Pseudo-random number sources used by the generator and decays

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp, StandardNormal};

/// The draws the simulation needs from a random number generator
pub trait RandomSource {
    /// Uniform draw in [0, 1)
    fn uniform01(&mut self) -> f64;
    /// Draw from N(0, 1)
    fn standard_normal(&mut self) -> f64;
    /// Draw from an exponential distribution with the given rate (mean = 1/rate)
    fn exponential(&mut self, rate: f64) -> f64;
    /// Restart the stream from `seed`
    fn reseed(&mut self, seed: u64);
}

/// Seeded source backed by `StdRng`
#[derive(Debug, Clone)]
pub struct SeededSource {
    rng: StdRng,
    seed: u64,
}

impl SeededSource {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed,
        }
    }

    /// Source seeded from OS entropy; the drawn seed is kept so the run can be replayed
    pub fn from_entropy() -> Self {
        Self::new(rand::thread_rng().gen())
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl RandomSource for SeededSource {
    fn uniform01(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    fn standard_normal(&mut self) -> f64 {
        StandardNormal.sample(&mut self.rng)
    }

    fn exponential(&mut self, rate: f64) -> f64 {
        match Exp::new(rate) {
            Ok(dist) => dist.sample(&mut self.rng),
            Err(_) => f64::NAN,
        }
    }

    fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
        self.seed = seed;
    }
}

/// Seed of the independent stream used for one event of a run
///
/// SplitMix64 finaliser over `(run_seed, event)`, so neighbouring events do
/// not get correlated streams and the result does not depend on which worker
/// handles the event.
pub fn event_seed(run_seed: u64, event: u64) -> u64 {
    let mut z = run_seed ^ event.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
