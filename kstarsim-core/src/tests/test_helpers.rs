//! Test helper utilities for kstarsim tests

use crate::config::{RunConfig, SpeciesFractions};
use crate::generator::{EventGenerator, GenerationOutput};
use crate::registry::{ParticleTypeRegistry, KSTAR_WIDTH};
use crate::Result;

/// Check if two floating point values are approximately equal within tolerance
pub fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() <= tol
}

/// Registry with the seven standard species and the nominal K* width
pub fn standard_registry() -> ParticleTypeRegistry {
    ParticleTypeRegistry::standard(KSTAR_WIDTH).expect("standard species always fit")
}

/// Small reproducible run
pub fn quick_config(events: usize, particles_per_event: usize, seed: u64) -> RunConfig {
    RunConfig {
        events,
        particles_per_event,
        seed: Some(seed),
        ..RunConfig::default()
    }
}

/// Fractions that produce only one species family
pub fn only(kstar: f64, proton: f64, kaon: f64) -> SpeciesFractions {
    SpeciesFractions { kstar, proton, kaon }
}

/// Build a generator for `config` and run it to completion
pub fn run_config(config: RunConfig) -> Result<GenerationOutput> {
    EventGenerator::new(config)?.run()
}
