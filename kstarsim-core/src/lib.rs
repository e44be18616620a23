pub mod analysis;
pub mod config;
pub mod error;
pub mod fit;
pub mod generator;
pub mod histogram;
pub mod observables;
pub mod particle;
pub mod random;
pub mod registry;

pub use analysis::{overlap, AnalysisSummary, ConsistencyAnalyzer};
pub use config::{AnalysisConfig, Config, ConfigError, RunConfig, SpeciesFractions};
pub use error::{Error, Result};
pub use fit::{FitError, FitResult, Fitter, LeastSquaresFitter, ModelFamily};
pub use generator::{EventGenerator, EventSampler, GenerationOutput, GeneratorState, RunStats};
pub use histogram::{Histogram, HistogramError};
pub use observables::{HistogramSet, InvMassKind};
pub use particle::{DecayAngles, KinematicsError, Particle};
pub use random::{RandomSource, SeededSource};
pub use registry::{ParticleType, ParticleTypeRegistry, RegistryError, TypeIndex};

// Test helpers module (public for integration tests)
// Always compiled - integration tests are separate crates and need access
pub mod tests;
