//! Run and analysis configuration
//!
//! Everything a run needs is explicit here and can be loaded from a TOML
//! file; missing keys fall back to the defaults of the reference experiment
//! (100k events of 100 particles, 1% K*).

use crate::fit::ModelFamily;
use crate::particle::DecayAngles;
use crate::registry::KSTAR_WIDTH;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("failed to read config file {path:?}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Top-level configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            source: e,
        })
    }
}

/// Parameters of one generation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_events")]
    pub events: usize,

    #[serde(default = "default_particles_per_event")]
    pub particles_per_event: usize,

    /// Fixed seed for a reproducible run; drawn from entropy when absent
    #[serde(default)]
    pub seed: Option<u64>,

    /// Width of the K* line shape; zero disables the mass smearing
    #[serde(default = "default_kstar_width")]
    pub kstar_width: f64,

    #[serde(default)]
    pub decay_angles: DecayAngles,

    /// Spread the events over the rayon thread pool
    #[serde(default)]
    pub parallel: bool,

    #[serde(default)]
    pub species: SpeciesFractions,
}

fn default_events() -> usize {
    100_000
}

fn default_particles_per_event() -> usize {
    100
}

fn default_kstar_width() -> f64 {
    KSTAR_WIDTH
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            events: default_events(),
            particles_per_event: default_particles_per_event(),
            seed: None,
            kstar_width: default_kstar_width(),
            decay_angles: DecayAngles::default(),
            parallel: false,
            species: SpeciesFractions::default(),
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.events == 0 {
            return Err(ConfigError::InvalidConfiguration(
                "number of events must be positive".into(),
            ));
        }
        if self.particles_per_event == 0 {
            return Err(ConfigError::InvalidConfiguration(
                "particles per event must be positive".into(),
            ));
        }
        if !self.kstar_width.is_finite() || self.kstar_width < 0.0 {
            return Err(ConfigError::InvalidConfiguration(format!(
                "K* width must be finite and non-negative, got {}",
                self.kstar_width
            )));
        }
        self.species.validate()
    }
}

/// Probabilities of drawing each species family; pions take the remainder
///
/// Charged families are split 50/50 between the two charges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeciesFractions {
    #[serde(default = "default_kstar_fraction")]
    pub kstar: f64,
    #[serde(default = "default_proton_fraction")]
    pub proton: f64,
    #[serde(default = "default_kaon_fraction")]
    pub kaon: f64,
}

fn default_kstar_fraction() -> f64 {
    0.01
}

fn default_proton_fraction() -> f64 {
    0.09
}

fn default_kaon_fraction() -> f64 {
    0.10
}

impl Default for SpeciesFractions {
    fn default() -> Self {
        Self {
            kstar: default_kstar_fraction(),
            proton: default_proton_fraction(),
            kaon: default_kaon_fraction(),
        }
    }
}

impl SpeciesFractions {
    pub fn pion(&self) -> f64 {
        (1.0 - self.kstar - self.proton - self.kaon).max(0.0)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [("kstar", self.kstar), ("proton", self.proton), ("kaon", self.kaon)] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidConfiguration(format!(
                    "species fraction '{}' must be finite and non-negative, got {}",
                    name, value
                )));
            }
        }
        let total = self.kstar + self.proton + self.kaon;
        if total > 1.0 + 1e-12 {
            return Err(ConfigError::InvalidConfiguration(format!(
                "species fractions sum to {} (> 1)",
                total
            )));
        }
        Ok(())
    }
}

/// Expectations and options of the consistency analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Mean of the generated momentum spectrum (GeV/c)
    #[serde(default = "default_expected_momentum_mean")]
    pub expected_momentum_mean: f64,

    #[serde(default = "default_angular_model")]
    pub angular_model: ModelFamily,

    #[serde(default)]
    pub expected_slope: f64,

    /// Attach a display window around the peak of each resonance plot
    #[serde(default)]
    pub zoom: bool,

    #[serde(default = "default_zoom_half_width")]
    pub zoom_half_width: f64,
}

fn default_expected_momentum_mean() -> f64 {
    1.0
}

fn default_angular_model() -> ModelFamily {
    ModelFamily::Linear
}

fn default_zoom_half_width() -> f64 {
    0.3
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            expected_momentum_mean: default_expected_momentum_mean(),
            angular_model: default_angular_model(),
            expected_slope: 0.0,
            zoom: false,
            zoom_half_width: default_zoom_half_width(),
        }
    }
}

/// Commented sample configuration, printed by `kstarsim example-config`
pub const EXAMPLE_CONFIG: &str = r#"# kstarsim configuration file

[run]
events = 100000
particles_per_event = 100
# seed = 42                  # omit for an entropy seed (printed in the log)
kstar_width = 0.050          # GeV; 0 disables the mass smearing
decay_angles = "isotropic"   # or "legacy" for the pole-biased sampling
parallel = false

[run.species]
kstar = 0.01
proton = 0.09
kaon = 0.10                  # pions take the remainder

[analysis]
expected_momentum_mean = 1.0
angular_model = "linear"     # or "constant"
expected_slope = 0.0
zoom = false
zoom_half_width = 0.3
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_config_parses_to_defaults() {
        let config: Config = toml::from_str(EXAMPLE_CONFIG).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str("[run]\nevents = 10\nseed = 3\n").unwrap();
        assert_eq!(config.run.events, 10);
        assert_eq!(config.run.seed, Some(3));
        assert_eq!(config.run.particles_per_event, 100);
        assert_eq!(config.run.species, SpeciesFractions::default());
        assert_eq!(config.analysis.angular_model, ModelFamily::Linear);
    }

    #[test]
    fn test_zero_events_rejected() {
        let config = RunConfig {
            events: 0,
            ..RunConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_fractions_over_one_rejected() {
        let fractions = SpeciesFractions {
            kstar: 0.5,
            proton: 0.3,
            kaon: 0.3,
        };
        assert!(fractions.validate().is_err());
    }

    #[test]
    fn test_pion_takes_remainder() {
        let fractions = SpeciesFractions::default();
        assert!((fractions.pion() - 0.80).abs() < 1e-12);
    }
}
