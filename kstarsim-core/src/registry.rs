//! Particle type table
//!
//! The registry owns every particle species known to a run. Particles refer
//! to their species through a [`TypeIndex`], never through a copy, so the
//! registry must outlive every particle created against it.

use std::fmt;
use thiserror::Error;

/// Maximum number of species a registry can hold
pub const MAX_PARTICLE_TYPES: usize = 10;

/// Nominal K* width (GeV)
pub const KSTAR_WIDTH: f64 = 0.050;

/// Name of the resonance species
pub const KSTAR: &str = "K*";

/// Errors raised while registering or resolving particle types
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("particle type '{0}' is already registered")]
    DuplicateType(String),
    #[error("cannot add particle type '{0}': table is full ({MAX_PARTICLE_TYPES} entries)")]
    RegistryFull(String),
    #[error("particle type '{0}' not found")]
    NotFound(String),
    #[error("particle type index {0} is out of range")]
    IndexOutOfRange(usize),
    #[error("invalid constant for particle type '{name}': {reason}")]
    InvalidConstant { name: String, reason: String },
}

/// Stable or resonant behaviour of a species
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParticleKind {
    Stable,
    Resonance { width: f64 },
}

/// Immutable physical constants of one species
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleType {
    pub name: String,
    pub mass: f64,
    pub charge: i32,
    pub kind: ParticleKind,
}

impl ParticleType {
    /// Decay width; zero for stable species
    pub fn width(&self) -> f64 {
        match self.kind {
            ParticleKind::Stable => 0.0,
            ParticleKind::Resonance { width } => width,
        }
    }

    pub fn is_resonance(&self) -> bool {
        matches!(self.kind, ParticleKind::Resonance { .. })
    }

    /// Species name with the trailing charge suffix removed, e.g. `Kaon(+)` -> `Kaon`
    pub fn base_name(&self) -> &str {
        strip_charge_suffix(&self.name)
    }
}

impl fmt::Display for ParticleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, " Particle: {}", self.name)?;
        writeln!(f, " Mass = {}", self.mass)?;
        write!(f, " Charge = {}", self.charge)?;
        if let ParticleKind::Resonance { width } = self.kind {
            write!(f, "\n Resonance width = {}", width)?;
        }
        Ok(())
    }
}

/// Strip a `(+)`, `(-)` or `(0)` suffix from a species name
pub fn strip_charge_suffix(name: &str) -> &str {
    ["(+)", "(-)", "(0)"]
        .iter()
        .find_map(|suffix| name.strip_suffix(suffix))
        .unwrap_or(name)
}

/// Opaque handle to a registry entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeIndex(usize);

impl TypeIndex {
    pub fn as_usize(self) -> usize {
        self.0
    }
}

/// Bounded table of particle species
#[derive(Debug, Clone, Default)]
pub struct ParticleTypeRegistry {
    types: Vec<ParticleType>,
}

impl ParticleTypeRegistry {
    pub fn new() -> Self {
        Self {
            types: Vec::with_capacity(MAX_PARTICLE_TYPES),
        }
    }

    /// Registry holding the pion, kaon, proton and K* species used by the generator
    pub fn standard(kstar_width: f64) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        registry.seed_standard(kstar_width)?;
        Ok(registry)
    }

    /// Register every standard species not present yet; existing entries are kept as they are
    pub fn seed_standard(&mut self, kstar_width: f64) -> Result<(), RegistryError> {
        let standard = [
            ("Pion(+)", 0.13957, 1, 0.0),
            ("Pion(-)", 0.13957, -1, 0.0),
            ("Kaon(+)", 0.49367, 1, 0.0),
            ("Kaon(-)", 0.49367, -1, 0.0),
            ("Proton(+)", 0.93827, 1, 0.0),
            ("Proton(-)", 0.93827, -1, 0.0),
            (KSTAR, 0.89166, 0, kstar_width),
        ];
        for (name, mass, charge, width) in standard {
            if self.lookup(name).is_err() {
                self.register(name, mass, charge, width)?;
            }
        }
        Ok(())
    }

    /// Add a species. A zero width registers a stable type, a positive width a resonance.
    pub fn register(
        &mut self,
        name: &str,
        mass: f64,
        charge: i32,
        width: f64,
    ) -> Result<TypeIndex, RegistryError> {
        if self.lookup(name).is_ok() {
            return Err(RegistryError::DuplicateType(name.to_string()));
        }
        if self.types.len() >= MAX_PARTICLE_TYPES {
            return Err(RegistryError::RegistryFull(name.to_string()));
        }
        if !mass.is_finite() || mass < 0.0 {
            return Err(RegistryError::InvalidConstant {
                name: name.to_string(),
                reason: format!("mass must be finite and non-negative, got {}", mass),
            });
        }
        if !width.is_finite() || width < 0.0 {
            return Err(RegistryError::InvalidConstant {
                name: name.to_string(),
                reason: format!("width must be finite and non-negative, got {}", width),
            });
        }

        let kind = if width > 0.0 {
            ParticleKind::Resonance { width }
        } else {
            ParticleKind::Stable
        };
        let index = TypeIndex(self.types.len());
        self.types.push(ParticleType {
            name: name.to_string(),
            mass,
            charge,
            kind,
        });
        tracing::debug!(name, mass, charge, width, "registered particle type");
        Ok(index)
    }

    pub fn lookup(&self, name: &str) -> Result<TypeIndex, RegistryError> {
        self.types
            .iter()
            .position(|t| t.name == name)
            .map(TypeIndex)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn index_to_name(&self, index: usize) -> Result<&str, RegistryError> {
        self.types
            .get(index)
            .map(|t| t.name.as_str())
            .ok_or(RegistryError::IndexOutOfRange(index))
    }

    pub fn get(&self, index: TypeIndex) -> &ParticleType {
        &self.types[index.0]
    }

    pub fn count(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeIndex, &ParticleType)> {
        self.types.iter().enumerate().map(|(i, t)| (TypeIndex(i), t))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.iter().map(|t| t.name.as_str())
    }
}

impl std::ops::Index<TypeIndex> for ParticleTypeRegistry {
    type Output = ParticleType;

    fn index(&self, index: TypeIndex) -> &ParticleType {
        self.get(index)
    }
}

impl fmt::Display for ParticleTypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for particle_type in &self.types {
            writeln!(f, "{}\n", particle_type)?;
        }
        Ok(())
    }
}
