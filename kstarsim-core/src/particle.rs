use crate::random::RandomSource;
use crate::registry::{ParticleTypeRegistry, TypeIndex};
use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use thiserror::Error;

/// Failures of the per-particle kinematics
#[derive(Debug, Clone, PartialEq, Error)]
pub enum KinematicsError {
    #[error("decay cannot be performed if the parent mass is zero")]
    ZeroMassParent,
    #[error("parent mass {parent:.5} is below the daughter mass sum {daughters:.5}")]
    InsufficientMass { parent: f64, daughters: f64 },
    #[error("boost velocity squared {0} is not below 1")]
    InvalidBoost(f64),
    #[error("invariant mass squared {0} is negative")]
    InvalidKinematics(f64),
}

/// How the decay direction is drawn in the parent rest frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecayAngles {
    /// cos(theta) uniform in [-1, 1], phi uniform in [0, 2pi)
    #[default]
    Isotropic,
    /// theta uniform in [-pi/2, pi/2], which over-populates the poles
    Legacy,
}

/// A particle instance: a species handle plus a 3-momentum (GeV/c)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub type_index: TypeIndex,
    pub momentum: DVec3,
}

impl Particle {
    pub fn new(type_index: TypeIndex, momentum: DVec3) -> Self {
        Self {
            type_index,
            momentum,
        }
    }

    /// Particle of the named species at rest
    pub fn at_rest(
        registry: &ParticleTypeRegistry,
        name: &str,
    ) -> Result<Self, crate::registry::RegistryError> {
        Ok(Self::new(registry.lookup(name)?, DVec3::ZERO))
    }

    pub fn mass(&self, registry: &ParticleTypeRegistry) -> f64 {
        registry[self.type_index].mass
    }

    pub fn charge(&self, registry: &ParticleTypeRegistry) -> i32 {
        registry[self.type_index].charge
    }

    /// Total energy, sqrt(m^2 + |p|^2)
    pub fn energy(&self, registry: &ParticleTypeRegistry) -> f64 {
        energy_of(self.mass(registry), self.momentum)
    }

    /// Transverse momentum in the x-y plane
    pub fn transverse_momentum(&self) -> f64 {
        self.momentum.x.hypot(self.momentum.y)
    }

    /// Invariant mass squared of the pair, (E1 + E2)^2 - |p1 + p2|^2
    pub fn invariant_mass_squared(&self, other: &Particle, registry: &ParticleTypeRegistry) -> f64 {
        let energy = self.energy(registry) + other.energy(registry);
        let momentum = self.momentum + other.momentum;
        energy * energy - momentum.length_squared()
    }

    /// Invariant mass of the pair. A negative radicand yields NaN.
    pub fn invariant_mass(&self, other: &Particle, registry: &ParticleTypeRegistry) -> f64 {
        self.invariant_mass_squared(other, registry).sqrt()
    }

    /// Invariant mass of the pair, rejecting a negative radicand
    pub fn try_invariant_mass(
        &self,
        other: &Particle,
        registry: &ParticleTypeRegistry,
    ) -> Result<f64, KinematicsError> {
        let m2 = self.invariant_mass_squared(other, registry);
        if m2 < 0.0 || m2.is_nan() {
            return Err(KinematicsError::InvalidKinematics(m2));
        }
        Ok(m2.sqrt())
    }

    /// Lorentz-boost the momentum by velocity `b` (units of c). Mass is unchanged.
    pub fn boost(&mut self, b: DVec3, registry: &ParticleTypeRegistry) -> Result<(), KinematicsError> {
        let energy = self.energy(registry);
        self.momentum = boost_momentum(self.momentum, energy, b)?;
        Ok(())
    }

    /// Two-body decay into the given daughter species
    ///
    /// A resonance's decay mass is smeared as `mass + width * Z` with `Z`
    /// standard normal. This is a Gaussian line shape, not a Breit-Wigner.
    /// The daughters are produced back to back in the parent rest frame and
    /// boosted into the lab with the parent velocity. `self` is not modified.
    pub fn decay_two_body<R: RandomSource + ?Sized>(
        &self,
        daughter1: TypeIndex,
        daughter2: TypeIndex,
        registry: &ParticleTypeRegistry,
        angles: DecayAngles,
        rng: &mut R,
    ) -> Result<(Particle, Particle), KinematicsError> {
        let parent = &registry[self.type_index];
        if parent.mass == 0.0 {
            return Err(KinematicsError::ZeroMassParent);
        }

        let m1 = registry[daughter1].mass;
        let m2 = registry[daughter2].mass;

        let width = parent.width();
        let mut decay_mass = parent.mass;
        if width > 0.0 {
            decay_mass += width * rng.standard_normal();
        }

        if decay_mass < m1 + m2 {
            return Err(KinematicsError::InsufficientMass {
                parent: decay_mass,
                daughters: m1 + m2,
            });
        }

        let p_out = two_body_momentum(decay_mass, m1, m2);
        let direction = sample_direction(angles, rng);

        let mut first = Particle::new(daughter1, direction * p_out);
        let mut second = Particle::new(daughter2, -direction * p_out);

        let parent_energy = energy_of(decay_mass, self.momentum);
        let velocity = self.momentum / parent_energy;

        first.boost(velocity, registry)?;
        second.boost(velocity, registry)?;

        Ok((first, second))
    }
}

fn energy_of(mass: f64, momentum: DVec3) -> f64 {
    (mass * mass + momentum.length_squared()).sqrt()
}

/// Standard boost formula applied to the spatial part of (E, p)
fn boost_momentum(momentum: DVec3, energy: f64, b: DVec3) -> Result<DVec3, KinematicsError> {
    let b2 = b.length_squared();
    if !(b2 < 1.0) {
        return Err(KinematicsError::InvalidBoost(b2));
    }
    let gamma = 1.0 / (1.0 - b2).sqrt();
    let bp = b.dot(momentum);
    let gamma2 = if b2 > 0.0 { (gamma - 1.0) / b2 } else { 0.0 };

    Ok(momentum + b * (gamma2 * bp + gamma * energy))
}

/// Daughter momentum in the rest frame of a parent of mass `m` decaying to `m1 + m2`
pub fn two_body_momentum(m: f64, m1: f64, m2: f64) -> f64 {
    let sum = m1 + m2;
    let diff = m1 - m2;
    ((m * m - sum * sum) * (m * m - diff * diff)).sqrt() / (2.0 * m)
}

fn sample_direction<R: RandomSource + ?Sized>(angles: DecayAngles, rng: &mut R) -> DVec3 {
    let phi = 2.0 * PI * rng.uniform01();
    let (sin_theta, cos_theta) = match angles {
        DecayAngles::Isotropic => {
            let cos_theta = 2.0 * rng.uniform01() - 1.0;
            ((1.0 - cos_theta * cos_theta).max(0.0).sqrt(), cos_theta)
        }
        DecayAngles::Legacy => {
            let theta = PI * rng.uniform01() - PI / 2.0;
            theta.sin_cos()
        }
    };
    DVec3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::SeededSource;
    use crate::registry::KSTAR_WIDTH;

    #[test]
    fn test_two_body_momentum_at_threshold_is_zero() {
        assert_eq!(two_body_momentum(1.0, 0.5, 0.5), 0.0);
    }

    #[test]
    fn test_transverse_momentum() {
        let registry = ParticleTypeRegistry::standard(KSTAR_WIDTH).unwrap();
        let mut p = Particle::at_rest(&registry, "Pion(+)").unwrap();
        p.momentum = DVec3::new(3.0, 4.0, 12.0);
        assert_eq!(p.transverse_momentum(), 5.0);
    }

    #[test]
    fn test_isotropic_directions_have_unit_length() {
        let mut rng = SeededSource::new(11);
        for _ in 0..100 {
            let d = sample_direction(DecayAngles::Isotropic, &mut rng);
            assert!((d.length() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_legacy_directions_never_point_below_equator() {
        let mut rng = SeededSource::new(11);
        for _ in 0..100 {
            let d = sample_direction(DecayAngles::Legacy, &mut rng);
            assert!(d.z >= 0.0);
        }
    }

    #[test]
    fn test_invalid_radicand_policy() {
        let registry = ParticleTypeRegistry::standard(KSTAR_WIDTH).unwrap();
        let mut a = Particle::at_rest(&registry, "Pion(+)").unwrap();
        let b = Particle::at_rest(&registry, "Kaon(-)").unwrap();
        a.momentum = DVec3::new(f64::INFINITY, 0.0, 0.0);
        // inf - inf under the root: the unchecked form propagates NaN
        assert!(a.invariant_mass(&b, &registry).is_nan());
        assert!(matches!(
            a.try_invariant_mass(&b, &registry),
            Err(KinematicsError::InvalidKinematics(_))
        ));
    }
}
