//! The set of distributions filled by a generation run

use crate::error::{Error, Result};
use crate::histogram::{Histogram, HistogramError};
use crate::registry::ParticleTypeRegistry;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fs;
use std::path::Path;

pub const ANGLE_BINS: usize = 500;
pub const MOMENTUM_BINS: usize = 1000;
pub const MOMENTUM_MAX: f64 = 10.0;
pub const INV_MASS_BINS: usize = 80;
pub const INV_MASS_MAX: f64 = 2.0;

/// Invariant-mass distributions by pair selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvMassKind {
    /// Every pair without a K*
    All,
    SameSign,
    SameSignPionKaon,
    OppositeSign,
    OppositeSignPionKaon,
    /// The two daughters of one K* decay
    DecayProducts,
}

impl InvMassKind {
    pub const ALL: [InvMassKind; 6] = [
        InvMassKind::All,
        InvMassKind::SameSign,
        InvMassKind::SameSignPionKaon,
        InvMassKind::OppositeSign,
        InvMassKind::OppositeSignPionKaon,
        InvMassKind::DecayProducts,
    ];

    pub fn title(self) -> &'static str {
        match self {
            InvMassKind::All => "Invariant mass between every particle",
            InvMassKind::SameSign => "Invariant mass: concordant charge",
            InvMassKind::SameSignPionKaon => "Invariant mass: Pion-Kaon concordant charge",
            InvMassKind::OppositeSign => "Invariant mass: discordant charge",
            InvMassKind::OppositeSignPionKaon => "Invariant mass: Pion-Kaon discordant charge",
            InvMassKind::DecayProducts => "Invariant mass: same K* decay products",
        }
    }
}

/// Accumulators written by the generator and read by the analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramSet {
    pub abundances: Histogram,
    pub theta: Histogram,
    pub phi: Histogram,
    pub momentum: Histogram,
    pub transverse_momentum: Histogram,
    pub energy: Histogram,
    pub inv_mass_all: Histogram,
    pub inv_mass_same_sign: Histogram,
    pub inv_mass_same_sign_pi_k: Histogram,
    pub inv_mass_opposite_sign: Histogram,
    pub inv_mass_opposite_sign_pi_k: Histogram,
    pub inv_mass_decay_products: Histogram,
}

impl HistogramSet {
    /// Empty accumulators; the abundance histogram gets one labelled bin per registered species
    pub fn new(registry: &ParticleTypeRegistry) -> std::result::Result<Self, HistogramError> {
        let names: Vec<&str> = registry.names().collect();
        let inv_mass = |kind: InvMassKind| Histogram::new(kind.title(), INV_MASS_BINS, 0.0, INV_MASS_MAX);
        Ok(Self {
            abundances: Histogram::with_labels("Number of particles per type", &names)?,
            theta: Histogram::new("Distribution of polar angle theta", ANGLE_BINS, 0.0, PI)?,
            phi: Histogram::new("Distribution of azimuthal angle phi", ANGLE_BINS, 0.0, 2.0 * PI)?,
            momentum: Histogram::new("Momentum distribution", MOMENTUM_BINS, 0.0, MOMENTUM_MAX)?,
            transverse_momentum: Histogram::new(
                "Transverse momentum distribution",
                MOMENTUM_BINS,
                0.0,
                MOMENTUM_MAX,
            )?,
            energy: Histogram::new("Particle energy distribution", MOMENTUM_BINS, 0.0, MOMENTUM_MAX)?,
            inv_mass_all: inv_mass(InvMassKind::All)?,
            inv_mass_same_sign: inv_mass(InvMassKind::SameSign)?,
            inv_mass_same_sign_pi_k: inv_mass(InvMassKind::SameSignPionKaon)?,
            inv_mass_opposite_sign: inv_mass(InvMassKind::OppositeSign)?,
            inv_mass_opposite_sign_pi_k: inv_mass(InvMassKind::OppositeSignPionKaon)?,
            inv_mass_decay_products: inv_mass(InvMassKind::DecayProducts)?,
        })
    }

    pub fn inv_mass(&self, kind: InvMassKind) -> &Histogram {
        match kind {
            InvMassKind::All => &self.inv_mass_all,
            InvMassKind::SameSign => &self.inv_mass_same_sign,
            InvMassKind::SameSignPionKaon => &self.inv_mass_same_sign_pi_k,
            InvMassKind::OppositeSign => &self.inv_mass_opposite_sign,
            InvMassKind::OppositeSignPionKaon => &self.inv_mass_opposite_sign_pi_k,
            InvMassKind::DecayProducts => &self.inv_mass_decay_products,
        }
    }

    pub fn inv_mass_mut(&mut self, kind: InvMassKind) -> &mut Histogram {
        match kind {
            InvMassKind::All => &mut self.inv_mass_all,
            InvMassKind::SameSign => &mut self.inv_mass_same_sign,
            InvMassKind::SameSignPionKaon => &mut self.inv_mass_same_sign_pi_k,
            InvMassKind::OppositeSign => &mut self.inv_mass_opposite_sign,
            InvMassKind::OppositeSignPionKaon => &mut self.inv_mass_opposite_sign_pi_k,
            InvMassKind::DecayProducts => &mut self.inv_mass_decay_products,
        }
    }

    /// Every histogram with a stable key, in file order
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Histogram)> {
        [
            ("abundances", &self.abundances),
            ("theta", &self.theta),
            ("phi", &self.phi),
            ("momentum", &self.momentum),
            ("transverse_momentum", &self.transverse_momentum),
            ("energy", &self.energy),
            ("inv_mass_all", &self.inv_mass_all),
            ("inv_mass_same_sign", &self.inv_mass_same_sign),
            ("inv_mass_same_sign_pi_k", &self.inv_mass_same_sign_pi_k),
            ("inv_mass_opposite_sign", &self.inv_mass_opposite_sign),
            ("inv_mass_opposite_sign_pi_k", &self.inv_mass_opposite_sign_pi_k),
            ("inv_mass_decay_products", &self.inv_mass_decay_products),
        ]
        .into_iter()
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut Histogram> {
        [
            &mut self.abundances,
            &mut self.theta,
            &mut self.phi,
            &mut self.momentum,
            &mut self.transverse_momentum,
            &mut self.energy,
            &mut self.inv_mass_all,
            &mut self.inv_mass_same_sign,
            &mut self.inv_mass_same_sign_pi_k,
            &mut self.inv_mass_opposite_sign,
            &mut self.inv_mass_opposite_sign_pi_k,
            &mut self.inv_mass_decay_products,
        ]
        .into_iter()
    }

    /// Add another set's contents into this one
    pub fn merge(&mut self, other: &HistogramSet) -> std::result::Result<(), HistogramError> {
        for (mine, (_, theirs)) in self.iter_mut().zip(other.iter()) {
            mine.merge(theirs)?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.iter().all(|(_, h)| h.is_empty())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string(self)?;
        fs::write(path, json).map_err(|e| Error::io(format!("writing {}", path.display()), e))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .map_err(|e| Error::io(format!("reading {}", path.display()), e))?;
        let set: HistogramSet = serde_json::from_str(&json)?;
        for (_, histogram) in set.iter() {
            histogram.validate()?;
        }
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::KSTAR_WIDTH;

    #[test]
    fn test_new_set_is_empty_with_labelled_abundances() {
        let registry = ParticleTypeRegistry::standard(KSTAR_WIDTH).unwrap();
        let set = HistogramSet::new(&registry).unwrap();
        assert!(set.is_empty());
        assert_eq!(set.abundances.bins(), registry.count());
        assert_eq!(set.abundances.label(6), Some("K*"));
        assert_eq!(set.iter().count(), 12);
    }

    #[test]
    fn test_merge_adds_every_histogram() {
        let registry = ParticleTypeRegistry::standard(KSTAR_WIDTH).unwrap();
        let mut a = HistogramSet::new(&registry).unwrap();
        let mut b = a.clone();
        a.theta.fill(1.0);
        b.theta.fill(1.0);
        b.inv_mass_mut(InvMassKind::DecayProducts).fill(0.9);
        a.merge(&b).unwrap();
        assert_eq!(a.theta.entries(), 2.0);
        assert_eq!(a.inv_mass(InvMassKind::DecayProducts).entries(), 1.0);
    }
}
