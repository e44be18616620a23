//! Monte-Carlo event generation
//!
//! A run seeds the particle table, then produces `events` independent
//! events. Each event draws a population of particles, decays every K*
//! into a pion-kaon pair, and fills the invariant mass of every pair into
//! the sign- and species-selected distributions.

use crate::config::{RunConfig, SpeciesFractions};
use crate::error::{Error, Result};
use crate::observables::{HistogramSet, InvMassKind};
use crate::particle::{DecayAngles, Particle};
use crate::random::{event_seed, RandomSource, SeededSource};
use crate::registry::{ParticleTypeRegistry, TypeIndex, KSTAR};
use glam::DVec3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Lifecycle of a generator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    Idle,
    Seeding,
    Generating { event: usize },
    Finalizing,
    Done,
}

/// Counters collected while generating
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub seed: u64,
    pub events: usize,
    pub particles: usize,
    pub decays: usize,
    pub failed_decays: usize,
    pub pairs: usize,
    pub invalid_pairs: usize,
    pub elapsed_secs: f64,
}

impl RunStats {
    fn absorb(&mut self, other: &RunStats) {
        self.events += other.events;
        self.particles += other.particles;
        self.decays += other.decays;
        self.failed_decays += other.failed_decays;
        self.pairs += other.pairs;
        self.invalid_pairs += other.invalid_pairs;
    }
}

/// Final accumulators of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOutput {
    pub histograms: HistogramSet,
    pub stats: RunStats,
}

/// Species family after the charge suffix is stripped from the name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Pion,
    Kaon,
    Other,
}

/// Resolved registry handles for everything the sampler draws
#[derive(Debug, Clone)]
struct SpeciesTable {
    pion_plus: TypeIndex,
    pion_minus: TypeIndex,
    kaon_plus: TypeIndex,
    kaon_minus: TypeIndex,
    proton_plus: TypeIndex,
    proton_minus: TypeIndex,
    kstar: TypeIndex,
    /// Family of every registry entry, by index
    families: Vec<Family>,
}

impl SpeciesTable {
    fn resolve(registry: &ParticleTypeRegistry) -> Result<Self> {
        let families = registry
            .iter()
            .map(|(_, t)| match t.base_name() {
                "Pion" => Family::Pion,
                "Kaon" => Family::Kaon,
                _ => Family::Other,
            })
            .collect();
        Ok(Self {
            pion_plus: registry.lookup("Pion(+)")?,
            pion_minus: registry.lookup("Pion(-)")?,
            kaon_plus: registry.lookup("Kaon(+)")?,
            kaon_minus: registry.lookup("Kaon(-)")?,
            proton_plus: registry.lookup("Proton(+)")?,
            proton_minus: registry.lookup("Proton(-)")?,
            kstar: registry.lookup(KSTAR)?,
            families,
        })
    }

    fn family(&self, index: TypeIndex) -> Family {
        self.families[index.as_usize()]
    }
}

/// Per-event sampling and filling logic, shared read-only by every worker
#[derive(Debug, Clone)]
pub struct EventSampler<'a> {
    registry: &'a ParticleTypeRegistry,
    species: SpeciesTable,
    fractions: SpeciesFractions,
    decay_angles: DecayAngles,
}

impl<'a> EventSampler<'a> {
    pub fn new(
        registry: &'a ParticleTypeRegistry,
        fractions: SpeciesFractions,
        decay_angles: DecayAngles,
    ) -> Result<Self> {
        Ok(Self {
            registry,
            species: SpeciesTable::resolve(registry)?,
            fractions,
            decay_angles,
        })
    }

    /// Draw a species from the configured fractions
    pub fn draw_species<R: RandomSource + ?Sized>(&self, rng: &mut R) -> TypeIndex {
        let s = &self.species;
        let u = rng.uniform01();
        let f = &self.fractions;
        if u < f.kstar {
            return s.kstar;
        }
        let (plus, minus) = if u < f.kstar + f.proton {
            (s.proton_plus, s.proton_minus)
        } else if u < f.kstar + f.proton + f.kaon {
            (s.kaon_plus, s.kaon_minus)
        } else {
            (s.pion_plus, s.pion_minus)
        };
        if rng.uniform01() < 0.5 {
            plus
        } else {
            minus
        }
    }

    /// Generate one event of `multiplicity` particles and fill `histograms`
    pub fn generate_event<R: RandomSource + ?Sized>(
        &self,
        multiplicity: usize,
        rng: &mut R,
        histograms: &mut HistogramSet,
        stats: &mut RunStats,
    ) -> Result<()> {
        let registry = self.registry;
        let kstar = self.species.kstar;
        let mut particles = Vec::with_capacity(multiplicity + multiplicity / 10);

        for _ in 0..multiplicity {
            let type_index = self.draw_species(rng);
            histograms.abundances.fill_labeled(&registry[type_index].name)?;

            let theta = rng.uniform01() * PI;
            let phi = rng.uniform01() * 2.0 * PI;
            let p = rng.exponential(1.0);

            let momentum = DVec3::new(
                p * theta.sin() * phi.cos(),
                p * theta.sin() * phi.sin(),
                p * theta.cos(),
            );
            let particle = Particle::new(type_index, momentum);

            histograms.theta.fill(theta);
            histograms.phi.fill(phi);
            histograms.momentum.fill(p);
            histograms.transverse_momentum.fill(particle.transverse_momentum());
            histograms.energy.fill(particle.energy(registry));

            particles.push(particle);
        }
        stats.particles += multiplicity;

        // daughters are appended in pairs after the primary particles
        for i in 0..multiplicity {
            if particles[i].type_index != kstar {
                continue;
            }
            let (pion, kaon) = if rng.uniform01() < 0.5 {
                (self.species.pion_plus, self.species.kaon_minus)
            } else {
                (self.species.pion_minus, self.species.kaon_plus)
            };
            match particles[i].decay_two_body(pion, kaon, registry, self.decay_angles, rng) {
                Ok((first, second)) => {
                    particles.push(first);
                    particles.push(second);
                    stats.decays += 1;
                }
                Err(e) => {
                    warn!("skipping K* decay: {}", e);
                    stats.failed_decays += 1;
                }
            }
        }

        for i in 0..particles.len() {
            let a = &particles[i];
            if a.type_index == kstar {
                continue;
            }
            for b in &particles[i + 1..] {
                if b.type_index == kstar {
                    continue;
                }
                let mass = match a.try_invariant_mass(b, registry) {
                    Ok(mass) => mass,
                    Err(e) => {
                        debug!("skipping pair: {}", e);
                        stats.invalid_pairs += 1;
                        continue;
                    }
                };
                stats.pairs += 1;
                histograms.inv_mass_all.fill(mass);

                let charge_product = a.charge(registry) * b.charge(registry);
                let pion_kaon = matches!(
                    (self.species.family(a.type_index), self.species.family(b.type_index)),
                    (Family::Pion, Family::Kaon) | (Family::Kaon, Family::Pion)
                );
                if charge_product > 0 {
                    histograms.inv_mass_same_sign.fill(mass);
                    if pion_kaon {
                        histograms.inv_mass_same_sign_pi_k.fill(mass);
                    }
                } else if charge_product < 0 {
                    histograms.inv_mass_opposite_sign.fill(mass);
                    if pion_kaon {
                        histograms.inv_mass_opposite_sign_pi_k.fill(mass);
                    }
                }
            }
        }

        for pair in particles[multiplicity..].chunks_exact(2) {
            match pair[0].try_invariant_mass(&pair[1], registry) {
                Ok(mass) => histograms.inv_mass_mut(InvMassKind::DecayProducts).fill(mass),
                Err(e) => {
                    debug!("skipping decay pair: {}", e);
                    stats.invalid_pairs += 1;
                }
            }
        }

        stats.events += 1;
        Ok(())
    }
}

/// Drives a full run through seeding, generation and finalisation
#[derive(Debug)]
pub struct EventGenerator {
    config: RunConfig,
    registry: ParticleTypeRegistry,
    state: GeneratorState,
}

impl EventGenerator {
    /// Generator with an empty registry, seeded with the standard species on `run`
    pub fn new(config: RunConfig) -> Result<Self> {
        Self::with_registry(config, ParticleTypeRegistry::new())
    }

    /// Generator using an existing registry; it must contain (or accept) the standard species
    pub fn with_registry(config: RunConfig, registry: ParticleTypeRegistry) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            registry,
            state: GeneratorState::Idle,
        })
    }

    pub fn state(&self) -> GeneratorState {
        self.state
    }

    pub fn registry(&self) -> &ParticleTypeRegistry {
        &self.registry
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run every event and hand back the final accumulators
    pub fn run(&mut self) -> Result<GenerationOutput> {
        if self.state == GeneratorState::Done {
            return Err(Error::AlreadyFinished);
        }

        self.state = GeneratorState::Seeding;
        self.registry.seed_standard(self.config.kstar_width)?;
        let seed = match self.config.seed {
            Some(seed) => seed,
            None => SeededSource::from_entropy().seed(),
        };
        info!(
            seed,
            events = self.config.events,
            particles_per_event = self.config.particles_per_event,
            "seeded generator"
        );

        let sampler = EventSampler::new(&self.registry, self.config.species, self.config.decay_angles)?;
        let template = HistogramSet::new(&self.registry)?;

        let started = Instant::now();
        let (histograms, mut stats) = if self.config.parallel {
            self.state = GeneratorState::Generating { event: 0 };
            generate_parallel(&sampler, &self.config, seed, &template)?
        } else {
            let mut histograms = template;
            let mut stats = RunStats::default();
            let mut rng = SeededSource::new(seed);
            let step = (self.config.events / 20).max(1);
            for event in 0..self.config.events {
                self.state = GeneratorState::Generating { event };
                if event % step == 0 {
                    info!("generated {}% of events", event * 100 / self.config.events);
                }
                rng.reseed(event_seed(seed, event as u64));
                sampler.generate_event(self.config.particles_per_event, &mut rng, &mut histograms, &mut stats)?;
            }
            (histograms, stats)
        };

        self.state = GeneratorState::Finalizing;
        stats.seed = seed;
        stats.elapsed_secs = started.elapsed().as_secs_f64();
        info!(
            events = stats.events,
            decays = stats.decays,
            failed_decays = stats.failed_decays,
            pairs = stats.pairs,
            elapsed_secs = stats.elapsed_secs,
            "generation finished"
        );

        self.state = GeneratorState::Done;
        Ok(GenerationOutput { histograms, stats })
    }
}

/// One accumulator set per rayon worker, merged at the end
fn generate_parallel(
    sampler: &EventSampler<'_>,
    config: &RunConfig,
    seed: u64,
    template: &HistogramSet,
) -> Result<(HistogramSet, RunStats)> {
    (0..config.events)
        .into_par_iter()
        .try_fold(
            || (template.clone(), RunStats::default(), SeededSource::new(seed)),
            |(mut histograms, mut stats, mut rng), event| {
                rng.reseed(event_seed(seed, event as u64));
                sampler.generate_event(config.particles_per_event, &mut rng, &mut histograms, &mut stats)?;
                Ok::<_, Error>((histograms, stats, rng))
            },
        )
        .map(|partial| partial.map(|(histograms, stats, _)| (histograms, stats)))
        .try_reduce(
            || (template.clone(), RunStats::default()),
            |(mut histograms, mut stats), (other, other_stats)| {
                histograms.merge(&other)?;
                stats.absorb(&other_stats);
                Ok((histograms, stats))
            },
        )
}
