//! Statistical verification of a finished run
//!
//! Every check fits a histogram with a reference model and compares the
//! extracted quantity with its expectation through [`overlap`]. This is an
//! interval check between `value ± error` bands, not a hypothesis test at a
//! fixed confidence level.

use crate::config::AnalysisConfig;
use crate::error::{Error, Result};
use crate::fit::{FitError, FitResult, Fitter, LeastSquaresFitter, ModelFamily};
use crate::histogram::Histogram;
use crate::observables::{HistogramSet, InvMassKind};
use tracing::{debug, info, warn};

/// Two `value ± error` intervals intersect
pub fn overlap(v1: f64, e1: f64, v2: f64, e2: f64) -> bool {
    v1 + e1 >= v2 - e2 && v1 - e1 <= v2 + e2
}

/// Consistency of two resonance mass estimates
pub fn compare_signals(mean_a: f64, err_a: f64, mean_b: f64, err_b: f64) -> bool {
    overlap(mean_a, err_a, mean_b, err_b)
}

/// Fit of an angular distribution with a constant or linear model
#[derive(Debug, Clone, PartialEq)]
pub struct AngularReport {
    pub title: String,
    pub fit: FitResult,
    pub intercept: (f64, f64),
    /// Only present for a linear model
    pub slope: Option<(f64, f64)>,
    pub expected_slope: f64,
    /// `None` when the model has no slope to test
    pub consistent: Option<bool>,
}

/// Fit of the momentum spectrum with `a * exp(-b * x)`
#[derive(Debug, Clone, PartialEq)]
pub struct MomentumReport {
    pub title: String,
    pub fit: FitResult,
    /// `1 / b` with its propagated error
    pub mean: (f64, f64),
    pub expected_mean: f64,
    pub consistent: bool,
}

/// Gaussian fit of one resonance signal
#[derive(Debug, Clone, PartialEq)]
pub struct PeakReport {
    pub title: String,
    pub fit: FitResult,
    pub mass: (f64, f64),
    pub width: (f64, f64),
    /// Plotting window around the maximum bin; the fit always uses the full axis
    pub display_window: Option<(f64, f64)>,
}

/// Background subtraction `minuend - subtrahend`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalPair {
    pub minuend: InvMassKind,
    pub subtrahend: InvMassKind,
}

impl SignalPair {
    pub const STANDARD: [SignalPair; 2] = [
        SignalPair {
            minuend: InvMassKind::OppositeSign,
            subtrahend: InvMassKind::SameSign,
        },
        SignalPair {
            minuend: InvMassKind::OppositeSignPionKaon,
            subtrahend: InvMassKind::SameSignPionKaon,
        },
    ];

    pub fn title(&self) -> String {
        format!("{} minus {}", self.minuend.title(), self.subtrahend.title())
    }
}

/// Every extracted resonance signal
#[derive(Debug)]
pub struct ResonanceReport {
    pub subtracted: Vec<(SignalPair, Result<PeakReport>)>,
    pub decay_products: Result<PeakReport>,
}

/// Outcome of comparing two extracted signals
#[derive(Debug, Clone, PartialEq)]
pub struct SignalComparison {
    pub first: String,
    pub second: String,
    pub consistent: bool,
}

impl ResonanceReport {
    /// Successful peaks, subtracted ones first and the decay products last
    pub fn peaks(&self) -> impl Iterator<Item = &PeakReport> {
        self.subtracted
            .iter()
            .filter_map(|(_, peak)| peak.as_ref().ok())
            .chain(self.decay_products.as_ref().ok())
    }

    /// Compare every pair of successfully fitted signals
    pub fn comparisons(&self) -> Vec<SignalComparison> {
        let peaks: Vec<&PeakReport> = self.peaks().collect();
        let mut out = Vec::new();
        for (i, a) in peaks.iter().enumerate() {
            for b in &peaks[i + 1..] {
                out.push(SignalComparison {
                    first: a.title.clone(),
                    second: b.title.clone(),
                    consistent: compare_signals(a.mass.0, a.width.0, b.mass.0, b.width.0),
                });
            }
        }
        out
    }
}

/// Observed abundance of one species
#[derive(Debug, Clone, PartialEq)]
pub struct AbundanceEntry {
    pub label: String,
    pub count: f64,
    pub error: f64,
    pub percentage: f64,
    pub percentage_error: f64,
}

/// Output of the full verification suite
#[derive(Debug)]
pub struct AnalysisSummary {
    pub abundances: Vec<AbundanceEntry>,
    pub momentum: Result<MomentumReport>,
    pub theta: Result<AngularReport>,
    pub phi: Result<AngularReport>,
    pub resonance: ResonanceReport,
    pub comparisons: Vec<SignalComparison>,
}

impl AnalysisSummary {
    /// Number of checks that could not be evaluated
    pub fn failures(&self) -> usize {
        [
            self.momentum.is_err(),
            self.theta.is_err(),
            self.phi.is_err(),
            self.resonance.decay_products.is_err(),
        ]
        .into_iter()
        .chain(self.resonance.subtracted.iter().map(|(_, r)| r.is_err()))
        .filter(|failed| *failed)
        .count()
    }
}

/// Runs the reference fits against accumulated distributions
#[derive(Debug, Clone, Default)]
pub struct ConsistencyAnalyzer<F: Fitter = LeastSquaresFitter> {
    fitter: F,
}

impl ConsistencyAnalyzer<LeastSquaresFitter> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<F: Fitter> ConsistencyAnalyzer<F> {
    pub fn with_fitter(fitter: F) -> Self {
        Self { fitter }
    }

    fn fit_full_axis(
        &self,
        histogram: &Histogram,
        model: ModelFamily,
    ) -> std::result::Result<FitResult, FitError> {
        let (low, high) = histogram.axis_range();
        let fit = self.fitter.fit(histogram, model, low, high)?;
        debug!(
            title = %histogram.title,
            model = %model,
            chi2 = fit.chi_square,
            ndf = fit.degrees_of_freedom,
            "fit converged"
        );
        Ok(fit)
    }

    /// Fit a flat (or linear) angular distribution over its whole axis
    pub fn fit_angular(
        &self,
        histogram: &Histogram,
        model: ModelFamily,
        expected_slope: f64,
    ) -> std::result::Result<AngularReport, FitError> {
        let fit = self.fit_full_axis(histogram, model)?;
        let intercept = match model {
            ModelFamily::Constant => fit.parameter("constant"),
            _ => fit.parameter("intercept"),
        }
        .unwrap_or((f64::NAN, f64::NAN));
        let slope = fit.parameter("slope");
        let consistent = slope.map(|(value, error)| overlap(value, error, expected_slope, 0.0));
        Ok(AngularReport {
            title: histogram.title.clone(),
            fit,
            intercept,
            slope,
            expected_slope,
            consistent,
        })
    }

    /// Fit the momentum spectrum and compare its mean with `expected_mean`
    pub fn fit_exponential(
        &self,
        histogram: &Histogram,
        expected_mean: f64,
    ) -> std::result::Result<MomentumReport, FitError> {
        let fit = self.fit_full_axis(histogram, ModelFamily::Exponential)?;
        let (rate, rate_error) = fit.parameter("rate").unwrap_or((f64::NAN, f64::NAN));
        let mean = 1.0 / rate;
        let mean_error = mean.abs() * (rate_error / rate).abs();
        Ok(MomentumReport {
            title: histogram.title.clone(),
            consistent: overlap(mean, mean_error, expected_mean, 0.0),
            fit,
            mean: (mean, mean_error),
            expected_mean,
        })
    }

    fn fit_peak(&self, histogram: &Histogram, zoom: Option<f64>) -> Result<PeakReport> {
        let fit = self.fit_full_axis(histogram, ModelFamily::Gaussian)?;
        let mass = fit.parameter("mean").unwrap_or((f64::NAN, f64::NAN));
        let width = fit.parameter("sigma").unwrap_or((f64::NAN, f64::NAN));
        let display_window = zoom.map(|half_width| {
            let center = histogram.max_bin_center();
            (center - half_width, center + half_width)
        });
        Ok(PeakReport {
            title: histogram.title.clone(),
            fit,
            mass,
            width,
            display_window,
        })
    }

    /// Extract the K* peak from each background subtraction and from the
    /// decay products directly
    ///
    /// `zoom` is the half width of the display window, if one is wanted.
    pub fn fit_resonance_peak(
        &self,
        set: &HistogramSet,
        pairs: &[SignalPair],
        zoom: Option<f64>,
    ) -> ResonanceReport {
        let subtracted = pairs
            .iter()
            .map(|pair| {
                let result = set
                    .inv_mass(pair.minuend)
                    .difference(set.inv_mass(pair.subtrahend), pair.title())
                    .map_err(Error::from)
                    .and_then(|diff| self.fit_peak(&diff, zoom));
                if let Err(e) = &result {
                    warn!("signal '{}' could not be extracted: {}", pair.title(), e);
                }
                (*pair, result)
            })
            .collect();

        let decay_products = self.fit_peak(set.inv_mass(InvMassKind::DecayProducts), zoom);
        if let Err(e) = &decay_products {
            warn!("decay product peak could not be fitted: {}", e);
        }

        ResonanceReport {
            subtracted,
            decay_products,
        }
    }

    /// Count, Poisson error and share of every labelled species
    pub fn verify_abundances(&self, histogram: &Histogram) -> Vec<AbundanceEntry> {
        let total = histogram.integral();
        (0..histogram.bins())
            .map(|bin| {
                let count = histogram.content(bin);
                let error = count.sqrt();
                let (percentage, percentage_error) = if total > 0.0 {
                    (100.0 * count / total, 100.0 * error / total)
                } else {
                    (0.0, 0.0)
                };
                AbundanceEntry {
                    label: histogram.label(bin).unwrap_or_default().to_string(),
                    count,
                    error,
                    percentage,
                    percentage_error,
                }
            })
            .collect()
    }

    /// Run every check on a finished set of distributions
    pub fn analyze(&self, set: &HistogramSet, config: &AnalysisConfig) -> AnalysisSummary {
        let abundances = self.verify_abundances(&set.abundances);
        let momentum = self
            .fit_exponential(&set.momentum, config.expected_momentum_mean)
            .map_err(Error::from);
        let theta = self
            .fit_angular(&set.theta, config.angular_model, config.expected_slope)
            .map_err(Error::from);
        let phi = self
            .fit_angular(&set.phi, config.angular_model, config.expected_slope)
            .map_err(Error::from);
        let zoom = config.zoom.then_some(config.zoom_half_width);
        let resonance = self.fit_resonance_peak(set, &SignalPair::STANDARD, zoom);
        let comparisons = resonance.comparisons();

        let summary = AnalysisSummary {
            abundances,
            momentum,
            theta,
            phi,
            resonance,
            comparisons,
        };
        info!(failures = summary.failures(), "analysis finished");
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ParticleTypeRegistry, KSTAR_WIDTH};

    #[test]
    fn test_overlap_is_symmetric_and_reflexive() {
        assert!(overlap(1.0, 0.0, 1.0, 0.0));
        assert!(overlap(1.0, 0.1, 1.15, 0.1));
        assert!(overlap(1.15, 0.1, 1.0, 0.1));
        assert!(!overlap(1.0, 0.1, 1.3, 0.1));
        assert!(!overlap(1.3, 0.1, 1.0, 0.1));
    }

    #[test]
    fn test_flat_theta_is_consistent_with_zero_slope() {
        let mut h = Histogram::new("theta", 50, 0.0, std::f64::consts::PI).unwrap();
        for bin in 0..50 {
            for _ in 0..400 {
                h.fill(h.bin_center(bin));
            }
        }
        let report = ConsistencyAnalyzer::new()
            .fit_angular(&h, ModelFamily::Linear, 0.0)
            .unwrap();
        let (slope, _) = report.slope.unwrap();
        assert!(slope.abs() < 1e-3, "slope = {}", slope);
        assert_eq!(report.consistent, Some(true));
        assert!((report.intercept.0 - 400.0).abs() < 1e-2);
    }

    #[test]
    fn test_constant_model_has_no_slope_verdict() {
        let mut h = Histogram::new("phi", 20, 0.0, 1.0).unwrap();
        for bin in 0..20 {
            h.fill(h.bin_center(bin));
        }
        let report = ConsistencyAnalyzer::new()
            .fit_angular(&h, ModelFamily::Constant, 0.0)
            .unwrap();
        assert_eq!(report.slope, None);
        assert_eq!(report.consistent, None);
    }

    #[test]
    fn test_abundance_percentages() {
        let mut h = Histogram::with_labels("abundances", &["a", "b"]).unwrap();
        for _ in 0..3 {
            h.fill_labeled("a").unwrap();
        }
        h.fill_labeled("b").unwrap();
        let entries = ConsistencyAnalyzer::new().verify_abundances(&h);
        assert_eq!(entries[0].label, "a");
        assert!((entries[0].percentage - 75.0).abs() < 1e-12);
        assert!((entries[0].error - 3f64.sqrt()).abs() < 1e-12);
        assert!((entries[1].percentage_error - 25.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_set_reports_failures_without_panicking() {
        let registry = ParticleTypeRegistry::standard(KSTAR_WIDTH).unwrap();
        let set = HistogramSet::new(&registry).unwrap();
        let summary = ConsistencyAnalyzer::new().analyze(&set, &AnalysisConfig::default());
        assert!(summary.momentum.is_err());
        assert!(summary.resonance.decay_products.is_err());
        assert!(summary.comparisons.is_empty());
        assert_eq!(summary.abundances.len(), registry.count());
    }

    #[test]
    fn test_zoom_window_does_not_change_fit_range() {
        let registry = ParticleTypeRegistry::standard(KSTAR_WIDTH).unwrap();
        let mut set = HistogramSet::new(&registry).unwrap();
        let h = set.inv_mass_mut(InvMassKind::DecayProducts);
        for (offset, count) in [(-0.05, 20), (-0.025, 60), (0.0, 100), (0.025, 60), (0.05, 20)] {
            for _ in 0..count {
                h.fill(0.9 + offset);
            }
        }
        let analyzer = ConsistencyAnalyzer::new();
        let plain = analyzer.fit_resonance_peak(&set, &[], None);
        let zoomed = analyzer.fit_resonance_peak(&set, &[], Some(0.3));
        let plain = plain.decay_products.unwrap();
        let zoomed = zoomed.decay_products.unwrap();
        assert_eq!(plain.fit.range, zoomed.fit.range);
        assert_eq!(plain.display_window, None);
        let (low, high) = zoomed.display_window.unwrap();
        assert!((high - low - 0.6).abs() < 1e-12);
    }
}
