//! Least-squares fitting of histograms
//!
//! The analysis only needs four model families with at most three
//! parameters, so the fitter works on fixed 3x3 normal equations
//! (`glam::DMat3`) and pads unused parameters with an identity block.
//!
//! Chi-square convention: every bin whose centre lies inside the fit range
//! contributes `((y - f(x)) / sigma)^2` with `sigma` the bin error. Empty
//! bins carry a unit error so that a fit range with sparse bins still
//! constrains the model.

use crate::histogram::Histogram;
use glam::{DMat3, DVec3};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

const MAX_ITERATIONS: usize = 500;
const CHI2_TOLERANCE: f64 = 1e-9;
const LAMBDA_START: f64 = 1e-3;
const LAMBDA_MAX: f64 = 1e12;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("fit range [{0}, {1}] is empty")]
    InvalidRange(f64, f64),
    #[error("{points} point(s) in range cannot constrain {parameters} parameter(s)")]
    NoDegreesOfFreedom { points: usize, parameters: usize },
    #[error("fit did not converge after {0} iterations")]
    NotConverged(usize),
    #[error("model evaluates to a non-finite value with the starting parameters")]
    InvalidModelValue,
    #[error("no entries in fit range [{0}, {1}]")]
    EmptyRange(f64, f64),
    #[error("fitted mean {0} lies outside the fit range")]
    MeanOutOfRange(f64),
}

/// Model families the fitter understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    /// `c`
    Constant,
    /// `intercept + slope * x`
    Linear,
    /// `amplitude * exp(-0.5 * ((x - mean) / sigma)^2)`
    Gaussian,
    /// `amplitude * exp(-rate * x)`
    Exponential,
}

impl ModelFamily {
    pub fn parameter_names(self) -> &'static [&'static str] {
        match self {
            ModelFamily::Constant => &["constant"],
            ModelFamily::Linear => &["intercept", "slope"],
            ModelFamily::Gaussian => &["amplitude", "mean", "sigma"],
            ModelFamily::Exponential => &["amplitude", "rate"],
        }
    }

    pub fn parameter_count(self) -> usize {
        self.parameter_names().len()
    }

    pub fn evaluate(self, x: f64, p: DVec3) -> f64 {
        match self {
            ModelFamily::Constant => p.x,
            ModelFamily::Linear => p.x + p.y * x,
            ModelFamily::Gaussian => {
                let u = (x - p.y) / p.z;
                p.x * (-0.5 * u * u).exp()
            }
            ModelFamily::Exponential => p.x * (-p.y * x).exp(),
        }
    }

    /// Partial derivatives with respect to the parameters; unused slots are zero
    fn gradient(self, x: f64, p: DVec3) -> DVec3 {
        match self {
            ModelFamily::Constant => DVec3::new(1.0, 0.0, 0.0),
            ModelFamily::Linear => DVec3::new(1.0, x, 0.0),
            ModelFamily::Gaussian => {
                let d = x - p.y;
                let e = (-0.5 * d * d / (p.z * p.z)).exp();
                DVec3::new(e, p.x * e * d / (p.z * p.z), p.x * e * d * d / (p.z * p.z * p.z))
            }
            ModelFamily::Exponential => {
                let e = (-p.y * x).exp();
                DVec3::new(e, -p.x * x * e, 0.0)
            }
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelFamily::Constant => "constant",
            ModelFamily::Linear => "linear",
            ModelFamily::Gaussian => "gaussian",
            ModelFamily::Exponential => "exponential",
        };
        f.write_str(name)
    }
}

/// Outcome of a converged fit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub model: ModelFamily,
    pub parameters: Vec<f64>,
    /// One-sigma errors from the inverse curvature matrix; NaN if it is singular
    pub parameter_errors: Vec<f64>,
    pub chi_square: f64,
    pub degrees_of_freedom: usize,
    pub range: (f64, f64),
    pub iterations: usize,
}

impl FitResult {
    /// Value and error of a named parameter
    pub fn parameter(&self, name: &str) -> Option<(f64, f64)> {
        self.model
            .parameter_names()
            .iter()
            .position(|n| *n == name)
            .map(|i| (self.parameters[i], self.parameter_errors[i]))
    }

    pub fn reduced_chi_square(&self) -> f64 {
        self.chi_square / self.degrees_of_freedom as f64
    }

    /// Probability that a chi-square at least this large arises by chance
    pub fn probability(&self) -> f64 {
        chi_square_probability(self.chi_square, self.degrees_of_freedom)
    }

    /// Fitted model at `x`
    pub fn evaluate(&self, x: f64) -> f64 {
        let mut p = [0.0; 3];
        p[..self.parameters.len()].copy_from_slice(&self.parameters);
        self.model.evaluate(x, DVec3::from_array(p))
    }

    pub fn has_valid_errors(&self) -> bool {
        self.parameter_errors.iter().all(|e| e.is_finite())
    }
}

/// Fits a model family to a histogram over a range of the x axis
pub trait Fitter {
    fn fit(
        &self,
        histogram: &Histogram,
        model: ModelFamily,
        low: f64,
        high: f64,
    ) -> Result<FitResult, FitError>;
}

/// Levenberg-Marquardt chi-square minimiser
#[derive(Debug, Clone, Copy, Default)]
pub struct LeastSquaresFitter;

#[derive(Debug, Clone, Copy)]
struct Point {
    x: f64,
    y: f64,
    sigma: f64,
}

impl Fitter for LeastSquaresFitter {
    fn fit(
        &self,
        histogram: &Histogram,
        model: ModelFamily,
        low: f64,
        high: f64,
    ) -> Result<FitResult, FitError> {
        if !(low < high) {
            return Err(FitError::InvalidRange(low, high));
        }
        let points = collect_points(histogram, low, high);
        let n_params = model.parameter_count();
        if points.len() <= n_params {
            return Err(FitError::NoDegreesOfFreedom {
                points: points.len(),
                parameters: n_params,
            });
        }
        if points.iter().all(|p| p.y == 0.0) {
            return Err(FitError::EmptyRange(low, high));
        }

        let mut best: Option<Minimum> = None;
        let mut last_error = FitError::InvalidModelValue;
        for start in initial_parameters(model, &points, histogram.bin_width()) {
            match minimise(model, &points, start) {
                Ok(min)
                    if model == ModelFamily::Gaussian && !(low..=high).contains(&min.params.y) =>
                {
                    tracing::debug!(mean = min.params.y, "gaussian mean converged outside the fit range");
                    last_error = FitError::MeanOutOfRange(min.params.y);
                }
                Ok(min) => {
                    if best.as_ref().map_or(true, |b| min.chi2 < b.chi2) {
                        best = Some(min);
                    }
                }
                Err(e) => last_error = e,
            }
        }
        let Minimum {
            mut params,
            chi2,
            iterations,
        } = best.ok_or(last_error)?;

        if model == ModelFamily::Gaussian {
            params.z = params.z.abs();
        }

        let (alpha, _) = normal_equations(model, &points, params);
        let errors = parameter_errors(alpha, n_params);
        if errors.iter().any(|e| !e.is_finite()) {
            tracing::warn!(%model, "curvature matrix is singular, parameter errors are undefined");
        }

        let values = params.to_array();
        Ok(FitResult {
            model,
            parameters: values[..n_params].to_vec(),
            parameter_errors: errors,
            chi_square: chi2,
            degrees_of_freedom: points.len() - n_params,
            range: (low, high),
            iterations,
        })
    }
}

/// Local chi-square minimum reached from one starting point
struct Minimum {
    params: DVec3,
    chi2: f64,
    iterations: usize,
}

fn minimise(model: ModelFamily, points: &[Point], start: DVec3) -> Result<Minimum, FitError> {
    let n_params = model.parameter_count();
    let mut params = start;
    let mut chi2 = chi_square(model, points, params);
    if !chi2.is_finite() {
        return Err(FitError::InvalidModelValue);
    }

    let mut lambda = LAMBDA_START;
    let mut iterations = 0;

    while iterations < MAX_ITERATIONS {
        iterations += 1;
        let (alpha, beta) = normal_equations(model, points, params);

        let mut accepted = None;
        while lambda <= LAMBDA_MAX {
            let damped = damp(alpha, lambda, n_params);
            let det = damped.determinant();
            if det.is_normal() {
                let step = damped.inverse() * mask(beta, n_params);
                let trial = params + step;
                let trial_chi2 = chi_square(model, points, trial);
                if trial_chi2.is_finite() && trial_chi2 <= chi2 {
                    accepted = Some((trial, trial_chi2, lambda));
                    lambda = (lambda * 0.1).max(1e-12);
                    break;
                }
            }
            lambda *= 10.0;
        }

        match accepted {
            Some((trial, trial_chi2, used_lambda)) => {
                let improvement = chi2 - trial_chi2;
                params = trial;
                chi2 = trial_chi2;
                // a tiny gain under heavy damping is not a minimum yet
                if improvement <= CHI2_TOLERANCE * (1.0 + chi2) && used_lambda <= 1.0 {
                    return Ok(Minimum {
                        params,
                        chi2,
                        iterations,
                    });
                }
            }
            // no downhill step left at any damping: we sit in the minimum
            None => {
                return Ok(Minimum {
                    params,
                    chi2,
                    iterations,
                })
            }
        }
    }

    Err(FitError::NotConverged(iterations))
}

fn collect_points(histogram: &Histogram, low: f64, high: f64) -> Vec<Point> {
    (0..histogram.bins())
        .filter_map(|i| {
            let x = histogram.bin_center(i);
            if x < low || x > high {
                return None;
            }
            let error = histogram.error(i);
            Some(Point {
                x,
                y: histogram.content(i),
                sigma: if error > 0.0 { error } else { 1.0 },
            })
        })
        .collect()
}

/// Starting points for the minimiser; the best converged one wins
fn initial_parameters(model: ModelFamily, points: &[Point], bin_width: f64) -> Vec<DVec3> {
    let mean_y = points.iter().map(|p| p.y).sum::<f64>() / points.len() as f64;
    match model {
        ModelFamily::Constant => vec![DVec3::new(mean_y, 0.0, 0.0)],
        ModelFamily::Linear => vec![DVec3::new(mean_y, 0.0, 0.0)],
        ModelFamily::Gaussian => gaussian_starts(points, bin_width),
        ModelFamily::Exponential => {
            // straight-line fit of ln(y) over the populated bins
            let logs: Vec<(f64, f64)> = points
                .iter()
                .filter(|p| p.y > 0.0)
                .map(|p| (p.x, p.y.ln()))
                .collect();
            if logs.len() >= 2 {
                let n = logs.len() as f64;
                let sx: f64 = logs.iter().map(|l| l.0).sum();
                let sy: f64 = logs.iter().map(|l| l.1).sum();
                let sxx: f64 = logs.iter().map(|l| l.0 * l.0).sum();
                let sxy: f64 = logs.iter().map(|l| l.0 * l.1).sum();
                let denom = n * sxx - sx * sx;
                if denom != 0.0 {
                    let slope = (n * sxy - sx * sy) / denom;
                    let intercept = (sy - slope * sx) / n;
                    return vec![DVec3::new(intercept.exp(), -slope, 0.0)];
                }
            }
            vec![DVec3::new(points[0].y.max(1.0), 1.0, 0.0)]
        }
    }
}

const GAUSSIAN_CANDIDATE_PEAKS: usize = 3;

/// Gaussian starts around the highest maxima of the three-bin running sum,
/// each with its half-maximum width and two wider guesses, plus the
/// positive-weighted moments of the whole range.
fn gaussian_starts(points: &[Point], bin_width: f64) -> Vec<DVec3> {
    let n = points.len();
    let smoothed: Vec<f64> = (0..n)
        .map(|i| points[i.saturating_sub(1)..(i + 2).min(n)].iter().map(|p| p.y).sum::<f64>())
        .collect();

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| smoothed[b].total_cmp(&smoothed[a]));
    let mut peaks: Vec<usize> = Vec::with_capacity(GAUSSIAN_CANDIDATE_PEAKS);
    for i in order {
        if peaks.len() == GAUSSIAN_CANDIDATE_PEAKS {
            break;
        }
        if points[i].y > 0.0 && peaks.iter().all(|&p| p.abs_diff(i) > 2) {
            peaks.push(i);
        }
    }

    let mut starts = Vec::new();
    for &i in &peaks {
        let height = points[i].y;
        let half = 0.5 * height;
        let mut left = i;
        while left > 0 && points[left - 1].y > half {
            left -= 1;
        }
        let mut right = i;
        while right + 1 < n && points[right + 1].y > half {
            right += 1;
        }
        let fwhm = (right - left + 1) as f64 * bin_width;
        let sigma = (fwhm / 2.355).max(bin_width);
        for scale in [1.0, 2.0, 4.0] {
            starts.push(DVec3::new(height, points[i].x, sigma * scale));
        }
    }

    let positive: f64 = points.iter().map(|p| p.y.max(0.0)).sum();
    if positive > 0.0 {
        let mean = points.iter().map(|p| p.y.max(0.0) * p.x).sum::<f64>() / positive;
        let spread = (points
            .iter()
            .map(|p| p.y.max(0.0) * (p.x - mean).powi(2))
            .sum::<f64>()
            / positive)
            .sqrt();
        let height = points
            .iter()
            .map(|p| p.y)
            .fold(f64::NEG_INFINITY, f64::max);
        starts.push(DVec3::new(height, mean, spread.max(bin_width)));
    }
    if starts.is_empty() {
        let top = points
            .iter()
            .copied()
            .fold(points[0], |best, p| if p.y > best.y { p } else { best });
        starts.push(DVec3::new(top.y, top.x, bin_width));
    }
    starts
}

fn chi_square(model: ModelFamily, points: &[Point], p: DVec3) -> f64 {
    points
        .iter()
        .map(|pt| {
            let r = (pt.y - model.evaluate(pt.x, p)) / pt.sigma;
            r * r
        })
        .sum()
}

/// Curvature matrix `J^T W J` and gradient vector `J^T W r`
fn normal_equations(model: ModelFamily, points: &[Point], p: DVec3) -> (DMat3, DVec3) {
    let mut alpha = [[0.0; 3]; 3];
    let mut beta = DVec3::ZERO;
    for pt in points {
        let w = 1.0 / (pt.sigma * pt.sigma);
        let g = model.gradient(pt.x, p).to_array();
        let r = pt.y - model.evaluate(pt.x, p);
        for j in 0..3 {
            beta[j] += w * r * g[j];
            for k in 0..3 {
                alpha[j][k] += w * g[j] * g[k];
            }
        }
    }
    (DMat3::from_cols_array_2d(&alpha), beta)
}

/// Marquardt damping of the diagonal; padding slots become identity
fn damp(alpha: DMat3, lambda: f64, n_params: usize) -> DMat3 {
    let mut m = alpha.to_cols_array_2d();
    let largest = (0..n_params).map(|j| m[j][j]).fold(0.0, f64::max);
    let floor = (largest * 1e-12).max(f64::MIN_POSITIVE);
    for j in 0..3 {
        if j < n_params {
            m[j][j] += lambda * m[j][j].max(floor);
        } else {
            for k in 0..3 {
                m[j][k] = 0.0;
                m[k][j] = 0.0;
            }
            m[j][j] = 1.0;
        }
    }
    DMat3::from_cols_array_2d(&m)
}

fn mask(v: DVec3, n_params: usize) -> DVec3 {
    let mut out = v;
    for j in n_params..3 {
        out[j] = 0.0;
    }
    out
}

fn parameter_errors(alpha: DMat3, n_params: usize) -> Vec<f64> {
    let curvature = damp(alpha, 0.0, n_params);
    let det = curvature.determinant();
    if !det.is_normal() {
        return vec![f64::NAN; n_params];
    }
    let covariance = curvature.inverse().to_cols_array_2d();
    (0..n_params)
        .map(|j| {
            let v = covariance[j][j];
            if v >= 0.0 {
                v.sqrt()
            } else {
                f64::NAN
            }
        })
        .collect()
}

/// Upper-tail probability of the chi-square distribution with `ndf` degrees of freedom
pub fn chi_square_probability(chi2: f64, ndf: usize) -> f64 {
    if ndf == 0 || chi2.is_nan() {
        return f64::NAN;
    }
    if chi2 <= 0.0 {
        return 1.0;
    }
    regularized_gamma_q(ndf as f64 / 2.0, chi2 / 2.0)
}

/// ln(Gamma(x)) by the Lanczos approximation (g = 7, n = 9)
pub fn ln_gamma(x: f64) -> f64 {
    const COEFFS: [f64; 9] = [
        0.999_999_999_999_809_9,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];
    if x < 0.5 {
        // reflection formula
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let mut sum = COEFFS[0];
    for (i, c) in COEFFS.iter().enumerate().skip(1) {
        sum += c / (x + i as f64);
    }
    let t = x + 7.5;
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + sum.ln()
}

/// Q(a, x) = 1 - P(a, x), the regularised upper incomplete gamma function
fn regularized_gamma_q(a: f64, x: f64) -> f64 {
    if x < a + 1.0 {
        1.0 - gamma_p_series(a, x)
    } else {
        gamma_q_continued_fraction(a, x)
    }
}

fn gamma_p_series(a: f64, x: f64) -> f64 {
    let mut ap = a;
    let mut term = 1.0 / a;
    let mut sum = term;
    for _ in 0..1000 {
        ap += 1.0;
        term *= x / ap;
        sum += term;
        if term.abs() < sum.abs() * 1e-15 {
            break;
        }
    }
    sum * (-x + a * x.ln() - ln_gamma(a)).exp()
}

fn gamma_q_continued_fraction(a: f64, x: f64) -> f64 {
    const TINY: f64 = 1e-300;
    let mut b = x + 1.0 - a;
    let mut c = 1.0 / TINY;
    let mut d = 1.0 / b;
    let mut h = d;
    for i in 1..1000 {
        let an = -(i as f64) * (i as f64 - a);
        b += 2.0;
        d = an * d + b;
        if d.abs() < TINY {
            d = TINY;
        }
        c = b + an / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        let delta = d * c;
        h *= delta;
        if (delta - 1.0).abs() < 1e-15 {
            break;
        }
    }
    (-x + a * x.ln() - ln_gamma(a)).exp() * h
}
