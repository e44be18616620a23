//! Binned accumulators for the generated observables
//!
//! One-dimensional histogram with uniform bins. Each bin keeps its sum of
//! weights and sum of squared weights; bins may carry labels, and
//! out-of-range fills go to under/overflow counters.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HistogramError {
    #[error("invalid binning: {0}")]
    InvalidBinning(String),
    #[error("histograms '{0}' and '{1}' have different binning")]
    BinningMismatch(String, String),
    #[error("label '{label}' does not match any bin of '{title}'")]
    UnknownLabel { title: String, label: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub title: String,
    low: f64,
    high: f64,
    contents: Vec<f64>,
    sumw2: Vec<f64>,
    labels: Vec<Option<String>>,
    entries: f64,
    underflow: f64,
    overflow: f64,
}

impl Histogram {
    /// Histogram with `bins` equal-width bins over [low, high)
    pub fn new(title: impl Into<String>, bins: usize, low: f64, high: f64) -> Result<Self, HistogramError> {
        if bins == 0 {
            return Err(HistogramError::InvalidBinning("at least one bin is required".into()));
        }
        if !(low.is_finite() && high.is_finite() && low < high) {
            return Err(HistogramError::InvalidBinning(format!(
                "range [{}, {}) is empty or not finite",
                low, high
            )));
        }
        Ok(Self {
            title: title.into(),
            low,
            high,
            contents: vec![0.0; bins],
            sumw2: vec![0.0; bins],
            labels: vec![None; bins],
            entries: 0.0,
            underflow: 0.0,
            overflow: 0.0,
        })
    }

    /// One bin per category over [0, n), bin `i` labelled with `labels[i]`
    pub fn with_labels<S: AsRef<str>>(title: impl Into<String>, labels: &[S]) -> Result<Self, HistogramError> {
        let mut histogram = Self::new(title, labels.len(), 0.0, labels.len() as f64)?;
        for (slot, label) in histogram.labels.iter_mut().zip(labels) {
            *slot = Some(label.as_ref().to_string());
        }
        Ok(histogram)
    }

    /// Checks the shape invariants that `new` establishes; deserialised
    /// histograms bypass the constructor
    pub fn validate(&self) -> Result<(), HistogramError> {
        let bins = self.contents.len();
        if bins == 0 {
            return Err(HistogramError::InvalidBinning(format!("'{}' has no bins", self.title)));
        }
        if !(self.low.is_finite() && self.high.is_finite() && self.low < self.high) {
            return Err(HistogramError::InvalidBinning(format!(
                "'{}' has empty or non-finite range [{}, {})",
                self.title, self.low, self.high
            )));
        }
        if self.sumw2.len() != bins || self.labels.len() != bins {
            return Err(HistogramError::InvalidBinning(format!(
                "'{}' has {} bins but {} squared weights and {} labels",
                self.title,
                bins,
                self.sumw2.len(),
                self.labels.len()
            )));
        }
        Ok(())
    }

    pub fn bins(&self) -> usize {
        self.contents.len()
    }

    pub fn axis_range(&self) -> (f64, f64) {
        (self.low, self.high)
    }

    pub fn bin_width(&self) -> f64 {
        (self.high - self.low) / self.bins() as f64
    }

    pub fn bin_low_edge(&self, bin: usize) -> f64 {
        self.low + bin as f64 * self.bin_width()
    }

    pub fn bin_center(&self, bin: usize) -> f64 {
        self.low + (bin as f64 + 0.5) * self.bin_width()
    }

    /// All bin boundaries, `bins() + 1` values
    pub fn edges(&self) -> Vec<f64> {
        (0..=self.bins()).map(|i| self.bin_low_edge(i)).collect()
    }

    /// Bin containing `x`, or `None` if it falls outside [low, high)
    pub fn find_bin(&self, x: f64) -> Option<usize> {
        if !(x >= self.low && x < self.high) {
            return None;
        }
        let bin = ((x - self.low) / self.bin_width()) as usize;
        // guard against rounding at the upper edge
        Some(bin.min(self.bins() - 1))
    }

    pub fn fill(&mut self, x: f64) {
        self.fill_weighted(x, 1.0);
    }

    /// Add `weight` at `x`. NaN values are counted as entries but land in no bin.
    pub fn fill_weighted(&mut self, x: f64, weight: f64) {
        self.entries += 1.0;
        match self.find_bin(x) {
            Some(bin) => {
                self.contents[bin] += weight;
                self.sumw2[bin] += weight * weight;
            }
            None if x < self.low => self.underflow += weight,
            None if x >= self.high => self.overflow += weight,
            None => {}
        }
    }

    pub fn fill_labeled(&mut self, label: &str) -> Result<usize, HistogramError> {
        self.fill_labeled_weighted(label, 1.0)
    }

    /// Add `weight` to the bin carrying `label`
    ///
    /// An unseen label claims the first unlabelled bin; once a bin is
    /// labelled it keeps that label for the lifetime of the histogram.
    pub fn fill_labeled_weighted(&mut self, label: &str, weight: f64) -> Result<usize, HistogramError> {
        let bin = match self.label_index(label) {
            Some(bin) => bin,
            None => {
                let free = self.labels.iter().position(Option::is_none).ok_or_else(|| {
                    HistogramError::UnknownLabel {
                        title: self.title.clone(),
                        label: label.to_string(),
                    }
                })?;
                self.labels[free] = Some(label.to_string());
                free
            }
        };
        self.entries += 1.0;
        self.contents[bin] += weight;
        self.sumw2[bin] += weight * weight;
        Ok(bin)
    }

    pub fn label(&self, bin: usize) -> Option<&str> {
        self.labels.get(bin).and_then(|l| l.as_deref())
    }

    pub fn label_index(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l.as_deref() == Some(label))
    }

    pub fn content(&self, bin: usize) -> f64 {
        self.contents[bin]
    }

    /// Statistical error of a bin, sqrt of the summed squared weights
    pub fn error(&self, bin: usize) -> f64 {
        self.sumw2[bin].sqrt()
    }

    /// Content and error of `bin`
    pub fn bin(&self, bin: usize) -> Option<(f64, f64)> {
        (bin < self.bins()).then(|| (self.content(bin), self.error(bin)))
    }

    pub fn contents(&self) -> &[f64] {
        &self.contents
    }

    pub fn entries(&self) -> f64 {
        self.entries
    }

    pub fn underflow(&self) -> f64 {
        self.underflow
    }

    pub fn overflow(&self) -> f64 {
        self.overflow
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0.0
    }

    /// Sum of in-range bin contents
    pub fn integral(&self) -> f64 {
        self.contents.iter().sum()
    }

    /// Bin with the largest content (first one on ties)
    pub fn maximum_bin(&self) -> Option<usize> {
        self.contents
            .iter()
            .enumerate()
            .fold(None, |best: Option<(usize, f64)>, (i, &c)| match best {
                Some((_, b)) if b >= c => best,
                _ => Some((i, c)),
            })
            .map(|(i, _)| i)
    }

    pub fn max_bin_center(&self) -> f64 {
        self.maximum_bin().map_or(f64::NAN, |bin| self.bin_center(bin))
    }

    /// Content-weighted mean of the bin centres
    pub fn mean(&self) -> f64 {
        let total = self.integral();
        if total == 0.0 {
            return f64::NAN;
        }
        self.contents
            .iter()
            .enumerate()
            .map(|(i, c)| c * self.bin_center(i))
            .sum::<f64>()
            / total
    }

    /// Content-weighted standard deviation of the bin centres
    pub fn std_dev(&self) -> f64 {
        let total = self.integral();
        if total == 0.0 {
            return f64::NAN;
        }
        let mean = self.mean();
        let variance = self
            .contents
            .iter()
            .enumerate()
            .map(|(i, c)| c * (self.bin_center(i) - mean).powi(2))
            .sum::<f64>()
            / total;
        variance.max(0.0).sqrt()
    }

    pub fn same_binning(&self, other: &Histogram) -> bool {
        self.bins() == other.bins() && self.low == other.low && self.high == other.high
    }

    fn check_binning(&self, other: &Histogram) -> Result<(), HistogramError> {
        if self.same_binning(other) {
            Ok(())
        } else {
            Err(HistogramError::BinningMismatch(self.title.clone(), other.title.clone()))
        }
    }

    /// Bin-wise `self - other` with errors combined in quadrature
    ///
    /// The entry count of the result is its integral, which may be negative.
    pub fn difference(&self, other: &Histogram, title: impl Into<String>) -> Result<Histogram, HistogramError> {
        self.check_binning(other)?;
        let mut result = self.clone();
        result.title = title.into();
        for (i, (c, w2)) in result.contents.iter_mut().zip(result.sumw2.iter_mut()).enumerate() {
            *c -= other.contents[i];
            *w2 += other.sumw2[i];
        }
        result.underflow -= other.underflow;
        result.overflow -= other.overflow;
        result.entries = result.integral();
        Ok(result)
    }

    /// Add another histogram with the same binning into this one
    pub fn merge(&mut self, other: &Histogram) -> Result<(), HistogramError> {
        self.check_binning(other)?;
        for i in 0..self.bins() {
            self.contents[i] += other.contents[i];
            self.sumw2[i] += other.sumw2[i];
        }
        for (mine, theirs) in self.labels.iter_mut().zip(&other.labels) {
            if mine.is_none() {
                *mine = theirs.clone();
            }
        }
        self.entries += other.entries;
        self.underflow += other.underflow;
        self.overflow += other.overflow;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_lands_in_expected_bin() {
        let mut h = Histogram::new("h", 10, 0.0, 1.0).unwrap();
        h.fill(0.05);
        h.fill(0.95);
        h.fill(0.95);
        assert_eq!(h.content(0), 1.0);
        assert_eq!(h.content(9), 2.0);
        assert_eq!(h.entries(), 3.0);
    }

    #[test]
    fn test_out_of_range_goes_to_flow_bins() {
        let mut h = Histogram::new("h", 4, 0.0, 2.0).unwrap();
        h.fill(-0.1);
        h.fill(2.0);
        h.fill(5.0);
        assert_eq!(h.underflow(), 1.0);
        assert_eq!(h.overflow(), 2.0);
        assert_eq!(h.integral(), 0.0);
        assert_eq!(h.entries(), 3.0);
    }

    #[test]
    fn test_validate_rejects_inconsistent_bin_arrays() {
        let mut h = Histogram::new("h", 4, 0.0, 1.0).unwrap();
        assert!(h.validate().is_ok());
        h.sumw2.truncate(1);
        assert!(matches!(h.validate(), Err(HistogramError::InvalidBinning(_))));

        let mut h = Histogram::new("h", 4, 0.0, 1.0).unwrap();
        h.labels.push(None);
        assert!(h.validate().is_err());

        let mut h = Histogram::new("h", 4, 0.0, 1.0).unwrap();
        h.high = h.low;
        assert!(h.validate().is_err());
    }

    #[test]
    fn test_invalid_binning() {
        assert!(Histogram::new("h", 0, 0.0, 1.0).is_err());
        assert!(Histogram::new("h", 5, 1.0, 1.0).is_err());
        assert!(Histogram::new("h", 5, 0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_labels_are_stable() {
        let mut h = Histogram::with_labels("species", &["a", "b"]).unwrap();
        assert_eq!(h.fill_labeled("b").unwrap(), 1);
        assert_eq!(h.fill_labeled("b").unwrap(), 1);
        assert_eq!(h.fill_labeled("a").unwrap(), 0);
        assert_eq!(h.content(1), 2.0);
        assert!(h.fill_labeled("c").is_err());
    }

    #[test]
    fn test_unseen_label_claims_free_bin() {
        let mut h = Histogram::new("species", 2, 0.0, 2.0).unwrap();
        assert_eq!(h.fill_labeled("x").unwrap(), 0);
        assert_eq!(h.fill_labeled("y").unwrap(), 1);
        assert_eq!(h.fill_labeled("x").unwrap(), 0);
        assert_eq!(h.label(1), Some("y"));
    }

    #[test]
    fn test_difference_propagates_variance() {
        let mut a = Histogram::new("a", 2, 0.0, 2.0).unwrap();
        let mut b = Histogram::new("b", 2, 0.0, 2.0).unwrap();
        for _ in 0..9 {
            a.fill(0.5);
        }
        for _ in 0..16 {
            b.fill(0.5);
        }
        b.fill(1.5);
        let d = a.difference(&b, "a-b").unwrap();
        assert_eq!(d.content(0), -7.0);
        assert_eq!(d.error(0), 5.0);
        assert_eq!(d.content(1), -1.0);
        assert_eq!(d.entries(), -8.0);
    }

    #[test]
    fn test_difference_requires_same_binning() {
        let a = Histogram::new("a", 2, 0.0, 2.0).unwrap();
        let b = Histogram::new("b", 3, 0.0, 2.0).unwrap();
        assert!(matches!(a.difference(&b, "d"), Err(HistogramError::BinningMismatch(..))));
    }

    #[test]
    fn test_merge_matches_sequential_fill() {
        let values = [0.1, 0.4, 0.4, 0.9, 1.7];
        let mut whole = Histogram::new("h", 4, 0.0, 2.0).unwrap();
        let mut left = whole.clone();
        let mut right = whole.clone();
        for (i, &x) in values.iter().enumerate() {
            whole.fill(x);
            if i % 2 == 0 {
                left.fill(x);
            } else {
                right.fill(x);
            }
        }
        left.merge(&right).unwrap();
        assert_eq!(left, whole);
    }

    #[test]
    fn test_moments_and_maximum() {
        let mut h = Histogram::new("h", 4, 0.0, 4.0).unwrap();
        h.fill(1.5);
        h.fill(2.5);
        h.fill(2.5);
        h.fill(3.5);
        assert_eq!(h.maximum_bin(), Some(2));
        assert_eq!(h.max_bin_center(), 2.5);
        assert!((h.mean() - 2.5).abs() < 1e-12);
        assert!((h.std_dev() - 0.5f64.sqrt()).abs() < 1e-12);
        assert_eq!(h.edges(), vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }
}
