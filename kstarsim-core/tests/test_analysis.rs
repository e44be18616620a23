//! Consistency analysis of generated runs

use kstarsim_core::analysis::{compare_signals, overlap, SignalPair};
use kstarsim_core::config::AnalysisConfig;
use kstarsim_core::fit::ModelFamily;
use kstarsim_core::observables::HistogramSet;
use kstarsim_core::tests::test_helpers::{approx_eq, quick_config, run_config};
use kstarsim_core::{ConsistencyAnalyzer, Error, HistogramError, RunConfig};

#[test]
fn test_value_overlaps_itself() {
    for v in [-3.0, 0.0, 0.89166, 1e9] {
        assert!(overlap(v, 0.0, v, 0.0));
    }
}

#[test]
fn test_disjoint_signals_are_inconsistent() {
    assert!(compare_signals(0.89, 0.05, 0.90, 0.05));
    assert!(!compare_signals(0.70, 0.05, 0.90, 0.05));
}

#[test]
fn test_momentum_mean_is_recovered() {
    let output = run_config(quick_config(300, 100, 17)).unwrap();
    let report = ConsistencyAnalyzer::new()
        .fit_exponential(&output.histograms.momentum, 1.0)
        .unwrap();
    assert!(approx_eq(report.mean.0, 1.0, 0.08), "mean = {:?}", report.mean);
    assert!(report.mean.1 > 0.0);
}

#[test]
fn test_theta_is_flat() {
    let output = run_config(quick_config(300, 100, 18)).unwrap();
    let report = ConsistencyAnalyzer::new()
        .fit_angular(&output.histograms.theta, ModelFamily::Constant, 0.0)
        .unwrap();
    // 30000 particles over 500 bins
    assert!(approx_eq(report.intercept.0, 60.0, 2.0), "{:?}", report.intercept);
    assert!(report.fit.reduced_chi_square() < 1.5);
}

#[test]
fn test_full_analysis_of_generated_run() {
    let output = run_config(quick_config(500, 100, 2718)).unwrap();
    let summary = ConsistencyAnalyzer::new().analyze(&output.histograms, &AnalysisConfig::default());

    assert_eq!(summary.abundances.len(), 7);
    let total: f64 = summary.abundances.iter().map(|a| a.percentage).sum();
    assert!(approx_eq(total, 100.0, 1e-9));

    assert!(summary.momentum.is_ok());
    assert!(summary.theta.is_ok());
    assert!(summary.phi.is_ok());
    assert_eq!(summary.resonance.subtracted.len(), SignalPair::STANDARD.len());

    let decay = summary.resonance.decay_products.as_ref().unwrap();
    assert!(approx_eq(decay.mass.0, 0.89166, 0.02), "mass = {:?}", decay.mass);
    assert!(approx_eq(decay.width.0, 0.050, 0.02), "width = {:?}", decay.width);
    let peaks = summary.resonance.peaks().count();
    assert!(peaks >= 1);
    assert_eq!(summary.comparisons.len(), peaks * (peaks - 1) / 2);
}

#[test]
fn test_pion_kaon_signal_matches_decay_products() {
    let config = RunConfig {
        parallel: true,
        ..quick_config(5000, 100, 7)
    };
    let output = run_config(config).unwrap();
    let summary = ConsistencyAnalyzer::new().analyze(&output.histograms, &AnalysisConfig::default());
    let resonance = &summary.resonance;

    let (pair, pion_kaon) = &resonance.subtracted[1];
    assert_eq!(*pair, SignalPair::STANDARD[1]);
    let pion_kaon = pion_kaon.as_ref().unwrap();
    assert!(approx_eq(pion_kaon.mass.0, 0.89166, 0.03), "mass = {:?}", pion_kaon.mass);
    assert!(pion_kaon.mass.1.is_finite() && pion_kaon.mass.1 > 0.0);
    assert!(approx_eq(pion_kaon.width.0, 0.050, 0.03), "width = {:?}", pion_kaon.width);

    for (_, peak) in &resonance.subtracted {
        if let Ok(peak) = peak {
            assert!((0.0..=2.0).contains(&peak.mass.0), "{}: {:?}", peak.title, peak.mass);
        }
    }

    let decay = resonance.decay_products.as_ref().unwrap();
    let comparison = summary
        .comparisons
        .iter()
        .find(|c| c.first == pion_kaon.title && c.second == decay.title)
        .unwrap();
    assert!(comparison.consistent, "{:?} vs {:?}", pion_kaon.mass, decay.mass);
}

#[test]
fn test_corrupted_histogram_file_is_rejected() {
    let output = run_config(quick_config(5, 20, 65)).unwrap();
    let path = std::env::temp_dir().join(format!("kstarsim-corrupted-{}.json", std::process::id()));
    output.histograms.save(&path).unwrap();

    let mut json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    json["momentum"]["sumw2"] = serde_json::json!([1.0]);
    std::fs::write(&path, json.to_string()).unwrap();

    let result = HistogramSet::load(&path);
    std::fs::remove_file(&path).ok();
    assert!(matches!(
        result,
        Err(Error::Histogram(HistogramError::InvalidBinning(_)))
    ));
}

#[test]
fn test_histograms_survive_a_file_round_trip() {
    let output = run_config(quick_config(5, 20, 64)).unwrap();
    let path = std::env::temp_dir().join(format!("kstarsim-roundtrip-{}.json", std::process::id()));
    output.histograms.save(&path).unwrap();
    let loaded = HistogramSet::load(&path).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(loaded, output.histograms);
}
