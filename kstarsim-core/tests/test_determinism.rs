//! Determinism tests - the same seed produces identical distributions

use kstarsim_core::config::RunConfig;
use kstarsim_core::tests::test_helpers::{quick_config, run_config};

#[test]
fn test_same_seed_same_histograms() {
    let first = run_config(quick_config(30, 40, 123)).unwrap();
    let second = run_config(quick_config(30, 40, 123)).unwrap();
    assert_eq!(first.histograms, second.histograms);
    assert_eq!(first.stats.pairs, second.stats.pairs);
}

#[test]
fn test_different_seeds_differ() {
    let first = run_config(quick_config(30, 40, 1)).unwrap();
    let second = run_config(quick_config(30, 40, 2)).unwrap();
    assert_ne!(first.histograms, second.histograms);
}

#[test]
fn test_parallel_run_matches_serial_run() {
    let serial = run_config(quick_config(64, 40, 555)).unwrap();
    let parallel = run_config(RunConfig {
        parallel: true,
        ..quick_config(64, 40, 555)
    })
    .unwrap();

    assert_eq!(serial.histograms, parallel.histograms);
    assert_eq!(serial.stats.events, parallel.stats.events);
    assert_eq!(serial.stats.particles, parallel.stats.particles);
    assert_eq!(serial.stats.decays, parallel.stats.decays);
    assert_eq!(serial.stats.pairs, parallel.stats.pairs);
    assert_eq!(serial.stats.seed, parallel.stats.seed);
}

#[test]
fn test_unseeded_run_reports_its_seed() {
    let mut config = quick_config(5, 10, 0);
    config.seed = None;
    let first = run_config(config.clone()).unwrap();
    config.seed = Some(first.stats.seed);
    let replay = run_config(config).unwrap();
    assert_eq!(first.histograms, replay.histograms);
}
