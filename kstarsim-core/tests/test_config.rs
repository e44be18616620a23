//! Configuration loading and validation

use kstarsim_core::config::{Config, ConfigError, RunConfig, EXAMPLE_CONFIG};
use kstarsim_core::generator::EventGenerator;
use kstarsim_core::particle::DecayAngles;
use kstarsim_core::tests::test_helpers::only;
use kstarsim_core::Error;
use std::path::PathBuf;

fn temp_file(name: &str, content: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("kstarsim-{}-{}", std::process::id(), name));
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_load_config_from_file() {
    let path = temp_file(
        "run.toml",
        "[run]\nevents = 12\nseed = 9\ndecay_angles = \"legacy\"\nparallel = true\n\n[run.species]\nkstar = 0.5\n",
    );
    let config = Config::from_file(&path).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(config.run.events, 12);
    assert_eq!(config.run.decay_angles, DecayAngles::Legacy);
    assert!(config.run.parallel);
    assert_eq!(config.run.species.kstar, 0.5);
    assert_eq!(config.run.species.kaon, 0.10);
}

#[test]
fn test_missing_file_is_a_read_error() {
    let err = Config::from_file(&PathBuf::from("/nonexistent/kstarsim.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::FileRead { .. }));
}

#[test]
fn test_malformed_file_is_a_parse_error() {
    let path = temp_file("bad.toml", "[run]\nevents = \"many\"\n");
    let err = Config::from_file(&path).unwrap_err();
    std::fs::remove_file(&path).ok();
    assert!(matches!(err, ConfigError::Parse { .. }));
}

#[test]
fn test_example_config_is_valid() {
    let config: Config = toml::from_str(EXAMPLE_CONFIG).unwrap();
    assert!(config.run.validate().is_ok());
}

#[test]
fn test_generator_rejects_bad_configuration() {
    let negative_width = RunConfig {
        kstar_width: -0.1,
        ..RunConfig::default()
    };
    assert!(matches!(
        EventGenerator::new(negative_width),
        Err(Error::Config(ConfigError::InvalidConfiguration(_)))
    ));

    let overfull = RunConfig {
        species: only(0.6, 0.3, 0.2),
        ..RunConfig::default()
    };
    assert!(EventGenerator::new(overfull).is_err());

    let no_events = RunConfig {
        events: 0,
        ..RunConfig::default()
    };
    assert!(EventGenerator::new(no_events).is_err());
}
