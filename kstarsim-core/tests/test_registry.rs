//! Particle type table

use kstarsim_core::registry::{
    strip_charge_suffix, ParticleTypeRegistry, RegistryError, MAX_PARTICLE_TYPES,
};
use kstarsim_core::tests::test_helpers::standard_registry;

#[test]
fn test_duplicate_name_rejected() {
    let mut registry = standard_registry();
    assert_eq!(
        registry.register("Pion(+)", 0.13957, 1, 0.0),
        Err(RegistryError::DuplicateType("Pion(+)".to_string()))
    );
    assert_eq!(registry.count(), 7);
}

#[test]
fn test_eleventh_type_rejected() {
    let mut registry = ParticleTypeRegistry::new();
    for i in 0..MAX_PARTICLE_TYPES {
        registry.register(&format!("X{}", i), 1.0, 0, 0.0).unwrap();
    }
    assert!(matches!(
        registry.register("X10", 1.0, 0, 0.0),
        Err(RegistryError::RegistryFull(_))
    ));
    assert_eq!(registry.count(), MAX_PARTICLE_TYPES);
}

#[test]
fn test_lookup_and_reverse_lookup() {
    let registry = standard_registry();
    let index = registry.lookup("Kaon(-)").unwrap();
    assert_eq!(index.as_usize(), 3);
    assert_eq!(registry.index_to_name(3), Ok("Kaon(-)"));
    assert_eq!(registry[index].charge, -1);
    assert_eq!(
        registry.lookup("Muon(+)"),
        Err(RegistryError::NotFound("Muon(+)".to_string()))
    );
    assert_eq!(registry.index_to_name(7), Err(RegistryError::IndexOutOfRange(7)));
}

#[test]
fn test_width_is_polymorphic_over_kind() {
    let registry = standard_registry();
    let pion = &registry[registry.lookup("Pion(+)").unwrap()];
    let kstar = &registry[registry.lookup("K*").unwrap()];
    assert_eq!(pion.width(), 0.0);
    assert!(!pion.is_resonance());
    assert_eq!(kstar.width(), 0.050);
    assert!(kstar.is_resonance());
}

#[test]
fn test_charge_names_group_into_families() {
    let registry = standard_registry();
    let bases: Vec<&str> = registry.names().map(strip_charge_suffix).collect();
    assert_eq!(
        bases,
        vec!["Pion", "Pion", "Kaon", "Kaon", "Proton", "Proton", "K*"]
    );
}

#[test]
fn test_table_lists_every_type() {
    let printed = standard_registry().to_string();
    for name in ["Pion(+)", "Kaon(-)", "Proton(+)", "K*"] {
        assert!(printed.contains(name), "missing {} in\n{}", name, printed);
    }
}
