//! Plain-text reports printed by the command line

use kstarsim_core::analysis::{AngularReport, MomentumReport, PeakReport};
use kstarsim_core::{AnalysisSummary, ParticleTypeRegistry, Result, RunStats};

fn verdict(consistent: bool) -> &'static str {
    if consistent {
        "consistent"
    } else {
        "NOT consistent"
    }
}

pub fn print_table(registry: &ParticleTypeRegistry) {
    println!("=== Particle types ===");
    print!("{}", registry);
}

pub fn print_stats(stats: &RunStats) {
    println!("\n=== Generation Complete ===");
    println!("Seed:          {}", stats.seed);
    println!("Events:        {}", stats.events);
    println!("Particles:     {}", stats.particles);
    println!("K* decays:     {}", stats.decays);
    if stats.failed_decays > 0 {
        println!("Failed decays: {}", stats.failed_decays);
    }
    println!("Pairs:         {}", stats.pairs);
    if stats.invalid_pairs > 0 {
        println!("Invalid pairs: {}", stats.invalid_pairs);
    }
    println!("Elapsed:       {:.2} s", stats.elapsed_secs);
}

fn print_angular(label: &str, report: &Result<AngularReport>) {
    match report {
        Ok(r) => {
            println!("\n--- {} ---", r.title);
            println!(
                "intercept = {:.4} +/- {:.4}",
                r.intercept.0, r.intercept.1
            );
            if let Some((slope, error)) = r.slope {
                println!("slope     = {:.4} +/- {:.4}", slope, error);
            }
            println!(
                "chi2/ndf  = {:.2} / {} = {:.3}, probability = {:.3}",
                r.fit.chi_square,
                r.fit.degrees_of_freedom,
                r.fit.reduced_chi_square(),
                r.fit.probability()
            );
            if let Some(consistent) = r.consistent {
                println!(
                    "slope is {} with {}",
                    verdict(consistent),
                    r.expected_slope
                );
            }
        }
        Err(e) => println!("\n--- {} ---\nfit failed: {}", label, e),
    }
}

fn print_momentum(report: &Result<MomentumReport>) {
    match report {
        Ok(r) => {
            println!("\n--- {} ---", r.title);
            println!("mean      = {:.4} +/- {:.4} GeV/c", r.mean.0, r.mean.1);
            println!(
                "chi2/ndf  = {:.2} / {} = {:.3}, probability = {:.3}",
                r.fit.chi_square,
                r.fit.degrees_of_freedom,
                r.fit.reduced_chi_square(),
                r.fit.probability()
            );
            println!("mean is {} with {}", verdict(r.consistent), r.expected_mean);
        }
        Err(e) => println!("\n--- Momentum distribution ---\nfit failed: {}", e),
    }
}

fn print_peak(label: &str, report: &Result<PeakReport>) {
    match report {
        Ok(r) => {
            println!("\n--- {} ---", r.title);
            println!("K* mass   = {:.5} +/- {:.5} GeV/c^2", r.mass.0, r.mass.1);
            println!("K* width  = {:.5} +/- {:.5} GeV/c^2", r.width.0, r.width.1);
            println!(
                "chi2/ndf  = {:.2} / {} = {:.3}, probability = {:.3}",
                r.fit.chi_square,
                r.fit.degrees_of_freedom,
                r.fit.reduced_chi_square(),
                r.fit.probability()
            );
            if let Some((low, high)) = r.display_window {
                println!("zoom      = [{:.3}, {:.3}]", low, high);
            }
        }
        Err(e) => println!("\n--- {} ---\nfit failed: {}", label, e),
    }
}

pub fn print_summary(summary: &AnalysisSummary) {
    println!("\n=== Abundances ===");
    for entry in &summary.abundances {
        println!(
            "{:<10} {:>10.0} +/- {:<8.0} ({:.3} +/- {:.3})%",
            entry.label, entry.count, entry.error, entry.percentage, entry.percentage_error
        );
    }

    println!("\n=== Distributions ===");
    print_momentum(&summary.momentum);
    print_angular("Polar angle", &summary.theta);
    print_angular("Azimuthal angle", &summary.phi);

    println!("\n=== K* signal ===");
    for (pair, peak) in &summary.resonance.subtracted {
        print_peak(&pair.title(), peak);
    }
    print_peak("Decay products", &summary.resonance.decay_products);

    if !summary.comparisons.is_empty() {
        println!("\n=== Signal comparison ===");
        for c in &summary.comparisons {
            println!("{}\n  vs {}\n  -> {}", c.first, c.second, verdict(c.consistent));
        }
    }

    let failures = summary.failures();
    if failures > 0 {
        println!("\n{} fit(s) could not be evaluated", failures);
    }
}
