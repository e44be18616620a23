mod hist_app;
mod report;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use kstarsim_core::config::EXAMPLE_CONFIG;
use kstarsim_core::{
    Config, ConsistencyAnalyzer, EventGenerator, GenerationOutput, HistogramSet,
    ParticleTypeRegistry,
};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "kstarsim")]
#[command(version)]
#[command(about = "Toy K* Monte-Carlo: event generation and consistency analysis", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file; built-in defaults are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Overrides applied on top of the `[run]` section
#[derive(Args)]
struct RunOverrides {
    /// Number of events
    #[arg(short = 'n', long)]
    events: Option<usize>,

    /// Particles drawn per event
    #[arg(long)]
    particles: Option<usize>,

    /// Random seed
    #[arg(short, long)]
    seed: Option<u64>,

    /// Spread the events over all cores
    #[arg(long)]
    parallel: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate events and write the histograms to a file
    Generate {
        #[command(flatten)]
        overrides: RunOverrides,

        /// Path to output histogram file
        #[arg(short, long, default_value = "histograms.json")]
        output: PathBuf,
    },

    /// Run the consistency analysis on a histogram file
    Analyze {
        /// Path to input histogram file
        #[arg(short, long, default_value = "histograms.json")]
        input: PathBuf,
    },

    /// Generate and analyse in one go
    Run {
        #[command(flatten)]
        overrides: RunOverrides,

        /// Also save the histograms
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the particle type table
    Table,

    /// Browse the histograms interactively
    View {
        /// Histogram file to display (reloaded when it changes); without it a
        /// run is generated from the configuration, regenerated on every edit
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Show example configuration
    ExampleConfig,
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Warning: a global tracing subscriber is already installed");
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path)),
        None => Ok(Config::default()),
    }
}

fn apply_overrides(config: &mut Config, overrides: &RunOverrides) {
    if let Some(events) = overrides.events {
        config.run.events = events;
    }
    if let Some(particles) = overrides.particles {
        config.run.particles_per_event = particles;
    }
    if overrides.seed.is_some() {
        config.run.seed = overrides.seed;
    }
    if overrides.parallel {
        config.run.parallel = true;
    }
}

fn generate(config: &Config) -> Result<GenerationOutput> {
    let mut generator = EventGenerator::new(config.run.clone()).context("Invalid run configuration")?;
    let output = generator.run().context("Event generation failed")?;
    report::print_table(generator.registry());
    report::print_stats(&output.stats);
    Ok(output)
}

fn analyze(config: &Config, histograms: &HistogramSet) {
    let summary = ConsistencyAnalyzer::new().analyze(histograms, &config.analysis);
    report::print_summary(&summary);
}

fn save(histograms: &HistogramSet, path: &Path) -> Result<()> {
    histograms
        .save(path)
        .with_context(|| format!("Failed to write histograms to {:?}", path))?;
    info!("histograms written to {:?}", path);
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::ExampleConfig => {
            println!("{}", EXAMPLE_CONFIG);
        }

        Commands::Table => {
            let config = load_config(cli.config.as_deref())?;
            let registry = ParticleTypeRegistry::standard(config.run.kstar_width)?;
            report::print_table(&registry);
        }

        Commands::Generate { overrides, output } => {
            let mut config = load_config(cli.config.as_deref())?;
            apply_overrides(&mut config, &overrides);
            let generated = generate(&config)?;
            save(&generated.histograms, &output)?;
        }

        Commands::Analyze { input } => {
            let config = load_config(cli.config.as_deref())?;
            let histograms = HistogramSet::load(&input)
                .with_context(|| format!("Failed to load histograms from {:?}", input))?;
            analyze(&config, &histograms);
        }

        Commands::Run { overrides, output } => {
            let mut config = load_config(cli.config.as_deref())?;
            apply_overrides(&mut config, &overrides);
            let generated = generate(&config)?;
            if let Some(path) = output {
                save(&generated.histograms, &path)?;
            }
            analyze(&config, &generated.histograms);
        }

        Commands::View { input } => {
            let config = load_config(cli.config.as_deref())?;
            let source = match input {
                Some(path) => hist_app::ViewSource::Histograms(path),
                None => hist_app::ViewSource::Config(cli.config.clone()),
            };
            let native_options = eframe::NativeOptions::default();
            eframe::run_native(
                "kstarsim",
                native_options,
                Box::new(move |cc| {
                    Ok(Box::new(hist_app::HistApp::new(source, config.analysis, cc)))
                }),
            )
            .map_err(|e| anyhow::anyhow!("viewer failed: {}", e))?;
        }
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
