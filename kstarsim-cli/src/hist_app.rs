//! Interactive histogram viewer
//!
//! Shows every distribution of a run together with the fitted reference
//! model. The watched file (histogram file or configuration) is reloaded
//! when it changes on disk.

use eframe::egui;
use egui_plot::{Bar, BarChart, Line, Plot, PlotBounds, PlotPoints};
use kstarsim_core::analysis::SignalPair;
use kstarsim_core::{
    AnalysisConfig, AnalysisSummary, Config, ConsistencyAnalyzer, EventGenerator, FitResult,
    GenerationOutput, Histogram, HistogramSet, RunStats,
};
use notify::{Event, RecommendedWatcher, Watcher};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;

/// Where the displayed histograms come from
pub enum ViewSource {
    /// A file written by `kstarsim generate`
    Histograms(PathBuf),
    /// A fresh run of the given configuration (defaults when `None`)
    Config(Option<PathBuf>),
}

impl ViewSource {
    fn watched_path(&self) -> Option<&PathBuf> {
        match self {
            ViewSource::Histograms(path) => Some(path),
            ViewSource::Config(path) => path.as_ref(),
        }
    }
}

/// Histograms of one run plus the derived background-subtracted signals
struct Loaded {
    set: HistogramSet,
    signals: Vec<Histogram>,
    summary: AnalysisSummary,
}

/// Which histogram is on screen
#[derive(Clone, Copy, PartialEq, Eq)]
enum Selection {
    Set(&'static str),
    Signal(usize),
}

pub struct HistApp {
    source: ViewSource,
    analysis: AnalysisConfig,
    loaded: Option<Loaded>,
    stats: Option<RunStats>,
    selected: Selection,
    last_load_error: Option<String>,
    #[allow(dead_code)] // Kept alive to maintain file watching
    file_watcher: Option<RecommendedWatcher>,
    file_receiver: mpsc::Receiver<notify::Result<Event>>,
    run_receiver: Option<mpsc::Receiver<kstarsim_core::Result<GenerationOutput>>>,
    /// The configuration changed while a run was in flight
    rerun_pending: bool,
}

impl HistApp {
    pub fn new(
        source: ViewSource,
        analysis: AnalysisConfig,
        _cc: &eframe::CreationContext<'_>,
    ) -> Self {
        Self::with_source(source, analysis)
    }

    fn with_source(source: ViewSource, analysis: AnalysisConfig) -> Self {
        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })
        .ok();

        if let (Some(w), Some(path)) = (watcher.as_mut(), source.watched_path()) {
            if let Err(e) = w.watch(path, notify::RecursiveMode::NonRecursive) {
                tracing::warn!("cannot watch {:?}: {}", path, e);
            }
        }

        let mut app = Self {
            source,
            analysis,
            loaded: None,
            stats: None,
            selected: Selection::Set("inv_mass_decay_products"),
            last_load_error: None,
            file_watcher: watcher,
            file_receiver: rx,
            run_receiver: None,
            rerun_pending: false,
        };

        app.reload();

        app
    }

    fn reload(&mut self) {
        match &self.source {
            ViewSource::Histograms(path) => match HistogramSet::load(path) {
                Ok(set) => self.show(set),
                Err(e) => self.last_load_error = Some(format!("{}", e)),
            },
            ViewSource::Config(_) if self.run_receiver.is_some() => {
                // one run at a time; the latest configuration is picked up afterwards
                self.rerun_pending = true;
            }
            ViewSource::Config(path) => {
                let config = match path {
                    Some(path) => match Config::from_file(path) {
                        Ok(config) => config,
                        Err(e) => {
                            self.last_load_error = Some(format!("{}", e));
                            return;
                        }
                    },
                    None => Config::default(),
                };
                self.analysis = config.analysis.clone();

                // runs can take a while, keep the UI responsive
                let (tx, rx) = mpsc::channel();
                let run = config.run;
                thread::spawn(move || {
                    let result = EventGenerator::new(run).and_then(|mut g| g.run());
                    let _ = tx.send(result);
                });
                self.run_receiver = Some(rx);
            }
        }
    }

    fn show(&mut self, set: HistogramSet) {
        let signals = SignalPair::STANDARD
            .iter()
            .filter_map(|pair| {
                set.inv_mass(pair.minuend)
                    .difference(set.inv_mass(pair.subtrahend), pair.title())
                    .ok()
            })
            .collect();
        let summary = ConsistencyAnalyzer::new().analyze(&set, &self.analysis);
        self.loaded = Some(Loaded {
            set,
            signals,
            summary,
        });
        self.last_load_error = None;
    }

    fn reanalyze(&mut self) {
        if let Some(loaded) = self.loaded.take() {
            self.show(loaded.set);
        }
    }

    fn check_file_changes(&mut self) {
        let mut needs_reload = false;
        while let Ok(event) = self.file_receiver.try_recv() {
            match event {
                Ok(Event {
                    kind: notify::EventKind::Modify(_),
                    paths,
                    ..
                }) => {
                    if let Some(path) = self.source.watched_path() {
                        needs_reload |= paths.contains(path);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("file watcher error: {}", e);
                }
            }
        }

        if needs_reload {
            self.reload();
        }
    }

    fn check_generation(&mut self) {
        let Some(rx) = &self.run_receiver else {
            return;
        };
        match rx.try_recv() {
            Ok(Ok(output)) => {
                self.run_receiver = None;
                self.stats = Some(output.stats);
                self.show(output.histograms);
            }
            Ok(Err(e)) => {
                self.run_receiver = None;
                self.last_load_error = Some(format!("{}", e));
            }
            Err(mpsc::TryRecvError::Empty) => return,
            Err(mpsc::TryRecvError::Disconnected) => {
                self.run_receiver = None;
                self.last_load_error = Some("generator thread stopped unexpectedly".to_string());
            }
        }

        if std::mem::take(&mut self.rerun_pending) {
            self.reload();
        }
    }
}

impl Loaded {
    fn histogram(&self, selection: Selection) -> Option<&Histogram> {
        match selection {
            Selection::Set(key) => self.set.iter().find(|(k, _)| *k == key).map(|(_, h)| h),
            Selection::Signal(i) => self.signals.get(i),
        }
    }

    /// Fitted model drawn over the selected histogram, with its display window
    fn fit(&self, selection: Selection) -> Option<(&FitResult, Option<(f64, f64)>)> {
        let s = &self.summary;
        match selection {
            Selection::Set("momentum") => s.momentum.as_ref().ok().map(|r| (&r.fit, None)),
            Selection::Set("theta") => s.theta.as_ref().ok().map(|r| (&r.fit, None)),
            Selection::Set("phi") => s.phi.as_ref().ok().map(|r| (&r.fit, None)),
            Selection::Set("inv_mass_decay_products") => s
                .resonance
                .decay_products
                .as_ref()
                .ok()
                .map(|r| (&r.fit, r.display_window)),
            Selection::Signal(i) => s
                .resonance
                .subtracted
                .get(i)
                .and_then(|(_, r)| r.as_ref().ok())
                .map(|r| (&r.fit, r.display_window)),
            Selection::Set(_) => None,
        }
    }
}

fn histogram_bars(histogram: &Histogram) -> BarChart {
    let width = histogram.bin_width();
    let bars = (0..histogram.bins())
        .map(|bin| {
            let bar = Bar::new(histogram.bin_center(bin), histogram.content(bin)).width(width);
            match histogram.label(bin) {
                Some(label) => bar.name(label),
                None => bar,
            }
        })
        .collect();
    BarChart::new(bars).name(&histogram.title)
}

fn fit_line(fit: &FitResult) -> Line {
    let (low, high) = fit.range;
    let points: PlotPoints = (0..=400)
        .map(|i| {
            let x = low + (high - low) * i as f64 / 400.0;
            [x, fit.evaluate(x)]
        })
        .collect();
    Line::new(points)
        .name(format!("{} fit", fit.model))
        .color(egui::Color32::RED)
}

impl eframe::App for HistApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.check_file_changes();
        self.check_generation();

        egui::TopBottomPanel::top("controls").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if ui.button("🔄 Reload").clicked() {
                    self.reload();
                }

                ui.separator();

                let mut selected = self.selected;
                egui::ComboBox::from_label("Histogram")
                    .selected_text(match &self.loaded {
                        Some(loaded) => loaded
                            .histogram(selected)
                            .map_or_else(String::new, |h| h.title.clone()),
                        None => String::new(),
                    })
                    .show_ui(ui, |ui| {
                        if let Some(loaded) = &self.loaded {
                            for (key, h) in loaded.set.iter() {
                                ui.selectable_value(&mut selected, Selection::Set(key), &h.title);
                            }
                            for (i, h) in loaded.signals.iter().enumerate() {
                                ui.selectable_value(&mut selected, Selection::Signal(i), &h.title);
                            }
                        }
                    });
                self.selected = selected;

                ui.separator();

                if ui.checkbox(&mut self.analysis.zoom, "Zoom on peak").changed() {
                    self.reanalyze();
                }

                ui.separator();

                if self.run_receiver.is_some() {
                    ui.spinner();
                    ui.label("Generating...");
                } else if let Some(stats) = &self.stats {
                    ui.label(format!(
                        "{} events, seed {}, {:.1} s",
                        stats.events, stats.seed, stats.elapsed_secs
                    ));
                }
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            let Some(loaded) = &self.loaded else {
                if self.last_load_error.is_none() {
                    ui.label("No histograms loaded yet");
                }
                return;
            };
            let Some(histogram) = loaded.histogram(self.selected) else {
                return;
            };
            let fit = loaded.fit(self.selected);

            if let Some((fit, _)) = fit {
                ui.label(format!(
                    "{}: chi2/ndf = {:.2} / {}, probability = {:.3}",
                    fit.model,
                    fit.chi_square,
                    fit.degrees_of_freedom,
                    fit.probability()
                ));
            }

            Plot::new("histogram")
                .legend(egui_plot::Legend::default())
                .allow_scroll(false)
                .show(ui, |plot_ui| {
                    plot_ui.bar_chart(histogram_bars(histogram));
                    if let Some((fit, window)) = fit {
                        plot_ui.line(fit_line(fit));
                        if let Some((low, high)) = window {
                            let top = histogram.contents().iter().copied().fold(0.0, f64::max);
                            let bottom = histogram.contents().iter().copied().fold(0.0, f64::min);
                            plot_ui.set_plot_bounds(PlotBounds::from_min_max(
                                [low, bottom * 1.1],
                                [high, top * 1.1],
                            ));
                        }
                    }
                });
        });

        if self.last_load_error.is_some() {
            egui::TopBottomPanel::bottom("errors").show(ctx, |ui| {
                ui.set_max_height(100.0);
                if let Some(ref error) = self.last_load_error {
                    ui.label(
                        egui::RichText::new(format!("Error: {}", error))
                            .color(egui::Color32::RED),
                    );
                }
            });
        }

        if self.run_receiver.is_some() {
            ctx.request_repaint();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kstarsim_core::tests::test_helpers::{quick_config, run_config};
    use std::time::{Duration, Instant};

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("kstarsim-view-{}-{}", std::process::id(), name))
    }

    fn wait_for_run(app: &mut HistApp) {
        let deadline = Instant::now() + Duration::from_secs(60);
        while app.run_receiver.is_some() || app.rerun_pending {
            assert!(Instant::now() < deadline, "generation did not finish");
            app.check_generation();
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn test_histogram_file_is_analysed_with_given_options() {
        let path = temp_path("histograms.json");
        let output = run_config(quick_config(200, 50, 11)).unwrap();
        output.histograms.save(&path).unwrap();

        let analysis = AnalysisConfig {
            zoom: true,
            zoom_half_width: 0.2,
            ..AnalysisConfig::default()
        };
        let app = HistApp::with_source(ViewSource::Histograms(path.clone()), analysis.clone());
        std::fs::remove_file(&path).ok();

        assert_eq!(app.analysis, analysis);
        let loaded = app.loaded.as_ref().unwrap();
        let decay = loaded.summary.resonance.decay_products.as_ref().unwrap();
        let (low, high) = decay.display_window.unwrap();
        assert!((high - low - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_config_edits_during_a_run_are_queued() {
        let path = temp_path("config.toml");
        std::fs::write(&path, "[run]\nevents = 20\nparticles_per_event = 20\nseed = 5\n").unwrap();

        let mut app = HistApp::with_source(ViewSource::Config(Some(path.clone())), AnalysisConfig::default());
        assert!(app.run_receiver.is_some());

        app.reload();
        app.reload();
        assert!(app.rerun_pending);

        wait_for_run(&mut app);
        std::fs::remove_file(&path).ok();

        assert!(app.run_receiver.is_none());
        assert_eq!(app.stats.as_ref().map(|s| s.events), Some(20));
        assert!(app.loaded.is_some());
        assert!(app.last_load_error.is_none());
    }
}
