//! Shared per-event workflow used by `prepare`, `analyze` and `demo`.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! fetch -> preprocess -> merger crop -> cache -> jump test -> overtone test -> spin fit -> stack
//!
//! The command handlers in `app` then only deal with presentation and files.

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::analysis::{
    EventMetrics, JumpResult, MultiEventStacker, OvertoneAnalyzer, OvertoneRatioTest, Priority, PronyMode,
    SpinCorrectedResult, TimeFrequencyAnalyzer, event_priority, spin_corrected_fit,
};
use crate::data::{Catalog, GwoscClient};
use crate::domain::{AnalysisConfig, DataPackage, Detector, Event, RingdownFit, SourceKind, StrainSegment};
use crate::error::AppError;
use crate::io::cache::{load_cached, save_package};
use crate::models::QnmModel;
use crate::preprocess::{PreprocessOptions, check_data_quality, find_merger_peak, preprocess_strain};

/// Everything computed for one event.
#[derive(Debug, Clone, Serialize)]
pub struct EventAnalysis {
    /// Catalog entry with the cached remnant parameters applied.
    pub event: Event,
    #[serde(skip)]
    pub package: DataPackage,
    pub priority: Priority,
    pub f220_gr: f64,
    pub tau220_gr: f64,
    pub jump: JumpResult,
    pub prony: Vec<PronyMode>,
    pub overtone: OvertoneRatioTest,
    pub spin: SpinCorrectedResult,
    pub multimode: RingdownFit,
    pub metrics: EventMetrics,
}

/// Event that could not be analyzed, with the reason.
#[derive(Debug, Clone)]
pub struct SkippedEvent {
    pub name: String,
    pub reason: AppError,
}

/// All computed outputs of one `ringdown analyze` run.
#[derive(Debug, Clone, Default)]
pub struct BatchOutput {
    pub analyses: Vec<EventAnalysis>,
    pub skipped: Vec<SkippedEvent>,
    pub filtered: Vec<String>,
    pub stacker: MultiEventStacker,
}

/// Preprocess raw strain around `event` into a cache-ready package.
///
/// The whitened, band-passed strain is cropped to `gps ± crop_half_width`
/// and the merger is taken as the loudest sample of that crop.
pub fn process_strain(event: &Event, raw: &StrainSegment, config: &AnalysisConfig) -> Result<DataPackage, AppError> {
    let opts = PreprocessOptions {
        band: config.bandpass,
        order: config.bandpass_order,
        fftlength: None,
    };
    let processed = preprocess_strain(raw, &opts)?;
    let half = config.crop_half_width;
    let cropped = processed.crop_gps(event.gps_time - half, event.gps_time + half);
    if cropped.is_empty() {
        return Err(AppError::data(format!(
            "{}: preprocessed strain does not cover the merger at GPS {:.2}.",
            event.name, event.gps_time
        )));
    }
    let peak = find_merger_peak(&cropped, None, config.min_post_merger)?;

    let quality = check_data_quality(&cropped);
    debug!("{}:\n{}", event.name, quality.render());
    if !quality.passed {
        return Err(AppError::data(format!("{}: data quality checks failed.", event.name)));
    }

    Ok(DataPackage {
        event_name: event.name.clone(),
        detector: config.detector,
        strain: cropped,
        merger_index: peak.index as u64,
        merger_gps: peak.gps_time,
        final_mass: event.final_mass,
        final_spin: event.final_spin,
        inclination: event.inclination,
        quality_passed: quality.passed,
        created: chrono::Utc::now(),
    })
}

/// Download, preprocess and cache one event.
pub fn prepare_event(event: &Event, config: &AnalysisConfig, client: &GwoscClient) -> Result<DataPackage, AppError> {
    info!("preparing {} ({})", event.name, config.detector);
    let raw = client.fetch_strain(event, config.detector, config.sample_rate, config.fetch_duration)?;
    let package = process_strain(event, &raw, config)?;
    let path = save_package(&config.data_dir, &package)?;
    info!("saved processed data to {}", path.display());
    Ok(package)
}

/// Cached package for `event`, preparing it first on a cache miss.
pub fn load_or_prepare(event: &Event, config: &AnalysisConfig, client: &GwoscClient) -> Result<DataPackage, AppError> {
    if let Some(package) = load_cached(&config.data_dir, &event.name, config.detector)? {
        info!("loaded cached data for {}", event.name);
        return Ok(package);
    }
    if !config.fetch {
        return Err(AppError::data(format!(
            "No processed data for {} in '{}' and fetching is disabled.",
            event.name,
            config.data_dir.display()
        )));
    }
    prepare_event(event, config, client)
}

/// Run every per-event analysis on a prepared package.
pub fn analyze_package(event: &Event, package: &DataPackage, config: &AnalysisConfig) -> Result<EventAnalysis, AppError> {
    let mut event = event.clone();
    event.final_mass = package.final_mass;
    event.final_spin = package.final_spin;
    event.inclination = package.inclination.or(event.inclination);

    let qnm = QnmModel::new(event.final_mass, event.final_spin)?;
    let merger = package.merger();
    info!(
        "{}: M={:.1} M☉, a={:.3}, f220={:.1} Hz, τ220={:.2} ms",
        event.name,
        qnm.mass(),
        qnm.spin(),
        qnm.f_220(),
        qnm.tau_220() * 1000.0
    );

    let tf = TimeFrequencyAnalyzer::new(&package.strain, merger)?;
    let (early_start, early_end) = config.early_window;
    let jump = tf.detect_frequency_jump(early_start, early_end, qnm.f_220(), config.jump_tolerance)?;
    debug!("{}: jump test: {}", event.name, jump.message);

    let overtones = OvertoneAnalyzer::new(&package.strain, merger)?;
    let prony = overtones.prony_method(0.0, config.prony_duration, config.n_modes);
    let overtone = overtones.test_overtone_ratio(&qnm, 0.0, config.prony_duration);
    debug!("{}: overtone test: {}", event.name, overtone.message);

    let spin = spin_corrected_fit(&package.strain, merger, &event, config.fit_window)?;
    if !spin.success() {
        warn!("{}: ringdown fit failed: {}", event.name, spin.fit.message);
    }
    let (fit_start, fit_end) = config.fit_window;
    let multimode = overtones.fit_multimode(fit_start, fit_end - fit_start, config.n_modes, &qnm, spin.band);

    let metrics = event_metrics(&jump, &overtone, &spin);
    Ok(EventAnalysis {
        priority: event_priority(&event),
        event,
        package: package.clone(),
        f220_gr: qnm.f_220(),
        tau220_gr: qnm.tau_220(),
        jump,
        prony,
        overtone,
        spin,
        multimode,
        metrics,
    })
}

/// Stackable scalars; analyses that produced nothing leave their fields empty.
pub fn event_metrics(jump: &JumpResult, overtone: &OvertoneRatioTest, spin: &SpinCorrectedResult) -> EventMetrics {
    let mut metrics = EventMetrics::default();
    if jump.measured {
        metrics.max_deviation = Some(jump.max_deviation);
        metrics.significance = Some(jump.significance);
        metrics.detected = Some(jump.detected);
    }
    if overtone.success {
        metrics.overtone_ratio = Some(overtone.ratio_observed);
        metrics.overtone_deviation = Some(overtone.fractional_deviation);
    }
    if let Some(m) = &spin.measurement {
        metrics.quantum_residual = Some(m.quantum_residual);
        metrics.sigma_quantum = Some(m.sigma_quantum);
        metrics.fit_frequency = Some(m.f_obs);
    }
    metrics
}

/// Catalog entries for the requested names, plus the names that failed.
#[derive(Debug, Clone, Default)]
pub struct ResolvedEvents {
    pub events: Vec<Event>,
    pub skipped: Vec<SkippedEvent>,
}

/// Resolve names against the catalog, optionally refreshing parameters.
///
/// An unknown name is logged and skipped; the other events still run.
pub fn resolve_events(
    names: &[String],
    catalog: &Catalog,
    config: &AnalysisConfig,
    client: &GwoscClient,
) -> ResolvedEvents {
    let mut out = ResolvedEvents::default();
    for name in names {
        let event = match catalog.for_detector(name, config.detector) {
            Ok(event) => event,
            Err(reason) => {
                warn!("skipping {name}: {reason}");
                out.skipped.push(SkippedEvent {
                    name: name.clone(),
                    reason,
                });
                continue;
            }
        };
        if !config.download_params {
            out.events.push(event.clone());
            continue;
        }
        match client.fetch_parameters(name) {
            Ok(params) => out.events.push(params.apply(event)),
            Err(err) => {
                warn!("{name}: keeping catalog parameters ({err})");
                out.events.push(event.clone());
            }
        }
    }
    out
}

/// Catalog events `analyze --all` runs on: binary black holes seen by the detector.
pub fn batch_candidates(catalog: &Catalog, detector: Detector) -> Vec<String> {
    catalog
        .events()
        .iter()
        .filter(|e| e.kind == SourceKind::Bbh && e.observed_by(detector))
        .map(|e| e.name.clone())
        .collect()
}

/// Analyze every event; failures are logged and skipped.
///
/// Events are processed in parallel and reported in the order given.
pub fn run_batch(events: &[Event], config: &AnalysisConfig, client: &GwoscClient) -> BatchOutput {
    let mut out = BatchOutput::default();
    let mut selected = Vec::with_capacity(events.len());
    for event in events {
        let priority = event_priority(event);
        match config.min_priority {
            Some(min) if priority.score < min => {
                info!("{}: priority {:.1} below {min:.1}, skipped", event.name, priority.score);
                out.filtered.push(event.name.clone());
            }
            _ => selected.push(event),
        }
    }

    let results: Vec<(String, Result<EventAnalysis, AppError>)> = selected
        .par_iter()
        .map(|event| {
            let result = load_or_prepare(event, config, client).and_then(|pkg| analyze_package(event, &pkg, config));
            (event.name.clone(), result)
        })
        .collect();

    for (name, result) in results {
        match result {
            Ok(analysis) => {
                out.stacker.add_event(
                    &analysis.event.name,
                    analysis.event.final_mass,
                    analysis.event.final_spin,
                    analysis.metrics.clone(),
                );
                out.analyses.push(analysis);
            }
            Err(reason) => {
                warn!("skipping {name}: {reason}");
                out.skipped.push(SkippedEvent { name, reason });
            }
        }
    }
    info!(
        "batch complete: {}/{} events analyzed",
        out.analyses.len(),
        events.len()
    );
    out
}
