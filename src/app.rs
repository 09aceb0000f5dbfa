//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and sets up logging
//! - loads the event catalog
//! - fetches/caches strain and runs the per-event analyses
//! - prints reports/plots
//! - writes the result directory

use std::path::Path;

use clap::Parser;
use tracing::{info, warn};

use crate::analysis::{ResonanceSummary, TimeFrequencyAnalyzer};
use crate::cli::{AnalyzeArgs, Command, DataArgs, DemoArgs, ListArgs, PrepareArgs, QnmArgs};
use crate::data::{Catalog, GwoscClient, SyntheticSpec, format_catalog, synthetic_event};
use crate::domain::{AnalysisConfig, Event};
use crate::error::AppError;
use crate::models::QnmModel;

pub mod pipeline;

/// Entry point for the `ringdown` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::List(args) => handle_list(args),
        Command::Qnm(args) => handle_qnm(args),
        Command::Prepare(args) => handle_prepare(args),
        Command::Analyze(args) => handle_analyze(args),
        Command::Demo(args) => handle_demo(args),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn handle_list(args: ListArgs) -> Result<(), AppError> {
    let catalog = Catalog::load(args.catalog.as_deref())?;
    println!("{}", format_catalog(&catalog));
    Ok(())
}

fn handle_qnm(args: QnmArgs) -> Result<(), AppError> {
    let qnm = QnmModel::new(args.mass, args.spin)?;
    print!("{}", crate::report::format_qnm(&qnm));
    Ok(())
}

fn handle_prepare(args: PrepareArgs) -> Result<(), AppError> {
    let config = data_config_from_args(&args.data);
    let catalog = Catalog::load(config.catalog.as_deref())?;
    let client = GwoscClient::from_env();
    let resolved = pipeline::resolve_events(std::slice::from_ref(&args.event), &catalog, &config, &client);
    if let Some(skipped) = resolved.skipped.into_iter().next() {
        return Err(skipped.reason);
    }

    for event in &resolved.events {
        let package = pipeline::prepare_event(event, &config, &client)?;
        let path = crate::io::cache_path(&config.data_dir, &package.event_name, package.detector);
        println!(
            "{} ({}): {} samples at {:.0} Hz, merger at GPS {:.4}",
            package.event_name,
            package.detector,
            package.strain.len(),
            package.strain.sample_rate,
            package.merger_gps
        );
        println!("Saved to {}", path.display());
    }
    Ok(())
}

fn handle_analyze(args: AnalyzeArgs) -> Result<(), AppError> {
    let config = analysis_config_from_args(&args);
    let catalog = Catalog::load(config.catalog.as_deref())?;
    let client = GwoscClient::from_env();

    let names = if args.all {
        pipeline::batch_candidates(&catalog, config.detector)
    } else {
        args.events.clone()
    };
    if names.is_empty() {
        return Err(AppError::input("No events selected."));
    }
    let resolved = pipeline::resolve_events(&names, &catalog, &config, &client);

    println!("Analyzing {} event(s) with {}", resolved.events.len(), config.detector);
    let mut batch = pipeline::run_batch(&resolved.events, &config, &client);
    batch.skipped.splice(0..0, resolved.skipped);
    for analysis in &batch.analyses {
        print!("{}", crate::report::format_event_summary(analysis));
    }
    print!("{}", crate::report::format_batch_summary(&batch, names.len()));
    if batch.analyses.is_empty() {
        return Err(AppError::data("No events could be analyzed."));
    }

    let interpretation = crate::report::interpret(&batch.stacker);
    let resonance = ResonanceSummary::from_measurements(
        batch
            .analyses
            .iter()
            .filter_map(|a| a.spin.measurement.as_ref().map(|m| (a.event.final_mass, m))),
    );
    let report = crate::report::format_analysis_report(&batch.stacker, interpretation.as_ref(), Some(&resonance));
    println!("\n{report}");

    let written = crate::io::write_batch_outputs(&config.output_dir, &batch, &report, &config)?;
    if config.plots {
        draw_figures(&batch, &config.output_dir);
    }
    println!("Results saved to {}", config.output_dir.display());
    for path in written {
        info!("wrote {}", path.display());
    }
    Ok(())
}

/// Figures are a convenience; a drawing failure is logged, not fatal.
fn draw_figures(batch: &pipeline::BatchOutput, dir: &Path) {
    for analysis in &batch.analyses {
        match crate::plot::plot_time_frequency(analysis, dir) {
            Ok(path) => info!("wrote {}", path.display()),
            Err(err) => warn!("{}: {err}", analysis.event.name),
        }
    }
    if batch.stacker.len() > 1 {
        match crate::plot::plot_multi_event_summary(&batch.stacker, dir) {
            Ok(path) => info!("wrote {}", path.display()),
            Err(err) => warn!("{err}"),
        }
    }
}

fn handle_demo(args: DemoArgs) -> Result<(), AppError> {
    let spec = SyntheticSpec {
        mass: args.mass,
        spin: args.spin,
        shift: args.shift,
        noise: args.noise,
        seed: args.seed,
        ..SyntheticSpec::default()
    };
    let config = AnalysisConfig::default();
    let package = synthetic_event(&spec)?;
    let event = Event::from_package(&package);
    let analysis = pipeline::analyze_package(&event, &package, &config)?;

    println!(
        "Synthetic ringdown: shift {:+.1}%, noise σ={}, seed {}",
        spec.shift * 100.0,
        spec.noise,
        spec.seed
    );
    print!("{}", crate::report::format_event_summary(&analysis));

    let tf = TimeFrequencyAnalyzer::new(&package.strain, package.merger())?;
    let f0 = analysis.f220_gr;
    let track = tf.instantaneous_frequency(config.early_window.0, config.early_window.1, (0.7 * f0, 1.3 * f0))?;
    println!("\nInstantaneous frequency (o) vs GR f220 (-):");
    print!(
        "{}",
        crate::plot::render_frequency_track(&track, f0, args.width, args.height)
    );
    Ok(())
}

/// Config for commands that only fetch/cache data.
pub fn data_config_from_args(args: &DataArgs) -> AnalysisConfig {
    AnalysisConfig {
        detector: args.detector,
        sample_rate: args.sample_rate,
        data_dir: args.data_dir.clone(),
        catalog: args.catalog.clone(),
        download_params: args.download_params,
        ..AnalysisConfig::default()
    }
}

pub fn analysis_config_from_args(args: &AnalyzeArgs) -> AnalysisConfig {
    AnalysisConfig {
        output_dir: args.output.clone(),
        fetch: !args.no_fetch,
        min_priority: args.min_priority,
        plots: !args.no_plots,
        ..data_config_from_args(&args.data)
    }
}
