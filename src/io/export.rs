//! Batch result exports.
//!
//! `analyze` writes four files into the output directory:
//! - `analysis_results.json`: per-event metrics plus combined statistics
//! - `fit_results.csv`: one row per analyzed event, easy to load in a spreadsheet
//! - `analysis_report.txt`: the formatted text report
//! - `README.md`: what was run and what each file is

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;

use crate::analysis::{EventMetrics, Metric, MultiEventStacker};
use crate::app::pipeline::{BatchOutput, EventAnalysis};
use crate::domain::AnalysisConfig;
use crate::error::AppError;

#[derive(Debug, Serialize)]
struct ResultsFile<'a> {
    analysis_date: String,
    n_events: usize,
    events: Vec<EventEntry<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    combined_statistics: Option<CombinedStatistics>,
}

#[derive(Debug, Serialize)]
struct EventEntry<'a> {
    name: &'a str,
    mass: f64,
    spin: f64,
    results: &'a EventMetrics,
}

#[derive(Debug, Serialize)]
struct CombinedStatistics {
    weighted_mean_deviation: f64,
    weighted_std_deviation: Option<f64>,
    combined_significance_sigma: f64,
}

/// Write `analysis_results.json`.
pub fn write_results_json(path: &Path, stacker: &MultiEventStacker) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::input(format!("Failed to create results JSON '{}': {e}", path.display())))?;

    let (mean, std, sigma) = stacker.compute_weighted_average(Metric::MaxDeviation);
    let results = ResultsFile {
        analysis_date: Utc::now().to_rfc3339(),
        n_events: stacker.len(),
        events: stacker
            .events()
            .iter()
            .map(|e| EventEntry {
                name: &e.name,
                mass: e.mass,
                spin: e.spin,
                results: &e.metrics,
            })
            .collect(),
        combined_statistics: mean.map(|mean| CombinedStatistics {
            weighted_mean_deviation: mean,
            weighted_std_deviation: std,
            combined_significance_sigma: sigma,
        }),
    };

    serde_json::to_writer_pretty(file, &results)
        .map_err(|e| AppError::input(format!("Failed to write results JSON: {e}")))?;
    Ok(())
}

/// Write per-event fit results to a CSV file. Missing values are empty cells.
pub fn write_fit_csv(path: &Path, analyses: &[EventAnalysis]) -> Result<(), AppError> {
    let mut file = File::create(path)
        .map_err(|e| AppError::input(format!("Failed to create fit CSV '{}': {e}", path.display())))?;

    writeln!(
        file,
        "event,mass,spin,f220_gr,tau220_gr_ms,max_deviation,significance,detected,fit_success,f_obs,f_error,tau_ms,delta_raw,quantum_residual,sigma_quantum,overtone_ratio"
    )
    .map_err(|e| AppError::input(format!("Failed to write fit CSV header: {e}")))?;

    let cell = |v: Option<f64>| v.map(|v| format!("{v:.6}")).unwrap_or_default();
    for a in analyses {
        let m = a.spin.measurement.as_ref();
        writeln!(
            file,
            "{},{:.2},{:.4},{:.4},{:.4},{},{},{},{},{},{},{},{},{},{},{}",
            a.event.name,
            a.event.final_mass,
            a.event.final_spin,
            a.f220_gr,
            a.tau220_gr * 1000.0,
            cell(a.metrics.max_deviation),
            cell(a.metrics.significance),
            a.metrics.detected.map(|d| d.to_string()).unwrap_or_default(),
            a.spin.fit.success,
            cell(m.map(|m| m.f_obs)),
            cell(m.map(|m| m.f_error)),
            cell(m.map(|m| m.damping_time * 1000.0)),
            cell(m.map(|m| m.delta_raw)),
            cell(m.map(|m| m.quantum_residual)),
            cell(m.map(|m| m.sigma_quantum)),
            cell(a.metrics.overtone_ratio),
        )
        .map_err(|e| AppError::input(format!("Failed to write fit CSV row: {e}")))?;
    }
    Ok(())
}

pub fn write_text(path: &Path, text: &str) -> Result<(), AppError> {
    fs::write(path, text).map_err(|e| AppError::input(format!("Failed to write '{}': {e}", path.display())))
}

/// README describing the run that produced the directory.
pub fn render_readme(batch: &BatchOutput, config: &AnalysisConfig) -> String {
    let mut out = String::new();
    out.push_str("# Ringdown anomaly analysis\n\n");
    out.push_str(&format!("Generated: {}\n\n", Utc::now().format("%Y-%m-%d %H:%M:%S UTC")));
    out.push_str("## Run\n\n");
    out.push_str(&format!("- Detector: {}\n", config.detector));
    out.push_str(&format!("- Sample rate: {} Hz\n", config.sample_rate));
    out.push_str(&format!(
        "- Bandpass: {:.0}-{:.0} Hz (order {})\n",
        config.bandpass.0, config.bandpass.1, config.bandpass_order
    ));
    out.push_str(&format!(
        "- Jump-test window: {:.0}-{:.0} ms after merger\n",
        config.early_window.0 * 1000.0,
        config.early_window.1 * 1000.0
    ));
    out.push_str(&format!(
        "- Fit window: {:.0}-{:.0} ms after merger\n",
        config.fit_window.0 * 1000.0,
        config.fit_window.1 * 1000.0
    ));
    let names: Vec<&str> = batch.analyses.iter().map(|a| a.event.name.as_str()).collect();
    out.push_str(&format!("- Events analyzed ({}): {}\n", names.len(), names.join(", ")));
    if !batch.skipped.is_empty() {
        let skipped: Vec<&str> = batch.skipped.iter().map(|s| s.name.as_str()).collect();
        out.push_str(&format!("- Events skipped: {}\n", skipped.join(", ")));
    }
    out.push_str("\n## Files\n\n");
    out.push_str("- `analysis_report.txt`: stacked statistics and interpretation\n");
    out.push_str("- `analysis_results.json`: per-event metrics and combined statistics\n");
    out.push_str("- `fit_results.csv`: per-event fit parameters\n");
    if config.plots {
        out.push_str("- `<event>_time_frequency.svg`: strain, frequency track and spectrogram per event\n");
        out.push_str("- `multi_event_summary.svg`: stacked metrics against mass and spin\n");
    }
    out
}

/// Write all text outputs of a batch into `dir`; returns the paths written.
pub fn write_batch_outputs(
    dir: &Path,
    batch: &BatchOutput,
    report: &str,
    config: &AnalysisConfig,
) -> Result<Vec<PathBuf>, AppError> {
    fs::create_dir_all(dir)
        .map_err(|e| AppError::input(format!("Failed to create output dir '{}': {e}", dir.display())))?;

    let json = dir.join("analysis_results.json");
    write_results_json(&json, &batch.stacker)?;
    let csv = dir.join("fit_results.csv");
    write_fit_csv(&csv, &batch.analyses)?;
    let txt = dir.join("analysis_report.txt");
    write_text(&txt, report)?;
    let readme = dir.join("README.md");
    write_text(&readme, &render_readme(batch, config))?;
    Ok(vec![json, csv, txt, readme])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("ringdown-export-{tag}-{}", std::process::id()))
    }

    fn batch() -> BatchOutput {
        let mut batch = BatchOutput::default();
        batch.stacker.add_event(
            "GW150914",
            62.0,
            0.67,
            EventMetrics {
                max_deviation: Some(0.03),
                significance: Some(1.2),
                detected: Some(false),
                ..EventMetrics::default()
            },
        );
        batch.stacker.add_event("GW151226", 20.8, 0.74, EventMetrics::default());
        batch
    }

    #[test]
    fn results_json_has_combined_statistics_when_measured() {
        let dir = temp_dir("json");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("analysis_results.json");
        write_results_json(&path, &batch().stacker).unwrap();

        let v: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(v["n_events"], 2);
        assert_eq!(v["events"][0]["name"], "GW150914");
        assert_eq!(v["events"][0]["results"]["max_deviation"], 0.03);
        assert!(v["events"][1]["results"].as_object().unwrap().is_empty());
        let combined = &v["combined_statistics"];
        assert!((combined["weighted_mean_deviation"].as_f64().unwrap() - 0.03).abs() < 1e-12);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn results_json_omits_combined_statistics_without_measurements() {
        let dir = temp_dir("empty");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("analysis_results.json");
        write_results_json(&path, &MultiEventStacker::new()).unwrap();

        let v: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(v["n_events"], 0);
        assert!(v.get("combined_statistics").is_none());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn batch_outputs_are_all_written() {
        let dir = temp_dir("batch");
        let paths = write_batch_outputs(&dir, &batch(), "report\n", &AnalysisConfig::default()).unwrap();
        assert_eq!(paths.len(), 4);
        assert!(paths.iter().all(|p| p.exists()));

        let csv = fs::read_to_string(dir.join("fit_results.csv")).unwrap();
        assert_eq!(csv.lines().count(), 1);
        assert!(csv.starts_with("event,mass,spin,"));
        let readme = fs::read_to_string(dir.join("README.md")).unwrap();
        assert!(readme.contains("- Detector: H1"));
        assert_eq!(fs::read_to_string(dir.join("analysis_report.txt")).unwrap(), "report\n");
        fs::remove_dir_all(&dir).ok();
    }
}
