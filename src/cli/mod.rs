//! Command-line parsing for the ringdown anomaly analyzer.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the signal-processing code.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::Detector;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "ringdown",
    version,
    about = "Search binary black-hole ringdowns for deviations from Kerr quasi-normal modes"
)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the events in the catalog.
    List(ListArgs),
    /// Print the GR quasi-normal-mode prediction for a remnant.
    Qnm(QnmArgs),
    /// Fetch, preprocess and cache strain for one event.
    Prepare(PrepareArgs),
    /// Analyze events and write the stacked report, exports and figures.
    Analyze(AnalyzeArgs),
    /// Run the per-event analysis on a synthetic ringdown (no network).
    Demo(DemoArgs),
}

#[derive(Debug, Args, Clone)]
pub struct ListArgs {
    /// Catalog JSON file replacing the built-in table.
    #[arg(long, value_name = "JSON")]
    pub catalog: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct QnmArgs {
    /// Remnant mass (solar masses).
    #[arg(long)]
    pub mass: f64,

    /// Dimensionless remnant spin.
    #[arg(long)]
    pub spin: f64,
}

/// Options shared by every command that touches strain data.
#[derive(Debug, Args, Clone)]
pub struct DataArgs {
    /// Detector to analyze.
    #[arg(long, value_enum, default_value_t = Detector::H1)]
    pub detector: Detector,

    /// Strain sample rate (Hz) requested from the archive.
    #[arg(long, default_value_t = 4096)]
    pub sample_rate: u32,

    /// Directory holding the processed-strain cache.
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    /// Catalog JSON file replacing the built-in table.
    #[arg(long, value_name = "JSON")]
    pub catalog: Option<PathBuf>,

    /// Refresh remnant parameters from the archive before analysis.
    #[arg(long)]
    pub download_params: bool,
}

#[derive(Debug, Args, Clone)]
pub struct PrepareArgs {
    /// Event name, e.g. GW150914.
    #[arg(long)]
    pub event: String,

    #[command(flatten)]
    pub data: DataArgs,
}

#[derive(Debug, Args, Clone)]
pub struct AnalyzeArgs {
    /// Comma-separated event names.
    #[arg(long, value_delimiter = ',', conflicts_with = "all", required_unless_present = "all")]
    pub events: Vec<String>,

    /// Analyze every catalog event observed by the detector.
    #[arg(long)]
    pub all: bool,

    #[command(flatten)]
    pub data: DataArgs,

    /// Output directory for reports, exports and figures.
    #[arg(long, default_value = "analysis_results")]
    pub output: PathBuf,

    /// Skip events whose priority score is below this value.
    #[arg(long)]
    pub min_priority: Option<f64>,

    /// Do not draw SVG figures.
    #[arg(long)]
    pub no_plots: bool,

    /// Use cached data only; never download.
    #[arg(long)]
    pub no_fetch: bool,
}

#[derive(Debug, Args, Clone)]
pub struct DemoArgs {
    /// Remnant mass (solar masses).
    #[arg(long, default_value_t = 62.0)]
    pub mass: f64,

    /// Dimensionless remnant spin.
    #[arg(long, default_value_t = 0.68)]
    pub spin: f64,

    /// Fractional frequency shift injected into the ringdown.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub shift: f64,

    /// Gaussian noise standard deviation (ringdown peak amplitude is 1).
    #[arg(long, default_value_t = 0.1)]
    pub noise: f64,

    /// Random seed for the noise.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Plot width (columns).
    #[arg(long, default_value_t = 80)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 20)]
    pub height: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn analyze_splits_event_list() {
        let cli = Cli::parse_from(["ringdown", "-vv", "analyze", "--events", "GW150914,GW170814", "--no-plots"]);
        assert_eq!(cli.verbose, 2);
        let Command::Analyze(args) = cli.command else {
            panic!("expected analyze");
        };
        assert_eq!(args.events, ["GW150914", "GW170814"]);
        assert!(args.no_plots && !args.all);
        assert_eq!(args.data.detector, Detector::H1);
    }

    #[test]
    fn analyze_requires_events_or_all() {
        assert!(Cli::try_parse_from(["ringdown", "analyze"]).is_err());
        assert!(Cli::try_parse_from(["ringdown", "analyze", "--all", "--events", "GW150914"]).is_err());
        assert!(Cli::try_parse_from(["ringdown", "analyze", "--all", "--detector", "L1"]).is_ok());
    }

    #[test]
    fn demo_accepts_negative_shift() {
        let cli = Cli::parse_from(["ringdown", "demo", "--shift", "-0.05"]);
        let Command::Demo(args) = cli.command else {
            panic!("expected demo");
        };
        assert_eq!(args.shift, -0.05);
        assert_eq!(args.seed, 42);
    }
}
