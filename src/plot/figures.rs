//! SVG figures.
//!
//! - `<event>_time_frequency.svg`: strain, instantaneous frequency against
//!   the GR value, its fractional deviation, Hilbert amplitude, and the
//!   spectrogram and Morlet scalogram around the merger
//! - `multi_event_summary.svg`: stacked metrics against mass and spin
//!
//! Drawing code returns boxed errors; the public entry points turn them into
//! `AppError` with the file name attached.

use std::error::Error;
use std::path::{Path, PathBuf};

use plotters::coord::Shift;
use plotters::prelude::*;

use crate::analysis::{MultiEventStacker, TimeFrequencyAnalyzer};
use crate::app::pipeline::EventAnalysis;
use crate::dsp::TimeFrequencyMap;
use crate::error::AppError;

type DrawResult = Result<(), Box<dyn Error>>;
type Panel<'a> = DrawingArea<SVGBackend<'a>, Shift>;

const FIGURE_SIZE: (u32, u32) = (1200, 900);
const TIME_FREQUENCY_SIZE: (u32, u32) = (1200, 1350);
const SPECTROGRAM_MAX_HZ: f64 = 600.0;
const SCALOGRAM_BAND: (f64, f64) = (50.0, 500.0);
/// Heatmaps are thinned to at most this many time columns.
const HEATMAP_MAX_COLUMNS: usize = 160;

struct Axes<'a> {
    title: &'a str,
    x_desc: &'a str,
    y_desc: &'a str,
}

/// Draw the per-event figure into `out_dir`.
pub fn plot_time_frequency(analysis: &EventAnalysis, out_dir: &Path) -> Result<PathBuf, AppError> {
    let path = out_dir.join(format!("{}_time_frequency.svg", analysis.event.name));
    draw_time_frequency(analysis, &path)
        .map_err(|e| AppError::input(format!("Failed to draw '{}': {e}", path.display())))?;
    Ok(path)
}

/// Draw the batch summary figure into `out_dir`.
pub fn plot_multi_event_summary(stacker: &MultiEventStacker, out_dir: &Path) -> Result<PathBuf, AppError> {
    let path = out_dir.join("multi_event_summary.svg");
    draw_summary(stacker, &path).map_err(|e| AppError::input(format!("Failed to draw '{}': {e}", path.display())))?;
    Ok(path)
}

fn draw_time_frequency(a: &EventAnalysis, path: &Path) -> DrawResult {
    let pkg = &a.package;
    let tf = TimeFrequencyAnalyzer::new(&pkg.strain, pkg.merger())?;
    let fs = pkg.strain.sample_rate;
    let merger = tf.merger_index() as f64;
    let f0 = a.f220_gr;

    let (start, end) = tf.window(-0.02, 0.05);
    let strain: Vec<(f64, f64)> = (start..end)
        .map(|i| ((i as f64 - merger) / fs * 1000.0, pkg.strain.data[i]))
        .collect();
    let track = tf.instantaneous_frequency(0.0, 0.05, (0.7 * f0, 1.3 * f0))?;
    let freq: Vec<(f64, f64)> = track
        .times
        .iter()
        .zip(&track.frequency)
        .map(|(&t, &f)| (t * 1000.0, f))
        .collect();
    let deviation: Vec<(f64, f64)> = freq.iter().map(|&(t, f)| (t, (f - f0) / f0 * 100.0)).collect();
    let amp: Vec<(f64, f64)> = track
        .times
        .iter()
        .zip(&track.amplitude)
        .map(|(&t, &v)| (t * 1000.0, v))
        .collect();
    let spec = tf.spectrogram_analysis(-0.02, 0.05, 256, 0.95);
    let scalogram = tf.continuous_wavelet_transform(-0.02, 0.05, SCALOGRAM_BAND);

    let root = SVGBackend::new(path, TIME_FREQUENCY_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let root = root.titled(&format!("{} ringdown time-frequency", a.event.name), ("sans-serif", 24))?;
    let panels = root.split_evenly((3, 2));

    line_panel(
        &panels[0],
        &Axes {
            title: "Whitened strain",
            x_desc: "t - t_merger (ms)",
            y_desc: "h (whitened)",
        },
        &strain,
        None,
    )?;
    line_panel(
        &panels[1],
        &Axes {
            title: "Instantaneous frequency",
            x_desc: "t - t_merger (ms)",
            y_desc: "f (Hz)",
        },
        &freq,
        Some(f0),
    )?;
    line_panel(
        &panels[2],
        &Axes {
            title: "Hilbert amplitude",
            x_desc: "t - t_merger (ms)",
            y_desc: "|h|",
        },
        &amp,
        None,
    )?;
    line_panel(
        &panels[3],
        &Axes {
            title: "Deviation from GR",
            x_desc: "t - t_merger (ms)",
            y_desc: "(f - f220) / f220 (%)",
        },
        &deviation,
        None,
    )?;
    heatmap_panel(&panels[4], "Spectrogram", &spec, f0)?;
    heatmap_panel(&panels[5], "Morlet scalogram", &scalogram, f0)?;

    root.present()?;
    Ok(())
}

fn draw_summary(stacker: &MultiEventStacker, path: &Path) -> DrawResult {
    let events = stacker.events();
    let dev_vs_mass: Vec<(f64, f64)> = events
        .iter()
        .filter_map(|e| Some((e.mass, e.metrics.max_deviation? * 100.0)))
        .collect();
    let dev_vs_inv_m2: Vec<(f64, f64)> = events
        .iter()
        .filter_map(|e| Some((1e4 / (e.mass * e.mass), e.metrics.max_deviation? * 100.0)))
        .collect();
    let residual_vs_spin: Vec<(f64, f64)> = events
        .iter()
        .filter_map(|e| Some((e.spin, e.metrics.quantum_residual?)))
        .collect();
    let significance: Vec<(String, f64)> = events
        .iter()
        .map(|e| (e.name.clone(), e.metrics.significance.unwrap_or(0.0)))
        .collect();

    let root = SVGBackend::new(path, FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let root = root.titled(&format!("Multi-event summary ({} events)", events.len()), ("sans-serif", 24))?;
    let panels = root.split_evenly((2, 2));

    scatter_panel(
        &panels[0],
        &Axes {
            title: "Frequency deviation vs mass",
            x_desc: "Final mass (M☉)",
            y_desc: "Max deviation (%)",
        },
        &dev_vs_mass,
    )?;
    bar_panel(&panels[1], "Jump-test significance", &significance)?;
    scatter_panel(
        &panels[2],
        &Axes {
            title: "Deviation vs 1/M²",
            x_desc: "10⁴ / M²",
            y_desc: "Max deviation (%)",
        },
        &dev_vs_inv_m2,
    )?;
    scatter_panel(
        &panels[3],
        &Axes {
            title: "Quantum residual vs spin",
            x_desc: "Final spin",
            y_desc: "Residual vs Kerr (%)",
        },
        &residual_vs_spin,
    )?;

    root.present()?;
    Ok(())
}

/// `(min, max)` of finite values, padded by 5 %; `(0, 1)` when nothing is finite.
fn padded_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !(lo.is_finite() && hi.is_finite()) {
        return (0.0, 1.0);
    }
    let pad = ((hi - lo) * 0.05).max(hi.abs().max(1e-12) * 0.01);
    (lo - pad, hi + pad)
}

fn line_panel(area: &Panel<'_>, axes: &Axes<'_>, data: &[(f64, f64)], reference: Option<f64>) -> DrawResult {
    let x = padded_range(data.iter().map(|p| p.0));
    let y = padded_range(data.iter().map(|p| p.1).chain(reference));

    let mut chart = ChartBuilder::on(area)
        .caption(axes.title, ("sans-serif", 18))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x.0..x.1, y.0..y.1)?;
    chart
        .configure_mesh()
        .x_desc(axes.x_desc)
        .y_desc(axes.y_desc)
        .light_line_style(WHITE.mix(0.0))
        .draw()?;

    chart.draw_series(LineSeries::new(data.iter().copied(), &BLUE))?;
    if let Some(level) = reference {
        chart
            .draw_series(LineSeries::new([(x.0, level), (x.1, level)], RED.stroke_width(2)))?
            .label(format!("GR prediction ({level:.1} Hz)"))
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 15, y)], RED));
        chart
            .configure_series_labels()
            .border_style(BLACK)
            .background_style(WHITE.mix(0.8))
            .draw()?;
    }
    Ok(())
}

fn scatter_panel(area: &Panel<'_>, axes: &Axes<'_>, data: &[(f64, f64)]) -> DrawResult {
    let x = padded_range(data.iter().map(|p| p.0));
    let y = padded_range(data.iter().map(|p| p.1).chain([0.0]));

    let mut chart = ChartBuilder::on(area)
        .caption(axes.title, ("sans-serif", 18))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x.0..x.1, y.0..y.1)?;
    chart
        .configure_mesh()
        .x_desc(axes.x_desc)
        .y_desc(axes.y_desc)
        .draw()?;

    chart.draw_series(LineSeries::new([(x.0, 0.0), (x.1, 0.0)], BLACK.mix(0.4)))?;
    chart.draw_series(data.iter().map(|&p| Circle::new(p, 5, BLUE.filled())))?;
    Ok(())
}

fn bar_panel(area: &Panel<'_>, title: &str, bars: &[(String, f64)]) -> DrawResult {
    let n = bars.len().max(1) as f64;
    let y = padded_range(bars.iter().map(|b| b.1).chain([0.0, 3.0]));

    let mut chart = ChartBuilder::on(area)
        .caption(title, ("sans-serif", 18))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(-0.5..n - 0.5, 0.0..y.1)?;
    let label = |v: &f64| {
        let idx = v.round();
        if (v - idx).abs() < 1e-6 && idx >= 0.0 {
            bars.get(idx as usize).map(|b| b.0.clone()).unwrap_or_default()
        } else {
            String::new()
        }
    };
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(bars.len().max(1))
        .x_label_formatter(&label)
        .y_desc("Significance (σ)")
        .draw()?;

    chart.draw_series(bars.iter().enumerate().map(|(i, (_, v))| {
        let color = if *v > 3.0 { RED } else { BLUE };
        let x = i as f64;
        Rectangle::new([(x - 0.35, 0.0), (x + 0.35, v.max(0.0))], color.filled())
    }))?;
    chart
        .draw_series(LineSeries::new([(-0.5, 3.0), (n - 0.5, 3.0)], RED.stroke_width(1)))?
        .label("3σ")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 15, y)], RED));
    chart
        .configure_series_labels()
        .border_style(BLACK)
        .background_style(WHITE.mix(0.8))
        .draw()?;
    Ok(())
}

/// Magnitude map as coloured cells, normalised to its peak, with the
/// expected frequency drawn across it.
fn heatmap_panel(area: &Panel<'_>, title: &str, map: &TimeFrequencyMap, expected: f64) -> DrawResult {
    let times_ms: Vec<f64> = map.times.iter().map(|t| t * 1000.0).collect();
    let x = padded_range(times_ms.iter().copied());
    let f_min = map.frequencies.first().copied().unwrap_or(0.0);
    let f_max = map
        .frequencies
        .last()
        .copied()
        .unwrap_or(SPECTROGRAM_MAX_HZ)
        .min(SPECTROGRAM_MAX_HZ);

    let mut chart = ChartBuilder::on(area)
        .caption(title, ("sans-serif", 18))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x.0..x.1, f_min..f_max.max(f_min + 1.0))?;
    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("t - t_merger (ms)")
        .y_desc("f (Hz)")
        .draw()?;

    let peak = map.peak();
    if !map.is_empty() && peak > 0.0 {
        let stride = times_ms.len().div_ceil(HEATMAP_MAX_COLUMNS).max(1);
        let dt = if times_ms.len() > 1 {
            (times_ms[1] - times_ms[0]) * stride as f64
        } else {
            x.1 - x.0
        };
        let df = if map.frequencies.len() > 1 {
            map.frequencies[1] - map.frequencies[0]
        } else {
            f_max - f_min
        };
        let cells = map
            .frequencies
            .iter()
            .zip(&map.magnitude)
            .filter(|(f, _)| **f <= f_max)
            .flat_map(|(&f, row)| {
                times_ms.iter().zip(row).step_by(stride).map(move |(&t, &m)| {
                    let v = (m / peak).clamp(0.0, 1.0);
                    Rectangle::new(
                        [(t - dt / 2.0, f - df / 2.0), (t + dt / 2.0, f + df / 2.0)],
                        HSLColor(0.66 * (1.0 - v), 0.9, 0.15 + 0.45 * v).filled(),
                    )
                })
            });
        chart.draw_series(cells)?;
    }
    chart.draw_series(LineSeries::new([(x.0, expected), (x.1, expected)], WHITE.stroke_width(2)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::EventMetrics;
    use crate::app::pipeline::analyze_package;
    use crate::data::{SyntheticSpec, synthetic_event};
    use crate::domain::{AnalysisConfig, Event};

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("ringdown-plot-{tag}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn padded_range_handles_empty_and_flat_input() {
        assert_eq!(padded_range(std::iter::empty()), (0.0, 1.0));
        let (lo, hi) = padded_range([5.0, 5.0].into_iter());
        assert!(lo < 5.0 && hi > 5.0);
        assert_eq!(padded_range([f64::NAN].into_iter()), (0.0, 1.0));
    }

    #[test]
    fn time_frequency_figure_is_written() {
        let dir = temp_dir("tf");
        let pkg = synthetic_event(&SyntheticSpec::default()).unwrap();
        let event = Event::from_package(&pkg);
        let analysis = analyze_package(&event, &pkg, &AnalysisConfig::default()).unwrap();
        let path = plot_time_frequency(&analysis, &dir).unwrap();
        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("SYNTHETIC ringdown time-frequency"));
        assert!(svg.contains("Spectrogram"));
        assert!(svg.contains("Morlet scalogram"));
        assert!(svg.contains("Deviation from GR"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn summary_figure_tolerates_missing_metrics() {
        let dir = temp_dir("summary");
        let mut stacker = MultiEventStacker::new();
        stacker.add_event("A", 62.0, 0.68, EventMetrics::default());
        stacker.add_event(
            "B",
            36.0,
            0.66,
            EventMetrics {
                max_deviation: Some(0.02),
                significance: Some(1.5),
                quantum_residual: Some(-0.4),
                ..EventMetrics::default()
            },
        );
        let path = plot_multi_event_summary(&stacker, &dir).unwrap();
        assert!(path.ends_with("multi_event_summary.svg"));
        assert!(std::fs::read_to_string(&path).unwrap().contains("Multi-event summary (2 events)"));
        std::fs::remove_dir_all(&dir).ok();
    }
}
