//! ASCII frequency-track plot for the terminal.
//!
//! Fixed-size character canvas, deterministic so it can be golden-tested:
//! - instantaneous-frequency samples: `o`
//! - expected (GR) frequency: a row of `-`

use crate::analysis::FrequencyTrack;

/// Render a frequency track (times in s after merger) against `expected` Hz.
pub fn render_frequency_track(track: &FrequencyTrack, expected: f64, width: usize, height: usize) -> String {
    let samples: Vec<(f64, f64)> = track
        .times
        .iter()
        .zip(&track.frequency)
        .filter(|(t, f)| t.is_finite() && f.is_finite())
        .map(|(&t, &f)| (t * 1000.0, f))
        .collect();

    let t_span = span(samples.iter().map(|s| s.0)).unwrap_or((0.0, 1.0));
    let f_span = span(samples.iter().map(|s| s.1).chain([expected]).filter(|f| f.is_finite()))
        .map(|(lo, hi)| {
            let pad = ((hi - lo) * 0.05).max(1e-12);
            (lo - pad, hi + pad)
        })
        .unwrap_or((-0.05, 1.05));

    let mut canvas = Canvas::new(width.max(10), height.max(5), t_span, f_span);
    if expected.is_finite() {
        canvas.fill_row(expected, '-');
    }
    for &(t, f) in &samples {
        canvas.put(t, f, 'o');
    }
    canvas.render()
}

/// `(min, max)` when the values span a non-empty interval.
fn span(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    (lo.is_finite() && hi > lo).then_some((lo, hi))
}

struct Canvas {
    width: usize,
    height: usize,
    t_span: (f64, f64),
    f_span: (f64, f64),
    /// Row-major, row 0 at the top (highest frequency).
    cells: Vec<char>,
}

impl Canvas {
    fn new(width: usize, height: usize, t_span: (f64, f64), f_span: (f64, f64)) -> Self {
        Self {
            width,
            height,
            t_span,
            f_span,
            cells: vec![' '; width * height],
        }
    }

    fn scale(v: f64, (lo, hi): (f64, f64), cells: usize) -> usize {
        let u = ((v - lo) / (hi - lo)).clamp(0.0, 1.0);
        (u * (cells - 1) as f64).round() as usize
    }

    fn row(&self, f: f64) -> usize {
        self.height - 1 - Self::scale(f, self.f_span, self.height)
    }

    fn fill_row(&mut self, f: f64, ch: char) {
        let start = self.row(f) * self.width;
        self.cells[start..start + self.width].fill(ch);
    }

    fn put(&mut self, t: f64, f: f64, ch: char) {
        let col = Self::scale(t, self.t_span, self.width);
        let idx = self.row(f) * self.width + col;
        self.cells[idx] = ch;
    }

    fn render(&self) -> String {
        let (t0, t1) = self.t_span;
        let (f0, f1) = self.f_span;
        let mut out = format!("Plot: t=[{t0:.2}, {t1:.2}] ms | f=[{f0:.1}, {f1:.1}] Hz\n");
        for row in self.cells.chunks(self.width) {
            out.extend(row);
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plot_golden_snapshot_small() {
        let track = FrequencyTrack {
            times: vec![0.001, 0.010],
            frequency: vec![250.0, 260.0],
            amplitude: vec![1.0, 0.5],
        };
        let txt = render_frequency_track(&track, 250.0, 10, 5);
        let expected = concat!(
            "Plot: t=[1.00, 10.00] ms | f=[249.5, 260.5] Hz\n",
            "         o\n",
            "          \n",
            "          \n",
            "          \n",
            "o---------\n",
        );
        assert_eq!(txt, expected);
    }

    #[test]
    fn empty_track_still_draws_the_reference() {
        let txt = render_frequency_track(&FrequencyTrack::default(), 250.0, 12, 5);
        assert!(txt.starts_with("Plot: t=[0.00, 1.00] ms"));
        assert!(txt.contains("------------"));
        assert!(!txt.contains('o'));
    }
}
