//! Spectral peak detection.
//!
//! Local maxima above a fraction of the global maximum, thinned so that no
//! two kept peaks are closer than a minimum bin distance (taller peaks win).

/// A detected spectral peak
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralPeak {
    /// Frequency in Hz
    pub frequency: f64,
    /// Magnitude at the peak bin
    pub amplitude: f64,
    /// Bin index in spectrum
    pub bin_index: usize,
}

/// Peak detection configuration
#[derive(Debug, Clone)]
pub struct PeakFinder {
    /// Minimum height as a fraction of the spectrum maximum
    min_height_ratio: f64,
    /// Maximum number of peaks to return
    max_peaks: usize,
    /// Kept peaks must be at least this many bins apart
    min_distance: usize,
}

impl Default for PeakFinder {
    fn default() -> Self {
        Self {
            min_height_ratio: 0.1,
            max_peaks: 10,
            min_distance: 20,
        }
    }
}

impl PeakFinder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_height_ratio(mut self, ratio: f64) -> Self {
        self.min_height_ratio = ratio;
        self
    }

    pub fn with_max_peaks(mut self, max_peaks: usize) -> Self {
        self.max_peaks = max_peaks;
        self
    }

    pub fn with_min_distance(mut self, min_distance: usize) -> Self {
        self.min_distance = min_distance.max(1);
        self
    }

    /// Find peaks in a magnitude spectrum; returned strongest first.
    pub fn find_peaks(&self, magnitude: &[f64], frequencies: &[f64]) -> Vec<SpectralPeak> {
        let n = magnitude.len().min(frequencies.len());
        if n < 3 {
            return Vec::new();
        }
        let max = magnitude[..n].iter().copied().fold(f64::MIN, f64::max);
        let threshold = self.min_height_ratio * max;

        // Local maxima; a flat top counts once, at its middle.
        let mut candidates: Vec<(usize, f64)> = Vec::new();
        let mut i = 1;
        while i < n - 1 {
            if magnitude[i] > magnitude[i - 1] {
                let mut j = i;
                while j + 1 < n && magnitude[j + 1] == magnitude[i] {
                    j += 1;
                }
                if j + 1 < n && magnitude[j + 1] < magnitude[i] {
                    let mid = (i + j) / 2;
                    if magnitude[mid] >= threshold {
                        candidates.push((mid, magnitude[mid]));
                    }
                    i = j + 1;
                    continue;
                }
            }
            i += 1;
        }

        // Tallest first; ties keep the lower bin.
        candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)));

        let mut kept: Vec<(usize, f64)> = Vec::new();
        for (idx, amp) in candidates {
            if kept.iter().all(|&(k, _)| idx.abs_diff(k) >= self.min_distance) {
                kept.push((idx, amp));
            }
        }

        kept.into_iter()
            .take(self.max_peaks)
            .map(|(idx, amp)| SpectralPeak {
                frequency: frequencies[idx],
                amplitude: amp,
                bin_index: idx,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bins(n: usize) -> Vec<f64> {
        (0..n).map(|i| i as f64).collect()
    }

    #[test]
    fn finds_strongest_peaks_first() {
        let mut mag = vec![0.0; 100];
        mag[20] = 5.0;
        mag[60] = 10.0;
        mag[90] = 0.5; // below 10 % of max
        let peaks = PeakFinder::new().find_peaks(&mag, &bins(100));
        assert_eq!(peaks.len(), 2);
        assert_eq!(peaks[0].bin_index, 60);
        assert_eq!(peaks[1].bin_index, 20);
    }

    #[test]
    fn enforces_minimum_distance() {
        let mut mag = vec![0.0; 100];
        mag[40] = 10.0;
        mag[55] = 8.0;
        mag[60] = 7.0;
        let peaks = PeakFinder::new().with_min_distance(20).find_peaks(&mag, &bins(100));
        let idx: Vec<usize> = peaks.iter().map(|p| p.bin_index).collect();
        assert_eq!(idx, vec![40, 60]);
    }

    #[test]
    fn flat_top_counts_once_and_edges_are_ignored() {
        let mag = [9.0, 1.0, 3.0, 3.0, 3.0, 1.0, 0.0, 2.0];
        let peaks = PeakFinder::new().with_min_distance(1).find_peaks(&mag, &bins(8));
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].bin_index, 3);
        let limited = PeakFinder::new().with_max_peaks(0).find_peaks(&mag, &bins(8));
        assert!(limited.is_empty());
    }
}
