//! Signal processing primitives.
//!
//! - `fft`: FFT wrappers and window functions
//! - `filter`: Butterworth band-pass design and SOS filtering
//! - `hilbert`: analytic signal and instantaneous frequency
//! - `psd`: Welch PSD and whitening
//! - `stft`: spectrogram and Morlet CWT
//! - `peaks`: spectral peak picking

pub mod fft;
pub mod filter;
pub mod hilbert;
pub mod peaks;
pub mod psd;
pub mod stft;

pub use filter::{Sos, butter_bandpass};
pub use peaks::{PeakFinder, SpectralPeak};
pub use stft::TimeFrequencyMap;
