//! Plotting: ASCII for the terminal, SVG for the results directory.

pub mod ascii;
pub mod figures;

pub use ascii::render_frequency_track;
pub use figures::{plot_multi_event_summary, plot_time_frequency};
