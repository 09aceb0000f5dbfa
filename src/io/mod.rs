//! Input/output helpers.
//!
//! - processed-strain cache (`cache`)
//! - result exports (JSON/CSV/text) (`export`)

pub mod cache;
pub mod export;

pub use cache::*;
pub use export::*;
