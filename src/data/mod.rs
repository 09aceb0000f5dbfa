//! Event sources.
//!
//! - built-in/JSON event catalog (`catalog`)
//! - GWOSC strain and parameter-estimate downloads (`gwosc`)
//! - synthetic ringdowns for offline runs (`synthetic`)

pub mod catalog;
pub mod gwosc;
pub mod synthetic;

pub use catalog::{Catalog, format_catalog};
pub use gwosc::{EventParameters, GwoscClient};
pub use synthetic::{SyntheticSpec, synthetic_event};
