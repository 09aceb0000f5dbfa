//! Processed-strain cache.
//!
//! One JSON file per event and detector, `<event>_<detector>_processed.json`,
//! holding a `DataPackage`. It is written by `prepare` (or by `analyze` on a
//! cache miss) and read on every later run. No locking: the last writer wins.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::domain::{DataPackage, Detector};
use crate::error::AppError;

pub fn cache_path(data_dir: &Path, event: &str, detector: Detector) -> PathBuf {
    data_dir.join(format!("{event}_{detector}_processed.json"))
}

/// Write `package` into `data_dir`, creating the directory when needed.
pub fn save_package(data_dir: &Path, package: &DataPackage) -> Result<PathBuf, AppError> {
    if package.strain.data.iter().any(|v| !v.is_finite()) {
        return Err(AppError::data(format!(
            "Refusing to cache {}: strain contains non-finite samples.",
            package.event_name
        )));
    }
    fs::create_dir_all(data_dir)
        .map_err(|e| AppError::input(format!("Failed to create data dir '{}': {e}", data_dir.display())))?;
    let path = cache_path(data_dir, &package.event_name, package.detector);
    let file = File::create(&path)
        .map_err(|e| AppError::input(format!("Failed to create cache file '{}': {e}", path.display())))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, package)
        .map_err(|e| AppError::input(format!("Failed to write cache file '{}': {e}", path.display())))?;
    writer
        .flush()
        .map_err(|e| AppError::input(format!("Failed to flush cache file '{}': {e}", path.display())))?;
    debug!("cached {} samples to {}", package.strain.len(), path.display());
    Ok(path)
}

pub fn load_package(path: &Path) -> Result<DataPackage, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::input(format!("Failed to open cache file '{}': {e}", path.display())))?;
    let package: DataPackage = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| AppError::input(format!("Invalid cache file '{}': {e}", path.display())))?;
    // Catch hand-edited files whose merger index no longer fits the strain.
    package.strain.merger_index(package.merger())?;
    Ok(package)
}

/// The cached package for an event, or `None` when nothing is cached yet.
pub fn load_cached(data_dir: &Path, event: &str, detector: Detector) -> Result<Option<DataPackage>, AppError> {
    let path = cache_path(data_dir, event, detector);
    if !path.exists() {
        return Ok(None);
    }
    load_package(&path).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{SyntheticSpec, synthetic_event};

    fn temp_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("ringdown-cache-{tag}-{}", std::process::id()))
    }

    #[test]
    fn saved_package_reloads_identically() {
        let dir = temp_dir("roundtrip");
        let package = synthetic_event(&SyntheticSpec::default()).unwrap();
        let path = save_package(&dir, &package).unwrap();
        assert!(path.ends_with("SYNTHETIC_H1_processed.json"));

        let loaded = load_cached(&dir, "SYNTHETIC", Detector::H1).unwrap().unwrap();
        assert_eq!(loaded.strain.data, package.strain.data);
        assert_eq!(loaded.strain.sample_rate, package.strain.sample_rate);
        assert_eq!(loaded.merger_index, package.merger_index);
        assert_eq!(loaded, package);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn cache_file_is_complete_when_save_returns() {
        let dir = temp_dir("flushed");
        let package = synthetic_event(&SyntheticSpec::default()).unwrap();
        let path = save_package(&dir, &package).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.ends_with('}'));
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["event_name"], "SYNTHETIC");
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_cache_is_not_an_error() {
        let dir = temp_dir("missing");
        assert!(load_cached(&dir, "GW150914", Detector::L1).unwrap().is_none());
    }

    #[test]
    fn non_finite_strain_is_not_cached() {
        let dir = temp_dir("nan");
        let mut package = synthetic_event(&SyntheticSpec::default()).unwrap();
        package.strain.data[3] = f64::NAN;
        assert_eq!(save_package(&dir, &package).unwrap_err().exit_code(), 3);
        fs::remove_dir_all(&dir).ok();
    }
}
