//! GWOSC open-data archive client.
//!
//! Two things come from the archive:
//!
//! - strain: the event API lists per-detector files; we take the gzip text
//!   file at the requested rate and decode it into a `StrainSegment`
//! - parameter estimates: median remnant mass/spin, distance and
//!   inclination, used to refresh catalog entries
//!
//! Both are plain blocking requests without retries; callers skip the event
//! on failure.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read};

use flate2::read::GzDecoder;
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::domain::{Detector, Event, StrainSegment};
use crate::error::AppError;

const DEFAULT_BASE_URL: &str = "https://gwosc.org";

pub struct GwoscClient {
    client: Client,
    base_url: String,
}

/// One strain file advertised by the event API.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StrainFile {
    pub detector: String,
    pub format: String,
    pub sampling_rate: f64,
    #[serde(rename = "GPSstart")]
    pub gps_start: f64,
    pub duration: f64,
    pub url: String,
}

/// Median parameter estimates for one event version.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EventParameters {
    #[serde(default)]
    pub final_mass_source: Option<f64>,
    #[serde(default)]
    pub final_spin: Option<f64>,
    #[serde(default)]
    pub luminosity_distance: Option<f64>,
    #[serde(default)]
    pub theta_jn: Option<f64>,
}

impl EventParameters {
    /// Copy of `event` with every available estimate applied.
    pub fn apply(&self, event: &Event) -> Event {
        let mut out = event.clone();
        if let Some(m) = self.final_mass_source.filter(|m| m.is_finite() && *m > 0.0) {
            out.final_mass = m;
        }
        if let Some(a) = self.final_spin.filter(|a| (0.0..=1.0).contains(a)) {
            out.final_spin = a;
        }
        if let Some(d) = self.luminosity_distance.filter(|d| d.is_finite()) {
            out.distance_mpc = Some(d);
        }
        if let Some(theta) = self.theta_jn.filter(|t| t.is_finite()) {
            out.inclination = Some(theta);
        }
        out
    }
}

#[derive(Debug, Clone, Deserialize)]
struct EventVersion {
    #[serde(rename = "GPS")]
    gps: f64,
    #[serde(default)]
    strain: Vec<StrainFile>,
    #[serde(flatten)]
    parameters: EventParameters,
}

#[derive(Debug, Deserialize)]
struct EventResponse {
    events: BTreeMap<String, EventVersion>,
}

/// The newest version of an event as listed by the API.
#[derive(Debug, Clone, PartialEq)]
pub struct EventInfo {
    pub version: String,
    pub gps: f64,
    pub strain: Vec<StrainFile>,
    pub parameters: EventParameters,
}

impl GwoscClient {
    /// Base URL from `GWOSC_BASE_URL` (`.env` honoured), else the public archive.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let base_url = std::env::var("GWOSC_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::new(base_url)
    }

    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn fetch_event(&self, name: &str) -> Result<EventInfo, AppError> {
        let url = format!("{}/eventapi/json/event/{name}/", self.base_url);
        debug!("GET {url}");
        let resp = self
            .client
            .get(&url)
            .send()
            .map_err(|e| AppError::input(format!("GWOSC request failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(AppError::input(format!(
                "GWOSC event request for {name} failed with status {}.",
                resp.status()
            )));
        }
        let body = resp
            .text()
            .map_err(|e| AppError::input(format!("Failed to read GWOSC response: {e}")))?;
        parse_event_response(&body, name)
    }

    pub fn fetch_parameters(&self, name: &str) -> Result<EventParameters, AppError> {
        Ok(self.fetch_event(name)?.parameters)
    }

    /// Download `duration` seconds of strain centred on the event GPS time.
    pub fn fetch_strain(
        &self,
        event: &Event,
        detector: Detector,
        sample_rate: u32,
        duration: f64,
    ) -> Result<StrainSegment, AppError> {
        let info = self.fetch_event(&event.name)?;
        let (start, end) = (event.gps_time - duration / 2.0, event.gps_time + duration / 2.0);
        let file = select_strain_file(&info.strain, detector, sample_rate, event.gps_time)?;
        info!(
            "fetching {} {detector} strain ({} Hz, {:.0} s file)",
            event.name, sample_rate, file.duration
        );

        let resp = self
            .client
            .get(&file.url)
            .send()
            .map_err(|e| AppError::input(format!("Strain download failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(AppError::input(format!(
                "Strain download failed with status {}.",
                resp.status()
            )));
        }
        let bytes = resp
            .bytes()
            .map_err(|e| AppError::input(format!("Failed to read strain download: {e}")))?;

        let data = if file.url.ends_with(".gz") {
            parse_strain_text(GzDecoder::new(bytes.as_ref()))?
        } else {
            parse_strain_text(bytes.as_ref())?
        };
        let full = StrainSegment::new(file.gps_start, file.sampling_rate, data)?;
        let cropped = full.crop_gps(start, end);
        if cropped.is_empty() {
            return Err(AppError::data(format!(
                "Strain file for {} does not cover GPS {start:.1}-{end:.1}.",
                event.name
            )));
        }
        info!("{} samples ({:.1} s) of {detector} strain", cropped.len(), cropped.duration());
        Ok(cropped)
    }
}

pub fn parse_event_response(body: &str, name: &str) -> Result<EventInfo, AppError> {
    let parsed: EventResponse = serde_json::from_str(body)
        .map_err(|e| AppError::input(format!("Failed to parse GWOSC event response: {e}")))?;
    let (version, ev) = parsed
        .events
        .into_iter()
        .next_back()
        .ok_or_else(|| AppError::data(format!("GWOSC has no entry for {name}.")))?;
    Ok(EventInfo {
        version,
        gps: ev.gps,
        strain: ev.strain,
        parameters: ev.parameters,
    })
}

/// Shortest text-format file for `detector` at `sample_rate` containing `gps`.
///
/// Archive files rarely line up with `gps ± duration/2` exactly; the caller
/// crops to whatever part of its span the file holds.
pub fn select_strain_file(
    files: &[StrainFile],
    detector: Detector,
    sample_rate: u32,
    gps: f64,
) -> Result<&StrainFile, AppError> {
    files
        .iter()
        .filter(|f| f.detector == detector.as_str())
        .filter(|f| f.format == "txt")
        .filter(|f| (f.sampling_rate - f64::from(sample_rate)).abs() < 0.5)
        .filter(|f| f.gps_start <= gps && gps < f.gps_start + f.duration)
        .min_by(|a, b| a.duration.total_cmp(&b.duration))
        .ok_or_else(|| {
            AppError::data(format!(
                "No {detector} text strain file at {sample_rate} Hz contains GPS {gps:.1}."
            ))
        })
}

/// One value per line; `#` lines are headers.
pub fn parse_strain_text<R: Read>(reader: R) -> Result<Vec<f64>, AppError> {
    let mut out = Vec::new();
    for (lineno, line) in BufReader::new(reader).lines().enumerate() {
        let line = line.map_err(|e| AppError::input(format!("Failed to read strain file: {e}")))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let v: f64 = trimmed
            .parse()
            .map_err(|_| AppError::data(format!("Invalid strain value on line {}: '{trimmed}'", lineno + 1)))?;
        out.push(v);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    const RESPONSE: &str = r#"{
        "events": {
            "GW150914-v2": {"GPS": 1126259462.4, "strain": []},
            "GW150914-v3": {
                "GPS": 1126259462.4,
                "final_mass_source": 63.1,
                "final_spin": 0.69,
                "luminosity_distance": 440.0,
                "chirp_mass": 28.6,
                "strain": [
                    {"detector": "H1", "format": "hdf5", "sampling_rate": 4096, "GPSstart": 1126259447,
                     "duration": 32, "url": "https://example/H1.hdf5"},
                    {"detector": "H1", "format": "txt", "sampling_rate": 4096, "GPSstart": 1126257415,
                     "duration": 4096, "url": "https://example/H1_4096.txt.gz"},
                    {"detector": "H1", "format": "txt", "sampling_rate": 4096, "GPSstart": 1126259447,
                     "duration": 32, "url": "https://example/H1_32.txt.gz"},
                    {"detector": "L1", "format": "txt", "sampling_rate": 16384, "GPSstart": 1126259447,
                     "duration": 32, "url": "https://example/L1_32.txt.gz"}
                ]
            }
        }
    }"#;

    #[test]
    fn newest_version_is_used() {
        let info = parse_event_response(RESPONSE, "GW150914").unwrap();
        assert_eq!(info.version, "GW150914-v3");
        assert_eq!(info.strain.len(), 4);
        assert_eq!(info.parameters.final_mass_source, Some(63.1));
        assert_eq!(info.parameters.theta_jn, None);
        assert!(parse_event_response(r#"{"events": {}}"#, "X").is_err());
    }

    #[test]
    fn shortest_text_file_containing_the_event_is_selected() {
        let info = parse_event_response(RESPONSE, "GW150914").unwrap();
        let gps = 1126259462.4;
        let file = select_strain_file(&info.strain, Detector::H1, 4096, gps).unwrap();
        assert_eq!(file.url, "https://example/H1_32.txt.gz");
        let late = select_strain_file(&info.strain, Detector::H1, 4096, gps + 100.0).unwrap();
        assert_eq!(late.url, "https://example/H1_4096.txt.gz");
        // L1 only has 16 kHz data.
        assert!(select_strain_file(&info.strain, Detector::L1, 4096, gps).is_err());
        assert!(select_strain_file(&info.strain, Detector::V1, 4096, gps).is_err());
    }

    #[test]
    fn gzip_text_strain_is_decoded() {
        let text = "# Gravitational wave strain\n# starting GPS 1126259447\n1.0e-21\n-2.5e-21\n\n3e-22\n";
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(text.as_bytes()).unwrap();
        let gz = enc.finish().unwrap();
        let data = parse_strain_text(GzDecoder::new(gz.as_slice())).unwrap();
        assert_eq!(data, vec![1.0e-21, -2.5e-21, 3e-22]);
        assert!(parse_strain_text("1.0\nabc\n".as_bytes()).is_err());
    }

    #[test]
    fn parameters_override_catalog_values() {
        let event = crate::data::Catalog::builtin().get("GW150914").unwrap().clone();
        let params = EventParameters {
            final_mass_source: Some(63.1),
            final_spin: Some(0.69),
            luminosity_distance: None,
            theta_jn: Some(2.8),
        };
        let updated = params.apply(&event);
        assert_eq!(updated.final_mass, 63.1);
        assert_eq!(updated.final_spin, 0.69);
        assert_eq!(updated.distance_mpc, event.distance_mpc);
        assert_eq!(updated.inclination, Some(2.8));
    }
}
