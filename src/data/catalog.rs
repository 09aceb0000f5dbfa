//! Event catalog.
//!
//! The built-in table covers the O1/O2 binary black holes plus a few
//! landmark O2/O3 events. A JSON file with the same shape (an array of
//! events) can replace it.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::domain::Detector::{H1, L1, V1};
use crate::domain::{Detector, Event, SourceKind};
use crate::error::AppError;

/// Immutable set of events, kept in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    events: Vec<Event>,
}

struct Row {
    name: &'static str,
    gps: f64,
    mass: f64,
    spin: f64,
    inclination: Option<f64>,
    distance: f64,
    snr: &'static [(Detector, f64)],
    kind: SourceKind,
}

const fn bbh(
    name: &'static str,
    gps: f64,
    mass: f64,
    spin: f64,
    inclination: f64,
    distance: f64,
    snr: &'static [(Detector, f64)],
) -> Row {
    Row {
        name,
        gps,
        mass,
        spin,
        inclination: Some(inclination),
        distance,
        snr,
        kind: SourceKind::Bbh,
    }
}

const BUILTIN: &[Row] = &[
    bbh("GW150914", 1126259462.4, 62.0, 0.68, 0.52, 410.0, &[(H1, 24.0), (L1, 13.0)]),
    bbh("GW151012", 1128678900.44, 36.0, 0.66, 2.35, 1080.0, &[(H1, 7.0), (L1, 7.0)]),
    bbh("GW151226", 1135136350.6, 20.8, 0.74, 2.53, 440.0, &[(H1, 13.0), (L1, 13.0)]),
    bbh("GW170104", 1167559936.6, 49.0, 0.66, 2.14, 990.0, &[(H1, 9.0), (L1, 10.0)]),
    bbh("GW170608", 1181338982.4, 18.0, 0.69, 1.35, 320.0, &[(H1, 12.0), (L1, 9.0)]),
    bbh("GW170729", 1185389807.3, 80.0, 0.81, 2.44, 2840.0, &[(H1, 7.0), (L1, 8.0)]),
    bbh("GW170809", 1186302519.8, 56.0, 0.70, 0.73, 1030.0, &[(H1, 6.0), (L1, 10.0)]),
    bbh("GW170814", 1186741861.5, 53.2, 0.72, 0.47, 540.0, &[(H1, 18.0), (L1, 15.0), (V1, 10.0)]),
    Row {
        name: "GW170817",
        gps: 1187008882.4,
        mass: 2.73,
        spin: 0.89,
        inclination: None,
        distance: 40.0,
        snr: &[(H1, 26.0), (L1, 18.0)],
        kind: SourceKind::Bns,
    },
    bbh("GW170818", 1187058327.1, 59.0, 0.67, 1.57, 1060.0, &[(H1, 4.0), (L1, 9.0), (V1, 4.0)]),
    bbh("GW170823", 1187529256.5, 65.0, 0.71, 2.09, 1940.0, &[(H1, 7.0), (L1, 9.0)]),
    Row {
        name: "GW190521",
        gps: 1242442967.4,
        mass: 142.0,
        spin: 0.72,
        inclination: None,
        distance: 5300.0,
        snr: &[(H1, 15.0), (L1, 15.0)],
        kind: SourceKind::Bbh,
    },
    Row {
        name: "GW190814",
        gps: 1249852257.0,
        mass: 25.6,
        spin: 0.71,
        inclination: None,
        distance: 241.0,
        snr: &[(H1, 25.0), (L1, 25.0)],
        kind: SourceKind::Nsbh,
    },
];

impl Catalog {
    pub fn builtin() -> Self {
        let events = BUILTIN
            .iter()
            .map(|r| Event {
                name: r.name.to_string(),
                gps_time: r.gps,
                final_mass: r.mass,
                final_spin: r.spin,
                inclination: r.inclination,
                distance_mpc: Some(r.distance),
                snr: r.snr.iter().copied().collect::<BTreeMap<_, _>>(),
                kind: r.kind,
            })
            .collect();
        Self { events }
    }

    pub fn from_events(events: Vec<Event>) -> Result<Self, AppError> {
        for (i, e) in events.iter().enumerate() {
            if e.name.trim().is_empty() {
                return Err(AppError::input(format!("Catalog entry {i} has an empty name.")));
            }
            if !(e.final_mass.is_finite() && e.final_mass > 0.0) {
                return Err(AppError::input(format!("{}: final mass must be positive.", e.name)));
            }
            if !(0.0..=1.0).contains(&e.final_spin) {
                return Err(AppError::input(format!("{}: final spin must be in [0, 1].", e.name)));
            }
            if events[..i].iter().any(|other| other.name == e.name) {
                return Err(AppError::input(format!("Duplicate catalog entry {}.", e.name)));
            }
        }
        Ok(Self { events })
    }

    /// Load a JSON array of events.
    pub fn from_json_file(path: &Path) -> Result<Self, AppError> {
        let text = fs::read_to_string(path)
            .map_err(|e| AppError::input(format!("Failed to read catalog {}: {e}", path.display())))?;
        let events: Vec<Event> = serde_json::from_str(&text)
            .map_err(|e| AppError::input(format!("Invalid catalog {}: {e}", path.display())))?;
        debug!("loaded {} events from {}", events.len(), path.display());
        Self::from_events(events)
    }

    /// Built-in table, or the file when one is given.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        match path {
            Some(p) => Self::from_json_file(p),
            None => Ok(Self::builtin()),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Event> {
        self.events.iter().find(|e| e.name == name)
    }

    /// Like `get`, but an unknown name is an error listing the known ones.
    pub fn require(&self, name: &str) -> Result<&Event, AppError> {
        self.get(name).ok_or_else(|| {
            AppError::data(format!(
                "Unknown event: {name}. Available: {}",
                self.names().collect::<Vec<_>>().join(", ")
            ))
        })
    }

    /// Look up an event and warn when `detector` has no SNR entry for it.
    pub fn for_detector(&self, name: &str, detector: Detector) -> Result<&Event, AppError> {
        let event = self.require(name)?;
        if !event.observed_by(detector) {
            warn!("{detector} may not have observed {name}");
        }
        Ok(event)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.events.iter().map(|e| e.name.as_str())
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Copy with one event replaced by `event` (matched by name).
    pub fn with_event(&self, event: Event) -> Self {
        let mut events = self.events.clone();
        match events.iter_mut().find(|e| e.name == event.name) {
            Some(slot) => *slot = event,
            None => events.push(event),
        }
        Self { events }
    }
}

/// Multi-line listing for the `list` command.
pub fn format_catalog(catalog: &Catalog) -> String {
    let mut out = String::from("\nAvailable events:\n");
    out.push_str(&"=".repeat(60));
    out.push('\n');
    for e in catalog.events() {
        out.push_str(&format!("\n{}:\n", e.name));
        out.push_str(&format!("  GPS time: {:.2}\n", e.gps_time));
        out.push_str(&format!("  Final mass: {:.1} M☉\n", e.final_mass));
        out.push_str(&format!("  Final spin: {:.3}\n", e.final_spin));
        if let Some(theta) = e.inclination {
            out.push_str(&format!("  Inclination: {:.0}°\n", theta.to_degrees()));
        }
        if let Some(d) = e.distance_mpc {
            out.push_str(&format!("  Distance: {d:.0} Mpc\n"));
        }
        if !e.snr.is_empty() {
            let snr: Vec<String> = e.snr.iter().map(|(d, s)| format!("{d}={s:.0}")).collect();
            out.push_str(&format!("  SNR: {}\n", snr.join(", ")));
        }
        match e.kind {
            SourceKind::Bbh => {}
            SourceKind::Bns => out.push_str("  Type: BNS\n"),
            SourceKind::Nsbh => out.push_str("  Type: NSBH\n"),
        }
    }
    out
}
