//! Multi-event stacking.
//!
//! Each event contributes whichever scalar metrics its analysis produced.
//! Aggregates only ever see the events that actually carry the requested
//! metric; a missing value is never read as zero.

use serde::Serialize;

use crate::math::{pearson, pearson_p_value};

/// Scalar per-event quantities that can be stacked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    MaxDeviation,
    Significance,
    QuantumResidual,
    SigmaQuantum,
    FitFrequency,
    OvertoneRatio,
    OvertoneDeviation,
}

impl Metric {
    pub const ALL: [Metric; 7] = [
        Metric::MaxDeviation,
        Metric::Significance,
        Metric::QuantumResidual,
        Metric::SigmaQuantum,
        Metric::FitFrequency,
        Metric::OvertoneRatio,
        Metric::OvertoneDeviation,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Metric::MaxDeviation => "max_deviation",
            Metric::Significance => "significance",
            Metric::QuantumResidual => "quantum_residual",
            Metric::SigmaQuantum => "sigma_quantum",
            Metric::FitFrequency => "fit_frequency",
            Metric::OvertoneRatio => "overtone_ratio",
            Metric::OvertoneDeviation => "overtone_deviation",
        }
    }
}

/// Results attached to one stacked event.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_deviation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub significance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected: Option<bool>,
    /// Percent deviation left after the Kerr correction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantum_residual: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sigma_quantum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fit_frequency: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overtone_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overtone_deviation: Option<f64>,
}

impl EventMetrics {
    pub fn get(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::MaxDeviation => self.max_deviation,
            Metric::Significance => self.significance,
            Metric::QuantumResidual => self.quantum_residual,
            Metric::SigmaQuantum => self.sigma_quantum,
            Metric::FitFrequency => self.fit_frequency,
            Metric::OvertoneRatio => self.overtone_ratio,
            Metric::OvertoneDeviation => self.overtone_deviation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StackedEvent {
    pub name: String,
    pub mass: f64,
    pub spin: f64,
    pub metrics: EventMetrics,
}

/// Outcome of the `1/M²` correlation test.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct MassDependence {
    pub success: bool,
    pub correlation: Option<f64>,
    pub p_value: Option<f64>,
    pub significant: bool,
    pub message: String,
}

/// Append-only collection of per-event results for one batch run.
#[derive(Debug, Clone, Default)]
pub struct MultiEventStacker {
    events: Vec<StackedEvent>,
}

impl MultiEventStacker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_event(&mut self, name: impl Into<String>, mass: f64, spin: f64, metrics: EventMetrics) {
        self.events.push(StackedEvent {
            name: name.into(),
            mass,
            spin,
            metrics,
        });
    }

    pub fn events(&self) -> &[StackedEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Significance-weighted mean, weighted std and combined significance.
    ///
    /// Events without the metric are skipped. An event's weight is its
    /// significance (1 when absent); weights are normalised, falling back to
    /// uniform when they do not sum to a positive value. Combined significance
    /// is `sqrt(Σ w² σ²)` over the same events, with a missing σ counted as 0.
    /// No contributing events gives `(None, None, 0.0)`.
    pub fn compute_weighted_average(&self, metric: Metric) -> (Option<f64>, Option<f64>, f64) {
        let contributors: Vec<(f64, f64, f64)> = self
            .events
            .iter()
            .filter_map(|e| {
                let value = e.metrics.get(metric)?;
                let sig = e.metrics.significance;
                Some((value, sig.unwrap_or(1.0), sig.unwrap_or(0.0)))
            })
            .collect();
        if contributors.is_empty() {
            return (None, None, 0.0);
        }

        let total: f64 = contributors.iter().map(|c| c.1).sum();
        let uniform = 1.0 / contributors.len() as f64;
        let weights: Vec<f64> = if total > 0.0 && total.is_finite() {
            contributors.iter().map(|c| c.1 / total).collect()
        } else {
            vec![uniform; contributors.len()]
        };

        let mean: f64 = contributors.iter().zip(&weights).map(|(c, w)| w * c.0).sum();
        let var: f64 = contributors
            .iter()
            .zip(&weights)
            .map(|(c, w)| w * (c.0 - mean).powi(2))
            .sum();
        let combined = contributors
            .iter()
            .zip(&weights)
            .map(|(c, w)| w * w * c.2 * c.2)
            .sum::<f64>()
            .sqrt();

        (Some(mean), Some(var.sqrt()), combined)
    }

    /// Pearson correlation between `1/M²` and the metric (needs 3 events).
    pub fn test_mass_dependence(&self, metric: Metric) -> MassDependence {
        let (inv_m2, values): (Vec<f64>, Vec<f64>) = self
            .events
            .iter()
            .filter_map(|e| Some((1.0 / (e.mass * e.mass), e.metrics.get(metric)?)))
            .unzip();

        if values.len() < 3 {
            return MassDependence {
                message: "Need at least 3 events for correlation test".to_string(),
                ..MassDependence::default()
            };
        }
        let Some(r) = pearson(&inv_m2, &values) else {
            return MassDependence {
                message: "Correlation undefined (constant mass or metric)".to_string(),
                ..MassDependence::default()
            };
        };
        let p = pearson_p_value(r, values.len());
        MassDependence {
            success: true,
            correlation: Some(r),
            p_value: p,
            significant: p.is_some_and(|p| p < 0.05),
            message: format!("Correlation = {r:.3}, p = {:.3}", p.unwrap_or(f64::NAN)),
        }
    }

    pub fn generate_summary_report(&self) -> String {
        let heavy = "=".repeat(50);
        let light = "-".repeat(50);
        let mut out = String::from("Multi-Event Analysis Summary\n");
        out.push_str(&heavy);
        out.push_str("\n\n");
        out.push_str(&format!("Total events analyzed: {}\n\n", self.events.len()));

        out.push_str("Individual Event Results:\n");
        out.push_str(&light);
        out.push('\n');
        for event in &self.events {
            out.push_str(&format!("\n{}:\n", event.name));
            out.push_str(&format!("  Mass: {:.1} M☉\n", event.mass));
            out.push_str(&format!("  Spin: {:.3}\n", event.spin));
            for metric in Metric::ALL {
                if let Some(v) = event.metrics.get(metric) {
                    out.push_str(&format!("  {}: {v:.6}\n", metric.key()));
                }
            }
            if let Some(detected) = event.metrics.detected {
                out.push_str(&format!("  detected: {detected}\n"));
            }
        }

        out.push('\n');
        out.push_str(&heavy);
        out.push('\n');
        out.push_str("Combined Statistics:\n");
        out.push_str(&light);
        out.push('\n');

        if let (Some(mean), Some(std), sig) = self.compute_weighted_average(Metric::MaxDeviation) {
            out.push_str(&format!("\nWeighted mean deviation: {mean:.6} ± {std:.6}\n"));
            out.push_str(&format!("Combined significance: {sig:.2} σ\n"));
        }
        let mass_test = self.test_mass_dependence(Metric::MaxDeviation);
        if mass_test.success {
            out.push_str(&format!("\n{}\n", mass_test.message));
        }

        out.push('\n');
        out.push_str(&heavy);
        out.push('\n');
        out
    }
}
