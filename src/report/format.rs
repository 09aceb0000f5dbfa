//! Formatted terminal and text-file output.
//!
//! We keep formatting code in one place so:
//! - the analysis code stays free of presentation
//! - output changes are localized (important for the golden tests below)

use crate::analysis::{MultiEventStacker, ResonanceSummary};
use crate::app::pipeline::{BatchOutput, EventAnalysis};
use crate::models::{QnmModel, kerr_factor};
use crate::report::Interpretation;

/// The `qnm` command output.
pub fn format_qnm(qnm: &QnmModel) -> String {
    let mut out = String::new();
    out.push_str(&format!("QNM prediction for M={:.1} M☉, a={:.3}\n", qnm.mass(), qnm.spin()));
    out.push_str(&format!("  f220 = {:.2} Hz\n", qnm.f_220()));
    out.push_str(&format!("  τ220 = {:.3} ms\n", qnm.tau_220() * 1000.0));
    out.push_str(&format!("  Q220 = {:.3}\n", qnm.quality_factor()));
    out.push_str(&format!("  f221 = {:.2} Hz\n", qnm.f_221()));
    out.push_str(&format!("  τ221 = {:.3} ms\n", qnm.tau_221() * 1000.0));
    out.push_str(&format!("  f_Schwarzschild = {:.2} Hz\n", qnm.f_schwarzschild()));
    out.push_str(&format!("  Kerr factor = {:.4}\n", kerr_factor(qnm.spin())));
    out
}

/// Per-event block printed after each analysis.
pub fn format_event_summary(a: &EventAnalysis) -> String {
    let mut out = String::new();
    let e = &a.event;
    out.push_str(&format!("\n=== {} ===\n", e.name));
    out.push_str(&format!(
        "M={:.1} M☉ | a={:.3} | f220={:.1} Hz | τ220={:.2} ms | priority {:.0}\n",
        e.final_mass,
        e.final_spin,
        a.f220_gr,
        a.tau220_gr * 1000.0,
        a.priority.score
    ));
    for reason in &a.priority.reasons {
        out.push_str(&format!("  - {reason}\n"));
    }

    out.push_str("\nFrequency-jump test:\n");
    if a.jump.measured {
        out.push_str(&format!(
            "  max deviation {:+.2}% at {:.1} ms, {:.1}σ -> {}\n",
            a.jump.max_deviation * 100.0,
            a.jump.time_of_max * 1000.0,
            a.jump.significance,
            a.jump.message
        ));
    } else {
        out.push_str(&format!("  {}\n", a.jump.message));
    }

    out.push_str("\nOvertone test:\n");
    if a.prony.is_empty() {
        out.push_str("  no spectral modes found\n");
    }
    for (i, mode) in a.prony.iter().enumerate() {
        out.push_str(&format!("  mode {i}: {:.1} Hz (|X|={:.3e})\n", mode.frequency, mode.amplitude));
    }
    out.push_str(&format!("  {}\n", a.overtone.message));

    out.push_str("\nSpin-corrected fit:\n");
    let p = &a.spin.prediction;
    out.push_str(&format!(
        "  a_eff={:.3} (θ={:.0}°), Kerr factor {:.4}, f_Kerr={:.1} Hz\n",
        p.a_effective,
        p.inclination.to_degrees(),
        p.kerr_factor,
        p.f_kerr
    ));
    match &a.spin.measurement {
        Some(m) => {
            out.push_str(&format!(
                "  f_obs={:.1} ± {:.1} Hz, τ={:.2} ms\n",
                m.f_obs,
                m.f_error,
                m.damping_time * 1000.0
            ));
            out.push_str(&format!(
                "  δf vs Schwarzschild {:+.2}% ({:.1}σ), residual vs Kerr {:+.2}% ± {:.2}% ({:.1}σ)\n",
                m.delta_raw, m.sigma_raw, m.quantum_residual, m.quantum_error, m.sigma_quantum
            ));
            if let Some(h) = &m.hypotheses {
                out.push_str(&format!(
                    "  GR {:.1}σ vs Quantum {:.1}σ -> prefers {}\n",
                    h.sigma_gr, h.sigma_quantum, h.preferred
                ));
            }
        }
        None => out.push_str(&format!("  fit failed: {}\n", a.spin.fit.message)),
    }
    if let Some(fit) = a.multimode.fundamental() {
        let freqs: Vec<String> = a
            .multimode
            .modes
            .iter()
            .map(|m| format!("{:.1}", m.frequency.value))
            .collect();
        out.push_str(&format!(
            "  {}-mode fit: f = [{}] Hz (fundamental τ={:.2} ms)\n",
            a.multimode.modes.len(),
            freqs.join(", "),
            fit.damping_time.value * 1000.0
        ));
    }
    out
}

/// One-paragraph batch summary for the terminal.
pub fn format_batch_summary(batch: &BatchOutput, requested: usize) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "\nBatch analysis complete: {}/{} successful\n",
        batch.analyses.len(),
        requested
    ));
    if !batch.filtered.is_empty() {
        out.push_str(&format!("Below priority threshold: {}\n", batch.filtered.join(", ")));
    }
    for skipped in &batch.skipped {
        out.push_str(&format!("Skipped {}: {}\n", skipped.name, skipped.reason));
    }
    out
}

/// Full contents of `analysis_report.txt`.
pub fn format_analysis_report(
    stacker: &MultiEventStacker,
    interpretation: Option<&Interpretation>,
    resonance: Option<&ResonanceSummary>,
) -> String {
    let heavy = "=".repeat(70);
    let mut out = stacker.generate_summary_report();

    if let Some(resonance) = resonance.filter(|r| r.n_events > 0) {
        out.push('\n');
        out.push_str(&resonance.render());
    }

    out.push_str(&format!("\n{heavy}\nTHEORETICAL INTERPRETATION\n{heavy}\n\n"));
    out.push_str("Expected quantum gravity effects:\n");
    out.push_str(&"-".repeat(50));
    out.push('\n');
    out.push_str("1. Planck-scale cutoff (Gravitational Lattice Stretching):\n");
    out.push_str("   - Frequency shift: δf/f ~ ξ(l_P/r_s)²\n");
    out.push_str("   - For solar-mass BH: (l_P/r_s)² ~ 10⁻⁸⁰\n");
    out.push_str("   - Detection requires ξ >> 10⁷⁰ (implausible)\n\n");
    out.push_str("2. Loop Quantum Gravity corrections:\n");
    out.push_str("   - Area quantization: A_min ~ γl_P²\n");
    out.push_str("   - Primarily affects Planck-mass BHs\n");
    out.push_str("   - For solar-mass: effect ~ 10⁻⁷⁶ (undetectable)\n\n");
    out.push_str("3. Quantum horizon effects (echoes):\n");
    out.push_str("   - Post-ringdown reflections\n");
    out.push_str("   - Time delay ~ r_s/c ~ 0.1-1 ms\n");
    out.push_str("   - Amplitude ~ 10⁻³ of main signal\n\n");

    out.push_str(&format!("{heavy}\nSTATISTICAL INTERPRETATION\n{heavy}\n\n"));
    let Some(interp) = interpretation else {
        out.push_str("No frequency deviations were measured.\n");
        return out;
    };
    out.push_str(&format!("Combined significance: {:.2}σ\n", interp.combined_sigma));
    out.push_str(&format!("Interpretation: {}\n", interp.verdict.label()));
    out.push_str(&format!("Confidence: {}\n\n", interp.verdict.confidence()));

    if interp.unrealistic {
        out.push_str("WARNING: Deviation > 50% is unrealistic for quantum gravity\n");
        out.push_str("   This strongly suggests systematic error, not real physics.\n\n");
    }
    if let Some(xi) = interp.xi {
        out.push_str("If real, implied quantum parameter:\n");
        out.push_str(&format!("  ξ ~ {xi:.2e}\n"));
        out.push_str("  (compared to theoretical expectation ~ 1)\n\n");
    }
    if interp.null_result {
        out.push_str("WARNING: Unrealistically large ξ or deviation suggests:\n");
        out.push_str("   - Systematic error in analysis (most likely)\n");
        out.push_str("   - Analysis method not suitable for this data\n");
        out.push_str("   - Need to tune preprocessing parameters\n\n");
        out.push_str("RECOMMENDATION: Treat as NULL RESULT.\n\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::EventMetrics;
    use crate::report::interpret;

    #[test]
    fn qnm_block_golden() {
        let qnm = QnmModel::new(62.0, 0.68).unwrap();
        let txt = format_qnm(&qnm);
        assert!(txt.starts_with("QNM prediction for M=62.0 M☉, a=0.680\n"));
        assert!(txt.contains("  f220 = 274.4"), "{txt}");
        assert!(txt.contains("  τ220 = 1.85") || txt.contains("  τ220 = 1.86"), "{txt}");
        assert!(txt.contains("  Kerr factor = "));
    }

    #[test]
    fn report_recommends_null_result_for_large_deviation() {
        let mut stacker = MultiEventStacker::new();
        for (name, mass) in [("A", 62.0), ("B", 36.0), ("C", 20.8)] {
            stacker.add_event(
                name,
                mass,
                0.7,
                EventMetrics {
                    max_deviation: Some(0.6),
                    significance: Some(1.0),
                    ..EventMetrics::default()
                },
            );
        }
        let interp = interpret(&stacker);
        let txt = format_analysis_report(&stacker, interp.as_ref(), None);
        assert!(txt.contains("Total events analyzed: 3"));
        assert!(txt.contains("THEORETICAL INTERPRETATION"));
        assert!(txt.contains("Interpretation: NO EVIDENCE for quantum effects"));
        assert!(txt.contains("WARNING: Deviation > 50%"));
        assert!(txt.contains("RECOMMENDATION: Treat as NULL RESULT."));
    }

    #[test]
    fn report_without_measurements_says_so() {
        let stacker = MultiEventStacker::new();
        let txt = format_analysis_report(&stacker, None, None);
        assert!(txt.ends_with("No frequency deviations were measured.\n"));
    }
}
