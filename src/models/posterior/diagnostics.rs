//! Chain diagnostics and reporting for the gene-rate sampler.

use comfy_table::{Cell, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use num_traits::ToPrimitive;

use crate::utils::usize_to_f64;

use super::types::GeneRateTrace;

/// Posterior summary of the retained gene-rate draws.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GeneRateSummary {
    pub draws: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub q025: f64,
    pub q50: f64,
    pub q975: f64,
    pub effective_sample_size: f64,
    pub lag1_autocorrelation: f64,
}

/// Lag-`k` autocorrelation for a scalar chain.
#[must_use]
pub fn autocorrelation(series: &[f64], lag: usize) -> f64 {
    if series.is_empty() || lag >= series.len() {
        return 0.0;
    }

    let mean = series.iter().sum::<f64>() / usize_to_f64(series.len());
    let denominator: f64 = series
        .iter()
        .map(|value| {
            let centered = value - mean;
            centered * centered
        })
        .sum();
    if denominator <= 0.0 {
        return 0.0;
    }

    let numerator: f64 = series
        .iter()
        .zip(&series[lag..])
        .map(|(early, late)| (early - mean) * (late - mean))
        .sum();
    numerator / denominator
}

/// Heuristic effective sample size using positive autocorrelation truncation.
#[must_use]
pub fn effective_sample_size(series: &[f64]) -> f64 {
    let draws = usize_to_f64(series.len());
    if series.len() < 2 {
        return draws;
    }
    // initial positive sequence of the autocorrelation
    let positive: f64 = (1..series.len())
        .map(|lag| autocorrelation(series, lag))
        .take_while(|&rho| rho > 0.0)
        .sum();
    draws / 2.0f64.mul_add(positive, 1.0).max(1.0)
}

/// Mean, spread, quantiles, and mixing diagnostics of a gene-rate chain.
#[must_use]
pub fn summarize_gene_rates(rates: &[f64]) -> GeneRateSummary {
    if rates.is_empty() {
        return GeneRateSummary::default();
    }

    let n = usize_to_f64(rates.len());
    let mean = rates.iter().sum::<f64>() / n;
    let variance = rates
        .iter()
        .map(|value| {
            let centered = value - mean;
            centered * centered
        })
        .sum::<f64>()
        / n;

    let mut sorted = rates.to_vec();
    sorted.sort_by(f64::total_cmp);

    GeneRateSummary {
        draws: rates.len(),
        mean,
        std_dev: variance.sqrt(),
        q025: percentile(&sorted, 0.025),
        q50: percentile(&sorted, 0.5),
        q975: percentile(&sorted, 0.975),
        effective_sample_size: effective_sample_size(rates),
        lag1_autocorrelation: autocorrelation(rates, 1),
    }
}

/// Render the trace summary and move acceptance rates as a table.
#[must_use]
pub fn render_trace_summary(trace: &GeneRateTrace) -> String {
    let summary = trace.summary;
    let mut table = make_table(&["Quantity", "Value"]);
    let rows = [
        ("draws", summary.draws.to_string()),
        ("mean gene rate", format!("{:.4}", summary.mean)),
        ("std. dev.", format!("{:.4}", summary.std_dev)),
        (
            "95% interval",
            format!("[{:.4}, {:.4}]", summary.q025, summary.q975),
        ),
        ("median", format!("{:.4}", summary.q50)),
        ("ESS", format!("{:.1}", summary.effective_sample_size)),
        ("lag-1 autocorrelation", format!("{:.3}", summary.lag1_autocorrelation)),
        (
            "rate move acceptance",
            format!(
                "{:.3} ({}/{})",
                trace.rate_moves.acceptance_rate(),
                trace.rate_moves.accepted,
                trace.rate_moves.proposed
            ),
        ),
        (
            "branch move acceptance",
            format!(
                "{:.3} ({}/{})",
                trace.branch_moves.acceptance_rate(),
                trace.branch_moves.accepted,
                trace.branch_moves.proposed
            ),
        ),
    ];
    for (label, value) in rows {
        table.add_row(vec![Cell::new(label), Cell::new(value)]);
    }
    table.to_string()
}

fn make_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(headers.iter().copied().map(Cell::new));
    table
}

/// Linear interpolation between the order statistics around `probability`.
fn percentile(sorted_values: &[f64], probability: f64) -> f64 {
    let Some(last) = sorted_values.len().checked_sub(1) else {
        return f64::NAN;
    };
    let position = probability.clamp(0.0, 1.0) * usize_to_f64(last);
    let below = position.floor().to_usize().unwrap_or(0).min(last);
    let above = (below + 1).min(last);
    let weight = position - usize_to_f64(below);
    (1.0 - weight).mul_add(sorted_values[below], weight * sorted_values[above])
}
