/////////////////////////////////////////////////////////////////////////////////////////////\
//
// Gamma and gamma-sum densities for branch lengths spanning species segments.
//
// Created on: 18 Oct 2026
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Gamma and gamma-sum log-densities, and the branch-length probability.

use statrs::distribution::{ContinuousCDF, Gamma};
use statrs::function::gamma::ln_gamma;

use crate::input::{GammaParams, RateParams};
use crate::utils::{log_add, usize_to_f64};

use super::recon::Segment;

/// Relative increment at which the gamma-sum series stops.
pub const GAMMA_SUM_TOLERANCE: f64 = 1.0e-3;

/// Hard cap on gamma-sum series terms.
pub const GAMMA_SUM_MAX_TERMS: usize = 1_000;

/// Grid cells on `[0, value]` for the numerical gamma-sum convolution.
pub const CONVOLUTION_CELLS: usize = 2_000;

/// Segments whose mean contribution falls below this share of the branch's
/// total mean are dropped.
pub const MIN_MEAN_FRACTION: f64 = 0.01;

/// Log-density of `Gamma(shape, rate)` at `value`.
///
/// Returns `-inf` outside the support or for non-positive parameters.
#[must_use]
pub fn gamma_log_density(value: f64, shape: f64, rate: f64) -> f64 {
    if !(shape > 0.0 && rate > 0.0 && value >= 0.0) || !shape.is_finite() || !rate.is_finite() {
        return f64::NEG_INFINITY;
    }
    if value == 0.0 {
        return match shape.partial_cmp(&1.0) {
            Some(std::cmp::Ordering::Less) => f64::INFINITY,
            Some(std::cmp::Ordering::Equal) => rate.ln(),
            _ => f64::NEG_INFINITY,
        };
    }
    shape.mul_add(rate.ln(), -ln_gamma(shape)) + (shape - 1.0).mul_add(value.ln(), -rate * value)
}

/// Log-density of a sum of independent gamma variables at `value`.
///
/// Uses the Moschopoulos series around the largest rate, adding terms until
/// the relative increment drops below `tolerance`. When the rates are spread
/// too widely for the series to settle within [`GAMMA_SUM_MAX_TERMS`], the
/// density is integrated numerically instead. Identical rates collapse to a
/// single gamma with the summed shape.
#[must_use]
pub fn gamma_sum_log_density(value: f64, terms: &[GammaParams], tolerance: f64) -> f64 {
    if terms.is_empty() || value.is_nan() || value < 0.0 {
        return f64::NEG_INFINITY;
    }
    if terms.len() == 1 {
        return gamma_log_density(value, terms[0].shape, terms[0].rate);
    }
    if terms
        .iter()
        .any(|term| !(term.shape > 0.0 && term.rate > 0.0 && term.rate.is_finite()))
    {
        return f64::NEG_INFINITY;
    }

    let total_shape: f64 = terms.iter().map(|term| term.shape).sum();
    let max_rate = terms.iter().map(|term| term.rate).fold(0.0, f64::max);
    let ratios: Vec<f64> = terms.iter().map(|term| term.rate / max_rate).collect();
    if ratios.iter().all(|&ratio| (1.0 - ratio).abs() < 1.0e-12) {
        return gamma_log_density(value, total_shape, max_rate);
    }
    if value == 0.0 {
        return gamma_log_density(value, total_shape, max_rate);
    }

    moschopoulos_log_density(value, terms, &ratios, total_shape, max_rate, tolerance)
        .unwrap_or_else(|| gamma_sum_log_density_numeric(value, terms, CONVOLUTION_CELLS))
}

/// Series evaluation; `None` when it has not converged by the term cap.
fn moschopoulos_log_density(
    value: f64,
    terms: &[GammaParams],
    ratios: &[f64],
    total_shape: f64,
    max_rate: f64,
    tolerance: f64,
) -> Option<f64> {
    let log_constant: f64 = terms
        .iter()
        .zip(ratios)
        .map(|(term, ratio)| term.shape * ratio.ln())
        .sum();
    let log_value = value.ln();
    let log_max_rate = max_rate.ln();
    let series_term = |k: usize, delta: f64| {
        let order = total_shape + usize_to_f64(k);
        delta.ln() + order.mul_add(log_max_rate, (order - 1.0) * log_value)
            - max_rate * value
            - ln_gamma(order)
    };

    // gamma_k = sum_i shape_i (1 - ratio_i)^k / k, delta_k by the usual recursion
    let mut gammas = vec![0.0];
    let mut deltas = vec![1.0];
    let mut log_sum = series_term(0, 1.0);
    let mut previous = log_sum;
    for k in 1..GAMMA_SUM_MAX_TERMS {
        let k_f64 = usize_to_f64(k);
        let gamma_k = terms
            .iter()
            .zip(ratios)
            .map(|(term, ratio)| term.shape * (1.0 - ratio).powf(k_f64))
            .sum::<f64>()
            / k_f64;
        gammas.push(gamma_k);
        let delta_k = (1..=k)
            .map(|i| usize_to_f64(i) * gammas[i] * deltas[k - i])
            .sum::<f64>()
            / k_f64;
        deltas.push(delta_k);

        let term = series_term(k, delta_k);
        log_sum = log_add(log_sum, term);
        if term < previous && term - log_sum < tolerance.ln() {
            return Some(log_constant + log_sum);
        }
        previous = term;
    }
    None
}

/// Log-density of a gamma sum at `value` by numerical convolution.
///
/// Every term but the narrowest is binned into `cells` equal cells on
/// `[0, value]` and the bins are convolved. The narrowest term is then
/// averaged exactly over each cell through its distribution function, so
/// shapes below one are handled without evaluating a singular density.
#[must_use]
pub fn gamma_sum_log_density_numeric(value: f64, terms: &[GammaParams], cells: usize) -> f64 {
    if cells == 0 || value.is_nan() || value <= 0.0 || !value.is_finite() {
        return f64::NEG_INFINITY;
    }
    if let [single] = terms {
        return gamma_log_density(value, single.shape, single.rate);
    }
    let mut dists = Vec::with_capacity(terms.len());
    for term in terms {
        match Gamma::new(term.shape, term.rate) {
            Ok(dist) => dists.push((term.variance(), dist)),
            Err(_) => return f64::NEG_INFINITY,
        }
    }
    dists.sort_by(|a, b| a.0.total_cmp(&b.0));
    let Some(((_, narrow), rest)) = dists.split_first() else {
        return f64::NEG_INFINITY;
    };

    let width = value / usize_to_f64(cells);
    let mut masses: Option<Vec<f64>> = None;
    for (_, dist) in rest {
        let binned: Vec<f64> = (0..cells)
            .map(|j| dist.cdf(usize_to_f64(j + 1) * width) - dist.cdf(usize_to_f64(j) * width))
            .collect();
        masses = Some(match masses {
            Some(current) => convolve_cells(&current, &binned),
            None => binned,
        });
    }
    let Some(masses) = masses else {
        return f64::NEG_INFINITY;
    };

    let density = masses
        .iter()
        .enumerate()
        .map(|(j, mass)| {
            let upper = value - usize_to_f64(j) * width;
            let lower = (value - usize_to_f64(j + 1) * width).max(0.0);
            mass * (narrow.cdf(upper) - narrow.cdf(lower))
        })
        .sum::<f64>()
        / width;
    density.max(0.0).ln()
}

/// Convolve two binned distributions, splitting each product evenly between
/// the two cells its sum can land in. Mass past the last cell is dropped.
fn convolve_cells(left: &[f64], right: &[f64]) -> Vec<f64> {
    let cells = left.len();
    let mut out = vec![0.0; cells];
    for (i, &a) in left.iter().enumerate() {
        if a <= 0.0 {
            continue;
        }
        for (k, &b) in right.iter().take(cells - i).enumerate() {
            let half = 0.5 * a * b;
            out[i + k] += half;
            if let Some(next) = out.get_mut(i + k + 1) {
                *next += half;
            }
        }
    }
    out
}

/// Gamma contributions of a branch's segments at a given gene rate, with
/// degenerate and negligible segments removed.
///
/// A segment of elapsed time `t` on species branch `s` contributes
/// `Gamma(alpha_s, beta_s / (gene_rate * t))`.
#[must_use]
pub fn segment_gammas(segments: &[Segment], params: &RateParams, gene_rate: f64) -> Vec<GammaParams> {
    let admissible: Vec<GammaParams> = segments
        .iter()
        .map(|segment| {
            let species = params.species(segment.species);
            GammaParams::new(species.shape, species.rate / (gene_rate * segment.time))
        })
        .filter(|gamma| gamma.rate.is_finite() && gamma.rate > 0.0)
        .collect();

    let total_mean: f64 = admissible.iter().map(|gamma| gamma.mean()).sum();
    admissible
        .into_iter()
        .filter(|gamma| gamma.mean() >= MIN_MEAN_FRACTION * total_mean)
        .collect()
}

/// Log-probability of an observed branch length given its segments.
///
/// With `approx`, the segment sum is moment-matched to one gamma; otherwise
/// the exact gamma-sum density is used. A branch with no admissible segment,
/// or an undefined density, has log-probability `-inf`.
#[must_use]
pub fn branch_log_probability(
    length: f64,
    segments: &[Segment],
    params: &RateParams,
    gene_rate: f64,
    approx: bool,
) -> f64 {
    let gammas = segment_gammas(segments, params, gene_rate);
    if gammas.is_empty() {
        return f64::NEG_INFINITY;
    }

    let log_prob = if approx {
        let mean: f64 = gammas.iter().map(|gamma| gamma.mean()).sum();
        let variance: f64 = gammas.iter().map(|gamma| gamma.variance()).sum();
        gamma_log_density(length, mean * mean / variance, mean / variance)
    } else {
        gamma_sum_log_density(length, &gammas, GAMMA_SUM_TOLERANCE)
    };

    if log_prob.is_nan() {
        f64::NEG_INFINITY
    } else {
        log_prob
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn gamma_density_matches_exponential() {
        let value = gamma_log_density(0.5, 1.0, 2.0);
        assert_relative_eq!(value, 2.0_f64.ln() - 1.0, epsilon = 1.0e-12);
    }

    #[test]
    fn gamma_density_is_zero_outside_support() {
        assert_eq!(gamma_log_density(-0.1, 2.0, 1.0), f64::NEG_INFINITY);
        assert_eq!(gamma_log_density(1.0, 0.0, 1.0), f64::NEG_INFINITY);
        assert_eq!(gamma_log_density(0.0, 2.0, 1.0), f64::NEG_INFINITY);
        assert_relative_eq!(gamma_log_density(0.0, 1.0, 3.0), 3.0_f64.ln());
    }

    #[test]
    fn gamma_sum_matches_hypoexponential() {
        let (a, b) = (1.0_f64, 3.0_f64);
        let terms = [GammaParams::new(1.0, a), GammaParams::new(1.0, b)];
        for x in [0.1, 0.7, 2.0] {
            let expected = (a * b / (b - a) * ((-a * x).exp() - (-b * x).exp())).ln();
            let value = gamma_sum_log_density(x, &terms, 1.0e-10);
            assert_relative_eq!(value, expected, epsilon = 1.0e-6);
        }
    }

    #[test]
    fn numeric_convolution_matches_hypoexponential() {
        let terms = [GammaParams::new(1.0, 1.0), GammaParams::new(1.0, 3.0)];
        for x in [0.1_f64, 0.7, 2.0] {
            let expected = (1.5 * ((-x).exp() - (-3.0 * x).exp())).ln();
            let value = gamma_sum_log_density_numeric(x, &terms, CONVOLUTION_CELLS);
            assert_relative_eq!(value, expected, epsilon = 1.0e-5);
        }
    }

    #[test]
    fn numeric_convolution_agrees_with_series_on_three_terms() {
        let terms = [
            GammaParams::new(2.0, 2.0),
            GammaParams::new(3.0, 5.0),
            GammaParams::new(1.5, 3.0),
        ];
        let series = gamma_sum_log_density(1.4, &terms, 1.0e-10);
        let numeric = gamma_sum_log_density_numeric(1.4, &terms, CONVOLUTION_CELLS);
        assert_relative_eq!(series, -0.781_65, epsilon = 1.0e-4);
        assert_relative_eq!(numeric, series, epsilon = 1.0e-4);
    }

    #[test]
    fn widely_spread_rates_fall_back_to_convolution() {
        // Exp(1) + Gamma(100, 1000): density is exp(-x) E[exp(Y)] up to a negligible tail
        let terms = [GammaParams::new(1.0, 1.0), GammaParams::new(100.0, 1000.0)];
        let expected = -1.1 - 100.0 * (1.0_f64 - 1.0e-3).ln();
        let value = gamma_sum_log_density(1.1, &terms, GAMMA_SUM_TOLERANCE);
        assert_relative_eq!(value, expected, epsilon = 1.0e-3);
    }

    #[test]
    fn exact_branch_probability_tracks_moment_match_for_spread_segments() {
        let params = RateParams::new(vec![2.0, 200.0], vec![2.0, 200.0], 0.0, 0.0);
        let segments = [
            Segment { species: 0, time: 1.0 },
            Segment { species: 1, time: 0.05 },
        ];
        let exact = branch_log_probability(1.0, &segments, &params, 1.0, false);
        let approx = branch_log_probability(1.0, &segments, &params, 1.0, true);
        assert_relative_eq!(exact, -0.565, epsilon = 2.0e-3);
        assert!((exact - approx).abs() < 0.01, "exact {exact} approx {approx}");
    }

    #[test]
    fn gamma_sum_with_equal_rates_collapses() {
        let terms = [GammaParams::new(1.5, 2.0), GammaParams::new(2.5, 2.0)];
        assert_relative_eq!(
            gamma_sum_log_density(1.3, &terms, GAMMA_SUM_TOLERANCE),
            gamma_log_density(1.3, 4.0, 2.0),
            epsilon = 1.0e-12
        );
    }

    #[test]
    fn negligible_segments_are_dropped() {
        let params = RateParams::uniform(3, 2.0, 2.0, 0.0, 0.0);
        let segments = [
            Segment { species: 0, time: 1.0 },
            Segment { species: 1, time: 1.0e-4 },
            Segment { species: 2, time: 0.0 },
        ];
        let gammas = segment_gammas(&segments, &params, 1.0);
        assert_eq!(gammas.len(), 1);
        assert_relative_eq!(gammas[0].mean(), 1.0);
    }

    #[test]
    fn branch_without_segments_has_zero_probability() {
        let params = RateParams::uniform(1, 2.0, 2.0, 0.0, 0.0);
        let logp = branch_log_probability(0.5, &[], &params, 1.0, true);
        assert_eq!(logp, f64::NEG_INFINITY);
        let zero_time = [Segment { species: 0, time: 0.0 }];
        assert_eq!(
            branch_log_probability(0.5, &zero_time, &params, 1.0, false),
            f64::NEG_INFINITY
        );
    }

    #[test]
    fn approx_matches_exact_for_single_segment() {
        let params = RateParams::uniform(1, 2.0, 2.0, 0.0, 0.0);
        let segments = [Segment { species: 0, time: 1.5 }];
        let approx = branch_log_probability(1.2, &segments, &params, 0.8, true);
        let exact = branch_log_probability(1.2, &segments, &params, 0.8, false);
        assert_relative_eq!(approx, exact, epsilon = 1.0e-12);
        // Gamma(2, 2 / 1.2) at 1.2
        assert_relative_eq!(approx, gamma_log_density(1.2, 2.0, 2.0 / 1.2), epsilon = 1.0e-12);
    }

    #[test]
    fn approx_is_close_to_exact_for_similar_segments() {
        let params = RateParams::new(vec![4.0, 3.0], vec![4.0, 3.5], 0.0, 0.0);
        let segments = [
            Segment { species: 0, time: 1.0 },
            Segment { species: 1, time: 0.8 },
        ];
        let approx = branch_log_probability(1.6, &segments, &params, 1.0, true);
        let exact = branch_log_probability(1.6, &segments, &params, 1.0, false);
        assert!((approx - exact).abs() < 0.05);
    }
}
