/////////////////////////////////////////////////////////////////////////////////////////////\
//
// Closed-form and posterior-mode estimates of the gene rate.
//
// Created on: 18 Oct 2026
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Point estimates of the gene rate.
//!
//! [`estimate_gene_rate`] solves the closed-form stationarity condition for
//! the gene rate given branch depths below each speciation; the posterior
//! mode [`max_posterior_gene_rate`] refines it against the full conditional
//! likelihood.

use log::warn;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::input::{Event, GammaParams, RateParams, Reconciliation, validate_inputs};
use crate::tree::{SpeciesTree, Tree};
use crate::utils::{Bisection, bisect_root};

use super::calculator::BranchPriorCalculator;
use super::types::{BranchPriorConfig, BranchPriorError};

/// Absolute tolerance of the cubic root search.
pub const CUBIC_ROOT_TOLERANCE: f64 = 1.0e-3;

/// Paths with smaller rate variance carry no usable information.
pub const MIN_PATH_VARIANCE: f64 = 1.0e-8;

/// Forward difference used to locate the posterior mode.
pub const MODE_DERIVATIVE_STEP: f64 = 0.05;

/// The posterior-mode window spans `[estimate / 1.5, estimate * 1.5]`.
pub const MODE_WINDOW_FACTOR: f64 = 1.5;

const MODE_BIRTH_RATE: f64 = 1.0e-4;
const MODE_DEATH_RATE: f64 = 2.0e-4;

/// Observed length below a speciation and the relative-rate moments of the
/// species path it spans.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatePath {
    pub length: f64,
    pub mean: f64,
    pub variance: f64,
}

/// Positive root of `x^3 + a x^2 + b x + c` for `c <= 0`.
///
/// Doubles `x` from `0.02` until the cubic turns non-negative, then bisects
/// the last doubling interval to [`CUBIC_ROOT_TOLERANCE`].
#[must_use]
pub fn max_cubic_root(a: f64, b: f64, c: f64) -> f64 {
    let cubic = |x: f64| x.mul_add(x.mul_add(x + a, b), c);

    let mut x = 0.01_f64;
    loop {
        x *= 2.0;
        let y = cubic(x);
        if y.is_nan() {
            return f64::NAN;
        }
        if y >= 0.0 || x.is_infinite() {
            break;
        }
    }

    let mut low = x / 2.0;
    let mut high = x;
    while high - low > CUBIC_ROOT_TOLERANCE {
        x = 0.5 * (low + high);
        let y = cubic(x);
        if y == 0.0 {
            return x;
        } else if y > 0.0 {
            high = x;
        } else {
            low = x;
        }
    }
    x
}

/// Maximum a posteriori gene rate from path observations.
///
/// Only paths longer than the `max(n / 2 + 1, 4)`-th smallest length are
/// used, which drops saturated or near-zero branches; with fewer paths no
/// threshold applies. Without a proper gene-rate prior the flat-prior
/// solution is returned.
#[must_use]
pub fn mle_gene_rate(paths: &[RatePath], prior: Option<GammaParams>) -> f64 {
    let mut sorted: Vec<f64> = paths.iter().map(|path| path.length).collect();
    sorted.sort_by(f64::total_cmp);
    let limit = (paths.len() / 2 + 1).max(4);
    let threshold = sorted.get(limit).copied().unwrap_or(f64::NEG_INFINITY);

    let (weighted_mean, weighted_square) = paths
        .iter()
        .filter(|path| path.length > threshold && path.variance > MIN_PATH_VARIANCE)
        .fold((0.0, 0.0), |(mean_sum, square_sum), path| {
            (
                mean_sum + path.mean * path.length / path.variance,
                square_sum + path.length * path.length / path.variance,
            )
        });

    match prior {
        Some(prior) => max_cubic_root(
            (1.0 - prior.shape) / prior.rate,
            weighted_mean / prior.rate,
            -weighted_square / prior.rate,
        ),
        None if weighted_mean > 0.0 => weighted_square / weighted_mean,
        None => 0.0,
    }
}

/// Path observations for every non-duplication branch that reaches below
/// the species node its subtree hangs from.
///
/// Lengths accumulate through duplications up to the closest speciation.
/// Branches under a duplication on the species root are unconstrained until
/// the next speciation and are skipped.
#[must_use]
pub fn rate_paths(
    tree: &Tree,
    species: &SpeciesTree,
    reconciliation: &Reconciliation,
    params: &RateParams,
) -> Vec<RatePath> {
    let sroot = species.root();
    let root = tree.root();
    let mut depths: Vec<Option<f64>> = vec![Some(0.0); tree.len()];
    let mut subtree_species = vec![reconciliation.species(root); tree.len()];
    let mut free = vec![false; tree.len()];
    free[root] = reconciliation.species(root) == sroot
        && reconciliation.event(root).is_duplication();

    for node in tree.preorder() {
        let Some(parent) = tree.parent(node) else {
            continue;
        };
        free[node] = free[parent] && reconciliation.event(node) != Event::Speciation;
        if free[node] {
            depths[node] = None;
            subtree_species[node] = subtree_species[parent];
        } else if reconciliation.event(parent).is_duplication() {
            depths[node] = Some(depths[parent].unwrap_or(0.0) + tree.dist(node));
            subtree_species[node] = subtree_species[parent];
        } else {
            depths[node] = Some(tree.dist(node));
            subtree_species[node] = reconciliation.species(parent);
        }
    }

    let mut paths = Vec::new();
    for node in 0..tree.len() {
        if node == root || reconciliation.event(node).is_duplication() {
            continue;
        }
        let Some(length) = depths[node] else {
            continue;
        };
        let top = subtree_species[node];
        let mut snode = reconciliation.species(node);
        if snode == top {
            continue;
        }

        let mut mean = 0.0;
        let mut variance = 0.0;
        while snode != top && snode != sroot {
            let gamma = params.species(snode);
            let time = species.time(snode);
            mean += time * gamma.mean();
            variance += time * time * gamma.variance();
            let Some(parent) = species.parent(snode) else {
                break;
            };
            snode = parent;
        }
        paths.push(RatePath {
            length,
            mean,
            variance,
        });
    }
    paths
}

/// Closed-form gene-rate estimate; `0` when no branch is informative.
///
/// # Errors
///
/// Returns `BranchPriorError` if the inputs are invalid.
pub fn estimate_gene_rate(
    tree: &Tree,
    species: &SpeciesTree,
    reconciliation: &Reconciliation,
    params: &RateParams,
) -> Result<f64, BranchPriorError> {
    validate_inputs(tree, species, reconciliation, params)?;
    let paths = rate_paths(tree, species, reconciliation, params);
    if paths.is_empty() {
        return Ok(0.0);
    }
    Ok(mle_gene_rate(&paths, params.gene_rate_prior()))
}

/// Posterior mode of the gene rate.
///
/// Bisects the forward difference of the conditional log-likelihood over a
/// window around [`estimate_gene_rate`]. When the window does not bracket a
/// sign change, the endpoint the slope points to is returned.
///
/// # Errors
///
/// Returns `BranchPriorError` if the inputs are invalid.
pub fn max_posterior_gene_rate(
    tree: &Tree,
    species: &SpeciesTree,
    reconciliation: &Reconciliation,
    params: &RateParams,
    seed: u64,
) -> Result<f64, BranchPriorError> {
    let estimate = estimate_gene_rate(tree, species, reconciliation, params)?;
    let center = if estimate.is_finite() && estimate > 0.0 {
        estimate
    } else {
        params.gene_rate_prior_mean()
    };

    let config = BranchPriorConfig {
        birth_rate: MODE_BIRTH_RATE,
        death_rate: MODE_DEATH_RATE,
        seed,
        ..BranchPriorConfig::default()
    };
    let calculator = BranchPriorCalculator::new(tree, species, reconciliation, params, config)?;
    let mut rng = StdRng::seed_from_u64(seed);

    let low = center / MODE_WINDOW_FACTOR;
    let high = center * MODE_WINDOW_FACTOR;
    let slope = |gene_rate: f64| {
        let ahead = calculator.conditional_log_likelihood(gene_rate + MODE_DERIVATIVE_STEP, &mut rng);
        ahead - calculator.conditional_log_likelihood(gene_rate, &mut rng)
    };

    match bisect_root(slope, low, high, (high - low) / 1_000.0) {
        Bisection::Root(mode) => Ok(mode),
        Bisection::NotBracketed {
            lower_value,
            upper_value,
        } => {
            warn!(
                "gene rate window [{low:.5}, {high:.5}] does not bracket the posterior mode \
                 (slopes {lower_value:.5}, {upper_value:.5})"
            );
            Ok(if lower_value > 0.0 && upper_value > 0.0 {
                high
            } else if lower_value < 0.0 && upper_value < 0.0 {
                low
            } else {
                center
            })
        }
    }
}
