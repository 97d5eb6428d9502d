/////////////////////////////////////////////////////////////////////////////////////////////\
//
// Metropolis-Hastings sampler over the gene rate and branch lengths.
//
// Created on: 18 Oct 2026
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Metropolis-Hastings sampler over the gene rate and branch lengths.
//!
//! Each iteration proposes, with equal probability, either a gene-rate move
//! or a fresh set of branch lengths. A rate move draws the new rate uniformly
//! from `[max(g - step, min_rate), g + step]`, rescales every branch by the
//! rate ratio, and is scored by the sequence likelihood plus the branch prior
//! with a Hastings correction for the truncated window. A branch move draws
//! lengths from the relaxed-clock model at the current rate and is scored by
//! the sequence likelihood alone.

use log::{debug, trace};
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};

use crate::inference::{ProposalStats, should_accept};
use crate::input::{RateParams, Reconciliation, reconcile_by_species, validate_inputs};
use crate::models::prior::{BirthDeathRates, BranchPriorCalculator};
use crate::tree::{SpeciesTree, Tree};
use crate::utils::{sample_gamma, sample_uniform};

use super::branch_lengths::{BranchLengthSampler, RelaxedClockBranchLengths};
use super::diagnostics::summarize_gene_rates;
use super::seq_likelihood::{Alignment, HkyLikelihood, SeqLikelihood};
use super::types::{GeneRateSample, GeneRateSamplerConfig, GeneRateTrace, MoveKind, SamplerError};

/// How gene nodes are placed on the species tree.
#[derive(Debug, Clone, Copy)]
pub enum GeneMapping<'a> {
    /// Species of each gene leaf in ascending leaf order; internal nodes are
    /// reconciled by parsimony.
    Gene2Species(&'a [usize]),
    /// A reconciliation with event labels computed elsewhere.
    Reconciled(&'a Reconciliation),
}

/// Posterior sampler over the gene rate of one gene tree.
///
/// Generic over the sequence likelihood and the branch-length proposal so
/// either can be replaced.
#[derive(Debug)]
pub struct GeneRateSampler<'a, S, B> {
    species: &'a SpeciesTree,
    reconciliation: &'a Reconciliation,
    params: &'a RateParams,
    config: GeneRateSamplerConfig,
    seq_likelihood: S,
    branch_lengths: B,
}

impl<'a, S: SeqLikelihood, B: BranchLengthSampler> GeneRateSampler<'a, S, B> {
    /// # Errors
    ///
    /// Returns `SamplerError` if the configuration or rate parameters are
    /// invalid.
    pub fn new(
        species: &'a SpeciesTree,
        reconciliation: &'a Reconciliation,
        params: &'a RateParams,
        config: GeneRateSamplerConfig,
        seq_likelihood: S,
        branch_lengths: B,
    ) -> Result<Self, SamplerError> {
        config.validate()?;
        params.validate(species)?;
        Ok(Self {
            species,
            reconciliation,
            params,
            config,
            seq_likelihood,
            branch_lengths,
        })
    }

    /// Run the chain on `tree`, whose branch lengths are overwritten. On
    /// return the tree holds the lengths of the final state.
    ///
    /// `callback` sees the chain state after every iteration, including
    /// burn-in and thinned ones.
    ///
    /// # Errors
    ///
    /// Returns `SamplerError` if the branch-length sampler or the
    /// reconciliation does not fit `tree`.
    pub fn run<F>(&mut self, tree: &mut Tree, mut callback: F) -> Result<GeneRateTrace, SamplerError>
    where
        F: FnMut(&GeneRateSample<'_>),
    {
        self.branch_lengths.check_tree(tree)?;
        self.reconciliation.validate(tree, self.species)?;
        let config = self.config;
        let mut rng = StdRng::seed_from_u64(config.mcmc.seed);

        let mut gene_rate = self.params.gene_rate_prior().map_or(1.0, |prior| {
            sample_gamma(&mut rng, prior.shape, 1.0 / prior.rate)
        });
        if gene_rate.is_nan() || gene_rate < config.min_rate {
            gene_rate = config.min_rate;
        }
        self.branch_lengths.sample(tree, gene_rate, &mut rng);
        clamp_undefined_lengths(tree, config.min_branch_length);
        let mut saved = tree.dists().to_vec();

        let mut data_log_likelihood = f64::NEG_INFINITY;
        let mut prior_log_likelihood: Option<f64> = None;
        let mut rate_moves = ProposalStats::default();
        let mut branch_moves = ProposalStats::default();
        let mut rates = Vec::with_capacity(config.mcmc.retained_draws());
        let mut data_log_likelihoods = Vec::with_capacity(config.mcmc.retained_draws());

        for iteration in 0..config.mcmc.iterations {
            clamp_undefined_lengths(tree, config.min_branch_length);

            let (move_kind, accepted) = if rng.random::<f64>() < 0.5 {
                let current_prior = match prior_log_likelihood {
                    Some(value) => value,
                    None => self.branch_prior(tree, gene_rate, &mut rng)?,
                };
                prior_log_likelihood = Some(current_prior);

                let low = (gene_rate - config.rate_step).max(config.min_rate);
                let proposed = sample_uniform(&mut rng, low, gene_rate + config.rate_step);
                rescale_lengths(tree, proposed / gene_rate, config.min_branch_length);

                let next_data = self.seq_likelihood.log_likelihood(tree);
                let next_prior = self.branch_prior(tree, proposed, &mut rng)?;
                let hastings = (proposal_width(gene_rate, config.rate_step, config.min_rate)
                    / proposal_width(proposed, config.rate_step, config.min_rate))
                .ln();
                let log_acceptance =
                    next_data + next_prior - data_log_likelihood - current_prior + hastings;

                let accepted = should_accept(log_acceptance, &mut rng);
                if accepted {
                    gene_rate = proposed;
                    data_log_likelihood = next_data;
                    prior_log_likelihood = Some(next_prior);
                }
                rate_moves.record(accepted);
                (MoveKind::Rate, accepted)
            } else {
                self.branch_lengths.sample(tree, gene_rate, &mut rng);
                clamp_undefined_lengths(tree, config.min_branch_length);

                let next_data = self.seq_likelihood.log_likelihood(tree);
                let accepted = should_accept(next_data - data_log_likelihood, &mut rng);
                if accepted {
                    data_log_likelihood = next_data;
                    prior_log_likelihood = None;
                }
                branch_moves.record(accepted);
                (MoveKind::BranchLengths, accepted)
            };

            if accepted {
                saved.copy_from_slice(tree.dists());
            } else {
                tree.set_dists(&saved);
            }
            trace!(
                "iteration {iteration}: {move_kind:?} move {}, gene rate {gene_rate:.5}",
                if accepted { "accepted" } else { "rejected" }
            );

            if config.mcmc.retains(iteration) {
                rates.push(gene_rate);
                data_log_likelihoods.push(data_log_likelihood);
            }
            callback(&GeneRateSample {
                iteration,
                gene_rate,
                tree: &*tree,
                data_log_likelihood,
                prior_log_likelihood,
                move_kind,
                accepted,
            });
        }

        debug!(
            "gene rate chain finished: rate moves {:.3}, branch moves {:.3} accepted",
            rate_moves.acceptance_rate(),
            branch_moves.acceptance_rate()
        );
        let summary = summarize_gene_rates(&rates);
        Ok(GeneRateTrace {
            rates,
            data_log_likelihoods,
            rate_moves,
            branch_moves,
            summary,
        })
    }

    fn branch_prior(
        &self,
        tree: &Tree,
        gene_rate: f64,
        rng: &mut StdRng,
    ) -> Result<f64, SamplerError> {
        let calculator = BranchPriorCalculator::new(
            tree,
            self.species,
            self.reconciliation,
            self.params,
            self.config.prior,
        )?;
        Ok(calculator.conditional_log_likelihood(gene_rate, rng))
    }
}

/// Sample the posterior of the gene rate given aligned sequences under
/// HKY85.
///
/// Branch lengths of `tree` are overwritten by the chain; `callback` sees
/// every iteration.
///
/// # Errors
///
/// Returns `SamplerError` if the alignment, mapping, rate parameters, or
/// configuration are invalid.
pub fn sample_posterior_gene_rate<F>(
    tree: &mut Tree,
    alignment: &Alignment,
    species: &SpeciesTree,
    mapping: GeneMapping<'_>,
    params: &RateParams,
    config: GeneRateSamplerConfig,
    callback: F,
) -> Result<GeneRateTrace, SamplerError>
where
    F: FnMut(&GeneRateSample<'_>),
{
    let owned;
    let reconciliation = match mapping {
        GeneMapping::Gene2Species(gene2species) => {
            owned = reconcile_by_species(tree, species, gene2species)?;
            &owned
        }
        GeneMapping::Reconciled(reconciliation) => reconciliation,
    };
    validate_inputs(tree, species, reconciliation, params)?;

    let seq_likelihood = HkyLikelihood::new(alignment)?;
    seq_likelihood.check_tree(tree)?;
    let branch_lengths = RelaxedClockBranchLengths::new(
        tree,
        species,
        reconciliation,
        params,
        BirthDeathRates::new(config.prior.birth_rate, config.prior.death_rate),
        config.min_branch_length,
    );

    GeneRateSampler::new(
        species,
        reconciliation,
        params,
        config,
        seq_likelihood,
        branch_lengths,
    )?
    .run(tree, callback)
}

fn proposal_width(gene_rate: f64, step: f64, min_rate: f64) -> f64 {
    gene_rate + step - (gene_rate - step).max(min_rate)
}

fn clamp_undefined_lengths(tree: &mut Tree, min_length: f64) {
    for dist in tree.dists_mut() {
        if dist.is_nan() {
            *dist = min_length;
        }
    }
}

fn rescale_lengths(tree: &mut Tree, ratio: f64, min_length: f64) {
    for dist in tree.dists_mut() {
        let scaled = *dist * ratio;
        *dist = if scaled.is_nan() || (scaled <= 0.0 && *dist > 0.0) {
            min_length
        } else {
            scaled
        };
    }
}
