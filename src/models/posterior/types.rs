//! Core public types for gene-rate posterior sampling.

use thiserror::Error;

use crate::inference::{InferenceError, McmcConfig, ProposalStats};
use crate::input::InputError;
use crate::models::prior::{BranchPriorConfig, BranchPriorError};
use crate::tree::Tree;

use super::diagnostics::GeneRateSummary;

/// Errors returned by sampler configuration, validation, and sampling.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SamplerError {
    #[error(transparent)]
    InvalidInput(#[from] InputError),
    #[error(transparent)]
    BranchPrior(#[from] BranchPriorError),
    #[error(transparent)]
    InvalidSchedule(#[from] InferenceError),
    #[error("sequence count ({sequences}) must match gene tree leaves ({leaves})")]
    SequenceCount { leaves: usize, sequences: usize },
    #[error("sequence {index} has length {found}; expected {expected}")]
    RaggedAlignment {
        index: usize,
        expected: usize,
        found: usize,
    },
    #[error("background frequencies must be positive and finite")]
    InvalidBackgroundFrequencies,
    #[error("transition/transversion ratio must be positive and finite; found {0}")]
    InvalidTsTvRatio(f64),
    #[error("invalid gene-rate proposal tuning configuration")]
    InvalidProposalTuning,
    #[error("branch-length generator covers {expected} nodes; gene tree has {found}")]
    TreeSizeMismatch { expected: usize, found: usize },
}

/// Options for [`super::sample_posterior_gene_rate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneRateSamplerConfig {
    pub mcmc: McmcConfig,
    /// Half-width of the uniform gene-rate proposal window.
    pub rate_step: f64,
    /// Lower bound of the gene-rate proposal window.
    pub min_rate: f64,
    /// Replacement for undefined or collapsed branch lengths.
    pub min_branch_length: f64,
    /// Branch-prior options used for rate moves. Midpoints follow a
    /// unit-rate birth-death process.
    pub prior: BranchPriorConfig,
}

impl Default for GeneRateSamplerConfig {
    fn default() -> Self {
        Self {
            mcmc: McmcConfig::default(),
            rate_step: 0.2,
            min_rate: 1.0e-4,
            min_branch_length: 1.0e-4,
            prior: BranchPriorConfig {
                birth_rate: 1.0,
                death_rate: 1.0,
                predup_prob: 1.0,
                ..BranchPriorConfig::default()
            },
        }
    }
}

impl GeneRateSamplerConfig {
    /// # Errors
    ///
    /// Returns `SamplerError` if the schedule, tuning, or prior options are
    /// invalid.
    pub fn validate(self) -> Result<(), SamplerError> {
        self.mcmc.validate()?;
        let positive = |value: f64| value.is_finite() && value > 0.0;
        if !(positive(self.rate_step) && positive(self.min_rate) && positive(self.min_branch_length))
        {
            return Err(SamplerError::InvalidProposalTuning);
        }
        self.prior.validate()?;
        Ok(())
    }
}

/// Which block a Metropolis-Hastings iteration proposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveKind {
    /// Uniform-window move on the gene rate with branch lengths rescaled.
    Rate,
    /// Fresh branch lengths drawn from the relaxed-clock model.
    BranchLengths,
}

/// Chain state handed to the per-iteration callback.
#[derive(Debug, Clone, Copy)]
pub struct GeneRateSample<'a> {
    pub iteration: usize,
    pub gene_rate: f64,
    /// Gene tree carrying the current branch lengths.
    pub tree: &'a Tree,
    pub data_log_likelihood: f64,
    /// Branch prior at `gene_rate`, if it is currently known.
    pub prior_log_likelihood: Option<f64>,
    pub move_kind: MoveKind,
    pub accepted: bool,
}

/// Retained draws and move statistics of one chain.
#[derive(Debug, Clone)]
pub struct GeneRateTrace {
    pub rates: Vec<f64>,
    pub data_log_likelihoods: Vec<f64>,
    pub rate_moves: ProposalStats,
    pub branch_moves: ProposalStats,
    pub summary: GeneRateSummary,
}

impl GeneRateTrace {
    #[must_use]
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}
