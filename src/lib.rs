#![forbid(unsafe_code)]

//! # `relaxed_clock_models`
//!
//! Relaxed molecular-clock models for reconciled gene trees: the branch-length
//! prior of a gene tree given a dated species tree, closed-form and
//! posterior-mode estimates of the gene-specific rate, and an MCMC sampler of
//! the gene-rate posterior under an HKY85 sequence likelihood.
//!
//! Every species branch has a gamma distribution over relative substitution
//! rates; each gene family has a gamma-distributed rate multiplier. Gene
//! branches crossing several species branches are sums of gamma variables,
//! and the positions of duplications within a species branch are integrated
//! out by Monte Carlo.

pub mod inference;
pub mod input;
pub mod models;
pub mod tree;
pub mod utils;

pub use inference::{InferenceError, McmcConfig, ProposalStats};
pub use input::{
    Event, GammaParams, InputError, RateParams, Reconciliation, label_events, reconcile,
    reconcile_by_species,
};
pub use tree::{SpeciesTree, Tree, TreeError};

pub use models::prior::{
    BirthDeathRates, BirthDeathWaitTime, BranchPriorCalculator, BranchPriorConfig,
    BranchPriorError, BranchRecon, Fraction, FreeBranches, MidpointSampler, RateMarginal,
    RatePath, RateQuadrature, ReconParams, Segment, Subtree, Unfold, WaitTimeSampler,
    branch_log_probability, branch_prior, determine_free_branches, duplication_subtree,
    estimate_gene_rate, gamma_log_density, gamma_sum_log_density, gamma_sum_log_density_numeric,
    max_cubic_root, max_posterior_gene_rate, mle_gene_rate, rate_paths, recon_branch,
    segment_gammas, speciation_subtree_roots,
};

pub use models::posterior::{
    Alignment, BranchLengthSampler, GeneMapping, GeneRateSample, GeneRateSampler,
    GeneRateSamplerConfig, GeneRateSummary, GeneRateTrace, Hky85, HkyLikelihood, MoveKind,
    RelaxedClockBranchLengths, SamplerError, SeqLikelihood, autocorrelation,
    effective_sample_size, render_trace_summary, sample_posterior_gene_rate,
    summarize_gene_rates,
};
