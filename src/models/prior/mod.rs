//! Relaxed-clock branch-length prior.
//!
//! Every species branch carries a gamma distribution over relative rates and
//! each gene tree a gamma-distributed rate multiplier. A gene branch's length
//! is the sum of independent gamma contributions along the species segments
//! it spans; duplication positions inside those segments are integrated out
//! by Monte Carlo, and the gene rate is either fixed or integrated over a
//! grid.

pub mod calculator;
pub mod density;
pub mod estimate;
pub mod midpoints;
pub mod recon;
pub mod types;

pub use calculator::{
    BranchPriorCalculator, RateMarginal, Subtree, branch_prior, duplication_subtree,
    speciation_subtree_roots,
};
pub use density::{
    branch_log_probability, gamma_log_density, gamma_sum_log_density, gamma_sum_log_density_numeric,
    segment_gammas,
};
pub use estimate::{
    RatePath, estimate_gene_rate, max_cubic_root, max_posterior_gene_rate, mle_gene_rate,
    rate_paths,
};
pub use midpoints::{BirthDeathRates, BirthDeathWaitTime, MidpointSampler, WaitTimeSampler};
pub use recon::{
    BranchRecon, Fraction, FreeBranches, ReconParams, Segment, Unfold, determine_free_branches,
    recon_branch,
};
pub use types::{BranchPriorConfig, BranchPriorError, RateQuadrature};
