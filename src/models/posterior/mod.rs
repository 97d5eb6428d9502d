//! Posterior sampling of the gene rate.
//!
//! Combines an HKY85 sequence likelihood with the relaxed-clock branch prior
//! in a two-block Metropolis-Hastings chain over the gene rate and the gene
//! tree's branch lengths.

pub mod branch_lengths;
pub mod diagnostics;
pub mod sampler;
pub mod seq_likelihood;
pub mod types;

pub use branch_lengths::{BranchLengthSampler, RelaxedClockBranchLengths};
pub use diagnostics::{
    GeneRateSummary, autocorrelation, effective_sample_size, render_trace_summary,
    summarize_gene_rates,
};
pub use sampler::{GeneMapping, GeneRateSampler, sample_posterior_gene_rate};
pub use seq_likelihood::{Alignment, Hky85, HkyLikelihood, SeqLikelihood};
pub use types::{GeneRateSample, GeneRateSamplerConfig, GeneRateTrace, MoveKind, SamplerError};
