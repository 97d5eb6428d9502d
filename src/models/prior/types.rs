//! Configuration and error types for the relaxed-clock branch prior.

use thiserror::Error;

use crate::input::InputError;

/// Errors returned by branch-prior configuration, validation, and evaluation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BranchPriorError {
    #[error(transparent)]
    InvalidInput(#[from] InputError),
    #[error("Monte Carlo sample count must be positive")]
    InvalidSampleCount,
    #[error("birth ({birth}) and death ({death}) rates must be finite and non-negative")]
    InvalidBirthDeathRates { birth: f64, death: f64 },
    #[error("pre-duplication probability must lie in [0, 1]; found {0}")]
    InvalidPredupProbability(f64),
    #[error("gene rate must be finite; found {0}")]
    NonFiniteGeneRate(f64),
    #[error("invalid gene rate quadrature configuration")]
    InvalidQuadrature,
    #[error("integrating over the gene rate requires positive gene rate prior hyperparameters")]
    MissingGeneRatePrior,
}

/// Midpoint-rule grid over the gene rate, scaled by the prior mean.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateQuadrature {
    /// Number of grid cells.
    pub points: usize,
    /// Lower bound as a multiple of the prior mean.
    pub lower_factor: f64,
    /// Upper bound as a multiple of the prior mean.
    pub upper_factor: f64,
}

impl Default for RateQuadrature {
    fn default() -> Self {
        Self {
            points: 20,
            lower_factor: 0.05,
            upper_factor: 3.0,
        }
    }
}

impl RateQuadrature {
    #[must_use]
    pub fn is_valid(self) -> bool {
        self.points > 0
            && self.lower_factor.is_finite()
            && self.upper_factor.is_finite()
            && self.lower_factor > 0.0
            && self.lower_factor < self.upper_factor
    }

    /// Cell midpoints and the cell width for a prior mean.
    #[must_use]
    pub fn grid(self, prior_mean: f64) -> (Vec<f64>, f64) {
        let start = prior_mean * self.lower_factor;
        let end = prior_mean * self.upper_factor;
        let step = (end - start) / crate::utils::usize_to_f64(self.points);
        let midpoints = (0..self.points)
            .map(|cell| step.mul_add(crate::utils::usize_to_f64(cell) + 0.5, start))
            .collect();
        (midpoints, step)
    }
}

/// Options for evaluating the branch prior.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BranchPriorConfig {
    /// Monte Carlo samples per duplication subtree.
    pub n_samples: usize,
    /// Moment-matched single gamma instead of the exact gamma-sum density.
    pub approx: bool,
    /// Birth (duplication) rate of the midpoint waiting-time process.
    pub birth_rate: f64,
    /// Death (loss) rate of the midpoint waiting-time process.
    pub death_rate: f64,
    /// Probability of a duplication above the species root. Accepted for
    /// interface parity with the topology prior; it does not enter the
    /// branch-length likelihood.
    pub predup_prob: f64,
    /// RNG seed for midpoint sampling.
    pub seed: u64,
    /// Grid used when integrating over an unknown gene rate.
    pub quadrature: RateQuadrature,
}

impl Default for BranchPriorConfig {
    fn default() -> Self {
        Self {
            n_samples: 1_000,
            approx: true,
            birth_rate: 1.0e-4,
            death_rate: 2.0e-4,
            predup_prob: 0.01,
            seed: 42,
            quadrature: RateQuadrature::default(),
        }
    }
}

impl BranchPriorConfig {
    /// # Errors
    ///
    /// Returns `BranchPriorError` if options are invalid.
    pub fn validate(self) -> Result<(), BranchPriorError> {
        if self.n_samples == 0 {
            return Err(BranchPriorError::InvalidSampleCount);
        }
        let valid_rate = |rate: f64| rate.is_finite() && rate >= 0.0;
        if !(valid_rate(self.birth_rate) && valid_rate(self.death_rate)) {
            return Err(BranchPriorError::InvalidBirthDeathRates {
                birth: self.birth_rate,
                death: self.death_rate,
            });
        }
        if !(0.0..=1.0).contains(&self.predup_prob) {
            return Err(BranchPriorError::InvalidPredupProbability(self.predup_prob));
        }
        if !self.quadrature.is_valid() {
            return Err(BranchPriorError::InvalidQuadrature);
        }
        Ok(())
    }
}
