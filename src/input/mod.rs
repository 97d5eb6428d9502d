//! # Model inputs
//!
//! Event labels, the gene-to-species reconciliation, and the relaxed-clock
//! rate parameters consumed by the branch prior and the gene-rate sampler,
//! together with their validation against a gene tree and species tree.
//!
//! # Examples
//!
//! ```
//! use relaxed_clock_models::{Reconciliation, SpeciesTree, Tree};
//!
//! let species = SpeciesTree::from_parent_indices(&[2, 2, -1], vec![1.0, 1.0, 0.0])
//!     .expect("species tree");
//! let tree = Tree::from_parent_indices(&[2, 2, -1], vec![0.5, 0.7, 0.0]).expect("gene tree");
//!
//! // leaves are genes (0), the root is a speciation (1)
//! let recon = Reconciliation::from_codes(&[0, 1, 2], &[0, 0, 1]).expect("codes");
//! assert!(recon.validate(&tree, &species).is_ok());
//! ```
//!
//! ```
//! use relaxed_clock_models::Reconciliation;
//!
//! // 7 is not an event code
//! assert!(Reconciliation::from_codes(&[0, 1, 2], &[0, 0, 7]).is_err());
//! ```

use thiserror::Error;

use crate::tree::{SpeciesTree, Tree, TreeError};

pub mod reconcile;

pub use reconcile::{label_events, reconcile, reconcile_by_species};

/// Errors returned when validating reconciled inputs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error("reconciliation length ({recon}) must match gene tree nodes ({nodes})")]
    ReconciliationLength { nodes: usize, recon: usize },
    #[error("event label length ({events}) must match gene tree nodes ({nodes})")]
    EventLength { nodes: usize, events: usize },
    #[error("node {node} has unknown event code {code}")]
    UnknownEvent { node: usize, code: i32 },
    #[error("node {node} reconciles to species {species}, outside 0..{len}")]
    SpeciesOutOfRange { node: usize, species: i64, len: usize },
    #[error("node {node} has negative species index {species}")]
    NegativeSpecies { node: usize, species: i32 },
    #[error("rate parameter count ({params}) must match species tree nodes ({species})")]
    RateParamLength { species: usize, params: usize },
    #[error("rate parameters for species branch {species} must be finite and non-negative")]
    InvalidRateParam { species: usize },
    #[error("gene rate prior hyperparameters must be finite")]
    NonFiniteGeneRatePrior,
    #[error("gene-to-species map length ({entries}) must match gene tree leaves ({leaves})")]
    Gene2SpeciesLength { leaves: usize, entries: usize },
}

/// Event label of a gene-tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// Extant gene (leaf).
    Gene,
    /// Speciation: children descend into distinct species lineages.
    Speciation,
    /// Duplication within a single species lineage.
    Duplication,
}

impl Event {
    /// Decode the integer wire encoding (`0` gene, `1` speciation, `2` duplication).
    #[must_use]
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Gene),
            1 => Some(Self::Speciation),
            2 => Some(Self::Duplication),
            _ => None,
        }
    }

    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Gene => 0,
            Self::Speciation => 1,
            Self::Duplication => 2,
        }
    }

    #[must_use]
    pub const fn is_duplication(self) -> bool {
        matches!(self, Self::Duplication)
    }
}

/// Reconciliation of a gene tree onto a species tree with event labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// Species node onto which each gene node reconciles.
    pub recon: Vec<usize>,
    /// Event label of each gene node.
    pub events: Vec<Event>,
}

impl Reconciliation {
    #[must_use]
    pub const fn new(recon: Vec<usize>, events: Vec<Event>) -> Self {
        Self { recon, events }
    }

    /// Decode integer reconciliation and event arrays.
    ///
    /// # Errors
    ///
    /// Returns `InputError::NegativeSpecies` for a negative species index and
    /// `InputError::UnknownEvent` for an unknown event code.
    pub fn from_codes(recon: &[i32], events: &[i32]) -> Result<Self, InputError> {
        let recon = recon
            .iter()
            .enumerate()
            .map(|(node, &species)| {
                usize::try_from(species).map_err(|_| InputError::NegativeSpecies { node, species })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let events = events
            .iter()
            .enumerate()
            .map(|(node, &code)| Event::from_code(code).ok_or(InputError::UnknownEvent { node, code }))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { recon, events })
    }

    #[must_use]
    pub fn species(&self, node: usize) -> usize {
        self.recon[node]
    }

    #[must_use]
    pub fn event(&self, node: usize) -> Event {
        self.events[node]
    }

    /// Check array sizes and species indices against the trees.
    ///
    /// # Errors
    ///
    /// Returns `InputError` if the reconciliation does not fit the trees.
    pub fn validate(&self, tree: &Tree, species: &SpeciesTree) -> Result<(), InputError> {
        if self.recon.len() != tree.len() {
            return Err(InputError::ReconciliationLength {
                nodes: tree.len(),
                recon: self.recon.len(),
            });
        }
        if self.events.len() != tree.len() {
            return Err(InputError::EventLength {
                nodes: tree.len(),
                events: self.events.len(),
            });
        }
        if let Some((node, &snode)) = self
            .recon
            .iter()
            .enumerate()
            .find(|&(_, &snode)| snode >= species.len())
        {
            return Err(InputError::SpeciesOutOfRange {
                node,
                species: i64::try_from(snode).unwrap_or(i64::MAX),
                len: species.len(),
            });
        }
        Ok(())
    }
}

/// Shape/rate pair of a gamma distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GammaParams {
    pub shape: f64,
    pub rate: f64,
}

impl GammaParams {
    #[must_use]
    pub const fn new(shape: f64, rate: f64) -> Self {
        Self { shape, rate }
    }

    #[must_use]
    pub fn mean(self) -> f64 {
        self.shape / self.rate
    }

    #[must_use]
    pub fn variance(self) -> f64 {
        self.shape / (self.rate * self.rate)
    }
}

/// Relaxed-clock rate parameters: one gamma rate distribution per species
/// branch plus the gamma prior on the gene-specific rate multiplier.
#[derive(Debug, Clone, PartialEq)]
pub struct RateParams {
    pub species_alpha: Vec<f64>,
    pub species_beta: Vec<f64>,
    pub gene_alpha: f64,
    pub gene_beta: f64,
}

impl RateParams {
    #[must_use]
    pub const fn new(
        species_alpha: Vec<f64>,
        species_beta: Vec<f64>,
        gene_alpha: f64,
        gene_beta: f64,
    ) -> Self {
        Self {
            species_alpha,
            species_beta,
            gene_alpha,
            gene_beta,
        }
    }

    /// Same `(alpha, beta)` on every species branch.
    #[must_use]
    pub fn uniform(
        species_nodes: usize,
        alpha: f64,
        beta: f64,
        gene_alpha: f64,
        gene_beta: f64,
    ) -> Self {
        Self::new(
            vec![alpha; species_nodes],
            vec![beta; species_nodes],
            gene_alpha,
            gene_beta,
        )
    }

    /// Rate distribution of species branch `snode`.
    #[must_use]
    pub fn species(&self, snode: usize) -> GammaParams {
        GammaParams::new(self.species_alpha[snode], self.species_beta[snode])
    }

    /// Gamma prior on the gene rate, if both hyperparameters are positive.
    #[must_use]
    pub fn gene_rate_prior(&self) -> Option<GammaParams> {
        (self.gene_alpha > 0.0 && self.gene_beta > 0.0)
            .then(|| GammaParams::new(self.gene_alpha, self.gene_beta))
    }

    /// Prior mean of the gene rate, falling back to `1` without a proper prior.
    #[must_use]
    pub fn gene_rate_prior_mean(&self) -> f64 {
        self.gene_rate_prior().map_or(1.0, GammaParams::mean)
    }

    /// # Errors
    ///
    /// Returns `InputError` if parameter counts or values are invalid.
    pub fn validate(&self, species: &SpeciesTree) -> Result<(), InputError> {
        let expected = species.len();
        for len in [self.species_alpha.len(), self.species_beta.len()] {
            if len != expected {
                return Err(InputError::RateParamLength {
                    species: expected,
                    params: len,
                });
            }
        }
        let invalid = |value: f64| !value.is_finite() || value < 0.0;
        if let Some(snode) = (0..expected)
            .find(|&snode| invalid(self.species_alpha[snode]) || invalid(self.species_beta[snode]))
        {
            return Err(InputError::InvalidRateParam { species: snode });
        }
        if !(self.gene_alpha.is_finite() && self.gene_beta.is_finite()) {
            return Err(InputError::NonFiniteGeneRatePrior);
        }
        Ok(())
    }
}

/// Validate every input of a branch-prior evaluation.
///
/// # Errors
///
/// Returns the first `InputError` found.
pub fn validate_inputs(
    tree: &Tree,
    species: &SpeciesTree,
    reconciliation: &Reconciliation,
    params: &RateParams,
) -> Result<(), InputError> {
    reconciliation.validate(tree, species)?;
    params.validate(species)
}
