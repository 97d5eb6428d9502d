//! Branch-length proposals drawn from the relaxed-clock model.

use rand::rngs::StdRng;

use crate::input::{RateParams, Reconciliation};
use crate::models::prior::{BirthDeathRates, BirthDeathWaitTime, MidpointSampler, ReconParams};
use crate::tree::{SpeciesTree, Tree};
use crate::utils::sample_gamma;

use super::types::SamplerError;

/// Proposes a full set of gene branch lengths at a given gene rate.
pub trait BranchLengthSampler {
    fn sample(&mut self, tree: &mut Tree, gene_rate: f64, rng: &mut StdRng);

    /// Reject trees this sampler cannot fill.
    ///
    /// # Errors
    ///
    /// Returns `SamplerError` when `tree` does not fit the sampler.
    fn check_tree(&self, _tree: &Tree) -> Result<(), SamplerError> {
        Ok(())
    }
}

/// Draws duplication midpoints, then each branch length as the sum of
/// `Gamma(alpha_s, scale = gene_rate * t / beta_s)` over the species
/// segments it spans.
///
/// Branches without a usable segment keep their current length, floored at
/// `min_length`.
#[derive(Debug, Clone)]
pub struct RelaxedClockBranchLengths<'a> {
    topology: Tree,
    species: &'a SpeciesTree,
    reconciliation: &'a Reconciliation,
    params: &'a RateParams,
    rates: BirthDeathRates,
    min_length: f64,
}

impl<'a> RelaxedClockBranchLengths<'a> {
    /// Generator for gene trees shaped like `tree`.
    #[must_use]
    pub fn new(
        tree: &Tree,
        species: &'a SpeciesTree,
        reconciliation: &'a Reconciliation,
        params: &'a RateParams,
        rates: BirthDeathRates,
        min_length: f64,
    ) -> Self {
        Self {
            topology: tree.clone(),
            species,
            reconciliation,
            params,
            rates,
            min_length,
        }
    }
}

impl BranchLengthSampler for RelaxedClockBranchLengths<'_> {
    /// Trees must match the topology this generator was built for in size.
    fn check_tree(&self, tree: &Tree) -> Result<(), SamplerError> {
        if tree.len() == self.topology.len() {
            Ok(())
        } else {
            Err(SamplerError::TreeSizeMismatch {
                expected: self.topology.len(),
                found: tree.len(),
            })
        }
    }

    fn sample(&mut self, tree: &mut Tree, gene_rate: f64, rng: &mut StdRng) {
        let topology = &self.topology;
        let mut recon = ReconParams::new(topology, self.species, self.reconciliation, gene_rate);
        let order = topology.preorder();
        recon.recon_branches(&order, topology, self.species, self.reconciliation);
        MidpointSampler::new(
            topology,
            self.species,
            self.reconciliation,
            self.rates,
            BirthDeathWaitTime,
        )
        .sample(&order, recon.midpoints_mut(), rng);

        for &node in &order {
            if topology.parent(node).is_none() {
                continue;
            }
            let mut length = 0.0;
            let mut drawn = false;
            for segment in recon.segments(node, topology, self.species) {
                let species = self.params.species(segment.species);
                let scale = gene_rate * segment.time / species.rate;
                if scale.is_finite() && scale > 0.0 {
                    length += sample_gamma(rng, species.shape, scale);
                    drawn = true;
                }
            }
            let length = if drawn { length } else { tree.dist(node) };
            let length = if length.is_nan() {
                self.min_length
            } else {
                length.max(self.min_length)
            };
            tree.set_dist(node, length);
        }
    }
}
