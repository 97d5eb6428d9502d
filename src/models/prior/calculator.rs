/////////////////////////////////////////////////////////////////////////////////////////////\
//
// Relaxed-clock branch prior over duplication subtrees of a reconciled gene tree.
//
// Created on: 18 Oct 2026
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Branch-length prior of a reconciled gene tree.
//!
//! The gene tree is cut into duplication subtrees hanging below speciation
//! nodes. A subtree rooted at a speciation or leaf contributes one branch
//! probability; a subtree rooted at a duplication integrates its unknown
//! duplication midpoints by Monte Carlo.

use log::debug;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::input::{Event, RateParams, Reconciliation, validate_inputs};
use crate::tree::{SpeciesTree, Tree};
use crate::utils::{log_add, usize_to_f64};

use super::density::{branch_log_probability, gamma_log_density, segment_gammas};
use super::estimate::estimate_gene_rate;
use super::midpoints::{BirthDeathRates, BirthDeathWaitTime, MidpointSampler, WaitTimeSampler};
use super::recon::ReconParams;
use super::types::{BranchPriorConfig, BranchPriorError};

/// Nodes of one duplication subtree, parents before children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subtree {
    pub root: usize,
    pub nodes: Vec<usize>,
}

/// Outcome of integrating the conditional likelihood over the gene rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateMarginal {
    /// Log of the midpoint-rule integral.
    pub log_likelihood: f64,
    /// Width of each quadrature cell.
    pub step: f64,
    /// Grid rate with the largest conditional log-likelihood.
    pub argmax_rate: f64,
    /// Conditional log-likelihood at `argmax_rate`.
    pub max_conditional: f64,
}

/// Evaluates the branch prior of one reconciled gene tree.
#[derive(Debug, Clone)]
pub struct BranchPriorCalculator<'a, W = BirthDeathWaitTime> {
    tree: &'a Tree,
    species: &'a SpeciesTree,
    reconciliation: &'a Reconciliation,
    params: &'a RateParams,
    config: BranchPriorConfig,
    midpoints: MidpointSampler<'a, W>,
    subtrees: Vec<Subtree>,
}

impl<'a> BranchPriorCalculator<'a> {
    /// # Errors
    ///
    /// Returns `BranchPriorError` if the inputs or options are invalid.
    pub fn new(
        tree: &'a Tree,
        species: &'a SpeciesTree,
        reconciliation: &'a Reconciliation,
        params: &'a RateParams,
        config: BranchPriorConfig,
    ) -> Result<Self, BranchPriorError> {
        Self::with_wait_time(tree, species, reconciliation, params, config, BirthDeathWaitTime)
    }
}

impl<'a, W: WaitTimeSampler> BranchPriorCalculator<'a, W> {
    /// Calculator drawing duplication waiting times from `wait_time`.
    ///
    /// # Errors
    ///
    /// Returns `BranchPriorError` if the inputs or options are invalid.
    pub fn with_wait_time(
        tree: &'a Tree,
        species: &'a SpeciesTree,
        reconciliation: &'a Reconciliation,
        params: &'a RateParams,
        config: BranchPriorConfig,
        wait_time: W,
    ) -> Result<Self, BranchPriorError> {
        config.validate()?;
        validate_inputs(tree, species, reconciliation, params)?;

        let rates = BirthDeathRates::new(config.birth_rate, config.death_rate);
        let subtrees = speciation_subtree_roots(tree, reconciliation)
            .into_iter()
            .map(|root| Subtree {
                root,
                nodes: duplication_subtree(tree, reconciliation, root),
            })
            .collect();

        Ok(Self {
            tree,
            species,
            reconciliation,
            params,
            config,
            midpoints: MidpointSampler::new(tree, species, reconciliation, rates, wait_time),
            subtrees,
        })
    }

    #[must_use]
    pub fn subtrees(&self) -> &[Subtree] {
        &self.subtrees
    }

    #[must_use]
    pub const fn config(&self) -> BranchPriorConfig {
        self.config
    }

    /// Log-likelihood of the branch lengths at a fixed gene rate, including
    /// the gene-rate prior density when it is proper.
    pub fn conditional_log_likelihood(&self, gene_rate: f64, rng: &mut StdRng) -> f64 {
        let mut recon = ReconParams::new(self.tree, self.species, self.reconciliation, gene_rate);
        let mut log_likelihood = 0.0;
        for subtree in &self.subtrees {
            log_likelihood += self.subtree_log_probability(subtree, gene_rate, &mut recon, rng);
        }
        if let Some(prior) = self.params.gene_rate_prior() {
            log_likelihood += gamma_log_density(gene_rate, prior.shape, prior.rate);
        }
        log_likelihood
    }

    /// Integrate the conditional likelihood over the gene rate with the
    /// configured midpoint rule.
    ///
    /// # Errors
    ///
    /// Returns `BranchPriorError::MissingGeneRatePrior` without a proper
    /// gene-rate prior to scale the integration window.
    pub fn integrate_gene_rate(&self, rng: &mut StdRng) -> Result<RateMarginal, BranchPriorError> {
        let prior = self
            .params
            .gene_rate_prior()
            .ok_or(BranchPriorError::MissingGeneRatePrior)?;
        let (grid, step) = self.config.quadrature.grid(prior.mean());

        let mut log_total = f64::NEG_INFINITY;
        let mut argmax_rate = grid[0];
        let mut max_conditional = f64::NEG_INFINITY;
        for &gene_rate in &grid {
            let log_likelihood = self.conditional_log_likelihood(gene_rate, rng);
            debug!("gene rate {gene_rate:.5}: conditional log-likelihood {log_likelihood:.5}");
            log_total = log_add(log_total, log_likelihood);
            if log_likelihood > max_conditional {
                argmax_rate = gene_rate;
                max_conditional = log_likelihood;
            }
        }

        if log::log_enabled!(log::Level::Debug) {
            let estimate = estimate_gene_rate(
                self.tree,
                self.species,
                self.reconciliation,
                self.params,
            )?;
            if estimate > 0.0 {
                let at_estimate = self.conditional_log_likelihood(estimate, rng);
                debug!("estimated gene rate {estimate:.5}: conditional log-likelihood {at_estimate:.5}");
            }
            debug!("best grid rate {argmax_rate:.5}: conditional log-likelihood {max_conditional:.5}");
        }

        Ok(RateMarginal {
            log_likelihood: log_total + step.ln(),
            step,
            argmax_rate,
            max_conditional,
        })
    }

    /// Log-likelihood of the branch lengths with the gene rate integrated out.
    ///
    /// # Errors
    ///
    /// See [`Self::integrate_gene_rate`].
    pub fn marginal_log_likelihood(&self, rng: &mut StdRng) -> Result<f64, BranchPriorError> {
        self.integrate_gene_rate(rng).map(|marginal| marginal.log_likelihood)
    }

    fn subtree_log_probability(
        &self,
        subtree: &Subtree,
        gene_rate: f64,
        recon: &mut ReconParams,
        rng: &mut StdRng,
    ) -> f64 {
        recon.recon_branches(&subtree.nodes, self.tree, self.species, self.reconciliation);
        let root = subtree.root;

        if !self.reconciliation.event(root).is_duplication() {
            return if self.tree.parent(root).is_some() {
                self.branch_probability(root, gene_rate, recon)
            } else {
                0.0
            };
        }

        if let Some(parent) = self.tree.parent(root) {
            recon.midpoints_mut()[parent] = 1.0;
        }
        let sroot = self.species.root();
        let scored: Vec<usize> = subtree
            .nodes
            .iter()
            .copied()
            .filter(|&node| {
                self.reconciliation.species(node) != sroot && self.tree.parent(node).is_some()
            })
            .collect();

        let mut log_total = f64::NEG_INFINITY;
        for _ in 0..self.config.n_samples {
            self.midpoints.sample(&subtree.nodes, recon.midpoints_mut(), rng);
            let sample: f64 = scored
                .iter()
                .map(|&node| self.branch_probability(node, gene_rate, recon))
                .sum();
            log_total = log_add(log_total, sample);
        }
        log_total - usize_to_f64(self.config.n_samples).ln()
    }

    /// Free branches are scored at no more than their constraint mean.
    fn branch_probability(&self, node: usize, gene_rate: f64, recon: &ReconParams) -> f64 {
        let segments = recon.segments(node, self.tree, self.species);
        let mut length = self.tree.dist(node);
        if recon.is_free(node) {
            let mean: f64 = segment_gammas(&segments, self.params, gene_rate)
                .iter()
                .map(|gamma| gamma.mean())
                .sum();
            length = length.min(mean);
        }
        branch_log_probability(
            length,
            &segments,
            self.params,
            gene_rate,
            self.config.approx,
        )
    }
}

/// Roots of the duplication subtrees: every child of a speciation node, plus
/// the tree root unless it is itself a speciation.
#[must_use]
pub fn speciation_subtree_roots(tree: &Tree, reconciliation: &Reconciliation) -> Vec<usize> {
    let mut roots = Vec::new();
    if reconciliation.event(tree.root()) != Event::Speciation {
        roots.push(tree.root());
    }
    for node in tree.preorder() {
        if reconciliation.event(node) == Event::Speciation {
            roots.extend_from_slice(tree.children(node));
        }
    }
    roots
}

/// Nodes reachable from `root` through duplications only, parents first.
#[must_use]
pub fn duplication_subtree(tree: &Tree, reconciliation: &Reconciliation, root: usize) -> Vec<usize> {
    let mut nodes = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        nodes.push(node);
        if reconciliation.event(node).is_duplication() {
            stack.extend(tree.children(node).iter().rev());
        }
    }
    nodes
}

/// Branch-length prior of a reconciled gene tree.
///
/// With `gene_rate > 0` this is the conditional log-likelihood at that rate;
/// otherwise the gene rate is integrated out over the configured grid.
///
/// # Errors
///
/// Returns `BranchPriorError` for invalid inputs or options, a non-finite
/// gene rate, or marginalization without a proper gene-rate prior.
pub fn branch_prior(
    tree: &Tree,
    species: &SpeciesTree,
    reconciliation: &Reconciliation,
    params: &RateParams,
    gene_rate: f64,
    config: BranchPriorConfig,
) -> Result<f64, BranchPriorError> {
    if !gene_rate.is_finite() {
        return Err(BranchPriorError::NonFiniteGeneRate(gene_rate));
    }
    let calculator = BranchPriorCalculator::new(tree, species, reconciliation, params, config)?;
    let mut rng = StdRng::seed_from_u64(config.seed);
    if gene_rate > 0.0 {
        Ok(calculator.conditional_log_likelihood(gene_rate, &mut rng))
    } else {
        calculator.marginal_log_likelihood(&mut rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    // ((A0,B1)3,C2)4
    fn species_tree() -> SpeciesTree {
        SpeciesTree::from_parent_indices(&[3, 3, 4, 4, -1], vec![1.0, 1.0, 2.0, 1.0, 0.0])
            .expect("species tree")
    }

    #[test]
    fn subtree_roots_follow_speciations() {
        // ((A0,A1)2,B3)4 : 2 duplicates below speciation 4
        let tree = Tree::from_parent_indices(&[2, 2, 4, 4, -1], vec![0.2; 5]).expect("tree");
        let recon = Reconciliation::from_codes(&[0, 0, 0, 1, 3], &[0, 0, 2, 0, 1]).expect("codes");
        assert_eq!(speciation_subtree_roots(&tree, &recon), vec![2, 3]);
        assert_eq!(duplication_subtree(&tree, &recon, 2), vec![2, 0, 1]);
        assert_eq!(duplication_subtree(&tree, &recon, 3), vec![3]);
    }

    #[test]
    fn duplicated_root_is_its_own_subtree() {
        let tree = Tree::from_parent_indices(&[2, 2, -1], vec![0.2, 0.2, 0.0]).expect("tree");
        let recon = Reconciliation::from_codes(&[0, 0, 0], &[0, 0, 2]).expect("codes");
        assert_eq!(speciation_subtree_roots(&tree, &recon), vec![2]);
    }

    #[test]
    fn speciation_cherry_matches_closed_form() {
        let stree = species_tree();
        // (A0,B1)2 reconciled to AB
        let tree = Tree::from_parent_indices(&[2, 2, -1], vec![0.5, 1.5, 0.0]).expect("tree");
        let recon = Reconciliation::from_codes(&[0, 1, 3], &[0, 0, 1]).expect("codes");
        let params = RateParams::uniform(5, 2.0, 2.0, 0.0, 0.0);
        let logl = branch_prior(
            &tree,
            &stree,
            &recon,
            &params,
            1.0,
            BranchPriorConfig::default(),
        )
        .expect("prior");
        let expected = gamma_log_density(0.5, 2.0, 2.0) + gamma_log_density(1.5, 2.0, 2.0);
        assert_relative_eq!(logl, expected, epsilon = 1.0e-10);
    }

    #[test]
    fn gene_rate_prior_adds_density() {
        let stree = species_tree();
        let tree = Tree::from_parent_indices(&[2, 2, -1], vec![0.5, 1.5, 0.0]).expect("tree");
        let recon = Reconciliation::from_codes(&[0, 1, 3], &[0, 0, 1]).expect("codes");
        let flat = RateParams::uniform(5, 2.0, 2.0, 0.0, 0.0);
        let informed = RateParams::uniform(5, 2.0, 2.0, 3.0, 2.0);
        let config = BranchPriorConfig::default();
        let without = branch_prior(&tree, &stree, &recon, &flat, 1.2, config).expect("prior");
        let with = branch_prior(&tree, &stree, &recon, &informed, 1.2, config).expect("prior");
        assert_relative_eq!(with - without, gamma_log_density(1.2, 3.0, 2.0), epsilon = 1.0e-10);
    }

    #[test]
    fn single_node_tree_has_zero_log_likelihood() {
        let stree = species_tree();
        let tree = Tree::from_parent_indices(&[-1], vec![0.0]).expect("tree");
        let recon = Reconciliation::from_codes(&[0], &[0]).expect("codes");
        let params = RateParams::uniform(5, 2.0, 2.0, 0.0, 0.0);
        let logl = branch_prior(&tree, &stree, &recon, &params, 1.0, BranchPriorConfig::default())
            .expect("prior");
        assert_eq!(logl, 0.0);
    }

    #[test]
    fn marginal_requires_proper_gene_rate_prior() {
        let stree = species_tree();
        let tree = Tree::from_parent_indices(&[2, 2, -1], vec![0.5, 1.5, 0.0]).expect("tree");
        let recon = Reconciliation::from_codes(&[0, 1, 3], &[0, 0, 1]).expect("codes");
        let params = RateParams::uniform(5, 2.0, 2.0, 0.0, 0.0);
        let err = branch_prior(&tree, &stree, &recon, &params, -1.0, BranchPriorConfig::default())
            .expect_err("no prior");
        assert_eq!(err, BranchPriorError::MissingGeneRatePrior);
    }

    #[test]
    fn rejects_non_finite_gene_rate() {
        let stree = species_tree();
        let tree = Tree::from_parent_indices(&[2, 2, -1], vec![0.5, 1.5, 0.0]).expect("tree");
        let recon = Reconciliation::from_codes(&[0, 1, 3], &[0, 0, 1]).expect("codes");
        let params = RateParams::uniform(5, 2.0, 2.0, 1.0, 1.0);
        let err = branch_prior(
            &tree,
            &stree,
            &recon,
            &params,
            f64::NAN,
            BranchPriorConfig::default(),
        )
        .expect_err("nan rate");
        assert!(matches!(err, BranchPriorError::NonFiniteGeneRate(_)));
    }
}
