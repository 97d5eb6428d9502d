//! Duplication midpoints along species branches.
//!
//! A midpoint is the fractional position in `[0, 1]` along the host species
//! branch at which a gene node sits. Speciations and leaves sit at `1`; the
//! position of a duplication is unknown and drawn from a birth-death waiting
//! time over the time remaining below its closest duplicated ancestor on the
//! same species branch.

use rand::RngExt;
use rand::rngs::StdRng;

use crate::input::Reconciliation;
use crate::tree::{SpeciesTree, Tree};

/// Fraction of the remaining room kept clear at each end of a species branch.
pub const MIDPOINT_OFFSET: f64 = 1.0e-4;

/// Per-lineage event rates of a linear birth-death process.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BirthDeathRates {
    pub birth: f64,
    pub death: f64,
}

impl BirthDeathRates {
    #[must_use]
    pub const fn new(birth: f64, death: f64) -> Self {
        Self { birth, death }
    }

    #[must_use]
    pub fn total(self) -> f64 {
        self.birth + self.death
    }
}

/// Source of duplication waiting times.
pub trait WaitTimeSampler {
    /// Draw a waiting time in `[0, budget]`.
    fn sample(&self, rng: &mut StdRng, budget: f64, rates: BirthDeathRates) -> f64;
}

/// Time to the first event of a single lineage, conditioned on the event
/// happening within the budget.
///
/// Events arrive at rate `birth + death`; the draw is the exponential
/// waiting time truncated to `[0, budget]`, and uniform when the total rate
/// vanishes.
#[derive(Debug, Clone, Copy, Default)]
pub struct BirthDeathWaitTime;

impl WaitTimeSampler for BirthDeathWaitTime {
    fn sample(&self, rng: &mut StdRng, budget: f64, rates: BirthDeathRates) -> f64 {
        if budget.is_nan() || budget <= 0.0 {
            return 0.0;
        }
        let u = rng.random::<f64>();
        let rate = rates.total();
        let scaled = rate * budget;
        if scaled.is_nan() || scaled <= 1.0e-12 {
            return u * budget;
        }
        // inverse CDF of Exp(rate) restricted to [0, budget]
        let wait = -(u * (-scaled).exp_m1()).ln_1p() / rate;
        wait.clamp(0.0, budget)
    }
}

/// Draws midpoints for the nodes of a duplication subtree.
#[derive(Debug, Clone, Copy)]
pub struct MidpointSampler<'a, W = BirthDeathWaitTime> {
    tree: &'a Tree,
    species: &'a SpeciesTree,
    reconciliation: &'a Reconciliation,
    rates: BirthDeathRates,
    wait_time: W,
}

impl<'a, W: WaitTimeSampler> MidpointSampler<'a, W> {
    #[must_use]
    pub const fn new(
        tree: &'a Tree,
        species: &'a SpeciesTree,
        reconciliation: &'a Reconciliation,
        rates: BirthDeathRates,
        wait_time: W,
    ) -> Self {
        Self {
            tree,
            species,
            reconciliation,
            rates,
            wait_time,
        }
    }

    /// Resample `midpoints` for `nodes`, which must list parents before
    /// children.
    pub fn sample(&self, nodes: &[usize], midpoints: &mut [f64], rng: &mut StdRng) {
        for &node in nodes {
            if !self.reconciliation.event(node).is_duplication() {
                midpoints[node] = 1.0;
                continue;
            }

            let snode = self.reconciliation.species(node);
            let last = self
                .tree
                .parent(node)
                .filter(|&parent| self.reconciliation.species(parent) == snode)
                .map_or(0.0, |parent| midpoints[parent]);
            let remain = 1.0 - last;
            let time = self.species.time(snode);

            let floor = MIDPOINT_OFFSET.mul_add(remain, last);
            midpoints[node] = if time > 0.0 {
                let budget = remain * time * (1.0 - MIDPOINT_OFFSET);
                floor + self.wait_time.sample(rng, budget, self.rates) / time
            } else {
                floor
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    struct HalfBudget;

    impl WaitTimeSampler for HalfBudget {
        fn sample(&self, _rng: &mut StdRng, budget: f64, _rates: BirthDeathRates) -> f64 {
            0.5 * budget
        }
    }

    // ((A0,B1)3,C2)4
    fn species_tree() -> SpeciesTree {
        SpeciesTree::from_parent_indices(&[3, 3, 4, 4, -1], vec![1.0, 1.0, 2.0, 2.0, 0.0])
            .expect("species tree")
    }

    fn mean_wait(rates: BirthDeathRates, budget: f64, draws: u32, seed: u64) -> f64 {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..draws)
            .map(|_| {
                let wait = BirthDeathWaitTime.sample(&mut rng, budget, rates);
                assert!((0.0..=budget).contains(&wait));
                wait
            })
            .sum::<f64>()
            / f64::from(draws)
    }

    #[test]
    fn wait_time_matches_truncated_exponential_mean() {
        // E[T | T <= b] = 1/r - b / (exp(r b) - 1)
        for (rates, budget) in [
            (BirthDeathRates::new(1.0, 1.0), 1.0),
            (BirthDeathRates::new(0.2, 0.3), 2.0),
            (BirthDeathRates::new(20.0, 20.0), 1.0),
        ] {
            let rate = rates.total();
            let expected = 1.0 / rate - budget / (rate * budget).exp_m1();
            let mean = mean_wait(rates, budget, 20_000, 7);
            assert!(
                (mean - expected).abs() < 0.015,
                "rates {rates:?}: mean {mean}, expected {expected}"
            );
        }
    }

    #[test]
    fn vanishing_rates_wait_uniformly() {
        let mean = mean_wait(BirthDeathRates::new(0.0, 0.0), 1.0, 20_000, 3);
        assert!((mean - 0.5).abs() < 0.01);
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(
            BirthDeathWaitTime.sample(&mut rng, 0.0, BirthDeathRates::new(1.0, 1.0)),
            0.0
        );
    }

    #[test]
    fn duplication_midpoints_spread_along_the_branch() {
        let stree = species_tree();
        // ((A0,A1)2,A3)4 : both internal nodes duplicate on A
        let tree = Tree::from_parent_indices(&[2, 2, 4, 4, -1], vec![0.1; 5]).expect("tree");
        let recon =
            Reconciliation::from_codes(&[0, 0, 0, 0, 0], &[0, 0, 2, 0, 2]).expect("codes");
        let sampler = MidpointSampler::new(
            &tree,
            &stree,
            &recon,
            BirthDeathRates::new(1.0, 1.0),
            BirthDeathWaitTime,
        );
        let order = tree.preorder();
        let mut midpoints = vec![1.0; tree.len()];
        let mut rng = StdRng::seed_from_u64(19);

        let draws = 2_000;
        let mut root_positions = Vec::with_capacity(draws);
        let mut child_positions = Vec::with_capacity(draws);
        for _ in 0..draws {
            sampler.sample(&order, &mut midpoints, &mut rng);
            let (root, child) = (midpoints[4], midpoints[2]);
            assert!(root > 0.0 && root < 1.0, "root midpoint {root}");
            assert!(child > root && child < 1.0, "child {child} after root {root}");
            root_positions.push(root);
            child_positions.push((child - root) / (1.0 - root));
        }

        for positions in [&root_positions, &child_positions] {
            let low = positions.iter().copied().fold(f64::INFINITY, f64::min);
            let high = positions.iter().copied().fold(0.0, f64::max);
            assert!(low < 0.05, "lowest midpoint {low}");
            assert!(high > 0.7, "highest midpoint {high}");
        }
        let mean = root_positions.iter().sum::<f64>() / 2_000.0;
        let expected = 0.5 - 1.0 / 2.0_f64.exp_m1();
        assert!((mean - expected).abs() < 0.03, "mean root midpoint {mean}");
    }

    #[test]
    fn nested_duplications_are_ordered_along_branch() {
        let stree = species_tree();
        // (((A0,B1)5,AB2)6,(C3,C4)7)8 : 6 duplicates on AB, 7 on C
        let tree = Tree::from_parent_indices(
            &[5, 5, 6, 7, 7, 6, 8, 8, -1],
            vec![0.1; 9],
        )
        .expect("tree");
        let recon = Reconciliation::from_codes(
            &[0, 1, 3, 2, 2, 3, 3, 2, 4],
            &[0, 0, 0, 0, 0, 1, 2, 2, 1],
        )
        .expect("codes");
        let sampler = MidpointSampler::new(
            &tree,
            &stree,
            &recon,
            BirthDeathRates::new(0.1, 0.2),
            BirthDeathWaitTime,
        );
        let mut midpoints = vec![1.0; tree.len()];
        let mut rng = StdRng::seed_from_u64(5);
        sampler.sample(&tree.preorder_from(6), &mut midpoints, &mut rng);

        assert!(midpoints[6] > 0.0 && midpoints[6] <= 1.0);
        assert_eq!(midpoints[5], 1.0);
        assert_eq!(midpoints[2], 1.0);
    }

    #[test]
    fn child_duplication_starts_after_parent_midpoint() {
        let stree = species_tree();
        // ((A0,A1)2,A3)4 : both internal nodes duplicate on A
        let tree = Tree::from_parent_indices(&[2, 2, 4, 4, -1], vec![0.1; 5]).expect("tree");
        let recon =
            Reconciliation::from_codes(&[0, 0, 0, 0, 0], &[0, 0, 2, 0, 2]).expect("codes");
        let sampler = MidpointSampler::new(
            &tree,
            &stree,
            &recon,
            BirthDeathRates::new(0.1, 0.2),
            HalfBudget,
        );
        let mut midpoints = vec![1.0; tree.len()];
        let mut rng = StdRng::seed_from_u64(5);
        sampler.sample(&tree.preorder(), &mut midpoints, &mut rng);

        let root = MIDPOINT_OFFSET + 0.5 * (1.0 - MIDPOINT_OFFSET);
        assert!((midpoints[4] - root).abs() < 1.0e-12);
        assert!(midpoints[2] > midpoints[4]);
        assert!(midpoints[2] < 1.0);
        assert_eq!(midpoints[0], 1.0);
    }
}
