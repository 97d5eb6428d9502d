use approx::assert_relative_eq;
use rand::SeedableRng;
use rand::rngs::StdRng;
use relaxed_clock_models::{
    BranchPriorCalculator, BranchPriorConfig, BranchPriorError, RateParams, ReconParams,
    Reconciliation, SpeciesTree, Tree, branch_prior, determine_free_branches, estimate_gene_rate,
    max_posterior_gene_rate, reconcile_by_species, segment_gammas,
};

fn idx_to_f64(idx: usize) -> f64 {
    f64::from(u32::try_from(idx).unwrap_or(u32::MAX))
}

// ((A0,B1)3,C2)4
fn species_tree() -> SpeciesTree {
    SpeciesTree::from_parent_indices(&[3, 3, 4, 4, -1], vec![1.0, 1.0, 2.0, 1.0, 0.0])
        .expect("species tree")
}

// ((a0,b1)4,(a2,b3)5)6 with 6 a duplication on the (A,B) ancestor
fn duplicated_family() -> (Tree, Reconciliation) {
    let tree = Tree::from_parent_indices(
        &[4, 4, 5, 5, 6, 6, -1],
        vec![0.5, 0.5, 0.5, 0.5, 0.3, 0.3, 0.0],
    )
    .expect("gene tree");
    let recon = Reconciliation::from_codes(&[0, 1, 0, 1, 3, 3, 3], &[0, 0, 0, 0, 1, 1, 2])
        .expect("reconciliation");
    (tree, recon)
}

fn prior_config(n_samples: usize, seed: u64) -> BranchPriorConfig {
    BranchPriorConfig {
        n_samples,
        approx: true,
        seed,
        ..BranchPriorConfig::default()
    }
}

#[test]
fn duplicated_family_prior_is_finite_and_reproducible() {
    let species = species_tree();
    let (tree, recon) = duplicated_family();
    let params = RateParams::uniform(species.len(), 2.0, 2.0, 2.0, 2.0);

    let first = branch_prior(&tree, &species, &recon, &params, 1.0, prior_config(2_000, 17))
        .expect("branch prior");
    let second = branch_prior(&tree, &species, &recon, &params, 1.0, prior_config(2_000, 17))
        .expect("branch prior");

    assert!(first.is_finite());
    assert!(first < 0.0);
    assert_relative_eq!(first, second, epsilon = 1.0e-12);
    // four leaf branches, the Monte Carlo duplication term, and the gene-rate prior
    assert_relative_eq!(first, -1.46, epsilon = 0.1);
}

#[test]
fn speciation_only_prior_ignores_the_seed() {
    let species = species_tree();
    let tree = Tree::from_parent_indices(&[3, 3, 4, 4, -1], vec![0.8, 1.1, 2.3, 0.9, 0.0])
        .expect("gene tree");
    let recon =
        reconcile_by_species(&tree, &species, &[0, 1, 2]).expect("parsimony reconciliation");
    let params = RateParams::uniform(species.len(), 2.0, 2.0, 2.0, 2.0);

    let a = branch_prior(&tree, &species, &recon, &params, 1.3, prior_config(10, 1))
        .expect("branch prior");
    let b = branch_prior(&tree, &species, &recon, &params, 1.3, prior_config(10, 99))
        .expect("branch prior");
    assert_eq!(a.to_bits(), b.to_bits());
}

#[test]
fn monte_carlo_estimates_tighten_with_more_samples() {
    let species = species_tree();
    let (tree, recon) = duplicated_family();
    let params = RateParams::uniform(species.len(), 2.0, 2.0, 0.0, 0.0);

    let spread = |n_samples: usize| {
        let values: Vec<f64> = (0..10)
            .map(|seed| {
                branch_prior(&tree, &species, &recon, &params, 1.0, prior_config(n_samples, seed))
                    .expect("branch prior")
            })
            .collect();
        let mean = values.iter().sum::<f64>() / idx_to_f64(values.len());
        values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / idx_to_f64(values.len())
    };

    let spreads: Vec<f64> = [100, 1_000, 10_000].into_iter().map(spread).collect();
    assert!(spreads[0] > 0.0);
    assert!(
        spreads.windows(2).all(|pair| pair[1] < pair[0]),
        "variances {spreads:?} should shrink with the sample count"
    );
}

#[test]
fn marginal_dominates_conditional_slices() {
    let species =
        SpeciesTree::from_parent_indices(&[2, 2, -1], vec![1.0, 1.0, 0.0]).expect("species");
    let tree = Tree::from_parent_indices(&[2, 2, -1], vec![2.0, 2.0, 0.0]).expect("gene tree");
    let recon = Reconciliation::from_codes(&[0, 1, 2], &[0, 0, 1]).expect("reconciliation");
    let params = RateParams::uniform(species.len(), 1.0, 1.0, 2.0, 2.0);
    let config = prior_config(100, 5);

    let marginal =
        branch_prior(&tree, &species, &recon, &params, 0.0, config).expect("marginal prior");
    assert_relative_eq!(marginal, -4.2699, epsilon = 1.0e-3);

    for gene_rate in [0.2, 0.5, 1.0, 1.5, 2.5] {
        let conditional = branch_prior(&tree, &species, &recon, &params, gene_rate, config)
            .expect("conditional prior");
        assert!(
            marginal >= conditional,
            "marginal {marginal} below conditional {conditional} at {gene_rate}"
        );
    }
}

#[test]
fn marginal_requires_gene_rate_prior() {
    let species = species_tree();
    let (tree, recon) = duplicated_family();
    let params = RateParams::uniform(species.len(), 2.0, 2.0, 0.0, 0.0);
    assert_eq!(
        branch_prior(&tree, &species, &recon, &params, 0.0, prior_config(10, 1)),
        Err(BranchPriorError::MissingGeneRatePrior)
    );
}

#[test]
fn free_branches_ignore_the_root_duplication_midpoint() {
    let species = species_tree();
    // ((a0,b1)4,(a2,c3)5)6: 5 speciates at the species root, 6 duplicates there
    let tree = Tree::from_parent_indices(
        &[4, 4, 5, 5, 6, 6, -1],
        vec![0.6, 0.4, 0.9, 1.7, 0.8, 0.2, 0.0],
    )
    .expect("gene tree");
    let recon = reconcile_by_species(&tree, &species, &[0, 1, 0, 2]).expect("reconciliation");
    assert!(recon.event(6).is_duplication());

    let free = determine_free_branches(&tree, &species, &recon, 1.0);
    assert!(free.free[4]);
    assert!(!free.free[5]);
    let unfold = free.unfold.expect("root duplication on the species root unfolds");
    assert_eq!(unfold.node, 4);
    assert_relative_eq!(unfold.dist, 0.2);

    // the free branch spans its species branch whatever the root midpoint
    let mut recon_params = ReconParams::new(&tree, &species, &recon, 1.0);
    recon_params.recon_branches(&tree.preorder(), &tree, &species, &recon);
    let before = recon_params.segments(4, &tree, &species);
    recon_params.midpoints_mut()[6] = 0.7;
    assert_eq!(recon_params.segments(4, &tree, &species), before);
    let total: f64 = before.iter().map(|segment| segment.time).sum();
    assert_relative_eq!(total, 1.0);
}

#[test]
fn free_branches_are_scored_at_most_at_their_constraint_mean() {
    // species root with a stem so every branch below it has elapsed time
    let species =
        SpeciesTree::from_parent_indices(&[3, 3, 4, 4, -1], vec![1.0, 1.0, 2.0, 1.0, 1.0])
            .expect("species tree");
    // ((a0,b1)4,(a2,c3)5)6 with 6 duplicating on the species root; 4 is free
    let tree = Tree::from_parent_indices(
        &[4, 4, 5, 5, 6, 6, -1],
        vec![0.6, 0.4, 0.9, 1.7, 3.0, 0.2, 0.0],
    )
    .expect("gene tree");
    let recon = reconcile_by_species(&tree, &species, &[0, 1, 0, 2]).expect("reconciliation");
    let params = RateParams::uniform(species.len(), 2.0, 2.0, 0.0, 0.0);
    let gene_rate = 1.0;
    let prior = |tree: &Tree| {
        branch_prior(tree, &species, &recon, &params, gene_rate, prior_config(500, 9))
            .expect("branch prior")
    };

    let free = determine_free_branches(&tree, &species, &recon, gene_rate).free;
    let mut recon_params = ReconParams::new(&tree, &species, &recon, gene_rate);
    recon_params.recon_branches(&tree.preorder(), &tree, &species, &recon);

    let mut clamped = tree.clone();
    let mut shortened = 0;
    for node in (0..tree.len()).filter(|&node| free[node]) {
        let segments = recon_params.segments(node, &tree, &species);
        let mean: f64 = segment_gammas(&segments, &params, gene_rate)
            .iter()
            .map(|gamma| gamma.mean())
            .sum();
        if tree.dist(node) > mean {
            shortened += 1;
        }
        clamped.set_dist(node, tree.dist(node).min(mean));
    }
    assert_eq!(shortened, 1);

    let original = prior(&tree);
    let augmented = prior(&clamped);
    assert!(original.is_finite());
    assert!(
        augmented <= original + 1.0e-12,
        "clamped {augmented} above original {original}"
    );
    assert_relative_eq!(augmented, original, epsilon = 1.0e-12);

    // lengthening a free branch past its mean is not penalised further
    let mut longer = tree.clone();
    longer.set_dist(4, 10.0);
    assert_relative_eq!(prior(&longer), original, epsilon = 1.0e-12);

    // a constrained branch is still scored at its own length
    let mut constrained = tree.clone();
    constrained.set_dist(5, 2.0);
    assert!(prior(&constrained) < original);
}

#[test]
fn calculator_reuses_subtrees_across_rates() {
    let species = species_tree();
    let (tree, recon) = duplicated_family();
    let params = RateParams::uniform(species.len(), 2.0, 2.0, 2.0, 2.0);
    let calculator =
        BranchPriorCalculator::new(&tree, &species, &recon, &params, prior_config(500, 8))
            .expect("calculator");

    let mut rng = StdRng::seed_from_u64(8);
    let marginal = calculator
        .integrate_gene_rate(&mut rng)
        .expect("rate marginal");
    assert!(marginal.log_likelihood.is_finite());
    assert!(marginal.argmax_rate > 0.0);
    assert_relative_eq!(marginal.step, (3.0 - 0.05) / 20.0, epsilon = 1.0e-12);

    let at_argmax = calculator.conditional_log_likelihood(marginal.argmax_rate, &mut rng);
    assert!(at_argmax.is_finite());
}

#[test]
fn gene_rate_estimates_track_scaled_lengths() {
    let species = species_tree();
    let tree = Tree::from_parent_indices(&[3, 3, 4, 4, -1], vec![2.0, 2.0, 4.0, 2.0, 0.0])
        .expect("gene tree");
    let recon = reconcile_by_species(&tree, &species, &[0, 1, 2]).expect("reconciliation");
    let params = RateParams::uniform(species.len(), 4.0, 4.0, 0.0, 0.0);

    let estimate = estimate_gene_rate(&tree, &species, &recon, &params).expect("estimate");
    assert!(estimate > 1.5 && estimate < 2.5, "estimate {estimate}");

    let params = RateParams::uniform(species.len(), 4.0, 4.0, 2.0, 1.0);
    let mode = max_posterior_gene_rate(&tree, &species, &recon, &params, 11).expect("mode");
    assert!(mode > 1.0 && mode < 3.0, "mode {mode}");
}
