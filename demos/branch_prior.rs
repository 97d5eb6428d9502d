use relaxed_clock_models::{
    BranchPriorConfig, RateParams, SpeciesTree, Tree, branch_prior, estimate_gene_rate,
    max_posterior_gene_rate, reconcile_by_species,
};

fn main() {
    // ((A0,B1)3,C2)4
    let species = SpeciesTree::from_parent_indices(&[3, 3, 4, 4, -1], vec![1.0, 1.0, 2.0, 1.0, 0.5])
        .expect("species tree");
    // (((a0,a1)4,b2)5,c3)6 with a duplication inside A
    let tree = Tree::from_parent_indices(
        &[4, 4, 5, 6, 5, 6, -1],
        vec![0.3, 0.4, 1.2, 2.5, 0.6, 0.9, 0.0],
    )
    .expect("gene tree");
    let recon = reconcile_by_species(&tree, &species, &[0, 0, 1, 2]).expect("reconciliation");
    let params = RateParams::uniform(species.len(), 4.0, 4.0, 2.0, 2.0);

    let estimate = estimate_gene_rate(&tree, &species, &recon, &params).expect("estimate");
    let mode = max_posterior_gene_rate(&tree, &species, &recon, &params, 1).expect("mode");
    println!("gene rate estimate: {estimate:.3}, posterior mode: {mode:.3}");

    let config = BranchPriorConfig {
        n_samples: 2_000,
        seed: 7,
        ..BranchPriorConfig::default()
    };
    for gene_rate in [0.5, 1.0, 1.5] {
        let logl = branch_prior(&tree, &species, &recon, &params, gene_rate, config)
            .expect("conditional prior");
        println!("log prior at gene rate {gene_rate:.1}: {logl:.4}");
    }
    let marginal =
        branch_prior(&tree, &species, &recon, &params, 0.0, config).expect("marginal prior");
    println!("log prior integrated over the gene rate: {marginal:.4}");
}
