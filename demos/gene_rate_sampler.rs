use relaxed_clock_models::{
    Alignment, GeneMapping, GeneRateSamplerConfig, McmcConfig, RateParams, SpeciesTree, Tree,
    render_trace_summary, sample_posterior_gene_rate,
};

fn main() {
    let species = SpeciesTree::from_parent_indices(&[3, 3, 4, 4, -1], vec![0.1, 0.1, 0.2, 0.1, 0.0])
        .expect("species tree");
    let mut tree = Tree::from_parent_indices(&[3, 3, 4, 4, -1], vec![0.1, 0.1, 0.2, 0.1, 0.0])
        .expect("gene tree");
    let alignment = Alignment::from_strs(
        &[
            "ACGTACGTTGCAACGTTAGCCGATACGATCGATGCATGCA",
            "ACGCACGTTTCAACGCTAGCCTATACGGTCGATTCATGTA",
            "ATGTAAGTTACACCGTTGGCAGATGCGAGCGGTGCCTACC",
        ],
        [0.25; 4],
        2.0,
    );
    let params = RateParams::uniform(species.len(), 2.0, 2.0, 2.0, 2.0);
    let config = GeneRateSamplerConfig {
        mcmc: McmcConfig {
            iterations: 2_000,
            burn_in: 500,
            thin: 5,
            seed: 42,
        },
        ..GeneRateSamplerConfig::default()
    };

    let mut accepted = 0_usize;
    let trace = sample_posterior_gene_rate(
        &mut tree,
        &alignment,
        &species,
        GeneMapping::Gene2Species(&[0, 1, 2]),
        &params,
        config,
        |sample| accepted += usize::from(sample.accepted),
    )
    .expect("sampler");

    println!("accepted moves: {accepted}");
    println!("{}", render_trace_summary(&trace));
}
