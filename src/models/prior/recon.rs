//! Decomposition of gene-tree branches onto species-tree segments.
//!
//! A gene branch spans a path through the species tree: possibly a partial
//! segment at its top (measured from the parent's duplication midpoint), a run
//! of fully crossed species branches, and a partial segment at its bottom
//! (measured up to its own duplication midpoint).

use crate::input::{Event, Reconciliation};
use crate::tree::{SpeciesTree, Tree};

/// Fraction of a species branch attributed to a partial segment, tagged with
/// the species node whose branch it lies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fraction {
    /// No partial segment.
    None,
    /// From the parent's midpoint to the end of the species branch: `1 - k[parent]`.
    AfterParent(usize),
    /// From the start of the species branch to the node's midpoint: `k[node]`.
    UpToNode(usize),
    /// Between the parent's and the node's midpoints: `k[node] - k[parent]`.
    Between(usize),
}

/// Species-tree path of one gene branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchRecon {
    pub start: Fraction,
    /// Species branches crossed in full, bottom to top.
    pub crossed: Vec<usize>,
    pub end: Fraction,
}

/// Elapsed species time attributed to one species branch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub species: usize,
    pub time: f64,
}

/// Branch below a duplicated root whose length absorbs its sibling's.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Unfold {
    pub node: usize,
    /// Sibling length divided by the gene rate.
    pub dist: f64,
}

/// Branches without an informative rate constraint near the locus root.
#[derive(Debug, Clone, PartialEq)]
pub struct FreeBranches {
    pub free: Vec<bool>,
    pub unfold: Option<Unfold>,
}

/// Decompose the branch above `node` into species-tree segments, or `None`
/// for the gene-tree root.
#[must_use]
pub fn recon_branch(
    node: usize,
    tree: &Tree,
    species: &SpeciesTree,
    reconciliation: &Reconciliation,
) -> Option<BranchRecon> {
    let parent = tree.parent(node)?;
    let snode = reconciliation.species(node);
    let parent_snode = reconciliation.species(parent);
    let duplicated = reconciliation.event(node).is_duplication();

    if snode == parent_snode {
        let start = if duplicated {
            Fraction::Between(snode)
        } else {
            Fraction::AfterParent(snode)
        };
        return Some(BranchRecon {
            start,
            crossed: Vec::new(),
            end: Fraction::None,
        });
    }

    let start = if reconciliation.event(parent).is_duplication() {
        Fraction::AfterParent(parent_snode)
    } else {
        Fraction::None
    };
    let end = if duplicated {
        Fraction::UpToNode(snode)
    } else {
        Fraction::None
    };

    let mut crossed = Vec::new();
    let mut current = if duplicated {
        species.parent(snode)
    } else {
        Some(snode)
    };
    while let Some(step) = current {
        if step == parent_snode {
            break;
        }
        let Some(above) = species.parent(step) else {
            break;
        };
        crossed.push(step);
        current = Some(above);
    }

    Some(BranchRecon {
        start,
        crossed,
        end,
    })
}

/// Mark free branches and the unfold target for a reconciled gene tree.
///
/// A branch is free when its parent is a duplication on the species root and
/// the branch itself descends below the species root.
#[must_use]
pub fn determine_free_branches(
    tree: &Tree,
    species: &SpeciesTree,
    reconciliation: &Reconciliation,
    gene_rate: f64,
) -> FreeBranches {
    let sroot = species.root();
    let free = (0..tree.len())
        .map(|node| {
            tree.parent(node).is_some_and(|parent| {
                reconciliation.species(parent) == sroot
                    && reconciliation.event(parent) == Event::Duplication
                    && reconciliation.species(node) != sroot
            })
        })
        .collect();

    let root = tree.root();
    let children = tree.children(root);
    let unfold = (children.len() >= 2
        && reconciliation.species(root) == sroot
        && reconciliation.event(root) == Event::Duplication)
        .then(|| {
            let (first, second) = (children[0], children[1]);
            let (node, sibling) = if reconciliation.species(first) == sroot {
                (second, first)
            } else {
                (first, second)
            };
            Unfold {
                node,
                dist: tree.dist(sibling) / gene_rate,
            }
        });

    FreeBranches { free, unfold }
}

/// Per-node reconciliation parameters: branch decompositions, duplication
/// midpoints, and free-branch flags.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconParams {
    branches: Vec<Option<BranchRecon>>,
    midpoints: Vec<f64>,
    free: Vec<bool>,
    unfold: Option<Unfold>,
}

impl ReconParams {
    /// Fresh parameters with every midpoint at the end of its species branch
    /// and no branch decomposed yet.
    #[must_use]
    pub fn new(
        tree: &Tree,
        species: &SpeciesTree,
        reconciliation: &Reconciliation,
        gene_rate: f64,
    ) -> Self {
        let FreeBranches { free, unfold } =
            determine_free_branches(tree, species, reconciliation, gene_rate);
        Self {
            branches: vec![None; tree.len()],
            midpoints: vec![1.0; tree.len()],
            free,
            unfold,
        }
    }

    /// Decompose the branches above `nodes`, skipping the gene-tree root.
    pub fn recon_branches(
        &mut self,
        nodes: &[usize],
        tree: &Tree,
        species: &SpeciesTree,
        reconciliation: &Reconciliation,
    ) {
        for &node in nodes {
            if let Some(branch) = recon_branch(node, tree, species, reconciliation) {
                self.branches[node] = Some(branch);
            }
        }
    }

    #[must_use]
    pub fn branch(&self, node: usize) -> Option<&BranchRecon> {
        self.branches[node].as_ref()
    }

    #[must_use]
    pub fn midpoints(&self) -> &[f64] {
        &self.midpoints
    }

    pub fn midpoints_mut(&mut self) -> &mut [f64] {
        &mut self.midpoints
    }

    #[must_use]
    pub fn is_free(&self, node: usize) -> bool {
        self.free[node]
    }

    #[must_use]
    pub const fn unfold(&self) -> Option<Unfold> {
        self.unfold
    }

    /// Elapsed species time per segment of the branch above `node`, top to
    /// bottom. Empty if the branch has not been decomposed.
    ///
    /// A free branch starts at the beginning of its partial species segment,
    /// ignoring the placement of the root duplication above it.
    #[must_use]
    pub fn segments(&self, node: usize, tree: &Tree, species: &SpeciesTree) -> Vec<Segment> {
        let (Some(branch), Some(parent)) = (self.branch(node), tree.parent(node)) else {
            return Vec::new();
        };
        let parent_midpoint = if self.free[node] {
            0.0
        } else {
            self.midpoints[parent]
        };
        let fraction_time = |fraction: Fraction| match fraction {
            Fraction::None => None,
            Fraction::AfterParent(snode) => Some(Segment {
                species: snode,
                time: (1.0 - parent_midpoint) * species.time(snode),
            }),
            Fraction::UpToNode(snode) => Some(Segment {
                species: snode,
                time: self.midpoints[node] * species.time(snode),
            }),
            Fraction::Between(snode) => Some(Segment {
                species: snode,
                time: (self.midpoints[node] - self.midpoints[parent]) * species.time(snode),
            }),
        };

        let mut segments = Vec::with_capacity(branch.crossed.len() + 2);
        segments.extend(fraction_time(branch.start));
        segments.extend(branch.crossed.iter().map(|&snode| Segment {
            species: snode,
            time: species.time(snode),
        }));
        segments.extend(fraction_time(branch.end));
        segments
    }
}
