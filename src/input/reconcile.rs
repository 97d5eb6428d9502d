//! Parsimony (LCA) reconciliation and event labeling.
//!
//! Gene leaves are assigned to species through a map given in ascending
//! leaf-index order. Internal gene nodes reconcile to the lowest common
//! ancestor of their children's species; a node is a duplication whenever one
//! of its children reconciles to the same species node.

use crate::tree::{SpeciesTree, Tree};

use super::{Event, InputError, Reconciliation};

/// Reconcile every gene node to a species node by parsimony.
///
/// `gene2species[k]` is the species node of the `k`-th gene leaf, leaves taken
/// in ascending node-index order.
///
/// # Errors
///
/// Returns `InputError` if the map does not cover every leaf or points
/// outside the species tree.
pub fn reconcile(
    tree: &Tree,
    species: &SpeciesTree,
    gene2species: &[usize],
) -> Result<Vec<usize>, InputError> {
    let leaves = tree.leaves();
    if leaves.len() != gene2species.len() {
        return Err(InputError::Gene2SpeciesLength {
            leaves: leaves.len(),
            entries: gene2species.len(),
        });
    }

    let mut recon = vec![species.root(); tree.len()];
    for (&leaf, &snode) in leaves.iter().zip(gene2species) {
        if snode >= species.len() {
            return Err(InputError::SpeciesOutOfRange {
                node: leaf,
                species: i64::try_from(snode).unwrap_or(i64::MAX),
                len: species.len(),
            });
        }
        recon[leaf] = snode;
    }

    for node in tree.postorder() {
        let mut children = tree.children(node).iter();
        if let Some(&first) = children.next() {
            recon[node] = children.fold(recon[first], |acc, &child| species.lca(acc, recon[child]));
        }
    }
    Ok(recon)
}

/// Label gene nodes as gene, speciation, or duplication given a reconciliation.
#[must_use]
pub fn label_events(tree: &Tree, recon: &[usize]) -> Vec<Event> {
    (0..tree.len())
        .map(|node| {
            let children = tree.children(node);
            if children.is_empty() {
                Event::Gene
            } else if children.iter().any(|&child| recon[child] == recon[node]) {
                Event::Duplication
            } else {
                Event::Speciation
            }
        })
        .collect()
}

/// Parsimony reconciliation plus event labels.
///
/// # Errors
///
/// Returns `InputError` if the gene-to-species map is invalid.
pub fn reconcile_by_species(
    tree: &Tree,
    species: &SpeciesTree,
    gene2species: &[usize],
) -> Result<Reconciliation, InputError> {
    let recon = reconcile(tree, species, gene2species)?;
    let events = label_events(tree, &recon);
    Ok(Reconciliation::new(recon, events))
}
