//! # Trees
//!
//! Arena representation of rooted trees. Nodes are addressed by dense index
//! and carry an explicit parent index, an ordered child list, and the length
//! of the branch to their parent. Trees are built from the flat wire format
//! used across the crate: a parent-index array (`-1` marks the root) paired
//! with per-node branch lengths.
//!
//! # Examples
//!
//! ```
//! use relaxed_clock_models::Tree;
//!
//! // ((0,1)3,2)4
//! let tree = Tree::from_parent_indices(&[3, 3, 4, 4, -1], vec![1.0, 1.0, 2.0, 1.0, 0.0])
//!     .expect("valid tree");
//! assert_eq!(tree.root(), 4);
//! assert_eq!(tree.leaves(), vec![0, 1, 2]);
//! ```

use thiserror::Error;

/// Errors returned when a tree cannot be built from its flat encoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("tree must contain at least one node")]
    Empty,
    #[error("parent array length ({parents}) must match branch length array ({dists})")]
    LengthMismatch { parents: usize, dists: usize },
    #[error("node {node} has parent index {parent}, outside 0..{len}")]
    ParentOutOfRange { node: usize, parent: i64, len: usize },
    #[error("tree must have exactly one root; found {found}")]
    RootCount { found: usize },
    #[error("parent links starting at node {node} do not reach the root")]
    Cycle { node: usize },
}

/// Rooted tree stored as an index arena.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    parents: Vec<Option<usize>>,
    children: Vec<Vec<usize>>,
    dists: Vec<f64>,
    root: usize,
}

impl Tree {
    /// Build a tree from a parent-index array where `-1` marks the root.
    ///
    /// # Errors
    ///
    /// Returns `TreeError` if the arrays disagree in length, an index is out of
    /// range, the root is not unique, or parent links form a cycle.
    pub fn from_parent_indices(parent_indices: &[i32], dists: Vec<f64>) -> Result<Self, TreeError> {
        let len = parent_indices.len();
        let parents = parent_indices
            .iter()
            .enumerate()
            .map(|(node, &parent)| match parent {
                -1 => Ok(None),
                p => usize::try_from(p)
                    .ok()
                    .filter(|&p| p < len)
                    .map(Some)
                    .ok_or(TreeError::ParentOutOfRange {
                        node,
                        parent: i64::from(p),
                        len,
                    }),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_parents(parents, dists)
    }

    /// Build a tree from optional parent indices.
    ///
    /// # Errors
    ///
    /// Returns `TreeError` if the encoding is not a single rooted tree.
    pub fn from_parents(parents: Vec<Option<usize>>, dists: Vec<f64>) -> Result<Self, TreeError> {
        let len = parents.len();
        if len == 0 {
            return Err(TreeError::Empty);
        }
        if dists.len() != len {
            return Err(TreeError::LengthMismatch {
                parents: len,
                dists: dists.len(),
            });
        }

        let mut children = vec![Vec::new(); len];
        let mut roots = Vec::new();
        for (node, parent) in parents.iter().enumerate() {
            match *parent {
                Some(p) if p >= len => {
                    return Err(TreeError::ParentOutOfRange {
                        node,
                        parent: i64::try_from(p).unwrap_or(i64::MAX),
                        len,
                    });
                }
                Some(p) => children[p].push(node),
                None => roots.push(node),
            }
        }
        if roots.len() != 1 {
            return Err(TreeError::RootCount { found: roots.len() });
        }

        // every node must reach the root within `len` steps
        for start in 0..len {
            let mut node = start;
            let mut steps = 0;
            while let Some(parent) = parents[node] {
                node = parent;
                steps += 1;
                if steps > len {
                    return Err(TreeError::Cycle { node: start });
                }
            }
        }

        Ok(Self {
            parents,
            children,
            dists,
            root: roots[0],
        })
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.parents.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    #[must_use]
    pub const fn root(&self) -> usize {
        self.root
    }

    #[must_use]
    pub fn parent(&self, node: usize) -> Option<usize> {
        self.parents[node]
    }

    #[must_use]
    pub fn children(&self, node: usize) -> &[usize] {
        &self.children[node]
    }

    #[must_use]
    pub fn is_leaf(&self, node: usize) -> bool {
        self.children[node].is_empty()
    }

    /// Leaf indices in ascending order.
    #[must_use]
    pub fn leaves(&self) -> Vec<usize> {
        (0..self.len()).filter(|&node| self.is_leaf(node)).collect()
    }

    /// Length of the branch from `node` to its parent.
    #[must_use]
    pub fn dist(&self, node: usize) -> f64 {
        self.dists[node]
    }

    pub fn set_dist(&mut self, node: usize, dist: f64) {
        self.dists[node] = dist;
    }

    #[must_use]
    pub fn dists(&self) -> &[f64] {
        &self.dists
    }

    pub fn dists_mut(&mut self) -> &mut [f64] {
        &mut self.dists
    }

    /// Overwrite every branch length from a snapshot of the same size.
    ///
    /// # Panics
    ///
    /// Panics if `dists` does not have one entry per node.
    pub fn set_dists(&mut self, dists: &[f64]) {
        self.dists.copy_from_slice(dists);
    }

    /// Flat parent-index encoding with `-1` for the root.
    #[must_use]
    pub fn parent_indices(&self) -> Vec<i32> {
        self.parents
            .iter()
            .map(|parent| parent.map_or(-1, |p| i32::try_from(p).unwrap_or(i32::MAX)))
            .collect()
    }

    /// Nodes of the whole tree, parents before children.
    #[must_use]
    pub fn preorder(&self) -> Vec<usize> {
        self.preorder_from(self.root)
    }

    /// Nodes of the subtree rooted at `start`, parents before children.
    #[must_use]
    pub fn preorder_from(&self, start: usize) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.len());
        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            order.push(node);
            stack.extend(self.children[node].iter().rev());
        }
        order
    }

    /// Nodes of the whole tree, children before parents.
    #[must_use]
    pub fn postorder(&self) -> Vec<usize> {
        let mut order = self.preorder();
        order.reverse();
        order
    }
}

/// Species tree: a [`Tree`] whose branch lengths are divergence times, plus
/// the root-to-node time (`depth`) of every node.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeciesTree {
    tree: Tree,
    depths: Vec<f64>,
}

impl SpeciesTree {
    #[must_use]
    pub fn new(tree: Tree) -> Self {
        let mut depths = vec![0.0; tree.len()];
        for node in tree.preorder() {
            if let Some(parent) = tree.parent(node) {
                depths[node] = depths[parent] + tree.dist(node);
            }
        }
        Self { tree, depths }
    }

    /// # Errors
    ///
    /// Returns `TreeError` if the flat encoding is malformed.
    pub fn from_parent_indices(parent_indices: &[i32], times: Vec<f64>) -> Result<Self, TreeError> {
        Tree::from_parent_indices(parent_indices, times).map(Self::new)
    }

    #[must_use]
    pub const fn tree(&self) -> &Tree {
        &self.tree
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.tree.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    #[must_use]
    pub const fn root(&self) -> usize {
        self.tree.root()
    }

    #[must_use]
    pub fn parent(&self, node: usize) -> Option<usize> {
        self.tree.parent(node)
    }

    /// Divergence time spanned by the branch above `node`.
    #[must_use]
    pub fn time(&self, node: usize) -> f64 {
        self.tree.dist(node)
    }

    #[must_use]
    pub fn depth(&self, node: usize) -> f64 {
        self.depths[node]
    }

    /// Whether `ancestor` lies on the path from `node` to the root.
    #[must_use]
    pub fn is_ancestor_or_self(&self, ancestor: usize, node: usize) -> bool {
        let mut current = Some(node);
        while let Some(snode) = current {
            if snode == ancestor {
                return true;
            }
            current = self.tree.parent(snode);
        }
        false
    }

    /// Lowest common ancestor of two species nodes.
    #[must_use]
    pub fn lca(&self, a: usize, b: usize) -> usize {
        let mut current = Some(a);
        while let Some(snode) = current {
            if self.is_ancestor_or_self(snode, b) {
                return snode;
            }
            current = self.tree.parent(snode);
        }
        self.root()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn four_leaf_species() -> SpeciesTree {
        // ((0,1)4,(2,3)5)6
        SpeciesTree::from_parent_indices(
            &[4, 4, 5, 5, 6, 6, -1],
            vec![1.0, 1.0, 2.0, 2.0, 2.0, 1.0, 0.0],
        )
        .expect("valid species tree")
    }

    #[test]
    fn builds_children_in_index_order() {
        let tree = Tree::from_parent_indices(&[2, 2, -1], vec![1.0, 2.0, 0.0]).expect("tree");
        assert_eq!(tree.root(), 2);
        assert_eq!(tree.children(2), &[0, 1]);
        assert_eq!(tree.parent(0), Some(2));
        assert_eq!(tree.parent_indices(), vec![2, 2, -1]);
    }

    #[test]
    fn postorder_ends_at_root() {
        let tree = Tree::from_parent_indices(&[3, 3, 4, 4, -1], vec![1.0; 5]).expect("tree");
        let order = tree.postorder();
        assert_eq!(order.len(), 5);
        assert_eq!(order.last(), Some(&tree.root()));
        let position = |node: usize| order.iter().position(|&n| n == node).unwrap_or(usize::MAX);
        assert!(position(0) < position(3));
        assert!(position(3) < position(4));
    }

    #[test]
    fn rejects_multiple_roots() {
        let err = Tree::from_parent_indices(&[-1, -1], vec![0.0, 0.0]).expect_err("two roots");
        assert_eq!(err, TreeError::RootCount { found: 2 });
    }

    #[test]
    fn rejects_cycles() {
        let err = Tree::from_parent_indices(&[1, 0, -1], vec![1.0, 1.0, 0.0]).expect_err("cycle");
        assert!(matches!(err, TreeError::Cycle { .. }));
    }

    #[test]
    fn rejects_out_of_range_parent() {
        let err = Tree::from_parent_indices(&[5, -1], vec![1.0, 0.0]).expect_err("range");
        assert_eq!(
            err,
            TreeError::ParentOutOfRange {
                node: 0,
                parent: 5,
                len: 2
            }
        );
    }

    #[test]
    fn rejects_length_mismatch() {
        let err = Tree::from_parent_indices(&[-1], vec![0.0, 1.0]).expect_err("mismatch");
        assert_eq!(err, TreeError::LengthMismatch { parents: 1, dists: 2 });
    }

    #[test]
    fn species_depths_accumulate_from_root() {
        let stree = four_leaf_species();
        assert_relative_eq!(stree.depth(6), 0.0);
        assert_relative_eq!(stree.depth(4), 2.0);
        assert_relative_eq!(stree.depth(0), 3.0);
        assert_relative_eq!(stree.depth(3), 3.0);
    }

    #[test]
    fn lca_walks_to_shared_ancestor() {
        let stree = four_leaf_species();
        assert_eq!(stree.lca(0, 1), 4);
        assert_eq!(stree.lca(0, 3), 6);
        assert_eq!(stree.lca(2, 5), 5);
        assert!(stree.is_ancestor_or_self(6, 2));
        assert!(!stree.is_ancestor_or_self(4, 2));
    }
}
