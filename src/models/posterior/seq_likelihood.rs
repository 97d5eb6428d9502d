//! Sequence likelihood of a gene tree.
//!
//! The sampler only needs a scalar log-likelihood of the aligned sequences
//! given the current branch lengths. [`HkyLikelihood`] provides it with
//! Felsenstein pruning under the HKY85 substitution model.

use crate::tree::Tree;

use super::types::SamplerError;

/// Log-likelihood of observed data given a gene tree with branch lengths.
pub trait SeqLikelihood {
    fn log_likelihood(&mut self, tree: &Tree) -> f64;
}

/// Aligned nucleotide sequences with HKY85 parameters.
///
/// `sequences[k]` belongs to the `k`-th gene leaf in ascending node-index
/// order. Characters other than `ACGT` (either case) are treated as missing.
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    pub sequences: Vec<Vec<u8>>,
    /// Equilibrium frequencies of `A`, `C`, `G`, `T`.
    pub background: [f64; 4],
    /// Expected transitions per transversion.
    pub ts_tv_ratio: f64,
}

impl Alignment {
    #[must_use]
    pub fn new(sequences: Vec<Vec<u8>>, background: [f64; 4], ts_tv_ratio: f64) -> Self {
        Self {
            sequences,
            background,
            ts_tv_ratio,
        }
    }

    /// Build from string sequences.
    #[must_use]
    pub fn from_strs(sequences: &[&str], background: [f64; 4], ts_tv_ratio: f64) -> Self {
        Self::new(
            sequences.iter().map(|seq| seq.as_bytes().to_vec()).collect(),
            background,
            ts_tv_ratio,
        )
    }

    /// Number of alignment columns.
    #[must_use]
    pub fn sites(&self) -> usize {
        self.sequences.first().map_or(0, Vec::len)
    }

    /// # Errors
    ///
    /// Returns `SamplerError` for ragged sequences, invalid frequencies, or an
    /// invalid ts/tv ratio.
    pub fn validate(&self) -> Result<(), SamplerError> {
        let expected = self.sites();
        if let Some((index, seq)) = self
            .sequences
            .iter()
            .enumerate()
            .find(|(_, seq)| seq.len() != expected)
        {
            return Err(SamplerError::RaggedAlignment {
                index,
                expected,
                found: seq.len(),
            });
        }
        if self
            .background
            .iter()
            .any(|&freq| !freq.is_finite() || freq <= 0.0)
        {
            return Err(SamplerError::InvalidBackgroundFrequencies);
        }
        if !self.ts_tv_ratio.is_finite() || self.ts_tv_ratio <= 0.0 {
            return Err(SamplerError::InvalidTsTvRatio(self.ts_tv_ratio));
        }
        Ok(())
    }
}

const A: usize = 0;
const C: usize = 1;
const G: usize = 2;
const T: usize = 3;

fn encode(base: u8) -> Option<usize> {
    match base.to_ascii_uppercase() {
        b'A' => Some(A),
        b'C' => Some(C),
        b'G' => Some(G),
        b'T' => Some(T),
        _ => None,
    }
}

const fn is_purine(state: usize) -> bool {
    state == A || state == G
}

/// HKY85 substitution model normalized to one expected substitution per
/// unit branch length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hky85 {
    freqs: [f64; 4],
    kappa: f64,
    beta: f64,
}

impl Hky85 {
    /// Model from background frequencies (normalized to sum to one) and a
    /// transition/transversion ratio.
    #[must_use]
    pub fn from_ts_tv_ratio(background: [f64; 4], ts_tv_ratio: f64) -> Self {
        let total: f64 = background.iter().sum();
        let freqs = background.map(|freq| freq / total);
        let purines = freqs[A] + freqs[G];
        let pyrimidines = freqs[C] + freqs[T];
        let within = freqs[A].mul_add(freqs[G], freqs[C] * freqs[T]);
        let kappa = ts_tv_ratio * purines * pyrimidines / within;
        let beta = 1.0 / (2.0 * kappa.mul_add(within, purines * pyrimidines));
        Self { freqs, kappa, beta }
    }

    #[must_use]
    pub const fn kappa(&self) -> f64 {
        self.kappa
    }

    #[must_use]
    pub const fn frequencies(&self) -> [f64; 4] {
        self.freqs
    }

    /// Closed-form transition probabilities `P(t)[from][to]`.
    #[must_use]
    pub fn transition_matrix(&self, time: f64) -> [[f64; 4]; 4] {
        let time = time.max(0.0);
        let purines = self.freqs[A] + self.freqs[G];
        let pyrimidines = self.freqs[C] + self.freqs[T];
        let decay = (-self.beta * time).exp();

        let mut matrix = [[0.0; 4]; 4];
        for (from, row) in matrix.iter_mut().enumerate() {
            for (to, entry) in row.iter_mut().enumerate() {
                let pi = self.freqs[to];
                let class = if is_purine(to) { purines } else { pyrimidines };
                let class_decay = (-self.beta * time * class.mul_add(self.kappa - 1.0, 1.0)).exp();
                *entry = if from == to {
                    pi + pi * (1.0 / class - 1.0) * decay + (class - pi) / class * class_decay
                } else if is_purine(from) == is_purine(to) {
                    pi + pi * (1.0 / class - 1.0) * decay - pi / class * class_decay
                } else {
                    pi * (1.0 - decay)
                };
            }
        }
        matrix
    }
}

/// Felsenstein pruning likelihood under HKY85.
#[derive(Debug, Clone)]
pub struct HkyLikelihood {
    states: Vec<Vec<Option<usize>>>,
    sites: usize,
    model: Hky85,
    partials: Vec<[f64; 4]>,
}

impl HkyLikelihood {
    /// # Errors
    ///
    /// Returns `SamplerError` if the alignment is invalid.
    pub fn new(alignment: &Alignment) -> Result<Self, SamplerError> {
        alignment.validate()?;
        let states = alignment
            .sequences
            .iter()
            .map(|seq| seq.iter().map(|&base| encode(base)).collect())
            .collect();
        Ok(Self {
            states,
            sites: alignment.sites(),
            model: Hky85::from_ts_tv_ratio(alignment.background, alignment.ts_tv_ratio),
            partials: Vec::new(),
        })
    }

    #[must_use]
    pub const fn model(&self) -> &Hky85 {
        &self.model
    }

    /// # Errors
    ///
    /// Returns `SamplerError::SequenceCount` unless there is one sequence per
    /// leaf of `tree`.
    pub fn check_tree(&self, tree: &Tree) -> Result<(), SamplerError> {
        let leaves = tree.leaves().len();
        if leaves == self.states.len() {
            Ok(())
        } else {
            Err(SamplerError::SequenceCount {
                leaves,
                sequences: self.states.len(),
            })
        }
    }
}

impl SeqLikelihood for HkyLikelihood {
    fn log_likelihood(&mut self, tree: &Tree) -> f64 {
        let order = tree.postorder();
        let matrices: Vec<[[f64; 4]; 4]> = (0..tree.len())
            .map(|node| self.model.transition_matrix(tree.dist(node)))
            .collect();
        let mut leaf_rows = vec![None; tree.len()];
        for (row, leaf) in tree.leaves().into_iter().enumerate() {
            leaf_rows[leaf] = Some(row);
        }
        self.partials.clear();
        self.partials.resize(tree.len(), [1.0; 4]);
        let freqs = self.model.frequencies();

        let mut total = 0.0;
        for site in 0..self.sites {
            let mut log_scale = 0.0;
            for &node in &order {
                if tree.is_leaf(node) {
                    let state = leaf_rows[node]
                        .and_then(|row| self.states.get(row))
                        .and_then(|states| states[site]);
                    self.partials[node] = match state {
                        Some(observed) => {
                            let mut partial = [0.0; 4];
                            partial[observed] = 1.0;
                            partial
                        }
                        None => [1.0; 4],
                    };
                    continue;
                }

                let mut partial = [1.0; 4];
                for &child in tree.children(node) {
                    let matrix = &matrices[child];
                    let below = self.partials[child];
                    for (value, row) in partial.iter_mut().zip(matrix) {
                        *value *= row.iter().zip(&below).map(|(p, l)| p * l).sum::<f64>();
                    }
                }
                let largest = partial.iter().copied().fold(0.0, f64::max);
                if largest > 0.0 {
                    for value in &mut partial {
                        *value /= largest;
                    }
                    log_scale += largest.ln();
                }
                self.partials[node] = partial;
            }

            let root = self.partials[tree.root()];
            let site_likelihood: f64 = freqs.iter().zip(&root).map(|(pi, l)| pi * l).sum();
            total += site_likelihood.ln() + log_scale;
        }
        total
    }
}
