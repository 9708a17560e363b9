//! Synthetic datasets with known ground truth.
//!
//! The main generator is a stochastic block model: nodes are split into
//! blocks ("communities") and every unordered pair of distinct nodes is
//! joined with a probability that only depends on the blocks of its two
//! endpoints. The adjacency matrix doubles as the feature matrix handed to
//! the clustering pipelines, one row per node.
//!
//! Gaussian blobs are provided as a low-dimensional sanity check.
use ndarray::{Array2, Axis};
use ndarray_rand::rand_distr::{Normal, Uniform};
use ndarray_rand::RandomExt;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{Error, Result};

/// A feature matrix together with the ground-truth cluster of every row.
#[derive(Debug, Clone)]
pub struct SyntheticData {
    pub features: Array2<f64>,
    pub labels: Vec<usize>,
}

impl SyntheticData {
    /// Applies one random permutation to rows, columns and labels, so that
    /// node order no longer reveals the blocks.
    ///
    /// Only meaningful for square (adjacency) matrices.
    pub fn shuffled<R: Rng + ?Sized>(self, rng: &mut R) -> Self {
        let mut order: Vec<usize> = (0..self.labels.len()).collect();
        order.shuffle(rng);

        let features = self
            .features
            .select(Axis(0), &order)
            .select(Axis(1), &order);
        let labels = order.iter().map(|&i| self.labels[i]).collect();

        SyntheticData { features, labels }
    }
}

/// Block sizes plus the k×k matrix of edge probabilities between blocks.
#[derive(Debug, Clone)]
pub struct BlockModel {
    sizes: Vec<usize>,
    probabilities: Array2<f64>,
}

impl BlockModel {
    /// `k` blocks of near-equal size over `n` nodes, probability `p` inside
    /// a block and `q` across blocks.
    ///
    /// When `k` does not divide `n` the first `n % k` blocks get one extra
    /// node, so the model always has exactly `n` nodes.
    pub fn equal(n: usize, k: usize, p: f64, q: f64) -> Result<Self> {
        if k == 0 {
            return Err(Error::invalid("clusters", "must be positive"));
        }
        if k > n {
            return Err(Error::InvalidClusterCount {
                requested: k,
                n_items: n,
            });
        }
        check_probability("intra_prob", p)?;
        check_probability("inter_prob", q)?;

        let sizes = (0..k).map(|b| n / k + usize::from(b < n % k)).collect();
        let mut probabilities = Array2::from_elem((k, k), q);
        probabilities.diag_mut().fill(p);

        BlockModel::new(sizes, probabilities)
    }

    /// General block model. `probabilities` must be square, symmetric, of
    /// side `sizes.len()` and hold values in `[0, 1]`.
    pub fn new(sizes: Vec<usize>, probabilities: Array2<f64>) -> Result<Self> {
        let k = sizes.len();
        if k == 0 {
            return Err(Error::invalid("sizes", "at least one block is required"));
        }
        if probabilities.nrows() != k {
            return Err(Error::DimensionMismatch {
                expected: k,
                found: probabilities.nrows(),
            });
        }
        if probabilities.ncols() != k {
            return Err(Error::DimensionMismatch {
                expected: k,
                found: probabilities.ncols(),
            });
        }
        for &prob in probabilities.iter() {
            check_probability("probabilities", prob)?;
        }
        if probabilities != probabilities.t() {
            return Err(Error::invalid("probabilities", "matrix must be symmetric"));
        }

        Ok(BlockModel {
            sizes,
            probabilities,
        })
    }

    pub fn n_samples(&self) -> usize {
        self.sizes.iter().sum()
    }

    /// Contiguous ground truth: all of block 0, then block 1, ...
    pub fn labels(&self) -> Vec<usize> {
        self.sizes
            .iter()
            .enumerate()
            .flat_map(|(block, &size)| std::iter::repeat(block).take(size))
            .collect()
    }

    /// Draws a symmetric 0/1 adjacency matrix with an empty diagonal.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> SyntheticData {
        let labels = self.labels();
        let n = self.n_samples();
        let mut adjacency = Array2::zeros((n, n));

        for u in 0..n {
            for v in (u + 1)..n {
                if rng.gen_bool(self.probabilities[[labels[u], labels[v]]]) {
                    adjacency[[u, v]] = 1.0;
                    adjacency[[v, u]] = 1.0;
                }
            }
        }

        SyntheticData {
            features: adjacency,
            labels,
        }
    }
}

/// `n` points in the plane around `k` centres drawn uniformly from
/// `[-10, 10]²`, with isotropic Gaussian noise of standard deviation `std`.
pub fn gaussian_blobs<R: Rng + ?Sized>(
    n: usize,
    k: usize,
    std: f64,
    rng: &mut R,
) -> Result<SyntheticData> {
    if !std.is_finite() || std < 0.0 {
        return Err(Error::invalid("blob_std", "must be finite and non-negative"));
    }
    // Reuse the block layout so blob sizes match the SBM split.
    let labels = BlockModel::equal(n, k, 0.0, 0.0)?.labels();

    let centres = Array2::random_using((k, 2), Uniform::new(-10.0, 10.0), rng);
    let noise_dist = Normal::new(0.0, std).map_err(|e| Error::invalid("blob_std", e.to_string()))?;
    let noise = Array2::random_using((n, 2), noise_dist, rng);
    let features = centres.select(Axis(0), &labels) + noise;

    Ok(SyntheticData { features, labels })
}

fn check_probability(name: &'static str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::invalid(name, format!("{value} is not a probability")))
    }
}
