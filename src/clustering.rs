//! # clustering
//!
//! `clustering` holds the k-means driver and the four pipelines that are
//! compared against each other:
//!
//!	* `VANILLA`: k-means on the raw feature matrix.
//!	* `PCA`: k-means on the principal components of the matrix.
//!	* `ECC`: k-means on the matrix with random parity bits appended.
//!	* `ECC+PCA`: parity bits first, then PCA, then k-means.
//!
//!	The driver configuration is fixed (k-means++ seeding, ten restarts,
//!	lowest inertia wins) so that the pipelines only differ in the features
//!	they hand to it.
use clap::ValueEnum;
use linfa::traits::{Fit, Predict};
use linfa::DatasetBase;
use linfa_clustering::{KMeans, KMeansInit};
use linfa_reduction::Pca;
use ndarray::{Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::ecc::{self, EccParams};
use crate::error::{Error, Result};

/// Number of independent k-means++ restarts per fit.
pub const N_RUNS: usize = 10;

/// k-means with a fixed configuration. Only `k` is exposed.
#[derive(Debug, Clone, Copy)]
pub struct KMeansDriver {
    n_clusters: usize,
}

impl KMeansDriver {
    pub fn new(n_clusters: usize) -> Self {
        KMeansDriver { n_clusters }
    }

    /// Fits k-means on the rows of `x` and returns one label in `0..k` per
    /// row.
    ///
    /// The solver gets its own generator seeded from `rng`, so a seeded
    /// caller gets reproducible labels.
    pub fn fit_predict<R: Rng + ?Sized>(&self, x: ArrayView2<f64>, rng: &mut R) -> Result<Vec<usize>> {
        let n = x.nrows();
        if n == 0 {
            return Err(Error::EmptyInput);
        }
        if self.n_clusters == 0 || self.n_clusters > n {
            return Err(Error::InvalidClusterCount {
                requested: self.n_clusters,
                n_items: n,
            });
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(Error::NonFinite);
        }

        let solver_rng = StdRng::seed_from_u64(rng.gen());
        let dataset = DatasetBase::from(x);
        let model: KMeans<f64, _> = KMeans::params_with_rng(self.n_clusters, solver_rng)
            .n_runs(N_RUNS)
            .init_method(KMeansInit::KMeansPlusPlus)
            .fit(&dataset)?;

        Ok(model.predict(&x).to_vec())
    }
}

/// Projects the centred rows of `x` onto its principal components.
///
/// At most `min(n, f)` components are kept; directions with zero variance
/// are dropped, so the output width depends on the data. Pairwise distances
/// between rows are unchanged.
pub fn pca_transform(x: ArrayView2<f64>) -> Result<Array2<f64>> {
    let components = x.nrows().min(x.ncols());
    if components == 0 {
        return Err(Error::EmptyInput);
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(Error::NonFinite);
    }

    let dataset = DatasetBase::from(x.to_owned());
    let pca: Pca<f64> = Pca::params(components).fit(&dataset)?;
    Ok(pca.predict(dataset.records()))
}

/// The compared pipelines, in reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize)]
pub enum Method {
    #[value(name = "raw")]
    #[serde(rename = "VANILLA")]
    Raw,
    #[value(name = "pca")]
    #[serde(rename = "PCA")]
    Pca,
    #[value(name = "ecc")]
    #[serde(rename = "ECC")]
    Ecc,
    #[value(name = "ecc-pca")]
    #[serde(rename = "ECC+PCA")]
    EccPca,
}

impl Method {
    /// Every method, in the order used by trials, summaries and plots.
    pub const ALL: [Method; 4] = [Method::Raw, Method::Pca, Method::Ecc, Method::EccPca];

    pub fn name(&self) -> &'static str {
        match self {
            Method::Raw => "VANILLA",
            Method::Pca => "PCA",
            Method::Ecc => "ECC",
            Method::EccPca => "ECC+PCA",
        }
    }

    /// Position of the method inside [`Method::ALL`].
    pub fn index(&self) -> usize {
        match self {
            Method::Raw => 0,
            Method::Pca => 1,
            Method::Ecc => 2,
            Method::EccPca => 3,
        }
    }

    /// The matrix this method hands to k-means.
    pub fn features<R: Rng + ?Sized>(
        &self,
        x: ArrayView2<f64>,
        params: &EccParams,
        rng: &mut R,
    ) -> Result<Array2<f64>> {
        match self {
            Method::Raw => Ok(x.to_owned()),
            Method::Pca => pca_transform(x),
            Method::Ecc => ecc::augment(x, params, rng),
            Method::EccPca => {
                let augmented = ecc::augment(x, params, rng)?;
                pca_transform(augmented.view())
            }
        }
    }

    /// Runs the full pipeline and returns the (unaligned) cluster ids.
    pub fn cluster<R: Rng + ?Sized>(
        &self,
        x: ArrayView2<f64>,
        n_clusters: usize,
        params: &EccParams,
        rng: &mut R,
    ) -> Result<Vec<usize>> {
        let features = self.features(x, params, rng)?;
        KMeansDriver::new(n_clusters).fit_predict(features.view(), rng)
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn two_groups() -> Array2<f64> {
        array![
            [0.0, 0.0],
            [0.1, 0.1],
            [0.2, 0.0],
            [10.0, 10.0],
            [10.1, 10.1],
            [9.9, 10.0],
        ]
    }

    #[test]
    fn test_fit_predict_separates_groups() {
        let mut rng = StdRng::seed_from_u64(42);
        let labels = KMeansDriver::new(2)
            .fit_predict(two_groups().view(), &mut rng)
            .unwrap();

        assert_eq!(labels.len(), 6);
        assert!(labels.iter().all(|&l| l < 2));
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[1], labels[2]);
        assert_eq!(labels[3], labels[4]);
        assert_eq!(labels[4], labels[5]);
        assert_ne!(labels[0], labels[3]);
    }

    #[test]
    fn test_fit_predict_rejects_bad_input() {
        let mut rng = StdRng::seed_from_u64(1);
        let x = two_groups();

        assert!(matches!(
            KMeansDriver::new(7).fit_predict(x.view(), &mut rng),
            Err(Error::InvalidClusterCount {
                requested: 7,
                n_items: 6
            })
        ));
        assert!(matches!(
            KMeansDriver::new(0).fit_predict(x.view(), &mut rng),
            Err(Error::InvalidClusterCount { .. })
        ));

        let mut bad = x.clone();
        bad[[2, 1]] = f64::NAN;
        assert!(matches!(
            KMeansDriver::new(2).fit_predict(bad.view(), &mut rng),
            Err(Error::NonFinite)
        ));

        let empty = Array2::<f64>::zeros((0, 2));
        assert!(matches!(
            KMeansDriver::new(1).fit_predict(empty.view(), &mut rng),
            Err(Error::EmptyInput)
        ));
    }

    #[test]
    fn test_pca_keeps_varying_components() {
        let x = two_groups();
        let projected = pca_transform(x.view()).unwrap();
        assert_eq!(projected.dim(), (6, 2));

        // Projection is centred.
        for col in projected.columns() {
            approx::assert_abs_diff_eq!(col.sum(), 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_method_features_shapes() {
        let mut rng = StdRng::seed_from_u64(9);
        let x = two_groups();
        let params = EccParams::new(3, 0.5);

        let dims: Vec<_> = Method::ALL
            .iter()
            .map(|m| m.features(x.view(), &params, &mut rng).unwrap().dim())
            .collect();
        assert_eq!(dims[0], (6, 2));
        assert_eq!(dims[1], (6, 2));
        assert_eq!(dims[2], (6, 5));
        // Parity columns may be constant or repeated, PCA drops those.
        assert_eq!(dims[3].0, 6);
        assert!(dims[3].1 >= 1 && dims[3].1 <= 5, "{:?}", dims[3]);
    }

    fn pairwise_distances(x: ArrayView2<f64>) -> Vec<f64> {
        let rows: Vec<_> = x.rows().into_iter().collect();
        let mut distances = Vec::new();
        for (i, a) in rows.iter().enumerate() {
            for b in &rows[i + 1..] {
                distances.push((a - b).mapv(|d| d * d).sum().sqrt());
            }
        }
        distances
    }

    #[test]
    fn test_pca_drops_flat_directions_and_keeps_distances() {
        // Rank one: two identical columns and a constant one.
        let x = array![[1.0, 1.0, 0.0], [1.0, 1.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0]];
        let projected = pca_transform(x.view()).unwrap();
        assert_eq!(projected.nrows(), 4);
        assert!(projected.ncols() <= 3);

        let before = pairwise_distances(x.view());
        let after = pairwise_distances(projected.view());
        for (b, a) in before.iter().zip(&after) {
            approx::assert_abs_diff_eq!(*b, *a, epsilon = 1e-6);
        }

        let groups = two_groups();
        let projected = pca_transform(groups.view()).unwrap();
        for (b, a) in pairwise_distances(groups.view())
            .iter()
            .zip(&pairwise_distances(projected.view()))
        {
            approx::assert_abs_diff_eq!(*b, *a, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_method_order_and_names() {
        let names: Vec<_> = Method::ALL.iter().map(Method::name).collect();
        assert_eq!(names, vec!["VANILLA", "PCA", "ECC", "ECC+PCA"]);
        for (i, method) in Method::ALL.iter().enumerate() {
            assert_eq!(method.index(), i);
        }
    }
}
