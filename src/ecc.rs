//! Randomised parity-bit feature augmentation ("ECC").
//!
//! Each of the `T` extra coordinates is the parity of a sample's features
//! summed over a random subset of the feature columns:
//!
//! ```text
//! X' = [ X | (X · R) mod m ]      R ∈ {0,1}^(f×T), R_ij ~ Bernoulli(s)
//! ```
//!
//! With binary features and `m = 2` the appended block is 0/1 and is a
//! linear function of X over GF(2). It is not an error-correcting code in
//! the coding-theory sense; the name is historical.
use ndarray::{concatenate, Array2, ArrayView2, Axis};
use ndarray_rand::rand_distr::Bernoulli;
use ndarray_rand::RandomExt;
use rand::Rng;

use crate::error::{Error, Result};

/// Parameters of the augmentation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EccParams {
    /// Number of parity coordinates `T` appended to every row.
    pub code_length: usize,
    /// Probability `s` that a feature column belongs to a given subset.
    pub success_prob: f64,
    /// Reduction modulus, 2 for parity bits.
    pub modulus: f64,
}

impl EccParams {
    pub fn new(code_length: usize, success_prob: f64) -> Self {
        EccParams {
            code_length,
            success_prob,
            modulus: 2.0,
        }
    }

    pub fn with_modulus(mut self, modulus: f64) -> Self {
        self.modulus = modulus;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.code_length == 0 {
            return Err(Error::invalid("code_length", "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.success_prob) {
            return Err(Error::invalid(
                "sample_ratio",
                format!("{} is not a probability", self.success_prob),
            ));
        }
        if !self.modulus.is_finite() || self.modulus <= 0.0 {
            return Err(Error::invalid("modulus", "must be finite and positive"));
        }
        Ok(())
    }
}

/// Draws the `features × T` matrix of random subsets.
pub fn draw_subsets<R: Rng + ?Sized>(
    features: usize,
    params: &EccParams,
    rng: &mut R,
) -> Result<Array2<f64>> {
    params.validate()?;
    let bits = Bernoulli::new(params.success_prob)
        .map_err(|e| Error::invalid("sample_ratio", e.to_string()))?;
    Ok(Array2::random_using((features, params.code_length), bits, rng)
        .mapv(|b| if b { 1.0 } else { 0.0 }))
}

/// `(X · R) mod modulus`, using the Euclidean remainder so that every entry
/// lands in `[0, modulus)`.
pub fn parity_bits(x: ArrayView2<f64>, subsets: ArrayView2<f64>, modulus: f64) -> Result<Array2<f64>> {
    if x.ncols() != subsets.nrows() {
        return Err(Error::DimensionMismatch {
            expected: subsets.nrows(),
            found: x.ncols(),
        });
    }
    Ok(x.dot(&subsets).mapv(|v| v.rem_euclid(modulus)))
}

/// Appends `T` parity coordinates to every row of `x`.
///
/// A fresh subset matrix is drawn from `rng` on every call.
pub fn augment<R: Rng + ?Sized>(
    x: ArrayView2<f64>,
    params: &EccParams,
    rng: &mut R,
) -> Result<Array2<f64>> {
    if x.nrows() == 0 {
        return Err(Error::EmptyInput);
    }
    let subsets = draw_subsets(x.ncols(), params, rng)?;
    let parity = parity_bits(x, subsets.view(), params.modulus)?;
    tracing::trace!(
        rows = x.nrows(),
        features = x.ncols(),
        code_length = params.code_length,
        "augmented feature matrix"
    );
    concatenate(Axis(1), &[x.view(), parity.view()]).map_err(|_| Error::DimensionMismatch {
        expected: x.nrows(),
        found: parity.nrows(),
    })
}
