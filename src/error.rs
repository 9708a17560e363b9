use thiserror::Error;

/// Errors returned by the generators, the clustering pipelines and the
/// statistics helpers.
#[derive(Debug, Error)]
pub enum Error {
    /// Input matrix or label slice is empty.
    #[error("empty input")]
    EmptyInput,

    /// Invalid parameter value.
    #[error("invalid parameter {name}: {message}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Human-readable explanation.
        message: String,
    },

    /// Requested cluster count is incompatible with the dataset.
    #[error("invalid cluster count: requested {requested}, but dataset has {n_items} items")]
    InvalidClusterCount { requested: usize, n_items: usize },

    /// Two inputs that must line up do not.
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    /// A label falls outside the shared `0..k` id space, so predicted and
    /// true partitions cannot be matched one to one.
    #[error("cluster count mismatch: labels must be below {expected}, found {found}")]
    ClusterCountMismatch { expected: usize, found: usize },

    #[error("input contains non-finite values")]
    NonFinite,

    #[error("statistics: {0}")]
    Statistics(String),

    #[error(transparent)]
    KMeans(#[from] linfa_clustering::KMeansError),

    #[error(transparent)]
    Reduction(#[from] linfa_reduction::ReductionError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn invalid(name: &'static str, message: impl Into<String>) -> Self {
        Error::InvalidParameter {
            name,
            message: message.into(),
        }
    }
}
