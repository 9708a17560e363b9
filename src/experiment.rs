//! Repeated comparisons of the clustering pipelines.
//!
//! A trial draws fresh data, runs every [`Method`] on it, aligns each
//! prediction against the ground truth and records accuracy and wall-clock
//! time. Trials are always recorded in [`Method::ALL`] order, and every
//! aggregate below indexes them the same way.
use std::time::{Duration, Instant};

use clap::{Args, ValueEnum};
use ndarray::ArrayView2;
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::alignment::{self, MajorityReport};
use crate::clustering::Method;
use crate::ecc::EccParams;
use crate::error::{Error, Result};
use crate::generate::{self, BlockModel, SyntheticData};
use crate::stats::{self, Anova, Summary};

/// Where the synthetic data of a trial comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    /// Stochastic block model adjacency matrix.
    Sbm,
    /// Gaussian blobs in the plane.
    Blobs,
}

/// Parameters shared by `compare` and `sweep`.
#[derive(Debug, Clone, Args, Serialize)]
pub struct ExperimentConfig {
    /// Number of samples (graph nodes)
    #[arg(short = 'n', long, default_value_t = 600)]
    pub samples: usize,

    /// Number of clusters k
    #[arg(short = 'k', long, default_value_t = 4)]
    pub clusters: usize,

    /// Edge probability inside a block
    #[arg(short = 'p', long, default_value_t = 0.01)]
    pub intra_prob: f64,

    /// Edge probability across blocks
    #[arg(short = 'q', long, default_value_t = 0.003)]
    pub inter_prob: f64,

    /// Number of parity coordinates T appended by ECC
    #[arg(short = 't', long, default_value_t = 60)]
    pub code_length: usize,

    /// Probability that a feature belongs to a random subset
    #[arg(short = 's', long, default_value_t = 0.5)]
    pub sample_ratio: f64,

    /// Number of repetitions
    #[arg(short = 'r', long, default_value_t = 50)]
    pub runs: usize,

    /// Synthetic data generator
    #[arg(long, value_enum, default_value_t = DataSource::Sbm)]
    pub source: DataSource,

    /// Standard deviation of the Gaussian blobs
    #[arg(long, default_value_t = 1.0)]
    pub blob_std: f64,

    /// Randomly permute node order of the block model
    #[arg(long)]
    pub shuffle: bool,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        ExperimentConfig {
            samples: 600,
            clusters: 4,
            intra_prob: 0.01,
            inter_prob: 0.003,
            code_length: 60,
            sample_ratio: 0.5,
            runs: 50,
            source: DataSource::Sbm,
            blob_std: 1.0,
            shuffle: false,
        }
    }
}

impl ExperimentConfig {
    pub fn ecc_params(&self) -> EccParams {
        EccParams::new(self.code_length, self.sample_ratio)
    }

    pub fn validate(&self) -> Result<()> {
        if self.runs == 0 {
            return Err(Error::invalid("runs", "must be positive"));
        }
        if self.clusters == 0 {
            return Err(Error::invalid("clusters", "must be positive"));
        }
        if self.clusters > self.samples {
            return Err(Error::InvalidClusterCount {
                requested: self.clusters,
                n_items: self.samples,
            });
        }
        self.ecc_params().validate()?;
        // Delegates probability and std checks to the generators.
        match self.source {
            DataSource::Sbm => BlockModel::equal(
                self.samples,
                self.clusters,
                self.intra_prob,
                self.inter_prob,
            )
            .map(|_| ()),
            DataSource::Blobs if !self.blob_std.is_finite() || self.blob_std < 0.0 => Err(
                Error::invalid("blob_std", "must be finite and non-negative"),
            ),
            DataSource::Blobs => Ok(()),
        }
    }

    /// Draws one dataset from the configured generator.
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<SyntheticData> {
        match self.source {
            DataSource::Sbm => {
                let data = BlockModel::equal(
                    self.samples,
                    self.clusters,
                    self.intra_prob,
                    self.inter_prob,
                )?
                .sample(rng);
                Ok(if self.shuffle { data.shuffled(rng) } else { data })
            }
            DataSource::Blobs => {
                generate::gaussian_blobs(self.samples, self.clusters, self.blob_std, rng)
            }
        }
    }
}

/// Outcome of one method on one dataset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metrics {
    pub method: Method,
    pub accuracy: f64,
    pub elapsed: Duration,
}

/// Runs every method on `x` and scores it against `truth`.
///
/// Elapsed time covers feature preparation, k-means and alignment.
pub fn evaluate_methods<R: Rng + ?Sized>(
    x: ArrayView2<f64>,
    truth: &[usize],
    n_clusters: usize,
    params: &EccParams,
    rng: &mut R,
) -> Result<Vec<Metrics>> {
    if x.nrows() != truth.len() {
        return Err(Error::DimensionMismatch {
            expected: truth.len(),
            found: x.nrows(),
        });
    }

    let mut metrics = Vec::with_capacity(Method::ALL.len());
    for method in Method::ALL {
        let tic = Instant::now();
        let predicted = method.cluster(x, n_clusters, params, rng)?;
        let aligned = alignment::align_labels(&predicted, truth, n_clusters)?;
        let accuracy = alignment::accuracy(&aligned.labels, truth);
        let elapsed = tic.elapsed();

        info!(
            "{method} took {:.3}s. accuracy={accuracy:.4}",
            elapsed.as_secs_f64()
        );
        debug!(
            "{method} mapping {:?}, confusion matrix:\n{}",
            aligned.mapping, aligned.confusion
        );
        for score in alignment::classification_report(&aligned.labels, truth, n_clusters)? {
            debug!(
                "{method} class {}: precision={:.3} recall={:.3} f1={:.3} support={}",
                score.class, score.precision, score.recall, score.f1, score.support
            );
        }

        metrics.push(Metrics {
            method,
            accuracy,
            elapsed,
        });
    }
    Ok(metrics)
}

/// One trial: fresh data, then [`evaluate_methods`].
pub fn run_trial<R: Rng + ?Sized>(config: &ExperimentConfig, rng: &mut R) -> Result<Vec<Metrics>> {
    let data = config.generate(rng)?;
    debug!(
        rows = data.features.nrows(),
        cols = data.features.ncols(),
        "generated {:?} data",
        config.source
    );
    evaluate_methods(
        data.features.view(),
        &data.labels,
        config.clusters,
        &config.ecc_params(),
        rng,
    )
}

/// All trials of a `compare` run.
#[derive(Debug, Clone)]
pub struct Comparison {
    pub config: ExperimentConfig,
    /// `trials[run][method.index()]`
    pub trials: Vec<Vec<Metrics>>,
    /// `None` when the test is undefined, e.g. every accuracy is identical.
    pub anova: Option<Anova>,
}

impl Comparison {
    pub fn accuracies(&self, method: Method) -> Vec<f64> {
        self.trials
            .iter()
            .map(|trial| trial[method.index()].accuracy)
            .collect()
    }

    pub fn seconds(&self, method: Method) -> Vec<f64> {
        self.trials
            .iter()
            .map(|trial| trial[method.index()].elapsed.as_secs_f64())
            .collect()
    }

    pub fn summary(&self, method: Method) -> Summary {
        stats::summarize(&self.accuracies(method))
    }
}

/// Runs `config.runs` trials and tests the accuracy distributions for a
/// difference in means.
pub fn compare<R: Rng + ?Sized>(config: &ExperimentConfig, rng: &mut R) -> Result<Comparison> {
    config.validate()?;

    let mut trials = Vec::with_capacity(config.runs);
    for run in 0..config.runs {
        info!("iter #{run}");
        trials.push(run_trial(config, rng)?);
    }

    let mut comparison = Comparison {
        config: config.clone(),
        trials,
        anova: None,
    };
    let groups: Vec<Vec<f64>> = Method::ALL
        .iter()
        .map(|&m| comparison.accuracies(m))
        .collect();
    comparison.anova = match stats::one_way_anova(&groups) {
        Ok(anova) => Some(anova),
        Err(e) => {
            warn!("skipping ANOVA: {e}");
            None
        }
    };

    Ok(comparison)
}

/// Aggregates for one code length of a sweep.
#[derive(Debug, Clone)]
pub struct SweepPoint {
    pub code_length: usize,
    /// Accuracy summary per method, in [`Method::ALL`] order.
    pub accuracy: Vec<Summary>,
    /// Wall-clock seconds summary per method, in [`Method::ALL`] order.
    pub seconds: Vec<Summary>,
}

#[derive(Debug, Clone)]
pub struct Sweep {
    pub config: ExperimentConfig,
    pub points: Vec<SweepPoint>,
}

/// Repeats [`compare`]-style trials for every code length in
/// `code_lengths`, keeping only mean and standard deviation.
pub fn sweep<R: Rng + ?Sized>(
    config: &ExperimentConfig,
    code_lengths: &[usize],
    rng: &mut R,
) -> Result<Sweep> {
    if code_lengths.is_empty() {
        return Err(Error::invalid("code_lengths", "at least one value is required"));
    }

    let mut points = Vec::with_capacity(code_lengths.len());
    for &code_length in code_lengths {
        let point_config = ExperimentConfig {
            code_length,
            ..config.clone()
        };
        point_config.validate()?;
        info!("code length T={code_length}");

        let mut trials = Vec::with_capacity(point_config.runs);
        for _ in 0..point_config.runs {
            trials.push(run_trial(&point_config, rng)?);
        }

        let column = |method: Method, f: fn(&Metrics) -> f64| -> Vec<f64> {
            trials.iter().map(|t| f(&t[method.index()])).collect()
        };
        points.push(SweepPoint {
            code_length,
            accuracy: Method::ALL
                .iter()
                .map(|&m| stats::summarize(&column(m, |x| x.accuracy)))
                .collect(),
            seconds: Method::ALL
                .iter()
                .map(|&m| stats::summarize(&column(m, |x| x.elapsed.as_secs_f64())))
                .collect(),
        });
    }

    Ok(Sweep {
        config: config.clone(),
        points,
    })
}

/// Result of running the pipelines on a labeled dataset.
#[derive(Debug, Clone)]
pub struct DatasetEvaluation {
    pub trials: Vec<Vec<Metrics>>,
    /// Majority-vote view of the last ECC clustering.
    pub report: MajorityReport,
}

/// Evaluates every method `runs` times on a fixed labeled matrix.
pub fn evaluate_dataset<R: Rng + ?Sized>(
    x: ArrayView2<f64>,
    truth: &[usize],
    n_clusters: usize,
    params: &EccParams,
    runs: usize,
    rng: &mut R,
) -> Result<DatasetEvaluation> {
    if runs == 0 {
        return Err(Error::invalid("runs", "must be positive"));
    }
    let mut trials = Vec::with_capacity(runs);
    for run in 0..runs {
        info!("iter #{run}");
        trials.push(evaluate_methods(x, truth, n_clusters, params, rng)?);
    }

    let predicted = Method::Ecc.cluster(x, n_clusters, params, rng)?;
    let report = alignment::majority_report(&predicted, truth, n_clusters)?;
    for cluster in &report.clusters {
        info!(
            "cluster {} represents label {} ({} members, purity {:.1}%)",
            cluster.cluster,
            cluster.majority_label,
            cluster.size,
            100.0 * cluster.purity()
        );
    }
    info!("overall majority accuracy: {:.4}", report.accuracy);

    Ok(DatasetEvaluation { trials, report })
}

/// Clusters an unlabeled matrix and returns the members of every cluster
/// id, empty ids included.
pub fn cluster_unlabeled<R: Rng + ?Sized>(
    x: ArrayView2<f64>,
    method: Method,
    n_clusters: usize,
    params: &EccParams,
    rng: &mut R,
) -> Result<Vec<Vec<usize>>> {
    let tic = Instant::now();
    let labels = method.cluster(x, n_clusters, params, rng)?;
    info!(
        "{method} clustered {} rows in {:.3}s",
        x.nrows(),
        tic.elapsed().as_secs_f64()
    );
    Ok(alignment::members_by_cluster(&labels, n_clusters))
}
