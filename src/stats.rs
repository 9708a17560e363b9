//! Aggregation of repeated trials.
use statrs::distribution::{ContinuousCDF, FisherSnedecor};
use statrs::statistics::Statistics;

use crate::error::{Error, Result};

/// Mean and population standard deviation of a sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub mean: f64,
    pub std: f64,
}

/// NaN for an empty slice.
pub fn summarize(values: &[f64]) -> Summary {
    Summary {
        mean: values.iter().mean(),
        std: values.iter().population_std_dev(),
    }
}

/// Outcome of a one-way analysis of variance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anova {
    pub statistic: f64,
    pub pvalue: f64,
    pub df_between: usize,
    pub df_within: usize,
}

/// One-way ANOVA: tests whether all groups share the same mean.
///
/// The p-value is `P(F > statistic)` under the F distribution with
/// `(groups - 1, observations - groups)` degrees of freedom.
pub fn one_way_anova(groups: &[Vec<f64>]) -> Result<Anova> {
    let k = groups.len();
    if k < 2 {
        return Err(Error::Statistics("ANOVA requires at least 2 groups".into()));
    }
    if let Some(i) = groups.iter().position(Vec::is_empty) {
        return Err(Error::Statistics(format!("group {i} is empty")));
    }

    let n_total: usize = groups.iter().map(Vec::len).sum();
    let df_between = k - 1;
    let df_within = n_total - k;
    if df_within == 0 {
        return Err(Error::Statistics(
            "not enough observations for within-group variance".into(),
        ));
    }

    let group_means: Vec<f64> = groups.iter().map(|g| g.iter().mean()).collect();
    let grand_mean = groups.iter().flatten().mean();

    // SSB = Σ n_i (ȳ_i - ȳ)²
    let ss_between: f64 = groups
        .iter()
        .zip(&group_means)
        .map(|(g, &m)| g.len() as f64 * (m - grand_mean).powi(2))
        .sum();
    // SSW = Σ Σ (y_ij - ȳ_i)²
    let ss_within: f64 = groups
        .iter()
        .zip(&group_means)
        .map(|(g, &m)| g.iter().map(|&y| (y - m).powi(2)).sum::<f64>())
        .sum();

    if ss_within <= f64::EPSILON * n_total as f64 {
        return Err(Error::Statistics(
            "within-group variance is zero, F statistic is undefined".into(),
        ));
    }

    let statistic = (ss_between / df_between as f64) / (ss_within / df_within as f64);
    let dist = FisherSnedecor::new(df_between as f64, df_within as f64)
        .map_err(|e| Error::Statistics(e.to_string()))?;

    Ok(Anova {
        statistic,
        pvalue: dist.sf(statistic),
        df_between,
        df_within,
    })
}
