//! Matching predicted cluster ids to ground-truth labels.
//!
//! Clustering returns an unordered partition: cluster 0 of one run has no
//! relation to cluster 0 of the next. Before two runs can be compared
//! against the same ground truth, predicted ids are renamed through a
//! bijection that pairs ids with high co-occurrence, found with the
//! Hungarian algorithm on the cost matrix `1 / (1 + C)` where `C` is the
//! confusion matrix.
use ndarray::Array2;

use crate::error::{Error, Result};

/// Result of [`align_labels`].
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    /// Predicted labels renamed into the ground-truth id space.
    pub labels: Vec<usize>,
    /// `mapping[predicted] == true id`.
    pub mapping: Vec<usize>,
    /// `confusion[[true, predicted]]` co-occurrence counts, before renaming.
    pub confusion: Array2<usize>,
}

/// k×k contingency table with true labels on rows and predicted labels on
/// columns.
pub fn confusion_matrix(predicted: &[usize], truth: &[usize], k: usize) -> Result<Array2<usize>> {
    check_labels(predicted, truth, k)?;

    let mut confusion = Array2::zeros((k, k));
    for (&p, &t) in predicted.iter().zip(truth.iter()) {
        confusion[[t, p]] += 1;
    }
    Ok(confusion)
}

/// Renames `predicted` into the id space of `truth`.
///
/// Both label slices must use ids below `k`. A label outside that range
/// means the two partitions do not have the same number of clusters, which
/// is reported as [`Error::ClusterCountMismatch`] rather than producing a
/// partial mapping.
pub fn align_labels(predicted: &[usize], truth: &[usize], k: usize) -> Result<Alignment> {
    let confusion = confusion_matrix(predicted, truth, k)?;
    let cost = confusion.mapv(|c| 1.0 / (1.0 + c as f64));

    // assignment[true] = predicted
    let assignment = min_cost_assignment(&cost);
    let mut mapping = vec![0; k];
    for (true_id, &predicted_id) in assignment.iter().enumerate() {
        mapping[predicted_id] = true_id;
    }

    let labels = predicted.iter().map(|&p| mapping[p]).collect();
    Ok(Alignment {
        labels,
        mapping,
        confusion,
    })
}

/// Fraction of positions where both label slices agree.
pub fn accuracy(predicted: &[usize], truth: &[usize]) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    let correct = predicted
        .iter()
        .zip(truth.iter())
        .filter(|(p, t)| p == t)
        .count();
    correct as f64 / truth.len() as f64
}

/// Members of every cluster id in `0..k`, indexed by id. Ids with no
/// member get an empty list.
pub fn members_by_cluster(labels: &[usize], k: usize) -> Vec<Vec<usize>> {
    let mut members = vec![Vec::new(); k];
    for (i, &label) in labels.iter().enumerate() {
        if let Some(cluster) = members.get_mut(label) {
            cluster.push(i);
        }
    }
    members
}

/// Solves the square assignment problem, minimising the total cost.
///
/// Returns `assignment` with `assignment[row] = column`. This is the
/// O(n³) shortest augmenting path formulation with row and column
/// potentials. Ties go to the lowest column index scanned first.
pub fn min_cost_assignment(cost: &Array2<f64>) -> Vec<usize> {
    let n = cost.nrows();
    debug_assert_eq!(n, cost.ncols());

    // 1-based: index 0 is the virtual start column/row.
    let mut row_pot = vec![0.0; n + 1];
    let mut col_pot = vec![0.0; n + 1];
    let mut col_owner = vec![0usize; n + 1];
    let mut way = vec![0usize; n + 1];

    for row in 1..=n {
        col_owner[0] = row;
        let mut col = 0;
        let mut min_slack = vec![f64::INFINITY; n + 1];
        let mut used = vec![false; n + 1];

        loop {
            used[col] = true;
            let owner = col_owner[col];
            let mut delta = f64::INFINITY;
            let mut next_col = 0;

            for j in 1..=n {
                if used[j] {
                    continue;
                }
                let slack = cost[[owner - 1, j - 1]] - row_pot[owner] - col_pot[j];
                if slack < min_slack[j] {
                    min_slack[j] = slack;
                    way[j] = col;
                }
                if min_slack[j] < delta {
                    delta = min_slack[j];
                    next_col = j;
                }
            }

            for j in 0..=n {
                if used[j] {
                    row_pot[col_owner[j]] += delta;
                    col_pot[j] -= delta;
                } else {
                    min_slack[j] -= delta;
                }
            }

            col = next_col;
            if col_owner[col] == 0 {
                break;
            }
        }

        // Flip the augmenting path.
        loop {
            let prev = way[col];
            col_owner[col] = col_owner[prev];
            col = prev;
            if col == 0 {
                break;
            }
        }
    }

    let mut assignment = vec![0; n];
    for j in 1..=n {
        if col_owner[j] != 0 {
            assignment[col_owner[j] - 1] = j - 1;
        }
    }
    assignment
}

/// One predicted cluster, described by its dominant ground-truth label.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSummary {
    pub cluster: usize,
    pub size: usize,
    pub majority_label: usize,
    pub majority_count: usize,
}

impl ClusterSummary {
    pub fn purity(&self) -> f64 {
        self.majority_count as f64 / self.size as f64
    }
}

/// Majority-vote view of a clustering: each non-empty cluster stands for
/// its most frequent true label.
#[derive(Debug, Clone, PartialEq)]
pub struct MajorityReport {
    pub clusters: Vec<ClusterSummary>,
    /// Samples whose true label differs from their cluster's majority label.
    pub misclassified: Vec<usize>,
    pub accuracy: f64,
}

/// Builds a [`MajorityReport`]. Several clusters may share a majority
/// label, unlike [`align_labels`]. Empty clusters are skipped.
pub fn majority_report(predicted: &[usize], truth: &[usize], k: usize) -> Result<MajorityReport> {
    let confusion = confusion_matrix(predicted, truth, k)?;
    let members = members_by_cluster(predicted, k);

    let mut clusters = Vec::new();
    let mut misclassified = Vec::new();
    let mut correct = 0;

    for (cluster, member_ids) in members.iter().enumerate() {
        if member_ids.is_empty() {
            continue;
        }
        let column = confusion.column(cluster);
        let mut majority_label = 0;
        for (label, &count) in column.iter().enumerate() {
            if count > column[majority_label] {
                majority_label = label;
            }
        }
        let majority_count = column[majority_label];
        correct += majority_count;

        misclassified.extend(member_ids.iter().copied().filter(|&i| truth[i] != majority_label));
        clusters.push(ClusterSummary {
            cluster,
            size: member_ids.len(),
            majority_label,
            majority_count,
        });
    }
    misclassified.sort_unstable();

    Ok(MajorityReport {
        clusters,
        misclassified,
        accuracy: correct as f64 / truth.len() as f64,
    })
}

/// Per-class precision, recall and F1 of an aligned labelling.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassScore {
    pub class: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

pub fn classification_report(predicted: &[usize], truth: &[usize], k: usize) -> Result<Vec<ClassScore>> {
    let confusion = confusion_matrix(predicted, truth, k)?;

    Ok((0..k)
        .map(|class| {
            let tp = confusion[[class, class]] as f64;
            let predicted_total = confusion.column(class).sum() as f64;
            let support = confusion.row(class).sum();
            let precision = ratio(tp, predicted_total);
            let recall = ratio(tp, support as f64);
            let f1 = ratio(2.0 * precision * recall, precision + recall);
            ClassScore {
                class,
                precision,
                recall,
                f1,
                support,
            }
        })
        .collect())
}

fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}

fn check_labels(predicted: &[usize], truth: &[usize], k: usize) -> Result<()> {
    if truth.is_empty() {
        return Err(Error::EmptyInput);
    }
    if predicted.len() != truth.len() {
        return Err(Error::DimensionMismatch {
            expected: truth.len(),
            found: predicted.len(),
        });
    }
    if let Some(&found) = predicted.iter().chain(truth.iter()).find(|&&l| l >= k) {
        return Err(Error::ClusterCountMismatch { expected: k, found });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Axis};
    use proptest::prelude::*;

    #[test]
    fn test_confusion_matrix() {
        let truth = vec![0, 0, 1, 1, 2, 2];
        let predicted = vec![0, 1, 1, 1, 2, 0];
        let cm = confusion_matrix(&predicted, &truth, 3).unwrap();
        assert_eq!(cm, array![[1, 1, 0], [0, 2, 0], [1, 0, 1]]);
    }

    #[test]
    fn test_min_cost_assignment() {
        let cost = array![[4.0, 1.0, 3.0], [2.0, 0.0, 5.0], [3.0, 2.0, 2.0]];
        assert_eq!(min_cost_assignment(&cost), vec![1, 0, 2]);
    }

    #[test]
    fn test_min_cost_assignment_prefers_off_diagonal() {
        let cost = array![[9.0, 1.0], [1.0, 9.0]];
        assert_eq!(min_cost_assignment(&cost), vec![1, 0]);
        assert!(min_cost_assignment(&Array2::zeros((0, 0))).is_empty());
    }

    #[test]
    fn test_align_identity() {
        let truth = vec![0, 0, 1, 1, 2, 2, 3];
        let aligned = align_labels(&truth, &truth, 4).unwrap();
        assert_eq!(aligned.mapping, vec![0, 1, 2, 3]);
        assert_eq!(aligned.labels, truth);
        assert_eq!(accuracy(&aligned.labels, &truth), 1.0);
    }

    #[test]
    fn test_align_permuted_labels() {
        let truth = vec![0, 0, 0, 1, 1, 1, 2, 2, 2];
        let predicted = vec![2, 2, 2, 0, 0, 0, 1, 1, 1];
        let aligned = align_labels(&predicted, &truth, 3).unwrap();

        assert_eq!(aligned.mapping, vec![1, 2, 0]);
        assert_eq!(aligned.labels, truth);
    }

    #[test]
    fn test_align_noisy_labels() {
        let truth = vec![0, 0, 0, 0, 1, 1, 1, 1];
        let predicted = vec![1, 1, 1, 0, 0, 0, 0, 1];
        let aligned = align_labels(&predicted, &truth, 2).unwrap();

        assert_eq!(aligned.mapping, vec![1, 0]);
        assert_eq!(accuracy(&aligned.labels, &truth), 0.75);
    }

    #[test]
    fn test_align_rejects_mismatched_cluster_counts() {
        let truth = vec![0, 0, 1, 1];
        let predicted = vec![0, 1, 2, 2];
        assert!(matches!(
            align_labels(&predicted, &truth, 2),
            Err(Error::ClusterCountMismatch {
                expected: 2,
                found: 2
            })
        ));
        assert!(matches!(
            align_labels(&[0, 1], &truth, 2),
            Err(Error::DimensionMismatch {
                expected: 4,
                found: 2
            })
        ));
        assert!(matches!(align_labels(&[], &[], 2), Err(Error::EmptyInput)));
    }

    #[test]
    fn test_align_with_unused_cluster_id() {
        let truth = vec![0, 0, 1, 1, 2, 2];
        let predicted = vec![1, 1, 0, 0, 0, 0];
        let aligned = align_labels(&predicted, &truth, 3).unwrap();

        let mut mapping = aligned.mapping.clone();
        mapping.sort_unstable();
        assert_eq!(mapping, vec![0, 1, 2]);
        assert_eq!(accuracy(&aligned.labels, &truth), 4.0 / 6.0);
    }

    #[test]
    fn test_members_by_cluster() {
        let members = members_by_cluster(&[2, 0, 2, 0], 4);
        assert_eq!(members, vec![vec![1, 3], vec![], vec![0, 2], vec![]]);
    }

    #[test]
    fn test_majority_report() {
        let truth = vec![0, 0, 0, 1, 1, 1];
        let predicted = vec![2, 2, 0, 0, 0, 0];
        let report = majority_report(&predicted, &truth, 3).unwrap();

        assert_eq!(report.clusters.len(), 2);
        assert_eq!(report.clusters[0].cluster, 0);
        assert_eq!(report.clusters[0].majority_label, 1);
        assert_eq!(report.clusters[0].size, 4);
        assert_eq!(report.clusters[0].purity(), 0.75);
        assert_eq!(report.clusters[1].cluster, 2);
        assert_eq!(report.clusters[1].majority_label, 0);
        assert_eq!(report.misclassified, vec![2]);
        approx::assert_abs_diff_eq!(report.accuracy, 5.0 / 6.0);
    }

    #[test]
    fn test_classification_report() {
        let truth = vec![0, 0, 1, 1];
        let predicted = vec![0, 1, 1, 1];
        let scores = classification_report(&predicted, &truth, 2).unwrap();

        assert_eq!(scores[0].precision, 1.0);
        assert_eq!(scores[0].recall, 0.5);
        approx::assert_abs_diff_eq!(scores[0].f1, 2.0 / 3.0);
        assert_eq!(scores[1].precision, 2.0 / 3.0);
        assert_eq!(scores[1].recall, 1.0);
        assert_eq!(scores[1].support, 2);
    }

    proptest! {
        #[test]
        fn prop_confusion_sums(
            pairs in prop::collection::vec((0usize..4, 0usize..4), 1..60)
        ) {
            let (predicted, truth): (Vec<usize>, Vec<usize>) = pairs.into_iter().unzip();
            let cm = confusion_matrix(&predicted, &truth, 4).unwrap();

            prop_assert_eq!(cm.sum(), truth.len());
            for (class, row_sum) in cm.sum_axis(Axis(1)).iter().enumerate() {
                prop_assert_eq!(*row_sum, truth.iter().filter(|&&t| t == class).count());
            }
            for (class, col_sum) in cm.sum_axis(Axis(0)).iter().enumerate() {
                prop_assert_eq!(*col_sum, predicted.iter().filter(|&&p| p == class).count());
            }
        }

        #[test]
        fn prop_alignment_is_a_bijection(
            pairs in prop::collection::vec((0usize..3, 0usize..3), 1..40)
        ) {
            let (predicted, truth): (Vec<usize>, Vec<usize>) = pairs.into_iter().unzip();
            let aligned = align_labels(&predicted, &truth, 3).unwrap();

            let mut seen = aligned.mapping.clone();
            seen.sort_unstable();
            prop_assert_eq!(seen, vec![0, 1, 2]);
            for (&p, &q) in predicted.iter().zip(aligned.labels.iter()) {
                prop_assert_eq!(aligned.mapping[p], q);
            }
        }
    }
}
