//! Supervised discretization of continuous features.
//!
//! For each feature a shallow decision tree (entropy criterion, grown
//! best-first up to `max_bins` leaves) is fitted against the labels; its
//! split points become the bin thresholds. Bins are left-closed:
//! bin `k` holds values in `[thresholds[k-1], thresholds[k])`.

use crate::core::{Error, Result};
use crate::gnn::Matrix;
use serde::{Deserialize, Serialize};

/// Sorted split thresholds for every feature column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BinThresholds {
    per_feature: Vec<Vec<f32>>,
}

impl BinThresholds {
    /// Wrap explicit thresholds; each list is sorted and deduplicated.
    pub fn new(mut per_feature: Vec<Vec<f32>>) -> Result<Self> {
        for thresholds in &mut per_feature {
            if thresholds.iter().any(|t| !t.is_finite()) {
                return Err(Error::DataFormat("bin thresholds must be finite".to_string()));
            }
            thresholds.sort_by(f32::total_cmp);
            thresholds.dedup();
        }
        Ok(Self { per_feature })
    }

    pub fn num_features(&self) -> usize {
        self.per_feature.len()
    }

    pub fn feature(&self, index: usize) -> Option<&[f32]> {
        self.per_feature.get(index).map(Vec::as_slice)
    }

    /// Number of bins feature `index` is divided into.
    pub fn num_bins(&self, index: usize) -> Option<usize> {
        self.feature(index).map(|t| t.len() + 1)
    }
}

/// Bin of `value` given sorted `thresholds`: the count of thresholds `<= value`.
pub fn bin_index(value: f32, thresholds: &[f32]) -> u32 {
    thresholds.partition_point(|&t| t <= value) as u32
}

/// Discover per-feature thresholds from training data.
pub fn fit(x: &Matrix, y: &[u32], max_bins: usize) -> Result<BinThresholds> {
    if max_bins < 2 {
        return Err(Error::InvalidConfig(format!(
            "max_bins must be at least 2, got {max_bins}"
        )));
    }
    if y.len() != x.rows() {
        return Err(Error::ShapeMismatch {
            context: "binning labels vs rows",
            expected: x.rows(),
            actual: y.len(),
        });
    }
    if x.as_slice().iter().any(|v| !v.is_finite()) {
        return Err(Error::DataFormat(
            "binning input contains NaN or infinite values".to_string(),
        ));
    }

    let num_classes = y.iter().max().map_or(0, |&m| m as usize + 1);
    let per_feature = (0..x.cols())
        .map(|col| {
            let mut samples: Vec<(f32, u32)> =
                (0..x.rows()).map(|r| (x.get(r, col), y[r])).collect();
            samples.sort_by(|a, b| a.0.total_cmp(&b.0));
            grow_tree(&samples, num_classes, max_bins)
        })
        .collect();
    BinThresholds::new(per_feature)
}

/// Encode every value as its bin index (returned as `f32` so the result can
/// be used directly as model input).
pub fn apply(x: &Matrix, thresholds: &BinThresholds) -> Result<Matrix> {
    if x.cols() != thresholds.num_features() {
        return Err(Error::ShapeMismatch {
            context: "binning feature count",
            expected: thresholds.num_features(),
            actual: x.cols(),
        });
    }
    let mut out = Matrix::zeros(x.rows(), x.cols());
    for r in 0..x.rows() {
        for (c, t) in thresholds.per_feature.iter().enumerate() {
            out.set(r, c, bin_index(x.get(r, c), t) as f32);
        }
    }
    Ok(out)
}

/// A leaf over the sorted sample range `start..end` and its best split, if any.
struct Leaf {
    start: usize,
    end: usize,
    split: Option<Split>,
}

struct Split {
    /// First index of the right child
    position: usize,
    threshold: f32,
    /// Impurity decrease weighted by the leaf's share of all samples
    improvement: f64,
}

fn entropy(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / total;
            -p * p.log2()
        })
        .sum()
}

fn best_split(samples: &[(f32, u32)], start: usize, end: usize, num_classes: usize) -> Option<Split> {
    let n = end - start;
    let mut parent = vec![0usize; num_classes];
    for &(_, label) in &samples[start..end] {
        parent[label as usize] += 1;
    }
    let parent_entropy = entropy(&parent, n);
    if parent_entropy <= f64::EPSILON {
        return None;
    }

    let mut left = vec![0usize; num_classes];
    let mut best: Option<(usize, f64)> = None;
    for i in start + 1..end {
        left[samples[i - 1].1 as usize] += 1;
        if samples[i - 1].0 >= samples[i].0 {
            continue;
        }
        let right: Vec<usize> = parent.iter().zip(&left).map(|(p, l)| p - l).collect();
        let n_left = i - start;
        let n_right = end - i;
        let child = (n_left as f64 * entropy(&left, n_left)
            + n_right as f64 * entropy(&right, n_right))
            / n as f64;
        let gain = parent_entropy - child;
        if best.map_or(true, |(_, g)| gain > g) {
            best = Some((i, gain));
        }
    }

    best.map(|(position, gain)| Split {
        position,
        threshold: midpoint(samples[position - 1].0, samples[position].0),
        improvement: gain * n as f64 / samples.len() as f64,
    })
}

/// Threshold between two distinct sorted values `a < b`. Computed in f64 so
/// large inputs cannot overflow; always strictly above `a`.
fn midpoint(a: f32, b: f32) -> f32 {
    let mid = ((f64::from(a) + f64::from(b)) / 2.0) as f32;
    if mid <= a {
        b
    } else {
        mid
    }
}

fn grow_tree(samples: &[(f32, u32)], num_classes: usize, max_leaves: usize) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }
    let mut leaves = vec![Leaf {
        start: 0,
        end: samples.len(),
        split: best_split(samples, 0, samples.len(), num_classes),
    }];
    let mut thresholds = Vec::new();

    while leaves.len() < max_leaves {
        let Some(idx) = leaves
            .iter()
            .enumerate()
            .filter_map(|(i, leaf)| leaf.split.as_ref().map(|s| (i, s.improvement)))
            .fold(None, |best: Option<(usize, f64)>, (i, imp)| match best {
                Some((_, b)) if b >= imp => best,
                _ => Some((i, imp)),
            })
            .map(|(i, _)| i)
        else {
            break;
        };

        let leaf = leaves.swap_remove(idx);
        let Some(split) = leaf.split else {
            break;
        };
        thresholds.push(split.threshold);
        for (start, end) in [(leaf.start, split.position), (split.position, leaf.end)] {
            leaves.push(Leaf {
                start,
                end,
                split: best_split(samples, start, end, num_classes),
            });
        }
    }
    thresholds
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fraud for amounts >= 100; age carries a weaker signal.
    fn sample_data() -> (Matrix, Vec<u32>) {
        let x = Matrix::from_rows(
            &[
                vec![10.0, 25.0],
                vec![20.0, 30.0],
                vec![50.0, 22.0],
                vec![100.0, 40.0],
                vec![150.0, 50.0],
                vec![200.0, 35.0],
            ],
            2,
        )
        .unwrap();
        (x, vec![0, 0, 0, 1, 1, 1])
    }

    #[test]
    fn test_split_threshold_for_extreme_values() {
        let x = Matrix::from_rows(&[vec![3e38], vec![3.3e38]], 1).unwrap();
        let bins = fit(&x, &[0, 1], 2).unwrap();
        let t = bins.feature(0).unwrap();
        assert_eq!(t.len(), 1);
        assert!(t[0].is_finite());
        assert_eq!(bin_index(3e38, t), 0);
        assert_eq!(bin_index(3.3e38, t), 1);

        let a = 1.0f32;
        let b = f32::from_bits(a.to_bits() + 1);
        let x = Matrix::from_rows(&[vec![a], vec![b]], 1).unwrap();
        let bins = fit(&x, &[0, 1], 2).unwrap();
        let t = bins.feature(0).unwrap();
        assert_eq!(bin_index(a, t), 0);
        assert_eq!(bin_index(b, t), 1);
    }

    #[test]
    fn test_fit_finds_fraud_split() {
        let (x, y) = sample_data();
        let bins = fit(&x, &y, 2).unwrap();
        let amount = bins.feature(0).unwrap();
        assert_eq!(amount.len(), 1);
        assert!(amount[0] > 50.0 && amount[0] < 100.0);
        assert_eq!(amount[0], 75.0);
    }

    #[test]
    fn test_apply_manual_thresholds() {
        let (x, _) = sample_data();
        let bins = BinThresholds::new(vec![vec![75.0], vec![37.5]]).unwrap();
        let encoded = apply(&x, &bins).unwrap();

        let amount: Vec<f32> = (0..6).map(|r| encoded.get(r, 0)).collect();
        assert_eq!(amount, vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let age: Vec<f32> = (0..6).map(|r| encoded.get(r, 1)).collect();
        assert_eq!(age, vec![0.0, 0.0, 0.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_left_closed_bins() {
        let t = [1.0, 2.0];
        assert_eq!(bin_index(0.5, &t), 0);
        assert_eq!(bin_index(1.0, &t), 1);
        assert_eq!(bin_index(1.99, &t), 1);
        assert_eq!(bin_index(2.0, &t), 2);
    }

    #[test]
    fn test_pure_feature_has_no_thresholds() {
        let x = Matrix::from_rows(&[vec![1.0], vec![2.0], vec![3.0]], 1).unwrap();
        let bins = fit(&x, &[1, 1, 1], 4).unwrap();
        assert!(bins.feature(0).unwrap().is_empty());
        assert_eq!(bins.num_bins(0), Some(1));
    }

    #[test]
    fn test_max_bins_limits_leaves() {
        let rows: Vec<Vec<f32>> = (0..20).map(|i| vec![i as f32]).collect();
        let y: Vec<u32> = (0..20).map(|i| (i / 2 % 2) as u32).collect();
        let x = Matrix::from_rows(&rows, 1).unwrap();
        for max_bins in 2..6 {
            let bins = fit(&x, &y, max_bins).unwrap();
            assert!(bins.feature(0).unwrap().len() <= max_bins - 1);
        }
    }

    #[test]
    fn test_rejects_bad_input() {
        let (x, y) = sample_data();
        assert!(matches!(fit(&x, &y, 1), Err(Error::InvalidConfig(_))));
        assert!(fit(&x, &y[..3], 2).is_err());
        let nan = Matrix::from_rows(&[vec![f32::NAN]], 1).unwrap();
        assert!(fit(&nan, &[0], 2).is_err());
        let wrong = BinThresholds::new(vec![vec![1.0]]).unwrap();
        assert!(apply(&x, &wrong).is_err());
    }
}
