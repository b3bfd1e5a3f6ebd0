//! Masked cross-entropy loss and accuracy.

use crate::core::{argmax, Error, Result};
use crate::gnn::matrix::Matrix;

/// Mean loss over the selected rows and its gradient w.r.t. every logit.
#[derive(Clone, Debug)]
pub struct LossOutput {
    pub loss: f32,
    /// `N x C`; rows outside the mask are zero
    pub grad_logits: Matrix,
}

fn check_lengths(logits: &Matrix, labels: &[u32], mask: &[bool]) -> Result<()> {
    if labels.len() != logits.rows() {
        return Err(Error::ShapeMismatch {
            context: "labels vs logit rows",
            expected: logits.rows(),
            actual: labels.len(),
        });
    }
    if mask.len() != logits.rows() {
        return Err(Error::ShapeMismatch {
            context: "mask vs logit rows",
            expected: logits.rows(),
            actual: mask.len(),
        });
    }
    Ok(())
}

/// Softmax cross-entropy averaged over rows where `mask` is set.
pub fn cross_entropy(logits: &Matrix, labels: &[u32], mask: &[bool]) -> Result<LossOutput> {
    check_lengths(logits, labels, mask)?;
    let count = mask.iter().filter(|&&m| m).count();
    if count == 0 {
        return Err(Error::EmptyMask("loss"));
    }

    let classes = logits.cols();
    let scale = 1.0 / count as f32;
    let mut grad_logits = Matrix::zeros(logits.rows(), classes);
    let mut total = 0.0f32;

    for (i, (&label, &m)) in labels.iter().zip(mask).enumerate() {
        if !m {
            continue;
        }
        if label as usize >= classes {
            return Err(Error::InvalidLabel {
                node: i,
                label,
                num_classes: classes,
            });
        }
        let row = logits.row(i);
        let max = row.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let sum_exp: f32 = row.iter().map(|&z| (z - max).exp()).sum();
        let log_sum = max + sum_exp.ln();
        total += log_sum - row[label as usize];

        let grad = grad_logits.row_mut(i);
        for (c, (g, &z)) in grad.iter_mut().zip(row).enumerate() {
            let p = (z - log_sum).exp();
            let target = if c == label as usize { 1.0 } else { 0.0 };
            *g = (p - target) * scale;
        }
    }

    Ok(LossOutput {
        loss: total * scale,
        grad_logits,
    })
}

/// Fraction of masked rows whose argmax equals the label; `None` for an empty mask.
pub fn accuracy(logits: &Matrix, labels: &[u32], mask: &[bool]) -> Result<Option<f32>> {
    check_lengths(logits, labels, mask)?;
    let mut total = 0usize;
    let mut correct = 0usize;
    for (i, (&label, &m)) in labels.iter().zip(mask).enumerate() {
        if !m {
            continue;
        }
        total += 1;
        if argmax(logits.row(i)) == label as usize {
            correct += 1;
        }
    }
    Ok((total > 0).then(|| correct as f32 / total as f32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_logits_loss() {
        let logits = Matrix::zeros(2, 2);
        let out = cross_entropy(&logits, &[0, 1], &[true, true]).unwrap();
        assert!((out.loss - 2f32.ln()).abs() < 1e-5);
        // softmax 0.5 each; grad = (0.5 - onehot) / 2
        let expected = [-0.25, 0.25, 0.25, -0.25];
        for (g, e) in out.grad_logits.as_slice().iter().zip(expected) {
            assert!((g - e).abs() < 1e-6);
        }
    }

    #[test]
    fn test_mask_excludes_rows() {
        let logits = Matrix::from_vec(2, 2, vec![5.0, -5.0, 100.0, -100.0]).unwrap();
        let out = cross_entropy(&logits, &[0, 1], &[true, false]).unwrap();
        assert!(out.loss < 1e-3);
        assert_eq!(out.grad_logits.row(1), &[0.0, 0.0]);
    }

    #[test]
    fn test_gradient_rows_sum_to_zero() {
        let logits = Matrix::from_vec(2, 3, vec![0.3, -1.2, 2.0, 1.0, 1.0, 0.0]).unwrap();
        let out = cross_entropy(&logits, &[2, 0], &[true, true]).unwrap();
        for i in 0..2 {
            let s: f32 = out.grad_logits.row(i).iter().sum();
            assert!(s.abs() < 1e-6);
        }
    }

    #[test]
    fn test_stable_for_large_logits() {
        let logits = Matrix::from_vec(1, 2, vec![1000.0, 0.0]).unwrap();
        let out = cross_entropy(&logits, &[1], &[true]).unwrap();
        assert!(out.loss.is_finite());
        assert!((out.loss - 1000.0).abs() < 1e-2);
    }

    #[test]
    fn test_empty_mask_is_an_error() {
        let logits = Matrix::zeros(2, 2);
        let err = cross_entropy(&logits, &[0, 1], &[false, false]).unwrap_err();
        assert!(matches!(err, Error::EmptyMask(_)));
    }

    #[test]
    fn test_label_out_of_range() {
        let logits = Matrix::zeros(1, 2);
        let err = cross_entropy(&logits, &[2], &[true]).unwrap_err();
        assert!(matches!(err, Error::InvalidLabel { label: 2, .. }));
    }

    #[test]
    fn test_accuracy() {
        let logits = Matrix::from_vec(3, 2, vec![0.0, 1.0, 1.0, 0.0, 0.0, 1.0]).unwrap();
        let acc = accuracy(&logits, &[1, 1, 1], &[true, true, false]).unwrap();
        assert_eq!(acc, Some(0.5));
        assert_eq!(accuracy(&logits, &[1, 1, 1], &[false; 3]).unwrap(), None);
    }
}
