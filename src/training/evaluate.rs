//! Classification metrics over a node mask.
//!
//! Fraud (class 1) is the positive class for precision, recall and F1.

use crate::core::{Error, GroupId, Result};
use serde::{Deserialize, Serialize};

/// Label of the positive (fraud) class.
pub const FRAUD_CLASS: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f32,
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
    /// Number of nodes in the mask
    pub support: usize,
}

/// Score `predictions` against `labels` on the nodes selected by `mask`.
/// Returns `None` when the mask selects nothing.
pub fn evaluate(
    predictions: &[GroupId],
    labels: &[u32],
    mask: &[bool],
) -> Result<Option<ClassificationMetrics>> {
    for (context, len) in [("evaluation predictions", predictions.len()), ("evaluation mask", mask.len())] {
        if len != labels.len() {
            return Err(Error::ShapeMismatch {
                context,
                expected: labels.len(),
                actual: len,
            });
        }
    }

    let (mut tp, mut fp, mut fn_, mut correct, mut support) = (0usize, 0usize, 0usize, 0usize, 0usize);
    for ((&pred, &label), &selected) in predictions.iter().zip(labels).zip(mask) {
        if !selected {
            continue;
        }
        support += 1;
        if pred == label {
            correct += 1;
        }
        match (pred == FRAUD_CLASS, label == FRAUD_CLASS) {
            (true, true) => tp += 1,
            (true, false) => fp += 1,
            (false, true) => fn_ += 1,
            (false, false) => {}
        }
    }
    if support == 0 {
        return Ok(None);
    }

    let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f32 / den as f32 };
    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };
    Ok(Some(ClassificationMetrics {
        accuracy: ratio(correct, support),
        precision,
        recall,
        f1,
        support,
    }))
}
