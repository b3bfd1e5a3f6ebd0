//! Linear map `y = x·W (+ b)` with a hand-written backward pass.

use crate::core::{Error, Result};
use crate::gnn::matrix::Matrix;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A linear transformation stored as an `in_features x out_features` weight.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Linear {
    /// Weight matrix (in x out)
    pub weight: Matrix,
    /// Optional bias (out)
    pub bias: Option<Vec<f32>>,
}

/// Gradients matching the layout of a [`Linear`].
#[derive(Clone, Debug)]
pub struct LinearGradients {
    pub weight: Matrix,
    pub bias: Option<Vec<f32>>,
}

impl Linear {
    /// Create a new linear map with uniform `±1/sqrt(in)` initialization.
    pub fn new<R: Rng + ?Sized>(in_features: usize, out_features: usize, bias: bool, rng: &mut R) -> Self {
        let bound = 1.0 / (in_features.max(1) as f32).sqrt();
        let weight = Matrix::uniform(in_features, out_features, bound, rng);
        let bias = bias.then(|| {
            (0..out_features)
                .map(|_| rng.gen::<f32>() * 2.0 * bound - bound)
                .collect()
        });
        Self { weight, bias }
    }

    /// Create from an explicit weight and no bias.
    pub fn from_weight(weight: Matrix) -> Self {
        Self { weight, bias: None }
    }

    pub fn in_features(&self) -> usize {
        self.weight.rows()
    }

    pub fn out_features(&self) -> usize {
        self.weight.cols()
    }

    /// Forward pass over every row of `x`.
    pub fn forward(&self, x: &Matrix) -> Result<Matrix> {
        if x.cols() != self.in_features() {
            return Err(Error::ShapeMismatch {
                context: "linear input width",
                expected: self.in_features(),
                actual: x.cols(),
            });
        }
        let mut out = x.matmul(&self.weight)?;
        if let Some(bias) = &self.bias {
            for i in 0..out.rows() {
                for (o, b) in out.row_mut(i).iter_mut().zip(bias) {
                    *o += b;
                }
            }
        }
        Ok(out)
    }

    /// Given the forward input and `dL/dy`, return parameter gradients and `dL/dx`.
    pub fn backward(&self, x: &Matrix, grad_out: &Matrix) -> Result<(LinearGradients, Matrix)> {
        let weight = x.transpose_matmul(grad_out)?;
        let bias = self.bias.as_ref().map(|_| grad_out.column_sums());
        let grad_input = grad_out.matmul_transpose(&self.weight)?;
        Ok((LinearGradients { weight, bias }, grad_input))
    }

    /// Mutable views of every parameter buffer, weight first.
    pub fn parameters_mut(&mut self) -> Vec<&mut [f32]> {
        let mut params = vec![self.weight.as_mut_slice()];
        if let Some(bias) = self.bias.as_mut() {
            params.push(bias.as_mut_slice());
        }
        params
    }

    /// Fail unless the weight is `in_features x out_features` and any bias
    /// has `out_features` entries.
    pub(crate) fn check_dims(&self, in_features: usize, out_features: usize) -> Result<()> {
        if self.in_features() != in_features {
            return Err(Error::ShapeMismatch {
                context: "linear weight rows",
                expected: in_features,
                actual: self.in_features(),
            });
        }
        if self.out_features() != out_features {
            return Err(Error::ShapeMismatch {
                context: "linear weight columns",
                expected: out_features,
                actual: self.out_features(),
            });
        }
        match &self.bias {
            Some(bias) if bias.len() != out_features => Err(Error::ShapeMismatch {
                context: "linear bias length",
                expected: out_features,
                actual: bias.len(),
            }),
            _ => Ok(()),
        }
    }

    /// Number of scalar parameters.
    pub fn parameter_count(&self) -> usize {
        self.weight.as_slice().len() + self.bias.as_ref().map_or(0, Vec::len)
    }
}

impl LinearGradients {
    /// Zero gradients shaped like `linear`.
    pub fn zeros_like(linear: &Linear) -> Self {
        Self {
            weight: Matrix::zeros(linear.in_features(), linear.out_features()),
            bias: linear.bias.as_ref().map(|b| vec![0.0; b.len()]),
        }
    }

    /// Views in the same order as [`Linear::parameters_mut`].
    pub fn slices(&self) -> Vec<&[f32]> {
        let mut grads = vec![self.weight.as_slice()];
        if let Some(bias) = &self.bias {
            grads.push(bias.as_slice());
        }
        grads
    }
}
