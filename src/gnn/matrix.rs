//! Dense row-major matrix used for node features, weights and gradients.

use crate::core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Row-major `rows x cols` matrix of `f32`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMatrix")]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

/// Unchecked wire form; every deserialized matrix goes through [`Matrix::from_vec`].
#[derive(Deserialize)]
struct RawMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl TryFrom<RawMatrix> for Matrix {
    type Error = Error;

    fn try_from(raw: RawMatrix) -> Result<Self> {
        Matrix::from_vec(raw.rows, raw.cols, raw.data)
    }
}

impl Matrix {
    /// Create a zero matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Wrap a flat row-major buffer.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self> {
        if rows.checked_mul(cols) != Some(data.len()) {
            return Err(Error::ShapeMismatch {
                context: "matrix buffer",
                expected: rows.saturating_mul(cols),
                actual: data.len(),
            });
        }
        Ok(Self { rows, cols, data })
    }

    /// Build from equally sized rows. An empty input yields a `0 x cols` matrix.
    pub fn from_rows(rows: &[Vec<f32>], cols: usize) -> Result<Self> {
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            if row.len() != cols {
                return Err(Error::ShapeMismatch {
                    context: "matrix row",
                    expected: cols,
                    actual: row.len(),
                });
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    /// Fill with values drawn uniformly from `[-bound, bound)`.
    pub fn uniform<R: rand::Rng + ?Sized>(rows: usize, cols: usize, bound: f32, rng: &mut R) -> Self {
        let data = (0..rows * cols)
            .map(|_| rng.gen::<f32>() * 2.0 * bound - bound)
            .collect();
        Self { rows, cols, data }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn row_mut(&mut self, i: usize) -> &mut [f32] {
        &mut self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn get(&self, r: usize, c: usize) -> f32 {
        self.data[r * self.cols + c]
    }

    pub fn set(&mut self, r: usize, c: usize, value: f32) {
        self.data[r * self.cols + c] = value;
    }

    /// `self · rhs`.
    pub fn matmul(&self, rhs: &Matrix) -> Result<Matrix> {
        if self.cols != rhs.rows {
            return Err(Error::ShapeMismatch {
                context: "matmul inner dimension",
                expected: self.cols,
                actual: rhs.rows,
            });
        }
        let mut out = Matrix::zeros(self.rows, rhs.cols);
        for i in 0..self.rows {
            let out_row = &mut out.data[i * rhs.cols..(i + 1) * rhs.cols];
            for (k, &a) in self.row(i).iter().enumerate() {
                for (o, &b) in out_row.iter_mut().zip(rhs.row(k)) {
                    *o += a * b;
                }
            }
        }
        Ok(out)
    }

    /// `selfᵀ · rhs`, used for weight gradients.
    pub fn transpose_matmul(&self, rhs: &Matrix) -> Result<Matrix> {
        if self.rows != rhs.rows {
            return Err(Error::ShapeMismatch {
                context: "transpose_matmul row count",
                expected: self.rows,
                actual: rhs.rows,
            });
        }
        let mut out = Matrix::zeros(self.cols, rhs.cols);
        for r in 0..self.rows {
            let rhs_row = rhs.row(r);
            for (i, &a) in self.row(r).iter().enumerate() {
                for (o, &b) in out.row_mut(i).iter_mut().zip(rhs_row) {
                    *o += a * b;
                }
            }
        }
        Ok(out)
    }

    /// `self · rhsᵀ`, used to propagate gradients back through a weight.
    pub fn matmul_transpose(&self, rhs: &Matrix) -> Result<Matrix> {
        if self.cols != rhs.cols {
            return Err(Error::ShapeMismatch {
                context: "matmul_transpose column count",
                expected: self.cols,
                actual: rhs.cols,
            });
        }
        let mut out = Matrix::zeros(self.rows, rhs.rows);
        for i in 0..self.rows {
            let a = self.row(i);
            for j in 0..rhs.rows {
                out.data[i * rhs.rows + j] = dot(a, rhs.row(j));
            }
        }
        Ok(out)
    }

    /// Elementwise `self += rhs`.
    pub fn add_assign(&mut self, rhs: &Matrix) -> Result<()> {
        if self.rows != rhs.rows || self.cols != rhs.cols {
            return Err(Error::ShapeMismatch {
                context: "elementwise add",
                expected: self.data.len(),
                actual: rhs.data.len(),
            });
        }
        for (a, b) in self.data.iter_mut().zip(&rhs.data) {
            *a += b;
        }
        Ok(())
    }

    /// `max(0, x)` elementwise.
    pub fn relu(&self) -> Matrix {
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|&x| x.max(0.0)).collect(),
        }
    }

    /// Zero the gradient wherever the pre-activation was not positive.
    pub fn relu_backward(grad: &Matrix, pre_activation: &Matrix) -> Matrix {
        Matrix {
            rows: grad.rows,
            cols: grad.cols,
            data: grad
                .data
                .iter()
                .zip(&pre_activation.data)
                .map(|(&g, &z)| if z > 0.0 { g } else { 0.0 })
                .collect(),
        }
    }

    /// Sum over rows, yielding one value per column.
    pub fn column_sums(&self) -> Vec<f32> {
        let mut sums = vec![0.0; self.cols];
        for i in 0..self.rows {
            for (s, &v) in sums.iter_mut().zip(self.row(i)) {
                *s += v;
            }
        }
        sums
    }
}

/// Dot product of two equally sized slices.
pub(crate) fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// `out += x · w` for a single row `x` against an `in x out` weight matrix.
pub(crate) fn accumulate_row_product(out: &mut [f32], x: &[f32], w: &Matrix) {
    for (k, &a) in x.iter().enumerate() {
        for (o, &b) in out.iter_mut().zip(w.row(k)) {
            *o += a * b;
        }
    }
}
