//! Gradient-based optimizers over flat parameter buffers.

use crate::core::{Error, Result};

/// Updates parameters in place from matching gradient buffers.
///
/// `params` and `grads` must list the same buffers in the same order on
/// every call.
pub trait Optimizer {
    fn step(&mut self, params: Vec<&mut [f32]>, grads: &[&[f32]]) -> Result<()>;

    fn learning_rate(&self) -> f32;
}

fn check_alignment(params: &[&mut [f32]], grads: &[&[f32]]) -> Result<()> {
    if params.len() != grads.len() {
        return Err(Error::ShapeMismatch {
            context: "optimizer buffer count",
            expected: params.len(),
            actual: grads.len(),
        });
    }
    for (p, g) in params.iter().zip(grads) {
        if p.len() != g.len() {
            return Err(Error::ShapeMismatch {
                context: "optimizer buffer length",
                expected: p.len(),
                actual: g.len(),
            });
        }
    }
    Ok(())
}

/// Plain stochastic gradient descent.
#[derive(Clone, Debug)]
pub struct Sgd {
    learning_rate: f32,
}

impl Sgd {
    pub fn new(learning_rate: f32) -> Self {
        Self { learning_rate }
    }
}

impl Optimizer for Sgd {
    fn step(&mut self, params: Vec<&mut [f32]>, grads: &[&[f32]]) -> Result<()> {
        check_alignment(&params, grads)?;
        for (p, g) in params.into_iter().zip(grads) {
            for (w, d) in p.iter_mut().zip(g.iter()) {
                *w -= self.learning_rate * d;
            }
        }
        Ok(())
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }
}

/// Adam with bias-corrected first and second moment estimates.
#[derive(Clone, Debug)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    step: i32,
    first_moment: Vec<Vec<f32>>,
    second_moment: Vec<Vec<f32>>,
}

impl Adam {
    /// Adam with the usual defaults (β1 = 0.9, β2 = 0.999, ε = 1e-8).
    pub fn new(learning_rate: f32) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            step: 0,
            first_moment: Vec::new(),
            second_moment: Vec::new(),
        }
    }

    /// Number of steps taken so far.
    pub fn steps(&self) -> i32 {
        self.step
    }
}

impl Optimizer for Adam {
    fn step(&mut self, params: Vec<&mut [f32]>, grads: &[&[f32]]) -> Result<()> {
        check_alignment(&params, grads)?;
        if self.first_moment.is_empty() {
            self.first_moment = grads.iter().map(|g| vec![0.0; g.len()]).collect();
            self.second_moment = self.first_moment.clone();
        } else if self.first_moment.len() != grads.len() {
            return Err(Error::ShapeMismatch {
                context: "optimizer state buffers",
                expected: self.first_moment.len(),
                actual: grads.len(),
            });
        }

        self.step += 1;
        let correction1 = 1.0 - self.beta1.powi(self.step);
        let correction2 = 1.0 - self.beta2.powi(self.step);

        for (((p, g), m), v) in params
            .into_iter()
            .zip(grads)
            .zip(&mut self.first_moment)
            .zip(&mut self.second_moment)
        {
            if m.len() != g.len() {
                return Err(Error::ShapeMismatch {
                    context: "optimizer state length",
                    expected: m.len(),
                    actual: g.len(),
                });
            }
            for i in 0..p.len() {
                m[i] = self.beta1 * m[i] + (1.0 - self.beta1) * g[i];
                v[i] = self.beta2 * v[i] + (1.0 - self.beta2) * g[i] * g[i];
                let m_hat = m[i] / correction1;
                let v_hat = v[i] / correction2;
                p[i] -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
            }
        }
        Ok(())
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }
}
