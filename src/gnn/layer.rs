//! Dynamic Group-Aware aggregation layer.
//!
//! One round of message passing in which the transform applied to a
//! neighbor's message depends on that neighbor's current group:
//!
//! ```text
//! out[v] = h[v]·W_self + Σ_{u → v} h[u]·W_{group[u]}
//! ```
//!
//! Messages are transformed once per source node under its group and then
//! scatter-summed into every destination. Neither term has a bias.

use crate::core::{Error, GroupId, Result};
use crate::gnn::linear::{Linear, LinearGradients};
use crate::gnn::matrix::{accumulate_row_product, dot, Matrix};
use crate::graph::Graph;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A DGA layer: a self transform plus one neighbor transform per group id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DgaLayer {
    self_transform: Linear,
    group_transforms: Vec<Linear>,
}

/// Gradients for every weight in a [`DgaLayer`].
#[derive(Clone, Debug)]
pub struct DgaLayerGradients {
    pub self_transform: LinearGradients,
    pub group_transforms: Vec<LinearGradients>,
}

impl DgaLayer {
    /// Create a layer with randomly initialised, bias-free transforms.
    pub fn new<R: Rng + ?Sized>(
        in_features: usize,
        out_features: usize,
        num_groups: usize,
        rng: &mut R,
    ) -> Result<Self> {
        if num_groups == 0 {
            return Err(Error::InvalidConfig(
                "a DGA layer needs at least one group".to_string(),
            ));
        }
        let self_transform = Linear::new(in_features, out_features, false, rng);
        let group_transforms = (0..num_groups)
            .map(|_| Linear::new(in_features, out_features, false, rng))
            .collect();
        Ok(Self {
            self_transform,
            group_transforms,
        })
    }

    /// Create a layer from explicit weights (each `in x out`).
    pub fn from_weights(self_weight: Matrix, group_weights: Vec<Matrix>) -> Result<Self> {
        if group_weights.is_empty() {
            return Err(Error::InvalidConfig(
                "a DGA layer needs at least one group".to_string(),
            ));
        }
        for w in &group_weights {
            if w.rows() != self_weight.rows() {
                return Err(Error::ShapeMismatch {
                    context: "group transform input width",
                    expected: self_weight.rows(),
                    actual: w.rows(),
                });
            }
            if w.cols() != self_weight.cols() {
                return Err(Error::ShapeMismatch {
                    context: "group transform output width",
                    expected: self_weight.cols(),
                    actual: w.cols(),
                });
            }
        }
        Ok(Self {
            self_transform: Linear::from_weight(self_weight),
            group_transforms: group_weights.into_iter().map(Linear::from_weight).collect(),
        })
    }

    pub fn in_features(&self) -> usize {
        self.self_transform.in_features()
    }

    pub fn out_features(&self) -> usize {
        self.self_transform.out_features()
    }

    pub fn num_groups(&self) -> usize {
        self.group_transforms.len()
    }

    pub fn self_transform(&self) -> &Linear {
        &self.self_transform
    }

    /// Transform applied to messages from nodes in `group`.
    pub fn group_transform(&self, group: GroupId) -> Option<&Linear> {
        self.group_transforms.get(group as usize)
    }

    pub fn self_transform_mut(&mut self) -> &mut Linear {
        &mut self.self_transform
    }

    pub fn group_transform_mut(&mut self, group: GroupId) -> Option<&mut Linear> {
        self.group_transforms.get_mut(group as usize)
    }

    /// Fail unless every transform maps `in_features` to `out_features`
    /// without a bias and there are exactly `num_groups` group transforms.
    pub(crate) fn check_dims(
        &self,
        in_features: usize,
        out_features: usize,
        num_groups: usize,
    ) -> Result<()> {
        if self.num_groups() != num_groups {
            return Err(Error::ShapeMismatch {
                context: "layer group transforms",
                expected: num_groups,
                actual: self.num_groups(),
            });
        }
        for transform in std::iter::once(&self.self_transform).chain(&self.group_transforms) {
            transform.check_dims(in_features, out_features)?;
            if transform.bias.is_some() {
                return Err(Error::InvalidConfig(
                    "DGA layer transforms carry no bias".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn validate(&self, graph: &Graph, h: &Matrix, groups: &[GroupId]) -> Result<()> {
        if h.cols() != self.in_features() {
            return Err(Error::ShapeMismatch {
                context: "layer input width",
                expected: self.in_features(),
                actual: h.cols(),
            });
        }
        if h.rows() != graph.num_nodes() {
            return Err(Error::ShapeMismatch {
                context: "feature rows vs node count",
                expected: graph.num_nodes(),
                actual: h.rows(),
            });
        }
        if groups.len() != graph.num_nodes() {
            return Err(Error::ShapeMismatch {
                context: "group labels vs node count",
                expected: graph.num_nodes(),
                actual: groups.len(),
            });
        }
        if let Some((node, &group)) = groups
            .iter()
            .enumerate()
            .find(|&(_, &g)| g as usize >= self.num_groups())
        {
            return Err(Error::InvalidGroup {
                node,
                group,
                num_groups: self.num_groups(),
            });
        }
        Ok(())
    }

    /// Forward pass: `N x in` features to `N x out`.
    pub fn forward(&self, graph: &Graph, h: &Matrix, groups: &[GroupId]) -> Result<Matrix> {
        self.validate(graph, h, groups)?;

        let mut out = self.self_transform.forward(h)?;
        let messages = self.messages(graph, h, groups);
        for v in 0..graph.num_nodes() {
            let acc = out.row_mut(v);
            for &u in graph.in_neighbors(v) {
                for (a, &m) in acc.iter_mut().zip(messages.row(u)) {
                    *a += m;
                }
            }
        }
        Ok(out)
    }

    /// Group-conditioned message of every node that has at least one outgoing edge.
    fn messages(&self, graph: &Graph, h: &Matrix, groups: &[GroupId]) -> Matrix {
        let mut messages = Matrix::zeros(h.rows(), self.out_features());
        for u in 0..h.rows() {
            if graph.out_degree(u) == 0 {
                continue;
            }
            let w = &self.group_transforms[groups[u] as usize].weight;
            accumulate_row_product(messages.row_mut(u), h.row(u), w);
        }
        messages
    }

    /// Backward pass for the input `h` used in [`forward`](Self::forward).
    ///
    /// Returns the weight gradients and `dL/dh`. The group labels are treated
    /// as constants: only the transforms they select receive gradient.
    pub fn backward(
        &self,
        graph: &Graph,
        h: &Matrix,
        groups: &[GroupId],
        grad_out: &Matrix,
    ) -> Result<(DgaLayerGradients, Matrix)> {
        self.validate(graph, h, groups)?;
        if grad_out.rows() != h.rows() || grad_out.cols() != self.out_features() {
            return Err(Error::ShapeMismatch {
                context: "layer output gradient",
                expected: h.rows() * self.out_features(),
                actual: grad_out.rows() * grad_out.cols(),
            });
        }

        let (self_grads, mut grad_h) = self.self_transform.backward(h, grad_out)?;
        let mut group_grads: Vec<LinearGradients> = self
            .group_transforms
            .iter()
            .map(LinearGradients::zeros_like)
            .collect();

        let mut grad_message = vec![0.0f32; self.out_features()];
        for u in 0..graph.num_nodes() {
            if graph.out_degree(u) == 0 {
                continue;
            }
            grad_message.fill(0.0);
            for &v in graph.out_neighbors(u) {
                for (g, &d) in grad_message.iter_mut().zip(grad_out.row(v)) {
                    *g += d;
                }
            }

            let group = groups[u] as usize;
            let w = &self.group_transforms[group].weight;
            let gw = &mut group_grads[group].weight;
            let h_u = h.row(u);
            let grad_h_u = grad_h.row_mut(u);
            for (k, &x) in h_u.iter().enumerate() {
                if x != 0.0 {
                    for (g, &d) in gw.row_mut(k).iter_mut().zip(&grad_message) {
                        *g += x * d;
                    }
                }
                grad_h_u[k] += dot(w.row(k), &grad_message);
            }
        }

        Ok((
            DgaLayerGradients {
                self_transform: self_grads,
                group_transforms: group_grads,
            },
            grad_h,
        ))
    }

    /// Mutable parameter views: self transform, then group transforms in id order.
    pub fn parameters_mut(&mut self) -> Vec<&mut [f32]> {
        let mut params = self.self_transform.parameters_mut();
        for t in &mut self.group_transforms {
            params.extend(t.parameters_mut());
        }
        params
    }

    pub fn parameter_count(&self) -> usize {
        self.self_transform.parameter_count()
            + self
                .group_transforms
                .iter()
                .map(Linear::parameter_count)
                .sum::<usize>()
    }
}

impl DgaLayerGradients {
    /// Views in the same order as [`DgaLayer::parameters_mut`].
    pub fn slices(&self) -> Vec<&[f32]> {
        let mut grads = self.self_transform.slices();
        for g in &self.group_transforms {
            grads.extend(g.slices());
        }
        grads
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// 0 -> 1, 2 -> 1. Node 0 is in group 0, node 2 in group 1.
    fn routing_fixture() -> (Graph, Matrix, Vec<GroupId>) {
        let graph = Graph::new(3, vec![(0, 1), (2, 1)]).unwrap();
        let features = Matrix::from_vec(3, 1, vec![1.0, 0.0, 10.0]).unwrap();
        (graph, features, vec![0, 0, 1])
    }

    fn routing_layer() -> DgaLayer {
        DgaLayer::from_weights(
            Matrix::from_vec(1, 2, vec![0.0, 0.0]).unwrap(),
            vec![
                Matrix::from_vec(1, 2, vec![1.0, 1.0]).unwrap(),
                Matrix::from_vec(1, 2, vec![10.0, 10.0]).unwrap(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_group_routing() {
        let (graph, features, groups) = routing_fixture();
        let layer = routing_layer();

        let out = layer.forward(&graph, &features, &groups).unwrap();

        // 1.0·[1, 1] + 10.0·[10, 10]
        assert_eq!(out.row(1), &[101.0, 101.0]);
        // No incoming edges and a zero self weight.
        assert_eq!(out.row(0), &[0.0, 0.0]);
        assert_eq!(out.row(2), &[0.0, 0.0]);
    }

    #[test]
    fn test_self_term_is_group_independent() {
        let (graph, features, _) = routing_fixture();
        let mut layer = routing_layer();
        layer.self_transform_mut().weight = Matrix::from_vec(1, 2, vec![2.0, -1.0]).unwrap();

        let a = layer.forward(&graph, &features, &[0, 0, 0]).unwrap();
        let b = layer.forward(&graph, &features, &[1, 1, 1]).unwrap();

        // Nodes 0 and 2 have no incoming edges: only the self term remains.
        assert_eq!(a.row(0), b.row(0));
        assert_eq!(a.row(2), &[20.0, -10.0]);
        // Node 1 sees both neighbors routed through group 0 or group 1.
        assert_eq!(a.row(1), &[11.0, 11.0]);
        assert_eq!(b.row(1), &[110.0, 110.0]);
    }

    #[test]
    fn test_rejects_out_of_range_group() {
        let (graph, features, _) = routing_fixture();
        let layer = routing_layer();
        let err = layer.forward(&graph, &features, &[0, 2, 0]).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidGroup {
                node: 1,
                group: 2,
                num_groups: 2
            }
        ));
    }

    #[test]
    fn test_rejects_wrong_feature_width() {
        let (graph, _, groups) = routing_fixture();
        let layer = routing_layer();
        let wide = Matrix::zeros(3, 4);
        let err = layer.forward(&graph, &wide, &groups).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { expected: 1, actual: 4, .. }));
    }

    #[test]
    fn test_rejects_mismatched_group_count() {
        let (graph, features, _) = routing_fixture();
        let layer = routing_layer();
        assert!(layer.forward(&graph, &features, &[0, 0]).is_err());
    }

    #[test]
    fn test_matches_per_edge_sum() {
        let mut rng = StdRng::seed_from_u64(11);
        let edges = vec![(0, 3), (1, 3), (2, 3), (3, 0), (1, 0), (4, 2), (4, 3)];
        let graph = Graph::new(5, edges.clone()).unwrap();
        let features = Matrix::uniform(5, 3, 1.0, &mut rng);
        let groups = vec![1, 0, 2, 1, 0];
        let layer = DgaLayer::new(3, 4, 3, &mut rng).unwrap();

        let out = layer.forward(&graph, &features, &groups).unwrap();

        let mut expected = layer.self_transform().forward(&features).unwrap();
        for &(u, v) in edges.iter().rev() {
            let single = Matrix::from_vec(1, 3, features.row(u).to_vec()).unwrap();
            let msg = layer
                .group_transform(groups[u])
                .unwrap()
                .forward(&single)
                .unwrap();
            for (e, m) in expected.row_mut(v).iter_mut().zip(msg.row(0)) {
                *e += m;
            }
        }

        for (a, b) in out.as_slice().iter().zip(expected.as_slice()) {
            assert!((a - b).abs() < 1e-4, "{a} vs {b}");
        }
    }

    /// `L = Σ out ⊙ R` for a fixed `R`, so `dL/dout = R`.
    fn weighted_sum(out: &Matrix, r: &Matrix) -> f32 {
        dot(out.as_slice(), r.as_slice())
    }

    #[test]
    fn test_backward_matches_finite_differences() {
        let mut rng = StdRng::seed_from_u64(5);
        let graph = Graph::new(4, vec![(0, 1), (2, 1), (3, 1), (1, 0), (0, 2)]).unwrap();
        let features = Matrix::uniform(4, 2, 1.0, &mut rng);
        let groups = vec![0, 1, 1, 0];
        let layer = DgaLayer::new(2, 3, 2, &mut rng).unwrap();
        let r = Matrix::uniform(4, 3, 1.0, &mut rng);

        let (grads, grad_h) = layer.backward(&graph, &features, &groups, &r).unwrap();
        let analytic: Vec<f32> = grads.slices().concat();

        let eps = 1e-2;
        let mut probe = layer.clone();
        let count = probe.parameter_count();
        for i in 0..count {
            let original = probe.parameters_mut().concat()[i];
            set_param(&mut probe, i, original + eps);
            let plus = weighted_sum(&probe.forward(&graph, &features, &groups).unwrap(), &r);
            set_param(&mut probe, i, original - eps);
            let minus = weighted_sum(&probe.forward(&graph, &features, &groups).unwrap(), &r);
            set_param(&mut probe, i, original);

            let numeric = (plus - minus) / (2.0 * eps);
            assert!(
                (numeric - analytic[i]).abs() < 1e-2,
                "param {i}: numeric {numeric}, analytic {}",
                analytic[i]
            );
        }

        for i in 0..features.as_slice().len() {
            let mut plus_h = features.clone();
            plus_h.as_mut_slice()[i] += eps;
            let mut minus_h = features.clone();
            minus_h.as_mut_slice()[i] -= eps;
            let plus = weighted_sum(&layer.forward(&graph, &plus_h, &groups).unwrap(), &r);
            let minus = weighted_sum(&layer.forward(&graph, &minus_h, &groups).unwrap(), &r);
            let numeric = (plus - minus) / (2.0 * eps);
            assert!((numeric - grad_h.as_slice()[i]).abs() < 1e-2);
        }
    }

    #[test]
    fn test_unused_group_gets_zero_gradient() {
        let (graph, features, _) = routing_fixture();
        let layer = routing_layer();
        let r = Matrix::from_vec(3, 2, vec![1.0; 6]).unwrap();
        let (grads, _) = layer.backward(&graph, &features, &[0, 0, 0], &r).unwrap();
        assert!(grads.group_transforms[1]
            .weight
            .as_slice()
            .iter()
            .all(|&g| g == 0.0));
        // Group 0 carries messages from nodes 0 and 2 into node 1: 1.0 + 10.0.
        assert_eq!(grads.group_transforms[0].weight.as_slice(), &[11.0, 11.0]);
    }

    fn set_param(layer: &mut DgaLayer, index: usize, value: f32) {
        let mut remaining = index;
        for p in layer.parameters_mut() {
            if remaining < p.len() {
                p[remaining] = value;
                return;
            }
            remaining -= p.len();
        }
    }
}
