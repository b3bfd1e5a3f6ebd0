//! Two-layer DGA network with a linear classification head.
//!
//! ```text
//! logits = relu(DGA₂(relu(DGA₁(X, g)), g)) · W_out + b_out
//! ```
//!
//! Both layers receive the same group-label vector `g` within a pass.

use crate::core::{argmax, Error, GroupId, Result};
use crate::gnn::layer::{DgaLayer, DgaLayerGradients};
use crate::gnn::linear::{Linear, LinearGradients};
use crate::gnn::matrix::Matrix;
use crate::graph::Graph;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Dimensions of a [`DgaNetwork`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkShape {
    pub in_feats: usize,
    pub hidden_dim: usize,
    pub num_classes: usize,
    pub num_groups: usize,
}

/// DGA-GNN node classifier.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DgaNetwork {
    shape: NetworkShape,
    layer1: DgaLayer,
    layer2: DgaLayer,
    classify: Linear,
}

/// Intermediate activations kept for the backward pass.
#[derive(Clone, Debug)]
pub struct ForwardCache {
    pre1: Matrix,
    act1: Matrix,
    pre2: Matrix,
    act2: Matrix,
    /// Raw class scores, one row per node
    pub logits: Matrix,
}

/// Gradients for every parameter of a [`DgaNetwork`].
#[derive(Clone, Debug)]
pub struct NetworkGradients {
    pub layer1: DgaLayerGradients,
    pub layer2: DgaLayerGradients,
    pub classify: LinearGradients,
}

impl DgaNetwork {
    /// Create a randomly initialised network.
    pub fn new<R: Rng + ?Sized>(shape: NetworkShape, rng: &mut R) -> Result<Self> {
        let layer1 = DgaLayer::new(shape.in_feats, shape.hidden_dim, shape.num_groups, rng)?;
        let layer2 = DgaLayer::new(shape.hidden_dim, shape.hidden_dim, shape.num_groups, rng)?;
        let classify = Linear::new(shape.hidden_dim, shape.num_classes, true, rng);
        Ok(Self {
            shape,
            layer1,
            layer2,
            classify,
        })
    }

    /// Check that every weight agrees with the recorded [`NetworkShape`].
    /// Deserialized networks must pass this before use.
    pub fn check_shape(&self) -> Result<()> {
        let shape = self.shape;
        if shape.num_groups == 0 {
            return Err(Error::InvalidConfig(
                "a DGA layer needs at least one group".to_string(),
            ));
        }
        self.layer1
            .check_dims(shape.in_feats, shape.hidden_dim, shape.num_groups)?;
        self.layer2
            .check_dims(shape.hidden_dim, shape.hidden_dim, shape.num_groups)?;
        self.classify.check_dims(shape.hidden_dim, shape.num_classes)
    }

    pub fn shape(&self) -> NetworkShape {
        self.shape
    }

    pub fn layer1(&self) -> &DgaLayer {
        &self.layer1
    }

    pub fn layer2(&self) -> &DgaLayer {
        &self.layer2
    }

    pub fn classifier(&self) -> &Linear {
        &self.classify
    }

    /// Logits for every node (`N x num_classes`).
    pub fn forward(&self, graph: &Graph, features: &Matrix, groups: &[GroupId]) -> Result<Matrix> {
        Ok(self.forward_cached(graph, features, groups)?.logits)
    }

    /// Forward pass that keeps the activations needed by [`backward`](Self::backward).
    pub fn forward_cached(
        &self,
        graph: &Graph,
        features: &Matrix,
        groups: &[GroupId],
    ) -> Result<ForwardCache> {
        let pre1 = self.layer1.forward(graph, features, groups)?;
        let act1 = pre1.relu();
        let pre2 = self.layer2.forward(graph, &act1, groups)?;
        let act2 = pre2.relu();
        let logits = self.classify.forward(&act2)?;
        Ok(ForwardCache {
            pre1,
            act1,
            pre2,
            act2,
            logits,
        })
    }

    /// Backpropagate `dL/dlogits` through the head and both layers.
    pub fn backward(
        &self,
        graph: &Graph,
        features: &Matrix,
        groups: &[GroupId],
        cache: &ForwardCache,
        grad_logits: &Matrix,
    ) -> Result<NetworkGradients> {
        let (classify, grad_act2) = self.classify.backward(&cache.act2, grad_logits)?;
        let grad_pre2 = Matrix::relu_backward(&grad_act2, &cache.pre2);
        let (layer2, grad_act1) = self.layer2.backward(graph, &cache.act1, groups, &grad_pre2)?;
        let grad_pre1 = Matrix::relu_backward(&grad_act1, &cache.pre1);
        let (layer1, _) = self.layer1.backward(graph, features, groups, &grad_pre1)?;
        Ok(NetworkGradients {
            layer1,
            layer2,
            classify,
        })
    }

    /// Predicted class for every node.
    pub fn predict(&self, graph: &Graph, features: &Matrix, groups: &[GroupId]) -> Result<Vec<GroupId>> {
        let logits = self.forward(graph, features, groups)?;
        Ok(predictions(&logits))
    }

    /// Mutable parameter views: layer 1, layer 2, head.
    pub fn parameters_mut(&mut self) -> Vec<&mut [f32]> {
        let mut params = self.layer1.parameters_mut();
        params.extend(self.layer2.parameters_mut());
        params.extend(self.classify.parameters_mut());
        params
    }

    pub fn parameter_count(&self) -> usize {
        self.layer1.parameter_count() + self.layer2.parameter_count() + self.classify.parameter_count()
    }
}

impl NetworkGradients {
    /// Views in the same order as [`DgaNetwork::parameters_mut`].
    pub fn slices(&self) -> Vec<&[f32]> {
        let mut grads = self.layer1.slices();
        grads.extend(self.layer2.slices());
        grads.extend(self.classify.slices());
        grads
    }
}

/// Row-wise argmax of a logit matrix.
pub fn predictions(logits: &Matrix) -> Vec<GroupId> {
    (0..logits.rows())
        .map(|i| argmax(logits.row(i)) as GroupId)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn chain_graph() -> Graph {
        Graph::new(4, vec![(0, 1), (1, 2), (2, 3)]).unwrap()
    }

    fn shape(in_feats: usize, hidden_dim: usize, num_classes: usize) -> NetworkShape {
        NetworkShape {
            in_feats,
            hidden_dim,
            num_classes,
            num_groups: 2,
        }
    }

    #[test]
    fn test_check_shape() {
        let mut rng = StdRng::seed_from_u64(4);
        let net = DgaNetwork::new(shape(3, 5, 2), &mut rng).unwrap();
        assert!(net.check_shape().is_ok());

        let mut wrong = net.clone();
        wrong.shape.hidden_dim = 6;
        assert!(matches!(wrong.check_shape(), Err(Error::ShapeMismatch { .. })));

        let mut one_group = net.clone();
        one_group.layer2 =
            DgaLayer::from_weights(Matrix::zeros(5, 5), vec![Matrix::zeros(5, 5)]).unwrap();
        assert!(matches!(
            one_group.check_shape(),
            Err(Error::ShapeMismatch { context: "layer group transforms", .. })
        ));

        let mut bad_bias = net;
        bad_bias.classify.bias = Some(vec![0.0; 3]);
        assert!(matches!(
            bad_bias.check_shape(),
            Err(Error::ShapeMismatch { context: "linear bias length", .. })
        ));
    }

    #[test]
    fn test_forward_shape() {
        let mut rng = StdRng::seed_from_u64(0);
        let net = DgaNetwork::new(shape(10, 16, 2), &mut rng).unwrap();
        let features = Matrix::uniform(4, 10, 1.0, &mut rng);

        let out = net.forward(&chain_graph(), &features, &[0, 1, 0, 1]).unwrap();
        assert_eq!(out.rows(), 4);
        assert_eq!(out.cols(), 2);
    }

    #[test]
    fn test_forward_shape_various_dims() {
        let mut rng = StdRng::seed_from_u64(9);
        for &(i, h, c) in &[(1, 1, 1), (3, 8, 2), (7, 4, 5)] {
            let mut s = shape(i, h, c);
            s.num_groups = c.max(2);
            let net = DgaNetwork::new(s, &mut rng).unwrap();
            let features = Matrix::uniform(4, i, 1.0, &mut rng);
            let out = net.forward(&chain_graph(), &features, &[0; 4]).unwrap();
            assert_eq!((out.rows(), out.cols()), (4, c));
        }
    }

    #[test]
    fn test_wrong_feature_width_is_fatal() {
        let mut rng = StdRng::seed_from_u64(0);
        let net = DgaNetwork::new(shape(10, 16, 2), &mut rng).unwrap();
        let features = Matrix::zeros(4, 9);
        let err = net.forward(&chain_graph(), &features, &[0; 4]).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { expected: 10, actual: 9, .. }));
    }

    #[test]
    fn test_parameter_layout() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut net = DgaNetwork::new(shape(3, 4, 2), &mut rng).unwrap();
        // Each layer: self + 2 groups; head: weight + bias.
        let expected = (3 * 4) * 3 + (4 * 4) * 3 + 4 * 2 + 2;
        assert_eq!(net.parameter_count(), expected);

        let graph = chain_graph();
        let features = Matrix::uniform(4, 3, 1.0, &mut rng);
        let groups = [0, 1, 1, 0];
        let cache = net.forward_cached(&graph, &features, &groups).unwrap();
        let grad = Matrix::uniform(4, 2, 1.0, &mut rng);
        let grads = net.backward(&graph, &features, &groups, &cache, &grad).unwrap();

        let grad_lens: Vec<usize> = grads.slices().iter().map(|g| g.len()).collect();
        let param_lens: Vec<usize> = net.parameters_mut().iter().map(|p| p.len()).collect();
        assert_eq!(grad_lens, param_lens);
    }

    #[test]
    fn test_predictions() {
        let logits = Matrix::from_vec(3, 2, vec![0.1, 0.9, 2.0, -1.0, 0.0, 0.0]).unwrap();
        assert_eq!(predictions(&logits), vec![1, 0, 0]);
    }
}
