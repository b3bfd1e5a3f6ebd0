//! Graph Neural Network Module
//!
//! Dynamic Group-Aware aggregation and the pieces needed to train it:
//! - Dense matrices and linear maps with manual backward passes
//! - The DGA layer (group-routed scatter-sum message passing)
//! - The two-layer DGA network with a classification head
//! - Masked cross-entropy and Adam/SGD optimizers

pub mod layer;
pub mod linear;
pub mod loss;
pub mod matrix;
pub mod network;
pub mod optim;

pub use layer::{DgaLayer, DgaLayerGradients};
pub use linear::{Linear, LinearGradients};
pub use loss::{accuracy, cross_entropy, LossOutput};
pub use matrix::Matrix;
pub use network::{predictions, DgaNetwork, ForwardCache, NetworkGradients, NetworkShape};
pub use optim::{Adam, Optimizer, Sgd};
