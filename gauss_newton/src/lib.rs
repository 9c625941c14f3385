//! Gauss-Newton approximations of feed forward networks, ready to be trained with
//! Hessian-free optimization.

pub mod error;
pub mod init;
pub mod layers;
pub mod learner;
pub mod loss;
pub mod network;
pub mod objective;
pub mod sample;

pub use error::{NetErr, Result};
pub use init::Init;
pub use layers::LayerSpec;
pub use learner::NeuralNetLearner;
pub use loss::{LossFn, Mse, SigmoidCrossEntropy, SoftmaxCrossEntropy};
pub use network::Network;
pub use objective::GaussNewton;
pub use sample::VectorSample;
