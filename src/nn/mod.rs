//! Neural network building blocks for image classifiers.
//!
//! The nn module is organized around the [`Module`] trait:
//!
//! - **Layers**: [`Linear`], [`Flatten`]
//! - **Activations**: [`ReLU`]
//! - **Containers**: [`Sequential`]
//! - **Losses**: [`loss::softmax_cross_entropy`]
//!
//! Every forward pass is built from recorded tensor operations, so the
//! gradient of a loss with respect to the *input image* is available through
//! [`crate::autograd`].
//!
//! # Example
//!
//! ```
//! use enganar::autograd::Tensor;
//! use enganar::nn::{Flatten, Linear, Module, ReLU, Sequential};
//!
//! let model = Sequential::new()
//!     .add(Flatten::new())
//!     .add(Linear::with_seed(12, 8, Some(0)))
//!     .add(ReLU::new())
//!     .add(Linear::with_seed(8, 3, Some(1)));
//!
//! let logits = model.forward(&Tensor::zeros(&[1, 2, 2, 3]));
//! assert_eq!(logits.shape(), &[1, 3]);
//! ```
//!
//! # References
//!
//! - Paszke, A., et al. (2019). `PyTorch`: An imperative style, high-performance
//!   deep learning library. `NeurIPS`.

mod activation;
mod container;
pub mod init;
mod linear;
pub mod loss;
mod module;

pub use activation::{Flatten, ReLU};
pub use container::Sequential;
pub use init::{kaiming_uniform, xavier_uniform};
pub use linear::Linear;
pub use module::Module;
