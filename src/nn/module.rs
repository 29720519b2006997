//! The [`Module`] trait shared by every layer.

use crate::autograd::{no_grad, Tensor};
use crate::error::Result;

/// A differentiable building block of a network.
///
/// `forward` must be built from recorded tensor operations so that
/// gradients flow from the output back to the input.
pub trait Module {
    /// Compute the output for `input`.
    ///
    /// # Panics
    ///
    /// May panic if `input` has a shape [`Module::output_shape`] rejects.
    fn forward(&self, input: &Tensor) -> Tensor;

    /// Shape `forward` produces for an input of `input_shape`.
    ///
    /// The default runs a forward pass on zeros without recording, so a
    /// module that cannot accept the shape panics here. Built-in layers
    /// override it to return `InvalidArgument` instead.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the module cannot accept `input_shape`.
    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        let probe = Tensor::zeros(input_shape);
        Ok(no_grad(|| self.forward(&probe)).shape().to_vec())
    }

    /// Parameters of this module (and its children).
    fn parameters(&self) -> Vec<&Tensor> {
        Vec::new()
    }

    /// Total number of scalar parameters.
    fn num_parameters(&self) -> usize {
        self.parameters().iter().map(|p| p.numel()).sum()
    }
}
