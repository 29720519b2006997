//! Activation function modules.
//!
//! # References
//!
//! - Nair, V., & Hinton, G. E. (2010). Rectified linear units improve restricted
//!   Boltzmann machines. ICML.

use super::module::Module;
use crate::autograd::Tensor;
use crate::error::{EnganarError, Result};

/// Rectified Linear Unit activation: ReLU(x) = max(0, x)
///
/// # Shape
///
/// - Input: `(*)` any shape
/// - Output: `(*)` same shape as input
///
/// # Example
///
/// ```
/// use enganar::autograd::Tensor;
/// use enganar::nn::{Module, ReLU};
///
/// let y = ReLU::new().forward(&Tensor::from_slice(&[-1.0, 0.0, 1.0, 2.0]));
/// assert_eq!(y.data(), &[0.0, 0.0, 1.0, 2.0]);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ReLU;

impl ReLU {
    /// Create a new ReLU activation.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Module for ReLU {
    fn forward(&self, input: &Tensor) -> Tensor {
        input.relu()
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        Ok(input_shape.to_vec())
    }
}

/// Flattens every dimension after the first: `[N, d1, d2, ...]` → `[N, d1*d2*...]`.
///
/// Implemented as a recorded view, so gradients reach the unflattened input.
#[derive(Debug, Clone, Copy, Default)]
pub struct Flatten;

impl Flatten {
    /// Create a new Flatten layer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Module for Flatten {
    fn forward(&self, input: &Tensor) -> Tensor {
        let shape = input.shape();
        assert!(!shape.is_empty(), "Flatten expects a batch dimension");
        let features: usize = shape[1..].iter().product();
        input.view(&[shape[0], features])
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        match input_shape.split_first() {
            Some((&batch, rest)) => Ok(vec![batch, rest.iter().product()]),
            None => Err(EnganarError::shape_mismatch(
                "Flatten input",
                input_shape,
                "[N, ...] with a batch dimension",
            )),
        }
    }
}
