//! Fully connected (linear) layer.
//!
//! Implements the transformation y = xW^T + b.
//!
//! # References
//!
//! - Glorot, X., & Bengio, Y. (2010). Understanding the difficulty of training
//!   deep feedforward neural networks. AISTATS.

use super::init::{xavier_uniform, zeros};
use super::module::Module;
use crate::autograd::{no_grad, Tensor};
use crate::error::{EnganarError, Result};

/// Fully connected layer: y = xW^T + b
///
/// Weights are frozen: they never require gradients, so running the layer
/// only records operations on the input path. Weight initialization follows
/// Xavier/Glorot (Glorot & Bengio, 2010).
///
/// # Shape
///
/// - Input: `(*, in_features)` where `*` means any number of batch dimensions
/// - Output: `(*, out_features)`
///
/// # Example
///
/// ```
/// use enganar::autograd::Tensor;
/// use enganar::nn::{Linear, Module};
///
/// let layer = Linear::with_seed(20, 30, Some(7));
/// let output = layer.forward(&Tensor::zeros(&[4, 20]));
///
/// assert_eq!(output.shape(), &[4, 30]);
/// ```
pub struct Linear {
    /// Weight matrix, shape: [out_features, in_features]
    weight: Tensor,

    /// Transposed weight [in_features, out_features], kept in sync with `weight`
    weight_t: Tensor,

    /// Bias vector, shape: [out_features], or None if bias=false
    bias: Option<Tensor>,

    in_features: usize,
    out_features: usize,
}

impl Linear {
    /// Create a new Linear layer with Xavier initialization.
    #[must_use]
    pub fn new(in_features: usize, out_features: usize) -> Self {
        Self::with_seed(in_features, out_features, None)
    }

    /// Create a Linear layer with a specific random seed.
    #[must_use]
    pub fn with_seed(in_features: usize, out_features: usize, seed: Option<u64>) -> Self {
        let weight = xavier_uniform(
            &[out_features, in_features],
            in_features,
            out_features,
            seed,
        );
        let weight_t = no_grad(|| weight.transpose());

        Self {
            weight,
            weight_t,
            bias: Some(zeros(&[out_features])),
            in_features,
            out_features,
        }
    }

    /// Build a layer from pre-trained weights.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `weight` is not 2D or `bias` does not
    /// have one entry per output feature.
    pub fn from_weights(weight: Tensor, bias: Option<Tensor>) -> Result<Self> {
        if weight.ndim() != 2 {
            return Err(EnganarError::shape_mismatch(
                "weight",
                weight.shape(),
                "[out_features, in_features]",
            ));
        }
        let (out_features, in_features) = (weight.shape()[0], weight.shape()[1]);
        if let Some(b) = &bias {
            if b.shape() != [out_features] {
                return Err(EnganarError::shape_mismatch(
                    "bias",
                    b.shape(),
                    &format!("[{out_features}]"),
                ));
            }
        }

        let weight = weight.detach();
        let weight_t = no_grad(|| weight.transpose());
        Ok(Self {
            weight,
            weight_t,
            bias: bias.map(|b| b.detach()),
            in_features,
            out_features,
        })
    }

    /// Get the input feature dimension.
    #[must_use]
    pub fn in_features(&self) -> usize {
        self.in_features
    }

    /// Get the output feature dimension.
    #[must_use]
    pub fn out_features(&self) -> usize {
        self.out_features
    }

    /// Get reference to weight tensor.
    #[must_use]
    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    /// Get reference to bias tensor if present.
    #[must_use]
    pub fn bias(&self) -> Option<&Tensor> {
        self.bias.as_ref()
    }
}

impl Module for Linear {
    fn forward(&self, input: &Tensor) -> Tensor {
        let input_shape = input.shape();
        let ndim = input_shape.len();
        assert!(ndim >= 1, "Linear expects at least a feature dimension");
        assert_eq!(
            input_shape[ndim - 1],
            self.in_features,
            "Linear expects {} input features, got {:?}",
            self.in_features,
            input_shape
        );

        // Flatten batch dimensions so matmul sees [batch, in_features]
        let batch_shape = &input_shape[..ndim - 1];
        let batch: usize = batch_shape.iter().product();
        let reshaped = if ndim == 2 {
            input.clone()
        } else {
            input.view(&[batch, self.in_features])
        };

        let output = reshaped.matmul(&self.weight_t);
        let output = match &self.bias {
            Some(b) => output.broadcast_add(b),
            None => output,
        };

        if ndim == 2 {
            output
        } else {
            let mut shape = batch_shape.to_vec();
            shape.push(self.out_features);
            output.view(&shape)
        }
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        match input_shape.split_last() {
            Some((&features, batch)) if features == self.in_features => {
                let mut shape = batch.to_vec();
                shape.push(self.out_features);
                Ok(shape)
            }
            _ => Err(EnganarError::shape_mismatch(
                "Linear input",
                input_shape,
                &format!("[*, {}]", self.in_features),
            )),
        }
    }

    fn parameters(&self) -> Vec<&Tensor> {
        match &self.bias {
            Some(b) => vec![&self.weight, b],
            None => vec![&self.weight],
        }
    }

}

impl std::fmt::Debug for Linear {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Linear")
            .field("in_features", &self.in_features)
            .field("out_features", &self.out_features)
            .field("bias", &self.bias.is_some())
            .finish()
    }
}
