//! Gradient function trait and implementations.
//!
//! Each differentiable operation implements `GradFn` to define
//! how gradients flow backward through the operation. Backward passes
//! work on raw data and never record to the graph themselves.

use super::tensor::Tensor;

/// Trait for functions that compute gradients during backward pass.
///
/// For element-wise addition z = x + y:
/// - ∂z/∂x = 1
/// - ∂z/∂y = 1
///
/// So `backward(grad_output)` returns [`grad_output`, `grad_output`].
pub trait GradFn: Send + Sync {
    /// Compute gradients with respect to inputs.
    ///
    /// Returns one gradient per input tensor, in the order the inputs
    /// were recorded during the forward pass.
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor>;

    /// Human-readable name for debugging.
    fn name(&self) -> &'static str;
}

fn map_grad(grad_output: &Tensor, f: impl Fn(f32) -> f32) -> Tensor {
    let data: Vec<f32> = grad_output.data().iter().map(|&g| f(g)).collect();
    Tensor::from_vec(data, grad_output.shape())
}

fn zip_grad(grad_output: &Tensor, saved: &Tensor, f: impl Fn(f32, f32) -> f32) -> Tensor {
    let data: Vec<f32> = grad_output
        .data()
        .iter()
        .zip(saved.data())
        .map(|(&g, &s)| f(g, s))
        .collect();
    Tensor::from_vec(data, grad_output.shape())
}

/// Reduce a gradient back to the shape of a broadcast operand.
///
/// Supports same-shape operands, single-element operands, and row
/// vectors broadcast over the leading dimension.
fn reduce_to_shape(grad: &Tensor, shape: &[usize]) -> Tensor {
    if grad.shape() == shape {
        return grad.clone();
    }

    let target: usize = shape.iter().product();
    if target == 1 {
        let total: f32 = grad.data().iter().sum();
        return Tensor::new(&[total], shape);
    }

    assert_eq!(
        grad.numel() % target,
        0,
        "cannot reduce gradient of shape {:?} to {:?}",
        grad.shape(),
        shape
    );
    let mut reduced = vec![0.0; target];
    for row in grad.data().chunks(target) {
        for (acc, &g) in reduced.iter_mut().zip(row) {
            *acc += g;
        }
    }
    Tensor::from_vec(reduced, shape)
}

// ============================================================================
// Element-wise Operations
// ============================================================================

/// Gradient function for addition: z = x + y
pub(crate) struct AddBackward {
    pub(crate) x_shape: Vec<usize>,
    pub(crate) y_shape: Vec<usize>,
}

impl GradFn for AddBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        vec![
            reduce_to_shape(grad_output, &self.x_shape),
            reduce_to_shape(grad_output, &self.y_shape),
        ]
    }

    fn name(&self) -> &'static str {
        "AddBackward"
    }
}

/// Gradient function for subtraction: z = x - y
pub(crate) struct SubBackward {
    pub(crate) x_shape: Vec<usize>,
    pub(crate) y_shape: Vec<usize>,
}

impl GradFn for SubBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        // ∂(x-y)/∂y = -1
        let neg = map_grad(grad_output, |g| -g);
        vec![
            reduce_to_shape(grad_output, &self.x_shape),
            reduce_to_shape(&neg, &self.y_shape),
        ]
    }

    fn name(&self) -> &'static str {
        "SubBackward"
    }
}

/// Gradient function for multiplication: z = x * y
pub(crate) struct MulBackward {
    pub(crate) x: Tensor,
    pub(crate) y: Tensor,
}

impl GradFn for MulBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        // ∂(x*y)/∂x = y, ∂(x*y)/∂y = x
        vec![
            zip_grad(grad_output, &self.y, |g, y| g * y),
            zip_grad(grad_output, &self.x, |g, x| g * x),
        ]
    }

    fn name(&self) -> &'static str {
        "MulBackward"
    }
}

/// Gradient function for division: z = x / y
pub(crate) struct DivBackward {
    pub(crate) x: Tensor,
    pub(crate) y: Tensor,
}

impl GradFn for DivBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        // ∂(x/y)/∂x = 1/y, ∂(x/y)/∂y = -x/y²
        let grad_x = zip_grad(grad_output, &self.y, |g, y| g / y);
        let grad_y: Vec<f32> = grad_output
            .data()
            .iter()
            .zip(self.x.data())
            .zip(self.y.data())
            .map(|((&g, &x), &y)| -g * x / (y * y))
            .collect();
        vec![grad_x, Tensor::from_vec(grad_y, grad_output.shape())]
    }

    fn name(&self) -> &'static str {
        "DivBackward"
    }
}

/// Gradient function for negation: z = -x
pub(crate) struct NegBackward;

impl GradFn for NegBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        vec![map_grad(grad_output, |g| -g)]
    }

    fn name(&self) -> &'static str {
        "NegBackward"
    }
}

/// Gradient function for an affine map with scalar coefficients: z = x * scale + shift
pub(crate) struct AffineBackward {
    pub(crate) scale: f32,
}

impl GradFn for AffineBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        vec![map_grad(grad_output, |g| g * self.scale)]
    }

    fn name(&self) -> &'static str {
        "AffineBackward"
    }
}

// ============================================================================
// Transcendental Operations
// ============================================================================

/// Gradient function for exp: z = exp(x)
pub(crate) struct ExpBackward {
    pub(crate) output: Tensor,
}

impl GradFn for ExpBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        vec![zip_grad(grad_output, &self.output, |g, e| g * e)]
    }

    fn name(&self) -> &'static str {
        "ExpBackward"
    }
}

/// Gradient function for log: z = log(x)
pub(crate) struct LogBackward {
    pub(crate) x: Tensor,
}

impl GradFn for LogBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        vec![zip_grad(grad_output, &self.x, |g, x| g / x)]
    }

    fn name(&self) -> &'static str {
        "LogBackward"
    }
}

// ============================================================================
// Reduction Operations
// ============================================================================

/// Gradient function for sum: z = sum(x)
pub(crate) struct SumBackward {
    pub(crate) input_shape: Vec<usize>,
}

impl GradFn for SumBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        vec![Tensor::full(&self.input_shape, grad_output.item())]
    }

    fn name(&self) -> &'static str {
        "SumBackward"
    }
}

/// Gradient function for mean: z = mean(x)
pub(crate) struct MeanBackward {
    pub(crate) input_shape: Vec<usize>,
}

impl GradFn for MeanBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let numel: usize = self.input_shape.iter().product();
        vec![Tensor::full(
            &self.input_shape,
            grad_output.item() / numel as f32,
        )]
    }

    fn name(&self) -> &'static str {
        "MeanBackward"
    }
}

// ============================================================================
// Activation Functions
// ============================================================================

/// Gradient function for `ReLU`: z = max(0, x)
pub(crate) struct ReluBackward {
    pub(crate) x: Tensor,
}

impl GradFn for ReluBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        vec![zip_grad(grad_output, &self.x, |g, x| {
            if x > 0.0 {
                g
            } else {
                0.0
            }
        })]
    }

    fn name(&self) -> &'static str {
        "ReluBackward"
    }
}

/// Gradient function for softmax over the last dimension of a 2D tensor.
///
/// For y = softmax(x): ∂L/∂x_i = y_i * (g_i - Σ_j g_j * y_j)
pub(crate) struct SoftmaxBackward {
    pub(crate) output: Tensor,
}

impl GradFn for SoftmaxBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let features = self.output.shape()[1];
        let mut grad_input = Vec::with_capacity(self.output.numel());

        for (y_row, g_row) in self
            .output
            .data()
            .chunks(features)
            .zip(grad_output.data().chunks(features))
        {
            let dot: f32 = y_row.iter().zip(g_row).map(|(y, g)| y * g).sum();
            grad_input.extend(y_row.iter().zip(g_row).map(|(y, g)| y * (g - dot)));
        }

        vec![Tensor::from_vec(grad_input, grad_output.shape())]
    }

    fn name(&self) -> &'static str {
        "SoftmaxBackward"
    }
}

/// Gradient function for softmax cross-entropy against probability targets.
///
/// For L = -(1/B) Σ_b Σ_i t_bi * log(softmax(x_b)_i) with Σ_i t_bi = 1:
/// ∂L/∂x_bi = (softmax(x_b)_i - t_bi) / B
pub(crate) struct SoftmaxCrossEntropyBackward {
    pub(crate) softmax_output: Tensor,
    pub(crate) targets: Tensor,
}

impl GradFn for SoftmaxCrossEntropyBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let batch = self.softmax_output.shape()[0].max(1) as f32;
        let scale = grad_output.item() / batch;
        vec![zip_grad(&self.softmax_output, &self.targets, |p, t| {
            (p - t) * scale
        })]
    }

    fn name(&self) -> &'static str {
        "SoftmaxCrossEntropyBackward"
    }
}

// ============================================================================
// Linear Algebra and Shape
// ============================================================================

/// Gradient function for matrix multiplication: z = x @ y
///
/// ∂L/∂x = g @ yᵀ, ∂L/∂y = xᵀ @ g
pub(crate) struct MatmulBackward {
    pub(crate) x: Tensor,
    pub(crate) y: Tensor,
}

impl GradFn for MatmulBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let (m, k) = (self.x.shape()[0], self.x.shape()[1]);
        let n = self.y.shape()[1];
        let (x, y, g) = (self.x.data(), self.y.data(), grad_output.data());

        let mut grad_x = vec![0.0; m * k];
        for i in 0..m {
            for p in 0..k {
                grad_x[i * k + p] = (0..n).map(|j| g[i * n + j] * y[p * n + j]).sum();
            }
        }

        let mut grad_y = vec![0.0; k * n];
        for p in 0..k {
            for j in 0..n {
                grad_y[p * n + j] = (0..m).map(|i| x[i * k + p] * g[i * n + j]).sum();
            }
        }

        vec![
            Tensor::from_vec(grad_x, &[m, k]),
            Tensor::from_vec(grad_y, &[k, n]),
        ]
    }

    fn name(&self) -> &'static str {
        "MatmulBackward"
    }
}

/// Gradient function for 2D transpose.
pub(crate) struct TransposeBackward;

impl GradFn for TransposeBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let (rows, cols) = (grad_output.shape()[0], grad_output.shape()[1]);
        let g = grad_output.data();
        let mut data = vec![0.0; rows * cols];
        for i in 0..rows {
            for j in 0..cols {
                data[j * rows + i] = g[i * cols + j];
            }
        }
        vec![Tensor::from_vec(data, &[cols, rows])]
    }

    fn name(&self) -> &'static str {
        "TransposeBackward"
    }
}

/// Gradient function for matrix + row-vector broadcast addition.
pub(crate) struct BroadcastAddBackward {
    pub(crate) y_shape: Vec<usize>,
}

impl GradFn for BroadcastAddBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        vec![
            grad_output.clone(),
            reduce_to_shape(grad_output, &self.y_shape),
        ]
    }

    fn name(&self) -> &'static str {
        "BroadcastAddBackward"
    }
}

/// Gradient function for reshape (view).
pub(crate) struct ViewBackward {
    pub(crate) input_shape: Vec<usize>,
}

impl GradFn for ViewBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        vec![Tensor::new(grad_output.data(), &self.input_shape)]
    }

    fn name(&self) -> &'static str {
        "ViewBackward"
    }
}
