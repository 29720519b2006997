//! Differentiable operations for tensors.
//!
//! Each operation:
//! 1. Computes the forward result
//! 2. Records a `GradFn` to the computation graph (if gradient tracking is
//!    enabled and any input requires gradients)
//!
//! `sign` and `clamp` are piecewise constant or non-smooth selections used
//! only to post-process gradients and images; they always return detached
//! leaves.

use std::sync::Arc;

use super::grad_fn::{
    AddBackward, AffineBackward, BroadcastAddBackward, DivBackward, ExpBackward, GradFn,
    LogBackward, MatmulBackward, MeanBackward, MulBackward, NegBackward, ReluBackward,
    SoftmaxBackward, SubBackward, SumBackward, TransposeBackward, ViewBackward,
};
use super::tensor::Tensor;
use super::{is_grad_enabled, with_graph};

/// Attach `result` to the graph when any input is tracked.
pub(crate) fn track(
    mut result: Tensor,
    inputs: &[&Tensor],
    make_grad_fn: impl FnOnce(&Tensor) -> Arc<dyn GradFn>,
) -> Tensor {
    if !is_grad_enabled() || !inputs.iter().any(|t| t.requires_grad_enabled()) {
        return result;
    }

    result.requires_grad_(true);
    let grad_fn = make_grad_fn(&result);
    result.set_grad_fn(grad_fn.clone());

    with_graph(|graph| {
        for input in inputs {
            graph.register_tensor((*input).clone());
        }
        graph.record(result.id(), grad_fn, inputs.iter().map(|t| t.id()).collect());
    });

    result
}

fn assert_same_shape(op: &str, a: &Tensor, b: &Tensor) {
    assert_eq!(
        a.shape(),
        b.shape(),
        "{op}: shape mismatch {:?} vs {:?}",
        a.shape(),
        b.shape()
    );
}

impl Tensor {
    fn map(&self, f: impl Fn(f32) -> f32) -> Tensor {
        Tensor::from_vec(self.data().iter().map(|&a| f(a)).collect(), self.shape())
    }

    fn zip_map(&self, other: &Tensor, f: impl Fn(f32, f32) -> f32) -> Tensor {
        let data = self
            .data()
            .iter()
            .zip(other.data())
            .map(|(&a, &b)| f(a, b))
            .collect();
        Tensor::from_vec(data, self.shape())
    }
}

// ============================================================================
// Element-wise Operations
// ============================================================================

impl Tensor {
    /// Element-wise addition: z = self + other
    #[must_use]
    pub fn add(&self, other: &Tensor) -> Tensor {
        assert_same_shape("add", self, other);
        let result = self.zip_map(other, |a, b| a + b);
        track(result, &[self, other], |_| {
            Arc::new(AddBackward {
                x_shape: self.shape().to_vec(),
                y_shape: other.shape().to_vec(),
            })
        })
    }

    /// Element-wise subtraction: z = self - other
    #[must_use]
    pub fn sub(&self, other: &Tensor) -> Tensor {
        assert_same_shape("sub", self, other);
        let result = self.zip_map(other, |a, b| a - b);
        track(result, &[self, other], |_| {
            Arc::new(SubBackward {
                x_shape: self.shape().to_vec(),
                y_shape: other.shape().to_vec(),
            })
        })
    }

    /// Element-wise multiplication: z = self * other
    #[must_use]
    pub fn mul(&self, other: &Tensor) -> Tensor {
        assert_same_shape("mul", self, other);
        let result = self.zip_map(other, |a, b| a * b);
        track(result, &[self, other], |_| {
            Arc::new(MulBackward {
                x: self.clone(),
                y: other.clone(),
            })
        })
    }

    /// Element-wise division: z = self / other
    #[must_use]
    pub fn div(&self, other: &Tensor) -> Tensor {
        assert_same_shape("div", self, other);
        let result = self.zip_map(other, |a, b| a / b);
        track(result, &[self, other], |_| {
            Arc::new(DivBackward {
                x: self.clone(),
                y: other.clone(),
            })
        })
    }

    /// Element-wise negation: z = -self
    #[must_use]
    pub fn neg(&self) -> Tensor {
        track(self.map(|a| -a), &[self], |_| Arc::new(NegBackward))
    }

    /// Scalar multiplication: z = self * scalar
    #[must_use]
    pub fn mul_scalar(&self, scalar: f32) -> Tensor {
        self.affine(scalar, 0.0)
    }

    /// Affine map with scalar coefficients: z = self * scale + shift
    ///
    /// Used for pixel preprocessing, e.g. `affine(1.0 / 127.5, -1.0)` maps
    /// `[0, 255]` onto `[-1, 1]`.
    #[must_use]
    pub fn affine(&self, scale: f32, shift: f32) -> Tensor {
        track(self.map(|a| a * scale + shift), &[self], |_| {
            Arc::new(AffineBackward { scale })
        })
    }
}

// ============================================================================
// Transcendental Operations
// ============================================================================

impl Tensor {
    /// Element-wise exponential: z = exp(self)
    #[must_use]
    pub fn exp(&self) -> Tensor {
        track(self.map(f32::exp), &[self], |out| {
            Arc::new(ExpBackward {
                output: out.clone(),
            })
        })
    }

    /// Element-wise natural logarithm: z = log(self)
    #[must_use]
    pub fn log(&self) -> Tensor {
        track(self.map(f32::ln), &[self], |_| {
            Arc::new(LogBackward { x: self.clone() })
        })
    }
}

// ============================================================================
// Reduction Operations
// ============================================================================

impl Tensor {
    /// Sum all elements: z = sum(self)
    #[must_use]
    pub fn sum(&self) -> Tensor {
        let total: f32 = self.data().iter().sum();
        track(Tensor::new(&[total], &[1]), &[self], |_| {
            Arc::new(SumBackward {
                input_shape: self.shape().to_vec(),
            })
        })
    }

    /// Mean of all elements: z = mean(self)
    #[must_use]
    pub fn mean(&self) -> Tensor {
        let total: f32 = self.data().iter().sum();
        let mean = total / self.numel() as f32;
        track(Tensor::new(&[mean], &[1]), &[self], |_| {
            Arc::new(MeanBackward {
                input_shape: self.shape().to_vec(),
            })
        })
    }
}

// ============================================================================
// Activation Functions
// ============================================================================

impl Tensor {
    /// `ReLU` activation: z = max(0, self)
    #[must_use]
    pub fn relu(&self) -> Tensor {
        track(self.map(|a| a.max(0.0)), &[self], |_| {
            Arc::new(ReluBackward { x: self.clone() })
        })
    }

    /// Softmax over the last dimension of a 2D tensor.
    ///
    /// Uses max subtraction for numerical stability.
    #[must_use]
    pub fn softmax(&self) -> Tensor {
        assert_eq!(self.ndim(), 2, "softmax currently only supports 2D tensors");
        let output = softmax_rows(self.data(), self.shape()[1]);
        track(Tensor::from_vec(output, self.shape()), &[self], |out| {
            Arc::new(SoftmaxBackward {
                output: out.clone(),
            })
        })
    }
}

/// Row-wise softmax of a flat `[rows, features]` buffer.
pub(crate) fn softmax_rows(data: &[f32], features: usize) -> Vec<f32> {
    let mut output = Vec::with_capacity(data.len());
    for row in data.chunks(features) {
        let max_val = row.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        let start = output.len();
        output.extend(row.iter().map(|&v| (v - max_val).exp()));
        let sum: f32 = output[start..].iter().sum();
        for p in &mut output[start..] {
            *p /= sum;
        }
    }
    output
}

/// Row-wise log-softmax of a flat `[rows, features]` buffer.
pub(crate) fn log_softmax_rows(data: &[f32], features: usize) -> Vec<f32> {
    let mut output = Vec::with_capacity(data.len());
    for row in data.chunks(features) {
        let max_val = row.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        let log_sum_exp = row.iter().map(|&v| (v - max_val).exp()).sum::<f32>().ln();
        output.extend(row.iter().map(|&v| v - max_val - log_sum_exp));
    }
    output
}

// ============================================================================
// Linear Algebra and Shape
// ============================================================================

impl Tensor {
    /// Matrix multiplication: z = self @ other (2D only).
    #[must_use]
    pub fn matmul(&self, other: &Tensor) -> Tensor {
        assert_eq!(self.ndim(), 2, "matmul requires 2D tensors");
        assert_eq!(other.ndim(), 2, "matmul requires 2D tensors");

        let (m, k1) = (self.shape()[0], self.shape()[1]);
        let (k2, n) = (other.shape()[0], other.shape()[1]);
        assert_eq!(k1, k2, "matmul dimension mismatch: {k1} vs {k2}");

        // trueno's SIMD matmul
        let a_matrix =
            trueno::Matrix::from_vec(m, k1, self.data().to_vec()).expect("valid matrix dimensions");
        let b_matrix = trueno::Matrix::from_vec(k2, n, other.data().to_vec())
            .expect("valid matrix dimensions");
        let product = a_matrix.matmul(&b_matrix).expect("matmul should succeed");

        let result = Tensor::new(product.as_slice(), &[m, n]);
        track(result, &[self, other], |_| {
            Arc::new(MatmulBackward {
                x: self.clone(),
                y: other.clone(),
            })
        })
    }

    /// Transpose a 2D tensor.
    #[must_use]
    pub fn transpose(&self) -> Tensor {
        assert_eq!(self.ndim(), 2, "transpose requires 2D tensor");

        let (rows, cols) = (self.shape()[0], self.shape()[1]);
        let mut data = vec![0.0; rows * cols];
        for i in 0..rows {
            for j in 0..cols {
                data[j * rows + i] = self.data()[i * cols + j];
            }
        }

        track(Tensor::from_vec(data, &[cols, rows]), &[self], |_| {
            Arc::new(TransposeBackward)
        })
    }

    /// Broadcast addition: `[N, M]` matrix + `[M]` vector, over rows.
    #[must_use]
    pub fn broadcast_add(&self, other: &Tensor) -> Tensor {
        assert_eq!(self.ndim(), 2, "broadcast_add requires 2D matrix");
        assert_eq!(other.ndim(), 1, "broadcast_add requires 1D vector");
        let cols = self.shape()[1];
        assert_eq!(
            cols,
            other.shape()[0],
            "Matrix columns {} must match vector length {}",
            cols,
            other.shape()[0]
        );

        let data: Vec<f32> = self
            .data()
            .chunks(cols)
            .flat_map(|row| row.iter().zip(other.data()).map(|(&a, &b)| a + b))
            .collect();

        track(Tensor::from_vec(data, self.shape()), &[self, other], |_| {
            Arc::new(BroadcastAddBackward {
                y_shape: other.shape().to_vec(),
            })
        })
    }

    /// Reshape tensor to a new shape (view).
    ///
    /// # Panics
    ///
    /// Panics if the number of elements differs.
    #[must_use]
    pub fn view(&self, new_shape: &[usize]) -> Tensor {
        let new_numel: usize = new_shape.iter().product();
        assert_eq!(
            self.numel(),
            new_numel,
            "view: number of elements must match ({} vs {new_numel})",
            self.numel()
        );

        track(Tensor::new(self.data(), new_shape), &[self], |_| {
            Arc::new(ViewBackward {
                input_shape: self.shape().to_vec(),
            })
        })
    }
}

// ============================================================================
// Non-differentiable Operations
// ============================================================================

impl Tensor {
    /// Element-wise sign: -1 for negative, 0 for zero, +1 for positive.
    ///
    /// NaN maps to 0.
    #[must_use]
    pub fn sign(&self) -> Tensor {
        self.map(|a| {
            if a > 0.0 {
                1.0
            } else if a < 0.0 {
                -1.0
            } else {
                0.0
            }
        })
    }

    /// Element-wise clip into `[min, max]`.
    ///
    /// NaN maps to `min`.
    #[must_use]
    pub fn clamp(&self, min: f32, max: f32) -> Tensor {
        self.map(|a| if a.is_nan() { min } else { a.clamp(min, max) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::{clear_graph, get_grad, no_grad};

    /// Central-difference gradient of a scalar function.
    fn numerical_gradient<F>(f: F, x: &Tensor, eps: f32) -> Vec<f32>
    where
        F: Fn(&Tensor) -> Tensor,
    {
        (0..x.numel())
            .map(|i| {
                let mut plus = x.data().to_vec();
                let mut minus = x.data().to_vec();
                plus[i] += eps;
                minus[i] -= eps;
                let y_plus = no_grad(|| f(&Tensor::new(&plus, x.shape())).item());
                let y_minus = no_grad(|| f(&Tensor::new(&minus, x.shape())).item());
                (y_plus - y_minus) / (2.0 * eps)
            })
            .collect()
    }

    fn analytical_gradient<F>(f: F, x: &Tensor) -> Vec<f32>
    where
        F: Fn(&Tensor) -> Tensor,
    {
        clear_graph();
        let leaf = x.detach().requires_grad();
        let id = leaf.id();
        f(&leaf).backward();
        let grad = get_grad(id).expect("gradient should exist");
        clear_graph();
        grad.data().to_vec()
    }

    fn assert_close(a: &[f32], b: &[f32], tol: f32) {
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < tol, "{a:?} vs {b:?}");
        }
    }

    #[test]
    fn test_simple_sum_gradient() {
        let g = analytical_gradient(|x| x.sum(), &Tensor::from_slice(&[1.0, 2.0, 3.0]));
        assert_eq!(g, vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_mul_gradient() {
        let y = Tensor::from_slice(&[4.0, 5.0, 6.0]);
        let g = analytical_gradient(|x| x.mul(&y).sum(), &Tensor::from_slice(&[1.0, 2.0, 3.0]));
        assert_eq!(g, vec![4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_affine_gradient() {
        let g = analytical_gradient(
            |x| x.affine(1.0 / 127.5, -1.0).sum(),
            &Tensor::from_slice(&[0.0, 255.0]),
        );
        assert_close(&g, &[1.0 / 127.5, 1.0 / 127.5], 1e-7);
    }

    #[test]
    fn test_exp_log_gradient_matches_numerical() {
        let x = Tensor::from_slice(&[0.5, 1.0, 1.5]);
        let f = |t: &Tensor| t.exp().add(&Tensor::ones(&[3])).log().mean();
        assert_close(&analytical_gradient(f, &x), &numerical_gradient(f, &x, 1e-3), 1e-3);
    }

    #[test]
    fn test_softmax_gradient_matches_numerical() {
        let x = Tensor::new(&[0.1, 0.7, -0.3, 1.2, 0.0, 0.4], &[2, 3]);
        let w = Tensor::new(&[1.0, -2.0, 0.5, 0.3, 0.9, -1.1], &[2, 3]);
        let f = |t: &Tensor| t.softmax().mul(&w).sum();
        assert_close(&analytical_gradient(f, &x), &numerical_gradient(f, &x, 1e-3), 1e-3);
    }

    #[test]
    fn test_matmul_forward_and_gradient() {
        let w = Tensor::new(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[3, 2]);
        let x = Tensor::new(&[1.0, 0.5, -1.0], &[1, 3]);

        let z = no_grad(|| x.matmul(&w));
        assert_eq!(z.shape(), &[1, 2]);
        assert_close(z.data(), &[-2.5, -2.0], 1e-5);

        let f = |t: &Tensor| t.matmul(&w).exp().sum();
        assert_close(&analytical_gradient(f, &x), &numerical_gradient(f, &x, 1e-2), 1e-2);
    }

    #[test]
    fn test_view_and_broadcast_add_gradient() {
        let b = Tensor::from_slice(&[0.5, -0.5]);
        let f = |t: &Tensor| t.view(&[2, 2]).broadcast_add(&b).exp().sum();
        let x = Tensor::new(&[0.1, 0.2, 0.3, 0.4], &[1, 2, 2]);
        let g = analytical_gradient(f, &x);
        assert_eq!(g.len(), 4);
        assert_close(&g, &numerical_gradient(f, &x, 1e-3), 1e-3);
    }

    #[test]
    fn test_transpose_forward() {
        let a = Tensor::new(&[1.0, 2.0, 3.0, 4.0], &[2, 2]);
        assert_eq!(a.transpose().data(), &[1.0, 3.0, 2.0, 4.0]);
    }

    #[test]
    fn test_sign_values() {
        let t = Tensor::from_slice(&[-3.0, -0.0, 0.0, 1e-30, f32::NAN, 7.0]);
        assert_eq!(t.sign().data(), &[-1.0, 0.0, 0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_sign_and_clamp_are_detached() {
        clear_graph();
        let x = Tensor::from_slice(&[-300.0, 10.0, 300.0]).requires_grad();
        let clipped = x.clamp(0.0, 255.0);
        assert_eq!(clipped.data(), &[0.0, 10.0, 255.0]);
        assert!(!clipped.requires_grad_enabled());
        assert!(!x.sign().requires_grad_enabled());
        assert!(crate::autograd::memory().tape_len == 0);
    }

    #[test]
    fn test_no_recording_without_tracked_inputs() {
        clear_graph();
        let a = Tensor::from_slice(&[1.0, 2.0]);
        let _ = a.add(&a).exp().sum();
        assert_eq!(crate::autograd::memory().tape_len, 0);
    }

    #[test]
    #[should_panic(expected = "shape mismatch")]
    fn test_elementwise_shape_mismatch_panics() {
        let _ = Tensor::zeros(&[2]).add(&Tensor::zeros(&[3]));
    }

    #[test]
    fn test_log_softmax_rows_consistent_with_softmax() {
        let data = [1.0, 2.0, 3.0, -1.0, 0.0, 1.0];
        let p = softmax_rows(&data, 3);
        let lp = log_softmax_rows(&data, 3);
        for (a, b) in p.iter().zip(&lp) {
            assert!((a.ln() - b).abs() < 1e-5);
        }
    }
}
