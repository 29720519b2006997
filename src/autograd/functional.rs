//! Gradients of scalar objectives with respect to an input tensor.
//!
//! [`GradientOracle`] is the seam the attack code differentiates through.
//! [`TapeGradient`] binds it to the thread-local tape, and [`grad`] wraps
//! an objective into a reusable gradient function.

use log::trace;

use super::{enable_grad, get_grad, GradScope, Tensor};
use crate::error::{EnganarError, Result};

/// A function from a tensor to a one-element tensor.
pub trait ScalarObjective {
    /// Evaluate the objective at `input`, recording differentiable ops.
    ///
    /// # Errors
    ///
    /// Returns an error if `input` is unsuitable for the objective.
    fn evaluate(&self, input: &Tensor) -> Result<Tensor>;
}

impl<F> ScalarObjective for F
where
    F: Fn(&Tensor) -> Result<Tensor>,
{
    fn evaluate(&self, input: &Tensor) -> Result<Tensor> {
        self(input)
    }
}

/// Computes the gradient of a scalar objective with respect to its input.
pub trait GradientOracle {
    /// Return `d objective / d at`, shaped like `at`.
    ///
    /// # Errors
    ///
    /// Propagates objective errors; returns `InvalidArgument` when the
    /// objective is not scalar.
    fn gradient(&self, objective: &dyn ScalarObjective, at: &Tensor) -> Result<Tensor>;
}

/// [`GradientOracle`] backed by the thread-local tape.
///
/// Every recording made while computing the gradient is released before
/// `gradient` returns.
#[derive(Debug, Clone, Copy, Default)]
pub struct TapeGradient;

impl TapeGradient {
    /// Create the tape-backed oracle.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl GradientOracle for TapeGradient {
    fn gradient(&self, objective: &dyn ScalarObjective, at: &Tensor) -> Result<Tensor> {
        let _scope = GradScope::enter();

        let leaf = at.detach().requires_grad();
        let leaf_id = leaf.id();

        let value = enable_grad(|| objective.evaluate(&leaf))?;
        if value.numel() != 1 {
            return Err(EnganarError::shape_mismatch(
                "objective output",
                value.shape(),
                "a single element",
            ));
        }

        // Leaves registered before this call (frozen or not) never see the
        // input's gradient.
        value.backward_for(&[leaf_id]);

        match get_grad(leaf_id) {
            Some(grad) => Ok(grad.detach()),
            None => {
                trace!("objective does not depend on its input; gradient is zero");
                Ok(Tensor::zeros_like(at))
            }
        }
    }
}

/// Turn a scalar objective into a function returning its gradient.
///
/// # Example
///
/// ```
/// use enganar::autograd::{functional::grad, Tensor};
///
/// let square_sum = grad(|x: &Tensor| Ok(x.mul(x).sum()));
/// let g = square_sum(&Tensor::from_slice(&[1.0, -2.0])).unwrap();
/// assert_eq!(g.data(), &[2.0, -4.0]);
/// ```
pub fn grad<F>(objective: F) -> impl Fn(&Tensor) -> Result<Tensor>
where
    F: Fn(&Tensor) -> Result<Tensor>,
{
    move |at: &Tensor| TapeGradient.gradient(&objective, at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::{clear_graph, memory, no_grad};

    fn central_difference(f: &dyn Fn(&Tensor) -> f32, x: &Tensor, eps: f32) -> Vec<f32> {
        (0..x.numel())
            .map(|i| {
                let mut plus = x.data().to_vec();
                let mut minus = x.data().to_vec();
                plus[i] += eps;
                minus[i] -= eps;
                (f(&Tensor::new(&plus, x.shape())) - f(&Tensor::new(&minus, x.shape())))
                    / (2.0 * eps)
            })
            .collect()
    }

    #[test]
    fn test_tape_gradient_matches_finite_differences() {
        let w = Tensor::new(&[0.3, -0.7, 1.1, 0.2, 0.5, -0.4], &[3, 2]);
        let objective = |x: &Tensor| -> Result<Tensor> {
            Ok(x.view(&[1, 3]).matmul(&w).softmax().log().mean().neg())
        };
        let x = Tensor::new(&[0.2, -0.1, 0.4], &[3]);

        let analytic = TapeGradient.gradient(&objective, &x).unwrap();
        let numeric = central_difference(
            &|t| no_grad(|| objective(t).unwrap().item()),
            &x,
            1e-3,
        );

        assert_eq!(analytic.shape(), x.shape());
        for (a, n) in analytic.data().iter().zip(&numeric) {
            assert!((a - n).abs() < 1e-3, "{a} vs {n}");
        }
    }

    #[test]
    fn test_constant_objective_gives_zero_gradient() {
        let constant = |_: &Tensor| -> Result<Tensor> { Ok(Tensor::new(&[3.0], &[1])) };
        let x = Tensor::full(&[2, 2, 3], 128.0);

        let g = TapeGradient.gradient(&constant, &x).unwrap();
        assert_eq!(g.shape(), &[2, 2, 3]);
        assert!(g.data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_non_scalar_objective_rejected() {
        let identity = |x: &Tensor| -> Result<Tensor> { Ok(x.exp()) };
        let err = TapeGradient
            .gradient(&identity, &Tensor::from_slice(&[1.0, 2.0]))
            .unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_gradient_works_inside_no_grad() {
        let g = no_grad(|| {
            TapeGradient
                .gradient(
                    &|x: &Tensor| -> Result<Tensor> { Ok(x.sum()) },
                    &Tensor::from_slice(&[5.0, 6.0]),
                )
                .unwrap()
        });
        assert_eq!(g.data(), &[1.0, 1.0]);
    }

    #[test]
    fn test_gradient_releases_graph() {
        let before = memory();
        let g = grad(|x: &Tensor| Ok(x.exp().sum()));
        let _ = g(&Tensor::zeros(&[8])).unwrap();
        assert_eq!(memory(), before);
    }

    #[test]
    fn test_gradient_leaves_older_leaves_untouched() {
        clear_graph();
        let w = Tensor::from_slice(&[0.5, -1.0, 2.0]).requires_grad();
        let _ = w.exp();
        let before = memory();

        let objective = |x: &Tensor| -> Result<Tensor> { Ok(x.mul(&w).sum()) };
        let g = TapeGradient
            .gradient(&objective, &Tensor::from_slice(&[1.0, 2.0, 3.0]))
            .unwrap();

        assert_eq!(g.data(), &[0.5, -1.0, 2.0]);
        assert!(get_grad(w.id()).is_none());
        assert_eq!(memory(), before);
        clear_graph();
    }

    #[test]
    fn test_input_is_not_modified() {
        let x = Tensor::from_slice(&[1.0, 2.0]);
        let _ = grad(|t: &Tensor| Ok(t.mul(t).sum()))(&x).unwrap();
        assert!(!x.requires_grad_enabled());
        assert!(x.grad().is_none());
    }
}
