//! Loss functions.
//!
//! # References
//!
//! - Bishop, C. M. (2006). Pattern Recognition and Machine Learning. Springer.

use std::sync::Arc;

use crate::autograd::grad_fn::SoftmaxCrossEntropyBackward;
use crate::autograd::{log_softmax_rows, softmax_rows, track, Tensor};
use crate::error::{EnganarError, Result};

/// Softmax cross-entropy between logits and probability targets.
///
/// Computes `-(1/B) Σ_b Σ_i t_bi * log_softmax(x_b)_i` with log-sum-exp
/// stabilisation. `targets` rows are expected to sum to one (one-hot or
/// smoothed labels).
///
/// Gradient: ∂L/∂x = (softmax(x) - t) / B
///
/// # Panics
///
/// Panics if `logits` is not 2D or `targets` has a different shape.
///
/// # Example
///
/// ```
/// use enganar::autograd::Tensor;
/// use enganar::nn::loss::softmax_cross_entropy;
///
/// let logits = Tensor::new(&[0.0, 0.0], &[1, 2]);
/// let targets = Tensor::new(&[1.0, 0.0], &[1, 2]);
/// let loss = softmax_cross_entropy(&logits, &targets);
/// assert!((loss.item() - 2.0_f32.ln()).abs() < 1e-6);
/// ```
#[must_use]
pub fn softmax_cross_entropy(logits: &Tensor, targets: &Tensor) -> Tensor {
    assert_eq!(logits.ndim(), 2, "Logits must be 2D [batch, classes]");
    assert_eq!(
        logits.shape(),
        targets.shape(),
        "Logits and targets shapes must match"
    );

    let (batch, classes) = (logits.shape()[0], logits.shape()[1]);
    let log_probs = log_softmax_rows(logits.data(), classes);
    let total: f32 = log_probs
        .iter()
        .zip(targets.data())
        .map(|(&lp, &t)| -t * lp)
        .sum();
    let loss = Tensor::new(&[total / batch.max(1) as f32], &[1]);

    track(loss, &[logits], |_| {
        Arc::new(SoftmaxCrossEntropyBackward {
            softmax_output: Tensor::from_vec(softmax_rows(logits.data(), classes), logits.shape()),
            targets: targets.detach(),
        })
    })
}

/// One-hot vector of length `num_classes` with a 1 at `index`.
///
/// # Errors
///
/// Returns `InvalidArgument` if `index >= num_classes`.
pub fn one_hot(index: usize, num_classes: usize) -> Result<Tensor> {
    if index >= num_classes {
        return Err(EnganarError::invalid_argument(
            "index",
            index,
            &format!("< {num_classes}"),
        ));
    }
    let mut data = vec![0.0; num_classes];
    data[index] = 1.0;
    Ok(Tensor::from_vec(data, &[num_classes]))
}
