//! Targeted Fast Gradient Sign Method.
//!
//! One step of FGSM toward a chosen class:
//!
//! ```text
//! loss        = softmax_cross_entropy(one_hot(target), classifier(image))
//! adversarial = clip(image - epsilon * sign(d loss / d image), 0, 255)
//! ```
//!
//! The step descends the *targeted* loss, so it raises the target's score
//! rather than merely lowering the current prediction's. A single step may
//! fail to change the prediction; that is a valid outcome.
//!
//! # References
//!
//! - Goodfellow, I. J., Shlens, J., & Szegedy, C. (2015). Explaining and
//!   harnessing adversarial examples. ICLR.
//! - Kurakin, A., Goodfellow, I., & Bengio, S. (2017). Adversarial examples
//!   in the physical world. ICLR Workshop.

mod config;
mod loss;
mod session;

pub use config::AttackConfig;
pub use loss::TargetedLoss;
pub use session::{AttackReport, AttackSession};

use log::{debug, trace};

use crate::autograd::{no_grad, GradientOracle, TapeGradient, Tensor};
use crate::classify::Classifier;
use crate::error::{EnganarError, Result};
use crate::image::{self, PIXEL_MAX, PIXEL_MIN};

use config::validate_epsilon;

/// Generates targeted adversarial images.
///
/// Gradients come from the injected [`GradientOracle`]; the default is the
/// crate's tape ([`TapeGradient`]). The engine holds no other state, so one
/// instance can serve any number of calls.
///
/// # Example
///
/// ```
/// use enganar::attack::PerturbationEngine;
/// use enganar::autograd::Tensor;
/// use enganar::classify::{ClassLabels, ModuleClassifier};
/// use enganar::image;
/// use enganar::nn::{Flatten, Linear, Sequential};
///
/// let network = Sequential::new()
///     .add(Flatten::new())
///     .add(Linear::with_seed(4 * 4 * 3, 10, Some(0)));
/// let classifier = ModuleClassifier::new(network, ClassLabels::numbered(10), &[4, 4, 3]).unwrap();
///
/// let original = image::filled(4, 4, 3, 128.0);
/// let adversarial = PerturbationEngine::new()
///     .generate(&classifier, &original, 3, 5.0)
///     .unwrap();
///
/// assert_eq!(adversarial.shape(), original.shape());
/// assert!(image::max_abs_diff(&original, &adversarial).unwrap() <= 5.0);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct PerturbationEngine<G = TapeGradient> {
    oracle: G,
}

impl PerturbationEngine {
    /// Engine backed by the thread-local tape.
    #[must_use]
    pub fn new() -> Self {
        Self::with_oracle(TapeGradient)
    }
}

impl<G: GradientOracle> PerturbationEngine<G> {
    /// Engine backed by a custom gradient source.
    #[must_use]
    pub fn with_oracle(oracle: G) -> Self {
        Self { oracle }
    }

    /// Produce an adversarial version of `image` nudged toward `target_class`.
    ///
    /// `image` is an `[H, W, C]` tensor of raw `[0, 255]` intensities. The
    /// result has the same shape, lies in `[0, 255]`, and differs from the
    /// clipped input by at most `epsilon` per element. Identical inputs give
    /// bit-identical outputs.
    ///
    /// Every intermediate (one-hot label, gradient, perturbation, graph
    /// recordings) is released before returning.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `epsilon` is negative or non-finite,
    /// `image` is not rank 3, holds a NaN or infinite element, or does not
    /// match the classifier's declared input shape, `target_class` is out of range, or the classifier
    /// rejects the image or returns the wrong number of logits.
    pub fn generate<C: Classifier + ?Sized>(
        &self,
        classifier: &C,
        image: &Tensor,
        target_class: usize,
        epsilon: f32,
    ) -> Result<Tensor> {
        validate_epsilon(epsilon)?;
        image::dims(image)?;
        if let Some(bad) = image.data().iter().find(|v| !v.is_finite()) {
            return Err(EnganarError::invalid_argument(
                "image",
                bad,
                "finite pixel intensities",
            ));
        }
        if let Some(expected) = classifier.input_shape() {
            if image.shape() != expected {
                return Err(EnganarError::shape_mismatch(
                    "image",
                    image.shape(),
                    &format!("{expected:?}"),
                ));
            }
        }
        let loss = TargetedLoss::new(classifier, target_class)?;

        debug!(
            "targeted FGSM: target={target_class} epsilon={epsilon} shape={:?}",
            image.shape()
        );

        let gradient = self.oracle.gradient(&loss, image)?;
        if gradient.shape() != image.shape() {
            return Err(EnganarError::shape_mismatch(
                "gradient",
                gradient.shape(),
                &format!("{:?}", image.shape()),
            ));
        }

        let direction = gradient.sign();
        trace!(
            "{} of {} elements moved",
            direction.data().iter().filter(|&&s| s != 0.0).count(),
            direction.numel()
        );

        Ok(fgsm_step(image, &direction, epsilon))
    }
}

/// Signed perturbation `sign(gradient) * epsilon`.
///
/// Every element is `-epsilon`, `0` or `epsilon`.
#[must_use]
pub fn signed_perturbation(gradient: &Tensor, epsilon: f32) -> Tensor {
    no_grad(|| gradient.sign().mul_scalar(epsilon))
}

/// Descend one signed step and clip to the valid pixel range.
///
/// `direction` holds gradient signs; the result is
/// `clip(image - direction * epsilon, 0, 255)` as a fresh leaf.
#[must_use]
pub fn fgsm_step(image: &Tensor, direction: &Tensor, epsilon: f32) -> Tensor {
    no_grad(|| {
        image
            .sub(&direction.mul_scalar(epsilon))
            .clamp(PIXEL_MIN, PIXEL_MAX)
    })
}
