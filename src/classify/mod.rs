//! Image classifiers: the collaborator the attack differentiates through.
//!
//! A [`Classifier`] maps an `[H, W, C]` image to one logit per class.
//! [`ModuleClassifier`] adapts any [`crate::nn::Module`] network, and
//! [`ClassLabels`] supplies human-readable names.

mod labels;
mod module_classifier;

pub use labels::ClassLabels;
pub use module_classifier::{ModuleClassifier, Preprocessing};

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::autograd::{no_grad, softmax_rows, Tensor};
use crate::error::{EnganarError, Result};

/// One ranked class from [`Classifier::classify`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Index into the classifier's output
    pub class_index: usize,
    /// Human-readable label
    pub class_name: String,
    /// Softmax probability in `[0, 1]`
    pub probability: f32,
}

/// `"name (p)"`, with `p` rounded to two decimals and trailing zeros
/// dropped: `0.5`, not `0.50`.
impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rounded = (self.probability * 100.0).round() / 100.0;
        write!(f, "{} ({rounded})", self.class_name)
    }
}

/// An image classifier producing differentiable logits.
pub trait Classifier {
    /// Number of classes, i.e. the length of the logits.
    fn num_classes(&self) -> usize;

    /// Declared `[H, W, C]` input shape, if the classifier fixes one.
    fn input_shape(&self) -> Option<&[usize]> {
        None
    }

    /// Label for a class index.
    fn class_name(&self, index: usize) -> String {
        format!("class_{index}")
    }

    /// Unnormalised class scores for `image`, built from recorded ops.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the classifier cannot accept `image`.
    fn infer(&self, image: &Tensor) -> Result<Tensor>;

    /// The `top_k` most probable classes, most probable first.
    ///
    /// Runs without gradient tracking. Ties are broken by lower index.
    ///
    /// # Errors
    ///
    /// Propagates `infer` errors; returns `InvalidArgument` if the logits
    /// length differs from [`Classifier::num_classes`].
    fn classify(&self, image: &Tensor, top_k: usize) -> Result<Vec<Prediction>> {
        let logits = no_grad(|| self.infer(image))?;
        let probabilities = probabilities(&logits, self.num_classes())?;

        Ok(rank(&probabilities, top_k)
            .into_iter()
            .map(|class_index| Prediction {
                class_index,
                class_name: self.class_name(class_index),
                probability: probabilities[class_index],
            })
            .collect())
    }
}

/// Check the logits length and convert to probabilities.
fn probabilities(logits: &Tensor, num_classes: usize) -> Result<Vec<f32>> {
    check_logits(logits, num_classes)?;
    Ok(softmax_rows(logits.data(), num_classes))
}

/// Fail unless `logits` holds exactly one score per class.
pub(crate) fn check_logits(logits: &Tensor, num_classes: usize) -> Result<()> {
    if num_classes == 0 || logits.numel() != num_classes {
        return Err(EnganarError::shape_mismatch(
            "logits",
            logits.shape(),
            &format!("{num_classes} elements"),
        ));
    }
    Ok(())
}

/// Indices of the `k` largest scores, descending, ties by lower index.
fn rank(scores: &[f32], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| match scores[b].total_cmp(&scores[a]) {
        Ordering::Equal => a.cmp(&b),
        other => other,
    });
    order.truncate(k);
    order
}
