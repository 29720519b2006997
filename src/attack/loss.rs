//! Cross-entropy toward a chosen class.

use crate::autograd::{ScalarObjective, Tensor};
use crate::classify::{check_logits, Classifier};
use crate::error::{EnganarError, Result};
use crate::nn::loss::{one_hot, softmax_cross_entropy};

/// Softmax cross-entropy between a classifier's logits and a one-hot target.
///
/// Lower values mean the classifier is more confident in `target_class`, so
/// stepping *against* its gradient moves an image toward that class.
pub struct TargetedLoss<'a, C: Classifier + ?Sized> {
    classifier: &'a C,
    target_class: usize,
    /// One-hot label, `[1, num_classes]`
    target: Tensor,
}

impl<'a, C: Classifier + ?Sized> TargetedLoss<'a, C> {
    /// Bind `classifier` to `target_class`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `target_class >= classifier.num_classes()`.
    pub fn new(classifier: &'a C, target_class: usize) -> Result<Self> {
        let num_classes = classifier.num_classes();
        let target = one_hot(target_class, num_classes)
            .map_err(|_| {
                EnganarError::invalid_argument(
                    "target_class",
                    target_class,
                    &format!("< {num_classes} (number of classes)"),
                )
            })?
            .view(&[1, num_classes]);

        Ok(Self {
            classifier,
            target_class,
            target,
        })
    }

    /// The class this loss pulls toward.
    #[must_use]
    pub fn target_class(&self) -> usize {
        self.target_class
    }

    /// Loss value at `image`, recorded on the tape.
    ///
    /// # Errors
    ///
    /// Propagates classifier errors; returns `InvalidArgument` if the
    /// logits length differs from the number of classes.
    pub fn evaluate(&self, image: &Tensor) -> Result<Tensor> {
        let logits = self.classifier.infer(image)?;
        let num_classes = self.target.numel();
        check_logits(&logits, num_classes)?;
        Ok(softmax_cross_entropy(
            &logits.view(&[1, num_classes]),
            &self.target,
        ))
    }
}

impl<C: Classifier + ?Sized> ScalarObjective for TargetedLoss<'_, C> {
    fn evaluate(&self, input: &Tensor) -> Result<Tensor> {
        TargetedLoss::evaluate(self, input)
    }
}

impl<C: Classifier + ?Sized> std::fmt::Debug for TargetedLoss<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetedLoss")
            .field("target_class", &self.target_class)
            .field("num_classes", &self.target.numel())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<f32>);

    impl Classifier for Fixed {
        fn num_classes(&self) -> usize {
            self.0.len()
        }

        fn infer(&self, _image: &Tensor) -> Result<Tensor> {
            Ok(Tensor::from_slice(&self.0))
        }
    }

    #[test]
    fn test_target_out_of_range() {
        let clf = Fixed(vec![0.0; 3]);
        let err = TargetedLoss::new(&clf, 3).unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(err.to_string().contains("target_class"));
    }

    #[test]
    fn test_uniform_logits_give_log_n() {
        let clf = Fixed(vec![0.0; 4]);
        let loss = TargetedLoss::new(&clf, 2).unwrap();
        let value = loss.evaluate(&Tensor::zeros(&[1, 1, 3])).unwrap().item();
        assert!((value - 4.0_f32.ln()).abs() < 1e-6);
    }

    #[test]
    fn test_confident_target_has_small_loss() {
        let clf = Fixed(vec![-5.0, 9.0, -5.0]);
        let hit = TargetedLoss::new(&clf, 1).unwrap();
        let miss = TargetedLoss::new(&clf, 0).unwrap();
        let img = Tensor::zeros(&[1, 1, 3]);
        assert!(hit.evaluate(&img).unwrap().item() < miss.evaluate(&img).unwrap().item());
    }
}
