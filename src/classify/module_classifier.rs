//! [`Classifier`] adapter for [`Module`] networks.

use serde::{Deserialize, Serialize};

use super::{check_logits, ClassLabels, Classifier};
use crate::autograd::Tensor;
use crate::error::{EnganarError, Result};
use crate::image::PIXEL_MAX;
use crate::nn::Module;

/// Pixel scaling applied before the network sees an image.
///
/// Applied with recorded ops, so gradients are taken with respect to the
/// raw `[0, 255]` intensities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preprocessing {
    /// Feed raw intensities.
    #[default]
    Identity,
    /// `x / 255`, into `[0, 1]`.
    UnitRange,
    /// `x / 127.5 - 1`, into `[-1, 1]` (the MobileNet convention).
    SymmetricUnit,
}

impl Preprocessing {
    /// Apply the scaling to an image tensor.
    #[must_use]
    pub fn apply(self, image: &Tensor) -> Tensor {
        match self {
            Preprocessing::Identity => image.clone(),
            Preprocessing::UnitRange => image.mul_scalar(1.0 / PIXEL_MAX),
            Preprocessing::SymmetricUnit => image.affine(2.0 / PIXEL_MAX, -1.0),
        }
    }
}

/// A network plus the metadata needed to classify images with it.
///
/// `infer` checks the image against the declared `[H, W, C]` shape, applies
/// [`Preprocessing`], adds a batch axis, and runs the network. The network
/// must map `[1, H, W, C]` to one logit per label.
///
/// # Example
///
/// ```
/// use enganar::autograd::Tensor;
/// use enganar::classify::{ClassLabels, Classifier, ModuleClassifier, Preprocessing};
/// use enganar::nn::{Flatten, Linear, Sequential};
///
/// let network = Sequential::new()
///     .add(Flatten::new())
///     .add(Linear::with_seed(2 * 2 * 3, 4, Some(0)));
/// let classifier = ModuleClassifier::new(network, ClassLabels::numbered(4), &[2, 2, 3])
///     .unwrap()
///     .with_preprocessing(Preprocessing::SymmetricUnit);
///
/// let top = classifier.classify(&Tensor::full(&[2, 2, 3], 128.0), 2).unwrap();
/// assert_eq!(top.len(), 2);
/// ```
#[derive(Debug)]
pub struct ModuleClassifier<M: Module> {
    network: M,
    labels: ClassLabels,
    input_shape: Vec<usize>,
    preprocessing: Preprocessing,
}

impl<M: Module> ModuleClassifier<M> {
    /// Bind a network to its labels and input shape.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `labels` is empty, `input_shape` is not
    /// a non-empty `[H, W, C]`, or the network does not map `[1, H, W, C]`
    /// to one logit per label.
    pub fn new(network: M, labels: ClassLabels, input_shape: &[usize]) -> Result<Self> {
        if labels.is_empty() {
            return Err(EnganarError::invalid_argument(
                "labels",
                "[]",
                "at least one class",
            ));
        }
        if input_shape.len() != 3 || input_shape.contains(&0) {
            return Err(EnganarError::shape_mismatch(
                "input_shape",
                input_shape,
                "non-empty [H, W, C]",
            ));
        }

        let mut batched_shape = vec![1];
        batched_shape.extend_from_slice(input_shape);
        let logits_shape = network.output_shape(&batched_shape)?;
        let logits: usize = logits_shape.iter().product();
        if logits != labels.len() {
            return Err(EnganarError::shape_mismatch(
                "network output",
                &logits_shape,
                &format!("{} logits, one per label", labels.len()),
            ));
        }

        Ok(Self {
            network,
            labels,
            input_shape: input_shape.to_vec(),
            preprocessing: Preprocessing::default(),
        })
    }

    /// Set the pixel scaling.
    #[must_use]
    pub fn with_preprocessing(mut self, preprocessing: Preprocessing) -> Self {
        self.preprocessing = preprocessing;
        self
    }

    /// The configured pixel scaling.
    #[must_use]
    pub fn preprocessing(&self) -> Preprocessing {
        self.preprocessing
    }

    /// The class labels.
    #[must_use]
    pub fn labels(&self) -> &ClassLabels {
        &self.labels
    }

    /// The wrapped network.
    #[must_use]
    pub fn network(&self) -> &M {
        &self.network
    }
}

impl<M: Module> Classifier for ModuleClassifier<M> {
    fn num_classes(&self) -> usize {
        self.labels.len()
    }

    fn input_shape(&self) -> Option<&[usize]> {
        Some(&self.input_shape)
    }

    fn class_name(&self, index: usize) -> String {
        self.labels.name(index)
    }

    fn infer(&self, image: &Tensor) -> Result<Tensor> {
        if image.shape() != self.input_shape.as_slice() {
            return Err(EnganarError::shape_mismatch(
                "image",
                image.shape(),
                &format!("{:?}", self.input_shape),
            ));
        }

        let mut batched_shape = Vec::with_capacity(4);
        batched_shape.push(1);
        batched_shape.extend_from_slice(&self.input_shape);

        let scaled = self.preprocessing.apply(image);
        let logits = self.network.forward(&scaled.view(&batched_shape));

        let num_classes = self.num_classes();
        check_logits(&logits, num_classes)?;
        Ok(logits.view(&[num_classes]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::{Flatten, Linear, Sequential};

    fn tiny() -> ModuleClassifier<Sequential> {
        let network = Sequential::new()
            .add(Flatten::new())
            .add(Linear::with_seed(12, 3, Some(5)));
        ModuleClassifier::new(network, ClassLabels::numbered(3), &[2, 2, 3]).unwrap()
    }

    #[test]
    fn test_infer_returns_flat_logits() {
        let logits = tiny().infer(&Tensor::full(&[2, 2, 3], 10.0)).unwrap();
        assert_eq!(logits.shape(), &[3]);
    }

    #[test]
    fn test_infer_rejects_wrong_shape() {
        let err = tiny().infer(&Tensor::zeros(&[2, 2, 4])).unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_new_rejects_network_with_wrong_logits_count() {
        let network = Sequential::new()
            .add(Flatten::new())
            .add(Linear::with_seed(12, 5, Some(5)));
        let err = ModuleClassifier::new(network, ClassLabels::numbered(3), &[2, 2, 3]).unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(err.to_string().contains("logits"));
    }

    #[test]
    fn test_new_rejects_network_that_cannot_take_the_image() {
        let network = Sequential::new()
            .add(Flatten::new())
            .add(Linear::with_seed(10, 3, Some(0)));
        let err = ModuleClassifier::new(network, ClassLabels::numbered(3), &[4, 4, 3]).unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_new_validates_arguments() {
        assert!(ModuleClassifier::new(Flatten::new(), ClassLabels::numbered(0), &[1, 1, 3]).is_err());
        assert!(ModuleClassifier::new(Flatten::new(), ClassLabels::numbered(2), &[4, 4]).is_err());
        assert!(ModuleClassifier::new(Flatten::new(), ClassLabels::numbered(2), &[4, 0, 3]).is_err());
    }

    #[test]
    fn test_preprocessing_ranges() {
        let img = Tensor::from_slice(&[0.0, 127.5, 255.0]);
        assert_eq!(Preprocessing::Identity.apply(&img).data(), img.data());

        let unit = Preprocessing::UnitRange.apply(&img);
        assert!((unit.data()[2] - 1.0).abs() < 1e-6);

        let sym = Preprocessing::SymmetricUnit.apply(&img);
        let expected = [-1.0, 0.0, 1.0];
        for (a, b) in sym.data().iter().zip(expected) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_preprocessing_serde_names() {
        let p: Preprocessing = serde_json::from_str("\"symmetric_unit\"").unwrap();
        assert_eq!(p, Preprocessing::SymmetricUnit);
    }

    #[test]
    fn test_labels_used_for_names() {
        let network = Flatten::new();
        let labels = ClassLabels::new(vec!["a".into(), "b".into(), "c".into()]);
        let clf = ModuleClassifier::new(network, labels, &[1, 1, 3]).unwrap();

        let top = clf.classify(&Tensor::new(&[0.0, 5.0, 1.0], &[1, 1, 3]), 1).unwrap();
        assert_eq!(top[0].class_name, "b");
    }
}
