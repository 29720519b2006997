//! End-to-end attack runs with lazy model loading and leak accounting.

use log::{info, warn};

use super::{AttackConfig, PerturbationEngine};
use crate::autograd::{self, Tensor};
use crate::classify::{Classifier, Prediction};
use crate::error::{EnganarError, Result};
use crate::image;

type Loader<C> = Box<dyn FnOnce() -> Result<C>>;

enum ModelState<C> {
    Pending(Loader<C>),
    Ready(C),
    Failed,
}

/// Outcome of one [`AttackSession::run`].
#[derive(Debug, Clone)]
pub struct AttackReport {
    /// Top-K predictions for the input image
    pub original: Vec<Prediction>,
    /// Top-K predictions for the adversarial image
    pub adversarial_predictions: Vec<Prediction>,
    /// The adversarial image, `[H, W, C]` in `[0, 255]`
    pub adversarial: Tensor,
    /// Class the attack pushed toward
    pub target_class: usize,
    /// Step size used
    pub epsilon: f32,
    /// L∞ distance between input and adversarial image
    pub max_abs_change: f32,
    /// Graph bytes still held after the run that were not held before it
    pub leaked_bytes: usize,
}

impl AttackReport {
    /// Most probable class for the input.
    #[must_use]
    pub fn original_top(&self) -> Option<&Prediction> {
        self.original.first()
    }

    /// Most probable class for the adversarial image.
    #[must_use]
    pub fn adversarial_top(&self) -> Option<&Prediction> {
        self.adversarial_predictions.first()
    }

    /// Whether the adversarial image is now classified as the target.
    #[must_use]
    pub fn hit_target(&self) -> bool {
        self.adversarial_top()
            .is_some_and(|p| p.class_index == self.target_class)
    }

    /// Whether the top prediction differs between input and adversarial image.
    #[must_use]
    pub fn changed_prediction(&self) -> bool {
        self.original_top().map(|p| p.class_index)
            != self.adversarial_top().map(|p| p.class_index)
    }
}

/// Classify, attack, and re-classify images with one lazily loaded model.
///
/// The loader runs on the first [`AttackSession::run`] only; a failed load is
/// reported once and the session stays unusable afterwards.
///
/// # Example
///
/// ```
/// use enganar::attack::{AttackConfig, AttackSession};
/// use enganar::classify::{ClassLabels, ModuleClassifier};
/// use enganar::image;
/// use enganar::nn::{Flatten, Linear, Sequential};
///
/// let mut session = AttackSession::new(
///     || {
///         let network = Sequential::new()
///             .add(Flatten::new())
///             .add(Linear::with_seed(8 * 8 * 3, 5, Some(1)));
///         ModuleClassifier::new(network, ClassLabels::numbered(5), &[8, 8, 3])
///     },
///     AttackConfig::new(2, 4.0),
/// )
/// .unwrap();
///
/// let report = session.run(&image::filled(8, 8, 3, 90.0)).unwrap();
/// assert_eq!(report.original.len(), 3);
/// assert!(report.max_abs_change <= 4.0);
/// assert_eq!(report.leaked_bytes, 0);
/// ```
pub struct AttackSession<C: Classifier> {
    model: ModelState<C>,
    config: AttackConfig,
    engine: PerturbationEngine,
}

impl<C: Classifier> AttackSession<C> {
    /// Create a session whose classifier is built by `loader` on first use.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `config` fails validation.
    pub fn new<L>(loader: L, config: AttackConfig) -> Result<Self>
    where
        L: FnOnce() -> Result<C> + 'static,
    {
        config.validate()?;
        Ok(Self {
            model: ModelState::Pending(Box::new(loader)),
            config,
            engine: PerturbationEngine::new(),
        })
    }

    /// Create a session around an already loaded classifier.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `config` fails validation.
    pub fn with_classifier(classifier: C, config: AttackConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            model: ModelState::Ready(classifier),
            config,
            engine: PerturbationEngine::new(),
        })
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &AttackConfig {
        &self.config
    }

    /// Whether the classifier has been loaded.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        matches!(self.model, ModelState::Ready(_))
    }

    /// The classifier, loading it on first call.
    ///
    /// # Errors
    ///
    /// Propagates the loader's error on the first call; later calls after a
    /// failed load return `InvalidArgument`.
    pub fn classifier(&mut self) -> Result<&C> {
        self.model = match std::mem::replace(&mut self.model, ModelState::Failed) {
            ModelState::Pending(loader) => {
                let classifier = loader()?;
                info!("classifier loaded");
                ModelState::Ready(classifier)
            }
            loaded => loaded,
        };

        match &self.model {
            ModelState::Ready(classifier) => Ok(classifier),
            ModelState::Pending(_) | ModelState::Failed => Err(EnganarError::invalid_argument(
                "classifier",
                "unavailable",
                "a successful load",
            )),
        }
    }

    /// Classify `image`, attack it, and classify the result.
    ///
    /// # Errors
    ///
    /// Propagates load, classification and [`PerturbationEngine::generate`]
    /// errors; the target class is checked against the loaded classifier.
    pub fn run(&mut self, image: &Tensor) -> Result<AttackReport> {
        let config = self.config;
        let engine = self.engine;
        let classifier = self.classifier()?;

        let before = autograd::memory();

        let original = classifier.classify(image, config.top_k)?;
        let adversarial =
            engine.generate(classifier, image, config.target_class, config.epsilon)?;
        let adversarial_predictions = classifier.classify(&adversarial, config.top_k)?;
        let max_abs_change = image::max_abs_diff(image, &adversarial)?;

        let after = autograd::memory();
        let leaked_bytes = after.num_bytes.saturating_sub(before.num_bytes);
        if leaked_bytes == 0 {
            info!(
                "attack toward class {} done: max change {max_abs_change}, no graph memory retained",
                config.target_class
            );
        } else {
            warn!(
                "attack toward class {} retained {leaked_bytes} bytes ({} tensors) in the graph",
                config.target_class,
                after.num_tensors.saturating_sub(before.num_tensors)
            );
        }

        Ok(AttackReport {
            original,
            adversarial_predictions,
            adversarial,
            target_class: config.target_class,
            epsilon: config.epsilon,
            max_abs_change,
            leaked_bytes,
        })
    }
}

impl<C: Classifier> std::fmt::Debug for AttackSession<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttackSession")
            .field("config", &self.config)
            .field("loaded", &self.is_loaded())
            .finish_non_exhaustive()
    }
}
