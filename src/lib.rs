//! Enganar: targeted adversarial images for differentiable classifiers.
//!
//! Enganar implements the targeted Fast Gradient Sign Method (FGSM): given a
//! classifier, an image and a target class, it takes one signed-gradient
//! step that makes the classifier more likely to report the target.
//!
//! # Quick Start
//!
//! ```
//! use enganar::prelude::*;
//!
//! // A tiny 4x4 RGB classifier over 10 classes
//! let network = Sequential::new()
//!     .add(Flatten::new())
//!     .add(Linear::with_seed(4 * 4 * 3, 10, Some(42)));
//! let classifier =
//!     ModuleClassifier::new(network, ClassLabels::numbered(10), &[4, 4, 3]).unwrap();
//!
//! // Nudge a gray image toward class 7
//! let gray = image::filled(4, 4, 3, 128.0);
//! let adversarial = PerturbationEngine::new()
//!     .generate(&classifier, &gray, 7, 5.0)
//!     .unwrap();
//!
//! assert_eq!(adversarial.shape(), &[4, 4, 3]);
//! assert!(adversarial.data().iter().all(|&p| (0.0..=255.0).contains(&p)));
//! ```
//!
//! # Modules
//!
//! - [`attack`]: Perturbation engine, targeted loss, configuration, sessions
//! - [`autograd`]: Tape-based reverse-mode differentiation with scoped release
//! - [`classify`]: Classifier trait, predictions, labels, network adapter
//! - [`nn`]: Layers for building differentiable classifiers
//! - [`image`]: Pixel buffer conversions and image measurements
//! - [`primitives`]: Contiguous storage backing tensors
//!
//! # Logging
//!
//! The crate logs through the [`log`] facade and never installs a logger.

pub mod attack;
pub mod autograd;
pub mod classify;
pub mod error;
pub mod image;
pub mod nn;
pub mod prelude;
pub mod primitives;

pub use attack::{AttackConfig, AttackReport, AttackSession, PerturbationEngine, TargetedLoss};
pub use autograd::Tensor;
pub use classify::{ClassLabels, Classifier, ModuleClassifier, Prediction, Preprocessing};
pub use error::{EnganarError, Result};
