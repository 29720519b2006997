//! Convenience re-exports for common usage.
//!
//! # Usage
//!
//! ```
//! use enganar::prelude::*;
//! ```

pub use crate::attack::{AttackConfig, AttackReport, AttackSession, PerturbationEngine};
pub use crate::autograd::{no_grad, GradScope, GradientOracle, TapeGradient, Tensor};
pub use crate::classify::{ClassLabels, Classifier, ModuleClassifier, Prediction, Preprocessing};
pub use crate::error::{EnganarError, Result};
pub use crate::image;
pub use crate::nn::{Flatten, Linear, Module, ReLU, Sequential};
