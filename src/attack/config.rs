//! Attack configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EnganarError, Result};

/// Settings for one targeted attack.
///
/// Missing keys in a JSON file take the defaults below, so `{}` is a valid
/// configuration.
///
/// # Example
///
/// ```
/// use enganar::attack::AttackConfig;
///
/// let config = AttackConfig::from_json_str(r#"{"epsilon": 2.5}"#).unwrap();
/// assert_eq!(config.target_class, 883);
/// assert_eq!(config.epsilon, 2.5);
/// assert_eq!(config.top_k, 3);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttackConfig {
    /// Class to push the image toward (default 883, "vase" in ImageNet)
    pub target_class: usize,

    /// Per-pixel step on the `[0, 255]` scale
    pub epsilon: f32,

    /// Predictions reported before and after the attack
    pub top_k: usize,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            target_class: 883,
            epsilon: 5.0,
            top_k: 3,
        }
    }
}

impl AttackConfig {
    /// Configuration for `target_class` with the given step size.
    #[must_use]
    pub fn new(target_class: usize, epsilon: f32) -> Self {
        Self {
            target_class,
            epsilon,
            ..Self::default()
        }
    }

    /// Set how many predictions are reported.
    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Parse and validate a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns `Config` for malformed JSON and `InvalidArgument` for values
    /// rejected by [`AttackConfig::validate`].
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be read, otherwise as
    /// [`AttackConfig::from_json_str`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Validate configuration parameters.
    ///
    /// The target class is checked against the classifier when the attack
    /// runs.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a negative or non-finite epsilon or a
    /// zero `top_k`.
    pub fn validate(&self) -> Result<()> {
        validate_epsilon(self.epsilon)?;

        if self.top_k == 0 {
            return Err(EnganarError::invalid_argument("top_k", 0, ">= 1"));
        }

        Ok(())
    }
}

/// Reject negative, infinite and NaN step sizes.
pub(crate) fn validate_epsilon(epsilon: f32) -> Result<()> {
    if !epsilon.is_finite() || epsilon < 0.0 {
        return Err(EnganarError::invalid_argument(
            "epsilon",
            epsilon,
            "a finite value >= 0",
        ));
    }
    Ok(())
}
