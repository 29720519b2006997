//! Error types for enganar operations.
//!
//! The perturbation core only ever raises [`EnganarError::InvalidArgument`].
//! The remaining variants come from loading configuration and label files.

use thiserror::Error;

/// Main error type for enganar operations.
///
/// # Examples
///
/// ```
/// use enganar::error::EnganarError;
///
/// let err = EnganarError::invalid_argument("epsilon", -1.0, "a finite value >= 0");
/// assert!(err.is_invalid_argument());
/// assert!(err.to_string().contains("epsilon"));
/// ```
#[derive(Debug, Error)]
pub enum EnganarError {
    /// An input violates the operation's contract (shape, range, or value).
    #[error("Invalid argument: {param} = {value}, expected {constraint}")]
    InvalidArgument {
        /// Parameter name
        param: String,
        /// Provided value
        value: String,
        /// Constraint description
        constraint: String,
    },

    /// I/O error while reading a configuration or label file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON configuration or label file.
    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

impl EnganarError {
    /// Create an invalid argument error with descriptive context.
    #[must_use]
    pub fn invalid_argument(
        param: &str,
        value: impl std::fmt::Display,
        constraint: &str,
    ) -> Self {
        Self::InvalidArgument {
            param: param.to_string(),
            value: value.to_string(),
            constraint: constraint.to_string(),
        }
    }

    /// Create an invalid argument error for a tensor shape.
    #[must_use]
    pub fn shape_mismatch(param: &str, actual: &[usize], expected: &str) -> Self {
        Self::invalid_argument(param, format!("{actual:?}"), expected)
    }

    /// Whether this error is an [`EnganarError::InvalidArgument`].
    #[must_use]
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument { .. })
    }
}

/// Convenience type alias for Results.
pub type Result<T> = std::result::Result<T, EnganarError>;
