//! Error types for saliency-rs.

use thiserror::Error;

/// Result type alias using [`SaliencyError`].
pub type Result<T> = std::result::Result<T, SaliencyError>;

/// Errors surfaced by heatmap computation.
///
/// None of these are retried internally. The zero-denominator substitutions
/// applied while computing alpha weights are numerical guards, not errors.
#[derive(Error, Debug)]
pub enum SaliencyError {
    /// The target layer does not exist or does not produce a spatial feature map.
    #[error("Invalid layer '{layer}': {reason}")]
    InvalidLayer {
        /// Requested layer identifier.
        layer: String,
        /// Why the layer cannot be used.
        reason: String,
    },

    /// The caller supplied a tensor whose shape the classifier cannot accept.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// An explicit target class lies outside the prediction vector.
    #[error("Invalid target class {index}: classifier has {n_classes} classes")]
    InvalidTargetClass {
        /// Requested class index.
        index: usize,
        /// Length of the prediction vector.
        n_classes: usize,
    },

    /// Non-finite values surfaced despite the zero guards.
    #[error("Numeric instability: {0}")]
    NumericInstability(String),

    /// The differentiation engine failed to produce a result.
    #[error("Underlying computation failure: {0}")]
    UnderlyingComputationFailure(String),

    /// A model or engine configuration is internally inconsistent.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl SaliencyError {
    /// Build an [`SaliencyError::InvalidLayer`].
    pub fn invalid_layer(layer: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidLayer {
            layer: layer.into(),
            reason: reason.into(),
        }
    }

    /// Whether the failure was caused by the caller's request rather than the
    /// classifier or the numeric backend.
    ///
    /// A serving layer maps `true` to a client error and `false` to a server error.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidLayer { .. } | Self::ShapeMismatch(_) | Self::InvalidTargetClass { .. }
        )
    }
}
