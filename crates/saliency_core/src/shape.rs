//! Channels-last image shape metadata.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SaliencyError};

/// Shape metadata for a single image or feature map.
///
/// Follows the convention `(H, W, C)`; the batch dimension is implicit and
/// always 1 when the shape is expanded with [`ImageShape::as_batch_dims`].
///
/// # Example
///
/// ```rust
/// use saliency_core::ImageShape;
///
/// let shape = ImageShape::new(14, 14, 512);
/// assert_eq!(shape.height(), 14);
/// assert_eq!(shape.width(), 14);
/// assert_eq!(shape.channels(), 512);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageShape {
    height: usize,
    width: usize,
    channels: usize,
}

impl ImageShape {
    /// Create a new shape.
    #[must_use]
    pub const fn new(height: usize, width: usize, channels: usize) -> Self {
        Self {
            height,
            width,
            channels,
        }
    }

    /// Create an ImageShape from batched dimensions `[1, H, W, C]`.
    ///
    /// # Errors
    ///
    /// Returns [`SaliencyError::ShapeMismatch`] if the slice is not 4D or the
    /// batch dimension is not 1.
    ///
    /// # Example
    ///
    /// ```rust
    /// use saliency_core::ImageShape;
    ///
    /// let shape = ImageShape::from_batch_dims(&[1, 28, 28, 1]).unwrap();
    /// assert_eq!(shape.channels(), 1);
    /// assert!(ImageShape::from_batch_dims(&[2, 28, 28, 1]).is_err());
    /// ```
    pub fn from_batch_dims(dims: &[usize]) -> Result<Self> {
        match dims {
            [1, height, width, channels] => Ok(Self::new(*height, *width, *channels)),
            [batch, _, _, _] => Err(SaliencyError::ShapeMismatch(format!(
                "expected a batch of one, got batch size {batch}"
            ))),
            _ => Err(SaliencyError::ShapeMismatch(format!(
                "expected 4 dimensions (1, H, W, C), got {}",
                dims.len()
            ))),
        }
    }

    /// Get the height.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Get the width.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Get the number of channels.
    #[must_use]
    pub const fn channels(&self) -> usize {
        self.channels
    }

    /// Spatial extent `(H, W)`.
    #[must_use]
    pub const fn spatial(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Check if any dimension is zero.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.height == 0 || self.width == 0 || self.channels == 0
    }

    /// Get the total number of elements.
    #[must_use]
    pub const fn numel(&self) -> usize {
        self.height * self.width * self.channels
    }

    /// Expand to batched dimensions `[1, H, W, C]`.
    #[must_use]
    pub const fn as_batch_dims(&self) -> [usize; 4] {
        [1, self.height, self.width, self.channels]
    }

    /// Create a new shape with a different channel count.
    #[must_use]
    pub const fn with_channels(&self, channels: usize) -> Self {
        Self {
            height: self.height,
            width: self.width,
            channels,
        }
    }
}

impl std::fmt::Display for ImageShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(H={}, W={}, C={})", self.height, self.width, self.channels)
    }
}

impl From<(usize, usize, usize)> for ImageShape {
    fn from((height, width, channels): (usize, usize, usize)) -> Self {
        Self::new(height, width, channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_creation() {
        let shape = ImageShape::new(224, 224, 3);
        assert_eq!(shape.spatial(), (224, 224));
        assert_eq!(shape.channels(), 3);
        assert_eq!(shape.numel(), 224 * 224 * 3);
    }

    #[test]
    fn test_shape_from_batch_dims() {
        let shape = ImageShape::from_batch_dims(&[1, 7, 5, 16]).unwrap();
        assert_eq!(shape, ImageShape::new(7, 5, 16));

        assert!(matches!(
            ImageShape::from_batch_dims(&[4, 7, 5, 16]),
            Err(SaliencyError::ShapeMismatch(_))
        ));
        assert!(ImageShape::from_batch_dims(&[7, 5, 16]).is_err());
        assert!(ImageShape::from_batch_dims(&[1, 1, 7, 5, 16]).is_err());
    }

    #[test]
    fn test_shape_is_empty() {
        assert!(!ImageShape::new(2, 2, 1).is_empty());
        assert!(ImageShape::new(0, 2, 1).is_empty());
        assert!(ImageShape::new(2, 2, 0).is_empty());
    }

    #[test]
    fn test_shape_display() {
        assert_eq!(ImageShape::new(14, 14, 512).to_string(), "(H=14, W=14, C=512)");
    }

    #[test]
    fn test_shape_serialization() {
        let shape = ImageShape::new(28, 28, 1).with_channels(8);
        let json = serde_json::to_string(&shape).unwrap();
        let restored: ImageShape = serde_json::from_str(&json).unwrap();
        assert_eq!(shape, restored);
    }
}
