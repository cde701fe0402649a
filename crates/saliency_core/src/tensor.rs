//! Image tensor types.

use burn::prelude::*;
use burn::tensor::TensorData;

use crate::error::{Result, SaliencyError};
use crate::shape::ImageShape;

/// A batch-of-one image tensor with shape metadata.
///
/// Wraps a Burn tensor laid out as `(1, H, W, C)`. Construction fails for any
/// other batch size, so a value of this type is always a single image.
///
/// # Example
///
/// ```rust,ignore
/// use saliency_core::ImageTensor;
///
/// let tensor = Tensor::<NdArray, 4>::zeros([1, 224, 224, 3], &device);
/// let image = ImageTensor::new(tensor)?;
/// ```
#[derive(Debug, Clone)]
pub struct ImageTensor<B: Backend> {
    inner: Tensor<B, 4>,
    shape: ImageShape,
}

impl<B: Backend> ImageTensor<B> {
    /// Wrap a Burn tensor of shape `(1, H, W, C)`.
    ///
    /// # Errors
    ///
    /// Returns [`SaliencyError::ShapeMismatch`] if the batch dimension is not 1.
    pub fn new(tensor: Tensor<B, 4>) -> Result<Self> {
        let shape = ImageShape::from_batch_dims(&tensor.dims())?;
        Ok(Self {
            inner: tensor,
            shape,
        })
    }

    /// Build an image tensor from row-major channels-last values.
    ///
    /// # Errors
    ///
    /// Returns [`SaliencyError::ShapeMismatch`] if `values` does not hold
    /// exactly `shape.numel()` elements.
    pub fn from_vec(values: Vec<f32>, shape: ImageShape, device: &B::Device) -> Result<Self> {
        if values.len() != shape.numel() {
            return Err(SaliencyError::ShapeMismatch(format!(
                "{} values cannot fill an image of shape {}",
                values.len(),
                shape
            )));
        }
        let data = TensorData::new(values, shape.as_batch_dims());
        Ok(Self {
            inner: Tensor::from_data(data, device),
            shape,
        })
    }

    /// Create an image tensor filled with zeros.
    pub fn zeros(shape: ImageShape, device: &B::Device) -> Self {
        Self {
            inner: Tensor::zeros(shape.as_batch_dims(), device),
            shape,
        }
    }

    /// Get the shape metadata.
    #[must_use]
    pub const fn shape(&self) -> ImageShape {
        self.shape
    }

    /// Fail unless this image has exactly the `expected` shape.
    pub fn ensure_shape(&self, expected: ImageShape) -> Result<()> {
        if self.shape != expected {
            return Err(SaliencyError::ShapeMismatch(format!(
                "classifier expects input {}, got {}",
                expected, self.shape
            )));
        }
        Ok(())
    }

    /// Get a reference to the underlying Burn tensor.
    #[must_use]
    pub const fn inner(&self) -> &Tensor<B, 4> {
        &self.inner
    }

    /// Consume self and return the underlying Burn tensor.
    #[must_use]
    pub fn into_inner(self) -> Tensor<B, 4> {
        self.inner
    }

    /// Get the device the tensor is on.
    pub fn device(&self) -> B::Device {
        self.inner.device()
    }
}
