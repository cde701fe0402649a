//! The heatmap engine.

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

use saliency_core::{DifferentiableClassifier, ImageTensor, Result};

use crate::activation::{capture_layer, TargetClass};
use crate::cam::{grad_cam, grad_cam_plus_plus, CamMethod};
use crate::heatmap::Heatmap;

/// Configuration for [`HeatmapEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Channel weighting method.
    pub method: CamMethod,
    /// Class to explain. Defaults to the predicted class.
    pub target: TargetClass,
}

impl EngineConfig {
    /// Set the method.
    #[must_use]
    pub fn with_method(mut self, method: CamMethod) -> Self {
        self.method = method;
        self
    }

    /// Set the explained class.
    #[must_use]
    pub fn with_target(mut self, target: TargetClass) -> Self {
        self.target = target;
        self
    }
}

/// Computes saliency heatmaps for a classifier's prediction on one image.
///
/// The engine holds only its configuration. The classifier is passed to every
/// call and only read, so one loaded classifier can be shared by any number of
/// engines and threads.
///
/// # Example
///
/// ```rust,ignore
/// use saliency_explain::HeatmapEngine;
///
/// let engine = HeatmapEngine::default();
/// let heatmap = engine.compute(&model, input, "block5_conv3")?;
/// let overlay = heatmap.resize(224, 224)?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct HeatmapEngine {
    config: EngineConfig,
}

impl HeatmapEngine {
    /// Create an engine.
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Get the configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Compute the heatmap of the configured class at `layer`.
    ///
    /// # Arguments
    ///
    /// * `classifier` - Network to explain
    /// * `input` - Preprocessed image (1, H, W, C_in) matching the classifier's input shape
    /// * `layer` - Name of a layer producing a spatial feature map
    ///
    /// # Returns
    ///
    /// Heatmap with the layer's spatial shape and values in [0, 1].
    ///
    /// # Errors
    ///
    /// - `ShapeMismatch` if `input` is not a single image of the classifier's input shape
    /// - `InvalidLayer` if `layer` cannot be tapped
    /// - `InvalidTargetClass` if an explicit class is out of range
    /// - `NumericInstability` if non-finite values appear
    /// - `UnderlyingComputationFailure` if no gradient reaches `layer`
    pub fn compute<B, M>(&self, classifier: &M, input: Tensor<B, 4>, layer: &str) -> Result<Heatmap>
    where
        B: AutodiffBackend,
        M: DifferentiableClassifier<B> + ?Sized,
    {
        let image = ImageTensor::new(input)?;
        image.ensure_shape(classifier.input_shape())?;

        let capture = capture_layer(classifier, image.into_inner(), layer, self.config.target)?;
        let [_, height, width, channels] = capture.activation.dims();
        tracing::debug!(layer, height, width, channels, "captured activation and gradient");

        if capture.gradient_is_zero() {
            tracing::warn!(
                layer,
                class_index = capture.class_index,
                "gradient is identically zero; heatmap will be empty"
            );
        }

        let cam = match self.config.method {
            CamMethod::GradCam => grad_cam(capture.activation, capture.gradient)?,
            CamMethod::GradCamPlusPlus => grad_cam_plus_plus(capture.activation, capture.gradient)?,
        };

        tracing::info!(
            method = self.config.method.name(),
            layer,
            class_index = capture.class_index,
            score = capture.score,
            "computed heatmap"
        );

        Ok(Heatmap::new(
            cam.map,
            self.config.method,
            capture.layer,
            capture.class_index,
            capture.score,
            cam.channel_weights,
        ))
    }
}

/// Grad-CAM++ heatmap of the predicted class at `layer`.
///
/// Shorthand for `HeatmapEngine::default().compute(classifier, input, layer)`.
pub fn compute_heatmap<B, M>(classifier: &M, input: Tensor<B, 4>, layer: &str) -> Result<Heatmap>
where
    B: AutodiffBackend,
    M: DifferentiableClassifier<B> + ?Sized,
{
    HeatmapEngine::default().compute(classifier, input, layer)
}
