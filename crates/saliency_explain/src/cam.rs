//! Class activation maps from activations and gradients.

use burn::prelude::*;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use saliency_core::{Result, SaliencyError};

/// Added to the map's maximum before normalization.
pub const NORMALIZATION_EPSILON: f32 = 1e-10;

/// Method for weighting feature-map channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CamMethod {
    /// Gradient-weighted Class Activation Mapping: spatial mean of the gradient.
    GradCam,
    /// Grad-CAM++: gradient weighted by second/third-derivative alphas.
    #[default]
    GradCamPlusPlus,
}

impl CamMethod {
    /// Short display name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::GradCam => "Grad-CAM",
            Self::GradCamPlusPlus => "Grad-CAM++",
        }
    }
}

/// A normalized map together with the channel weights that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct CamOutput {
    /// Rectified map scaled to [0, 1], shape `(h, w)`.
    pub map: Array2<f32>,
    /// One weight per channel of the feature map.
    pub channel_weights: Vec<f32>,
}

/// Compute a Grad-CAM++ map.
///
/// Reference: Chattopadhyay et al., "Grad-CAM++: Improved Visual Explanations
/// for Deep Convolutional Networks", WACV 2018.
///
/// With `g` the gradient and `A` the activation, the per-location alphas are
/// `g² / (2g² + g³ Σ_hw A)` and are normalized to sum to one per channel. Both
/// divisions substitute 1 for an exactly-zero divisor.
///
/// # Arguments
///
/// * `activations` - Target layer output (1, h, w, channels)
/// * `gradients` - Gradient of the class score w.r.t. `activations`
///
/// # Returns
///
/// Map of shape (h, w) with values in [0, 1].
pub fn grad_cam_plus_plus<B: Backend>(
    activations: Tensor<B, 4>,
    gradients: Tensor<B, 4>,
) -> Result<CamOutput> {
    ensure_compatible(&activations, &gradients)?;

    let first = gradients;
    let second = first.clone() * first.clone();
    let third = second.clone() * first.clone();

    // (1, h, w, C) -> (1, 1, 1, C)
    let global_sum = activations.clone().sum_dim(1).sum_dim(2);

    let numerator = second.clone();
    let denominator = zero_guard(second * 2.0 + third * global_sum);
    let alphas = numerator / denominator;

    let alpha_sums = zero_guard(alphas.clone().sum_dim(1).sum_dim(2));
    let alphas = alphas / alpha_sums;

    let weights = (first * alphas).sum_dim(1).sum_dim(2);

    weighted_map(activations, weights)
}

/// Compute a Grad-CAM map: channel weights are the spatial mean of the gradient.
///
/// # Arguments
///
/// * `activations` - Target layer output (1, h, w, channels)
/// * `gradients` - Gradient of the class score w.r.t. `activations`
///
/// # Returns
///
/// Map of shape (h, w) with values in [0, 1].
pub fn grad_cam<B: Backend>(activations: Tensor<B, 4>, gradients: Tensor<B, 4>) -> Result<CamOutput> {
    ensure_compatible(&activations, &gradients)?;

    // Global average pool the gradients: (1, h, w, C) -> (1, 1, 1, C)
    let weights = gradients.mean_dim(1).mean_dim(2);

    weighted_map(activations, weights)
}

/// Replace exact zeros with 1 so the tensor can be used as a divisor.
fn zero_guard<B: Backend>(divisor: Tensor<B, 4>) -> Tensor<B, 4> {
    let zeros = divisor.clone().equal_elem(0.0);
    divisor.mask_fill(zeros, 1.0)
}

fn ensure_compatible<B: Backend>(activations: &Tensor<B, 4>, gradients: &Tensor<B, 4>) -> Result<()> {
    let dims = activations.dims();
    if dims != gradients.dims() {
        return Err(SaliencyError::ShapeMismatch(format!(
            "activations {:?} != gradients {:?}",
            dims,
            gradients.dims()
        )));
    }
    if dims[0] != 1 {
        return Err(SaliencyError::ShapeMismatch(format!(
            "expected a batch of one, got batch size {}",
            dims[0]
        )));
    }
    if dims[1..].contains(&0) {
        return Err(SaliencyError::ShapeMismatch(format!(
            "feature map {dims:?} has an empty dimension"
        )));
    }
    Ok(())
}

/// Channel-weighted sum of the activations, rectified and scaled to [0, 1].
fn weighted_map<B: Backend>(activations: Tensor<B, 4>, weights: Tensor<B, 4>) -> Result<CamOutput> {
    let [_, height, width, channels] = activations.dims();

    // Sum across channels: (1, h, w, C) * (1, 1, 1, C) -> (1, h, w, 1)
    let cam = (activations * weights.clone())
        .sum_dim(3)
        .reshape([height, width]);

    // ReLU: keep only evidence for the class
    let cam = cam.clamp_min(0.0);

    let max: f32 = cam.clone().max().into_scalar().elem();
    let cam = cam / (max + NORMALIZATION_EPSILON);

    let channel_weights = to_host(weights.reshape([channels]))?;
    if let Some(c) = channel_weights.iter().position(|w| !w.is_finite()) {
        return Err(SaliencyError::NumericInstability(format!(
            "channel {c} weight is {}",
            channel_weights[c]
        )));
    }

    let values = to_host(cam)?;
    if values.iter().any(|v| !v.is_finite()) {
        return Err(SaliencyError::NumericInstability(
            "heatmap contains non-finite values".into(),
        ));
    }

    let map = Array2::from_shape_vec((height, width), values)
        .map_err(|e| SaliencyError::ShapeMismatch(e.to_string()))?;

    Ok(CamOutput {
        map,
        channel_weights,
    })
}

/// Copy a tensor's values to the host.
pub(crate) fn to_host<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| SaliencyError::UnderlyingComputationFailure(format!("{e:?}")))
}
