//! Activation and gradient capture at a tapped layer.

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

use saliency_core::{DifferentiableClassifier, Result, SaliencyError, TappedForward};

use crate::cam::to_host;

/// Which entry of the prediction vector to explain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TargetClass {
    /// The argmax of the prediction vector (first index on ties).
    #[default]
    Predicted,
    /// A fixed class index.
    Index(usize),
}

impl TargetClass {
    /// Resolve to a class index for the given prediction vector.
    pub fn resolve(&self, predictions: &[f32]) -> Result<usize> {
        match *self {
            Self::Predicted => argmax(predictions).ok_or_else(|| {
                SaliencyError::ShapeMismatch("classifier produced an empty prediction vector".into())
            }),
            Self::Index(index) if index < predictions.len() => Ok(index),
            Self::Index(index) => Err(SaliencyError::InvalidTargetClass {
                index,
                n_classes: predictions.len(),
            }),
        }
    }
}

fn argmax(values: &[f32]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, &v)| match best {
            Some((_, top)) if v <= top => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

/// Activation and gradient captured at one layer for one class score.
#[derive(Debug, Clone)]
pub struct LayerCapture<B: Backend> {
    /// Tapped layer name.
    pub layer: String,
    /// Layer output, `(1, h, w, C)`.
    pub activation: Tensor<B, 4>,
    /// Gradient of the class score w.r.t. `activation`.
    pub gradient: Tensor<B, 4>,
    /// Explained class.
    pub class_index: usize,
    /// Prediction-vector entry for `class_index`.
    pub score: f32,
}

impl<B: Backend> LayerCapture<B> {
    /// Whether every gradient entry is exactly zero.
    pub fn gradient_is_zero(&self) -> bool {
        let peak: f32 = self.gradient.clone().abs().max().into_scalar().elem();
        peak == 0.0
    }
}

/// Run one tapped forward pass and one backward pass from the selected class score.
///
/// The returned tensors live on the inner (non-autodiff) backend; the graph
/// recorded for this call is dropped before returning.
pub fn capture_layer<B, M>(
    classifier: &M,
    input: Tensor<B, 4>,
    layer: &str,
    target: TargetClass,
) -> Result<LayerCapture<B::InnerBackend>>
where
    B: AutodiffBackend,
    M: DifferentiableClassifier<B> + ?Sized,
{
    let TappedForward { activation, logits } = classifier.forward_tapped(input, layer)?;

    let [batch, n_classes] = logits.dims();
    if batch != 1 {
        return Err(SaliencyError::ShapeMismatch(format!(
            "prediction vector has batch size {batch}"
        )));
    }

    let predictions = to_host(logits.clone().inner())?;
    if predictions.iter().any(|p| !p.is_finite()) {
        return Err(SaliencyError::NumericInstability(
            "prediction vector contains non-finite values".into(),
        ));
    }
    let class_index = target.resolve(&predictions)?;
    let score = predictions[class_index];
    tracing::debug!(layer, class_index, score, n_classes, "selected class score");

    let grads = logits
        .slice([0..1, class_index..class_index + 1])
        .sum()
        .backward();
    let gradient = activation.grad(&grads).ok_or_else(|| {
        SaliencyError::UnderlyingComputationFailure(format!(
            "no gradient reached layer '{layer}'; the prediction does not depend on it"
        ))
    })?;

    Ok(LayerCapture {
        layer: layer.to_string(),
        activation: activation.inner(),
        gradient,
        class_index,
        score,
    })
}
