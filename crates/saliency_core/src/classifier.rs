//! The capability a network must expose to be explained.
//!
//! The heatmap engine never looks inside a network. It only needs to run the
//! network up to a named layer, keep that layer's output as a gradient leaf,
//! and run the rest of the network from there.

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

use crate::error::{Result, SaliencyError};
use crate::shape::ImageShape;

/// Outputs of a forward pass with one layer tapped.
#[derive(Debug, Clone)]
pub struct TappedForward<B: Backend> {
    /// Output of the tapped layer, `(1, h, w, C)`, tracked for gradients.
    pub activation: Tensor<B, 4>,
    /// Prediction vector, `(1, n_classes)`.
    pub logits: Tensor<B, 2>,
}

/// A classifier that supports reverse-mode differentiation of its prediction
/// with respect to an intermediate feature map.
///
/// All tensors crossing this trait are channels-last: inputs are `(1, H, W, C_in)`
/// and tapped activations are `(1, h, w, C)`.
///
/// Implementations are read-only during explanation. Every call builds its own
/// autodiff graph, so one classifier can serve concurrent callers as long as
/// each caller owns its tensors.
pub trait DifferentiableClassifier<B: AutodiffBackend>: Send {
    /// Input shape the classifier was built for.
    fn input_shape(&self) -> ImageShape;

    /// Length of the prediction vector.
    fn n_classes(&self) -> usize;

    /// Names of the layers whose outputs are spatial feature maps.
    fn layer_names(&self) -> Vec<String>;

    /// Full forward pass returning the prediction vector `(1, n_classes)`.
    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2>;

    /// Run the network up to and including `layer`.
    ///
    /// # Errors
    ///
    /// Returns [`SaliencyError::InvalidLayer`] if `layer` is unknown or is not
    /// a spatial feature map.
    fn forward_to(&self, x: Tensor<B, 4>, layer: &str) -> Result<Tensor<B, 4>>;

    /// Run the rest of the network, starting from the output of `layer`.
    fn forward_from(&self, activation: Tensor<B, 4>, layer: &str) -> Result<Tensor<B, 2>>;

    /// Whether `layer` can be tapped.
    fn has_layer(&self, layer: &str) -> bool {
        self.layer_names().iter().any(|name| name == layer)
    }

    /// One forward pass that yields both the tapped activation and the prediction.
    ///
    /// The activation is detached from the part of the graph that produced it
    /// and re-registered as a gradient leaf, so `activation.grad(&grads)` is
    /// available after calling `backward()` on any scalar derived from `logits`.
    fn forward_tapped(&self, x: Tensor<B, 4>, layer: &str) -> Result<TappedForward<B>> {
        if !self.has_layer(layer) {
            return Err(SaliencyError::invalid_layer(
                layer,
                format!("known layers are [{}]", self.layer_names().join(", ")),
            ));
        }
        let activation = self.forward_to(x, layer)?.detach().require_grad();
        let logits = self.forward_from(activation.clone(), layer)?;
        Ok(TappedForward { activation, logits })
    }
}

#[cfg(all(test, feature = "backend-ndarray"))]
mod tests {
    use super::*;
    use crate::backend::{Autodiff, NdArray};
    use burn::tensor::TensorData;

    type TestBackend = Autodiff<NdArray>;

    /// Tap "input" is the image itself; class k scores `sum(x * w_k)`.
    struct LinearProbe {
        shape: ImageShape,
        weights: Tensor<TestBackend, 2>,
    }

    impl LinearProbe {
        fn new(shape: ImageShape, weights: Vec<f32>, n_classes: usize) -> Self {
            let device = Default::default();
            let data = TensorData::new(weights, [shape.numel(), n_classes]);
            Self {
                shape,
                weights: Tensor::from_data(data, &device),
            }
        }
    }

    impl DifferentiableClassifier<TestBackend> for LinearProbe {
        fn input_shape(&self) -> ImageShape {
            self.shape
        }

        fn n_classes(&self) -> usize {
            self.weights.dims()[1]
        }

        fn layer_names(&self) -> Vec<String> {
            vec!["input".to_string()]
        }

        fn forward(&self, x: Tensor<TestBackend, 4>) -> Tensor<TestBackend, 2> {
            x.reshape([1, self.shape.numel()]).matmul(self.weights.clone())
        }

        fn forward_to(&self, x: Tensor<TestBackend, 4>, layer: &str) -> Result<Tensor<TestBackend, 4>> {
            match layer {
                "input" => Ok(x),
                other => Err(SaliencyError::invalid_layer(other, "unknown")),
            }
        }

        fn forward_from(
            &self,
            activation: Tensor<TestBackend, 4>,
            _layer: &str,
        ) -> Result<Tensor<TestBackend, 2>> {
            Ok(self.forward(activation))
        }
    }

    #[test]
    fn test_classifier_moves_to_worker_thread() {
        let probe: Box<dyn DifferentiableClassifier<TestBackend>> =
            Box::new(LinearProbe::new(ImageShape::new(1, 2, 1), vec![1.0, 2.0], 1));

        let names = std::thread::spawn(move || probe.layer_names())
            .join()
            .unwrap();
        assert_eq!(names, vec!["input".to_string()]);
    }

    #[test]
    fn test_forward_tapped_unknown_layer() {
        let probe = LinearProbe::new(ImageShape::new(1, 2, 1), vec![1.0, 2.0], 1);
        let x = Tensor::<TestBackend, 4>::ones([1, 1, 2, 1], &Default::default());
        let err = probe.forward_tapped(x, "fc").unwrap_err();
        assert!(matches!(err, SaliencyError::InvalidLayer { .. }));
    }

    #[test]
    fn test_forward_tapped_gradient_reaches_activation() {
        let probe = LinearProbe::new(ImageShape::new(1, 2, 1), vec![3.0, -1.0, 0.5, 2.0], 2);
        let x = Tensor::<TestBackend, 4>::ones([1, 1, 2, 1], &Default::default());

        let tapped = probe.forward_tapped(x, "input").unwrap();
        assert_eq!(tapped.logits.dims(), [1, 2]);

        let score = tapped.logits.clone().slice([0..1, 0..1]).sum();
        let grads = score.backward();
        let grad = tapped.activation.grad(&grads).unwrap();

        let values = grad.into_data().to_vec::<f32>().unwrap();
        assert_eq!(values, vec![3.0, 0.5]);
    }
}
