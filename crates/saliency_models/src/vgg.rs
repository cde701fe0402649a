//! VGG-style convolutional classifier with named layer taps.
//!
//! Based on "Very Deep Convolutional Networks for Large-Scale Image
//! Recognition" by Simonyan & Zisserman (2014).
//!
//! The network is a stack of blocks, each made of `3x3` convolutions with ReLU
//! followed by a `2x2` max pool, then global average pooling and a linear
//! classifier. Every convolution and pool output is a tap point named the way
//! Keras names VGG layers (`block5_conv3`, `block2_pool`, ...).

use burn::nn::{
    conv::{Conv2d, Conv2dConfig},
    pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
    Linear, LinearConfig, PaddingConfig2d, Relu,
};
use burn::prelude::*;
use burn::tensor::activation::softmax;
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

use saliency_core::{DifferentiableClassifier, ImageShape, Result, SaliencyError};

/// Configuration for the VGG model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VggNetConfig {
    /// Input height.
    pub height: usize,
    /// Input width.
    pub width: usize,
    /// Number of input channels.
    pub in_channels: usize,
    /// Number of output classes.
    pub n_classes: usize,
    /// Number of filters in each block.
    pub filters: Vec<usize>,
    /// Number of convolutions in each block.
    pub convs_per_block: Vec<usize>,
    /// Convolution kernel size (odd, "same" padding).
    pub kernel_size: usize,
    /// Apply softmax to the output, so the explained score is a probability.
    pub softmax_output: bool,
}

impl Default for VggNetConfig {
    /// VGG19 layout on 224x224 RGB images with 1000 classes.
    fn default() -> Self {
        Self {
            height: 224,
            width: 224,
            in_channels: 3,
            n_classes: 1000,
            filters: vec![64, 128, 256, 512, 512],
            convs_per_block: vec![2, 2, 4, 4, 4],
            kernel_size: 3,
            softmax_output: true,
        }
    }
}

/// A layer whose output can be explained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapPoint {
    /// Layer name.
    pub name: String,
    /// Output shape of the layer.
    pub shape: ImageShape,
}

impl VggNetConfig {
    /// Create a new config with specified dimensions.
    pub fn new(height: usize, width: usize, in_channels: usize, n_classes: usize) -> Self {
        Self {
            height,
            width,
            in_channels,
            n_classes,
            ..Default::default()
        }
    }

    /// Set the filters and convolution count of every block.
    #[must_use]
    pub fn with_blocks(mut self, filters: Vec<usize>, convs_per_block: Vec<usize>) -> Self {
        self.filters = filters;
        self.convs_per_block = convs_per_block;
        self
    }

    /// Set the kernel size.
    #[must_use]
    pub fn with_kernel_size(mut self, kernel_size: usize) -> Self {
        self.kernel_size = kernel_size;
        self
    }

    /// Choose between probabilities (softmax) and raw logits as output.
    #[must_use]
    pub fn with_softmax_output(mut self, softmax_output: bool) -> Self {
        self.softmax_output = softmax_output;
        self
    }

    /// Input shape `(H, W, C_in)`.
    #[must_use]
    pub fn input_shape(&self) -> ImageShape {
        ImageShape::new(self.height, self.width, self.in_channels)
    }

    /// Check that the configuration describes a buildable network.
    pub fn validate(&self) -> Result<()> {
        if self.input_shape().is_empty() {
            return Err(SaliencyError::InvalidConfig(format!(
                "input shape {} has an empty dimension",
                self.input_shape()
            )));
        }
        if self.n_classes == 0 {
            return Err(SaliencyError::InvalidConfig("n_classes must be positive".into()));
        }
        if self.filters.is_empty() || self.filters.len() != self.convs_per_block.len() {
            return Err(SaliencyError::InvalidConfig(format!(
                "{} filter counts for {} blocks",
                self.filters.len(),
                self.convs_per_block.len()
            )));
        }
        if self.filters.contains(&0) || self.convs_per_block.contains(&0) {
            return Err(SaliencyError::InvalidConfig(
                "every block needs at least one convolution with at least one filter".into(),
            ));
        }
        if self.kernel_size % 2 == 0 {
            return Err(SaliencyError::InvalidConfig(format!(
                "kernel size {} is even; same padding needs an odd kernel",
                self.kernel_size
            )));
        }
        let downsample = 1usize << self.filters.len();
        if self.height < downsample || self.width < downsample {
            return Err(SaliencyError::InvalidConfig(format!(
                "{} pooling stages reduce a {}x{} input to nothing",
                self.filters.len(),
                self.height,
                self.width
            )));
        }
        Ok(())
    }

    /// Every tap point with its output shape, in execution order.
    #[must_use]
    pub fn tap_points(&self) -> Vec<TapPoint> {
        let (mut height, mut width) = (self.height, self.width);
        let mut taps = Vec::new();
        for (block, (&filters, &n_convs)) in
            self.filters.iter().zip(&self.convs_per_block).enumerate()
        {
            for conv in 0..n_convs {
                taps.push(TapPoint {
                    name: Stage::Conv { block, conv }.name(),
                    shape: ImageShape::new(height, width, filters),
                });
            }
            height /= 2;
            width /= 2;
            taps.push(TapPoint {
                name: Stage::Pool { block }.name(),
                shape: ImageShape::new(height, width, filters),
            });
        }
        taps
    }

    /// Validate the config and initialize the model.
    pub fn try_init<B: Backend>(&self, device: &B::Device) -> Result<VggNet<B>> {
        self.validate()?;
        tracing::debug!(
            blocks = self.filters.len(),
            input = %self.input_shape(),
            n_classes = self.n_classes,
            "initializing VGG classifier"
        );
        Ok(VggNet::new(self, device))
    }

    /// Initialize the model without validation.
    pub fn init<B: Backend>(&self, device: &B::Device) -> VggNet<B> {
        VggNet::new(self, device)
    }
}

/// One step of the convolutional trunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Conv { block: usize, conv: usize },
    Pool { block: usize },
}

impl Stage {
    fn name(self) -> String {
        match self {
            Self::Conv { block, conv } => format!("block{}_conv{}", block + 1, conv + 1),
            Self::Pool { block } => format!("block{}_pool", block + 1),
        }
    }
}

/// Convolutions sharing a resolution, followed by a max pool.
#[derive(Module, Debug)]
pub struct VggBlock<B: Backend> {
    convs: Vec<Conv2d<B>>,
    pool: MaxPool2d,
}

impl<B: Backend> VggBlock<B> {
    fn new(
        in_channels: usize,
        filters: usize,
        n_convs: usize,
        kernel_size: usize,
        device: &B::Device,
    ) -> Self {
        let convs = (0..n_convs)
            .map(|i| {
                let channels_in = if i == 0 { in_channels } else { filters };
                Conv2dConfig::new([channels_in, filters], [kernel_size, kernel_size])
                    .with_padding(PaddingConfig2d::Same)
                    .init(device)
            })
            .collect();
        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();
        Self { convs, pool }
    }
}

/// VGG-style classifier.
///
/// Architecture:
/// - N blocks of `[Conv2d(k x k, same) -> ReLU] x m -> MaxPool(2x2)`
/// - Global Average Pooling
/// - Linear(filters_last, n_classes), optionally followed by softmax
///
/// Inputs and tapped activations are channels-last `(1, H, W, C)`; the trunk
/// runs channels-first internally.
///
/// # Example
///
/// ```rust,ignore
/// use saliency_models::VggNetConfig;
///
/// let config = VggNetConfig::new(32, 32, 3, 10).with_blocks(vec![16, 32], vec![2, 2]);
/// let model = config.init::<NdArray>(&device);
///
/// let x = Tensor::random([1, 32, 32, 3], Distribution::Normal(0.0, 1.0), &device);
/// let probs = model.forward(x);
/// // probs shape: [1, 10]
/// ```
#[derive(Module, Debug)]
pub struct VggNet<B: Backend> {
    blocks: Vec<VggBlock<B>>,
    gap: AdaptiveAvgPool2d,
    fc: Linear<B>,
    height: usize,
    width: usize,
    in_channels: usize,
    n_classes: usize,
    softmax_output: bool,
}

impl<B: Backend> VggNet<B> {
    /// Create a new VGG model.
    pub fn new(config: &VggNetConfig, device: &B::Device) -> Self {
        let mut in_channels = config.in_channels;
        let blocks = config
            .filters
            .iter()
            .zip(&config.convs_per_block)
            .map(|(&filters, &n_convs)| {
                let block = VggBlock::new(in_channels, filters, n_convs, config.kernel_size, device);
                in_channels = filters;
                block
            })
            .collect();

        let gap = AdaptiveAvgPool2dConfig::new([1, 1]).init();
        let fc = LinearConfig::new(in_channels, config.n_classes).init(device);

        Self {
            blocks,
            gap,
            fc,
            height: config.height,
            width: config.width,
            in_channels: config.in_channels,
            n_classes: config.n_classes,
            softmax_output: config.softmax_output,
        }
    }

    /// Input shape `(H, W, C_in)`.
    pub fn input_shape(&self) -> ImageShape {
        ImageShape::new(self.height, self.width, self.in_channels)
    }

    /// Number of output classes.
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Names of all tap points in execution order.
    pub fn layer_names(&self) -> Vec<String> {
        self.stages().into_iter().map(Stage::name).collect()
    }

    fn stages(&self) -> Vec<Stage> {
        self.blocks
            .iter()
            .enumerate()
            .flat_map(|(block, b)| {
                (0..b.convs.len())
                    .map(move |conv| Stage::Conv { block, conv })
                    .chain(std::iter::once(Stage::Pool { block }))
            })
            .collect()
    }

    fn stage_index(&self, layer: &str) -> Result<usize> {
        let stages = self.stages();
        if let Some(index) = stages.iter().position(|s| s.name() == layer) {
            return Ok(index);
        }
        let reason = match layer {
            "gap" | "fc" | "predictions" => "not a spatial feature map".to_string(),
            _ => format!("no such layer; known layers are [{}]", self.layer_names().join(", ")),
        };
        Err(SaliencyError::invalid_layer(layer, reason))
    }

    fn run_stage(&self, x: Tensor<B, 4>, stage: Stage) -> Tensor<B, 4> {
        match stage {
            Stage::Conv { block, conv } => {
                Relu::new().forward(self.blocks[block].convs[conv].forward(x))
            }
            Stage::Pool { block } => self.blocks[block].pool.forward(x),
        }
    }

    fn head(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let out = self.gap.forward(x);
        let [batch, channels, _, _] = out.dims();
        let logits = self.fc.forward(out.reshape([batch, channels]));
        if self.softmax_output {
            softmax(logits, 1)
        } else {
            logits
        }
    }

    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// * `x` - Input tensor of shape (1, H, W, C_in)
    ///
    /// # Returns
    ///
    /// Prediction vector of shape (1, n_classes)
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = x.permute([0, 3, 1, 2]);
        let trunk = self
            .stages()
            .into_iter()
            .fold(x, |out, stage| self.run_stage(out, stage));
        self.head(trunk)
    }

    /// Run the network up to and including `layer`, returning `(1, h, w, C)`.
    pub fn forward_to(&self, x: Tensor<B, 4>, layer: &str) -> Result<Tensor<B, 4>> {
        let index = self.stage_index(layer)?;
        let x = x.permute([0, 3, 1, 2]);
        let out = self
            .stages()
            .into_iter()
            .take(index + 1)
            .fold(x, |out, stage| self.run_stage(out, stage));
        Ok(out.permute([0, 2, 3, 1]))
    }

    /// Run the network from the `(1, h, w, C)` output of `layer` to the prediction.
    pub fn forward_from(&self, activation: Tensor<B, 4>, layer: &str) -> Result<Tensor<B, 2>> {
        let index = self.stage_index(layer)?;
        let x = activation.permute([0, 3, 1, 2]);
        let trunk = self
            .stages()
            .into_iter()
            .skip(index + 1)
            .fold(x, |out, stage| self.run_stage(out, stage));
        Ok(self.head(trunk))
    }
}

impl<B: AutodiffBackend> DifferentiableClassifier<B> for VggNet<B> {
    fn input_shape(&self) -> ImageShape {
        VggNet::input_shape(self)
    }

    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn layer_names(&self) -> Vec<String> {
        VggNet::layer_names(self)
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        VggNet::forward(self, x)
    }

    fn forward_to(&self, x: Tensor<B, 4>, layer: &str) -> Result<Tensor<B, 4>> {
        VggNet::forward_to(self, x, layer)
    }

    fn forward_from(&self, activation: Tensor<B, 4>, layer: &str) -> Result<Tensor<B, 2>> {
        VggNet::forward_from(self, activation, layer)
    }
}
