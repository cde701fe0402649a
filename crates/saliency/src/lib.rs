//! # saliency
//!
//! Visual explanations for convolutional classifiers in Rust.
//!
//! Given a classifier, a preprocessed image and the name of a convolutional
//! layer, saliency-rs computes a Grad-CAM++ heatmap showing which regions of
//! the image drove the prediction. The classifier is never modified.
//!
//! - **Core**: errors, image shapes, the [`DifferentiableClassifier`](core::DifferentiableClassifier) trait
//! - **Models**: a VGG-style reference classifier and checkpoint I/O
//! - **Explain**: the heatmap engine, Grad-CAM++/Grad-CAM, upsampling
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use saliency::prelude::*;
//!
//! type Backend = Autodiff<NdArray>;
//!
//! let device = Default::default();
//! let config = VggNetConfig::default();
//! let model = config.init::<Backend>(&device).load_checkpoint("vgg19.mpk", &device)?;
//!
//! let heatmap = compute_heatmap(&model, input, "block5_conv3")?;
//! let overlay = heatmap.resize(224, 224)?;
//! ```
//!
//! ## Feature Flags
//!
//! - `backend-ndarray` (default): CPU backend using ndarray

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub use saliency_core as core;
pub use saliency_explain as explain;
pub use saliency_models as models;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use saliency::prelude::*;
/// ```
pub mod prelude {
    pub use saliency_core::{
        DifferentiableClassifier, ImageShape, ImageTensor, Result, SaliencyError, TappedForward,
    };

    pub use saliency_models::{ModelCheckpoint, TapPoint, VggNet, VggNetConfig};

    pub use saliency_explain::{
        compute_heatmap, resize_bilinear, CamMethod, EngineConfig, Heatmap, HeatmapEngine,
        HeatmapReport, TargetClass,
    };

    pub use saliency_core::backend::Autodiff;
    #[cfg(feature = "backend-ndarray")]
    pub use saliency_core::backend::NdArray;
}
