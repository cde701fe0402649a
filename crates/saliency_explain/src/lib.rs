//! # saliency_explain
//!
//! The heatmap engine of saliency-rs.
//!
//! This crate provides:
//! - Activation and gradient capture at a tapped layer
//! - Grad-CAM++ and Grad-CAM channel weighting
//! - [`Heatmap`] with bilinear upsampling for overlays
//!
//! ## Example
//!
//! ```rust,ignore
//! use saliency_explain::{compute_heatmap, HeatmapEngine, EngineConfig, TargetClass};
//!
//! // Explain the predicted class at the last convolution
//! let heatmap = compute_heatmap(&model, input, "block5_conv3")?;
//! assert!(heatmap.values().iter().all(|v| (0.0..=1.0).contains(v)));
//!
//! // Explain a fixed class instead
//! let engine = HeatmapEngine::new(EngineConfig::default().with_target(TargetClass::Index(3)));
//! let heatmap = engine.compute(&model, input, "block5_conv3")?.resize(224, 224)?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod activation;
mod cam;
mod engine;
mod heatmap;

pub use activation::{capture_layer, LayerCapture, TargetClass};
pub use cam::{grad_cam, grad_cam_plus_plus, CamMethod, CamOutput, NORMALIZATION_EPSILON};
pub use engine::{compute_heatmap, EngineConfig, HeatmapEngine};
pub use heatmap::{resize_bilinear, Heatmap, HeatmapReport};
