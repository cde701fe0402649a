//! # saliency_models
//!
//! Reference classifiers for saliency-rs.
//!
//! - [`VggNet`] - VGG-style CNN whose convolution and pool outputs can be tapped
//! - [`checkpoint`] - weight persistence through Burn's recorders

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
pub mod vgg;

pub use checkpoint::{load_record, save_model, CheckpointError, ModelCheckpoint};
pub use vgg::{TapPoint, VggBlock, VggNet, VggNetConfig};
