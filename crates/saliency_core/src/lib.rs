//! # saliency_core
//!
//! Core types and traits for saliency-rs.
//!
//! This crate provides:
//! - [`ImageShape`] for channels-last image and feature-map metadata
//! - [`ImageTensor`] wrapper for batch-of-one Burn tensors with shape validation
//! - [`DifferentiableClassifier`], the capability a network must expose to be explained
//! - Error types shared by the whole workspace
//!
//! ## Shape Convention
//!
//! Image tensors and feature maps follow the convention `(N, H, W, C)`:
//! - `N`: Batch size (always 1 for an explanation)
//! - `H`: Height
//! - `W`: Width
//! - `C`: Channels
//!
//! ## Example
//!
//! ```rust
//! use saliency_core::ImageShape;
//!
//! let shape = ImageShape::new(224, 224, 3);
//! assert_eq!(shape.as_batch_dims(), [1, 224, 224, 3]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod classifier;
mod error;
mod shape;
mod tensor;

pub use classifier::{DifferentiableClassifier, TappedForward};
pub use error::{Result, SaliencyError};
pub use shape::ImageShape;
pub use tensor::ImageTensor;

/// Backend type aliases for convenience
pub mod backend {
    pub use burn_autodiff::Autodiff;

    #[cfg(feature = "backend-ndarray")]
    pub use burn_ndarray::NdArray;
}
