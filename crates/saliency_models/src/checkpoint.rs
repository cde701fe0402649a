//! Classifier checkpointing.
//!
//! Weights are stored with Burn's named MessagePack recorder at full
//! precision. A classifier is loaded once at process start and then shared
//! read-only by every explanation.
//!
//! # Example
//!
//! ```rust,ignore
//! use saliency_models::{ModelCheckpoint, VggNetConfig};
//!
//! let config = VggNetConfig::default();
//! let model = config.init::<NdArray>(&device);
//! model.save_checkpoint("vgg19.mpk")?;
//!
//! let restored = config.init::<NdArray>(&device).load_checkpoint("vgg19.mpk", &device)?;
//! ```

use std::path::Path;

use burn::module::Module;
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};

/// Result type for checkpoint operations.
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Checkpoint-related errors.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// Error saving checkpoint.
    #[error("Failed to save checkpoint {path}: {reason}")]
    Save {
        /// Destination path.
        path: String,
        /// Recorder message.
        reason: String,
    },

    /// Error loading checkpoint.
    #[error("Failed to load checkpoint {path}: {reason}")]
    Load {
        /// Source path.
        path: String,
        /// Recorder message.
        reason: String,
    },
}

/// Save a model's weights.
///
/// The recorder appends the `.mpk` extension to `path` when it is missing.
pub fn save_model<B, M>(model: &M, path: impl AsRef<Path>) -> Result<()>
where
    B: Backend,
    M: Module<B>,
{
    let path = path.as_ref();
    let record = model.clone().into_record();
    NamedMpkFileRecorder::<FullPrecisionSettings>::new()
        .record(record, path.to_path_buf())
        .map_err(|e| CheckpointError::Save {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
    tracing::info!(path = %path.display(), "saved classifier checkpoint");
    Ok(())
}

/// Load a model record saved with [`save_model`].
pub fn load_record<B, M>(path: impl AsRef<Path>, device: &B::Device) -> Result<M::Record>
where
    B: Backend,
    M: Module<B>,
{
    let path = path.as_ref();
    let record = NamedMpkFileRecorder::<FullPrecisionSettings>::new()
        .load(path.to_path_buf(), device)
        .map_err(|e| CheckpointError::Load {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
    tracing::info!(path = %path.display(), "loaded classifier checkpoint");
    Ok(record)
}

/// Extension trait adding checkpoint methods to every module.
pub trait ModelCheckpoint<B: Backend>: Module<B> {
    /// Save the module's weights.
    fn save_checkpoint(&self, path: impl AsRef<Path>) -> Result<()> {
        save_model::<B, Self>(self, path)
    }

    /// Return a copy of this module carrying the weights stored at `path`.
    fn load_checkpoint(&self, path: impl AsRef<Path>, device: &B::Device) -> Result<Self>
    where
        Self: Sized,
    {
        let record = load_record::<B, Self>(path, device)?;
        Ok(self.clone().load_record(record))
    }
}

impl<B: Backend, M: Module<B>> ModelCheckpoint<B> for M {}
