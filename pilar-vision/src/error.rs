//! Error types for pilar-vision

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid image dimensions {width}x{height} (allowed {min}..={max} per side)")]
    InvalidDimensions {
        width: u32,
        height: u32,
        min: u32,
        max: u32,
    },

    #[error("Model not loaded: {0}")]
    ModelNotLoaded(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Artifact error: {0}")]
    Artifact(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VisionError {
    /// Errors caused by the uploaded image rather than the deployment
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            VisionError::Decode(_)
                | VisionError::UnsupportedFormat(_)
                | VisionError::InvalidDimensions { .. }
        )
    }
}
