//! pilar-vision: image features and waste-classification inference
//!
//! Decodes uploaded photos into the feature vectors a trained artifact
//! expects, holds that artifact in a load-once registry and turns classifier
//! output into a ranked label with a bounded confidence.

pub mod error;
pub mod features;
pub mod models;
pub mod predictor;
mod utils;

pub use error::VisionError;
pub use features::{FeatureExtractor, FeatureSpec, FeatureVector, ImageLimits};
pub use models::{LoadedModel, ModelArtifact, ModelRegistry, RegistryStatus};
pub use predictor::Predictor;
