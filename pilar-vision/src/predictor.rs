//! Predictor: feature vector in, top-ranked label and confidence out

use crate::error::VisionError;
use crate::features::{FeatureExtractor, FeatureVector, ImageLimits};
use crate::models::{ModelArtifact, ModelRegistry, Scores};
use crate::utils::argmax;
use pilar_core::{ClassScore, Confidence, RawPrediction};
use std::sync::Arc;
use tracing::debug;

/// Runs the registry's artifact over images or precomputed vectors
#[derive(Debug, Clone)]
pub struct Predictor {
    registry: Arc<ModelRegistry>,
    limits: ImageLimits,
}

impl Predictor {
    pub fn new(registry: Arc<ModelRegistry>, limits: ImageLimits) -> Self {
        Self { registry, limits }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn is_ready(&self) -> bool {
        self.registry.is_ready()
    }

    /// Extractor paired with `artifact`'s feature recipe
    pub fn extractor_for(&self, artifact: &ModelArtifact) -> FeatureExtractor {
        FeatureExtractor::new(artifact.features.clone(), self.limits)
    }

    /// Full pipeline for one uploaded blob: extract, then predict
    pub fn classify(&self, bytes: &[u8]) -> Result<RawPrediction, VisionError> {
        let model = self.registry.get()?;
        let vector = self.extractor_for(&model.artifact).extract(bytes)?;
        Self::predict(&vector, &model.artifact)
    }

    /// Score `vector` with `artifact` and pick the top class.
    ///
    /// Probabilities map to percent directly, margins go through the logistic
    /// curve first. Ties go to the lowest class index.
    pub fn predict(vector: &FeatureVector, artifact: &ModelArtifact) -> Result<RawPrediction, VisionError> {
        let scores = artifact.decide(vector.as_slice())?;
        let confidences: Vec<Confidence> = match &scores {
            Scores::Probabilities(values) => values.iter().map(|p| Confidence::from_probability(*p)).collect(),
            Scores::Margins(values) => values.iter().map(|m| Confidence::from_margin(*m)).collect(),
        };

        let top = argmax(scores.values())
            .ok_or_else(|| VisionError::Inference("classifier produced no scores".to_string()))?;
        let label = artifact.classes[top].clone();
        debug!(label = %label, confidence = confidences[top].percent(), "Prediction");

        Ok(RawPrediction {
            category_hint: artifact.waste_map.get(&label).cloned(),
            confidence: confidences[top],
            scores: artifact
                .classes
                .iter()
                .zip(confidences)
                .map(|(label, confidence)| ClassScore { label: label.clone(), confidence })
                .collect(),
            label,
        })
    }
}
