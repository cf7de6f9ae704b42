//! Request handler for predictions
//!
//! Order of checks for every request:
//! 1. model readiness (nothing else runs while the registry is not ready)
//! 2. payload presence, declared content type, size limit
//! 3. extraction and prediction on the bounded inference pool
//! 4. category mapping into the response payload

use crate::error::PredictError;
use crate::pool::{InferencePool, PoolError};
use pilar_core::config::{PilarConfig, UploadConfig};
use pilar_core::{CategoryTable, PredictionResult};
use pilar_vision::{ModelRegistry, Predictor};
use std::sync::Arc;
use tracing::debug;

/// One uploaded image plus what the client claimed about it
#[derive(Debug, Clone, Default)]
pub struct PredictionRequest {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub filename: Option<String>,
    /// Include per-class probabilities in the result
    pub verbose: bool,
}

pub struct PredictionService {
    predictor: Predictor,
    catalog: Arc<CategoryTable>,
    upload: UploadConfig,
    pool: InferencePool,
    uncertainty_threshold: Option<f64>,
}

impl PredictionService {
    pub fn new(registry: Arc<ModelRegistry>, catalog: Arc<CategoryTable>, config: &PilarConfig) -> Self {
        Self {
            predictor: Predictor::new(registry, (&config.upload).into()),
            catalog,
            upload: config.upload.clone(),
            pool: InferencePool::new(config.inference.max_concurrent, config.inference.timeout()),
            uncertainty_threshold: config.uncertainty.threshold,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.predictor.is_ready()
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        self.predictor.registry()
    }

    pub fn catalog(&self) -> &CategoryTable {
        &self.catalog
    }

    pub fn pool(&self) -> &InferencePool {
        &self.pool
    }

    pub fn upload_limits(&self) -> &UploadConfig {
        &self.upload
    }

    /// Percentage below which results are flagged uncertain: the configured
    /// value, else the artifact's recorded floor, else none
    pub fn active_threshold(&self) -> Option<f64> {
        self.uncertainty_threshold.or_else(|| {
            self.registry()
                .get()
                .ok()
                .and_then(|model| model.artifact.threshold_percent())
        })
    }

    /// Cheap checks on the request envelope, before any decoding
    pub fn validate(&self, request: &PredictionRequest) -> Result<(), PredictError> {
        if request.bytes.is_empty() {
            return Err(PredictError::EmptyPayload);
        }
        match request.content_type.as_deref() {
            Some(content_type) if self.upload.accepts(content_type) => {}
            Some(content_type) => return Err(PredictError::UnsupportedMediaType(content_type.to_string())),
            None => return Err(PredictError::UnsupportedMediaType("missing content type".to_string())),
        }
        if request.bytes.len() > self.upload.max_file_size {
            return Err(PredictError::PayloadTooLarge {
                size: request.bytes.len(),
                limit: self.upload.max_file_size,
            });
        }
        Ok(())
    }

    pub async fn handle_predict(&self, request: PredictionRequest) -> Result<PredictionResult, PredictError> {
        let model = self
            .registry()
            .get()
            .map_err(|e| PredictError::ServiceUnavailable(e.to_string()))?;
        self.validate(&request)?;

        debug!(
            "Classifying {:?} ({} bytes, {:?})",
            request.filename,
            request.bytes.len(),
            request.content_type
        );

        let extractor = self.predictor.extractor_for(&model.artifact);
        let job_model = Arc::clone(&model);
        let bytes = request.bytes;
        let raw = self
            .pool
            .run(move || {
                let vector = extractor.extract(&bytes)?;
                Predictor::predict(&vector, &job_model.artifact)
            })
            .await
            .map_err(|e| match e {
                PoolError::Timeout(after) => PredictError::Timeout(after),
                other => PredictError::Internal(other.to_string()),
            })?
            .map_err(PredictError::from)?;

        let threshold = self.uncertainty_threshold.or_else(|| model.artifact.threshold_percent());
        Ok(PredictionResult::from_prediction(&raw, &self.catalog, threshold, request.verbose))
    }
}
