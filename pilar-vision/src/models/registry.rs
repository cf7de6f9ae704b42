//! Process-wide model registry
//!
//! The artifact is loaded at most once. `OnceLock` is the initialization
//! barrier: readers either see the finished outcome or nothing, and the loaded
//! artifact is immutable afterwards, so reads take no lock.

use super::artifact::ModelArtifact;
use crate::error::VisionError;
use crate::features::FeatureSpec;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::{error, info};

/// Provenance of the loaded artifact
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub source: PathBuf,
    pub sha256: String,
    pub size_bytes: u64,
    pub loaded_at: DateTime<Utc>,
}

/// A validated artifact plus where it came from
#[derive(Debug)]
pub struct LoadedModel {
    pub artifact: ModelArtifact,
    pub info: ModelInfo,
}

#[derive(Debug)]
enum LoadOutcome {
    Ready(Arc<LoadedModel>),
    Failed(String),
}

/// Snapshot rendered by the model-status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStatus {
    pub loaded: bool,
    pub source: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loaded_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classifier: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scaler: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<FeatureSpec>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub waste_map: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug)]
pub struct ModelRegistry {
    source: PathBuf,
    outcome: OnceLock<LoadOutcome>,
}

impl ModelRegistry {
    /// Registry for the artifact at `source`; nothing is read until [`load`](Self::load)
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            outcome: OnceLock::new(),
        }
    }

    /// Registry that is ready from the start, for an artifact built in memory
    pub fn from_artifact(artifact: ModelArtifact) -> Result<Self, VisionError> {
        artifact.validate()?;
        let source = PathBuf::from(format!("memory://{}", artifact.name));
        let info = ModelInfo {
            source: source.clone(),
            sha256: String::new(),
            size_bytes: 0,
            loaded_at: Utc::now(),
        };
        let outcome = OnceLock::new();
        let _ = outcome.set(LoadOutcome::Ready(Arc::new(LoadedModel { artifact, info })));
        Ok(Self { source, outcome })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Attempt the one-time load. Later calls return the first outcome without
    /// touching the file again.
    pub fn load(&self) -> Result<Arc<LoadedModel>, VisionError> {
        match self.outcome.get_or_init(|| self.load_once()) {
            LoadOutcome::Ready(model) => Ok(Arc::clone(model)),
            LoadOutcome::Failed(reason) => Err(VisionError::Artifact(reason.clone())),
        }
    }

    fn load_once(&self) -> LoadOutcome {
        let started = Instant::now();
        match read_artifact(&self.source) {
            Ok(model) => {
                info!(
                    "Model '{}' loaded from {:?} in {:?}: {} classes, {} classifier, sha256 {}",
                    model.artifact.name,
                    self.source,
                    started.elapsed(),
                    model.artifact.classes.len(),
                    model.artifact.classifier.kind(),
                    model.info.sha256
                );
                LoadOutcome::Ready(Arc::new(model))
            }
            Err(e) => {
                error!("Failed to load model from {:?}: {}", self.source, e);
                LoadOutcome::Failed(e.to_string())
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.outcome.get(), Some(LoadOutcome::Ready(_)))
    }

    /// The loaded model, or `ModelNotLoaded` before a successful load
    pub fn get(&self) -> Result<Arc<LoadedModel>, VisionError> {
        match self.outcome.get() {
            Some(LoadOutcome::Ready(model)) => Ok(Arc::clone(model)),
            Some(LoadOutcome::Failed(reason)) => Err(VisionError::ModelNotLoaded(reason.clone())),
            None => Err(VisionError::ModelNotLoaded("model has not been loaded".to_string())),
        }
    }

    /// Failure reason recorded by the load attempt, if it failed
    pub fn load_error(&self) -> Option<&str> {
        match self.outcome.get() {
            Some(LoadOutcome::Failed(reason)) => Some(reason.as_str()),
            _ => None,
        }
    }

    pub fn status(&self) -> RegistryStatus {
        let mut status = RegistryStatus {
            loaded: false,
            source: self.source.clone(),
            name: None,
            sha256: None,
            loaded_at: None,
            classifier: None,
            scaler: None,
            features: None,
            classes: Vec::new(),
            waste_map: BTreeMap::new(),
            confidence_threshold: None,
            error: None,
        };
        match self.outcome.get() {
            Some(LoadOutcome::Ready(model)) => {
                let artifact = &model.artifact;
                status.loaded = true;
                status.name = Some(artifact.name.clone());
                status.sha256 = Some(model.info.sha256.clone()).filter(|s| !s.is_empty());
                status.loaded_at = Some(model.info.loaded_at);
                status.classifier = Some(artifact.classifier.kind());
                status.scaler = Some(artifact.scaler.is_some());
                status.features = Some(artifact.features.clone());
                status.classes = artifact.classes.clone();
                status.waste_map = artifact.waste_map.clone();
                status.confidence_threshold = artifact.confidence_threshold;
            }
            Some(LoadOutcome::Failed(reason)) => status.error = Some(reason.clone()),
            None => status.error = Some("model has not been loaded".to_string()),
        }
        status
    }
}

fn read_artifact(path: &Path) -> Result<LoadedModel, VisionError> {
    let bytes = fs::read(path)?;
    let format = super::ArtifactFormat::from_path(path)?;
    let artifact = ModelArtifact::from_bytes(&bytes, format)?;
    artifact.validate()?;

    let info = ModelInfo {
        source: path.to_path_buf(),
        sha256: hex::encode(Sha256::digest(&bytes)),
        size_bytes: bytes.len() as u64,
        loaded_at: Utc::now(),
    };
    Ok(LoadedModel { artifact, info })
}
